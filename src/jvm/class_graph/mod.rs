use super::{BinaryName, ClassAccessFlags, Error};
use crate::util::RefId;
use elsa::sync::FrozenMap;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::fmt::Debug;

mod assignable;
mod java_classes;

pub use assignable::*;
pub use java_classes::*;

/// Classes are compared by identity (the graph never holds two entries for one name)
pub type ClassId<'g> = RefId<'g, ClassData<'g>>;

/// Hierarchies deeper than this are assumed to be cyclic and get guessed
const MAX_HIERARCHY_DEPTH: usize = 64;

/// Backing storage for a [`ClassGraph`]
///
/// The map is safe to share between threads: inserting a class that some other thread inserted
/// first returns the existing entry.
pub struct ClassGraphArenas<'g> {
    classes: FrozenMap<BinaryName, Box<ClassData<'g>>>,
}

impl<'g> ClassGraphArenas<'g> {
    pub fn new() -> Self {
        ClassGraphArenas {
            classes: FrozenMap::new(),
        }
    }
}

impl<'g> Default for ClassGraphArenas<'g> {
    fn default() -> Self {
        Self::new()
    }
}

/// Superclass and interfaces of one class, as reported by a [`HierarchyProvider`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Hierarchy {
    /// Only `java/lang/Object` has no superclass
    pub superclass: Option<BinaryName>,

    /// Directly implemented interfaces (or super-interfaces), in declaration order
    pub interfaces: Vec<BinaryName>,

    pub access_flags: ClassAccessFlags,
}

impl Hierarchy {
    pub fn class(superclass: BinaryName, interfaces: Vec<BinaryName>) -> Hierarchy {
        Hierarchy {
            superclass: Some(superclass),
            interfaces,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        }
    }

    pub fn interface(interfaces: Vec<BinaryName>) -> Hierarchy {
        Hierarchy {
            superclass: Some(BinaryName::OBJECT),
            interfaces,
            access_flags: ClassAccessFlags::PUBLIC
                | ClassAccessFlags::INTERFACE
                | ClassAccessFlags::ABSTRACT,
        }
    }
}

/// Source of class metadata
///
/// Loading happens synchronously, at most once per class and graph. Failures are not retried: the
/// graph falls back to a guessed hierarchy instead.
pub trait HierarchyProvider: Send + Sync {
    fn load_hierarchy(&self, name: &BinaryName) -> Result<Hierarchy, Error>;
}

/// In-memory hierarchy table
#[derive(Clone, Debug, Default)]
pub struct HierarchyMap {
    entries: HashMap<BinaryName, Hierarchy>,
}

impl HierarchyMap {
    pub fn new() -> HierarchyMap {
        HierarchyMap::default()
    }

    /// Table pre-filled with the common `java.lang`, `java.io`, and `java.util` classes
    pub fn with_java_library() -> HierarchyMap {
        let mut map = HierarchyMap::new();
        map.extend(java_library());
        map
    }

    pub fn insert(&mut self, name: BinaryName, hierarchy: Hierarchy) {
        self.entries.insert(name, hierarchy);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Extend<(BinaryName, Hierarchy)> for HierarchyMap {
    fn extend<I: IntoIterator<Item = (BinaryName, Hierarchy)>>(&mut self, iter: I) {
        self.entries.extend(iter)
    }
}

impl HierarchyProvider for HierarchyMap {
    fn load_hierarchy(&self, name: &BinaryName) -> Result<Hierarchy, Error> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| Error::MissingClass(name.clone()))
    }
}

/// Tracks the superclass and interface relationships between classes
///
/// Classes get loaded lazily through the provider the first time they are looked up. The graph is
/// meant to be shared across all of the methods being decompiled (including across threads).
pub struct ClassGraph<'g> {
    arenas: &'g ClassGraphArenas<'g>,
    provider: Box<dyn HierarchyProvider>,
    object: ClassId<'g>,
}

impl<'g> ClassGraph<'g> {
    /// New graph containing only `java/lang/Object`
    pub fn new(
        arenas: &'g ClassGraphArenas<'g>,
        provider: Box<dyn HierarchyProvider>,
    ) -> Self {
        let object = arenas.classes.insert(
            BinaryName::OBJECT,
            Box::new(ClassData {
                name: BinaryName::OBJECT,
                superclass: None,
                interfaces: vec![],
                access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
                guessed: false,
            }),
        );
        ClassGraph {
            arenas,
            provider,
            object: RefId(object),
        }
    }

    /// The root of the class hierarchy
    pub fn object(&self) -> ClassId<'g> {
        self.object
    }

    /// Find a class that has already been loaded
    pub fn get(&self, name: &BinaryName) -> Option<ClassId<'g>> {
        let arenas: &'g ClassGraphArenas<'g> = self.arenas;
        arenas.classes.get(name).map(RefId)
    }

    /// Find a class, loading it (and its supertypes) if needed
    ///
    /// This never fails: classes whose hierarchy can't be loaded get a guessed entry extending
    /// `java/lang/Object` and flagged with [`ClassData::guessed`].
    pub fn lookup(&self, name: &BinaryName) -> ClassId<'g> {
        self.load(name, 0)
    }

    fn load(&self, name: &BinaryName, depth: usize) -> ClassId<'g> {
        if let Some(class) = self.get(name) {
            return class;
        }

        let (hierarchy, guessed) = if depth > MAX_HIERARCHY_DEPTH {
            log::warn!("Hierarchy of {} is too deep (or cyclic), guessing", name);
            (Self::guess_hierarchy(), true)
        } else {
            match self.provider.load_hierarchy(name) {
                Ok(hierarchy) => (hierarchy, false),
                Err(err) => {
                    log::warn!("Guessing hierarchy of {} ({:?})", name, err);
                    (Self::guess_hierarchy(), true)
                }
            }
        };

        let superclass = match &hierarchy.superclass {
            Some(superclass) => Some(self.load(superclass, depth + 1)),
            None => Some(self.object),
        };
        let interfaces = hierarchy
            .interfaces
            .iter()
            .map(|interface| self.load(interface, depth + 1))
            .collect();

        let arenas: &'g ClassGraphArenas<'g> = self.arenas;
        let class = arenas.classes.insert(
            name.clone(),
            Box::new(ClassData {
                name: name.clone(),
                superclass,
                interfaces,
                access_flags: hierarchy.access_flags,
                guessed,
            }),
        );
        log::debug!("Loaded class {:?}", class);
        RefId(class)
    }

    /// Best effort hierarchy for a class that can't be loaded
    fn guess_hierarchy() -> Hierarchy {
        Hierarchy::class(BinaryName::OBJECT, vec![])
    }

    /// Is this class or one of its supertypes guessed?
    pub fn has_guessed_ancestor(class: ClassId<'g>) -> bool {
        Self::supertypes(class).any(|sup| sup.guessed)
    }

    /// Breadth-first walk over a class and all of its supertypes
    ///
    /// For each class, the superclass is visited before the interfaces, and interfaces are visited
    /// in declaration order. Every supertype is yielded once.
    pub fn supertypes(class: ClassId<'g>) -> impl Iterator<Item = ClassId<'g>> {
        let mut queue = VecDeque::from([class]);
        let mut seen = HashSet::from([class]);
        std::iter::from_fn(move || {
            let next = queue.pop_front()?;
            for sup in next.superclass.iter().chain(next.interfaces.iter()) {
                if seen.insert(*sup) {
                    queue.push_back(*sup);
                }
            }
            Some(next)
        })
    }

    /// Chain of superclasses, starting from the class itself and ending at `java/lang/Object`
    pub fn superclasses(class: ClassId<'g>) -> impl Iterator<Item = ClassId<'g>> {
        std::iter::successors(Some(class), |cls| cls.superclass)
    }

    /// Is this object type throwable?
    pub fn is_throwable(class: ClassId<'g>) -> bool {
        Self::superclasses(class).any(|cls| cls.name == BinaryName::THROWABLE)
    }
}

pub struct ClassData<'g> {
    /// Name of the class
    pub name: BinaryName,

    /// Superclass is only ever missing for `java/lang/Object` itself
    pub superclass: Option<ClassId<'g>>,

    /// Interfaces implemented (or super-interfaces)
    pub interfaces: Vec<ClassId<'g>>,

    pub access_flags: ClassAccessFlags,

    /// The hierarchy could not be loaded, so this entry is an approximation
    pub guessed: bool,
}

impl<'g> ClassData<'g> {
    /// Is this an interface?
    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    pub fn is_final(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::FINAL)
    }
}

impl<'g> PartialEq for ClassData<'g> {
    fn eq(&self, other: &ClassData<'g>) -> bool {
        self.name == other.name
    }
}

impl<'g> Eq for ClassData<'g> {}

impl<'g> Debug for ClassData<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_ref())?;
        if self.guessed {
            f.write_str("?")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::Name;

    #[test]
    fn lazy_loading() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas, Box::new(HierarchyMap::with_java_library()));

        assert!(graph.get(&BinaryName::ARRAYLIST).is_none(), "not loaded yet");
        let list = graph.lookup(&BinaryName::ARRAYLIST);
        assert!(graph.get(&BinaryName::ARRAYLIST) == Some(list));
        assert!(graph.get(&BinaryName::ABSTRACTLIST).is_some(), "superclass loaded too");
        assert!(graph.lookup(&BinaryName::ARRAYLIST) == list, "loaded once");
        assert!(!list.guessed);
    }

    #[test]
    fn guessed_classes() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas, Box::new(HierarchyMap::with_java_library()));

        let name = BinaryName::from_string(String::from("com/example/Missing")).unwrap();
        let missing = graph.lookup(&name);
        assert!(missing.guessed);
        assert!(missing.superclass == Some(graph.object()));
        assert!(ClassGraph::has_guessed_ancestor(missing));

        let string = graph.lookup(&BinaryName::STRING);
        assert!(!ClassGraph::has_guessed_ancestor(string));
    }

    #[test]
    fn cyclic_hierarchy() {
        let a = BinaryName::from_string(String::from("A")).unwrap();
        let b = BinaryName::from_string(String::from("B")).unwrap();
        let mut map = HierarchyMap::new();
        map.insert(a.clone(), Hierarchy::class(b.clone(), vec![]));
        map.insert(b, Hierarchy::class(a.clone(), vec![]));

        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas, Box::new(map));
        let class = graph.lookup(&a);
        assert!(ClassGraph::has_guessed_ancestor(class), "cycle broken by a guess");
        assert!(ClassGraph::superclasses(class).any(|c| c == graph.object()));
    }

    #[test]
    fn breadth_first_supertypes() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas, Box::new(HierarchyMap::with_java_library()));

        let names: Vec<String> = ClassGraph::supertypes(graph.lookup(&BinaryName::ARRAYLIST))
            .map(|cls| cls.name.simple_name().to_string())
            .collect();
        assert_eq!(names[0], "ArrayList");
        assert_eq!(names[1], "AbstractList", "superclass before interfaces");
        assert_eq!(names[2], "List");
        assert!(names.iter().filter(|n| *n == "Collection").count() == 1);
        assert!(names.contains(&String::from("Object")));
    }

    #[test]
    fn throwables() {
        let arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&arenas, Box::new(HierarchyMap::with_java_library()));

        assert!(ClassGraph::is_throwable(graph.lookup(&BinaryName::IOEXCEPTION)));
        assert!(!ClassGraph::is_throwable(graph.lookup(&BinaryName::STRING)));
    }
}
