use super::{ClassSet, MethodType, PrimitiveKinds, RangeType, Type};
use crate::jvm::class_graph::{Assignable, ClassGraph, ClassId};
use crate::jvm::{BinaryName, FieldType, MethodDescriptor, RefType};
use crate::util::RefId;
use elsa::sync::FrozenMap;

/// Interning tables for types
///
/// Like the class graph arenas, these are shared by every method being analyzed (possibly on
/// several threads at once). Two threads interning the same structure get the same reference.
pub struct TypeArenas<'g> {
    class_sets: FrozenMap<ClassSet<'g>, Box<ClassSet<'g>>>,
    arrays: FrozenMap<Type<'g>, Box<Type<'g>>>,
    ranges: FrozenMap<RangeType<'g>, Box<RangeType<'g>>>,
    methods: FrozenMap<MethodType<'g>, Box<MethodType<'g>>>,
}

impl<'g> TypeArenas<'g> {
    pub fn new() -> Self {
        TypeArenas {
            class_sets: FrozenMap::new(),
            arrays: FrozenMap::new(),
            ranges: FrozenMap::new(),
            methods: FrozenMap::new(),
        }
    }
}

impl<'g> Default for TypeArenas<'g> {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything needed to build and combine types
#[derive(Copy, Clone)]
pub struct TypeContext<'g> {
    graph: &'g ClassGraph<'g>,
    arenas: &'g TypeArenas<'g>,
}

impl<'g> TypeContext<'g> {
    pub fn new(graph: &'g ClassGraph<'g>, arenas: &'g TypeArenas<'g>) -> Self {
        TypeContext { graph, arenas }
    }

    pub fn graph(&self) -> &'g ClassGraph<'g> {
        self.graph
    }

    /// `java.lang.Object`
    pub fn object(&self) -> Type<'g> {
        self.class_set(None, vec![])
    }

    /// Any reference, including `null`
    pub fn any_reference(&self) -> Type<'g> {
        self.range(self.object(), Type::Null)
    }

    /// Exactly the named class or interface
    pub fn class(&self, name: &BinaryName) -> Type<'g> {
        self.class_of(self.graph.lookup(name))
    }

    pub fn class_of(&self, class: ClassId<'g>) -> Type<'g> {
        self.class_set(Some(class), vec![])
    }

    /// Canonical, interned class set
    ///
    /// Interfaces passed in as the class get moved over to the interfaces, duplicates and
    /// interfaces implied by other members are dropped, and the rest are sorted by name.
    pub fn class_set(&self, class: Option<ClassId<'g>>, interfaces: Vec<ClassId<'g>>) -> Type<'g> {
        let object = self.graph.object();
        let (class, extra_interface) = match class {
            Some(class) if class == object => (None, None),
            Some(class) if class.is_interface() => (None, Some(class)),
            other => (other, None),
        };

        let mut candidates: Vec<ClassId<'g>> = vec![];
        for interface in interfaces.into_iter().chain(extra_interface) {
            if interface != object && !candidates.contains(&interface) {
                candidates.push(interface);
            }
        }

        let mut kept: Vec<ClassId<'g>> = candidates
            .iter()
            .copied()
            .filter(|interface| {
                let implied_by_class = class.map_or(false, |cls| cls.is_assignable(interface));
                let implied_by_other = candidates.iter().any(|other| {
                    other != interface
                        && other.is_assignable(interface)
                        && !interface.is_assignable(other)
                });
                !implied_by_class && !implied_by_other
            })
            .collect();
        kept.sort_by(|a, b| a.name.cmp(&b.name));

        let set = ClassSet {
            class,
            interfaces: kept,
        };
        if let Some(existing) = self.arenas.class_sets.get(&set) {
            return Type::Class(RefId(existing));
        }
        Type::Class(RefId(self.arenas.class_sets.insert(set.clone(), Box::new(set))))
    }

    /// Array of the given elements (an array of `Error` is `Error`)
    pub fn array(&self, element: Type<'g>) -> Type<'g> {
        if element.is_error() {
            return Type::Error;
        }
        if let Some(existing) = self.arenas.arrays.get(&element) {
            return Type::Array(RefId(existing));
        }
        Type::Array(RefId(self.arenas.arrays.insert(element, Box::new(element))))
    }

    /// Interned range, without any of the checks done by [`TypeContext::create_range`]
    pub(super) fn range(&self, bottom: Type<'g>, top: Type<'g>) -> Type<'g> {
        let range = RangeType { bottom, top };
        if let Some(existing) = self.arenas.ranges.get(&range) {
            return Type::Range(RefId(existing));
        }
        Type::Range(RefId(self.arenas.ranges.insert(range, Box::new(range))))
    }

    pub fn method(&self, parameters: Vec<Type<'g>>, return_type: Type<'g>) -> Type<'g> {
        let method = MethodType {
            parameters,
            return_type,
        };
        if let Some(existing) = self.arenas.methods.get(&method) {
            return Type::Method(RefId(existing));
        }
        Type::Method(RefId(
            self.arenas.methods.insert(method.clone(), Box::new(method)),
        ))
    }

    /// The interfaces every array implements: `{Cloneable, Serializable}`
    pub fn array_interfaces(&self) -> Type<'g> {
        let cloneable = self.graph.lookup(&BinaryName::CLONEABLE);
        let serializable = self.graph.lookup(&BinaryName::SERIALIZABLE);
        self.class_set(None, vec![cloneable, serializable])
    }

    pub fn field_type(&self, field_type: &FieldType<BinaryName>) -> Type<'g> {
        match field_type {
            FieldType::Base(base) => Type::Primitive(PrimitiveKinds::from(*base)),
            FieldType::Ref(ref_type) => self.ref_type(ref_type),
        }
    }

    pub fn ref_type(&self, ref_type: &RefType<BinaryName>) -> Type<'g> {
        let (element, dimensions) = match ref_type {
            RefType::Object(name) => return self.class(name),
            RefType::ObjectArray(arr) => (self.class(&arr.element_type), arr.dimensions()),
            RefType::PrimitiveArray(arr) => (
                Type::Primitive(PrimitiveKinds::from(arr.element_type)),
                arr.dimensions(),
            ),
        };
        (0..dimensions).fold(element, |typ, _| self.array(typ))
    }

    /// `Void` for a missing return type
    pub fn return_type(&self, return_type: Option<&FieldType<BinaryName>>) -> Type<'g> {
        return_type.map_or(Type::Void, |typ| self.field_type(typ))
    }

    pub fn method_descriptor(&self, descriptor: &MethodDescriptor<BinaryName>) -> Type<'g> {
        let parameters = descriptor
            .parameters
            .iter()
            .map(|param| self.field_type(param))
            .collect();
        self.method(parameters, self.return_type(descriptor.return_type.as_ref()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::{ClassGraphArenas, HierarchyMap};
    use crate::jvm::ParseDescriptor;

    #[test]
    fn canonical_class_sets() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        let list = graph.lookup(&BinaryName::LIST);
        let collection = graph.lookup(&BinaryName::COLLECTION);
        let array_list = graph.lookup(&BinaryName::ARRAYLIST);

        assert!(
            tcx.class_set(None, vec![collection, list]) == tcx.class_set(None, vec![list]),
            "Collection is implied by List"
        );
        assert!(
            tcx.class_set(Some(array_list), vec![list]) == tcx.class_of(array_list),
            "List is implied by ArrayList"
        );
        assert!(
            tcx.class_set(Some(list), vec![]) == tcx.class_set(None, vec![list]),
            "interfaces never occupy the class slot"
        );
        assert!(tcx.class_of(graph.object()) == tcx.object());
        match tcx.object() {
            Type::Class(set) => assert!(set.is_object()),
            other => panic!("unexpected {}", other),
        }
    }

    #[test]
    fn descriptors() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        let typ = tcx.field_type(&FieldType::parse("[[Ljava/lang/String;").unwrap());
        assert_eq!(typ.to_string(), "java.lang.String[][]");
        assert!(typ == tcx.array(tcx.array(tcx.class(&BinaryName::STRING))), "interned");

        let method = tcx.method_descriptor(&MethodDescriptor::parse("(IJ)V").unwrap());
        assert_eq!(method.to_string(), "(int, long)void");
    }
}
