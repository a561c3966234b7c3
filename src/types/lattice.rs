use super::{ClassSet, Type, TypeContext};
use crate::jvm::class_graph::{is_array_type_assignable, Assignable, ClassGraph, ClassId};
use std::collections::{HashSet, VecDeque};

impl<'g> TypeContext<'g> {
    /// Set of types contained in both arguments
    pub fn intersect(&self, a: Type<'g>, b: Type<'g>) -> Type<'g> {
        let result = match (a, b) {
            (Type::Error, _) | (_, Type::Error) => Type::Error,
            (Type::Unknown, other) | (other, Type::Unknown) => other,
            _ if a == b => a,
            (Type::Primitive(kinds1), Type::Primitive(kinds2)) => Type::primitive(kinds1 & kinds2),
            (Type::Null, other) | (other, Type::Null) if other.is_reference() => Type::Null,
            (Type::Array(elem1), Type::Array(elem2)) => self.array(self.intersect(*elem1, *elem2)),
            _ if a.is_reference() && b.is_reference() => {
                let (bottom1, top1) = a.bounds();
                let (bottom2, top2) = b.bounds();
                let bottom = self.specialize(bottom1, bottom2);
                let top = self.generalize(top1, top2);
                self.create_range(bottom, top)
            }
            _ => Type::Error,
        };
        log::trace!("{} ∩ {} = {}", a, b, result);
        result
    }

    /// Do the two sets have any type in common?
    pub fn is_of_type(&self, a: Type<'g>, b: Type<'g>) -> bool {
        !self.intersect(a, b).is_error()
    }

    /// Most general type that is a subtype of both arguments
    ///
    /// For class sets, this means the more derived of the two classes (which must be related)
    /// together with the union of the interfaces.
    pub fn specialize(&self, a: Type<'g>, b: Type<'g>) -> Type<'g> {
        match (a, b) {
            (Type::Error, _) | (_, Type::Error) => Type::Error,
            (Type::Unknown, other) | (other, Type::Unknown) => other,
            (Type::Null, other) | (other, Type::Null) => other,
            _ if a == b => a,
            (Type::Primitive(kinds1), Type::Primitive(kinds2)) => Type::primitive(kinds1 & kinds2),
            (Type::Class(set1), Type::Class(set2)) => self.specialize_class_sets(&set1, &set2),
            (Type::Array(elem1), Type::Array(elem2)) => {
                self.array(self.specialize(elem1.lower(), elem2.lower()))
            }
            (array @ Type::Array(_), Type::Class(set)) | (Type::Class(set), array @ Type::Array(_)) => {
                if Self::arrays_satisfy(&set) {
                    array
                } else {
                    Type::Error
                }
            }
            (Type::Range(range), other) | (other, Type::Range(range)) => {
                self.specialize(range.bottom, other.lower())
            }
            _ => Type::Error,
        }
    }

    fn specialize_class_sets(&self, set1: &ClassSet<'g>, set2: &ClassSet<'g>) -> Type<'g> {
        let class = match (set1.class, set2.class) {
            (None, class) | (class, None) => class,
            (Some(class1), Some(class2)) => {
                if class1.is_assignable(&class2) {
                    Some(class1)
                } else if class2.is_assignable(&class1) {
                    Some(class2)
                } else {
                    return Type::Error;
                }
            }
        };
        let interfaces = set1
            .interfaces
            .iter()
            .chain(set2.interfaces.iter())
            .copied()
            .collect();
        self.class_set(class, interfaces)
    }

    /// Most specific type that is a supertype of both arguments
    ///
    /// For class sets, this is the nearest common superclass plus those interfaces of the first
    /// argument that the second argument also implements. Interfaces of the first argument that
    /// the second one doesn't implement get replaced by their own super-interfaces. Candidates
    /// are visited breadth-first: superclass chain first, then the interfaces in declaration
    /// order.
    pub fn generalize(&self, a: Type<'g>, b: Type<'g>) -> Type<'g> {
        match (a, b) {
            (Type::Error, _) | (_, Type::Error) => Type::Error,
            (Type::Unknown, _) | (_, Type::Unknown) => Type::Unknown,
            (Type::Null, other) | (other, Type::Null) => other,
            _ if a == b => a,
            (Type::Primitive(kinds1), Type::Primitive(kinds2)) => Type::Primitive(kinds1 | kinds2),
            (Type::Class(set1), Type::Class(set2)) => self.generalize_class_sets(&set1, &set2),
            (Type::Array(elem1), Type::Array(elem2)) => {
                let (upper1, upper2) = (elem1.upper(), elem2.upper());
                match (upper1, upper2) {
                    (Type::Primitive(_), _) | (_, Type::Primitive(_)) => self.array_interfaces(),
                    _ => match self.generalize(upper1, upper2) {
                        Type::Error => self.array_interfaces(),
                        element => self.array(element),
                    },
                }
            }
            (Type::Array(_), Type::Class(set)) | (Type::Class(set), Type::Array(_)) => {
                match self.array_interfaces() {
                    Type::Class(array_set) => self.generalize_class_sets(&array_set, &set),
                    _ => Type::Error,
                }
            }
            (Type::Range(range), other) | (other, Type::Range(range)) => {
                self.generalize(range.top, other.upper())
            }
            _ => Type::Error,
        }
    }

    fn generalize_class_sets(&self, set1: &ClassSet<'g>, set2: &ClassSet<'g>) -> Type<'g> {
        let class: Option<ClassId<'g>> = match (set1.class, set2.class) {
            (Some(class1), Some(class2)) => {
                ClassGraph::superclasses(class1).find(|sup| class2.is_assignable(sup))
            }
            _ => None,
        };

        // Interfaces of the first side that aren't already covered by the common superclass
        let mut queue: VecDeque<ClassId<'g>> = VecDeque::new();
        if let Some(class1) = set1.class {
            for sup in ClassGraph::superclasses(class1).take_while(|sup| Some(*sup) != class) {
                queue.extend(sup.interfaces.iter().copied());
            }
        }
        queue.extend(set1.interfaces.iter().copied());

        let mut visited: HashSet<ClassId<'g>> = HashSet::new();
        let mut kept: Vec<ClassId<'g>> = vec![];
        while let Some(interface) = queue.pop_front() {
            if !visited.insert(interface) {
                continue;
            }
            if class.map_or(false, |cls| cls.is_assignable(&interface)) {
                continue;
            }
            if Self::set_implements(set2, interface) {
                kept.push(interface);
            } else {
                queue.extend(interface.interfaces.iter().copied());
            }
        }

        self.class_set(class, kept)
    }

    /// Every type between `bottom` and `top`
    ///
    /// The candidates in `top` that don't satisfy all of the requirements in `bottom` are
    /// filtered out. The range collapses to a single type if there is only one option left.
    pub fn create_range(&self, bottom: Type<'g>, top: Type<'g>) -> Type<'g> {
        match (bottom, top) {
            (Type::Error, _) | (_, Type::Error) => Type::Error,
            (Type::Class(_) | Type::Array(_), Type::Null) => self.range(bottom, top),
            _ if bottom == top => bottom,
            (Type::Class(bottom_set), Type::Class(top_set)) => {
                self.create_class_range(bottom, &bottom_set, top, &top_set)
            }
            (Type::Class(bottom_set), Type::Array(_)) => {
                if Self::arrays_satisfy(&bottom_set) {
                    self.range(bottom, top)
                } else {
                    Type::Error
                }
            }
            (Type::Array(bottom_elem), Type::Array(top_elem)) => {
                match (bottom_elem.get(), top_elem.get()) {
                    (Type::Unknown, _) | (_, Type::Unknown) => self.range(bottom, top),

                    // Primitive arrays have no subtypes besides themselves
                    (Type::Primitive(kinds1), Type::Primitive(kinds2)) => {
                        self.array(Type::primitive(*kinds1 & *kinds2))
                    }
                    (elem1, elem2) => {
                        match self.create_range(elem1.lower(), elem2.upper()) {
                            Type::Error => Type::Error,
                            Type::Range(_) => self.range(bottom, top),
                            element => self.array(element),
                        }
                    }
                }
            }
            _ => Type::Error,
        }
    }

    fn create_class_range(
        &self,
        bottom: Type<'g>,
        bottom_set: &ClassSet<'g>,
        top: Type<'g>,
        top_set: &ClassSet<'g>,
    ) -> Type<'g> {
        if bottom_set.is_object() {
            return self.range(bottom, top);
        }

        // The bottom requires a class: every candidate has to extend it
        if let Some(bottom_class) = bottom_set.class {
            let top_class = match top_set.class {
                Some(top_class) if top_class.is_assignable(&bottom_class) => top_class,
                _ => return Type::Error,
            };
            if !bottom_set
                .interfaces
                .iter()
                .all(|interface| top_class.is_assignable(interface))
            {
                return Type::Error;
            }
            if top_class == bottom_class && bottom_set.interfaces.is_empty() {
                return bottom;
            }
            if !top_set.interfaces.is_empty() {
                return self.range(bottom, self.class_of(top_class));
            }
            return self.range(bottom, top);
        }

        // The bottom only requires interfaces
        let implements_bottom =
            |class: &ClassId<'g>| bottom_set.interfaces.iter().all(|req| class.is_assignable(req));
        let class = top_set.class.filter(implements_bottom);
        if class.is_none()
            && bottom_set.interfaces.len() == 1
            && top_set.interfaces.contains(&bottom_set.interfaces[0])
        {
            return bottom;
        }
        let interfaces: Vec<ClassId<'g>> = top_set
            .interfaces
            .iter()
            .copied()
            .filter(implements_bottom)
            .collect();
        if class.is_none() && interfaces.is_empty() {
            return Type::Error;
        }
        match self.class_set(class, interfaces) {
            filtered if filtered == bottom => bottom,
            filtered => self.range(bottom, filtered),
        }
    }

    /// Can an array be assigned to every member of the set?
    fn arrays_satisfy(set: &ClassSet<'g>) -> bool {
        set.class.is_none()
            && set
                .interfaces
                .iter()
                .all(|interface| is_array_type_assignable(&interface.name))
    }

    /// Is every object in the set assignable to the interface?
    fn set_implements(set: &ClassSet<'g>, interface: ClassId<'g>) -> bool {
        set.class.map_or(false, |cls| cls.is_assignable(&interface))
            || set.interfaces.iter().any(|iface| iface.is_assignable(&interface))
    }

    /// Every type a value of this type may be assigned to
    pub fn super_types(&self, typ: Type<'g>) -> Type<'g> {
        match typ {
            Type::Primitive(kinds) => Type::Primitive(kinds.widened()),
            Type::Class(_) | Type::Array(_) => self.create_range(self.object(), typ),
            Type::Range(range) => match range.top {
                Type::Null => self.any_reference(),
                top => self.create_range(self.object(), top),
            },
            Type::Null => self.any_reference(),
            other => other,
        }
    }

    /// Every type whose values may be assigned to this type
    pub fn sub_types(&self, typ: Type<'g>) -> Type<'g> {
        match typ {
            Type::Primitive(kinds) => Type::Primitive(kinds.narrowed()),
            Type::Class(_) | Type::Array(_) => self.create_range(typ, Type::Null),
            Type::Range(range) => self.create_range(range.bottom, Type::Null),
            other => other,
        }
    }
}

#[cfg(test)]
mod test {
    use crate::jvm::class_graph::{ClassGraph, ClassGraphArenas, HierarchyMap};
    use crate::jvm::BinaryName;
    use crate::types::{Type, TypeArenas, TypeContext};

    #[test]
    fn primitive_sets() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        assert_eq!(tcx.intersect(Type::BOOL_U_INT, Type::BOOL_INT), Type::BOOL_INT);
        assert_eq!(tcx.intersect(Type::U_INT, Type::BOOLEAN), Type::Error);
        assert_eq!(tcx.intersect(Type::LONG, Type::Unknown), Type::LONG);
        assert_eq!(tcx.intersect(Type::Error, Type::Unknown), Type::Error);
        assert_eq!(tcx.intersect(Type::INT, tcx.object()), Type::Error);
        assert_eq!(
            tcx.intersect(tcx.super_types(Type::BYTE), tcx.sub_types(Type::SHORT)),
            Type::Primitive(crate::types::PrimitiveKinds::BYTE | crate::types::PrimitiveKinds::SHORT),
            "a byte used as a short"
        );
    }

    #[test]
    fn list_generalization() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        let array_list = tcx.class(&BinaryName::ARRAYLIST);
        let linked_list = tcx.class(&BinaryName::LINKEDLIST);
        let join = tcx.generalize(array_list, linked_list);
        assert_eq!(
            join.to_string(),
            "{java.util.AbstractList, java.io.Serializable, java.lang.Cloneable}"
        );

        let from_definitions = tcx.intersect(
            tcx.super_types(array_list),
            tcx.super_types(linked_list),
        );
        let from_uses = tcx.sub_types(tcx.class(&BinaryName::LIST));
        let variable = tcx.intersect(from_definitions, from_uses);
        assert_eq!(variable.to_string(), "<java.util.List-java.util.AbstractList>");
        assert!(tcx.hint(variable) == tcx.class(&BinaryName::LIST));
    }

    #[test]
    fn class_ranges() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        let string = tcx.class(&BinaryName::STRING);
        let integer = tcx.class(&BinaryName::INTEGER);
        let number = tcx.class(&BinaryName::NUMBER);
        let comparable = tcx.class(&BinaryName::COMPARABLE);

        assert_eq!(tcx.intersect(string, integer), Type::Error, "exact, unrelated");
        assert!(tcx.intersect(tcx.sub_types(number), integer) == integer);
        assert!(tcx.intersect(tcx.super_types(integer), number) == number);
        assert!(tcx.intersect(tcx.super_types(string), tcx.sub_types(string)) == string);
        assert_eq!(
            tcx.intersect(tcx.super_types(string), tcx.sub_types(number)),
            Type::Error,
            "no type is both a supertype of String and a subtype of Number"
        );

        let comparable_string = tcx.intersect(tcx.super_types(string), tcx.sub_types(comparable));
        assert_eq!(
            comparable_string.to_string(),
            "<java.lang.Comparable-java.lang.String>"
        );
        assert!(tcx.hint(comparable_string) == comparable);

        let null = tcx.any_reference();
        assert!(tcx.intersect(null, string) == string);
        assert!(tcx.intersect(Type::Null, string) == Type::Null);
        assert!(tcx.super_types(null) == null);
    }

    #[test]
    fn arrays() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        let int_array = tcx.array(Type::INT);
        let char_array = tcx.array(Type::CHAR);
        let strings = tcx.array(tcx.class(&BinaryName::STRING));
        let objects = tcx.array(tcx.object());

        assert!(tcx.generalize(int_array, char_array) == tcx.array_interfaces());
        assert!(tcx.generalize(int_array, tcx.object()) == tcx.object());
        assert_eq!(tcx.intersect(int_array, char_array), Type::Error);
        assert!(tcx.intersect(tcx.array(Type::BOOL_BYTE), tcx.array(Type::BYTE)) == tcx.array(Type::BYTE));

        assert!(tcx.is_of_type(tcx.sub_types(objects), strings), "covariant arrays");
        assert!(tcx.intersect(tcx.sub_types(objects), strings) == strings);
        assert!(!tcx.is_of_type(tcx.sub_types(objects), int_array));
        assert!(tcx.is_of_type(tcx.super_types(int_array), tcx.array_interfaces()));
        assert!(!tcx.is_of_type(tcx.super_types(int_array), tcx.class(&BinaryName::STRING)));
    }

    #[test]
    fn soundness_and_associativity() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        let samples = vec![
            Type::Unknown,
            Type::INT,
            Type::BOOL_U_INT,
            tcx.object(),
            tcx.any_reference(),
            tcx.class(&BinaryName::ARRAYLIST),
            tcx.super_types(tcx.class(&BinaryName::ARRAYLIST)),
            tcx.super_types(tcx.class(&BinaryName::LINKEDLIST)),
            tcx.sub_types(tcx.class(&BinaryName::LIST)),
            tcx.sub_types(tcx.class(&BinaryName::COLLECTION)),
            tcx.super_types(tcx.class(&BinaryName::STRING)),
            tcx.array(tcx.class(&BinaryName::STRING)),
        ];

        for a in &samples {
            assert!(tcx.intersect(*a, *a) == *a, "{} ∩ itself", a);
            for b in &samples {
                let ab = tcx.intersect(*a, *b);
                assert!(ab == tcx.intersect(*b, *a), "{} ∩ {} commutes", a, b);
                if !ab.is_error() {
                    assert!(tcx.is_of_type(ab, *a), "{} ∩ {} within {}", a, b, a);
                    assert!(tcx.is_of_type(ab, *b), "{} ∩ {} within {}", a, b, b);
                }
                if *a != Type::Unknown || *b != Type::Unknown {
                    assert!(ab != Type::Unknown, "{} ∩ {} is known", a, b);
                }
            }
        }

        let list_users = [
            tcx.super_types(tcx.class(&BinaryName::ARRAYLIST)),
            tcx.super_types(tcx.class(&BinaryName::LINKEDLIST)),
            tcx.sub_types(tcx.class(&BinaryName::LIST)),
        ];
        let [a, b, c] = list_users;
        assert!(
            tcx.intersect(tcx.intersect(a, b), c) == tcx.intersect(a, tcx.intersect(b, c)),
            "associative on the list sample"
        );
    }
}
