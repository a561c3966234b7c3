use crate::jvm::class_graph::ClassId;
use crate::jvm::{BinaryName, RefType};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Subtyping relationship between types
pub trait Assignable {
    /// Is the first type assignable to the second?
    fn is_assignable(&self, super_type: &Self) -> bool;
}

/// This does a traversal of super types in the class graph to determine assignability
impl<'g> Assignable for ClassId<'g> {
    fn is_assignable(&self, super_type: &ClassId<'g>) -> bool {
        let mut supertypes_to_visit: Vec<ClassId<'g>> = vec![*self];
        let mut dont_revisit: HashSet<ClassId<'g>> = HashSet::new();
        dont_revisit.insert(*self);

        // Optimization: if the super type is a class, then skip visiting interfaces
        let super_is_class: bool = !super_type.is_interface();

        while let Some(class_data) = supertypes_to_visit.pop() {
            if class_data == *super_type {
                return true;
            }

            if let Some(superclass) = class_data.superclass {
                if dont_revisit.insert(superclass) {
                    supertypes_to_visit.push(superclass);
                }
            }
            if !super_is_class {
                for interface in &class_data.interfaces {
                    if dont_revisit.insert(*interface) {
                        supertypes_to_visit.push(*interface);
                    }
                }
            }
        }

        false
    }
}

/// This matches the semantics of the prolog predicate `isJavaAssignable(sub_type, super_type)` in
/// the JVM verifier specification.
impl<'g> Assignable for RefType<ClassId<'g>> {
    fn is_assignable(&self, super_type: &RefType<ClassId<'g>>) -> bool {
        match (self, super_type) {
            // Special superclass and interfaces of all arrays
            (
                RefType::PrimitiveArray(_) | RefType::ObjectArray(_),
                RefType::Object(object_type),
            ) => is_array_type_assignable(&object_type.name),

            // Primitive arrays must match in dimension and type
            (RefType::PrimitiveArray(arr1), RefType::PrimitiveArray(arr2)) => arr1 == arr2,

            // Higher dimensional primitive arrays can be subtypes of object arrays
            (RefType::PrimitiveArray(arr1), RefType::ObjectArray(arr2)) => {
                match arr1.additional_dimensions.cmp(&arr2.additional_dimensions) {
                    Ordering::Less | Ordering::Equal => false,
                    Ordering::Greater => is_array_type_assignable(&arr2.element_type.name),
                }
            }

            // Cursed (unsound) covariance of arrays
            (RefType::ObjectArray(arr1), RefType::ObjectArray(arr2)) => {
                match arr1.additional_dimensions.cmp(&arr2.additional_dimensions) {
                    Ordering::Less => false,
                    Ordering::Equal => arr1.element_type.is_assignable(&arr2.element_type),
                    Ordering::Greater => is_array_type_assignable(&arr2.element_type.name),
                }
            }

            // Object-to-object assignability holds if there is a path through super type edges
            (RefType::Object(cls1), RefType::Object(cls2)) => cls1.is_assignable(cls2),

            _ => false,
        }
    }
}

/// Check if arrays can be assigned to a super type
///
/// This bakes in knowledge of the small, finite set of super types arrays have.
pub fn is_array_type_assignable(super_type: &BinaryName) -> bool {
    super_type == &BinaryName::OBJECT
        || super_type == &BinaryName::CLONEABLE
        || super_type == &BinaryName::SERIALIZABLE
}

#[cfg(test)]
mod test {
    use crate::jvm::class_graph::{Assignable, ClassGraph, ClassGraphArenas, HierarchyMap};
    use crate::jvm::{BinaryName, FieldType, RefType};

    #[test]
    fn simple_classes() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas, Box::new(HierarchyMap::with_java_library()));

        let object_cls = &class_graph.object();
        let string_cls = &class_graph.lookup(&BinaryName::STRING);

        assert!(
            object_cls.is_assignable(object_cls),
            "java.lang.Object <: java.lang.Object"
        );
        assert!(
            string_cls.is_assignable(object_cls),
            "java.lang.String <: java.lang.Object"
        );
        assert!(
            !object_cls.is_assignable(string_cls),
            "java.lang.Object </: java.lang.String"
        );
    }

    #[test]
    fn transitive_interfaces() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas, Box::new(HierarchyMap::with_java_library()));

        let linked_list = &class_graph.lookup(&BinaryName::LINKEDLIST);
        let queue = &class_graph.lookup(&BinaryName::QUEUE);
        let iterable = &class_graph.lookup(&BinaryName::ITERABLE);
        let random_access = &class_graph.lookup(&BinaryName::RANDOMACCESS);

        assert!(
            linked_list.is_assignable(queue),
            "java.util.LinkedList <: java.util.Queue (through Deque)"
        );
        assert!(
            linked_list.is_assignable(iterable),
            "java.util.LinkedList <: java.lang.Iterable"
        );
        assert!(
            !linked_list.is_assignable(random_access),
            "java.util.LinkedList </: java.util.RandomAccess"
        );
        assert!(
            !queue.is_assignable(linked_list),
            "java.util.Queue </: java.util.LinkedList"
        );
    }

    #[test]
    fn object_arrays() {
        let arenas = ClassGraphArenas::new();
        let class_graph = ClassGraph::new(&arenas, Box::new(HierarchyMap::with_java_library()));

        let object_cls = &RefType::Object(class_graph.object());
        let cloneable_cls = &RefType::Object(class_graph.lookup(&BinaryName::CLONEABLE));
        let int_array = &RefType::array(FieldType::int());
        let integer_array =
            &RefType::array(FieldType::object(class_graph.lookup(&BinaryName::INTEGER)));
        let number_array =
            &RefType::array(FieldType::object(class_graph.lookup(&BinaryName::NUMBER)));

        assert!(int_array.is_assignable(cloneable_cls), "[]int <: java.lang.Cloneable");
        assert!(
            integer_array.is_assignable(object_cls),
            "[]java.lang.Integer <: java.lang.Object"
        );
        assert!(
            integer_array.is_assignable(number_array),
            "[]java.lang.Integer <: []java.lang.Number"
        );
        assert!(
            !number_array.is_assignable(integer_array),
            "[]java.lang.Number </: []java.lang.Integer"
        );
        assert!(
            !int_array.is_assignable(integer_array),
            "[]int </: []java.lang.Integer"
        );
    }
}
