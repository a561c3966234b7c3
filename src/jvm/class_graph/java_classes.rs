use super::Hierarchy;
use crate::jvm::{BinaryName, ClassAccessFlags};

/// Hierarchies of the standard library classes that show up most often in method bodies
///
/// Interfaces are listed in the order the JDK sources declare them, since that order decides
/// which interface `generalize` finds first.
pub fn java_library() -> Vec<(BinaryName, Hierarchy)> {
    use crate::jvm::BinaryName as N;

    let class = |superclass: N, interfaces: &[N]| Hierarchy::class(superclass, interfaces.to_vec());
    let final_class = |superclass: N, interfaces: &[N]| Hierarchy {
        access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER | ClassAccessFlags::FINAL,
        ..Hierarchy::class(superclass, interfaces.to_vec())
    };
    let abstract_class = |superclass: N, interfaces: &[N]| Hierarchy {
        access_flags: ClassAccessFlags::PUBLIC
            | ClassAccessFlags::SUPER
            | ClassAccessFlags::ABSTRACT,
        ..Hierarchy::class(superclass, interfaces.to_vec())
    };
    let interface = |interfaces: &[N]| Hierarchy::interface(interfaces.to_vec());

    vec![
        // java.lang
        (N::CHARSEQUENCE, interface(&[])),
        (N::COMPARABLE, interface(&[])),
        (N::CLONEABLE, interface(&[])),
        (N::ITERABLE, interface(&[])),
        (N::RUNNABLE, interface(&[])),
        (N::APPENDABLE, interface(&[])),
        (N::AUTOCLOSEABLE, interface(&[])),
        (
            N::STRING,
            final_class(N::OBJECT, &[N::SERIALIZABLE, N::COMPARABLE, N::CHARSEQUENCE]),
        ),
        (N::CLASS, final_class(N::OBJECT, &[N::SERIALIZABLE])),
        (N::NUMBER, abstract_class(N::OBJECT, &[N::SERIALIZABLE])),
        (N::INTEGER, final_class(N::NUMBER, &[N::COMPARABLE])),
        (N::LONG, final_class(N::NUMBER, &[N::COMPARABLE])),
        (N::FLOAT, final_class(N::NUMBER, &[N::COMPARABLE])),
        (N::DOUBLE, final_class(N::NUMBER, &[N::COMPARABLE])),
        (
            N::BOOLEAN,
            final_class(N::OBJECT, &[N::SERIALIZABLE, N::COMPARABLE]),
        ),
        (
            N::ABSTRACTSTRINGBUILDER,
            abstract_class(N::OBJECT, &[N::APPENDABLE, N::CHARSEQUENCE]),
        ),
        (
            N::STRINGBUILDER,
            final_class(N::ABSTRACTSTRINGBUILDER, &[N::SERIALIZABLE, N::CHARSEQUENCE]),
        ),
        (N::SYSTEM, final_class(N::OBJECT, &[])),
        (N::MATH, final_class(N::OBJECT, &[])),
        (N::THROWABLE, class(N::OBJECT, &[N::SERIALIZABLE])),
        (N::ERROR, class(N::THROWABLE, &[])),
        (N::EXCEPTION, class(N::THROWABLE, &[])),
        (N::RUNTIMEEXCEPTION, class(N::EXCEPTION, &[])),
        (N::ILLEGALARGUMENTEXCEPTION, class(N::RUNTIMEEXCEPTION, &[])),
        (N::ILLEGALSTATEEXCEPTION, class(N::RUNTIMEEXCEPTION, &[])),
        (N::NULLPOINTEREXCEPTION, class(N::RUNTIMEEXCEPTION, &[])),
        (N::ARITHMETICEXCEPTION, class(N::RUNTIMEEXCEPTION, &[])),
        // java.io
        (N::SERIALIZABLE, interface(&[])),
        (N::FLUSHABLE, interface(&[])),
        (N::CLOSEABLE, interface(&[N::AUTOCLOSEABLE])),
        (N::IOEXCEPTION, class(N::EXCEPTION, &[])),
        (N::INPUTSTREAM, abstract_class(N::OBJECT, &[N::CLOSEABLE])),
        (
            N::OUTPUTSTREAM,
            abstract_class(N::OBJECT, &[N::CLOSEABLE, N::FLUSHABLE]),
        ),
        (N::FILTEROUTPUTSTREAM, class(N::OUTPUTSTREAM, &[])),
        (
            N::PRINTSTREAM,
            class(N::FILTEROUTPUTSTREAM, &[N::APPENDABLE, N::CLOSEABLE]),
        ),
        // java.util
        (N::COLLECTION, interface(&[N::ITERABLE])),
        (N::LIST, interface(&[N::COLLECTION])),
        (N::SET, interface(&[N::COLLECTION])),
        (N::QUEUE, interface(&[N::COLLECTION])),
        (N::DEQUE, interface(&[N::QUEUE])),
        (N::MAP, interface(&[])),
        (N::ITERATOR, interface(&[])),
        (N::RANDOMACCESS, interface(&[])),
        (N::ABSTRACTCOLLECTION, abstract_class(N::OBJECT, &[N::COLLECTION])),
        (N::ABSTRACTLIST, abstract_class(N::ABSTRACTCOLLECTION, &[N::LIST])),
        (N::ABSTRACTSEQUENTIALLIST, abstract_class(N::ABSTRACTLIST, &[])),
        (N::ABSTRACTSET, abstract_class(N::ABSTRACTCOLLECTION, &[N::SET])),
        (N::ABSTRACTMAP, abstract_class(N::OBJECT, &[N::MAP])),
        (
            N::ARRAYLIST,
            class(
                N::ABSTRACTLIST,
                &[N::LIST, N::RANDOMACCESS, N::CLONEABLE, N::SERIALIZABLE],
            ),
        ),
        (
            N::LINKEDLIST,
            class(
                N::ABSTRACTSEQUENTIALLIST,
                &[N::LIST, N::DEQUE, N::CLONEABLE, N::SERIALIZABLE],
            ),
        ),
        (
            N::HASHSET,
            class(N::ABSTRACTSET, &[N::SET, N::CLONEABLE, N::SERIALIZABLE]),
        ),
        (
            N::HASHMAP,
            class(N::ABSTRACTMAP, &[N::MAP, N::CLONEABLE, N::SERIALIZABLE]),
        ),
    ]
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn library_is_closed() {
        let library = java_library();
        let mut known: HashSet<BinaryName> = library.iter().map(|(n, _)| n.clone()).collect();
        known.insert(BinaryName::OBJECT);

        for (name, hierarchy) in &library {
            for dep in hierarchy.superclass.iter().chain(hierarchy.interfaces.iter()) {
                assert!(known.contains(dep), "{:?} refers to unknown {:?}", name, dep);
            }
        }
    }
}
