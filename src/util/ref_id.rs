use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

/// Wrapper type whose "identity" for equality and hashing is determined from the reference itself
/// (ie. the pointer) and not from the underlying data.
///
/// Everything handed out as a `RefId` is interned (classes in the class graph, class sets, arrays,
/// ranges, and method types in the type arenas), so pointer identity coincides with structural
/// equality and comparisons stay cheap.
pub struct RefId<'a, T: ?Sized>(pub &'a T);

impl<'a, T: ?Sized> RefId<'a, T> {
    /// Get back the reference with its full lifetime
    pub fn get(self) -> &'a T {
        self.0
    }
}

impl<'a, T: ?Sized> Clone for RefId<'a, T> {
    fn clone(&self) -> Self {
        RefId(self.0)
    }
}

impl<'a, T: ?Sized> Copy for RefId<'a, T> {}

impl<'a, T: ?Sized> Hash for RefId<'a, T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self.0 as *const T as *const u8, state)
    }
}

impl<'a, 'b, T: ?Sized> PartialEq<RefId<'b, T>> for RefId<'a, T> {
    fn eq(&self, other: &RefId<'b, T>) -> bool {
        std::ptr::eq(self.0 as *const T as *const u8, other.0 as *const T as *const u8)
    }
}

impl<'a, T: ?Sized> Eq for RefId<'a, T> {}

impl<'a, T: ?Sized> Deref for RefId<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.0
    }
}

/// Debug output shows the pointee, since the pointer itself is meaningless in logs
impl<'a, T: ?Sized + fmt::Debug> fmt::Debug for RefId<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod test {
    use super::RefId;
    use std::collections::HashSet;

    #[test]
    fn identity_not_structure() {
        let first = String::from("java/lang/Object");
        let second = String::from("java/lang/Object");

        assert!(RefId(&first) == RefId(&first), "same reference is equal");
        assert!(RefId(&first) != RefId(&second), "equal data at different addresses differs");

        let mut seen = HashSet::new();
        seen.insert(RefId(&first));
        assert!(seen.contains(&RefId(&first)));
        assert!(!seen.contains(&RefId(&second)));
    }
}
