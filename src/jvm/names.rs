use std::borrow::Cow;
use std::fmt::{Debug, Display, Error as FmtError, Formatter};

/// Names of methods, fields
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.2>
#[derive(Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Names of classes and interfaces
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct BinaryName(Cow<'static, str>);

/// Extracts the raw underlying string name
impl AsRef<str> for UnqualifiedName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

/// Extracts the raw underlying string name
impl AsRef<str> for BinaryName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

pub trait Name: Sized {
    /// Check if a string would be a valid name
    fn check_valid(name: impl AsRef<str>) -> Result<(), String>;

    /// Extact the raw underlying string data:
    fn as_cow(&self) -> &Cow<'static, str>;

    /// Extact the raw underlying string name
    fn as_str(&self) -> &str {
        self.as_cow().as_ref()
    }

    /// Try to construct a name from a string
    fn from_string(name: String) -> Result<Self, String>;
}

impl Name for UnqualifiedName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.contains(&['.', ';', '[', '/'][..]) {
            Err(format!(
                "Unqualified name '{}' contains an illegal character",
                name
            ))
        } else if name.is_empty() {
            Err(format!("Unqualified name '{}' is empty", name))
        } else {
            Ok(())
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(UnqualifiedName(Cow::Owned(name)))
    }
}

impl Name for BinaryName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            Err(format!("Binary name '{}' is empty", name))
        } else {
            name.split('/').map(UnqualifiedName::check_valid).collect()
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(BinaryName(Cow::Owned(name)))
    }
}

impl Debug for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Debug for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Display for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

/// Source-level spelling (`java.util.List`)
impl Display for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        for (i, segment) in self.0.split('/').enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl UnqualifiedName {
    const fn name(value: &'static str) -> UnqualifiedName {
        UnqualifiedName(Cow::Borrowed(value))
    }

    pub const GETCLASS: Self = Self::name("getClass");

    // Special unqualified names - only these are allowed to have angle brackets in them
    pub const INIT: Self = Self::name("<init>");
    pub const CLINIT: Self = Self::name("<clinit>");
}

impl BinaryName {
    /// Name without the package prefix or enclosing classes (`java/util/Map$Entry` gives `Entry`)
    pub fn simple_name(&self) -> &str {
        let name = self.as_str();
        let after_package = name.rsplit('/').next().unwrap_or(name);
        after_package.rsplit('$').next().unwrap_or(after_package)
    }

    const fn name(value: &'static str) -> BinaryName {
        BinaryName(Cow::Borrowed(value))
    }

    // java.lang
    pub const OBJECT: Self = Self::name("java/lang/Object");
    pub const STRING: Self = Self::name("java/lang/String");
    pub const CHARSEQUENCE: Self = Self::name("java/lang/CharSequence");
    pub const COMPARABLE: Self = Self::name("java/lang/Comparable");
    pub const CLASS: Self = Self::name("java/lang/Class");
    pub const CLONEABLE: Self = Self::name("java/lang/Cloneable");
    pub const ITERABLE: Self = Self::name("java/lang/Iterable");
    pub const RUNNABLE: Self = Self::name("java/lang/Runnable");
    pub const NUMBER: Self = Self::name("java/lang/Number");
    pub const INTEGER: Self = Self::name("java/lang/Integer");
    pub const LONG: Self = Self::name("java/lang/Long");
    pub const FLOAT: Self = Self::name("java/lang/Float");
    pub const DOUBLE: Self = Self::name("java/lang/Double");
    pub const BOOLEAN: Self = Self::name("java/lang/Boolean");
    pub const STRINGBUILDER: Self = Self::name("java/lang/StringBuilder");
    pub const ABSTRACTSTRINGBUILDER: Self = Self::name("java/lang/AbstractStringBuilder");
    pub const APPENDABLE: Self = Self::name("java/lang/Appendable");
    pub const SYSTEM: Self = Self::name("java/lang/System");
    pub const MATH: Self = Self::name("java/lang/Math");
    pub const THROWABLE: Self = Self::name("java/lang/Throwable");
    pub const ERROR: Self = Self::name("java/lang/Error");
    pub const EXCEPTION: Self = Self::name("java/lang/Exception");
    pub const RUNTIMEEXCEPTION: Self = Self::name("java/lang/RuntimeException");
    pub const ILLEGALARGUMENTEXCEPTION: Self =
        Self::name("java/lang/IllegalArgumentException");
    pub const ILLEGALSTATEEXCEPTION: Self = Self::name("java/lang/IllegalStateException");
    pub const NULLPOINTEREXCEPTION: Self = Self::name("java/lang/NullPointerException");
    pub const ARITHMETICEXCEPTION: Self = Self::name("java/lang/ArithmeticException");

    // java.io
    pub const SERIALIZABLE: Self = Self::name("java/io/Serializable");
    pub const CLOSEABLE: Self = Self::name("java/io/Closeable");
    pub const AUTOCLOSEABLE: Self = Self::name("java/lang/AutoCloseable");
    pub const IOEXCEPTION: Self = Self::name("java/io/IOException");
    pub const INPUTSTREAM: Self = Self::name("java/io/InputStream");
    pub const PRINTSTREAM: Self = Self::name("java/io/PrintStream");
    pub const OUTPUTSTREAM: Self = Self::name("java/io/OutputStream");
    pub const FILTEROUTPUTSTREAM: Self = Self::name("java/io/FilterOutputStream");
    pub const FLUSHABLE: Self = Self::name("java/io/Flushable");

    // java.util
    pub const COLLECTION: Self = Self::name("java/util/Collection");
    pub const LIST: Self = Self::name("java/util/List");
    pub const SET: Self = Self::name("java/util/Set");
    pub const QUEUE: Self = Self::name("java/util/Queue");
    pub const DEQUE: Self = Self::name("java/util/Deque");
    pub const MAP: Self = Self::name("java/util/Map");
    pub const ITERATOR: Self = Self::name("java/util/Iterator");
    pub const RANDOMACCESS: Self = Self::name("java/util/RandomAccess");
    pub const ABSTRACTCOLLECTION: Self = Self::name("java/util/AbstractCollection");
    pub const ABSTRACTLIST: Self = Self::name("java/util/AbstractList");
    pub const ABSTRACTSEQUENTIALLIST: Self = Self::name("java/util/AbstractSequentialList");
    pub const ABSTRACTSET: Self = Self::name("java/util/AbstractSet");
    pub const ABSTRACTMAP: Self = Self::name("java/util/AbstractMap");
    pub const ARRAYLIST: Self = Self::name("java/util/ArrayList");
    pub const LINKEDLIST: Self = Self::name("java/util/LinkedList");
    pub const HASHSET: Self = Self::name("java/util/HashSet");
    pub const HASHMAP: Self = Self::name("java/util/HashMap");
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn validity() {
        assert!(BinaryName::check_valid("java/lang/Object").is_ok());
        assert!(BinaryName::check_valid("java//Object").is_err(), "empty segment");
        assert!(BinaryName::check_valid("").is_err(), "empty name");
        assert!(UnqualifiedName::check_valid("a.b").is_err(), "dot in unqualified name");
        assert!(UnqualifiedName::from_string(String::from("size")).is_ok());
    }

    #[test]
    fn spellings() {
        assert_eq!(BinaryName::ARRAYLIST.simple_name(), "ArrayList");
        let entry = BinaryName::from_string(String::from("java/util/Map$Entry")).unwrap();
        assert_eq!(entry.simple_name(), "Entry");
        assert_eq!(BinaryName::LIST.to_string(), "java.util.List");
    }
}
