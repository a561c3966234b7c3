//! Set-based types used during inference
//!
//! A [`Type`] does not denote one Java type, but a _set_ of possible runtime types. Inference
//! starts every value off at [`Type::Unknown`] (all types) and only ever narrows it by
//! intersecting with constraints. When the set becomes empty, the result is [`Type::Error`].
//!
//! The interesting cases are the reference types:
//!
//!   - [`ClassSet`] is an exact set of requirements: "an object castable to this class and all of
//!     these interfaces". It is used both as a plain type and as the bounds of a range.
//!
//!   - [`RangeType`] is every type that is a subtype of `bottom` and a supertype of (at least one
//!     of the candidates in) `top`. This is what a value loaded from a slot usually looks like:
//!     the uses of the value dictate the bottom (the value must be usable as a `List`) while the
//!     definitions dictate the top (the value is either an `ArrayList` or a `LinkedList`).
//!
//! Reference types are interned in [`TypeArenas`], so equality is pointer equality.

mod context;
mod hint;
mod lattice;

pub use context::*;

use crate::jvm::class_graph::ClassId;
use crate::jvm::BaseType;
use crate::util::RefId;
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Set of primitive types
    ///
    /// Bytecode doesn't distinguish `boolean`, `byte`, `char`, `short`, and `int` on the operand
    /// stack, so an `int`-like value starts off as a set of all of those and gets narrowed.
    pub struct PrimitiveKinds: u8 {
        const BOOLEAN = 0b0000_0001;
        const BYTE = 0b0000_0010;
        const CHAR = 0b0000_0100;
        const SHORT = 0b0000_1000;
        const INT = 0b0001_0000;
        const LONG = 0b0010_0000;
        const FLOAT = 0b0100_0000;
        const DOUBLE = 0b1000_0000;

        /// Any of the integer types that fit in an `int` (excluding `boolean`)
        const U_INT = Self::INT.bits | Self::BYTE.bits | Self::CHAR.bits | Self::SHORT.bits;

        /// Any value the JVM stores as an `int`
        const BOOL_U_INT = Self::U_INT.bits | Self::BOOLEAN.bits;

        /// What `iand`, `ior`, and `ixor` operate on when the operand is not narrowed further
        const BOOL_INT = Self::INT.bits | Self::BOOLEAN.bits;

        /// Element type of a `baload`/`bastore` array
        const BOOL_BYTE = Self::BYTE.bits | Self::BOOLEAN.bits;
    }
}

impl PrimitiveKinds {
    /// Order in which kinds are preferred when picking one printable kind from a set
    pub const HINT_ORDER: [PrimitiveKinds; 8] = [
        PrimitiveKinds::INT,
        PrimitiveKinds::CHAR,
        PrimitiveKinds::BOOLEAN,
        PrimitiveKinds::BYTE,
        PrimitiveKinds::SHORT,
        PrimitiveKinds::LONG,
        PrimitiveKinds::FLOAT,
        PrimitiveKinds::DOUBLE,
    ];

    /// Source keyword, if this is exactly one kind
    pub fn keyword(self) -> Option<&'static str> {
        let keyword = match self {
            PrimitiveKinds::BOOLEAN => "boolean",
            PrimitiveKinds::BYTE => "byte",
            PrimitiveKinds::CHAR => "char",
            PrimitiveKinds::SHORT => "short",
            PrimitiveKinds::INT => "int",
            PrimitiveKinds::LONG => "long",
            PrimitiveKinds::FLOAT => "float",
            PrimitiveKinds::DOUBLE => "double",
            _ => return None,
        };
        Some(keyword)
    }

    /// Every kind that a value of one of these kinds can be implicitly widened to
    ///
    /// Only the small integer types widen: `byte` to `short` to `int`, and `char` to `int`.
    pub fn widened(self) -> PrimitiveKinds {
        let mut kinds = self;
        if self.contains(PrimitiveKinds::BYTE) {
            kinds |= PrimitiveKinds::SHORT | PrimitiveKinds::INT;
        }
        if self.intersects(PrimitiveKinds::SHORT | PrimitiveKinds::CHAR) {
            kinds |= PrimitiveKinds::INT;
        }
        kinds
    }

    /// Every kind that can be implicitly widened to one of these kinds
    pub fn narrowed(self) -> PrimitiveKinds {
        let mut kinds = self;
        if self.contains(PrimitiveKinds::INT) {
            kinds |= PrimitiveKinds::SHORT | PrimitiveKinds::BYTE | PrimitiveKinds::CHAR;
        }
        if self.contains(PrimitiveKinds::SHORT) {
            kinds |= PrimitiveKinds::BYTE;
        }
        kinds
    }
}

impl From<BaseType> for PrimitiveKinds {
    fn from(base_type: BaseType) -> PrimitiveKinds {
        match base_type {
            BaseType::Boolean => PrimitiveKinds::BOOLEAN,
            BaseType::Byte => PrimitiveKinds::BYTE,
            BaseType::Char => PrimitiveKinds::CHAR,
            BaseType::Short => PrimitiveKinds::SHORT,
            BaseType::Int => PrimitiveKinds::INT,
            BaseType::Long => PrimitiveKinds::LONG,
            BaseType::Float => PrimitiveKinds::FLOAT,
            BaseType::Double => PrimitiveKinds::DOUBLE,
        }
    }
}

/// Set of possible runtime types
///
/// This is a small `Copy` handle: the variants with structure point into interned data.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub enum Type<'g> {
    /// Every type (nothing is known yet)
    Unknown,

    /// No type (conflicting constraints)
    Error,

    /// Result of a method with no return value
    Void,

    /// Type of the `null` literal, used as the open lower end of a range
    Null,

    Primitive(PrimitiveKinds),

    /// Objects castable to every member of the set
    Class(RefId<'g, ClassSet<'g>>),

    /// Arrays whose element type is in the element set
    Array(RefId<'g, Type<'g>>),

    Range(RefId<'g, RangeType<'g>>),

    Method(RefId<'g, MethodType<'g>>),
}

impl<'g> Type<'g> {
    pub const BOOLEAN: Type<'g> = Type::Primitive(PrimitiveKinds::BOOLEAN);
    pub const BYTE: Type<'g> = Type::Primitive(PrimitiveKinds::BYTE);
    pub const CHAR: Type<'g> = Type::Primitive(PrimitiveKinds::CHAR);
    pub const SHORT: Type<'g> = Type::Primitive(PrimitiveKinds::SHORT);
    pub const INT: Type<'g> = Type::Primitive(PrimitiveKinds::INT);
    pub const LONG: Type<'g> = Type::Primitive(PrimitiveKinds::LONG);
    pub const FLOAT: Type<'g> = Type::Primitive(PrimitiveKinds::FLOAT);
    pub const DOUBLE: Type<'g> = Type::Primitive(PrimitiveKinds::DOUBLE);
    pub const U_INT: Type<'g> = Type::Primitive(PrimitiveKinds::U_INT);
    pub const BOOL_U_INT: Type<'g> = Type::Primitive(PrimitiveKinds::BOOL_U_INT);
    pub const BOOL_INT: Type<'g> = Type::Primitive(PrimitiveKinds::BOOL_INT);
    pub const BOOL_BYTE: Type<'g> = Type::Primitive(PrimitiveKinds::BOOL_BYTE);

    /// Primitive set, or `Error` if the set is empty
    pub fn primitive(kinds: PrimitiveKinds) -> Type<'g> {
        if kinds.is_empty() {
            Type::Error
        } else {
            Type::Primitive(kinds)
        }
    }

    pub fn is_error(self) -> bool {
        matches!(self, Type::Error)
    }

    pub fn is_reference(self) -> bool {
        matches!(
            self,
            Type::Null | Type::Class(_) | Type::Array(_) | Type::Range(_)
        )
    }

    /// Does every member of this set take up two words on the stack?
    pub fn is_wide(self) -> bool {
        match self {
            Type::Primitive(kinds) => {
                (PrimitiveKinds::LONG | PrimitiveKinds::DOUBLE).contains(kinds)
            }
            _ => false,
        }
    }

    /// Is the set narrowed down to a single primitive type?
    pub fn is_single_primitive(self, kind: PrimitiveKinds) -> bool {
        matches!(self, Type::Primitive(kinds) if kinds == kind)
    }

    /// Lower and upper bound of a reference set, for use in range computations
    fn bounds(self) -> (Type<'g>, Type<'g>) {
        match self {
            Type::Range(range) => (range.bottom, range.top),
            _ => (self, self),
        }
    }

    /// Type used for the bottom when this is an element of an array bound
    fn lower(self) -> Type<'g> {
        self.bounds().0
    }

    /// Type used for the top when this is an element of an array bound
    fn upper(self) -> Type<'g> {
        self.bounds().1
    }
}

/// "Castable to all of these" set of classes and interfaces
///
/// Always canonical (see [`TypeContext::class_set`]): `java/lang/Object` is represented by
/// `class == None`, interfaces are sorted by name, and no interface is implied by the class or by
/// another interface in the set.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ClassSet<'g> {
    pub class: Option<ClassId<'g>>,
    pub interfaces: Vec<ClassId<'g>>,
}

impl<'g> ClassSet<'g> {
    pub fn is_object(&self) -> bool {
        self.class.is_none() && self.interfaces.is_empty()
    }

    /// Single class or interface, if the set has only one member
    pub fn single(&self) -> Option<ClassId<'g>> {
        match (self.class, self.interfaces.as_slice()) {
            (Some(class), []) => Some(class),
            (None, [interface]) => Some(*interface),
            _ => None,
        }
    }
}

/// Every type between the two bounds
///
/// The `bottom` is a [`Type::Class`] or [`Type::Array`]. The `top` is one of those or
/// [`Type::Null`], meaning there is no lower end.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct RangeType<'g> {
    pub bottom: Type<'g>,
    pub top: Type<'g>,
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct MethodType<'g> {
    pub parameters: Vec<Type<'g>>,
    pub return_type: Type<'g>,
}

impl<'g> fmt::Display for ClassSet<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_object() {
            return f.write_str("java.lang.Object");
        }
        if let Some(single) = self.single() {
            return write!(f, "{}", single.name);
        }
        f.write_str("{")?;
        let members = self.class.iter().chain(self.interfaces.iter());
        for (i, member) in members.enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", member.name)?;
        }
        f.write_str("}")
    }
}

impl<'g> fmt::Display for Type<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Unknown => f.write_str("<unknown>"),
            Type::Error => f.write_str("<error>"),
            Type::Void => f.write_str("void"),
            Type::Null => f.write_str("null"),
            Type::Primitive(kinds) => match kinds.keyword() {
                Some(keyword) => f.write_str(keyword),
                None => {
                    let keywords: Vec<&str> = PrimitiveKinds::HINT_ORDER
                        .iter()
                        .filter(|kind| kinds.contains(**kind))
                        .filter_map(|kind| kind.keyword())
                        .collect();
                    write!(f, "{{{}}}", keywords.join(","))
                }
            },
            Type::Class(set) => write!(f, "{}", set.get()),
            Type::Array(element) => write!(f, "{}[]", element.get()),
            Type::Range(range) => write!(f, "<{}-{}>", range.bottom, range.top),
            Type::Method(method) => {
                f.write_str("(")?;
                for (i, parameter) in method.parameters.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", parameter)?;
                }
                write!(f, "){}", method.return_type)
            }
        }
    }
}

impl<'g> fmt::Debug for Type<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<'g> fmt::Debug for ClassSet<'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn primitive_cones() {
        assert_eq!(
            PrimitiveKinds::BYTE.widened(),
            PrimitiveKinds::BYTE | PrimitiveKinds::SHORT | PrimitiveKinds::INT
        );
        assert_eq!(
            PrimitiveKinds::CHAR.widened(),
            PrimitiveKinds::CHAR | PrimitiveKinds::INT
        );
        assert_eq!(PrimitiveKinds::INT.narrowed(), PrimitiveKinds::U_INT);
        assert_eq!(
            PrimitiveKinds::SHORT.narrowed(),
            PrimitiveKinds::SHORT | PrimitiveKinds::BYTE
        );
        assert_eq!(PrimitiveKinds::LONG.widened(), PrimitiveKinds::LONG);
        assert_eq!(PrimitiveKinds::BOOLEAN.narrowed(), PrimitiveKinds::BOOLEAN);
    }

    #[test]
    fn primitive_display() {
        assert_eq!(Type::INT.to_string(), "int");
        assert_eq!(Type::BOOL_INT.to_string(), "{int,boolean}");
        assert_eq!(Type::primitive(PrimitiveKinds::empty()), Type::Error);
        assert!(Type::LONG.is_wide());
        assert!(!Type::U_INT.is_wide());
    }
}
