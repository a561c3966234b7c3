use crate::jvm::code::{CompareMode, EqComparison, FieldRef, InvokeType, MethodRef, OrdComparison};
use crate::jvm::{BaseType, BinaryName, MethodDescriptor, RefType, UnqualifiedName};
use crate::locals::LocalId;
use crate::types::PrimitiveKinds;
use std::fmt;
use std::ops::Not;

/// What an expression node computes
///
/// The number of children is fixed by the operator (and for calls, by the descriptor). Operators
/// never carry inference state: the node type lives on [`super::Expr`].
#[derive(Clone, Debug, PartialEq)]
pub enum Operator {
    /// Placeholder for an operand that hasn't been filled in
    Nop,

    Constant(ConstantValue),

    /// The receiver of an instance method, when its slot is never overwritten
    This(BinaryName),

    LocalLoad(LocalId),

    /// `local = value` (the value is the only child)
    LocalStore {
        local: LocalId,

        /// Is the assigned value also the value of the expression (as in `a = b = 0`)?
        value_used: bool,
    },

    /// Children: the object, unless static
    FieldGet(FieldAccess),

    /// Children: the object (unless static), then the value
    FieldPut {
        access: FieldAccess,
        value_used: bool,
    },

    /// Children: the array, then the index
    ArrayLoad(ArrayElement),

    /// Children: the array, the index, then the value
    ArrayStore {
        element: ArrayElement,
        value_used: bool,
    },

    ArrayLength,

    Binary(BinaryOp, NumericFamily),

    Negate(NumericFamily),

    /// Comparison producing a `boolean`
    Compare(Comparison, CompareFamily),

    /// `lcmp`, `fcmpl`, `fcmpg`, `dcmpl`, `dcmpg` (producing `-1`, `0`, or `1`)
    Cmp(NumericFamily, Option<CompareMode>),

    Convert { from: BaseType, to: BaseType },

    /// Children: the receiver (unless static), then the arguments
    Invoke { kind: InvokeType, method: MethodRef },

    InvokeDynamic {
        name: UnqualifiedName,
        descriptor: MethodDescriptor<BinaryName>,
    },

    /// Object creation with its constructor call folded in (children are the arguments)
    New {
        class: BinaryName,
        constructor: MethodDescriptor<BinaryName>,
    },

    /// Children: one length per allocated dimension
    NewArray {
        array: RefType<BinaryName>,
        dimensions: u8,
    },

    InstanceOf(RefType<BinaryName>),

    CheckCast(RefType<BinaryName>),

    /// The exception that entered a handler (`None` catches everything)
    Thrown(Option<BinaryName>),

    /// Synthetic null check, left behind by `dup; getClass; pop`
    CheckNull,

    Not,
    LogicalAnd,
    LogicalOr,

    Monitor(MonitorKind),
}

impl Operator {
    /// Is evaluating this operator (ignoring children) free of side effects and cheap enough to
    /// copy instead of spilling?
    pub fn is_simple(&self) -> bool {
        matches!(
            self,
            Operator::Constant(_) | Operator::LocalLoad(_) | Operator::This(_)
        )
    }

    /// Local variable read or written by this operator
    pub fn local(&self) -> Option<LocalId> {
        match self {
            Operator::LocalLoad(local) | Operator::LocalStore { local, .. } => Some(*local),
            _ => None,
        }
    }

    /// Point the operator at a different local variable
    pub fn retarget(&mut self, to: LocalId) {
        match self {
            Operator::LocalLoad(local) | Operator::LocalStore { local, .. } => *local = to,
            _ => (),
        }
    }

    /// Is this a boolean-valued condition operator?
    pub fn is_condition(&self) -> bool {
        matches!(
            self,
            Operator::Compare(..)
                | Operator::Not
                | Operator::LogicalAnd
                | Operator::LogicalOr
                | Operator::InstanceOf(_)
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldAccess {
    pub field: FieldRef,
    pub is_static: bool,
}

/// Literal values
#[derive(Clone, Debug, PartialEq)]
pub enum ConstantValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Class(RefType<BinaryName>),
    Null,
}

/// Element kind that an array instruction expects
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArrayElement {
    /// `baload` and friends: the kinds the instruction accepts (`baload` is byte _or_ boolean)
    Primitive(PrimitiveKinds),
    Reference,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    UShr,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
        }
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr)
    }

    /// `&`, `|`, and `^` also operate on booleans
    pub fn is_bitwise(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or | BinaryOp::Xor)
    }
}

/// Stack type an arithmetic instruction operates on
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NumericFamily {
    Int,
    Long,
    Float,
    Double,
}

impl NumericFamily {
    pub fn base_type(self) -> BaseType {
        match self {
            NumericFamily::Int => BaseType::Int,
            NumericFamily::Long => BaseType::Long,
            NumericFamily::Float => BaseType::Float,
            NumericFamily::Double => BaseType::Double,
        }
    }
}

/// Operand kind of a comparison
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CompareFamily {
    Numeric(NumericFamily),
    Reference,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Comparison {
    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
            Comparison::Lt => "<",
            Comparison::Ge => ">=",
            Comparison::Gt => ">",
            Comparison::Le => "<=",
        }
    }

    pub fn is_equality(self) -> bool {
        matches!(self, Comparison::Eq | Comparison::Ne)
    }
}

impl Not for Comparison {
    type Output = Comparison;

    fn not(self) -> Comparison {
        match self {
            Comparison::Eq => Comparison::Ne,
            Comparison::Ne => Comparison::Eq,
            Comparison::Lt => Comparison::Ge,
            Comparison::Ge => Comparison::Lt,
            Comparison::Gt => Comparison::Le,
            Comparison::Le => Comparison::Gt,
        }
    }
}

impl From<OrdComparison> for Comparison {
    fn from(cmp: OrdComparison) -> Comparison {
        match cmp {
            OrdComparison::EQ => Comparison::Eq,
            OrdComparison::NE => Comparison::Ne,
            OrdComparison::LT => Comparison::Lt,
            OrdComparison::GE => Comparison::Ge,
            OrdComparison::GT => Comparison::Gt,
            OrdComparison::LE => Comparison::Le,
        }
    }
}

impl From<EqComparison> for Comparison {
    fn from(cmp: EqComparison) -> Comparison {
        match cmp {
            EqComparison::EQ => Comparison::Eq,
            EqComparison::NE => Comparison::Ne,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MonitorKind {
    Enter,
    Exit,
}

/// Short description of the operator, for diagnostics and logs
impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Nop => f.write_str("nop"),
            Operator::Constant(value) => write!(f, "constant {:?}", value),
            Operator::This(_) => f.write_str("this"),
            Operator::LocalLoad(local) => write!(f, "load of {}", local),
            Operator::LocalStore { local, .. } => write!(f, "store to {}", local),
            Operator::FieldGet(access) => write!(f, "read of field {}", access.field.name),
            Operator::FieldPut { access, .. } => {
                write!(f, "write of field {}", access.field.name)
            }
            Operator::ArrayLoad(_) => f.write_str("array load"),
            Operator::ArrayStore { .. } => f.write_str("array store"),
            Operator::ArrayLength => f.write_str("array length"),
            Operator::Binary(op, _) => write!(f, "'{}'", op.symbol()),
            Operator::Negate(_) => f.write_str("negation"),
            Operator::Compare(cmp, _) => write!(f, "'{}'", cmp.symbol()),
            Operator::Cmp(..) => f.write_str("three-way comparison"),
            Operator::Convert { to, .. } => write!(f, "conversion to {}", to.keyword()),
            Operator::Invoke { method, .. } => write!(f, "call to {}", method.name),
            Operator::InvokeDynamic { name, .. } => write!(f, "dynamic call to {}", name),
            Operator::New { class, .. } => write!(f, "construction of {}", class),
            Operator::NewArray { .. } => f.write_str("array creation"),
            Operator::InstanceOf(_) => f.write_str("instanceof"),
            Operator::CheckCast(_) => f.write_str("cast"),
            Operator::Thrown(_) => f.write_str("caught exception"),
            Operator::CheckNull => f.write_str("null check"),
            Operator::Not => f.write_str("'!'"),
            Operator::LogicalAnd => f.write_str("'&&'"),
            Operator::LogicalOr => f.write_str("'||'"),
            Operator::Monitor(MonitorKind::Enter) => f.write_str("monitorenter"),
            Operator::Monitor(MonitorKind::Exit) => f.write_str("monitorexit"),
        }
    }
}
