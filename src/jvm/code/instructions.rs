//! This module contains the AST of JVM bytecode as the decompiler consumes it. The representation
//! is slightly different from the usual presentation to make it more convenient to analyze:
//!
//!   - The "wide" instruction doesn't show up at all, but instead gets merged into the
//!     instructions it is allowed to modify
//!
//!   - Constant-pushing instructions (`iconst_*`, `bipush`, `sipush`, ...) are folded together
//!     with their operand
//!
//!   - Some instructions (like the branches) get abstracted into one instruction with a field.
//!     This helps with repetitive pattern matches and also simplifies tasks like inverting a
//!     branch condition.
//!
//!   - `jsr` and `ret` are omitted. Compilers haven't emitted them since class file version 50.

use super::BlockId;
use crate::jvm::{BaseType, BinaryName, FieldType, MethodDescriptor, RefType, UnqualifiedName};
use std::ops::Not;

/// Non-branching JVM bytecode instruction
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Nop,
    AConstNull,
    IConst(i32), // covers `iconst_{m1,0..5}`, `bipush`, `sipush`
    LConst(i64),
    FConst(f32),
    DConst(f64),
    Ldc(Constant), // covers `ldc`, `ldc_w`, and `ldc2_w`
    ILoad(u16),    // covers `iload`, `iload{0,3}`, and `wide iload`
    LLoad(u16),
    FLoad(u16),
    DLoad(u16),
    ALoad(u16),
    IALoad,
    LALoad,
    FALoad,
    DALoad,
    AALoad,
    BALoad,
    CALoad,
    SALoad,
    IStore(u16), // covers `istore`, `istore{0,3}`, and `wide istore`
    LStore(u16),
    FStore(u16),
    DStore(u16),
    AStore(u16),
    IAStore,
    LAStore,
    FAStore,
    DAStore,
    AAStore,
    BAStore,
    CAStore,
    SAStore,
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    ISh(ShiftType), // covers `ishr`, `ishl`, and `iushr`
    LSh(ShiftType), // covers `lshr`, `lshl`, and `lushr`
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,
    IInc(u16, i16), // covers `iinc` and `wide iinc`
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
    LCmp,
    FCmp(CompareMode), // covers `fcmpl` and `fcmpg`
    DCmp(CompareMode), // covers `dcmpl` and `dcmpg`
    GetStatic(FieldRef),
    PutStatic(FieldRef),
    GetField(FieldRef),
    PutField(FieldRef),
    Invoke(InvokeType, MethodRef),
    InvokeDynamic(UnqualifiedName, MethodDescriptor<BinaryName>),
    New(BinaryName),
    NewArray(BaseType),
    ANewArray(RefType<BinaryName>),
    MultiANewArray(RefType<BinaryName>, u8),
    ArrayLength,
    CheckCast(RefType<BinaryName>),
    InstanceOf(RefType<BinaryName>),
    MonitorEnter,
    MonitorExit,
}

impl Instruction {
    /// Bytecode local slot read by this instruction, if any
    pub fn local_read(&self) -> Option<u16> {
        match self {
            Instruction::ILoad(slot)
            | Instruction::LLoad(slot)
            | Instruction::FLoad(slot)
            | Instruction::DLoad(slot)
            | Instruction::ALoad(slot)
            | Instruction::IInc(slot, _) => Some(*slot),
            _ => None,
        }
    }

    /// Bytecode local slot written by this instruction, if any
    pub fn local_write(&self) -> Option<u16> {
        match self {
            Instruction::IStore(slot)
            | Instruction::LStore(slot)
            | Instruction::FStore(slot)
            | Instruction::DStore(slot)
            | Instruction::AStore(slot)
            | Instruction::IInc(slot, _) => Some(*slot),
            _ => None,
        }
    }
}

/// Loadable constant
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Class(RefType<BinaryName>),
}

/// Symbolic reference to a field
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,
}

/// Symbolic reference to a method
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
}

/// Branching JVM bytecode instruction
///
/// Every basic block ends in exactly one of these. Conditional branches carry both the jump target
/// and the block reached when the condition does not hold, so the successors of a block never
/// depend on block layout.
#[derive(Clone, Debug, PartialEq)]
pub enum BranchInstruction {
    If(OrdComparison, BlockId, BlockId), // covers `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    IfICmp(OrdComparison, BlockId, BlockId), // covers `if_icmpeq`, ... `if_icmple`
    IfACmp(EqComparison, BlockId, BlockId), // covers `if_acmpeq`, `if_acmpne`
    IfNull(EqComparison, BlockId, BlockId), // covers `ifnull`, `ifnonnull`
    Goto(BlockId),                       // covers `goto` and `goto_w`
    TableSwitch {
        /// Jump target if the argument is less than `low` or greater than
        /// `low + targets.len()`
        default: BlockId,

        /// Value associated with the first jump target
        low: i32,

        /// Jump targets
        targets: Vec<BlockId>,
    },
    LookupSwitch {
        /// Jump target if there is no corresponding key
        default: BlockId,

        /// Jump targets (sorted so that the keys are ascending)
        targets: Vec<(i32, BlockId)>,
    },
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    AThrow,

    /// This is a synthetic marker used to explicitly end a block which just falls through to the
    /// next block. In the JVM, this is implicit when a block ends without a jump. Making it
    /// explicit allows us to enforce that all blocks end in a branch instruction.
    FallThrough(BlockId),
}

impl BranchInstruction {
    /// Every block that control may reach after this instruction (without exceptions)
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            BranchInstruction::If(_, target, next)
            | BranchInstruction::IfICmp(_, target, next)
            | BranchInstruction::IfACmp(_, target, next)
            | BranchInstruction::IfNull(_, target, next) => vec![*target, *next],
            BranchInstruction::Goto(target) | BranchInstruction::FallThrough(target) => {
                vec![*target]
            }
            BranchInstruction::TableSwitch {
                default, targets, ..
            } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().copied());
                ts
            }
            BranchInstruction::LookupSwitch { default, targets } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().map(|(_, target)| *target));
                ts
            }
            BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow => vec![],
        }
    }

    /// Number of operand stack words the instruction pops
    pub fn popped_words(&self) -> usize {
        match self {
            BranchInstruction::If(..)
            | BranchInstruction::IfNull(..)
            | BranchInstruction::TableSwitch { .. }
            | BranchInstruction::LookupSwitch { .. }
            | BranchInstruction::IReturn
            | BranchInstruction::FReturn
            | BranchInstruction::AReturn
            | BranchInstruction::AThrow => 1,
            BranchInstruction::IfICmp(..)
            | BranchInstruction::IfACmp(..)
            | BranchInstruction::LReturn
            | BranchInstruction::DReturn => 2,
            BranchInstruction::Goto(_)
            | BranchInstruction::FallThrough(_)
            | BranchInstruction::Return => 0,
        }
    }
}

/// Possible bit shifts
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ShiftType {
    Left,
    LogicalRight,
    ArithmeticRight,
}

/// Comparison modes for floating point
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum CompareMode {
    /// -1 on NaN
    L,

    /// 1 on NaN
    G,
}

/// Binary comparison operators available for `int` branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

impl Not for OrdComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            OrdComparison::EQ => OrdComparison::NE,
            OrdComparison::GE => OrdComparison::LT,
            OrdComparison::GT => OrdComparison::LE,
            OrdComparison::LE => OrdComparison::GT,
            OrdComparison::LT => OrdComparison::GE,
            OrdComparison::NE => OrdComparison::EQ,
        }
    }
}

/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

impl Not for EqComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            EqComparison::EQ => EqComparison::NE,
            EqComparison::NE => EqComparison::EQ,
        }
    }
}

/// Type of method to invoke
///
/// Note: `InvokeDynamic` is kept separate because it has no owning class.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn successors() {
        let (a, b, c) = (BlockId(1), BlockId(2), BlockId(3));
        assert_eq!(BranchInstruction::If(OrdComparison::EQ, a, b).successors(), vec![a, b]);
        let switch = BranchInstruction::LookupSwitch {
            default: c,
            targets: vec![(1, a), (5, b)],
        };
        assert_eq!(switch.successors(), vec![c, a, b], "default comes first");
        assert!(BranchInstruction::AThrow.successors().is_empty());
    }

    #[test]
    fn negation() {
        assert_eq!(!OrdComparison::LT, OrdComparison::GE);
        assert_eq!(!!OrdComparison::GT, OrdComparison::GT);
        assert_eq!(!EqComparison::EQ, EqComparison::NE);
    }

    #[test]
    fn local_slots() {
        assert_eq!(Instruction::IInc(3, 1).local_read(), Some(3));
        assert_eq!(Instruction::IInc(3, 1).local_write(), Some(3));
        assert_eq!(Instruction::AStore(2).local_read(), None);
    }
}
