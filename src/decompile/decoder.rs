//! Symbolic execution of basic blocks
//!
//! Each instruction pops expression trees off a symbolic operand stack and pushes the tree it
//! builds. Instructions with side effects become statements as soon as they execute, so values
//! still on the stack that such a statement could change are spilled into temporaries first.
//! Values left on the stack at the end of a block are passed to the successors through
//! [`Slot::Stack`] variables.

use super::Error;
use crate::expr::{
    ArrayElement, BinaryOp, CompareFamily, Comparison, ConstantValue, ExprArena, ExprId, FieldAccess,
    MonitorKind, NumericFamily, Operator,
};
use crate::flow::{Exit, FlowGraph, FlowNode, HandlerRegion, StackOp, StructuredBlock};
use crate::jvm::code::{
    BasicBlock, BlockId, BranchInstruction, Code, CompareMode, Constant, Instruction, InvokeType,
    MethodInfo, ShiftType,
};
use crate::jvm::{BaseType, BinaryName, FieldType, RefType, UnqualifiedName};
use crate::locals::resolver::{AccessKind, BlockAccesses, LocalAccess};
use crate::locals::{LocalId, LocalTable, Slot};
use crate::types::{PrimitiveKinds, Type, TypeContext};
use crate::util::Offset;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Result of decoding a method body
#[derive(Debug)]
pub struct Decoded {
    pub graph: FlowGraph,

    /// Local variable accesses of every decoded block, for the resolver
    pub accesses: BTreeMap<BlockId, BlockAccesses>,

    /// Parameters (and `this`, when its slot gets reassigned)
    pub entry_definitions: Vec<(Slot, LocalId)>,
}

#[derive(Clone, Debug)]
enum StackEntry {
    Value {
        expr: ExprId,
        wide: bool,
    },

    /// One of several copies made by a `dup` of a non-trivial expression
    ///
    /// Copies share the expression (and the `copy` number). The first one to be consumed decides
    /// what happens to the others: a store turns its remaining twin into an assignment expression,
    /// anything else spills the expression into a temporary.
    Shared {
        expr: ExprId,
        wide: bool,
        copy: usize,
    },

    /// Result of `new`, before the constructor has been called on it
    Uninitialized {
        class: BinaryName,
        created_at: Offset,
    },
}

impl StackEntry {
    fn words(&self) -> usize {
        match self {
            StackEntry::Value { wide: true, .. } | StackEntry::Shared { wide: true, .. } => 2,
            _ => 1,
        }
    }

    fn is_wide(&self) -> bool {
        self.words() == 2
    }

    fn copy(&self) -> Option<usize> {
        match self {
            StackEntry::Shared { copy, .. } => Some(*copy),
            _ => None,
        }
    }

    fn expr(&self) -> Option<ExprId> {
        match self {
            StackEntry::Value { expr, .. } | StackEntry::Shared { expr, .. } => Some(*expr),
            StackEntry::Uninitialized { .. } => None,
        }
    }
}

/// What a block expects on the stack when it starts
#[derive(Clone, Debug, PartialEq)]
enum EntryShape {
    Value { wide: bool },
    Uninitialized { class: BinaryName, created_at: Offset },
}

/// Check that the code is complete enough to decode, returning the entry block
pub fn validate(code: &Code) -> Result<BlockId, Error> {
    let entry = code
        .entry()
        .ok_or_else(|| Error::malformed(Offset(0), "method has no code"))?;

    for block in code.blocks.values() {
        let (offset, branch) = &block.branch_end;
        for target in branch.successors() {
            if !code.blocks.contains_key(&target) {
                return Err(Error::malformed(
                    *offset,
                    format!("branch to missing block {}", target),
                ));
            }
        }
    }
    for handler in &code.exception_table {
        if !code.blocks.contains_key(&handler.handler) {
            return Err(Error::malformed(
                Offset(0),
                format!("exception handler {} is missing", handler.handler),
            ));
        }
        if handler.end <= handler.start {
            return Err(Error::malformed(
                Offset(0),
                format!(
                    "empty protected range {}..{} for handler {}",
                    handler.start, handler.end, handler.handler
                ),
            ));
        }
    }
    Ok(entry)
}

pub struct Decoder<'a, 'g> {
    tcx: TypeContext<'g>,
    method: &'a MethodInfo,
    arena: &'a mut ExprArena<'g>,
    locals: &'a mut LocalTable<'g>,
    resolve_stack_operations: bool,

    /// Non-static method whose slot 0 is never written: `aload_0` is always `this`
    this_is_fixed: bool,

    next_copy: usize,

    // State of the block being decoded
    stack: Vec<StackEntry>,
    statements: Vec<StructuredBlock>,
    accesses: Vec<LocalAccess>,
}

impl<'a, 'g> Decoder<'a, 'g> {
    pub fn new(
        tcx: TypeContext<'g>,
        method: &'a MethodInfo,
        arena: &'a mut ExprArena<'g>,
        locals: &'a mut LocalTable<'g>,
        resolve_stack_operations: bool,
    ) -> Self {
        let writes_this = method.code.blocks.values().any(|block| {
            block
                .instructions
                .iter()
                .any(|(_, instruction)| instruction.local_write() == Some(0))
        });
        Decoder {
            tcx,
            method,
            arena,
            locals,
            resolve_stack_operations,
            this_is_fixed: !method.is_static() && !writes_this,
            next_copy: 0,
            stack: vec![],
            statements: vec![],
            accesses: vec![],
        }
    }

    /// Decode every block reachable from the entry (normally or through a handler)
    pub fn decode(mut self) -> Result<Decoded, Error> {
        let method = self.method;
        let code = &method.code;
        let entry = validate(code)?;
        let entry_definitions = self.parameters();
        let handler_types = handler_types(code);

        let mut shapes: BTreeMap<BlockId, Vec<EntryShape>> = BTreeMap::new();
        shapes.insert(entry, vec![]);
        let mut queue: VecDeque<BlockId> = VecDeque::new();
        queue.push_back(entry);

        let mut graph = FlowGraph::new(entry);
        let mut accesses = BTreeMap::new();
        while let Some(id) = queue.pop_front() {
            if graph.nodes.contains_key(&id) {
                continue;
            }
            let block = code
                .blocks
                .get(&id)
                .ok_or_else(|| Error::malformed(Offset(0), format!("missing block {}", id)))?;

            let incoming = shapes.get(&id).cloned();
            let (node, outgoing) =
                self.decode_block(id, block, incoming.as_deref(), handler_types.get(&id))?;

            let successors = block.branch_end.1.successors();
            for successor in &successors {
                match shapes.get(successor) {
                    Some(existing) if *existing != outgoing => {
                        return Err(Error::malformed(
                            block.branch_end.0,
                            format!("stack entering {} differs between predecessors", successor),
                        ));
                    }
                    Some(_) => (),
                    None => {
                        shapes.insert(*successor, outgoing.clone());
                    }
                }
                queue.push_back(*successor);
            }
            let handlers: Vec<BlockId> = code.handlers_of(id).map(|h| h.handler).collect();
            queue.extend(handlers.iter().copied());

            accesses.insert(
                id,
                BlockAccesses {
                    accesses: std::mem::take(&mut self.accesses),
                    successors,
                    handlers,
                },
            );
            graph.nodes.insert(id, node);
        }

        graph.regions = handler_regions(code, &graph);
        log::debug!(
            "Decoded {} blocks ({} expression nodes, {} handler regions)",
            graph.nodes.len(),
            self.arena.len(),
            graph.regions.len()
        );
        Ok(Decoded {
            graph,
            accesses,
            entry_definitions,
        })
    }

    fn parameters(&mut self) -> Vec<(Slot, LocalId)> {
        let mut definitions = vec![];
        if !self.method.is_static() && !self.this_is_fixed {
            let this = self.tcx.class(&self.method.class);
            let local = self
                .locals
                .create_parameter(0, this, Some(String::from("this")));
            definitions.push((Slot::Bytecode(0), local));
        }
        for (slot, typ) in self.method.parameter_slots() {
            let local = self
                .locals
                .create_parameter(slot, self.tcx.field_type(&typ), None);
            definitions.push((Slot::Bytecode(slot), local));
        }
        definitions
    }

    fn decode_block(
        &mut self,
        id: BlockId,
        block: &BasicBlock,
        incoming: Option<&[EntryShape]>,
        catch_type: Option<&Option<BinaryName>>,
    ) -> Result<(FlowNode, Vec<EntryShape>), Error> {
        self.stack.clear();
        self.statements.clear();
        self.accesses.clear();

        let start = block.start_offset();
        match (catch_type, incoming) {
            (Some(_), Some(_)) => {
                return Err(Error::malformed(
                    start,
                    format!("exception handler {} is also entered normally", id),
                ));
            }
            (Some(catch_type), None) => {
                let thrown = self.arena.leaf(Operator::Thrown(catch_type.clone()), start);
                self.push(thrown, false);
            }
            (None, incoming) => {
                for (depth, shape) in incoming.unwrap_or(&[]).iter().enumerate() {
                    let entry = match shape {
                        EntryShape::Value { wide } => StackEntry::Value {
                            expr: self.load(Slot::Stack(depth as u16), Type::Unknown, start),
                            wide: *wide,
                        },
                        EntryShape::Uninitialized { class, created_at } => {
                            StackEntry::Uninitialized {
                                class: class.clone(),
                                created_at: *created_at,
                            }
                        }
                    };
                    self.stack.push(entry);
                }
            }
        }
        log::trace!("Decoding {} with {} stack entries", id, self.stack.len());

        let mut skip_next = false;
        for (index, (offset, instruction)) in block.instructions.iter().enumerate() {
            if skip_next {
                skip_next = false;
                continue;
            }
            let previous = index
                .checked_sub(1)
                .and_then(|previous| block.instructions.get(previous))
                .map(|(_, instruction)| instruction);
            let next = block.instructions.get(index + 1).map(|(_, instruction)| instruction);
            skip_next = self.instruction(*offset, instruction, previous, next)?;
        }

        let (offset, branch) = &block.branch_end;
        let exit = self.branch(*offset, branch)?;
        let outgoing = match exit {
            Exit::None => {
                self.discard_stack(*offset)?;
                vec![]
            }
            _ => self.spill_stack(*offset)?,
        };

        let statements = std::mem::take(&mut self.statements);
        Ok((
            FlowNode::new(StructuredBlock::sequence(statements), exit),
            outgoing,
        ))
    }

    /// Decode one instruction, returning whether the next one was folded into it
    fn instruction(
        &mut self,
        offset: Offset,
        instruction: &Instruction,
        previous: Option<&Instruction>,
        next: Option<&Instruction>,
    ) -> Result<bool, Error> {
        use Instruction as I;

        match instruction {
            I::Nop => (),
            I::AConstNull => self.constant(ConstantValue::Null, false, offset),
            I::IConst(value) => self.constant(ConstantValue::Int(*value), false, offset),
            I::LConst(value) => self.constant(ConstantValue::Long(*value), true, offset),
            I::FConst(value) => self.constant(ConstantValue::Float(*value), false, offset),
            I::DConst(value) => self.constant(ConstantValue::Double(*value), true, offset),
            I::Ldc(constant) => {
                let (value, wide) = match constant {
                    Constant::Integer(value) => (ConstantValue::Int(*value), false),
                    Constant::Long(value) => (ConstantValue::Long(*value), true),
                    Constant::Float(value) => (ConstantValue::Float(*value), false),
                    Constant::Double(value) => (ConstantValue::Double(*value), true),
                    Constant::String(value) => (ConstantValue::String(value.clone()), false),
                    Constant::Class(class) => (ConstantValue::Class(class.clone()), false),
                };
                self.constant(value, wide, offset);
            }

            I::ALoad(0) if self.this_is_fixed => {
                let this = self
                    .arena
                    .leaf(Operator::This(self.method.class.clone()), offset);
                self.push(this, false);
            }
            I::ILoad(slot) | I::LLoad(slot) | I::FLoad(slot) | I::DLoad(slot) | I::ALoad(slot) => {
                let (typ, wide) = self.local_type(instruction);
                let load = self.load(Slot::Bytecode(*slot), typ, offset);
                self.push(load, wide);
            }
            I::IStore(slot) | I::LStore(slot) | I::FStore(slot) | I::DStore(slot) | I::AStore(slot) => {
                let (typ, wide) = self.local_type(instruction);
                let (value, twin) = self.pop_assigned(0, offset)?;
                if twin.is_none() {
                    self.flush_conflicts(Some(Slot::Bytecode(*slot)), offset)?;
                }
                let store = self.store(Slot::Bytecode(*slot), typ, value, wide, twin.is_some(), offset);
                self.finish_assignment(store, twin, wide);
            }
            I::IInc(slot, amount) => {
                let slot = Slot::Bytecode(*slot);
                self.flush_conflicts(Some(slot), offset)?;
                let amount = i32::from(*amount);
                let (op, magnitude) = if amount < 0 {
                    (BinaryOp::Sub, -amount)
                } else {
                    (BinaryOp::Add, amount)
                };
                let load = self.load(slot, Type::U_INT, offset);
                let constant = self
                    .arena
                    .leaf(Operator::Constant(ConstantValue::Int(magnitude)), offset);
                let sum = self.arena.push(
                    Operator::Binary(op, NumericFamily::Int),
                    vec![load, constant],
                    offset,
                );
                let store = self.store(slot, Type::U_INT, sum, false, false, offset);
                self.statements.push(StructuredBlock::Instruction(store));
            }

            I::IALoad | I::LALoad | I::FALoad | I::DALoad | I::AALoad | I::BALoad | I::CALoad
            | I::SALoad => {
                let (element, wide) = array_element(instruction);
                let index = self.pop_value(offset)?;
                let array = self.pop_value(offset)?;
                let load = self
                    .arena
                    .push(Operator::ArrayLoad(element), vec![array, index], offset);
                self.push(load, wide);
            }
            I::IAStore | I::LAStore | I::FAStore | I::DAStore | I::AAStore | I::BAStore
            | I::CAStore | I::SAStore => {
                let (element, wide) = array_element(instruction);
                let (value, twin) = self.pop_assigned(2, offset)?;
                let index = self.pop_value(offset)?;
                let array = self.pop_value(offset)?;
                let store = self.arena.push(
                    Operator::ArrayStore {
                        element,
                        value_used: twin.is_some(),
                    },
                    vec![array, index, value],
                    offset,
                );
                self.finish_effect(store, twin, wide, offset)?;
            }

            I::Pop => self.shuffle(StackOp::Pop, offset)?,
            I::Pop2 => self.shuffle(StackOp::Pop2, offset)?,
            I::Dup => self.shuffle(StackOp::Dup, offset)?,
            I::DupX1 => self.shuffle(StackOp::DupX1, offset)?,
            I::DupX2 => self.shuffle(StackOp::DupX2, offset)?,
            I::Dup2 => self.shuffle(StackOp::Dup2, offset)?,
            I::Dup2X1 => self.shuffle(StackOp::Dup2X1, offset)?,
            I::Dup2X2 => self.shuffle(StackOp::Dup2X2, offset)?,
            I::Swap => self.shuffle(StackOp::Swap, offset)?,

            I::INeg | I::LNeg | I::FNeg | I::DNeg => {
                let family = match instruction {
                    I::INeg => NumericFamily::Int,
                    I::LNeg => NumericFamily::Long,
                    I::FNeg => NumericFamily::Float,
                    _ => NumericFamily::Double,
                };
                let value = self.pop_value(offset)?;
                let negated = self.arena.push(Operator::Negate(family), vec![value], offset);
                self.push(negated, is_wide_family(family));
            }
            I::LCmp | I::FCmp(_) | I::DCmp(_) => {
                let (family, mode) = match instruction {
                    I::FCmp(mode) => (NumericFamily::Float, Some(*mode)),
                    I::DCmp(mode) => (NumericFamily::Double, Some(*mode)),
                    _ => (NumericFamily::Long, None::<CompareMode>),
                };
                let right = self.pop_value(offset)?;
                let left = self.pop_value(offset)?;
                let cmp = self
                    .arena
                    .push(Operator::Cmp(family, mode), vec![left, right], offset);
                self.push(cmp, false);
            }

            I::GetStatic(field) => {
                let wide = field.descriptor.is_wide();
                let access = FieldAccess {
                    field: field.clone(),
                    is_static: true,
                };
                let get = self.arena.leaf(Operator::FieldGet(access), offset);
                self.push(get, wide);
            }
            I::GetField(field) => {
                let wide = field.descriptor.is_wide();
                let object = self.pop_value(offset)?;
                let access = FieldAccess {
                    field: field.clone(),
                    is_static: false,
                };
                let get = self
                    .arena
                    .push(Operator::FieldGet(access), vec![object], offset);
                self.push(get, wide);
            }
            I::PutStatic(field) | I::PutField(field) => {
                let is_static = matches!(instruction, I::PutStatic(_));
                let wide = field.descriptor.is_wide();
                let (value, twin) = self.pop_assigned(usize::from(!is_static), offset)?;
                let mut children = vec![];
                if !is_static {
                    children.push(self.pop_value(offset)?);
                }
                children.push(value);
                let put = self.arena.push(
                    Operator::FieldPut {
                        access: FieldAccess {
                            field: field.clone(),
                            is_static,
                        },
                        value_used: twin.is_some(),
                    },
                    children,
                    offset,
                );
                self.finish_effect(put, twin, wide, offset)?;
            }

            I::Invoke(kind, method) => {
                let checks_null = self.resolve_stack_operations
                    && *kind == InvokeType::Virtual
                    && method.name == UnqualifiedName::GETCLASS
                    && method.descriptor.parameters.is_empty()
                    && previous == Some(&I::Dup)
                    && next == Some(&I::Pop);
                if checks_null && self.null_check(offset)? {
                    return Ok(true);
                }

                let arguments = self.pop_arguments(method.descriptor.parameters.len(), offset)?;
                if *kind == InvokeType::Static {
                    let call = self.arena.push(
                        Operator::Invoke {
                            kind: *kind,
                            method: method.clone(),
                        },
                        arguments,
                        offset,
                    );
                    self.call_result(call, method.descriptor.return_type.as_ref(), offset)?;
                    return Ok(false);
                }

                let receiver = self.pop_entry(offset)?;
                match receiver {
                    StackEntry::Uninitialized { class, created_at }
                        if *kind == InvokeType::Special && method.name == UnqualifiedName::INIT =>
                    {
                        self.construct(class, created_at, method.descriptor.clone(), arguments, offset)?;
                    }
                    receiver => {
                        let receiver = self.take_value(receiver, offset)?;
                        let mut children = vec![receiver];
                        children.extend(arguments);
                        let call = self.arena.push(
                            Operator::Invoke {
                                kind: *kind,
                                method: method.clone(),
                            },
                            children,
                            offset,
                        );
                        self.call_result(call, method.descriptor.return_type.as_ref(), offset)?;
                    }
                }
            }
            I::InvokeDynamic(name, descriptor) => {
                let arguments = self.pop_arguments(descriptor.parameters.len(), offset)?;
                let call = self.arena.push(
                    Operator::InvokeDynamic {
                        name: name.clone(),
                        descriptor: descriptor.clone(),
                    },
                    arguments,
                    offset,
                );
                self.call_result(call, descriptor.return_type.as_ref(), offset)?;
            }

            I::New(class) => self.stack.push(StackEntry::Uninitialized {
                class: class.clone(),
                created_at: offset,
            }),
            I::NewArray(base) => {
                self.new_array(RefType::array(FieldType::Base(*base)), 1, offset)?
            }
            I::ANewArray(element) => {
                self.new_array(RefType::array(FieldType::Ref(element.clone())), 1, offset)?
            }
            I::MultiANewArray(array, dimensions) => {
                self.new_array(array.clone(), *dimensions, offset)?
            }
            I::ArrayLength | I::CheckCast(_) | I::InstanceOf(_) => {
                let operator = match instruction {
                    I::CheckCast(typ) => Operator::CheckCast(typ.clone()),
                    I::InstanceOf(typ) => Operator::InstanceOf(typ.clone()),
                    _ => Operator::ArrayLength,
                };
                let value = self.pop_value(offset)?;
                let node = self.arena.push(operator, vec![value], offset);
                self.push(node, false);
            }
            I::MonitorEnter | I::MonitorExit => {
                let kind = if *instruction == I::MonitorEnter {
                    MonitorKind::Enter
                } else {
                    MonitorKind::Exit
                };
                let lock = self.pop_value(offset)?;
                let monitor = self.arena.push(Operator::Monitor(kind), vec![lock], offset);
                self.effect(monitor, offset)?;
            }

            I::I2L | I::I2F | I::I2D | I::L2I | I::L2F | I::L2D | I::F2I | I::F2L | I::F2D
            | I::D2I | I::D2L | I::D2F | I::I2B | I::I2C | I::I2S => {
                let (from, to) = conversion(instruction);
                let value = self.pop_value(offset)?;
                let converted = self
                    .arena
                    .push(Operator::Convert { from, to }, vec![value], offset);
                self.push(converted, to.is_wide());
            }

            other => match arithmetic(other) {
                Some((op, family)) => {
                    let right = self.pop_value(offset)?;
                    let left = self.pop_value(offset)?;
                    let node = self
                        .arena
                        .push(Operator::Binary(op, family), vec![left, right], offset);
                    self.push(node, is_wide_family(family));
                }
                None => {
                    return Err(Error::malformed(
                        offset,
                        format!("unexpected instruction {:?}", other),
                    ))
                }
            },
        }
        Ok(false)
    }

    /// Decode the branch closing the block, returning how control leaves it
    fn branch(&mut self, offset: Offset, branch: &BranchInstruction) -> Result<Exit, Error> {
        use BranchInstruction as B;

        let int = CompareFamily::Numeric(NumericFamily::Int);
        let exit = match branch {
            B::If(cmp, target, next) => {
                let value = self.pop_value(offset)?;
                let zero = self
                    .arena
                    .leaf(Operator::Constant(ConstantValue::Int(0)), offset);
                let condition = self.arena.push(
                    Operator::Compare((*cmp).into(), int),
                    vec![value, zero],
                    offset,
                );
                Exit::Branch {
                    condition,
                    then: *target,
                    otherwise: *next,
                }
            }
            B::IfNull(cmp, target, next) => {
                let value = self.pop_value(offset)?;
                let null = self.arena.leaf(Operator::Constant(ConstantValue::Null), offset);
                let condition = self.arena.push(
                    Operator::Compare((*cmp).into(), CompareFamily::Reference),
                    vec![value, null],
                    offset,
                );
                Exit::Branch {
                    condition,
                    then: *target,
                    otherwise: *next,
                }
            }
            B::IfICmp(cmp, target, next) => {
                self.compare_branch((*cmp).into(), int, *target, *next, offset)?
            }
            B::IfACmp(cmp, target, next) => self.compare_branch(
                (*cmp).into(),
                CompareFamily::Reference,
                *target,
                *next,
                offset,
            )?,
            B::Goto(target) | B::FallThrough(target) => Exit::Jump(*target),
            B::TableSwitch {
                default,
                low,
                targets,
            } => {
                let selector = self.pop_value(offset)?;
                let cases = targets
                    .iter()
                    .enumerate()
                    .map(|(index, target)| (low.wrapping_add(index as i32), *target))
                    .collect();
                Exit::Switch {
                    selector,
                    cases,
                    default: *default,
                }
            }
            B::LookupSwitch { default, targets } => {
                let selector = self.pop_value(offset)?;
                Exit::Switch {
                    selector,
                    cases: targets.clone(),
                    default: *default,
                }
            }
            B::IReturn | B::LReturn | B::FReturn | B::DReturn | B::AReturn => {
                let value = self.pop_value(offset)?;
                let descriptor = &self.method.descriptor;
                let returned = self.tcx.return_type(descriptor.return_type.as_ref());
                self.arena.require(value, self.tcx.sub_types(returned));
                self.discard_stack(offset)?;
                self.statements.push(StructuredBlock::Return(Some(value)));
                Exit::None
            }
            B::Return => {
                self.discard_stack(offset)?;
                self.statements.push(StructuredBlock::Return(None));
                Exit::None
            }
            B::AThrow => {
                let value = self.pop_value(offset)?;
                self.discard_stack(offset)?;
                self.statements.push(StructuredBlock::Throw(value));
                Exit::None
            }
        };
        Ok(exit)
    }

    // Stack

    fn push(&mut self, expr: ExprId, wide: bool) {
        self.stack.push(StackEntry::Value { expr, wide });
    }

    fn constant(&mut self, value: ConstantValue, wide: bool, offset: Offset) {
        let constant = self.arena.leaf(Operator::Constant(value), offset);
        self.push(constant, wide);
    }

    fn new_array(
        &mut self,
        array: RefType<BinaryName>,
        dimensions: u8,
        offset: Offset,
    ) -> Result<(), Error> {
        let lengths = self.pop_arguments(usize::from(dimensions), offset)?;
        let new = self
            .arena
            .push(Operator::NewArray { array, dimensions }, lengths, offset);
        self.push(new, false);
        Ok(())
    }

    fn compare_branch(
        &mut self,
        cmp: Comparison,
        family: CompareFamily,
        then: BlockId,
        otherwise: BlockId,
        offset: Offset,
    ) -> Result<Exit, Error> {
        let right = self.pop_value(offset)?;
        let left = self.pop_value(offset)?;
        let condition = self
            .arena
            .push(Operator::Compare(cmp, family), vec![left, right], offset);
        Ok(Exit::Branch {
            condition,
            then,
            otherwise,
        })
    }

    fn pop_entry(&mut self, offset: Offset) -> Result<StackEntry, Error> {
        self.stack
            .pop()
            .ok_or_else(|| Error::malformed(offset, "operand stack underflow"))
    }

    fn pop_value(&mut self, offset: Offset) -> Result<ExprId, Error> {
        let entry = self.pop_entry(offset)?;
        self.take_value(entry, offset)
    }

    /// Pop `count` values, returning them in the order they were pushed
    fn pop_arguments(&mut self, count: usize, offset: Offset) -> Result<Vec<ExprId>, Error> {
        let mut arguments = vec![];
        for _ in 0..count {
            arguments.push(self.pop_value(offset)?);
        }
        arguments.reverse();
        Ok(arguments)
    }

    /// Expression of a popped entry
    ///
    /// Consuming one of several copies spills the shared expression, since it will be used more
    /// than once.
    fn take_value(&mut self, entry: StackEntry, offset: Offset) -> Result<ExprId, Error> {
        match entry {
            StackEntry::Value { expr, .. } => Ok(expr),
            StackEntry::Shared { expr, copy, .. } => {
                if self.stack.iter().any(|other| other.copy() == Some(copy)) {
                    Ok(self.materialize(copy, expr, offset))
                } else {
                    Ok(expr)
                }
            }
            StackEntry::Uninitialized { class, .. } => Err(Error::malformed(
                offset,
                format!("instance of {} used before its constructor ran", class),
            )),
        }
    }

    /// Pop the value of an assignment that then pops `operands` more entries
    ///
    /// If the value was `dup`ed so that exactly one copy stays on the stack (as in `a = b = 1`),
    /// the position of that copy is returned. The assignment should then take the place of the
    /// copy instead of becoming a statement.
    fn pop_assigned(
        &mut self,
        operands: usize,
        offset: Offset,
    ) -> Result<(ExprId, Option<usize>), Error> {
        let entry = self.pop_entry(offset)?;
        if let StackEntry::Shared { expr, copy, .. } = entry {
            let twins: Vec<usize> = (0..self.stack.len())
                .filter(|index| self.stack[*index].copy() == Some(copy))
                .collect();
            let limit = self.stack.len().saturating_sub(operands);
            if let [twin] = twins.as_slice() {
                if *twin < limit {
                    return Ok((expr, Some(*twin)));
                }
            }
        }
        Ok((self.take_value(entry, offset)?, None))
    }

    fn finish_assignment(&mut self, store: ExprId, twin: Option<usize>, wide: bool) {
        match twin {
            Some(position) => self.stack[position] = StackEntry::Value { expr: store, wide },
            None => self.statements.push(StructuredBlock::Instruction(store)),
        }
    }

    fn finish_effect(
        &mut self,
        expr: ExprId,
        twin: Option<usize>,
        wide: bool,
        offset: Offset,
    ) -> Result<(), Error> {
        match twin {
            Some(position) => {
                self.stack[position] = StackEntry::Value { expr, wide };
                Ok(())
            }
            None => self.effect(expr, offset),
        }
    }

    /// Push the result of a call, or emit it as a statement if there is none
    fn call_result(
        &mut self,
        call: ExprId,
        return_type: Option<&FieldType<BinaryName>>,
        offset: Offset,
    ) -> Result<(), Error> {
        match return_type {
            Some(typ) => {
                self.push(call, typ.is_wide());
                Ok(())
            }
            None => self.effect(call, offset),
        }
    }

    /// `new C; dup; ...; invokespecial C.<init>` as one object creation
    fn construct(
        &mut self,
        class: BinaryName,
        created_at: Offset,
        constructor: crate::jvm::MethodDescriptor<BinaryName>,
        arguments: Vec<ExprId>,
        offset: Offset,
    ) -> Result<(), Error> {
        let new = self
            .arena
            .push(Operator::New { class, constructor }, arguments, offset);
        let pending = self.stack.iter().rposition(|entry| {
            matches!(entry, StackEntry::Uninitialized { created_at: at, .. } if *at == created_at)
        });
        match pending {
            Some(position) => {
                self.stack[position] = StackEntry::Value {
                    expr: new,
                    wide: false,
                };
                Ok(())
            }
            None => self.effect(new, offset),
        }
    }

    /// `dup; invokevirtual getClass; pop` as a null check of the value on the stack
    ///
    /// Returns `false` (leaving the stack alone) if the duplicated entries don't line up.
    fn null_check(&mut self, offset: Offset) -> Result<bool, Error> {
        let len = self.stack.len();
        if len < 2 {
            return Ok(false);
        }
        let value = match (&self.stack[len - 2], &self.stack[len - 1]) {
            (
                StackEntry::Shared { expr, copy: a, .. },
                StackEntry::Shared { copy: b, .. },
            ) if a == b => *expr,
            (StackEntry::Value { expr: original, .. }, StackEntry::Value { expr: copy, .. })
                if self.arena.deep_eq(*original, *copy) =>
            {
                self.arena.detach(*copy);
                *original
            }
            _ => return Ok(false),
        };
        self.stack.truncate(len - 2);
        let check = self.arena.push(Operator::CheckNull, vec![value], offset);
        self.push(check, false);
        Ok(true)
    }

    // Side effects

    /// Emit a statement with side effects
    fn effect(&mut self, expr: ExprId, offset: Offset) -> Result<(), Error> {
        self.flush_conflicts(None, offset)?;
        self.statements.push(StructuredBlock::Instruction(expr));
        Ok(())
    }

    /// Spill the pending values that a statement about to be emitted could change
    ///
    /// A store to a local conflicts with pending reads of that local. Any other side effect
    /// conflicts with pending values that read memory or have side effects of their own.
    fn flush_conflicts(&mut self, writes: Option<Slot>, offset: Offset) -> Result<(), Error> {
        for index in 0..self.stack.len() {
            let expr = match self.stack[index].expr() {
                Some(expr) => expr,
                None => continue,
            };
            let conflicts = match writes {
                Some(slot) => self.reads_slot(expr, slot),
                None => self.touches_memory(expr),
            };
            if conflicts {
                self.spill_at(index, offset);
            }
        }
        Ok(())
    }

    fn reads_slot(&self, expr: ExprId, slot: Slot) -> bool {
        self.arena.descendants(expr).into_iter().any(|id| {
            matches!(self.arena[id].operator, Operator::LocalLoad(local)
                if self.locals.variable(local).slot == slot)
        })
    }

    fn touches_memory(&self, expr: ExprId) -> bool {
        self.arena.descendants(expr).into_iter().any(|id| {
            matches!(
                self.arena[id].operator,
                Operator::FieldGet(_)
                    | Operator::FieldPut { .. }
                    | Operator::ArrayLoad(_)
                    | Operator::ArrayStore { .. }
                    | Operator::ArrayLength
                    | Operator::LocalStore { .. }
                    | Operator::Invoke { .. }
                    | Operator::InvokeDynamic { .. }
                    | Operator::New { .. }
                    | Operator::NewArray { .. }
                    | Operator::Monitor(_)
            )
        })
    }

    /// Replace the stack entry at `index` by a load of a temporary holding its value
    fn spill_at(&mut self, index: usize, offset: Offset) {
        match self.stack[index].clone() {
            StackEntry::Value { expr, wide } => {
                let temp = self.locals.create_temporary();
                self.assign_temporary(temp, expr, offset);
                let load = self.load_temporary(temp, offset);
                self.stack[index] = StackEntry::Value { expr: load, wide };
            }
            StackEntry::Shared { expr, copy, .. } => {
                let load = self.materialize(copy, expr, offset);
                self.arena.detach(load);
            }
            StackEntry::Uninitialized { .. } => (),
        }
    }

    /// Assign a shared expression to a temporary, replacing every copy with a load of it
    ///
    /// Returns one more load, for the copy being consumed.
    fn materialize(&mut self, copy: usize, expr: ExprId, offset: Offset) -> ExprId {
        let temp = self.locals.create_temporary();
        self.assign_temporary(temp, expr, offset);
        for index in 0..self.stack.len() {
            if let StackEntry::Shared { copy: c, wide, .. } = self.stack[index] {
                if c == copy {
                    let load = self.load_temporary(temp, offset);
                    self.stack[index] = StackEntry::Value { expr: load, wide };
                }
            }
        }
        self.load_temporary(temp, offset)
    }

    fn assign_temporary(&mut self, temp: LocalId, value: ExprId, offset: Offset) {
        let store = self.arena.push(
            Operator::LocalStore {
                local: temp,
                value_used: false,
            },
            vec![value],
            offset,
        );
        self.locals.add_write(temp, store);
        self.statements.push(StructuredBlock::Instruction(store));
    }

    fn load_temporary(&mut self, temp: LocalId, offset: Offset) -> ExprId {
        let load = self.arena.leaf(Operator::LocalLoad(temp), offset);
        self.locals.add_read(temp, load);
        load
    }

    // Local variables

    /// Fresh variable for a single load of a slot
    fn load(&mut self, slot: Slot, typ: Type<'g>, offset: Offset) -> ExprId {
        let local = self.locals.create(slot, typ);
        let load = self.arena.leaf(Operator::LocalLoad(local), offset);
        self.locals.add_read(local, load);
        self.accesses.push(LocalAccess {
            slot,
            local,
            kind: AccessKind::Load,
            expr: load,
            wide: false,
        });
        load
    }

    /// Fresh variable for a single store to a slot
    fn store(
        &mut self,
        slot: Slot,
        typ: Type<'g>,
        value: ExprId,
        wide: bool,
        value_used: bool,
        offset: Offset,
    ) -> ExprId {
        let local = self.locals.create(slot, typ);
        let store = self
            .arena
            .push(Operator::LocalStore { local, value_used }, vec![value], offset);
        self.locals.add_write(local, store);
        self.accesses.push(LocalAccess {
            slot,
            local,
            kind: AccessKind::Store,
            expr: store,
            wide,
        });
        store
    }

    fn local_type(&self, instruction: &Instruction) -> (Type<'g>, bool) {
        match instruction {
            Instruction::LLoad(_) | Instruction::LStore(_) => (Type::LONG, true),
            Instruction::FLoad(_) | Instruction::FStore(_) => (Type::FLOAT, false),
            Instruction::DLoad(_) | Instruction::DStore(_) => (Type::DOUBLE, true),
            Instruction::ALoad(_) | Instruction::AStore(_) => (self.tcx.any_reference(), false),
            _ => (Type::BOOL_U_INT, false),
        }
    }

    // Stack shuffles

    fn pop_words(&mut self, words: usize, offset: Offset) -> Result<Vec<StackEntry>, Error> {
        let mut entries = vec![];
        let mut popped = 0;
        while popped < words {
            let entry = self.pop_entry(offset)?;
            popped += entry.words();
            entries.push(entry);
        }
        if popped != words {
            return Err(Error::malformed(
                offset,
                "stack operation splits a long or double",
            ));
        }
        entries.reverse();
        Ok(entries)
    }

    fn shuffle(&mut self, op: StackOp, offset: Offset) -> Result<(), Error> {
        // (words copied, words skipped under the copy)
        let (copied, skipped) = match op {
            StackOp::Pop => (1, 0),
            StackOp::Pop2 => (2, 0),
            StackOp::Dup => (1, 0),
            StackOp::DupX1 => (1, 1),
            StackOp::DupX2 => (1, 2),
            StackOp::Dup2 => (2, 0),
            StackOp::Dup2X1 => (2, 1),
            StackOp::Dup2X2 => (2, 2),
            StackOp::Swap => (1, 1),
        };
        let top = self.pop_words(copied, offset)?;
        let under = self.pop_words(skipped, offset)?;

        // Inputs are the popped entries (bottom first); the arrangement lists which input ends up
        // at each position of the result
        let (top_start, top_len) = (under.len(), top.len());
        let mut inputs = under;
        inputs.extend(top);
        let top_indices: Vec<usize> = (top_start..top_start + top_len).collect();
        let under_indices: Vec<usize> = (0..top_start).collect();
        let arrangement: Vec<usize> = match op {
            StackOp::Pop | StackOp::Pop2 => vec![],
            StackOp::Swap => {
                if inputs.iter().any(StackEntry::is_wide) {
                    return Err(Error::malformed(offset, "swap of a long or double"));
                }
                vec![1, 0]
            }
            _ => top_indices
                .iter()
                .chain(under_indices.iter())
                .chain(top_indices.iter())
                .copied()
                .collect(),
        };

        let unresolvable = inputs
            .iter()
            .any(|entry| matches!(entry, StackEntry::Uninitialized { .. }));
        if self.resolve_stack_operations || unresolvable {
            self.resolve_shuffle(op, inputs, top_start, &arrangement, offset)
        } else {
            self.keep_shuffle(op, inputs, &arrangement, offset)
        }
    }

    /// Rearrange the symbolic stack to match a shuffle
    fn resolve_shuffle(
        &mut self,
        op: StackOp,
        inputs: Vec<StackEntry>,
        skipped: usize,
        arrangement: &[usize],
        offset: Offset,
    ) -> Result<(), Error> {
        if matches!(op, StackOp::Pop | StackOp::Pop2) {
            for entry in inputs {
                if let StackEntry::Uninitialized { .. } = entry {
                    continue;
                }
                let value = self.take_value(entry, offset)?;
                if self.is_simple(value) {
                    self.arena.detach(value);
                } else {
                    self.effect(value, offset)?;
                }
            }
            return Ok(());
        }

        // A copy of the top group ends up under the skipped entries, so skipped entries with
        // effects get evaluated up front when the top group has effects too
        let base = self.stack.len();
        self.stack.extend(inputs);
        let top_has_effects = (base + skipped..self.stack.len()).any(|i| !self.entry_is_simple(i));
        if top_has_effects {
            for index in base..base + skipped {
                if !self.entry_is_simple(index) {
                    self.spill_at(index, offset);
                }
            }
        }
        let inputs: Vec<StackEntry> = self.stack.drain(base..).collect();

        // Entries appearing twice in the result get duplicated
        let mut first_copy: Vec<Option<StackEntry>> = vec![None; inputs.len()];
        let mut second_copy: Vec<Option<StackEntry>> = vec![None; inputs.len()];
        for (index, entry) in inputs.into_iter().enumerate() {
            if arrangement.iter().filter(|i| **i == index).count() > 1 {
                let (a, b) = self.duplicate(entry, offset);
                first_copy[index] = Some(a);
                second_copy[index] = Some(b);
            } else {
                first_copy[index] = Some(entry);
            }
        }
        for index in arrangement {
            let entry = first_copy[*index]
                .take()
                .or_else(|| second_copy[*index].take())
                .ok_or_else(|| Error::malformed(offset, "inconsistent stack operation"))?;
            self.stack.push(entry);
        }
        Ok(())
    }

    fn duplicate(&mut self, entry: StackEntry, offset: Offset) -> (StackEntry, StackEntry) {
        match entry {
            StackEntry::Value { expr, wide } if self.is_simple(expr) => {
                let copy = self.arena.deep_clone(expr);
                if let Operator::LocalLoad(local) = self.arena[copy].operator {
                    self.locals.add_read(local, copy);
                    let slot = self.locals.variable(local).slot;
                    self.accesses.push(LocalAccess {
                        slot,
                        local,
                        kind: AccessKind::Load,
                        expr: copy,
                        wide: false,
                    });
                }
                self.arena[copy].address = offset;
                (
                    StackEntry::Value { expr, wide },
                    StackEntry::Value { expr: copy, wide },
                )
            }
            StackEntry::Value { expr, wide } => {
                let copy = self.next_copy;
                self.next_copy += 1;
                let shared = StackEntry::Shared { expr, wide, copy };
                (shared.clone(), shared)
            }
            other => (other.clone(), other),
        }
    }

    /// Keep a shuffle as an explicit block over stack slot variables
    ///
    /// The inputs are stored into the variables of their stack depths, and the shuffle itself
    /// becomes the assignments of the rearranged values (all reads happen before the writes).
    fn keep_shuffle(
        &mut self,
        op: StackOp,
        inputs: Vec<StackEntry>,
        arrangement: &[usize],
        offset: Offset,
    ) -> Result<(), Error> {
        let base = self.stack.len();
        let mut widths = vec![];
        for (index, entry) in inputs.into_iter().enumerate() {
            let wide = entry.is_wide();
            let value = self.take_value(entry, offset)?;
            let slot = Slot::Stack((base + index) as u16);
            let store = self.store(slot, Type::Unknown, value, wide, false, offset);
            self.statements.push(StructuredBlock::Instruction(store));
            widths.push(wide);
        }

        let reads: Vec<ExprId> = arrangement
            .iter()
            .map(|index| self.load(Slot::Stack((base + index) as u16), Type::Unknown, offset))
            .collect();
        let mut moves = vec![];
        for (position, (read, index)) in reads.into_iter().zip(arrangement).enumerate() {
            let slot = Slot::Stack((base + position) as u16);
            moves.push(self.store(slot, Type::Unknown, read, widths[*index], false, offset));
        }
        self.statements.push(StructuredBlock::Special { op, moves });

        for (position, index) in arrangement.iter().enumerate() {
            let slot = Slot::Stack((base + position) as u16);
            let load = self.load(slot, Type::Unknown, offset);
            self.push(load, widths[*index]);
        }
        Ok(())
    }

    fn is_simple(&self, expr: ExprId) -> bool {
        let node = &self.arena[expr];
        node.operator.is_simple() && node.children.is_empty()
    }

    fn entry_is_simple(&self, index: usize) -> bool {
        match &self.stack[index] {
            StackEntry::Value { expr, .. } => self.is_simple(*expr),
            StackEntry::Shared { .. } => false,
            StackEntry::Uninitialized { .. } => true,
        }
    }

    // End of block

    /// Pass the values left on the stack on to the successors
    fn spill_stack(&mut self, offset: Offset) -> Result<Vec<EntryShape>, Error> {
        for index in 0..self.stack.len() {
            if let StackEntry::Shared { .. } = self.stack[index] {
                self.spill_at(index, offset);
            }
        }

        let mut shapes = vec![];
        for (depth, entry) in std::mem::take(&mut self.stack).into_iter().enumerate() {
            match entry {
                StackEntry::Value { expr, wide } | StackEntry::Shared { expr, wide, .. } => {
                    let slot = Slot::Stack(depth as u16);
                    let store = self.store(slot, Type::Unknown, expr, wide, false, offset);
                    self.statements.push(StructuredBlock::Instruction(store));
                    shapes.push(EntryShape::Value { wide });
                }
                StackEntry::Uninitialized { class, created_at } => {
                    shapes.push(EntryShape::Uninitialized { class, created_at });
                }
            }
        }
        Ok(shapes)
    }

    /// Evaluate whatever is left on the stack of a block that returns or throws
    fn discard_stack(&mut self, offset: Offset) -> Result<(), Error> {
        for index in 0..self.stack.len() {
            if let StackEntry::Shared { .. } = self.stack[index] {
                self.spill_at(index, offset);
            }
        }
        for entry in std::mem::take(&mut self.stack) {
            if let Some(expr) = entry.expr() {
                if self.is_simple(expr) {
                    self.arena.detach(expr);
                } else {
                    self.statements.push(StructuredBlock::Instruction(expr));
                }
            }
        }
        Ok(())
    }
}

/// Type of exception each handler block receives
///
/// A handler shared by entries catching different classes receives a `Throwable`.
fn handler_types(code: &Code) -> BTreeMap<BlockId, Option<BinaryName>> {
    let mut types: BTreeMap<BlockId, Option<BinaryName>> = BTreeMap::new();
    for handler in &code.exception_table {
        types
            .entry(handler.handler)
            .and_modify(|catch_type| {
                if *catch_type != handler.catch_type {
                    *catch_type = None;
                }
            })
            .or_insert_with(|| handler.catch_type.clone());
    }
    types
}

/// Handler regions over the decoded blocks, merging entries for the same handler and class
fn handler_regions(code: &Code, graph: &FlowGraph) -> Vec<HandlerRegion> {
    let mut regions: Vec<HandlerRegion> = vec![];
    for handler in &code.exception_table {
        if !graph.nodes.contains_key(&handler.handler) {
            continue;
        }
        let protected: BTreeSet<BlockId> = graph
            .nodes
            .keys()
            .filter(|block| handler.covers(**block) && **block != handler.handler)
            .copied()
            .collect();
        if protected.is_empty() {
            continue;
        }
        let existing = regions.iter_mut().find(|region| {
            region.handler == handler.handler && region.catch_type == handler.catch_type
        });
        match existing {
            Some(region) => region.protected.extend(protected),
            None => regions.push(HandlerRegion {
                protected,
                handler: handler.handler,
                catch_type: handler.catch_type.clone(),
            }),
        }
    }
    regions
}

fn is_wide_family(family: NumericFamily) -> bool {
    matches!(family, NumericFamily::Long | NumericFamily::Double)
}

fn array_element(instruction: &Instruction) -> (ArrayElement, bool) {
    let kinds = match instruction {
        Instruction::IALoad | Instruction::IAStore => PrimitiveKinds::INT,
        Instruction::LALoad | Instruction::LAStore => PrimitiveKinds::LONG,
        Instruction::FALoad | Instruction::FAStore => PrimitiveKinds::FLOAT,
        Instruction::DALoad | Instruction::DAStore => PrimitiveKinds::DOUBLE,
        Instruction::BALoad | Instruction::BAStore => PrimitiveKinds::BOOL_BYTE,
        Instruction::CALoad | Instruction::CAStore => PrimitiveKinds::CHAR,
        Instruction::SALoad | Instruction::SAStore => PrimitiveKinds::SHORT,
        _ => return (ArrayElement::Reference, false),
    };
    let wide = kinds == PrimitiveKinds::LONG || kinds == PrimitiveKinds::DOUBLE;
    (ArrayElement::Primitive(kinds), wide)
}

fn conversion(instruction: &Instruction) -> (BaseType, BaseType) {
    use BaseType::*;
    match instruction {
        Instruction::I2L => (Int, Long),
        Instruction::I2F => (Int, Float),
        Instruction::I2D => (Int, Double),
        Instruction::L2I => (Long, Int),
        Instruction::L2F => (Long, Float),
        Instruction::L2D => (Long, Double),
        Instruction::F2I => (Float, Int),
        Instruction::F2L => (Float, Long),
        Instruction::F2D => (Float, Double),
        Instruction::D2I => (Double, Int),
        Instruction::D2L => (Double, Long),
        Instruction::D2F => (Double, Float),
        Instruction::I2B => (Int, Byte),
        Instruction::I2C => (Int, Char),
        _ => (Int, Short),
    }
}

fn arithmetic(instruction: &Instruction) -> Option<(BinaryOp, NumericFamily)> {
    use BinaryOp::*;
    use Instruction as I;
    use NumericFamily::{Double as D, Float as F, Int as Ii, Long as L};

    let shift = |typ: &ShiftType| match typ {
        ShiftType::Left => Shl,
        ShiftType::ArithmeticRight => Shr,
        ShiftType::LogicalRight => UShr,
    };
    let op = match instruction {
        I::IAdd => (Add, Ii),
        I::LAdd => (Add, L),
        I::FAdd => (Add, F),
        I::DAdd => (Add, D),
        I::ISub => (Sub, Ii),
        I::LSub => (Sub, L),
        I::FSub => (Sub, F),
        I::DSub => (Sub, D),
        I::IMul => (Mul, Ii),
        I::LMul => (Mul, L),
        I::FMul => (Mul, F),
        I::DMul => (Mul, D),
        I::IDiv => (Div, Ii),
        I::LDiv => (Div, L),
        I::FDiv => (Div, F),
        I::DDiv => (Div, D),
        I::IRem => (Rem, Ii),
        I::LRem => (Rem, L),
        I::FRem => (Rem, F),
        I::DRem => (Rem, D),
        I::ISh(typ) => (shift(typ), Ii),
        I::LSh(typ) => (shift(typ), L),
        I::IAnd => (And, Ii),
        I::LAnd => (And, L),
        I::IOr => (Or, Ii),
        I::LOr => (Or, L),
        I::IXor => (Xor, Ii),
        I::LXor => (Xor, L),
        _ => return None,
    };
    Some(op)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::{ClassGraph, ClassGraphArenas, HierarchyMap};
    use crate::jvm::code::listing::Listing;
    use crate::types::TypeArenas;

    fn decode_listing<'g>(
        tcx: TypeContext<'g>,
        source: &str,
        resolve: bool,
    ) -> (Decoded, ExprArena<'g>, LocalTable<'g>) {
        let listing = Listing::parse(source).unwrap();
        let method = &listing.methods[0];
        let mut arena = ExprArena::new();
        let mut locals = LocalTable::new();
        let decoded = Decoder::new(tcx, method, &mut arena, &mut locals, resolve)
            .decode()
            .unwrap();
        (decoded, arena, locals)
    }

    fn roots(node: &FlowNode) -> Vec<ExprId> {
        node.block.expressions()
    }

    #[test]
    fn assignment_chains() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        // a = b = x + 1
        let source = "
            .method static f(I)V
                iload_0
                iconst_1
                iadd
                dup
                istore_1
                istore_2
                return
            .end
        ";
        let (decoded, arena, _) = decode_listing(tcx, source, true);
        let node = &decoded.graph.nodes[&BlockId(0)];
        let statements = roots(node);
        assert_eq!(statements.len(), 1, "one statement for the chained assignment");
        let outer = &arena[statements[0]];
        assert!(matches!(outer.operator, Operator::LocalStore { value_used: false, .. }));
        let inner = &arena[outer.children[0]];
        assert!(matches!(inner.operator, Operator::LocalStore { value_used: true, .. }));
    }

    #[test]
    fn object_creation_and_null_checks() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        let source = "
            .method static f(Ljava/lang/Object;)Ljava/util/List;
                aload_0
                dup
                invokevirtual java/lang/Object.getClass ()Ljava/lang/Class;
                pop
                astore_1
                new java/util/ArrayList
                dup
                invokespecial java/util/ArrayList.<init> ()V
                areturn
            .end
        ";
        let (decoded, arena, _) = decode_listing(tcx, source, true);
        let node = &decoded.graph.nodes[&BlockId(0)];
        let statements = roots(node);
        assert_eq!(statements.len(), 2);
        let store = &arena[statements[0]];
        assert_eq!(arena[store.children[0]].operator, Operator::CheckNull);
        assert!(matches!(arena[statements[1]].operator, Operator::New { .. }));
    }

    #[test]
    fn values_cross_blocks_in_stack_variables() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        // return flag ? 1 : 2
        let source = "
            .method static f(Z)I
                iload_0
                ifeq Two
                iconst_1
                goto End
            Two:
                iconst_2
            End:
                ireturn
            .end
        ";
        let (decoded, _, locals) = decode_listing(tcx, source, true);
        assert_eq!(decoded.graph.nodes.len(), 4);
        let stack_accesses = decoded
            .accesses
            .values()
            .flat_map(|block| block.accesses.iter())
            .filter(|access| access.slot == Slot::Stack(0))
            .count();
        assert_eq!(stack_accesses, 3, "two spills and one reload");
        assert_eq!(decoded.entry_definitions.len(), 1);
        assert!(locals.variable(decoded.entry_definitions[0].1).is_parameter);
    }

    #[test]
    fn kept_stack_operations() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        let source = "
            .method static f(II)I
                iload_0
                iload_1
                swap
                isub
                ireturn
            .end
        ";
        let (decoded, _, _) = decode_listing(tcx, source, false);
        let node = &decoded.graph.nodes[&BlockId(0)];
        let special = node
            .block
            .statements()
            .iter()
            .find(|s| matches!(s, StructuredBlock::Special { .. }));
        match special {
            Some(StructuredBlock::Special { op, moves }) => {
                assert_eq!(*op, StackOp::Swap);
                assert_eq!(moves.len(), 2);
            }
            _ => panic!("swap should be kept"),
        }
    }

    #[test]
    fn malformed_code() {
        let class_arenas = ClassGraphArenas::new();
        let graph = ClassGraph::new(&class_arenas, Box::new(HierarchyMap::with_java_library()));
        let type_arenas = TypeArenas::new();
        let tcx = TypeContext::new(&graph, &type_arenas);

        let listing = Listing::parse(
            "
            .method static f()I
                iadd
                ireturn
            .end
            ",
        )
        .unwrap();
        let mut arena = ExprArena::new();
        let mut locals = LocalTable::new();
        let result = Decoder::new(tcx, &listing.methods[0], &mut arena, &mut locals, true).decode();
        assert!(matches!(result, Err(Error::MalformedCode { .. })));
    }
}
