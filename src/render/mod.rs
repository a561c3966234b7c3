//! Java-like rendering of decompiled methods
//!
//! The output is meant for reading and for tests, not for recompiling: variables are declared up
//! front, unresolved stack operations and unstructured jumps are shown as pseudo-statements.

mod writer;

pub use writer::JavaWriter;

use crate::decompile::MethodOutput;
use crate::expr::{BinaryOp, ConstantValue, ExprId, MonitorKind, Operator};
use crate::flow::{Catch, Label, LoopKind, StructuredBlock};
use crate::jvm::code::{CompareMode, InvokeType};
use crate::jvm::{BinaryName, FieldType, RefType, UnqualifiedName};
use crate::locals::LocalId;
use crate::types::{PrimitiveKinds, Type};
use std::fmt::{self, Write};

/// Displays a decompiled method as Java-like source
pub struct Rendered<'o, 'g>(pub &'o MethodOutput<'g>);

impl<'o, 'g> fmt::Display for Rendered<'o, 'g> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut writer = JavaWriter::new(f);
        Renderer {
            output: self.0,
            breakable: vec![],
        }
        .method(&mut writer)
    }
}

/// Render a method into a string
pub fn render_method(output: &MethodOutput<'_>) -> String {
    Rendered(output).to_string()
}

// Operator precedence, loosest first
const ASSIGNMENT: u8 = 1;
const LOGICAL_OR: u8 = 3;
const LOGICAL_AND: u8 = 4;
const BIT_OR: u8 = 5;
const BIT_XOR: u8 = 6;
const BIT_AND: u8 = 7;
const EQUALITY: u8 = 8;
const RELATIONAL: u8 = 9;
const SHIFT: u8 = 10;
const ADDITIVE: u8 = 11;
const MULTIPLICATIVE: u8 = 12;
const UNARY: u8 = 13;
const POSTFIX: u8 = 14;

/// Enclosing construct that a bare `break` (or `continue`) would leave
#[derive(Copy, Clone)]
struct Breakable {
    label: Label,
    is_loop: bool,
}

struct Renderer<'o, 'g> {
    output: &'o MethodOutput<'g>,

    /// Loops and switches around the statement being rendered, innermost last
    breakable: Vec<Breakable>,
}

impl<'o, 'g> Renderer<'o, 'g> {
    fn method<W: Write>(&mut self, w: &mut JavaWriter<W>) -> fmt::Result {
        let output = self.output;
        if output.is_static() {
            w.write_str("static ")?;
        }
        let is_constructor = output.name == UnqualifiedName::INIT;
        if is_constructor {
            write!(w, "{}(", output.class.simple_name())?;
        } else {
            let return_type = match &output.descriptor.return_type {
                Some(typ) => typ.to_string(),
                None => String::from("void"),
            };
            write!(w, "{} {}(", return_type, output.name)?;
        }

        let parameters: Vec<_> = output.parameters().collect();
        for (index, typ) in output.descriptor.parameters.iter().enumerate() {
            if index > 0 {
                w.write_str(", ")?;
            }
            match parameters.get(index) {
                Some(parameter) => write!(w, "{} {}", typ, parameter.name)?,
                None => write!(w, "{} arg{}", typ, index)?,
            }
        }
        w.write_str(")")?;
        w.open_curly_block()?;

        let caught = self.caught_locals();
        let hoisted = output
            .locals
            .iter()
            .filter(|local| !local.is_parameter)
            .filter(|local| !(local.is_final && caught.contains(&local.id)));
        for local in hoisted {
            if local.is_final {
                w.write_str("final ")?;
            }
            writeln!(w, "{} {};", type_name(local.declared), local.name)?;
        }
        self.block(w, &output.root)?;
        w.close_curly_block(None)
    }

    fn block<W: Write>(&mut self, w: &mut JavaWriter<W>, block: &StructuredBlock) -> fmt::Result {
        match block {
            StructuredBlock::Empty => Ok(()),
            StructuredBlock::Instruction(expr) => writeln!(w, "{};", self.expr(*expr, 0)),
            StructuredBlock::Sequence(blocks) => {
                for block in blocks {
                    self.block(w, block)?;
                }
                Ok(())
            }
            StructuredBlock::If {
                condition,
                then,
                otherwise,
            } => {
                write!(w, "if ({})", self.expr(*condition, 0))?;
                w.open_curly_block()?;
                self.block(w, then)?;
                let mut otherwise = otherwise.as_deref();
                while let Some(next) = otherwise {
                    match next {
                        StructuredBlock::If {
                            condition,
                            then,
                            otherwise: rest,
                        } => {
                            let header = format!("else if ({})", self.expr(*condition, 0));
                            w.close_curly_block(Some(&header))?;
                            w.open_curly_block()?;
                            self.block(w, then)?;
                            otherwise = rest.as_deref();
                        }
                        other => {
                            w.close_curly_block(Some("else"))?;
                            w.open_curly_block()?;
                            self.block(w, other)?;
                            otherwise = None;
                        }
                    }
                }
                w.close_curly_block(None)
            }
            StructuredBlock::Loop {
                label,
                kind,
                condition,
                body,
            } => {
                if self.needs_label(body, *label) {
                    writeln!(w, "{}:", label)?;
                }
                let condition = (*condition).map(|c| self.expr(c, 0));
                let condition = condition.as_deref().unwrap_or("true");
                match kind {
                    LoopKind::DoWhile => w.write_str("do")?,
                    LoopKind::While | LoopKind::Infinite => write!(w, "while ({})", condition)?,
                }
                w.open_curly_block()?;
                self.breakable.push(Breakable {
                    label: *label,
                    is_loop: true,
                });
                self.block(w, body)?;
                self.breakable.pop();
                match kind {
                    LoopKind::DoWhile => {
                        let footer = format!("while ({});", condition);
                        w.close_curly_block(Some(&footer))?;
                        w.end_line()
                    }
                    LoopKind::While | LoopKind::Infinite => w.close_curly_block(None),
                }
            }
            StructuredBlock::Switch {
                label,
                selector,
                cases,
            } => {
                if cases.iter().any(|case| self.needs_label(&case.body, *label)) {
                    writeln!(w, "{}:", label)?;
                }
                write!(w, "switch ({})", self.expr(*selector, 0))?;
                w.open_curly_block()?;
                w.indent();
                self.breakable.push(Breakable {
                    label: *label,
                    is_loop: false,
                });
                for case in cases {
                    for value in &case.values {
                        w.outdented(&format!("case {}:", value))?;
                    }
                    if case.is_default {
                        w.outdented("default:")?;
                    }
                    self.block(w, &case.body)?;
                }
                self.breakable.pop();
                w.dedent();
                w.close_curly_block(None)
            }
            StructuredBlock::TryCatch {
                body,
                catches,
                finally,
            } => {
                w.write_str("try")?;
                w.open_curly_block()?;
                self.block(w, body)?;
                for catch in catches {
                    let header = self.catch_header(catch);
                    w.close_curly_block(Some(&header))?;
                    w.open_curly_block()?;
                    self.block(w, &catch.body)?;
                }
                if let Some(finally) = finally {
                    w.close_curly_block(Some("finally"))?;
                    w.open_curly_block()?;
                    self.block(w, finally)?;
                }
                w.close_curly_block(None)
            }
            StructuredBlock::Labeled { label, body } => {
                write!(w, "{}:", label)?;
                w.open_curly_block()?;
                self.block(w, body)?;
                w.close_curly_block(None)
            }
            StructuredBlock::Break(label) => {
                if self.innermost(false) == Some(*label) {
                    writeln!(w, "break;")
                } else {
                    writeln!(w, "break {};", label)
                }
            }
            StructuredBlock::Continue(label) => {
                if self.innermost(true) == Some(*label) {
                    writeln!(w, "continue;")
                } else {
                    writeln!(w, "continue {};", label)
                }
            }
            StructuredBlock::Return(None) => writeln!(w, "return;"),
            StructuredBlock::Return(Some(value)) => {
                writeln!(w, "return {};", self.expr(*value, 0))
            }
            StructuredBlock::Throw(value) => writeln!(w, "throw {};", self.expr(*value, 0)),
            StructuredBlock::Jump(target) => writeln!(w, "goto {};", target),
            StructuredBlock::Special { op, moves } => {
                let moves: Vec<String> = moves.iter().map(|m| self.expr(*m, 0)).collect();
                writeln!(w, "{}({});", op.mnemonic(), moves.join(", "))
            }
            StructuredBlock::Unstructured(blocks) => {
                for (id, block) in blocks {
                    w.outdented(&format!("{}:", id))?;
                    self.block(w, block)?;
                }
                Ok(())
            }
        }
    }

    /// Variables bound by a `catch`, which declares them itself
    fn caught_locals(&self) -> Vec<LocalId> {
        let arena = &self.output.arena;
        let mut caught = vec![];
        self.output.root.visit(&mut |block| {
            if let StructuredBlock::TryCatch { catches, .. } = block {
                caught.extend(
                    catches
                        .iter()
                        .filter_map(|catch| catch.binding)
                        .filter_map(|binding| arena[binding].operator.local()),
                );
            }
        });
        caught
    }

    fn catch_header(&self, catch: &Catch) -> String {
        let class = catch
            .catch_type
            .as_ref()
            .map_or(String::from("java.lang.Throwable"), |class| class.to_string());
        let name = catch
            .binding
            .and_then(|binding| self.output.arena[binding].operator.local())
            .map_or(String::from("ignored"), |local| self.name(local));
        format!("catch ({} {})", class, name)
    }

    /// Would a `break` or `continue` to `label` inside `body` have to spell the label out?
    ///
    /// A `continue` only skips over loops, so a switch between it and its loop doesn't count.
    fn needs_label(&self, body: &StructuredBlock, label: Label) -> bool {
        fn walk(block: &StructuredBlock, label: Label, loops: usize, switches: usize) -> bool {
            match block {
                StructuredBlock::Break(l) => *l == label && (loops + switches) > 0,
                StructuredBlock::Continue(l) => *l == label && loops > 0,
                StructuredBlock::Loop { body, .. } => walk(body, label, loops + 1, switches),
                StructuredBlock::Switch { cases, .. } => cases
                    .iter()
                    .any(|case| walk(&case.body, label, loops, switches + 1)),
                StructuredBlock::Sequence(blocks) => {
                    blocks.iter().any(|b| walk(b, label, loops, switches))
                }
                StructuredBlock::If {
                    then, otherwise, ..
                } => {
                    walk(then, label, loops, switches)
                        || otherwise
                            .as_deref()
                            .map_or(false, |b| walk(b, label, loops, switches))
                }
                StructuredBlock::TryCatch {
                    body,
                    catches,
                    finally,
                } => {
                    walk(body, label, loops, switches)
                        || catches
                            .iter()
                            .any(|catch| walk(&catch.body, label, loops, switches))
                        || finally
                            .as_deref()
                            .map_or(false, |b| walk(b, label, loops, switches))
                }
                StructuredBlock::Labeled { body, .. } => walk(body, label, loops, switches),
                StructuredBlock::Unstructured(blocks) => {
                    blocks.iter().any(|(_, b)| walk(b, label, loops, switches))
                }
                _ => false,
            }
        }

        walk(body, label, 0, 0)
    }

    fn innermost(&self, loops_only: bool) -> Option<Label> {
        self.breakable
            .iter()
            .rev()
            .find(|breakable| breakable.is_loop || !loops_only)
            .map(|breakable| breakable.label)
    }

    fn name(&self, local: LocalId) -> String {
        self.output
            .local(local)
            .map_or_else(|| local.to_string(), |summary| summary.name.clone())
    }

    /// Render an expression, parenthesized if it binds looser than `context`
    fn expr(&self, id: ExprId, context: u8) -> String {
        let (text, precedence) = self.expr_text(id);
        if precedence < context {
            format!("({})", text)
        } else {
            text
        }
    }

    fn args(&self, children: &[ExprId]) -> String {
        let args: Vec<String> = children.iter().map(|c| self.expr(*c, ASSIGNMENT)).collect();
        args.join(", ")
    }

    fn expr_text(&self, id: ExprId) -> (String, u8) {
        let node = &self.output.arena[id];
        let children = &node.children;
        let child = |index: usize, context: u8| -> String {
            children
                .get(index)
                .map_or_else(|| String::from("<missing>"), |c| self.expr(*c, context))
        };

        match &node.operator {
            Operator::Nop => (String::from("<nop>"), POSTFIX),
            Operator::Constant(value) => (constant(value, node.ty), POSTFIX),
            Operator::This(_) => (String::from("this"), POSTFIX),
            Operator::LocalLoad(local) => (self.name(*local), POSTFIX),
            Operator::LocalStore { local, .. } => (
                format!("{} = {}", self.name(*local), child(0, ASSIGNMENT)),
                ASSIGNMENT,
            ),
            Operator::FieldGet(access) => {
                let target = if access.is_static {
                    access.field.class.to_string()
                } else {
                    child(0, POSTFIX)
                };
                (format!("{}.{}", target, access.field.name), POSTFIX)
            }
            Operator::FieldPut { access, .. } => {
                let (target, value) = if access.is_static {
                    (access.field.class.to_string(), child(0, ASSIGNMENT))
                } else {
                    (child(0, POSTFIX), child(1, ASSIGNMENT))
                };
                (
                    format!("{}.{} = {}", target, access.field.name, value),
                    ASSIGNMENT,
                )
            }
            Operator::ArrayLoad(_) => (
                format!("{}[{}]", child(0, POSTFIX), child(1, 0)),
                POSTFIX,
            ),
            Operator::ArrayStore { .. } => (
                format!(
                    "{}[{}] = {}",
                    child(0, POSTFIX),
                    child(1, 0),
                    child(2, ASSIGNMENT)
                ),
                ASSIGNMENT,
            ),
            Operator::ArrayLength => (format!("{}.length", child(0, POSTFIX)), POSTFIX),
            Operator::Binary(op, _) => {
                let precedence = binary_precedence(*op);
                (
                    format!(
                        "{} {} {}",
                        child(0, precedence),
                        op.symbol(),
                        child(1, precedence + 1)
                    ),
                    precedence,
                )
            }
            Operator::Negate(_) => (format!("-{}", child(0, UNARY)), UNARY),
            Operator::Compare(cmp, _) => {
                let precedence = if cmp.is_equality() {
                    EQUALITY
                } else {
                    RELATIONAL
                };
                (
                    format!(
                        "{} {} {}",
                        child(0, precedence),
                        cmp.symbol(),
                        child(1, precedence + 1)
                    ),
                    precedence,
                )
            }
            Operator::Cmp(_, mode) => {
                let symbol = match mode {
                    None => "<=>",
                    Some(CompareMode::L) => "<=>l",
                    Some(CompareMode::G) => "<=>g",
                };
                (
                    format!(
                        "{} {} {}",
                        child(0, RELATIONAL + 1),
                        symbol,
                        child(1, RELATIONAL + 1)
                    ),
                    RELATIONAL,
                )
            }
            Operator::Convert { to, .. } => {
                (format!("({}){}", to.keyword(), child(0, UNARY)), UNARY)
            }
            Operator::Invoke { kind, method } => {
                let is_constructor = method.name == UnqualifiedName::INIT;
                let text = match kind {
                    InvokeType::Static => {
                        format!("{}.{}({})", method.class, method.name, self.args(children))
                    }
                    InvokeType::Special if is_constructor => {
                        let call = if method.class == self.output.class {
                            "this"
                        } else {
                            "super"
                        };
                        format!("{}({})", call, self.args(&children[1.min(children.len())..]))
                    }
                    _ => format!(
                        "{}.{}({})",
                        child(0, POSTFIX),
                        method.name,
                        self.args(&children[1.min(children.len())..])
                    ),
                };
                (text, POSTFIX)
            }
            Operator::InvokeDynamic { name, .. } => {
                (format!("<dynamic {}>({})", name, self.args(children)), POSTFIX)
            }
            Operator::New { class, .. } => {
                (format!("new {}({})", class, self.args(children)), POSTFIX)
            }
            Operator::NewArray { array, .. } => {
                let full = FieldType::Ref(array.clone()).to_string();
                let element = full.trim_end_matches("[]");
                let total = (full.len() - element.len()) / 2;
                let mut text = format!("new {}", element);
                for length in children {
                    let _ = write!(text, "[{}]", self.expr(*length, 0));
                }
                for _ in children.len()..total {
                    text.push_str("[]");
                }
                (text, POSTFIX)
            }
            Operator::InstanceOf(typ) => (
                format!("{} instanceof {}", child(0, RELATIONAL), ref_type(typ)),
                RELATIONAL,
            ),
            Operator::CheckCast(typ) => {
                (format!("({}){}", ref_type(typ), child(0, UNARY)), UNARY)
            }
            Operator::Thrown(_) => (String::from("<caught>"), POSTFIX),
            Operator::CheckNull => (
                format!("java.util.Objects.requireNonNull({})", child(0, ASSIGNMENT)),
                POSTFIX,
            ),
            Operator::Not => (format!("!{}", child(0, UNARY)), UNARY),
            Operator::LogicalAnd => (
                format!("{} && {}", child(0, LOGICAL_AND), child(1, LOGICAL_AND + 1)),
                LOGICAL_AND,
            ),
            Operator::LogicalOr => (
                format!("{} || {}", child(0, LOGICAL_OR), child(1, LOGICAL_OR + 1)),
                LOGICAL_OR,
            ),
            Operator::Monitor(kind) => {
                let name = match kind {
                    MonitorKind::Enter => "monitorenter",
                    MonitorKind::Exit => "monitorexit",
                };
                (format!("{}({})", name, child(0, ASSIGNMENT)), POSTFIX)
            }
        }
    }
}

fn binary_precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => MULTIPLICATIVE,
        BinaryOp::Add | BinaryOp::Sub => ADDITIVE,
        BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr => SHIFT,
        BinaryOp::And => BIT_AND,
        BinaryOp::Xor => BIT_XOR,
        BinaryOp::Or => BIT_OR,
    }
}

/// Literal, spelled according to the inferred type (`int` constants may be `boolean` or `char`)
fn constant(value: &ConstantValue, ty: Type<'_>) -> String {
    match value {
        ConstantValue::Int(value) if ty.is_single_primitive(PrimitiveKinds::BOOLEAN) => {
            String::from(if *value == 0 { "false" } else { "true" })
        }
        ConstantValue::Int(value) if ty.is_single_primitive(PrimitiveKinds::CHAR) => {
            match char::from_u32(*value as u32) {
                Some(c) if c.is_ascii_graphic() || c == ' ' => format!("{:?}", c),
                _ => format!("(char){}", value),
            }
        }
        ConstantValue::Int(value) => value.to_string(),
        ConstantValue::Long(value) => format!("{}L", value),
        ConstantValue::Float(value) => format!("{:?}f", value),
        ConstantValue::Double(value) => format!("{:?}", value),
        ConstantValue::String(value) => format!("{:?}", value),
        ConstantValue::Class(class) => format!("{}.class", ref_type(class)),
        ConstantValue::Null => String::from("null"),
    }
}

fn ref_type(typ: &RefType<BinaryName>) -> String {
    FieldType::Ref(typ.clone()).to_string()
}

/// Java spelling of a declared type
pub fn type_name(typ: Type<'_>) -> String {
    match typ {
        Type::Primitive(kinds) => kinds
            .keyword()
            .map_or_else(|| typ.to_string(), String::from),
        Type::Class(set) => match set.single().or(set.class) {
            Some(class) => class.name.to_string(),
            None => String::from("java.lang.Object"),
        },
        Type::Array(element) => format!("{}[]", type_name(*element.get())),
        Type::Null | Type::Range(_) | Type::Unknown => String::from("java.lang.Object"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::decompile::LocalSummary;
    use crate::expr::{CompareFamily, Comparison, ExprArena, NumericFamily};
    use crate::flow::Case;
    use crate::jvm::{MethodAccessFlags, MethodDescriptor, Name, ParseDescriptor};
    use crate::locals::Slot;
    use crate::util::Offset;

    fn output<'g>(
        descriptor: &str,
        root: StructuredBlock,
        arena: ExprArena<'g>,
        locals: Vec<LocalSummary<'g>>,
    ) -> MethodOutput<'g> {
        MethodOutput {
            class: BinaryName::from_string(String::from("Main")).unwrap(),
            name: UnqualifiedName::from_string(String::from("test")).unwrap(),
            descriptor: MethodDescriptor::parse(descriptor).unwrap(),
            access_flags: MethodAccessFlags::STATIC,
            root,
            arena,
            locals,
            diagnostics: vec![],
        }
    }

    fn int_local<'g>(id: u32, name: &str, is_parameter: bool) -> LocalSummary<'g> {
        LocalSummary {
            id: LocalId(id),
            slot: Slot::Bytecode(id as u16),
            name: String::from(name),
            ty: Type::INT,
            declared: Type::INT,
            is_parameter,
            is_final: is_parameter,
        }
    }

    fn load(arena: &mut ExprArena<'_>, local: u32) -> ExprId {
        let id = arena.leaf(Operator::LocalLoad(LocalId(local)), Offset(0));
        arena[id].ty = Type::INT;
        id
    }

    fn int(arena: &mut ExprArena<'_>, value: i32) -> ExprId {
        let id = arena.leaf(Operator::Constant(ConstantValue::Int(value)), Offset(0));
        arena[id].ty = Type::INT;
        id
    }

    #[test]
    fn if_and_return() {
        let mut arena = ExprArena::new();
        let a = load(&mut arena, 0);
        let b = load(&mut arena, 1);
        let greater = arena.push(
            Operator::Compare(Comparison::Gt, CompareFamily::Numeric(NumericFamily::Int)),
            vec![a, b],
            Offset(2),
        );
        let a2 = load(&mut arena, 0);
        let b2 = load(&mut arena, 1);
        let root = StructuredBlock::Sequence(vec![
            StructuredBlock::If {
                condition: greater,
                then: Box::new(StructuredBlock::Return(Some(a2))),
                otherwise: None,
            },
            StructuredBlock::Return(Some(b2)),
        ]);
        let locals = vec![int_local(0, "a", true), int_local(1, "b", true)];
        let output = output("(II)I", root, arena, locals);

        assert_eq!(
            render_method(&output),
            "static int test(int a, int b) {
    if (a > b) {
        return a;
    }
    return b;
}
"
        );
    }

    #[test]
    fn precedence_and_booleans() {
        let mut arena = ExprArena::new();
        let a = load(&mut arena, 0);
        let one = int(&mut arena, 1);
        let b = load(&mut arena, 1);
        let sum = arena.push(
            Operator::Binary(BinaryOp::Add, NumericFamily::Int),
            vec![a, one],
            Offset(0),
        );
        let product = arena.push(
            Operator::Binary(BinaryOp::Mul, NumericFamily::Int),
            vec![sum, b],
            Offset(1),
        );
        let store = arena.push(
            Operator::LocalStore {
                local: LocalId(2),
                value_used: false,
            },
            vec![product],
            Offset(2),
        );
        let flag = arena.leaf(Operator::Constant(ConstantValue::Int(1)), Offset(3));
        arena[flag].ty = Type::BOOLEAN;
        let root = StructuredBlock::Sequence(vec![
            StructuredBlock::Instruction(store),
            StructuredBlock::Return(Some(flag)),
        ]);
        let locals = vec![
            int_local(0, "a", true),
            int_local(1, "b", true),
            int_local(2, "c", false),
        ];
        let output = output("(II)Z", root, arena, locals);

        assert_eq!(
            render_method(&output),
            "static boolean test(int a, int b) {
    int c;
    c = (a + 1) * b;
    return true;
}
"
        );
    }

    #[test]
    fn loops_and_labels() {
        let mut arena = ExprArena::new();
        let selector = load(&mut arena, 0);
        let outer = Label(0);
        let inner = Label(1);
        let switch = StructuredBlock::Switch {
            label: inner,
            selector,
            cases: vec![
                Case {
                    values: vec![1],
                    is_default: false,
                    body: StructuredBlock::Break(outer),
                },
                Case {
                    values: vec![],
                    is_default: true,
                    body: StructuredBlock::Break(inner),
                },
            ],
        };
        let root = StructuredBlock::Sequence(vec![
            StructuredBlock::Loop {
                label: outer,
                kind: LoopKind::Infinite,
                condition: None,
                body: Box::new(switch),
            },
            StructuredBlock::Return(None),
        ]);
        let output = output("(I)V", root, arena, vec![int_local(0, "x", true)]);

        assert_eq!(
            render_method(&output),
            "static void test(int x) {
    label0:
    while (true) {
        switch (x) {
            case 1:
                break label0;
            default:
                break;
        }
    }
    return;
}
"
        );
    }
}
