//! Textual method listings
//!
//! The decompiler itself consumes block-structured [`Code`], but something needs to produce it.
//! This is a small assembler-like format (close to what `javap -c` prints) which is used by the
//! command line tool and by the tests:
//!
//! ```text
//! # comments start with a hash
//! .hierarchy com/example/Shape extends java/lang/Object implements java/io/Serializable
//! .hierarchy interface com/example/Named
//!
//! .class com/example/Demo
//! .method public static pick(Z)Ljava/util/List;
//! .var 0 flag Z
//!     iload_0
//!     ifeq Else
//!     new java/util/ArrayList
//!     dup
//!     invokespecial java/util/ArrayList.<init> ()V
//!     areturn
//! Else:
//!     aconst_null
//!     areturn
//! .catch java/lang/Exception from Start to End using Handler
//! .end
//! ```
//!
//! Labels start new blocks, as does any instruction following a branch. A block that runs into a
//! label without branching gets an explicit [`BranchInstruction::FallThrough`]. Offsets are
//! instruction indices within the method.

use crate::jvm::class_graph::Hierarchy;
use crate::jvm::code::{
    BasicBlock, BlockId, BranchInstruction, Code, CompareMode, Constant, EqComparison,
    ExceptionHandler, FieldRef, Instruction, InvokeType, LocalVariableEntry, MethodInfo,
    MethodRef, OrdComparison, ShiftType,
};
use crate::jvm::{
    BaseType, BinaryName, ClassAccessFlags, Error, FieldType, MethodAccessFlags,
    MethodDescriptor, Name, ParseDescriptor, RefType, UnqualifiedName,
};
use crate::util::Offset;
use std::collections::{BTreeMap, HashMap};

/// Everything declared in one listing
#[derive(Debug, Default)]
pub struct Listing {
    /// Class hierarchies declared with `.hierarchy`
    pub hierarchies: Vec<(BinaryName, Hierarchy)>,

    /// Methods, in the order they appear
    pub methods: Vec<MethodInfo>,
}

impl Listing {
    /// Parse a complete listing
    pub fn parse(source: &str) -> Result<Listing, Error> {
        let mut listing = Listing::default();
        let mut class = BinaryName::from_string(String::from("Main")).map_err(Error::MalformedName)?;
        let mut method: Option<MethodParser> = None;

        for (index, raw_line) in source.lines().enumerate() {
            let line_no = index + 1;
            let tokens = tokenize(raw_line).map_err(|message| syntax(line_no, message))?;
            let (first, rest) = match tokens.split_first() {
                None => continue,
                Some(split) => split,
            };

            if method.is_some() {
                if first == ".end" {
                    if let Some(parser) = method.take() {
                        listing.methods.push(parser.finish(line_no)?);
                    }
                } else if let Some(parser) = method.as_mut() {
                    parser.line(line_no, first, rest)?;
                }
                continue;
            }

            match first.as_str() {
                ".hierarchy" => {
                    let entry = parse_hierarchy(rest).map_err(|msg| syntax(line_no, msg))?;
                    listing.hierarchies.push(entry);
                }
                ".class" => {
                    let name = rest.last().ok_or_else(|| syntax(line_no, "missing class name"))?;
                    class = binary_name(name).map_err(|msg| syntax(line_no, msg))?;
                }
                ".method" => {
                    let parser = MethodParser::new(class.clone(), rest)
                        .map_err(|msg| syntax(line_no, msg))?;
                    method = Some(parser);
                }
                directive => {
                    let msg = format!("'{}' outside of a method", directive);
                    return Err(syntax(line_no, msg));
                }
            }
        }

        if method.is_some() {
            let msg = "method is missing its '.end'";
            return Err(syntax(source.lines().count(), msg));
        }
        Ok(listing)
    }
}

fn syntax(line: usize, message: impl Into<String>) -> Error {
    Error::ListingSyntax {
        line,
        message: message.into(),
    }
}

/// Split a line into whitespace separated tokens, keeping quoted strings (with their quotes) as
/// one token and dropping comments
fn tokenize(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = vec![];
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '#' {
            break;
        } else if c == '"' {
            let mut token = String::from('"');
            chars.next();
            loop {
                match chars.next() {
                    None => return Err(String::from("unterminated string")),
                    Some('"') => break,
                    Some('\\') => match chars.next() {
                        Some('n') => token.push('\n'),
                        Some('t') => token.push('\t'),
                        Some(other) => token.push(other),
                        None => return Err(String::from("unterminated escape")),
                    },
                    Some(other) => token.push(other),
                }
            }
            tokens.push(token);
        } else {
            let mut token = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                token.push(c);
                chars.next();
            }
            tokens.push(token);
        }
    }
    Ok(tokens)
}

fn binary_name(name: &str) -> Result<BinaryName, String> {
    BinaryName::from_string(name.to_string())
}

fn unqualified_name(name: &str) -> Result<UnqualifiedName, String> {
    match name {
        "<init>" => Ok(UnqualifiedName::INIT),
        "<clinit>" => Ok(UnqualifiedName::CLINIT),
        _ => UnqualifiedName::from_string(name.to_string()),
    }
}

fn descriptor<T: ParseDescriptor>(source: &str) -> Result<T, String> {
    T::parse(source).map_err(|err| format!("{:?}", err))
}

/// Class name or array descriptor
fn ref_type(source: &str) -> Result<RefType<BinaryName>, String> {
    if source.starts_with('[') {
        descriptor(source)
    } else {
        binary_name(source).map(RefType::Object)
    }
}

fn base_type(keyword: &str) -> Result<BaseType, String> {
    Ok(match keyword {
        "boolean" => BaseType::Boolean,
        "byte" => BaseType::Byte,
        "char" => BaseType::Char,
        "short" => BaseType::Short,
        "int" => BaseType::Int,
        "long" => BaseType::Long,
        "float" => BaseType::Float,
        "double" => BaseType::Double,
        other => return Err(format!("unknown primitive type '{}'", other)),
    })
}

fn number<T: std::str::FromStr>(token: &str) -> Result<T, String> {
    token
        .parse()
        .map_err(|_| format!("invalid number '{}'", token))
}

/// `.hierarchy [interface] Name [extends Super] [implements I1 I2 ...]`
fn parse_hierarchy(tokens: &[String]) -> Result<(BinaryName, Hierarchy), String> {
    let mut tokens = tokens.iter().map(String::as_str).peekable();
    let mut flags = ClassAccessFlags::PUBLIC;
    while let Some(flag) = tokens.peek().and_then(|t| ClassAccessFlags::from_keyword(t)) {
        flags |= flag;
        tokens.next();
    }
    let name = binary_name(tokens.next().ok_or("missing class name")?)?;

    let mut superclass = Some(BinaryName::OBJECT);
    let mut interfaces = vec![];
    let mut in_implements = false;
    while let Some(token) = tokens.next() {
        match token {
            "extends" if !flags.contains(ClassAccessFlags::INTERFACE) => {
                superclass = Some(binary_name(tokens.next().ok_or("missing superclass")?)?);
            }
            "extends" | "implements" => in_implements = true,
            other if in_implements => interfaces.push(binary_name(other)?),
            other => return Err(format!("unexpected '{}' in hierarchy", other)),
        }
    }
    if !flags.contains(ClassAccessFlags::INTERFACE) {
        flags |= ClassAccessFlags::SUPER;
    }
    if name == BinaryName::OBJECT {
        superclass = None;
    }

    let hierarchy = Hierarchy {
        superclass,
        interfaces,
        access_flags: flags,
    };
    Ok((name, hierarchy))
}

/// Branch whose labels can only be resolved once the whole method has been read
struct PendingBranch {
    line: usize,
    offset: Offset,
    mnemonic: String,
    operands: Vec<String>,
}

struct PendingBlock {
    instructions: Vec<(Offset, Instruction)>,
    branch: Option<PendingBranch>,
}

struct PendingCatch {
    line: usize,
    catch_type: Option<BinaryName>,
    start: String,
    end: String,
    handler: String,
}

struct PendingVar {
    line: usize,
    slot: u16,
    name: UnqualifiedName,
    descriptor: FieldType<BinaryName>,
    range: Option<(String, String)>,
}

struct MethodParser {
    class: BinaryName,
    name: UnqualifiedName,
    descriptor: MethodDescriptor<BinaryName>,
    access_flags: MethodAccessFlags,

    blocks: Vec<PendingBlock>,

    /// Is the last block still accepting instructions?
    open: bool,
    labels: HashMap<String, BlockId>,
    next_offset: usize,
    catches: Vec<PendingCatch>,
    vars: Vec<PendingVar>,
}

impl MethodParser {
    /// `.method [flags] name(descriptor)`
    fn new(class: BinaryName, tokens: &[String]) -> Result<MethodParser, String> {
        let mut access_flags = MethodAccessFlags::empty();
        let mut signature = None;
        for token in tokens {
            match MethodAccessFlags::from_keyword(token) {
                Some(flag) => access_flags |= flag,
                None if signature.is_none() => signature = Some(token.as_str()),
                None => return Err(format!("unexpected '{}' after method signature", token)),
            }
        }
        let signature = signature.ok_or("missing method signature")?;
        let paren = signature
            .find('(')
            .ok_or_else(|| format!("missing descriptor in '{}'", signature))?;
        let name = unqualified_name(&signature[..paren])?;
        let descriptor = descriptor(&signature[paren..])?;

        Ok(MethodParser {
            class,
            name,
            descriptor,
            access_flags,
            blocks: vec![],
            open: false,
            labels: HashMap::new(),
            next_offset: 0,
            catches: vec![],
            vars: vec![],
        })
    }

    fn line(&mut self, line_no: usize, first: &str, rest: &[String]) -> Result<(), Error> {
        let err = |msg: String| syntax(line_no, msg);
        match first {
            ".catch" => self.catch(line_no, rest).map_err(err),
            ".var" => self.var(line_no, rest).map_err(err),
            label if label.ends_with(':') => {
                self.label(&label[..label.len() - 1]).map_err(err)?;
                match rest.split_first() {
                    None => Ok(()),
                    Some((first, rest)) => self.line(line_no, first, rest),
                }
            }
            mnemonic => self.instruction(line_no, mnemonic, rest).map_err(err),
        }
    }

    fn current_block_is_empty(&self) -> bool {
        self.blocks
            .last()
            .map_or(false, |b| b.instructions.is_empty() && b.branch.is_none())
    }

    fn label(&mut self, name: &str) -> Result<(), String> {
        if !(self.open && self.current_block_is_empty()) {
            self.blocks.push(PendingBlock {
                instructions: vec![],
                branch: None,
            });
            self.open = true;
        }
        let id = BlockId(self.blocks.len() as u32 - 1);
        if self.labels.insert(name.to_string(), id).is_some() {
            return Err(format!("label '{}' is defined twice", name));
        }
        Ok(())
    }

    fn instruction(&mut self, line: usize, mnemonic: &str, operands: &[String]) -> Result<(), String> {
        if !self.open {
            self.blocks.push(PendingBlock {
                instructions: vec![],
                branch: None,
            });
            self.open = true;
        }
        let offset = Offset(self.next_offset);
        self.next_offset += 1;

        if is_branch(mnemonic) {
            if let Some(block) = self.blocks.last_mut() {
                block.branch = Some(PendingBranch {
                    line,
                    offset,
                    mnemonic: mnemonic.to_string(),
                    operands: operands.to_vec(),
                });
            }
            self.open = false;
        } else {
            let insn = parse_instruction(mnemonic, operands)?;
            if let Some(block) = self.blocks.last_mut() {
                block.instructions.push((offset, insn));
            }
        }
        Ok(())
    }

    /// `.catch (Type|any) from Start to End using Handler`
    fn catch(&mut self, line: usize, tokens: &[String]) -> Result<(), String> {
        match tokens {
            [catch_type, from, start, to, end, using, handler]
                if from == "from" && to == "to" && using == "using" =>
            {
                let catch_type = match catch_type.as_str() {
                    "any" => None,
                    name => Some(binary_name(name)?),
                };
                self.catches.push(PendingCatch {
                    line,
                    catch_type,
                    start: start.clone(),
                    end: end.clone(),
                    handler: handler.clone(),
                });
                Ok(())
            }
            _ => Err(String::from(
                "expected '.catch <type|any> from <label> to <label> using <label>'",
            )),
        }
    }

    /// `.var slot name descriptor [from Start to End]`
    fn var(&mut self, line: usize, tokens: &[String]) -> Result<(), String> {
        let (slot, name, desc, range) = match tokens {
            [slot, name, desc] => (slot, name, desc, None),
            [slot, name, desc, from, start, to, end] if from == "from" && to == "to" => {
                (slot, name, desc, Some((start.clone(), end.clone())))
            }
            _ => return Err(String::from("expected '.var <slot> <name> <descriptor>'")),
        };
        self.vars.push(PendingVar {
            line,
            slot: number(slot)?,
            name: unqualified_name(name)?,
            descriptor: descriptor(desc)?,
            range,
        });
        Ok(())
    }

    fn resolve(&self, line: usize, label: &str) -> Result<BlockId, Error> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| syntax(line, format!("undefined label '{}'", label)))
    }

    fn finish(self, end_line: usize) -> Result<MethodInfo, Error> {
        let block_count = self.blocks.len() as u32;
        let next_of = |id: u32, line: usize| -> Result<BlockId, Error> {
            if id + 1 < block_count {
                Ok(BlockId(id + 1))
            } else {
                Err(syntax(line, "control falls off the end of the method"))
            }
        };

        let mut blocks = BTreeMap::new();
        for (id, block) in self.blocks.iter().enumerate() {
            let id = id as u32;
            let branch_end = match &block.branch {
                None => {
                    let offset = block
                        .instructions
                        .last()
                        .map_or(Offset(self.next_offset), |(o, _)| Offset(o.0 + 1));
                    (offset, BranchInstruction::FallThrough(next_of(id, end_line)?))
                }
                Some(pending) => {
                    let line = pending.line;
                    let branch = parse_branch(
                        &pending.mnemonic,
                        &pending.operands,
                        |label| self.resolve(line, label),
                        || next_of(id, line),
                    )
                    .map_err(|err| match err {
                        BranchError::Syntax(msg) => syntax(line, msg),
                        BranchError::Other(err) => err,
                    })?;
                    (pending.offset, branch)
                }
            };
            let instructions = block.instructions.clone();
            blocks.insert(
                BlockId(id),
                BasicBlock {
                    instructions,
                    branch_end,
                },
            );
        }

        let mut exception_table = vec![];
        for catch in &self.catches {
            exception_table.push(ExceptionHandler {
                start: self.resolve(catch.line, &catch.start)?,
                end: self.resolve(catch.line, &catch.end)?,
                handler: self.resolve(catch.line, &catch.handler)?,
                catch_type: catch.catch_type.clone(),
            });
        }

        let mut local_variable_table = vec![];
        for var in &self.vars {
            let range = match &var.range {
                None => None,
                Some((start, end)) => Some((
                    self.resolve(var.line, start)?,
                    self.resolve(var.line, end)?,
                )),
            };
            local_variable_table.push(LocalVariableEntry {
                slot: var.slot,
                name: var.name.clone(),
                descriptor: var.descriptor.clone(),
                range,
            });
        }

        Ok(MethodInfo {
            class: self.class,
            name: self.name,
            descriptor: self.descriptor,
            access_flags: self.access_flags,
            code: Code {
                blocks,
                exception_table,
                local_variable_table,
            },
        })
    }
}

enum BranchError {
    Syntax(String),
    Other(Error),
}

impl From<String> for BranchError {
    fn from(msg: String) -> BranchError {
        BranchError::Syntax(msg)
    }
}

impl From<Error> for BranchError {
    fn from(err: Error) -> BranchError {
        BranchError::Other(err)
    }
}

fn is_branch(mnemonic: &str) -> bool {
    matches!(
        mnemonic,
        "ifeq"
            | "ifne"
            | "iflt"
            | "ifge"
            | "ifgt"
            | "ifle"
            | "if_icmpeq"
            | "if_icmpne"
            | "if_icmplt"
            | "if_icmpge"
            | "if_icmpgt"
            | "if_icmple"
            | "if_acmpeq"
            | "if_acmpne"
            | "ifnull"
            | "ifnonnull"
            | "goto"
            | "goto_w"
            | "tableswitch"
            | "lookupswitch"
            | "ireturn"
            | "lreturn"
            | "freturn"
            | "dreturn"
            | "areturn"
            | "return"
            | "athrow"
    )
}

fn parse_branch(
    mnemonic: &str,
    operands: &[String],
    resolve: impl Fn(&str) -> Result<BlockId, Error>,
    next: impl FnOnce() -> Result<BlockId, Error>,
) -> Result<BranchInstruction, BranchError> {
    use BranchInstruction::*;

    let ord = |cmp: &str| match cmp {
        "eq" => Some(OrdComparison::EQ),
        "ne" => Some(OrdComparison::NE),
        "lt" => Some(OrdComparison::LT),
        "ge" => Some(OrdComparison::GE),
        "gt" => Some(OrdComparison::GT),
        "le" => Some(OrdComparison::LE),
        _ => None,
    };
    let target = || -> Result<BlockId, BranchError> {
        match operands {
            [label] => Ok(resolve(label)?),
            _ => Err(BranchError::Syntax(format!("'{}' expects one label", mnemonic))),
        }
    };
    let no_operands = |branch: BranchInstruction| -> Result<BranchInstruction, BranchError> {
        if operands.is_empty() {
            Ok(branch)
        } else {
            Err(BranchError::Syntax(format!("'{}' takes no operands", mnemonic)))
        }
    };

    let branch = match mnemonic {
        "ifnull" => IfNull(EqComparison::EQ, target()?, next()?),
        "ifnonnull" => IfNull(EqComparison::NE, target()?, next()?),
        "if_acmpeq" => IfACmp(EqComparison::EQ, target()?, next()?),
        "if_acmpne" => IfACmp(EqComparison::NE, target()?, next()?),
        m if m.starts_with("if_icmp") => match ord(&m[7..]) {
            Some(cmp) => IfICmp(cmp, target()?, next()?),
            None => return Err(BranchError::Syntax(format!("unknown branch '{}'", m))),
        },
        m if m.starts_with("if") => match ord(&m[2..]) {
            Some(cmp) => If(cmp, target()?, next()?),
            None => return Err(BranchError::Syntax(format!("unknown branch '{}'", m))),
        },
        "goto" | "goto_w" => Goto(target()?),
        "tableswitch" => {
            // tableswitch <low> <label>... default <label>
            let (low, rest) = operands
                .split_first()
                .ok_or_else(|| String::from("tableswitch expects a low value"))?;
            let (default, targets) = switch_default(rest)?;
            let targets = targets
                .iter()
                .map(|label| resolve(label))
                .collect::<Result<Vec<_>, _>>()?;
            TableSwitch {
                default: resolve(default)?,
                low: number(low)?,
                targets,
            }
        }
        "lookupswitch" => {
            // lookupswitch (<key> <label>)... default <label>
            let (default, pairs) = switch_default(operands)?;
            if pairs.len() % 2 != 0 {
                return Err(BranchError::Syntax(String::from(
                    "lookupswitch expects key/label pairs",
                )));
            }
            let mut targets = vec![];
            for pair in pairs.chunks(2) {
                targets.push((number::<i32>(&pair[0])?, resolve(&pair[1])?));
            }
            targets.sort_by_key(|(key, _)| *key);
            LookupSwitch {
                default: resolve(default)?,
                targets,
            }
        }
        "ireturn" => no_operands(IReturn)?,
        "lreturn" => no_operands(LReturn)?,
        "freturn" => no_operands(FReturn)?,
        "dreturn" => no_operands(DReturn)?,
        "areturn" => no_operands(AReturn)?,
        "return" => no_operands(Return)?,
        "athrow" => no_operands(AThrow)?,
        other => return Err(BranchError::Syntax(format!("unknown branch '{}'", other))),
    };
    Ok(branch)
}

/// Split `... default <label>` into the default label and the preceding operands
fn switch_default(operands: &[String]) -> Result<(&String, &[String]), String> {
    match operands {
        [init @ .., keyword, default] if keyword == "default" => Ok((default, init)),
        _ => Err(String::from("switch is missing 'default <label>'")),
    }
}

/// `Class.name` followed by a descriptor
fn member<D: ParseDescriptor>(
    operands: &[String],
) -> Result<(BinaryName, UnqualifiedName, D), String> {
    match operands {
        [qualified, desc] => {
            let dot = qualified
                .rfind('.')
                .ok_or_else(|| format!("expected 'Class.member', got '{}'", qualified))?;
            Ok((
                binary_name(&qualified[..dot])?,
                unqualified_name(&qualified[dot + 1..])?,
                descriptor(desc)?,
            ))
        }
        _ => Err(String::from("expected 'Class.member descriptor'")),
    }
}

fn field_ref(operands: &[String]) -> Result<FieldRef, String> {
    let (class, name, descriptor) = member(operands)?;
    Ok(FieldRef {
        class,
        name,
        descriptor,
    })
}

fn method_ref(operands: &[String]) -> Result<MethodRef, String> {
    let (class, name, descriptor) = member(operands)?;
    Ok(MethodRef {
        class,
        name,
        descriptor,
    })
}

/// Literal operand of `ldc`: `"text"`, `12`, `12L`, `1.5f`, `1.5`, or `class Name`
fn constant(operands: &[String]) -> Result<Constant, String> {
    match operands {
        [class, name] if class == "class" => ref_type(name).map(Constant::Class),
        [literal] if literal.starts_with('"') => Ok(Constant::String(literal[1..].to_string())),
        [literal] if literal.ends_with('L') => {
            number(&literal[..literal.len() - 1]).map(Constant::Long)
        }
        [literal] if literal.ends_with('f') || literal.ends_with('F') => {
            number(&literal[..literal.len() - 1]).map(Constant::Float)
        }
        [literal] if literal.contains('.') || literal.contains('e') => {
            number(literal).map(Constant::Double)
        }
        [literal] => number(literal).map(Constant::Integer),
        _ => Err(String::from("expected one constant")),
    }
}

fn single_operand<'a>(mnemonic: &str, operands: &'a [String]) -> Result<&'a str, String> {
    match operands {
        [operand] => Ok(operand.as_str()),
        _ => Err(format!("'{}' expects one operand", mnemonic)),
    }
}

fn parse_instruction(mnemonic: &str, operands: &[String]) -> Result<Instruction, String> {
    use Instruction::*;

    let slot = || -> Result<u16, String> {
        match operands {
            [slot] => number(slot),
            _ => Err(format!("'{}' expects a local slot", mnemonic)),
        }
    };
    let single = || single_operand(mnemonic, operands);

    // Short forms with the slot in the mnemonic (`iload_2`)
    if let Some((prefix, n)) = mnemonic.rsplit_once('_') {
        if let Ok(n) = n.parse::<u16>() {
            let insn = match prefix {
                "iload" => Some(ILoad(n)),
                "lload" => Some(LLoad(n)),
                "fload" => Some(FLoad(n)),
                "dload" => Some(DLoad(n)),
                "aload" => Some(ALoad(n)),
                "istore" => Some(IStore(n)),
                "lstore" => Some(LStore(n)),
                "fstore" => Some(FStore(n)),
                "dstore" => Some(DStore(n)),
                "astore" => Some(AStore(n)),
                "iconst" => Some(IConst(n as i32)),
                "lconst" => Some(LConst(n as i64)),
                "fconst" => Some(FConst(n as f32)),
                "dconst" => Some(DConst(n as f64)),
                _ => None,
            };
            if let Some(insn) = insn {
                if operands.is_empty() {
                    return Ok(insn);
                }
                return Err(format!("'{}' takes no operands", mnemonic));
            }
        }
    }

    let insn = match mnemonic {
        "nop" => Nop,
        "aconst_null" => AConstNull,
        "iconst_m1" => IConst(-1),
        "bipush" | "sipush" => IConst(number(single()?)?),
        "ldc" | "ldc_w" | "ldc2_w" => Ldc(constant(operands)?),
        "iload" => ILoad(slot()?),
        "lload" => LLoad(slot()?),
        "fload" => FLoad(slot()?),
        "dload" => DLoad(slot()?),
        "aload" => ALoad(slot()?),
        "iaload" => IALoad,
        "laload" => LALoad,
        "faload" => FALoad,
        "daload" => DALoad,
        "aaload" => AALoad,
        "baload" => BALoad,
        "caload" => CALoad,
        "saload" => SALoad,
        "istore" => IStore(slot()?),
        "lstore" => LStore(slot()?),
        "fstore" => FStore(slot()?),
        "dstore" => DStore(slot()?),
        "astore" => AStore(slot()?),
        "iastore" => IAStore,
        "lastore" => LAStore,
        "fastore" => FAStore,
        "dastore" => DAStore,
        "aastore" => AAStore,
        "bastore" => BAStore,
        "castore" => CAStore,
        "sastore" => SAStore,
        "pop" => Pop,
        "pop2" => Pop2,
        "dup" => Dup,
        "dup_x1" => DupX1,
        "dup_x2" => DupX2,
        "dup2" => Dup2,
        "dup2_x1" => Dup2X1,
        "dup2_x2" => Dup2X2,
        "swap" => Swap,
        "iadd" => IAdd,
        "ladd" => LAdd,
        "fadd" => FAdd,
        "dadd" => DAdd,
        "isub" => ISub,
        "lsub" => LSub,
        "fsub" => FSub,
        "dsub" => DSub,
        "imul" => IMul,
        "lmul" => LMul,
        "fmul" => FMul,
        "dmul" => DMul,
        "idiv" => IDiv,
        "ldiv" => LDiv,
        "fdiv" => FDiv,
        "ddiv" => DDiv,
        "irem" => IRem,
        "lrem" => LRem,
        "frem" => FRem,
        "drem" => DRem,
        "ineg" => INeg,
        "lneg" => LNeg,
        "fneg" => FNeg,
        "dneg" => DNeg,
        "ishl" => ISh(ShiftType::Left),
        "ishr" => ISh(ShiftType::ArithmeticRight),
        "iushr" => ISh(ShiftType::LogicalRight),
        "lshl" => LSh(ShiftType::Left),
        "lshr" => LSh(ShiftType::ArithmeticRight),
        "lushr" => LSh(ShiftType::LogicalRight),
        "iand" => IAnd,
        "land" => LAnd,
        "ior" => IOr,
        "lor" => LOr,
        "ixor" => IXor,
        "lxor" => LXor,
        "iinc" => match operands {
            [slot, delta] => IInc(number(slot)?, number(delta)?),
            _ => return Err(String::from("'iinc' expects a slot and a delta")),
        },
        "i2l" => I2L,
        "i2f" => I2F,
        "i2d" => I2D,
        "l2i" => L2I,
        "l2f" => L2F,
        "l2d" => L2D,
        "f2i" => F2I,
        "f2l" => F2L,
        "f2d" => F2D,
        "d2i" => D2I,
        "d2l" => D2L,
        "d2f" => D2F,
        "i2b" => I2B,
        "i2c" => I2C,
        "i2s" => I2S,
        "lcmp" => LCmp,
        "fcmpl" => FCmp(CompareMode::L),
        "fcmpg" => FCmp(CompareMode::G),
        "dcmpl" => DCmp(CompareMode::L),
        "dcmpg" => DCmp(CompareMode::G),
        "getstatic" => GetStatic(field_ref(operands)?),
        "putstatic" => PutStatic(field_ref(operands)?),
        "getfield" => GetField(field_ref(operands)?),
        "putfield" => PutField(field_ref(operands)?),
        "invokevirtual" => Invoke(InvokeType::Virtual, method_ref(operands)?),
        "invokespecial" => Invoke(InvokeType::Special, method_ref(operands)?),
        "invokestatic" => Invoke(InvokeType::Static, method_ref(operands)?),
        "invokeinterface" => Invoke(InvokeType::Interface, method_ref(operands)?),
        "invokedynamic" => match operands {
            [name, desc] => InvokeDynamic(unqualified_name(name)?, descriptor(desc)?),
            _ => return Err(String::from("'invokedynamic' expects a name and a descriptor")),
        },
        "new" => New(binary_name(single()?)?),
        "newarray" => NewArray(base_type(single()?)?),
        "anewarray" => ANewArray(ref_type(single()?)?),
        "multianewarray" => match operands {
            [desc, dims] => MultiANewArray(ref_type(desc)?, number(dims)?),
            _ => return Err(String::from("'multianewarray' expects a type and dimensions")),
        },
        "arraylength" => ArrayLength,
        "checkcast" => CheckCast(ref_type(single()?)?),
        "instanceof" => InstanceOf(ref_type(single()?)?),
        "monitorenter" => MonitorEnter,
        "monitorexit" => MonitorExit,
        "jsr" | "jsr_w" | "ret" => {
            return Err(format!("'{}' (subroutines) is not supported", mnemonic))
        }
        other => return Err(format!("unknown instruction '{}'", other)),
    };

    let takes_operands = matches!(
        insn,
        IConst(_)
            | Ldc(_)
            | ILoad(_)
            | LLoad(_)
            | FLoad(_)
            | DLoad(_)
            | ALoad(_)
            | IStore(_)
            | LStore(_)
            | FStore(_)
            | DStore(_)
            | AStore(_)
            | IInc(..)
            | GetStatic(_)
            | PutStatic(_)
            | GetField(_)
            | PutField(_)
            | Invoke(..)
            | InvokeDynamic(..)
            | New(_)
            | NewArray(_)
            | ANewArray(_)
            | MultiANewArray(..)
            | CheckCast(_)
            | InstanceOf(_)
    );
    if !takes_operands && !operands.is_empty() {
        return Err(format!("'{}' takes no operands", mnemonic));
    }
    Ok(insn)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn blocks_and_labels() {
        let listing = Listing::parse(
            r#"
            .class com/example/Demo
            .method public static max(II)I
                iload_0
                iload_1
                if_icmple Else
                iload_0
                ireturn
            Else:
                iload_1
                ireturn
            .end
            "#,
        )
        .unwrap();

        assert_eq!(listing.methods.len(), 1);
        let method = &listing.methods[0];
        assert_eq!(method.qualified_name(), "com.example.Demo.max");
        assert!(method.is_static());

        let blocks = &method.code.blocks;
        assert_eq!(blocks.len(), 3);
        assert_eq!(
            blocks[&BlockId(0)].branch_end.1,
            BranchInstruction::IfICmp(OrdComparison::LE, BlockId(2), BlockId(1))
        );
        assert_eq!(blocks[&BlockId(2)].instructions[0].1, Instruction::ILoad(1));
        assert_eq!(blocks[&BlockId(2)].start_offset(), Offset(5));
    }

    #[test]
    fn fallthrough_and_aliases() {
        let listing = Listing::parse(
            r#"
            .method run()V
                iconst_0
                istore_1
            A:
            B:
                iinc 1 1
                goto B
            .end
            "#,
        )
        .unwrap();

        let code = &listing.methods[0].code;
        assert_eq!(code.blocks.len(), 2, "consecutive labels share a block");
        assert_eq!(
            code.blocks[&BlockId(0)].branch_end.1,
            BranchInstruction::FallThrough(BlockId(1))
        );
        assert_eq!(
            code.blocks[&BlockId(1)].branch_end.1,
            BranchInstruction::Goto(BlockId(1))
        );
    }

    #[test]
    fn directives() {
        let listing = Listing::parse(
            r#"
            .hierarchy interface com/example/Named extends java/io/Serializable
            .hierarchy com/example/Base extends java/lang/Number implements com/example/Named
            .method static f(Ljava/lang/String;)V
            .var 0 text Ljava/lang/String;
            Start:
                aload_0
                invokevirtual java/lang/String.length ()I
                pop
            End:
                return
            Handler:
                astore_1
                return
            .catch java/lang/Exception from Start to End using Handler
            .end
            "#,
        )
        .unwrap();

        let (name, named) = &listing.hierarchies[0];
        assert_eq!(name.as_str(), "com/example/Named");
        assert!(named.access_flags.contains(ClassAccessFlags::INTERFACE));
        assert_eq!(named.interfaces, vec![BinaryName::SERIALIZABLE]);
        let (_, base) = &listing.hierarchies[1];
        assert_eq!(base.superclass, Some(BinaryName::NUMBER));

        let code = &listing.methods[0].code;
        assert_eq!(
            code.exception_table,
            vec![ExceptionHandler {
                start: BlockId(0),
                end: BlockId(1),
                handler: BlockId(2),
                catch_type: Some(BinaryName::EXCEPTION),
            }]
        );
        assert_eq!(code.local_variable_table[0].name.as_str(), "text");
        assert!(code.local_variable_table[0].covers(0, BlockId(2)));
    }

    #[test]
    fn constants_and_switches() {
        let listing = Listing::parse(
            r#"
            .method static g(I)Ljava/lang/Object;
                iload_0
                lookupswitch 5 Five 1 One default Other
            One:
                ldc "one two"
                areturn
            Five:
                ldc 2.5f
                pop
                ldc2_w 7L
                pop2
                ldc class java/lang/String
                areturn
            Other:
                aconst_null
                areturn
            .end
            "#,
        )
        .unwrap();

        let code = &listing.methods[0].code;
        assert_eq!(
            code.blocks[&BlockId(0)].branch_end.1,
            BranchInstruction::LookupSwitch {
                default: BlockId(3),
                targets: vec![(1, BlockId(1)), (5, BlockId(2))],
            }
        );
        assert_eq!(
            code.blocks[&BlockId(1)].instructions[0].1,
            Instruction::Ldc(Constant::String(String::from("one two")))
        );
        assert_eq!(
            code.blocks[&BlockId(2)].instructions[2].1,
            Instruction::Ldc(Constant::Long(7))
        );
    }

    #[test]
    fn errors() {
        let undefined = Listing::parse(".method f()V\n goto Nowhere\n.end\n");
        assert!(matches!(undefined, Err(Error::ListingSyntax { line: 2, .. })));

        let falls_off = Listing::parse(".method f()V\n iconst_0\n.end\n");
        assert!(falls_off.is_err(), "no branch at the end");

        let unknown = Listing::parse(".method f()V\n frobnicate\n return\n.end\n");
        assert!(matches!(unknown, Err(Error::ListingSyntax { line: 2, .. })));

        assert!(Listing::parse(".method f()V\n return\n").is_err(), "missing .end");
    }
}
