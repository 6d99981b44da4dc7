//! A small textual reader for [`super::Module`].
//!
//! This is **not** the IL grammar the rest of the toolchain uses — that
//! grammar is owned by the (out-of-scope, per spec §1) IL parser/verifier.
//! It exists only so the `codegen` binary and its integration tests have
//! something to read from a file; it accepts a deliberately small subset
//! sufficient to express the checked-arithmetic/compare/control-flow shapes
//! this backend lowers. Treat it as fixture tooling, not a format contract.
//!
//! Grammar (informal):
//!
//! ```text
//! module   := func*
//! func     := "func" name "(" ty,* ")" "->" (ty | "void") "{" block+ "}"
//! block    := label ("(" param,* ")")? ":" inst* term
//! param    := name ":" ty
//! inst     := name "=" opcode operand,*
//!           | opcode operand,*              ; side-effecting, no result
//! term     := "ret" operand?
//!           | "br" label "(" operand,* ")"
//!           | "cbr" operand "," label "(" operand,* ")" "," label "(" operand,* ")"
//! ```

use super::{
    Block, CallTarget, ExternalName, Function, Global, Immediate, Module, Opcode, Type, Value,
};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug)]
pub struct ParseError(pub String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error: {}", self.0)
    }
}
impl std::error::Error for ParseError {}

pub fn parse_module(src: &str) -> Result<Module, ParseError> {
    let mut p = Parser::new(src);
    let mut module = Module::new();
    while p.peek_word() == Some("func") {
        module.functions.push(p.parse_func()?);
    }
    Ok(module)
}

struct Parser<'a> {
    toks: Vec<&'a str>,
    pos: usize,
}

fn tokenize(src: &str) -> Vec<&str> {
    let mut toks = Vec::new();
    let bytes = src.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == ';' {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }
        if "(){}:,=<>".contains(c) {
            toks.push(&src[i..i + 1]);
            i += 1;
            continue;
        }
        if c == '-' && i + 1 < bytes.len() && bytes[i + 1] as char == '>' {
            toks.push(&src[i..i + 2]);
            i += 2;
            continue;
        }
        let start = i;
        while i < bytes.len() {
            let c = bytes[i] as char;
            if c.is_whitespace() || "(){}:,=;<>".contains(c) {
                break;
            }
            if c == '-' && i > start {
                break;
            }
            i += 1;
        }
        toks.push(&src[start..i]);
    }
    toks
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Parser {
            toks: tokenize(src),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<&'a str> {
        self.toks.get(self.pos).copied()
    }

    fn peek_word(&self) -> Option<&'a str> {
        self.peek()
    }

    fn bump(&mut self) -> Result<&'a str, ParseError> {
        let t = self
            .toks
            .get(self.pos)
            .copied()
            .ok_or_else(|| ParseError("unexpected end of input".into()))?;
        self.pos += 1;
        Ok(t)
    }

    fn expect(&mut self, s: &str) -> Result<(), ParseError> {
        let t = self.bump()?;
        if t != s {
            return Err(ParseError(format!("expected `{s}`, found `{t}`")));
        }
        Ok(())
    }

    fn parse_ty(&mut self) -> Result<Type, ParseError> {
        let t = self.bump()?;
        Ok(match t {
            "i8" => Type::I8,
            "i16" => Type::I16,
            "i32" => Type::I32,
            "i64" => Type::I64,
            "f32" => Type::F32,
            "f64" => Type::F64,
            "bool" => Type::Bool,
            "ptr" => Type::Ptr,
            other => return Err(ParseError(format!("unknown type `{other}`"))),
        })
    }

    /// Consumes a balanced `( ... )` group, assuming the next token is `(`.
    fn skip_parenthesized(&mut self) -> Result<(), ParseError> {
        self.expect("(")?;
        let mut depth = 1i32;
        while depth > 0 {
            match self.bump()? {
                "(" => depth += 1,
                ")" => depth -= 1,
                _ => {}
            }
        }
        Ok(())
    }

    /// Skips a block's instructions and terminator, leaving the cursor
    /// positioned at the next block's label (or `}`). Relies on `ret`
    /// always spelling its empty case as `ret void` so this never has to
    /// guess whether a bare identifier is a value or the next label.
    fn skip_block_body(&mut self) -> Result<(), ParseError> {
        loop {
            match self.bump()? {
                "ret" => {
                    self.bump()?; // value or `void`
                    return Ok(());
                }
                "br" => {
                    self.bump()?; // target label
                    if self.peek() == Some("(") {
                        self.skip_parenthesized()?;
                    }
                    return Ok(());
                }
                "cbr" => {
                    self.bump()?; // cond
                    self.expect(",")?;
                    self.bump()?; // then label
                    if self.peek() == Some("(") {
                        self.skip_parenthesized()?;
                    }
                    self.expect(",")?;
                    self.bump()?; // else label
                    if self.peek() == Some("(") {
                        self.skip_parenthesized()?;
                    }
                    return Ok(());
                }
                _ => {}
            }
        }
    }

    fn parse_func(&mut self) -> Result<Function, ParseError> {
        self.expect("func")?;
        let name = self.bump()?;
        self.expect("(")?;
        let mut param_types = Vec::new();
        while self.peek() != Some(")") {
            param_types.push(self.parse_ty()?);
            if self.peek() == Some(",") {
                self.bump()?;
            }
        }
        self.expect(")")?;
        let ret_type = if self.peek() == Some("->") {
            self.bump()?;
            if self.peek() == Some("void") {
                self.bump()?;
                None
            } else {
                Some(self.parse_ty()?)
            }
        } else {
            None
        };
        self.expect("{")?;

        let mut func = Function::new(name);
        func.param_types = param_types.clone();
        func.ret_type = ret_type;
        let mut names: HashMap<&str, Value> = HashMap::new();
        let mut blocks: HashMap<&str, Block> = HashMap::new();

        // First pass: discover block labels in order so forward references
        // (an `entry` block's `cbr` naming a not-yet-declared `then`/`else`
        // block) resolve. Block headers are the only place a label can
        // appear, and every block is closed by exactly one terminator
        // (`ret`/`br`/`cbr`), so walking terminator syntax is enough to
        // find the start of the next one without full expression parsing.
        let save = self.pos;
        let mut first = true;
        while self.peek().is_some() && self.peek() != Some("}") {
            let label = self.bump()?;
            if first {
                blocks.insert(label, func.entry);
            } else {
                let b = func.create_block();
                blocks.insert(label, b);
            }
            first = false;
            if self.peek() == Some("(") {
                self.skip_parenthesized()?;
            }
            self.expect(":")?;
            self.skip_block_body()?;
        }
        self.pos = save;

        // Second pass: real parse.
        while self.peek().is_some() && self.peek() != Some("}") {
            let label = self.bump()?;
            let block = *blocks.get(label).unwrap();
            if self.peek() == Some("(") {
                self.bump()?;
                while self.peek() != Some(")") {
                    let pname = self.bump()?;
                    self.expect(":")?;
                    let ty = self.parse_ty()?;
                    let v = func.append_block_param(block, ty);
                    names.insert(pname, v);
                    if self.peek() == Some(",") {
                        self.bump()?;
                    }
                }
                self.expect(")")?;
            }
            self.expect(":")?;
            self.parse_block_body(&mut func, block, &mut names, &blocks)?;
        }
        self.expect("}")?;
        Ok(func)
    }

    fn parse_block_body(
        &mut self,
        func: &mut Function,
        block: Block,
        names: &mut HashMap<&'a str, Value>,
        blocks: &HashMap<&'a str, Block>,
    ) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Some("ret") => {
                    self.bump()?;
                    let v = if self.peek() == Some("void") {
                        self.bump()?;
                        None
                    } else {
                        Some(self.parse_value(names)?)
                    };
                    func.set_terminator(block, super::Terminator::Ret(v));
                    return Ok(());
                }
                Some("br") => {
                    self.bump()?;
                    let target_name = self.bump()?;
                    let target = *blocks
                        .get(target_name)
                        .ok_or_else(|| ParseError(format!("unknown block `{target_name}`")))?;
                    let args = self.parse_arg_list(names)?;
                    func.set_terminator(
                        block,
                        super::Terminator::Br {
                            target,
                            args: args.into(),
                        },
                    );
                    return Ok(());
                }
                Some("cbr") => {
                    self.bump()?;
                    let cond = self.parse_value(names)?;
                    self.expect(",")?;
                    let then_name = self.bump()?;
                    let then_args = self.parse_arg_list(names)?;
                    self.expect(",")?;
                    let else_name = self.bump()?;
                    let else_args = self.parse_arg_list(names)?;
                    let then_block = *blocks
                        .get(then_name)
                        .ok_or_else(|| ParseError(format!("unknown block `{then_name}`")))?;
                    let else_block = *blocks
                        .get(else_name)
                        .ok_or_else(|| ParseError(format!("unknown block `{else_name}`")))?;
                    func.set_terminator(
                        block,
                        super::Terminator::Cbr {
                            cond,
                            then_block,
                            then_args: then_args.into(),
                            else_block,
                            else_args: else_args.into(),
                        },
                    );
                    return Ok(());
                }
                Some(_) => self.parse_inst(func, block, names)?,
                None => return Err(ParseError("unexpected end of function".into())),
            }
        }
    }

    fn parse_arg_list(
        &mut self,
        names: &HashMap<&'a str, Value>,
    ) -> Result<Vec<Value>, ParseError> {
        let mut args = Vec::new();
        if self.peek() == Some("(") {
            self.bump()?;
            while self.peek() != Some(")") {
                args.push(self.parse_value(names)?);
                if self.peek() == Some(",") {
                    self.bump()?;
                }
            }
            self.bump()?;
        }
        Ok(args)
    }

    fn parse_value(&mut self, names: &HashMap<&'a str, Value>) -> Result<Value, ParseError> {
        let t = self.bump()?;
        names
            .get(t)
            .copied()
            .ok_or_else(|| ParseError(format!("unknown value `{t}`")))
    }

    fn parse_inst(
        &mut self,
        func: &mut Function,
        block: Block,
        names: &mut HashMap<&'a str, Value>,
    ) -> Result<(), ParseError> {
        let mut result_name = None;
        let save = self.pos;
        let first = self.bump()?;
        if self.peek() == Some("=") {
            result_name = Some(first);
            self.bump()?; // '='
        } else {
            self.pos = save;
        }
        let op_tok = self.bump()?;

        if op_tok == "call" {
            let result_ty = if self.peek() == Some("<") {
                self.bump()?;
                let ty = self.parse_ty()?;
                self.expect(">")?;
                Some(ty)
            } else if result_name.is_some() {
                Some(Type::I64)
            } else {
                None
            };
            let callee = self.bump()?;
            let target = if let Some(v) = names.get(callee) {
                CallTarget::Indirect(*v)
            } else {
                CallTarget::Direct(ExternalName(callee.to_string()))
            };
            let args = self.parse_arg_list(names)?;
            let result = func.push_call(block, target, &args, result_ty);
            if let (Some(n), Some(result)) = (result_name, result) {
                names.insert(n, result);
            }
            return Ok(());
        }

        let (opcode, default_ty) = opcode_from_str(op_tok)?;

        if opcode == Opcode::Alloca {
            let size: i64 = self
                .bump()?
                .parse()
                .map_err(|_| ParseError("bad alloca size".into()))?;
            let result = func.push_alloca(block, size as u32, Type::Ptr);
            if let Some(n) = result_name {
                names.insert(n, result);
            }
            return Ok(());
        }
        if opcode == Opcode::Load {
            let ptr = self.parse_value(names)?;
            let ty = if self.peek() == Some(",") {
                self.bump()?;
                self.parse_ty()?
            } else {
                default_ty
            };
            let result = func.push_load(block, ptr, ty);
            if let Some(n) = result_name {
                names.insert(n, result);
            }
            return Ok(());
        }
        if opcode == Opcode::Store {
            let ptr = self.parse_value(names)?;
            self.expect(",")?;
            let value = self.parse_value(names)?;
            func.push_store(block, ptr, value, default_ty);
            return Ok(());
        }

        let mut args = Vec::new();
        let mut imm: Option<Immediate> = None;
        loop {
            match self.peek() {
                Some(t) if t.parse::<i64>().is_ok() && args.len() < 2 => {
                    let n: i64 = self.bump()?.parse().unwrap();
                    imm = Some(Immediate::Int(n));
                }
                Some(_) => args.push(self.parse_value(names)?),
                None => break,
            }
            if self.peek() == Some(",") {
                self.bump()?;
            } else {
                break;
            }
        }

        let result_ty = default_ty;
        let result = if let Some(imm) = imm {
            func.push_inst_imm(block, opcode, &args, imm, result_ty)
        } else {
            func.push_inst(block, opcode, &args, result_ty)
        };
        if let Some(n) = result_name {
            names.insert(n, result);
        }
        Ok(())
    }
}

fn opcode_from_str(s: &str) -> Result<(Opcode, Type), ParseError> {
    use Opcode::*;
    Ok(match s {
        "add" => (Add, Type::I64),
        "sub" => (Sub, Type::I64),
        "mul" => (Mul, Type::I64),
        "shl" => (Shl, Type::I64),
        "shr" => (Shr, Type::I64),
        "ushr" => (UShr, Type::I64),
        "and" => (And, Type::I64),
        "or" => (Or, Type::I64),
        "xor" => (Xor, Type::I64),
        "add.ovf" => (AddOvf, Type::I64),
        "sub.ovf" => (SubOvf, Type::I64),
        "mul.ovf" => (MulOvf, Type::I64),
        "sdiv.chk0" => (SDivChk0, Type::I64),
        "srem.chk0" => (SRemChk0, Type::I64),
        "icmp_eq" => (IcmpEq, Type::Bool),
        "icmp_ne" => (IcmpNe, Type::Bool),
        "scmp_lt" => (ScmpLt, Type::Bool),
        "scmp_le" => (ScmpLe, Type::Bool),
        "scmp_gt" => (ScmpGt, Type::Bool),
        "scmp_ge" => (ScmpGe, Type::Bool),
        "ucmp_lt" => (UcmpLt, Type::Bool),
        "ucmp_le" => (UcmpLe, Type::Bool),
        "ucmp_gt" => (UcmpGt, Type::Bool),
        "ucmp_ge" => (UcmpGe, Type::Bool),
        "fadd" => (FAdd, Type::F64),
        "fsub" => (FSub, Type::F64),
        "fmul" => (FMul, Type::F64),
        "fdiv" => (FDiv, Type::F64),
        "fcmp_eq" => (FcmpEq, Type::Bool),
        "fcmp_ne" => (FcmpNe, Type::Bool),
        "fcmp_lt" => (FcmpLt, Type::Bool),
        "fcmp_le" => (FcmpLe, Type::Bool),
        "fcmp_gt" => (FcmpGt, Type::Bool),
        "fcmp_ge" => (FcmpGe, Type::Bool),
        "sitofp" => (Sitofp, Type::F64),
        "fptosi.chk" => (FptosiChk, Type::I64),
        "trunc.chk" => (TruncChk, Type::I32),
        "zext" => (Zext, Type::I64),
        "sext" => (Sext, Type::I64),
        "load" => (Load, Type::I64),
        "store" => (Store, Type::I64),
        "alloca" => (Alloca, Type::Ptr),
        other => return Err(ParseError(format!("unknown opcode `{other}`"))),
    })
}

/// Interns a string literal global, mirroring how the out-of-scope IL
/// grammar is expected to represent constant data: as a named module-level
/// global the lowerer resolves by name.
pub fn intern_string_global(module: &mut Module, name: impl Into<String>, s: &str) -> ExternalName {
    let name = name.into();
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    module.globals.push(Global::Bytes {
        name: name.clone(),
        bytes,
    });
    ExternalName(name)
}

pub fn call_direct(name: impl Into<String>) -> CallTarget {
    CallTarget::Direct(ExternalName(name.into()))
}
