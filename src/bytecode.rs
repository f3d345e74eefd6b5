//! # Instruction Set
//!
//! Defines the instruction (`Instr`) and instruction-set (`InstructionSet`)
//! types that make up a compiled method, block, or class body, plus the
//! parameter-kind metadata the argument binder (`crate::call`) consumes.
//!
//! Mirrors the shape of the teacher runtime's `bytecode::Instr` — one
//! variant per opcode, operands decoded inline — generalized from a
//! flat-function language to one with method dispatch, blocks, and
//! keyword/splat parameters. Unlike the teacher, this crate has no on-disk
//! encoding: the external compiler (out of scope, per spec.md §1) is
//! responsible for producing `InstructionSet` values directly; there is no
//! byte-level parser here to keep in sync with a wire format this crate
//! does not own.

use std::rc::Rc;

use crate::error::ErrorKind;

/// Parsed form of a call-site block tag (spec.md §4.5: `"block:<NAME>"`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockFlag {
    /// No block literal at this call site.
    None,
    /// A block literal named `NAME` in the compiler's `"block:<NAME>"` tag.
    Named(String),
}

impl BlockFlag {
    /// Parse the compiler's call-site tag. Per spec.md §4.5: split on `:`
    /// and treat anything after `"block:"` as the block's name. An empty
    /// string means "no block".
    pub fn parse(raw: &str) -> BlockFlag {
        if raw.is_empty() {
            return BlockFlag::None;
        }
        match raw.split_once(':') {
            Some(("block", name)) if !name.is_empty() => BlockFlag::Named(name.to_string()),
            _ => BlockFlag::None,
        }
    }
}

/// The kind of a formal parameter, per spec.md §3.
#[derive(Clone)]
pub enum ParamKind {
    /// A plain positional parameter with no default.
    Normal,
    /// A positional parameter with a default, evaluated in the callee frame
    /// when not supplied. The default body is itself an instruction set so
    /// it can reference earlier parameters already bound in the same call.
    Optioned(Rc<InstructionSet>),
    /// Collects unmatched trailing positional actuals into an array.
    Splat,
    /// A keyword parameter that must be supplied by the caller.
    RequiredKeyword,
    /// A keyword parameter with a default, evaluated like `Optioned`.
    OptionalKeyword(Rc<InstructionSet>),
}

/// One formal parameter: its surface name and its kind.
#[derive(Clone)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
}

/// The ordered parameter list of a compiled method or block, used by the
/// argument binder (`crate::call::bind_arguments`).
#[derive(Clone, Default)]
pub struct CallSignature {
    pub params: Vec<Param>,
}

impl CallSignature {
    pub fn new(params: Vec<Param>) -> CallSignature {
        CallSignature { params }
    }

    /// Count of `Normal` parameters (`pn` in spec.md §4.3).
    pub fn normal_count(&self) -> usize {
        self.params
            .iter()
            .filter(|p| matches!(p.kind, ParamKind::Normal))
            .count()
    }

    /// Total parameter count (`p` in spec.md §4.3).
    pub fn total_count(&self) -> usize {
        self.params.len()
    }

    pub fn has_splat(&self) -> bool {
        self.params.iter().any(|p| matches!(p.kind, ParamKind::Splat))
    }
}

/// How one stack position at a call site should be interpreted once popped.
///
/// This is call-site metadata carried by the `Send`/`SendDynamic` opcode
/// itself (resolved in §9's "interleaved, tagged" decision), not data that
/// rides on the evaluation stack — the stack only ever holds plain
/// [`crate::value::Value`]s. `argc` is `arg_sites.len()`.
#[derive(Clone)]
pub enum ArgSite {
    /// An ordinary positional actual.
    Positional,
    /// A keyword actual, tagged with its parameter name.
    Keyword(String),
    /// A splat-tagged array to be expanded into positionals before the rest
    /// of the send protocol runs (spec.md §4.2 step 1).
    Splat,
}

/// One bytecode instruction. Payload-bearing variants carry their decoded
/// operands directly, same as the teacher's `Instr`.
#[derive(Clone)]
pub enum Instr {
    // ----- Literals -----
    PushInt(i64),
    PushStr(String),
    PushBool(bool),
    PushNil,
    PushSelf,
    /// Push a reference to a compiled block/method as a first-class value.
    PushBlock(MethodRef),
    /// Resolve `name` against the current frame's `self` via `find_method`
    /// and push the result as a first-class value: `Value::Block` for a
    /// compiled method, `Value::Builtin` for a built-in one (spec.md §3
    /// lists both "blocks (method objects)" and "built-in methods" as
    /// value-model variants). Unlike `PushBlock`, which resolves a
    /// statically-named block against the current file's registry, this
    /// resolves dynamically through the receiver's class chain — the
    /// construction path for a first-class reference to an arbitrary
    /// (possibly built-in) method, e.g. the surface form `method(:name)`.
    PushMethod(String),
    // ----- Locals / constants -----
    /// Load a local by `(index, depth)`; `depth` walks `ep` that many hops.
    GetLocal(usize, usize),
    SetLocal(usize, usize),
    /// Look up a top-level class by name (the "class registry" contract).
    GetConst(String),
    // ----- Aggregate construction -----
    BuildArray(usize),
    // ----- Method dispatch -----
    /// Ordinary call: method name travels with the opcode, no stack marker.
    /// `arg_sites.len()` is the argument count popped from the stack.
    Send { name: String, arg_sites: Vec<ArgSite>, block: BlockFlag },
    /// `obj.send(:name, *args)`: the method name is the marker value pushed
    /// just above the receiver. See spec.md §4.2 and §9's resolved open
    /// question.
    SendDynamic { arg_sites: Vec<ArgSite>, block: BlockFlag },
    /// Invoke the block attached to the current frame (`yield`).
    Yield(usize),
    // ----- Control flow -----
    Jump(usize),
    JumpIfFalse(usize),
    Pop,
    Ret,
    Halt,
    /// Synthesize and push an error value of the given kind (used by
    /// builtins and by compiled `raise`-style surface constructs).
    Raise(ErrorKind, String),
}

/// A reference to a named block/method body, resolved against the current
/// file's registry at `PushBlock` execution time.
#[derive(Clone)]
pub struct MethodRef {
    pub name: String,
    pub filename: String,
}

/// The three flavors of compiled instruction set, per spec.md §3.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InstructionSetKind {
    Method,
    Block,
    Class,
}

/// An ordered, immutable instruction stream plus the filename it originated
/// from and (for methods/blocks) its parameter signature.
pub struct InstructionSet {
    pub name: String,
    pub filename: String,
    pub kind: InstructionSetKind,
    pub instructions: Vec<Instr>,
    pub signature: CallSignature,
}

impl InstructionSet {
    pub fn new(
        name: impl Into<String>,
        filename: impl Into<String>,
        kind: InstructionSetKind,
        instructions: Vec<Instr>,
        signature: CallSignature,
    ) -> InstructionSet {
        InstructionSet {
            name: name.into(),
            filename: filename.into(),
            kind,
            instructions,
            signature,
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}
