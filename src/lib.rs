//! # scriptcore
//!
//! The stack-based bytecode interpreter core described by spec.md: an
//! evaluation stack, a call-frame stack, an argument binder with five
//! parameter kinds, and the fetch/decode/execute dispatch loop that ties
//! them together, plus one illustrative built-in numeric type (`Decimal`,
//! an arbitrary-precision rational) that exercises the built-in-method
//! dispatch protocol.
//!
//! This crate is an execution *core*: the lexer, parser, bytecode
//! compiler, REPL/CLI, and concrete garbage collector are external
//! collaborators (spec.md §1) and are not part of this tree. An embedding
//! VM supplies an [`InstructionSetRegistry`](registry::InstructionSetRegistry)
//! populated from compiled source and drives [`Thread`](thread::Thread)
//! from a top-level frame.

pub mod builtins;
pub mod bytecode;
pub mod call;
pub mod error;
pub mod frame;
pub mod registry;
pub mod stack;
pub mod thread;
pub mod value;

pub use error::{ErrorKind, RuntimeFault};
pub use frame::{CallFrame, FrameId};
pub use registry::{ClassRegistry, InstructionSetRegistry, Registry};
pub use thread::{Thread, ThreadConfig};
pub use value::Value;
