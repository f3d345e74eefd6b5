//! # Error Kinds and Rust-Level Faults
//!
//! This module defines two distinct error concepts used throughout the
//! interpreter core, mirroring the split the teacher runtime draws between
//! a compact, bytecode-facing error *category* and a richer host-level error
//! *type*:
//!
//! - [`ErrorKind`] — the taxonomy of language-level error values the VM can
//!   produce (`UndefinedMethodError`, `ArgumentError`, `TypeError`,
//!   `UnsupportedMethodError`, `InternalError`). An instance of one of these,
//!   wrapped in [`crate::value::Value::Error`], is first-class data that
//!   lives on the evaluation stack per the error-sentinel contract.
//! - [`RuntimeFault`] — a Rust-level `Result::Err` type for conditions that
//!   are never supposed to reach the scripting language as a catchable
//!   error: operand-stack underflow, a dangling `FrameId`, or other
//!   interpreter-internal invariant violations. These indicate a bug in the
//!   core (or in a misbehaving compiler feeding it), not a user-visible
//!   runtime error.
//!
//! `init_error_object` is the "error object factory" contract `spec.md` §6
//! lists as consumed from the (out-of-scope) class/object system; it is
//! implemented directly here since no such system exists in this crate.

use std::fmt;

use crate::value::Value;

/// Taxonomy of language-level runtime errors the interpreter can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Method lookup via `find_method` returned nothing.
    UndefinedMethodError,
    /// Arity mismatch, missing required keyword, or other binder failure.
    ArgumentError,
    /// A built-in received an operand of an unsupported class.
    TypeError,
    /// A reserved name was invoked (e.g. `Decimal.new`).
    UnsupportedMethodError,
    /// Lookup yielded an error-typed value; a pathological internal state.
    InternalError,
}

impl ErrorKind {
    /// Short, stable name used as the error value's class-like tag.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::UndefinedMethodError => "UndefinedMethodError",
            ErrorKind::ArgumentError => "ArgumentError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::UnsupportedMethodError => "UnsupportedMethodError",
            ErrorKind::InternalError => "InternalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Build a language-level error [`Value`] of the given kind.
///
/// This is the "error object factory" referenced throughout §4 of the
/// spec (`init_error_object(kind, format, args…) -> Value`). A real
/// embedding with a full object system would route this through the
/// class registry so `rescue SomeError` can match on class identity;
/// here the kind itself doubles as that identity.
pub fn init_error_object(kind: ErrorKind, message: impl Into<String>) -> Value {
    Value::Error {
        kind,
        message: message.into(),
    }
}

/// Interpreter-internal fault: a Rust-level error distinct from the
/// language-level error values in [`ErrorKind`]. Never observed by a running
/// script; surfacing one means the core itself hit an invariant violation.
#[derive(Debug, PartialEq, Eq)]
pub enum RuntimeFault {
    /// Popped an empty evaluation stack.
    StackUnderflow(&'static str),
    /// Referenced a `FrameId` that the arena does not hold.
    DanglingFrame,
    /// The call-frame stack was empty when a frame was expected.
    EmptyFrameStack,
    /// Exceeded `ThreadConfig::max_frame_depth`.
    FrameDepthExceeded(usize),
}

impl fmt::Display for RuntimeFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeFault::StackUnderflow(where_) => {
                write!(f, "VmInvariant: stack underflow in {}", where_)
            }
            RuntimeFault::DanglingFrame => write!(f, "VmInvariant: dangling frame id"),
            RuntimeFault::EmptyFrameStack => write!(f, "VmInvariant: empty call-frame stack"),
            RuntimeFault::FrameDepthExceeded(max) => {
                write!(f, "VmInvariant: exceeded max frame depth ({})", max)
            }
        }
    }
}

impl std::error::Error for RuntimeFault {}
