//! # Built-in Classes
//!
//! Concrete built-in method tables for the small set of classes the core
//! itself needs to exercise the dispatch protocol (spec.md §4.6). Everything
//! else — `Array`, `String`, user classes — is populated by an embedding VM;
//! this crate only ships the one illustrative numeric type plus the handful
//! of conversions needed to construct it from literals.

pub mod integer;
pub mod rational;

use crate::value::Value;

/// Shared "what class is this value" helper used by both built-in tables to
/// compose `TypeError` messages without needing a [`crate::registry::ClassRegistry`]
/// on hand (these are pure Rust-level error strings, not `find_method` calls).
pub(crate) fn type_name(v: &Value) -> &'static str {
    match v {
        Value::ClassObject(_) => "Class",
        Value::Instance(_) => "Object",
        Value::Int(_) => "Integer",
        Value::Str(_) => "String",
        Value::Array(_) => "Array",
        Value::Bool(_) => "Boolean",
        Value::Nil => "NilClass",
        Value::Error { .. } => "Error",
        Value::Block(_) | Value::Builtin(_) => "Method",
        Value::Rational(_) => "Decimal",
    }
}
