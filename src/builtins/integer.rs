//! # `Integer` Arithmetic Built-in
//!
//! The one `Integer` operator spec.md §8 scenario S1 exercises directly
//! (`1 + 2` via "the integer built-in"). `Integer` itself is out of scope
//! per spec.md §1 ("all built-in classes other than the example arithmetic
//! one"), so this module stays deliberately narrow — a single
//! [`crate::value::BuiltinEntry`] installed on the fixed `Integer` class in
//! [`crate::registry::ClassRegistry`], not a full operator table.

use crate::error::{init_error_object, ErrorKind};
use crate::frame::FrameId;
use crate::thread::Thread;
use crate::value::{BuiltinBody, Class, Value};

pub fn install(class: &Class) {
    class.define_builtin("+", entry_add);
}

fn int_of(receiver: &Value) -> i64 {
    match receiver {
        Value::Int(i) => *i,
        _ => 0,
    }
}

fn require_int(args: &[Value]) -> Result<i64, Value> {
    match args.first() {
        Some(Value::Int(i)) => Ok(*i),
        Some(other) => Err(init_error_object(
            ErrorKind::TypeError,
            format!("wrong argument type Integer, got {}", super::type_name(other)),
        )),
        None => Err(init_error_object(
            ErrorKind::ArgumentError,
            "Expect at least 1 args for method. got: 0".to_string(),
        )),
    }
}

fn entry_add(receiver: &Value, _source_line: usize) -> BuiltinBody {
    let lhs = int_of(receiver);
    Box::new(move |_thread: &mut Thread, args: &[Value], _block: Option<FrameId>| -> Value {
        match require_int(args) {
            Ok(rhs) => Value::Int(lhs.wrapping_add(rhs)),
            Err(e) => e,
        }
    })
}
