//! # Example Numeric Type — Arbitrary-Precision Rational ("Decimal")
//!
//! Illustrates the built-in method protocol (spec.md §4.6): every operator
//! is a [`crate::value::BuiltinEntry`] installed on a `Decimal` [`Class`],
//! resolved through the same `find_method`/dispatch path as any compiled
//! method. Grounded on `omg_runtime::vm::builtins::call_builtin`'s
//! dispatch-by-name style, reshaped from a flat free-function namespace into
//! a single built-in class's method table, since spec.md describes this as
//! method dispatch on a receiver rather than a global function lookup.

use std::rc::Rc;

use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{Signed, Zero};
use once_cell::sync::Lazy;

use crate::error::{init_error_object, ErrorKind};
use crate::frame::FrameId;
use crate::thread::Thread;
use crate::value::{BuiltinBody, Class, Value};

/// 10^60, used by [`format_decimal`] to scale the fractional remainder to 60
/// digits without repeating the `pow` on every call.
static SCALE_60: Lazy<BigInt> = Lazy::new(|| BigInt::from(10u32).pow(60));

/// Install every `Decimal` operator plus the unsupported `new` class method.
pub fn install(class: &Rc<Class>) {
    class.define_builtin("+", entry_add);
    class.define_builtin("-", entry_sub);
    class.define_builtin("*", entry_mul);
    class.define_builtin("/", entry_div);
    class.define_builtin(">", entry_gt);
    class.define_builtin(">=", entry_ge);
    class.define_builtin("<", entry_lt);
    class.define_builtin("<=", entry_le);
    class.define_builtin("<=>", entry_cmp);
    class.define_builtin("==", entry_eq);
    class.define_builtin("!=", entry_ne);
    class.define_builtin("to_s", entry_to_s);
    class.define_builtin("new", entry_new_unsupported);
}

/// Install the `String#to_d` conversion that is the only supported way to
/// construct a `Decimal` (`Decimal.new` is deliberately unsupported).
/// Supplemental to spec.md §4.6 — without it the built-in type has no
/// constructor a test program could reach.
pub fn install_conversions(string_class: &Rc<Class>) {
    string_class.define_builtin("to_d", entry_to_d);
}

fn rational_of(receiver: &Value) -> Rc<BigRational> {
    match receiver {
        Value::Rational(r) => r.clone(),
        // Unreachable in practice: every entry here is only ever resolved
        // via `find_method` against a `Decimal` instance.
        _ => Rc::new(BigRational::zero()),
    }
}

/// Coerce the right-hand operand of an arithmetic/comparison op, per spec.md
/// §4.6: `Decimal` and `Integer` coerce; anything else is a `TypeError`.
fn coerce(arg: &Value) -> Result<BigRational, Value> {
    match arg {
        Value::Rational(r) => Ok((**r).clone()),
        Value::Int(i) => Ok(BigRational::from_integer(BigInt::from(*i))),
        other => Err(init_error_object(
            ErrorKind::TypeError,
            format!("wrong argument type Decimal, got {}", super::type_name(other)),
        )),
    }
}

fn first_arg(args: &[Value]) -> Result<&Value, Value> {
    args.first().ok_or_else(|| {
        init_error_object(
            ErrorKind::ArgumentError,
            "Expect at least 1 args for method. got: 0".to_string(),
        )
    })
}

/// Build a binary-operator [`BuiltinBody`]: coerce the operand, apply `op`,
/// wrap the result as a `Decimal` — or surface the `TypeError` unchanged.
fn binary_op(
    lhs: Rc<BigRational>,
    op: fn(&BigRational, &BigRational) -> BigRational,
) -> BuiltinBody {
    Box::new(move |_thread: &mut Thread, args: &[Value], _block: Option<FrameId>| -> Value {
        let rhs = match first_arg(args).and_then(coerce) {
            Ok(r) => r,
            Err(e) => return e,
        };
        Value::Rational(Rc::new(op(&lhs, &rhs)))
    })
}

/// Build a comparison [`BuiltinBody`]: coerce the operand, apply `op` to the
/// signed three-way ordering, wrap as `Boolean` — or surface the `TypeError`.
fn comparison_op(lhs: Rc<BigRational>, op: fn(std::cmp::Ordering) -> bool) -> BuiltinBody {
    Box::new(move |_thread: &mut Thread, args: &[Value], _block: Option<FrameId>| -> Value {
        let rhs = match first_arg(args).and_then(coerce) {
            Ok(r) => r,
            Err(e) => return e,
        };
        Value::Bool(op(lhs.cmp(&rhs)))
    })
}

fn entry_add(receiver: &Value, _source_line: usize) -> BuiltinBody {
    binary_op(rational_of(receiver), |a, b| a + b)
}

fn entry_sub(receiver: &Value, _source_line: usize) -> BuiltinBody {
    binary_op(rational_of(receiver), |a, b| a - b)
}

fn entry_mul(receiver: &Value, _source_line: usize) -> BuiltinBody {
    binary_op(rational_of(receiver), |a, b| a * b)
}

fn entry_div(receiver: &Value, _source_line: usize) -> BuiltinBody {
    let lhs = rational_of(receiver);
    Box::new(move |_thread: &mut Thread, args: &[Value], _block: Option<FrameId>| -> Value {
        let rhs = match first_arg(args).and_then(coerce) {
            Ok(r) => r,
            Err(e) => return e,
        };
        if rhs.is_zero() {
            return init_error_object(ErrorKind::TypeError, "divided by 0".to_string());
        }
        Value::Rational(Rc::new(&*lhs / &rhs))
    })
}

fn entry_gt(receiver: &Value, _source_line: usize) -> BuiltinBody {
    comparison_op(rational_of(receiver), |o| o.is_gt())
}

fn entry_ge(receiver: &Value, _source_line: usize) -> BuiltinBody {
    comparison_op(rational_of(receiver), |o| o.is_ge())
}

fn entry_lt(receiver: &Value, _source_line: usize) -> BuiltinBody {
    comparison_op(rational_of(receiver), |o| o.is_lt())
}

fn entry_le(receiver: &Value, _source_line: usize) -> BuiltinBody {
    comparison_op(rational_of(receiver), |o| o.is_le())
}

/// The "rocket" three-way comparison: `{-1, 0, 1}` (spec.md §4.6).
fn entry_cmp(receiver: &Value, _source_line: usize) -> BuiltinBody {
    let lhs = rational_of(receiver);
    Box::new(move |_thread: &mut Thread, args: &[Value], _block: Option<FrameId>| -> Value {
        let rhs = match first_arg(args).and_then(coerce) {
            Ok(r) => r,
            Err(e) => return e,
        };
        let ord = match lhs.cmp(&rhs) {
            std::cmp::Ordering::Less => -1,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => 1,
        };
        Value::Int(ord)
    })
}

/// `==` against any non-`Decimal` is `false`, never a `TypeError` (spec §4.6).
fn entry_eq(receiver: &Value, _source_line: usize) -> BuiltinBody {
    let lhs = rational_of(receiver);
    Box::new(move |_thread: &mut Thread, args: &[Value], _block: Option<FrameId>| -> Value {
        match args.first() {
            Some(Value::Rational(rhs)) => Value::Bool(*lhs == **rhs),
            _ => Value::Bool(false),
        }
    })
}

/// `!=` is the exact complement of `==`, same no-`TypeError` rule.
fn entry_ne(receiver: &Value, _source_line: usize) -> BuiltinBody {
    let lhs = rational_of(receiver);
    Box::new(move |_thread: &mut Thread, args: &[Value], _block: Option<FrameId>| -> Value {
        match args.first() {
            Some(Value::Rational(rhs)) => Value::Bool(*lhs != **rhs),
            _ => Value::Bool(true),
        }
    })
}

fn entry_to_s(receiver: &Value, _source_line: usize) -> BuiltinBody {
    let lhs = rational_of(receiver);
    Box::new(move |_thread: &mut Thread, _args: &[Value], _block: Option<FrameId>| -> Value {
        Value::Str(format_decimal(&lhs))
    })
}

/// `Decimal.new` is unsupported (spec.md §4.6): the only constructor is
/// `String#to_d`. The receiver here is the `Decimal` class object itself.
fn entry_new_unsupported(_receiver: &Value, _source_line: usize) -> BuiltinBody {
    Box::new(move |_thread: &mut Thread, _args: &[Value], _block: Option<FrameId>| -> Value {
        init_error_object(
            ErrorKind::UnsupportedMethodError,
            "Decimal.new is not supported, use String#to_d".to_string(),
        )
    })
}

/// Parse a decimal-literal string (`"3.14"`, `"-0.01"`, `"5"`) into a
/// `Decimal`. Supplemental conversion (see [`install_conversions`]).
fn entry_to_d(receiver: &Value, _source_line: usize) -> BuiltinBody {
    let text = match receiver {
        Value::Str(s) => s.clone(),
        other => other.to_string(),
    };
    Box::new(move |_thread: &mut Thread, _args: &[Value], _block: Option<FrameId>| -> Value {
        match parse_decimal(&text) {
            Some(r) => Value::Rational(Rc::new(r)),
            None => init_error_object(
                ErrorKind::ArgumentError,
                format!("invalid value for Decimal(): \"{}\"", text),
            ),
        }
    })
}

fn parse_decimal(text: &str) -> Option<BigRational> {
    let text = text.trim();
    let (neg, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, f),
        None => (text, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }
    let digits = format!("{}{}", int_part, frac_part);
    let numer: BigInt = if digits.is_empty() {
        BigInt::zero()
    } else {
        digits.parse().ok()?
    };
    let denom = BigInt::from(10u32).pow(frac_part.len() as u32);
    let mut value = BigRational::new(numer, denom);
    if neg {
        value = -value;
    }
    Some(value)
}

/// Format to 60 fractional digits, strip trailing zeros, then append exactly
/// one `0` (spec.md §4.6's literal `to_s` contract).
pub fn format_decimal(r: &BigRational) -> String {
    let neg = r.numer().is_negative();
    let numer_abs = r.numer().abs();
    let denom = r.denom().abs();
    let (int_part, remainder) = numer_abs.div_mod_floor(&denom);

    let scaled_numer = remainder * &*SCALE_60;
    let (frac, _) = scaled_numer.div_mod_floor(&denom);
    let mut frac_str = frac.to_str_radix(10);
    while frac_str.len() < 60 {
        frac_str.insert(0, '0');
    }
    let trimmed = frac_str.trim_end_matches('0');
    let mut frac_final = trimmed.to_string();
    frac_final.push('0');

    format!(
        "{}{}.{}",
        if neg { "-" } else { "" },
        int_part,
        frac_final
    )
}
