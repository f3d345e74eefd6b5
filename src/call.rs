//! # Call Object & Argument Binder
//!
//! Implements spec.md §4.3's argument-binding algorithm: arity checking,
//! required-keyword presence, keyword assignment, and positional
//! assignment (including splat-absorbs-remainder and optioned defaults).
//!
//! The binder here (`bind_arguments`) is deliberately pure — it has no
//! access to the interpreter and cannot itself run an optioned parameter's
//! default-value instruction sequence, since doing so means re-entering the
//! dispatch loop. It instead reports, per parameter, either a bound
//! [`Value`] or "this one needs its default evaluated"
//! ([`BoundParam::NeedsDefault`]); `crate::thread::Thread` performs that
//! evaluation during frame activation (§4.3 step 5), in left-to-right
//! parameter order, exactly as the spec requires.
//!
//! [`CallObject`] is the transient descriptor spec.md §3 describes: it
//! exists only for the duration of one method-entry sequence and is
//! consumed (not kept around) once the callee frame is built.

use std::rc::Rc;

use crate::bytecode::{CallSignature, InstructionSet, ParamKind};
use crate::error::{init_error_object, ErrorKind};
use crate::frame::FrameId;
use crate::value::Value;

/// One already-separated actual argument, after call-site splat expansion
/// (spec.md §4.2 step 1) has already run.
pub enum Arg {
    Positional(Value),
    Keyword(String, Value),
}

/// The result of binding one formal parameter, before frame activation.
pub enum BoundParam {
    /// A value ready to install as the parameter's local binding.
    Value(Value),
    /// No actual was supplied; evaluate this default instruction sequence
    /// in the callee frame (left-to-right across all such parameters) to
    /// obtain the binding.
    NeedsDefault(Rc<InstructionSet>),
}

/// Transient descriptor built at method entry (spec.md §3's "Call object").
/// `Thread::invoke_compiled` builds one per compiled-method dispatch and
/// drives binding and frame activation through it, per §4.2 step 4.
pub struct CallObject {
    pub receiver: Value,
    pub method: Rc<InstructionSet>,
    /// Evaluation-stack height at call entry — where this call's eventual
    /// result will land once pushed (the "receiver stack position" spec.md
    /// §3 describes; this crate pops the receiver by value rather than
    /// indexing it in place, so the position is recorded, not dereferenced).
    pub receiver_pos: usize,
    pub argc: usize,
    pub block_frame: Option<FrameId>,
    pub callee_frame: Option<FrameId>,
}

impl CallObject {
    pub fn new(
        receiver: Value,
        method: Rc<InstructionSet>,
        receiver_pos: usize,
        argc: usize,
        block_frame: Option<FrameId>,
    ) -> CallObject {
        CallObject {
            receiver,
            method,
            receiver_pos,
            argc,
            block_frame,
            callee_frame: None,
        }
    }
}

/// Bind `args` against `signature`, per spec.md §4.3 steps 1-4.
///
/// Returns one [`BoundParam`] per formal parameter, in declaration order, or
/// an `ArgumentError` [`Value`] describing the first binder failure.
/// `method_name` is used only to compose error messages.
pub fn bind_arguments(
    signature: &CallSignature,
    mut args: Vec<Arg>,
    method_name: &str,
) -> Result<Vec<BoundParam>, Value> {
    let p = signature.total_count();
    let pn = signature.normal_count();
    let has_splat = signature.has_splat();

    // Separate keyword actuals out so positional assignment only sees
    // positional ones; keywords are matched by name regardless of order.
    let mut keyword_actuals: Vec<(String, Value)> = Vec::new();
    let mut positional_actuals: Vec<Value> = Vec::new();
    for arg in args.drain(..) {
        match arg {
            Arg::Positional(v) => positional_actuals.push(v),
            Arg::Keyword(name, v) => keyword_actuals.push((name, v)),
        }
    }
    let a = positional_actuals.len();

    // --- Step 1: arity check ---
    if a > pn && !has_splat && a + keyword_actuals.len() > p {
        return Err(init_error_object(
            ErrorKind::ArgumentError,
            format!("Expect at most {} args for method '{}'. got: {}", p, method_name, a),
        ));
    }
    if a < pn {
        return Err(init_error_object(
            ErrorKind::ArgumentError,
            format!(
                "Expect at least {} args for method '{}'. got: {}",
                pn, method_name, a
            ),
        ));
    }

    // --- Step 2: required-keyword presence ---
    for param in &signature.params {
        if matches!(param.kind, ParamKind::RequiredKeyword)
            && !keyword_actuals.iter().any(|(k, _)| k == &param.name)
        {
            return Err(init_error_object(
                ErrorKind::ArgumentError,
                format!("Method {} requires key argument {}", method_name, param.name),
            ));
        }
    }

    // --- Step 3: keyword assignment ---
    let mut bound: Vec<Option<BoundParam>> = signature.params.iter().map(|_| None).collect();
    for (idx, param) in signature.params.iter().enumerate() {
        match &param.kind {
            ParamKind::RequiredKeyword => {
                let (_, v) = keyword_actuals
                    .iter()
                    .find(|(k, _)| k == &param.name)
                    .ok_or_else(|| {
                        init_error_object(
                            ErrorKind::ArgumentError,
                            format!("Method {} requires key argument {}", method_name, param.name),
                        )
                    })?;
                bound[idx] = Some(BoundParam::Value(v.clone()));
            }
            ParamKind::OptionalKeyword(default_is) => {
                bound[idx] = Some(match keyword_actuals.iter().find(|(k, _)| k == &param.name) {
                    Some((_, v)) => BoundParam::Value(v.clone()),
                    None => BoundParam::NeedsDefault(default_is.clone()),
                });
            }
            _ => {}
        }
    }

    // --- Step 4: positional assignment ---
    // "No extras" means every positional actual maps one-to-one onto a
    // `Normal` parameter with nothing left over *and* nothing to default:
    // a signature carrying any `Optioned`/`Splat` parameter always needs
    // the general walk below, even when `a == pn` exactly, so that an
    // omitted optional argument still reaches `BoundParam::NeedsDefault`
    // instead of silently binding to `Nil`.
    let has_optional_shape = signature
        .params
        .iter()
        .any(|p| matches!(p.kind, ParamKind::Optioned(_) | ParamKind::Splat));
    let extras_present = a != pn || has_optional_shape;
    if !extras_present {
        // Every normal parameter binds positionally, one-to-one.
        let mut cursor = 0usize;
        for (idx, param) in signature.params.iter().enumerate() {
            if matches!(param.kind, ParamKind::Normal) {
                bound[idx] = Some(BoundParam::Value(positional_actuals[cursor].clone()));
                cursor += 1;
            }
        }
    } else {
        let mut cursor = 0usize;
        for (idx, param) in signature.params.iter().enumerate() {
            match &param.kind {
                ParamKind::Normal => {
                    let v = positional_actuals.get(cursor).cloned().ok_or_else(|| {
                        init_error_object(
                            ErrorKind::ArgumentError,
                            format!(
                                "Expect at least {} args for method '{}'. got: {}",
                                pn, method_name, a
                            ),
                        )
                    })?;
                    bound[idx] = Some(BoundParam::Value(v));
                    cursor += 1;
                }
                ParamKind::Optioned(default_is) => {
                    bound[idx] = Some(match positional_actuals.get(cursor) {
                        Some(v) => {
                            cursor += 1;
                            BoundParam::Value(v.clone())
                        }
                        None => BoundParam::NeedsDefault(default_is.clone()),
                    });
                }
                ParamKind::Splat => {
                    let rest: Vec<Value> = positional_actuals[cursor.min(positional_actuals.len())..]
                        .to_vec();
                    cursor = positional_actuals.len();
                    bound[idx] = Some(BoundParam::Value(Value::Array(std::rc::Rc::new(
                        std::cell::RefCell::new(rest),
                    ))));
                }
                ParamKind::RequiredKeyword | ParamKind::OptionalKeyword(_) => {}
            }
        }
    }

    Ok(bound
        .into_iter()
        .map(|b| b.unwrap_or(BoundParam::Value(Value::Nil)))
        .collect())
}
