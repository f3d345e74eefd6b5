//! End-to-end dispatch-loop tests, built the same way
//! `omg_runtime::vm::tests` does: a literal instruction vector plus a direct
//! assertion on the run result — no compiler, no parser, just hand-assembled
//! bytecode exercising spec.md §8's invariants and literal scenarios.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::bytecode::{
    ArgSite, BlockFlag, CallSignature, Instr, InstructionSet, InstructionSetKind, Param, ParamKind,
};
use crate::error::ErrorKind;
use crate::frame::FrameId;
use crate::registry::{ClassRegistry, Registry};
use crate::value::{BuiltinBody, Class, Instance, Value};

use super::{Thread, ThreadConfig};

fn method_is(
    name: &str,
    filename: &str,
    instructions: Vec<Instr>,
    signature: CallSignature,
) -> Rc<InstructionSet> {
    Rc::new(InstructionSet::new(
        name,
        filename,
        InstructionSetKind::Method,
        instructions,
        signature,
    ))
}

fn block_is(name: &str, filename: &str, instructions: Vec<Instr>) -> Rc<InstructionSet> {
    Rc::new(InstructionSet::new(
        name,
        filename,
        InstructionSetKind::Block,
        instructions,
        CallSignature::default(),
    ))
}

fn new_thread() -> Thread {
    Thread::new(
        Box::new(Registry::new()),
        ClassRegistry::with_builtins(),
        ThreadConfig::default(),
    )
}

fn run_program(thread: &mut Thread, instructions: Vec<Instr>) -> Value {
    let program = method_is("main", "main.rb", instructions, CallSignature::default());
    thread
        .execute_program(program, Value::Nil)
        .expect("dispatch loop should not fault")
}

/// S1: `1 + 2` via the integer built-in leaves `3` as the single result.
#[test]
fn s1_integer_addition() {
    let mut thread = new_thread();
    let result = run_program(
        &mut thread,
        vec![
            Instr::PushInt(1),
            Instr::PushInt(2),
            Instr::Send {
                name: "+".to_string(),
                arg_sites: vec![ArgSite::Positional],
                block: BlockFlag::None,
            },
            Instr::Ret,
        ],
    );
    assert!(matches!(result, Value::Int(3)));
}

/// S2: `foo(1, 2)` against a `(a, b, c)` signature raises the exact
/// `ArgumentError` message spec.md §8 specifies.
#[test]
fn s2_arity_error_message() {
    let mut thread = new_thread();
    let foo = method_is(
        "foo",
        "main.rb",
        vec![Instr::PushNil, Instr::Ret],
        CallSignature::new(vec![
            Param { name: "a".into(), kind: ParamKind::Normal },
            Param { name: "b".into(), kind: ParamKind::Normal },
            Param { name: "c".into(), kind: ParamKind::Normal },
        ]),
    );
    thread.classes.nil_class.define_compiled("foo", foo);

    let result = run_program(
        &mut thread,
        vec![
            Instr::PushSelf,
            Instr::PushInt(1),
            Instr::PushInt(2),
            Instr::Send {
                name: "foo".to_string(),
                arg_sites: vec![ArgSite::Positional, ArgSite::Positional],
                block: BlockFlag::None,
            },
            Instr::Ret,
        ],
    );
    match result {
        Value::Error { kind, message } => {
            assert_eq!(kind, ErrorKind::ArgumentError);
            assert_eq!(message, "Expect at least 3 args for method 'foo'. got: 2");
        }
        other => panic!("expected ArgumentError, got {:?}", other),
    }
}

/// S3: `"3.14".to_d + "0.01".to_d`; `to_s` of the result is `"3.150"`.
#[test]
fn s3_decimal_arithmetic_and_formatting() {
    let mut thread = new_thread();
    let result = run_program(
        &mut thread,
        vec![
            Instr::PushStr("3.14".to_string()),
            Instr::Send { name: "to_d".to_string(), arg_sites: vec![], block: BlockFlag::None },
            Instr::PushStr("0.01".to_string()),
            Instr::Send { name: "to_d".to_string(), arg_sites: vec![], block: BlockFlag::None },
            Instr::Send {
                name: "+".to_string(),
                arg_sites: vec![ArgSite::Positional],
                block: BlockFlag::None,
            },
            Instr::Send { name: "to_s".to_string(), arg_sites: vec![], block: BlockFlag::None },
            Instr::Ret,
        ],
    );
    match result {
        Value::Str(s) => assert_eq!(s, "3.150"),
        other => panic!("expected a formatted Decimal string, got {:?}", other),
    }
}

/// Block lexical capture via `ep` (spec.md §8 property 6 / scenario S4):
/// a block that mutates a free variable in its calling frame sees every
/// yield accumulate into that same binding, because each invocation reads
/// the *current* state of the parent frame through `ep` rather than a
/// snapshot taken when the block was created.
#[test]
fn block_yield_accumulates_into_enclosing_frame_local() {
    let mut thread = new_thread();
    let filename = "main.rb";

    // `repeat3`: yields 10, then 20, then 30 to whatever block is attached.
    let repeat3 = method_is(
        "repeat3",
        filename,
        vec![
            Instr::PushInt(10),
            Instr::Yield(1),
            Instr::Pop,
            Instr::PushInt(20),
            Instr::Yield(1),
            Instr::Pop,
            Instr::PushInt(30),
            Instr::Yield(1),
            Instr::Pop,
            Instr::PushNil,
            Instr::Ret,
        ],
        CallSignature::default(),
    );
    thread.classes.nil_class.define_compiled("repeat3", repeat3);

    // `{ |x| sum += x }`, expressed as: sum = sum + x; read/write `sum`
    // (depth 1: the calling "runner" frame) around a local `x` (depth 0).
    let block = block_is(
        "blk",
        filename,
        vec![
            Instr::GetLocal(0, 1), // sum (parent frame)
            Instr::GetLocal(0, 0), // x (this block's own local)
            Instr::Send {
                name: "+".to_string(),
                arg_sites: vec![ArgSite::Positional],
                block: BlockFlag::None,
            },
            Instr::SetLocal(0, 1), // write back into parent's sum
            Instr::PushNil,
            Instr::Ret,
        ],
    );
    thread.registry.register_block(block);

    let runner = method_is(
        "runner",
        filename,
        vec![
            Instr::PushInt(0),
            Instr::SetLocal(0, 0), // sum = 0
            Instr::PushSelf,
            Instr::Send {
                name: "repeat3".to_string(),
                arg_sites: vec![],
                block: BlockFlag::Named("blk".to_string()),
            },
            Instr::Pop,
            Instr::GetLocal(0, 0), // return sum
            Instr::Ret,
        ],
        CallSignature::default(),
    );

    let result = thread
        .execute_program(runner, Value::Nil)
        .expect("dispatch loop should not fault");
    assert!(matches!(result, Value::Int(60)), "expected sum == 60, got {:?}", result);
}

/// S5: `bar(1, key: 2)` binds `a=1, key=2`; omitting `key:` raises the exact
/// `ArgumentError` message spec.md §8 specifies.
#[test]
fn s5_required_keyword_binding_and_error() {
    let mut thread = new_thread();
    let bar = method_is(
        "bar",
        "main.rb",
        vec![
            Instr::GetLocal(0, 0),
            Instr::GetLocal(1, 0),
            Instr::Send {
                name: "+".to_string(),
                arg_sites: vec![ArgSite::Positional],
                block: BlockFlag::None,
            },
            Instr::Ret,
        ],
        CallSignature::new(vec![
            Param { name: "a".into(), kind: ParamKind::Normal },
            Param { name: "key".into(), kind: ParamKind::RequiredKeyword },
        ]),
    );
    thread.classes.nil_class.define_compiled("bar", bar);

    let missing_key = run_program(
        &mut thread,
        vec![
            Instr::PushSelf,
            Instr::PushInt(1),
            Instr::Send {
                name: "bar".to_string(),
                arg_sites: vec![ArgSite::Positional],
                block: BlockFlag::None,
            },
            Instr::Ret,
        ],
    );
    match missing_key {
        Value::Error { kind, message } => {
            assert_eq!(kind, ErrorKind::ArgumentError);
            assert_eq!(message, "Method bar requires key argument key");
        }
        other => panic!("expected ArgumentError, got {:?}", other),
    }

    let bound = run_program(
        &mut thread,
        vec![
            Instr::PushSelf,
            Instr::PushInt(1),
            Instr::PushInt(2),
            Instr::Send {
                name: "bar".to_string(),
                arg_sites: vec![ArgSite::Positional, ArgSite::Keyword("key".to_string())],
                block: BlockFlag::None,
            },
            Instr::Ret,
        ],
    );
    assert!(matches!(bound, Value::Int(3)));
}

/// S6: `"1.0".to_d == 1` is `false` (type mismatch, not a `TypeError`), and
/// `"1.0".to_d != "x"` is `true`.
#[test]
fn s6_decimal_equality_never_type_errors() {
    let mut thread = new_thread();

    let eq_int = run_program(
        &mut thread,
        vec![
            Instr::PushStr("1.0".to_string()),
            Instr::Send { name: "to_d".to_string(), arg_sites: vec![], block: BlockFlag::None },
            Instr::PushInt(1),
            Instr::Send {
                name: "==".to_string(),
                arg_sites: vec![ArgSite::Positional],
                block: BlockFlag::None,
            },
            Instr::Ret,
        ],
    );
    assert!(matches!(eq_int, Value::Bool(false)));

    let ne_str = run_program(
        &mut thread,
        vec![
            Instr::PushStr("1.0".to_string()),
            Instr::Send { name: "to_d".to_string(), arg_sites: vec![], block: BlockFlag::None },
            Instr::PushStr("x".to_string()),
            Instr::Send {
                name: "!=".to_string(),
                arg_sites: vec![ArgSite::Positional],
                block: BlockFlag::None,
            },
            Instr::Ret,
        ],
    );
    assert!(matches!(ne_str, Value::Bool(true)));
}

/// Property 4: splat absorbs the positional remainder, preserving order.
#[test]
fn splat_absorbs_remainder_in_order() {
    let mut thread = new_thread();
    let variadic = method_is(
        "variadic",
        "main.rb",
        vec![Instr::GetLocal(1, 0), Instr::Ret],
        CallSignature::new(vec![
            Param { name: "a".into(), kind: ParamKind::Normal },
            Param { name: "rest".into(), kind: ParamKind::Splat },
        ]),
    );
    thread.classes.nil_class.define_compiled("variadic", variadic);

    let result = run_program(
        &mut thread,
        vec![
            Instr::PushSelf,
            Instr::PushInt(1),
            Instr::PushInt(2),
            Instr::PushInt(3),
            Instr::Send {
                name: "variadic".to_string(),
                arg_sites: vec![ArgSite::Positional, ArgSite::Positional, ArgSite::Positional],
                block: BlockFlag::None,
            },
            Instr::Ret,
        ],
    );
    match result {
        Value::Array(items) => {
            let items = items.borrow();
            assert_eq!(items.len(), 2);
            assert!(matches!(items[0], Value::Int(2)));
            assert!(matches!(items[1], Value::Int(3)));
        }
        other => panic!("expected the splat array, got {:?}", other),
    }
}

/// Optioned defaults are evaluated left-to-right and may reference earlier
/// parameters already bound in the same call (spec.md §4.3).
#[test]
fn optioned_default_reads_earlier_parameter() {
    let mut thread = new_thread();
    let default_b = block_is("bar$b_default", "main.rb", vec![Instr::GetLocal(0, 1), Instr::Ret]);
    let with_default = method_is(
        "with_default",
        "main.rb",
        vec![
            Instr::GetLocal(0, 0),
            Instr::GetLocal(1, 0),
            Instr::Send {
                name: "+".to_string(),
                arg_sites: vec![ArgSite::Positional],
                block: BlockFlag::None,
            },
            Instr::Ret,
        ],
        CallSignature::new(vec![
            Param { name: "a".into(), kind: ParamKind::Normal },
            Param { name: "b".into(), kind: ParamKind::Optioned(default_b) },
        ]),
    );
    thread.classes.nil_class.define_compiled("with_default", with_default);

    let result = run_program(
        &mut thread,
        vec![
            Instr::PushSelf,
            Instr::PushInt(5),
            Instr::Send {
                name: "with_default".to_string(),
                arg_sites: vec![ArgSite::Positional],
                block: BlockFlag::None,
            },
            Instr::Ret,
        ],
    );
    assert!(matches!(result, Value::Int(10)), "expected a+b == 10 (b defaults to a), got {:?}", result);
}

/// Property 1: after a top-level call returns, `sp` is exactly the pre-call
/// height plus one, holding the call's single result.
#[test]
fn stack_balance_after_call() {
    let mut thread = new_thread();
    let program = method_is(
        "main",
        "main.rb",
        vec![
            Instr::PushInt(1),
            Instr::PushInt(2),
            Instr::Send {
                name: "+".to_string(),
                arg_sites: vec![ArgSite::Positional],
                block: BlockFlag::None,
            },
            Instr::Ret,
        ],
        CallSignature::default(),
    );
    let frame_id = thread
        .frames
        .alloc(crate::frame::CallFrame::new(program, None, Value::Nil, false, None));
    thread.frame_stack.push(frame_id);
    let pre_call_sp = thread.stack.sp();
    thread.start_from_top_frame().expect("no fault");
    assert_eq!(thread.stack.sp(), pre_call_sp + 1);
    assert!(matches!(thread.stack.peek(), Some(Value::Int(3))));
}

/// Property 2: once the sentinel is an error, no instruction after the
/// failing send executes — the `PushInt(99)` below never overwrites it.
#[test]
fn error_monotonicity_short_circuits_the_frame() {
    let mut thread = new_thread();
    let result = run_program(
        &mut thread,
        vec![
            Instr::PushStr("1.0".to_string()),
            Instr::Send { name: "to_d".to_string(), arg_sites: vec![], block: BlockFlag::None },
            Instr::PushStr("not a number".to_string()),
            Instr::Send {
                name: "+".to_string(),
                arg_sites: vec![ArgSite::Positional],
                block: BlockFlag::None,
            },
            // Never reached: the sentinel check ends the frame before this runs.
            Instr::Pop,
            Instr::PushInt(99),
            Instr::Ret,
        ],
    );
    match result {
        Value::Error { kind, .. } => assert_eq!(kind, ErrorKind::TypeError),
        other => panic!("expected the TypeError to survive unharmed, got {:?}", other),
    }
}

#[test]
fn undefined_method_send_produces_undefined_method_error() {
    let mut thread = new_thread();
    let result = run_program(
        &mut thread,
        vec![
            Instr::PushInt(1),
            Instr::Send { name: "frobnicate".to_string(), arg_sites: vec![], block: BlockFlag::None },
            Instr::Ret,
        ],
    );
    match result {
        Value::Error { kind, .. } => assert_eq!(kind, ErrorKind::UndefinedMethodError),
        other => panic!("expected UndefinedMethodError, got {:?}", other),
    }
}

#[test]
fn decimal_new_is_unsupported() {
    let mut thread = new_thread();
    let result = run_program(
        &mut thread,
        vec![
            Instr::GetConst("Decimal".to_string()),
            Instr::Send { name: "new".to_string(), arg_sites: vec![], block: BlockFlag::None },
            Instr::Ret,
        ],
    );
    match result {
        Value::Error { kind, .. } => assert_eq!(kind, ErrorKind::UnsupportedMethodError),
        other => panic!("expected UnsupportedMethodError, got {:?}", other),
    }
}

/// `PushMethod` resolves against `self` and pushes a first-class value:
/// `Value::Builtin` for a built-in method, per spec.md §3's value-model
/// listing ("blocks (method objects)... built-in methods").
#[test]
fn push_method_produces_a_first_class_builtin_value() {
    let mut thread = new_thread();
    let program = method_is(
        "main",
        "main.rb",
        vec![Instr::PushMethod("+".to_string()), Instr::Ret],
        CallSignature::default(),
    );
    let result = thread
        .execute_program(program, Value::Int(5))
        .expect("dispatch loop should not fault");
    assert!(matches!(result, Value::Builtin(_)), "expected Value::Builtin, got {:?}", result);
}

/// `PushMethod` against a compiled method pushes `Value::Block`, the same
/// first-class shape `PushBlock` produces for a named block literal.
#[test]
fn push_method_produces_a_first_class_block_value_for_compiled_methods() {
    let mut thread = new_thread();
    let greet = method_is("greet", "main.rb", vec![Instr::PushNil, Instr::Ret], CallSignature::default());
    thread.classes.nil_class.define_compiled("greet", greet);

    let program = method_is(
        "main",
        "main.rb",
        vec![Instr::PushMethod("greet".to_string()), Instr::Ret],
        CallSignature::default(),
    );
    let result = thread
        .execute_program(program, Value::Nil)
        .expect("dispatch loop should not fault");
    assert!(matches!(result, Value::Block(_)), "expected Value::Block, got {:?}", result);
}

/// Builtin entry for a test-only `Counter` class's `new`: constructs a
/// fresh, empty `Instance` of whatever class it is dispatched on (spec.md
/// §4.4 step 3's precondition for the recursive-initializer special case).
fn entry_counter_new(receiver: &Value, _source_line: usize) -> BuiltinBody {
    let class = match receiver {
        Value::ClassObject(c) => c.clone(),
        other => panic!("Counter.new dispatched on a non-class receiver: {:?}", other),
    };
    Box::new(move |_thread: &mut Thread, _args: &[Value], _block: Option<FrameId>| -> Value {
        Value::Instance(Rc::new(Instance {
            class: class.clone(),
            ivars: RefCell::new(HashMap::new()),
        }))
    })
}

/// spec.md §4.4 step 3: `new` on a class whose fresh instance carries a
/// compiled `initialize` recursively invokes that initializer through the
/// same binder. Success case: `initialize` runs but its own return value is
/// discarded — `Counter.new` still yields the instance itself.
#[test]
fn new_recursively_invokes_a_successful_compiled_initializer() {
    let mut thread = new_thread();
    let counter = Class::new("Counter", None);
    counter.define_builtin("new", entry_counter_new);
    let initialize = method_is(
        "initialize",
        "main.rb",
        vec![Instr::PushNil, Instr::Ret],
        CallSignature::default(),
    );
    counter.define_compiled("initialize", initialize);
    thread.classes.register_class(counter);

    let result = run_program(
        &mut thread,
        vec![
            Instr::GetConst("Counter".to_string()),
            Instr::Send { name: "new".to_string(), arg_sites: vec![], block: BlockFlag::None },
            Instr::Ret,
        ],
    );
    match result {
        Value::Instance(instance) => assert_eq!(instance.class.name, "Counter"),
        other => panic!("expected a Counter instance, got {:?}", other),
    }
}

/// Same setup, but `initialize` itself raises: the error it produces
/// overrides the fresh instance as `new`'s final result, proving the
/// recursive call's result is observed rather than discarded unconditionally.
#[test]
fn new_propagates_an_error_raised_by_compiled_initializer() {
    let mut thread = new_thread();
    let counter = Class::new("Counter", None);
    counter.define_builtin("new", entry_counter_new);
    let initialize = method_is(
        "initialize",
        "main.rb",
        vec![
            Instr::Raise(ErrorKind::ArgumentError, "initialize exploded".to_string()),
            Instr::Ret,
        ],
        CallSignature::default(),
    );
    counter.define_compiled("initialize", initialize);
    thread.classes.register_class(counter);

    let result = run_program(
        &mut thread,
        vec![
            Instr::GetConst("Counter".to_string()),
            Instr::Send { name: "new".to_string(), arg_sites: vec![], block: BlockFlag::None },
            Instr::Ret,
        ],
    );
    match result {
        Value::Error { kind, message } => {
            assert_eq!(kind, ErrorKind::ArgumentError);
            assert_eq!(message, "initialize exploded");
        }
        other => panic!("expected the initializer's ArgumentError, got {:?}", other),
    }
}
