//! # Value Representation for the Interpreter Core
//!
//! Defines [`Value`], the tagged universe of runtime values that flows
//! through the evaluation stack, locals, instance variables, and built-in
//! method bodies, plus the small object model ([`Class`], [`Instance`],
//! [`MethodValue`]) that backs method dispatch.
//!
//! ## Design
//! Per the spec's Design Notes, "polymorphic values should be a tagged sum
//! rather than a virtual-dispatch hierarchy" and `find_method` should be "a
//! function of the class pointer... not of the variant". Concretely:
//! [`Value::class`] and [`Value::find_method`] both take a [`ClassRegistry`]
//! explicitly (no hidden global lookup) so that primitive values (`Int`,
//! `Str`, `Array`, ...) can resolve a shared [`Class`] without each variant
//! carrying its own class pointer, while [`Value::Instance`] and
//! [`Value::ClassObject`] already own one directly.
//!
//! Lists and instance-variable maps use `Rc<RefCell<_>>` for the same
//! shared-mutable-heap reason the teacher runtime uses it for its own
//! `List`/`Dict` variants: multiple stack slots (and multiple variable
//! bindings) can alias the same heap object, and mutation must be visible
//! through every alias.

use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use num_rational::BigRational;
use serde_json::json;

use crate::bytecode::InstructionSet;
use crate::error::ErrorKind;
use crate::registry::ClassRegistry;

/// A compiled method or block body, wrapped so it can travel as a value
/// (passed as a block argument, stored in a variable, compared by identity).
#[derive(Clone)]
pub struct MethodObject {
    pub name: String,
    pub instructions: Rc<InstructionSet>,
}

/// A built-in method's two-stage callable, per spec §4.4 Design Notes:
/// `(Receiver, SourceLine) -> (Thread, Args, Block) -> Value`.
///
/// The first stage is a plain function pointer — stored directly in a
/// [`Class`]'s method table, so it is as cheap to keep around as any other
/// `MethodValue`. The second stage is the one piece of state a built-in
/// legitimately needs to close over (the receiver it was resolved against),
/// so it is boxed rather than forced into a second bare `fn` pointer; per the
/// spec's Design Notes this is an *immutable* capture of the receiver only —
/// no built-in body captures or mutates shared state beyond what `Thread`
/// already threads through explicitly.
pub type BuiltinBody = Box<dyn Fn(&mut crate::thread::Thread, &[Value], Option<crate::frame::FrameId>) -> Value>;
pub type BuiltinEntry = fn(receiver: &Value, source_line: usize) -> BuiltinBody;

/// A method resolved by `find_method`: either a compiled body or a built-in.
#[derive(Clone)]
pub enum MethodValue {
    Compiled(Rc<InstructionSet>),
    Builtin(BuiltinEntry),
}

/// A class object: name, optional superclass, and its own method table.
///
/// Method resolution order is the superclass chain; this crate does not
/// model mixins/modules since no in-scope built-in class needs them.
pub struct Class {
    pub name: String,
    pub superclass: Option<Rc<Class>>,
    pub methods: RefCell<HashMap<String, MethodValue>>,
}

impl Class {
    pub fn new(name: impl Into<String>, superclass: Option<Rc<Class>>) -> Rc<Class> {
        Rc::new(Class {
            name: name.into(),
            superclass,
            methods: RefCell::new(HashMap::new()),
        })
    }

    pub fn define_builtin(&self, name: &str, entry: BuiltinEntry) {
        self.methods
            .borrow_mut()
            .insert(name.to_string(), MethodValue::Builtin(entry));
    }

    pub fn define_compiled(&self, name: &str, iset: Rc<InstructionSet>) {
        self.methods
            .borrow_mut()
            .insert(name.to_string(), MethodValue::Compiled(iset));
    }

    /// Walk this class and its superclass chain looking for `name`.
    pub fn lookup(&self, name: &str) -> Option<MethodValue> {
        if let Some(m) = self.methods.borrow().get(name) {
            return Some(m.clone());
        }
        self.superclass.as_ref().and_then(|sup| sup.lookup(name))
    }
}

/// A heap-allocated instance: its class plus an instance-variable map.
pub struct Instance {
    pub class: Rc<Class>,
    pub ivars: RefCell<HashMap<String, Value>>,
}

/// The tagged universe of runtime values.
#[derive(Clone)]
pub enum Value {
    /// A class, exposed as a value so `SomeClass.new` can be sent to it.
    ClassObject(Rc<Class>),
    /// A heap-allocated instance of a user-defined class.
    Instance(Rc<Instance>),
    /// 64-bit signed integer.
    Int(i64),
    /// UTF-8 string.
    Str(String),
    /// Mutable, reference-counted array.
    Array(Rc<RefCell<Vec<Value>>>),
    /// Boolean truth value.
    Bool(bool),
    /// The unit/"nothing here" value (`nil`).
    Nil,
    /// A first-class error value; see [`crate::error::ErrorKind`].
    Error { kind: ErrorKind, message: String },
    /// A compiled method or block, callable via `yield`/`CallValue`-style ops.
    Block(MethodObject),
    /// A built-in method, resolved via [`Class::lookup`].
    Builtin(BuiltinEntry),
    /// The example arbitrary-precision rational ("Decimal") built-in type.
    Rational(Rc<BigRational>),
}

impl Value {
    /// Resolve this value's class, consulting `registry` for primitives
    /// whose class is a fixed, shared object rather than embedded in the
    /// variant itself.
    pub fn class(&self, registry: &ClassRegistry) -> Rc<Class> {
        match self {
            Value::ClassObject(c) => c.clone(),
            Value::Instance(inst) => inst.class.clone(),
            Value::Int(_) => registry.integer.clone(),
            Value::Str(_) => registry.string.clone(),
            Value::Array(_) => registry.array.clone(),
            Value::Bool(_) => registry.boolean.clone(),
            Value::Nil => registry.nil_class.clone(),
            Value::Error { .. } => registry.error.clone(),
            Value::Block(_) => registry.method.clone(),
            Value::Builtin(_) => registry.method.clone(),
            Value::Rational(_) => registry.decimal.clone(),
        }
    }

    /// Resolve a method by name against this value's class chain.
    pub fn find_method(&self, name: &str, registry: &ClassRegistry) -> Option<MethodValue> {
        self.class(registry).lookup(name)
    }

    /// Truthiness: everything is truthy except `false` and `nil`, matching
    /// the Ruby-like surface language this core targets.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false) | Value::Nil)
    }

    /// Human-readable string representation (`to_s`), with cycle detection
    /// on arrays so a self-referential array prints `[...]` instead of
    /// recursing forever — the same defense the teacher's `Value::to_string`
    /// applies to lists and dicts.
    pub fn to_string(&self) -> String {
        fn helper(val: &Value, seen: &mut HashSet<usize>) -> String {
            match val {
                Value::ClassObject(c) => c.name.clone(),
                Value::Instance(inst) => format!("#<{}>", inst.class.name),
                Value::Int(i) => i.to_string(),
                Value::Str(s) => s.clone(),
                Value::Array(arr) => {
                    let ptr = Rc::as_ptr(arr) as usize;
                    if !seen.insert(ptr) {
                        return "[...]".to_string();
                    }
                    let inner: Vec<String> =
                        arr.borrow().iter().map(|v| helper(v, seen)).collect();
                    format!("[{}]", inner.join(", "))
                }
                Value::Bool(b) => b.to_string(),
                Value::Nil => "nil".to_string(),
                Value::Error { kind, message } => format!("{}: {}", kind.name(), message),
                Value::Block(m) => format!("#<Method: {}>", m.name),
                Value::Builtin(_) => "#<Method (builtin)>".to_string(),
                Value::Rational(r) => crate::builtins::rational::format_decimal(r),
            }
        }
        let mut seen = HashSet::new();
        helper(self, &mut seen)
    }

    /// Debug/inspection-oriented JSON tree. Not a wire protocol: no built-in
    /// method consumes or produces this, it exists purely so embedders can
    /// dump a value for logging/snapshot purposes (§3, "every value exposes
    /// ... to_json()").
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::ClassObject(c) => json!({ "class": c.name }),
            Value::Instance(inst) => {
                let ivars: HashMap<String, serde_json::Value> = inst
                    .ivars
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                json!({ "instance_of": inst.class.name, "ivars": ivars })
            }
            Value::Int(i) => json!(*i),
            Value::Str(s) => json!(s),
            Value::Array(arr) => {
                let items: Vec<serde_json::Value> =
                    arr.borrow().iter().map(Value::to_json).collect();
                serde_json::Value::Array(items)
            }
            Value::Bool(b) => json!(*b),
            Value::Nil => serde_json::Value::Null,
            Value::Error { kind, message } => json!({ "error": kind.name(), "message": message }),
            Value::Block(m) => json!({ "block": m.name }),
            Value::Builtin(_) => json!({ "builtin": true }),
            Value::Rational(r) => json!(crate::builtins::rational::format_decimal(r)),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string())
    }
}
