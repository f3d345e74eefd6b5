//! # Method & Block Registry, Class Registry
//!
//! Two lookup tables the interpreter core depends on but does not itself
//! populate from source — spec.md §6 lists both as "consumed" external
//! interfaces, normally owned by the (out-of-scope) compiler and object
//! system respectively:
//!
//! - [`InstructionSetRegistry`]: `get_method_is`/`get_block`/`get_class_is`,
//!   keyed by `(name, filename)` so identically-named methods in different
//!   source files don't collide.
//! - [`ClassRegistry`]: `top_level_class(name)`, used by built-ins that
//!   fabricate wrapped primitive values, and by [`crate::value::Value::class`]
//!   to resolve a primitive value's class pointer.
//!
//! [`Registry`] is a minimal, HashMap-backed implementation of both so the
//! core's own test suite can register fixture programs without a real
//! compiler. An embedding VM would typically replace it with one backed by
//! whatever the compiler's module-loading story is.

use std::collections::HashMap;
use std::rc::Rc;

use crate::bytecode::InstructionSet;
use crate::value::Class;

/// Lookup of compiled instruction sets by `(name, filename)`, per spec.md
/// §2 "Method & block registry" and §6's consumed registry contract.
pub trait InstructionSetRegistry {
    fn get_method_is(&self, name: &str, filename: &str) -> Option<Rc<InstructionSet>>;
    fn get_block(&self, name: &str, filename: &str) -> Option<Rc<InstructionSet>>;
    fn get_class_is(&self, name: &str, filename: &str) -> Option<Rc<InstructionSet>>;
}

/// HashMap-backed instruction-set registry and top-level class table.
///
/// The three instruction-set maps are kept separate (methods, blocks,
/// classes) rather than merged, matching spec.md §3's "three flavors" of
/// instruction set — a block and a method can share a name within one file
/// without colliding.
pub struct Registry {
    methods: HashMap<(String, String), Rc<InstructionSet>>,
    blocks: HashMap<(String, String), Rc<InstructionSet>>,
    classes: HashMap<(String, String), Rc<InstructionSet>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry {
            methods: HashMap::new(),
            blocks: HashMap::new(),
            classes: HashMap::new(),
        }
    }

    pub fn register_method(&mut self, iset: Rc<InstructionSet>) {
        let key = (iset.name.clone(), iset.filename.clone());
        self.methods.insert(key, iset);
    }

    pub fn register_block(&mut self, iset: Rc<InstructionSet>) {
        let key = (iset.name.clone(), iset.filename.clone());
        self.blocks.insert(key, iset);
    }

    pub fn register_class(&mut self, iset: Rc<InstructionSet>) {
        let key = (iset.name.clone(), iset.filename.clone());
        self.classes.insert(key, iset);
    }
}

impl Default for Registry {
    fn default() -> Registry {
        Registry::new()
    }
}

impl InstructionSetRegistry for Registry {
    fn get_method_is(&self, name: &str, filename: &str) -> Option<Rc<InstructionSet>> {
        self.methods
            .get(&(name.to_string(), filename.to_string()))
            .cloned()
    }

    fn get_block(&self, name: &str, filename: &str) -> Option<Rc<InstructionSet>> {
        self.blocks
            .get(&(name.to_string(), filename.to_string()))
            .cloned()
    }

    fn get_class_is(&self, name: &str, filename: &str) -> Option<Rc<InstructionSet>> {
        self.classes
            .get(&(name.to_string(), filename.to_string()))
            .cloned()
    }
}

/// Top-level classes visible to built-ins and to [`crate::value::Value::class`].
///
/// `integer`/`string`/`array`/`boolean`/`nil_class`/`error`/`method` are the
/// fixed classes backing primitive `Value` variants (spec.md's "small fixed
/// table"). `decimal` is the example arbitrary-precision rational type
/// (spec.md §4.6). `extra` holds any additional user-defined top-level
/// classes registered after construction.
pub struct ClassRegistry {
    pub integer: Rc<Class>,
    pub string: Rc<Class>,
    pub array: Rc<Class>,
    pub boolean: Rc<Class>,
    pub nil_class: Rc<Class>,
    pub error: Rc<Class>,
    pub method: Rc<Class>,
    pub decimal: Rc<Class>,
    extra: HashMap<String, Rc<Class>>,
}

impl ClassRegistry {
    /// Construct the registry with every primitive class plus `Decimal`'s
    /// and `Integer`'s operator tables installed.
    pub fn with_builtins() -> ClassRegistry {
        let decimal = Class::new("Decimal", None);
        crate::builtins::rational::install(&decimal);
        let string = Class::new("String", None);
        crate::builtins::rational::install_conversions(&string);
        let integer = Class::new("Integer", None);
        crate::builtins::integer::install(&integer);
        ClassRegistry {
            integer,
            string,
            array: Class::new("Array", None),
            boolean: Class::new("Boolean", None),
            nil_class: Class::new("NilClass", None),
            error: Class::new("Error", None),
            method: Class::new("Method", None),
            decimal,
            extra: HashMap::new(),
        }
    }

    /// `top_level_class(name) -> ClassValue`, per spec.md §6.
    pub fn top_level_class(&self, name: &str) -> Option<Rc<Class>> {
        match name {
            "Integer" => Some(self.integer.clone()),
            "String" => Some(self.string.clone()),
            "Array" => Some(self.array.clone()),
            "Boolean" => Some(self.boolean.clone()),
            "NilClass" => Some(self.nil_class.clone()),
            "Error" => Some(self.error.clone()),
            "Method" => Some(self.method.clone()),
            "Decimal" => Some(self.decimal.clone()),
            other => self.extra.get(other).cloned(),
        }
    }

    pub fn register_class(&mut self, class: Rc<Class>) {
        self.extra.insert(class.name.clone(), class);
    }
}

impl Default for ClassRegistry {
    fn default() -> ClassRegistry {
        ClassRegistry::with_builtins()
    }
}
