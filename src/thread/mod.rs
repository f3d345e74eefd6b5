//! # Interpreter Thread
//!
//! The fetch/decode/execute dispatch loop (spec.md §4.1), the method send
//! protocol (§4.2), frame activation on top of `crate::call::bind_arguments`
//! (§4.3), built-in method invocation (§4.4), and block retrieval/yield
//! (§4.5). This is the 35%-of-budget centerpiece the rest of the crate
//! exists to serve.
//!
//! Grounded on `omg_runtime::vm::run`'s fetch/decode/execute `while` loop:
//! same shape (index into the current instruction stream, execute, advance),
//! restructured around spec.md §4.1's error-sentinel contract instead of the
//! teacher's block-stack/try-except unwind — "an error at top-of-stack
//! terminates the enclosing dispatch loop" replaces "pop blocks looking for a
//! handler". `dispatch_to_receiver`/`invoke_compiled`/`invoke_block` below
//! play the role the teacher's `ops_control::handle_call`/`handle_ret` play,
//! generalized from single-frame function calls to full method dispatch.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::bytecode::{ArgSite, BlockFlag, Instr, InstructionSet};
use crate::call::{bind_arguments, Arg, BoundParam, CallObject};
use crate::error::{init_error_object, ErrorKind, RuntimeFault};
use crate::frame::{CallFrame, FrameArena, FrameId};
use crate::registry::{ClassRegistry, InstructionSetRegistry};
use crate::stack::EvalStack;
use crate::value::{MethodObject, MethodValue, Value};

/// The one ambient knob a cooperatively-scheduled interpreter needs: a
/// call-depth ceiling that turns runaway recursion into a catchable
/// `Value::Error` instead of a host stack overflow (SPEC_FULL.md §9/§10).
#[derive(Clone, Copy, Debug)]
pub struct ThreadConfig {
    pub max_frame_depth: usize,
}

impl Default for ThreadConfig {
    fn default() -> ThreadConfig {
        ThreadConfig {
            max_frame_depth: 4096,
        }
    }
}

/// One interpreter thread: its private evaluation stack, its private
/// frame arena/call-frame stack, and the (externally owned) registries it
/// consults for method/block/class lookup (spec.md §5: stacks are private to
/// a thread, registries are shared, effectively-immutable VM-level state).
pub struct Thread {
    pub stack: EvalStack,
    pub frames: FrameArena,
    pub frame_stack: Vec<FrameId>,
    pub registry: Box<dyn InstructionSetRegistry>,
    pub classes: ClassRegistry,
    pub config: ThreadConfig,
}

impl Thread {
    pub fn new(
        registry: Box<dyn InstructionSetRegistry>,
        classes: ClassRegistry,
        config: ThreadConfig,
    ) -> Thread {
        Thread {
            stack: EvalStack::new(),
            frames: FrameArena::new(),
            frame_stack: Vec::new(),
            registry,
            classes,
            config,
        }
    }

    /// Seed a top-level frame for `program` with `top_self` as its receiver,
    /// run it to completion, and return the final value left on the stack
    /// (spec.md §2: "the final value is left on the stack").
    pub fn execute_program(
        &mut self,
        program: Rc<InstructionSet>,
        top_self: Value,
    ) -> Result<Value, RuntimeFault> {
        let frame_id = self.frames.alloc(CallFrame::new(program, None, top_self, false, None));
        self.frame_stack.push(frame_id);
        self.start_from_top_frame()?;
        self.frame_stack.pop();
        Ok(self.stack.pop().unwrap_or(Value::Nil))
    }

    /// The single re-entry point used for the initial program, for nested
    /// method calls, and for block yields (spec.md §4.1).
    ///
    /// Runs the frame currently on top of `frame_stack` until it finishes
    /// (`pc == len`) or the error sentinel is observed; either way, the
    /// caller — not this function — is responsible for popping the frame
    /// (spec.md §5, "Resource discipline").
    pub fn start_from_top_frame(&mut self) -> Result<(), RuntimeFault> {
        loop {
            let cf_id = *self
                .frame_stack
                .last()
                .ok_or(RuntimeFault::EmptyFrameStack)?;

            let iset = self.frames.get(cf_id).instruction_set.clone();
            let pc = self.frames.get(cf_id).pc;
            if pc >= iset.len() {
                return Ok(());
            }
            self.frames.get_mut(cf_id).pc = pc + 1;
            let instr = iset.instructions[pc].clone();

            trace!(frame = cf_id.0, pc, "dispatch");
            self.execute(cf_id, &instr)?;

            // Error-sentinel check (spec.md §4.1): an error at top-of-stack
            // terminates this dispatch loop without unwinding the call-frame
            // stack itself — the caller's own next iteration (after it pops
            // this frame) observes the same sentinel and also returns.
            if self.stack.top_is_error() {
                return Ok(());
            }
        }
    }

    fn execute(&mut self, cf_id: FrameId, instr: &Instr) -> Result<(), RuntimeFault> {
        match instr {
            Instr::PushInt(v) => self.stack.push(Value::Int(*v)),
            Instr::PushStr(s) => self.stack.push(Value::Str(s.clone())),
            Instr::PushBool(b) => self.stack.push(Value::Bool(*b)),
            Instr::PushNil => self.stack.push(Value::Nil),
            Instr::PushSelf => {
                let self_value = self.frames.get(cf_id).self_value.clone();
                self.stack.push(self_value);
            }
            Instr::PushBlock(method_ref) => {
                match self.registry.get_block(&method_ref.name, &method_ref.filename) {
                    Some(iset) => self.stack.push(Value::Block(MethodObject {
                        name: method_ref.name.clone(),
                        instructions: iset,
                    })),
                    None => self.stack.push(init_error_object(
                        ErrorKind::InternalError,
                        format!("undefined block '{}'", method_ref.name),
                    )),
                }
            }
            Instr::PushMethod(name) => {
                let self_value = self.frames.get(cf_id).self_value.clone();
                match self_value.find_method(name, &self.classes) {
                    Some(MethodValue::Compiled(iset)) => self.stack.push(Value::Block(MethodObject {
                        name: name.clone(),
                        instructions: iset,
                    })),
                    Some(MethodValue::Builtin(entry)) => self.stack.push(Value::Builtin(entry)),
                    None => self.stack.push(init_error_object(
                        ErrorKind::UndefinedMethodError,
                        format!("undefined method '{}' for {}", name, self_value.to_string()),
                    )),
                }
            }
            Instr::GetLocal(index, depth) => {
                let value = self
                    .frames
                    .get_local(cf_id, *index, *depth)
                    .unwrap_or(Value::Nil);
                self.stack.push(value);
            }
            Instr::SetLocal(index, depth) => {
                let value = self.stack.pop()?;
                if !self.frames.set_local(cf_id, *index, *depth, value) {
                    return Err(RuntimeFault::DanglingFrame);
                }
            }
            Instr::GetConst(name) => match self.classes.top_level_class(name) {
                Some(class) => self.stack.push(Value::ClassObject(class)),
                None => self.stack.push(init_error_object(
                    ErrorKind::InternalError,
                    format!("uninitialized constant {}", name),
                )),
            },
            Instr::BuildArray(n) => {
                let mut items = Vec::with_capacity(*n);
                for _ in 0..*n {
                    items.push(self.stack.pop()?);
                }
                items.reverse();
                self.stack.push(Value::Array(Rc::new(RefCell::new(items))));
            }
            Instr::Send { name, arg_sites, block } => {
                self.handle_send(cf_id, name, arg_sites, block)?
            }
            Instr::SendDynamic { arg_sites, block } => {
                self.handle_send_dynamic(cf_id, arg_sites, block)?
            }
            Instr::Yield(argc) => self.handle_yield(cf_id, *argc)?,
            Instr::Jump(target) => {
                self.frames.get_mut(cf_id).pc = *target;
            }
            Instr::JumpIfFalse(target) => {
                let cond = self.stack.pop()?;
                if !cond.is_truthy() {
                    self.frames.get_mut(cf_id).pc = *target;
                }
            }
            Instr::Pop => {
                self.stack.pop_n_discard(1)?;
            }
            Instr::Ret | Instr::Halt => {
                let len = self.frames.get(cf_id).instruction_set.len();
                self.frames.get_mut(cf_id).pc = len;
            }
            Instr::Raise(kind, message) => {
                self.stack.push(init_error_object(*kind, message.clone()));
            }
        }
        Ok(())
    }

    // ----- Method send protocol (spec.md §4.2) -----

    /// Pop `arg_sites.len()` actuals off the stack in call order, expanding
    /// any `ArgSite::Splat` value into positionals (step 1) and tagging
    /// keyword actuals by name — the "interleaved, tagged" wire convention
    /// SPEC_FULL.md §4 resolves the §9 open question with.
    fn collect_args(&mut self, arg_sites: &[ArgSite]) -> Result<Vec<Arg>, RuntimeFault> {
        let n = arg_sites.len();
        let mut raw = Vec::with_capacity(n);
        for _ in 0..n {
            raw.push(self.stack.pop()?);
        }
        raw.reverse();

        let mut args = Vec::with_capacity(n);
        for (site, value) in arg_sites.iter().zip(raw.into_iter()) {
            match site {
                ArgSite::Positional => args.push(Arg::Positional(value)),
                ArgSite::Keyword(name) => args.push(Arg::Keyword(name.clone(), value)),
                ArgSite::Splat => match value {
                    Value::Array(items) => {
                        for item in items.borrow().iter() {
                            args.push(Arg::Positional(item.clone()));
                        }
                    }
                    other => args.push(Arg::Positional(other)),
                },
            }
        }
        Ok(args)
    }

    /// Ordinary `Send`: the method name travels with the opcode, no marker
    /// value is pushed (SPEC_FULL.md §4's resolved open question).
    fn handle_send(
        &mut self,
        cf_id: FrameId,
        name: &str,
        arg_sites: &[ArgSite],
        block: &BlockFlag,
    ) -> Result<(), RuntimeFault> {
        let args = self.collect_args(arg_sites)?;
        let receiver = self.stack.pop()?;
        self.dispatch_to_receiver(cf_id, receiver, name.to_string(), args, block)
    }

    /// `obj.send(:name, *args)`: the method name is a marker value pushed
    /// just above the receiver. Popping args, then the marker, then the
    /// receiver achieves the same net effect as spec.md §4.2 step 2's
    /// "shift args left to overwrite the marker" without needing an in-place
    /// array shift — our stack already supports popping by value.
    fn handle_send_dynamic(
        &mut self,
        cf_id: FrameId,
        arg_sites: &[ArgSite],
        block: &BlockFlag,
    ) -> Result<(), RuntimeFault> {
        let args = self.collect_args(arg_sites)?;
        let marker = self.stack.pop()?;
        let name = marker.to_string();
        let receiver = self.stack.pop()?;
        self.dispatch_to_receiver(cf_id, receiver, name, args, block)
    }

    fn dispatch_to_receiver(
        &mut self,
        cf_id: FrameId,
        receiver: Value,
        name: String,
        args: Vec<Arg>,
        block: &BlockFlag,
    ) -> Result<(), RuntimeFault> {
        // Defensive only: the error sentinel should already have ended the
        // dispatch loop before a `Send` targeting an error value ever runs.
        if matches!(receiver, Value::Error { .. }) {
            self.stack.push(init_error_object(
                ErrorKind::InternalError,
                "method lookup on an error value",
            ));
            return Ok(());
        }

        let block_frame = self.retrieve_block(cf_id, block);

        match receiver.find_method(&name, &self.classes) {
            None => {
                warn!(method = %name, "undefined method");
                self.stack.push(init_error_object(
                    ErrorKind::UndefinedMethodError,
                    format!("undefined method '{}' for {}", name, receiver.to_string()),
                ));
                Ok(())
            }
            Some(MethodValue::Compiled(iset)) => {
                debug!(method = %name, "dispatch compiled method");
                let result = self.invoke_compiled(receiver, iset, args, block_frame, &name)?;
                self.stack.push(result);
                Ok(())
            }
            Some(MethodValue::Builtin(entry)) => {
                debug!(method = %name, "dispatch builtin method");
                self.invoke_builtin(receiver, &name, entry, args, block_frame)
            }
        }
    }

    // ----- Argument binder / frame activation (spec.md §4.3) -----

    /// Build a [`CallObject`] for `method` and invoke the argument binder
    /// against it (spec.md §4.2 step 4 / §4.3); on success, push the bound
    /// callee frame, run it to completion, and return its result (or the
    /// `ArgumentError` the binder produced). Shared by ordinary dispatch and
    /// by `new`'s recursive initializer call (§4.4 step 3).
    fn invoke_compiled(
        &mut self,
        receiver: Value,
        method: Rc<InstructionSet>,
        args: Vec<Arg>,
        block_frame: Option<FrameId>,
        method_name: &str,
    ) -> Result<Value, RuntimeFault> {
        let mut call = CallObject::new(receiver, method, self.stack.sp(), args.len(), block_frame);

        let bound = match bind_arguments(&call.method.signature, args, method_name) {
            Err(error_value) => return Ok(error_value),
            Ok(bound) => bound,
        };

        if self.frame_stack.len() >= self.config.max_frame_depth {
            return Ok(init_error_object(
                ErrorKind::InternalError,
                "stack level too deep",
            ));
        }

        let frame_id = self.frames.alloc(CallFrame::new(
            call.method.clone(),
            None,
            call.receiver.clone(),
            false,
            call.block_frame,
        ));
        call.callee_frame = Some(frame_id);

        // Optioned defaults are evaluated left-to-right, in the callee frame,
        // exactly as spec.md §4.3 requires — before the frame is pushed, so
        // a default referencing an earlier parameter sees it already bound.
        for (index, bound_param) in bound.into_iter().enumerate() {
            match bound_param {
                BoundParam::Value(value) => self.frames.get_mut(frame_id).set_local_here(index, value),
                BoundParam::NeedsDefault(default_is) => {
                    let value = self.eval_default(frame_id, default_is)?;
                    if matches!(value, Value::Error { .. }) {
                        return Ok(value);
                    }
                    self.frames.get_mut(frame_id).set_local_here(index, value);
                }
            }
        }

        self.frame_stack.push(call.callee_frame.expect("set above"));
        self.start_from_top_frame()?;
        self.frame_stack.pop();
        Ok(self.stack.pop().unwrap_or(Value::Nil))
    }

    /// Evaluate one optioned/keyword parameter's default instruction
    /// sequence as a nested frame whose `ep` is the callee frame itself, so
    /// `GetLocal(_, 1)` inside the default body reads parameters already
    /// bound earlier in the same call.
    fn eval_default(
        &mut self,
        parent_frame: FrameId,
        default_is: Rc<InstructionSet>,
    ) -> Result<Value, RuntimeFault> {
        let self_value = self.frames.get(parent_frame).self_value.clone();
        let frame_id = self
            .frames
            .alloc(CallFrame::new(default_is, Some(parent_frame), self_value, true, None));
        self.frame_stack.push(frame_id);
        self.start_from_top_frame()?;
        self.frame_stack.pop();
        Ok(self.stack.pop().unwrap_or(Value::Nil))
    }

    // ----- Built-in method invocation (spec.md §4.4) -----

    fn invoke_builtin(
        &mut self,
        receiver: Value,
        name: &str,
        entry: crate::value::BuiltinEntry,
        args: Vec<Arg>,
        block_frame: Option<FrameId>,
    ) -> Result<(), RuntimeFault> {
        // Built-ins in this crate take flat positional values; no in-scope
        // built-in method (the `Decimal` operator table) needs keywords, so
        // a keyword actual degrades to its value in argument order.
        let flat: Vec<Value> = args
            .into_iter()
            .map(|a| match a {
                Arg::Positional(v) => v,
                Arg::Keyword(_, v) => v,
            })
            .collect();

        let body = entry(&receiver, 0);
        let mut result = body(self, &flat, block_frame);

        // Special case (§4.4 step 3): `new` on a class whose fresh instance
        // carries a compiled `initialize` gets that initializer invoked
        // recursively through the same binder `new` itself went through.
        if name == "new" {
            if let Value::Instance(instance) = &result {
                if let Some(MethodValue::Compiled(init_is)) = instance.class.lookup("initialize") {
                    let init_args = flat.into_iter().map(Arg::Positional).collect();
                    let init_result = self.invoke_compiled(
                        result.clone(),
                        init_is,
                        init_args,
                        block_frame,
                        "initialize",
                    )?;
                    if matches!(init_result, Value::Error { .. }) {
                        result = init_result;
                    }
                }
            }
        }

        self.stack.push(result);
        Ok(())
    }

    /// The re-entry point a built-in method body calls to invoke the block
    /// passed to it (spec.md §4.4): constructs a block invocation frame,
    /// pushes `args` into its locals by positional index, re-enters the
    /// dispatch loop, and delivers the block's return value back.
    pub fn builtin_method_yield(&mut self, block_frame: Option<FrameId>, args: Vec<Value>) -> Value {
        match block_frame {
            None => init_error_object(ErrorKind::InternalError, "no block given"),
            Some(block_frame) => match self.invoke_block(block_frame, args) {
                Ok(value) => value,
                Err(fault) => init_error_object(ErrorKind::InternalError, fault.to_string()),
            },
        }
    }

    // ----- Block retrieval & yield (spec.md §4.5) -----

    /// Resolve a call site's `"block:<NAME>"` tag (already parsed into a
    /// [`BlockFlag`] by the compiler) against the current frame's file and
    /// allocate a block-flagged frame template whose `ep` is the *calling*
    /// frame — the capture that makes lexical free-variable resolution and
    /// late-bound `yield` targets work (spec.md §4.5, §8 property 6).
    ///
    /// The returned `FrameId` is a template: each `yield`/`builtin_method_yield`
    /// spawns a fresh activation from it rather than reusing it directly, so
    /// a block invoked from inside a loop gets independent locals each time.
    fn retrieve_block(&mut self, cf_id: FrameId, flag: &BlockFlag) -> Option<FrameId> {
        match flag {
            BlockFlag::None => None,
            BlockFlag::Named(name) => {
                let (filename, self_value) = {
                    let cf = self.frames.get(cf_id);
                    (cf.instruction_set.filename.clone(), cf.self_value.clone())
                };
                self.registry.get_block(name, &filename).map(|iset| {
                    self.frames
                        .alloc(CallFrame::new(iset, Some(cf_id), self_value, true, None))
                })
            }
        }
    }

    /// Spawn a fresh activation of the block referenced by `template`,
    /// bind `args` into its locals by positional index, run it, and return
    /// its result (success or propagated error) as a plain `Value`.
    fn invoke_block(&mut self, template: FrameId, args: Vec<Value>) -> Result<Value, RuntimeFault> {
        let (instructions, ep, self_value) = {
            let t = self.frames.get(template);
            (t.instruction_set.clone(), t.ep, t.self_value.clone())
        };

        if self.frame_stack.len() >= self.config.max_frame_depth {
            return Ok(init_error_object(
                ErrorKind::InternalError,
                "stack level too deep",
            ));
        }

        let frame_id = self
            .frames
            .alloc(CallFrame::new(instructions, ep, self_value, true, None));
        for (index, value) in args.into_iter().enumerate() {
            self.frames.get_mut(frame_id).set_local_here(index, value);
        }

        self.frame_stack.push(frame_id);
        self.start_from_top_frame()?;
        self.frame_stack.pop();
        Ok(self.stack.pop().unwrap_or(Value::Nil))
    }

    fn handle_yield(&mut self, cf_id: FrameId, argc: usize) -> Result<(), RuntimeFault> {
        let mut args = Vec::with_capacity(argc);
        for _ in 0..argc {
            args.push(self.stack.pop()?);
        }
        args.reverse();

        match self.frames.get(cf_id).block_frame {
            None => self.stack.push(init_error_object(
                ErrorKind::InternalError,
                "no block given (yield)",
            )),
            Some(template) => {
                let result = self.invoke_block(template, args)?;
                self.stack.push(result);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
