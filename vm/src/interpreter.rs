use std::{fmt, sync::Arc};

use bytecode::{Capture, Instruction, decode_at};
use heap::{Heap, HeapError, RootProvider};
use object::{
    BoundMessage, Chunk, Closure, Instance, Key, NativeFn, ObjRef, Object,
    ObjectKind, Table, Upvalue, Value,
};

use crate::{
    VMShared,
    actors::{ActorRegistry, Message},
    format::{format_value, function_name},
    world::{World, WorldRoots},
};

// ── Errors ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    /// Operands of the wrong kind. Carries the user-facing message.
    TypeError(&'static str),
    Arity { expected: u16, got: u16 },
    StackOverflow,
    UndefinedVariable(String),
    UndefinedProperty(String),
    UndefinedMessage(String),
    ConstantAssignment(String),
    NotCallable,
    /// A native function reported failure.
    Native(String),
    Heap(HeapError),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::TypeError(message) => f.write_str(message),
            ErrorKind::Arity { expected, got } => {
                write!(f, "Expected {expected} arguments but got {got}.")
            }
            ErrorKind::StackOverflow => f.write_str("Stack overflow."),
            ErrorKind::UndefinedVariable(name) => {
                write!(f, "Undefined variable '{name}'.")
            }
            ErrorKind::UndefinedProperty(name) => {
                write!(f, "Undefined property '{name}'.")
            }
            ErrorKind::UndefinedMessage(name) => {
                write!(f, "Undefined message '{name}'.")
            }
            ErrorKind::ConstantAssignment(name) => {
                write!(f, "Cannot assign to constant '{name}'.")
            }
            ErrorKind::NotCallable => {
                f.write_str("Can only call functions and actors.")
            }
            ErrorKind::Native(message) => f.write_str(message),
            ErrorKind::Heap(err) => write!(f, "Internal error: {err}."),
        }
    }
}

impl From<HeapError> for ErrorKind {
    fn from(err: HeapError) -> Self {
        ErrorKind::Heap(err)
    }
}

/// One line of a runtime error's stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub line: u32,
    /// `None` for the top-level script.
    pub function: Option<String>,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.function {
            Some(name) => write!(f, "[line {}] in {name}()", self.line),
            None => write!(f, "[line {}] in script", self.line),
        }
    }
}

/// A fatal error that unwound a whole `interpret` call (or one message
/// delivery). The trace lists frames innermost first.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub trace: Vec<TraceEntry>,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for entry in &self.trace {
            write!(f, "\n{entry}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

// ── Execution context ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct CallFrame {
    closure: ObjRef,
    function: ObjRef,
    chunk: Arc<Chunk>,
    ip: usize,
    /// Stack index of the callee/receiver slot; locals follow it.
    base: usize,
    /// Constructor frame: returns its receiver whatever the body returns.
    constructing: bool,
}

impl CallFrame {
    fn current_line(&self) -> u32 {
        if self.chunk.is_empty() {
            return 0;
        }
        self.chunk.line(self.ip.saturating_sub(1).min(self.chunk.len() - 1))
    }
}

/// A value stack, a frame stack and the open upvalues pointing into that
/// value stack. The main script has one; every actor instance that
/// receives messages gets its own.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    /// `(slot, upvalue)` sorted by slot.
    open_upvalues: Vec<(usize, ObjRef)>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
    }
}

impl RootProvider for ExecutionContext {
    fn visit_roots(&self, visitor: &mut dyn FnMut(Value)) {
        for &value in &self.stack {
            visitor(value);
        }
        for frame in &self.frames {
            visitor(Value::Obj(frame.closure));
        }
        for &(_, upvalue) in &self.open_upvalues {
            visitor(Value::Obj(upvalue));
        }
    }
}

/// Everything a collection must see while one context runs: its own stack,
/// the world's globals, and every pending message.
pub(crate) struct InterpreterRoots<'a> {
    context: &'a ExecutionContext,
    world: WorldRoots<'a>,
    actors: &'a ActorRegistry,
}

impl RootProvider for InterpreterRoots<'_> {
    fn visit_roots(&self, visitor: &mut dyn FnMut(Value)) {
        self.context.visit_roots(visitor);
        self.world.visit_roots(visitor);
        self.actors.visit_roots(visitor);
    }
}

// ── Interpreter ───────────────────────────────────────────────────────

/// Runs one execution context against the world. Only constructed while
/// the world lock is held.
pub(crate) struct Interpreter<'a> {
    context: &'a mut ExecutionContext,
    world: &'a mut World,
    shared: &'a VMShared,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        context: &'a mut ExecutionContext,
        world: &'a mut World,
        shared: &'a VMShared,
    ) -> Self {
        Self {
            context,
            world,
            shared,
        }
    }

    /// Wrap a compiled top-level function in a closure and run it to
    /// completion.
    pub fn interpret_function(&mut self, function: ObjRef) -> Result<(), RuntimeError> {
        let scope = self.world.heap.open_scope();
        let result = match self.start_script(function) {
            Ok(()) => self.run(),
            Err(kind) => Err(self.unwind(kind)),
        };
        self.world.heap.close_scope(scope);
        result
    }

    /// Run the handler for one mailbox message with `instance` as receiver.
    pub fn deliver(&mut self, instance: ObjRef, message: Message) -> Result<(), RuntimeError> {
        let scope = self.world.heap.open_scope();
        let result = match self.start_handler(instance, message) {
            Ok(()) => self.run(),
            Err(kind) => Err(self.unwind(kind)),
        };
        self.world.heap.close_scope(scope);
        result
    }

    fn start_script(&mut self, function: ObjRef) -> Result<(), ErrorKind> {
        self.world.heap.function(function)?;
        let closure = self.alloc(Object::Closure(Closure {
            function,
            upvalues: Vec::new(),
        }));
        self.push(Value::Obj(closure));
        self.call_closure(closure, 0)
    }

    fn start_handler(&mut self, instance: ObjRef, message: Message) -> Result<(), ErrorKind> {
        let key = self.world.heap.key(message.selector)?;
        let argc = message.args.len() as u16;
        self.push(Value::Obj(instance));
        self.context.stack.extend(message.args);
        match self.find_handler(instance, key)? {
            Some(handler) => self.call_closure(handler, argc),
            None => Err(ErrorKind::UndefinedMessage(self.name_of(message.selector))),
        }
    }

    fn run(&mut self) -> Result<(), RuntimeError> {
        match self.dispatch() {
            Ok(()) => Ok(()),
            Err(kind) => Err(self.unwind(kind)),
        }
    }

    /// Build the trace, close every open upvalue and reset the context.
    fn unwind(&mut self, kind: ErrorKind) -> RuntimeError {
        let heap = &self.world.heap;
        let trace = self
            .context
            .frames
            .iter()
            .rev()
            .map(|frame| TraceEntry {
                line: frame.current_line(),
                function: function_name(heap, frame.function),
            })
            .collect();
        if let Err(err) = self.close_upvalues(0) {
            log::warn!("closing upvalues during unwind: {err}");
        }
        self.context.reset();
        RuntimeError { kind, trace }
    }

    // ── dispatch ───────────────────────────────────────────────────

    fn dispatch(&mut self) -> Result<(), ErrorKind> {
        let scope = self.world.heap.open_scope();
        loop {
            // Temporaries of the previous instruction are installed by now.
            self.world.heap.close_scope(scope);

            let Some(frame) = self.context.frames.last_mut() else {
                return Ok(());
            };
            let at = frame.ip;
            let (instr, next) = decode_at(frame.chunk.code(), at);
            frame.ip = next;
            log::trace!("{at:04} {instr}");

            match instr {
                Instruction::Constant { idx } => {
                    let value = *self.frame().chunk.constant(idx);
                    self.push(value);
                }
                Instruction::Nil => self.push(Value::Nil),
                Instruction::True => self.push(Value::Bool(true)),
                Instruction::False => self.push(Value::Bool(false)),
                Instruction::Pop => {
                    self.pop();
                }
                Instruction::GetLocal { slot } => {
                    let value = self.context.stack[self.frame().base + slot as usize];
                    self.push(value);
                }
                Instruction::SetLocal { slot } => {
                    let at = self.frame().base + slot as usize;
                    self.context.stack[at] = self.peek(0);
                }
                Instruction::GetGlobal { name_idx } => {
                    let (name, key) = self.read_name(name_idx)?;
                    match self.world.globals.get(key) {
                        Some(value) => self.push(value),
                        None => {
                            return Err(ErrorKind::UndefinedVariable(self.name_of(name)));
                        }
                    }
                }
                Instruction::DefineGlobal { name_idx } => {
                    let (_, key) = self.read_name(name_idx)?;
                    self.world.globals.set(key, self.peek(0));
                    self.world.constants.delete(key);
                    self.pop();
                }
                Instruction::DefineConstant { name_idx } => {
                    let (_, key) = self.read_name(name_idx)?;
                    self.world.globals.set(key, self.peek(0));
                    self.world.constants.set(key, Value::Bool(true));
                    self.pop();
                }
                Instruction::SetGlobal { name_idx } => {
                    let (name, key) = self.read_name(name_idx)?;
                    if self.world.constants.contains(key) {
                        return Err(ErrorKind::ConstantAssignment(self.name_of(name)));
                    }
                    if self.world.globals.set(key, self.peek(0)) {
                        self.world.globals.delete(key);
                        return Err(ErrorKind::UndefinedVariable(self.name_of(name)));
                    }
                }
                Instruction::GetUpvalue { idx } => {
                    let upvalue = self.upvalue_ref(idx)?;
                    let value = match *self.world.heap.upvalue(upvalue)? {
                        Upvalue::Open(slot) => self.context.stack[slot],
                        Upvalue::Closed(value) => value,
                    };
                    self.push(value);
                }
                Instruction::SetUpvalue { idx } => {
                    let upvalue = self.upvalue_ref(idx)?;
                    let value = self.peek(0);
                    match self.world.heap.upvalue_mut(upvalue)? {
                        Upvalue::Open(slot) => {
                            let slot = *slot;
                            self.context.stack[slot] = value;
                        }
                        Upvalue::Closed(closed) => *closed = value,
                    }
                }
                Instruction::GetProperty { name_idx } => {
                    let (name, key) = self.read_name(name_idx)?;
                    self.get_property(name, key)?;
                }
                Instruction::SetProperty { name_idx } => {
                    let (_, key) = self.read_name(name_idx)?;
                    let Some(instance) = self.as_instance(self.peek(1)) else {
                        return Err(ErrorKind::TypeError("Only instances have fields."));
                    };
                    let value = self.peek(0);
                    let (heap, roots) = self.parts();
                    heap.set_field(instance, key, value, &roots)?;
                    self.pop();
                    self.pop();
                    self.push(value);
                }
                Instruction::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b));
                }
                Instruction::NotEqual => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a != b));
                }
                Instruction::Greater => self.binary_number(|a, b| Value::Bool(a > b))?,
                Instruction::GreaterEqual => {
                    self.binary_number(|a, b| Value::Bool(a >= b))?
                }
                Instruction::Less => self.binary_number(|a, b| Value::Bool(a < b))?,
                Instruction::LessEqual => self.binary_number(|a, b| Value::Bool(a <= b))?,
                Instruction::Add => self.add()?,
                Instruction::Subtract => self.binary_number(|a, b| Value::Number(a - b))?,
                Instruction::Multiply => self.binary_number(|a, b| Value::Number(a * b))?,
                Instruction::Divide => self.binary_number(|a, b| Value::Number(a / b))?,
                Instruction::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(value.is_falsey()));
                }
                Instruction::Negate => {
                    let Value::Number(n) = self.peek(0) else {
                        return Err(ErrorKind::TypeError("Operand must be a number."));
                    };
                    self.pop();
                    self.push(Value::Number(-n));
                }
                Instruction::Print => {
                    let value = self.pop();
                    let text = format_value(&self.world.heap, value);
                    let mut out = self.shared.out.lock();
                    if let Err(err) = writeln!(out, "{text}") {
                        log::warn!("print failed: {err}");
                    }
                }
                Instruction::Jump { offset } => self.jump(offset),
                Instruction::JumpIfFalse { offset } => {
                    if self.peek(0).is_falsey() {
                        self.jump(offset);
                    }
                }
                Instruction::Call { argc } => {
                    let callee = self.peek(argc as usize);
                    self.call_value(callee, argc)?;
                }
                Instruction::Invoke { name_idx, argc } => {
                    let (name, key) = self.read_name(name_idx)?;
                    self.invoke(name, key, argc)?;
                }
                Instruction::Send { name_idx, argc } => {
                    let (name, key) = self.read_name(name_idx)?;
                    self.send(name, key, argc)?;
                }
                Instruction::Closure {
                    function_idx,
                    upvalue_count,
                } => {
                    self.make_closure(function_idx, upvalue_count, at + 3)?;
                }
                Instruction::CloseUpvalue => {
                    let top = self.context.stack.len() - 1;
                    self.close_upvalues(top)?;
                    self.pop();
                }
                Instruction::Return => {
                    let result = self.pop();
                    let Some(frame) = self.context.frames.pop() else {
                        return Ok(());
                    };
                    self.close_upvalues(frame.base)?;
                    let result = if frame.constructing {
                        self.context.stack[frame.base]
                    } else {
                        result
                    };
                    self.context.stack.truncate(frame.base);
                    if self.context.frames.is_empty() {
                        return Ok(());
                    }
                    self.push(result);
                }
                Instruction::Actor { name_idx } => {
                    let (name, _) = self.read_name(name_idx)?;
                    let actor = self.alloc(Object::Actor(object::Actor {
                        name,
                        handlers: Table::new(),
                    }));
                    self.push(Value::Obj(actor));
                }
                Instruction::Handler { name_idx } => {
                    let (_, key) = self.read_name(name_idx)?;
                    let closure = self.expect_obj(self.peek(0))?;
                    let actor = self.expect_obj(self.peek(1))?;
                    let (heap, roots) = self.parts();
                    heap.set_handler(actor, key, closure, &roots)?;
                    self.pop();
                }
            }
        }
    }

    // ── calls ──────────────────────────────────────────────────────

    fn call_value(&mut self, callee: Value, argc: u16) -> Result<(), ErrorKind> {
        enum Callee {
            Closure,
            Native(NativeFn),
            Actor(Option<Value>),
            Bound(Value, ObjRef),
        }

        let Value::Obj(r) = callee else {
            return Err(ErrorKind::NotCallable);
        };
        let init = self.world.heap.key(self.world.init_string)?;
        let kind = match self.world.heap.get(r)? {
            Object::Closure(_) => Callee::Closure,
            Object::Native(native) => Callee::Native(native.function),
            Object::Actor(actor) => Callee::Actor(actor.handlers.get(init)),
            Object::BoundMessage(bound) => Callee::Bound(bound.receiver, bound.method),
            _ => return Err(ErrorKind::NotCallable),
        };

        match kind {
            Callee::Closure => self.call_closure(r, argc),
            Callee::Native(function) => self.call_native(function, argc),
            Callee::Actor(init) => self.construct(r, init, argc),
            Callee::Bound(receiver, method) => {
                let slot = self.context.stack.len() - argc as usize - 1;
                self.context.stack[slot] = receiver;
                self.call_closure(method, argc)
            }
        }
    }

    fn call_closure(&mut self, closure: ObjRef, argc: u16) -> Result<(), ErrorKind> {
        let function = self.world.heap.closure(closure)?.function;
        let f = self.world.heap.function(function)?;
        if argc != f.arity {
            return Err(ErrorKind::Arity {
                expected: f.arity,
                got: argc,
            });
        }
        if self.context.frames.len() >= self.shared.frames_max {
            return Err(ErrorKind::StackOverflow);
        }
        let chunk = Arc::clone(&f.chunk);
        let base = self.context.stack.len() - argc as usize - 1;
        self.context.frames.push(CallFrame {
            closure,
            function,
            chunk,
            ip: 0,
            base,
            constructing: false,
        });
        Ok(())
    }

    /// Natives see their arguments in place on the value stack; the result
    /// replaces the callee and its arguments.
    fn call_native(&mut self, function: NativeFn, argc: u16) -> Result<(), ErrorKind> {
        let start = self.context.stack.len() - argc as usize;
        let result = function(&self.context.stack[start..]).map_err(ErrorKind::Native)?;
        self.context.stack.truncate(start - 1);
        self.push(result);
        Ok(())
    }

    fn construct(
        &mut self,
        actor: ObjRef,
        init: Option<Value>,
        argc: u16,
    ) -> Result<(), ErrorKind> {
        let instance = self.alloc(Object::Instance(Instance {
            actor,
            fields: Table::new(),
        }));
        let slot = self.context.stack.len() - argc as usize - 1;
        self.context.stack[slot] = Value::Obj(instance);

        match init {
            Some(Value::Obj(init)) => {
                self.call_closure(init, argc)?;
                if let Some(frame) = self.context.frames.last_mut() {
                    frame.constructing = true;
                }
                Ok(())
            }
            _ if argc != 0 => Err(ErrorKind::Arity {
                expected: 0,
                got: argc,
            }),
            _ => Ok(()),
        }
    }

    /// Synchronous `receiver.name(args)`: a callable field wins over a
    /// handler of the same name.
    fn invoke(&mut self, name: ObjRef, key: Key, argc: u16) -> Result<(), ErrorKind> {
        let Some(instance) = self.as_instance(self.peek(argc as usize)) else {
            return Err(ErrorKind::TypeError("Only instances have methods."));
        };
        if let Some(field) = self.world.heap.instance(instance)?.fields.get(key) {
            let slot = self.context.stack.len() - argc as usize - 1;
            self.context.stack[slot] = field;
            return self.call_value(field, argc);
        }
        match self.find_handler(instance, key)? {
            Some(handler) => self.call_closure(handler, argc),
            None => Err(ErrorKind::UndefinedMessage(self.name_of(name))),
        }
    }

    /// Asynchronous `send receiver.name(args)`. The handler is resolved and
    /// arity-checked here, in the sender; it runs later in the receiver's
    /// own context.
    fn send(&mut self, name: ObjRef, key: Key, argc: u16) -> Result<(), ErrorKind> {
        let Some(instance) = self.as_instance(self.peek(argc as usize)) else {
            return Err(ErrorKind::TypeError(
                "Can only send messages to actor instances.",
            ));
        };
        let Some(handler) = self.find_handler(instance, key)? else {
            return Err(ErrorKind::UndefinedMessage(self.name_of(name)));
        };
        let heap = &self.world.heap;
        let arity = heap.function(heap.closure(handler)?.function)?.arity;
        if arity != argc {
            return Err(ErrorKind::Arity {
                expected: arity,
                got: argc,
            });
        }

        let start = self.context.stack.len() - argc as usize;
        let message = Message {
            selector: name,
            args: self.context.stack[start..].to_vec(),
        };
        log::trace!("send {} to {instance:?}", self.name_of(name));
        if let Some(mailbox) = self.shared.actors.enqueue(instance, message, &self.world.heap) {
            self.shared.scheduler.submit(mailbox);
        }
        self.context.stack.truncate(start - 1);
        self.push(Value::Nil);
        Ok(())
    }

    fn get_property(&mut self, name: ObjRef, key: Key) -> Result<(), ErrorKind> {
        let receiver = self.peek(0);
        let Some(instance) = self.as_instance(receiver) else {
            return Err(ErrorKind::TypeError("Only instances have properties."));
        };
        if let Some(value) = self.world.heap.instance(instance)?.fields.get(key) {
            self.pop();
            self.push(value);
            return Ok(());
        }
        let Some(method) = self.find_handler(instance, key)? else {
            return Err(ErrorKind::UndefinedProperty(self.name_of(name)));
        };
        let bound = self.alloc(Object::BoundMessage(BoundMessage { receiver, method }));
        self.pop();
        self.push(Value::Obj(bound));
        Ok(())
    }

    // ── closures and upvalues ──────────────────────────────────────

    fn make_closure(
        &mut self,
        function_idx: u16,
        upvalue_count: u16,
        captures_at: usize,
    ) -> Result<(), ErrorKind> {
        let (function, base, enclosing, chunk) = {
            let frame = self.frame();
            (
                *frame.chunk.constant(function_idx),
                frame.base,
                frame.closure,
                Arc::clone(&frame.chunk),
            )
        };
        let function = self.expect_obj(function)?;
        debug_assert_eq!(
            self.world.heap.function(function).map(|f| f.upvalue_count),
            Ok(upvalue_count)
        );

        let mut upvalues = Vec::with_capacity(upvalue_count as usize);
        for i in 0..upvalue_count as usize {
            let capture = Capture::read(chunk.code(), captures_at, i);
            let upvalue = if capture.is_local {
                self.capture_upvalue(base + capture.index as usize)
            } else {
                self.world.heap.closure(enclosing)?.upvalues[capture.index as usize]
            };
            upvalues.push(upvalue);
        }

        let closure = self.alloc(Object::Closure(Closure { function, upvalues }));
        self.push(Value::Obj(closure));
        Ok(())
    }

    /// Reuse the open upvalue for `slot` or open a new one.
    fn capture_upvalue(&mut self, slot: usize) -> ObjRef {
        match self
            .context
            .open_upvalues
            .binary_search_by_key(&slot, |&(s, _)| s)
        {
            Ok(i) => self.context.open_upvalues[i].1,
            Err(i) => {
                let upvalue = self.alloc(Object::Upvalue(Upvalue::Open(slot)));
                self.context.open_upvalues.insert(i, (slot, upvalue));
                upvalue
            }
        }
    }

    /// Close every open upvalue at or above `from`, topmost first.
    fn close_upvalues(&mut self, from: usize) -> Result<(), HeapError> {
        while let Some(&(slot, upvalue)) = self.context.open_upvalues.last() {
            if slot < from {
                break;
            }
            let value = self.context.stack[slot];
            *self.world.heap.upvalue_mut(upvalue)? = Upvalue::Closed(value);
            self.context.open_upvalues.pop();
        }
        Ok(())
    }

    fn upvalue_ref(&self, idx: u16) -> Result<ObjRef, HeapError> {
        let closure = self.world.heap.closure(self.frame().closure)?;
        Ok(closure.upvalues[idx as usize])
    }

    // ── helpers ────────────────────────────────────────────────────

    fn parts(&mut self) -> (&mut Heap, InterpreterRoots<'_>) {
        let (heap, world) = self.world.split();
        let roots = InterpreterRoots {
            context: &*self.context,
            world,
            actors: &self.shared.actors,
        };
        (heap, roots)
    }

    fn alloc(&mut self, object: Object) -> ObjRef {
        let (heap, roots) = self.parts();
        heap.alloc(object, &roots)
    }

    fn add(&mut self) -> Result<(), ErrorKind> {
        match (self.peek(1), self.peek(0)) {
            (Value::Number(a), Value::Number(b)) => {
                self.pop();
                self.pop();
                self.push(Value::Number(a + b));
            }
            (Value::Obj(a), Value::Obj(b))
                if self.world.heap.string(a).is_ok() && self.world.heap.string(b).is_ok() =>
            {
                // Both operands stay on the stack until the result exists.
                let (heap, roots) = self.parts();
                let joined = heap.concat(a, b, &roots)?;
                self.pop();
                self.pop();
                self.push(Value::Obj(joined));
            }
            _ => {
                return Err(ErrorKind::TypeError(
                    "Operands must be two numbers or two strings.",
                ));
            }
        }
        Ok(())
    }

    fn binary_number(&mut self, op: impl FnOnce(f64, f64) -> Value) -> Result<(), ErrorKind> {
        let (Value::Number(a), Value::Number(b)) = (self.peek(1), self.peek(0)) else {
            return Err(ErrorKind::TypeError("Operands must be numbers."));
        };
        self.pop();
        self.pop();
        self.push(op(a, b));
        Ok(())
    }

    fn jump(&mut self, offset: i16) {
        let frame = self.frame_mut();
        frame.ip = frame.ip.wrapping_add_signed(offset as isize);
    }

    fn find_handler(&self, instance: ObjRef, key: Key) -> Result<Option<ObjRef>, HeapError> {
        let actor = self.world.heap.instance(instance)?.actor;
        Ok(self
            .world
            .heap
            .actor(actor)?
            .handlers
            .get(key)
            .and_then(Value::as_obj))
    }

    fn as_instance(&self, value: Value) -> Option<ObjRef> {
        let r = value.as_obj()?;
        (self.world.heap.kind_of(value) == Some(ObjectKind::Instance)).then_some(r)
    }

    fn expect_obj(&self, value: Value) -> Result<ObjRef, ErrorKind> {
        value
            .as_obj()
            .ok_or(ErrorKind::TypeError("Malformed bytecode operand."))
    }

    /// Name constant and its table key.
    fn read_name(&self, idx: u16) -> Result<(ObjRef, Key), ErrorKind> {
        let name = self.expect_obj(*self.frame().chunk.constant(idx))?;
        Ok((name, self.world.heap.key(name)?))
    }

    fn name_of(&self, name: ObjRef) -> String {
        self.world
            .heap
            .string(name)
            .map(|s| s.as_str().to_string())
            .unwrap_or_default()
    }

    #[inline(always)]
    fn frame(&self) -> &CallFrame {
        self.context.frames.last().expect("no active frame")
    }

    #[inline(always)]
    fn frame_mut(&mut self) -> &mut CallFrame {
        self.context.frames.last_mut().expect("no active frame")
    }

    #[inline(always)]
    fn push(&mut self, value: Value) {
        self.context.stack.push(value);
    }

    #[inline(always)]
    fn pop(&mut self) -> Value {
        self.context.stack.pop().expect("value stack underflow")
    }

    #[inline(always)]
    fn peek(&self, distance: usize) -> Value {
        self.context.stack[self.context.stack.len() - 1 - distance]
    }
}
