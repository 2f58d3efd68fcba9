use crate::{ObjRef, Table, Value, hash_string};
use core::fmt;
use std::sync::Arc;

/// Bytecode chunk whose constant pool holds runtime values.
pub type Chunk = bytecode::Chunk<Value>;

/// Host function callable from scripts. Receives the call's arguments and
/// must not keep the slice past the call.
pub type NativeFn = fn(&[Value]) -> Result<Value, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    String,
    Function,
    Native,
    Closure,
    Upvalue,
    Actor,
    Instance,
    BoundMessage,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::String => "string",
            ObjectKind::Function => "function",
            ObjectKind::Native => "native",
            ObjectKind::Closure => "closure",
            ObjectKind::Upvalue => "upvalue",
            ObjectKind::Actor => "actor",
            ObjectKind::Instance => "instance",
            ObjectKind::BoundMessage => "bound message",
        };
        f.write_str(name)
    }
}

/// Immutable string contents with a cached hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VMString {
    chars: Box<str>,
    hash: u32,
}

impl VMString {
    pub fn new(chars: impl Into<Box<str>>) -> Self {
        let chars = chars.into();
        let hash = hash_string(&chars);
        Self { chars, hash }
    }

    #[inline(always)]
    pub fn as_str(&self) -> &str {
        &self.chars
    }

    #[inline(always)]
    pub fn hash(&self) -> u32 {
        self.hash
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub arity: u16,
    pub upvalue_count: u16,
    /// Shared so a running frame can hold the code without borrowing the heap.
    pub chunk: Arc<Chunk>,
    /// `None` for the top-level script.
    pub name: Option<ObjRef>,
}

#[derive(Clone, Copy)]
pub struct Native {
    pub function: NativeFn,
}

impl fmt::Debug for Native {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Native")
    }
}

#[derive(Debug, Clone)]
pub struct Closure {
    pub function: ObjRef,
    pub upvalues: Vec<ObjRef>,
}

/// A captured variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Upvalue {
    /// Still lives in the owning context's value stack at this slot.
    Open(usize),
    /// The frame is gone; the upvalue owns the value.
    Closed(Value),
}

/// A named template of message handlers.
#[derive(Debug, Clone)]
pub struct Actor {
    pub name: ObjRef,
    pub handlers: Table,
}

#[derive(Debug, Clone)]
pub struct Instance {
    pub actor: ObjRef,
    pub fields: Table,
}

/// A handler closure paired with the receiver it was read from.
#[derive(Debug, Clone, Copy)]
pub struct BoundMessage {
    pub receiver: Value,
    pub method: ObjRef,
}

#[derive(Debug, Clone)]
pub enum Object {
    String(VMString),
    Function(Function),
    Native(Native),
    Closure(Closure),
    Upvalue(Upvalue),
    Actor(Actor),
    Instance(Instance),
    BoundMessage(BoundMessage),
}

impl Object {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::String(_) => ObjectKind::String,
            Object::Function(_) => ObjectKind::Function,
            Object::Native(_) => ObjectKind::Native,
            Object::Closure(_) => ObjectKind::Closure,
            Object::Upvalue(_) => ObjectKind::Upvalue,
            Object::Actor(_) => ObjectKind::Actor,
            Object::Instance(_) => ObjectKind::Instance,
            Object::BoundMessage(_) => ObjectKind::BoundMessage,
        }
    }

    /// Bytes attributed to this object by the collector's accounting.
    pub fn heap_size(&self) -> usize {
        let owned = match self {
            Object::String(s) => s.len(),
            Object::Function(f) => f.chunk.owned_bytes(),
            Object::Closure(c) => c.upvalues.capacity() * size_of::<ObjRef>(),
            Object::Actor(a) => a.handlers.owned_bytes(),
            Object::Instance(i) => i.fields.owned_bytes(),
            Object::Native(_) | Object::Upvalue(_) | Object::BoundMessage(_) => 0,
        };
        size_of::<Object>() + owned
    }

    /// Visit every value this object keeps alive.
    pub fn trace(&self, mut visit: impl FnMut(Value)) {
        match self {
            Object::String(_) | Object::Native(_) => {}
            Object::Function(f) => {
                if let Some(name) = f.name {
                    visit(Value::Obj(name));
                }
                for &constant in f.chunk.constants() {
                    visit(constant);
                }
            }
            Object::Closure(c) => {
                visit(Value::Obj(c.function));
                for &upvalue in &c.upvalues {
                    visit(Value::Obj(upvalue));
                }
            }
            Object::Upvalue(Upvalue::Closed(value)) => visit(*value),
            Object::Upvalue(Upvalue::Open(_)) => {}
            Object::Actor(a) => {
                visit(Value::Obj(a.name));
                trace_table(&a.handlers, &mut visit);
            }
            Object::Instance(i) => {
                visit(Value::Obj(i.actor));
                trace_table(&i.fields, &mut visit);
            }
            Object::BoundMessage(b) => {
                visit(b.receiver);
                visit(Value::Obj(b.method));
            }
        }
    }
}

fn trace_table(table: &Table, visit: &mut impl FnMut(Value)) {
    for (key, value) in table.iter() {
        visit(Value::Obj(key.string));
        visit(value);
    }
}
