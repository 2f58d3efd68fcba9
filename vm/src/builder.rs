use std::ops::{Deref, DerefMut};

use bytecode::ChunkBuilder;
use object::{ObjRef, Value};

use crate::compile::CompileSession;

/// Assembles one function's bytecode and allocates it through a
/// [`CompileSession`]. Derefs to the underlying [`ChunkBuilder`] for
/// instruction emission.
pub struct FunctionBuilder {
    code: ChunkBuilder<Value>,
    name: Option<String>,
    arity: u16,
    upvalue_count: u16,
}

impl FunctionBuilder {
    /// The anonymous top-level function.
    pub fn script() -> Self {
        Self {
            code: ChunkBuilder::new(),
            name: None,
            arity: 0,
            upvalue_count: 0,
        }
    }

    pub fn new(name: &str, arity: u16) -> Self {
        Self {
            name: Some(name.to_string()),
            arity,
            ..Self::script()
        }
    }

    /// Number of captures the enclosing `Closure` instruction supplies.
    pub fn upvalues(mut self, count: u16) -> Self {
        self.upvalue_count = count;
        self
    }

    /// Intern `chars` and add it to the constant pool.
    pub fn string(&mut self, session: &mut CompileSession<'_>, chars: &str) -> u16 {
        let string = session.intern(chars);
        self.code.add_constant(Value::Obj(string))
    }

    pub fn number(&mut self, n: f64) -> u16 {
        self.code.add_constant(Value::Number(n))
    }

    /// Add a finished nested function to the constant pool.
    pub fn function(&mut self, function: ObjRef) -> u16 {
        self.code.add_constant(Value::Obj(function))
    }

    pub fn finish(self, session: &mut CompileSession<'_>) -> ObjRef {
        let name = self.name.map(|name| session.intern(&name));
        session.function(name, self.arity, self.upvalue_count, self.code.finish())
    }
}

impl Deref for FunctionBuilder {
    type Target = ChunkBuilder<Value>;

    fn deref(&self) -> &Self::Target {
        &self.code
    }
}

impl DerefMut for FunctionBuilder {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.code
    }
}
