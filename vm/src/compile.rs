//! The boundary between a source front end and the runtime.

use std::{fmt, sync::Arc};

use heap::{Heap, RootProvider};
use object::{Chunk, Function, ObjRef, Object};

/// One diagnostic from a front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub line: u32,
    /// The offending lexeme, or `None` when the error is at end of input.
    pub lexeme: Option<String>,
    pub message: String,
}

impl CompileError {
    pub fn new(line: u32, lexeme: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            line,
            lexeme: lexeme.map(str::to_string),
            message: message.into(),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lexeme {
            Some(lexeme) => {
                write!(f, "[line {}] Error at '{lexeme}': {}", self.line, self.message)
            }
            None => write!(f, "[line {}] Error at end: {}", self.line, self.message),
        }
    }
}

impl std::error::Error for CompileError {}

/// Heap access handed to a front end for the duration of one compilation.
///
/// Strings and functions created through a session stay rooted until the
/// `interpret` call that opened it returns, so nested function constants
/// survive any collection compilation triggers.
pub struct CompileSession<'a> {
    heap: &'a mut Heap,
    roots: &'a dyn RootProvider,
}

impl<'a> CompileSession<'a> {
    pub(crate) fn new(heap: &'a mut Heap, roots: &'a dyn RootProvider) -> Self {
        Self { heap, roots }
    }

    pub fn intern(&mut self, chars: &str) -> ObjRef {
        self.heap.intern(chars, self.roots)
    }

    /// Allocate a finished function. `name` is `None` for a top-level
    /// script.
    pub fn function(
        &mut self,
        name: Option<ObjRef>,
        arity: u16,
        upvalue_count: u16,
        chunk: Chunk,
    ) -> ObjRef {
        self.heap.alloc(
            Object::Function(Function {
                arity,
                upvalue_count,
                chunk: Arc::new(chunk),
                name,
            }),
            self.roots,
        )
    }

    pub fn heap(&self) -> &Heap {
        self.heap
    }
}

/// A source-to-bytecode front end. Returns the top-level script function,
/// or every error found.
pub trait Compiler {
    fn compile(
        &mut self,
        source: &str,
        session: &mut CompileSession<'_>,
    ) -> Result<ObjRef, Vec<CompileError>>;
}
