use crate::chunk::Chunk;
use crate::instruction::Capture;
use crate::op::Op;

/// A forward jump whose offset has not yet been resolved.
///
/// Created by [`ChunkBuilder::jump`] and [`ChunkBuilder::jump_if_false`].
/// Resolve it with [`ChunkBuilder::bind`].
#[derive(Debug)]
#[must_use]
pub struct Label {
    /// Position of the i16 offset word in the code.
    offset_pos: usize,
    /// Position right after the jump instruction (base for relative offset).
    base: usize,
}

/// Builds a [`Chunk`], tagging every emitted word with the current line.
pub struct ChunkBuilder<V> {
    chunk: Chunk<V>,
    line: u32,
}

impl<V: PartialEq> ChunkBuilder<V> {
    pub fn new() -> Self {
        Self {
            chunk: Chunk::new(),
            line: 1,
        }
    }

    /// Source line attached to subsequently emitted words.
    pub fn set_line(&mut self, line: u32) {
        self.line = line;
    }

    /// Current word offset in the code.
    pub fn current_offset(&self) -> usize {
        self.chunk.len()
    }

    pub fn add_constant(&mut self, value: V) -> u16 {
        self.chunk.add_constant(value)
    }

    pub fn finish(self) -> Chunk<V> {
        self.chunk
    }

    pub fn chunk(&self) -> &Chunk<V> {
        &self.chunk
    }

    // ── emit helpers ───────────────────────────────────────────────

    fn emit_word(&mut self, word: u16) {
        self.chunk.write(word, self.line);
    }

    fn emit_i16(&mut self, v: i16) {
        self.emit_word(v as u16);
    }

    /// Emit an opcode that takes no operands.
    pub fn op(&mut self, op: Op) {
        debug_assert_eq!(op.operand_words(), 0, "{op:?} takes operands");
        self.chunk.write_op(op, self.line);
    }

    fn op_with(&mut self, op: Op, operand: u16) {
        self.chunk.write_op(op, self.line);
        self.emit_word(operand);
    }

    /// `Constant <idx>`
    pub fn constant(&mut self, idx: u16) {
        self.op_with(Op::Constant, idx);
    }

    /// Add `value` to the pool and emit `Constant` for it.
    pub fn load(&mut self, value: V) {
        let idx = self.add_constant(value);
        self.constant(idx);
    }

    pub fn get_local(&mut self, slot: u16) {
        self.op_with(Op::GetLocal, slot);
    }

    pub fn set_local(&mut self, slot: u16) {
        self.op_with(Op::SetLocal, slot);
    }

    pub fn get_global(&mut self, name_idx: u16) {
        self.op_with(Op::GetGlobal, name_idx);
    }

    pub fn define_global(&mut self, name_idx: u16) {
        self.op_with(Op::DefineGlobal, name_idx);
    }

    pub fn define_constant(&mut self, name_idx: u16) {
        self.op_with(Op::DefineConstant, name_idx);
    }

    pub fn set_global(&mut self, name_idx: u16) {
        self.op_with(Op::SetGlobal, name_idx);
    }

    pub fn get_upvalue(&mut self, idx: u16) {
        self.op_with(Op::GetUpvalue, idx);
    }

    pub fn set_upvalue(&mut self, idx: u16) {
        self.op_with(Op::SetUpvalue, idx);
    }

    pub fn get_property(&mut self, name_idx: u16) {
        self.op_with(Op::GetProperty, name_idx);
    }

    pub fn set_property(&mut self, name_idx: u16) {
        self.op_with(Op::SetProperty, name_idx);
    }

    pub fn call(&mut self, argc: u16) {
        self.op_with(Op::Call, argc);
    }

    /// `Invoke <name_idx> <argc>`: synchronous method call.
    pub fn invoke(&mut self, name_idx: u16, argc: u16) {
        self.op_with(Op::Invoke, name_idx);
        self.emit_word(argc);
    }

    /// `Send <name_idx> <argc>`: asynchronous mailbox send.
    pub fn send(&mut self, name_idx: u16, argc: u16) {
        self.op_with(Op::Send, name_idx);
        self.emit_word(argc);
    }

    /// `Closure <fn_idx> <count> (<is_local> <index>)*`
    pub fn closure(&mut self, function_idx: u16, captures: &[Capture]) {
        self.op_with(Op::Closure, function_idx);
        self.emit_word(captures.len() as u16);
        for capture in captures {
            self.emit_word(capture.is_local as u16);
            self.emit_word(capture.index);
        }
    }

    pub fn actor(&mut self, name_idx: u16) {
        self.op_with(Op::Actor, name_idx);
    }

    pub fn handler(&mut self, name_idx: u16) {
        self.op_with(Op::Handler, name_idx);
    }

    // ── jumps ──────────────────────────────────────────────────────

    /// Emit an unconditional forward jump. Returns a [`Label`].
    pub fn jump(&mut self) -> Label {
        self.emit_jump_placeholder(Op::Jump)
    }

    /// Emit a conditional forward jump (falsy). Returns a [`Label`].
    pub fn jump_if_false(&mut self) -> Label {
        self.emit_jump_placeholder(Op::JumpIfFalse)
    }

    /// Bind a forward jump label to the current position.
    pub fn bind(&mut self, label: Label) {
        let target = self.chunk.len();
        let offset = Self::relative(label.base, target);
        self.chunk.code_mut()[label.offset_pos] = offset as u16;
    }

    /// Emit an unconditional backward jump to `target` (a word offset
    /// obtained from [`current_offset`](Self::current_offset)).
    pub fn jump_back(&mut self, target: usize) {
        self.chunk.write_op(Op::Jump, self.line);
        let base = self.chunk.len() + 1;
        self.emit_i16(Self::relative(base, target));
    }

    fn relative(base: usize, target: usize) -> i16 {
        let offset = target as isize - base as isize;
        i16::try_from(offset).unwrap_or_else(|_| {
            panic!("jump offset {offset} does not fit in 16 bits")
        })
    }

    fn emit_jump_placeholder(&mut self, op: Op) -> Label {
        self.chunk.write_op(op, self.line);
        let offset_pos = self.chunk.len();
        self.emit_i16(0); // placeholder
        let base = self.chunk.len();
        Label { offset_pos, base }
    }
}

impl<V: PartialEq> Default for ChunkBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}
