use crate::op::Op;

/// A compiled unit of bytecode.
///
/// `code` and `lines` always have the same length: every instruction word
/// remembers the source line it was emitted for. The constant pool is
/// generic so this crate stays independent of the runtime's value type.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk<V> {
    code: Vec<u16>,
    lines: Vec<u32>,
    constants: Vec<V>,
}

impl<V> Chunk<V> {
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            lines: Vec::new(),
            constants: Vec::new(),
        }
    }

    /// Append one instruction word together with its source line.
    pub fn write(&mut self, word: u16, line: u32) {
        self.code.push(word);
        self.lines.push(line);
    }

    pub fn write_op(&mut self, op: Op, line: u32) {
        self.write(op as u16, line);
    }

    #[inline(always)]
    pub fn code(&self) -> &[u16] {
        &self.code
    }

    pub fn code_mut(&mut self) -> &mut [u16] {
        &mut self.code
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Source line of the word at `offset`.
    ///
    /// Out-of-range offsets are a producer bug and panic.
    pub fn line(&self, offset: usize) -> u32 {
        self.lines[offset]
    }

    #[inline(always)]
    pub fn constant(&self, idx: u16) -> &V {
        &self.constants[idx as usize]
    }

    pub fn constants(&self) -> &[V] {
        &self.constants
    }

    /// Bytes owned by this chunk's buffers, for heap accounting.
    pub fn owned_bytes(&self) -> usize {
        self.code.capacity() * size_of::<u16>()
            + self.lines.capacity() * size_of::<u32>()
            + self.constants.capacity() * size_of::<V>()
    }
}

impl<V: PartialEq> Chunk<V> {
    /// Add a constant, returning the index of an equal existing entry if
    /// there is one.
    pub fn add_constant(&mut self, value: V) -> u16 {
        if let Some(idx) = self.constants.iter().position(|c| *c == value) {
            return idx as u16;
        }
        assert!(
            self.constants.len() < u16::MAX as usize,
            "too many constants in one chunk"
        );
        self.constants.push(value);
        (self.constants.len() - 1) as u16
    }
}

impl<V> Default for Chunk<V> {
    fn default() -> Self {
        Self::new()
    }
}
