use crate::instruction::Instruction;
use crate::op::Op;

/// Decode the instruction starting at `pc`.
///
/// Returns the instruction and the offset of the next one. For
/// [`Instruction::Closure`] the returned offset already skips the capture
/// pairs, which start at `pc + 3`.
///
/// The code **must** be well-formed (as produced by [`ChunkBuilder`]).
/// Malformed code panics on an invalid opcode or an out-of-range read.
///
/// [`ChunkBuilder`]: crate::ChunkBuilder
#[inline(always)]
pub fn decode_at(code: &[u16], pc: usize) -> (Instruction, usize) {
    let op = match Op::try_from(code[pc]) {
        Ok(op) => op,
        Err(word) => panic!("invalid opcode 0x{word:04x} at {pc}"),
    };
    let a = |i: usize| code[pc + 1 + i];
    let next = pc + 1 + op.operand_words();

    let instr = match op {
        Op::Constant => Instruction::Constant { idx: a(0) },
        Op::Nil => Instruction::Nil,
        Op::True => Instruction::True,
        Op::False => Instruction::False,
        Op::Pop => Instruction::Pop,
        Op::GetLocal => Instruction::GetLocal { slot: a(0) },
        Op::SetLocal => Instruction::SetLocal { slot: a(0) },
        Op::GetGlobal => Instruction::GetGlobal { name_idx: a(0) },
        Op::DefineGlobal => Instruction::DefineGlobal { name_idx: a(0) },
        Op::DefineConstant => Instruction::DefineConstant { name_idx: a(0) },
        Op::SetGlobal => Instruction::SetGlobal { name_idx: a(0) },
        Op::GetUpvalue => Instruction::GetUpvalue { idx: a(0) },
        Op::SetUpvalue => Instruction::SetUpvalue { idx: a(0) },
        Op::GetProperty => Instruction::GetProperty { name_idx: a(0) },
        Op::SetProperty => Instruction::SetProperty { name_idx: a(0) },
        Op::Equal => Instruction::Equal,
        Op::NotEqual => Instruction::NotEqual,
        Op::Greater => Instruction::Greater,
        Op::GreaterEqual => Instruction::GreaterEqual,
        Op::Less => Instruction::Less,
        Op::LessEqual => Instruction::LessEqual,
        Op::Add => Instruction::Add,
        Op::Subtract => Instruction::Subtract,
        Op::Multiply => Instruction::Multiply,
        Op::Divide => Instruction::Divide,
        Op::Not => Instruction::Not,
        Op::Negate => Instruction::Negate,
        Op::Print => Instruction::Print,
        Op::Jump => Instruction::Jump { offset: a(0) as i16 },
        Op::JumpIfFalse => Instruction::JumpIfFalse { offset: a(0) as i16 },
        Op::Call => Instruction::Call { argc: a(0) },
        Op::Invoke => Instruction::Invoke {
            name_idx: a(0),
            argc: a(1),
        },
        Op::Send => Instruction::Send {
            name_idx: a(0),
            argc: a(1),
        },
        Op::Closure => {
            let upvalue_count = a(1);
            let instr = Instruction::Closure {
                function_idx: a(0),
                upvalue_count,
            };
            return (instr, next + upvalue_count as usize * 2);
        }
        Op::CloseUpvalue => Instruction::CloseUpvalue,
        Op::Return => Instruction::Return,
        Op::Actor => Instruction::Actor { name_idx: a(0) },
        Op::Handler => Instruction::Handler { name_idx: a(0) },
    };
    (instr, next)
}

/// Iterates over the instructions of a code slice, yielding each with its
/// starting offset.
pub struct ChunkDecoder<'a> {
    code: &'a [u16],
    pos: usize,
}

impl<'a> ChunkDecoder<'a> {
    pub fn new(code: &'a [u16]) -> Self {
        Self { code, pos: 0 }
    }

    /// Current word offset in the stream.
    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.code.len()
    }
}

impl Iterator for ChunkDecoder<'_> {
    type Item = (usize, Instruction);

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_at_end() {
            return None;
        }
        let at = self.pos;
        let (instr, next) = decode_at(self.code, at);
        self.pos = next;
        Some((at, instr))
    }
}
