mod op;
mod chunk;
mod instruction;
mod builder;
mod decoder;

pub use op::Op;
pub use chunk::Chunk;
pub use instruction::{Capture, Instruction};
pub use builder::{ChunkBuilder, Label};
pub use decoder::{ChunkDecoder, decode_at};

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(chunk: &Chunk<f64>) -> Vec<Instruction> {
        ChunkDecoder::new(chunk.code()).map(|(_, i)| i).collect()
    }

    #[test]
    fn forward_jump() {
        let mut b = ChunkBuilder::new();
        b.constant(0);
        let label = b.jump_if_false();
        b.op(Op::Pop);
        b.constant(1);
        b.bind(label);
        b.op(Op::Return);

        assert_eq!(decode_all(&b.finish()), vec![
            Instruction::Constant { idx: 0 },
            Instruction::JumpIfFalse { offset: 3 },
            Instruction::Pop,
            Instruction::Constant { idx: 1 },
            Instruction::Return,
        ]);
    }

    #[test]
    fn backward_jump() {
        let mut b: ChunkBuilder<f64> = ChunkBuilder::new();
        let loop_top = b.current_offset();
        b.get_local(0);
        b.jump_back(loop_top);

        assert_eq!(decode_all(&b.finish()), vec![
            Instruction::GetLocal { slot: 0 },
            Instruction::Jump { offset: -4 },
        ]);
    }

    #[test]
    fn closure_skips_capture_pairs() {
        let mut b: ChunkBuilder<f64> = ChunkBuilder::new();
        b.closure(3, &[
            Capture { is_local: true, index: 1 },
            Capture { is_local: false, index: 0 },
        ]);
        b.op(Op::Return);
        let chunk = b.finish();

        let (instr, next) = decode_at(chunk.code(), 0);
        assert_eq!(instr, Instruction::Closure { function_idx: 3, upvalue_count: 2 });
        assert_eq!(next, 7);
        assert_eq!(
            Capture::read(chunk.code(), 3, 1),
            Capture { is_local: false, index: 0 }
        );
        assert_eq!(decode_all(&chunk).last(), Some(&Instruction::Return));
    }

    #[test]
    fn lines_track_set_line() {
        let mut b: ChunkBuilder<f64> = ChunkBuilder::new();
        b.set_line(3);
        b.load(1.0);
        b.set_line(4);
        b.op(Op::Print);
        let chunk = b.finish();

        assert_eq!(chunk.line(0), 3);
        assert_eq!(chunk.line(1), 3);
        assert_eq!(chunk.line(2), 4);
    }

    #[test]
    fn invalid_opcode_is_rejected() {
        assert_eq!(Op::try_from(Op::COUNT as u16), Err(Op::COUNT as u16));
        assert_eq!(Op::try_from(Op::Handler as u16), Ok(Op::Handler));
    }

    #[test]
    fn display_instructions() {
        assert_eq!(
            Instruction::Invoke { name_idx: 5, argc: 2 }.to_string(),
            "Invoke #5 2"
        );
        assert_eq!(Instruction::Jump { offset: -7 }.to_string(), "Jump -7");
        assert_eq!(
            Instruction::Closure { function_idx: 1, upvalue_count: 2 }.to_string(),
            "Closure #1 ^2"
        );
    }
}
