use core::fmt;

/// A decoded instruction.
///
/// [`Closure`](Instruction::Closure) only carries the capture count; the
/// `(is_local, index)` pairs follow it in the instruction stream and are
/// read with [`Capture::read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Constant { idx: u16 },
    Nil,
    True,
    False,
    Pop,
    GetLocal { slot: u16 },
    SetLocal { slot: u16 },
    GetGlobal { name_idx: u16 },
    DefineGlobal { name_idx: u16 },
    DefineConstant { name_idx: u16 },
    SetGlobal { name_idx: u16 },
    GetUpvalue { idx: u16 },
    SetUpvalue { idx: u16 },
    GetProperty { name_idx: u16 },
    SetProperty { name_idx: u16 },
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Not,
    Negate,
    Print,
    Jump { offset: i16 },
    JumpIfFalse { offset: i16 },
    Call { argc: u16 },
    Invoke { name_idx: u16, argc: u16 },
    Send { name_idx: u16, argc: u16 },
    Closure { function_idx: u16, upvalue_count: u16 },
    CloseUpvalue,
    Return,
    Actor { name_idx: u16 },
    Handler { name_idx: u16 },
}

/// One captured variable of a [`Closure`](Instruction::Closure) instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture {
    /// `true` captures a stack slot of the enclosing frame, `false` one of
    /// the enclosing closure's upvalues.
    pub is_local: bool,
    pub index: u16,
}

impl Capture {
    /// Read the `i`th capture pair of a closure instruction whose pairs start
    /// at `start`.
    #[inline(always)]
    pub fn read(code: &[u16], start: usize, i: usize) -> Self {
        let at = start + i * 2;
        Self {
            is_local: code[at] != 0,
            index: code[at + 1],
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant { idx } => write!(f, "Constant #{idx}"),
            Self::Nil => write!(f, "Nil"),
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Pop => write!(f, "Pop"),
            Self::GetLocal { slot } => write!(f, "GetLocal s{slot}"),
            Self::SetLocal { slot } => write!(f, "SetLocal s{slot}"),
            Self::GetGlobal { name_idx } => write!(f, "GetGlobal #{name_idx}"),
            Self::DefineGlobal { name_idx } => {
                write!(f, "DefineGlobal #{name_idx}")
            }
            Self::DefineConstant { name_idx } => {
                write!(f, "DefineConstant #{name_idx}")
            }
            Self::SetGlobal { name_idx } => write!(f, "SetGlobal #{name_idx}"),
            Self::GetUpvalue { idx } => write!(f, "GetUpvalue u{idx}"),
            Self::SetUpvalue { idx } => write!(f, "SetUpvalue u{idx}"),
            Self::GetProperty { name_idx } => {
                write!(f, "GetProperty #{name_idx}")
            }
            Self::SetProperty { name_idx } => {
                write!(f, "SetProperty #{name_idx}")
            }
            Self::Equal => write!(f, "Equal"),
            Self::NotEqual => write!(f, "NotEqual"),
            Self::Greater => write!(f, "Greater"),
            Self::GreaterEqual => write!(f, "GreaterEqual"),
            Self::Less => write!(f, "Less"),
            Self::LessEqual => write!(f, "LessEqual"),
            Self::Add => write!(f, "Add"),
            Self::Subtract => write!(f, "Subtract"),
            Self::Multiply => write!(f, "Multiply"),
            Self::Divide => write!(f, "Divide"),
            Self::Not => write!(f, "Not"),
            Self::Negate => write!(f, "Negate"),
            Self::Print => write!(f, "Print"),
            Self::Jump { offset } => write!(f, "Jump {offset}"),
            Self::JumpIfFalse { offset } => write!(f, "JumpIfFalse {offset}"),
            Self::Call { argc } => write!(f, "Call {argc}"),
            Self::Invoke { name_idx, argc } => {
                write!(f, "Invoke #{name_idx} {argc}")
            }
            Self::Send { name_idx, argc } => {
                write!(f, "Send #{name_idx} {argc}")
            }
            Self::Closure {
                function_idx,
                upvalue_count,
            } => write!(f, "Closure #{function_idx} ^{upvalue_count}"),
            Self::CloseUpvalue => write!(f, "CloseUpvalue"),
            Self::Return => write!(f, "Return"),
            Self::Actor { name_idx } => write!(f, "Actor #{name_idx}"),
            Self::Handler { name_idx } => write!(f, "Handler #{name_idx}"),
        }
    }
}
