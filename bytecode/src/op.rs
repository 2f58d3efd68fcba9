/// Bytecode opcodes.
///
/// Every opcode occupies one 16-bit instruction word. Each operand occupies
/// one further word. Constant pool indices, stack slots and upvalue indices
/// are all `u16`. Jump offsets are `i16`, relative to the word after the
/// offset operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Op {
    /// Push a constant pool entry.
    /// Operands: `idx:u16`
    Constant = 0x00,

    /// Push `nil`.
    Nil,

    /// Push `true`.
    True,

    /// Push `false`.
    False,

    /// Discard the top of the stack.
    Pop,

    /// Push a local slot of the current frame.
    /// Operands: `slot:u16`
    GetLocal,

    /// Store the top of the stack into a local slot (does not pop).
    /// Operands: `slot:u16`
    SetLocal,

    /// Push a global by name.
    /// Operands: `name_idx:u16`
    GetGlobal,

    /// Pop the top of the stack into a new (or redefined) global.
    /// Operands: `name_idx:u16`
    DefineGlobal,

    /// Like [`DefineGlobal`](Op::DefineGlobal) but the binding rejects later
    /// assignment (`val`).
    /// Operands: `name_idx:u16`
    DefineConstant,

    /// Assign the top of the stack to an existing global (does not pop).
    /// Operands: `name_idx:u16`
    SetGlobal,

    /// Push the value of a captured variable.
    /// Operands: `idx:u16`
    GetUpvalue,

    /// Store the top of the stack into a captured variable (does not pop).
    /// Operands: `idx:u16`
    SetUpvalue,

    /// Replace an instance on the stack with one of its properties.
    /// Operands: `name_idx:u16`
    GetProperty,

    /// `[instance, value]` -> `[value]`, storing the field.
    /// Operands: `name_idx:u16`
    SetProperty,

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

    /// Pop and print the top of the stack.
    Print,

    /// Unconditional relative jump.
    /// Operands: `offset:i16`
    Jump,

    /// Jump if the top of the stack is falsey. Does not pop.
    /// Operands: `offset:i16`
    JumpIfFalse,

    /// Call the value sitting below `argc` arguments.
    /// Operands: `argc:u16`
    Call,

    /// Synchronous method call on the receiver below `argc` arguments.
    /// Operands: `name_idx:u16`, `argc:u16`
    Invoke,

    /// Asynchronous message send. Enqueues on the receiver's mailbox and
    /// pushes `nil`.
    /// Operands: `name_idx:u16`, `argc:u16`
    Send,

    /// Wrap a function constant in a closure.
    /// Operands: `fn_idx:u16`, `count:u16`, then `count` pairs of
    /// `is_local:u16`, `index:u16`
    Closure,

    /// Close the upvalue pointing at the top slot, then pop it.
    CloseUpvalue,

    /// Return the top of the stack from the current frame.
    Return,

    /// Push a new, empty actor template.
    /// Operands: `name_idx:u16`
    Actor,

    /// `[actor, closure]` -> `[actor]`, registering the handler.
    /// Operands: `name_idx:u16`
    Handler,
}

impl Op {
    pub const COUNT: usize = Op::Handler as usize + 1;

    /// Number of fixed operand words following the opcode word.
    ///
    /// For [`Closure`](Op::Closure) this excludes the capture pairs.
    pub const fn operand_words(self) -> usize {
        match self {
            Op::Constant
            | Op::GetLocal
            | Op::SetLocal
            | Op::GetGlobal
            | Op::DefineGlobal
            | Op::DefineConstant
            | Op::SetGlobal
            | Op::GetUpvalue
            | Op::SetUpvalue
            | Op::GetProperty
            | Op::SetProperty
            | Op::Jump
            | Op::JumpIfFalse
            | Op::Call
            | Op::Actor
            | Op::Handler => 1,
            Op::Invoke | Op::Send | Op::Closure => 2,
            _ => 0,
        }
    }
}

impl TryFrom<u16> for Op {
    type Error = u16;

    fn try_from(word: u16) -> Result<Self, u16> {
        if (word as usize) < Self::COUNT {
            // SAFETY: Op is repr(u8) with contiguous variants starting at 0.
            Ok(unsafe { core::mem::transmute::<u8, Op>(word as u8) })
        } else {
            Err(word)
        }
    }
}
