use serde::{Deserialize, Serialize};

// =============================================================================
// OPCODE - instruction tags and their fixed operand counts
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Set = 0,
    Add = 1,
    Sub = 2,
    Mul = 3,
    Div = 4,
    Mod = 5,
    Cmp = 6,
    JumpIfFalse = 7,
    Jump = 8,
    Return = 9,
}

impl Opcode {
    pub const ALL: [Opcode; 10] = [
        Opcode::Set,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Mod,
        Opcode::Cmp,
        Opcode::JumpIfFalse,
        Opcode::Jump,
        Opcode::Return,
    ];

    /// Number of 32-bit operand words that follow this opcode's tag byte.
    /// The encoder and the decoder both frame instructions with this table.
    pub const fn arity(self) -> usize {
        match self {
            Opcode::Set => 2,
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod => 3,
            Opcode::Cmp => 3,
            Opcode::JumpIfFalse | Opcode::Jump | Opcode::Return => 1,
        }
    }

    /// Whether the tag byte may carry literal-mode bits for two value operands.
    pub const fn has_value_operands(self) -> bool {
        matches!(
            self,
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod | Opcode::Cmp
        )
    }

    pub fn from_u8(n: u8) -> Option<Self> {
        Self::ALL.get(n as usize).copied()
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Set => "SET",
            Opcode::Add => "ADD",
            Opcode::Sub => "SUB",
            Opcode::Mul => "MUL",
            Opcode::Div => "DIV",
            Opcode::Mod => "MOD",
            Opcode::Cmp => "CMP",
            Opcode::JumpIfFalse => "JUMP_IF_FALSE",
            Opcode::Jump => "JUMP",
            Opcode::Return => "RETURN",
        }
    }
}

// =============================================================================
// RELOP - relational operator carried by CMP
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RelOp {
    Eq = 0,
    Ne = 1,
    Lt = 2,
    Le = 3,
    Gt = 4,
    Ge = 5,
}

impl RelOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "==" => RelOp::Eq,
            "!=" => RelOp::Ne,
            "<" => RelOp::Lt,
            "<=" => RelOp::Le,
            ">" => RelOp::Gt,
            ">=" => RelOp::Ge,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            RelOp::Eq => "==",
            RelOp::Ne => "!=",
            RelOp::Lt => "<",
            RelOp::Le => "<=",
            RelOp::Gt => ">",
            RelOp::Ge => ">=",
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => RelOp::Eq,
            1 => RelOp::Ne,
            2 => RelOp::Lt,
            3 => RelOp::Le,
            4 => RelOp::Gt,
            5 => RelOp::Ge,
            _ => return None,
        })
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn test(self, a: i64, b: i64) -> bool {
        match self {
            RelOp::Eq => a == b,
            RelOp::Ne => a != b,
            RelOp::Lt => a < b,
            RelOp::Le => a <= b,
            RelOp::Gt => a > b,
            RelOp::Ge => a >= b,
        }
    }
}

// =============================================================================
// OPERAND - literal or register slot, decided at compile time
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    Literal(i32),
    Slot(u32),
}

impl Operand {
    pub fn is_literal(self) -> bool {
        matches!(self, Operand::Literal(_))
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Literal(n) => write!(f, "#{}", n),
            Operand::Slot(s) => write!(f, "r{}", s),
        }
    }
}

// =============================================================================
// INSTRUCTION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    Set {
        dest: u32,
        value: i32,
    },
    Add {
        dest: u32,
        lhs: Operand,
        rhs: Operand,
    },
    Sub {
        dest: u32,
        lhs: Operand,
        rhs: Operand,
    },
    Mul {
        dest: u32,
        lhs: Operand,
        rhs: Operand,
    },
    /// Floor division.
    Div {
        dest: u32,
        lhs: Operand,
        rhs: Operand,
    },
    /// Floor remainder, sign follows the divisor.
    Mod {
        dest: u32,
        lhs: Operand,
        rhs: Operand,
    },
    Cmp {
        lhs: Operand,
        rhs: Operand,
        op: RelOp,
    },
    /// Absolute jump taken when the last CMP was false.
    JumpIfFalse { target: u32 },
    /// Absolute unconditional jump.
    Jump { target: u32 },
    Return { src: u32 },
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Set { .. } => Opcode::Set,
            Instruction::Add { .. } => Opcode::Add,
            Instruction::Sub { .. } => Opcode::Sub,
            Instruction::Mul { .. } => Opcode::Mul,
            Instruction::Div { .. } => Opcode::Div,
            Instruction::Mod { .. } => Opcode::Mod,
            Instruction::Cmp { .. } => Opcode::Cmp,
            Instruction::JumpIfFalse { .. } => Opcode::JumpIfFalse,
            Instruction::Jump { .. } => Opcode::Jump,
            Instruction::Return { .. } => Opcode::Return,
        }
    }

    /// Jump target, if this is a branch.
    pub fn jump_target(&self) -> Option<u32> {
        match self {
            Instruction::JumpIfFalse { target } | Instruction::Jump { target } => Some(*target),
            _ => None,
        }
    }
}
