use crate::bytecode::{Instruction, Operand};

/// Arithmetic operator of an assignment statement (`c = a + b`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    pub fn from_char(ch: char) -> Option<Self> {
        Some(match ch {
            '+' => ArithOp::Add,
            '-' => ArithOp::Sub,
            '*' => ArithOp::Mul,
            '/' => ArithOp::Div,
            '%' => ArithOp::Mod,
            _ => return None,
        })
    }

    pub fn symbol(self) -> char {
        match self {
            ArithOp::Add => '+',
            ArithOp::Sub => '-',
            ArithOp::Mul => '*',
            ArithOp::Div => '/',
            ArithOp::Mod => '%',
        }
    }

    /// The instruction `dest = lhs <op> rhs` compiles to.
    pub fn instruction(self, dest: u32, lhs: Operand, rhs: Operand) -> Instruction {
        match self {
            ArithOp::Add => Instruction::Add { dest, lhs, rhs },
            ArithOp::Sub => Instruction::Sub { dest, lhs, rhs },
            ArithOp::Mul => Instruction::Mul { dest, lhs, rhs },
            ArithOp::Div => Instruction::Div { dest, lhs, rhs },
            ArithOp::Mod => Instruction::Mod { dest, lhs, rhs },
        }
    }
}

/// One statement-shaped token. Operands are kept as the raw text the lexer
/// captured; the compiler decides whether each one is a literal or a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `let NAME = INT`
    Let { name: String, value: String },

    /// `TARGET = A op B`
    Assign {
        target: String,
        lhs: String,
        op: ArithOp,
        rhs: String,
    },

    /// `if A rel B`
    If {
        lhs: String,
        rel: String,
        rhs: String,
    },

    /// `while A rel B`
    While {
        lhs: String,
        rel: String,
        rhs: String,
    },

    /// `return NAME`
    Return { name: String },

    BlockOpen,
    BlockClose,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Let { name, value } => write!(f, "let {} = {}", name, value),
            Token::Assign {
                target,
                lhs,
                op,
                rhs,
            } => write!(f, "{} = {} {} {}", target, lhs, op.symbol(), rhs),
            Token::If { lhs, rel, rhs } => write!(f, "if {} {} {}", lhs, rel, rhs),
            Token::While { lhs, rel, rhs } => write!(f, "while {} {} {}", lhs, rel, rhs),
            Token::Return { name } => write!(f, "return {}", name),
            Token::BlockOpen => write!(f, "{{"),
            Token::BlockClose => write!(f, "}}"),
        }
    }
}
