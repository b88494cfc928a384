use thiserror::Error;

/// A fatal fault raised while executing a program. Execution stops at the
/// faulting instruction; `pc` is its address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeFault {
    #[error("runtime error: pc {pc}: register r{slot} out of range (0..{count})", count = crate::runtime::vm::REGISTER_COUNT)]
    RegisterOutOfRange { pc: usize, slot: u32 },

    #[error("runtime error: pc {pc}: {opcode} by zero")]
    DivisionByZero { pc: usize, opcode: &'static str },

    #[error("runtime error: pc {pc}: jump target {target} outside program of {len} instructions")]
    JumpOutOfRange { pc: usize, target: u32, len: usize },

    #[error("runtime error: pc {pc}: {opcode} overflowed")]
    Overflow { pc: usize, opcode: &'static str },

    #[error("runtime error: execution step limit exceeded ({limit})")]
    StepLimitExceeded { limit: u64 },
}

impl RuntimeFault {
    pub fn pc(&self) -> Option<usize> {
        match self {
            RuntimeFault::RegisterOutOfRange { pc, .. }
            | RuntimeFault::DivisionByZero { pc, .. }
            | RuntimeFault::JumpOutOfRange { pc, .. }
            | RuntimeFault::Overflow { pc, .. } => Some(*pc),
            RuntimeFault::StepLimitExceeded { .. } => None,
        }
    }
}
