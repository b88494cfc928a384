use crate::frontend::lexer::Span;
use thiserror::Error;

/// Which statement opened a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    If,
    While,
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockKind::If => write!(f, "if"),
            BlockKind::While => write!(f, "while"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A `}` with no open `if`/`while` block
    #[error("compile error: {}:{}: unmatched '}}'", .span.line, .span.col)]
    UnmatchedBlockClose { span: Span },

    /// An `if`/`while` block still open at end of input
    #[error("compile error: {}:{}: '{kind}' block is never closed", .span.line, .span.col)]
    UnclosedBlock { kind: BlockKind, span: Span },

    /// Integer literal that does not fit an operand word
    #[error("compile error: {}:{}: literal {literal} does not fit in 32 bits", .span.line, .span.col)]
    LiteralOutOfRange { literal: String, span: Span },

    /// A literal in a position that needs a variable slot
    #[error("compile error: {}:{}: cannot assign to or return literal {literal}", .span.line, .span.col)]
    LiteralTarget { literal: String, span: Span },

    #[error("compile error: {}:{}: unknown relational operator '{symbol}'", .span.line, .span.col)]
    UnknownRelation { symbol: String, span: Span },

    /// More instructions than a jump word can address
    #[error("compile error: program exceeds {max} instructions")]
    ProgramTooLarge { max: u32 },
}

impl CompileError {
    pub fn span(&self) -> Option<Span> {
        match self {
            CompileError::UnmatchedBlockClose { span }
            | CompileError::UnclosedBlock { span, .. }
            | CompileError::LiteralOutOfRange { span, .. }
            | CompileError::LiteralTarget { span, .. }
            | CompileError::UnknownRelation { span, .. } => Some(*span),
            CompileError::ProgramTooLarge { .. } => None,
        }
    }
}
