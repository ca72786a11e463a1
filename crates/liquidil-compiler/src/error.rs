//! Syntax errors raised while lexing or parsing.

use thiserror::Error;

/// A byte offset into the template source, paired with the error at parse
/// time before the `liquidil-vm::Scope`'s line index exists to resolve it.
pub type Pos = u32;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("unterminated tag")]
    UnterminatedTag { pos: Pos },

    #[error("unterminated raw block")]
    UnterminatedRaw { pos: Pos },

    #[error("invalid 'for' loop syntax: {detail}")]
    InvalidForSyntax { pos: Pos, detail: String },

    #[error("invalid 'tablerow' syntax: {detail}")]
    InvalidTablerowSyntax { pos: Pos, detail: String },

    #[error("expected a property name")]
    MissingPropertyName { pos: Pos },

    #[error("loop body did not advance past position {pos}")]
    NonAdvancingLoop { pos: Pos },

    #[error("unknown tag '{name}'")]
    UnknownTag { pos: Pos, name: String },

    #[error("unexpected token in expression")]
    UnexpectedToken { pos: Pos },

    #[error("unexpected end of expression")]
    UnexpectedEof { pos: Pos },

    #[error("'{tag}' without matching opening tag")]
    UnmatchedEndTag { pos: Pos, tag: String },

    #[error("expected '{expected}', found end of template")]
    ExpectedEndTag { pos: Pos, expected: String },

    #[error("invalid number literal")]
    InvalidNumber { pos: Pos },

    #[error("unterminated string literal")]
    UnterminatedString { pos: Pos },

    /// A label the parser/optimizer emitted a jump to was never placed.
    /// This is a compiler-internal invariant violation, not a syntax
    /// error in the source template, so there's no source position to
    /// report; `pos()` returns 0 for it.
    #[error("internal error: unresolved jump target L{label}")]
    UnresolvedJumpTarget { label: u32 },
}

impl CompileError {
    pub fn pos(&self) -> Pos {
        match self {
            CompileError::UnterminatedTag { pos }
            | CompileError::UnterminatedRaw { pos }
            | CompileError::InvalidForSyntax { pos, .. }
            | CompileError::InvalidTablerowSyntax { pos, .. }
            | CompileError::MissingPropertyName { pos }
            | CompileError::NonAdvancingLoop { pos }
            | CompileError::UnknownTag { pos, .. }
            | CompileError::UnexpectedToken { pos }
            | CompileError::UnexpectedEof { pos }
            | CompileError::UnmatchedEndTag { pos, .. }
            | CompileError::ExpectedEndTag { pos, .. }
            | CompileError::InvalidNumber { pos }
            | CompileError::UnterminatedString { pos } => *pos,
            CompileError::UnresolvedJumpTarget { .. } => 0,
        }
    }
}

pub type CompileResult<T> = Result<T, CompileError>;
