//! Runtime errors raised during VM execution.

use std::rc::Rc;

use thiserror::Error;

/// Where a runtime error happened, for the `Liquid error (<file> line
/// <N>): <message>` format. Shared across variants rather than
/// duplicated per-field, since every recoverable error carries the
/// same `{file, line, partial_output}` triple.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorContext {
    pub file: Rc<str>,
    pub line: u32,
    /// Output already rendered before the failure, so a caller can show
    /// partial progress on a partial-rendering error.
    pub partial_output: String,
}

/// Bare messages, matching `liquidil_compiler::CompileError`'s pattern: the
/// `Liquid error (<file> line <N>): <message>` prefix is applied by
/// `render`, not baked into `Display`, so a caller can log the bare message
/// separately from the user-facing string.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("invalid integer")]
    InvalidInteger(ErrorContext),

    #[error("could not find asset {name}")]
    UnresolvedPartial { ctx: ErrorContext, name: String },

    #[error("partial name must be a string")]
    PartialNameType(ErrorContext),

    #[error("nesting too deep")]
    NestingTooDeep(ErrorContext),

    #[error("comparison of {lhs} with {rhs} failed")]
    ComparisonTypeMismatch { ctx: ErrorContext, lhs: &'static str, rhs: &'static str },

    #[error("divided by 0")]
    DivisionByZero(ErrorContext),

    #[error("filter '{name}' failed: {message}")]
    FilterFailed { ctx: ErrorContext, name: String, message: String },

    #[error("exceeded {0} steps")]
    StepFuelExhausted(u32),

    #[error("exceeded render depth {0}")]
    RenderDepthExceeded(u32),
}

impl RuntimeError {
    /// True for errors that `render_errors` is allowed to downgrade into
    /// an inline `error_marker` string instead of aborting the render.
    /// Fuel/depth exhaustion is never recoverable regardless of mode.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, RuntimeError::StepFuelExhausted(_) | RuntimeError::RenderDepthExceeded(_))
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            RuntimeError::InvalidInteger(ctx)
            | RuntimeError::PartialNameType(ctx)
            | RuntimeError::NestingTooDeep(ctx)
            | RuntimeError::DivisionByZero(ctx) => Some(ctx),
            RuntimeError::UnresolvedPartial { ctx, .. }
            | RuntimeError::ComparisonTypeMismatch { ctx, .. }
            | RuntimeError::FilterFailed { ctx, .. } => Some(ctx),
            RuntimeError::StepFuelExhausted(_) | RuntimeError::RenderDepthExceeded(_) => None,
        }
    }

    /// The user-visible `Liquid error (<file> line <N>): <message>` string,
    /// mirroring `liquidil_compiler::Diagnostics::render` for syntax
    /// errors.
    pub fn render(&self) -> String {
        match self.context() {
            Some(ctx) => format!("Liquid error ({} line {}): {}", ctx.file, ctx.line, self),
            None => format!("Liquid error: {}", self),
        }
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ErrorContext {
        ErrorContext { file: "template.liquid".into(), line: 3, partial_output: String::new() }
    }

    #[test]
    fn render_includes_file_and_line() {
        let err = RuntimeError::InvalidInteger(ctx());
        assert_eq!(err.render(), "Liquid error (template.liquid line 3): invalid integer");
    }

    #[test]
    fn fuel_exhaustion_has_no_context_but_still_renders() {
        let err = RuntimeError::StepFuelExhausted(1_000_000);
        assert!(!err.is_recoverable());
        assert_eq!(err.render(), "Liquid error: exceeded 1000000 steps");
    }
}
