//! Renders `CompileError`s into the user-visible `Liquid syntax error
//! (<file> line <N>): <message>` format.

use liquidil_bytecode::LineIndex;

use crate::error::CompileError;

pub struct Diagnostics<'a> {
    file: &'a str,
    lines: LineIndex,
}

impl<'a> Diagnostics<'a> {
    pub fn new(file: &'a str, source: &str) -> Self {
        Self { file, lines: LineIndex::new(source) }
    }

    pub fn render(&self, err: &CompileError) -> String {
        let (line, _col) = self.lines.line_col(err.pos());
        format!("Liquid syntax error ({} line {}): {}", self.file, line, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_syntax_error_with_line_number() {
        let source = "line one\nline two\n{% if %}";
        let diag = Diagnostics::new("template.liquid", source);
        let err = CompileError::UnexpectedEof { pos: 22 };
        let rendered = diag.render(&err);
        assert!(rendered.starts_with("Liquid syntax error (template.liquid line 3):"));
    }
}
