//! Recursive-descent parser: consumes template + expression tokens and
//! emits IL directly via the builder — no AST.

use liquidil_bytecode::{CompareOp, ConstLit, CycleValue, InstrKind, Interner, Label, PartialName, Span, Symbol};

use crate::builder::Builder;
use crate::error::{CompileError, CompileResult};
use crate::lexer::expr::{ExprLexer, Tok};
use crate::lexer::template::{TemplateLexer, TokenKind};

pub struct Parser<'a> {
    src: &'a str,
    lexer: TemplateLexer<'a>,
    builder: Builder,
    interner: Interner,
    pending_trim_left: bool,
    /// Argument text of the most recently matched tag, so a caller that
    /// just learned `parse_block_body` stopped at e.g. `elsif`/`when` can
    /// retrieve what followed the tag name.
    last_tag_rest: &'a str,
    next_temp: u16,
}

/// Parses a full template into optimizer-ready IL, the interner that
/// resolves its symbols, and the number of `StoreTemp`/`LoadTemp`
/// register slots it used (`case`/`when` subjects).
pub fn parse(src: &str) -> CompileResult<(Vec<liquidil_bytecode::InstructionIR>, Interner, u32)> {
    let mut parser = Parser::new(src);
    let (end_tag, _blank, _raw_writes) = parser.parse_block_body(&[])?;
    if !end_tag.is_empty() {
        return Err(CompileError::UnmatchedEndTag { pos: parser.lexer.pos() as u32, tag: end_tag });
    }
    parser.builder.emit_unspanned(InstrKind::Halt);
    Ok((parser.builder.finish(), parser.interner, parser.next_temp as u32))
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            lexer: TemplateLexer::new(src),
            builder: Builder::new(),
            interner: Interner::new(),
            pending_trim_left: false,
            last_tag_rest: "",
            next_temp: 0,
        }
    }

    fn fresh_temp(&mut self) -> u16 {
        let t = self.next_temp;
        self.next_temp += 1;
        t
    }

    fn offset_of(&self, content: &str) -> u32 {
        (content.as_ptr() as usize - self.src.as_ptr() as usize) as u32
    }

    fn expr_lexer(&self, content: &'a str) -> ExprLexer<'a> {
        ExprLexer::new(content, self.offset_of(content))
    }

    /// Applies a VAR/TAG's `trim_left`: right-strip the most recently
    /// emitted `WRITE_RAW`.
    fn apply_trim_left(&mut self) {
        let interner = &mut self.interner;
        if let Some(instr) = self.builder.last_mut() {
            if let InstrKind::WriteRaw(sym) = instr.kind {
                let text = interner.resolve(sym).trim_end().to_string();
                let new_sym = interner.intern_owned(text);
                instr.kind = InstrKind::WriteRaw(new_sym);
            }
        }
    }

    /// Parses RAW/VAR/TAG tokens until one of `end_tags` is hit or EOF.
    /// Returns the matched end-tag name (empty for EOF), whether every
    /// child so far has produced only whitespace/no output, and the
    /// builder indices of the whitespace-only `WRITE_RAW`s emitted along
    /// the way — `apply_blank_suppression` rewrites those to empty
    /// strings when the body as a whole turns out blank, so a block
    /// whose only content is whitespace and silent tags (`comment`,
    /// `assign`, ...) doesn't leak that whitespace into the output.
    fn parse_block_body(&mut self, end_tags: &[&str]) -> CompileResult<(String, bool, Vec<usize>)> {
        let mut is_blank = true;
        let mut raw_write_indices = Vec::new();

        loop {
            let before = self.lexer.pos();
            let tok = self.lexer.next();
            match tok.kind {
                TokenKind::Eof => return Ok((String::new(), is_blank, raw_write_indices)),
                TokenKind::Raw => {
                    let mut content = tok.content;
                    if self.pending_trim_left {
                        content = content.trim_start();
                        self.pending_trim_left = false;
                    }
                    if !content.is_empty() {
                        if !content.trim().is_empty() {
                            is_blank = false;
                        }
                        let sym = self.interner.intern(content);
                        raw_write_indices.push(self.builder.emit(InstrKind::WriteRaw(sym), tok.span));
                    }
                }
                TokenKind::Var => {
                    if tok.trim_left {
                        self.apply_trim_left();
                    }
                    self.pending_trim_left = tok.trim_right;
                    is_blank = false;
                    let mut lx = self.expr_lexer(tok.content);
                    self.parse_filtered_expr(&mut lx)?;
                    self.builder.emit(InstrKind::WriteValue, tok.span);
                }
                TokenKind::Tag => {
                    if tok.trim_left {
                        self.apply_trim_left();
                    }
                    let (name, rest) = split_tag(tok.content);
                    self.last_tag_rest = rest;
                    if end_tags.contains(&name) {
                        self.pending_trim_left = tok.trim_right;
                        return Ok((name.to_string(), is_blank, raw_write_indices));
                    }
                    self.pending_trim_left = tok.trim_right;
                    self.parse_tag(name, rest, tok.span)?;
                    if !is_silent_tag(name) {
                        is_blank = false;
                    }
                }
            }
            if self.lexer.pos() == before {
                return Err(CompileError::NonAdvancingLoop { pos: before as u32 });
            }
        }
    }

    /// Rewrites `raw_write_indices` to empty `WRITE_RAW`s when `is_blank`
    /// holds, suppressing a block body's surrounding whitespace once it's
    /// established the body contributes no real output.
    fn apply_blank_suppression(&mut self, is_blank: bool, raw_write_indices: &[usize]) {
        if !is_blank || raw_write_indices.is_empty() {
            return;
        }
        let empty = self.interner.intern("");
        for &idx in raw_write_indices {
            if let Some(instr) = self.builder.get_mut(idx) {
                if let InstrKind::WriteRaw(_) = instr.kind {
                    instr.kind = InstrKind::WriteRaw(empty);
                }
            }
        }
    }

    fn parse_tag(&mut self, name: &str, rest: &'a str, span: Span) -> CompileResult<()> {
        match name {
            "if" => self.parse_if(rest, span, false),
            "unless" => self.parse_if(rest, span, true),
            "case" => self.parse_case(rest, span),
            "for" => self.parse_for(rest, span),
            "tablerow" => self.parse_tablerow(rest, span),
            "assign" => self.parse_assign(rest, span),
            "capture" => self.parse_capture(rest, span),
            "increment" => self.parse_counter(rest, span, true),
            "decrement" => self.parse_counter(rest, span, false),
            "cycle" => self.parse_cycle(rest, span),
            "break" => {
                self.builder.emit(InstrKind::Break, span);
                Ok(())
            }
            "continue" => {
                self.builder.emit(InstrKind::Continue, span);
                Ok(())
            }
            "echo" => {
                let mut lx = self.expr_lexer(rest);
                self.parse_filtered_expr(&mut lx)?;
                self.builder.emit(InstrKind::WriteValue, span);
                Ok(())
            }
            "raw" => self.parse_raw(span),
            "comment" => self.parse_comment(span),
            "doc" => self.parse_doc(span),
            "render" => self.parse_partial(rest, span, true),
            "include" => self.parse_partial(rest, span, false),
            "ifchanged" => self.parse_ifchanged(span),
            "liquid" => self.parse_liquid_block(rest, span),
            "#" => Ok(()),
            _ => Err(CompileError::UnknownTag { pos: span.start, name: name.to_string() }),
        }
    }

    // ---- if / unless ----

    fn parse_if(&mut self, rest: &'a str, span: Span, is_unless: bool) -> CompileResult<()> {
        let end_label = self.builder.fresh_label();
        let mut next_label = self.builder.fresh_label();
        let mut cond_rest = rest;

        loop {
            let mut lx = self.expr_lexer(cond_rest);
            self.parse_logical(&mut lx)?;
            if is_unless {
                self.builder.emit(InstrKind::LogicalNot, span);
            }
            self.builder.emit_unspanned(InstrKind::JumpIfFalse(next_label));

            let (end_tag, is_blank, raw_writes) = self.parse_block_body(&["elsif", "else", "endif"])?;
            self.apply_blank_suppression(is_blank, &raw_writes);
            self.builder.emit_unspanned(InstrKind::Jump(end_label));
            self.builder.place_label(next_label);

            match end_tag.as_str() {
                "elsif" => {
                    cond_rest = self.last_tag_rest;
                    next_label = self.builder.fresh_label();
                    continue;
                }
                "else" => {
                    let (_, is_blank, raw_writes) = self.parse_block_body(&["endif"])?;
                    self.apply_blank_suppression(is_blank, &raw_writes);
                    break;
                }
                "endif" => break,
                _ => return Err(CompileError::ExpectedEndTag { pos: span.start, expected: "endif".to_string() }),
            }
        }

        self.builder.place_label(end_label);
        Ok(())
    }

    // ---- case/when ----

    fn parse_case(&mut self, rest: &'a str, span: Span) -> CompileResult<()> {
        let slot = self.fresh_temp();
        let mut lx = self.expr_lexer(rest);
        self.parse_expr(&mut lx)?;
        self.builder.emit(InstrKind::StoreTemp(slot), span);
        self.builder.emit_unspanned(InstrKind::Pop);

        let end_label = self.builder.fresh_label();
        let (mut end_tag, is_blank, raw_writes) = self.parse_block_body(&["when", "else", "endcase"])?;
        self.apply_blank_suppression(is_blank, &raw_writes);

        while end_tag == "when" {
            let when_rest = self.last_tag_rest;
            let body_label = self.builder.fresh_label();
            let next_label = self.builder.fresh_label();

            for part in split_top_level_commas(when_rest) {
                self.builder.emit_unspanned(InstrKind::LoadTemp(slot));
                let mut plx = self.expr_lexer(part);
                self.parse_expr(&mut plx)?;
                self.builder.emit_unspanned(InstrKind::CaseCompare);
                self.builder.emit_unspanned(InstrKind::JumpIfTrue(body_label));
            }
            self.builder.emit_unspanned(InstrKind::Jump(next_label));
            self.builder.place_label(body_label);
            let (inner_end, is_blank, raw_writes) = self.parse_block_body(&["when", "else", "endcase"])?;
            self.apply_blank_suppression(is_blank, &raw_writes);
            self.builder.emit_unspanned(InstrKind::Jump(end_label));
            self.builder.place_label(next_label);
            end_tag = inner_end;
        }

        if end_tag == "else" {
            let (_, is_blank, raw_writes) = self.parse_block_body(&["endcase"])?;
            self.apply_blank_suppression(is_blank, &raw_writes);
        } else if end_tag != "endcase" {
            return Err(CompileError::ExpectedEndTag { pos: span.start, expected: "endcase".to_string() });
        }

        self.builder.place_label(end_label);
        Ok(())
    }

    // ---- for ----

    fn parse_for(&mut self, rest: &'a str, span: Span) -> CompileResult<()> {
        let mut lx = self.expr_lexer(rest);
        let var_tok = lx.next();
        if var_tok.tok != Tok::Identifier {
            return Err(CompileError::InvalidForSyntax { pos: span.start, detail: "expected loop variable".to_string() });
        }
        let var_sym = self.interner.intern(var_tok.text);
        expect_keyword(&mut lx, "in", span.start)?;
        self.parse_primary(&mut lx)?;
        let collection_end = self.builder.len();

        let mut reversed = false;
        let mut offset_range: Option<(usize, usize)> = None;
        let mut limit_range: Option<(usize, usize)> = None;
        loop {
            let cp = lx.checkpoint();
            let t = lx.next();
            if t.tok == Tok::Eof {
                break;
            }
            if t.tok == Tok::Identifier && t.text == "reversed" {
                reversed = true;
                continue;
            }
            if t.tok == Tok::Identifier && (t.text == "limit" || t.text == "offset") {
                let colon = lx.next();
                if colon.tok != Tok::Colon {
                    return Err(CompileError::InvalidForSyntax { pos: t.pos, detail: "expected ':'".to_string() });
                }
                let start = self.builder.len();
                if t.text == "offset" {
                    let cp2 = lx.checkpoint();
                    let maybe_continue = lx.next();
                    if maybe_continue.tok == Tok::Identifier && maybe_continue.text == "continue" {
                        let sym = self.interner.intern("continue");
                        self.builder.emit_unspanned(InstrKind::ConstString(sym));
                    } else {
                        lx.restore(cp2);
                        self.parse_expr(&mut lx)?;
                    }
                    offset_range = Some((start, self.builder.len()));
                } else {
                    self.parse_expr(&mut lx)?;
                    limit_range = Some((start, self.builder.len()));
                }
                continue;
            }
            lx.restore(cp);
            break;
        }

        // `limit:`/`offset:` may appear in either order in source; the
        // stack contract `ForBegin` relies on needs them pushed in a
        // fixed order regardless, so splice the just-emitted clauses back
        // in canonically (collection, offset, limit).
        let suffix = self.builder.truncate_from(collection_end);
        let rel = |r: (usize, usize)| (r.0 - collection_end)..(r.1 - collection_end);
        match offset_range {
            Some(r) => self.builder.extend(suffix[rel(r)].to_vec()),
            None => {
                self.builder.emit_unspanned(InstrKind::ConstNil);
            }
        }
        match limit_range {
            Some(r) => self.builder.extend(suffix[rel(r)].to_vec()),
            None => {
                self.builder.emit_unspanned(InstrKind::ConstNil);
            }
        }

        let else_label = self.builder.fresh_label();
        let end_label = self.builder.fresh_label();
        let for_end_label = self.builder.fresh_label();

        self.builder.emit(InstrKind::ForBegin { var: var_sym, reversed, exit: else_label }, span);

        let loop_head = self.builder.fresh_label();
        self.builder.place_label(loop_head);
        self.builder.emit_unspanned(InstrKind::ForNext { exit: for_end_label });
        let (end_tag, is_blank, raw_writes) = self.parse_block_body(&["else", "endfor"])?;
        self.apply_blank_suppression(is_blank, &raw_writes);
        self.builder.emit_unspanned(InstrKind::JumpIfInterrupt(for_end_label));
        self.builder.emit_unspanned(InstrKind::Jump(loop_head));

        self.builder.place_label(for_end_label);
        self.builder.emit_unspanned(InstrKind::ForEnd);
        self.builder.emit_unspanned(InstrKind::Jump(end_label));

        self.builder.place_label(else_label);
        if end_tag == "else" {
            let (_, is_blank, raw_writes) = self.parse_block_body(&["endfor"])?;
            self.apply_blank_suppression(is_blank, &raw_writes);
        } else if end_tag != "endfor" {
            return Err(CompileError::ExpectedEndTag { pos: span.start, expected: "endfor".to_string() });
        }

        self.builder.place_label(end_label);
        Ok(())
    }

    // ---- tablerow ----

    fn parse_tablerow(&mut self, rest: &'a str, span: Span) -> CompileResult<()> {
        let mut lx = self.expr_lexer(rest);
        let var_tok = lx.next();
        if var_tok.tok != Tok::Identifier {
            return Err(CompileError::InvalidTablerowSyntax { pos: span.start, detail: "expected loop variable".to_string() });
        }
        let var_sym = self.interner.intern(var_tok.text);
        expect_keyword(&mut lx, "in", span.start)?;
        self.parse_primary(&mut lx)?;
        let collection_end = self.builder.len();

        let mut offset_range: Option<(usize, usize)> = None;
        let mut limit_range: Option<(usize, usize)> = None;
        let mut cols_range: Option<(usize, usize)> = None;
        loop {
            let cp = lx.checkpoint();
            let t = lx.next();
            if t.tok == Tok::Eof {
                break;
            }
            if t.tok == Tok::Identifier && matches!(t.text, "limit" | "offset" | "cols") {
                let colon = lx.next();
                if colon.tok != Tok::Colon {
                    return Err(CompileError::InvalidTablerowSyntax { pos: t.pos, detail: "expected ':'".to_string() });
                }
                let start = self.builder.len();
                self.parse_expr(&mut lx)?;
                let range = Some((start, self.builder.len()));
                match t.text {
                    "offset" => offset_range = range,
                    "limit" => limit_range = range,
                    "cols" => cols_range = range,
                    _ => unreachable!(),
                }
                continue;
            }
            lx.restore(cp);
            break;
        }

        // Same canonical-reorder rationale as `for` (see `parse_for`).
        let suffix = self.builder.truncate_from(collection_end);
        let rel = |r: (usize, usize)| (r.0 - collection_end)..(r.1 - collection_end);
        for range in [offset_range, limit_range, cols_range] {
            match range {
                Some(r) => self.builder.extend(suffix[rel(r)].to_vec()),
                None => {
                    self.builder.emit_unspanned(InstrKind::ConstNil);
                }
            }
        }

        let end_label = self.builder.fresh_label();
        let for_end_label = self.builder.fresh_label();

        // Unlike `for`, `tablerow` has no `else` clause: an empty
        // collection still needs to reach `TablerowEnd` (it emits the
        // empty-row markup), so the exit target is `for_end_label`, not
        // the construct's final label.
        self.builder.emit(InstrKind::TablerowBegin { var: var_sym, exit: for_end_label }, span);

        let loop_head = self.builder.fresh_label();
        self.builder.place_label(loop_head);
        self.builder.emit_unspanned(InstrKind::TablerowNext { exit: for_end_label });
        let (end_tag, is_blank, raw_writes) = self.parse_block_body(&["endtablerow"])?;
        self.apply_blank_suppression(is_blank, &raw_writes);
        self.builder.emit_unspanned(InstrKind::JumpIfInterrupt(for_end_label));
        self.builder.emit_unspanned(InstrKind::Jump(loop_head));

        if end_tag != "endtablerow" {
            return Err(CompileError::ExpectedEndTag { pos: span.start, expected: "endtablerow".to_string() });
        }

        self.builder.place_label(for_end_label);
        self.builder.emit_unspanned(InstrKind::TablerowEnd);
        self.builder.place_label(end_label);
        Ok(())
    }

    // ---- assign / capture / counters ----

    fn parse_assign(&mut self, rest: &'a str, span: Span) -> CompileResult<()> {
        let mut lx = self.expr_lexer(rest);
        let name_tok = lx.next();
        if name_tok.tok != Tok::Identifier {
            return Err(CompileError::UnexpectedToken { pos: name_tok.pos });
        }
        let eq = lx.next();
        if eq.text != "=" {
            return Err(CompileError::UnexpectedToken { pos: eq.pos });
        }
        self.parse_filtered_expr(&mut lx)?;
        let sym = self.interner.intern(name_tok.text);
        self.builder.emit(InstrKind::Assign(sym), span);
        Ok(())
    }

    fn parse_capture(&mut self, rest: &'a str, span: Span) -> CompileResult<()> {
        let name = rest.trim();
        if name.is_empty() {
            return Err(CompileError::UnexpectedToken { pos: span.start });
        }
        let sym = self.interner.intern(name);
        self.builder.emit(InstrKind::CaptureBegin(sym), span);
        let (end_tag, is_blank, raw_writes) = self.parse_block_body(&["endcapture"])?;
        self.apply_blank_suppression(is_blank, &raw_writes);
        if end_tag != "endcapture" {
            return Err(CompileError::ExpectedEndTag { pos: span.start, expected: "endcapture".to_string() });
        }
        self.builder.emit_unspanned(InstrKind::CaptureEnd);
        self.builder.emit_unspanned(InstrKind::Assign(sym));
        Ok(())
    }

    fn parse_counter(&mut self, rest: &'a str, span: Span, increment: bool) -> CompileResult<()> {
        let name = rest.trim();
        let sym = self.interner.intern(name);
        let kind = if increment { InstrKind::Increment(sym) } else { InstrKind::Decrement(sym) };
        self.builder.emit(kind, span);
        self.builder.emit_unspanned(InstrKind::WriteValue);
        Ok(())
    }

    // ---- cycle ----

    fn parse_cycle(&mut self, rest: &'a str, span: Span) -> CompileResult<()> {
        let mut lx = self.expr_lexer(rest);
        let mut group: Option<Symbol> = None;

        let cp = lx.checkpoint();
        let first = lx.next();
        if matches!(first.tok, Tok::String | Tok::Identifier) {
            let cp2 = lx.checkpoint();
            let maybe_colon = lx.next();
            if maybe_colon.tok == Tok::Colon {
                let text = if first.tok == Tok::String { strip_quotes(first.text) } else { first.text.to_string() };
                group = Some(self.interner.intern(&text));
            } else {
                lx.restore(cp2);
                lx.restore(cp);
            }
        } else {
            lx.restore(cp);
        }

        let mut values = Vec::new();
        loop {
            let t = lx.next();
            let value = match t.tok {
                Tok::String => CycleValue::Lit(ConstLit::String(strip_quotes(t.text).into())),
                Tok::Number => parse_number_lit(t.text).map(CycleValue::Lit).unwrap_or(CycleValue::Lit(ConstLit::Nil)),
                Tok::Nil => CycleValue::Lit(ConstLit::Nil),
                Tok::True => CycleValue::Lit(ConstLit::Bool(true)),
                Tok::False => CycleValue::Lit(ConstLit::Bool(false)),
                Tok::Identifier => CycleValue::Var(self.interner.intern(t.text)),
                Tok::Eof => break,
                _ => return Err(CompileError::UnexpectedToken { pos: t.pos }),
            };
            values.push(value);
            let cp3 = lx.checkpoint();
            let comma = lx.next();
            if comma.tok != Tok::Comma {
                lx.restore(cp3);
                break;
            }
        }

        self.builder.emit(InstrKind::CycleStep { group, values }, span);
        self.builder.emit_unspanned(InstrKind::WriteValue);
        Ok(())
    }

    // ---- raw / comment / doc ----

    fn parse_raw(&mut self, span: Span) -> CompileResult<()> {
        let body = self.lexer.scan_raw_body();
        let close = self.lexer.next();
        let (close_name, _) = split_tag(close.content);
        if close.kind != TokenKind::Tag || close_name != "endraw" {
            return Err(CompileError::UnterminatedRaw { pos: span.start });
        }
        if !body.is_empty() {
            let sym = self.interner.intern(body);
            self.builder.emit(InstrKind::WriteRaw(sym), span);
        }
        Ok(())
    }

    fn parse_comment(&mut self, span: Span) -> CompileResult<()> {
        let mut depth = 1u32;
        loop {
            let tok = self.lexer.next();
            if tok.kind == TokenKind::Eof {
                return Err(CompileError::UnterminatedTag { pos: span.start });
            }
            if tok.kind == TokenKind::Tag {
                let (name, _) = split_tag(tok.content);
                if name == "raw" {
                    self.lexer.scan_raw_body();
                    let endraw = self.lexer.next();
                    let (endraw_name, _) = split_tag(endraw.content);
                    if endraw_name != "endraw" {
                        return Err(CompileError::UnterminatedRaw { pos: span.start });
                    }
                    continue;
                }
                if name == "comment" {
                    depth += 1;
                } else if name == "endcomment" {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn parse_doc(&mut self, span: Span) -> CompileResult<()> {
        loop {
            let tok = self.lexer.next();
            if tok.kind == TokenKind::Eof {
                return Err(CompileError::UnterminatedTag { pos: span.start });
            }
            if tok.kind == TokenKind::Tag {
                let (name, _) = split_tag(tok.content);
                if name == "enddoc" {
                    return Ok(());
                }
            }
        }
    }

    // ---- ifchanged ----

    /// Captures the block body, then only writes it if it differs from
    /// the value captured the last time this call site ran. `IfchangedBegin`
    /// pops the captured string: on a match it branches past `WriteValue`/
    /// `IfchangedEnd`; otherwise it leaves the value on the stack for
    /// `WriteValue`, and `IfchangedEnd` records the new value for next time.
    fn parse_ifchanged(&mut self, span: Span) -> CompileResult<()> {
        let sym = self.interner.intern("ifchanged");
        self.builder.emit(InstrKind::CaptureBegin(sym), span);
        let (end_tag, is_blank, raw_writes) = self.parse_block_body(&["endifchanged"])?;
        self.apply_blank_suppression(is_blank, &raw_writes);
        if end_tag != "endifchanged" {
            return Err(CompileError::ExpectedEndTag { pos: span.start, expected: "endifchanged".to_string() });
        }
        self.builder.emit_unspanned(InstrKind::CaptureEnd);
        let skip = self.builder.fresh_label();
        self.builder.emit_unspanned(InstrKind::IfchangedBegin { exit: skip });
        self.builder.emit_unspanned(InstrKind::WriteValue);
        self.builder.emit_unspanned(InstrKind::IfchangedEnd);
        self.builder.place_label(skip);
        Ok(())
    }

    // ---- render / include ----

    /// `render`/`include '<name>' [(with|for) <expr> [as <alias>]] [, <key>:
    /// <value>]*`.
    ///
    /// Stack contract emitted here, consumed by the VM in this order: if
    /// the name is dynamic, the name value is pushed first; then, if a
    /// `with`/`for` clause is present, its value is pushed; then each
    /// keyword argument as a `(ConstString key, value)` pair, in source
    /// order. The VM pops keyword pairs first (last pair's value on top),
    /// then the bound value (if any), then the name (if dynamic).
    fn parse_partial(&mut self, rest: &'a str, span: Span, isolated: bool) -> CompileResult<()> {
        let mut lx = self.expr_lexer(rest);
        let t = lx.next();
        let name = match t.tok {
            Tok::String => PartialName::Const(self.interner.intern(&strip_quotes(t.text))),
            Tok::Identifier => {
                self.builder.emit_unspanned(InstrKind::FindVar(self.interner.intern(t.text)));
                PartialName::Dynamic
            }
            _ => return Err(CompileError::UnexpectedToken { pos: t.pos }),
        };
        let default_alias = match &name {
            PartialName::Const(s) => *s,
            PartialName::Dynamic => self.interner.intern("it"),
        };

        let mut with_var: Option<Symbol> = None;
        let mut for_each = false;
        let cp = lx.checkpoint();
        let kw = lx.next();
        if kw.tok == Tok::Identifier && (kw.text == "with" || kw.text == "for") {
            for_each = kw.text == "for";
            self.parse_expr(&mut lx)?;
            let mut alias = default_alias;
            let cp2 = lx.checkpoint();
            let as_kw = lx.next();
            if as_kw.tok == Tok::Identifier && as_kw.text == "as" {
                let alias_tok = lx.next();
                if alias_tok.tok != Tok::Identifier {
                    return Err(CompileError::UnexpectedToken { pos: alias_tok.pos });
                }
                alias = self.interner.intern(alias_tok.text);
            } else {
                lx.restore(cp2);
            }
            with_var = Some(alias);
        } else {
            lx.restore(cp);
        }

        let mut arg_count: u16 = 0;
        loop {
            let cp3 = lx.checkpoint();
            let sep = lx.next();
            if sep.tok != Tok::Comma {
                lx.restore(cp3);
                break;
            }
            let key_tok = lx.next();
            if key_tok.tok != Tok::Identifier {
                return Err(CompileError::UnexpectedToken { pos: key_tok.pos });
            }
            let colon = lx.next();
            if colon.tok != Tok::Colon {
                return Err(CompileError::UnexpectedToken { pos: colon.pos });
            }
            let key_sym = self.interner.intern(key_tok.text);
            self.builder.emit_unspanned(InstrKind::ConstString(key_sym));
            self.parse_expr(&mut lx)?;
            arg_count += 1;
        }

        self.builder.emit(InstrKind::Render { name, with_var, for_each, arg_count, isolated }, span);
        Ok(())
    }

    // ---- liquid mini-language (reduced: single-line statements only) ----

    fn parse_liquid_block(&mut self, rest: &'a str, span: Span) -> CompileResult<()> {
        for line in rest.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, args) = split_tag(line);
            self.parse_tag(name, args, span)?;
        }
        Ok(())
    }

    // ---- expression grammar ----

    fn parse_logical(&mut self, lx: &mut ExprLexer<'a>) -> CompileResult<()> {
        self.parse_comparison(lx)?;
        let cp = lx.checkpoint();
        let t = lx.next();
        match t.tok {
            Tok::And => {
                let skip = self.builder.fresh_label();
                let end = self.builder.fresh_label();
                self.builder.emit_unspanned(InstrKind::JumpIfFalse(skip));
                self.parse_logical(lx)?;
                self.builder.emit_unspanned(InstrKind::Jump(end));
                self.builder.place_label(skip);
                self.builder.emit_unspanned(InstrKind::ConstBool(false));
                self.builder.place_label(end);
            }
            Tok::Or => {
                let skip = self.builder.fresh_label();
                let end = self.builder.fresh_label();
                self.builder.emit_unspanned(InstrKind::JumpIfTrue(skip));
                self.parse_logical(lx)?;
                self.builder.emit_unspanned(InstrKind::Jump(end));
                self.builder.place_label(skip);
                self.builder.emit_unspanned(InstrKind::ConstBool(true));
                self.builder.place_label(end);
            }
            _ => lx.restore(cp),
        }
        Ok(())
    }

    fn parse_comparison(&mut self, lx: &mut ExprLexer<'a>) -> CompileResult<()> {
        self.parse_primary(lx)?;
        loop {
            let cp = lx.checkpoint();
            let t = lx.next();
            let op = match t.tok {
                Tok::Eq => CompareOp::Eq,
                Tok::Ne => CompareOp::Ne,
                Tok::Lt => CompareOp::Lt,
                Tok::Le => CompareOp::Le,
                Tok::Gt => CompareOp::Gt,
                Tok::Ge => CompareOp::Ge,
                Tok::Contains => CompareOp::Contains,
                _ => {
                    lx.restore(cp);
                    break;
                }
            };
            self.parse_primary(lx)?;
            self.builder.emit_unspanned(InstrKind::Compare(op));
        }
        Ok(())
    }

    fn parse_expr(&mut self, lx: &mut ExprLexer<'a>) -> CompileResult<()> {
        self.parse_logical(lx)
    }

    fn parse_filtered_expr(&mut self, lx: &mut ExprLexer<'a>) -> CompileResult<()> {
        self.parse_expr(lx)?;
        loop {
            let cp = lx.checkpoint();
            let t = lx.next();
            if t.tok != Tok::Pipe {
                lx.restore(cp);
                break;
            }
            let name_tok = lx.next();
            if name_tok.tok != Tok::Identifier {
                return Err(CompileError::UnexpectedToken { pos: name_tok.pos });
            }
            let name_sym = self.interner.intern(name_tok.text);

            let mut pos_count: u16 = 0;
            let mut kwarg_count: u16 = 0;

            let cp2 = lx.checkpoint();
            let colon = lx.next();
            if colon.tok == Tok::Colon {
                loop {
                    let cpk = lx.checkpoint();
                    let maybe_ident = lx.next();
                    let is_kwarg = if maybe_ident.tok == Tok::Identifier {
                        let cpk2 = lx.checkpoint();
                        let maybe_colon = lx.next();
                        lx.restore(cpk2);
                        maybe_colon.tok == Tok::Colon
                    } else {
                        false
                    };
                    lx.restore(cpk);

                    if is_kwarg {
                        let key_tok = lx.next();
                        let key_sym = self.interner.intern(key_tok.text);
                        lx.next(); // colon
                        self.builder.emit_unspanned(InstrKind::ConstString(key_sym));
                        self.parse_expr(lx)?;
                        kwarg_count += 1;
                    } else {
                        self.parse_expr(lx)?;
                        pos_count += 1;
                    }

                    let cpc = lx.checkpoint();
                    let comma = lx.next();
                    if comma.tok != Tok::Comma {
                        lx.restore(cpc);
                        break;
                    }
                }
            } else {
                lx.restore(cp2);
            }

            if kwarg_count > 0 {
                self.builder.emit_unspanned(InstrKind::BuildHash(kwarg_count));
            }
            let total_pos = pos_count + if kwarg_count > 0 { 1 } else { 0 };
            self.builder.emit_unspanned(InstrKind::CallFilter { name: name_sym, arg_count: total_pos });
        }
        Ok(())
    }

    fn parse_primary(&mut self, lx: &mut ExprLexer<'a>) -> CompileResult<()> {
        let t = lx.next();
        match t.tok {
            Tok::Number => {
                self.builder.emit_unspanned(number_instr(t.text).ok_or(CompileError::InvalidNumber { pos: t.pos })?);
            }
            Tok::String => {
                let sym = self.interner.intern(&strip_quotes(t.text));
                self.builder.emit_unspanned(InstrKind::ConstString(sym));
            }
            Tok::Nil => { self.builder.emit_unspanned(InstrKind::ConstNil); }
            Tok::True => { self.builder.emit_unspanned(InstrKind::ConstBool(true)); }
            Tok::False => { self.builder.emit_unspanned(InstrKind::ConstBool(false)); }
            Tok::Empty => { self.builder.emit_unspanned(InstrKind::ConstEmpty); }
            Tok::Blank => { self.builder.emit_unspanned(InstrKind::ConstBlank); }
            Tok::LParen => {
                self.parse_expr(lx)?;
                let cp = lx.checkpoint();
                let nt = lx.next();
                if nt.tok == Tok::DotDot {
                    self.parse_expr(lx)?;
                    self.builder.emit_unspanned(InstrKind::BuildRange);
                } else {
                    lx.restore(cp);
                }
                let close = lx.next();
                if close.tok != Tok::RParen {
                    return Err(CompileError::UnexpectedToken { pos: close.pos });
                }
                return Ok(());
            }
            Tok::LBracket => {
                self.parse_expr(lx)?;
                let close = lx.next();
                if close.tok != Tok::RBracket {
                    return Err(CompileError::UnexpectedToken { pos: close.pos });
                }
                self.builder.emit_unspanned(InstrKind::FindVarDynamic);
                self.parse_chain_tail(lx)?;
                return Ok(());
            }
            Tok::Identifier => {
                self.parse_identifier_chain(lx, t.text)?;
                return Ok(());
            }
            Tok::Eof => return Err(CompileError::UnexpectedEof { pos: t.pos }),
            _ => return Err(CompileError::UnexpectedToken { pos: t.pos }),
        };
        Ok(())
    }

    fn parse_identifier_chain(&mut self, lx: &mut ExprLexer<'a>, base_text: &str) -> CompileResult<()> {
        let base_sym = self.interner.intern(base_text);
        let mut pending: Vec<Symbol> = Vec::new();

        loop {
            let cp = lx.checkpoint();
            let t = lx.next();
            match t.tok {
                Tok::Dot | Tok::FatArrow => {
                    let idt = lx.next();
                    if idt.tok != Tok::Identifier {
                        return Err(CompileError::MissingPropertyName { pos: idt.pos });
                    }
                    pending.push(self.interner.intern(idt.text));
                }
                _ => {
                    lx.restore(cp);
                    break;
                }
            }
        }

        if pending.is_empty() {
            self.builder.emit_unspanned(InstrKind::FindVar(base_sym));
        } else {
            self.builder.emit_unspanned(InstrKind::FindVarPath(base_sym, pending));
        }

        self.parse_chain_tail(lx)
    }

    fn parse_chain_tail(&mut self, lx: &mut ExprLexer<'a>) -> CompileResult<()> {
        loop {
            let cp = lx.checkpoint();
            let t = lx.next();
            match t.tok {
                Tok::Dot | Tok::FatArrow => {
                    let idt = lx.next();
                    if idt.tok != Tok::Identifier {
                        return Err(CompileError::MissingPropertyName { pos: idt.pos });
                    }
                    let sym = self.interner.intern(idt.text);
                    self.builder.emit_unspanned(InstrKind::LookupConstKey(sym));
                }
                Tok::LBracket => {
                    self.parse_expr(lx)?;
                    let close = lx.next();
                    if close.tok != Tok::RBracket {
                        return Err(CompileError::UnexpectedToken { pos: close.pos });
                    }
                    self.builder.emit_unspanned(InstrKind::LookupKey);
                }
                _ => {
                    lx.restore(cp);
                    break;
                }
            }
        }
        Ok(())
    }
}

fn expect_keyword(lx: &mut ExprLexer<'_>, kw: &str, pos: u32) -> CompileResult<()> {
    let t = lx.next();
    if t.tok == Tok::Identifier && t.text == kw {
        Ok(())
    } else {
        Err(CompileError::InvalidForSyntax { pos, detail: format!("expected '{kw}'") })
    }
}

fn strip_quotes(s: &str) -> String {
    if s.len() >= 2 {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

fn parse_number_lit(text: &str) -> Option<ConstLit> {
    if text.contains('.') {
        text.parse::<f64>().ok().map(ConstLit::float)
    } else {
        text.parse::<i64>().ok().map(ConstLit::Int)
    }
}

fn number_instr(text: &str) -> Option<InstrKind<Label>> {
    match parse_number_lit(text)? {
        ConstLit::Int(i) => Some(InstrKind::ConstInt(i)),
        ConstLit::Float(bits) => Some(InstrKind::ConstFloat(bits)),
        _ => None,
    }
}

/// Splits `{% name rest %}` content into the tag name and the remaining
/// argument text.
/// Tags that never write to the enclosing body's output by themselves,
/// so their presence doesn't disqualify a block body from being "blank".
fn is_silent_tag(name: &str) -> bool {
    matches!(name, "comment" | "doc" | "assign" | "capture" | "break" | "continue" | "#")
}

fn split_tag(content: &str) -> (&str, &str) {
    let content = content.trim_start();
    match content.find(char::is_whitespace) {
        Some(i) => (&content[..i], content[i..].trim_start()),
        None => (content, ""),
    }
}

/// Splits a `when a, b, c` clause's argument list on top-level commas
/// (none of this grammar's literals can themselves contain an unquoted
/// comma, so a naive split outside quotes suffices).
fn split_top_level_commas(s: &str) -> impl Iterator<Item = &str> {
    let mut parts = Vec::new();
    let mut in_quote: Option<u8> = None;
    let mut start = 0;
    let bytes = s.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        match in_quote {
            Some(q) if b == q => in_quote = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => in_quote = Some(b),
            None if b == b',' => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            None => {}
        }
    }
    parts.push(s[start..].trim());
    parts.into_iter()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dump(src: &str) -> String {
        let (ir, interner, _registers) = parse(src).expect("parse");
        liquidil_bytecode::dump::dump_ir(&ir, &interner)
    }

    #[test]
    fn plain_text_emits_a_single_write_raw() {
        let text = dump("hello world");
        assert!(text.contains("write_raw \"hello world\""));
    }

    #[test]
    fn var_emits_find_var_then_write_value() {
        let text = dump("{{ name }}");
        assert!(text.contains("find_var name"));
        assert!(text.contains("write_value"));
    }

    #[test]
    fn property_chain_collapses_to_find_var_path() {
        let text = dump("{{ user.profile.name }}");
        assert!(text.contains("find_var_path user.profile.name"));
    }

    #[test]
    fn if_else_emits_balanced_jumps() {
        let text = dump("{% if a %}x{% else %}y{% endif %}");
        assert!(text.contains("jump_if_false"));
        assert!(text.contains("write_raw \"x\""));
        assert!(text.contains("write_raw \"y\""));
    }

    #[test]
    fn filter_with_positional_arg_counts_correctly() {
        let text = dump("{{ name | truncate: 5 }}");
        assert!(text.contains("truncate/1"));
    }

    #[test]
    fn for_loop_pushes_nil_sentinels_for_omitted_params() {
        let text = dump("{% for x in items %}{{ x }}{% endfor %}");
        assert!(text.contains("for_begin x"));
        assert!(text.contains("const_nil"));
    }

    #[test]
    fn unmatched_end_tag_is_an_error() {
        let err = parse("{% endif %}").unwrap_err();
        assert!(matches!(err, CompileError::UnmatchedEndTag { .. }));
    }

    #[test]
    fn unknown_tag_is_reported() {
        let err = parse("{% frobnicate %}").unwrap_err();
        assert!(matches!(err, CompileError::UnknownTag { .. }));
    }

    #[test]
    fn inline_comment_tag_is_not_unknown() {
        let text = dump("a{% # this note is ignored %}b");
        assert!(text.contains("write_raw \"a\""));
        assert!(text.contains("write_raw \"b\""));
    }

    #[test]
    fn blank_if_body_suppresses_its_own_whitespace() {
        let text = dump("{% if a %}   {% assign x = 1 %}   {% endif %}");
        assert_eq!(text.matches("write_raw \"\"").count(), 2);
        assert!(!text.contains("write_raw \"   \""));
    }

    #[test]
    fn non_blank_if_body_keeps_its_whitespace() {
        let text = dump("{% if a %}   {{ x }}   {% endif %}");
        assert!(text.contains("write_raw \"   \""));
    }

    #[test]
    fn blank_for_body_suppresses_its_own_whitespace() {
        let text = dump("{% for x in items %}   {% # note %}   {% endfor %}");
        assert_eq!(text.matches("write_raw \"\"").count(), 2);
    }
}
