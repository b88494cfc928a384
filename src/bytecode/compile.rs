use tracing::debug;

use crate::{
    bytecode::{
        Instruction, Operand, Program, RelOp, SymbolTable,
        compile_error::{BlockKind, CompileError},
    },
    frontend::{
        lexer::{Span, Spanned},
        token::Token,
    },
};

/// Output of one compile invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledUnit {
    pub program: Program,
    pub symbols: SymbolTable,
}

#[derive(Debug, Clone, Copy)]
enum PatchKind {
    If,
    While { loop_start: u32 },
}

/// An open `if`/`while` whose JUMP_IF_FALSE still points at a placeholder.
#[derive(Debug, Clone, Copy)]
struct PatchEntry {
    kind: PatchKind,
    jump_index: usize,
    opened_at: Span,
}

/// Single-pass emitter. All state lives in the value and is consumed by
/// [`Compiler::compile`], so independent compiles never share anything.
pub struct Compiler {
    /// Output program
    program: Program,

    /// Variable slots, first-seen order
    symbols: SymbolTable,

    /// One entry per currently open block, innermost last
    patches: Vec<PatchEntry>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            program: Program::new(),
            symbols: SymbolTable::new(),
            patches: Vec::new(),
        }
    }

    pub fn compile(mut self, tokens: &[Spanned]) -> Result<CompiledUnit, CompileError> {
        for spanned in tokens {
            self.compile_token(&spanned.token, spanned.span)?;
        }

        if let Some(open) = self.patches.pop() {
            let kind = match open.kind {
                PatchKind::If => BlockKind::If,
                PatchKind::While { .. } => BlockKind::While,
            };
            return Err(CompileError::UnclosedBlock {
                kind,
                span: open.opened_at,
            });
        }

        debug!(
            instructions = self.program.len(),
            slots = self.symbols.len(),
            "compiled"
        );

        Ok(CompiledUnit {
            program: self.program,
            symbols: self.symbols,
        })
    }

    fn compile_token(&mut self, token: &Token, span: Span) -> Result<(), CompileError> {
        match token {
            Token::Let { name, value } => {
                let dest = self.slot(name, span)?;
                let value = parse_literal(value, span)?;
                self.emit(Instruction::Set { dest, value })?;
            }

            Token::Assign {
                target,
                lhs,
                op,
                rhs,
            } => {
                let dest = self.slot(target, span)?;
                let lhs = self.operand(lhs, span)?;
                let rhs = self.operand(rhs, span)?;
                self.emit(op.instruction(dest, lhs, rhs))?;
            }

            Token::If { lhs, rel, rhs } => {
                let jump_index = self.emit_condition(lhs, rel, rhs, span)?;
                self.patches.push(PatchEntry {
                    kind: PatchKind::If,
                    jump_index,
                    opened_at: span,
                });
            }

            Token::While { lhs, rel, rhs } => {
                let loop_start = self.here()?;
                let jump_index = self.emit_condition(lhs, rel, rhs, span)?;
                self.patches.push(PatchEntry {
                    kind: PatchKind::While { loop_start },
                    jump_index,
                    opened_at: span,
                });
            }

            Token::BlockOpen => {}

            Token::BlockClose => self.close_block(span)?,

            Token::Return { name } => {
                let src = self.slot(name, span)?;
                self.emit(Instruction::Return { src })?;
            }
        }

        Ok(())
    }

    /// Emits `CMP` plus a placeholder `JUMP_IF_FALSE`; returns the jump's address.
    fn emit_condition(
        &mut self,
        lhs: &str,
        rel: &str,
        rhs: &str,
        span: Span,
    ) -> Result<usize, CompileError> {
        let op = RelOp::from_symbol(rel).ok_or_else(|| CompileError::UnknownRelation {
            symbol: rel.to_string(),
            span,
        })?;
        let lhs = self.operand(lhs, span)?;
        let rhs = self.operand(rhs, span)?;
        self.emit(Instruction::Cmp { lhs, rhs, op })?;
        self.emit(Instruction::JumpIfFalse { target: 0 })
    }

    fn close_block(&mut self, span: Span) -> Result<(), CompileError> {
        let entry = self
            .patches
            .pop()
            .ok_or(CompileError::UnmatchedBlockClose { span })?;

        if let PatchKind::While { loop_start } = entry.kind {
            self.emit(Instruction::Jump { target: loop_start })?;
        }

        // Right after the block (and after the loop's back-jump for WHILE).
        let exit = self.here()?;
        self.patch(entry.jump_index, exit);
        Ok(())
    }

    fn patch(&mut self, jump_index: usize, exit: u32) {
        if let Some(Instruction::JumpIfFalse { target }) =
            self.program.instructions.get_mut(jump_index)
        {
            *target = exit;
            debug!(addr = jump_index, target = exit, "patched JUMP_IF_FALSE");
        }
    }

    fn here(&self) -> Result<u32, CompileError> {
        u32::try_from(self.program.len())
            .ok()
            .filter(|addr| *addr <= i32::MAX as u32)
            .ok_or(CompileError::ProgramTooLarge {
                max: i32::MAX as u32,
            })
    }

    fn emit(&mut self, instr: Instruction) -> Result<usize, CompileError> {
        let addr = self.here()? as usize;
        debug!(addr, instr = ?instr, "emit");
        self.program.instructions.push(instr);
        Ok(addr)
    }

    /// Digit-looking text is a literal; anything else names a slot,
    /// declared on first use.
    fn operand(&mut self, text: &str, span: Span) -> Result<Operand, CompileError> {
        if is_literal(text) {
            Ok(Operand::Literal(parse_literal(text, span)?))
        } else {
            Ok(Operand::Slot(self.symbols.resolve(text)))
        }
    }

    fn slot(&mut self, name: &str, span: Span) -> Result<u32, CompileError> {
        if is_literal(name) {
            return Err(CompileError::LiteralTarget {
                literal: name.to_string(),
                span,
            });
        }
        Ok(self.symbols.resolve(name))
    }
}

fn is_literal(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn parse_literal(text: &str, span: Span) -> Result<i32, CompileError> {
    text.parse::<i32>()
        .map_err(|_| CompileError::LiteralOutOfRange {
            literal: text.to_string(),
            span,
        })
}

/// Compiles an already lexed token stream.
pub fn compile_tokens(tokens: &[Spanned]) -> Result<CompiledUnit, CompileError> {
    Compiler::new().compile(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Opcode;
    use crate::frontend::lexer::tokenize;

    fn compile(source: &str) -> Result<CompiledUnit, CompileError> {
        compile_tokens(&tokenize(source).expect("lexing should succeed"))
    }

    fn ops(source: &str) -> Vec<Instruction> {
        compile(source)
            .expect("compile should succeed")
            .program
            .instructions
    }

    fn slot(n: u32) -> Operand {
        Operand::Slot(n)
    }

    fn lit(n: i32) -> Operand {
        Operand::Literal(n)
    }

    // =========================================================================
    // Statements
    // =========================================================================

    #[test]
    fn test_let_and_add() {
        assert_eq!(
            ops("let a = 5\nlet b = 7\nc = a + b\nreturn c"),
            vec![
                Instruction::Set { dest: 0, value: 5 },
                Instruction::Set { dest: 1, value: 7 },
                Instruction::Add {
                    dest: 2,
                    lhs: slot(0),
                    rhs: slot(1)
                },
                Instruction::Return { src: 2 },
            ]
        );
    }

    #[test]
    fn test_every_arith_opcode() {
        let got: Vec<Opcode> = ops("x = a + 1\nx = a - 1\nx = a * 1\nx = a / 1\nx = a % 1")
            .iter()
            .map(Instruction::opcode)
            .collect();
        assert_eq!(
            got,
            vec![
                Opcode::Add,
                Opcode::Sub,
                Opcode::Mul,
                Opcode::Div,
                Opcode::Mod
            ]
        );
    }

    #[test]
    fn test_literal_operands_are_tagged() {
        assert_eq!(
            ops("x = 3 * -2"),
            vec![Instruction::Mul {
                dest: 0,
                lhs: lit(3),
                rhs: lit(-2)
            }]
        );
    }

    #[test]
    fn test_undeclared_names_are_auto_declared() {
        let unit = compile("c = a + b\nreturn d").unwrap();
        assert_eq!(unit.symbols.names(), &["c", "a", "b", "d"]);
        assert_eq!(unit.program.instructions[1], Instruction::Return { src: 3 });
    }

    #[test]
    fn test_let_reuses_existing_slot() {
        assert_eq!(
            ops("let a = 1\nlet b = 2\nlet a = 3"),
            vec![
                Instruction::Set { dest: 0, value: 1 },
                Instruction::Set { dest: 1, value: 2 },
                Instruction::Set { dest: 0, value: 3 },
            ]
        );
    }

    #[test]
    fn test_slots_stable_and_first_seen_ordered() {
        let unit = compile("let z = 1\ny = z + x\nif x > z { w = y - 1 }\nreturn z").unwrap();
        assert_eq!(unit.symbols.names(), &["z", "y", "x", "w"]);
        for (slot, name) in unit.symbols.names().iter().enumerate() {
            assert_eq!(unit.symbols.get(name), Some(slot as u32));
        }
    }

    // =========================================================================
    // Control flow patching
    // =========================================================================

    #[test]
    fn test_if_patches_past_block() {
        assert_eq!(
            ops("let x = 9\nif x > 5 {\nx = x + 2\n}\nreturn x"),
            vec![
                Instruction::Set { dest: 0, value: 9 },
                Instruction::Cmp {
                    lhs: slot(0),
                    rhs: lit(5),
                    op: RelOp::Gt
                },
                Instruction::JumpIfFalse { target: 4 },
                Instruction::Add {
                    dest: 0,
                    lhs: slot(0),
                    rhs: lit(2)
                },
                Instruction::Return { src: 0 },
            ]
        );
    }

    #[test]
    fn test_while_jumps_back_and_exits_past_back_jump() {
        assert_eq!(
            ops("let a = 0\nlet b = 5\nwhile a < b {\na = a + 1\n}\nreturn a"),
            vec![
                Instruction::Set { dest: 0, value: 0 },
                Instruction::Set { dest: 1, value: 5 },
                Instruction::Cmp {
                    lhs: slot(0),
                    rhs: slot(1),
                    op: RelOp::Lt
                },
                Instruction::JumpIfFalse { target: 6 },
                Instruction::Add {
                    dest: 0,
                    lhs: slot(0),
                    rhs: lit(1)
                },
                Instruction::Jump { target: 2 },
                Instruction::Return { src: 0 },
            ]
        );
    }

    #[test]
    fn test_if_at_end_targets_program_length() {
        let program = ops("let x = 1\nif x == 1 { x = x + 1 }");
        assert_eq!(program.len(), 4);
        assert_eq!(program[2], Instruction::JumpIfFalse { target: 4 });
    }

    #[test]
    fn test_nested_blocks_patch_independently() {
        let src = "\
while i < 3 {
    if i == 1 {
        while j < 2 {
            j = j + 1
        }
    }
    i = i + 1
}
return j";
        let program = ops(src);
        // 0 CMP i<3, 1 JIF, 2 CMP i==1, 3 JIF, 4 CMP j<2, 5 JIF, 6 ADD j,
        // 7 JUMP 4, 8 ADD i, 9 JUMP 0, 10 RETURN
        assert_eq!(program.len(), 11);
        assert_eq!(program[1], Instruction::JumpIfFalse { target: 10 });
        assert_eq!(program[3], Instruction::JumpIfFalse { target: 8 });
        assert_eq!(program[5], Instruction::JumpIfFalse { target: 8 });
        assert_eq!(program[7], Instruction::Jump { target: 4 });
        assert_eq!(program[9], Instruction::Jump { target: 0 });
    }

    #[test]
    fn test_sibling_blocks() {
        let program = ops("if a > 0 { a = a - 1 }\nif b > 0 { b = b - 1 }");
        assert_eq!(program[1], Instruction::JumpIfFalse { target: 3 });
        assert_eq!(program[4], Instruction::JumpIfFalse { target: 6 });
    }

    #[test]
    fn test_every_relation_reaches_cmp() {
        for (symbol, expected) in [
            ("==", RelOp::Eq),
            ("!=", RelOp::Ne),
            ("<", RelOp::Lt),
            ("<=", RelOp::Le),
            (">", RelOp::Gt),
            (">=", RelOp::Ge),
        ] {
            let program = ops(&format!("if a {} b {{ }}", symbol));
            match program[0] {
                Instruction::Cmp { op, .. } => assert_eq!(op, expected),
                other => panic!("expected CMP, got {:?}", other),
            }
        }
    }

    // =========================================================================
    // Errors
    // =========================================================================

    #[test]
    fn test_unmatched_close() {
        let err = compile("let a = 1\n}").unwrap_err();
        assert!(matches!(err, CompileError::UnmatchedBlockClose { .. }));
        assert_eq!(err.span().map(|s| s.line), Some(2));
    }

    #[test]
    fn test_unclosed_block() {
        let err = compile("while a < 3 {\na = a + 1").unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnclosedBlock {
                kind: BlockKind::While,
                ..
            }
        ));
    }

    #[test]
    fn test_literal_out_of_range() {
        let err = compile("let a = 4294967296").unwrap_err();
        assert!(matches!(err, CompileError::LiteralOutOfRange { .. }));
        assert!(err.to_string().contains("does not fit"), "{}", err);
    }

    #[test]
    fn test_literal_cannot_be_returned() {
        let err = compile("return 5").unwrap_err();
        assert!(matches!(err, CompileError::LiteralTarget { .. }));
    }

    #[test]
    fn test_independent_compiles_share_nothing() {
        let first = compile("let a = 1\nlet b = 2").unwrap();
        let second = compile("let b = 2").unwrap();
        assert_eq!(first.symbols.get("b"), Some(1));
        assert_eq!(second.symbols.get("b"), Some(0));
    }
}
