use crate::bytecode::{Instruction, Operand, Program, SymbolTable};
use std::collections::BTreeSet;
use std::fmt::Write;

const RULE: &str = "════════════════════════════════════════";
const TARGET_RULE: &str = "      ┌──────────────────────────────────";

/// Print disassembly of a program to stdout
pub fn print_program(program: &Program, symbols: Option<&SymbolTable>) {
    print!("{}", disassemble(program, symbols));
}

/// Render a program listing, one instruction per line, with jump targets marked
pub fn disassemble(program: &Program, symbols: Option<&SymbolTable>) -> String {
    let mut out = String::new();
    let targets = collect_jump_targets(program);

    let _ = writeln!(out, "{}", RULE);
    let _ = writeln!(out, " main");
    let _ = writeln!(out, " {} instructions", program.len());
    if let Some(symbols) = symbols {
        let _ = writeln!(out, " {} slots: {}", symbols.len(), symbols.names().join(", "));
    }
    let _ = writeln!(out, "{}", RULE);

    for (addr, instr) in program.instructions.iter().enumerate() {
        let marked = targets.contains(&addr);
        if marked {
            let _ = writeln!(out, "{}", TARGET_RULE);
        }
        let _ = writeln!(
            out,
            "{:04} {} {}",
            addr,
            if marked { "►" } else { " " },
            format_instruction(instr, symbols)
        );
    }

    // A block that closes the program jumps one past the last instruction.
    if targets.contains(&program.len()) {
        let _ = writeln!(out, "{}", TARGET_RULE);
        let _ = writeln!(out, "{:04} ► <end>", program.len());
    }

    out
}

fn collect_jump_targets(program: &Program) -> BTreeSet<usize> {
    program
        .instructions
        .iter()
        .filter_map(Instruction::jump_target)
        .map(|t| t as usize)
        .collect()
}

fn slot_name(slot: u32, symbols: Option<&SymbolTable>) -> String {
    symbols
        .and_then(|s| s.name_of(slot))
        .map(str::to_string)
        .unwrap_or_else(|| format!("r{}", slot))
}

fn operand(op: Operand, symbols: Option<&SymbolTable>) -> String {
    match op {
        Operand::Literal(n) => n.to_string(),
        Operand::Slot(s) => slot_name(s, symbols),
    }
}

pub fn format_instruction(instr: &Instruction, symbols: Option<&SymbolTable>) -> String {
    let mnemonic = instr.opcode().mnemonic();
    match *instr {
        Instruction::Set { dest, value } => {
            format!("{:<13} {} = {}", mnemonic, slot_name(dest, symbols), value)
        }
        Instruction::Add { dest, lhs, rhs }
        | Instruction::Sub { dest, lhs, rhs }
        | Instruction::Mul { dest, lhs, rhs }
        | Instruction::Div { dest, lhs, rhs }
        | Instruction::Mod { dest, lhs, rhs } => format!(
            "{:<13} {} = {}, {}",
            mnemonic,
            slot_name(dest, symbols),
            operand(lhs, symbols),
            operand(rhs, symbols)
        ),
        Instruction::Cmp { lhs, rhs, op } => format!(
            "{:<13} {} {} {}",
            mnemonic,
            operand(lhs, symbols),
            op.symbol(),
            operand(rhs, symbols)
        ),
        Instruction::JumpIfFalse { target } | Instruction::Jump { target } => {
            format!("{:<13} -> {:04}", mnemonic, target)
        }
        Instruction::Return { src } => format!("{:<13} {}", mnemonic, slot_name(src, symbols)),
    }
}
