pub mod codec;
pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod image;
pub mod ir;
pub mod op;

pub use ir::{Program, SymbolTable};
pub use op::{Instruction, Opcode, Operand, RelOp};
