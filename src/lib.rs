//! Compiler and register VM for Arc, a small imperative language with
//! integer variables, single-operator arithmetic, `if`/`while` blocks and
//! `return`.
//!
//! ```text
//! source --lexer--> tokens --compile--> Program --codec--> bytes
//!                                          |
//!                                          +--vm--> Execution
//! ```

pub mod bytecode;
pub mod driver;
pub mod error;
pub mod frontend;
pub mod runtime;

pub use bytecode::{Instruction, Opcode, Operand, Program, RelOp, SymbolTable};
pub use error::ArcError;
pub use runtime::vm::{Execution, Vm, VmConfig};
