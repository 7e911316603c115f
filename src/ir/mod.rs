//! Three-address intermediate code and AST lowering

mod lower;
mod tac;

pub use lower::IrGenerator;
pub use tac::{Instruction, Opcode, Operand};
