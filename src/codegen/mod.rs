//! Target code generation: structured Python from the TAC label graph

mod python;

pub use python::PythonGenerator;
