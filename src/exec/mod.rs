//! Sandboxed execution of generated target code

mod sandbox;

pub use sandbox::{ExecOutcome, Sandbox, SandboxLimits};
