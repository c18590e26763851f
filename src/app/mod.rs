// Application layer: picks jobs by name and wires them to concrete adapters.

pub mod runner;

pub use runner::{execute, run_kind, JobKind};
