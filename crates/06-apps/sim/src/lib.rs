//! Simulated equipment backend.
//!
//! A scripted link, a complete capability module for the generic sorter
//! dialect, a scripted operator front end, and an assembly helper that
//! wires everything into a ready-to-run driver session. Used by the
//! integration tests and the demo CLI.

mod bench;
mod operator;
mod plugin;
mod scripted;

pub use bench::{make_bench, SimBench};
pub use operator::ScriptedOperator;
pub use plugin::SimPlugin;
pub use scripted::{ScriptHandle, ScriptedLink};
