pub mod runner;
pub mod tailer;

pub use runner::run_poll_loop;
pub use tailer::{Tailer, TickError, TickOutcome, TickReport};
