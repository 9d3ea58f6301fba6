//! Incrementally turns OpenClaw session transcripts into daily markdown
//! conversation logs, resuming from stored byte offsets across restarts and
//! transcript rotation.

pub mod cli;
pub mod config;
pub mod pipeline;
pub mod record;
pub mod render;
pub mod source;
pub mod storage;
