pub mod identity;
pub mod reader;
pub mod rotation;

pub use identity::{ActiveFileRef, ActiveFileResolver, FileIdentity, ResolvedBy};
pub use reader::{ReaderError, TailBatch, TailLine, TailReader};
pub use rotation::{Decision, RotationDetector};
