use super::identity::{ActiveFileRef, FileIdentity};

/// What the tailer should do with the active file on this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Same stream as last tick and it has not shrunk; read from the stored offset.
    Continue,
    /// Same stream but smaller than last seen; the stored offset is void.
    Reset,
    /// A different stream is active (or the first one was found). It resumes
    /// from its own stored offset; the previous stream's offset is untouched.
    Switch { previous: Option<FileIdentity> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Observation {
    identity: FileIdentity,
    size: u64,
}

/// Remembers the identity and size seen on the previous tick.
///
/// `None` is the idle state: nothing has been tracked yet. The detector never
/// returns to idle on its own; a tick that resolves nothing leaves it alone.
#[derive(Debug, Default)]
pub struct RotationDetector {
    last: Option<Observation>,
}

impl RotationDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracked(&self) -> Option<&FileIdentity> {
        self.last.as_ref().map(|o| &o.identity)
    }

    /// Classify `current` against the previous observation and remember it.
    pub fn observe(&mut self, current: &ActiveFileRef) -> Decision {
        let decision = match &self.last {
            None => Decision::Switch { previous: None },
            Some(last) if last.identity != current.identity => Decision::Switch {
                previous: Some(last.identity.clone()),
            },
            Some(last) if current.size < last.size => Decision::Reset,
            Some(_) => Decision::Continue,
        };

        self.last = Some(Observation {
            identity: current.identity.clone(),
            size: current.size,
        });

        decision
    }
}
