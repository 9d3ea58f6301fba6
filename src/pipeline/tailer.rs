use crate::config::types::{Config, DisplayZone};
use crate::record::{RecordParser, TranscriptParser};
use crate::render::{MarkdownRenderer, RenderError, Renderer};
use crate::source::{
    ActiveFileRef, ActiveFileResolver, Decision, FileIdentity, ReaderError, ResolvedBy, RotationDetector,
    TailReader,
};
use crate::storage::OffsetStore;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that end a tick early. The poll loop logs them and backs off.
#[derive(Debug, Error)]
pub enum TickError {
    #[error("failed to resolve active transcript: {0}")]
    Resolve(#[source] std::io::Error),

    #[error("failed to read transcript: {0}")]
    Read(#[from] ReaderError),

    #[error("failed to render entry from {identity} (progress kept up to byte {committed_offset}): {source}")]
    Render {
        identity: FileIdentity,
        committed_offset: u64,
        #[source]
        source: RenderError,
    },
}

/// Summary of a tick that found a transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub identity: FileIdentity,
    /// Which resolution rule picked the transcript
    pub resolved_by: ResolvedBy,
    pub decision: Decision,
    pub from_offset: u64,
    /// Offset committed this tick, if any bytes were consumed
    pub committed_offset: Option<u64>,
    pub lines: usize,
    pub records: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No transcript to follow yet
    Idle,
    /// The resolved transcript disappeared before it could be read
    Vanished(FileIdentity),
    Processed(TickReport),
}

/// One transcript follower: resolves, detects rotation, reads, parses,
/// renders and commits offsets, one tick at a time.
///
/// The tailer is the only writer of its [`OffsetStore`].
pub struct Tailer<P, R> {
    resolver: ActiveFileResolver,
    detector: RotationDetector,
    reader: TailReader,
    parser: P,
    renderer: R,
    store: OffsetStore,
    zone: DisplayZone,
}

impl Tailer<TranscriptParser, MarkdownRenderer> {
    /// Build the standard tailer and load its offset state.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ActiveFileResolver::new(&config.sessions),
            TranscriptParser::new(&config.messages, config.output.timezone),
            MarkdownRenderer::new(&config.output.dir),
            OffsetStore::load(&config.state.path),
            config.output.timezone,
        )
    }
}

impl<P: RecordParser, R: Renderer> Tailer<P, R> {
    pub fn new(
        resolver: ActiveFileResolver,
        parser: P,
        renderer: R,
        store: OffsetStore,
        zone: DisplayZone,
    ) -> Self {
        Self {
            resolver,
            detector: RotationDetector::new(),
            reader: TailReader::new(),
            parser,
            renderer,
            store,
            zone,
        }
    }

    pub fn store(&self) -> &OffsetStore {
        &self.store
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn tracked(&self) -> Option<&FileIdentity> {
        self.detector.tracked()
    }

    pub fn resolve_active(&self) -> Result<Option<(ActiveFileRef, ResolvedBy)>, TickError> {
        self.resolver.resolve_with_rule().map_err(TickError::Resolve)
    }

    /// Run one poll iteration.
    pub fn tick(&mut self) -> Result<TickOutcome, TickError> {
        let Some((active, resolved_by)) = self.resolve_active()? else {
            debug!(dir = %self.resolver.dir().display(), "No transcript to follow");
            return Ok(TickOutcome::Idle);
        };
        self.process(&active, resolved_by)
    }

    /// Tail `active`, which the resolver has just found.
    fn process(&mut self, active: &ActiveFileRef, resolved_by: ResolvedBy) -> Result<TickOutcome, TickError> {
        let identity = active.identity.clone();

        let decision = self.detector.observe(active);
        match &decision {
            Decision::Switch { previous: None } => {
                info!(session = %identity, path = %active.path.display(), rule = %resolved_by, "Tracking transcript");
            }
            Decision::Switch { previous: Some(previous) } => {
                info!(
                    from = %previous,
                    to = %identity,
                    path = %active.path.display(),
                    rule = %resolved_by,
                    "Active transcript changed"
                );
            }
            Decision::Reset => {
                warn!(session = %identity, size = active.size, "Transcript shrank, rereading from the start");
                self.store.reset(&identity);
            }
            Decision::Continue => {}
        }

        let mut from_offset = self.store.offset(&identity);
        if from_offset > active.size {
            warn!(
                session = %identity,
                offset = from_offset,
                size = active.size,
                "Stored offset is past the end of the transcript, rereading from the start"
            );
            self.store.reset(&identity);
            from_offset = 0;
        }

        let mut report = TickReport {
            identity: identity.clone(),
            resolved_by,
            decision,
            from_offset,
            committed_offset: None,
            lines: 0,
            records: 0,
        };

        if from_offset == active.size {
            self.persist();
            return Ok(TickOutcome::Processed(report));
        }

        let Some(batch) = self.reader.read_new(&active.path, from_offset)? else {
            debug!(session = %identity, "Transcript vanished before it could be read");
            self.persist();
            return Ok(TickOutcome::Vanished(identity));
        };

        let mut consumed_to = from_offset;
        for line in &batch.lines {
            if let Some(record) = self.parser.parse(&line.text) {
                if let Err(source) = self.renderer.append(&record) {
                    self.commit(&identity, from_offset, consumed_to);
                    self.persist();
                    return Err(TickError::Render {
                        identity,
                        committed_offset: consumed_to,
                        source,
                    });
                }
                report.records += 1;
            }
            consumed_to = line.end_offset;
        }
        // Trailing blank lines are consumed too
        consumed_to = batch.end_offset;

        report.lines = batch.lines.len();
        if self.commit(&identity, from_offset, consumed_to) {
            report.committed_offset = Some(consumed_to);
        }
        self.persist();

        if report.records > 0 {
            info!(session = %identity, entries = report.records, offset = consumed_to, "Wrote entries");
        } else if batch.pending_bytes > 0 {
            debug!(session = %identity, pending = batch.pending_bytes, "Waiting for an incomplete line");
        }

        Ok(TickOutcome::Processed(report))
    }

    fn commit(&mut self, identity: &FileIdentity, from_offset: u64, to_offset: u64) -> bool {
        if to_offset <= from_offset {
            return false;
        }
        self.store.commit(identity, to_offset, self.zone.now());
        true
    }

    /// Persist pending offset changes. A failure is logged, not returned:
    /// processing already happened and the next successful persist catches up.
    pub fn persist(&mut self) {
        if let Err(e) = self.store.persist_if_dirty() {
            warn!(path = %self.store.path().display(), error = %e, "Could not save offset state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::SessionsConfig;
    use crate::record::{ParsedRecord, Role};
    use chrono::Utc;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Every non-empty line is a record whose content is the line itself.
    struct EchoParser;

    impl RecordParser for EchoParser {
        fn parse(&self, raw: &str) -> Option<ParsedRecord> {
            if raw.starts_with('#') {
                return None;
            }
            Some(ParsedRecord {
                timestamp: Utc::now().fixed_offset(),
                role: Role::User,
                role_label: "User".to_string(),
                content: raw.to_string(),
            })
        }
    }

    #[derive(Default)]
    struct VecRenderer {
        seen: Vec<String>,
        fail_on: Option<String>,
    }

    impl Renderer for VecRenderer {
        fn append(&mut self, record: &ParsedRecord) -> Result<PathBuf, RenderError> {
            if self.fail_on.as_deref() == Some(record.content.as_str()) {
                return Err(RenderError::Io {
                    path: PathBuf::from("/dev/full"),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                });
            }
            self.seen.push(record.content.clone());
            Ok(PathBuf::from("memory"))
        }
    }

    fn tailer(dir: &Path, renderer: VecRenderer) -> Tailer<EchoParser, VecRenderer> {
        let sessions = SessionsConfig {
            dir: dir.join("sessions"),
            pointer_file: "sessions.json".to_string(),
            pointer_key: "agent:main:main".to_string(),
            fallback_session_id: None,
            extension: "jsonl".to_string(),
            deleted_marker: ".deleted.".to_string(),
        };
        fs::create_dir_all(&sessions.dir).unwrap();
        Tailer::new(
            ActiveFileResolver::new(&sessions),
            EchoParser,
            renderer,
            OffsetStore::load(dir.join("state.json")),
            DisplayZone::Utc,
        )
    }

    fn append(path: &Path, data: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut f = OpenOptions::new().create(true).append(true).open(path).unwrap();
        f.write_all(data.as_bytes()).unwrap();
    }

    #[test]
    fn test_idle_without_transcripts() {
        let temp_dir = TempDir::new().unwrap();
        let mut tailer = tailer(temp_dir.path(), VecRenderer::default());
        assert_eq!(tailer.tick().unwrap(), TickOutcome::Idle);
        assert!(tailer.tracked().is_none());
        assert!(!temp_dir.path().join("state.json").exists());
    }

    #[test]
    fn test_unparsed_lines_still_advance_offset() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sessions/s1.jsonl");
        append(&path, "# skipped\nkept\n");

        let mut tailer = tailer(temp_dir.path(), VecRenderer::default());
        let TickOutcome::Processed(report) = tailer.tick().unwrap() else {
            panic!("expected a processed tick");
        };
        assert_eq!(report.lines, 2);
        assert_eq!(report.records, 1);
        assert_eq!(report.committed_offset, Some(15));
        assert_eq!(tailer.renderer().seen, vec!["kept"]);
    }

    #[test]
    fn test_render_failure_keeps_earlier_progress() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sessions/s1.jsonl");
        append(&path, "one\ntwo\nthree\n");

        let renderer = VecRenderer {
            fail_on: Some("two".to_string()),
            ..Default::default()
        };
        let mut tailer = tailer(temp_dir.path(), renderer);
        let err = tailer.tick().unwrap_err();
        assert!(matches!(err, TickError::Render { committed_offset: 4, .. }));

        let id = FileIdentity::new("s1");
        assert_eq!(tailer.store().offset(&id), 4);
        let reloaded = OffsetStore::load(temp_dir.path().join("state.json"));
        assert_eq!(reloaded.offset(&id), 4);
    }

    #[test]
    fn test_file_gone_before_read_is_vanished() {
        let temp_dir = TempDir::new().unwrap();
        let mut tailer = tailer(temp_dir.path(), VecRenderer::default());
        let gone = ActiveFileRef {
            identity: FileIdentity::new("gone"),
            path: temp_dir.path().join("sessions/gone.jsonl"),
            size: 64,
        };

        let outcome = tailer.process(&gone, ResolvedBy::MostRecent).unwrap();
        assert_eq!(outcome, TickOutcome::Vanished(FileIdentity::new("gone")));
        assert_eq!(tailer.tracked(), Some(&FileIdentity::new("gone")));
        assert_eq!(tailer.store().offset(&FileIdentity::new("gone")), 0);
        assert!(tailer.renderer().seen.is_empty());
    }

    #[test]
    fn test_report_names_resolution_rule() {
        let temp_dir = TempDir::new().unwrap();
        append(&temp_dir.path().join("sessions/s1.jsonl"), "one\n");
        append(&temp_dir.path().join("sessions/s2.jsonl"), "two\n");
        fs::write(
            temp_dir.path().join("sessions/sessions.json"),
            r#"{"agent:main:main": {"sessionId": "s1"}}"#,
        )
        .unwrap();

        let mut tailer = tailer(temp_dir.path(), VecRenderer::default());
        let TickOutcome::Processed(report) = tailer.tick().unwrap() else {
            panic!("expected a processed tick");
        };
        assert_eq!(report.identity, FileIdentity::new("s1"));
        assert_eq!(report.resolved_by, ResolvedBy::Pointer);
    }

    #[test]
    fn test_no_new_bytes_is_quiet_tick() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("sessions/s1.jsonl");
        append(&path, "one\n");

        let mut tailer = tailer(temp_dir.path(), VecRenderer::default());
        tailer.tick().unwrap();
        let TickOutcome::Processed(report) = tailer.tick().unwrap() else {
            panic!("expected a processed tick");
        };
        assert_eq!(report.decision, Decision::Continue);
        assert_eq!(report.committed_offset, None);
        assert_eq!(tailer.renderer().seen.len(), 1);
    }
}
