//! One open document: command engine, derived caches and debounced autosave.
//!
//! [`DocumentSession`] wraps a [`CommandExecutor`] the way a host uses it:
//!
//! 1. the host turns input into [`Command`]s and calls [`DocumentSession::execute`]
//! 2. the session forwards the committed [`ChangeSet`] to the memoizing serializer and the
//!    decoration cache, bumps its version and notifies subscribers
//! 3. an edit (re)schedules an autosave; [`DocumentSession::tick`] writes the markdown to the
//!    [`DocumentSink`] once the debounce delay has passed
//! 4. [`DocumentSession::close`] and [`DocumentSession::focus_lost`] flush synchronously
//!
//! Time is passed in explicitly (`Instant`) so hosts and tests control the clock.

use crate::commands::{Command, CommandError, CommandExecutor, CommandResult};
use crate::config::EngineConfig;
use crate::decorations::{Decoration, DecorationCache, Highlighter};
use crate::delta::ChangeSet;
use crate::document::Document;
use crate::markdown::MarkdownSerializer;
use crate::path::Path;
use crate::search::{SearchError, SearchMatch, SearchOptions, SearchQuery};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The command engine rejected an intent.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// The search query is invalid.
    #[error(transparent)]
    Search(#[from] SearchError),
    /// The sink failed to persist the document.
    #[error("failed to save document: {0}")]
    Save(String),
    /// The session was already closed.
    #[error("session is closed")]
    Closed,
}

/// Where serialized markdown is persisted.
pub trait DocumentSink {
    /// Persist `markdown`.
    fn save(&mut self, markdown: &str) -> Result<(), SessionError>;
}

/// Debounce timer for autosave.
///
/// Each edit cancels the pending save and schedules a new one `delay` later.
#[derive(Debug, Clone)]
pub struct AutosaveScheduler {
    delay: Duration,
    due: Option<Instant>,
}

impl AutosaveScheduler {
    /// Create a scheduler with the given debounce delay.
    pub fn new(delay: Duration) -> Self {
        Self { delay, due: None }
    }

    /// Debounce delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Record an edit at `now`: cancel the pending save and reschedule.
    pub fn note_edit(&mut self, now: Instant) {
        self.due = Some(now + self.delay);
    }

    /// When the pending save fires, if any.
    pub fn due_at(&self) -> Option<Instant> {
        self.due
    }

    /// Whether a save is pending.
    pub fn is_pending(&self) -> bool {
        self.due.is_some()
    }

    /// Whether the pending save is due at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        self.due.is_some_and(|due| now >= due)
    }

    /// Consume the pending save if it is due at `now`.
    pub fn take_due(&mut self, now: Instant) -> bool {
        if self.is_due(now) {
            self.due = None;
            true
        } else {
            false
        }
    }

    /// Drop the pending save.
    pub fn cancel(&mut self) {
        self.due = None;
    }
}

/// What kind of state a session change touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionChangeType {
    /// The tree changed.
    DocumentModified,
    /// Only the selection changed.
    SelectionChanged,
    /// The document was written to the sink.
    Saved,
}

/// A notification delivered to subscribers.
#[derive(Debug, Clone)]
pub struct SessionChange {
    /// Change type.
    pub change_type: SessionChangeType,
    /// Version before the change.
    pub old_version: u64,
    /// Version after the change.
    pub new_version: u64,
    /// Nodes touched by the change (for [`SessionChangeType::DocumentModified`]).
    pub changes: Option<Arc<ChangeSet>>,
}

/// Subscriber callback.
pub type SessionCallback = Box<dyn FnMut(&SessionChange) + Send>;

/// One open markdown document.
pub struct DocumentSession<S: DocumentSink> {
    executor: CommandExecutor,
    serializer: MarkdownSerializer,
    decorations: DecorationCache,
    autosave: AutosaveScheduler,
    sink: S,
    version: u64,
    dirty: bool,
    closed: bool,
    callbacks: Vec<SessionCallback>,
}

impl<S: DocumentSink> std::fmt::Debug for DocumentSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentSession")
            .field("version", &self.version)
            .field("dirty", &self.dirty)
            .field("closed", &self.closed)
            .field("autosave", &self.autosave)
            .finish_non_exhaustive()
    }
}

impl<S: DocumentSink> DocumentSession<S> {
    /// Open a session over `markdown`.
    pub fn open(markdown: &str, config: EngineConfig, sink: S) -> Self {
        let executor = CommandExecutor::from_markdown(markdown, config);
        Self::with_executor(executor, sink)
    }

    /// Open a session over an existing executor.
    pub fn with_executor(executor: CommandExecutor, sink: S) -> Self {
        let config = executor.editor().config();
        Self {
            serializer: MarkdownSerializer::new(config.blank_line_threshold),
            decorations: DecorationCache::new(config),
            autosave: AutosaveScheduler::new(Duration::from_millis(config.autosave_delay_ms)),
            executor,
            sink,
            version: 0,
            dirty: false,
            closed: false,
            callbacks: Vec::new(),
        }
    }

    /// Highlight code blocks synchronously with `highlighter`.
    pub fn with_highlighter(mut self, highlighter: Arc<dyn Highlighter>) -> Self {
        self.decorations = std::mem::replace(
            &mut self.decorations,
            DecorationCache::new(self.executor.editor().config()),
        )
        .with_highlighter(highlighter);
        self
    }

    /// Highlight code blocks on a background thread.
    pub fn with_highlight_worker(mut self, highlighter: Arc<dyn Highlighter>) -> Self {
        self.decorations = std::mem::replace(
            &mut self.decorations,
            DecorationCache::new(self.executor.editor().config()),
        )
        .with_worker(highlighter);
        self
    }

    /// The command executor.
    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    /// The current tree.
    pub fn document(&self) -> &Document {
        self.executor.document()
    }

    /// The autosave scheduler.
    pub fn autosave(&self) -> &AutosaveScheduler {
        &self.autosave
    }

    /// The sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Version number; increments on every observable change.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether there are edits not yet written to the sink.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Subscribe to session changes.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&SessionChange) + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    /// Run one intent at `now`.
    pub fn execute(&mut self, command: Command, now: Instant) -> Result<CommandResult, SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        let selection_before = self.executor.editor().selection().clone();
        let result = self.executor.execute(command)?;

        match self.executor.take_last_change() {
            Some(changes) => self.document_changed(changes, now),
            None if self.executor.editor().selection() != &selection_before => {
                self.notify(SessionChangeType::SelectionChanged, None);
            }
            None => {}
        }
        Ok(result)
    }

    /// Replace the document with freshly loaded markdown (e.g. an external reload).
    ///
    /// The loaded content is considered saved.
    pub fn reload(&mut self, markdown: &str) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        let config = self.executor.editor().config().clone();
        let parsed = crate::markdown::parse_with_threshold(markdown, config.blank_line_threshold);
        self.executor.replace_document(parsed.document);
        let changes = self.executor.take_last_change().unwrap_or_else(ChangeSet::full);
        self.serializer.invalidate(&changes);
        self.decorations.invalidate(&changes);
        self.autosave.cancel();
        self.dirty = false;
        self.executor.mark_clean();
        self.notify(SessionChangeType::DocumentModified, Some(Arc::new(changes)));
        Ok(())
    }

    fn document_changed(&mut self, changes: ChangeSet, now: Instant) {
        self.serializer.invalidate(&changes);
        self.decorations.invalidate(&changes);
        self.dirty = true;
        self.autosave.note_edit(now);
        self.notify(SessionChangeType::DocumentModified, Some(Arc::new(changes)));
    }

    fn notify(&mut self, change_type: SessionChangeType, changes: Option<Arc<ChangeSet>>) {
        let old_version = self.version;
        self.version += 1;
        let change = SessionChange {
            change_type,
            old_version,
            new_version: self.version,
            changes,
        };
        for callback in &mut self.callbacks {
            callback(&change);
        }
    }

    /// Current markdown, reusing cached output of unchanged blocks.
    pub fn markdown(&mut self) -> String {
        self.serializer.serialize(self.executor.document())
    }

    /// Save if the autosave delay has passed. Returns `true` if a save happened.
    pub fn tick(&mut self, now: Instant) -> Result<bool, SessionError> {
        self.decorations.poll();
        if !self.autosave.take_due(now) {
            return Ok(false);
        }
        tracing::debug!(version = self.version, "autosave due");
        self.save()?;
        Ok(true)
    }

    /// Save synchronously if there are unsaved edits. Returns `true` if a save happened.
    pub fn flush(&mut self) -> Result<bool, SessionError> {
        self.autosave.cancel();
        if !self.dirty {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Flush on focus loss.
    pub fn focus_lost(&mut self) -> Result<bool, SessionError> {
        if self.closed {
            return Ok(false);
        }
        self.flush()
    }

    /// Flush and close the session; later intents fail with [`SessionError::Closed`].
    pub fn close(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Ok(());
        }
        self.flush()?;
        self.closed = true;
        Ok(())
    }

    fn save(&mut self) -> Result<(), SessionError> {
        let markdown = self.markdown();
        if let Err(err) = self.sink.save(&markdown) {
            tracing::warn!(error = %err, "saving document failed");
            return Err(err);
        }
        tracing::info!(bytes = markdown.len(), version = self.version, "document saved");
        self.dirty = false;
        self.executor.mark_clean();
        self.notify(SessionChangeType::Saved, None);
        Ok(())
    }

    /// Decorations of the text block at `path`.
    pub fn decorations(&mut self, path: &Path) -> Vec<Decoration> {
        self.decorations.decorations(self.executor.document(), path)
    }

    /// Highlight matches of `query` in every text block's decorations.
    pub fn set_search(&mut self, query: &str, options: SearchOptions) -> Result<(), SessionError> {
        self.decorations.set_search(query, options)?;
        Ok(())
    }

    /// Remove search highlights.
    pub fn clear_search(&mut self) {
        self.decorations.clear_search();
    }

    /// Every match of `query`, per text block in document order.
    pub fn find_all(
        &self,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<(Path, SearchMatch)>, SessionError> {
        Ok(SearchQuery::new(query, options)?
            .map(|query| query.find_in(self.executor.document()))
            .unwrap_or_default())
    }

    /// The match after the selection end (wrapping), or before the selection start when
    /// `backwards` is set.
    pub fn find_next(
        &self,
        query: &str,
        options: SearchOptions,
        backwards: bool,
    ) -> Result<Option<(Path, SearchMatch)>, SessionError> {
        let Some(query) = SearchQuery::new(query, options)? else {
            return Ok(None);
        };
        let document = self.executor.document();
        let (start, end) = self.executor.editor().selection().ordered();
        Ok(if backwards {
            query.prev_from(document, start)
        } else {
            query.next_from(document, end)
        })
    }
}

/// A [`DocumentSink`] that keeps saved markdown in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    saves: Vec<String>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently saved markdown.
    pub fn last(&self) -> Option<&str> {
        self.saves.last().map(String::as_str)
    }

    /// How many saves happened.
    pub fn save_count(&self) -> usize {
        self.saves.len()
    }
}

impl DocumentSink for MemorySink {
    fn save(&mut self, markdown: &str) -> Result<(), SessionError> {
        self.saves.push(markdown.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::EditCommand;

    fn type_text(session: &mut DocumentSession<MemorySink>, text: &str, now: Instant) {
        session
            .execute(
                Command::Edit(EditCommand::InsertText {
                    text: text.to_string(),
                }),
                now,
            )
            .unwrap();
    }

    #[test]
    fn test_scheduler_reschedules_on_each_edit() {
        let start = Instant::now();
        let mut scheduler = AutosaveScheduler::new(Duration::from_millis(100));
        scheduler.note_edit(start);
        scheduler.note_edit(start + Duration::from_millis(80));
        assert!(!scheduler.is_due(start + Duration::from_millis(120)));
        assert!(scheduler.take_due(start + Duration::from_millis(180)));
        assert!(!scheduler.is_pending());
    }

    #[test]
    fn test_burst_of_edits_saves_once() {
        let start = Instant::now();
        let mut session = DocumentSession::open("", EngineConfig::default(), MemorySink::new());
        for (i, ch) in ["a", "b", "c"].into_iter().enumerate() {
            type_text(&mut session, ch, start + Duration::from_millis(i as u64 * 10));
        }
        assert!(!session.tick(start + Duration::from_millis(500)).unwrap());
        assert!(session.tick(start + Duration::from_millis(1_100)).unwrap());
        assert_eq!(session.sink().save_count(), 1);
        assert_eq!(session.sink().last(), Some("abc"));
        assert!(!session.is_dirty());
    }

    #[test]
    fn test_close_flushes_and_rejects_later_intents() {
        let now = Instant::now();
        let mut session = DocumentSession::open("x", EngineConfig::default(), MemorySink::new());
        type_text(&mut session, "y", now);
        session.close().unwrap();
        assert_eq!(session.sink().save_count(), 1);
        let err = session
            .execute(Command::Edit(EditCommand::Backspace), now)
            .unwrap_err();
        assert!(matches!(err, SessionError::Closed));
    }

    #[test]
    fn test_focus_lost_without_edits_does_not_save() {
        let mut session = DocumentSession::open("x", EngineConfig::default(), MemorySink::new());
        assert!(!session.focus_lost().unwrap());
        assert_eq!(session.sink().save_count(), 0);
    }

    #[test]
    fn test_subscribers_see_versions() {
        use std::sync::Mutex;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut session = DocumentSession::open("", EngineConfig::default(), MemorySink::new());
        let sink = seen.clone();
        session.subscribe(move |change| {
            sink.lock().unwrap().push((change.change_type, change.new_version));
        });
        type_text(&mut session, "a", Instant::now());
        session.flush().unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (SessionChangeType::DocumentModified, 1),
                (SessionChangeType::Saved, 2)
            ]
        );
    }

    #[test]
    fn test_find_next_starts_at_the_caret_and_wraps() {
        let session = DocumentSession::open("ab ab\n\nab", EngineConfig::default(), MemorySink::new());
        let options = SearchOptions::default();

        let (path, m) = session.find_next("ab", options, false).unwrap().unwrap();
        assert_eq!((path, m.start), (Path::from([0]), 0));
        let (path, _) = session.find_next("ab", options, true).unwrap().unwrap();
        assert_eq!(path, Path::from([1]));
        assert_eq!(session.find_all("ab", options).unwrap().len(), 3);
        assert!(session.find_next("", options, false).unwrap().is_none());
    }
}
