//! Render-only decorations, cached per node.
//!
//! Decorations annotate char ranges of a text block without touching the tree:
//!
//! - syntax colors for code lines, sliced out of a highlight of the whole code block
//! - search-match highlights for the active query
//!
//! [`DecorationCache`] computes them lazily when a renderer asks for a text block and keeps them
//! keyed by [`NodeId`]. The command engine's [`ChangeSet`] drops exactly the entries of edited
//! nodes. Code blocks longer than the configured ceiling are never highlighted.
//!
//! Highlighting is delegated to a [`Highlighter`] (e.g. `mdtree-highlight-simple`). It can run on
//! the calling thread or on a [`HighlightWorker`]; in the latter case the cache serves stale (or
//! no) syntax colors until [`DecorationCache::poll`] merges the worker's results.

use crate::config::EngineConfig;
use crate::delta::ChangeSet;
use crate::document::Document;
use crate::node::{NodeId, NodeKind};
use crate::path::Path;
use crate::search::{SearchError, SearchOptions, SearchQuery};
use std::collections::HashMap;
use std::sync::{Arc, mpsc};
use std::thread;

/// Style identifier; hosts map ids to colors.
pub type StyleId = u32;

/// Style of search-match decorations.
pub const SEARCH_MATCH_STYLE_ID: StyleId = 0x0400_0001;

/// A colored char range of a code block's text (lines joined with `\n`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorRange {
    /// Start char offset (inclusive).
    pub start: usize,
    /// End char offset (exclusive).
    pub end: usize,
    /// Style to apply.
    pub style_id: StyleId,
}

impl ColorRange {
    /// Create a new range.
    pub fn new(start: usize, end: usize, style_id: StyleId) -> Self {
        Self {
            start,
            end,
            style_id,
        }
    }
}

/// Produces syntax colors for code.
pub trait Highlighter: Send + Sync {
    /// Color `code` written in `language`; `None` when the language has no grammar.
    fn highlight(&self, language: &str, code: &str) -> Option<Vec<ColorRange>>;
}

/// What a decoration marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DecorationKind {
    /// Syntax color.
    Syntax,
    /// Match of the active search query.
    SearchMatch,
}

/// A decoration over a char range of one text block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoration {
    /// Start char offset (inclusive).
    pub start: usize,
    /// End char offset (exclusive).
    pub end: usize,
    /// Kind.
    pub kind: DecorationKind,
    /// Style to apply.
    pub style_id: StyleId,
}

#[derive(Debug, Clone)]
struct CodeEntry {
    ranges: Arc<Vec<ColorRange>>,
    fresh: bool,
}

#[derive(Debug, Clone)]
struct BlockEntry {
    /// Code block whose highlight the entry was sliced from.
    owner: Option<NodeId>,
    decorations: Vec<Decoration>,
}

/// Lazily computed decorations keyed by node identity.
pub struct DecorationCache {
    highlighter: Option<Arc<dyn Highlighter>>,
    worker: Option<HighlightWorker>,
    max_highlight_chars: usize,
    search: Option<SearchQuery>,
    code: HashMap<NodeId, CodeEntry>,
    blocks: HashMap<NodeId, BlockEntry>,
}

impl std::fmt::Debug for DecorationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecorationCache")
            .field("has_highlighter", &self.highlighter.is_some())
            .field("has_worker", &self.worker.is_some())
            .field("max_highlight_chars", &self.max_highlight_chars)
            .field("code_entries", &self.code.len())
            .field("block_entries", &self.blocks.len())
            .finish()
    }
}

impl DecorationCache {
    /// A cache without a highlighter (search decorations only).
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            highlighter: None,
            worker: None,
            max_highlight_chars: config.max_highlight_chars,
            search: None,
            code: HashMap::new(),
            blocks: HashMap::new(),
        }
    }

    /// Highlight code synchronously with `highlighter`.
    pub fn with_highlighter(mut self, highlighter: Arc<dyn Highlighter>) -> Self {
        self.highlighter = Some(highlighter);
        self
    }

    /// Highlight code on a background thread.
    pub fn with_worker(mut self, highlighter: Arc<dyn Highlighter>) -> Self {
        self.worker = Some(HighlightWorker::spawn(highlighter.clone()));
        self.highlighter = Some(highlighter);
        self
    }

    /// Activate a search query; an empty query clears search decorations.
    pub fn set_search(&mut self, query: &str, options: SearchOptions) -> Result<(), SearchError> {
        self.search = SearchQuery::new(query, options)?;
        self.blocks.clear();
        Ok(())
    }

    /// Remove search decorations.
    pub fn clear_search(&mut self) {
        if self.search.take().is_some() {
            self.blocks.clear();
        }
    }

    /// Drop the entries of changed nodes.
    pub fn invalidate(&mut self, changes: &ChangeSet) {
        if changes.full {
            self.blocks.clear();
            self.mark_all_code_stale();
            return;
        }
        if let Some(worker) = self.worker.as_mut() {
            worker.forget_where(|id| changes.nodes.contains(id));
        }
        let keep_stale = self.worker.is_some();
        self.code.retain(|id, entry| {
            if !changes.nodes.contains(id) {
                return true;
            }
            entry.fresh = false;
            keep_stale
        });
        self.blocks.retain(|id, entry| {
            !changes.nodes.contains(id)
                && !entry.owner.is_some_and(|owner| changes.nodes.contains(&owner))
        });
    }

    fn mark_all_code_stale(&mut self) {
        if let Some(worker) = self.worker.as_mut() {
            worker.forget_where(|_| true);
            for entry in self.code.values_mut() {
                entry.fresh = false;
            }
        } else {
            self.code.clear();
        }
    }

    /// Number of cached text-block entries.
    pub fn cached_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Merge finished background highlights; returns how many code blocks were updated.
    pub fn poll(&mut self) -> usize {
        let Some(worker) = self.worker.as_mut() else {
            return 0;
        };
        let mut merged = 0;
        for response in worker.try_recv() {
            let ranges = response.ranges.unwrap_or_default();
            self.code.insert(
                response.node,
                CodeEntry {
                    ranges: Arc::new(ranges),
                    fresh: true,
                },
            );
            self.blocks
                .retain(|_, entry| entry.owner != Some(response.node));
            merged += 1;
        }
        merged
    }

    /// Decorations of the text block at `path`, ordered by start offset.
    pub fn decorations(&mut self, document: &Document, path: &Path) -> Vec<Decoration> {
        let Some(block) = document.get(path).filter(|node| node.is_text_block()) else {
            return Vec::new();
        };
        if let Some(entry) = self.blocks.get(&block.id) {
            return entry.decorations.clone();
        }

        let mut decorations = Vec::new();
        let mut owner = None;
        if matches!(block.kind, NodeKind::CodeLine)
            && let Some(code_path) = path.parent()
            && let Some(code) = document.get(&code_path)
        {
            owner = Some(code.id);
            let index = path.last_index().unwrap_or(0);
            if let Some(ranges) = self.code_ranges(document, &code_path) {
                let line_start: usize = code.children[..index]
                    .iter()
                    .map(|line| line.content_len() + 1)
                    .sum();
                let line_end = line_start + block.content_len();
                decorations.extend(ranges.iter().filter_map(|range| {
                    let start = range.start.max(line_start);
                    let end = range.end.min(line_end);
                    (start < end).then(|| Decoration {
                        start: start - line_start,
                        end: end - line_start,
                        kind: DecorationKind::Syntax,
                        style_id: range.style_id,
                    })
                }));
            }
        }

        if let Some(query) = &self.search {
            decorations.extend(query.find_all(&block.block_text()).into_iter().map(|m| {
                Decoration {
                    start: m.start,
                    end: m.end,
                    kind: DecorationKind::SearchMatch,
                    style_id: SEARCH_MATCH_STYLE_ID,
                }
            }));
        }
        decorations.sort_by_key(|decoration| (decoration.start, decoration.kind));

        // Lines served from a pending background highlight are recomputed on the next request.
        let pending = owner.is_some_and(|id| self.code.get(&id).is_none_or(|entry| !entry.fresh));
        if !pending {
            self.blocks.insert(
                block.id,
                BlockEntry {
                    owner,
                    decorations: decorations.clone(),
                },
            );
        }
        decorations
    }

    /// Highlight of the code block at `path` (possibly stale while a worker is busy).
    fn code_ranges(&mut self, document: &Document, path: &Path) -> Option<Arc<Vec<ColorRange>>> {
        let code = document.get(path)?;
        if let Some(entry) = self.code.get(&code.id)
            && entry.fresh
        {
            return Some(entry.ranges.clone());
        }

        let NodeKind::Code { language, .. } = &code.kind else {
            return None;
        };
        let language = language
            .as_deref()
            .and_then(mdtree_lang::canonical_language);
        let text = code
            .children
            .iter()
            .map(|line| line.block_text())
            .collect::<Vec<_>>()
            .join("\n");
        let skip = |reason: &str| {
            tracing::debug!(node = code.id.raw(), reason, "skipping syntax highlight");
        };

        let Some(language) = language else {
            self.store_code(code.id, Vec::new());
            return None;
        };
        if text.chars().count() > self.max_highlight_chars {
            skip("oversized");
            self.store_code(code.id, Vec::new());
            return None;
        }

        if let Some(worker) = self.worker.as_mut() {
            if !worker.is_pending(code.id) {
                worker.request(code.id, &language, text);
            }
            return self.code.get(&code.id).map(|entry| entry.ranges.clone());
        }

        let highlighter = self.highlighter.as_ref()?;
        match highlighter.highlight(&language, &text) {
            Some(ranges) => {
                let ranges = Arc::new(ranges);
                self.code.insert(
                    code.id,
                    CodeEntry {
                        ranges: ranges.clone(),
                        fresh: true,
                    },
                );
                Some(ranges)
            }
            None => {
                skip("unknown language");
                self.store_code(code.id, Vec::new());
                None
            }
        }
    }

    fn store_code(&mut self, id: NodeId, ranges: Vec<ColorRange>) {
        self.code.insert(
            id,
            CodeEntry {
                ranges: Arc::new(ranges),
                fresh: true,
            },
        );
    }
}

#[derive(Debug)]
struct HighlightRequest {
    node: NodeId,
    generation: u64,
    language: String,
    code: String,
}

/// A finished background highlight.
#[derive(Debug, Clone)]
pub struct HighlightResponse {
    /// Code block the highlight belongs to.
    pub node: NodeId,
    /// Generation of the request that produced it.
    pub generation: u64,
    /// Colors, or `None` when the language has no grammar.
    pub ranges: Option<Vec<ColorRange>>,
}

/// Runs a [`Highlighter`] on a background thread.
///
/// Every request carries a per-node generation. A newer request for the same node supersedes
/// older ones: the worker skips queued requests it has newer versions of, and
/// [`HighlightWorker::try_recv`] drops responses that are no longer current.
#[derive(Debug)]
pub struct HighlightWorker {
    tx: mpsc::Sender<HighlightRequest>,
    rx: mpsc::Receiver<HighlightResponse>,
    latest: HashMap<NodeId, u64>,
    next_generation: u64,
}

impl HighlightWorker {
    /// Spawn the worker thread. It exits when the worker is dropped.
    pub fn spawn(highlighter: Arc<dyn Highlighter>) -> Self {
        let (tx_req, rx_req) = mpsc::channel::<HighlightRequest>();
        let (tx_resp, rx_resp) = mpsc::channel::<HighlightResponse>();
        thread::spawn(move || highlight_loop(highlighter, rx_req, tx_resp));
        Self {
            tx: tx_req,
            rx: rx_resp,
            latest: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Queue a highlight of `code`; returns the request's generation.
    pub fn request(&mut self, node: NodeId, language: &str, code: String) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.latest.insert(node, generation);
        let request = HighlightRequest {
            node,
            generation,
            language: language.to_string(),
            code,
        };
        if self.tx.send(request).is_err() {
            tracing::warn!("highlight worker is gone");
            self.latest.remove(&node);
        }
        generation
    }

    /// Whether a request for `node` is outstanding.
    pub fn is_pending(&self, node: NodeId) -> bool {
        self.latest.contains_key(&node)
    }

    /// Stop waiting for `node`; its in-flight response will be dropped.
    pub fn cancel(&mut self, node: NodeId) {
        self.latest.remove(&node);
    }

    fn forget_where(&mut self, stale: impl Fn(&NodeId) -> bool) {
        self.latest.retain(|id, _| !stale(id));
    }

    /// Collect finished, still-current responses without blocking.
    pub fn try_recv(&mut self) -> Vec<HighlightResponse> {
        let mut out = Vec::new();
        while let Ok(response) = self.rx.try_recv() {
            if self.latest.get(&response.node) == Some(&response.generation) {
                self.latest.remove(&response.node);
                out.push(response);
            }
        }
        out
    }

    /// Block until every outstanding request has been answered (or the worker died).
    pub fn wait_idle(&mut self) -> Vec<HighlightResponse> {
        let mut out = Vec::new();
        while !self.latest.is_empty() {
            let Ok(response) = self.rx.recv() else {
                self.latest.clear();
                break;
            };
            if self.latest.get(&response.node) == Some(&response.generation) {
                self.latest.remove(&response.node);
                out.push(response);
            }
        }
        out
    }
}

fn highlight_loop(
    highlighter: Arc<dyn Highlighter>,
    rx: mpsc::Receiver<HighlightRequest>,
    tx: mpsc::Sender<HighlightResponse>,
) {
    while let Ok(first) = rx.recv() {
        // Only the newest queued request per node is worth computing.
        let mut batch: Vec<HighlightRequest> = vec![first];
        while let Ok(next) = rx.try_recv() {
            batch.retain(|queued| queued.node != next.node);
            batch.push(next);
        }
        for request in batch {
            let ranges = highlighter.highlight(&request.language, &request.code);
            let response = HighlightResponse {
                node: request.node,
                generation: request.generation,
                ranges,
            };
            if tx.send(response).is_err() {
                return;
            }
        }
    }
}

impl DecorationCache {
    /// Block until the background worker has answered every request, then merge.
    pub fn wait_for_worker(&mut self) -> usize {
        let Some(worker) = self.worker.as_mut() else {
            return 0;
        };
        let responses = worker.wait_idle();
        let count = responses.len();
        for response in responses {
            self.store_code(response.node, response.ranges.unwrap_or_default());
            self.blocks
                .retain(|_, entry| entry.owner != Some(response.node));
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Colors every `x` and counts calls.
    #[derive(Default)]
    struct XHighlighter {
        calls: AtomicUsize,
    }

    impl Highlighter for XHighlighter {
        fn highlight(&self, language: &str, code: &str) -> Option<Vec<ColorRange>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if language != "rust" {
                return None;
            }
            Some(
                code.chars()
                    .enumerate()
                    .filter(|(_, ch)| *ch == 'x')
                    .map(|(i, _)| ColorRange::new(i, i + 1, 7))
                    .collect(),
            )
        }
    }

    fn syntax(start: usize, end: usize) -> Decoration {
        Decoration {
            start,
            end,
            kind: DecorationKind::Syntax,
            style_id: 7,
        }
    }

    #[test]
    fn test_code_lines_get_their_slice() {
        let doc = Document::new(vec![Node::code(Some("rs"), &["ax", "x"])]);
        let highlighter = Arc::new(XHighlighter::default());
        let mut cache =
            DecorationCache::new(&EngineConfig::default()).with_highlighter(highlighter.clone());
        assert_eq!(cache.decorations(&doc, &Path::from([0, 0])), vec![syntax(1, 2)]);
        assert_eq!(cache.decorations(&doc, &Path::from([0, 1])), vec![syntax(0, 1)]);
        assert_eq!(highlighter.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalidation_is_per_node() {
        let doc = Document::new(vec![
            Node::code(Some("rust"), &["x"]),
            Node::code(Some("rust"), &["xx"]),
        ]);
        let highlighter = Arc::new(XHighlighter::default());
        let mut cache =
            DecorationCache::new(&EngineConfig::default()).with_highlighter(highlighter.clone());
        cache.decorations(&doc, &Path::from([0, 0]));
        cache.decorations(&doc, &Path::from([1, 0]));
        assert_eq!(highlighter.calls.load(Ordering::SeqCst), 2);

        let mut changes = ChangeSet::new();
        changes.touch(&doc, &Path::from([1, 0]));
        cache.invalidate(&changes);
        cache.decorations(&doc, &Path::from([0, 0]));
        cache.decorations(&doc, &Path::from([1, 0]));
        assert_eq!(highlighter.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_oversized_code_is_not_highlighted() {
        let config = EngineConfig {
            max_highlight_chars: 3,
            ..EngineConfig::default()
        };
        let doc = Document::new(vec![Node::code(Some("rust"), &["xxxx"])]);
        let highlighter = Arc::new(XHighlighter::default());
        let mut cache = DecorationCache::new(&config).with_highlighter(highlighter.clone());
        assert!(cache.decorations(&doc, &Path::from([0, 0])).is_empty());
        assert_eq!(highlighter.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_search_matches_in_paragraphs() {
        let doc = Document::new(vec![Node::paragraph_text("abcabc")]);
        let mut cache = DecorationCache::new(&EngineConfig::default());
        cache.set_search("bc", SearchOptions::default()).unwrap();
        let found = cache.decorations(&doc, &Path::from([0]));
        assert_eq!(
            found.iter().map(|d| (d.start, d.end)).collect::<Vec<_>>(),
            vec![(1, 3), (4, 6)]
        );
        cache.clear_search();
        assert!(cache.decorations(&doc, &Path::from([0])).is_empty());
    }

    #[test]
    fn test_worker_results_merge_on_poll() {
        let doc = Document::new(vec![Node::code(Some("rust"), &["x"])]);
        let highlighter: Arc<dyn Highlighter> = Arc::new(XHighlighter::default());
        let mut cache = DecorationCache::new(&EngineConfig::default()).with_worker(highlighter);
        // Nothing yet: the highlight is computed in the background.
        assert!(cache.decorations(&doc, &Path::from([0, 0])).is_empty());
        assert_eq!(cache.wait_for_worker(), 1);
        assert_eq!(cache.decorations(&doc, &Path::from([0, 0])), vec![syntax(0, 1)]);
    }

    #[test]
    fn test_edit_during_pending_highlight_requests_again() {
        let mut doc = Document::new(vec![Node::code(Some("rust"), &["x"])]);
        let highlighter: Arc<dyn Highlighter> = Arc::new(XHighlighter::default());
        let mut cache = DecorationCache::new(&EngineConfig::default()).with_worker(highlighter);
        let line = Path::from([0, 0]);
        assert!(cache.decorations(&doc, &line).is_empty());

        // The line changes before the first highlight comes back.
        if let Some(node) = doc.get_mut(&line) {
            crate::inline::insert_text(node, 0, "a", crate::node::Marks::plain());
        }
        let mut changes = ChangeSet::new();
        changes.touch(&doc, &line);
        cache.invalidate(&changes);
        cache.decorations(&doc, &line);

        assert_eq!(cache.wait_for_worker(), 1);
        assert_eq!(cache.decorations(&doc, &line), vec![syntax(1, 2)]);
    }

    #[test]
    fn test_worker_answers_only_the_newest_generation() {
        let highlighter: Arc<dyn Highlighter> = Arc::new(XHighlighter::default());
        let mut worker = HighlightWorker::spawn(highlighter);
        let node = NodeId::fresh();
        let first = worker.request(node, "rust", "x".to_string());
        let second = worker.request(node, "rust", "ax".to_string());
        assert!(second > first);

        let responses = worker.wait_idle();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].generation, second);
        assert_eq!(responses[0].ranges, Some(vec![ColorRange::new(1, 2, 7)]));
        assert!(!worker.is_pending(node));
    }

    #[test]
    fn test_cancelled_request_is_never_merged() {
        let highlighter: Arc<dyn Highlighter> = Arc::new(XHighlighter::default());
        let mut worker = HighlightWorker::spawn(highlighter);
        let node = NodeId::fresh();
        worker.request(node, "rust", "x".to_string());
        worker.cancel(node);
        assert!(!worker.is_pending(node));
        assert!(worker.wait_idle().is_empty());
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(worker.try_recv().is_empty());
    }
}
