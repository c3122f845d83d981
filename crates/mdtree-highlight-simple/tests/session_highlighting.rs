use mdtree_core::{
    Command, CursorCommand, Decoration, DecorationKind, DocumentSession, EditCommand,
    EngineConfig, MemorySink, Path, Point, SEARCH_MATCH_STYLE_ID, SearchOptions,
};
use mdtree_highlight_simple::{SIMPLE_STYLE_KEYWORD, SIMPLE_STYLE_STRING, SimpleHighlighter};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::{Duration, Instant};

const SOURCE: &str = "```rust\nfn main() {\n    let s = \"hi\";\n}\n```\n\nplain fn text";

fn syntax(start: usize, end: usize, style_id: u32) -> Decoration {
    Decoration {
        start,
        end,
        kind: DecorationKind::Syntax,
        style_id,
    }
}

fn at(indices: &[usize]) -> Path {
    Path::from(indices)
}

fn open() -> DocumentSession<MemorySink> {
    DocumentSession::open(SOURCE, EngineConfig::default(), MemorySink::new())
        .with_highlighter(Arc::new(SimpleHighlighter::default()))
}

#[test]
fn test_code_lines_get_their_slice_of_the_block_highlight() {
    let mut session = open();
    assert_eq!(
        session.decorations(&at(&[0, 0])),
        [syntax(0, 2, SIMPLE_STYLE_KEYWORD)]
    );
    assert_eq!(
        session.decorations(&at(&[0, 1])),
        [
            syntax(4, 7, SIMPLE_STYLE_KEYWORD),
            syntax(12, 16, SIMPLE_STYLE_STRING)
        ]
    );
    assert!(session.decorations(&at(&[1])).is_empty());
}

#[test]
fn test_editing_a_code_line_refreshes_its_colors() {
    let mut session = open();
    let now = Instant::now();
    session.decorations(&at(&[0, 0]));

    session
        .execute(
            Command::Cursor(CursorCommand::MoveTo {
                point: Point::new([0, 0], 0),
            }),
            now,
        )
        .unwrap();
    for ch in "pub ".chars() {
        session
            .execute(
                Command::Edit(EditCommand::InsertText {
                    text: ch.to_string(),
                }),
                now,
            )
            .unwrap();
    }
    assert_eq!(
        session.decorations(&at(&[0, 0])),
        [
            syntax(0, 3, SIMPLE_STYLE_KEYWORD),
            syntax(4, 6, SIMPLE_STYLE_KEYWORD)
        ]
    );
}

#[test]
fn test_search_matches_layer_over_syntax() {
    let mut session = open();
    session.set_search("fn", SearchOptions::default()).unwrap();

    let line = session.decorations(&at(&[0, 0]));
    assert_eq!(line.len(), 2);
    assert_eq!(line[0].kind, DecorationKind::Syntax);
    assert_eq!(line[1].kind, DecorationKind::SearchMatch);
    assert_eq!(line[1].style_id, SEARCH_MATCH_STYLE_ID);

    let paragraph = session.decorations(&at(&[1]));
    assert_eq!(paragraph.len(), 1);
    assert_eq!((paragraph[0].start, paragraph[0].end), (6, 8));

    let matches = session.find_all("fn", SearchOptions::default()).unwrap();
    assert_eq!(matches.len(), 2);

    session.clear_search();
    assert!(session.decorations(&at(&[1])).is_empty());
}

#[test]
fn test_background_worker_eventually_colors_lines() {
    let mut session = DocumentSession::open(SOURCE, EngineConfig::default(), MemorySink::new())
        .with_highlight_worker(Arc::new(SimpleHighlighter::default()));

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut line = session.decorations(&at(&[0, 0]));
    while line.is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
        session.tick(Instant::now()).unwrap();
        line = session.decorations(&at(&[0, 0]));
    }
    assert_eq!(line, [syntax(0, 2, SIMPLE_STYLE_KEYWORD)]);
}

#[test]
fn test_autosave_fires_after_the_quiet_period() {
    let mut session = open();
    let start = Instant::now();
    session
        .execute(
            Command::Edit(EditCommand::InsertText {
                text: "x".to_string(),
            }),
            start,
        )
        .unwrap();

    assert!(!session.tick(start + Duration::from_millis(500)).unwrap());
    assert!(session.tick(start + Duration::from_millis(1_000)).unwrap());
    assert_eq!(session.sink().save_count(), 1);
    assert!(session.sink().last().unwrap().starts_with("```rust\nxfn main()"));
    assert!(!session.is_dirty());
}
