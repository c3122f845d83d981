//! Random intent sequences must keep the tree valid and the selection addressable.

use mdtree_core::schema;
use mdtree_core::{
    ArrowKey, Command, CommandExecutor, CursorCommand, DropEdge, EditCommand, EngineConfig, Mark,
    Path, Point, Selection, StructureCommand, parse, serialize,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const KEYS: &[&str] = &[
    "a", "b", " ", "#", "-", "*", "_", "`", ">", "|", "[", "]", "(", ")", "1", ".", "x", "~", "$",
    "=", "漢", "é", "\t",
];

const SEED_DOCS: &[&str] = &[
    "",
    "# Title\n\nbody text",
    "- one\n- two\n  - nested\n\n> quote",
    "| a | b |\n| - | - |\n| c | d |",
    "```rust\nfn main() {\n}\n```\n\nafter",
    "1. first\n2. second\n\n---\n\n- [ ] task",
];

fn random_point(executor: &CommandExecutor, rng: &mut StdRng) -> Point {
    let doc = executor.document();
    let blocks = doc.text_blocks();
    if blocks.is_empty() {
        return Point::new([0], 0);
    }
    let path = blocks[rng.gen_range(0..blocks.len())].clone();
    let len = doc.get(&path).map_or(0, |node| node.content_len());
    Point::new(path, rng.gen_range(0..=len))
}

fn random_command(executor: &CommandExecutor, rng: &mut StdRng) -> Command {
    match rng.gen_range(0..100) {
        0..=44 => Command::Edit(EditCommand::InsertText {
            text: KEYS[rng.gen_range(0..KEYS.len())].to_string(),
        }),
        45..=54 => Command::Edit(EditCommand::Enter {
            mod_key: rng.gen_bool(0.2),
        }),
        55..=64 => Command::Edit(EditCommand::Backspace),
        65..=69 => Command::Edit(EditCommand::Tab {
            shift: rng.gen_bool(0.5),
        }),
        70..=77 => {
            let key = [ArrowKey::Left, ArrowKey::Right, ArrowKey::Up, ArrowKey::Down]
                [rng.gen_range(0..4)];
            Command::Cursor(CursorCommand::Arrow {
                key,
                extend: rng.gen_bool(0.3),
            })
        }
        78..=82 => Command::Cursor(CursorCommand::SetSelection {
            selection: Selection::new(random_point(executor, rng), random_point(executor, rng)),
        }),
        83..=85 => Command::Edit(EditCommand::DeleteSelection),
        86..=88 => Command::Edit(EditCommand::ToggleMark {
            mark: [Mark::Bold, Mark::Italic, Mark::Strikethrough, Mark::Code][rng.gen_range(0..4)],
        }),
        89..=92 => Command::Edit(EditCommand::Undo),
        93..=94 => Command::Edit(EditCommand::Redo),
        _ => {
            let count = executor.document().children().len();
            Command::Structure(StructureCommand::DragMove {
                source: Path::from([rng.gen_range(0..count)]),
                target: Path::from([rng.gen_range(0..count)]),
                edge: if rng.gen_bool(0.5) {
                    DropEdge::Before
                } else {
                    DropEdge::After
                },
            })
        }
    }
}

fn assert_addressable(executor: &CommandExecutor, point: &Point, context: &str) {
    let node = executor
        .document()
        .get(&point.path)
        .unwrap_or_else(|| panic!("dangling selection {point:?} after {context}"));
    assert!(node.is_text_block(), "selection outside a text block after {context}");
    assert!(
        point.offset <= node.content_len(),
        "offset {} past end after {context}",
        point.offset
    );
}

#[test]
fn test_random_intents_preserve_schema() {
    let mut rng = StdRng::seed_from_u64(0x5eed_cafe);

    for markdown in SEED_DOCS {
        let mut executor = CommandExecutor::from_markdown(markdown, EngineConfig::default());
        schema::validate(executor.document()).unwrap();

        for step in 0..400 {
            let command = random_command(&executor, &mut rng);
            let context = format!("step {step} {command:?} on {markdown:?}");
            let before = executor.document().clone();

            match executor.execute(command) {
                Ok(_) => {}
                // Rejected intents leave the tree exactly as it was.
                Err(_) => assert_eq!(executor.document(), &before, "{context}"),
            }

            if let Err(violation) = schema::validate(executor.document()) {
                panic!("{violation} after {context}");
            }
            let selection = executor.editor().selection();
            assert_addressable(&executor, &selection.anchor, &context);
            assert_addressable(&executor, &selection.focus, &context);
        }

        // Whatever the edits produced still survives a markdown round trip.
        let written = serialize(executor.document());
        let reparsed = parse(&written).document;
        schema::validate(&reparsed).unwrap();
    }
}

#[test]
fn test_undo_all_returns_to_start() {
    let mut rng = StdRng::seed_from_u64(42);
    for markdown in SEED_DOCS {
        let config = EngineConfig {
            undo_levels: 10_000,
            ..EngineConfig::default()
        };
        let mut executor = CommandExecutor::from_markdown(markdown, config);
        let start = executor.document().clone();

        for _ in 0..150 {
            let command = random_command(&executor, &mut rng);
            if matches!(
                command,
                Command::Edit(EditCommand::Undo | EditCommand::Redo)
            ) {
                continue;
            }
            let _ = executor.execute(command);
        }

        while executor.can_undo() {
            executor.execute(Command::Edit(EditCommand::Undo)).unwrap();
        }
        assert_eq!(executor.document(), &start, "{markdown:?}");
    }
}
