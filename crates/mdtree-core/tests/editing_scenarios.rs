use mdtree_core::{
    ArrowKey, Command, CommandExecutor, CommandResult, CursorCommand, Document, EditCommand,
    EngineConfig, Mark, Marks, Node, NodeKind, Point, Selection,
};
use pretty_assertions::assert_eq;

fn executor_at(blocks: Vec<Node>, point: Point) -> CommandExecutor {
    let mut executor = CommandExecutor::new(Document::new(blocks), EngineConfig::default());
    executor
        .execute(Command::Cursor(CursorCommand::SetSelection {
            selection: Selection::caret(point),
        }))
        .unwrap();
    executor
}

fn type_str(executor: &mut CommandExecutor, text: &str) -> Vec<CommandResult> {
    text.chars()
        .map(|ch| {
            executor
                .execute(Command::Edit(EditCommand::InsertText {
                    text: ch.to_string(),
                }))
                .unwrap()
        })
        .collect()
}

fn press(executor: &mut CommandExecutor, command: EditCommand) -> CommandResult {
    executor.execute(Command::Edit(command)).unwrap()
}

fn enter() -> EditCommand {
    EditCommand::Enter { mod_key: false }
}

#[test]
fn test_ordered_list_shortcut_in_empty_paragraph() {
    let mut executor = executor_at(vec![Node::empty_paragraph()], Point::new([0], 0));
    let results = type_str(&mut executor, "1. ");

    assert!(matches!(results[2], CommandResult::Autoformat { .. }));
    assert_eq!(
        executor.document().children(),
        &[Node::list(
            true,
            vec![Node::list_item(vec![Node::empty_paragraph()])]
        )]
    );
    assert_eq!(executor.editor().caret(), &Point::new([0, 0, 0], 0));
}

#[test]
fn test_backspace_lifts_sole_paragraph_out_of_quote() {
    let mut executor = executor_at(
        vec![Node::blockquote(vec![Node::paragraph_text("quoted")])],
        Point::new([0, 0], 0),
    );
    assert_eq!(press(&mut executor, EditCommand::Backspace), CommandResult::Success);
    assert_eq!(
        executor.document().children(),
        &[Node::paragraph_text("quoted")]
    );
    assert_eq!(executor.editor().caret(), &Point::new([0], 0));
}

#[test]
fn test_enter_inside_bracket_indents_code_line() {
    let mut executor = executor_at(vec![Node::code(None, &["foo[bar]"])], Point::new([0, 0], 4));
    press(&mut executor, enter());

    let lines: Vec<String> = executor.document().children()[0]
        .children
        .iter()
        .map(Node::block_text)
        .collect();
    assert_eq!(lines, ["foo[", "\tbar]"]);
    assert_eq!(executor.editor().caret(), &Point::new([0, 1], 1));
}

#[test]
fn test_backtick_after_code_span_does_not_reopen_code() {
    let mut executor = executor_at(vec![Node::empty_paragraph()], Point::new([0], 0));
    let results = type_str(&mut executor, "`code`");
    assert!(matches!(results[5], CommandResult::Autoformat { rule: "inline-code" }));

    let results = type_str(&mut executor, "`x`");
    assert!(results.iter().all(|r| *r == CommandResult::Success));

    let paragraph = &executor.document().children()[0];
    assert_eq!(
        paragraph.children,
        vec![
            Node::marked_text("code", Marks::plain().with(Mark::Code)),
            Node::text("`x`"),
        ]
    );
}

#[test]
fn test_heading_shortcut_and_enter_continues_with_paragraph() {
    let mut executor = executor_at(vec![Node::empty_paragraph()], Point::new([0], 0));
    type_str(&mut executor, "## Title");
    assert_eq!(executor.document().children(), &[Node::heading(2, "Title")]);

    executor
        .execute(Command::Cursor(CursorCommand::MoveTo {
            point: Point::new([0], 2),
        }))
        .unwrap();
    press(&mut executor, enter());
    assert_eq!(
        executor.document().children(),
        &[Node::heading(2, "Ti"), Node::paragraph_text("tle")]
    );
    assert_eq!(executor.editor().caret(), &Point::new([1], 0));
}

#[test]
fn test_enter_splits_paragraph_and_backspace_joins_it() {
    let mut executor = executor_at(vec![Node::paragraph_text("hello")], Point::new([0], 2));
    press(&mut executor, enter());
    assert_eq!(
        executor.document().children(),
        &[Node::paragraph_text("he"), Node::paragraph_text("llo")]
    );
    press(&mut executor, EditCommand::Backspace);
    assert_eq!(executor.document().children(), &[Node::paragraph_text("hello")]);
    assert_eq!(executor.editor().caret(), &Point::new([0], 2));
}

#[test]
fn test_enter_in_empty_list_item_leaves_list() {
    let list = Node::list(
        false,
        vec![
            Node::list_item(vec![Node::paragraph_text("a")]),
            Node::list_item(vec![Node::empty_paragraph()]),
        ],
    );
    let mut executor = executor_at(vec![list], Point::new([0, 1, 0], 0));
    press(&mut executor, enter());
    assert_eq!(
        executor.document().children(),
        &[
            Node::list(false, vec![Node::list_item(vec![Node::paragraph_text("a")])]),
            Node::empty_paragraph(),
        ]
    );
    assert_eq!(executor.editor().caret(), &Point::new([1], 0));
}

#[test]
fn test_enter_in_task_item_creates_unchecked_item() {
    let mut executor = executor_at(vec![Node::empty_paragraph()], Point::new([0], 0));
    type_str(&mut executor, "- [x] done");
    press(&mut executor, enter());
    let list = &executor.document().children()[0];
    let states: Vec<_> = list
        .children
        .iter()
        .map(|item| match item.kind {
            NodeKind::ListItem { checked } => checked,
            _ => None,
        })
        .collect();
    assert_eq!(states, [Some(true), Some(false)]);
    assert_eq!(executor.editor().caret(), &Point::new([0, 1, 0], 0));
}

#[test]
fn test_mod_enter_in_cell_inserts_break() {
    let table = Node::table(&[vec!["a", "b"], vec!["c", "d"]], &[]);
    let mut executor = executor_at(vec![table], Point::new([0, 1, 0, 0], 1));
    press(&mut executor, EditCommand::Enter { mod_key: true });
    let cell = &executor.document().children()[0].children[1].children[0];
    assert_eq!(cell.children[0].content_len(), 2);
    assert!(cell.children[0]
        .children
        .iter()
        .any(|child| child.kind == NodeKind::Break));
}

#[test]
fn test_code_fence_shortcut_then_mod_enter_leaves_block() {
    let mut executor = executor_at(vec![Node::empty_paragraph()], Point::new([0], 0));
    type_str(&mut executor, "```");
    assert!(matches!(
        executor.document().children()[0].kind,
        NodeKind::Code { .. }
    ));
    type_str(&mut executor, "let x = 1;");
    press(&mut executor, EditCommand::Enter { mod_key: true });
    assert_eq!(executor.document().children().len(), 2);
    assert_eq!(executor.editor().caret(), &Point::new([1], 0));
    assert_eq!(executor.to_markdown(), "```\nlet x = 1;\n```");
}

#[test]
fn test_multi_block_selection_delete_merges_edges() {
    let blocks = vec![
        Node::paragraph_text("keep this"),
        Node::heading(2, "gone"),
        Node::paragraph_text("tail end"),
    ];
    let mut executor = CommandExecutor::new(Document::new(blocks), EngineConfig::default());
    executor
        .execute(Command::Cursor(CursorCommand::SetSelection {
            selection: Selection::new(Point::new([0], 4), Point::new([2], 5)),
        }))
        .unwrap();
    press(&mut executor, EditCommand::DeleteSelection);
    assert_eq!(executor.document().children(), &[Node::paragraph_text("keepend")]);
    assert_eq!(executor.editor().caret(), &Point::new([0], 4));
}

#[test]
fn test_selection_delete_clears_cells_instead_of_removing_them() {
    let blocks = vec![
        Node::paragraph_text("before"),
        Node::table(&[vec!["a", "b"], vec!["c", "d"]], &[]),
    ];
    let mut executor = CommandExecutor::new(Document::new(blocks), EngineConfig::default());
    executor
        .execute(Command::Cursor(CursorCommand::SetSelection {
            selection: Selection::new(Point::new([0], 3), Point::new([1, 1, 0, 0], 1)),
        }))
        .unwrap();
    press(&mut executor, EditCommand::DeleteSelection);

    let doc = executor.document();
    assert_eq!(doc.children()[0], Node::paragraph_text("bef"));
    let table = &doc.children()[1];
    assert_eq!(table.children.len(), 2);
    assert_eq!(table.children[0].children.len(), 2);
    assert!(table.children[0].children.iter().all(|cell| cell.plain_text().is_empty()));
    let last_row: Vec<String> = table.children[1].children.iter().map(Node::plain_text).collect();
    assert_eq!(last_row, ["", "d"]);
}

#[test]
fn test_toggle_mark_over_selection() {
    let mut executor = CommandExecutor::new(
        Document::new(vec![Node::paragraph_text("make bold")]),
        EngineConfig::default(),
    );
    executor
        .execute(Command::Cursor(CursorCommand::SetSelection {
            selection: Selection::new(Point::new([0], 5), Point::new([0], 9)),
        }))
        .unwrap();
    press(&mut executor, EditCommand::ToggleMark { mark: Mark::Bold });
    assert_eq!(executor.to_markdown(), "make **bold**");
    press(&mut executor, EditCommand::ToggleMark { mark: Mark::Bold });
    assert_eq!(executor.to_markdown(), "make bold");
}

#[test]
fn test_insert_fragment_splices_blocks() {
    let mut executor = executor_at(vec![Node::paragraph_text("ab")], Point::new([0], 1));
    press(
        &mut executor,
        EditCommand::InsertFragment {
            nodes: vec![Node::paragraph_text("X"), Node::heading(1, "Y")],
        },
    );
    assert_eq!(
        executor.document().children(),
        &[
            Node::paragraph_text("aX"),
            Node::heading(1, "Y"),
            Node::paragraph_text("b"),
        ]
    );
}

#[test]
fn test_arrow_right_crosses_into_next_block() {
    let mut executor = executor_at(
        vec![Node::paragraph_text("a"), Node::paragraph_text("b")],
        Point::new([0], 1),
    );
    executor
        .execute(Command::Cursor(CursorCommand::Arrow {
            key: ArrowKey::Right,
            extend: false,
        }))
        .unwrap();
    assert_eq!(executor.editor().caret(), &Point::new([1], 0));
}
