//! Command interface example
//!
//! Demonstrates how to use `CommandExecutor` to drive the engine with key-level intents.

use mdtree_core::{
    ArrowKey, Command, CommandExecutor, CommandResult, CursorCommand, EditCommand, EngineConfig,
    Mark, Point, Selection,
};

fn type_str(executor: &mut CommandExecutor, text: &str) {
    for ch in text.chars() {
        let result = executor
            .execute(Command::Edit(EditCommand::InsertText {
                text: ch.to_string(),
            }))
            .unwrap();
        if let CommandResult::Autoformat { rule } = result {
            println!("  autoformat fired: {rule}");
        }
    }
}

fn enter(executor: &mut CommandExecutor) {
    executor
        .execute(Command::Edit(EditCommand::Enter { mod_key: false }))
        .unwrap();
}

fn main() {
    println!("=== mdtree command interface ===\n");

    let mut executor = CommandExecutor::from_markdown("", EngineConfig::default());

    // 1. Markdown shortcuts rewrite the tree as you type.
    println!("1. Typing shortcuts:");
    type_str(&mut executor, "# Groceries");
    enter(&mut executor);
    type_str(&mut executor, "- [ ] milk");
    enter(&mut executor);
    type_str(&mut executor, "eggs");
    println!("{}\n", executor.to_markdown());

    // 2. Enter on an empty item leaves the list.
    println!("2. Leaving a list:");
    enter(&mut executor);
    enter(&mut executor);
    type_str(&mut executor, "Remember the **receipt**.");
    println!("{}\n", executor.to_markdown());

    // 3. Caret movement and marks over a selection.
    println!("3. Selection and marks:");
    executor
        .execute(Command::Cursor(CursorCommand::SetSelection {
            selection: Selection::new(Point::new([0], 0), Point::new([0], 9)),
        }))
        .unwrap();
    executor
        .execute(Command::Edit(EditCommand::ToggleMark { mark: Mark::Italic }))
        .unwrap();
    executor
        .execute(Command::Cursor(CursorCommand::Arrow {
            key: ArrowKey::Down,
            extend: false,
        }))
        .unwrap();
    println!("  caret: {:?}", executor.editor().caret());
    println!("{}\n", executor.to_markdown());

    // 4. Undo walks back one step at a time.
    println!("4. Undo:");
    while executor.can_undo() && executor.undo_depth() > 3 {
        executor.execute(Command::Edit(EditCommand::Undo)).unwrap();
    }
    println!("{}", executor.to_markdown());
}
