//! Session example
//!
//! Opens a document session, edits it, and lets the debounced autosave write to a sink.

use mdtree_core::{
    Command, DocumentSession, DocumentSink, EditCommand, EngineConfig, SessionChangeType,
    SessionError,
};
use std::time::{Duration, Instant};

/// Prints each save instead of writing a file.
struct StdoutSink;

impl DocumentSink for StdoutSink {
    fn save(&mut self, markdown: &str) -> Result<(), SessionError> {
        println!("--- saved ---\n{markdown}\n-------------");
        Ok(())
    }
}

fn main() -> Result<(), SessionError> {
    let config = EngineConfig {
        autosave_delay_ms: 200,
        ..EngineConfig::default()
    };
    let mut session = DocumentSession::open("# Notes\n\nfirst line", config, StdoutSink);
    session.subscribe(|change| {
        if change.change_type == SessionChangeType::Saved {
            println!("saved at version {}", change.new_version);
        }
    });

    let start = Instant::now();
    for (i, ch) in "typed quickly".chars().enumerate() {
        let now = start + Duration::from_millis(50 * i as u64);
        session.execute(
            Command::Edit(EditCommand::InsertText {
                text: ch.to_string(),
            }),
            now,
        )?;
        // Still inside the quiet period: nothing is written.
        session.tick(now)?;
    }

    let later = start + Duration::from_secs(2);
    println!("autosave fired: {}", session.tick(later)?);
    println!("dirty after save: {}", session.is_dirty());

    session.execute(Command::Edit(EditCommand::Enter { mod_key: false }), later)?;
    session.close()?;
    Ok(())
}
