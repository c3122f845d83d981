use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use mdtree_core::{
    Command, CommandExecutor, CursorCommand, EditCommand, EngineConfig, MarkdownSerializer, Point,
    parse, serialize,
};

fn large_markdown(sections: usize) -> String {
    let mut out = String::with_capacity(sections * 256);
    for i in 0..sections {
        out.push_str(&format!(
            "## Section {i}\n\nThe quick *brown* fox jumps over the **lazy** dog, see [link](http://x/{i}).\n\n\
             - item one\n- [ ] task two\n\n| a | b |\n| - | - |\n| {i} | `code` |\n\n\
             ```rust\nfn f{i}() {{\n    let x = {i};\n}}\n```\n\n"
        ));
    }
    out.truncate(out.trim_end().len());
    out
}

fn bench_parse(c: &mut Criterion) {
    let markdown = large_markdown(2_000);
    c.bench_function("parse/2k_sections", |b| {
        b.iter(|| black_box(parse(black_box(&markdown)).document.children().len()))
    });
}

fn bench_serialize(c: &mut Criterion) {
    let document = parse(&large_markdown(2_000)).document;
    c.bench_function("serialize/2k_sections", |b| {
        b.iter(|| black_box(serialize(black_box(&document)).len()))
    });
}

fn bench_memoized_serialize_after_edit(c: &mut Criterion) {
    let mut executor = CommandExecutor::from_markdown(&large_markdown(2_000), EngineConfig::default());
    let middle = executor.document().children().len() / 2;
    let target = executor.document().first_text_block_in(&[middle].into());
    executor
        .execute(Command::Cursor(CursorCommand::MoveTo {
            point: Point::new(target.unwrap_or_else(|| [0].into()), 0),
        }))
        .unwrap();
    let mut serializer = MarkdownSerializer::new(EngineConfig::default().blank_line_threshold);
    serializer.serialize(executor.document());

    c.bench_function("serialize_memoized/one_edit", |b| {
        b.iter(|| {
            executor
                .execute(Command::Edit(EditCommand::InsertText {
                    text: "x".to_string(),
                }))
                .unwrap();
            if let Some(changes) = executor.take_last_change() {
                serializer.invalidate(&changes);
            }
            black_box(serializer.serialize(executor.document()).len());
        })
    });
}

fn bench_typing_in_middle(c: &mut Criterion) {
    let markdown = large_markdown(2_000);
    c.bench_function("typing_middle/100_inserts", |b| {
        b.iter_batched(
            || {
                let mut executor = CommandExecutor::from_markdown(&markdown, EngineConfig::default());
                let blocks = executor.document().text_blocks();
                let point = Point::new(blocks[blocks.len() / 2].clone(), 0);
                executor
                    .execute(Command::Cursor(CursorCommand::MoveTo { point }))
                    .unwrap();
                executor
            },
            |mut executor| {
                for _ in 0..100 {
                    executor
                        .execute(Command::Edit(EditCommand::InsertText {
                            text: "x".to_string(),
                        }))
                        .unwrap();
                }
                black_box(executor.undo_depth());
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(
    benches,
    bench_parse,
    bench_serialize,
    bench_memoized_serialize_after_edit,
    bench_typing_in_middle
);
criterion_main!(benches);
