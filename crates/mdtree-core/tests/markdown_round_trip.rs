use mdtree_core::{Align, Document, Marks, Node, NodeKind, parse, serialize};
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn round_trip(markdown: &str) {
    let first = parse(markdown).document;
    let written = serialize(&first);
    let second = parse(&written).document;
    assert_eq!(first, second, "tree changed after re-parsing {written:?}");
    assert_eq!(serialize(&second), written, "re-serialize is not idempotent");
}

#[test]
fn test_heading_parses_and_serializes() {
    let doc = parse("# Hello").document;
    assert_eq!(doc.children(), &[Node::heading(1, "Hello")]);
    assert_eq!(serialize(&doc), "# Hello");
}

#[test]
fn test_heading_level_six_is_clamped() {
    let doc = parse("###### deep").document;
    assert_eq!(doc.children(), &[Node::heading(5, "deep")]);
}

#[test]
fn test_table_columns_are_padded_to_widest_cell() {
    let doc = Document::new(vec![Node::table(
        &[vec!["a", "bb", "ccc"], vec!["d", "e", "f"]],
        &[],
    )]);
    assert_eq!(
        serialize(&doc),
        "| a | bb | ccc |\n| -- | -- | --- |\n| d | e  | f   |"
    );
}

#[test]
fn test_table_alignment_markers() {
    let doc = Document::new(vec![Node::table(
        &[vec!["left", "mid", "r"], vec!["1", "2", "3"]],
        &[Some(Align::Left), Some(Align::Center), Some(Align::Right)],
    )]);
    assert_eq!(
        serialize(&doc),
        "| left | mid | r |\n| :--- | :--: | --: |\n| 1    |  2  | 3 |"
    );
}

#[test]
fn test_wide_characters_use_display_width() {
    let doc = Document::new(vec![Node::table(&[vec!["漢字"], vec!["a"]], &[])]);
    assert_eq!(serialize(&doc), "| 漢字 |\n| ---- |\n| a    |");
}

#[test]
fn test_task_list_items() {
    let doc = parse("- [ ] todo\n- [x] done").document;
    let list = &doc.children()[0];
    let states: Vec<_> = list
        .children
        .iter()
        .map(|item| match item.kind {
            NodeKind::ListItem { checked } => checked,
            _ => panic!("expected list item"),
        })
        .collect();
    assert_eq!(states, [Some(false), Some(true)]);
    assert_eq!(list.plain_text(), "todo\ndone");
    assert_eq!(serialize(&doc), "- [ ] todo\n- [x] done");
}

#[test]
fn test_display_math_and_frontmatter() {
    let doc = parse("---\ntitle: x\n---\n\n$$\na+b\n$$").document;
    assert!(matches!(
        &doc.children()[0].kind,
        NodeKind::Code { language: Some(l), frontmatter: true, .. } if l == "yaml"
    ));
    assert!(matches!(
        &doc.children()[1].kind,
        NodeKind::Code { language: Some(l), katex: true, .. } if l == "latex"
    ));
    assert_eq!(serialize(&doc), "---\ntitle: x\n---\n\n$$\na+b\n$$");
}

#[test]
fn test_fence_keeps_language_and_render_flag() {
    let doc = parse("```js render\nlet a = 1;\n```").document;
    assert!(matches!(
        &doc.children()[0].kind,
        NodeKind::Code { language: Some(l), render: true, .. } if l == "js"
    ));
    assert_eq!(serialize(&doc), "```js render\nlet a = 1;\n```");
}

#[test]
fn test_blank_line_runs_become_empty_paragraphs() {
    let doc = parse("a\n\n\n\n\nb").document;
    // Four blank lines with the default threshold of 4 give one empty paragraph.
    assert_eq!(
        doc.children(),
        &[
            Node::paragraph_text("a"),
            Node::empty_paragraph(),
            Node::paragraph_text("b")
        ]
    );
    assert_eq!(serialize(&doc), "a\n\n\n\n\nb");

    let normal = parse("a\n\nb").document;
    assert_eq!(normal.children().len(), 2);
}

#[test]
fn test_blank_lines_inside_containers_are_ignored() {
    let doc = parse("> a\n>\n>\n>\n>\n> b").document;
    assert_eq!(doc.children()[0].children.len(), 2);
}

#[test]
fn test_bold_italic_nesting() {
    let bold_italic = Marks {
        bold: true,
        italic: true,
        ..Marks::plain()
    };
    let doc = Document::new(vec![Node::paragraph(vec![
        Node::text("a "),
        Node::marked_text("b", bold_italic),
    ])]);
    assert_eq!(serialize(&doc), "a ***b***");
}

#[test]
fn test_malformed_input_never_fails() {
    for input in ["", "\n\n\n", "<div>", "| a |\n", "[x](", "```", "> \n>"] {
        let doc = parse(input).document;
        assert!(!doc.children().is_empty(), "empty document for {input:?}");
    }
    assert_eq!(parse("").document.children(), &[Node::empty_paragraph()]);
}

#[test]
fn test_round_trip_corpus() {
    let corpus = [
        "# Title\n\nSome *italic*, **bold** and `code`.",
        "## Second\n\n- one\n- two\n  - nested\n- three",
        "3. three\n4. four",
        "> quoted\n>\n> - inside",
        "```rust\nfn main() {}\n```",
        "---",
        "| a | b |\n| :- | -: |\n| 1 | 2 |",
        "Inline $x^2$ math and a [link](http://example.com).",
        "![alt](image.png)",
        "- [ ] task\n- [x] done",
        "~~gone~~ and text",
        "a\n\n\n\n\n\nb",
        "See [[Wiki Page]] here.",
    ];
    for markdown in corpus {
        round_trip(markdown);
    }
}

const CELL_WORDS: &[&str] = &["a", "bb", "漢字", "é", "x y", "😀", "longer cell", "1234"];

#[test]
fn test_table_symmetry_random_shapes() {
    let mut rng = StdRng::seed_from_u64(0x7ab1e);
    let aligns = [None, Some(Align::Left), Some(Align::Center), Some(Align::Right)];

    for _ in 0..60 {
        let columns = rng.gen_range(1..=20);
        let rows = rng.gen_range(1..=20);
        let texts: Vec<Vec<&str>> = (0..rows)
            .map(|_| {
                (0..columns)
                    .map(|_| CELL_WORDS[rng.gen_range(0..CELL_WORDS.len())])
                    .collect()
            })
            .collect();
        let column_aligns: Vec<Option<Align>> = (0..columns)
            .map(|_| aligns[rng.gen_range(0..aligns.len())])
            .collect();
        let table = Node::table(&texts, &column_aligns);

        let written = serialize(&Document::new(vec![table]));
        let parsed = parse(&written).document;
        let parsed_table = &parsed.children()[0];
        assert_eq!(parsed_table.kind, NodeKind::Table, "{written}");

        let parsed_texts: Vec<Vec<String>> = parsed_table
            .children
            .iter()
            .map(|row| row.children.iter().map(Node::plain_text).collect())
            .collect();
        let expected: Vec<Vec<String>> = texts
            .iter()
            .map(|row| row.iter().map(|t| t.to_string()).collect())
            .collect();
        assert_eq!(parsed_texts, expected);

        let parsed_aligns: Vec<Option<Align>> = parsed_table.children[0]
            .children
            .iter()
            .map(|cell| match cell.kind {
                NodeKind::TableCell { align, .. } => align,
                _ => None,
            })
            .collect();
        assert_eq!(parsed_aligns, column_aligns);
    }
}

#[test]
fn test_json_persisted_form_round_trips() {
    let doc = parse("# T\n\n- [x] a\n\n| h |\n| - |\n| c |").document;
    let json = doc.to_json().unwrap();
    let loaded = Document::from_json(&json).unwrap();
    assert_eq!(loaded, doc);
}
