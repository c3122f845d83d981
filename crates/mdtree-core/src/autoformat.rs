//! Live markdown shortcuts.
//!
//! Before a typed character is inserted, the command engine asks the [`AutoformatMatcher`]
//! whether that keystroke completes a shortcut such as `## ` or `**bold**`. Rules are tried in
//! declaration order; the first whose trigger, pattern and predicate all match wins, and its
//! [`AutoformatAction`] replaces the matched span. The typed character itself is consumed.
//!
//! Block rules match the whole block text before the caret plus the typed character. Inline
//! rules match only the current mark run (the same-mark text directly before the caret) so a
//! shortcut never spans existing styled text or inline voids.

use crate::node::{Mark, Marks, NodeKind};
use regex::{Captures, Regex};

/// What the caret sits in when a character is typed.
#[derive(Debug, Clone)]
pub struct AutoformatContext<'a> {
    /// Kind of the text block holding the caret.
    pub block: &'a NodeKind,
    /// Kinds of the block's ancestors, outermost first.
    pub ancestors: Vec<&'a NodeKind>,
    /// The block is a direct child of the document root.
    pub is_top_level: bool,
    /// The block is the first child of its parent.
    pub is_first_child: bool,
    /// Block text before the caret (inline voids as U+FFFC).
    pub text_before: String,
    /// Block text after the caret.
    pub text_after: String,
    /// Text of the current mark run before the caret.
    pub run_text: String,
    /// Marks typed text would get.
    pub run_marks: Marks,
    /// Marks of the leaf just before the current run (plain when there is none).
    pub marks_before_run: Marks,
}

impl AutoformatContext<'_> {
    fn parent(&self) -> Option<&NodeKind> {
        self.ancestors.last().copied()
    }

    fn in_table(&self) -> bool {
        self.ancestors
            .iter()
            .any(|kind| matches!(kind, NodeKind::TableCell { .. }))
    }

    fn is_paragraph(&self) -> bool {
        matches!(self.block, NodeKind::Paragraph)
    }

    fn in_list_item(&self) -> bool {
        matches!(self.parent(), Some(NodeKind::ListItem { .. })) && self.is_first_child
    }
}

/// A structural rewrite produced by a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoformatAction {
    /// Turn the block into a heading.
    Heading(u8),
    /// Wrap the block in a blockquote.
    Blockquote,
    /// Wrap the block in a list.
    List {
        /// Ordered list.
        ordered: bool,
        /// First number when not 1.
        start: Option<u64>,
        /// Task state of the new item.
        checked: Option<bool>,
    },
    /// Set the task state of the enclosing list item.
    TaskItem(bool),
    /// Replace the block with `---`.
    ThematicBreak,
    /// Replace the block with a code block.
    CodeFence(Option<String>),
    /// Replace the block with a display math block.
    DisplayMath,
    /// Replace the block with a table whose header row holds these cells.
    Table(Vec<String>),
    /// Replace the span with `text` carrying an extra mark.
    Mark {
        /// Mark to add.
        mark: Mark,
        /// Text inside the markers.
        text: String,
    },
    /// Replace the span with linked text.
    Link {
        /// Link text.
        text: String,
        /// Destination.
        url: String,
    },
    /// Replace the span with an image.
    Image {
        /// Alternative text.
        alt: String,
        /// Source.
        url: String,
    },
    /// Replace the span with a wiki link.
    WikiLink(String),
    /// Replace the span with inline math.
    InlineMath(String),
}

impl AutoformatAction {
    /// Block rewrites consume everything before the caret; inline rewrites a span of the run.
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            Self::Heading(_)
                | Self::Blockquote
                | Self::List { .. }
                | Self::TaskItem(_)
                | Self::ThematicBreak
                | Self::CodeFence(_)
                | Self::DisplayMath
                | Self::Table(_)
        )
    }

    /// The mark an inline rewrite applies, for the duplicate-marker guard.
    fn applied_mark(&self) -> Option<Mark> {
        match self {
            Self::Mark { mark, .. } => Some(*mark),
            _ => None,
        }
    }
}

/// A fired rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoformatMatch {
    /// Rule name, for logging.
    pub rule: &'static str,
    /// Char offset in the block where the replaced span starts; it ends at the caret.
    pub start: usize,
    /// The rewrite.
    pub action: AutoformatAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Block,
    Inline,
}

struct Rule {
    name: &'static str,
    triggers: &'static [char],
    scope: Scope,
    pattern: Regex,
    applies: fn(&AutoformatContext<'_>) -> bool,
    build: fn(&Captures<'_>) -> Option<AutoformatAction>,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("triggers", &self.triggers)
            .finish()
    }
}

fn rule(
    name: &'static str,
    triggers: &'static [char],
    scope: Scope,
    pattern: &str,
    applies: fn(&AutoformatContext<'_>) -> bool,
    build: fn(&Captures<'_>) -> Option<AutoformatAction>,
) -> Rule {
    Rule {
        name,
        triggers,
        scope,
        pattern: Regex::new(pattern).expect("valid autoformat regex"),
        applies,
        build,
    }
}

fn capture(caps: &Captures<'_>, group: usize) -> String {
    caps.get(group).map_or("", |m| m.as_str()).to_string()
}

fn flow_paragraph(ctx: &AutoformatContext<'_>) -> bool {
    ctx.is_paragraph() && !ctx.in_table()
}

fn empty_after(ctx: &AutoformatContext<'_>) -> bool {
    flow_paragraph(ctx) && ctx.text_after.is_empty()
}

fn inline_allowed(ctx: &AutoformatContext<'_>) -> bool {
    !matches!(ctx.block, NodeKind::CodeLine) && !ctx.run_marks.code
}

fn marked(mark: Mark, caps: &Captures<'_>) -> Option<AutoformatAction> {
    Some(AutoformatAction::Mark {
        mark,
        text: capture(caps, 2),
    })
}

fn bold_span(caps: &Captures<'_>) -> Option<AutoformatAction> {
    marked(Mark::Bold, caps)
}

fn italic_span(caps: &Captures<'_>) -> Option<AutoformatAction> {
    marked(Mark::Italic, caps)
}

fn strikethrough_span(caps: &Captures<'_>) -> Option<AutoformatAction> {
    marked(Mark::Strikethrough, caps)
}

fn code_span(caps: &Captures<'_>) -> Option<AutoformatAction> {
    marked(Mark::Code, caps)
}

/// The ordered shortcut table.
#[derive(Debug)]
pub struct AutoformatMatcher {
    rules: Vec<Rule>,
}

impl Default for AutoformatMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl AutoformatMatcher {
    /// The standard rule table.
    pub fn new() -> Self {
        use Scope::{Block, Inline};
        let rules = vec![
            rule(
                "heading",
                &[' '],
                Block,
                r"^(#{1,5}) $",
                |ctx| {
                    ctx.is_top_level
                        && matches!(ctx.block, NodeKind::Paragraph | NodeKind::Heading { .. })
                },
                |caps| Some(AutoformatAction::Heading(caps[1].len() as u8)),
            ),
            rule(
                "blockquote",
                &[' '],
                Block,
                r"^> $",
                flow_paragraph,
                |_| Some(AutoformatAction::Blockquote),
            ),
            rule(
                "task-list",
                &[' '],
                Block,
                r"^[-*+] \[([ xX])\] $",
                flow_paragraph,
                |caps| {
                    Some(AutoformatAction::List {
                        ordered: false,
                        start: None,
                        checked: Some(&caps[1] != " "),
                    })
                },
            ),
            rule(
                "task-item",
                &[' '],
                Block,
                r"^\[([ xX])\] $",
                |ctx| flow_paragraph(ctx) && ctx.in_list_item(),
                |caps| Some(AutoformatAction::TaskItem(&caps[1] != " ")),
            ),
            rule(
                "bullet-list",
                &[' '],
                Block,
                r"^[-*+] $",
                flow_paragraph,
                |_| {
                    Some(AutoformatAction::List {
                        ordered: false,
                        start: None,
                        checked: None,
                    })
                },
            ),
            rule(
                "ordered-list",
                &[' '],
                Block,
                r"^([0-9]{1,9})\. $",
                flow_paragraph,
                |caps| {
                    let start: u64 = caps[1].parse().ok()?;
                    Some(AutoformatAction::List {
                        ordered: true,
                        start: (start != 1).then_some(start),
                        checked: None,
                    })
                },
            ),
            rule(
                "thematic-break",
                &['-', '*', '_'],
                Block,
                r"^(?:---|\*\*\*|___)$",
                empty_after,
                |_| Some(AutoformatAction::ThematicBreak),
            ),
            rule(
                "code-fence",
                &['`'],
                Block,
                r"^```$",
                empty_after,
                |_| Some(AutoformatAction::CodeFence(None)),
            ),
            rule(
                "code-fence-language",
                &[' '],
                Block,
                r"^```([^`\s]+) $",
                flow_paragraph,
                |caps| Some(AutoformatAction::CodeFence(Some(capture(caps, 1)))),
            ),
            rule(
                "display-math",
                &['$'],
                Block,
                r"^\$\$$",
                empty_after,
                |_| Some(AutoformatAction::DisplayMath),
            ),
            rule(
                "table",
                &[' '],
                Block,
                r"^\|((?:[^|\n]+\|)+) $",
                |ctx| ctx.is_top_level && empty_after(ctx),
                |caps| {
                    let cells: Vec<String> = caps[1]
                        .trim_end_matches('|')
                        .split('|')
                        .map(|cell| cell.trim().to_string())
                        .collect();
                    Some(AutoformatAction::Table(cells))
                },
            ),
            rule(
                "image",
                &[')'],
                Inline,
                r"()!\[([^\]]*)\]\(([^)\s]+)\)$",
                inline_allowed,
                |caps| {
                    Some(AutoformatAction::Image {
                        alt: capture(caps, 2),
                        url: capture(caps, 3),
                    })
                },
            ),
            rule(
                "link",
                &[')'],
                Inline,
                r"(^|[^!])\[([^\]]+)\]\(([^)\s]+)\)$",
                inline_allowed,
                |caps| {
                    Some(AutoformatAction::Link {
                        text: capture(caps, 2),
                        url: capture(caps, 3),
                    })
                },
            ),
            rule(
                "wiki-link",
                &[']'],
                Inline,
                r"()\[\[([^\[\]]+)\]\]$",
                inline_allowed,
                |caps| Some(AutoformatAction::WikiLink(capture(caps, 2))),
            ),
            rule(
                "bold",
                &['*'],
                Inline,
                r"()\*\*([^*\s](?:[^*]*[^*\s])?)\*\*$",
                inline_allowed,
                bold_span,
            ),
            rule(
                "bold",
                &['_'],
                Inline,
                r"(^|[^_\w])__([^_\s](?:[^_]*[^_\s])?)__$",
                inline_allowed,
                bold_span,
            ),
            rule(
                "strikethrough",
                &['~'],
                Inline,
                r"()~~([^~\s](?:[^~]*[^~\s])?)~~$",
                inline_allowed,
                strikethrough_span,
            ),
            rule(
                "italic",
                &['*'],
                Inline,
                r"(^|[^*])\*([^*\s](?:[^*]*[^*\s])?)\*$",
                inline_allowed,
                italic_span,
            ),
            rule(
                "italic",
                &['_'],
                Inline,
                r"(^|[^_\w])_([^_\s](?:[^_]*[^_\s])?)_$",
                inline_allowed,
                italic_span,
            ),
            rule(
                "inline-code",
                &['`'],
                Inline,
                r"(^|[^`])`([^`]+)`$",
                inline_allowed,
                code_span,
            ),
            rule(
                "inline-math",
                &['$'],
                Inline,
                r"(^|[^$\\])\$([^$\s](?:[^$]*[^$\s])?)\$$",
                inline_allowed,
                |caps| Some(AutoformatAction::InlineMath(capture(caps, 2))),
            ),
        ];
        Self { rules }
    }

    /// Names of the rules in declaration order (a name repeats for alternative markers).
    pub fn rule_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|rule| rule.name)
    }

    /// The rule fired by typing `typed` in `ctx`, if any.
    pub fn find(&self, ctx: &AutoformatContext<'_>, typed: char) -> Option<AutoformatMatch> {
        let block_input = format!("{}{typed}", ctx.text_before);
        let run_input = format!("{}{typed}", ctx.run_text);
        let run_start = ctx
            .text_before
            .chars()
            .count()
            .saturating_sub(ctx.run_text.chars().count());

        for rule in self.rules.iter().filter(|rule| rule.triggers.contains(&typed)) {
            let input = match rule.scope {
                Scope::Block => &block_input,
                Scope::Inline => &run_input,
            };
            let Some(caps) = rule.pattern.captures(input) else {
                continue;
            };
            if !(rule.applies)(ctx) {
                continue;
            }
            let Some(action) = (rule.build)(&caps) else {
                continue;
            };
            let start = match rule.scope {
                Scope::Block => 0,
                Scope::Inline => {
                    // Group 1 is the (possibly empty) prefix that is not part of the span.
                    let span_start = caps.get(1).map_or(0, |m| m.end());
                    let within_run = input[..span_start].chars().count();
                    if within_run == 0
                        && action
                            .applied_mark()
                            .is_some_and(|mark| ctx.marks_before_run.has(mark))
                    {
                        tracing::trace!(rule = rule.name, "duplicate marker, not firing");
                        return None;
                    }
                    run_start + within_run
                }
            };
            return Some(AutoformatMatch {
                rule: rule.name,
                start,
                action,
            });
        }
        None
    }
}
