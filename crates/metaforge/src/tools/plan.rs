//! Tag classification and execution ordering.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::lpml::{Element, Node};

/// A tool that runs as soon as its response is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    /// `create_file`
    CreateFile,
    /// `edit_file`
    EditFile,
    /// `delete_file`
    DeleteFile,
    /// `move_file`
    MoveFile,
    /// `read_file`
    ReadFile,
    /// `list_files`
    ListFiles,
    /// `preview`
    Preview,
    /// `take_screenshot`
    TakeScreenshot,
}

impl ToolKind {
    /// Every immediate tool.
    pub const ALL: [ToolKind; 8] = [
        ToolKind::CreateFile,
        ToolKind::EditFile,
        ToolKind::DeleteFile,
        ToolKind::MoveFile,
        ToolKind::ReadFile,
        ToolKind::ListFiles,
        ToolKind::Preview,
        ToolKind::TakeScreenshot,
    ];

    /// Look up a tool by tag name.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    /// The tag name that invokes this tool.
    pub fn tag(&self) -> &'static str {
        match self {
            ToolKind::CreateFile => "create_file",
            ToolKind::EditFile => "edit_file",
            ToolKind::DeleteFile => "delete_file",
            ToolKind::MoveFile => "move_file",
            ToolKind::ReadFile => "read_file",
            ToolKind::ListFiles => "list_files",
            ToolKind::Preview => "preview",
            ToolKind::TakeScreenshot => "take_screenshot",
        }
    }
}

/// A tag that ends the agent's turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterruptKind {
    /// The agent needs input from the user.
    Ask,
    /// The agent considers the task done.
    Finish,
}

impl InterruptKind {
    /// Tag name.
    pub fn tag(&self) -> &'static str {
        match self {
            InterruptKind::Ask => "ask",
            InterruptKind::Finish => "finish",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "ask" => Some(InterruptKind::Ask),
            "finish" => Some(InterruptKind::Finish),
            _ => None,
        }
    }
}

/// Which interrupt is reported when one response contains several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterruptPrecedence {
    /// Keep the first interrupt in document order.
    First,
    /// Keep the last interrupt in document order.
    #[default]
    Last,
}

/// The interrupt a response ended with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interrupt {
    /// Ask or finish.
    pub kind: InterruptKind,
    /// Trimmed text of the tag: the question or the summary.
    pub value: String,
}

/// What a tag means to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    /// Run now.
    Immediate(ToolKind),
    /// End the turn.
    Interrupt(InterruptKind),
    /// Agent's own notes; no effect.
    Annotation,
    /// Not part of the vocabulary; ignored.
    Unknown,
}

const ANNOTATION_TAGS: [&str; 3] = ["thinking", "plan", "report"];

/// Classify a tag name.
pub fn classify(tag: &str) -> TagClass {
    if let Some(kind) = ToolKind::from_tag(tag) {
        TagClass::Immediate(kind)
    } else if let Some(kind) = InterruptKind::from_tag(tag) {
        TagClass::Interrupt(kind)
    } else if ANNOTATION_TAGS.contains(&tag) {
        TagClass::Annotation
    } else {
        TagClass::Unknown
    }
}

/// One immediate tool call, borrowing its element from the parsed tree.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    /// Which tool.
    pub kind: ToolKind,
    /// The element carrying the attributes and body.
    pub element: &'a Element,
}

impl Invocation<'_> {
    fn path(&self) -> &str {
        self.element.attr("path").unwrap_or_default()
    }

    /// Line an edit is anchored at. `start` when given, otherwise `end`
    /// (the usual `insert_after` shape). Unparseable values sort as 0.
    fn anchor_line(&self) -> u64 {
        self.element
            .attr("start")
            .or_else(|| self.element.attr("end"))
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0)
    }
}

/// Immediate tools in execution order plus the interrupt, if any.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan<'a> {
    /// Tools to run, in order.
    pub immediate: Vec<Invocation<'a>>,
    /// Interrupt that ends the turn.
    pub interrupt: Option<Interrupt>,
}

impl<'a> ExecutionPlan<'a> {
    /// Build a plan from the top-level nodes of a parsed response.
    ///
    /// Nested elements are never classified; a `<finish>` inside a
    /// `<thinking>` block does nothing.
    pub fn build(tree: &'a [Node], precedence: InterruptPrecedence) -> Self {
        let mut immediate = Vec::new();
        let mut interrupt: Option<Interrupt> = None;

        for element in tree.iter().filter_map(Node::as_element) {
            match classify(&element.tag) {
                TagClass::Immediate(kind) => immediate.push(Invocation { kind, element }),
                TagClass::Interrupt(kind) => {
                    if let Some(existing) = &interrupt {
                        if precedence == InterruptPrecedence::First {
                            debug!(kept = existing.kind.tag(), dropped = kind.tag(), "extra interrupt ignored");
                            continue;
                        }
                        debug!(kept = kind.tag(), dropped = existing.kind.tag(), "interrupt replaced");
                    }
                    interrupt = Some(Interrupt {
                        kind,
                        value: element.text().trim().to_string(),
                    });
                }
                TagClass::Annotation => trace!(tag = %element.tag, "annotation skipped"),
                TagClass::Unknown => debug!(tag = %element.tag, "unknown tag ignored"),
            }
        }

        Self {
            immediate: order_edits(immediate),
            interrupt,
        }
    }

    /// True when there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.immediate.is_empty() && self.interrupt.is_none()
    }
}

/// Group every `edit_file` at the position of the first one, sorted by path
/// and then bottom-up, so earlier edits never shift the line numbers of
/// later edits to the same file. Everything else keeps its relative order.
fn order_edits(ops: Vec<Invocation<'_>>) -> Vec<Invocation<'_>> {
    let Some(first_edit) = ops.iter().position(|op| op.kind == ToolKind::EditFile) else {
        return ops;
    };

    let (mut edits, others): (Vec<_>, Vec<_>) = ops
        .into_iter()
        .partition(|op| op.kind == ToolKind::EditFile);
    edits.sort_by(|a, b| {
        a.path()
            .cmp(b.path())
            .then_with(|| b.anchor_line().cmp(&a.anchor_line()))
    });

    let mut others = others.into_iter();
    let mut ordered = Vec::with_capacity(edits.len() + others.len());
    ordered.extend(others.by_ref().take(first_edit));
    ordered.extend(edits);
    ordered.extend(others);
    ordered
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::lpml::{ParseOptions, parse};

    fn tree(text: &str) -> Vec<Node> {
        parse(text, &ParseOptions::agent())
    }

    fn summary(plan: &ExecutionPlan<'_>) -> Vec<String> {
        plan.immediate
            .iter()
            .map(|op| match op.element.attr("path") {
                Some(path) => format!("{}:{}:{}", op.kind.tag(), path, op.element.attr("start").unwrap_or("-")),
                None => op.kind.tag().to_string(),
            })
            .collect()
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("create_file"), TagClass::Immediate(ToolKind::CreateFile));
        assert_eq!(classify("take_screenshot"), TagClass::Immediate(ToolKind::TakeScreenshot));
        assert_eq!(classify("ask"), TagClass::Interrupt(InterruptKind::Ask));
        assert_eq!(classify("finish"), TagClass::Interrupt(InterruptKind::Finish));
        assert_eq!(classify("thinking"), TagClass::Annotation);
        assert_eq!(classify("report"), TagClass::Annotation);
        assert_eq!(classify("launch_missiles"), TagClass::Unknown);
    }

    #[test]
    fn test_tool_kind_tags_round_trip() {
        for kind in ToolKind::ALL {
            assert_eq!(ToolKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(ToolKind::from_tag("ask"), None);
    }

    #[test]
    fn test_edits_sorted_bottom_up_within_file() {
        let nodes = tree(concat!(
            r#"<edit_file path="a.txt" start="2" end="2" mode="replace">x</edit_file>"#,
            r#"<edit_file path="a.txt" start="8" end="8" mode="replace">y</edit_file>"#,
            r#"<edit_file path="a.txt" start="5" end="5" mode="delete"></edit_file>"#,
        ));
        let plan = ExecutionPlan::build(&nodes, InterruptPrecedence::Last);

        assert_eq!(
            summary(&plan),
            vec!["edit_file:a.txt:8", "edit_file:a.txt:5", "edit_file:a.txt:2"]
        );
    }

    #[test]
    fn test_edits_grouped_at_first_edit_position() {
        let nodes = tree(concat!(
            r#"<list_files />"#,
            r#"<edit_file path="b.txt" start="1" end="1" mode="replace">x</edit_file>"#,
            r#"<read_file path="a.txt" />"#,
            r#"<edit_file path="a.txt" start="3" end="3" mode="replace">y</edit_file>"#,
            r#"<preview />"#,
        ));
        let plan = ExecutionPlan::build(&nodes, InterruptPrecedence::Last);

        assert_eq!(
            summary(&plan),
            vec![
                "list_files",
                "edit_file:a.txt:3",
                "edit_file:b.txt:1",
                "read_file:a.txt:-",
                "preview",
            ]
        );
    }

    #[test]
    fn test_unparseable_start_sorts_as_zero() {
        let nodes = tree(concat!(
            r#"<edit_file path="a.txt" start="soon" end="1" mode="replace">x</edit_file>"#,
            r#"<edit_file path="a.txt" start="4" end="4" mode="replace">y</edit_file>"#,
        ));
        let plan = ExecutionPlan::build(&nodes, InterruptPrecedence::Last);

        assert_eq!(
            summary(&plan),
            vec!["edit_file:a.txt:4", "edit_file:a.txt:soon"]
        );
    }

    #[test]
    fn test_insert_after_without_start_anchors_on_end() {
        let nodes = tree(concat!(
            r#"<edit_file path="a.txt" end="2" mode="insert_after">x</edit_file>"#,
            r#"<edit_file path="a.txt" start="6" end="6" mode="delete"></edit_file>"#,
            r#"<edit_file path="a.txt" end="9" mode="insert_after">z</edit_file>"#,
        ));
        let plan = ExecutionPlan::build(&nodes, InterruptPrecedence::Last);
        let ends: Vec<_> = plan
            .immediate
            .iter()
            .map(|op| op.element.attr("end").unwrap())
            .collect();

        assert_eq!(ends, vec!["9", "6", "2"]);
    }

    #[test]
    fn test_non_edit_order_preserved() {
        let nodes = tree(concat!(
            r#"<create_file path="b.txt">b</create_file>"#,
            r#"<delete_file path="a.txt" />"#,
            r#"<move_file path="b.txt" new_path="c.txt" />"#,
        ));
        let plan = ExecutionPlan::build(&nodes, InterruptPrecedence::Last);

        assert_eq!(
            summary(&plan),
            vec!["create_file:b.txt:-", "delete_file:a.txt:-", "move_file:b.txt:-"]
        );
    }

    #[test]
    fn test_last_interrupt_wins_by_default() {
        let nodes = tree("<ask> Which color? </ask><finish>Done.</finish>");
        let plan = ExecutionPlan::build(&nodes, InterruptPrecedence::Last);

        assert_eq!(
            plan.interrupt,
            Some(Interrupt {
                kind: InterruptKind::Finish,
                value: "Done.".to_string()
            })
        );
    }

    #[test]
    fn test_first_interrupt_precedence() {
        let nodes = tree("<ask> Which color? </ask><finish>Done.</finish>");
        let plan = ExecutionPlan::build(&nodes, InterruptPrecedence::First);

        assert_eq!(
            plan.interrupt,
            Some(Interrupt {
                kind: InterruptKind::Ask,
                value: "Which color?".to_string()
            })
        );
    }

    #[test]
    fn test_nested_tags_not_classified() {
        let nodes = tree("<thinking>maybe <finish>done</finish> and <list_files /></thinking>");
        let plan = ExecutionPlan::build(&nodes, InterruptPrecedence::Last);

        assert!(plan.is_empty());
    }

    #[test]
    fn test_unknown_and_text_ignored() {
        let nodes = tree("Sure thing.\n<frobnicate x=\"1\" />\n<plan>steps</plan>");
        let plan = ExecutionPlan::build(&nodes, InterruptPrecedence::Last);

        assert!(plan.is_empty());
    }
}
