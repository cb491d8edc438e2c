use esg_shared::AnalysisPayload;
use lazy_static::lazy_static;
use regex::Regex;

use crate::classifier::{looks_structured, parse_analysis};

lazy_static! {
    static ref LATEX_RULES: Vec<(Regex, &'static str)> = [
        (r"\\\[\s*([\s\S]+?)\s*\\\]", "$1"),
        (r"\\\(\s*([\s\S]+?)\s*\\\)", "$1"),
        (r"\$\$\s*([\s\S]+?)\s*\$\$", "$1"),
        (r"\$\s*([^$\n]+?)\s*\$", "$1"),
        (r"\\text\{([^}]+)\}", "$1"),
        (r"\\textbf\{([^}]+)\}", "**$1**"),
        (r"\\textit\{([^}]+)\}", "*$1*"),
        (r"\\begin\{[^}]+\}\s*", ""),
        (r"\\end\{[^}]+\}\s*", ""),
        (r"\\times", "×"),
        (r"\\approx", "≈"),
        (r"\\%", "%"),
        (r"\\,", " "),
        (r"\\!", ""),
        (r"_\{([^}]+)\}", "$1"),
        (r"\^\{([^}]+)\}", "$1"),
        (r"[ \t]+", " "),
        (r"\n{3,}", "\n\n"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), replacement))
    .collect();
}

/// Strip LaTeX notation models like to emit into plain readable text.
pub fn clean_latex(content: &str) -> String {
    let mut text = content.to_string();
    for (pattern, replacement) in LATEX_RULES.iter() {
        text = pattern.replace_all(&text, *replacement).into_owned();
    }
    text.trim().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section {
    Items(Vec<String>),
    /// Still streaming and nothing arrived yet.
    Thinking,
    Omitted,
}

impl Section {
    fn new(items: &[String], streaming: bool) -> Self {
        if !items.is_empty() {
            Section::Items(items.to_vec())
        } else if streaming {
            Section::Thinking
        } else {
            Section::Omitted
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Summary {
    Text(String),
    Analyzing,
    Omitted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardView {
    pub summary: Summary,
    pub positives: Section,
    pub negatives: Section,
}

impl CardView {
    pub fn new(payload: &AnalysisPayload, streaming: bool) -> Self {
        let summary = if !payload.summary.is_empty() {
            Summary::Text(payload.summary.clone())
        } else if streaming {
            Summary::Analyzing
        } else {
            Summary::Omitted
        };
        Self {
            summary,
            positives: Section::new(&payload.positives, streaming),
            negatives: Section::new(&payload.negatives, streaming),
        }
    }

    pub fn skeleton() -> Self {
        Self::new(&AnalysisPayload::default(), true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageView {
    Prose(String),
    Analysis(CardView),
}

impl MessageView {
    /// `streaming` is true only for the message whose stream is still open.
    pub fn for_content(content: &str, streaming: bool) -> Self {
        if let Some(payload) = parse_analysis(content) {
            return MessageView::Analysis(CardView::new(&payload, streaming));
        }
        if streaming && looks_structured(content) {
            return MessageView::Analysis(CardView::skeleton());
        }
        MessageView::Prose(clean_latex(content))
    }
}
