//! The Markdown code document: one section per scene, each keyed by an
//! explicit ordinal marker rather than by position in the file.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^### Animation Scene (\d+)\s*$").expect("valid regex"));
static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!-- eui:scene=(\d+) status=([a-z-]+) attempts=(\d+) -->").expect("valid regex")
});
static DESCRIPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\*\*Description:\*\* (.*)$").expect("valid regex"));
static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```([a-z]*)[ \t]*\n(.*?)\n```").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// Passed the static check.
    Validated,
    /// Still failing after the last attempt; holds the last code.
    RetryExhausted,
    /// No code was produced at all.
    Failed,
}

impl BlockStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockStatus::Validated => "validated",
            BlockStatus::RetryExhausted => "retry-exhausted",
            BlockStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlockStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validated" => Ok(BlockStatus::Validated),
            "retry-exhausted" => Ok(BlockStatus::RetryExhausted),
            "failed" => Ok(BlockStatus::Failed),
            other => Err(format!("unknown block status '{other}'")),
        }
    }
}

/// Generated animation source for one scene.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeBlock {
    pub ordinal: u32,
    pub status: BlockStatus,
    pub attempts: u32,
    pub description: String,
    /// Python source for generated blocks, the error text for `Failed`.
    pub body: String,
    /// Checker output of the last attempt, kept for `RetryExhausted`.
    pub last_error: Option<String>,
}

impl CodeBlock {
    pub fn is_renderable(&self) -> bool {
        self.status == BlockStatus::Validated
    }

    fn status_line(&self) -> String {
        match self.status {
            BlockStatus::Validated => format!(
                "Generation successful (passed static checks after {} attempt(s)).",
                self.attempts
            ),
            BlockStatus::RetryExhausted => format!(
                "Generated, but FAILED static checks after {} attempt(s).",
                self.attempts
            ),
            BlockStatus::Failed => "Generation failed.".to_string(),
        }
    }

    fn render(&self, out: &mut String) {
        out.push_str(&format!("### Animation Scene {}\n", self.ordinal));
        out.push_str(&format!(
            "<!-- eui:scene={} status={} attempts={} -->\n",
            self.ordinal, self.status, self.attempts
        ));
        out.push_str(&format!(
            "**Description:** {}\n\n",
            self.description.replace('\n', " ")
        ));
        out.push_str(&format!("**Status:** {}\n\n", self.status_line()));

        match self.status {
            BlockStatus::Validated => {
                out.push_str(&format!("```python\n{}\n```\n\n", self.body.trim_end()));
            }
            BlockStatus::RetryExhausted => {
                out.push_str("```python\n");
                out.push_str("# SCRIPT FAILED STATIC CHECKS. LAST ATTEMPT:\n\n");
                out.push_str(self.body.trim_end());
                if let Some(err) = &self.last_error {
                    out.push_str("\n\n# --- CHECKER ERRORS (last attempt) ---\n");
                    for line in err.lines() {
                        out.push_str("# ");
                        out.push_str(line);
                        out.push('\n');
                    }
                    out.push_str("# --- END CHECKER ERRORS ---");
                }
                out.push_str("\n```\n\n");
            }
            BlockStatus::Failed => {
                out.push_str(&format!("```text\n# Error: {}\n```\n\n", self.body.trim_end()));
            }
        }
    }
}

/// Render the whole document, sections in ordinal order.
pub fn render_document(blocks: &[CodeBlock], max_attempts: u32) -> String {
    let mut sorted: Vec<&CodeBlock> = blocks.iter().collect();
    sorted.sort_by_key(|b| b.ordinal);

    let mut out = String::from("# Generated Manim Code\n\n");
    out.push_str(&format!(
        "Manim scripts generated from the animation descriptions. Each script gets up to {max_attempts} \
         attempt(s) to pass static checks.\n\n"
    ));
    for block in sorted {
        block.render(&mut out);
    }
    out
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("section '{heading}' has no code block")]
    MissingFence { heading: u32 },
    #[error("section '{heading}' carries a marker for scene {marker}")]
    OrdinalMismatch { heading: u32, marker: u32 },
    #[error("scene {0} appears more than once")]
    Duplicate(u32),
    #[error("section '{heading}': {reason}")]
    BadMarker { heading: u32, reason: String },
}

/// Parse a document back into blocks keyed by heading ordinal.
///
/// Sections without a status marker (hand-written documents) are treated as
/// validated. Only the first fenced block of a section is taken as its code;
/// checker comments on retry-exhausted blocks are left in place.
pub fn parse_document(text: &str) -> Result<Vec<CodeBlock>, DocumentError> {
    let headings: Vec<(usize, usize, u32)> = HEADING
        .captures_iter(text)
        .filter_map(|c| {
            let whole = c.get(0)?;
            let n = c.get(1)?.as_str().parse().ok()?;
            Some((whole.start(), whole.end(), n))
        })
        .collect();

    let mut blocks: Vec<CodeBlock> = Vec::with_capacity(headings.len());
    for (i, &(_, body_start, heading)) in headings.iter().enumerate() {
        let body_end = headings.get(i + 1).map(|h| h.0).unwrap_or(text.len());
        let section = &text[body_start..body_end];

        if blocks.iter().any(|b| b.ordinal == heading) {
            return Err(DocumentError::Duplicate(heading));
        }

        let (status, attempts) = match MARKER.captures(section) {
            Some(c) => {
                let marker: u32 = c[1].parse().map_err(|_| DocumentError::BadMarker {
                    heading,
                    reason: "unreadable scene number".into(),
                })?;
                if marker != heading {
                    return Err(DocumentError::OrdinalMismatch { heading, marker });
                }
                let status = c[2]
                    .parse::<BlockStatus>()
                    .map_err(|reason| DocumentError::BadMarker { heading, reason })?;
                let attempts = c[3].parse().unwrap_or(0);
                (status, attempts)
            }
            None => (BlockStatus::Validated, 0),
        };

        let description = DESCRIPTION
            .captures(section)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();

        let fence = FENCE
            .captures(section)
            .ok_or(DocumentError::MissingFence { heading })?;
        let body = fence.get(2).map(|m| m.as_str().to_string()).unwrap_or_default();

        blocks.push(CodeBlock {
            ordinal: heading,
            status,
            attempts,
            description,
            body,
            last_error: None,
        });
    }
    blocks.sort_by_key(|b| b.ordinal);
    Ok(blocks)
}
