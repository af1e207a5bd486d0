//! Prompt templates for the script and code stages.

use std::fs;
use std::path::Path;

use crate::error::{EuiError, Result};

pub const DEFAULT_VIDEO_GUIDELINES: &str = include_str!("../prompts/video_guidelines.md");
pub const DEFAULT_COMMON_ERRORS: &str = include_str!("../prompts/common_errors.md");

pub const SCRIPT_SYSTEM: &str = "You are an AI assistant that generates video scripts strictly in \
JSON format according to detailed guidelines.";

pub const CODE_SYSTEM: &str = "You write complete, runnable Manim Community Edition Python scripts. \
Reply with code only, inside a single python code block.";

/// Reads an override file, or falls back to the embedded document.
pub fn load_document(path: Option<&Path>, fallback: &str) -> Result<String> {
    match path {
        Some(p) => fs::read_to_string(p).map_err(|e| EuiError::at(p, e)),
        None => Ok(fallback.to_string()),
    }
}

pub fn script_prompt(topic: &str, guidelines: &str) -> String {
    format!(
        r#"**Topic**
"{topic}"

**Guidelines for Script Generation:**
{guidelines}

**Output Format Instructions:**
- The entire output MUST be a single, valid JSON array of script items.
- Start with `[` and end with `]`.
- Each item must be a JSON object with the exact keys: "music-description", "speech", "animation-description", and "duration".
- Do NOT include any text, explanations, or markdown formatting outside of the JSON array itself.
- Write "speech" for text-to-speech: no "..." ellipses and no ALL CAPS words except acronyms.
- Make "animation-description" highly descriptive for Manim, using simple shapes and text; every scene starts by drawing a 2D grid.

**Example output**
[
  {{
    "music-description": "<replace>",
    "speech": "<replace>",
    "animation-description": "<replace>",
    "duration": "<replace>s"
  }}
]
"#
    )
}

/// Context carried into a repair attempt.
pub struct RepairContext<'a> {
    pub failed_code: &'a str,
    pub checker_output: &'a str,
    pub class_definitions: Option<&'a str>,
}

pub fn code_prompt(
    description: &str,
    common_errors: &str,
    previous_code: Option<&str>,
    repair: Option<&RepairContext<'_>>,
) -> String {
    let mut context = String::new();

    if let Some(repair) = repair {
        context.push_str(&format!(
            "The following code was generated for this animation description but failed static checking.\n\n\
             Problematic code:\n```python\n{}\n```\n\n\
             Checker output:\n```\n{}\n```\n\n",
            repair.failed_code, repair.checker_output
        ));
        if let Some(defs) = repair.class_definitions {
            context.push_str("Relevant class definitions:\n");
            context.push_str(defs);
            context.push('\n');
        }
        context.push_str(
            "Fix these errors and return the complete corrected script, not a diff.\n\n",
        );
    } else if let Some(previous) = previous_code {
        context.push_str(&format!(
            "Code of the previous scene, which this one may continue from:\n```python\n{previous}\n```\n\n"
        ));
    }

    format!(
        "Generate a complete, runnable Manim Python script for the animation description below.\n\
         The script must contain a single scene class inheriting from Scene or another Manim scene base \
         (MovingCameraScene, ZoomedScene, ThreeDScene).\n\
         Target vertical short-form video: keep animations centred and use simple shapes.\n\n\
         {context}\
         Common errors to avoid:\n{common_errors}\n\n\
         Animation description:\n{description}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_prompt_names_the_topic_and_keys() {
        let prompt = script_prompt("Prime numbers", "Keep it short.");
        assert!(prompt.contains("\"Prime numbers\""));
        assert!(prompt.contains("Keep it short."));
        assert!(prompt.contains("\"animation-description\""));
        assert!(prompt.contains("\"duration\": \"<replace>s\""));
    }

    #[test]
    fn first_attempt_uses_previous_scene() {
        let prompt = code_prompt("a circle", "ERRS", Some("class A(Scene): pass"), None);
        assert!(prompt.contains("previous scene"));
        assert!(prompt.contains("class A(Scene): pass"));
        assert!(prompt.contains("ERRS"));
        assert!(!prompt.contains("failed static checking"));
    }

    #[test]
    fn repair_attempt_carries_error_context() {
        let repair = RepairContext {
            failed_code: "bad()",
            checker_output: "NameError: bad",
            class_definitions: Some("Method: play(...)"),
        };
        let prompt = code_prompt("a circle", "ERRS", Some("prev"), Some(&repair));
        assert!(prompt.contains("bad()"));
        assert!(prompt.contains("NameError: bad"));
        assert!(prompt.contains("Method: play(...)"));
        assert!(!prompt.contains("previous scene"));
    }

    #[test]
    fn embedded_documents_are_present() {
        assert!(DEFAULT_COMMON_ERRORS.contains("from manim import *"));
        assert!(!DEFAULT_VIDEO_GUIDELINES.is_empty());
        assert_eq!(load_document(None, "x").unwrap(), "x");
    }
}
