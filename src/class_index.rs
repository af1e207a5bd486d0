//! Lookup of class member listings for repair prompts.
//!
//! The reference file lists each class as
//!
//! ```text
//! Class: Axes
//!   Method: plot(self, function, ...)
//!   Property: x_axis
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

static CLASS_IN_ERROR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)class "([^"]+)""#).expect("valid regex"));

pub struct ClassIndex {
    content: String,
}

impl ClassIndex {
    pub fn new(content: String) -> Self {
        Self { content }
    }

    /// Loads the reference file; a missing file is logged and yields `None`.
    pub fn load(path: &Path) -> Option<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Some(Self::new(content)),
            Err(e) => {
                warn!("Class reference {} unavailable: {}", path.display(), e);
                None
            }
        }
    }

    /// Member listing of `class_name`, without the `Class:` line.
    pub fn definition(&self, class_name: &str) -> Option<String> {
        let pattern = format!(
            r"(?m)^Class: {}\n((?:  (?:Method|Property): .+\n?)+)",
            regex::escape(class_name)
        );
        let re = Regex::new(&pattern).ok()?;
        re.captures(&self.content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim_end().to_string())
    }

    /// Definitions for every class named in a checker report, formatted for a
    /// prompt. `None` when nothing matched.
    pub fn context_for(&self, checker_output: &str) -> Option<String> {
        let names: BTreeSet<&str> = CLASS_IN_ERROR
            .captures_iter(checker_output)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        if names.is_empty() {
            return None;
        }
        debug!("Classes named in checker output: {:?}", names);

        let parts: Vec<String> = names
            .into_iter()
            .filter_map(|name| {
                self.definition(name)
                    .map(|def| format!("Definition for class '{name}':\n```python\n{def}\n```\n"))
            })
            .collect();
        if parts.is_empty() { None } else { Some(parts.join("\n")) }
    }
}
