/// Remove a surrounding Markdown fence (```json, ```python, ```) and a stray
/// language word left on the first line.
pub fn strip_code_fence(text: &str) -> String {
    let mut s = text.trim();
    if let Some(rest) = s.strip_prefix("```") {
        // Drop the info string up to the first newline, if any.
        s = match rest.find('\n') {
            Some(idx) if !rest[..idx].contains(' ') => &rest[idx + 1..],
            _ => rest,
        };
    }
    if let Some(rest) = s.trim_end().strip_suffix("```") {
        s = rest;
    }
    let s = s.trim();
    for lang in ["python\n", "python "] {
        if s.get(..lang.len()).is_some_and(|head| head.eq_ignore_ascii_case(lang)) {
            return s[lang.len()..].trim().to_string();
        }
    }
    s.to_string()
}

/// Longest slug in bytes; keeps `<slug>_final.mp4` well under the usual
/// 255-byte file name limit.
pub const MAX_SLUG_BYTES: usize = 80;

/// File-name friendly form of a topic: `"Fourier Series - intro"` becomes
/// `"fourier_series___intro"`. Long topics are cut at `MAX_SLUG_BYTES` on a
/// char boundary.
pub fn topic_slug(topic: &str) -> String {
    let mut slug = String::new();
    for c in topic.trim().chars() {
        let c = match c {
            ' ' | '-' => '_',
            c if c.is_alphanumeric() || c == '_' => c.to_ascii_lowercase(),
            _ => '_',
        };
        if slug.len() + c.len_utf8() > MAX_SLUG_BYTES {
            break;
        }
        slug.push(c);
    }
    if slug.is_empty() { "video".to_string() } else { slug }
}

/// First `max_chars` characters on a single line, for log previews.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut short: String = flat.chars().take(max_chars).collect();
    short.push_str("...");
    short
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fence() {
        assert_eq!(strip_code_fence("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(strip_code_fence("  [1]  "), "[1]");
    }

    #[test]
    fn strips_python_fence_and_language_word() {
        let code = "```python\nfrom manim import *\n```";
        assert_eq!(strip_code_fence(code), "from manim import *");
        assert_eq!(strip_code_fence("```\npython\nx = 1\n```"), "x = 1");
    }

    #[test]
    fn slug_is_lowercase_with_underscores() {
        assert_eq!(topic_slug("Fourier Series - intro"), "fourier_series___intro");
        assert_eq!(topic_slug("   "), "video");
        assert_eq!(topic_slug("a/b"), "a_b");
    }

    #[test]
    fn long_topics_are_capped_in_bytes() {
        let ascii = topic_slug(&"why ".repeat(75));
        assert_eq!(ascii.len(), MAX_SLUG_BYTES);
        assert!(ascii.starts_with("why_why_"));

        // Three bytes per char: 26 chars fit in 80 bytes.
        let cjk = topic_slug(&"傅里叶级数".repeat(20));
        assert_eq!(cjk.chars().count(), 26);
        assert!(cjk.len() <= MAX_SLUG_BYTES);
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(preview("héllo\nworld", 20), "héllo world");
        assert_eq!(preview("héllo world", 3), "hél...");
    }
}
