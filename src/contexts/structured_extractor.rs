//! Recovery of structured (JSON) payloads from free-text model output.
//!
//! Strategies are tried in a fixed order and the first one that yields
//! parseable JSON wins:
//!
//! 1. the whole text,
//! 2. fenced blocks tagged `json` or untagged,
//! 3. top-level balanced `{...}` regions.
//!
//! When nothing parses the original text is returned as
//! [`StructuredPayload::Unparsed`]. The recovered text is always a verbatim
//! slice of the input; nothing is rewritten.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::data::StructuredPayload;

/// A ```` ``` ```` delimited region of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FencedBlock<'a> {
    /// Info string after the opening fence (`json`, `python`, or empty).
    pub info: &'a str,
    /// Block body with surrounding whitespace removed.
    pub content: &'a str,
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+.\-]*)(.*?)```").expect("valid fence regex"))
}

/// Recovers a structured payload from `text`. Pure and total.
pub fn recover(text: &str) -> StructuredPayload {
    if let Some(value) = parse_json(text) {
        return parsed(text, value);
    }

    for block in fenced_blocks(text) {
        if !(block.info.is_empty() || block.info.eq_ignore_ascii_case("json")) {
            continue;
        }
        if let Some(value) = parse_json(block.content) {
            return parsed(block.content, value);
        }
    }

    let mut pos = 0;
    while let Some(offset) = text[pos..].find('{') {
        let start = pos + offset;
        match balanced_region_at(text, start) {
            Some(region) => {
                if let Some(value) = parse_json(region) {
                    return parsed(region, value);
                }
                pos = start + region.len();
            }
            None => pos = start + 1,
        }
    }

    tracing::debug!(len = text.len(), "no structured payload recovered");
    StructuredPayload::Unparsed(text.to_string())
}

/// All fenced blocks in order of appearance.
pub fn fenced_blocks(text: &str) -> Vec<FencedBlock<'_>> {
    fence_re()
        .captures_iter(text)
        .filter_map(|caps| {
            let info = caps.get(1)?.as_str();
            let content = caps.get(2)?.as_str().trim();
            Some(FencedBlock { info, content })
        })
        .collect()
}

/// Returns the body of the first fenced block tagged with one of
/// `languages`, falling back to the first untagged block.
pub fn extract_code_block<'a>(text: &'a str, languages: &[&str]) -> Option<&'a str> {
    let blocks = fenced_blocks(text);
    blocks
        .iter()
        .find(|block| {
            languages
                .iter()
                .any(|lang| block.info.eq_ignore_ascii_case(lang))
        })
        .or_else(|| blocks.iter().find(|block| block.info.is_empty()))
        .map(|block| block.content)
}

fn parsed(raw: &str, value: Value) -> StructuredPayload {
    StructuredPayload::Parsed {
        raw: raw.to_string(),
        value,
    }
}

fn parse_json(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok()
}

/// The balanced brace region opening at byte `start`, skipping braces
/// inside JSON string literals. `None` if it never closes.
fn balanced_region_at(text: &str, start: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    debug_assert_eq!(bytes.get(start), Some(&b'{'));

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_json_is_returned_unchanged() {
        let text = "{\n  \"endpoints\": [ {\"method\": \"GET\"} ]\n}";
        let payload = recover(text);
        assert_eq!(payload.as_text(), text);
        assert_eq!(
            payload.value(),
            Some(&json!({"endpoints": [{"method": "GET"}]}))
        );
    }

    #[test]
    fn test_json_fence_content_is_returned_verbatim() {
        let text = "Here is the result:\n```json\n{\"a\": [1, 2]}\n```\nHope this helps!";
        let payload = recover(text);
        assert_eq!(payload.as_text(), "{\"a\": [1, 2]}");
        assert!(payload.is_parsed());
    }

    #[test]
    fn test_untagged_fence_is_considered() {
        let text = "```\n{\"ok\": true}\n```";
        assert_eq!(recover(text).as_text(), "{\"ok\": true}");
    }

    #[test]
    fn test_non_json_fence_is_skipped_for_json_fence() {
        let text = "```python\nprint('x')\n```\n```JSON\n{\"b\": 2}\n```";
        assert_eq!(recover(text).as_text(), "{\"b\": 2}");
    }

    #[test]
    fn test_brace_region_in_prose() {
        let text = "Sure! The schema is {\"tables\": [{\"name\": \"users\"}]} as requested.";
        let payload = recover(text);
        assert_eq!(payload.as_text(), "{\"tables\": [{\"name\": \"users\"}]}");
    }

    #[test]
    fn test_braces_inside_strings_do_not_unbalance() {
        let text = "Result: {\"pattern\": \"}{\", \"n\": 1} trailing }";
        assert_eq!(recover(text).as_text(), "{\"pattern\": \"}{\", \"n\": 1}");
    }

    #[test]
    fn test_skips_unparseable_region_and_finds_next() {
        let text = "use {curly} then {\"x\": 1}";
        assert_eq!(recover(text).as_text(), "{\"x\": 1}");
    }

    #[test]
    fn test_unclosed_brace_before_valid_region() {
        let text = "oops { and then {\"x\": 1}";
        assert_eq!(recover(text).as_text(), "{\"x\": 1}");
    }

    #[test]
    fn test_nothing_parseable_returns_original() {
        let text = "No business logic found";
        assert_eq!(
            recover(text),
            StructuredPayload::Unparsed(text.to_string())
        );
        let broken = "```json\n{\"a\": }\n```";
        assert_eq!(
            recover(broken),
            StructuredPayload::Unparsed(broken.to_string())
        );
    }

    #[test]
    fn test_recover_is_idempotent() {
        let text = "prefix ```json\n{\"k\": \"v\"}\n``` suffix";
        assert_eq!(recover(text), recover(text));
        let once = recover(text);
        assert_eq!(recover(once.as_text()), once);
    }

    #[test]
    fn test_extract_code_block_prefers_language() {
        let text = "```\nplain\n```\n```python\nimport os\n```";
        assert_eq!(extract_code_block(text, &["python", "py"]), Some("import os"));
        assert_eq!(extract_code_block("```\nplain\n```", &["python"]), Some("plain"));
        assert_eq!(extract_code_block("no fences", &["python"]), None);
    }

    #[test]
    fn test_info_string_after_spaces() {
        let text = "Fixed:\n``` python\nimport os\n```";
        assert_eq!(extract_code_block(text, &["python"]), Some("import os"));
        assert_eq!(extract_code_block("```\tpy\nx = 1\n```", &["py"]), Some("x = 1"));
        assert_eq!(
            recover("``` json\n{\"a\": 1}\n```").as_text(),
            "{\"a\": 1}"
        );
    }
}
