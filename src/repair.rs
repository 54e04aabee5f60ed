//! Recovery of the JSON-LD `JobPosting` block embedded in a listing page.
//!
//! The board serializes the posting's HTML description straight into the
//! JSON string, so the block routinely carries raw quotes and line breaks
//! inside `"description"`. Repair runs in three steps:
//!
//! 1. unescape HTML entities in the script text,
//! 2. escape quotes and fold line breaks inside the description span,
//! 3. drop every ASCII control character left in the payload.
//!
//! If the result still is not valid JSON (the span heuristic assumes the
//! description ends a line), a string-aware scan of the whole payload is
//! tried before giving up.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use scraper::{Html, Selector};
use thiserror::Error;
use tracing::debug;

static JSON_LD_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());

// Non-greedy up to the first `",` that ends a line. CRLF-aware.
static DESCRIPTION_SPAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?mR)("description"\s*:\s*")([\s\S]*?)(",$)"#).unwrap());

#[derive(Debug, Error)]
pub enum RepairError {
    #[error("no application/ld+json script on page")]
    MissingBlock,
    #[error("structured data still malformed after repair: {0}")]
    Unrepairable(#[source] serde_json::Error),
}

/// Extract the structured-data block from `html` and return text that parses
/// as strict JSON.
pub fn repair(html: &str) -> Result<String, RepairError> {
    let raw = extract_block(html).ok_or(RepairError::MissingBlock)?;
    let unescaped = html_escape::decode_html_entities(&raw);

    let repaired = strip_control_chars(&repair_description_span(&unescaped));
    let err = match validate(&repaired) {
        Ok(()) => return Ok(repaired),
        Err(e) => e,
    };

    debug!("Description span repair left invalid JSON ({}), rescanning strings", err);
    let rescanned = strip_control_chars(&escape_stray_quotes(&unescaped));
    validate(&rescanned).map_err(|_| RepairError::Unrepairable(err))?;
    Ok(rescanned)
}

/// Text content of the first `application/ld+json` script node.
pub fn extract_block(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    doc.select(&JSON_LD_SEL).next().map(|node| node.text().collect())
}

fn validate(text: &str) -> Result<(), serde_json::Error> {
    serde_json::from_str::<serde::de::IgnoredAny>(text).map(|_| ())
}

/// Escape quotes and fold line breaks inside every `"description": "..."`
/// span. Nothing outside the spans is touched.
pub fn repair_description_span(text: &str) -> String {
    DESCRIPTION_SPAN_RE
        .replace_all(text, |caps: &Captures| {
            format!("{}{}{}", &caps[1], escape_value(&caps[2]), &caps[3])
        })
        .into_owned()
}

/// Escape every quote not already escaped and turn each line break into a
/// single space.
fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 16);
    let mut chars = value.chars().peekable();
    let mut escaped = false;

    while let Some(c) = chars.next() {
        match c {
            '\r' | '\n' => {
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                if escaped {
                    // `\` + newline is not a JSON escape
                    out.pop();
                }
                out.push(' ');
                escaped = false;
            }
            '"' if !escaped => out.push_str("\\\""),
            '\\' => {
                out.push(c);
                escaped = !escaped;
            }
            _ => {
                out.push(c);
                escaped = false;
            }
        }
    }
    if escaped {
        // A lone trailing `\` would escape the closing quote
        out.push('\\');
    }
    out
}

/// Remove U+0000..=U+001F and U+007F.
pub fn strip_control_chars(text: &str) -> String {
    text.chars().filter(|c| !c.is_ascii_control()).collect()
}

/// String-aware pass over a whole payload. Inside a string, a quote only
/// closes it when what follows looks like JSON structure for that string's
/// role (`:` after a key; `,` `}` `]` after a value); any other quote is
/// escaped and line breaks become spaces.
pub fn escape_stray_quotes(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);
    let mut containers = Vec::new();
    let mut expect_key = false;
    let mut in_string = false;
    let mut is_key = false;
    let mut escaped = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        i += 1;

        if !in_string {
            match c {
                '"' => {
                    in_string = true;
                    is_key = expect_key;
                }
                '{' | '[' => {
                    containers.push(c);
                    expect_key = c == '{';
                }
                '}' | ']' => {
                    containers.pop();
                    expect_key = false;
                }
                ',' => expect_key = containers.last() == Some(&'{'),
                ':' => expect_key = false,
                _ => {}
            }
            out.push(c);
            continue;
        }

        if escaped {
            escaped = false;
            if c == '\n' || c == '\r' {
                out.pop();
            } else {
                out.push(c);
                continue;
            }
        }

        match c {
            '\\' => {
                out.push(c);
                escaped = true;
            }
            '"' if closes_string(&chars[i..], is_key) => {
                out.push(c);
                in_string = false;
                expect_key = false;
            }
            '"' => out.push_str("\\\""),
            '\r' if chars.get(i) == Some(&'\n') => {}
            '\r' | '\n' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

fn closes_string(rest: &[char], key: bool) -> bool {
    let mut tokens = rest.iter().filter(|c| !c.is_whitespace());
    match tokens.next() {
        None => true,
        Some(':') => key,
        Some('}') | Some(']') => !key,
        // A member or element separator must be followed by the next key or value
        Some(',') => !key && matches!(tokens.next(), None | Some('"') | Some('{') | Some('[')),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(block: &str) -> String {
        format!(
            "<html><head><script type=\"application/ld+json\">{}</script></head><body></body></html>",
            block
        )
    }

    fn parse(text: &str) -> serde_json::Value {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn missing_block() {
        let html = "<html><head><script type=\"text/javascript\">var x = 1;</script></head></html>";
        assert!(matches!(repair(html), Err(RepairError::MissingBlock)));
    }

    #[test]
    fn valid_block_passes_through() {
        let block = r#"{"title": "Rust Engineer", "description": "plain", "datePosted": "2026-10-01"}"#;
        assert_eq!(repair(&page(block)).unwrap(), block);
    }

    #[test]
    fn literal_quotes_and_newline_in_description() {
        let block = "{\n  \"title\": \"Backend\",\n  \"description\": \"Great role<br>with \"quotes\"\nand a break\",\n  \"datePosted\": \"2026-10-12\"\n}";
        let repaired = repair(&page(block)).unwrap();
        let v = parse(&repaired);
        assert_eq!(v["description"], "Great role<br>with \"quotes\" and a break");
        assert_eq!(v["title"], "Backend");
        assert!(repaired.contains(r#"with \"quotes\" and"#));
    }

    #[test]
    fn already_escaped_quotes_are_not_doubled() {
        let block = "{\n\"description\": \"say \\\"hi\\\"\nthen \"bye\"\",\n\"title\": \"x\"\n}";
        let v = parse(&repair(&page(block)).unwrap());
        assert_eq!(v["description"], "say \"hi\" then \"bye\"");
    }

    #[test]
    fn entities_are_unescaped_before_repair() {
        let block = "{\n\"title\": \"Rust &amp; Go\",\n\"description\": \"&lt;p&gt;A &quot;hands-on&quot; role&lt;/p&gt;\",\n\"x\": 1\n}";
        let v = parse(&repair(&page(block)).unwrap());
        assert_eq!(v["title"], "Rust & Go");
        assert_eq!(v["description"], "<p>A \"hands-on\" role</p>");
    }

    #[test]
    fn span_repair_leaves_other_fields_alone() {
        let text = "{\n\"title\": \"He said \"hi\"\",\n\"description\": \"a \"b\"\nc\",\n\"z\": \"q\"\n}";
        let repaired = repair_description_span(text);
        assert!(repaired.starts_with("{\n\"title\": \"He said \"hi\"\",\n"));
        assert!(repaired.ends_with(",\n\"z\": \"q\"\n}"));
        assert!(repaired.contains("\"description\": \"a \\\"b\\\" c\","));
    }

    #[test]
    fn crlf_line_endings() {
        let text = "{\r\n\"description\": \"one\r\ntwo\",\r\n\"title\": \"t\"\r\n}";
        let v = parse(&strip_control_chars(&repair_description_span(text)));
        assert_eq!(v["description"], "one two");
        assert_eq!(v["title"], "t");
    }

    #[test]
    fn control_characters_are_stripped() {
        let block = "{\"title\": \"tab\there\", \"bell\": \"\u{7}x\u{7f}\"}";
        let v = parse(&repair(&page(block)).unwrap());
        assert_eq!(v["title"], "tabhere");
        assert_eq!(v["bell"], "x");
    }

    #[test]
    fn description_not_ending_its_line_uses_string_scan() {
        // Description is last, so no `",` ever closes the span
        let block = "{\"title\": \"t\", \"description\": \"<a href=\"/apply\">Apply</a>\nnow\"}";
        let v = parse(&repair(&page(block)).unwrap());
        assert_eq!(v["description"], "<a href=\"/apply\">Apply</a> now");
        assert_eq!(v["title"], "t");
    }

    #[test]
    fn unrepairable_block() {
        let block = "{\"title\": ";
        assert!(matches!(repair(&page(block)), Err(RepairError::Unrepairable(_))));
    }

    #[test]
    fn stray_quote_scan_keeps_structure() {
        let text = r#"{"a": "x "y" z", "b": ["c", "d"], "e": {"f": "g"}}"#;
        let v = parse(&escape_stray_quotes(text));
        assert_eq!(v["a"], "x \"y\" z");
        assert_eq!(v["b"][1], "d");
        assert_eq!(v["e"]["f"], "g");
    }

    #[test]
    fn trailing_backslash_in_description() {
        let block = "{\n\"description\": \"path C:\\\",\n\"title\": \"t\"\n}";
        let v = parse(&repair(&page(block)).unwrap());
        assert_eq!(v["description"], "path C:\\");
        assert_eq!(v["title"], "t");
    }

    #[test]
    fn escaped_backslash_before_terminator_is_kept() {
        let text = "{\n\"description\": \"a \\\\\",\n\"z\": 1\n}";
        assert_eq!(repair_description_span(text), text);
    }

    #[test]
    fn colon_after_stray_quote_stays_inside_value() {
        let block = r#"{"description": "<p class="x">Say "hi": now</p>", "title": "t"}"#;
        let v = parse(&repair(&page(block)).unwrap());
        assert_eq!(v["description"], r#"<p class="x">Say "hi": now</p>"#);
        assert_eq!(v["title"], "t");
    }

    #[test]
    fn stray_quote_inside_key_is_escaped() {
        let text = r#"{"a "b": 1, "c": ["d", {"e": "f"}]}"#;
        let v = parse(&escape_stray_quotes(text));
        assert_eq!(v["a \"b"], 1);
        assert_eq!(v["c"][1]["e"], "f");
    }

    #[test]
    fn strip_control_chars_keeps_unicode() {
        assert_eq!(strip_control_chars("caf\u{e9}\n\u{0}ok"), "caf\u{e9}ok");
    }
}
