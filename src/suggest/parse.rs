//! Interpretation of raw provider output.
//!
//! The provider is asked for a bare JSON array but regularly wraps it in
//! markdown, adds prose, or emits JSON5-ish syntax. Output is sanitized once
//! and then handed to each [`ResponseParser`] in order until one succeeds.

use super::types::Suggestion;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no JSON array or object found in payload")]
    NoStructuredData,
    #[error("payload contained no suggestions")]
    Empty,
    #[error("none of the {0} records matched the suggestion shape")]
    NoValidRecords(usize),
}

pub trait ResponseParser: Send + Sync {
    fn name(&self) -> &'static str;
    fn parse(&self, payload: &str) -> Result<Vec<Suggestion>, ParseError>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StrictPayload {
    List(Vec<Suggestion>),
    Wrapped { suggestions: Vec<Suggestion> },
}

/// Plain `serde_json` over the whole payload. Every record must be valid.
pub struct StrictJsonParser;

impl ResponseParser for StrictJsonParser {
    fn name(&self) -> &'static str {
        "strict"
    }

    fn parse(&self, payload: &str) -> Result<Vec<Suggestion>, ParseError> {
        let suggestions = match serde_json::from_str::<StrictPayload>(payload.trim())? {
            StrictPayload::List(list) => list,
            StrictPayload::Wrapped { suggestions } => suggestions,
        };
        if suggestions.is_empty() {
            return Err(ParseError::Empty);
        }
        Ok(suggestions)
    }
}

/// Accepts comments, trailing commas, single-quoted strings, bare keys and
/// surrounding prose. Records that do not fit the suggestion shape are
/// dropped as long as at least one survives.
pub struct TolerantJsonParser;

impl ResponseParser for TolerantJsonParser {
    fn name(&self) -> &'static str {
        "tolerant"
    }

    fn parse(&self, payload: &str) -> Result<Vec<Suggestion>, ParseError> {
        let normalized = normalize_relaxed_json(payload);

        // Prose may hold bracketed text of its own, so each balanced
        // fragment is tried until one yields suggestions.
        let mut last_error = ParseError::NoStructuredData;
        let mut from = 0;
        while let Some((start, end)) = next_json_fragment(&normalized, from) {
            match suggestions_from_fragment(&normalized[start..=end]) {
                Ok(suggestions) => return Ok(suggestions),
                Err(e) => last_error = e,
            }
            from = end + 1;
        }
        Err(last_error)
    }
}

fn suggestions_from_fragment(fragment: &str) -> Result<Vec<Suggestion>, ParseError> {
    let value: Value = serde_json::from_str(fragment)?;

    let records = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("suggestions") {
            Some(Value::Array(items)) => items,
            Some(_) => return Err(ParseError::NoStructuredData),
            None => vec![Value::Object(obj)],
        },
        _ => return Err(ParseError::NoStructuredData),
    };
    if records.is_empty() {
        return Err(ParseError::Empty);
    }

    let total = records.len();
    let suggestions: Vec<Suggestion> = records
        .into_iter()
        .filter_map(|record| serde_json::from_value(record).ok())
        .collect();

    if suggestions.is_empty() {
        return Err(ParseError::NoValidRecords(total));
    }
    if suggestions.len() < total {
        tracing::debug!(
            kept = suggestions.len(),
            dropped = total - suggestions.len(),
            "Dropped malformed suggestion records"
        );
    }
    Ok(suggestions)
}

/// Sanitizes `raw` and tries the strict parser, then the tolerant one.
pub fn parse_provider_output(raw: &str) -> Result<Vec<Suggestion>, ParseError> {
    let parsers: [&dyn ResponseParser; 2] = [&StrictJsonParser, &TolerantJsonParser];
    let sanitized = sanitize_payload(raw);

    let mut last_error = ParseError::NoStructuredData;
    for parser in parsers {
        match parser.parse(&sanitized) {
            Ok(suggestions) => {
                tracing::debug!(parser = parser.name(), count = suggestions.len(), "Parsed provider output");
                return Ok(suggestions);
            }
            Err(e) => {
                tracing::debug!(parser = parser.name(), error = %e, "Parser rejected provider output");
                last_error = e;
            }
        }
    }
    Err(last_error)
}

/// Removes markdown code fences and emphasis markers.
///
/// Bold markers (`**`) are removed everywhere. A lone `*` is only removed
/// outside string literals and never when it belongs to a `/* */` comment.
pub fn sanitize_payload(raw: &str) -> String {
    let chars: Vec<char> = raw.trim().chars().collect();
    let mut out = String::with_capacity(chars.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '`' && chars.get(i + 1) == Some(&'`') && chars.get(i + 2) == Some(&'`') {
            i += 3;
            // language tag, e.g. ```json
            while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                i += 1;
            }
            continue;
        }

        if c == '*' && chars.get(i + 1) == Some(&'*') {
            i += 2;
            continue;
        }

        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '*' => {
                let prev = out.chars().last();
                let next = chars.get(i + 1).copied();
                if prev == Some('/') || next == Some('/') {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
        i += 1;
    }

    out.trim().to_string()
}

/// Rewrites relaxed JSON into strict JSON.
///
/// Text before the first `[` or `{` is prose and is copied untouched.
fn normalize_relaxed_json(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(chars.len());
    let mut i = chars
        .iter()
        .position(|&c| c == '[' || c == '{')
        .unwrap_or(chars.len());
    out.extend(&chars[..i]);

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' => {
                let end = scan_string(&chars, i, '"');
                out.extend(&chars[i..end]);
                i = end;
            }
            '\u{201C}' | '\u{201D}' if opens_value(&out) => {
                i = requote(&chars, i, &['\u{201C}', '\u{201D}'], &mut out);
            }
            '\'' if opens_value(&out) => {
                i = requote(&chars, i, &['\''], &mut out);
            }
            '\u{2018}' if opens_value(&out) => {
                i = requote(&chars, i, &['\u{2019}'], &mut out);
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
            }
            ']' | '}' => {
                let trimmed_len = out.trim_end().len();
                out.truncate(trimmed_len);
                if out.ends_with(',') {
                    out.pop();
                }
                out.push(c);
                i += 1;
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                let mut k = i;
                while k < chars.len() && chars[k].is_whitespace() {
                    k += 1;
                }
                if chars.get(k) == Some(&':') {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else {
                    out.push_str(&ident);
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    out
}

/// Whether a string literal may start here, so apostrophes in prose are
/// left alone.
fn opens_value(out: &str) -> bool {
    matches!(
        out.trim_end().chars().last(),
        None | Some('[') | Some('{') | Some(',') | Some(':')
    )
}

/// Index one past the closing `quote` of the string starting at `start`,
/// or the input length if the string is unterminated.
fn scan_string(chars: &[char], start: usize, quote: char) -> usize {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}

/// Writes the string literal opening at `start` as a double-quoted JSON
/// string, ending at the first unescaped `closers` char. Returns the index
/// just past it.
fn requote(chars: &[char], start: usize, closers: &[char], out: &mut String) -> usize {
    out.push('"');
    let mut j = start + 1;
    while j < chars.len() {
        match chars[j] {
            c if closers.contains(&c) => {
                out.push('"');
                return j + 1;
            }
            '\\' => {
                match chars.get(j + 1) {
                    Some(next) if closers.contains(next) => out.push(*next),
                    Some(next) => {
                        out.push('\\');
                        out.push(*next);
                    }
                    None => {}
                }
                j += 2;
                continue;
            }
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
        j += 1;
    }
    out.push('"');
    chars.len()
}

/// Byte range of the first balanced array or object opening at or after
/// `from`. Brackets inside string literals do not count.
fn next_json_fragment(text: &str, from: usize) -> Option<(usize, usize)> {
    let start = from + text[from..].find(|c: char| c == '[' || c == '{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((start, start + offset));
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
    use crate::detector::Parameter;

    const VALID: &str = r#"[{"stationName":"S1","area":"A","parameter":"Temperature","value":32,"threshold":30,"suggestion":"Open shaded rest areas."}]"#;

    #[test]
    fn test_strict_parses_clean_array() {
        let parsed = StrictJsonParser.parse(VALID).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].parameter, Parameter::Temperature);
        assert_eq!(parsed[0].value, 32.0);
    }

    #[test]
    fn test_strict_accepts_wrapped_object() {
        let payload = format!(r#"{{"suggestions": {}}}"#, VALID);
        assert_eq!(StrictJsonParser.parse(&payload).unwrap().len(), 1);
    }

    #[test]
    fn test_strict_rejects_trailing_comma() {
        let payload = VALID.replace("}]", "},]");
        assert!(StrictJsonParser.parse(&payload).is_err());
    }

    #[test]
    fn test_strict_rejects_empty_array() {
        assert!(matches!(StrictJsonParser.parse("[]"), Err(ParseError::Empty)));
    }

    #[test]
    fn test_tolerant_handles_relaxed_syntax() {
        let payload = r#"
            // advice follows
            [
              {
                stationName: 'North Gate',
                area: "Harbour",
                parameter: "Noise", /* loud */
                value: 91.5,
                threshold: 85,
                suggestion: 'Limit truck access after 10pm, it\'s a residential block.',
              },
            ]
        "#;
        let parsed = TolerantJsonParser.parse(payload).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].station_name, "North Gate");
        assert_eq!(parsed[0].parameter, Parameter::Noise);
        assert!(parsed[0].suggestion.contains("it's"));
    }

    #[test]
    fn test_tolerant_skips_surrounding_prose() {
        let payload = format!("Here are my recommendations:\n{}\nStay safe!", VALID);
        assert_eq!(TolerantJsonParser.parse(&payload).unwrap().len(), 1);
    }

    #[test]
    fn test_tolerant_ignores_apostrophes_in_prose() {
        let payload = format!("Here's what I'd do: {}", VALID.replace("}]", "},]"));
        assert_eq!(TolerantJsonParser.parse(&payload).unwrap().len(), 1);
    }

    #[test]
    fn test_tolerant_keeps_curly_quotes_inside_strings() {
        let raw = r#"[{"stationName":"S1","area":"A","parameter":"Noise","value":91,"threshold":85,"suggestion":"Post “quiet hours” signs."},]"#;
        let parsed = parse_provider_output(raw).unwrap();
        assert_eq!(parsed[0].suggestion, "Post “quiet hours” signs.");
    }

    #[test]
    fn test_tolerant_accepts_curly_quoted_keys_and_values() {
        let payload = "[{“stationName”: “S1”, “area”: “A”, “parameter”: “Temperature”, \
                       “value”: 32, “threshold”: 30, “suggestion”: ‘Add “cool rooms”.’}]";
        let parsed = TolerantJsonParser.parse(payload).unwrap();
        assert_eq!(parsed[0].station_name, "S1");
        assert_eq!(parsed[0].suggestion, "Add “cool rooms”.");
    }

    #[test]
    fn test_tolerant_leaves_urls_in_leading_prose_alone() {
        let payload = format!("Per https://who.int guidance: {}", VALID);
        assert_eq!(TolerantJsonParser.parse(&payload).unwrap().len(), 1);
        assert_eq!(parse_provider_output(&payload).unwrap()[0].station_name, "S1");
    }

    #[test]
    fn test_tolerant_ignores_brackets_in_trailing_prose() {
        let payload = format!("{}\nSee guideline [1].", VALID);
        let parsed = TolerantJsonParser.parse(&payload).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].suggestion, "Open shaded rest areas.");
    }

    #[test]
    fn test_tolerant_skips_bracketed_prose_before_the_array() {
        let payload = format!("Based on [WHO 2021] limits:\n{}", VALID);
        assert_eq!(TolerantJsonParser.parse(&payload).unwrap().len(), 1);
    }

    #[test]
    fn test_fragment_scan_ignores_brackets_inside_strings() {
        let text = r#"[{"suggestion":"Close gate ] at night"}] trailing ]"#;
        let (start, end) = next_json_fragment(text, 0).unwrap();
        assert_eq!(&text[start..=end], r#"[{"suggestion":"Close gate ] at night"}]"#);
    }

    #[test]
    fn test_tolerant_drops_invalid_records() {
        let payload = r#"[
            {"stationName":"S1","area":"A","parameter":"Temperature","value":32,"threshold":30,"suggestion":"x"},
            {"stationName":"S2","area":"A","parameter":"Humidity","value":99,"threshold":80,"suggestion":"y"}
        ]"#;
        let parsed = TolerantJsonParser.parse(payload).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].station_name, "S1");
    }

    #[test]
    fn test_tolerant_fails_when_nothing_is_valid() {
        let payload = r#"[{"foo": 1}]"#;
        assert!(matches!(
            TolerantJsonParser.parse(payload),
            Err(ParseError::NoValidRecords(1))
        ));
    }

    #[test]
    fn test_sanitize_strips_fences_and_bold() {
        let raw = format!("```json\n**{}**\n```", VALID);
        assert_eq!(sanitize_payload(&raw), VALID);
    }

    #[test]
    fn test_sanitize_keeps_comment_delimiters() {
        let raw = "[/* note */ 1]";
        assert_eq!(sanitize_payload(raw), raw);
    }

    #[test]
    fn test_parse_provider_output_rejects_plain_text() {
        assert!(parse_provider_output("not json").is_err());
    }

    #[test]
    fn test_parse_provider_output_falls_through_to_tolerant() {
        let raw = format!("```json\n{}\n```", VALID.replace("}]", "},]"));
        let parsed = parse_provider_output(&raw).unwrap();
        assert_eq!(parsed[0].station_name, "S1");
    }
}
