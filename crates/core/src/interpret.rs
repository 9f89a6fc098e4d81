//! Turn a raw engine reply into text, structured data, citations, and
//! function-call intents.

use serde::de::DeserializeOwned;
use studio_llm::provider::{ContentBlock, GroundingSource};

use crate::gateway::RawResponse;
use crate::types::{Citation, FunctionCall};

pub const PLACEHOLDER_TITLE: &str = "Localização";
pub const PLACEHOLDER_URI: &str = "#";

/// Outcome of best-effort structured parsing. Callers that only want the
/// old "empty on failure" behaviour use [`Parsed::or_default`]; callers
/// that care can tell "no results" from "could not understand the reply".
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    Value(T),
    Malformed { raw: String, error: String },
    NotRequested,
}

impl<T> Parsed<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }

    pub fn or_default(self) -> T
    where
        T: Default,
    {
        self.into_value().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interpreted<T> {
    pub text: String,
    pub structured: Parsed<T>,
    pub citations: Vec<Citation>,
    /// Passed through unexecuted.
    pub function_calls: Vec<FunctionCall>,
}

/// Interpret a reply where a JSON shape `T` was requested.
pub fn parse<T: DeserializeOwned>(raw: &RawResponse) -> Interpreted<T> {
    let structured = parse_json(&raw.content);
    if let Parsed::Malformed { error, .. } = &structured {
        tracing::debug!(error = %error, raw_preview = %preview(&raw.content, 240), "structured reply did not parse");
    }
    Interpreted {
        text: raw.content.clone(),
        structured,
        citations: citations(&raw.sources),
        function_calls: function_calls(&raw.content_blocks),
    }
}

/// Interpret a free-text reply.
pub fn parse_text(raw: &RawResponse) -> Interpreted<()> {
    Interpreted {
        text: raw.content.clone(),
        structured: Parsed::NotRequested,
        citations: citations(&raw.sources),
        function_calls: function_calls(&raw.content_blocks),
    }
}

pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Parsed<T> {
    let candidate = extract_json(raw);
    if candidate.is_empty() {
        return Parsed::Malformed { raw: raw.to_owned(), error: "reply is empty".into() };
    }
    match serde_json::from_str(candidate) {
        Ok(v) => Parsed::Value(v),
        Err(e) => Parsed::Malformed { raw: raw.to_owned(), error: e.to_string() },
    }
}

/// Strip markdown fences or surrounding prose, keeping the outermost
/// `{...}` or `[...]` span, whichever opens first.
fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();

    let unfenced = match trimmed.strip_prefix("```") {
        Some(after) => {
            // language tag runs up to the first space, newline or bracket
            let body_start = after
                .find(|c: char| c.is_whitespace() || c == '{' || c == '[')
                .unwrap_or(after.len());
            let body = &after[body_start..];
            body.rfind("```").map_or(body, |end| &body[..end]).trim()
        }
        None => trimmed,
    };

    let open = unfenced.find(['{', '[']);
    let Some(start) = open else {
        return unfenced;
    };
    let close = if unfenced.as_bytes()[start] == b'{' { '}' } else { ']' };
    match unfenced.rfind(close) {
        Some(end) if end > start => &unfenced[start..=end],
        _ => unfenced,
    }
}

pub fn citations(sources: &[GroundingSource]) -> Vec<Citation> {
    sources
        .iter()
        .map(|s| Citation {
            title: non_empty(s.title.as_deref()).unwrap_or(PLACEHOLDER_TITLE).to_owned(),
            uri: non_empty(s.uri.as_deref()).unwrap_or(PLACEHOLDER_URI).to_owned(),
        })
        .collect()
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

pub fn function_calls(blocks: &[ContentBlock]) -> Vec<FunctionCall> {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::ToolUse { id, name, input } => Some(FunctionCall {
                id: id.clone(),
                name: name.clone(),
                args: input.clone(),
            }),
            _ => None,
        })
        .collect()
}

fn preview(s: &str, max: usize) -> String {
    let mut out: String = s.chars().take(max).collect();
    if s.chars().count() > max {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AnalysisResult, ScheduleTask};
    use studio_llm::provider::StopReason;

    fn reply(text: &str) -> RawResponse {
        RawResponse {
            content: text.into(),
            content_blocks: vec![ContentBlock::Text { text: text.into() }],
            ..Default::default()
        }
    }

    #[test]
    fn malformed_list_defaults_to_empty() {
        let out: Interpreted<Vec<ScheduleTask>> = parse(&reply("Sorry, I can't plan that week."));
        assert!(out.structured.is_malformed());
        assert!(out.structured.or_default().is_empty());
    }

    #[test]
    fn fenced_json_is_extracted() {
        let text = "```json\n{\"score\": 80, \"strategicDirective\": \"Cut intros\"}\n```";
        let out: Interpreted<AnalysisResult> = parse(&reply(text));
        let v = out.structured.value().unwrap();
        assert_eq!(v.score, 80);
        assert_eq!(v.strategic_directive, "Cut intros");
    }

    #[test]
    fn single_line_fence_is_extracted() {
        let parsed: Parsed<Vec<u32>> = parse_json("```json [1,2,3] ```");
        assert_eq!(parsed, Parsed::Value(vec![1, 2, 3]));
        let parsed: Parsed<Vec<u32>> = parse_json("```[4]```");
        assert_eq!(parsed, Parsed::Value(vec![4]));
    }

    #[test]
    fn prose_around_array_is_ignored() {
        let parsed: Parsed<Vec<u32>> = parse_json("Here it is: [1, 2, 3]. Enjoy!");
        assert_eq!(parsed, Parsed::Value(vec![1, 2, 3]));
    }

    #[test]
    fn empty_reply_is_malformed() {
        let parsed: Parsed<Vec<u32>> = parse_json("   ");
        assert!(parsed.is_malformed());
    }

    #[test]
    fn citations_get_placeholders() {
        let c = citations(&[
            GroundingSource { title: Some("Lisbon".into()), uri: Some("https://x".into()) },
            GroundingSource { title: None, uri: Some("  ".into()) },
        ]);
        assert_eq!(c[0], Citation { title: "Lisbon".into(), uri: "https://x".into() });
        assert_eq!(c[1], Citation { title: PLACEHOLDER_TITLE.into(), uri: PLACEHOLDER_URI.into() });
    }

    #[test]
    fn function_calls_pass_through() {
        let raw = RawResponse {
            content: "On it.".into(),
            content_blocks: vec![
                ContentBlock::Text { text: "On it.".into() },
                ContentBlock::ToolUse {
                    id: "call_1".into(),
                    name: "create_project".into(),
                    input: serde_json::json!({"title": "Pilot"}),
                },
            ],
            stop_reason: StopReason::ToolUse,
            ..Default::default()
        };
        let out = parse_text(&raw);
        assert_eq!(out.structured, Parsed::NotRequested);
        assert_eq!(out.function_calls.len(), 1);
        assert_eq!(out.function_calls[0].args["title"], "Pilot");
    }
}
