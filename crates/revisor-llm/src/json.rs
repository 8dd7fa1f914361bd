use std::sync::LazyLock;

use regex::Regex;

use revisor_types::RevisorError;

/// A ```json (or bare ```) fenced block holding one object.
static FENCED_OBJECT: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```"));

/// Pull the JSON object out of a model reply.
///
/// Accepts a bare object, an object inside a ```json fenced block, or an
/// object surrounded by prose (first `{` to last `}`).
pub fn extract_json_object(text: &str, source_name: &str) -> Result<serde_json::Value, RevisorError> {
    let malformed = |message: String| RevisorError::MalformedOutput {
        source_name: source_name.to_string(),
        message,
    };

    let fence = FENCED_OBJECT.as_ref().map_err(|e| malformed(e.to_string()))?;
    let candidate = match fence.captures(text).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => {
            let start = text.find('{');
            let end = text.rfind('}');
            match (start, end) {
                (Some(s), Some(e)) if s < e => &text[s..=e],
                _ => return Err(malformed("no JSON object found".into())),
            }
        }
    };

    let value: serde_json::Value =
        serde_json::from_str(candidate).map_err(|e| malformed(e.to_string()))?;
    if !value.is_object() {
        return Err(malformed("top-level value is not an object".into()));
    }
    Ok(value)
}
