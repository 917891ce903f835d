use serde_json::Value;

/// Terminal payload: the stream has logically ended, no text carried.
pub const DONE_SENTINEL: &str = "[DONE]";

const DATA_PREFIX: &str = "data:";

/// Delta fields probed on a structured payload, in priority order.
const DELTA_FIELDS: [&str; 4] = ["delta", "text", "content", "message"];

/// Extract the concatenated text delta from one blank-line-delimited frame.
///
/// Per line: comments (leading `:`) are dropped, a `data:` prefix plus at most
/// one following space is stripped, the `[DONE]` sentinel is ignored. The
/// remaining payload is tried as JSON first; anything that fails to parse is
/// taken verbatim so no text is ever silently lost.
pub fn extract_deltas(frame: &str) -> String {
    let mut deltas = String::new();

    for line in frame.lines() {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with(':') {
            continue;
        }

        let mut payload = line;
        if let Some(stripped) = payload.strip_prefix(DATA_PREFIX) {
            payload = stripped.strip_prefix(' ').unwrap_or(stripped);
        }
        if payload.is_empty() || payload == DONE_SENTINEL {
            continue;
        }

        match serde_json::from_str::<Value>(payload) {
            Ok(value) => {
                if let Some(delta) = delta_from_value(&value) {
                    deltas.push_str(delta);
                }
            }
            // Not JSON at all: the raw payload is the delta.
            Err(_) => deltas.push_str(payload),
        }
    }

    deltas
}

fn delta_from_value(value: &Value) -> Option<&str> {
    if let Value::String(s) = value {
        return non_empty(s);
    }

    for field in DELTA_FIELDS {
        if let Some(Value::String(s)) = value.get(field) {
            if let Some(s) = non_empty(s) {
                return Some(s);
            }
        }
    }

    // OpenAI-style choice envelopes, delta before message.
    let choice = value.get("choices")?.get(0)?;
    if let Some(Value::String(s)) = choice.get("delta").and_then(|d| d.get("content")) {
        if let Some(s) = non_empty(s) {
            return Some(s);
        }
    }
    if let Some(Value::String(s)) = choice.get("message").and_then(|m| m.get("content")) {
        if let Some(s) = non_empty(s) {
            return Some(s);
        }
    }

    None
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
