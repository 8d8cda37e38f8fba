//! Parsing of model output into a [`Verdict`].

use super::{EvaluateError, Verdict};
use serde_json::{Map, Value};

/// Parse the model's text into a verdict.
///
/// Accepts a bare JSON object, one wrapped in a Markdown code fence, or one
/// surrounded by stray prose. `favorabilityChange`, `newStatus` and
/// `characterResponse` are required; `reasoning` is optional.
pub fn parse_verdict(text: &str) -> Result<Verdict, EvaluateError> {
    let body = strip_code_fence(text.trim());
    if body.is_empty() {
        return Err(EvaluateError::EmptyResponse(
            "model returned no text".to_string(),
        ));
    }

    let value = parse_json_object(body)?;
    let Value::Object(fields) = value else {
        return Err(EvaluateError::MalformedResponse(
            "expected a JSON object".to_string(),
        ));
    };

    Ok(Verdict {
        favorability_change: required_delta(&fields)?,
        new_status: required_text(&fields, "newStatus")?,
        character_response: required_text(&fields, "characterResponse")?,
        reasoning: fields
            .get("reasoning")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string),
    })
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = match rest.find("```") {
        Some(end) => &rest[..end],
        None => rest,
    };

    // Drop the info string ("json") before the payload.
    let body = match body.split_once('\n') {
        Some((info, payload)) if !info.contains('{') => payload,
        _ => {
            let trimmed = body.trim_start();
            trimmed.strip_prefix("json").unwrap_or(trimmed)
        }
    };
    body.trim()
}

fn parse_json_object(body: &str) -> Result<Value, EvaluateError> {
    match serde_json::from_str(body) {
        Ok(value) => Ok(value),
        Err(first) => {
            let embedded = match (body.find('{'), body.rfind('}')) {
                (Some(start), Some(end)) if start < end => &body[start..=end],
                _ => {
                    return Err(EvaluateError::MalformedResponse(format!(
                        "invalid JSON: {first}"
                    )))
                }
            };
            serde_json::from_str(embedded)
                .map_err(|_| EvaluateError::MalformedResponse(format!("invalid JSON: {first}")))
        }
    }
}

fn required_delta(fields: &Map<String, Value>) -> Result<i32, EvaluateError> {
    let value = fields
        .get("favorabilityChange")
        .ok_or_else(|| missing("favorabilityChange"))?;

    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match number {
        // `as` saturates out-of-range floats.
        Some(n) if n.is_finite() => Ok(n.round() as i32),
        _ => Err(EvaluateError::MalformedResponse(format!(
            "favorabilityChange is not a number: {value}"
        ))),
    }
}

fn required_text(fields: &Map<String, Value>, key: &str) -> Result<String, EvaluateError> {
    match fields.get(key) {
        None | Some(Value::Null) => Err(missing(key)),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::String(_)) => Err(EvaluateError::MalformedResponse(format!(
            "field `{key}` is empty"
        ))),
        Some(other) => Err(EvaluateError::MalformedResponse(format!(
            "field `{key}` is not a string: {other}"
        ))),
    }
}

fn missing(key: &str) -> EvaluateError {
    EvaluateError::MalformedResponse(format!("missing field `{key}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"{
        "favorabilityChange": 12,
        "newStatus": "Warming up",
        "characterResponse": "She clearly valued the gesture.",
        "reasoning": "Remembering small details signals care."
    }"#;

    #[test]
    fn test_parse_full_verdict() {
        let verdict = parse_verdict(FULL).unwrap();
        assert_eq!(verdict.favorability_change, 12);
        assert_eq!(verdict.new_status, "Warming up");
        assert_eq!(verdict.character_response, "She clearly valued the gesture.");
        assert_eq!(
            verdict.reasoning.as_deref(),
            Some("Remembering small details signals care.")
        );
    }

    #[test]
    fn test_parse_fenced_verdict() {
        let text = format!("```json\n{FULL}\n```");
        assert_eq!(parse_verdict(&text).unwrap().favorability_change, 12);
    }

    #[test]
    fn test_parse_single_line_fenced_verdict() {
        let text =
            r#"```{"favorabilityChange": 3, "newStatus": "ok", "characterResponse": "fine"}```"#;
        let verdict = parse_verdict(text).unwrap();
        assert_eq!(verdict.favorability_change, 3);
        assert_eq!(verdict.new_status, "ok");

        let tagged =
            r#"```json {"favorabilityChange": -1, "newStatus": "s", "characterResponse": "r"}```"#;
        assert_eq!(parse_verdict(tagged).unwrap().favorability_change, -1);
    }

    #[test]
    fn test_parse_verdict_with_surrounding_prose() {
        let text = format!("Here is my analysis:\n{FULL}\nHope this helps.");
        assert_eq!(parse_verdict(&text).unwrap().new_status, "Warming up");
    }

    #[test]
    fn test_missing_new_status_is_malformed() {
        let err = parse_verdict(
            r#"{"favorabilityChange": 3, "characterResponse": "ok", "reasoning": "r"}"#,
        )
        .unwrap_err();
        match err {
            EvaluateError::MalformedResponse(msg) => assert!(msg.contains("newStatus")),
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_delta_is_malformed() {
        let err = parse_verdict(r#"{"newStatus": "s", "characterResponse": "r"}"#).unwrap_err();
        assert!(
            matches!(err, EvaluateError::MalformedResponse(ref m) if m.contains("favorabilityChange"))
        );
    }

    #[test]
    fn test_empty_status_is_malformed() {
        let err = parse_verdict(
            r#"{"favorabilityChange": 1, "newStatus": "  ", "characterResponse": "r"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, EvaluateError::MalformedResponse(_)));
    }

    #[test]
    fn test_reasoning_is_optional() {
        let verdict =
            parse_verdict(r#"{"favorabilityChange": -4, "newStatus": "s", "characterResponse": "r", "reasoning": ""}"#)
                .unwrap();
        assert_eq!(verdict.favorability_change, -4);
        assert_eq!(verdict.reasoning, None);
    }

    #[test]
    fn test_fractional_and_string_deltas() {
        let verdict =
            parse_verdict(r#"{"favorabilityChange": 7.6, "newStatus": "s", "characterResponse": "r"}"#)
                .unwrap();
        assert_eq!(verdict.favorability_change, 8);

        let verdict =
            parse_verdict(r#"{"favorabilityChange": "+5", "newStatus": "s", "characterResponse": "r"}"#)
                .unwrap();
        assert_eq!(verdict.favorability_change, 5);
    }

    #[test]
    fn test_delta_is_not_clamped() {
        let verdict =
            parse_verdict(r#"{"favorabilityChange": 250, "newStatus": "s", "characterResponse": "r"}"#)
                .unwrap();
        assert_eq!(verdict.favorability_change, 250);
    }

    #[test]
    fn test_empty_text_is_empty_response() {
        assert!(matches!(parse_verdict("   \n"), Err(EvaluateError::EmptyResponse(_))));
        assert!(matches!(parse_verdict("```json\n```"), Err(EvaluateError::EmptyResponse(_))));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            parse_verdict("I think it went well!"),
            Err(EvaluateError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_verdict("[1, 2, 3]"),
            Err(EvaluateError::MalformedResponse(_))
        ));
    }
}
