//! Prompt construction for interaction evaluation.

use crate::character::{
    Character, FAVORABILITY_MAX, FAVORABILITY_MIN, SUGGESTED_DELTA_MAX, SUGGESTED_DELTA_MIN,
};
use serde_json::{json, Value};

/// Build the full instruction for evaluating `user_input` against `character`.
///
/// The output depends only on its inputs.
pub fn build_prompt(character: &Character, user_input: &str) -> String {
    let mut prompt = String::new();

    prompt.push_str(include_str!("prompts/role.txt"));

    prompt.push_str("\n## Person\n");
    prompt.push_str(&format!("- Name: {}\n", character.name));
    prompt.push_str(&format!(
        "- Relationship: {}\n",
        or_placeholder(&character.relationship_type, "unspecified")
    ));
    prompt.push_str(&format!("- Personality: {}\n", character.personality));
    prompt.push_str(&format!(
        "- Background: {}\n",
        or_placeholder(&character.description, "none")
    ));
    prompt.push_str(&format!(
        "- Current favorability: {} (scale {FAVORABILITY_MIN} to {FAVORABILITY_MAX})\n",
        character.favorability
    ));
    prompt.push_str(&format!("- Current status: {}\n", character.status));

    prompt.push_str("\n## Interaction\n");
    prompt.push_str(&format!("\"{user_input}\"\n\n"));

    prompt.push_str(
        &include_str!("prompts/task.txt")
            .replace("{delta_min}", &SUGGESTED_DELTA_MIN.to_string())
            .replace("{delta_max}", &SUGGESTED_DELTA_MAX.to_string()),
    );

    prompt
}

/// JSON schema of the structured object the model must return.
pub fn verdict_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "favorabilityChange": { "type": "number" },
            "newStatus": { "type": "string" },
            "characterResponse": { "type": "string" },
            "reasoning": { "type": "string" }
        },
        "required": ["favorabilityChange", "newStatus", "characterResponse", "reasoning"]
    })
}

fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.trim().is_empty() {
        placeholder
    } else {
        value
    }
}
