//! Prompt template for sentence generation.

use super::GenerationRequest;
use serde_json::{json, Value};

/// Render the fixed prompt for `request`.
pub fn render(request: &GenerationRequest) -> String {
    format!(
        r#"You are a masterful storyteller whose prose is elegant, literary and evocative, and every word you choose carries depth and emotion.
A writer is collaborating with you on a story and has offered a single, resonant word to carry it forward.
Write exactly one new sentence that weaves this word in and continues the story seamlessly.
The atmosphere of the story is '{mood}'. Your sentence must match this mood and deepen it.
Avoid clichés and generic phrasing; aim for originality and poetic flair.

Story so far: {story}
The writer's chosen word is: '{word}'

Write only the next sentence, with no conversational text, titles or explanation.
Respond with a JSON object of the form {{"sentence": "<your sentence>"}}."#,
        mood = request.mood(),
        story = request.story_context(),
        word = request.word(),
    )
}

/// Schema the service is asked to shape its output with.
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "sentence": {
                "type": "STRING",
                "description": "The next sentence in the story."
            }
        },
        "required": ["sentence"]
    })
}
