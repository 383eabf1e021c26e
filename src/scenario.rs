//! Scenario parsing, normalization, and prompt construction.
//!
//! The scenario stage asks the chat service for a JSON object describing the
//! twelve panels. Responses are normalized defensively: a malformed top level
//! fails the job, but individually broken entries only cost their own slot.

use serde::Deserialize;

use crate::error::StageError;
use crate::model::ScenarioPanel;

/// Every sequence has exactly this many panels.
pub const PANEL_COUNT: usize = 12;

/// Fixed style suffix appended to every synthesis prompt.
pub const STYLE_SUFFIX: &str = "american modern comics style, clean bold outlines, flat vivid colors";

/// System prompt for the scenario stage. The content-quality rules (verbatim
/// character descriptions, no repeated panel descriptions) live here rather
/// than in local checks.
pub const SCENARIO_SYSTEM_PROMPT: &str = "\
You are a cartoon scenario writer. Split the user's story into exactly 12 \
comic panels. For each panel write a description as short comma-delimited \
fragments suitable as an image generation prompt. Introduce each character \
with a concrete visual description and reuse that description verbatim in \
every panel the character appears in. Never repeat a panel description. \
Each panel may carry up to two short dialogue lines, each starting with the \
speaking character's name and a colon. Respond with a JSON object of the \
form {\"panels\": [{\"panel\": 1, \"description\": \"...\", \"text\": [\"Name: line\"]}]}.";

#[derive(Debug, Deserialize)]
struct RawPanel {
    #[serde(default)]
    panel: u32,
    #[serde(default)]
    description: String,
    #[serde(default)]
    text: Vec<String>,
}

/// Parse the raw scenario response into normalized panels.
///
/// Fails only when the top level is not an object carrying a `panels` array.
/// Entries that fail to deserialize, carry an out-of-range index, or collide
/// with an earlier entry are dropped; missing slots become placeholders.
pub fn parse_scenario(raw: &str) -> Result<Vec<ScenarioPanel>, StageError> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| StageError::ScenarioParse(format!("not valid JSON: {e}")))?;
    let panels = value
        .as_object()
        .and_then(|obj| obj.get("panels"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            StageError::ScenarioParse("expected an object with a `panels` array".into())
        })?;

    let mut entries = Vec::with_capacity(panels.len());
    for (pos, item) in panels.iter().enumerate() {
        let Ok(entry) = serde_json::from_value::<RawPanel>(item.clone()) else {
            continue;
        };
        // Entries without an explicit index fall back to their position.
        let index = if entry.panel == 0 {
            pos as u32 + 1
        } else {
            entry.panel
        };
        entries.push(ScenarioPanel {
            index,
            description: entry.description,
            dialogue: entry.text,
        });
    }

    Ok(normalize_panels(entries))
}

/// Place entries by 1-based index into exactly `PANEL_COUNT` slots.
/// Out-of-range entries are dropped, duplicates first-wins, gaps become
/// placeholders.
fn normalize_panels(entries: Vec<ScenarioPanel>) -> Vec<ScenarioPanel> {
    let mut slots: Vec<Option<ScenarioPanel>> = (0..PANEL_COUNT).map(|_| None).collect();
    for entry in entries {
        let idx = entry.index as usize;
        if idx == 0 || idx > PANEL_COUNT {
            continue;
        }
        if slots[idx - 1].is_none() {
            slots[idx - 1] = Some(entry);
        }
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            slot.unwrap_or(ScenarioPanel {
                index: i as u32 + 1,
                description: String::new(),
                dialogue: Vec::new(),
            })
        })
        .collect()
}

/// Build the user prompt for the scenario stage.
pub fn build_scenario_user_prompt(
    prompt: &str,
    language: Option<&str>,
    image_description: &str,
) -> String {
    let mut out = format!("Story: {prompt}\n\nThe main image shows: {image_description}");
    if let Some(lang) = language {
        if !lang.trim().is_empty() {
            out.push_str(&format!("\n\nWrite all dialogue in {lang}."));
        }
    }
    out
}

/// Build the synthesis prompt for one panel.
pub fn build_panel_prompt(image_description: &str, panel_description: &str) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(3);
    if !panel_description.trim().is_empty() {
        parts.push(panel_description);
    }
    if !image_description.trim().is_empty() {
        parts.push(image_description);
    }
    parts.push(STYLE_SUFFIX);
    parts.join(", ")
}

/// Flatten dialogue lines into the stored panel form.
pub fn flatten_dialogue(lines: &[String]) -> String {
    lines.join("\n")
}
