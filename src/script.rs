//! Scene list produced by the script stage and read by every later stage.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;

use crate::error::{EuiError, Result};

/// One segment of the target video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scene {
    /// 1-based position; the join key across every stage's file names.
    #[serde(rename = "scene_number")]
    pub ordinal: u32,
    pub speech: String,
    #[serde(rename = "animation-description")]
    pub animation_description: String,
    /// Target duration in seconds.
    pub duration: f64,
    #[serde(rename = "music-description", skip_serializing_if = "Option::is_none")]
    pub music: Option<String>,
}

/// Wire shape of a scene. `scene_number` is optional so that model output and
/// hand-written scripts without it still load positionally.
#[derive(Debug, Deserialize)]
struct RawScene {
    scene_number: Option<u32>,
    speech: String,
    #[serde(rename = "animation-description")]
    animation_description: String,
    #[serde(deserialize_with = "seconds")]
    duration: f64,
    #[serde(rename = "music-description", alias = "music", default)]
    music: Option<String>,
}

/// Accepts `5`, `5.5`, `"5"` or `"5s"`.
fn seconds<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Value {
        Number(f64),
        Text(String),
    }

    match Value::deserialize(deserializer)? {
        Value::Number(n) => Ok(n),
        Value::Text(s) => {
            let trimmed = s.trim();
            let number = trimmed
                .strip_suffix("seconds")
                .or_else(|| trimmed.strip_suffix('s'))
                .unwrap_or(trimmed)
                .trim();
            number
                .parse::<f64>()
                .map_err(|_| serde::de::Error::custom(format!("invalid duration '{s}'")))
        }
    }
}

/// Ordered, immutable sequence of scenes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    scenes: Vec<Scene>,
}

impl Script {
    /// Build a script, checking that ordinals are unique and contiguous from 1.
    pub fn new(mut scenes: Vec<Scene>) -> Result<Self> {
        let unique: BTreeSet<u32> = scenes.iter().map(|s| s.ordinal).collect();
        if unique.len() != scenes.len() {
            return Err(EuiError::MalformedScript(
                "scene numbers are not unique".to_string(),
            ));
        }
        let expected = 1..=scenes.len() as u32;
        if !unique.iter().copied().eq(expected) {
            return Err(EuiError::MalformedScript(format!(
                "scene numbers must run contiguously from 1 to {}, found {:?}",
                scenes.len(),
                unique
            )));
        }
        scenes.sort_by_key(|s| s.ordinal);
        Ok(Self { scenes })
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn ordinals(&self) -> impl Iterator<Item = u32> + '_ {
        self.scenes.iter().map(|s| s.ordinal)
    }

    /// Parse a JSON array of scene objects.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| EuiError::MalformedScript(format!("not valid JSON: {e}")))?;
        let items = value.as_array().ok_or_else(|| {
            EuiError::MalformedScript("top-level value is not a JSON array".to_string())
        })?;

        let mut scenes = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            if !item.is_object() {
                return Err(EuiError::MalformedScript(format!(
                    "item {} is not an object",
                    i + 1
                )));
            }
            let raw = RawScene::deserialize(item)
                .map_err(|e| EuiError::MalformedScript(format!("item {}: {}", i + 1, e)))?;
            scenes.push(Scene {
                ordinal: raw.scene_number.unwrap_or(i as u32 + 1),
                speech: raw.speech,
                animation_description: raw.animation_description,
                duration: raw.duration,
                music: raw.music,
            });
        }
        Script::new(scenes)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.scenes)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| EuiError::at(path, e))?;
        let script = Script::from_json(&data)?;
        info!("Loaded script with {} scenes from {}", script.len(), path.display());
        Ok(script)
    }

    /// Write the script, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| EuiError::at(parent, e))?;
        }
        fs::write(path, self.to_json()?).map_err(|e| EuiError::at(path, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(ordinal: u32, speech: &str) -> Scene {
        Scene {
            ordinal,
            speech: speech.to_string(),
            animation_description: format!("draw a grid for scene {ordinal}"),
            duration: 4.5,
            music: None,
        }
    }

    #[test]
    fn save_and_load_preserve_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("script.json");
        let mut second = scene(2, "Second.");
        second.music = Some("soft piano".into());
        let script = Script::new(vec![scene(1, "First."), second, scene(3, "Third.")]).unwrap();

        script.save(&path).unwrap();
        let loaded = Script::load(&path).unwrap();

        assert_eq!(loaded, script);
    }

    #[test]
    fn positional_ordinals_when_scene_number_is_absent() {
        let json = r#"[
            {"music-description": "upbeat", "speech": "Hi", "animation-description": "a circle", "duration": "5s"},
            {"speech": "Bye", "animation-description": "a square", "duration": 3}
        ]"#;
        let script = Script::from_json(json).unwrap();

        assert_eq!(script.ordinals().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(script.scenes()[0].duration, 5.0);
        assert_eq!(script.scenes()[0].music.as_deref(), Some("upbeat"));
        assert_eq!(script.scenes()[1].music, None);
    }

    #[test]
    fn music_alias_is_accepted() {
        let json = r#"[{"speech": "a", "animation-description": "b", "duration": 1, "music": "drums"}]"#;
        let script = Script::from_json(json).unwrap();
        assert_eq!(script.scenes()[0].music.as_deref(), Some("drums"));
    }

    #[test]
    fn explicit_scene_numbers_are_sorted() {
        let json = r#"[
            {"scene_number": 2, "speech": "b", "animation-description": "b", "duration": 1},
            {"scene_number": 1, "speech": "a", "animation-description": "a", "duration": 1}
        ]"#;
        let script = Script::from_json(json).unwrap();
        assert_eq!(script.scenes()[0].speech, "a");
    }

    #[test]
    fn gaps_and_duplicates_are_rejected() {
        let gap = Script::new(vec![scene(1, "a"), scene(3, "c")]);
        assert!(matches!(gap, Err(EuiError::MalformedScript(_))));

        let dup = Script::new(vec![scene(1, "a"), scene(1, "b")]);
        assert!(matches!(dup, Err(EuiError::MalformedScript(_))));
    }

    #[test]
    fn missing_field_is_a_schema_error() {
        let json = r#"[{"speech": "a", "duration": 1}]"#;
        let err = Script::from_json(json).unwrap_err();
        assert!(err.to_string().contains("item 1"));
        assert!(err.to_string().contains("animation-description"));
    }

    #[test]
    fn non_array_is_rejected() {
        let err = Script::from_json(r#"{"speech": "a"}"#).unwrap_err();
        assert!(matches!(err, EuiError::MalformedScript(_)));
    }

    #[test]
    fn bad_duration_text_is_rejected() {
        let json = r#"[{"speech": "a", "animation-description": "b", "duration": "soon"}]"#;
        assert!(Script::from_json(json).is_err());
    }

    #[test]
    fn empty_array_is_an_empty_script() {
        let script = Script::from_json("[]").unwrap();
        assert!(script.is_empty());
        assert_eq!(script.to_json().unwrap(), "[]");
    }
}
