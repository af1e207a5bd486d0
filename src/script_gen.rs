use std::path::Path;

use tracing::{info, warn};

use crate::error::{EuiError, Result};
use crate::llm::{TextGenerator, TextRequest};
use crate::prompt::{script_prompt, SCRIPT_SYSTEM};
use crate::script::Script;
use crate::utils::{preview, strip_code_fence};

/// Turns a topic into a validated `Script` with one LLM call.
pub struct ScriptGenerator<'a> {
    generator: &'a dyn TextGenerator,
    guidelines: String,
    max_topic_chars: usize,
}

impl<'a> ScriptGenerator<'a> {
    pub fn new(generator: &'a dyn TextGenerator, guidelines: String, max_topic_chars: usize) -> Self {
        Self {
            generator,
            guidelines,
            max_topic_chars,
        }
    }

    fn check_topic<'t>(&self, topic: &'t str) -> Result<&'t str> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(EuiError::InvalidTopic("topic is empty".to_string()));
        }
        let chars = topic.chars().count();
        if chars > self.max_topic_chars {
            return Err(EuiError::InputTooLong(format!(
                "topic has {} characters, limit is {}",
                chars, self.max_topic_chars
            )));
        }
        Ok(topic)
    }

    /// Ask the model for a script. There is no repair loop: anything that
    /// does not parse as a scene array is fatal.
    pub async fn generate(&self, topic: &str) -> Result<Script> {
        let topic = self.check_topic(topic)?;
        info!("Generating script for topic \"{}\"", preview(topic, 80));

        let request = TextRequest::new(script_prompt(topic, &self.guidelines)).with_system(SCRIPT_SYSTEM);
        let reply = self.generator.generate(&request).await?;
        let cleaned = strip_code_fence(&reply);

        let script = Script::from_json(&cleaned)?;
        if script.is_empty() {
            warn!("Model returned an empty scene list");
        } else {
            info!("Script has {} scene(s)", script.len());
        }
        Ok(script)
    }

    /// Generate and save to `output`, replacing any previous script.
    pub async fn generate_to(&self, topic: &str, output: &Path) -> Result<Script> {
        let script = self.generate(topic).await?;
        script.save(output)?;
        info!("Script saved to {}", output.display());
        Ok(script)
    }
}
