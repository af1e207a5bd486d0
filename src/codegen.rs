//! Manim code generation with a bounded generate → check → repair loop.

use std::fs;
use std::path::Path;

use tracing::{error, info, info_span, warn, Instrument};

use crate::checker::{CheckOutcome, CodeChecker};
use crate::class_index::ClassIndex;
use crate::code_doc::{render_document, BlockStatus, CodeBlock};
use crate::error::{EuiError, Result};
use crate::llm::{TextGenerator, TextRequest};
use crate::pipeline::StageSummary;
use crate::prompt::{code_prompt, RepairContext, CODE_SYSTEM};
use crate::script::{Scene, Script};
use crate::utils::{preview, strip_code_fence};

pub struct CodeGenerator<'a> {
    generator: &'a dyn TextGenerator,
    checker: &'a dyn CodeChecker,
    common_errors: String,
    class_index: Option<ClassIndex>,
    max_attempts: u32,
    retry_model: Option<String>,
}

impl<'a> CodeGenerator<'a> {
    pub fn new(
        generator: &'a dyn TextGenerator,
        checker: &'a dyn CodeChecker,
        common_errors: String,
        max_attempts: u32,
    ) -> Self {
        Self {
            generator,
            checker,
            common_errors,
            class_index: None,
            max_attempts: max_attempts.max(1),
            retry_model: None,
        }
    }

    pub fn with_class_index(mut self, index: Option<ClassIndex>) -> Self {
        self.class_index = index;
        self
    }

    pub fn with_retry_model(mut self, model: Option<String>) -> Self {
        self.retry_model = model;
        self
    }

    /// Produce one block per scene, in ordinal order. Never fails for a
    /// single scene; failed scenes get a failure-marked block.
    pub async fn generate_blocks(&self, script: &Script) -> Vec<CodeBlock> {
        let mut blocks = Vec::with_capacity(script.len());
        let mut previous_code: Option<String> = None;

        for scene in script.scenes() {
            let span = info_span!("scene", n = scene.ordinal);
            let block = self
                .generate_scene(scene, previous_code.as_deref())
                .instrument(span)
                .await;
            // Failed scenes still pass their last attempt on as context.
            previous_code = match block.status {
                BlockStatus::Failed => None,
                _ => Some(block.body.clone()),
            };
            blocks.push(block);
        }
        blocks
    }

    /// Runs one scene from `Pending` through `Generated` to either
    /// `Validated` or `RetryExhausted`, with at most `max_attempts` calls.
    async fn generate_scene(&self, scene: &Scene, previous_code: Option<&str>) -> CodeBlock {
        let description = scene.animation_description.trim();
        if description.is_empty() {
            warn!("Scene {} has no animation description", scene.ordinal);
            return self.failed_block(scene, 0, "missing animation description".to_string());
        }
        info!("Generating code for scene {}: {}", scene.ordinal, preview(description, 70));

        // Code and checker output of the last failed attempt.
        let mut last_failure: Option<(String, String)> = None;

        for attempt in 1..=self.max_attempts {
            let class_context = last_failure
                .as_ref()
                .and_then(|(_, err)| self.class_index.as_ref()?.context_for(err));
            let repair = last_failure.as_ref().map(|(code, err)| RepairContext {
                failed_code: code,
                checker_output: err,
                class_definitions: class_context.as_deref(),
            });

            let prompt = code_prompt(description, &self.common_errors, previous_code, repair.as_ref());
            let model = if attempt > 1 { self.retry_model.clone() } else { None };
            let request = TextRequest::new(prompt).with_system(CODE_SYSTEM).with_model(model);

            let code = match self.generator.generate(&request).await {
                Ok(text) => strip_code_fence(&text),
                Err(e) => {
                    error!("Code generation call failed for scene {}: {}", scene.ordinal, e);
                    return self.failed_block(scene, attempt, format!("LLM error: {e}"));
                }
            };

            match self.checker.check(&code).await {
                CheckOutcome::Passed => {
                    info!("Scene {} passed static checks after {} attempt(s)", scene.ordinal, attempt);
                    return CodeBlock {
                        ordinal: scene.ordinal,
                        status: BlockStatus::Validated,
                        attempts: attempt,
                        description: description.to_string(),
                        body: code,
                        last_error: None,
                    };
                }
                CheckOutcome::Failed(err) => {
                    warn!(
                        "Scene {} failed static checks (attempt {}/{})",
                        scene.ordinal, attempt, self.max_attempts
                    );
                    last_failure = Some((code, err));
                }
            }
        }

        match last_failure {
            Some((code, err)) => {
                error!(
                    "Scene {} still failing after {} attempt(s); marking it failed",
                    scene.ordinal, self.max_attempts
                );
                CodeBlock {
                    ordinal: scene.ordinal,
                    status: BlockStatus::RetryExhausted,
                    attempts: self.max_attempts,
                    description: description.to_string(),
                    body: code,
                    last_error: Some(err),
                }
            }
            None => self.failed_block(scene, 0, "no attempt was made".to_string()),
        }
    }

    fn failed_block(&self, scene: &Scene, attempts: u32, reason: String) -> CodeBlock {
        CodeBlock {
            ordinal: scene.ordinal,
            status: BlockStatus::Failed,
            attempts,
            description: scene.animation_description.trim().to_string(),
            body: reason,
            last_error: None,
        }
    }

    /// Generate every block and write the Markdown document to `output`.
    pub async fn write_document(&self, script: &Script, output: &Path) -> Result<StageSummary> {
        let blocks = self.generate_blocks(script).await;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| EuiError::at(parent, e))?;
        }
        fs::write(output, render_document(&blocks, self.max_attempts))
            .map_err(|e| EuiError::at(output, e))?;
        info!("Wrote {} code section(s) to {}", blocks.len(), output.display());

        let mut summary = StageSummary::default();
        for block in &blocks {
            match block.status {
                BlockStatus::Validated => summary.succeeded.push(block.ordinal),
                BlockStatus::RetryExhausted => summary.skip(
                    block.ordinal,
                    format!("failed static checks after {} attempt(s)", block.attempts),
                ),
                BlockStatus::Failed => summary.skip(block.ordinal, block.body.clone()),
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::code_doc::parse_document;
    use crate::llm::LlmError;

    /// Replies from a queue and records every request.
    struct ScriptedGenerator {
        replies: Mutex<VecDeque<std::result::Result<String, LlmError>>>,
        requests: Mutex<Vec<TextRequest>>,
    }

    impl ScriptedGenerator {
        fn new(replies: Vec<std::result::Result<String, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, request: &TextRequest) -> std::result::Result<String, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(LlmError::EmptyResponse))
        }
    }

    /// Rejects any code containing `BROKEN`.
    struct KeywordChecker;

    #[async_trait]
    impl CodeChecker for KeywordChecker {
        async fn check(&self, code: &str) -> CheckOutcome {
            if code.contains("BROKEN") {
                CheckOutcome::Failed(r#"error: "BROKEN" is not defined for class "Axes""#.into())
            } else {
                CheckOutcome::Passed
            }
        }
    }

    fn scene(ordinal: u32, description: &str) -> Scene {
        Scene {
            ordinal,
            speech: "words".into(),
            animation_description: description.into(),
            duration: 3.0,
            music: None,
        }
    }

    fn ok(code: &str) -> std::result::Result<String, LlmError> {
        Ok(format!("```python\n{code}\n```"))
    }

    #[tokio::test]
    async fn first_try_success_is_validated() {
        let generator = ScriptedGenerator::new(vec![ok("class A(Scene): pass")]);
        let codegen = CodeGenerator::new(&generator, &KeywordChecker, "ERRS".into(), 3);
        let script = Script::new(vec![scene(1, "a dot")]).unwrap();

        let blocks = codegen.generate_blocks(&script).await;

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].status, BlockStatus::Validated);
        assert_eq!(blocks[0].attempts, 1);
        assert_eq!(blocks[0].body, "class A(Scene): pass");
    }

    #[tokio::test]
    async fn repair_prompt_carries_checker_output_and_retry_model() {
        let generator = ScriptedGenerator::new(vec![ok("BROKEN"), ok("class Fixed(Scene): pass")]);
        let index = ClassIndex::new("Class: Axes\n  Method: plot(self)\n".into());
        let codegen = CodeGenerator::new(&generator, &KeywordChecker, "ERRS".into(), 3)
            .with_class_index(Some(index))
            .with_retry_model(Some("repair-model".into()));
        let script = Script::new(vec![scene(1, "axes")]).unwrap();

        let blocks = codegen.generate_blocks(&script).await;

        assert_eq!(blocks[0].status, BlockStatus::Validated);
        assert_eq!(blocks[0].attempts, 2);
        let requests = generator.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].model, None);
        assert_eq!(requests[1].model.as_deref(), Some("repair-model"));
        assert!(requests[1].prompt.contains("is not defined"));
        assert!(requests[1].prompt.contains("Method: plot(self)"));
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let generator = ScriptedGenerator::new(vec![ok("BROKEN 1"), ok("BROKEN 2"), ok("BROKEN 3"), ok("never used")]);
        let codegen = CodeGenerator::new(&generator, &KeywordChecker, "ERRS".into(), 3);
        let script = Script::new(vec![scene(1, "axes")]).unwrap();

        let blocks = codegen.generate_blocks(&script).await;

        assert_eq!(blocks[0].status, BlockStatus::RetryExhausted);
        assert_eq!(blocks[0].attempts, 3);
        assert_eq!(blocks[0].body, "BROKEN 3");
        assert!(blocks[0].last_error.is_some());
        assert_eq!(generator.requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn one_bad_scene_does_not_block_the_rest() {
        let generator = ScriptedGenerator::new(vec![
            ok("class One(Scene): pass"),
            ok("BROKEN a"),
            ok("BROKEN b"),
            ok("BROKEN c"),
            ok("class Three(Scene): pass"),
        ]);
        let codegen = CodeGenerator::new(&generator, &KeywordChecker, "ERRS".into(), 3);
        let script = Script::new(vec![scene(1, "one"), scene(2, "two"), scene(3, "three")]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("code.md");

        let summary = codegen.write_document(&script, &output).await.unwrap();

        assert_eq!(summary.succeeded, vec![1, 3]);
        assert_eq!(summary.skipped_ordinals(), vec![2]);
        let parsed = parse_document(&fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(parsed.iter().map(|b| b.ordinal).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(parsed[1].status, BlockStatus::RetryExhausted);
    }

    #[tokio::test]
    async fn previous_scene_code_is_passed_as_context() {
        let generator = ScriptedGenerator::new(vec![ok("class One(Scene): pass"), ok("class Two(Scene): pass")]);
        let codegen = CodeGenerator::new(&generator, &KeywordChecker, "ERRS".into(), 3);
        let script = Script::new(vec![scene(1, "one"), scene(2, "two")]).unwrap();

        codegen.generate_blocks(&script).await;

        let requests = generator.requests.lock().unwrap();
        assert!(!requests[0].prompt.contains("previous scene"));
        assert!(requests[1].prompt.contains("class One(Scene): pass"));
    }

    #[tokio::test]
    async fn llm_error_and_empty_description_are_failure_marked() {
        let generator = ScriptedGenerator::new(vec![Err(LlmError::Timeout)]);
        let codegen = CodeGenerator::new(&generator, &KeywordChecker, "ERRS".into(), 3);
        let script = Script::new(vec![scene(1, "one"), scene(2, "   ")]).unwrap();

        let blocks = codegen.generate_blocks(&script).await;

        assert_eq!(blocks[0].status, BlockStatus::Failed);
        assert!(blocks[0].body.contains("timed out"));
        assert_eq!(blocks[1].status, BlockStatus::Failed);
        assert_eq!(blocks[1].body, "missing animation description");
        assert_eq!(generator.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_script_writes_an_empty_document() {
        let generator = ScriptedGenerator::new(vec![]);
        let codegen = CodeGenerator::new(&generator, &KeywordChecker, "ERRS".into(), 3);
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("code.md");

        let summary = codegen.write_document(&Script::default(), &output).await.unwrap();

        assert!(summary.succeeded.is_empty());
        assert!(parse_document(&fs::read_to_string(&output).unwrap()).unwrap().is_empty());
    }
}
