//! Stage sequencing for the CLI: each stage on its own, or all five in order
//! under one run directory.

use std::future::Future;
use std::path::{Path, PathBuf};

use tracing::{error, info, info_span, warn, Instrument};

use crate::audio::AudioGenerator;
use crate::checker::{CodeChecker, SubprocessChecker};
use crate::class_index::ClassIndex;
use crate::codegen::CodeGenerator;
use crate::config::PipelineConfig;
use crate::error::{EuiError, Result, Stage, StageFailure};
use crate::llm::{GeminiClient, TextGenerator};
use crate::media::{FfmpegTool, MediaTool};
use crate::prompt::{load_document, DEFAULT_COMMON_ERRORS, DEFAULT_VIDEO_GUIDELINES};
use crate::render::{ManimRenderer, Renderer, SceneRenderer};
use crate::script::Script;
use crate::script_gen::ScriptGenerator;
use crate::stitch::{StitchReport, Stitcher};
use crate::tts::{self, SpeechSynthesizer};
use crate::utils::topic_slug;

/// Per-scene results of a partial-failure-tolerant stage.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StageSummary {
    pub succeeded: Vec<u32>,
    pub skipped: Vec<(u32, String)>,
}

impl StageSummary {
    pub fn skip(&mut self, ordinal: u32, reason: impl Into<String>) {
        self.skipped.push((ordinal, reason.into()));
    }

    pub fn skipped_ordinals(&self) -> Vec<u32> {
        self.skipped.iter().map(|(n, _)| *n).collect()
    }

    pub fn log(&self, stage: Stage) {
        info!(
            "{}: {} scene(s) succeeded, {} skipped",
            stage,
            self.succeeded.len(),
            self.skipped.len()
        );
        for (n, reason) in &self.skipped {
            warn!("{}: scene {} skipped: {}", stage, n, reason);
        }
    }
}

/// File layout of an `all` run.
#[derive(Debug, Clone)]
pub struct RunLayout {
    pub root: PathBuf,
    pub script: PathBuf,
    pub code: PathBuf,
    pub audio_dir: PathBuf,
    pub media_dir: PathBuf,
    pub final_video: PathBuf,
}

impl RunLayout {
    pub fn new(root: &Path, topic: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            script: root.join("script.json"),
            code: root.join("code.md"),
            audio_dir: root.join("audio_files"),
            media_dir: root.join("manim_media"),
            final_video: root.join(format!("{}_final.mp4", topic_slug(topic))),
        }
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub layout: RunLayout,
    pub scenes: usize,
    pub code: StageSummary,
    pub audio: StageSummary,
    pub render: StageSummary,
    pub stitch: StitchReport,
}

impl RunReport {
    pub fn log(&self) {
        info!("Pipeline finished: {} scene(s) in script", self.scenes);
        info!("  script: {}", self.layout.script.display());
        info!("  code:   {} ({} validated)", self.layout.code.display(), self.code.succeeded.len());
        info!("  audio:  {} ({} clip(s))", self.layout.audio_dir.display(), self.audio.succeeded.len());
        info!("  video:  {} ({} clip(s))", self.layout.media_dir.display(), self.render.succeeded.len());
        match &self.stitch.output {
            Some(path) => info!(
                "  final:  {} ({} scene(s), {:.1}s)",
                path.display(),
                self.stitch.included.len(),
                self.stitch.duration
            ),
            None => info!("  final:  none (empty script)"),
        }
        if !self.stitch.missing.is_empty() {
            warn!("Scenes missing from the final video: {:?}", self.stitch.missing_ordinals());
        }
    }
}

/// The external capabilities a run needs. The LLM is optional so that
/// stages without model calls work without a credential.
pub struct Components {
    pub llm: Option<Box<dyn TextGenerator>>,
    pub checker: Box<dyn CodeChecker>,
    pub synthesizer: Box<dyn SpeechSynthesizer>,
    pub renderer: Box<dyn SceneRenderer>,
    pub media: Box<dyn MediaTool>,
}

impl Components {
    /// Real tools from the configuration. With `with_llm`, a missing
    /// credential is an error here rather than at the first model call.
    pub fn from_config(config: &PipelineConfig, with_llm: bool) -> Result<Self> {
        let llm = if with_llm { Some(Self::gemini(config)?) } else { None };
        Ok(Self::with_llm(config, llm))
    }

    /// Like `from_config`, for a command whose first model call happens in
    /// `llm_stage`. A missing credential is reported against that stage.
    pub fn for_llm_stage(config: &PipelineConfig, llm_stage: Option<Stage>) -> std::result::Result<Self, StageFailure> {
        let llm = match llm_stage {
            Some(stage) => Some(Self::gemini(config).map_err(|e| StageFailure::new(stage, e))?),
            None => None,
        };
        Ok(Self::with_llm(config, llm))
    }

    fn gemini(config: &PipelineConfig) -> Result<Box<dyn TextGenerator>> {
        let key = config.api_key()?;
        Ok(Box::new(GeminiClient::new(config.llm.clone(), key)?))
    }

    fn with_llm(config: &PipelineConfig, llm: Option<Box<dyn TextGenerator>>) -> Self {
        Self {
            llm,
            checker: Box::new(SubprocessChecker::new(config.codegen.checker.clone())),
            synthesizer: tts::from_config(&config.tts),
            renderer: Box::new(ManimRenderer::new(&config.render)),
            media: Box::new(FfmpegTool::new(&config.stitch)),
        }
    }
}

async fn in_stage<T, F>(stage: Stage, work: F) -> std::result::Result<T, StageFailure>
where
    F: Future<Output = Result<T>>,
{
    let span = info_span!("stage", name = stage.command_name());
    work.instrument(span).await.map_err(|e| {
        error!("Stage {} failed: {}", stage, e);
        StageFailure::new(stage, e)
    })
}

pub struct Pipeline {
    config: PipelineConfig,
    components: Components,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, components: Components) -> Self {
        Self { config, components }
    }

    fn llm(&self) -> Result<&dyn TextGenerator> {
        self.components
            .llm
            .as_deref()
            .ok_or_else(|| EuiError::MissingApiKey(self.config.llm.api_key_env.clone()))
    }

    pub async fn generate_script(&self, topic: &str, output: &Path) -> std::result::Result<Script, StageFailure> {
        in_stage(Stage::GenerateScript, async {
            let guidelines = load_document(self.config.codegen.video_guidelines.as_deref(), DEFAULT_VIDEO_GUIDELINES)?;
            ScriptGenerator::new(self.llm()?, guidelines, self.config.llm.max_topic_chars)
                .generate_to(topic, output)
                .await
        })
        .await
    }

    pub async fn generate_code(&self, script: &Path, output: &Path) -> std::result::Result<StageSummary, StageFailure> {
        let stage = Stage::GenerateCode;
        let summary = in_stage(stage, async {
            let script = Script::load(script)?;
            let codegen = &self.config.codegen;
            let common_errors = load_document(codegen.common_errors.as_deref(), DEFAULT_COMMON_ERRORS)?;
            let class_index = codegen.class_reference.as_deref().and_then(ClassIndex::load);
            CodeGenerator::new(self.llm()?, self.components.checker.as_ref(), common_errors, codegen.max_attempts)
                .with_class_index(class_index)
                .with_retry_model(self.config.llm.retry_model.clone())
                .write_document(&script, output)
                .await
        })
        .await?;
        summary.log(stage);
        Ok(summary)
    }

    pub async fn generate_audio(&self, script: &Path, output_dir: &Path) -> std::result::Result<StageSummary, StageFailure> {
        let stage = Stage::GenerateAudio;
        let summary = in_stage(stage, async {
            let script = Script::load(script)?;
            AudioGenerator::new(self.components.synthesizer.as_ref())
                .generate(&script, output_dir)
                .await
        })
        .await?;
        summary.log(stage);
        Ok(summary)
    }

    pub async fn render_video(&self, code: &Path, media_dir: &Path) -> std::result::Result<StageSummary, StageFailure> {
        let stage = Stage::RenderVideo;
        let summary = in_stage(stage, async {
            Renderer::new(self.components.renderer.as_ref())
                .render_document(code, media_dir)
                .await
        })
        .await?;
        summary.log(stage);
        Ok(summary)
    }

    pub async fn create_final_video(
        &self,
        script: &Path,
        audio_dir: &Path,
        video_dir: &Path,
        output: &Path,
    ) -> std::result::Result<StitchReport, StageFailure> {
        in_stage(Stage::CreateFinalVideo, async {
            let script = Script::load(script)?;
            Stitcher::new(self.components.media.as_ref(), &self.config.stitch)
                .create(&script, audio_dir, video_dir, output)
                .await
        })
        .await
    }

    /// Run every stage under `output_dir`, stopping at the first fatal error.
    pub async fn run_all(&self, topic: &str, output_dir: &Path) -> std::result::Result<RunReport, StageFailure> {
        let layout = RunLayout::new(output_dir, topic);
        info!("Starting full pipeline in {}", layout.root.display());

        let script = self.generate_script(topic, &layout.script).await?;
        let code = self.generate_code(&layout.script, &layout.code).await?;
        let audio = self.generate_audio(&layout.script, &layout.audio_dir).await?;
        let render = self.render_video(&layout.code, &layout.media_dir).await?;
        let stitch = self
            .create_final_video(&layout.script, &layout.audio_dir, &layout.media_dir, &layout.final_video)
            .await?;

        let report = RunReport {
            layout,
            scenes: script.len(),
            code,
            audio,
            render,
            stitch,
        };
        report.log();
        Ok(report)
    }
}
