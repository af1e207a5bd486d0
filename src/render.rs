//! Renders each validated code block with Manim and files the result under
//! the scene's ordinal.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};
use walkdir::WalkDir;

use crate::code_doc::{parse_document, CodeBlock};
use crate::config::RenderConfig;
use crate::error::{EuiError, Result};
use crate::pipeline::StageSummary;
use crate::process::run_tool;

static SCENE_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"class\s+([A-Za-z0-9_]+)\s*\((?:Scene|MovingCameraScene|ZoomedScene|ThreeDScene)\)\s*:")
        .expect("valid regex")
});

/// Name of the Scene subclass defined in `code`.
pub fn find_scene_name(code: &str) -> Option<&str> {
    SCENE_CLASS.captures(code).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// Path of the rendered clip for a scene: `<dir>/<n>.mp4`.
pub fn video_path(dir: &Path, ordinal: u32) -> PathBuf {
    dir.join(format!("{ordinal}.mp4"))
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("could not start renderer: {0}")]
    Spawn(std::io::Error),

    #[error("renderer exited with {status}")]
    Failed { status: String, output: String },

    #[error("renderer succeeded but produced no {0}.mp4")]
    MissingOutput(String),
}

#[async_trait]
pub trait SceneRenderer: Send + Sync {
    /// Render class `scene_name` from `source`, using `work_dir` for the
    /// tool's own output tree. Returns the produced video file.
    async fn render(&self, source: &Path, scene_name: &str, work_dir: &Path) -> std::result::Result<PathBuf, RenderError>;
}

pub struct ManimRenderer {
    program: String,
    extra_args: Vec<String>,
}

impl ManimRenderer {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            program: config.manim_program.clone(),
            extra_args: config.extra_args.clone(),
        }
    }
}

/// Manim nests output as `videos/<file>/<quality>/<Class>.mp4`; search for it.
fn find_output(root: &Path, scene_name: &str) -> Option<PathBuf> {
    let wanted = format!("{scene_name}.mp4");
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        // Partial movie files share the class name's directory, not its file name.
        .find(|e| e.file_name().to_string_lossy() == wanted)
        .map(|e| e.into_path())
}

#[async_trait]
impl SceneRenderer for ManimRenderer {
    async fn render(&self, source: &Path, scene_name: &str, work_dir: &Path) -> std::result::Result<PathBuf, RenderError> {
        let media_dir = work_dir.join("media");
        let mut args = vec![
            "render".to_string(),
            source.display().to_string(),
            scene_name.to_string(),
            "--media_dir".to_string(),
            media_dir.display().to_string(),
        ];
        args.extend(self.extra_args.iter().cloned());

        let out = run_tool(&self.program, &args, Some(work_dir), None)
            .await
            .map_err(RenderError::Spawn)?;
        if !out.success {
            return Err(RenderError::Failed {
                status: out.status_text(),
                output: out.combined(),
            });
        }
        find_output(&media_dir, scene_name).ok_or_else(|| RenderError::MissingOutput(scene_name.to_string()))
    }
}

/// Appends render failures to a Markdown log next to the media directory.
struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    fn reset(path: PathBuf) -> Self {
        if let Err(e) = fs::write(&path, "# Manim Render Errors Log\n\n") {
            warn!("Could not initialise {}: {}", path.display(), e);
        }
        Self { path }
    }

    fn record(&self, ordinal: u32, message: &str, detail: &str, code: &str) {
        let entry = format!(
            "### Scene {ordinal}\n\n**Error:** {message}\n\n```python\n{code}\n```\n\n```\n{detail}\n```\n\n---\n\n"
        );
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(entry.as_bytes()));
        if let Err(e) = written {
            warn!("Could not write to {}: {}", self.path.display(), e);
        }
    }
}

pub struct Renderer<'a> {
    renderer: &'a dyn SceneRenderer,
}

impl<'a> Renderer<'a> {
    pub fn new(renderer: &'a dyn SceneRenderer) -> Self {
        Self { renderer }
    }

    /// Render every validated block of the code document at `code_path`
    /// into `media_dir/<n>.mp4`.
    pub async fn render_document(&self, code_path: &Path, media_dir: &Path) -> Result<StageSummary> {
        let text = fs::read_to_string(code_path).map_err(|e| EuiError::at(code_path, e))?;
        let blocks = parse_document(&text)
            .map_err(|e| EuiError::MalformedCode(format!("{}: {}", code_path.display(), e)))?;
        self.render_blocks(&blocks, media_dir).await
    }

    pub async fn render_blocks(&self, blocks: &[CodeBlock], media_dir: &Path) -> Result<StageSummary> {
        fs::create_dir_all(media_dir).map_err(|e| EuiError::at(media_dir, e))?;
        let log_dir = media_dir.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let log = ErrorLog::reset(log_dir.join("render_errors.md"));

        let work = tempfile::Builder::new().prefix("eui_render_").tempdir()?;
        info!("Rendering {} code block(s); work dir {}", blocks.len(), work.path().display());

        let mut summary = StageSummary::default();
        for block in blocks {
            let target = video_path(media_dir, block.ordinal);
            if target.exists() {
                fs::remove_file(&target).map_err(|e| EuiError::at(&target, e))?;
            }

            if !block.is_renderable() {
                warn!("Scene {} is marked {}; not rendering", block.ordinal, block.status);
                summary.skip(block.ordinal, format!("code block marked {}", block.status));
                continue;
            }

            let span = info_span!("scene", n = block.ordinal);
            match self.render_one(block, work.path(), &target).instrument(span).await {
                Ok(()) => summary.succeeded.push(block.ordinal),
                Err((message, detail)) => {
                    error!("Scene {} failed to render: {}", block.ordinal, message);
                    log.record(block.ordinal, &message, &detail, &block.body);
                    summary.skip(block.ordinal, message);
                }
            }
        }
        Ok(summary)
    }

    async fn render_one(&self, block: &CodeBlock, work: &Path, target: &Path) -> std::result::Result<(), (String, String)> {
        let code = block.body.trim();
        let scene_name = find_scene_name(code)
            .ok_or_else(|| ("could not determine Scene class name".to_string(), String::new()))?;
        info!("Rendering scene {} ({})", block.ordinal, scene_name);

        let scene_dir = work.join(format!("scene_{}", block.ordinal));
        let source = scene_dir.join(format!("scene_{}_{}.py", block.ordinal, scene_name));
        fs::create_dir_all(&scene_dir)
            .and_then(|_| fs::write(&source, code))
            .map_err(|e| (format!("could not write {}: {}", source.display(), e), String::new()))?;

        let produced = self
            .renderer
            .render(&source, scene_name, &scene_dir)
            .await
            .map_err(|e| {
                let detail = match &e {
                    RenderError::Failed { output, .. } => output.clone(),
                    _ => String::new(),
                };
                (e.to_string(), detail)
            })?;

        fs::copy(&produced, target)
            .map_err(|e| (format!("could not copy {} to {}: {}", produced.display(), target.display(), e), String::new()))?;
        info!("Scene {} rendered to {}", block.ordinal, target.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::code_doc::{render_document, BlockStatus};

    /// Writes a fake video under the work dir, or fails for class names
    /// starting with `Bad`.
    struct FakeRenderer {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SceneRenderer for FakeRenderer {
        async fn render(&self, source: &Path, scene_name: &str, work_dir: &Path) -> std::result::Result<PathBuf, RenderError> {
            self.calls.lock().unwrap().push(scene_name.to_string());
            assert!(source.exists());
            if scene_name.starts_with("Bad") {
                return Err(RenderError::Failed {
                    status: "exit code 1".into(),
                    output: "Traceback: boom".into(),
                });
            }
            let out = work_dir.join("media/videos/x/1920p60").join(format!("{scene_name}.mp4"));
            fs::create_dir_all(out.parent().unwrap()).unwrap();
            fs::write(&out, scene_name).unwrap();
            Ok(out)
        }
    }

    fn block(ordinal: u32, class: &str, status: BlockStatus) -> CodeBlock {
        CodeBlock {
            ordinal,
            status,
            attempts: 1,
            description: "d".into(),
            body: format!("from manim import *\n\nclass {class}(Scene):\n    def construct(self):\n        pass"),
            last_error: None,
        }
    }

    #[test]
    fn scene_name_detection() {
        assert_eq!(find_scene_name("class Intro(MovingCameraScene):\n"), Some("Intro"));
        assert_eq!(find_scene_name("class Helper(object):\n"), None);
    }

    #[test]
    fn nested_output_is_found() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("videos/scene_1/1920p60");
        fs::create_dir_all(nested.join("partial_movie_files/Intro")).unwrap();
        fs::write(nested.join("Intro.mp4"), b"v").unwrap();
        assert_eq!(find_output(dir.path(), "Intro"), Some(nested.join("Intro.mp4")));
        assert_eq!(find_output(dir.path(), "Other"), None);
    }

    #[tokio::test]
    async fn renders_validated_blocks_under_their_ordinals() {
        let dir = tempfile::tempdir().unwrap();
        let code_path = dir.path().join("code.md");
        let media = dir.path().join("manim_media");
        let doc = render_document(
            &[
                block(1, "First", BlockStatus::Validated),
                block(2, "Second", BlockStatus::RetryExhausted),
                block(3, "Third", BlockStatus::Validated),
                block(4, "BadFour", BlockStatus::Validated),
            ],
            3,
        );
        fs::write(&code_path, doc).unwrap();
        fs::create_dir_all(&media).unwrap();
        fs::write(media.join("2.mp4"), b"stale").unwrap();

        let fake = FakeRenderer { calls: Mutex::new(Vec::new()) };
        let summary = Renderer::new(&fake).render_document(&code_path, &media).await.unwrap();

        assert_eq!(summary.succeeded, vec![1, 3]);
        assert_eq!(summary.skipped_ordinals(), vec![2, 4]);
        assert_eq!(fs::read_to_string(media.join("1.mp4")).unwrap(), "First");
        assert_eq!(fs::read_to_string(media.join("3.mp4")).unwrap(), "Third");
        assert!(!media.join("2.mp4").exists());
        assert!(!media.join("4.mp4").exists());
        assert_eq!(*fake.calls.lock().unwrap(), vec!["First", "Third", "BadFour"]);

        let log = fs::read_to_string(dir.path().join("render_errors.md")).unwrap();
        assert!(log.contains("### Scene 4"));
        assert!(log.contains("Traceback: boom"));
    }

    #[tokio::test]
    async fn block_without_scene_class_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("media_out");
        let mut odd = block(1, "X", BlockStatus::Validated);
        odd.body = "print('no scene here')".into();

        let fake = FakeRenderer { calls: Mutex::new(Vec::new()) };
        let summary = Renderer::new(&fake).render_blocks(&[odd], &media).await.unwrap();

        assert!(summary.succeeded.is_empty());
        assert_eq!(summary.skipped_ordinals(), vec![1]);
        assert!(fake.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_document_renders_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let code_path = dir.path().join("code.md");
        fs::write(&code_path, render_document(&[], 3)).unwrap();
        let media = dir.path().join("media_out");

        let fake = FakeRenderer { calls: Mutex::new(Vec::new()) };
        let summary = Renderer::new(&fake).render_document(&code_path, &media).await.unwrap();

        assert!(summary.succeeded.is_empty());
        assert!(media.is_dir());
        assert_eq!(fs::read_dir(&media).unwrap().count(), 0);
    }
}
