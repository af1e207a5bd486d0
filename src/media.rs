//! ffmpeg / ffprobe operations used to assemble the final video.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::StitchConfig;
use crate::process::run_tool;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("could not start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' failed with {status}: {output}")]
    Failed {
        program: String,
        status: String,
        output: String,
    },

    #[error("could not read duration of {path}: {reason}")]
    Duration { path: String, reason: String },
}

#[async_trait]
pub trait MediaTool: Send + Sync {
    /// Container duration in seconds.
    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError>;

    /// Mux `video` with `audio`, time-stretching the video so it plays for
    /// the audio's length. `speed` is video duration / audio duration.
    async fn compose_clip(&self, video: &Path, audio: &Path, speed: f64, output: &Path) -> Result<(), MediaError>;

    /// Concatenate clips (each with one video and one audio stream) in order.
    async fn concat(&self, clips: &[PathBuf], output: &Path) -> Result<(), MediaError>;

    /// Speed up video and audio by `factor` (> 1 shortens).
    async fn speed_up(&self, input: &Path, factor: f64, output: &Path) -> Result<(), MediaError>;
}

pub struct FfmpegTool {
    ffmpeg: String,
    ffprobe: String,
    crf: u32,
}

impl FfmpegTool {
    pub fn new(config: &StitchConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg.clone(),
            ffprobe: config.ffprobe.clone(),
            crf: config.crf,
        }
    }

    async fn ffmpeg(&self, args: Vec<String>) -> Result<(), MediaError> {
        let mut full = vec!["-y".to_string(), "-loglevel".to_string(), "error".to_string()];
        full.extend(args);
        let out = run_tool(&self.ffmpeg, &full, None, None)
            .await
            .map_err(|source| MediaError::Spawn {
                program: self.ffmpeg.clone(),
                source,
            })?;
        if !out.success {
            return Err(MediaError::Failed {
                program: self.ffmpeg.clone(),
                status: out.status_text(),
                output: out.combined(),
            });
        }
        Ok(())
    }
}

/// `atempo` accepts 0.5..=2.0 per instance on older ffmpeg builds, so larger
/// factors are split into a chain.
pub fn atempo_chain(factor: f64) -> String {
    let mut remaining = factor;
    let mut parts = Vec::new();
    while remaining > 2.0 {
        parts.push("atempo=2.0".to_string());
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        parts.push("atempo=0.5".to_string());
        remaining /= 0.5;
    }
    parts.push(format!("atempo={remaining:.6}"));
    parts.join(",")
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

#[async_trait]
impl MediaTool for FfmpegTool {
    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError> {
        let args = [
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(path_arg(path)))
        .collect::<Vec<_>>();

        let out = run_tool(&self.ffprobe, &args, None, None)
            .await
            .map_err(|source| MediaError::Spawn {
                program: self.ffprobe.clone(),
                source,
            })?;
        if !out.success {
            return Err(MediaError::Duration {
                path: path_arg(path),
                reason: out.combined(),
            });
        }
        let seconds = out.stdout.trim().parse::<f64>().map_err(|e| MediaError::Duration {
            path: path_arg(path),
            reason: e.to_string(),
        })?;
        debug!("{} lasts {:.2}s", path.display(), seconds);
        Ok(seconds)
    }

    async fn compose_clip(&self, video: &Path, audio: &Path, speed: f64, output: &Path) -> Result<(), MediaError> {
        self.ffmpeg(vec![
            "-i".into(),
            path_arg(video),
            "-i".into(),
            path_arg(audio),
            "-filter:v".into(),
            format!("setpts=PTS/{speed:.6}"),
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "1:a:0".into(),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "medium".into(),
            "-crf".into(),
            self.crf.to_string(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            "192k".into(),
            "-ar".into(),
            "44100".into(),
            "-shortest".into(),
            path_arg(output),
        ])
        .await
    }

    async fn concat(&self, clips: &[PathBuf], output: &Path) -> Result<(), MediaError> {
        let mut args = Vec::new();
        let mut filter = String::new();
        for (i, clip) in clips.iter().enumerate() {
            args.push("-i".to_string());
            args.push(path_arg(clip));
            filter.push_str(&format!("[{i}:v:0][{i}:a:0]"));
        }
        filter.push_str(&format!("concat=n={}:v=1:a=1[v][a]", clips.len()));
        args.extend([
            "-filter_complex".to_string(),
            filter,
            "-map".into(),
            "[v]".into(),
            "-map".into(),
            "[a]".into(),
            "-c:v".into(),
            "libx264".into(),
            "-crf".into(),
            self.crf.to_string(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            "192k".into(),
            "-ar".into(),
            "44100".into(),
            "-ac".into(),
            "2".into(),
            path_arg(output),
        ]);
        info!("Concatenating {} clip(s) into {}", clips.len(), output.display());
        self.ffmpeg(args).await
    }

    async fn speed_up(&self, input: &Path, factor: f64, output: &Path) -> Result<(), MediaError> {
        self.ffmpeg(vec![
            "-i".into(),
            path_arg(input),
            "-filter:v".into(),
            format!("setpts=PTS/{factor:.6}"),
            "-filter:a".into(),
            atempo_chain(factor),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "medium".into(),
            "-crf".into(),
            self.crf.saturating_sub(1).to_string(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            "192k".into(),
            path_arg(output),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atempo_within_range_is_single() {
        assert_eq!(atempo_chain(1.25), "atempo=1.250000");
    }

    #[test]
    fn atempo_large_factor_is_chained() {
        assert_eq!(atempo_chain(5.0), "atempo=2.0,atempo=2.0,atempo=1.250000");
        assert_eq!(atempo_chain(0.2), "atempo=0.5,atempo=0.5,atempo=0.800000");
    }

    #[tokio::test]
    async fn missing_ffprobe_is_a_spawn_error() {
        let mut config = StitchConfig::default();
        config.ffprobe = "eui-no-such-ffprobe".into();
        let tool = FfmpegTool::new(&config);
        let err = tool.probe_duration(Path::new("x.mp4")).await.unwrap_err();
        assert!(matches!(err, MediaError::Spawn { .. }));
    }
}
