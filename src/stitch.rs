//! Final assembly: pair `<n>.mp3` with `<n>.mp4`, fit each video to its
//! narration and concatenate the clips in ordinal order.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, info_span, warn, Instrument};

use crate::audio::audio_path;
use crate::config::StitchConfig;
use crate::error::{EuiError, Result};
use crate::media::MediaTool;
use crate::render::video_path;
use crate::script::Script;

/// Outcome of a stitch run. Missing scenes are gaps, not errors.
#[derive(Debug, Default)]
pub struct StitchReport {
    pub included: Vec<u32>,
    pub missing: Vec<(u32, String)>,
    pub output: Option<PathBuf>,
    pub duration: f64,
}

impl StitchReport {
    pub fn missing_ordinals(&self) -> Vec<u32> {
        self.missing.iter().map(|(n, _)| *n).collect()
    }
}

pub struct Stitcher<'a> {
    media: &'a dyn MediaTool,
    max_total_seconds: Option<f64>,
}

impl<'a> Stitcher<'a> {
    pub fn new(media: &'a dyn MediaTool, config: &StitchConfig) -> Self {
        Self {
            media,
            max_total_seconds: config.max_total_seconds.filter(|s| *s > 0.0),
        }
    }

    pub async fn create(&self, script: &Script, audio_dir: &Path, video_dir: &Path, output: &Path) -> Result<StitchReport> {
        let mut report = StitchReport::default();
        if script.is_empty() {
            warn!("Script has no scenes; no final video produced");
            return Ok(report);
        }

        let work = tempfile::Builder::new().prefix("eui_stitch_").tempdir()?;
        let mut clips = Vec::new();
        let mut total = 0.0;

        for scene in script.scenes() {
            let n = scene.ordinal;
            let span = info_span!("scene", n);
            match self.compose(n, audio_dir, video_dir, work.path()).instrument(span).await {
                Ok((clip, seconds)) => {
                    clips.push(clip);
                    total += seconds;
                    report.included.push(n);
                }
                Err(reason) => {
                    warn!("Skipping scene {}: {}", n, reason);
                    report.missing.push((n, reason));
                }
            }
        }

        if clips.is_empty() {
            return Err(EuiError::Assembly(format!(
                "none of the {} scene(s) has both audio and video",
                script.len()
            )));
        }
        if !report.missing.is_empty() {
            warn!("Final video leaves out scene(s) {:?}", report.missing_ordinals());
        }

        let joined = work.path().join("joined.mp4");
        self.media.concat(&clips, &joined).await.map_err(|e| {
            error!("Concatenation failed: {}", e);
            EuiError::Assembly(e.to_string())
        })?;

        let (final_clip, duration) = self.fit_length(&joined, total, work.path()).await;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| EuiError::at(parent, e))?;
        }
        fs::copy(&final_clip, output).map_err(|e| EuiError::at(output, e))?;
        info!(
            "Final video written to {} ({} scene(s), {:.1}s)",
            output.display(),
            report.included.len(),
            duration
        );

        report.output = Some(output.to_path_buf());
        report.duration = duration;
        Ok(report)
    }

    /// Build the clip for one scene. Returns its path and length, or the
    /// reason it cannot be included.
    async fn compose(&self, n: u32, audio_dir: &Path, video_dir: &Path, work: &Path) -> std::result::Result<(PathBuf, f64), String> {
        let audio = audio_path(audio_dir, n);
        let video = video_path(video_dir, n);
        match (audio.exists(), video.exists()) {
            (false, false) => return Err("no audio and no video".to_string()),
            (false, true) => return Err(format!("no audio at {}", audio.display())),
            (true, false) => return Err(format!("no video at {}", video.display())),
            (true, true) => {}
        }

        let audio_seconds = self.media.probe_duration(&audio).await.map_err(|e| e.to_string())?;
        let video_seconds = self.media.probe_duration(&video).await.map_err(|e| e.to_string())?;
        if audio_seconds <= 0.0 || video_seconds <= 0.0 {
            return Err(format!(
                "unusable durations (audio {audio_seconds:.2}s, video {video_seconds:.2}s)"
            ));
        }

        let speed = video_seconds / audio_seconds;
        info!(
            "Scene {}: video {:.2}s, audio {:.2}s, speed factor {:.3}",
            n, video_seconds, audio_seconds, speed
        );
        let clip = work.join(format!("clip_{n}.mp4"));
        self.media
            .compose_clip(&video, &audio, speed, &clip)
            .await
            .map_err(|e| format!("could not compose clip: {e}"))?;
        Ok((clip, audio_seconds))
    }

    /// Speed the joined video up when it runs past the configured ceiling.
    /// Falls back to the joined video if that fails.
    async fn fit_length(&self, joined: &Path, total: f64, work: &Path) -> (PathBuf, f64) {
        let Some(limit) = self.max_total_seconds else {
            return (joined.to_path_buf(), total);
        };
        if total <= limit {
            return (joined.to_path_buf(), total);
        }

        let factor = total / limit;
        info!("Video runs {:.1}s (limit {:.1}s); speeding up by {:.3}", total, limit, factor);
        let faster = work.join("final_fast.mp4");
        match self.media.speed_up(joined, factor, &faster).await {
            Ok(()) => (faster, limit),
            Err(e) => {
                warn!("Speed-up failed, keeping original pace: {}", e);
                (joined.to_path_buf(), total)
            }
        }
    }
}
