use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::Stage;

#[derive(Parser, Debug)]
#[clap(name = "eui", version, about = "Turn a topic into a narrated Manim short")]
pub struct Args {
    /// TOML configuration file; defaults apply when omitted.
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG takes precedence).
    #[clap(short, long, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate the scene script for a topic.
    GenerateScript {
        #[clap(long)]
        topic: String,

        #[clap(long, default_value = "output/script.json")]
        output: PathBuf,
    },

    /// Generate Manim code for every scene of a script.
    GenerateManimCode {
        #[clap(long, default_value = "output/script.json")]
        script: PathBuf,

        #[clap(long, default_value = "output/code.md")]
        output: PathBuf,
    },

    /// Synthesise narration for every scene of a script.
    GenerateAudio {
        #[clap(long, default_value = "output/script.json")]
        script: PathBuf,

        #[clap(long = "output_dir", default_value = "output/audio_files")]
        output_dir: PathBuf,
    },

    /// Render the code document's scenes with Manim.
    RenderVideo {
        #[clap(long, default_value = "output/code.md")]
        code: PathBuf,

        #[clap(long = "media_dir", default_value = "output/manim_media_output")]
        media_dir: PathBuf,
    },

    /// Combine rendered scenes and narration into the final video.
    CreateFinalVideo {
        #[clap(long, default_value = "output/script.json")]
        script: PathBuf,

        #[clap(long = "audio_input_dir", default_value = "output/audio_files")]
        audio_input_dir: PathBuf,

        #[clap(long = "manim_input_dir", default_value = "output/manim_media_output")]
        manim_input_dir: PathBuf,

        #[clap(long, default_value = "output/final_video.mp4")]
        output: PathBuf,
    },

    /// Run every stage in order under one directory.
    All {
        #[clap(long)]
        topic: String,

        #[clap(long = "output_dir", default_value = "output/full_pipeline_run")]
        output_dir: PathBuf,
    },
}

impl Command {
    /// The first stage of this command that calls the LLM, if any. A missing
    /// credential is reported against it.
    pub fn first_llm_stage(&self) -> Option<Stage> {
        match self {
            Command::GenerateScript { .. } | Command::All { .. } => Some(Stage::GenerateScript),
            Command::GenerateManimCode { .. } => Some(Stage::GenerateCode),
            _ => None,
        }
    }

    pub fn needs_llm(&self) -> bool {
        self.first_llm_stage().is_some()
    }
}
