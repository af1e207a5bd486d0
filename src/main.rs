use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use eui::args::{Args, Command};
use eui::config::PipelineConfig;
use eui::error::StageFailure;
use eui::pipeline::{Components, Pipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match PipelineConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Could not load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let llm_stage = args.command.first_llm_stage();
    let components = match Components::for_llm_stage(&config, llm_stage) {
        Ok(components) => components,
        Err(failure) => {
            error!("{}", failure);
            std::process::exit(1);
        }
    };
    let pipeline = Pipeline::new(config, components);

    if let Err(failure) = run(&pipeline, args.command).await {
        error!("{}", failure);
        error!("Re-run `eui {}` once the cause is fixed", failure.stage);
        std::process::exit(1);
    }

    info!("Process complete.");
    Ok(())
}

async fn run(pipeline: &Pipeline, command: Command) -> Result<(), StageFailure> {
    match command {
        Command::GenerateScript { topic, output } => {
            pipeline.generate_script(&topic, &output).await?;
        }
        Command::GenerateManimCode { script, output } => {
            pipeline.generate_code(&script, &output).await?;
        }
        Command::GenerateAudio { script, output_dir } => {
            pipeline.generate_audio(&script, &output_dir).await?;
        }
        Command::RenderVideo { code, media_dir } => {
            pipeline.render_video(&code, &media_dir).await?;
        }
        Command::CreateFinalVideo {
            script,
            audio_input_dir,
            manim_input_dir,
            output,
        } => {
            let report = pipeline
                .create_final_video(&script, &audio_input_dir, &manim_input_dir, &output)
                .await?;
            if !report.missing.is_empty() {
                info!("Scenes left out: {:?}", report.missing_ordinals());
            }
        }
        Command::All { topic, output_dir } => {
            pipeline.run_all(&topic, &output_dir).await?;
        }
    }
    Ok(())
}
