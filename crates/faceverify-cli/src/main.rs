use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use faceverify_core::{CompareOptions, FaceComparer, OnnxComparer};

#[derive(Parser)]
#[command(name = "faceverify", about = "FaceVerify offline face comparison")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare the faces in two images and print the raw report
    Compare {
        img1: PathBuf,
        img2: PathBuf,
        /// Directory holding det_10g.onnx and w600k_r50.onnx
        #[arg(long)]
        model_dir: Option<PathBuf>,
        /// Maximum cosine distance reported as the same person
        #[arg(long, default_value_t = 0.68)]
        threshold: f32,
        /// Fail instead of using the whole image when no face is found
        #[arg(long)]
        enforce_detection: bool,
    },
    /// Show where the model files are expected and whether they exist
    Models {
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compare {
            img1,
            img2,
            model_dir,
            threshold,
            enforce_detection,
        } => {
            let model_dir = model_dir.unwrap_or_else(faceverify_core::default_model_dir);
            let comparer = OnnxComparer::new(model_dir);
            let options = CompareOptions {
                enforce_detection,
                distance_threshold: threshold,
                ..CompareOptions::default()
            };
            tracing::debug!(img1 = %img1.display(), img2 = %img2.display(), "comparing");
            let report = comparer.compare(&img1, &img2, &options).with_context(|| {
                format!("failed to compare {} and {}", img1.display(), img2.display())
            })?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Models { model_dir } => {
            let model_dir = model_dir.unwrap_or_else(faceverify_core::default_model_dir);
            let comparer = OnnxComparer::new(model_dir);
            for (role, path) in [
                ("detector", comparer.scrfd_model_path()),
                ("recognizer", comparer.arcface_model_path()),
            ] {
                let state = if path.exists() { "ok" } else { "missing" };
                println!("{role:<10}  {state:<7}  {}", path.display());
            }
        }
    }

    Ok(())
}
