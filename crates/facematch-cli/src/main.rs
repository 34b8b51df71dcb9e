use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facematch_core::{default_model_dir, load_detector, rank_candidates, DetectorBackend};
use std::path::PathBuf;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8000";

#[derive(Parser)]
#[command(name = "facematch", about = "Face verification client and diagnostics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask the daemon whether two image URLs show the same person
    Verify {
        /// URL of the identity-document image
        id_url: String,
        /// URL of the reference image
        ref_url: String,
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Show daemon status
    Status {
        #[arg(long, default_value = DEFAULT_SERVER)]
        server: String,
    },
    /// Run a face detector on a local file (bypasses the daemon)
    Detect {
        file: PathBuf,
        /// Detector backend (seeta or scrfd)
        #[arg(short, long, default_value_t = DetectorBackend::default(), value_parser = parse_backend)]
        backend: DetectorBackend,
        /// Directory holding the model files
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Verify { id_url, ref_url, server } => {
            let response = reqwest::Client::new()
                .post(endpoint(&server, "/verify"))
                .json(&serde_json::json!({ "id_url": id_url, "ref_url": ref_url }))
                .send()
                .await
                .with_context(|| format!("facematchd not reachable at {server}"))?;
            let status = response.status();
            println!("{}", render_body(&response.text().await?));
            if !status.is_success() {
                bail!("verification request failed with {status}");
            }
        }
        Commands::Status { server } => {
            let body: serde_json::Value = reqwest::get(endpoint(&server, "/"))
                .await
                .with_context(|| format!("facematchd not reachable at {server}"))?
                .error_for_status()?
                .json()
                .await?;
            println!("facematchd: {}", body["message"].as_str().unwrap_or("unknown"));
        }
        Commands::Detect { file, backend, model_dir } => {
            let model_dir = model_dir.unwrap_or_else(default_model_dir);
            let mut detector = load_detector(backend, &model_dir)?;
            let gray = image::open(&file)
                .with_context(|| format!("failed to open {}", file.display()))?
                .to_luma8();

            let mut faces = detector.detect(&gray)?;
            rank_candidates(&mut faces);
            tracing::info!(backend = %backend, count = faces.len(), "detection complete");
            println!("{}", serde_json::to_string_pretty(&faces)?);
        }
    }

    Ok(())
}

fn parse_backend(s: &str) -> Result<DetectorBackend, String> {
    s.parse().map_err(|e: facematch_core::DetectorError| e.to_string())
}

/// Pretty-print JSON bodies; anything else (e.g. plain-text rejections) verbatim.
fn render_body(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|body| serde_json::to_string_pretty(&body).ok())
        .unwrap_or_else(|| text.to_string())
}

fn endpoint(server: &str, path: &str) -> String {
    format!("{}{path}", server.trim_end_matches('/'))
}
