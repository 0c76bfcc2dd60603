use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use contextwizard_core::{EventPayload, LlmBackend, ReviewPipeline};
use contextwizard_server::config::Config;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Level;

/// ContextWizard: classify and answer pull request review events
#[derive(Parser, Debug)]
#[command(name = "contextwizard")]
#[command(about = "Run the ContextWizard review pipeline locally", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full pipeline on an event payload and print the comment
    Analyze(PayloadArgs),
    /// Classify an event payload and print the result as JSON
    Classify(PayloadArgs),
    /// List expired pending comments held by a running server
    Expired(ExpiredArgs),
}

#[derive(Parser, Debug)]
struct PayloadArgs {
    /// Path to a JSON event payload
    payload: PathBuf,
}

#[derive(Parser, Debug)]
struct ExpiredArgs {
    /// Base URL of the ContextWizard server
    #[arg(long, default_value = "http://localhost:10000")]
    server: String,
}

#[derive(Debug, Deserialize)]
struct ExpiredResponse {
    expired_comments: Vec<Value>,
}

fn load_payload(path: &Path) -> Result<EventPayload> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read payload file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse event payload in {}", path.display()))
}

fn build_pipeline() -> Result<ReviewPipeline> {
    let config = Config::from_env().context("Failed to load configuration from environment")?;
    if config.provider.api_key.is_none() {
        return Err(anyhow!(
            "{} environment variable is required",
            config.provider.provider.api_key_var()
        ));
    }
    let backend = LlmBackend::connect(&config.provider, None)?;
    Ok(ReviewPipeline::new(config.pipeline, backend))
}

fn expired_url(server: &str) -> String {
    format!("{}/pending-comments/expired/list", server.trim_end_matches('/'))
}

async fn run_analyze(args: PayloadArgs) -> Result<()> {
    let payload = load_payload(&args.payload)?;
    let pipeline = build_pipeline()?;

    let comment = pipeline.analyze(&payload).await;
    if comment.is_empty() {
        eprintln!("No comment produced for this event.");
    } else {
        println!("{}", comment);
    }
    Ok(())
}

async fn run_classify(args: PayloadArgs) -> Result<()> {
    let payload = load_payload(&args.payload)?;
    let pipeline = build_pipeline()?;

    let classification = pipeline.classifier().classify(&payload).await?;
    println!("{}", serde_json::to_string_pretty(&classification)?);
    Ok(())
}

async fn run_expired(args: ExpiredArgs) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .context("Failed to create HTTP client")?;

    let response = client
        .get(expired_url(&args.server))
        .send()
        .await
        .context("Failed to send request to ContextWizard server")?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .context("Failed to read error response")?;
        return Err(anyhow!("Server error: {} - {}", status, error_text));
    }

    let expired: ExpiredResponse = response
        .json()
        .await
        .context("Failed to parse expired comments response")?;

    if expired.expired_comments.is_empty() {
        println!("No expired comments.");
        return Ok(());
    }
    for comment in &expired.expired_comments {
        println!("{}", serde_json::to_string(comment)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Analyze(args) => run_analyze(args).await,
        Commands::Classify(args) => run_classify(args).await,
        Commands::Expired(args) => run_expired(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextwizard_core::EventKind;
    use std::io::Write;

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["contextwizard", "classify", "event.json"]).unwrap();
        match cli.command {
            Commands::Classify(args) => assert_eq!(args.payload, PathBuf::from("event.json")),
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = Cli::try_parse_from(["contextwizard", "expired"]).unwrap();
        match cli.command {
            Commands::Expired(args) => assert_eq!(args.server, "http://localhost:10000"),
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(Cli::try_parse_from(["contextwizard", "analyze"]).is_err());
    }

    #[test]
    fn test_expired_url_strips_trailing_slash() {
        assert_eq!(
            expired_url("http://wizard.example/"),
            "http://wizard.example/pending-comments/expired/list"
        );
        assert_eq!(
            expired_url("http://localhost:10000"),
            "http://localhost:10000/pending-comments/expired/list"
        );
    }

    #[test]
    fn test_load_payload() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"kind":"issue_comment","pr_number":3,"repo_full_name":"acme/widgets","comment_body":"Looks great"}}"#
        )
        .unwrap();

        let payload = load_payload(file.path()).unwrap();
        assert_eq!(payload.kind, EventKind::IssueComment);
        assert_eq!(payload.pr_number, 3);
        assert_eq!(payload.original_text(), "Looks great");
    }

    #[test]
    fn test_load_payload_reports_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"kind":"review"}}"#).unwrap();

        let err = load_payload(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse event payload"));
    }
}
