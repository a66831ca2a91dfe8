mod corpus;
mod display;
mod workspace;

use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use ndareview_ai::ModelTarget;
use ndareview_core::Acceptance;
use tracing_subscriber::EnvFilter;

use crate::workspace::{ActiveModels, Options};

#[derive(Parser)]
#[command(name = "ndareview")]
#[command(about = "Flag risky NDA clauses, propose redlines, and learn from reviewer decisions", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Data directory for documents, reviews, and feedback
    #[arg(long, env = "NDAREVIEW_DATA", default_value = "./ndareview-data", global = true)]
    data_dir: PathBuf,

    /// Review configuration (JSON)
    #[arg(long, env = "NDAREVIEW_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// ONNX sentence encoder directory for similarity and training (`onnx` feature)
    #[arg(long, env = "NDAREVIEW_ENCODER_DIR", global = true)]
    encoder_dir: Option<PathBuf>,

    /// Remote classifier endpoint, used instead of local models (`http` feature)
    #[arg(long, env = "NDAREVIEW_CLASSIFIER_URL", global = true)]
    classifier_url: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Store a document (plain text or JSON) and print its ID
    Upload { file: PathBuf },
    /// Flag clauses, propose and validate revisions, and write a redline
    Analyze { document_id: String },
    /// Record reviewer feedback and write an adjusted redline
    Feedback { document_id: String, text: String },
    /// Resolve a redline into a clean document
    Accept {
        redline_id: String,
        /// Accept only these paragraph numbers (1-based, as shown by `show`);
        /// all proposals are accepted when omitted
        #[arg(long, value_delimiter = ',', value_parser = clap::value_parser!(u64).range(1..))]
        only: Vec<u64>,
    },
    /// Write a document as text; removals as [-x-], proposals as {+x+}
    Download {
        document_id: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show a document with its review and feedback history
    Show { document_id: String },
    /// Train a model from a corpus with original/, redline/, clean/ subdirectories
    Train {
        corpus: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Make the trained model active
        #[arg(long)]
        activate: bool,
    },
    /// Make a model directory active
    LoadModel {
        dir: PathBuf,
        #[arg(long, value_enum, default_value_t = Slot::All)]
        target: Slot,
    },
    /// Feedback statistics
    Stats,
    /// Previously uploaded NDAs similar to the given text
    Similar {
        text: String,
        #[arg(short, default_value = "5")]
        k: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Slot {
    All,
    Risk,
    Validation,
    Sentiment,
}

impl From<Slot> for ModelTarget {
    fn from(slot: Slot) -> Self {
        match slot {
            Slot::All => ModelTarget::All,
            Slot::Risk => ModelTarget::Risk,
            Slot::Validation => ModelTarget::Validation,
            Slot::Sentiment => ModelTarget::Sentiment,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::debug!("ndareview v{}", env!("CARGO_PKG_VERSION"));

    let options = Options {
        data_dir: cli.data_dir,
        config: cli.config,
        encoder_dir: cli.encoder_dir,
        classifier_url: cli.classifier_url,
    };
    let service = workspace::open(&options).await?;

    match cli.command {
        Command::Upload { file } => {
            let bytes = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let id = service.upload(&bytes).await?;
            println!("{id}");
        }
        Command::Analyze { document_id } => {
            let outcome = service.analyze(&document_id).await?;
            display::print_review(&outcome);
        }
        Command::Feedback { document_id, text } => {
            let outcome = service.submit_feedback(&document_id, &text).await?;
            display::print_feedback_outcome(&outcome);
        }
        Command::Accept { redline_id, only } => {
            let acceptance = if only.is_empty() {
                Acceptance::All
            } else {
                let sources: BTreeSet<usize> = only.iter().map(|&n| (n - 1) as usize).collect();
                Acceptance::Only(sources)
            };
            let id = service.accept(&redline_id, &acceptance).await?;
            println!("{id}");
        }
        Command::Download { document_id, output } => {
            let bytes = service.download(&document_id).await?;
            match output {
                Some(path) => std::fs::write(&path, &bytes)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&bytes)?;
                    stdout.write_all(b"\n")?;
                }
            }
        }
        Command::Show { document_id } => {
            let document = service.document(&document_id).await?;
            let review = service.review(&document_id).await?;
            let history = service.history(&document_id).await?;
            display::print_document(&document, review.as_ref(), &history);
        }
        Command::Train {
            corpus,
            output,
            activate,
        } => {
            let corpus = corpus::discover(&corpus)?;
            eprintln!("  Found {} training triples", corpus.len());
            let report = service
                .train(&corpus.originals, &corpus.redlines, &corpus.cleans, &output)
                .await?;
            display::print_training(&report);
            if activate {
                activate_model(&service, &options, output, ModelTarget::All)?;
            }
        }
        Command::LoadModel { dir, target } => {
            activate_model(&service, &options, dir, target.into())?;
        }
        Command::Stats => {
            display::print_stats(&service.statistics().await?);
        }
        Command::Similar { text, k } => {
            display::print_similar(&service.similar(&text, k).await?);
        }
    }

    Ok(())
}

/// Load the model now, to fail early on a bad artifact, then record it as active.
fn activate_model(
    service: &ndareview_ai::ReviewService,
    options: &Options,
    dir: PathBuf,
    target: ModelTarget,
) -> anyhow::Result<()> {
    let dir = dir
        .canonicalize()
        .with_context(|| format!("resolving {}", dir.display()))?;
    service.load_model(&dir, target)?;
    let mut active = ActiveModels::read(&options.data_dir)?;
    active.set(target, dir.clone());
    active.write(&options.data_dir)?;
    eprintln!("  Active model ({target:?}): {}", dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_takes_one_based_paragraphs() {
        let cli = Cli::try_parse_from(["ndareview", "accept", "r1", "--only", "1,3"]).unwrap();
        match cli.command {
            Command::Accept { only, .. } => assert_eq!(only, vec![1, 3]),
            _ => panic!("expected accept"),
        }
    }

    #[test]
    fn accept_rejects_paragraph_zero() {
        assert!(Cli::try_parse_from(["ndareview", "accept", "r1", "--only", "0"]).is_err());
        assert!(Cli::try_parse_from(["ndareview", "accept", "r1", "--only", "2,0"]).is_err());
    }
}
