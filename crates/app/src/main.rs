use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use regex::Regex;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tender_rag_core::{ChatHistory, EvaluationReport, RagConfig, TenderAssistant};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "tender-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract every configured field from a tender PDF.
    Extract {
        /// Tender PDF to summarize.
        #[arg(long)]
        pdf: PathBuf,
        /// Ground-truth entry holding reference answers. Defaults to the PDF
        /// file name when evaluating.
        #[arg(long)]
        ground_truth_key: Option<String>,
        /// Score the extraction with the LLM judge.
        #[arg(long, default_value_t = false)]
        evaluate: bool,
        /// JSON file the evaluation records are appended to.
        #[arg(long, requires = "evaluate")]
        report: Option<PathBuf>,
    },
    /// Ask a question about an indexed document; the answer is streamed.
    Chat {
        /// Document name, the PDF file stem.
        #[arg(long)]
        document: String,
        #[arg(long)]
        question: String,
        /// Previous messages, alternating question and answer.
        #[arg(long, num_args = 1..)]
        history: Vec<String>,
    },
    /// Retrieve with one prompt and answer another over that context.
    Validate {
        #[arg(long)]
        document: String,
        #[arg(long)]
        retrieval_prompt: String,
        #[arg(long)]
        answer_prompt: String,
    },
    /// Build missing indices for every PDF in a folder.
    Index {
        /// Folder that contains PDFs recursively. Defaults to PDF_DIR.
        #[arg(long)]
        folder: Option<PathBuf>,
    },
    /// Delete the persisted index of a document.
    DeleteIndex {
        #[arg(long)]
        document: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = RagConfig::from_env().context("loading configuration")?;
    let assistant = TenderAssistant::from_config(&config);

    info!(
        version = app_version,
        provider = config.provider.name(),
        chat_model = %config.chat_model,
        started_at = %Utc::now().to_rfc3339(),
        "tender-rag boot"
    );

    match cli.command {
        Command::Extract {
            pdf,
            ground_truth_key,
            evaluate,
            report,
        } => {
            let key = match ground_truth_key {
                Some(key) => Some(key),
                None if evaluate => Some(file_name(&pdf)?),
                None => None,
            };

            let run = assistant.extract(&pdf, key.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&run.result)?);

            if evaluate {
                let evaluation = assistant.evaluate(&run.samples).await?;
                println!("{}", evaluation.render_table());

                if let Some(path) = report {
                    let appended = append_records(&path, &file_name(&pdf)?, &evaluation)?;
                    println!("{appended} evaluation records appended to {}", path.display());
                }
            }
        }
        Command::Chat {
            document,
            question,
            history,
        } => {
            let history = ChatHistory::from_alternating(&history);
            let mut answer = assistant.chat(&document, &question, &history).await?;

            let mut stdout = tokio::io::stdout();
            while let Some(delta) = answer.next().await {
                stdout.write_all(delta?.as_bytes()).await?;
                stdout.flush().await?;
            }
            stdout.write_all(b"\n").await?;
        }
        Command::Validate {
            document,
            retrieval_prompt,
            answer_prompt,
        } => {
            let answer = assistant
                .validate(&document, &retrieval_prompt, &answer_prompt)
                .await?;
            println!("{answer}");
        }
        Command::Index { folder } => {
            let folder = folder.unwrap_or_else(|| config.pdf_dir.clone());
            let report = assistant.index_folder(&folder).await?;

            for skipped in &report.skipped_files {
                warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
            }
            for (name, outcome) in &report.indexed {
                println!("{name}: {outcome:?}");
            }
            println!(
                "{} documents indexed, {} skipped at {}",
                report.indexed.len(),
                report.skipped_files.len(),
                Utc::now().to_rfc3339()
            );
        }
        Command::DeleteIndex { document } => {
            assistant.invalidate_index(&document).await?;
            println!("index deleted: {document}");
        }
    }

    Ok(())
}

fn file_name(path: &Path) -> anyhow::Result<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .with_context(|| format!("path has no file name: {}", path.display()))
}

/// First run of digits in a file name such as `document_799.pdf`.
fn document_number(file_name: &str) -> anyhow::Result<Option<String>> {
    let digits = Regex::new(r"\d+")?;
    Ok(digits.find(file_name).map(|found| found.as_str().to_string()))
}

/// Appends the report rows to the JSON array in `path`, creating the file
/// when missing. Each record is tagged with the document number.
fn append_records(path: &Path, file_name: &str, report: &EvaluationReport) -> anyhow::Result<usize> {
    let mut records = if path.is_file() {
        let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        match serde_json::from_str::<Value>(&raw)? {
            Value::Array(records) => records,
            _ => bail!("{} does not hold a JSON array", path.display()),
        }
    } else {
        Vec::new()
    };

    let number = document_number(file_name)?;
    if number.is_none() {
        warn!(file = %file_name, "no document number in file name, records left untagged");
    }

    let mut new_records = report.to_records()?;
    for record in &mut new_records {
        if let (Some(number), Value::Object(fields)) = (&number, record) {
            fields.insert("document".to_string(), Value::String(number.clone()));
        }
    }

    let appended = new_records.len();
    records.extend(new_records);
    fs::write(path, serde_json::to_string_pretty(&records)?)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(appended)
}
