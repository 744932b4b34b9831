use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::info;

use tonescope::config::Config;
use tonescope::dataset::Dataset;
use tonescope::db;
use tonescope::db::models::{CommentFilter, CommentQuery, FilterField};
use tonescope::labels::{HateCategory, ToneLabel};
use tonescope::output::terminal;
use tonescope::pipeline::{self, ModelHandles, ProgressSink};

/// Tonescope: classify comments by tone and hate category.
///
/// Reads a CSV, JSON or JSON Lines table of comments, runs two fine-tuned
/// classifiers over it in device-sized batches, and writes the annotated
/// table back out. Results are also stored in a local SQLite database.
#[derive(Parser)]
#[command(name = "tonescope", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database and seed the label tables
    Init,

    /// Download the tokenizer and the two ONNX classification heads
    DownloadModel {
        /// Also fetch the half-precision (f16) exports
        #[arg(long)]
        fp16: bool,
    },

    /// Classify every comment in a CSV, JSON or JSON Lines file
    Analyze {
        /// Input table (.csv with a header row, .json array of objects, or .jsonl / .ndjson)
        input: PathBuf,

        /// Where to write the annotated table (default: <input>.classified.<ext>)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Column holding the comment text (default: TONESCOPE_TEXT_COLUMN or "sentence")
        #[arg(long)]
        column: Option<String>,

        /// Override the batch size chosen for this device
        #[arg(long)]
        batch_size: Option<usize>,

        /// Don't write results to the database
        #[arg(long)]
        no_persist: bool,
    },

    /// List stored comments, newest first
    Comments {
        /// Only show comments whose field contains this text
        #[arg(long)]
        search: Option<String>,

        /// Field to search: text, tone or hate (default: text)
        #[arg(long, default_value = "text")]
        field: FilterField,

        /// Only show comments with this tone (insult, neutral, positive)
        #[arg(long)]
        tone: Option<ToneLabel>,

        /// Only show comments with this hate category (e.g. "no abuse", sexism)
        #[arg(long)]
        hate: Option<HateCategory>,

        /// Page number, starting at 1
        #[arg(long, default_value = "1")]
        page: u32,

        /// Comments per page
        #[arg(long, default_value = "20")]
        page_size: u32,
    },

    /// Show tone and hate-category counts for stored comments
    Stats,

    /// Show system status (database, models, device)
    Status,

    /// Delete every stored comment (label tables are kept)
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tonescope=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Init => {
            info!("Initializing Tonescope database...");
            let conn = db::initialize(&config.db_path)?;
            db::schema::verify_lookup_seed(&conn)?;
            let table_count = db::schema::table_count(&conn)?;
            println!("Database initialized at: {}", config.db_path);
            println!("Tables created: {table_count}");
            println!("\nNext step: run `tonescope download-model` to fetch the classifiers.");
        }

        Commands::DownloadModel { fp16 } => {
            let base_url = config.require_model_url()?;
            println!("Downloading models to {}", config.model_dir.display());
            tonescope::classifier::download::download_models(base_url, &config.model_dir, fp16)
                .await?;
            println!("{}", "Models ready.".green());
        }

        Commands::Analyze {
            input,
            output,
            column,
            batch_size,
            no_persist,
        } => {
            run_analyze(&config, &input, output, column, batch_size, no_persist).await?;
        }

        Commands::Comments {
            search,
            field,
            tone,
            hate,
            page,
            page_size,
        } => {
            let conn = db::open(&config.db_path)?;
            let query = CommentQuery {
                search: search.map(|term| CommentFilter { field, term }),
                tone,
                hate,
            };
            let total = db::queries::count_comments(&conn, &query)?;
            let comments = db::queries::list_comments(&conn, &query, page, page_size)?;
            terminal::display_comments(&comments, page, page_size, total);
        }

        Commands::Stats => {
            let conn = db::open(&config.db_path)?;
            let dist = db::queries::label_distribution(&conn)?;
            terminal::display_distribution(&dist);
        }

        Commands::Status => {
            tonescope::status::show(&config)?;
        }

        Commands::Clear => {
            let conn = db::open(&config.db_path)?;
            let deleted = db::queries::clear_comments(&conn)?;
            println!("Deleted {deleted} comments.");
        }
    }

    Ok(())
}

async fn run_analyze(
    config: &Config,
    input: &Path,
    output: Option<PathBuf>,
    column: Option<String>,
    batch_size: Option<usize>,
    no_persist: bool,
) -> Result<()> {
    let column = column.unwrap_or_else(|| config.text_column.clone());
    let dataset = Dataset::load(input)?;
    println!("Loaded {} rows from {}", dataset.len(), input.display());

    config.require_models()?;

    let capability = config.detect_capability();
    let policy = config.device_policy(&capability, batch_size);
    terminal::display_device(&capability, &policy);

    let store = if no_persist {
        None
    } else {
        Some(db::initialize(&config.db_path)?)
    };

    // Model loading and inference are CPU/GPU-bound; keep them off the runtime.
    let model_dir = config.model_dir.clone();
    let token_type_ids = config.token_type_ids;
    let accelerator = capability.accelerator;
    let outcome = tokio::task::spawn_blocking(move || -> Result<pipeline::AnalysisOutcome> {
        let mut models = ModelHandles::load(&model_dir, &policy, accelerator, token_type_ids)?;
        let mut progress = BarProgress::new();
        let outcome = pipeline::analyze(
            &dataset,
            &column,
            policy,
            &mut models,
            store.as_ref(),
            &mut progress,
        )?;
        progress.finish();
        Ok(outcome)
    })
    .await
    .context("Classification task panicked")??;

    let output = output.unwrap_or_else(|| default_output_path(input));
    outcome.table.write(&output)?;

    terminal::display_summary(&outcome);
    println!("Annotated table written to {}", output.display());
    Ok(())
}

/// `comments.json` → `comments.classified.json`
fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "json".to_string());
    input.with_file_name(format!("{stem}.classified.{ext}"))
}

/// Batch progress on an indicatif bar. The bar is sized on the first update,
/// once the number of batches is known.
struct BarProgress {
    bar: Option<ProgressBar>,
}

impl BarProgress {
    fn new() -> Self {
        Self { bar: None }
    }

    fn finish(self) {
        if let Some(bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

impl ProgressSink for BarProgress {
    fn batch_done(&mut self, current: usize, total: usize) {
        let bar = self.bar.get_or_insert_with(|| {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  [{bar:40.cyan/blue}] batch {pos}/{len} ({eta})")
                    .expect("valid template")
                    .progress_chars("=> "),
            );
            pb
        });
        bar.set_position(current as u64);
    }
}
