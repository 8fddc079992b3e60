use anno_explorer::{bootstrap, init_tracing, parse_range, parse_where, Session};
use anno_http::convert::frame_to_batch;
use anno_http::{load_config, load_config_file};
use annomatrix::{ExplorerEvent, Field, Query, Summary};
use anyhow::{Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{error, info};

#[derive(ClapParser, Debug)]
#[command(name = "anno-explorer")]
#[command(about = "Query an annotated matrix server through the caching view layer", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// YAML file overriding the ANNO_* environment settings
    #[arg(short, long, env = "ANNO_CONFIG")]
    config: Option<PathBuf>,

    /// Quantiles to clip continuous columns to, as lo,hi
    #[arg(long)]
    clip: Option<String>,

    /// Restrict to rows whose obs column equals a value, as column=value
    #[arg(long)]
    subset: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the dataset schema
    Schema,
    /// Fetch columns and print them as a JSON batch
    Fetch {
        /// obs, var or X
        #[arg(short, long, default_value = "obs")]
        field: Field,
        /// Column labels, comma separated
        #[arg(short = 'l', long, value_delimiter = ',')]
        columns: Vec<String>,
        /// X columns selected by predicate, as field:column=value
        #[arg(short, long, conflicts_with = "columns")]
        r#where: Option<String>,
    },
    /// Summarize one column
    Summary {
        #[arg(short, long, default_value = "obs")]
        field: Field,
        #[arg(short = 'l', long)]
        column: String,
        /// Treat numeric data as categories
        #[arg(long, default_value_t = false)]
        categorical: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => load_config_file(path)?,
        None => load_config(),
    };

    let (mut session, events) = bootstrap(config).await?;
    let event_log = tokio::spawn(log_events(events));

    apply_views(&mut session, &args).await?;
    let output = run(&session, args.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    drop(session);
    event_log.await.context("Event logger panicked")?;
    Ok(())
}

async fn log_events(mut events: mpsc::UnboundedReceiver<ExplorerEvent>) {
    while let Some(event) = events.recv().await {
        match &event {
            ExplorerEvent::Error { message } => error!(%message, "Explorer error"),
            other => info!(event = ?other, "Explorer event"),
        }
    }
}

async fn apply_views(session: &mut Session, args: &Args) -> Result<()> {
    if let Some(subset) = &args.subset {
        let Some((column, value)) = subset.split_once('=') else {
            anyhow::bail!("expected column=value, got '{subset}'");
        };
        session
            .explorer
            .select_categorical(column, vec![value.into()])
            .await?;
        session.explorer.subset()?;
    }
    if let Some(clip) = &args.clip {
        let (lo, hi) = parse_range(clip)?;
        session.explorer.clip(lo, hi)?;
    }
    info!(chain = ?session.explorer.matrix().view_chain(), "View stack ready");
    Ok(())
}

async fn run(session: &Session, command: Commands) -> Result<serde_json::Value> {
    let matrix = session.explorer.matrix();
    let value = match command {
        Commands::Schema => serde_json::to_value(matrix.schema().as_ref())?,
        Commands::Fetch { field, columns, r#where } => {
            let query = match r#where {
                Some(arg) => parse_where(&arg)?,
                None if columns.is_empty() => {
                    let df = matrix.fetch_all(field).await?;
                    return Ok(serde_json::to_value(frame_to_batch(&df))?);
                }
                None => Query::columns(columns),
            };
            let df = matrix.fetch(field, query).await?;
            serde_json::to_value(frame_to_batch(&df))?
        }
        Commands::Summary {
            field,
            column,
            categorical,
        } => {
            let df = matrix.fetch(field, column.as_str()).await?;
            match df.summarize(&column, categorical)? {
                Summary::Continuous(s) => json!({
                    "column": column,
                    "min": s.min,
                    "max": s.max,
                    "nFinite": s.n_finite,
                    "percentiles": ([1.0, 5.0, 25.0, 50.0, 75.0, 95.0, 99.0]
                        .iter()
                        .map(|p| json!({ "p": p, "value": s.percentile(*p) }))
                        .collect::<Vec<_>>()),
                }),
                Summary::Categorical(s) => json!({
                    "column": column,
                    "categories": s.categories,
                    "counts": s.counts,
                }),
            }
        }
    };
    Ok(value)
}
