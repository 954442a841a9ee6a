use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use prometheus::Registry;
use search_lens::{
    browser::{BrowserState, PageView, RefreshOutcome, SearchSession},
    config::Config,
    search::{self, HttpSearchBackend, QueryBuilder, SearchExecutor},
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "search-lens")]
#[command(version, about = "Filter, fetch and page through search backend documents", long_about = None)]
struct Cli {
    /// Configuration file (overrides SEARCH_LENS_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Backend base URL
    #[arg(short, long, global = true, env = "SEARCH_LENS_ENDPOINT")]
    endpoint: Option<String>,

    /// Index or index pattern
    #[arg(short, long, global = true)]
    index: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Print Prometheus metrics to stderr when done
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a filtered search and print one page of results
    Search {
        /// Filter expression, repeatable (`status=active`, `age>=5`, `host=web-*`)
        #[arg(short, long = "filter", value_name = "EXPR")]
        filters: Vec<String>,

        /// Relative timeframe (`today`, `week`, `12h`, `2d`, `1w`)
        #[arg(short, long, default_value = "")]
        timeframe: String,

        /// Number of documents to fetch
        #[arg(short = 'n', long)]
        size: Option<usize>,

        /// Page to print (1-based)
        #[arg(short, long, default_value_t = 1)]
        page: usize,

        /// Rows per page
        #[arg(long)]
        page_size: Option<usize>,

        /// Columns to show, comma separated
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,

        /// Case-insensitive text filter over the shown columns
        #[arg(short, long)]
        grep: Option<String>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },

    /// Fetch a single document by id
    Get {
        #[arg(value_name = "DOCUMENT_ID")]
        id: String,
    },

    /// List the fields discovered in matching documents
    Fields {
        #[arg(short, long = "filter", value_name = "EXPR")]
        filters: Vec<String>,

        #[arg(short, long, default_value = "")]
        timeframe: String,

        #[arg(short = 'n', long, default_value_t = 100)]
        size: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(endpoint) = &cli.endpoint {
        config.backend.endpoint = endpoint.clone();
    }
    if let Some(index) = &cli.index {
        config.backend.index = index.clone();
    }

    init_tracing(&config.observability.log_level, cli.json_logs || config.observability.json_logs);
    tracing::debug!("Starting search-lens v{}", env!("CARGO_PKG_VERSION"));

    let registry = Registry::new();
    if cli.metrics {
        search::init_search_metrics(&registry).context("Failed to register metrics")?;
    }

    let backend = Arc::new(HttpSearchBackend::new(&config.backend)?);
    let executor = SearchExecutor::new(backend, config.search.clone());
    let builder = QueryBuilder::new()
        .with_timestamp_fields(config.search.timestamp_fields())
        .with_sort(config.search.sort.clone());

    match cli.command {
        Commands::Search {
            filters,
            timeframe,
            size,
            page,
            page_size,
            fields,
            grep,
            output,
        } => {
            let columns = if fields.is_empty() {
                config.view.default_fields.clone()
            } else {
                fields
            };
            let state = BrowserState::new(
                config.backend.index.clone(),
                size.unwrap_or(config.search.default_size),
                page_size.unwrap_or(config.view.page_size),
                columns,
            );
            let session = Arc::new(SearchSession::new(executor, builder, state));
            session.set_filters(filters)?;
            session.set_timeframe(timeframe)?;

            if let RefreshOutcome::Loaded { mode, .. } = session.spawn_refresh().await?? {
                tracing::debug!(%mode, "Results loaded");
            }
            if let Some(text) = grep {
                session.apply_filter(&text);
            }
            session.goto_page(page);

            let view = session.page_view();
            match output {
                OutputFormat::Table => print_table(&view),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&page_json(&view))?),
            }
        }

        Commands::Get { id } => {
            let state = BrowserState::new(config.backend.index.clone(), 1, 1, Vec::<String>::new());
            let session = SearchSession::new(executor, builder, state);
            let entry = session.fetch_document(&id).await?;
            println!("{}", serde_json::to_string_pretty(&entry.to_json())?);
        }

        Commands::Fields {
            filters,
            timeframe,
            size,
        } => {
            let state = BrowserState::new(
                config.backend.index.clone(),
                size,
                config.view.page_size,
                config.view.default_fields.clone(),
            );
            let session = SearchSession::new(executor, builder, state);
            session.set_filters(filters)?;
            session.set_timeframe(timeframe)?;
            session.refresh().await?;

            let active = session.active_fields();
            for field in session.fields() {
                let marker = if active.contains(&field) { "*" } else { " " };
                println!("{} {}", marker, field);
            }
        }
    }

    if cli.metrics {
        eprintln!("{}", search::gather_metrics(&registry));
    }

    Ok(())
}

fn init_tracing(level: &str, json_logs: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("search_lens={}", level).into());
    let registry = tracing_subscriber::registry().with(filter);

    if json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_table(view: &PageView) {
    let mut columns = vec!["_id".to_string()];
    columns.extend(view.columns.iter().cloned());

    let rows: Vec<Vec<&str>> = view
        .ids
        .iter()
        .zip(&view.rows)
        .map(|(id, row)| {
            std::iter::once(id.as_str())
                .chain(row.iter().map(String::as_str))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count()).min(60);
        }
    }

    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{:<w$}", c, w = *w))
        .collect();
    println!("{}", header.join("  "));
    println!("{}", widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("  "));

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{:<w$}", truncate(cell, *w), w = *w))
            .collect();
        println!("{}", cells.join("  ").trim_end());
    }

    println!();
    println!(
        "Page {}/{}  ({} shown of {} loaded, {} hits)",
        view.current_page, view.total_pages, view.filtered_count, view.total_count, view.total_hits
    );
    if let Some(status) = &view.status {
        println!("{}", status);
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}

fn page_json(view: &PageView) -> Value {
    let documents: Vec<Value> = view
        .ids
        .iter()
        .zip(&view.rows)
        .map(|(id, row)| {
            let mut doc = Map::new();
            doc.insert("_id".to_string(), json!(id));
            for (column, cell) in view.columns.iter().zip(row) {
                doc.insert(column.clone(), json!(cell));
            }
            Value::Object(doc)
        })
        .collect();

    json!({
        "page": view.current_page,
        "total_pages": view.total_pages,
        "filtered": view.filtered_count,
        "loaded": view.total_count,
        "total_hits": view.total_hits,
        "documents": documents
    })
}
