use nl2sql::config::Config;
use nl2sql::llm::LlmClient;
use nl2sql::observability::QueryLogger;
use nl2sql::pipeline::{Pipeline, QueryOutput, QueryResult, Timeouts};
use nl2sql::retrieval::{build_index, EmbeddingRetriever, OpenAiEmbedder};
use nl2sql::storage::{ingest_csv, SqliteStorage, StorageEngine};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nl2sql")]
#[command(about = "Translate natural-language questions into SQL and run them")]
#[command(version)]
struct Args {
    /// SQLite database file (or set DATABASE_PATH)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Table embeddings file (or set EMBEDDINGS_PATH)
    #[arg(long, global = true)]
    embeddings: Option<PathBuf>,

    /// OpenAI API key (or set OPENAI_API_KEY env var)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Chat model (or set OPENAI_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer one question
    Ask {
        /// The question in natural language
        question: String,

        /// Print the full result record as JSON
        #[arg(long)]
        json: bool,

        /// Generate and validate SQL without running it
        #[arg(long)]
        generate_only: bool,
    },
    /// Answer questions interactively until `quit`
    Repl,
    /// Embed every table of the database into the embeddings file
    Index,
    /// Load a CSV file into a table
    Ingest {
        /// CSV file with a header row
        csv_file: PathBuf,

        /// Target table name
        #[arg(short, long)]
        table: String,
    },
    /// Print the database schema
    Schema,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    match args.command {
        Commands::Ask {
            question,
            json,
            generate_only,
        } => run_ask(&config, &question, json, generate_only).await,
        Commands::Repl => run_repl(&config).await,
        Commands::Index => run_index(&config).await,
        Commands::Ingest { csv_file, table } => run_ingest(&config, csv_file, &table).await,
        Commands::Schema => show_schema(&config).await,
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = Config::from_env()?;
    if let Some(database) = &args.database {
        config.database_path = database.clone();
    }
    if let Some(embeddings) = &args.embeddings {
        config.embeddings_path = embeddings.clone();
    }
    if let Some(api_key) = &args.api_key {
        config.api_key = Some(api_key.clone());
    }
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    Ok(config)
}

fn embedder(config: &Config) -> Result<OpenAiEmbedder> {
    let api_key = config.require_api_key()?.to_string();
    Ok(OpenAiEmbedder::new(
        api_key,
        config.base_url.clone(),
        config.embedding_model.clone(),
    ))
}

fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let api_key = config.require_api_key()?.to_string();
    let llm = Arc::new(LlmClient::new(api_key, config.model.clone(), config.base_url.clone()));
    info!("Using chat model {}", llm.model());
    let storage = Arc::new(SqliteStorage::open(&config.database_path)?);

    info!("Loading table embeddings from {:?}", config.embeddings_path);
    let retriever = EmbeddingRetriever::load(&config.embeddings_path, Arc::new(embedder(config)?))
        .map_err(|e| anyhow::anyhow!("Failed to load embeddings (run `nl2sql index` first): {}", e))?
        .with_top_k(config.retrieval_top_k)
        .with_min_score(config.retrieval_min_score);

    let mut pipeline = Pipeline::new(llm, Arc::new(retriever), storage).with_timeouts(Timeouts::from(config));
    if let Some(path) = &config.query_log_path {
        pipeline = pipeline.with_logger(QueryLogger::new(path));
    }
    Ok(pipeline)
}

async fn answer(pipeline: &Pipeline, question: &str, generate_only: bool) -> QueryResult {
    if generate_only {
        pipeline.generate_sql(question).await
    } else {
        pipeline.execute_query(question).await
    }
}

async fn run_ask(config: &Config, question: &str, json: bool, generate_only: bool) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let result = answer(&pipeline, question, generate_only).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result)?;
    }
    Ok(())
}

async fn run_repl(config: &Config) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    loop {
        print!("\nEnter your question (or 'quit' to exit): ");
        io::stdout().flush()?;

        let mut question = String::new();
        if io::stdin().read_line(&mut question)? == 0 {
            break;
        }
        let question = question.trim();
        if question.eq_ignore_ascii_case("quit") {
            break;
        }
        if question.is_empty() {
            continue;
        }

        let result = pipeline.execute_query(question).await;
        print_summary(&result)?;
    }
    Ok(())
}

async fn run_index(config: &Config) -> Result<()> {
    let storage = SqliteStorage::open(&config.database_path)?;
    let embedder = embedder(config)?;
    let store = build_index(&storage, &embedder, &Timeouts::from(config)).await?;
    store.save(&config.embeddings_path)?;
    println!(
        "Indexed {} table(s) into {}",
        store.len(),
        config.embeddings_path.display()
    );
    Ok(())
}

async fn run_ingest(config: &Config, csv_file: PathBuf, table: &str) -> Result<()> {
    let storage = SqliteStorage::open(&config.database_path)?;
    let inserted = ingest_csv(&storage, &csv_file, table).await?;
    println!(
        "Loaded {} row(s) from {} into table {}",
        inserted,
        csv_file.display(),
        table
    );
    Ok(())
}

async fn show_schema(config: &Config) -> Result<()> {
    let storage = SqliteStorage::open(&config.database_path)?;
    let schema = storage.get_schema().await?;
    if schema.is_empty() {
        println!("No tables found in {}", config.database_path.display());
    }
    for (table, columns) in &schema {
        println!("{}", table);
        for column in columns {
            println!("  {} {}", column.name, column.data_type);
        }
    }
    Ok(())
}

fn print_summary(result: &QueryResult) -> Result<()> {
    println!("\n1. Relevant Tables: {}", result.relevant_tables.join(", "));
    println!("2. Query Intent: {}", result.query_intent);
    println!("3. Generated SQL: {}", result.generated_sql);
    println!(
        "4. SQL Validated: {}",
        if result.sql_validated { "Yes" } else { "No" }
    );
    println!("5. Query Result:");
    match (&result.error, &result.query_result) {
        (Some(error), _) => println!("   Error: {}", error),
        (None, Some(QueryOutput::Rows(rows))) => println!("{}", serde_json::to_string_pretty(rows)?),
        (None, Some(QueryOutput::Message(message))) => println!("   {}", message),
        (None, None) => println!("   (not executed)"),
    }
    Ok(())
}
