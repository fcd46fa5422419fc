use clap::{Parser, Subcommand};
use finlens_context::WindowChunker;
use finlens_embed::{EmbeddingProvider, HashEmbeddingProvider, OpenAiEmbeddingProvider};
use finlens_retriever::{
    AutoLoader, DocumentLoader, FinancialDocumentTool, Retriever, RetrieverConfig, assemble_document,
};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// A CLI tool to inspect how finlens chunks and retrieves from a document.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Window length in characters
    #[arg(long, default_value_t = finlens_context::DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Characters shared by consecutive windows
    #[arg(long, default_value_t = finlens_context::DEFAULT_OVERLAP)]
    overlap: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a document and show its chunks
    Chunk {
        /// PDF or text file
        file: PathBuf,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Retrieve the passages most relevant to a query
    Retrieve {
        /// PDF or text file
        file: PathBuf,
        /// The question to answer from the document
        #[arg(short, long)]
        query: String,
        /// Maximum number of passages
        #[arg(short = 'k', long, default_value_t = finlens_retriever::DEFAULT_TOP_K)]
        top_k: usize,
        /// Concurrent embedding requests
        #[arg(long, default_value_t = 1)]
        concurrency: usize,
        /// Embedding backend
        #[arg(short, long, default_value = "openai")]
        embedder: EmbedderChoice,
        /// Output format; "tool" prints exactly what the retrieval tool returns
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Full,
    Json,
    Tool,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "full" => Ok(OutputFormat::Full),
            "json" => Ok(OutputFormat::Json),
            "tool" => Ok(OutputFormat::Tool),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum EmbedderChoice {
    OpenAi,
    Hash,
}

impl std::str::FromStr for EmbedderChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(EmbedderChoice::OpenAi),
            "hash" => Ok(EmbedderChoice::Hash),
            _ => Err(format!("Invalid embedder: {s}")),
        }
    }
}

#[derive(Serialize)]
struct ChunkOutput {
    sequence: usize,
    start: usize,
    end: usize,
    chars: usize,
    text: String,
}

fn preview(text: &str) -> String {
    text.chars()
        .take(100)
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect()
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Chunk { file, format } => {
            let chunker = WindowChunker::new(args.chunk_size, args.overlap)?;
            let pages = AutoLoader.load_pages(&file).await?;
            let document = assemble_document(&pages);
            let chunks = chunker.chunk(&document);

            match format {
                OutputFormat::Json => {
                    let output: Vec<ChunkOutput> = chunks
                        .into_iter()
                        .map(|c| ChunkOutput {
                            sequence: c.sequence,
                            start: c.start,
                            end: c.end,
                            chars: c.char_len(),
                            text: c.text,
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Summary | OutputFormat::Tool => {
                    println!(
                        "{} pages, {} chars, {} chunks:",
                        pages.len(),
                        document.chars().count(),
                        chunks.len()
                    );
                    for chunk in chunks {
                        println!(
                            "  #{} | chars {}-{} | {}",
                            chunk.sequence,
                            chunk.start,
                            chunk.end,
                            preview(&chunk.text)
                        );
                    }
                }
                OutputFormat::Full => {
                    for chunk in chunks {
                        println!("Chunk: {}", chunk.sequence);
                        println!("Chars: {}-{}", chunk.start, chunk.end);
                        println!("Content:\n{}", chunk.text);
                        println!("---");
                    }
                }
            }
            Ok(())
        }
        Commands::Retrieve {
            file,
            query,
            top_k,
            concurrency,
            embedder,
            format,
        } => {
            let embedder: Arc<dyn EmbeddingProvider> = match embedder {
                EmbedderChoice::OpenAi => Arc::new(OpenAiEmbeddingProvider::from_env()?),
                EmbedderChoice::Hash => Arc::new(HashEmbeddingProvider::default()),
            };
            let config = RetrieverConfig::default()
                .with_chunking(args.chunk_size, args.overlap)
                .with_top_k(top_k)
                .with_embed_concurrency(concurrency);
            let retriever = Retriever::new(Arc::new(AutoLoader), embedder, config)?;

            let path = file.to_string_lossy();
            if format == OutputFormat::Tool {
                let tool = FinancialDocumentTool::new(retriever);
                println!("{}", tool.run(&path, &query).await?);
                return Ok(());
            }

            let result = retriever.retrieve(&path, &query).await?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                }
                OutputFormat::Summary => {
                    println!(
                        "Top {} of {} chunks for \"{}\":",
                        result.len(),
                        result.chunk_count,
                        query
                    );
                    for (rank, passage) in result.passages.iter().enumerate() {
                        println!(
                            "  {}. Distance: {:.4} | Chunk: {} | {}",
                            rank + 1,
                            passage.distance,
                            passage.chunk_index,
                            preview(&passage.text)
                        );
                    }
                }
                OutputFormat::Full | OutputFormat::Tool => {
                    for passage in &result.passages {
                        println!("Distance: {:.4}", passage.distance);
                        println!("Chunk: {}", passage.chunk_index);
                        println!("Chars: {}-{}", passage.start, passage.end);
                        println!("Content:\n{}", passage.text);
                        println!("---");
                    }
                }
            }
            Ok(())
        }
    }
}
