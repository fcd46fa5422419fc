use clap::Parser;
use finlens_context::window::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP, WindowChunker};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};

/// A CLI tool to split a text file into overlapping windows and print them as JSON.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Window length in characters.
    #[arg(short, long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Characters shared by consecutive windows.
    #[arg(short, long, default_value_t = DEFAULT_OVERLAP)]
    overlap: usize,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let file_content = if let Some(input_path) = args.input {
        fs::read_to_string(input_path)?
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    };

    let chunker = WindowChunker::new(args.chunk_size, args.overlap)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    #[derive(Serialize)]
    struct SerializableChunk<'a> {
        sequence: usize,
        start: usize,
        end: usize,
        chars: usize,
        text: &'a str,
    }

    let chunks = chunker.chunk(&file_content);
    let serializable_chunks: Vec<SerializableChunk> = chunks
        .iter()
        .map(|c| SerializableChunk {
            sequence: c.sequence,
            start: c.start,
            end: c.end,
            chars: c.char_len(),
            text: &c.text,
        })
        .collect();

    let json_output = serde_json::to_string_pretty(&serializable_chunks)?;
    println!("{}", json_output);

    Ok(())
}
