//! Simple example comparing texts with the offline hash embedder.
//!
//! Set `OPENAI_API_KEY` to embed with the HTTP service instead.

use finlens_embed::{EmbedConfig, EmbeddingProvider, HashEmbeddingProvider, OpenAiEmbeddingProvider};

fn distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = EmbedConfig::from_env();
    let provider: Box<dyn EmbeddingProvider> = match config.resolve_api_key() {
        Some(_) => Box::new(OpenAiEmbeddingProvider::new(config)?),
        None => Box::new(HashEmbeddingProvider::default()),
    };

    println!("Provider: {}", provider.provider_name());

    let query = "How did operating cash flow develop?";
    let texts = vec![
        "Cash flow from operating activities rose to $4.2 billion.".to_string(),
        "The board appointed a new chief executive officer.".to_string(),
        "Operating expenses were flat compared with the prior year.".to_string(),
    ];

    let query_embedding = provider.embed_text(query).await?;
    let result = provider.embed_texts(&texts).await?;

    println!("Embedding dimension: {}", result.dimension);
    println!("Query: \"{query}\"");
    for (text, embedding) in texts.iter().zip(result.embeddings.iter()) {
        println!("  {:.4}  {}", distance(&query_embedding, embedding), text);
    }

    Ok(())
}
