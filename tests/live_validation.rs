use std::env;

use docqa::{
    answer::{GeminiClient, GenerationRequest, LanguageModel, OllamaChatClient},
    config::{Config, EmbeddingProvider},
    embedding::build_embedding_client,
};

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn ollama_config() -> Config {
    Config {
        embedding_provider: EmbeddingProvider::Ollama,
        embedding_model: env_or("EMBEDDING_MODEL", "nomic-embed-text"),
        embedding_dimension: env_or("EMBEDDING_DIMENSION", "768")
            .parse()
            .expect("numeric EMBEDDING_DIMENSION"),
        ollama_url: env_or("OLLAMA_URL", "http://127.0.0.1:11434"),
        llm_model: env_or("LLM_MODEL", "llama3.2"),
        ..Config::default()
    }
}

fn hello() -> GenerationRequest {
    GenerationRequest {
        system: "Reply with a single short sentence.".into(),
        user: "Say hi.".into(),
    }
}

#[tokio::test]
#[ignore = "Requires live Ollama embeddings"]
async fn live_ollama_embedding_roundtrip() {
    let config = ollama_config();
    let client = build_embedding_client(&config).expect("embedding client");
    let vectors = client
        .generate_embeddings(vec!["docqa live embedding".to_string()])
        .await
        .expect("failed to request embeddings from provider");
    assert_eq!(vectors.len(), 1, "expected embedding per input chunk");
    assert_eq!(
        vectors[0].len(),
        config.embedding_dimension,
        "embedding dimension mismatch"
    );
}

#[tokio::test]
#[ignore = "Requires live Ollama generation"]
async fn live_ollama_generation() {
    let client = OllamaChatClient::from_config(&ollama_config()).expect("client");
    let reply = client.generate(hello()).await.expect("completion");
    assert!(!reply.trim().is_empty());
}

#[tokio::test]
#[ignore = "Requires GEMINI_API_KEY and network access"]
async fn live_gemini_generation() {
    let config = Config {
        gemini_api_key: env::var("GEMINI_API_KEY").ok(),
        llm_model: env_or("LLM_MODEL", "gemini-2.5-flash"),
        ..Config::default()
    };
    let client = GeminiClient::from_config(&config).expect("GEMINI_API_KEY must be set");
    let reply = client.generate(hello()).await.expect("completion");
    assert!(!reply.trim().is_empty());
}
