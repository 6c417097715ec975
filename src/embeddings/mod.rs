pub mod client;

pub use client::EmbeddingClient;
