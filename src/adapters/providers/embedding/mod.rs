//! Dense embedding providers

pub mod http;
pub mod null;

pub use http::HttpEmbeddingProvider;
pub use null::NullEmbeddingProvider;
