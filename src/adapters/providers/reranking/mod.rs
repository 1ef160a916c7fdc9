//! Reranking providers

pub mod http;
pub mod null;

pub use http::HttpRerankingProvider;
pub use null::NullRerankingProvider;
