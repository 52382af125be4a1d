pub mod chunking;
pub mod config;
pub mod embedding;
pub(crate) mod http;
pub mod retry;
