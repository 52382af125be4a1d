#![allow(clippy::missing_docs_in_private_items)]

pub mod coordinator;
pub mod enrich;
pub mod planner;
pub mod progress;
pub mod reader;
pub mod schema;
pub mod services;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;
