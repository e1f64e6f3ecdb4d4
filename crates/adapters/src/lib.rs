//! echopost adapters crate
//!
//! This crate contains infrastructure adapters implementing the domain ports:
//! - `bluesky`: AT Protocol read and write adapters
//! - `llm`: language model adapters (Ollama, stub)

pub mod bluesky;
pub mod llm;
