// Parcel Infrastructure - OpenAI Assistants Adapter
// Implements: Collaborator (files -> threads -> streamed runs)

mod client;
mod config;
pub mod sse;
mod wire;

pub use client::OpenAiAssistantClient;
pub use config::{OpenAiConfig, DEFAULT_BASE_URL};
