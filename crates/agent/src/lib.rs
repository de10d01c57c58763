//! Assistant runtime - prompt assembly and the completion transport.
//!
//! This crate owns the conversational side of larder:
//! - `prompt` builds the fixed behavioral contract the model answers under
//!   (inventory snapshot, expiry call-outs, the proposal block format)
//! - `llm` defines the pluggable completion seam
//! - `client` is the HTTP implementation for OpenAI-compatible endpoints
//!   (OpenAI itself, or a local Ollama)
//!
//! # Safety Principle
//!
//! The model is strictly a suggester. It never mutates inventory; it can
//! only emit a proposal block that the server parses, validates, and
//! applies after the user confirms.

pub mod client;
pub mod llm;
pub mod prompt;

pub use client::HttpLlmClient;
pub use llm::{Attachment, CompletionRequest, LlmClient, TurnMessage};
pub use prompt::build_system_prompt;
