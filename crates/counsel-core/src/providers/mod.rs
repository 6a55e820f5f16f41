//! HTTP adapters for the hosted model, embedding and search services.

mod gemini;
mod tavily;

pub use gemini::{GEMINI_API_BASE, GeminiEmbedder, GeminiModel};
pub use tavily::{TAVILY_API_BASE, TavilySearch};
