//! Model client implementations for Noteloom.
//!
//! All clients implement the `noteloom_core::ModelClient` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatClient;
