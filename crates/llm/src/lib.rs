//! Flywheel generator infrastructure adapter.
//!
//! Implements the [`pipeline::Generator`] trait for Anthropic's Messages API.
//! Additional providers are added as new modules in this crate without any
//! changes to the `pipeline` crate.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** All HTTP transport, request formatting, response
//! parsing, `retry-after` header handling, and exponential back-off live here.
//! The [`pipeline`] crate sees only [`pipeline::Generator`] and
//! [`pipeline::GeneratorError`].

mod anthropic;
mod config;

pub use anthropic::AnthropicGenerator;
pub use config::LlmConfig;
