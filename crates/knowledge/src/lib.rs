//! Flywheel knowledge infrastructure adapters.
//!
//! Supplies the read side ([`pipeline::KnowledgeRetriever`]), write side
//! ([`pipeline::KnowledgeWriter`]), refresh ([`pipeline::KnowledgeSeeder`])
//! and persistence hygiene ([`pipeline::TextSanitizer`]) ports.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Storage layout, ranking, file loading, and redaction
//! patterns live here. The pipeline core only sees ranked [`pipeline::Snippet`]s
//! and append calls.

mod sanitizer;
mod seeder;
mod store;

pub use sanitizer::RegexSanitizer;
pub use seeder::DirectorySeeder;
pub use store::InMemoryKnowledgeBase;
