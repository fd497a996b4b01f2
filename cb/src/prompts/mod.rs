//! Prompt Template System
//!
//! Template loading chain:
//! 1. `{decomposer.prompt-dir}/{name}.hbs` (user override)
//! 2. Embedded fallback compiled from `cb/prompts/`
//!
//! Templates use Handlebars syntax for variable substitution.

pub mod embedded;
mod loader;

pub use loader::{DecomposeContext, PromptLoader};
