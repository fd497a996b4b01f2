//! Prompt Loader
//!
//! Loads prompt templates from an override directory or falls back to
//! embedded defaults.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;

/// Context for rendering the decomposition prompt
#[derive(Debug, Clone, Serialize)]
pub struct DecomposeContext {
    /// Task description to break down
    pub description: String,
    pub min_subtasks: usize,
    pub max_subtasks: usize,
    /// Allowed category names
    pub categories: Vec<String>,
    /// Tool the model should call with its answer
    pub tool_name: String,
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    hbs: Handlebars<'static>,
    /// Override directory (e.g., `~/.config/calibrate/prompts/`)
    override_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a loader that prefers templates in `dir` when it exists
    pub fn new(dir: Option<&Path>) -> Self {
        let override_dir = dir.filter(|d| d.exists()).map(Path::to_path_buf);
        debug!(?override_dir, "PromptLoader::new: called");

        let mut hbs = Handlebars::new();
        // Prompts are plain text, not HTML
        hbs.register_escape_fn(handlebars::no_escape);
        Self { hbs, override_dir }
    }

    /// Create a loader that only uses embedded prompts
    pub fn embedded_only() -> Self {
        Self::new(None)
    }

    /// Load a template by name
    ///
    /// Checks `{override_dir}/{name}.hbs` first, then the embedded copy.
    fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        if let Some(ref dir) = self.override_dir {
            let path = dir.join(format!("{}.hbs", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found override");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read prompt {}: {}", path.display(), e));
            }
        }

        embedded::get_embedded(name)
            .map(str::to_string)
            .ok_or_else(|| eyre!("Prompt template not found: {}", name))
    }

    /// Render a template with the given context
    pub fn render<T: Serialize>(&self, template_name: &str, context: &T) -> Result<String> {
        let template = self.load_template(template_name)?;
        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }

    pub fn decompose_prompt(&self, context: &DecomposeContext) -> Result<String> {
        debug!(description_len = context.description.len(), "PromptLoader::decompose_prompt: called");
        self.render("decompose", context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> DecomposeContext {
        DecomposeContext {
            description: "Write the Q3 report & send it".to_string(),
            min_subtasks: 3,
            max_subtasks: 5,
            categories: vec!["creative".to_string(), "analytical".to_string()],
            tool_name: "submit_subtasks".to_string(),
        }
    }

    #[test]
    fn test_render_embedded_decompose() {
        let loader = PromptLoader::embedded_only();
        let prompt = loader.decompose_prompt(&context()).unwrap();

        assert!(prompt.contains("3-5 subtasks"));
        assert!(prompt.contains("- creative"));
        assert!(prompt.contains("- analytical"));
        assert!(prompt.contains("`submit_subtasks`"));
        // No HTML escaping
        assert!(prompt.contains("Write the Q3 report & send it"));
    }

    #[test]
    fn test_override_dir_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("decompose.hbs"), "Split: {{description}}").unwrap();

        let loader = PromptLoader::new(Some(dir.path()));
        let prompt = loader.decompose_prompt(&context()).unwrap();
        assert_eq!(prompt, "Split: Write the Q3 report & send it");
    }

    #[test]
    fn test_missing_override_dir_falls_back() {
        let loader = PromptLoader::new(Some(Path::new("/nonexistent/prompts")));
        assert!(loader.decompose_prompt(&context()).unwrap().contains("Task:"));
    }

    #[test]
    fn test_unknown_template() {
        let loader = PromptLoader::embedded_only();
        assert!(loader.load_template("nonexistent-template").is_err());
    }
}
