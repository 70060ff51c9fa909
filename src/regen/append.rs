use std::path::Path;

use super::{RegenResult, Regeneration, Regenerator};

/// Appends a fixed text to every source file with a matching extension.
#[derive(Debug, Clone)]
pub struct AppendRegenerator {
    extensions: Vec<String>,
    text: String,
}

impl AppendRegenerator {
    /// Extensions are matched without the leading dot, case-sensitively.
    pub fn new(extensions: impl IntoIterator<Item = impl Into<String>>, text: impl Into<String>) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_string())
            .collect();
        Self { extensions, text: text.into() }
    }

    fn matches(&self, source: &Path) -> bool {
        source
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|wanted| wanted == ext))
    }
}

#[async_trait::async_trait]
impl Regenerator for AppendRegenerator {
    async fn regenerate(&self, source: &Path) -> RegenResult {
        if !self.matches(source) {
            return Ok(Regeneration::Unchanged);
        }
        let mut content = tokio::fs::read(source).await?;
        content.extend_from_slice(self.text.as_bytes());
        Ok(Regeneration::Updated(content))
    }
}
