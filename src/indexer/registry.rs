// Extension → extractor dispatch

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use super::parser::{PythonExtractor, ScriptExtractor};
use crate::index::{Extractor, Strategy};

/// Registered language as reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguageInfo {
    pub name: String,
    pub extensions: Vec<String>,
    pub strategy: Strategy,
}

#[derive(Default)]
struct Inner {
    extractors: HashMap<String, Arc<dyn Extractor>>,
    by_extension: HashMap<String, String>,
}

/// Lookup table from file extension to [`Extractor`].
///
/// Registering an extension that is already claimed overrides the previous
/// mapping, so a built-in extractor can be replaced at runtime.
#[derive(Default)]
pub struct ExtractorRegistry {
    inner: RwLock<Inner>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the Python, JavaScript and TypeScript extractors
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register("python", Arc::new(PythonExtractor::new()));
        registry.register("javascript", Arc::new(ScriptExtractor::javascript()));
        registry.register("typescript", Arc::new(ScriptExtractor::typescript()));
        registry
    }

    pub fn register(&self, language: &str, extractor: Arc<dyn Extractor>) {
        let language = language.to_lowercase();
        let mut inner = self.inner.write();

        for ext in extractor.file_extensions() {
            let ext = normalize_extension(ext);
            if let Some(previous) = inner.by_extension.insert(ext.clone(), language.clone()) {
                if previous != language {
                    debug!("Extension .{} moved from {} to {}", ext, previous, language);
                }
            }
        }

        inner.extractors.insert(language, extractor);
    }

    pub fn get_for_file(&self, path: &Path) -> Option<Arc<dyn Extractor>> {
        let inner = self.inner.read();
        let language = inner.by_extension.get(&extension_of(path)?)?;
        inner.extractors.get(language).cloned()
    }

    pub fn detect_language(&self, path: &Path) -> Option<String> {
        let inner = self.inner.read();
        inner.by_extension.get(&extension_of(path)?).cloned()
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        self.detect_language(path).is_some()
    }

    /// Registered languages with the extensions currently routed to them
    pub fn languages(&self) -> Vec<LanguageInfo> {
        let inner = self.inner.read();
        let mut languages: Vec<LanguageInfo> = inner
            .extractors
            .iter()
            .map(|(name, extractor)| {
                let mut extensions: Vec<String> = inner
                    .by_extension
                    .iter()
                    .filter(|(_, lang)| *lang == name)
                    .map(|(ext, _)| ext.clone())
                    .collect();
                extensions.sort();
                LanguageInfo {
                    name: name.clone(),
                    extensions,
                    strategy: extractor.strategy(),
                }
            })
            .collect();
        languages.sort_by(|a, b| a.name.cmp(&b.name));
        languages
    }

    pub fn supported_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self.inner.read().by_extension.keys().cloned().collect();
        extensions.sort();
        extensions
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_lowercase()
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(normalize_extension)
}
