// Code intelligence service: the operations exposed to transport collaborators

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::error::{IndexError, Result};
use crate::index::{Dependency, FileRecord, ProjectIndex, ProjectInfo, ProjectStats, Symbol, SymbolKind};
use crate::indexer::registry::ExtractorRegistry;
use crate::indexer::{IncrementalIndexer, Refreshed};
use crate::project::{normalize_path, ProjectListing, ProjectManager};
use crate::query::engine::completion_prefix;
use crate::query::{Completion, PositionContext, QueryEngine, SearchHit};

/// Result of [`CodeIntelligence::analyze_file`]
#[derive(Debug, Clone, Serialize)]
pub struct FileAnalysis {
    pub path: PathBuf,
    pub language: String,
    pub symbols: Vec<Symbol>,
    pub dependencies: Vec<Dependency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

impl From<&FileRecord> for FileAnalysis {
    fn from(record: &FileRecord) -> Self {
        Self {
            path: record.path.clone(),
            language: record.language.clone(),
            symbols: record.symbols.clone(),
            dependencies: record.dependencies.clone(),
            parse_error: record.parse_error.clone(),
        }
    }
}

/// Owns the registry, the watched projects and the query engine
pub struct CodeIntelligence {
    config: Config,
    registry: Arc<ExtractorRegistry>,
    projects: ProjectManager,
    query: QueryEngine,
}

impl CodeIntelligence {
    pub fn new(config: Config) -> Result<Self> {
        Self::with_registry(config, Arc::new(ExtractorRegistry::with_builtin()))
    }

    pub fn with_registry(config: Config, registry: Arc<ExtractorRegistry>) -> Result<Self> {
        config.validate()?;

        let indexer = Arc::new(IncrementalIndexer::new(Arc::clone(&registry), &config.indexing));
        let projects = ProjectManager::new(indexer, config.debounce());
        let query = QueryEngine::new(config.search.default_limit, config.completion.max_results);

        Ok(Self {
            config,
            registry,
            projects,
            query,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ExtractorRegistry> {
        &self.registry
    }

    pub fn projects(&self) -> &ProjectManager {
        &self.projects
    }

    fn indexer(&self) -> &Arc<IncrementalIndexer> {
        self.projects.indexer()
    }

    pub async fn add_project(&self, path: impl AsRef<Path>, name: Option<&str>) -> Result<ProjectInfo> {
        let (info, _) = self.projects.add_project(path.as_ref(), name).await?;
        Ok(info)
    }

    pub async fn remove_project(&self, path: impl AsRef<Path>) -> Result<ProjectInfo> {
        self.projects.remove_project(path.as_ref()).await
    }

    pub fn list_projects(&self) -> ProjectListing {
        self.projects.list_projects()
    }

    /// Analyze one file from disk. A file inside a watched project also
    /// refreshes that project's cached record.
    pub async fn analyze_file(&self, path: impl AsRef<Path>) -> Result<FileAnalysis> {
        let path = path.as_ref();
        if !self.registry.is_supported(path) {
            return Err(IndexError::UnsupportedLanguage(path.to_path_buf()));
        }
        let path = path.canonicalize().map_err(|e| IndexError::io(path, e))?;

        let project = self
            .projects
            .project_for_path(&path)
            .filter(|project| !self.indexer().is_excluded(project.root(), &path));
        let indexer = Arc::clone(self.indexer());

        let record = run_blocking(&path, move |path| match project {
            Some(project) => match indexer.refresh(&project, path, project.next_ticket())? {
                Refreshed::Indexed(record) | Refreshed::Unchanged(record) => Ok(record),
                Refreshed::Discarded => indexer.analyze_path(path).map(Arc::new),
            },
            None => indexer.analyze_path(path).map(Arc::new),
        })
        .await?;

        Ok(FileAnalysis::from(record.as_ref()))
    }

    /// Ranked symbol search. `project_path` limits the search to one
    /// watched project, or to files below that path. `languages` keeps only
    /// files of the named languages.
    pub fn search_symbols(
        &self,
        query: &str,
        project_path: Option<&Path>,
        kinds: &[SymbolKind],
        languages: &[String],
        limit: Option<usize>,
    ) -> Vec<SearchHit> {
        let records = self.records_in_scope(project_path);
        self.query
            .search(records.values().map(|r| r.as_ref()), query, kinds, languages, limit)
    }

    fn records_in_scope(&self, project_path: Option<&Path>) -> BTreeMap<PathBuf, Arc<FileRecord>> {
        let scope = project_path.map(normalize_path);
        let indexes: Vec<Arc<ProjectIndex>> = match &scope {
            Some(scope) => match self.projects.get(scope) {
                Some(index) => vec![index],
                None => self.projects.projects_snapshot(),
            },
            None => self.projects.projects_snapshot(),
        };

        // Nested projects can hold the same file; keep one copy per path
        let mut records = BTreeMap::new();
        for index in indexes {
            for record in index.snapshot() {
                if scope.as_ref().map_or(true, |scope| record.path.starts_with(scope)) {
                    records.entry(record.path.clone()).or_insert(record);
                }
            }
        }
        records
    }

    /// Completion candidates at `line`/`column` of `path`. `prefix_text` is
    /// the text before the cursor; its trailing identifier is completed.
    /// Never fails: unknown files give an empty or partial list.
    pub async fn get_completions(
        &self,
        path: impl AsRef<Path>,
        line: u32,
        column: u32,
        prefix_text: &str,
    ) -> Vec<Completion> {
        let path = normalize_path(path.as_ref());
        let prefix = completion_prefix(prefix_text);
        debug!("Completing {:?} at {}:{}:{}", prefix, path.display(), line, column);

        let project = self.projects.project_for_path(&path);
        let mut current = project.as_ref().and_then(|project| project.get(&path));
        if current.is_none() && self.registry.is_supported(&path) {
            let indexer = Arc::clone(self.indexer());
            current = run_blocking(&path, move |path| indexer.analyze_path(path))
                .await
                .ok()
                .map(Arc::new);
        }

        let project_files = project.map(|project| project.snapshot()).unwrap_or_default();
        self.query
            .completions(current.as_deref(), &project_files, line, prefix)
    }

    /// Force-drop the cached record for `path`. Returns whether one was cached.
    pub fn invalidate_file(&self, path: impl AsRef<Path>) -> bool {
        let path = normalize_path(path.as_ref());
        match self.projects.project_for_path(&path) {
            Some(project) => {
                let removed = project.remove(&path, project.next_ticket());
                debug!("Invalidated {} (cached: {})", path.display(), removed);
                removed
            }
            None => false,
        }
    }

    pub fn project_stats(&self, path: impl AsRef<Path>) -> Option<ProjectStats> {
        self.projects.get(path.as_ref()).map(|project| project.stats())
    }

    /// Surrounding lines and enclosing scope at a position in `path`
    pub async fn context_at(&self, path: impl AsRef<Path>, line: u32, column: u32) -> Result<Option<PositionContext>> {
        let path = path.as_ref();
        let analysis = self.analyze_file(path).await?;
        let source = tokio::fs::read_to_string(&analysis.path)
            .await
            .map_err(|e| IndexError::io(path, e))?;

        Ok(self.query.context_at(&source, &analysis.symbols, line, column))
    }

    /// Stop every watch and drop every index
    pub async fn shutdown(&self) {
        self.projects.shutdown().await;
    }
}

async fn run_blocking<T, F>(path: &Path, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Path) -> Result<T> + Send + 'static,
{
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || work(&owned))
        .await
        .map_err(|e| IndexError::io(path, io::Error::other(e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_analyze_file_errors() {
        let dir = tempdir().unwrap();
        let service = CodeIntelligence::new(Config::default()).unwrap();

        let notes = dir.path().join("notes.txt");
        fs::write(&notes, "hello").unwrap();
        assert_eq!(service.analyze_file(&notes).await.unwrap_err().kind(), "unsupported_language");

        let missing = dir.path().join("missing.py");
        assert_eq!(service.analyze_file(&missing).await.unwrap_err().kind(), "io_error");
    }

    #[tokio::test]
    async fn test_analyze_unwatched_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("mod.py");
        fs::write(&file, "import os\n\ndef run(path):\n    return os.path.exists(path)\n").unwrap();
        let service = CodeIntelligence::new(Config::default()).unwrap();

        let analysis = service.analyze_file(&file).await.unwrap();
        assert_eq!(analysis.language, "python");
        assert_eq!(analysis.symbols.len(), 1);
        assert_eq!(analysis.symbols[0].signature, "def run(path)");
        assert_eq!(analysis.dependencies[0].target, "os");
        assert!(service.list_projects().projects.is_empty());
    }

    #[tokio::test]
    async fn test_search_scope_and_invalidate() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        fs::write(first.path().join("a.py"), "def handler():\n    pass\n").unwrap();
        fs::write(second.path().join("b.py"), "def handler_two():\n    pass\n").unwrap();

        let service = CodeIntelligence::new(Config::default()).unwrap();
        service.add_project(first.path(), None).await.unwrap();
        service.add_project(second.path(), None).await.unwrap();

        assert_eq!(service.search_symbols("handler", None, &[], &[], None).len(), 2);
        let scoped = service.search_symbols("handler", Some(first.path()), &[], &[], None);
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].score, 1.0);

        let classes = service.search_symbols("handler", None, &[SymbolKind::Class], &[], None);
        assert!(classes.is_empty());

        assert!(service.invalidate_file(first.path().join("a.py")));
        assert!(!service.invalidate_file(first.path().join("a.py")));
        assert!(service.search_symbols("handler", Some(first.path()), &[], &[], None).is_empty());

        service.shutdown().await;
        assert_eq!(service.list_projects().watch_status.watched_count, 0);
    }

    #[tokio::test]
    async fn test_search_by_language() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("session.py"), "class SessionStore:\n    pass\n").unwrap();
        fs::write(dir.path().join("session.ts"), "export class SessionView {}\n").unwrap();

        let service = CodeIntelligence::new(Config::default()).unwrap();
        service.add_project(dir.path(), None).await.unwrap();

        let names = |languages: &[String]| -> Vec<String> {
            service
                .search_symbols("session", None, &[], languages, None)
                .into_iter()
                .map(|hit| hit.symbol.name)
                .collect()
        };

        assert_eq!(names(&[]).len(), 2);
        assert_eq!(names(&["python".to_string()]), vec!["SessionStore"]);
        assert_eq!(names(&["typescript".to_string()]), vec!["SessionView"]);

        service.shutdown().await;
    }

    #[tokio::test]
    async fn test_completions_never_fail() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("app.py");
        fs::write(&file, "from os import path as p\n\ndef process():\n    pass\n").unwrap();

        let service = CodeIntelligence::new(Config::default()).unwrap();
        assert!(service.get_completions(dir.path().join("ghost.py"), 1, 0, "pr").await.is_empty());

        let completions = service.get_completions(&file, 4, 4, "    pr").await;
        let texts: Vec<&str> = completions.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["process"]);

        let all = service.get_completions(&file, 4, 0, "").await;
        assert!(all.iter().any(|c| c.text == "p" && c.kind == "module"));
    }

    #[tokio::test]
    async fn test_context_at() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("ctx.py");
        fs::write(&file, "class A:\n    def m(self):\n        return 1\n").unwrap();
        let service = CodeIntelligence::new(Config::default()).unwrap();

        let context = service.context_at(&file, 3, 8).await.unwrap().unwrap();
        assert_eq!(context.current_line, "        return 1");
        assert_eq!(context.scope.unwrap().name, "m");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = Config::default();
        config.indexing.workers = 0;
        assert_eq!(CodeIntelligence::new(config).err().unwrap().kind(), "config_error");
    }
}
