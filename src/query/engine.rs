// Query execution engine

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::index::{FileRecord, Symbol, SymbolKind};

/// A symbol match with its relevance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub symbol: Symbol,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionSource {
    CurrentFile,
    Import,
    Project,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub text: String,
    pub kind: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    pub source: CompletionSource,
}

/// Innermost class or function around a position
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnclosingScope {
    pub name: String,
    pub kind: SymbolKind,
    pub line_start: u32,
    pub line_end: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionContext {
    pub line: u32,
    pub column: u32,
    pub current_line: String,
    /// Up to five lines either side of `line`, inclusive
    pub surrounding: Vec<String>,
    pub scope: Option<EnclosingScope>,
}

const CONTEXT_RADIUS: usize = 5;

/// Exact 1.0, prefix 0.8, substring 0.6, all case-insensitive
pub fn match_score(query: &str, name: &str) -> Option<f32> {
    if query.is_empty() {
        return None;
    }

    let query = query.to_lowercase();
    let name = name.to_lowercase();

    if name == query {
        Some(1.0)
    } else if name.starts_with(&query) {
        Some(0.8)
    } else if name.contains(&query) {
        Some(0.6)
    } else {
        None
    }
}

/// The identifier being typed at the end of `text`
pub fn completion_prefix(text: &str) -> &str {
    let start = text
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphanumeric() || *c == '_')
        .last()
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    &text[start..]
}

/// Read-only queries over committed file records
#[derive(Debug, Clone)]
pub struct QueryEngine {
    search_limit: usize,
    completion_limit: usize,
}

impl QueryEngine {
    /// A `search_limit` of 0 means unlimited
    pub fn new(search_limit: usize, completion_limit: usize) -> Self {
        Self {
            search_limit,
            completion_limit,
        }
    }

    /// Rank every symbol in `records` against `query`. Empty `kinds` or
    /// `languages` means no filter; languages compare case-insensitively.
    ///
    /// Order: score descending, then file path, line, column and name so
    /// results are deterministic.
    pub fn search<'a>(
        &self,
        records: impl IntoIterator<Item = &'a FileRecord>,
        query: &str,
        kinds: &[SymbolKind],
        languages: &[String],
        limit: Option<usize>,
    ) -> Vec<SearchHit> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = records
            .into_iter()
            .filter(|record| {
                languages.is_empty()
                    || languages
                        .iter()
                        .any(|language| language.eq_ignore_ascii_case(&record.language))
            })
            .flat_map(|record| record.symbols.iter())
            .filter(|symbol| kinds.is_empty() || kinds.contains(&symbol.kind))
            .filter_map(|symbol| {
                match_score(query, &symbol.name).map(|score| SearchHit {
                    symbol: symbol.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(compare_hits);

        let limit = limit.unwrap_or(self.search_limit);
        if limit > 0 {
            hits.truncate(limit);
        }
        hits
    }

    /// Completion candidates for `prefix` at `line` of `current`.
    ///
    /// Sources in priority order: the current file (symbols enclosing the
    /// cursor first), its imports, then the rest of the project. Candidates
    /// are de-duplicated by text, the first source wins.
    pub fn completions(
        &self,
        current: Option<&FileRecord>,
        project_files: &[Arc<FileRecord>],
        line: u32,
        prefix: &str,
    ) -> Vec<Completion> {
        let prefix = prefix.to_lowercase();
        let matches = |text: &str| text.to_lowercase().starts_with(&prefix);

        let mut candidates = Vec::new();

        if let Some(record) = current {
            let mut local: Vec<&Symbol> = record.symbols.iter().collect();
            local.sort_by_key(|symbol| !symbol.encloses(line));
            candidates.extend(
                local
                    .into_iter()
                    .map(|symbol| symbol_completion(symbol, CompletionSource::CurrentFile)),
            );

            candidates.extend(
                record
                    .dependencies
                    .iter()
                    .filter(|dep| dep.alias != "*")
                    .map(|dep| Completion {
                        text: dep.alias.clone(),
                        kind: "module".to_string(),
                        detail: format!("from {}", dep.target),
                        documentation: None,
                        source: CompletionSource::Import,
                    }),
            );
        }

        let mut others: Vec<&Arc<FileRecord>> = project_files
            .iter()
            .filter(|record| current.map_or(true, |c| c.path != record.path))
            .collect();
        others.sort_by(|a, b| a.path.cmp(&b.path));
        candidates.extend(
            others
                .into_iter()
                .flat_map(|record| record.symbols.iter())
                .map(|symbol| symbol_completion(symbol, CompletionSource::Project)),
        );

        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|completion| matches(&completion.text))
            .filter(|completion| seen.insert(completion.text.clone()))
            .take(self.completion_limit)
            .collect()
    }

    /// Lines around `line` (1-based) and the innermost enclosing class or function
    pub fn context_at(&self, source: &str, symbols: &[Symbol], line: u32, column: u32) -> Option<PositionContext> {
        let lines: Vec<&str> = source.lines().collect();
        let index = (line as usize).checked_sub(1)?;
        let current_line = lines.get(index)?;

        let first = index.saturating_sub(CONTEXT_RADIUS);
        let last = (index + CONTEXT_RADIUS).min(lines.len() - 1);

        let scope = symbols
            .iter()
            .filter(|symbol| {
                matches!(
                    symbol.kind,
                    SymbolKind::Class | SymbolKind::Function | SymbolKind::Method
                ) && symbol.encloses(line)
            })
            .max_by(|a, b| {
                a.line_start
                    .cmp(&b.line_start)
                    .then_with(|| b.line_end.cmp(&a.line_end))
            })
            .map(|symbol| EnclosingScope {
                name: symbol.name.clone(),
                kind: symbol.kind,
                line_start: symbol.line_start,
                line_end: symbol.line_end,
            });

        Some(PositionContext {
            line,
            column,
            current_line: current_line.to_string(),
            surrounding: lines[first..=last].iter().map(|l| l.to_string()).collect(),
            scope,
        })
    }
}

fn compare_hits(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.symbol.file_path.cmp(&b.symbol.file_path))
        .then_with(|| a.symbol.line_start.cmp(&b.symbol.line_start))
        .then_with(|| a.symbol.column_start.cmp(&b.symbol.column_start))
        .then_with(|| a.symbol.name.cmp(&b.symbol.name))
}

fn symbol_completion(symbol: &Symbol, source: CompletionSource) -> Completion {
    Completion {
        text: symbol.name.clone(),
        kind: symbol.kind.as_str().to_string(),
        detail: symbol.signature.clone(),
        documentation: symbol.doc.clone(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Dependency, DependencyKind, Extraction, Scope};
    use proptest::prelude::*;
    use std::path::PathBuf;

    fn symbol(file: &str, name: &str, kind: SymbolKind, lines: (u32, u32)) -> Symbol {
        Symbol {
            name: name.to_string(),
            kind,
            file_path: PathBuf::from(file),
            line_start: lines.0,
            line_end: lines.1,
            column_start: 0,
            column_end: 0,
            signature: format!("{} {}", kind, name),
            doc: None,
            parent: None,
            scope: Scope::Global,
            language: "python".to_string(),
        }
    }

    fn record(file: &str, symbols: Vec<Symbol>, dependencies: Vec<Dependency>) -> FileRecord {
        FileRecord::new(
            PathBuf::from(file),
            "python",
            String::new(),
            Extraction {
                symbols,
                dependencies,
                parse_error: None,
            },
        )
    }

    #[test]
    fn test_ranking_exact_prefix_substring() {
        let records = vec![
            record("/p/b.py", vec![symbol("/p/b.py", "UserManager", SymbolKind::Class, (1, 5))], vec![]),
            record("/p/a.py", vec![symbol("/p/a.py", "ManagerUtil", SymbolKind::Class, (1, 5))], vec![]),
            record("/p/c.py", vec![symbol("/p/c.py", "Manager", SymbolKind::Class, (1, 5))], vec![]),
        ];
        let engine = QueryEngine::new(100, 50);

        let hits = engine.search(&records, "Manager", &[], &[], None);
        let ranked: Vec<(&str, f32)> = hits.iter().map(|h| (h.symbol.name.as_str(), h.score)).collect();
        assert_eq!(
            ranked,
            vec![("Manager", 1.0), ("ManagerUtil", 0.8), ("UserManager", 0.6)]
        );
    }

    #[test]
    fn test_search_filters_and_ties() {
        let records = vec![
            record(
                "/p/b.py",
                vec![
                    symbol("/p/b.py", "load", SymbolKind::Function, (9, 9)),
                    symbol("/p/b.py", "load", SymbolKind::Method, (3, 4)),
                ],
                vec![],
            ),
            record("/p/a.py", vec![symbol("/p/a.py", "load", SymbolKind::Function, (7, 8))], vec![]),
        ];
        let engine = QueryEngine::new(100, 50);

        let hits = engine.search(&records, "LOAD", &[], &[], None);
        let order: Vec<(&str, u32)> = hits
            .iter()
            .map(|h| (h.symbol.file_path.to_str().unwrap(), h.symbol.line_start))
            .collect();
        assert_eq!(order, vec![("/p/a.py", 7), ("/p/b.py", 3), ("/p/b.py", 9)]);

        let methods = engine.search(&records, "load", &[SymbolKind::Method], &[], None);
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].symbol.line_start, 3);

        assert_eq!(engine.search(&records, "load", &[], &[], Some(2)).len(), 2);
        assert!(engine.search(&records, "  ", &[], &[], None).is_empty());
        assert!(engine.search(&records, "missing", &[], &[], None).is_empty());
    }

    #[test]
    fn test_search_language_filter() {
        let mut script = record("/p/widget.ts", vec![], vec![]);
        script.language = "typescript".to_string();
        script.symbols.push(Symbol {
            language: "typescript".to_string(),
            ..symbol("/p/widget.ts", "WidgetProps", SymbolKind::Interface, (1, 3))
        });
        let records = vec![
            record("/p/widget.py", vec![symbol("/p/widget.py", "Widget", SymbolKind::Class, (1, 4))], vec![]),
            script,
        ];
        let engine = QueryEngine::new(100, 50);

        assert_eq!(engine.search(&records, "widget", &[], &[], None).len(), 2);

        let python = engine.search(&records, "widget", &[], &["python".to_string()], None);
        let names: Vec<&str> = python.iter().map(|h| h.symbol.name.as_str()).collect();
        assert_eq!(names, vec!["Widget"]);

        let typescript = engine.search(&records, "widget", &[], &["TypeScript".to_string()], None);
        let names: Vec<&str> = typescript.iter().map(|h| h.symbol.name.as_str()).collect();
        assert_eq!(names, vec!["WidgetProps"]);

        assert!(engine.search(&records, "widget", &[], &["go".to_string()], None).is_empty());
    }

    #[test]
    fn test_search_hit_serializes_flat() {
        let records = vec![record("/p/a.py", vec![symbol("/p/a.py", "foo", SymbolKind::Function, (1, 1))], vec![])];
        let hits = QueryEngine::new(0, 50).search(&records, "foo", &[], &[], None);
        let json = serde_json::to_value(&hits[0]).unwrap();
        assert_eq!(json["name"], "foo");
        assert_eq!(json["kind"], "function");
        assert_eq!(json["score"], 1.0);
    }

    #[test]
    fn test_completions_sources_and_dedup() {
        let current = record(
            "/p/main.py",
            vec![
                symbol("/p/main.py", "parse_args", SymbolKind::Function, (1, 3)),
                symbol("/p/main.py", "Parser", SymbolKind::Class, (5, 20)),
            ],
            vec![Dependency {
                source_file: PathBuf::from("/p/main.py"),
                target: "pathlib".to_string(),
                alias: "PurePath".to_string(),
                kind: DependencyKind::FromImport,
                line: 1,
                is_relative: false,
            }],
        );
        let project = vec![
            Arc::new(current.clone()),
            Arc::new(record(
                "/p/util.py",
                vec![
                    symbol("/p/util.py", "parse_args", SymbolKind::Function, (1, 2)),
                    symbol("/p/util.py", "pretty", SymbolKind::Function, (4, 5)),
                ],
                vec![],
            )),
        ];
        let engine = QueryEngine::new(100, 50);

        let completions = engine.completions(Some(&current), &project, 10, "p");
        let summary: Vec<(&str, CompletionSource)> = completions
            .iter()
            .map(|c| (c.text.as_str(), c.source))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Parser", CompletionSource::CurrentFile),
                ("parse_args", CompletionSource::CurrentFile),
                ("PurePath", CompletionSource::Import),
                ("pretty", CompletionSource::Project),
            ]
        );
        assert_eq!(completions[2].kind, "module");
        assert_eq!(completions[2].detail, "from pathlib");
    }

    #[test]
    fn test_completions_cap_and_missing_file() {
        let symbols = (0..80)
            .map(|i| symbol("/p/a.py", &format!("item_{}", i), SymbolKind::Variable, (i + 1, i + 1)))
            .collect();
        let project = vec![Arc::new(record("/p/a.py", symbols, vec![]))];
        let engine = QueryEngine::new(100, 50);

        assert_eq!(engine.completions(None, &project, 1, "item").len(), 50);
        assert!(engine.completions(None, &[], 1, "x").is_empty());
    }

    #[test]
    fn test_completion_prefix() {
        assert_eq!(completion_prefix("    result = self.pro"), "pro");
        assert_eq!(completion_prefix("value"), "value");
        assert_eq!(completion_prefix("call("), "");
        assert_eq!(completion_prefix(""), "");
    }

    #[test]
    fn test_context_at() {
        let source = (1..=20).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n");
        let symbols = vec![
            symbol("/p/a.py", "Outer", SymbolKind::Class, (2, 18)),
            symbol("/p/a.py", "inner", SymbolKind::Method, (8, 12)),
            symbol("/p/a.py", "CONST", SymbolKind::Variable, (10, 10)),
        ];
        let engine = QueryEngine::new(100, 50);

        let context = engine.context_at(&source, &symbols, 10, 4).unwrap();
        assert_eq!(context.current_line, "line 10");
        assert_eq!(context.surrounding.first().unwrap(), "line 5");
        assert_eq!(context.surrounding.last().unwrap(), "line 15");
        assert_eq!(context.scope.unwrap().name, "inner");

        let top = engine.context_at(&source, &symbols, 1, 0).unwrap();
        assert_eq!(top.surrounding.len(), 6);
        assert!(top.scope.is_none());

        assert!(engine.context_at(&source, &symbols, 0, 0).is_none());
        assert!(engine.context_at(&source, &symbols, 21, 0).is_none());
    }

    proptest! {
        #[test]
        fn prop_score_matches_containment(query in "[a-zA-Z_]{1,6}", name in "[a-zA-Z_]{0,12}") {
            let contains = name.to_lowercase().contains(&query.to_lowercase());
            prop_assert_eq!(match_score(&query, &name).is_some(), contains);
        }

        #[test]
        fn prop_exact_beats_prefix_beats_substring(stem in "[a-z]{1,6}", head in "[0-9]{1,3}", tail in "[0-9]{1,3}") {
            let exact = match_score(&stem, &stem).unwrap();
            let prefix = match_score(&stem, &format!("{}{}", stem, tail)).unwrap();
            let substring = match_score(&stem, &format!("{}{}", head, stem)).unwrap();
            prop_assert!(exact > prefix);
            prop_assert!(prefix > substring);
        }

        #[test]
        fn prop_search_scores_non_increasing(names in proptest::collection::vec("[a-c]{1,4}", 1..30), query in "[a-c]{1,2}") {
            let symbols = names
                .iter()
                .enumerate()
                .map(|(i, name)| symbol("/p/a.py", name, SymbolKind::Function, (i as u32 + 1, i as u32 + 1)))
                .collect();
            let records = vec![record("/p/a.py", symbols, vec![])];
            let hits = QueryEngine::new(0, 50).search(&records, &query, &[], &[], None);
            for pair in hits.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
        }
    }
}
