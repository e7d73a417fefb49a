use std::path::PathBuf;

use codesense::index::{Extraction, FileRecord, Scope, Symbol, SymbolKind};
use codesense::indexer::parser::PythonExtractor;
use codesense::query::QueryEngine;
use codesense::Extractor;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

const WORDS: [&str; 8] = ["user", "manager", "config", "parse", "render", "cache", "token", "session"];

/// Build `files` records holding `per_file` symbols with mixed names
fn build_records(files: usize, per_file: usize) -> Vec<FileRecord> {
    (0..files)
        .map(|f| {
            let path = PathBuf::from(format!("/bench/pkg_{}/module_{}.py", f % 16, f));
            let symbols = (0..per_file)
                .map(|s| {
                    let name = format!("{}_{}_{}", WORDS[(f + s) % WORDS.len()], WORDS[s % WORDS.len()], s);
                    Symbol {
                        name,
                        kind: SymbolKind::ALL[s % SymbolKind::ALL.len()],
                        file_path: path.clone(),
                        line_start: s as u32 + 1,
                        line_end: s as u32 + 1,
                        column_start: 0,
                        column_end: 0,
                        signature: String::new(),
                        doc: None,
                        parent: None,
                        scope: Scope::Global,
                        language: "python".to_string(),
                    }
                })
                .collect();

            FileRecord::new(
                path,
                "python",
                String::new(),
                Extraction {
                    symbols,
                    dependencies: Vec::new(),
                    parse_error: None,
                },
            )
        })
        .collect()
}

fn bench_search(c: &mut Criterion) {
    let records = build_records(1_000, 50);
    let engine = QueryEngine::new(100, 50);

    c.bench_function("search_substring_50k_symbols", |b| {
        b.iter(|| engine.search(black_box(&records), black_box("manager"), &[], &[], None))
    });

    c.bench_function("search_kind_filtered_50k_symbols", |b| {
        b.iter(|| {
            engine.search(
                black_box(&records),
                black_box("session"),
                &[SymbolKind::Class, SymbolKind::Function],
                &[],
                None,
            )
        })
    });

    c.bench_function("search_no_match_50k_symbols", |b| {
        b.iter(|| engine.search(black_box(&records), black_box("zzz"), &[], &[], None))
    });
}

fn bench_extract(c: &mut Criterion) {
    let source: String = (0..200)
        .map(|i| {
            format!(
                "class Service{i}(Base):\n    \"\"\"Service {i}.\"\"\"\n\n    def handle_{i}(self, request, *args, **kwargs):\n        return request\n\n"
            )
        })
        .collect();
    let extractor = PythonExtractor::new();
    let path = PathBuf::from("/bench/services.py");

    c.bench_function("python_extract_400_symbols", |b| {
        b.iter(|| extractor.extract(black_box(&source), &path))
    });
}

criterion_group!(benches, bench_search, bench_extract);
criterion_main!(benches);
