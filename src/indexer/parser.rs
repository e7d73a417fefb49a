// Language extractors

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tree_sitter::{Node, Parser as TreeParser, Point, Tree};

use crate::error::{IndexError, Result};
use crate::index::{Dependency, DependencyKind, Extraction, Extractor, Scope, Strategy, Symbol, SymbolKind};

/// Python extractor using tree-sitter
pub struct PythonExtractor;

// JavaScript / TypeScript extractor using line-level regular expressions
pub struct ScriptExtractor {
    language: &'static str,
    extensions: &'static [&'static str],
    typed: bool,
}

impl PythonExtractor {
    pub fn new() -> Self {
        Self
    }

    fn parse_tree(&self, content: &str, file_path: &Path) -> Result<Tree> {
        let parse_error = |message: String| IndexError::Parse {
            path: file_path.to_path_buf(),
            message,
        };

        let mut parser = TreeParser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| parse_error(e.to_string()))?;

        let tree = parser
            .parse(content, None)
            .ok_or_else(|| parse_error("Failed to parse Python code".to_string()))?;

        // tree-sitter recovers from errors; an indexable file must be clean
        let root = tree.root_node();
        if root.has_error() {
            let at = first_error_position(root).unwrap_or(root.start_position());
            return Err(parse_error(format!(
                "invalid syntax at line {}, column {}",
                at.row + 1,
                at.column
            )));
        }

        Ok(tree)
    }

    fn walk(&self, tree: &Tree, content: &str, file_path: &Path) -> (Vec<Symbol>, Vec<Dependency>) {
        let mut walker = PythonWalker {
            content,
            file_path,
            scopes: vec![Scope::Global],
            classes: Vec::new(),
            symbols: Vec::new(),
            dependencies: Vec::new(),
        };
        walker.visit(tree.root_node());
        (walker.symbols, walker.dependencies)
    }
}

impl Default for PythonExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Extractor for PythonExtractor {
    fn language(&self) -> &str {
        "python"
    }

    fn file_extensions(&self) -> &[&'static str] {
        &["py", "pyw"]
    }

    fn strategy(&self) -> Strategy {
        Strategy::Grammar
    }

    fn extract_symbols(&self, source: &str, file_path: &Path) -> Result<Vec<Symbol>> {
        let tree = self.parse_tree(source, file_path)?;
        Ok(self.walk(&tree, source, file_path).0)
    }

    fn extract_dependencies(&self, source: &str, file_path: &Path) -> Result<Vec<Dependency>> {
        let tree = self.parse_tree(source, file_path)?;
        Ok(self.walk(&tree, source, file_path).1)
    }

    fn extract(&self, source: &str, file_path: &Path) -> Extraction {
        match self.parse_tree(source, file_path) {
            Ok(tree) => {
                let (symbols, dependencies) = self.walk(&tree, source, file_path);
                Extraction {
                    symbols,
                    dependencies,
                    parse_error: None,
                }
            }
            Err(e) => Extraction::failed(&e),
        }
    }
}

fn first_error_position(node: Node) -> Option<Point> {
    if node.is_error() || node.is_missing() {
        return Some(node.start_position());
    }
    if !node.has_error() {
        return None;
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(point) = first_error_position(child) {
            return Some(point);
        }
    }
    None
}

/// Syntax-tree walk with an explicit scope stack.
/// `scopes` starts as `[Global]`; entering a class or function body pushes
/// `Class` / `Function` and leaving pops it.
struct PythonWalker<'a> {
    content: &'a str,
    file_path: &'a Path,
    scopes: Vec<Scope>,
    classes: Vec<String>,
    symbols: Vec<Symbol>,
    dependencies: Vec<Dependency>,
}

impl<'a> PythonWalker<'a> {
    fn visit(&mut self, node: Node) {
        match node.kind() {
            "class_definition" => {
                self.visit_class(node);
                return;
            }
            "function_definition" => {
                self.visit_function(node);
                return;
            }
            "import_statement" => {
                self.visit_import(node);
                return;
            }
            "import_from_statement" | "future_import_statement" => {
                self.visit_import_from(node);
                return;
            }
            "assignment" => self.visit_assignment(node),
            _ => {}
        }

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.visit(child);
        }
    }

    fn visit_class(&mut self, node: Node) {
        let Some(name) = self.field_text(node, "name") else {
            return;
        };
        let bases = self.field_text(node, "superclasses").unwrap_or_default();

        let symbol = self.symbol(node, &name, SymbolKind::Class, format!("class {}{}", name, bases));
        self.symbols.push(symbol);

        self.scopes.push(Scope::Class);
        self.classes.push(name);
        if let Some(body) = node.child_by_field_name("body") {
            self.visit(body);
        }
        self.classes.pop();
        self.scopes.pop();
    }

    fn visit_function(&mut self, node: Node) {
        let Some(name) = self.field_text(node, "name") else {
            return;
        };

        let parameters = node
            .child_by_field_name("parameters")
            .map(|params| self.parameter_names(params))
            .unwrap_or_default();

        let mut cursor = node.walk();
        let is_async = node.children(&mut cursor).any(|child| child.kind() == "async");

        let signature = format!(
            "{}def {}({})",
            if is_async { "async " } else { "" },
            name,
            parameters.join(", ")
        );
        let kind = if self.current_scope() == Scope::Class {
            SymbolKind::Method
        } else {
            SymbolKind::Function
        };

        let symbol = self.symbol(node, &name, kind, signature);
        self.symbols.push(symbol);

        self.scopes.push(Scope::Function);
        if let Some(body) = node.child_by_field_name("body") {
            self.visit(body);
        }
        self.scopes.pop();
    }

    fn visit_assignment(&mut self, node: Node) {
        // Only module-level bindings of a plain name
        if self.current_scope() != Scope::Global {
            return;
        }
        let Some(left) = node.child_by_field_name("left") else {
            return;
        };
        if left.kind() != "identifier" {
            return;
        }

        let name = self.text(left).to_string();
        let symbol = self.symbol(node, &name, SymbolKind::Variable, format!("{} = ...", name));
        self.symbols.push(symbol);
    }

    fn visit_import(&mut self, node: Node) {
        let line = node.start_position().row as u32 + 1;
        for (target, alias) in self.imported_names(node) {
            self.dependencies.push(Dependency {
                source_file: self.file_path.to_path_buf(),
                target,
                alias,
                kind: DependencyKind::Import,
                line,
                is_relative: false,
            });
        }
    }

    fn visit_import_from(&mut self, node: Node) {
        let line = node.start_position().row as u32 + 1;

        let (module, level) = if node.kind() == "future_import_statement" {
            ("__future__".to_string(), 0)
        } else {
            match node.child_by_field_name("module_name") {
                Some(module) if module.kind() == "relative_import" => self.relative_module(module),
                Some(module) => (self.text(module).to_string(), 0),
                None => (String::new(), 0),
            }
        };

        let mut names: Vec<String> = self
            .imported_names(node)
            .into_iter()
            .map(|(_, alias)| alias)
            .collect();

        let mut cursor = node.walk();
        if node.named_children(&mut cursor).any(|child| child.kind() == "wildcard_import") {
            names.push("*".to_string());
        }

        for alias in names {
            self.dependencies.push(Dependency {
                source_file: self.file_path.to_path_buf(),
                target: module.clone(),
                alias,
                kind: DependencyKind::FromImport,
                line,
                is_relative: level > 0,
            });
        }
    }

    /// `(module, leading dot count)` of a `relative_import` node
    fn relative_module(&self, node: Node) -> (String, usize) {
        let mut level = 0;
        let mut module = String::new();

        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "import_prefix" => level = self.text(child).chars().filter(|c| *c == '.').count(),
                "dotted_name" => module = self.text(child).to_string(),
                _ => {}
            }
        }
        (module, level)
    }

    /// `(imported name, bound alias)` pairs of the statement's `name` fields
    fn imported_names(&self, node: Node) -> Vec<(String, String)> {
        let mut names = Vec::new();
        let mut cursor = node.walk();
        for child in node.children_by_field_name("name", &mut cursor) {
            if child.kind() == "aliased_import" {
                let Some(name) = self.field_text(child, "name") else {
                    continue;
                };
                let alias = self.field_text(child, "alias").unwrap_or_else(|| name.clone());
                names.push((name, alias));
            } else {
                let name = self.text(child).to_string();
                names.push((name.clone(), name));
            }
        }
        names
    }

    fn parameter_names(&self, params: Node) -> Vec<String> {
        let mut names = Vec::new();
        let mut cursor = params.walk();
        for param in params.named_children(&mut cursor) {
            let name = match param.kind() {
                "identifier" | "list_splat_pattern" | "dictionary_splat_pattern" => {
                    Some(self.text(param).to_string())
                }
                "default_parameter" | "typed_default_parameter" => self.field_text(param, "name"),
                "typed_parameter" => {
                    let mut inner = param.walk();
                    let first = param.named_children(&mut inner).next();
                    first.map(|n| self.text(n).to_string())
                }
                _ => None,
            };
            names.extend(name);
        }
        names
    }

    fn docstring(&self, node: Node) -> Option<String> {
        let body = node.child_by_field_name("body")?;
        let mut cursor = body.walk();
        let first = body
            .named_children(&mut cursor)
            .find(|child| child.kind() != "comment")?;
        if first.kind() != "expression_statement" {
            return None;
        }

        let mut inner = first.walk();
        let expr = first.named_children(&mut inner).next()?;
        if expr.kind() != "string" {
            return None;
        }
        Some(clean_docstring(self.text(expr)))
    }

    fn symbol(&self, node: Node, name: &str, kind: SymbolKind, signature: String) -> Symbol {
        let start = node.start_position();
        let end = node.end_position();

        Symbol {
            name: name.to_string(),
            kind,
            file_path: self.file_path.to_path_buf(),
            line_start: start.row as u32 + 1,
            line_end: end.row as u32 + 1,
            column_start: start.column as u32,
            column_end: end.column as u32,
            signature,
            doc: self.docstring(node),
            parent: self.classes.last().cloned(),
            scope: self.current_scope(),
            language: "python".to_string(),
        }
    }

    fn current_scope(&self) -> Scope {
        self.scopes.last().copied().unwrap_or(Scope::Global)
    }

    fn field_text(&self, node: Node, field: &str) -> Option<String> {
        node.child_by_field_name(field)
            .map(|child| self.text(child).to_string())
    }

    fn text(&self, node: Node) -> &'a str {
        self.content.get(node.byte_range()).unwrap_or("")
    }
}

/// Strip quotes and string prefixes, then dedent like `inspect.cleandoc`
fn clean_docstring(raw: &str) -> String {
    let unprefixed = raw.trim_start_matches(|c: char| matches!(c, 'r' | 'R' | 'u' | 'U' | 'b' | 'B' | 'f' | 'F'));
    let inner = ["\"\"\"", "'''", "\"", "'"]
        .iter()
        .find_map(|quote| {
            unprefixed
                .strip_prefix(quote)
                .and_then(|rest| rest.strip_suffix(quote))
        })
        .unwrap_or(unprefixed);

    let mut lines = inner.lines();
    let first = lines.next().unwrap_or("").trim().to_string();
    let rest: Vec<&str> = lines.collect();

    let indent = rest
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned = vec![first];
    cleaned.extend(
        rest.iter()
            .map(|line| line.get(indent..).unwrap_or("").trim_end().to_string()),
    );

    while cleaned.first().is_some_and(|line| line.is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|line| line.is_empty()) {
        cleaned.pop();
    }
    cleaned.join("\n")
}

// Each line is matched against every pattern independently, so one line can
// yield several symbols (an object property is also seen as a variable) and
// declarations spanning several lines are missed.
static SCRIPT_SYMBOL_PATTERNS: Lazy<Vec<(SymbolKind, Regex)>> = Lazy::new(|| {
    compile_patterns(&[
        (SymbolKind::Function, r"function\s+(\w+)\s*\([^)]*\)"),
        (SymbolKind::Function, r"(\w+)\s*:\s*function\s*\([^)]*\)"),
        (SymbolKind::Function, r"(\w+)\s*=\s*function\s*\([^)]*\)"),
        (SymbolKind::Function, r"(\w+)\s*=\s*\([^)]*\)\s*=>"),
        (SymbolKind::Function, r"async\s+function\s+(\w+)\s*\([^)]*\)"),
        (SymbolKind::Class, r"class\s+(\w+)"),
        (SymbolKind::Class, r"(\w+)\s*=\s*class"),
        (SymbolKind::Variable, r"(?:var|let|const)\s+(\w+)"),
        (SymbolKind::Variable, r"(\w+)\s*:"),
    ])
});

static TYPESCRIPT_SYMBOL_PATTERNS: Lazy<Vec<(SymbolKind, Regex)>> = Lazy::new(|| {
    compile_patterns(&[
        (SymbolKind::Interface, r"interface\s+(\w+)"),
        (SymbolKind::Type, r"type\s+(\w+)\s*="),
    ])
});

static SCRIPT_DEPENDENCY_PATTERNS: Lazy<Vec<(DependencyKind, Regex)>> = Lazy::new(|| {
    [
        (DependencyKind::Import, r#"import\s+.*\s+from\s+["']([^"']+)["']"#),
        (DependencyKind::Import, r#"import\s+["']([^"']+)["']"#),
        (DependencyKind::Require, r#"require\(["']([^"']+)["']\)"#),
        (DependencyKind::DynamicImport, r#"import\(["']([^"']+)["']\)"#),
    ]
    .into_iter()
    .filter_map(|(kind, pattern)| Regex::new(pattern).ok().map(|re| (kind, re)))
    .collect()
});

fn compile_patterns(patterns: &[(SymbolKind, &str)]) -> Vec<(SymbolKind, Regex)> {
    patterns
        .iter()
        .filter_map(|(kind, pattern)| Regex::new(pattern).ok().map(|re| (*kind, re)))
        .collect()
}

impl ScriptExtractor {
    pub fn javascript() -> Self {
        Self {
            language: "javascript",
            extensions: &["js", "jsx", "mjs", "cjs"],
            typed: false,
        }
    }

    pub fn typescript() -> Self {
        Self {
            language: "typescript",
            extensions: &["ts", "tsx", "mts", "cts"],
            typed: true,
        }
    }

    fn patterns(&self) -> impl Iterator<Item = &(SymbolKind, Regex)> {
        let typed: &[(SymbolKind, Regex)] = if self.typed {
            &TYPESCRIPT_SYMBOL_PATTERNS
        } else {
            &[]
        };
        SCRIPT_SYMBOL_PATTERNS.iter().chain(typed.iter())
    }
}

impl Extractor for ScriptExtractor {
    fn language(&self) -> &str {
        self.language
    }

    fn file_extensions(&self) -> &[&'static str] {
        self.extensions
    }

    fn strategy(&self) -> Strategy {
        Strategy::Pattern
    }

    fn extract_symbols(&self, source: &str, file_path: &Path) -> Result<Vec<Symbol>> {
        let mut symbols = Vec::new();

        for (index, line) in source.lines().enumerate() {
            let line_number = index as u32 + 1;
            for (kind, pattern) in self.patterns() {
                for captures in pattern.captures_iter(line) {
                    let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
                        continue;
                    };
                    symbols.push(Symbol {
                        name: name.as_str().to_string(),
                        kind: *kind,
                        file_path: file_path.to_path_buf(),
                        line_start: line_number,
                        line_end: line_number,
                        column_start: name.start() as u32,
                        column_end: name.end() as u32,
                        signature: whole.as_str().trim().to_string(),
                        doc: None,
                        parent: None,
                        scope: Scope::Global,
                        language: self.language.to_string(),
                    });
                }
            }
        }

        Ok(symbols)
    }

    fn extract_dependencies(&self, source: &str, file_path: &Path) -> Result<Vec<Dependency>> {
        let mut dependencies = Vec::new();

        for (index, line) in source.lines().enumerate() {
            for (kind, pattern) in SCRIPT_DEPENDENCY_PATTERNS.iter() {
                for captures in pattern.captures_iter(line) {
                    let Some(target) = captures.get(1) else {
                        continue;
                    };
                    let target = target.as_str().to_string();
                    dependencies.push(Dependency {
                        source_file: file_path.to_path_buf(),
                        alias: target.clone(),
                        is_relative: target.starts_with('.'),
                        target,
                        kind: *kind,
                        line: index as u32 + 1,
                    });
                }
            }
        }

        Ok(dependencies)
    }
}
