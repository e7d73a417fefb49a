use codesense::index::Strategy;
use codesense::CodeIntelligence;

pub fn list_languages(service: &CodeIntelligence) {
    println!("Supported languages:");
    for language in service.registry().languages() {
        let strategy = match language.strategy {
            Strategy::Grammar => "tree-sitter grammar",
            Strategy::Pattern => "pattern matching",
        };
        let extensions: Vec<String> = language.extensions.iter().map(|ext| format!(".{}", ext)).collect();
        println!("  {:<12} {:<28} ({})", language.name, extensions.join(", "), strategy);
    }
}
