//! Filesystem project index for the CLI.
//!
//! Frames resolve through the owner's package path under each source root.
//! Statements are recognized line by line: a line either holds nothing
//! worth ranking (blank, comment, brace, declaration header, label) or one
//! statement whose kind comes from its leading keyword. Control-flow
//! keywords later on the same line become nested nodes.
use crate::localize::ProjectIndex;
use crate::tree::{kinds, NodeClass, SyntaxNode};
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_SOURCE_ROOTS: [&str; 3] = ["src/main/java", "src", "."];

const DECLARATION_WORDS: [&str; 12] = [
    "public",
    "private",
    "protected",
    "static",
    "final",
    "abstract",
    "class",
    "interface",
    "enum",
    "record",
    "package",
    "import",
];

#[derive(Debug, Clone)]
pub struct SourceTree {
    root: PathBuf,
    source_roots: Vec<PathBuf>,
}

impl SourceTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            source_roots: DEFAULT_SOURCE_ROOTS.iter().map(PathBuf::from).collect(),
        }
    }

    /// Replace the source roots (relative to the project root) searched in
    /// order.
    pub fn with_source_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.source_roots = roots;
        self
    }
}

impl ProjectIndex for SourceTree {
    fn resolve(&self, owner: &str, file: &str, line: u32) -> Option<PathBuf> {
        let package: PathBuf = match owner.rsplit_once('.') {
            Some((package, _)) => package.split('.').collect(),
            None => PathBuf::new(),
        };
        self.source_roots
            .iter()
            .map(|source_root| self.root.join(source_root).join(&package).join(file))
            .find(|candidate| candidate.is_file() && line_count(candidate) >= line as usize)
    }

    fn statements_at(&self, path: &Path, line: u32) -> anyhow::Result<Vec<Arc<SyntaxNode>>> {
        let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let Some(index) = (line as usize).checked_sub(1) else {
            return Ok(Vec::new());
        };
        Ok(text
            .lines()
            .nth(index)
            .and_then(line_statement)
            .map(|stmt| vec![Arc::new(stmt)])
            .unwrap_or_default())
    }
}

fn line_count(path: &Path) -> usize {
    fs::read_to_string(path)
        .map(|text| text.lines().count())
        .unwrap_or(0)
}

fn line_statement(line: &str) -> Option<SyntaxNode> {
    let trimmed = line.trim().trim_start_matches('}').trim_start();
    if trimmed.is_empty()
        || trimmed.starts_with("//")
        || trimmed.starts_with("/*")
        || trimmed.starts_with('*')
        || trimmed.starts_with('@')
        || trimmed.chars().all(|c| matches!(c, '{' | '}' | ';' | ')' | '(' | ' '))
    {
        return None;
    }
    let words = code_words(trimmed);
    let first = words.first()?;
    if matches!(first.as_str(), "case" | "default") && trimmed.ends_with(':') {
        return None;
    }
    if DECLARATION_WORDS.contains(&first.as_str()) && !trimmed.contains('=') {
        return None;
    }
    let kind = match first.as_str() {
        "if" => kinds::IF,
        "else" => match words.get(1).map(String::as_str) {
            Some("if") => kinds::IF,
            _ => return None,
        },
        "for" if header_has_colon(trimmed) => kinds::FOREACH,
        "for" => kinds::FOR,
        "while" => kinds::WHILE,
        "do" => kinds::DO,
        "switch" => kinds::SWITCH,
        "try" | "finally" => kinds::TRY,
        "catch" => kinds::CATCH,
        "return" => kinds::RETURN,
        "throw" => kinds::THROW,
        _ => kinds::EXPR_STMT,
    };
    let nested: Vec<Arc<SyntaxNode>> = words
        .iter()
        .skip(1)
        .filter_map(|word| control_kind(word))
        .map(|kind| Arc::new(SyntaxNode::new(kind, NodeClass::Stmt)))
        .collect();
    Some(SyntaxNode::new(kind, NodeClass::Stmt).with_children(nested))
}

fn control_kind(word: &str) -> Option<&'static str> {
    Some(match word {
        "if" => kinds::IF,
        "for" => kinds::FOR,
        "while" => kinds::WHILE,
        "do" => kinds::DO,
        "switch" => kinds::SWITCH,
        "try" => kinds::TRY,
        "catch" => kinds::CATCH,
        _ => return None,
    })
}

fn header_has_colon(line: &str) -> bool {
    line.split_once('(')
        .and_then(|(_, rest)| rest.rsplit_once(')'))
        .is_some_and(|(header, _)| header.contains(':') && !header.contains(';'))
}

/// Identifier-like words outside string and char literals and trailing
/// line comments.
fn code_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut prev = '\0';
    for c in line.chars() {
        if let Some(open) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == open {
                quote = None;
            }
            prev = c;
            continue;
        }
        if c == '/' && prev == '/' {
            current.clear();
            break;
        }
        if c.is_alphanumeric() || c == '_' || c == '$' {
            current.push(c);
        } else {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            if c == '"' || c == '\'' {
                quote = Some(c);
            }
        }
        prev = c;
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "\
package org.example.cache;

public class LruCache {
    // evict the oldest entry
    public void evict(int n) {
        int removed = 0;
        while (removed < n) {
            if (map.isEmpty()) return;
        }
        } else {
        String s = \"if (x)\"; log(s);
        for (Entry e : entries) {
    }
}
";

    fn project() -> (tempfile::TempDir, SourceTree) {
        let dir = tempfile::tempdir().expect("tempdir");
        let package = dir.path().join("src/main/java/org/example/cache");
        fs::create_dir_all(&package).expect("mkdir");
        fs::write(package.join("LruCache.java"), SOURCE).expect("write");
        let tree = SourceTree::new(dir.path());
        (dir, tree)
    }

    fn kind_at(tree: &SourceTree, path: &Path, line: u32) -> Option<String> {
        tree.statements_at(path, line)
            .expect("statements")
            .first()
            .map(|stmt| stmt.kind.clone())
    }

    #[test]
    fn resolves_by_package_path() {
        let (_dir, tree) = project();
        let path = tree
            .resolve("org.example.cache.LruCache$Entry", "LruCache.java", 6)
            .expect("in project");
        assert!(path.ends_with("org/example/cache/LruCache.java"));
        assert!(tree.resolve("org.junit.Assert", "Assert.java", 6).is_none());
        assert!(tree
            .resolve("org.example.cache.LruCache", "LruCache.java", 900)
            .is_none());
    }

    #[test]
    fn classifies_lines() {
        let (_dir, tree) = project();
        let path = tree
            .resolve("org.example.cache.LruCache", "LruCache.java", 1)
            .expect("in project");
        assert_eq!(kind_at(&tree, &path, 1), None, "package declaration");
        assert_eq!(kind_at(&tree, &path, 2), None, "blank");
        assert_eq!(kind_at(&tree, &path, 4), None, "comment");
        assert_eq!(kind_at(&tree, &path, 5), None, "method header");
        assert_eq!(kind_at(&tree, &path, 6).as_deref(), Some(kinds::EXPR_STMT));
        assert_eq!(kind_at(&tree, &path, 7).as_deref(), Some(kinds::WHILE));
        assert_eq!(kind_at(&tree, &path, 8).as_deref(), Some(kinds::IF));
        assert_eq!(kind_at(&tree, &path, 9), None, "closing brace");
        assert_eq!(kind_at(&tree, &path, 10), None, "bare else");
        assert_eq!(kind_at(&tree, &path, 12).as_deref(), Some(kinds::FOREACH));
        assert_eq!(kind_at(&tree, &path, 99), None, "past the end");
    }

    #[test]
    fn keywords_inside_strings_are_ignored() {
        let (_dir, tree) = project();
        let path = tree
            .resolve("org.example.cache.LruCache", "LruCache.java", 1)
            .expect("in project");
        let stmts = tree.statements_at(&path, 11).expect("statements");
        assert_eq!(stmts.len(), 1);
        assert!(!stmts[0].any(&|node| kinds::is_control_flow(&node.kind)));
    }

    #[test]
    fn nested_control_flow_is_visible() {
        let stmt = line_statement("x = 1; if (y) z();").expect("statement");
        assert_eq!(stmt.kind, kinds::EXPR_STMT);
        assert!(stmt.any(&|node| kinds::is_control_flow(&node.kind)));
    }

    #[test]
    fn missing_file_is_an_error() {
        let tree = SourceTree::new("/nonexistent");
        assert!(tree
            .statements_at(Path::new("/nonexistent/A.java"), 1)
            .is_err());
    }
}
