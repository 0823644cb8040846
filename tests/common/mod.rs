//! Shared test infrastructure for integration tests.
#![allow(dead_code)]

use patchgen::site::{Site, VariableInfo, Visibility};
use patchgen::tree::{kinds, Fragment, NodeClass, NodeSignature, SyntaxNode, Token};
use std::path::Path;
use std::sync::Arc;

pub fn call(name: &str, args: Vec<SyntaxNode>) -> SyntaxNode {
    SyntaxNode::new(kinds::CALL, NodeClass::Expr)
        .with_token(Token::Ident(name.to_string()))
        .with_children(args.into_iter().map(Arc::new).collect())
}

pub fn call_stmt(name: &str, arg: &str) -> SyntaxNode {
    SyntaxNode::stmt(kinds::EXPR_STMT, vec![call(name, vec![SyntaxNode::reference(arg)])])
}

pub fn fragment(nodes: Vec<SyntaxNode>) -> Fragment {
    nodes.into_iter().map(Arc::new).collect()
}

pub fn variable(name: &str, visibility: Visibility) -> VariableInfo {
    VariableInfo {
        name: name.to_string(),
        ty: None,
        visibility,
    }
}

/// Site inside a `while` whose target is `nodes`, with `extra` variables in
/// scope besides the ones the target references.
pub fn site_with(nodes: Vec<SyntaxNode>, extra: &[&str]) -> Site {
    let site = Site::new(vec![NodeSignature::single(kinds::WHILE)], fragment(nodes));
    let mut variables = site.variables.clone();
    variables.extend(extra.iter().map(|name| variable(name, Visibility::Before)));
    site.with_variables(variables)
}

pub fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent directory");
    }
    std::fs::write(path, contents.as_bytes()).expect("write file");
}
