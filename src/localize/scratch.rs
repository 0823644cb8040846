//! Scratch copies of the project under test.
use super::runner::run_with_timeout;
use super::ScratchBuilder;
use crate::staging;
use crate::tree::{kinds, SyntaxNode};
use anyhow::{bail, Context};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Directories never copied into a scratch tree.
const SKIPPED_DIRS: [&str; 4] = [".git", "target", "build", ".patchgen"];

/// Replace the body of every `catch` clause that does not already throw
/// with a rethrow of the caught variable, so suppressed exceptions surface
/// in the trace. Untouched subtrees stay shared. Returns the rewritten tree
/// and the number of handlers changed.
pub fn rewrite_exception_handlers(node: &Arc<SyntaxNode>) -> (Arc<SyntaxNode>, usize) {
    if node.kind == kinds::CATCH {
        if let Some(rewritten) = rethrowing_handler(node) {
            return (Arc::new(rewritten), 1);
        }
    }
    let mut changed = 0;
    let children: Vec<Arc<SyntaxNode>> = node
        .children
        .iter()
        .map(|child| {
            let (child, count) = rewrite_exception_handlers(child);
            changed += count;
            child
        })
        .collect();
    if changed == 0 {
        return (Arc::clone(node), 0);
    }
    let mut copy = (**node).clone();
    copy.children = children;
    (Arc::new(copy), changed)
}

/// `catch (T e) { ... }` as `[param, body]`; `None` when the body already
/// throws or the clause has no named parameter.
fn rethrowing_handler(handler: &SyntaxNode) -> Option<SyntaxNode> {
    let [param, body] = handler.children.as_slice() else {
        return None;
    };
    if body.any(&|node| node.kind == kinds::THROW) {
        return None;
    }
    let caught = param.ident()?;
    let rethrow = SyntaxNode::stmt(kinds::THROW, vec![SyntaxNode::reference(caught)]);
    let mut copy = handler.clone();
    copy.children = vec![
        Arc::clone(param),
        Arc::new(SyntaxNode::stmt(kinds::BLOCK, vec![rethrow])),
    ];
    Some(copy)
}

/// Front end bridging source files and the tree model.
pub trait SourceCodec: Send + Sync {
    /// Parse `source`; `None` for files the codec does not handle.
    fn parse(&self, path: &Path, source: &str) -> anyhow::Result<Option<Arc<SyntaxNode>>>;
    fn render(&self, path: &Path, tree: &SyntaxNode) -> anyhow::Result<String>;
}

/// Copies the project into the scratch directory, optionally rewrites
/// handlers through a [`SourceCodec`], then runs the build command there.
pub struct CopyScratchBuilder {
    root: PathBuf,
    build_command: Option<Vec<String>>,
    build_timeout: Duration,
    codec: Option<Box<dyn SourceCodec>>,
}

impl CopyScratchBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            build_command: None,
            build_timeout: Duration::from_secs(600),
            codec: None,
        }
    }

    pub fn with_build_command(mut self, argv: Vec<String>, timeout: Duration) -> Self {
        self.build_command = (!argv.is_empty()).then_some(argv);
        self.build_timeout = timeout;
        self
    }

    pub fn with_codec(mut self, codec: Box<dyn SourceCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    fn rewrite_file(&self, codec: &dyn SourceCodec, path: &Path) -> anyhow::Result<usize> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        let Some(tree) = codec.parse(path, &source)? else {
            return Ok(0);
        };
        let (rewritten, changed) = rewrite_exception_handlers(&tree);
        if changed > 0 {
            let rendered = codec.render(path, &rewritten)?;
            staging::write_atomic(path, rendered.as_bytes())?;
        }
        Ok(changed)
    }
}

fn skipped(rel: &Path) -> bool {
    rel.components().any(|component| match component {
        Component::Normal(name) => SKIPPED_DIRS.iter().any(|dir| name == *dir),
        _ => false,
    })
}

impl ScratchBuilder for CopyScratchBuilder {
    fn prepare(&self, scratch: &Path, rewrite_handlers: bool) -> anyhow::Result<()> {
        let copied = staging::copy_tree(&self.root, scratch, &skipped)
            .with_context(|| format!("copy {} to scratch", self.root.display()))?;
        tracing::debug!(files = copied.len(), scratch = %scratch.display(), "scratch copy ready");

        if rewrite_handlers {
            match &self.codec {
                Some(codec) => {
                    let mut rewritten = 0;
                    for path in &copied {
                        rewritten += self.rewrite_file(codec.as_ref(), path)?;
                    }
                    tracing::debug!(handlers = rewritten, "rewrote exception handlers");
                }
                None => tracing::warn!("handler rewrite requested but no source codec is set"),
            }
        }

        if let Some(argv) = &self.build_command {
            let output = run_with_timeout(argv, scratch, self.build_timeout)
                .context("run scratch build")?;
            if output.timed_out {
                bail!("scratch build timed out after {:?}", self.build_timeout);
            }
            if !output.success() {
                bail!("scratch build failed: {}", output.stderr.trim());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeClass;
    use std::fs;

    fn handler(param: &str, body: Vec<SyntaxNode>) -> SyntaxNode {
        SyntaxNode::new(kinds::CATCH, NodeClass::Other).with_children(vec![
            Arc::new(SyntaxNode::reference(param).with_ty("IOException")),
            Arc::new(SyntaxNode::stmt(kinds::BLOCK, body)),
        ])
    }

    fn try_stmt(handlers: Vec<SyntaxNode>) -> Arc<SyntaxNode> {
        let mut children = vec![SyntaxNode::stmt(kinds::BLOCK, Vec::new())];
        children.extend(handlers);
        Arc::new(SyntaxNode::stmt(kinds::TRY, children))
    }

    #[test]
    fn swallowing_handler_rethrows() {
        let log = SyntaxNode::stmt(kinds::EXPR_STMT, vec![SyntaxNode::reference("log")]);
        let tree = try_stmt(vec![handler("e", vec![log])]);
        let (rewritten, changed) = rewrite_exception_handlers(&tree);
        assert_eq!(changed, 1);
        let body = &rewritten.children[1].children[1];
        assert_eq!(body.to_string(), "(block (throw e))");
        assert!(Arc::ptr_eq(&tree.children[0], &rewritten.children[0]));
    }

    #[test]
    fn handler_that_throws_is_kept() {
        let rethrow = SyntaxNode::stmt(kinds::THROW, vec![SyntaxNode::reference("e")]);
        let tree = try_stmt(vec![handler("e", vec![rethrow])]);
        let (rewritten, changed) = rewrite_exception_handlers(&tree);
        assert_eq!(changed, 0);
        assert!(Arc::ptr_eq(&tree, &rewritten));
    }

    struct LineCodec;

    /// One `catch <var>` line is one handler with an empty body.
    impl SourceCodec for LineCodec {
        fn parse(&self, path: &Path, source: &str) -> anyhow::Result<Option<Arc<SyntaxNode>>> {
            if path.extension().and_then(|ext| ext.to_str()) != Some("src") {
                return Ok(None);
            }
            let handlers = source
                .lines()
                .filter_map(|line| line.strip_prefix("catch "))
                .map(|var| handler(var.trim(), Vec::new()))
                .collect();
            Ok(Some(try_stmt(handlers)))
        }

        fn render(&self, _path: &Path, tree: &SyntaxNode) -> anyhow::Result<String> {
            Ok(tree.to_string())
        }
    }

    #[test]
    fn prepare_copies_and_rewrites() {
        let project = tempfile::tempdir().expect("project");
        fs::create_dir_all(project.path().join("src")).expect("mkdir");
        fs::create_dir_all(project.path().join("target")).expect("mkdir");
        fs::write(project.path().join("src/Main.src"), "catch err\n").expect("write");
        fs::write(project.path().join("src/notes.txt"), "catch err\n").expect("write");
        fs::write(project.path().join("target/out.bin"), "x").expect("write");

        let scratch = tempfile::tempdir().expect("scratch");
        let builder = CopyScratchBuilder::new(project.path()).with_codec(Box::new(LineCodec));
        builder.prepare(scratch.path(), true).expect("prepare");

        let rewritten = fs::read_to_string(scratch.path().join("src/Main.src")).expect("read");
        assert!(rewritten.contains("(throw err)"), "{rewritten}");
        let untouched = fs::read_to_string(scratch.path().join("src/notes.txt")).expect("read");
        assert_eq!(untouched, "catch err\n");
        assert!(!scratch.path().join("target").exists());
        let original = fs::read_to_string(project.path().join("src/Main.src")).expect("read");
        assert_eq!(original, "catch err\n");
    }

    #[cfg(unix)]
    #[test]
    fn failing_build_is_an_error() {
        let project = tempfile::tempdir().expect("project");
        let scratch = tempfile::tempdir().expect("scratch");
        let builder = CopyScratchBuilder::new(project.path()).with_build_command(
            vec!["sh".into(), "-c".into(), "echo broken >&2; exit 2".into()],
            Duration::from_secs(10),
        );
        let err = builder.prepare(scratch.path(), false).expect_err("build fails");
        assert!(err.to_string().contains("broken"));
    }
}
