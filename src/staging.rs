use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Write `bytes` to `dest` through a sibling temp file and a rename.
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let tmp_path = temp_sibling(dest);
    fs::write(&tmp_path, bytes).with_context(|| format!("write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, dest).with_context(|| format!("publish {}", dest.display()))?;
    Ok(())
}

/// Publish a set of files under `root` in order. Existing files are backed
/// up first; if any write fails, everything written so far is rolled back
/// and the backups are restored.
pub fn publish_files(root: &Path, files: &[(String, Vec<u8>)]) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(root).with_context(|| format!("create {}", root.display()))?;
    let backup_root = root.join(".backup");
    let mut published = Vec::new();
    let mut backups: Vec<(PathBuf, PathBuf)> = Vec::new();
    for (rel, bytes) in files {
        let dest = root.join(rel);
        if dest.exists() {
            let backup = backup_root.join(rel);
            if let Some(parent) = backup.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            fs::rename(&dest, &backup)
                .or_else(|_| fs::copy(&dest, &backup).map(|_| ()))
                .with_context(|| format!("backup {}", dest.display()))?;
            backups.push((dest.clone(), backup));
        }
        if let Err(err) = write_atomic(&dest, bytes) {
            rollback(&published, &backups);
            return Err(err);
        }
        published.push(dest);
    }
    if backup_root.exists() {
        let _ = fs::remove_dir_all(&backup_root);
    }
    Ok(published)
}

/// Every file under `root`, sorted. Entries `skip` rejects (given their path
/// relative to `root`) are pruned during the walk, and symlinked directories
/// are never followed.
pub fn collect_files_recursive(root: &Path, skip: &dyn Fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if root.exists() {
        walk(root, root, skip, &mut files)?;
    }
    files.sort();
    Ok(files)
}

fn walk(
    root: &Path,
    dir: &Path,
    skip: &dyn Fn(&Path) -> bool,
    files: &mut Vec<PathBuf>,
) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let path = entry?.path();
        let rel = path
            .strip_prefix(root)
            .map_err(|_| anyhow!("{} escaped {}", path.display(), root.display()))?;
        if skip(rel) {
            continue;
        }
        let meta =
            fs::symlink_metadata(&path).with_context(|| format!("stat {}", path.display()))?;
        if meta.is_dir() {
            walk(root, &path, skip, files)?;
        } else if meta.is_file() || (meta.file_type().is_symlink() && path.is_file()) {
            files.push(path);
        }
    }
    Ok(())
}

/// Copy every file under `source` into `dest`, pruning paths `skip` rejects.
/// Returns the copied destination paths.
pub fn copy_tree(source: &Path, dest: &Path, skip: &dyn Fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    let mut copied = Vec::new();
    for file in collect_files_recursive(source, skip)? {
        let rel = file
            .strip_prefix(source)
            .map_err(|_| anyhow!("{} escaped {}", file.display(), source.display()))?;
        let target = dest.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::copy(&file, &target).with_context(|| format!("copy {}", file.display()))?;
        copied.push(target);
    }
    Ok(copied)
}

fn temp_sibling(dest: &Path) -> PathBuf {
    let file_name = dest
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("staged");
    dest.parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!(".{file_name}.tmp"))
}

fn rollback(published: &[PathBuf], backups: &[(PathBuf, PathBuf)]) {
    for path in published {
        if path.exists() {
            let _ = fs::remove_file(path);
        }
    }
    for (dest, backup) in backups {
        if let Some(parent) = dest.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let _ = fs::rename(backup, dest).or_else(|_| fs::copy(backup, dest).map(|_| ()));
    }
}
