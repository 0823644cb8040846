//! Corpus directories: a `manifest` naming the transform documents, and one
//! `gen<idx>.json` per transform.
//!
//! The manifest is a single whitespace-separated line `<N> <idx_1> ... <idx_N>`.
use crate::error::{Error, Result};
use crate::generator::VarGenerator;
use crate::schema::{SlotId, TransformSchema};
use crate::staging;
use crate::transform::CodeTransform;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub const TRANSFORM_SCHEMA_VERSION: u32 = 1;
pub const MANIFEST_FILE: &str = "manifest";

/// On-disk form of one transform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformDocument {
    pub schema_version: u32,
    pub provenance: String,
    pub schema: TransformSchema,
    #[serde(default)]
    pub generators: BTreeMap<SlotId, VarGenerator>,
}

impl TransformDocument {
    pub fn from_transform(provenance: &str, transform: &CodeTransform) -> Self {
        Self {
            schema_version: TRANSFORM_SCHEMA_VERSION,
            provenance: provenance.to_string(),
            schema: transform.schema().clone(),
            generators: transform.generators().clone(),
        }
    }

    pub fn into_transform(self) -> Result<(String, CodeTransform)> {
        if self.schema_version != TRANSFORM_SCHEMA_VERSION {
            return Err(Error::InvalidTransform(format!(
                "unsupported schema_version {} (expected {TRANSFORM_SCHEMA_VERSION})",
                self.schema_version
            )));
        }
        let transform = CodeTransform::new(Arc::new(self.schema), self.generators)?;
        Ok((self.provenance, transform))
    }
}

pub fn gen_file_name(idx: u64) -> String {
    format!("gen{idx}.json")
}

pub fn parse_manifest(text: &str) -> std::result::Result<Vec<u64>, String> {
    let mut tokens = text.split_whitespace();
    let count: usize = tokens
        .next()
        .ok_or_else(|| "manifest is empty".to_string())?
        .parse()
        .map_err(|err| format!("invalid entry count: {err}"))?;
    let indices = tokens
        .map(|token| {
            token
                .parse::<u64>()
                .map_err(|err| format!("invalid index {token:?}: {err}"))
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    if indices.len() != count {
        return Err(format!(
            "manifest declares {count} entries but lists {}",
            indices.len()
        ));
    }
    Ok(indices)
}

pub fn render_manifest(indices: &[u64]) -> String {
    let mut line = indices.len().to_string();
    for idx in indices {
        line.push(' ');
        line.push_str(&idx.to_string());
    }
    line.push('\n');
    line
}

/// Load every transform a corpus directory lists, in manifest order.
pub fn read_corpus(dir: &Path) -> Result<Vec<(String, CodeTransform)>> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let text = fs::read_to_string(&manifest_path)
        .map_err(|err| Error::corpus(&manifest_path, err.to_string()))?;
    let indices = parse_manifest(&text).map_err(|message| Error::corpus(&manifest_path, message))?;

    let mut entries = Vec::with_capacity(indices.len());
    for idx in indices {
        let path = dir.join(gen_file_name(idx));
        let text =
            fs::read_to_string(&path).map_err(|err| Error::corpus(&path, err.to_string()))?;
        let doc: TransformDocument =
            serde_json::from_str(&text).map_err(|err| Error::corpus(&path, err.to_string()))?;
        let entry = doc
            .into_transform()
            .map_err(|err| Error::corpus(&path, err.to_string()))?;
        entries.push(entry);
    }
    tracing::debug!(dir = %dir.display(), transforms = entries.len(), "loaded corpus");
    Ok(entries)
}

/// Write `entries` as a corpus directory, numbering documents from zero.
/// The manifest is published last.
pub fn write_corpus<'a, I>(dir: &Path, entries: I) -> Result<usize>
where
    I: IntoIterator<Item = (&'a str, &'a CodeTransform)>,
{
    let mut files = Vec::new();
    let mut indices = Vec::new();
    for (idx, (provenance, transform)) in (0u64..).zip(entries) {
        let doc = TransformDocument::from_transform(provenance, transform);
        let mut bytes = serde_json::to_vec_pretty(&doc)?;
        bytes.push(b'\n');
        files.push((gen_file_name(idx), bytes));
        indices.push(idx);
    }
    files.push((
        MANIFEST_FILE.to_string(),
        render_manifest(&indices).into_bytes(),
    ));
    staging::publish_files(dir, &files).map_err(|err| Error::corpus(dir, format!("{err:#}")))?;
    Ok(indices.len())
}
