//! Jewelry catalogs: folder discovery, list-endpoint parsing, cyclic selection.

use crate::types::{JewelryItem, JewelryKind};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Image extensions picked up by folder discovery (compared case-insensitively).
pub const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed catalog list: {0}")]
    Malformed(String),
    #[error("index {index} out of range for {len} {kind} items")]
    OutOfRange {
        kind: JewelryKind,
        index: usize,
        len: usize,
    },
    #[error("no {0} items available")]
    Empty(JewelryKind),
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|ext| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Display name for a file: its stem with the first character upper-cased.
pub fn display_name(path: &Path, fallback_index: usize, kind: JewelryKind) -> String {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let mut chars = stem.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => {
            let mut label = kind.to_string();
            label[..1].make_ascii_uppercase();
            format!("{label} {}", fallback_index + 1)
        }
    }
}

/// List overlay images in `dir`, sorted by path.
///
/// A missing directory is not an error: it yields an empty list so a
/// fresh install with no earrings folder still starts.
pub fn discover(dir: &Path, kind: JewelryKind) -> Result<Vec<JewelryItem>, CatalogError> {
    if !dir.is_dir() {
        tracing::warn!(dir = %dir.display(), %kind, "asset directory missing; catalog empty");
        return Ok(Vec::new());
    }

    let entries = std::fs::read_dir(dir).map_err(|source| CatalogError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| CatalogError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() && is_image(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    let items: Vec<JewelryItem> = paths
        .iter()
        .enumerate()
        .map(|(i, path)| JewelryItem::new(display_name(path, i, kind), path.to_string_lossy()))
        .collect();

    tracing::info!(dir = %dir.display(), %kind, count = items.len(), "discovered overlays");
    Ok(items)
}

/// Parse the list endpoint payload: `[{"name": ..., "data": ...}, ...]`.
pub fn parse_list(json: &str) -> Result<Vec<JewelryItem>, CatalogError> {
    serde_json::from_str(json).map_err(|e| CatalogError::Malformed(e.to_string()))
}

/// Cursor over a list of `len` items that wraps at both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    len: usize,
    index: usize,
}

impl Selection {
    pub fn new(len: usize) -> Self {
        Self { len, index: 0 }
    }

    /// Current index, or `None` when there is nothing to select.
    pub fn index(&self) -> Option<usize> {
        (self.len > 0).then_some(self.index)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn next(&mut self) -> Option<usize> {
        if self.len == 0 {
            return None;
        }
        self.index = (self.index + 1) % self.len;
        Some(self.index)
    }

    pub fn previous(&mut self) -> Option<usize> {
        if self.len == 0 {
            return None;
        }
        self.index = (self.index + self.len - 1) % self.len;
        Some(self.index)
    }

    /// Jump to `index`. Returns false (and leaves the cursor) when out of range.
    pub fn select(&mut self, index: usize) -> bool {
        if index < self.len {
            self.index = index;
            true
        } else {
            false
        }
    }
}

/// Both catalogs and their selections.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    chains: Vec<JewelryItem>,
    earrings: Vec<JewelryItem>,
    chain_sel: Selection,
    earring_sel: Selection,
}

impl Catalog {
    pub fn new(chains: Vec<JewelryItem>, earrings: Vec<JewelryItem>) -> Self {
        Self {
            chain_sel: Selection::new(chains.len()),
            earring_sel: Selection::new(earrings.len()),
            chains,
            earrings,
        }
    }

    /// Discover both kinds under `root/chains` and `root/earrings`.
    pub fn discover(root: &Path) -> Result<Self, CatalogError> {
        let chains = discover(&root.join(JewelryKind::Chain.asset_dir()), JewelryKind::Chain)?;
        let earrings = discover(&root.join(JewelryKind::Earring.asset_dir()), JewelryKind::Earring)?;
        Ok(Self::new(chains, earrings))
    }

    pub fn items(&self, kind: JewelryKind) -> &[JewelryItem] {
        match kind {
            JewelryKind::Chain => &self.chains,
            JewelryKind::Earring => &self.earrings,
        }
    }

    pub fn selection(&self, kind: JewelryKind) -> Selection {
        match kind {
            JewelryKind::Chain => self.chain_sel,
            JewelryKind::Earring => self.earring_sel,
        }
    }

    fn selection_mut(&mut self, kind: JewelryKind) -> &mut Selection {
        match kind {
            JewelryKind::Chain => &mut self.chain_sel,
            JewelryKind::Earring => &mut self.earring_sel,
        }
    }

    pub fn current(&self, kind: JewelryKind) -> Option<&JewelryItem> {
        self.selection(kind).index().and_then(|i| self.items(kind).get(i))
    }

    /// Replace the items for `kind` and reset its selection to the first item.
    pub fn replace(&mut self, kind: JewelryKind, items: Vec<JewelryItem>) {
        *self.selection_mut(kind) = Selection::new(items.len());
        match kind {
            JewelryKind::Chain => self.chains = items,
            JewelryKind::Earring => self.earrings = items,
        }
    }

    /// Append items after the existing ones (e.g. remote list after local folder).
    pub fn extend(&mut self, kind: JewelryKind, items: Vec<JewelryItem>) {
        let mut merged = self.items(kind).to_vec();
        let index = self.selection(kind).index().unwrap_or(0);
        merged.extend(items);
        self.replace(kind, merged);
        self.selection_mut(kind).select(index);
    }

    pub fn next(&mut self, kind: JewelryKind) -> Result<&JewelryItem, CatalogError> {
        self.selection_mut(kind).next().ok_or(CatalogError::Empty(kind))?;
        self.current(kind).ok_or(CatalogError::Empty(kind))
    }

    pub fn previous(&mut self, kind: JewelryKind) -> Result<&JewelryItem, CatalogError> {
        self.selection_mut(kind).previous().ok_or(CatalogError::Empty(kind))?;
        self.current(kind).ok_or(CatalogError::Empty(kind))
    }

    pub fn select(&mut self, kind: JewelryKind, index: usize) -> Result<&JewelryItem, CatalogError> {
        let len = self.items(kind).len();
        if !self.selection_mut(kind).select(index) {
            return Err(CatalogError::OutOfRange { kind, index, len });
        }
        self.current(kind).ok_or(CatalogError::Empty(kind))
    }
}
