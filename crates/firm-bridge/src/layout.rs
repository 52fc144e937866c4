//! Namespace layout of a contract directory.
//!
//! ```text
//! /.firm/<address>/
//!     above/          messages archived before submission
//!     sc/abi.json     interface description, when known
//!     sc/deployment.json
//!     below/in/       messages whose transactions were applied
//! ```

use firm_types::{Address, ContentId};

use crate::error::{BridgeError, BridgeResult};

/// Root of all contract directories.
pub const FIRM_ROOT: &str = "/.firm";

/// Paths inside one contract directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractPaths {
    root: String,
}

impl ContractPaths {
    pub fn new(address: &Address) -> Self {
        Self {
            root: format!("{FIRM_ROOT}/{}", address.to_canonical()),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn above(&self) -> String {
        format!("{}/above", self.root)
    }

    /// `above/<cid>` with an optional extension.
    pub fn above_entry(&self, cid: &ContentId, ext: Option<&str>) -> String {
        match ext {
            Some(ext) => format!("{}/above/{cid}.{ext}", self.root),
            None => format!("{}/above/{cid}", self.root),
        }
    }

    pub fn sc(&self) -> String {
        format!("{}/sc", self.root)
    }

    pub fn abi(&self) -> String {
        format!("{}/sc/abi.json", self.root)
    }

    pub fn deployment(&self) -> String {
        format!("{}/sc/deployment.json", self.root)
    }

    pub fn below(&self) -> String {
        format!("{}/below", self.root)
    }

    pub fn below_in(&self) -> String {
        format!("{}/below/in", self.root)
    }

    pub fn below_in_entry(&self, cid: &ContentId) -> String {
        format!("{}/below/in/{cid}.json", self.root)
    }

    /// Resolve a caller-supplied relative path. The empty path is the
    /// directory itself; `..` components are rejected.
    pub fn sub_path(&self, sub: &str) -> BridgeResult<String> {
        let parts: Vec<&str> = sub.split('/').filter(|p| !p.is_empty() && *p != ".").collect();
        if parts.iter().any(|p| *p == "..") {
            return Err(BridgeError::InvalidArgument(format!(
                "path escapes contract directory: {sub}"
            )));
        }
        if parts.is_empty() {
            return Ok(self.root.clone());
        }
        Ok(format!("{}/{}", self.root, parts.join("/")))
    }
}

/// Immutable path of a stored object.
pub fn ipfs_path(cid: &ContentId) -> String {
    format!("/ipfs/{cid}")
}

/// Normalize an entry extension: a leading dot is dropped; empty names and
/// separators are rejected.
pub fn normalize_extension(ext: &str) -> BridgeResult<&str> {
    let trimmed = ext.strip_prefix('.').unwrap_or(ext);
    if trimmed.is_empty() || trimmed.starts_with('.') || trimmed.contains('/') {
        return Err(BridgeError::InvalidArgument(format!("invalid extension: {ext:?}")));
    }
    Ok(trimmed)
}
