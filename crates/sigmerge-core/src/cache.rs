//! Read-through geometry cache
//!
//! Geometry extraction is deterministic and side-effect-free, so a
//! document's geometry is computed once and reused across many
//! interactive placement operations. Entries are keyed by document
//! source identity (URL or content hash, chosen by the caller) and
//! evicted least-recently-used. Insertion is whole-entry only; callers
//! sharing a cache across threads wrap it in a lock.

use crate::error::SigMergeError;
use pagegeom::{extract_geometry, DocumentGeometry};
use std::collections::HashMap;
use std::collections::VecDeque;
use tracing::debug;

pub struct GeometryCache {
    capacity: usize,
    entries: HashMap<String, DocumentGeometry>,
    // Front = least recently used
    order: VecDeque<String>,
}

impl GeometryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&mut self, key: &str) -> Option<DocumentGeometry> {
        if let Some(geometry) = self.entries.get(key) {
            let geometry = geometry.clone();
            self.touch(key);
            Some(geometry)
        } else {
            None
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, geometry: DocumentGeometry) {
        let key = key.into();
        if self.entries.insert(key.clone(), geometry).is_none() {
            self.order.push_back(key);
            self.evict();
        } else {
            self.touch(&key);
        }
    }

    /// Extract geometry from `pdf_bytes` unless an entry for `key`
    /// already exists.
    pub fn get_or_extract(
        &mut self,
        key: &str,
        pdf_bytes: &[u8],
    ) -> Result<DocumentGeometry, SigMergeError> {
        if let Some(geometry) = self.get(key) {
            debug!(key, "geometry cache hit");
            return Ok(geometry);
        }
        let geometry = extract_geometry(pdf_bytes)?;
        self.insert(key, geometry.clone());
        Ok(geometry)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let key = self.order.remove(pos).unwrap_or_default();
            self.order.push_back(key);
        }
    }

    fn evict(&mut self) {
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            debug!(key = oldest, "evicting geometry cache entry");
            self.entries.remove(&oldest);
        }
    }
}
