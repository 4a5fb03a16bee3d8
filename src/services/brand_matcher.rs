// src/services/brand_matcher.rs
use std::collections::HashMap;

use crate::models::BrandCatalogEntry;
use crate::text::{DEFAULT_SIMILARITY_CUTOFF, best_match, normalize_text};

/// Resolves free-text brand names against the brand catalog.
#[derive(Debug)]
pub struct BrandMatcher {
    entries: Vec<BrandCatalogEntry>,
    index: HashMap<String, usize>,
    /// Normalized keys in insertion order, for fuzzy search.
    keys: Vec<String>,
}

impl BrandMatcher {
    pub fn new(entries: Vec<BrandCatalogEntry>) -> Self {
        let mut index = HashMap::new();
        let mut keys = Vec::new();
        for (idx, entry) in entries.iter().enumerate() {
            for variant in entry.name_variants() {
                let key = normalize_text(variant);
                if key.is_empty() || index.contains_key(&key) {
                    continue;
                }
                index.insert(key.clone(), idx);
                keys.push(key);
            }
        }
        Self {
            entries,
            index,
            keys,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, raw_name: &str) -> Option<&BrandCatalogEntry> {
        let normalized = normalize_text(raw_name);
        if normalized.is_empty() {
            return None;
        }
        if let Some(&idx) = self.index.get(&normalized) {
            return Some(&self.entries[idx]);
        }
        let (key_idx, _) = best_match(
            &normalized,
            self.keys.iter().map(String::as_str),
            DEFAULT_SIMILARITY_CUTOFF,
        )?;
        self.index
            .get(&self.keys[key_idx])
            .map(|&idx| &self.entries[idx])
    }
}
