// src/catalog.rs
//! Immutable brand/category reference data, loaded once and shared by `Arc`.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use log::{info, warn};
use serde::Deserialize;

use crate::errors::AnalyzerError;
use crate::models::{BrandCatalogEntry, CategoryCatalogEntry};
use crate::services::brand_matcher::BrandMatcher;
use crate::text::{compress_whitespace, normalize_label};

/// Everything the pipeline reads from the catalogs. A reload builds a new
/// snapshot and swaps the `Arc` holding it.
#[derive(Debug)]
pub struct CatalogSnapshot {
    pub brands: BrandMatcher,
    pub categories: CategoryCatalog,
}

impl CatalogSnapshot {
    pub fn new(brands: Vec<BrandCatalogEntry>, categories: CategoryCatalog) -> Self {
        Self {
            brands: BrandMatcher::new(brands),
            categories,
        }
    }

    pub fn load(brand_csv: &Path, category_csv: &Path) -> Result<Self, AnalyzerError> {
        let categories = CategoryCatalog::load(category_csv)?;
        if categories.is_empty() {
            return Err(AnalyzerError::Catalog(format!(
                "no usable rows in {}",
                category_csv.display()
            )));
        }
        let snapshot = Self::new(load_brands(brand_csv)?, categories);
        if snapshot.brands.is_empty() {
            warn!("brand catalog {} is empty", brand_csv.display());
        }
        info!(
            "Loaded catalogs: {} brands, {} categories in {} groups",
            snapshot.brands.len(),
            snapshot.categories.len(),
            snapshot.categories.group_count()
        );
        Ok(snapshot)
    }
}

#[derive(Debug, Default)]
pub struct CategoryCatalog {
    entries: Vec<CategoryCatalogEntry>,
    by_group: HashMap<String, Vec<usize>>,
    lookup: HashMap<(String, String), usize>,
}

impl CategoryCatalog {
    pub fn new(entries: Vec<CategoryCatalogEntry>) -> Self {
        let mut by_group: HashMap<String, Vec<usize>> = HashMap::new();
        let mut lookup = HashMap::new();
        for (idx, entry) in entries.iter().enumerate() {
            let group_key = normalize_label(&entry.group_name);
            by_group.entry(group_key.clone()).or_default().push(idx);
            lookup.insert((group_key, normalize_label(&entry.name)), idx);
        }
        Self {
            entries,
            by_group,
            lookup,
        }
    }

    pub fn load(path: &Path) -> Result<Self, AnalyzerError> {
        let file = std::fs::File::open(path).map_err(|e| {
            AnalyzerError::Catalog(format!("cannot open {}: {}", path.display(), e))
        })?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, AnalyzerError> {
        #[derive(Deserialize)]
        struct Row {
            #[serde(default)]
            category_id: Option<String>,
            #[serde(default)]
            category_name: Option<String>,
            #[serde(default)]
            path: Option<String>,
            #[serde(default)]
            group_name: Option<String>,
        }

        let mut entries = Vec::new();
        for row in csv_reader(reader).deserialize::<Row>() {
            let row = row.map_err(|e| AnalyzerError::Catalog(e.to_string()))?;
            let id = compress_whitespace(row.category_id.as_deref().unwrap_or(""));
            let name = row
                .category_name
                .filter(|n| !n.trim().is_empty())
                .or(row.path)
                .map(|n| compress_whitespace(&n))
                .unwrap_or_default();
            let group_name = match row.group_name.map(|g| compress_whitespace(&g)) {
                Some(group) if !group.is_empty() => group,
                // rows without a group belong to the first path segment
                _ => name.split(" > ").next().unwrap_or("").trim().to_string(),
            };
            if id.is_empty() || name.is_empty() || group_name.is_empty() {
                continue;
            }
            entries.push(CategoryCatalogEntry {
                id,
                name,
                group_name,
            });
        }
        Ok(Self::new(entries))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn group_count(&self) -> usize {
        self.by_group.len()
    }

    /// Candidate entries for one group, in catalog order.
    pub fn by_group(&self, group_name: &str) -> Vec<&CategoryCatalogEntry> {
        self.by_group
            .get(&normalize_label(group_name))
            .map(|idxs| idxs.iter().map(|&i| &self.entries[i]).collect())
            .unwrap_or_default()
    }

    pub fn find(&self, group_name: &str, path: &str) -> Option<&CategoryCatalogEntry> {
        self.lookup
            .get(&(normalize_label(group_name), normalize_label(path)))
            .map(|&i| &self.entries[i])
    }
}

pub fn load_brands(path: &Path) -> Result<Vec<BrandCatalogEntry>, AnalyzerError> {
    let file = std::fs::File::open(path)
        .map_err(|e| AnalyzerError::Catalog(format!("cannot open {}: {}", path.display(), e)))?;
    brands_from_reader(file)
}

pub fn brands_from_reader<R: Read>(reader: R) -> Result<Vec<BrandCatalogEntry>, AnalyzerError> {
    csv_reader(reader)
        .deserialize::<BrandCatalogEntry>()
        .map(|row| row.map_err(|e| AnalyzerError::Catalog(e.to_string())))
        .collect()
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader)
}
