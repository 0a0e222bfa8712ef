//! Immutable species catalog, loaded once per session.

use std::{collections::HashSet, sync::Arc};

use shared::domain::Species;
use tracing::{info, warn};

use crate::{error::CatalogLoadError, CatalogSource};

#[derive(Debug, Clone, Default)]
pub struct CatalogCache {
    species: Vec<Arc<Species>>,
    loaded: bool,
}

impl CatalogCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches and installs the catalog. On failure the cache stays empty.
    pub async fn load(&mut self, source: &dyn CatalogSource) -> Result<usize, CatalogLoadError> {
        let species = Self::fetch(source).await?;
        Ok(self.install(species))
    }

    async fn fetch(source: &dyn CatalogSource) -> Result<Vec<Species>, CatalogLoadError> {
        let response = source.fetch_catalog().await?;
        if response.count != response.species.len() {
            warn!(
                "catalog: reported count {} differs from {} received species",
                response.count,
                response.species.len()
            );
        }
        Ok(response.species)
    }

    /// Replaces the cache contents, dropping repeated names (first wins).
    pub(crate) fn install(&mut self, species: Vec<Species>) -> usize {
        let mut seen = HashSet::new();
        self.species = species
            .into_iter()
            .filter(|entry| {
                let fresh = seen.insert(entry.name.clone());
                if !fresh {
                    warn!("catalog: dropping duplicate species name={}", entry.name);
                }
                fresh
            })
            .map(Arc::new)
            .collect();
        self.loaded = true;
        info!("catalog: loaded {} species", self.species.len());
        self.species.len()
    }

    pub fn all(&self) -> Vec<Arc<Species>> {
        self.species.clone()
    }

    pub fn find(&self, name: &str) -> Option<Arc<Species>> {
        self.species
            .iter()
            .find(|entry| entry.name == name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

#[cfg(test)]
#[path = "tests/catalog_tests.rs"]
mod tests;
