use std::sync::Arc;

use shared::{
    domain::{matches_search, CategoryFilter, EmergencyCategory},
    protocol::ModuleSummary,
};
use tracing::debug;

use crate::{error::ClientError, progress::distinct_categories, CatalogApi};

pub struct ModuleCatalog {
    api: Arc<dyn CatalogApi>,
    modules: Vec<ModuleSummary>,
}

impl ModuleCatalog {
    pub fn new(api: Arc<dyn CatalogApi>) -> Self {
        Self {
            api,
            modules: Vec::new(),
        }
    }

    pub async fn load(&mut self) -> Result<&[ModuleSummary], ClientError> {
        self.modules = self.api.list_modules().await?;
        debug!(count = self.modules.len(), "catalog: modules loaded");
        Ok(&self.modules)
    }

    pub fn modules(&self) -> &[ModuleSummary] {
        &self.modules
    }

    pub fn categories(&self) -> Vec<EmergencyCategory> {
        distinct_categories(&self.modules)
    }

    pub fn filter(&self, category: &CategoryFilter, search: &str) -> Vec<&ModuleSummary> {
        filter_modules(&self.modules, category, search)
    }
}

pub fn filter_modules<'a>(
    modules: &'a [ModuleSummary],
    category: &CategoryFilter,
    search: &str,
) -> Vec<&'a ModuleSummary> {
    modules
        .iter()
        .filter(|module| category.matches(module.category.as_ref()))
        .filter(|module| matches_search(&module.title, search))
        .collect()
}

#[cfg(test)]
#[path = "tests/catalog_tests.rs"]
mod tests;
