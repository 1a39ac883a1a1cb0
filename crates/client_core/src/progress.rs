use std::{collections::BTreeSet, sync::Arc};

use chrono::NaiveDate;
use shared::{
    domain::{CategoryFilter, EmergencyCategory, ModuleId},
    protocol::{ModuleSummary, ProgressSummary},
};
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::{error::ClientError, session::Session, ProgressApi};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressFilters {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub module_id: Option<ModuleId>,
    pub category: CategoryFilter,
}

impl ProgressFilters {
    pub fn validate(&self) -> Result<(), ClientError> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(ClientError::validation(format!(
                    "'from' date {from} is after 'to' date {to}"
                )));
            }
        }
        Ok(())
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(from) = self.from {
            pairs.push(("from", from.format(DATE_FORMAT).to_string()));
        }
        if let Some(to) = self.to {
            pairs.push(("to", to.format(DATE_FORMAT).to_string()));
        }
        if let Some(module_id) = self.module_id {
            pairs.push(("moduleId", module_id.0.to_string()));
        }
        if let Some(category) = self.category.as_query_value() {
            pairs.push(("tipoEmergencia", category.to_string()));
        }
        pairs
    }

    /// Overlays `update` on top of these filters; fields left `None` in the
    /// update keep their current value.
    pub fn merge(&mut self, update: FilterUpdate) {
        if let Some(from) = update.from {
            self.from = from;
        }
        if let Some(to) = update.to {
            self.to = to;
        }
        if let Some(module_id) = update.module_id {
            self.module_id = module_id;
        }
        if let Some(category) = update.category {
            self.category = category;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilterUpdate {
    pub from: Option<Option<NaiveDate>>,
    pub to: Option<Option<NaiveDate>>,
    pub module_id: Option<Option<ModuleId>>,
    pub category: Option<CategoryFilter>,
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, ClientError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|_| {
        ClientError::validation(format!("'{raw}' is not a date in yyyy-mm-dd form"))
    })
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressView {
    pub loading: bool,
    pub error: Option<String>,
    pub data: Option<ProgressSummary>,
}

pub struct ProgressAggregator {
    api: Arc<dyn ProgressApi>,
    session: Arc<Session>,
    filters: Mutex<ProgressFilters>,
    view: watch::Sender<ProgressView>,
    modules: Mutex<Option<Vec<ModuleSummary>>>,
}

impl ProgressAggregator {
    pub fn new(api: Arc<dyn ProgressApi>, session: Arc<Session>) -> Self {
        let (view, _) = watch::channel(ProgressView::default());
        Self {
            api,
            session,
            filters: Mutex::new(ProgressFilters::default()),
            view,
            modules: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressView> {
        self.view.subscribe()
    }

    pub fn view(&self) -> ProgressView {
        self.view.borrow().clone()
    }

    pub async fn filters(&self) -> ProgressFilters {
        self.filters.lock().await.clone()
    }

    /// Merges `update` into the active filters and refetches.
    pub async fn query(&self, update: FilterUpdate) -> Result<(), ClientError> {
        let filters = {
            let mut guard = self.filters.lock().await;
            guard.merge(update);
            guard.clone()
        };
        self.fetch(&filters).await
    }

    pub async fn clear(&self) -> Result<(), ClientError> {
        let filters = {
            let mut guard = self.filters.lock().await;
            *guard = ProgressFilters::default();
            guard.clone()
        };
        self.fetch(&filters).await
    }

    /// Manual retry with the current filters.
    pub async fn refetch(&self) -> Result<(), ClientError> {
        let filters = self.filters().await;
        self.fetch(&filters).await
    }

    async fn fetch(&self, filters: &ProgressFilters) -> Result<(), ClientError> {
        if !self.session.is_authenticated().await {
            debug!("progress: session not ready, skipping fetch");
            return Ok(());
        }
        if let Err(err) = filters.validate() {
            self.view.send_modify(|view| view.error = Some(err.to_string()));
            return Err(err);
        }

        self.view.send_modify(|view| {
            view.loading = true;
            view.error = None;
        });
        let result = self.api.progress_summary(filters).await;
        match result {
            Ok(summary) => {
                self.view.send_modify(|view| {
                    view.loading = false;
                    view.data = Some(summary);
                });
                Ok(())
            }
            Err(err) => {
                let message = describe_progress_error(&err);
                self.view.send_modify(|view| {
                    view.loading = false;
                    view.error = Some(message);
                });
                Err(err)
            }
        }
    }

    /// Distinct, sorted categories of the visible modules. Fetched once per
    /// aggregator; failures are logged and yield an empty list.
    pub async fn load_categories(&self) -> Vec<EmergencyCategory> {
        let mut guard = self.modules.lock().await;
        if guard.is_none() {
            if !self.session.is_authenticated().await {
                return Vec::new();
            }
            match self.api.list_modules().await {
                Ok(modules) => *guard = Some(modules),
                Err(err) => {
                    warn!("progress: could not load category filters: {err}");
                    return Vec::new();
                }
            }
        }
        guard
            .as_deref()
            .map(distinct_categories)
            .unwrap_or_default()
    }

    pub async fn module_options(&self) -> Vec<ModuleSummary> {
        self.load_categories().await;
        self.modules.lock().await.clone().unwrap_or_default()
    }
}

pub fn distinct_categories(modules: &[ModuleSummary]) -> Vec<EmergencyCategory> {
    modules
        .iter()
        .filter_map(|module| module.category.clone())
        .filter(|category| !category.as_str().trim().is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn describe_progress_error(err: &ClientError) -> String {
    match err {
        ClientError::NotFound { .. } => "progress endpoint not found (404)".to_string(),
        ClientError::Http { status, .. } => format!("HTTP {status}"),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "tests/progress_tests.rs"]
mod tests;
