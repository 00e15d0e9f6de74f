//! Partial success bookkeeping for a report run

use crate::model::Resolution;
use serde::Serialize;
use std::collections::HashMap;
use strum::IntoEnumIterator;
use tracing::{info, warn};

/// A store that was skipped because its images could not be prepared
#[derive(Debug, Clone, Serialize)]
pub struct StoreFailure {
    /// Position of the store in discovery order
    pub index: usize,
    pub store: String,
    pub error: String,
}

/// Outcome counts for one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub stores_total: usize,
    pub stores_rendered: usize,
    pub failures: Vec<StoreFailure>,
    image_outcomes: HashMap<Resolution, usize>,
}

impl RunSummary {
    pub fn new(stores_total: usize) -> Self {
        Self {
            stores_total,
            ..Self::default()
        }
    }

    pub fn add_success(&mut self) {
        self.stores_rendered += 1;
    }

    pub fn add_failure(&mut self, index: usize, store: impl Into<String>, error: impl ToString) {
        self.failures.push(StoreFailure {
            index,
            store: store.into(),
            error: error.to_string(),
        });
    }

    pub fn record_image(&mut self, resolution: Resolution) {
        *self.image_outcomes.entry(resolution).or_default() += 1;
    }

    pub fn image_count(&self, resolution: Resolution) -> usize {
        self.image_outcomes.get(&resolution).copied().unwrap_or(0)
    }

    /// Images that ended up as the placeholder
    pub fn placeholder_count(&self) -> usize {
        Resolution::iter()
            .filter(|r| r.is_placeholder())
            .map(|r| self.image_count(r))
            .sum()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty() && self.stores_rendered == self.stores_total
    }

    pub fn is_partial_success(&self) -> bool {
        self.stores_rendered > 0 && !self.failures.is_empty()
    }

    pub fn success_rate(&self) -> f64 {
        if self.stores_total == 0 {
            return 0.0;
        }
        (self.stores_rendered as f64 / self.stores_total as f64) * 100.0
    }

    pub fn log(&self) {
        let outcomes = Resolution::iter()
            .map(|r| format!("{}={}", r, self.image_count(r)))
            .collect::<Vec<_>>()
            .join(" ");
        info!(
            stores_total = self.stores_total,
            stores_rendered = self.stores_rendered,
            stores_skipped = self.failures.len(),
            placeholders = self.placeholder_count(),
            images = %outcomes,
            "run summary"
        );
        for failure in &self.failures {
            warn!(
                index = failure.index,
                store = %failure.store,
                error = %failure.error,
                "store skipped"
            );
        }
    }
}
