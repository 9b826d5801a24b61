//! Engine configuration.

use std::collections::HashMap;

use chrono::Duration;

use mozfiscal_documents::DocumentType;

/// Explicit configuration; no globals.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long deposited escrow funds wait for a dispute before the sweep
    /// releases them to the seller.
    pub escrow_release_window: Duration,
    /// Bounded automatic retries of a command on `ConcurrencyConflict`.
    pub max_conflict_retries: u32,
    /// Per-type series codes overriding the defaults (COT, PPF, FAC, ...).
    pub series_overrides: HashMap<DocumentType, String>,
    /// Series for registered purchase documents, kept apart from the sales
    /// sequences so those stay dense.
    pub purchase_series: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            escrow_release_window: Duration::hours(48),
            max_conflict_retries: 3,
            series_overrides: HashMap::new(),
            purchase_series: "FRN".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn series_for(&self, doc_type: DocumentType) -> String {
        self.series_overrides
            .get(&doc_type)
            .cloned()
            .unwrap_or_else(|| doc_type.default_series().to_string())
    }
}
