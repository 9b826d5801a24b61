//! Fiscal number rendering.

use serde::{Deserialize, Serialize};

/// The sequential fiscal identity assigned to an emitted document.
///
/// Assigned exactly once, at emission, by the sequencer; immutable after.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FiscalNumber {
    pub series: String,
    pub year: i32,
    pub sequence: u64,
}

impl FiscalNumber {
    pub fn new(series: impl Into<String>, year: i32, sequence: u64) -> Self {
        Self {
            series: series.into(),
            year,
            sequence,
        }
    }

    /// Human-readable rendering: `{series}/{year}/{zero-padded sequence}`.
    pub fn render(&self) -> String {
        format!("{}/{}/{:05}", self.series, self.year, self.sequence)
    }
}

impl core::fmt::Display for FiscalNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_zero_padded() {
        let n = FiscalNumber::new("FAC", 2025, 42);
        assert_eq!(n.render(), "FAC/2025/00042");
    }

    #[test]
    fn wide_sequences_are_not_truncated() {
        let n = FiscalNumber::new("COT", 2025, 123_456);
        assert_eq!(n.render(), "COT/2025/123456");
    }
}
