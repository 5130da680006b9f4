use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Credit price per billable step type.
///
/// Deserializes from a plain map, e.g. `{ "analysis" = 1, "image_1" = 2 }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceTable(HashMap<String, i64>);

impl PriceTable {
    pub fn new(prices: HashMap<String, i64>) -> Self {
        Self(prices)
    }

    /// Price for a step, or `None` when the step is free.
    ///
    /// Step types are matched case-insensitively after trimming. Unmapped
    /// steps and non-positive prices both count as free.
    pub fn price_for(&self, step_type: &str) -> Option<i64> {
        let key = step_type.trim().to_ascii_lowercase();
        if key.is_empty() {
            return None;
        }
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
            .map(|(_, &price)| price)
            .filter(|&price| price > 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(k, &v)| (k.as_str(), v))
    }
}

impl Default for PriceTable {
    fn default() -> Self {
        let prices = [
            ("analysis", 1),
            ("text", 1),
            ("image_1", 2),
            ("image_2", 2),
            ("image_3", 2),
            ("edit", 2),
            ("upscale_2k", 1),
            ("upscale_4k", 2),
        ];
        Self(
            prices
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }
}
