// file: src/aggregate/batching.rs
// description: token-bounded batch planning and batch text assembly

use std::ops::Range;

/// Separator used when measuring the token size of the whole candidate set
/// and when concatenating per-batch outputs for the merge pass.
pub const COUNT_SEPARATOR: &str = "\n------------\n";

/// Separator between numbered items inside one batch
pub const BATCH_SEPARATOR: &str = "\n-----------------\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    pub batch_count: usize,
    pub batch_size: usize,
}

impl BatchPlan {
    pub fn new(total_tokens: u64, token_ceiling: u64, items: usize) -> Self {
        let batch_count = (total_tokens / token_ceiling.max(1)) as usize + 1;
        let batch_size = (items / batch_count).max(1);
        Self {
            batch_count,
            batch_size,
        }
    }

    /// Contiguous `[i * size, (i + 1) * size)` slices clamped to `items`.
    /// Exactly `batch_count` ranges; any remainder past the last range is
    /// not aggregated.
    pub fn ranges(&self, items: usize) -> Vec<Range<usize>> {
        (0..self.batch_count)
            .map(|i| {
                let start = (i * self.batch_size).min(items);
                let end = ((i + 1) * self.batch_size).min(items);
                start..end
            })
            .collect()
    }

    pub fn dropped(&self, items: usize) -> usize {
        items.saturating_sub(self.batch_count * self.batch_size)
    }
}

/// Newlines are removed from every description before batching
pub fn normalize(descriptions: Vec<String>) -> Vec<String> {
    descriptions
        .into_iter()
        .map(|d| d.replace(['\n', '\r'], ""))
        .collect()
}

/// Text whose token count decides the plan: all descriptions joined by
/// `COUNT_SEPARATOR`, with a trailing separator.
pub fn token_count_text(descriptions: &[String]) -> String {
    let mut text = descriptions.join(COUNT_SEPARATOR);
    text.push_str(COUNT_SEPARATOR);
    text
}

/// Items numbered from 1 within the batch, `#` stripped so numbering stays
/// unambiguous for the model.
pub fn number_batch(batch: &[String]) -> String {
    let mut text = batch
        .iter()
        .enumerate()
        .map(|(idx, d)| format!("{}. {}", idx + 1, d.replace('#', "")))
        .collect::<Vec<_>>()
        .join(BATCH_SEPARATOR);
    text.push_str(BATCH_SEPARATOR);
    text
}
