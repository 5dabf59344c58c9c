//! Token-bounded batching of translation inputs.
//!
//! [`Batcher::batch_nodes`] walks the input once, in order, and closes the
//! running batch when the next item would push it over the token budget or
//! when it reaches the item limit. An item that alone exceeds the budget still
//! gets a batch of its own rather than being dropped.
//!
//! Within one batch, inputs that normalize to the same text collapse into a
//! single [`BatchEntry`] whose `origins` list every input index it stands for,
//! so the provider sees each text once and every caller still gets a result.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::tokens::{approx_tokens, normalize};

/// Batching limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Token budget per batch. Default: 1500.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,
    /// Maximum distinct entries per batch. Default: 50.
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    /// Tokens charged per entry on top of its text, for the delimiters a
    /// batched provider request carries around every segment. Default: 4.
    #[serde(default = "default_item_overhead")]
    pub item_overhead_tokens: u64,
}

fn default_max_tokens() -> u64 {
    1500
}

fn default_max_items() -> usize {
    50
}

fn default_item_overhead() -> u64 {
    4
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            max_items: default_max_items(),
            item_overhead_tokens: default_item_overhead(),
        }
    }
}

impl BatchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_tokens(mut self, n: u64) -> Self {
        self.max_tokens = n;
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        self.max_items = n;
        self
    }

    pub fn item_overhead_tokens(mut self, n: u64) -> Self {
        self.item_overhead_tokens = n;
        self
    }
}

/// One distinct text inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEntry {
    /// Text sent to the provider (the first occurrence, unnormalized).
    pub text: String,
    /// Estimated cost of this entry, overhead included.
    pub tokens: u64,
    /// Indices into the batcher input that this entry answers for.
    pub origins: Vec<usize>,
}

/// A token-bounded group of inputs. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Batch {
    /// Position of this batch in the batcher output.
    pub index: usize,
    pub entries: Vec<BatchEntry>,
    /// Cumulative estimated cost of all entries.
    pub tokens: u64,
}

impl Batch {
    /// Number of distinct entries sent to the provider.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of original inputs covered, duplicates included.
    pub fn item_count(&self) -> usize {
        self.entries.iter().map(|e| e.origins.len()).sum()
    }

    /// Entry texts in request order.
    pub fn texts(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.text.as_str()).collect()
    }
}

/// Groups inputs into ordered, token-bounded batches.
#[derive(Debug, Clone)]
pub struct Batcher {
    config: BatchConfig,
}

impl Batcher {
    /// Create a batcher. Zero limits are raised to one.
    pub fn new(config: BatchConfig) -> Self {
        Self {
            config: BatchConfig {
                max_tokens: config.max_tokens.max(1),
                max_items: config.max_items.max(1),
                item_overhead_tokens: config.item_overhead_tokens,
            },
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Estimated cost of one entry inside a batch.
    pub fn entry_tokens(&self, text: &str) -> u64 {
        approx_tokens(text) + self.config.item_overhead_tokens
    }

    /// Split `items` into batches, preserving input order.
    pub fn batch_nodes<S: AsRef<str>>(&self, items: &[S]) -> Vec<Batch> {
        let mut batches = Vec::new();
        let mut running = RunningBatch::default();

        for (index, item) in items.iter().enumerate() {
            let text = item.as_ref();
            let key = normalize(text);

            if let Some(&slot) = running.seen.get(&key) {
                running.entries[slot].origins.push(index);
                continue;
            }

            let cost = self.entry_tokens(text);
            if !running.entries.is_empty() && running.tokens + cost > self.config.max_tokens {
                batches.push(running.close(batches.len()));
            }

            running.push(key, text, cost, index);

            if running.entries.len() >= self.config.max_items {
                batches.push(running.close(batches.len()));
            }
        }

        if !running.entries.is_empty() {
            batches.push(running.close(batches.len()));
        }
        batches
    }
}

#[derive(Default)]
struct RunningBatch {
    entries: Vec<BatchEntry>,
    tokens: u64,
    seen: HashMap<String, usize>,
}

impl RunningBatch {
    fn push(&mut self, key: String, text: &str, cost: u64, origin: usize) {
        self.seen.insert(key, self.entries.len());
        self.entries.push(BatchEntry {
            text: text.to_string(),
            tokens: cost,
            origins: vec![origin],
        });
        self.tokens += cost;
    }

    fn close(&mut self, index: usize) -> Batch {
        let taken = std::mem::take(self);
        Batch {
            index,
            entries: taken.entries,
            tokens: taken.tokens,
        }
    }
}
