//! Tests for token-bounded batching.

use tolk::tokens::approx_tokens;
use tolk::{BatchConfig, Batcher};

fn flattened_count(batches: &[tolk::Batch]) -> usize {
    batches.iter().map(|b| b.item_count()).sum()
}

#[test]
fn short_and_long_sentences_split_under_small_budget() {
    let texts = ["Short.", "Another short.", "A longer sentence with more tokens."];
    let batcher = Batcher::new(BatchConfig::new().max_tokens(20));
    let batches = batcher.batch_nodes(&texts);

    assert!(batches.len() >= 2, "got {} batches", batches.len());
    assert_eq!(flattened_count(&batches), 3);
}

#[test]
fn budget_holds_except_for_oversized_singletons() {
    let texts: Vec<String> = (0..40)
        .map(|i| "word ".repeat(1 + (i * 7) % 23))
        .collect();
    let config = BatchConfig::new().max_tokens(30).max_items(8);
    let batches = Batcher::new(config).batch_nodes(&texts);

    for batch in &batches {
        assert!(batch.len() <= 8);
        if batch.len() > 1 {
            assert!(batch.tokens <= 30, "batch {} has {} tokens", batch.index, batch.tokens);
        }
    }
    assert_eq!(flattened_count(&batches), texts.len());
}

#[test]
fn order_is_preserved() {
    let texts: Vec<String> = (0..10).map(|i| format!("item {i}")).collect();
    let batches = Batcher::new(BatchConfig::new().max_items(3)).batch_nodes(&texts);

    let flattened: Vec<usize> = batches
        .iter()
        .flat_map(|b| b.entries.iter().flat_map(|e| e.origins.iter().copied()))
        .collect();
    assert_eq!(flattened, (0..10).collect::<Vec<_>>());
    let indices: Vec<usize> = batches.iter().map(|b| b.index).collect();
    assert_eq!(indices, [0, 1, 2, 3]);
}

#[test]
fn entry_cost_includes_overhead() {
    let batcher = Batcher::new(BatchConfig::new().item_overhead_tokens(4));
    assert_eq!(batcher.entry_tokens("Short."), approx_tokens("Short.") + 4);

    let batches = batcher.batch_nodes(&["Short."]);
    assert_eq!(batches[0].tokens, approx_tokens("Short.") + 4);
}

#[test]
fn empty_input_yields_no_batches() {
    let batches = Batcher::new(BatchConfig::default()).batch_nodes::<&str>(&[]);
    assert!(batches.is_empty());
}

#[test]
fn zero_limits_are_raised() {
    let batcher = Batcher::new(BatchConfig::new().max_tokens(0).max_items(0));
    assert_eq!(batcher.config().max_tokens, 1);
    assert_eq!(batcher.config().max_items, 1);
    let batches = batcher.batch_nodes(&["a", "b"]);
    assert_eq!(batches.len(), 2);
}

#[test]
fn duplicates_across_batches_are_sent_again() {
    let batcher = Batcher::new(BatchConfig::new().max_items(1));
    let batches = batcher.batch_nodes(&["same", "other", "same"]);
    assert_eq!(batches.len(), 3);
    assert_eq!(batches[2].texts(), ["same"]);
}
