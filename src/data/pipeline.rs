// ============================================================
// Layer 4 — Batch Pipeline
// ============================================================
// Burn DataLoaders over one split's examples.
//
//   train_loader  shuffled with the run seed; Burn draws a new
//                 permutation from that seeded RNG on every
//                 iter(), so each epoch differs while a rerun
//                 reproduces the same sequence of orders
//   eval_loader   held-out / evaluation splits, original order
//
// Batches are `batch_size` examples except possibly the last,
// and every example appears exactly once per iter().
//
//   ExampleDataset ──► DataLoaderBuilder ──► AutoencoderBatch<B>
//                      (AutoencoderBatcher)

use std::sync::Arc;

use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    prelude::*,
};

use crate::data::{
    batcher::{AutoencoderBatch, AutoencoderBatcher},
    dataset::ExampleDataset,
};
use crate::domain::example::Example;
use crate::error::{AutoencoderError, Result};

pub type ExampleLoader<B> = Arc<dyn DataLoader<AutoencoderBatch<B>>>;

fn check_batch_size(batch_size: usize) -> Result<()> {
    if batch_size == 0 {
        return Err(AutoencoderError::Configuration(
            "batch size must be greater than zero".into(),
        ));
    }
    Ok(())
}

/// Loader for the split the optimiser sees.
pub fn train_loader<B: Backend>(
    examples:   Vec<Example>,
    batch_size: usize,
    seed:       u64,
    device:     &B::Device,
) -> Result<ExampleLoader<B>> {
    check_batch_size(batch_size)?;
    let batcher = AutoencoderBatcher::<B>::new(device.clone());
    Ok(DataLoaderBuilder::new(batcher)
        .batch_size(batch_size)
        .shuffle(seed)
        .num_workers(1)
        .build(ExampleDataset::new(examples)))
}

/// Loader that keeps the split's order on every pass.
pub fn eval_loader<B: Backend>(
    examples:   Vec<Example>,
    batch_size: usize,
    device:     &B::Device,
) -> Result<ExampleLoader<B>> {
    check_batch_size(batch_size)?;
    let batcher = AutoencoderBatcher::<B>::new(device.clone());
    Ok(DataLoaderBuilder::new(batcher)
        .batch_size(batch_size)
        .num_workers(1)
        .build(ExampleDataset::new(examples)))
}
