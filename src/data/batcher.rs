// ============================================================
// Layer 4 — Autoencoder Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<Example> into
// the tensors every model variant consumes.
//
//   Input:  N Examples, each padded to the same length S
//   Output: AutoencoderBatch with [N, S] tensors
//
//   token_ids       encoder input, and the reconstruction target
//   decoder_input   [BOS] + token_ids shifted right by one
//   attention_mask  1 = real token, 0 = padding
//   decoder_mask    1 = real decoder input position
//
// The flattened Vec is reshaped row-major:
//   [e1_t1, e1_t2, ..., e1_tS, e2_t1, ..., eN_tS] → [N, S]

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::domain::example::Example;

#[derive(Debug, Clone)]
pub struct AutoencoderBatch<B: Backend> {
    /// Shape: [batch_size, seq_len]
    pub token_ids: Tensor<B, 2, Int>,

    /// Shape: [batch_size, seq_len]
    pub decoder_input: Tensor<B, 2, Int>,

    /// Shape: [batch_size, seq_len]
    pub attention_mask: Tensor<B, 2, Int>,

    /// Shape: [batch_size, seq_len]
    pub decoder_mask: Tensor<B, 2, Int>,

    /// Real length of each example (EOS included)
    pub lengths: Vec<usize>,
}

impl<B: Backend> AutoencoderBatch<B> {
    pub fn batch_size(&self) -> usize {
        self.lengths.len()
    }

    pub fn seq_len(&self) -> usize {
        self.token_ids.dims()[1]
    }

    /// Burn attention convention: `true` marks a padded key.
    pub fn padding_mask(&self) -> Tensor<B, 2, Bool> {
        self.attention_mask.clone().equal_elem(0)
    }

    pub fn decoder_padding_mask(&self) -> Tensor<B, 2, Bool> {
        self.decoder_mask.clone().equal_elem(0)
    }

    /// Index of each example's EOS, the position latents are pooled from.
    pub fn terminal_positions(&self) -> Vec<usize> {
        self.lengths.iter().map(|&l| l.saturating_sub(1)).collect()
    }
}

#[derive(Clone, Debug)]
pub struct AutoencoderBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> AutoencoderBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    fn stack(&self, rows: impl Iterator<Item = Vec<u32>>, batch_size: usize, seq_len: usize) -> Tensor<B, 2, Int> {
        let flat: Vec<i32> = rows.flat_map(|r| r.into_iter().map(|x| x as i32)).collect();
        Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device).reshape([batch_size, seq_len])
    }
}

impl<B: Backend> Batcher<Example, AutoencoderBatch<B>> for AutoencoderBatcher<B> {
    fn batch(&self, items: Vec<Example>) -> AutoencoderBatch<B> {
        let batch_size = items.len();
        // All examples of a split share max_seq_len
        let seq_len = items[0].max_len();

        let token_ids      = self.stack(items.iter().map(|e| e.token_ids.clone()), batch_size, seq_len);
        let decoder_input  = self.stack(items.iter().map(Example::decoder_input), batch_size, seq_len);
        let attention_mask = self.stack(items.iter().map(Example::attention_mask), batch_size, seq_len);
        let decoder_mask   = self.stack(items.iter().map(Example::decoder_mask), batch_size, seq_len);
        let lengths        = items.iter().map(|e| e.length).collect();

        AutoencoderBatch {
            token_ids,
            decoder_input,
            attention_mask,
            decoder_mask,
            lengths,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::example::{BOS_ID, EOS_ID};
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn ids<B: Backend>(t: Tensor<B, 2, Int>) -> Vec<i64> {
        t.into_data().iter::<i64>().collect()
    }

    #[test]
    fn test_batch_shapes_and_masks() {
        let batcher = AutoencoderBatcher::<TestBackend>::new(Default::default());
        let batch = batcher.batch(vec![
            Example::from_token_ids(&[5, 6], 4),
            Example::from_token_ids(&[7], 4),
        ]);

        assert_eq!(batch.token_ids.dims(), [2, 4]);
        assert_eq!(batch.lengths, vec![3, 2]);
        assert_eq!(batch.terminal_positions(), vec![2, 1]);
        assert_eq!(ids(batch.token_ids.clone()), vec![5, 6, EOS_ID as i64, 0, 7, EOS_ID as i64, 0, 0]);
        assert_eq!(
            ids(batch.decoder_input.clone()),
            vec![BOS_ID as i64, 5, 6, EOS_ID as i64, BOS_ID as i64, 7, EOS_ID as i64, 0]
        );
        assert_eq!(ids(batch.attention_mask.clone()), vec![1, 1, 1, 0, 1, 1, 0, 0]);

        let pad: Vec<bool> = batch.padding_mask().into_data().iter::<bool>().collect();
        assert_eq!(pad, vec![false, false, false, true, false, false, true, true]);
    }
}
