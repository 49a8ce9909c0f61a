// ============================================================
// Layer 3 — Example Domain Type
// ============================================================
// A raw text unit mapped to exactly `max_seq_len` vocabulary
// ids. Layout of `token_ids`:
//
//   [t0, t1, ..., tk, EOS, PAD, PAD, ...]
//    └────── length ──────┘
//
// `length` counts the real ids including the trailing EOS, so
// it is always >= 1 and the EOS sits at `length - 1`, which is
// the position the encoders pool the latent vector from.

use serde::{Deserialize, Serialize};

/// Padding id. Excluded from loss and attention.
pub const PAD_ID: u32 = 0;
/// Out-of-vocabulary id.
pub const UNK_ID: u32 = 1;
/// Start-of-sequence id fed to the decoder at step 0.
pub const BOS_ID: u32 = 2;
/// End-of-sequence id appended to every example.
pub const EOS_ID: u32 = 3;

pub const PAD_TOKEN: &str = "[PAD]";
pub const UNK_TOKEN: &str = "[UNK]";
pub const BOS_TOKEN: &str = "[BOS]";
pub const EOS_TOKEN: &str = "[EOS]";

/// Reserved tokens in id order.
pub const RESERVED_TOKENS: [&str; 4] = [PAD_TOKEN, UNK_TOKEN, BOS_TOKEN, EOS_TOKEN];

/// Number of ids every vocabulary reserves before corpus tokens.
pub const RESERVED_COUNT: usize = RESERVED_TOKENS.len();

pub fn is_special(id: u32) -> bool {
    (id as usize) < RESERVED_COUNT && id != UNK_ID
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub token_ids: Vec<u32>,
    pub length:    usize,
}

impl Example {
    /// Truncate `ids` to `max_seq_len - 1`, append EOS and pad.
    pub fn from_token_ids(ids: &[u32], max_seq_len: usize) -> Self {
        let keep = ids.len().min(max_seq_len.saturating_sub(1));
        let mut token_ids = Vec::with_capacity(max_seq_len);
        token_ids.extend_from_slice(&ids[..keep]);
        token_ids.push(EOS_ID);
        let length = token_ids.len();
        token_ids.resize(max_seq_len.max(length), PAD_ID);
        Self { token_ids, length }
    }

    pub fn max_len(&self) -> usize {
        self.token_ids.len()
    }

    /// Real ids including the trailing EOS.
    pub fn real_ids(&self) -> &[u32] {
        &self.token_ids[..self.length]
    }

    /// Real ids without EOS, i.e. the encoded text tokens.
    pub fn text_ids(&self) -> &[u32] {
        &self.token_ids[..self.length.saturating_sub(1)]
    }

    /// 1 for real positions, 0 for padding.
    pub fn attention_mask(&self) -> Vec<u32> {
        (0..self.max_len())
            .map(|i| u32::from(i < self.length))
            .collect()
    }

    /// Decoder input for teacher forcing: BOS followed by the ids shifted right.
    pub fn decoder_input(&self) -> Vec<u32> {
        let mut input = Vec::with_capacity(self.max_len());
        input.push(BOS_ID);
        input.extend_from_slice(&self.token_ids[..self.max_len() - 1]);
        input
    }

    /// 1 where the decoder input is real (BOS plus the shifted real ids).
    pub fn decoder_mask(&self) -> Vec<u32> {
        (0..self.max_len())
            .map(|i| u32::from(i <= self.length))
            .collect()
    }
}
