// Tokenization: cleaned comment text -> padded integer batches.
//
// Each sequence is truncated to MAX_SEQUENCE_LENGTH tokens (special tokens
// included) and right-padded to the longest sequence in its batch, so a
// batch of short comments never pays for a 512-wide tensor.

use std::path::Path;

use tokenizers::{Tokenizer, TruncationParams};

use crate::pipeline::{PipelineError, Result};

/// Maximum tokens per sequence, matching the encoder's position embeddings.
pub const MAX_SEQUENCE_LENGTH: usize = 512;

/// Fallback pad id when the tokenizer declares neither padding nor `[PAD]`.
/// 0 is the BERT convention.
const DEFAULT_PAD_ID: u32 = 0;

/// A row-major `[batch_size, seq_len]` batch ready for the classification heads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBatch {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
    pub batch_size: usize,
    pub seq_len: usize,
}

impl EncodedBatch {
    pub fn shape(&self) -> [i64; 2] {
        [self.batch_size as i64, self.seq_len as i64]
    }

    /// Token ids of row `i`, padding included.
    pub fn row_ids(&self, i: usize) -> &[i64] {
        &self.input_ids[i * self.seq_len..(i + 1) * self.seq_len]
    }

    /// Attention mask of row `i`.
    pub fn row_mask(&self, i: usize) -> &[i64] {
        &self.attention_mask[i * self.seq_len..(i + 1) * self.seq_len]
    }
}

/// Wraps a HuggingFace tokenizer with fixed truncation and batch padding.
pub struct TokenizationAdapter {
    tokenizer: Tokenizer,
    pad_id: u32,
    max_length: usize,
}

impl TokenizationAdapter {
    /// Load `tokenizer.json` from disk.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::model_load(format!(
                "tokenizer file not found: {}\nRun `tonescope download-model` to fetch it.",
                path.display()
            )));
        }
        let tokenizer = Tokenizer::from_file(path).map_err(|e| {
            PipelineError::model_load(format!("failed to load tokenizer {}: {}", path.display(), e))
        })?;
        Self::new(tokenizer)
    }

    /// Build from serialized `tokenizer.json` contents.
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Result<Self> {
        let tokenizer = Tokenizer::from_bytes(bytes)
            .map_err(|e| PipelineError::model_load(format!("failed to parse tokenizer: {e}")))?;
        Self::new(tokenizer)
    }

    /// Take ownership of a tokenizer and configure truncation. Padding is
    /// done here per batch, so any padding baked into the file is disabled.
    pub fn new(tokenizer: Tokenizer) -> Result<Self> {
        Self::with_max_length(tokenizer, MAX_SEQUENCE_LENGTH)
    }

    pub fn with_max_length(mut tokenizer: Tokenizer, max_length: usize) -> Result<Self> {
        let pad_id = tokenizer
            .get_padding()
            .map(|p| p.pad_id)
            .or_else(|| tokenizer.token_to_id("[PAD]"))
            .or_else(|| tokenizer.token_to_id("<pad>"))
            .unwrap_or(DEFAULT_PAD_ID);

        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| PipelineError::model_load(format!("invalid truncation settings: {e}")))?;
        tokenizer.with_padding(None);

        Ok(Self {
            tokenizer,
            pad_id,
            max_length,
        })
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn pad_id(&self) -> u32 {
        self.pad_id
    }

    /// Encode a non-empty batch of texts. Row order matches `texts`.
    pub fn encode_batch<S: AsRef<str>>(&self, texts: &[S]) -> Result<EncodedBatch> {
        if texts.is_empty() {
            return Err(PipelineError::input("cannot tokenize an empty batch"));
        }

        let encodings = texts
            .iter()
            .map(|t| {
                self.tokenizer
                    .encode(t.as_ref(), true)
                    .map_err(|e| PipelineError::inference(format!("tokenization failed: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let batch_size = encodings.len();
        // Keep at least one column so an all-empty encoding still has a shape.
        let seq_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .max(1);

        let mut input_ids = Vec::with_capacity(batch_size * seq_len);
        let mut attention_mask = Vec::with_capacity(batch_size * seq_len);
        let mut token_type_ids = Vec::with_capacity(batch_size * seq_len);

        for enc in &encodings {
            let ids = enc.get_ids();
            let pad_len = seq_len - ids.len();

            input_ids.extend(ids.iter().map(|&id| id as i64));
            attention_mask.extend(enc.get_attention_mask().iter().map(|&m| m as i64));
            token_type_ids.extend(enc.get_type_ids().iter().map(|&t| t as i64));

            input_ids.extend(std::iter::repeat_n(self.pad_id as i64, pad_len));
            attention_mask.extend(std::iter::repeat_n(0i64, pad_len));
            token_type_ids.extend(std::iter::repeat_n(0i64, pad_len));
        }

        Ok(EncodedBatch {
            input_ids,
            attention_mask,
            token_type_ids,
            batch_size,
            seq_len,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Whitespace word-level tokenizer over a tiny vocabulary. Unknown words
    /// map to `[UNK]` (id 1); `[PAD]` is id 0.
    pub(crate) fn word_level_json(words: &[&str]) -> String {
        let mut vocab = serde_json::Map::new();
        vocab.insert("[PAD]".into(), 0.into());
        vocab.insert("[UNK]".into(), 1.into());
        for (i, w) in words.iter().enumerate() {
            vocab.insert((*w).to_string(), (i + 2).into());
        }
        serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [],
            "normalizer": null,
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": null,
            "decoder": null,
            "model": { "type": "WordLevel", "vocab": vocab, "unk_token": "[UNK]" }
        })
        .to_string()
    }

    fn adapter() -> TokenizationAdapter {
        TokenizationAdapter::from_bytes(word_level_json(&["a", "b", "c", "hello", "world"])).unwrap()
    }

    #[test]
    fn test_pads_to_longest_in_batch() {
        let batch = adapter().encode_batch(&["hello world a", "b"]).unwrap();
        assert_eq!(batch.batch_size, 2);
        assert_eq!(batch.seq_len, 3);
        assert_eq!(batch.row_ids(0), &[5, 6, 2]);
        assert_eq!(batch.row_ids(1), &[3, 0, 0]);
        assert_eq!(batch.row_mask(0), &[1, 1, 1]);
        assert_eq!(batch.row_mask(1), &[1, 0, 0]);
        assert_eq!(batch.shape(), [2, 3]);
    }

    #[test]
    fn test_unknown_words_map_to_unk() {
        let batch = adapter().encode_batch(&["zebra"]).unwrap();
        assert_eq!(batch.row_ids(0), &[1]);
    }

    #[test]
    fn test_truncates_to_max_length() {
        let long = vec!["a"; 600].join(" ");
        let batch = adapter().encode_batch(&[long.as_str(), "b"]).unwrap();
        assert_eq!(batch.seq_len, MAX_SEQUENCE_LENGTH);
        assert_eq!(batch.input_ids.len(), 2 * MAX_SEQUENCE_LENGTH);
    }

    #[test]
    fn test_deterministic() {
        let a = adapter();
        let first = a.encode_batch(&["hello a b"]).unwrap();
        let second = a.encode_batch(&["hello a b"]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_batch_is_input_error() {
        let texts: [&str; 0] = [];
        assert!(matches!(
            adapter().encode_batch(&texts),
            Err(PipelineError::InputValidation(_))
        ));
    }

    #[test]
    fn test_pad_id_from_vocab() {
        assert_eq!(adapter().pad_id(), 0);
    }

    #[test]
    fn test_missing_file_is_model_load_error() {
        let result = TokenizationAdapter::from_file(Path::new("/nope/tokenizer.json"));
        assert!(matches!(result, Err(PipelineError::ModelLoad(_))));
    }
}
