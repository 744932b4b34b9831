// Classification models: tokenizer, the two ONNX heads, and the engine that
// runs them together over a batch.
//
// ClassificationHead is the swap point. OnnxHead is the production head;
// anything else implementing the trait (scripted heads in tests, a different
// runtime later) plugs into DualHeadInferenceEngine unchanged.

pub mod download;
pub mod engine;
pub mod heads;
pub mod onnx;
pub mod tokenize;

pub use engine::{DualHeadInferenceEngine, RawPrediction};
pub use heads::{ClassificationHead, Logits};
pub use tokenize::{EncodedBatch, TokenizationAdapter, MAX_SEQUENCE_LENGTH};
