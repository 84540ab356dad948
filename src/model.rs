//! Black-box collaborator interfaces.
//!
//! The trained classifier, the saliency attributor, the dependency parser
//! and the 2-D projector are external to this pipeline. Each is abstracted
//! as a small trait so the ranking/alignment logic never touches a model
//! runtime directly. Failures in any collaborator propagate as
//! `anyhow::Error` and abort the current stage.

use anyhow::Result;
use ndarray::{Array2, Array5};

/// One tokenized, batch-padded evaluation batch.
///
/// Every token sequence is padded with the configured pad token to the
/// batch's own maximum length (not the global maximum).
#[derive(Debug, Clone)]
pub struct TokenBatch {
    /// Surface tokens per example, sub-word units included.
    pub tokens: Vec<Vec<String>>,
    /// True class index per example.
    pub labels: Vec<usize>,
}

impl TokenBatch {
    /// Number of examples in the batch.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the batch holds no examples.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The padded sequence length shared by all examples in the batch.
    pub fn seq_len(&self) -> usize {
        self.tokens.first().map_or(0, Vec::len)
    }
}

/// Output of one classifier forward pass with attention capture.
#[derive(Debug)]
pub struct EncoderOutput {
    /// Mean loss over the batch.
    pub loss: f32,
    /// Raw logits, shape `[batch, num_classes]`.
    pub logits: Array2<f32>,
    /// Attention probabilities, shape `[layers, batch, heads, seq, seq]`.
    pub attentions: Array5<f32>,
}

/// Output of a single-sentence classification.
#[derive(Debug, Clone)]
pub struct Classification {
    /// Raw logits per class.
    pub logits: Vec<f32>,
    /// Softmax probabilities per class.
    pub softmax: Vec<f32>,
}

/// A trained transformer sentence classifier with attention capture.
pub trait SentenceEncoder {
    /// Run a forward pass, returning loss, logits and per-layer per-head
    /// attention probabilities for the batch.
    fn forward_with_attention(&mut self, batch: &TokenBatch) -> Result<EncoderOutput>;

    /// Run the backward pass for the most recent forward call and return
    /// the gradients of the attention probabilities, same shape as
    /// `EncoderOutput::attentions`.
    fn backward_gradients(&mut self) -> Result<Array5<f32>>;

    /// Fixed-size sentence embedding for one tokenized sentence.
    fn sentence_embedding(&mut self, tokens: &[String]) -> Result<Vec<f32>>;

    /// Classify one tokenized sentence.
    fn classify(&mut self, tokens: &[String]) -> Result<Classification>;
}

/// Per-token, per-class scalar importance attribution.
pub trait SaliencyAttributor {
    /// Attribution scores for `target_class`, shape `[batch, seq]`,
    /// aligned with the batch's padded token positions.
    fn attribute(&mut self, batch: &TokenBatch, target_class: usize) -> Result<Array2<f32>>;
}

/// One dependency edge produced by the parser.
#[derive(Debug, Clone)]
pub struct DependencyEdge {
    /// 1-based index of the head word; 0 means the word is the root.
    pub head: usize,
    /// Dependency relation label (e.g. "nsubj", "poss").
    pub relation: String,
}

/// Dependency parser over pre-tokenized word sequences.
pub trait DependencyParser {
    /// Parse one word sequence (boundary markers already stripped) into
    /// one edge per word.
    fn parse(&mut self, words: &[String]) -> Result<Vec<DependencyEdge>>;
}

/// Dimensionality reducer mapping sentence embeddings to 2-D coordinates.
pub trait Projector {
    fn project(&self, vectors: &[Vec<f32>]) -> Result<Vec<[f64; 2]>>;
}

/// Sub-word tokenizer for the classifier's vocabulary.
pub trait SubwordTokenizer {
    /// Encode a sentence into surface tokens including boundary markers,
    /// truncated to `max_len`. No padding is applied here.
    fn encode(&self, sentence: &str, max_len: usize) -> Vec<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_batch_dims() {
        let batch = TokenBatch {
            tokens: vec![
                vec!["[CLS]".into(), "hi".into(), "[SEP]".into()],
                vec!["[CLS]".into(), "yo".into(), "[SEP]".into()],
            ],
            labels: vec![0, 1],
        };
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.seq_len(), 3);
        assert!(!batch.is_empty());
    }
}
