//! Pipeline configuration.
//!
//! One immutable record passed into every component, replacing the loose
//! global constants a research script would keep.

/// Immutable configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Dataset identifier used in artifact file names (e.g. "sst2").
    pub dataset_name: String,
    /// Number of encoder layers (L).
    pub num_layers: usize,
    /// Number of attention heads per layer (H).
    pub num_heads: usize,
    /// Global maximum sequence length; tokenized sentences are truncated to
    /// this and reshaped tensors are padded to it.
    pub max_seq_len: usize,
    /// Number of examples per evaluation batch.
    pub batch_size: usize,
    /// Size of the selected subset of longest examples.
    pub subset_size: usize,
    /// Class-index -> display-name mapping, in class order.
    pub class_labels: Vec<String>,
    /// Padding token surface form.
    pub pad_token: String,
    /// Sequence-start marker.
    pub cls_token: String,
    /// Sequence-end marker.
    pub sep_token: String,
    /// Prefix flagging a sub-word continuation token.
    pub subword_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset_name: "sst2".to_string(),
            num_layers: 12,
            num_heads: 12,
            max_seq_len: 64,
            batch_size: 16,
            subset_size: 300,
            class_labels: vec!["negative".to_string(), "positive".to_string()],
            pad_token: "[PAD]".to_string(),
            cls_token: "[CLS]".to_string(),
            sep_token: "[SEP]".to_string(),
            subword_prefix: "##".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Total number of (layer, head) identities.
    pub fn num_head_ids(&self) -> usize {
        self.num_layers * self.num_heads
    }

    /// Display name for a class index.
    pub fn class_name(&self, class: usize) -> &str {
        self.class_labels
            .get(class)
            .map_or("unknown", String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_reference_setup() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.num_layers, 12);
        assert_eq!(cfg.num_heads, 12);
        assert_eq!(cfg.max_seq_len, 64);
        assert_eq!(cfg.subset_size, 300);
        assert_eq!(cfg.batch_size, 16);
        assert_eq!(cfg.num_head_ids(), 144);
        assert_eq!(cfg.class_name(0), "negative");
        assert_eq!(cfg.class_name(1), "positive");
        assert_eq!(cfg.class_name(7), "unknown");
    }
}
