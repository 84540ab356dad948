// Pedantic clippy configuration for numerical/analysis code:
#![allow(clippy::cast_precision_loss)] // usize→f64 intentional in score math
#![allow(clippy::cast_possible_truncation)] // bounded tensor indexing
#![allow(clippy::cast_possible_wrap)] // usize→isize in offset predictors
#![allow(clippy::cast_sign_loss)] // isize→usize after clamping
#![allow(clippy::many_single_char_names)] // q, k, i, j standard in attention math
#![allow(clippy::similar_names)] // `head`/`heads` and friends
#![allow(clippy::module_name_repetitions)] // PipelineConfig in config.rs is fine
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]

//! attn-atlas: dashboard data generation for attention-head analysis
//!
//! Offline pipeline that turns a trained transformer sentence classifier
//! and a held-out evaluation split into the JSON artifacts an
//! interpretability dashboard visualizes: per-example attention maps,
//! gradient/semantic/syntactic/confidence head rankings, dependency
//! trees, a 2-D sentence projection and a per-head atlas.
//!
//! ## Architecture
//!
//! - `config`: immutable pipeline configuration record
//! - `error`: pipeline error taxonomy
//! - `model`: black-box collaborator traits (encoder, attributor, parser, projector, tokenizer)
//! - `corpus`: evaluation-split loading and batching
//! - `reshape`: variable-length batch tensors → one dense example-major array
//! - `subword`: sub-word merge groups and word-level attention collapse
//! - `gradient`: per-example |gradient|-sum head ranking
//! - `syntactic`: heads as dependency-edge predictors vs. offset baselines
//! - `semantic`: saliency/attention cosine-alignment head ranking
//! - `confidence`: max-attention confidence statistics
//! - `subset`: longest-sentence selection and dataset-record re-matching
//! - `saliency`: saliency-list artifact assembly
//! - `embedding`: 2-D projection points and sentence table summary
//! - `atlas`: dataset-level aggregation of all ranking signals
//! - `artifacts`: JSON schemas, file naming and I/O
//! - `pipeline`: stage orchestration

pub mod artifacts;
pub mod atlas;
pub mod config;
pub mod confidence;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod gradient;
pub mod model;
pub mod pipeline;
pub mod reshape;
pub mod saliency;
pub mod semantic;
pub mod subset;
pub mod subword;
pub mod syntactic;

pub use artifacts::{
    ArtifactPaths, AtlasEntry, DependencyNode, DependencyTree, EmbeddingPoint, HeadId,
    RankedHeads, RankingById, RelationHeads, SaliencyEntry, SaliencyMeta, SaliencyToken,
    SubsetEntry, SyntacticRanking, TableRow, TopHead,
};
pub use atlas::build_atlas;
pub use config::PipelineConfig;
pub use confidence::{example_confidence, mean_confidence};
pub use corpus::{EvalSplit, SentenceRecord};
pub use error::PipelineError;
pub use gradient::rank_by_gradient;
pub use model::{
    Classification, DependencyEdge, DependencyParser, EncoderOutput, Projector,
    SaliencyAttributor, SentenceEncoder, SubwordTokenizer, TokenBatch,
};
pub use pipeline::{rebuild_atlas, Collaborators, ExtractionOutput, Pipeline};
pub use reshape::{pad_batch, reshape_batches};
pub use semantic::rank_by_saliency;
pub use subset::{match_subset, select_longest, token_overlap};
pub use subword::{collapse_attention, merge_subwords, strip_padding, MergeGroup, WordMerge};
pub use syntactic::{
    evaluate_predictions, head_predictions, offset_predictions, rank_relations, Direction,
    ParsedExample,
};
