//! Pipeline orchestration.
//!
//! Runs the stages batch-sequentially: extraction, subset selection,
//! gradient/semantic/syntactic/confidence ranking, sentence-selection
//! data, atlas aggregation. Every stage writes its artifact before the
//! next stage starts, so any stage can be re-run from disk given only
//! its declared inputs. Failures in external collaborators abort the
//! current stage; there are no retries.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use ndarray::{s, Array5, Axis};
use tracing::info;

use crate::artifacts::{
    attention_to_nested, read_json, write_json, ArtifactPaths, AtlasEntry, DependencyNode,
    DependencyTree, RankedHeads, RankingById, SubsetEntry, SyntacticRanking,
};
use crate::atlas::build_atlas;
use crate::config::PipelineConfig;
use crate::confidence::{example_confidence, mean_confidence};
use crate::corpus::EvalSplit;
use crate::embedding::{build_embedding_list, build_table_list};
use crate::gradient::rank_by_gradient;
use crate::model::{
    DependencyParser, Projector, SaliencyAttributor, SentenceEncoder, SubwordTokenizer,
};
use crate::reshape::pad_batch;
use crate::saliency::{build_saliency_list, predicted_saliency};
use crate::semantic::rank_by_saliency;
use crate::subset::{match_subset, select_longest};
use crate::subword::{collapse_attention, merge_subwords, strip_padding};
use crate::syntactic::{rank_relations, ParsedExample};

/// The external collaborators the pipeline drives.
pub struct Collaborators {
    pub tokenizer: Box<dyn SubwordTokenizer>,
    pub encoder: Box<dyn SentenceEncoder>,
    pub attributor: Box<dyn SaliencyAttributor>,
    pub parser: Box<dyn DependencyParser>,
    pub projector: Box<dyn Projector>,
}

/// Everything the extraction pass produces, index-aligned by example.
pub struct ExtractionOutput {
    /// Batch-padded surface tokens per example.
    pub tokens: Vec<Vec<String>>,
    /// Reshaped attention, `[examples, layers, heads, max_seq, max_seq]`.
    pub attentions: Array5<f32>,
    /// Reshaped attention gradients, same shape.
    pub gradients: Array5<f32>,
    pub labels: Vec<usize>,
    pub predictions: Vec<usize>,
    pub softmaxes: Vec<Vec<f64>>,
}

/// Stage driver for one dataset.
pub struct Pipeline {
    config: PipelineConfig,
    paths: ArtifactPaths,
    collaborators: Collaborators,
}

fn softmax(logits: &[f32]) -> Vec<f64> {
    let max = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exps: Vec<f64> = logits.iter().map(|&l| f64::from(l - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map_or(0, |(i, _)| i)
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        output_dir: impl AsRef<Path>,
        collaborators: Collaborators,
    ) -> Self {
        let paths = ArtifactPaths::new(output_dir.as_ref(), &config.dataset_name);
        Self {
            config,
            paths,
            collaborators,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// Run every stage in order.
    pub fn run(&mut self, split: &EvalSplit) -> Result<()> {
        info!("Running pipeline over {} evaluation sentences", split.len());

        let extraction = self.extract(split)?;
        let subset = self.select_subset(&extraction, split)?;
        self.write_gradient_ranking(&extraction, &subset)?;
        self.write_attention_maps(&extraction, &subset)?;
        let saliency = self.write_saliency_list(split, &extraction, &subset)?;
        self.write_semantic_ranking(&extraction, &subset, &saliency)?;
        self.write_dependency_trees(&extraction, &subset)?;
        self.write_syntactic_ranking(&extraction)?;
        self.write_confidence_rankings(&extraction, &subset)?;
        self.write_sentence_data(&subset, split)?;
        self.write_atlas()?;

        info!("Pipeline complete");
        Ok(())
    }

    /// Forward/backward pass over every batch, reshaping attention and
    /// gradient tensors into example-major dense arrays. Raw per-batch
    /// tensors are released as soon as they are padded.
    pub fn extract(&mut self, split: &EvalSplit) -> Result<ExtractionOutput> {
        let batches = split.batches(self.collaborators.tokenizer.as_ref(), &self.config);
        info!("Extracting attention from {} batches", batches.len());

        let mut tokens: Vec<Vec<String>> = Vec::with_capacity(split.len());
        let mut labels: Vec<usize> = Vec::with_capacity(split.len());
        let mut predictions: Vec<usize> = Vec::with_capacity(split.len());
        let mut softmaxes: Vec<Vec<f64>> = Vec::with_capacity(split.len());
        let mut attention_blocks: Vec<Array5<f32>> = Vec::with_capacity(batches.len());
        let mut gradient_blocks: Vec<Array5<f32>> = Vec::with_capacity(batches.len());

        for batch in &batches {
            let output = self
                .collaborators
                .encoder
                .forward_with_attention(batch)
                .context("Encoder forward pass failed")?;
            let gradients = self
                .collaborators
                .encoder
                .backward_gradients()
                .context("Encoder backward pass failed")?;

            for row in output.logits.rows() {
                let scores = softmax(&row.to_vec());
                predictions.push(argmax(&scores));
                softmaxes.push(scores);
            }
            labels.extend_from_slice(&batch.labels);
            tokens.extend(batch.tokens.iter().cloned());

            attention_blocks.push(pad_batch(&output.attentions, &self.config)?);
            gradient_blocks.push(pad_batch(&gradients, &self.config)?);
        }

        let empty = || {
            Array5::<f32>::zeros((
                0,
                self.config.num_layers,
                self.config.num_heads,
                self.config.max_seq_len,
                self.config.max_seq_len,
            ))
        };
        let attentions = if attention_blocks.is_empty() {
            empty()
        } else {
            let views: Vec<_> = attention_blocks.iter().map(Array5::view).collect();
            ndarray::concatenate(Axis(0), &views)
                .context("Failed to concatenate attention blocks")?
        };
        let gradients = if gradient_blocks.is_empty() {
            empty()
        } else {
            let views: Vec<_> = gradient_blocks.iter().map(Array5::view).collect();
            ndarray::concatenate(Axis(0), &views)
                .context("Failed to concatenate gradient blocks")?
        };

        Ok(ExtractionOutput {
            tokens,
            attentions,
            gradients,
            labels,
            predictions,
            softmaxes,
        })
    }

    /// Select the longest examples, join them back to dataset records and
    /// persist the subset index.
    pub fn select_subset(
        &mut self,
        extraction: &ExtractionOutput,
        split: &EvalSplit,
    ) -> Result<Vec<SubsetEntry>> {
        let selected = select_longest(&extraction.tokens, &self.config);
        let entries = match_subset(
            &selected,
            &extraction.tokens,
            split,
            self.collaborators.tokenizer.as_ref(),
            &self.config,
        );
        let matched = entries.iter().filter(|e| e.idx >= 0).count();
        info!("Selected {} examples, {matched} matched to records", entries.len());
        write_json(&self.paths.subset_index(self.config.subset_size), &entries)?;
        Ok(entries)
    }

    pub fn write_gradient_ranking(
        &self,
        extraction: &ExtractionOutput,
        subset: &[SubsetEntry],
    ) -> Result<()> {
        let mut ranking = RankingById::new();
        for entry in subset.iter().filter(|e| e.idx >= 0) {
            let grads = extraction.gradients.index_axis(Axis(0), entry.attention_id);
            ranking.insert(entry.idx, rank_by_gradient(grads));
        }
        info!("Gradient ranking for {} examples", ranking.len());
        write_json(&self.paths.gradient_ranking(), &ranking)
    }

    pub fn write_attention_maps(
        &self,
        extraction: &ExtractionOutput,
        subset: &[SubsetEntry],
    ) -> Result<()> {
        for entry in subset.iter().filter(|e| e.idx >= 0) {
            let attn = extraction.attentions.index_axis(Axis(0), entry.attention_id);
            write_json(&self.paths.attention_map(entry.idx), &attention_to_nested(attn))?;
        }
        Ok(())
    }

    /// Run the saliency attributor for every class over every batch and
    /// assemble the saliency-list artifact.
    pub fn write_saliency_list(
        &mut self,
        split: &EvalSplit,
        extraction: &ExtractionOutput,
        subset: &[SubsetEntry],
    ) -> Result<BTreeMap<i64, crate::artifacts::SaliencyEntry>> {
        let batches = split.batches(self.collaborators.tokenizer.as_ref(), &self.config);
        let n_classes = self.config.class_labels.len();

        let mut attributions: Vec<Vec<Vec<f64>>> = vec![Vec::with_capacity(split.len()); n_classes];
        for batch in &batches {
            for (class, rows) in attributions.iter_mut().enumerate() {
                let scores = self
                    .collaborators
                    .attributor
                    .attribute(batch, class)
                    .context("Saliency attribution failed")?;
                for row in scores.rows() {
                    rows.push(row.iter().map(|&v| f64::from(v)).collect());
                }
            }
        }

        let list = build_saliency_list(
            subset,
            &extraction.tokens,
            &attributions,
            &extraction.labels,
            &extraction.predictions,
            &extraction.softmaxes,
            &self.config,
        );
        info!("Saliency list for {} examples", list.len());
        write_json(&self.paths.saliency_list(), &list)?;
        Ok(list)
    }

    pub fn write_semantic_ranking(
        &self,
        extraction: &ExtractionOutput,
        subset: &[SubsetEntry],
        saliency: &BTreeMap<i64, crate::artifacts::SaliencyEntry>,
    ) -> Result<()> {
        let mut ranking = RankingById::new();
        for entry in subset.iter().filter(|e| e.idx >= 0) {
            let Some(saliency_entry) = saliency.get(&entry.idx) else {
                continue;
            };
            let values = predicted_saliency(saliency_entry, &self.config);
            if values.is_empty() {
                continue;
            }
            let attn = extraction.attentions.index_axis(Axis(0), entry.attention_id);
            ranking.insert(entry.idx, rank_by_saliency(attn, &values));
        }
        info!("Semantic ranking for {} examples", ranking.len());
        write_json(&self.paths.semantic_ranking(), &ranking)
    }

    /// Word-level view of one example: sub-word merge, attention collapse
    /// and dependency parse. Returns `None` for examples with no words
    /// between the boundary markers.
    fn parse_example(
        &mut self,
        extraction: &ExtractionOutput,
        attention_id: usize,
    ) -> Result<Option<ParsedExample>> {
        let stripped = strip_padding(&extraction.tokens[attention_id], &self.config.pad_token);
        if stripped.len() <= 2 {
            return Ok(None);
        }
        let merge = merge_subwords(&stripped, &self.config.subword_prefix);
        let n_tokens = stripped.len();
        let attn = extraction.attentions.index_axis(Axis(0), attention_id);
        let word_attn = collapse_attention(attn.slice(s![.., .., ..n_tokens, ..n_tokens]), &merge.spans);

        let words: Vec<String> = merge.words[1..merge.words.len() - 1].to_vec();
        let edges = self
            .collaborators
            .parser
            .parse(&words)
            .context("Dependency parse failed")?;

        Ok(Some(ParsedExample {
            words,
            attentions: word_attn,
            heads: edges.iter().map(|e| e.head).collect(),
            relations: edges.iter().map(|e| e.relation.clone()).collect(),
        }))
    }

    /// Dependency trees for the selected subset, keyed by dataset id.
    pub fn write_dependency_trees(
        &mut self,
        extraction: &ExtractionOutput,
        subset: &[SubsetEntry],
    ) -> Result<()> {
        let mut trees: BTreeMap<i64, DependencyTree> = BTreeMap::new();
        for entry in subset.iter().filter(|e| e.idx >= 0) {
            let Some(parsed) = self.parse_example(extraction, entry.attention_id)? else {
                continue;
            };
            let list = parsed
                .heads
                .iter()
                .zip(&parsed.relations)
                .enumerate()
                .map(|(child, (&head, relation))| DependencyNode {
                    child,
                    parent: head.checked_sub(1),
                    relation: relation.clone(),
                })
                .collect();
            trees.insert(
                entry.idx,
                DependencyTree {
                    list,
                    words: parsed.words,
                },
            );
        }
        info!("Dependency trees for {} examples", trees.len());
        write_json(&self.paths.dependencies(), &trees)
    }

    /// Corpus-wide syntactic head ranking over every example.
    pub fn write_syntactic_ranking(&mut self, extraction: &ExtractionOutput) -> Result<()> {
        let n_examples = extraction.tokens.len();
        let mut parsed: Vec<ParsedExample> = Vec::with_capacity(n_examples);
        for attention_id in 0..n_examples {
            if let Some(example) = self.parse_example(extraction, attention_id)? {
                parsed.push(example);
            }
        }
        info!("Scoring heads as dependency predictors over {} examples", parsed.len());
        let ranking = rank_relations(&parsed, &self.config);
        write_json(&self.paths.syntactic_ranking(), &ranking)
    }

    pub fn write_confidence_rankings(
        &self,
        extraction: &ExtractionOutput,
        subset: &[SubsetEntry],
    ) -> Result<()> {
        let global = mean_confidence(&extraction.attentions, &self.config);
        write_json(&self.paths.mean_confidence(), &global)?;

        let mut per_example = RankingById::new();
        for entry in subset.iter().filter(|e| e.idx >= 0) {
            let attn = extraction.attentions.index_axis(Axis(0), entry.attention_id);
            per_example.insert(entry.idx, example_confidence(attn));
        }
        write_json(&self.paths.confidence_ranking(), &per_example)
    }

    pub fn write_sentence_data(&mut self, subset: &[SubsetEntry], split: &EvalSplit) -> Result<()> {
        let embedding = build_embedding_list(
            subset,
            split,
            self.collaborators.tokenizer.as_ref(),
            self.collaborators.encoder.as_mut(),
            self.collaborators.projector.as_ref(),
            &self.config,
        )?;
        write_json(&self.paths.embedding_list(), &embedding)?;

        let table = build_table_list(
            subset,
            split,
            self.collaborators.tokenizer.as_ref(),
            self.collaborators.encoder.as_mut(),
            &self.config,
        )?;
        write_json(&self.paths.table_list(), &table)
    }

    /// Aggregate the four ranking artifacts on disk into the atlas.
    pub fn write_atlas(&self) -> Result<()> {
        let atlas = rebuild_atlas(&self.paths, &self.config)?;
        write_json(&self.paths.atlas(), &atlas)
    }
}

/// Rebuild the atlas from the ranking artifacts on disk. Pure function of
/// its JSON inputs; re-running it reproduces byte-identical output.
pub fn rebuild_atlas(paths: &ArtifactPaths, cfg: &PipelineConfig) -> Result<Vec<AtlasEntry>> {
    let semantic: RankingById = read_json(&paths.semantic_ranking())?;
    let syntactic: SyntacticRanking = read_json(&paths.syntactic_ranking())?;
    let gradient: RankingById = read_json(&paths.gradient_ranking())?;
    let confidence: RankedHeads = read_json(&paths.mean_confidence())?;
    Ok(build_atlas(&semantic, &syntactic, &gradient, &confidence, cfg))
}
