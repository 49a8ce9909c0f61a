// ============================================================
// Layer 2 — Predict Use Case
// ============================================================
// Loads a trained checkpoint and reports how well it
// reconstructs one split of a dataset directory.
//
//   1. Check the checkpoint against the supplied embedding
//      dimension / file and vocabulary size (Layer 5)
//   2. Read <dataset_dir>/<split>.txt                 (Layer 4)
//   3. Reconstruct and score every line               (Layer 5)
//   4. Optionally write the report as JSON

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use burn::prelude::*;

use crate::data::loader::CorpusLoader;
use crate::domain::{document::Split, traits::DocumentSource};
use crate::ml::inferencer::{LoadEnvironment, ReconstructionReport, Reconstructor};

#[derive(Debug, Clone)]
pub struct PredictConfig {
    pub model_path:      PathBuf,
    pub dataset_dir:     PathBuf,
    pub split:           Split,
    pub embedding_dim:   usize,
    pub embeddings_file: Option<PathBuf>,
    pub vocab_size:      Option<usize>,
    /// Where to write the JSON report, if anywhere
    pub output:          Option<PathBuf>,
}

pub struct PredictUseCase<B: Backend> {
    config:        PredictConfig,
    reconstructor: Reconstructor<B>,
}

impl<B: Backend> PredictUseCase<B> {
    /// Loading fails before any reconstruction when the checkpoint
    /// does not match the supplied environment.
    pub fn new(config: PredictConfig, device: &B::Device) -> Result<Self> {
        let env = LoadEnvironment {
            embedding_dim:   config.embedding_dim,
            vocab_size:      config.vocab_size,
            embeddings_file: config.embeddings_file.clone(),
        };
        let reconstructor = Reconstructor::from_checkpoint(&config.model_path, &env, device)
            .with_context(|| format!("cannot load model from '{}'", config.model_path.display()))?;
        Ok(Self { config, reconstructor })
    }

    pub fn reconstruct(&self, text: &str) -> Result<String> {
        Ok(self.reconstructor.reconstruct(text)?)
    }

    /// Score every text of the configured split.
    pub fn execute(&self) -> Result<ReconstructionReport> {
        let cfg  = &self.config;
        let docs = CorpusLoader::new(&cfg.dataset_dir, cfg.split).load_all()?;
        if docs.is_empty() {
            anyhow::bail!(
                "no {} texts found in '{}'",
                cfg.split,
                cfg.dataset_dir.display()
            );
        }
        let texts: Vec<&str> = docs.iter().map(|d| d.text.as_str()).collect();
        let report = self.reconstructor.evaluate(&texts)?;

        if let Some(path) = &cfg.output {
            let json = serde_json::to_string_pretty(&report)?;
            fs::write(path, json).with_context(|| format!("cannot write report to '{}'", path.display()))?;
            tracing::info!("Report written to '{}'", path.display());
        }
        Ok(report)
    }
}
