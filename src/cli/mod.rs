// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with `clap`.
// All business logic is delegated to Layer 2 (application);
// this layer routes, picks the backend and prints summaries.
//
//   Wgpu    → Autodiff<Wgpu> for training, Wgpu for inference
//   NdArray → the CPU equivalents
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use burn::backend::{
    ndarray::NdArrayDevice,
    wgpu::WgpuDevice,
    Autodiff, NdArray, Wgpu,
};
use clap::Parser;
use commands::{BackendKind, ClearCacheArgs, Commands, PredictArgs, TrainArgs};

use crate::application::{
    corpus_use_case::{build_vocabulary, clear_cache, preprocess_gazettes},
    predict_use_case::{PredictConfig, PredictUseCase},
    train_use_case::{TrainOutcome, TrainUseCase},
};
use crate::ml::inferencer::ReconstructionReport;

#[derive(Parser, Debug)]
#[command(
    name = "text-autoencoder",
    version,
    about = "Train LSTM, GRU or Transformer text autoencoders and measure how well they reconstruct text."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::BuildVocab(args) => {
                let vocab = build_vocabulary(&args.into())?;
                println!("Vocabulary written: {} tokens (reserved included)", vocab.len());
                Ok(())
            }
            Commands::Train(args)   => run_train(args),
            Commands::Predict(args) => run_predict(args),
            Commands::ClearCache(ClearCacheArgs { cache_dir, split }) => {
                clear_cache(&cache_dir, split)?;
                println!("Cache cleared.");
                Ok(())
            }
            Commands::PreprocessGazettes(args) => {
                let written = preprocess_gazettes(&args.into())?;
                println!("Wrote {written} sentences.");
                Ok(())
            }
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    let backend  = args.backend;
    let use_case = TrainUseCase::new(args.into());
    tracing::info!(
        "Training {} autoencoder on '{}'",
        use_case.config().variant,
        use_case.config().dataset_dir.display()
    );

    let outcome = match backend {
        BackendKind::Wgpu    => use_case.execute::<Autodiff<Wgpu>>(&WgpuDevice::default())?,
        BackendKind::Ndarray => use_case.execute::<Autodiff<NdArray>>(&NdArrayDevice::default())?,
    };
    print_outcome(&outcome);
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    match args.backend {
        BackendKind::Wgpu    => predict_with::<Wgpu>(&args, &WgpuDevice::default()),
        BackendKind::Ndarray => predict_with::<NdArray>(&args, &NdArrayDevice::default()),
    }
}

fn predict_with<B: burn::prelude::Backend>(args: &PredictArgs, device: &B::Device) -> Result<()> {
    let use_case = PredictUseCase::<B>::new(PredictConfig::from(args), device)?;
    match &args.text {
        Some(text) => println!("{}", use_case.reconstruct(text)?),
        None       => print_report(&use_case.execute()?),
    }
    Ok(())
}

fn print_outcome(outcome: &TrainOutcome) {
    if let Some(report) = &outcome.training {
        println!(
            "Training {:?} after {} epochs. Best epoch: {}, best val_loss: {}",
            report.status,
            report.history.len(),
            report.best_epoch.map_or("-".to_string(), |e| e.to_string()),
            report.best_loss.map_or("-".to_string(), |l| format!("{l:.4}")),
        );
    }
    if let Some(report) = &outcome.evaluation {
        print_report(report);
    }
}

fn print_report(report: &ReconstructionReport) {
    for ex in report.examples.iter().take(10) {
        println!("  {}\n→ {}  ({:.0}%)", ex.text, ex.reconstruction, ex.token_accuracy * 100.0);
    }
    println!(
        "\n{} texts | token accuracy {:.1}% | exact match {:.1}%",
        report.score.sequences,
        report.token_accuracy * 100.0,
        report.exact_match_rate * 100.0
    );
}
