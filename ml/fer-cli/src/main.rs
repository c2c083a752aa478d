//! Facial expression recognition command-line tool.
//!
//! # Commands
//!
//! - `fer train --data <dir>` - Train a CNN or residual network
//! - `fer inspect --data <dir>` - Print per-class counts of a dataset
//!
//! The data directory holds `train/<class>/*` and `test/<class>/*` images.
//! Logging is controlled with `RUST_LOG` (default `info`).

mod inspect;
mod train;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Facial expression recognition
#[derive(Parser)]
#[command(name = "fer")]
#[command(about = "Train and inspect facial expression classifiers", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Network architecture to train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Architecture {
    /// Two convolution stages and a dense head
    Cnn,
    /// Residual network of convolution and identity blocks
    Resnet,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model and write checkpoint, history and plot
    Train(train::TrainArgs),

    /// Print class counts for the train and test folders
    Inspect {
        /// Dataset root containing `train/` and `test/`
        #[arg(long)]
        data: PathBuf,

        /// Batch size used to report the number of batches
        #[arg(long, default_value_t = 32)]
        batch_size: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train(args) => train::run(&args),
        Commands::Inspect { data, batch_size } => inspect::run(&data, batch_size),
    }
}
