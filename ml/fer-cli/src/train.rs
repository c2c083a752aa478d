//! The `train` command.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use burn::backend::Autodiff;
use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;
use burn_ndarray::NdArray;
use clap::Args;
use fer_dataset::{ColorMode, DataSplits, DatasetSummary, LoaderConfig, load_data_with};
use fer_models::{
    CheckpointFormat, ImageClassifier, InputShape, ResidualClassifierConfig, SimpleCnnConfig,
    save_checkpoint,
};
use fer_training::{
    CompiledModel, PlotParams, TrainingConfig, TrainingHistory, save_history_plot,
};
use tracing::info;

use crate::Architecture;

type TrainBackend = Autodiff<NdArray<f32>>;

/// Arguments of `fer train`.
#[derive(Args)]
pub struct TrainArgs {
    /// Dataset root containing `train/` and `test/`
    #[arg(long)]
    data: PathBuf,

    /// Architecture to train
    #[arg(long, value_enum, default_value_t = Architecture::Cnn)]
    model: Architecture,

    /// JSON training config; flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Batch size
    #[arg(long)]
    batch_size: Option<usize>,

    /// Fraction of training batches held out for validation
    #[arg(long, default_value_t = 0.2)]
    val_split: f64,

    /// Side length images are resized to
    #[arg(long, default_value_t = fer_dataset::DEFAULT_IMAGE_SIZE)]
    image_size: usize,

    /// Load images as a single luminance channel
    #[arg(long)]
    grayscale: bool,

    /// Seed for shuffling and batch order
    #[arg(long)]
    seed: Option<u64>,

    /// Write weights as JSON instead of binary
    #[arg(long)]
    json_weights: bool,

    /// Output directory
    #[arg(long, default_value = "runs")]
    out: PathBuf,
}

impl TrainArgs {
    fn training_config(&self) -> Result<TrainingConfig> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => TrainingConfig::default(),
        };
        if let Some(epochs) = self.epochs {
            config = config.with_epochs(epochs);
        }
        if let Some(batch_size) = self.batch_size {
            config = config.with_batch_size(batch_size);
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        config.validate()?;
        Ok(config)
    }

    fn loader_config(&self) -> LoaderConfig {
        let color_mode = if self.grayscale {
            ColorMode::Grayscale
        } else {
            ColorMode::Rgb
        };
        let config = LoaderConfig::default()
            .with_image_size(self.image_size, self.image_size)
            .with_color_mode(color_mode);
        match self.seed {
            Some(seed) => config.with_seed(seed),
            None => config,
        }
    }
}

/// Loads data, trains the chosen model and writes the run artifacts.
pub fn run(args: &TrainArgs) -> Result<()> {
    let config = args.training_config()?;
    let loader = args.loader_config();

    let splits = load_data_with(config.batch_size, args.val_split, &args.data, &loader)
        .with_context(|| format!("failed to load dataset from {}", args.data.display()))?;
    if splits.validation.is_empty() {
        bail!(
            "validation split is empty; lower --batch-size or raise --val-split (got {})",
            args.val_split
        );
    }
    print!("{}", DatasetSummary::from_dataset(&splits.train).to_report());

    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;

    let device = Default::default();
    let num_classes = splits.class_names().len();
    let shape = InputShape::new(args.image_size, args.image_size, loader.color_mode.channels());

    match args.model {
        Architecture::Cnn => {
            let model = SimpleCnnConfig::new(shape)
                .with_num_classes(num_classes)
                .init::<TrainBackend>(&device)?;
            fit_and_save::<TrainBackend, _>(model, &splits, config, args, &device)
        }
        Architecture::Resnet => {
            let model = ResidualClassifierConfig::default()
                .with_in_channels(shape.channels)
                .with_num_classes(num_classes)
                .init::<TrainBackend>(&device)?;
            fit_and_save::<TrainBackend, _>(model, &splits, config, args, &device)
        }
    }
}

fn fit_and_save<B, M>(
    model: M,
    splits: &DataSplits,
    config: TrainingConfig,
    args: &TrainArgs,
    device: &B::Device,
) -> Result<()>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + ImageClassifier<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
{
    let batch_size = config.batch_size;
    let compiled = CompiledModel::new(model).with_optimizer(config.optimizer);
    info!(
        params = compiled.num_params::<B>(),
        optimizer = %config.optimizer.optimizer_type,
        epochs = config.epochs,
        "starting training"
    );

    let (compiled, history) = compiled.fit(&splits.train, &splits.validation, config, device)?;
    println!();
    print!("{}", history.summary());

    let test = compiled.evaluate::<B>(&splits.test, batch_size, device)?;
    println!("test: {test}");

    write_artifacts::<B, M>(&compiled, &history, args)
}

fn write_artifacts<B, M>(
    compiled: &CompiledModel<M>,
    history: &TrainingHistory,
    args: &TrainArgs,
) -> Result<()>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let format = if args.json_weights {
        CheckpointFormat::Json
    } else {
        CheckpointFormat::Binary
    };
    let name = match args.model {
        Architecture::Cnn => "cnn",
        Architecture::Resnet => "resnet",
    };
    let out: &Path = &args.out;

    let weights = save_checkpoint::<B, M>(&compiled.model, &out.join(name), format)?;
    let history_path = out.join(format!("{name}_history.json"));
    history.save_json(&history_path)?;
    let plot_path = out.join(format!("{name}_history.svg"));
    save_history_plot(history, &plot_path, &PlotParams::default())?;

    println!();
    println!("weights: {}", weights.display());
    println!("history: {}", history_path.display());
    println!("plot:    {}", plot_path.display());
    Ok(())
}
