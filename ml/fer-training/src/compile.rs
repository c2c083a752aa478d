//! Pairing a network with its optimizer, loss and metrics.

use burn::module::{AutodiffModule, Module};
use burn::prelude::Backend;
use burn::tensor::backend::AutodiffBackend;
use fer_dataset::ImageDataset;
use fer_models::{
    ImageClassifier, InputShape, ResidualClassifier, ResidualClassifierConfig, SimpleCnn,
    SimpleCnnConfig,
};
use tracing::info;

use crate::config::{OptimizerConfig, TrainingConfig};
use crate::error::Result;
use crate::loss::{LossKind, Metric};
use crate::metrics::{EvaluationMetrics, TrainingHistory};
use crate::trainer::Trainer;

/// Learning rate [`compile_simple_cnn`] configures Adam with.
pub const DEFAULT_LEARNING_RATE: f32 = 1e-3;

/// A model together with the optimizer, loss and metrics it trains with.
///
/// [`CompiledModel::fit`] uses the compiled optimizer, overriding the one in
/// the [`TrainingConfig`] it is given.
#[derive(Debug, Clone)]
pub struct CompiledModel<M> {
    /// The network.
    pub model: M,

    /// Optimizer settings.
    pub optimizer: OptimizerConfig,

    /// Training loss.
    pub loss: LossKind,

    /// Metrics reported during training and evaluation.
    pub metrics: Vec<Metric>,
}

impl<M> CompiledModel<M> {
    /// Compiles `model` with Adam, categorical cross-entropy and accuracy.
    #[must_use]
    pub fn new(model: M) -> Self {
        Self {
            model,
            optimizer: OptimizerConfig::adam(DEFAULT_LEARNING_RATE),
            loss: LossKind::CategoricalCrossEntropy,
            metrics: vec![Metric::Accuracy],
        }
    }

    /// Sets the optimizer.
    #[must_use]
    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Sets the loss.
    #[must_use]
    pub fn with_loss(mut self, loss: LossKind) -> Self {
        self.loss = loss;
        self
    }

    /// Builds the trainer `fit` and `evaluate` delegate to.
    #[must_use]
    pub fn trainer(&self, config: TrainingConfig) -> Trainer {
        Trainer::new(config.with_optimizer(self.optimizer)).with_loss(self.loss)
    }

    /// Returns the network, dropping the training setup.
    pub fn into_model(self) -> M {
        self.model
    }

    /// Number of trainable parameters.
    #[must_use]
    pub fn num_params<B: Backend>(&self) -> usize
    where
        M: Module<B>,
    {
        self.model.num_params()
    }

    /// Trains the model.
    ///
    /// # Errors
    ///
    /// See [`Trainer::fit`].
    pub fn fit<B>(
        self,
        train: &ImageDataset,
        validation: &ImageDataset,
        config: TrainingConfig,
        device: &B::Device,
    ) -> Result<(Self, TrainingHistory)>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B> + ImageClassifier<B>,
        M::InnerModule: ImageClassifier<B::InnerBackend>,
    {
        let trainer = self.trainer(config);
        let (model, history) = trainer.fit(self.model, train, validation, device)?;
        Ok((Self { model, ..self }, history))
    }

    /// Computes loss and accuracy over `dataset` in inference mode.
    ///
    /// Runs on the inner (non-autodiff) model, so dropout is disabled and
    /// batch normalisation uses its running statistics without updating them.
    ///
    /// # Errors
    ///
    /// See [`Trainer::evaluate`].
    pub fn evaluate<B>(
        &self,
        dataset: &ImageDataset,
        batch_size: usize,
        device: &B::Device,
    ) -> Result<EvaluationMetrics>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B>,
        M::InnerModule: ImageClassifier<B::InnerBackend>,
    {
        let config = TrainingConfig::new(1).with_batch_size(batch_size);
        self.trainer(config)
            .evaluate::<B::InnerBackend, M::InnerModule>(&self.model.valid(), dataset, device)
    }
}

/// Builds and compiles the two-stage CNN for images of `input_shape`.
///
/// The model is trained with Adam (learning rate `1e-3`) on categorical
/// cross-entropy and reports accuracy.
///
/// # Errors
///
/// Returns an error if `input_shape` is too small for the network.
///
/// # Example
///
/// ```
/// use burn_ndarray::NdArray;
/// use fer_models::{ImageClassifier, InputShape, NUM_EXPRESSIONS};
/// use fer_training::compile_simple_cnn;
///
/// let device = Default::default();
/// let compiled = compile_simple_cnn::<NdArray<f32>>(InputShape::new(48, 48, 3), &device).unwrap();
/// assert_eq!(compiled.model.num_classes(), NUM_EXPRESSIONS);
/// ```
pub fn compile_simple_cnn<B: Backend>(
    input_shape: InputShape,
    device: &B::Device,
) -> Result<CompiledModel<SimpleCnn<B>>> {
    let model = SimpleCnnConfig::new(input_shape).init::<B>(device)?;
    let compiled = CompiledModel::new(model);
    info!(
        height = input_shape.height,
        width = input_shape.width,
        channels = input_shape.channels,
        params = compiled.num_params::<B>(),
        "compiled simple CNN"
    );
    Ok(compiled)
}

/// Builds and compiles a residual classifier.
///
/// Uses the same optimizer, loss and metrics as [`compile_simple_cnn`].
///
/// # Errors
///
/// Returns an error if `config` is invalid.
pub fn compile_residual_classifier<B: Backend>(
    config: &ResidualClassifierConfig,
    device: &B::Device,
) -> Result<CompiledModel<ResidualClassifier<B>>> {
    let model = config.init::<B>(device)?;
    let compiled = CompiledModel::new(model);
    info!(
        stages = config.stages.len(),
        blocks = compiled.model.num_blocks(),
        params = compiled.num_params::<B>(),
        "compiled residual classifier"
    );
    Ok(compiled)
}
