//! Training loop implementation.

use std::time::Instant;

use burn::module::AutodiffModule;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{AdamConfig, AdamWConfig, GradientsParams, Optimizer, SgdConfig};
use burn::prelude::Backend;
use burn::tensor::ElementConversion;
use burn::tensor::backend::AutodiffBackend;
use fer_dataset::{BatchOrder, ImageBatcher, ImageDataset};
use fer_models::ImageClassifier;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{OptimizerType, TrainingConfig};
use crate::error::{Result, TrainingError};
use crate::loss::{LossKind, correct_predictions};
use crate::metrics::{EpochMetrics, EvaluationMetrics, TrainingHistory};

/// State of a training run.
///
/// # Example
///
/// ```
/// use fer_training::TrainingState;
///
/// let state = TrainingState::new();
/// assert_eq!(state.epoch, 0);
/// assert!(!state.is_finished());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    /// Current epoch (0-indexed).
    pub epoch: usize,

    /// Current batch within epoch.
    pub batch: usize,

    /// Total epochs to run.
    pub total_epochs: usize,

    /// Best validation loss seen.
    pub best_val_loss: Option<f32>,

    /// Validations without improvement (for early stopping).
    pub epochs_without_improvement: usize,

    /// Whether training has finished.
    pub finished: bool,

    /// Recorded history.
    pub history: TrainingHistory,
}

impl Default for TrainingState {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingState {
    /// Creates a new training state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: 0,
            batch: 0,
            total_epochs: 0,
            best_val_loss: None,
            epochs_without_improvement: 0,
            finished: false,
            history: TrainingHistory::new(),
        }
    }

    /// Creates a training state for the given config.
    #[must_use]
    pub fn from_config(config: &TrainingConfig) -> Self {
        Self {
            total_epochs: config.epochs,
            ..Self::new()
        }
    }

    /// Returns true if training is finished.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Returns the progress as a fraction [0, 1].
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress(&self) -> f32 {
        if self.total_epochs == 0 {
            0.0
        } else {
            self.epoch as f32 / self.total_epochs as f32
        }
    }

    /// Advances to the next epoch.
    pub const fn next_epoch(&mut self) {
        self.epoch += 1;
        self.batch = 0;
        if self.epoch >= self.total_epochs {
            self.finished = true;
        }
    }

    /// Advances to the next batch.
    pub const fn next_batch(&mut self) {
        self.batch += 1;
    }

    /// Records validation loss and checks for improvement.
    ///
    /// Returns true if this is a new best.
    pub fn record_val_loss(&mut self, val_loss: f32) -> bool {
        let improved = self.best_val_loss.is_none_or(|best| val_loss < best);

        if improved {
            self.best_val_loss = Some(val_loss);
            self.epochs_without_improvement = 0;
        } else {
            self.epochs_without_improvement += 1;
        }

        improved
    }

    /// Checks if early stopping should trigger.
    #[must_use]
    pub const fn should_early_stop(&self, patience: usize) -> bool {
        patience > 0 && self.epochs_without_improvement >= patience
    }

    /// Marks training as early stopped.
    pub fn early_stop(&mut self, reason: impl Into<String>) {
        self.finished = true;
        self.history.set_early_stopped(reason);
    }

    /// Adds epoch metrics.
    pub fn add_epoch_metrics(&mut self, metrics: EpochMetrics) {
        self.history.add_epoch(metrics);
    }
}

/// Runs the training loop and evaluation for an [`ImageClassifier`].
///
/// # Example
///
/// ```
/// use fer_training::{Trainer, TrainingConfig};
///
/// let trainer = Trainer::new(TrainingConfig::new(10));
/// assert_eq!(trainer.config().epochs, 10);
/// assert_eq!(trainer.num_batches(100), 4);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Trainer {
    config: TrainingConfig,
    loss: LossKind,
}

impl Trainer {
    /// Creates a new trainer with the given config.
    #[must_use]
    pub const fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            loss: LossKind::CategoricalCrossEntropy,
        }
    }

    /// Sets the loss.
    #[must_use]
    pub const fn with_loss(mut self, loss: LossKind) -> Self {
        self.loss = loss;
        self
    }

    /// Returns the training configuration.
    #[must_use]
    pub const fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Returns the loss.
    #[must_use]
    pub const fn loss(&self) -> LossKind {
        self.loss
    }

    /// Creates initial training state.
    #[must_use]
    pub fn initial_state(&self) -> TrainingState {
        TrainingState::from_config(&self.config)
    }

    /// Computes the learning rate for the current epoch.
    #[must_use]
    pub fn compute_lr(&self, epoch: usize) -> f32 {
        self.config.lr_schedule.compute_lr(
            self.config.optimizer.learning_rate,
            epoch,
            self.config.epochs,
        )
    }

    /// Returns whether validation should run this epoch.
    #[must_use]
    pub const fn should_validate(&self, epoch: usize) -> bool {
        self.config.val_frequency > 0 && (epoch + 1) % self.config.val_frequency == 0
    }

    /// Computes the number of batches for a dataset size.
    #[must_use]
    pub const fn num_batches(&self, dataset_size: usize) -> usize {
        if self.config.batch_size == 0 {
            0
        } else {
            dataset_size.div_ceil(self.config.batch_size)
        }
    }

    /// Order of the training batches for an epoch.
    #[must_use]
    pub fn batch_order(&self, epoch: usize) -> BatchOrder {
        if !self.config.shuffle {
            return BatchOrder::Sequential;
        }
        self.config.seed.map_or(BatchOrder::Random, |seed| {
            BatchOrder::Seeded(seed.wrapping_add(epoch as u64))
        })
    }

    /// Trains `model` on `train`, validating on `validation` after each
    /// scheduled epoch.
    ///
    /// Validation runs on the inner (non-autodiff) model, so dropout is
    /// disabled there. An empty validation set skips validation and early
    /// stopping.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::InvalidConfig`] for an invalid configuration
    /// or a dataset whose class count differs from the model's,
    /// [`TrainingError::Empty`] for an empty training set, and
    /// [`TrainingError::NumericalInstability`] if a batch loss is not finite.
    pub fn fit<B, M>(
        &self,
        model: M,
        train: &ImageDataset,
        validation: &ImageDataset,
        device: &B::Device,
    ) -> Result<(M, TrainingHistory)>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B> + ImageClassifier<B>,
        M::InnerModule: ImageClassifier<B::InnerBackend>,
    {
        self.config.validate()?;
        if train.is_empty() {
            return Err(TrainingError::empty("training set has no samples"));
        }
        check_classes(train, model.num_classes())?;
        if !validation.is_empty() {
            check_classes(validation, model.num_classes())?;
        }

        let opt = &self.config.optimizer;
        let weight_decay =
            (opt.weight_decay > 0.0).then(|| WeightDecayConfig::new(opt.weight_decay));

        info!(
            optimizer = %opt.optimizer_type,
            learning_rate = opt.learning_rate,
            epochs = self.config.epochs,
            batch_size = self.config.batch_size,
            train = train.len(),
            validation = validation.len(),
            "starting training"
        );

        match opt.optimizer_type {
            OptimizerType::Adam => {
                let optim = AdamConfig::new()
                    .with_beta_1(opt.beta1)
                    .with_beta_2(opt.beta2)
                    .with_epsilon(opt.epsilon)
                    .with_weight_decay(weight_decay)
                    .init::<B, M>();
                self.run(model, optim, train, validation, device)
            }
            OptimizerType::AdamW => {
                let optim = AdamWConfig::new()
                    .with_beta_1(opt.beta1)
                    .with_beta_2(opt.beta2)
                    .with_epsilon(opt.epsilon)
                    .with_weight_decay(opt.weight_decay)
                    .init::<B, M>();
                self.run(model, optim, train, validation, device)
            }
            OptimizerType::Sgd => {
                let optim = SgdConfig::new()
                    .with_weight_decay(weight_decay)
                    .init::<B, M>();
                self.run(model, optim, train, validation, device)
            }
            OptimizerType::SgdMomentum => {
                let momentum = MomentumConfig::new().with_momentum(f64::from(opt.momentum));
                let optim = SgdConfig::new()
                    .with_weight_decay(weight_decay)
                    .with_momentum(Some(momentum))
                    .init::<B, M>();
                self.run(model, optim, train, validation, device)
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn run<B, M, O>(
        &self,
        mut model: M,
        mut optim: O,
        train: &ImageDataset,
        validation: &ImageDataset,
        device: &B::Device,
    ) -> Result<(M, TrainingHistory)>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B> + ImageClassifier<B>,
        M::InnerModule: ImageClassifier<B::InnerBackend>,
        O: Optimizer<M, B>,
    {
        let batcher = ImageBatcher::<B>::new(train, device.clone());
        let mut state = self.initial_state();

        while !state.is_finished() {
            let epoch = state.epoch;
            let lr = self.compute_lr(epoch);
            let started = Instant::now();

            let mut loss_sum = 0.0f64;
            let mut correct = 0usize;
            for samples in train.batches(self.config.batch_size, self.batch_order(epoch)) {
                let batch = batcher.batch(&samples)?;
                let logits = model.logits(batch.images);
                let loss = self.loss.compute(logits.clone(), batch.one_hot);

                let loss_value: f32 = loss.clone().into_scalar().elem();
                if !loss_value.is_finite() {
                    return Err(TrainingError::numerical_instability(format!(
                        "loss is {loss_value} at epoch {epoch}, batch {}",
                        state.batch
                    )));
                }
                loss_sum += f64::from(loss_value) * samples.len() as f64;
                correct += correct_predictions(logits, batch.targets);

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optim.step(f64::from(lr), model, grads);

                debug!(epoch, batch = state.batch, loss = loss_value, "batch complete");
                state.next_batch();
            }

            #[allow(clippy::cast_possible_truncation)]
            let mut metrics = EpochMetrics::new(
                epoch,
                (loss_sum / train.len() as f64) as f32,
                correct as f32 / train.len() as f32,
            )
            .with_learning_rate(lr)
            .with_train_time(started.elapsed().as_secs_f32())
            .with_samples(train.len(), None);

            if self.should_validate(epoch) && !validation.is_empty() {
                let started = Instant::now();
                let eval = self.evaluate::<B::InnerBackend, M::InnerModule>(
                    &model.valid(),
                    validation,
                    device,
                )?;
                metrics = metrics
                    .with_validation(eval.loss, eval.accuracy)
                    .with_val_time(started.elapsed().as_secs_f32())
                    .with_samples(train.len(), Some(eval.samples));
                state.record_val_loss(eval.loss);
            }

            info!(
                epoch,
                loss = metrics.train_loss,
                accuracy = metrics.train_accuracy,
                val_loss = ?metrics.val_loss,
                val_accuracy = ?metrics.val_accuracy,
                learning_rate = lr,
                "epoch complete"
            );
            state.add_epoch_metrics(metrics);
            state.next_epoch();

            let patience = self.config.early_stopping_patience;
            if !state.is_finished() && state.should_early_stop(patience) {
                let reason = format!("no validation improvement for {patience} validations");
                warn!(epoch, %reason, "early stopping");
                state.early_stop(reason);
            }
        }

        info!(
            epochs = state.history.epochs_completed(),
            best_val_loss = ?state.history.best_val_loss,
            "training finished"
        );
        Ok((model, state.history))
    }

    /// Computes loss and accuracy of `model` over `dataset`.
    ///
    /// # Errors
    ///
    /// Returns [`TrainingError::Empty`] for an empty dataset,
    /// [`TrainingError::InvalidConfig`] for a zero batch size or a class
    /// count mismatch, and [`TrainingError::NumericalInstability`] if the
    /// loss is not finite.
    #[allow(clippy::cast_precision_loss)]
    pub fn evaluate<B, M>(
        &self,
        model: &M,
        dataset: &ImageDataset,
        device: &B::Device,
    ) -> Result<EvaluationMetrics>
    where
        B: Backend,
        M: ImageClassifier<B>,
    {
        if dataset.is_empty() {
            return Err(TrainingError::empty("evaluation set has no samples"));
        }
        if self.config.batch_size == 0 {
            return Err(TrainingError::invalid_config("batch size must be > 0"));
        }
        check_classes(dataset, model.num_classes())?;

        let batcher = ImageBatcher::<B>::new(dataset, device.clone());
        let mut loss_sum = 0.0f64;
        let mut correct = 0usize;

        for samples in dataset.batches(self.config.batch_size, BatchOrder::Sequential) {
            let batch = batcher.batch(&samples)?;
            let logits = model.logits(batch.images);
            let loss: f32 = self
                .loss
                .compute(logits.clone(), batch.one_hot)
                .into_scalar()
                .elem();
            if !loss.is_finite() {
                return Err(TrainingError::numerical_instability(format!(
                    "evaluation loss is {loss}"
                )));
            }
            loss_sum += f64::from(loss) * samples.len() as f64;
            correct += correct_predictions(logits, batch.targets);
        }

        #[allow(clippy::cast_possible_truncation)]
        let metrics = EvaluationMetrics::new(
            (loss_sum / dataset.len() as f64) as f32,
            correct as f32 / dataset.len() as f32,
            dataset.len(),
        );
        debug!(%metrics, "evaluated");
        Ok(metrics)
    }
}

fn check_classes(dataset: &ImageDataset, num_classes: usize) -> Result<()> {
    if dataset.num_classes() == num_classes {
        Ok(())
    } else {
        Err(TrainingError::invalid_config(format!(
            "dataset has {} classes but the model predicts {num_classes}",
            dataset.num_classes()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LearningRateSchedule, OptimizerConfig};
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use fer_dataset::ImageSample;
    use fer_models::{InputShape, SimpleCnnConfig};

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<TestBackend>;

    /// Two classes: dark images are class 0, bright images class 1.
    fn dataset(n: u64) -> ImageDataset {
        let samples = (0..n)
            .map(|i| {
                let label = usize::try_from(i % 2).unwrap_or(0);
                let value = if label == 0 { 0.1 } else { 0.9 };
                ImageSample::new(i, vec![value; 16 * 16], label)
            })
            .collect();
        ImageDataset::new(samples, vec!["dark".into(), "bright".into()], [16, 16], 1)
    }

    fn small_cnn() -> SimpleCnnConfig {
        SimpleCnnConfig::new(InputShape::new(16, 16, 1))
            .with_hidden(8)
            .with_num_classes(2)
    }

    #[test]
    fn training_state_from_config() {
        let state = TrainingState::from_config(&TrainingConfig::new(50));
        assert_eq!(state.total_epochs, 50);
        assert!(state.history.is_empty());
    }

    #[test]
    fn training_state_progress() {
        let mut state = TrainingState::new();
        state.total_epochs = 10;
        assert!(state.progress().abs() < 1e-6);
        state.epoch = 5;
        assert!((state.progress() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn training_state_next_epoch() {
        let mut state = TrainingState::new();
        state.total_epochs = 2;
        state.batch = 10;

        state.next_epoch();
        assert_eq!(state.epoch, 1);
        assert_eq!(state.batch, 0);
        assert!(!state.is_finished());

        state.next_epoch();
        assert!(state.is_finished());
    }

    #[test]
    fn training_state_record_val_loss() {
        let mut state = TrainingState::new();
        assert!(state.record_val_loss(0.5));
        assert!(state.record_val_loss(0.3));
        assert_eq!(state.epochs_without_improvement, 0);

        assert!(!state.record_val_loss(0.4));
        assert!(!state.record_val_loss(0.3));
        assert_eq!(state.epochs_without_improvement, 2);
        assert_eq!(state.best_val_loss, Some(0.3));
    }

    #[test]
    fn training_state_early_stop() {
        let mut state = TrainingState::new();
        state.epochs_without_improvement = 5;
        assert!(!state.should_early_stop(10));
        assert!(state.should_early_stop(5));
        assert!(!state.should_early_stop(0));

        state.early_stop("no improvement");
        assert!(state.is_finished());
        assert!(state.history.early_stopped);
    }

    #[test]
    fn trainer_schedule_helpers() {
        let config = TrainingConfig::new(10)
            .with_batch_size(32)
            .with_lr_schedule(LearningRateSchedule::step(0.5, 2));
        let trainer = Trainer::new(config);

        assert!((trainer.compute_lr(0) - 1e-3).abs() < 1e-9);
        assert!((trainer.compute_lr(2) - 5e-4).abs() < 1e-9);
        assert!(trainer.should_validate(0));
        assert_eq!(trainer.num_batches(100), 4);
        assert_eq!(trainer.num_batches(0), 0);
    }

    #[test]
    fn trainer_batch_order() {
        let shuffled = Trainer::new(TrainingConfig::new(1).with_seed(3));
        assert_eq!(shuffled.batch_order(2), BatchOrder::Seeded(5));

        let random = Trainer::new(TrainingConfig::new(1));
        assert_eq!(random.batch_order(0), BatchOrder::Random);

        let sequential = Trainer::new(TrainingConfig::new(1).without_shuffle());
        assert_eq!(sequential.batch_order(0), BatchOrder::Sequential);
    }

    #[test]
    fn evaluate_reports_loss_and_accuracy() {
        let device = Default::default();
        let model = small_cnn().init::<TestBackend>(&device).unwrap();
        let trainer = Trainer::new(TrainingConfig::new(1).with_batch_size(3));

        let eval = trainer.evaluate(&model, &dataset(7), &device).unwrap();
        assert_eq!(eval.samples, 7);
        assert!(eval.loss.is_finite() && eval.loss > 0.0);
        assert!((0.0..=1.0).contains(&eval.accuracy));
    }

    #[test]
    fn evaluate_rejects_empty_and_mismatched_datasets() {
        let device = Default::default();
        let model = small_cnn().init::<TestBackend>(&device).unwrap();
        let trainer = Trainer::default();

        let empty = dataset(0);
        assert!(matches!(
            trainer.evaluate(&model, &empty, &device),
            Err(TrainingError::Empty(_))
        ));

        let mut three_classes = dataset(4);
        three_classes.class_names.push("extra".into());
        assert!(matches!(
            trainer.evaluate(&model, &three_classes, &device),
            Err(TrainingError::InvalidConfig(_))
        ));
    }

    #[test]
    fn fit_records_history() {
        let device = Default::default();
        let model = small_cnn().init::<TestAutodiffBackend>(&device).unwrap();
        let config = TrainingConfig::new(2).with_batch_size(4).with_seed(1);

        let (_model, history) = Trainer::new(config)
            .fit(model, &dataset(12), &dataset(4), &device)
            .unwrap();

        assert_eq!(history.epochs_completed(), 2);
        assert!(history.loss().iter().all(|l| l.is_finite()));
        assert!(history.val_loss().iter().all(Option::is_some));
        assert!(history.best_epoch.is_some());
        assert_eq!(history.epoch_metrics[0].train_samples, 12);
    }

    #[test]
    fn fit_with_each_optimizer() {
        let device = Default::default();
        for optimizer in [
            OptimizerConfig::sgd(1e-2),
            OptimizerConfig::sgd_momentum(1e-2, 0.9).with_weight_decay(1e-4),
            OptimizerConfig::adam_w(1e-3, 1e-2),
        ] {
            let model = small_cnn().init::<TestAutodiffBackend>(&device).unwrap();
            let config = TrainingConfig::new(1)
                .with_batch_size(4)
                .with_optimizer(optimizer)
                .with_seed(2);
            let (_model, history) = Trainer::new(config)
                .fit(model, &dataset(8), &dataset(0), &device)
                .unwrap();

            assert_eq!(history.epochs_completed(), 1);
            assert_eq!(history.val_loss(), vec![None]);
        }
    }

    #[test]
    fn fit_rejects_bad_input() {
        let device = Default::default();
        let trainer = Trainer::new(TrainingConfig::new(1));

        let model = small_cnn().init::<TestAutodiffBackend>(&device).unwrap();
        assert!(matches!(
            trainer.fit(model, &dataset(0), &dataset(0), &device),
            Err(TrainingError::Empty(_))
        ));

        let model = small_cnn().init::<TestAutodiffBackend>(&device).unwrap();
        let invalid = Trainer::new(TrainingConfig::new(0));
        assert!(matches!(
            invalid.fit(model, &dataset(4), &dataset(0), &device),
            Err(TrainingError::InvalidConfig(_))
        ));
    }

    #[test]
    fn fit_stops_early_when_val_loss_stalls() {
        let device = Default::default();
        let model = small_cnn().init::<TestAutodiffBackend>(&device).unwrap();
        // Updates this small vanish below f32 precision, so val loss never improves.
        let config = TrainingConfig::new(5)
            .with_batch_size(4)
            .with_optimizer(OptimizerConfig::sgd(1e-12))
            .with_early_stopping(1)
            .with_seed(4);

        let (_model, history) = Trainer::new(config)
            .fit(model, &dataset(8), &dataset(4), &device)
            .unwrap();

        assert!(history.early_stopped);
        assert!(history.stop_reason.is_some());
        assert_eq!(history.epochs_completed(), 2);
        assert_eq!(history.best_epoch, Some(0));
    }

    #[test]
    fn fit_aborts_on_exploding_learning_rate() {
        let device = Default::default();
        let model = small_cnn().init::<TestAutodiffBackend>(&device).unwrap();
        let config = TrainingConfig::new(10)
            .with_batch_size(2)
            .with_optimizer(OptimizerConfig::sgd(1e38))
            .with_seed(6);

        let result = Trainer::new(config).fit(model, &dataset(16), &dataset(0), &device);
        assert!(matches!(result, Err(TrainingError::NumericalInstability(_))));
    }

    #[test]
    fn fit_aborts_on_non_finite_loss() {
        let device = Default::default();
        let model = small_cnn().init::<TestAutodiffBackend>(&device).unwrap();
        let mut train = dataset(4);
        train.samples[0].pixels[0] = f32::NAN;

        let config = TrainingConfig::new(3).with_batch_size(4);
        let result = Trainer::new(config).fit(model, &train, &dataset(0), &device);
        let Err(TrainingError::NumericalInstability(reason)) = result else {
            panic!("expected a numerical instability error");
        };
        assert!(reason.contains("epoch 0"));
    }

    #[test]
    fn training_state_serialization() {
        let state = TrainingState::new();
        let json = serde_json::to_string(&state).unwrap();
        let parsed: TrainingState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
    }
}
