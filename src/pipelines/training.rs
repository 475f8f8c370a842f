// Copyright 2021 Guillaume Becquin
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Teacher-forced training loop
//!
//! The trainer runs `train_step` passes over the training corpus. Each minibatch is framed,
//! unrolled through the decoder with ground-truth inputs, scored with the mean cross-entropy
//! against the labels and followed by an Adam step. Every `loss_freq` global steps a validation
//! batch is scored without gradients. At the end of each pass the validation losses of the pass
//! are averaged and handed to the early stopper.
//!
//! ```no_run
//! use rust_nmt::data::{ParallelCorpus, SpecialTokenIds};
//! use rust_nmt::pipelines::common::TranslationModel;
//! use rust_nmt::pipelines::training::Seq2SeqTrainer;
//! use rust_nmt::pipelines::translation_task::TaskConfig;
//! use rust_nmt::Config;
//!
//! # fn main() -> anyhow::Result<()> {
//! # let train_corpus = ParallelCorpus::new(vec![], vec![])?;
//! # let valid_corpus = ParallelCorpus::new(vec![], vec![])?;
//! let config = TaskConfig::from_file("config.json")?;
//! let model_config = config.option.model_config();
//! let translation_model = TranslationModel::new(&model_config, config.option.device.resolve());
//!
//! let mut trainer = Seq2SeqTrainer::new(&translation_model, &config.option, config.special_tokens)?;
//! let report = trainer.train(&train_corpus, &valid_corpus)?;
//! println!("{:?} after {} steps", report.status, report.global_step);
//! # Ok(())
//! # }
//! ```

use crate::common::error::NmtError;
use crate::data::{ParallelCorpus, Seq2SeqBatch, SequenceFramer, SpecialTokenIds};
use crate::pipelines::common::TranslationModel;
use crate::pipelines::early_stopping::EarlyStopper;
use crate::pipelines::translation_task::TrainingOptions;
use crate::seq2seq::sequence_cross_entropy;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tch::nn::{self, OptimizerConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// # Phase of a training run
pub enum TrainingStatus {
    Initializing,
    RunningEpoch,
    EvaluatingValidation,
    /// Terminal: the early stopper fired after at least half of the epochs
    EarlyStopped,
    /// Terminal: all epochs completed
    Finished,
}

impl TrainingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrainingStatus::EarlyStopped | TrainingStatus::Finished)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// # Next batch offset in each dataset
pub struct MinibatchOffsets {
    pub train: usize,
    pub valid: usize,
}

#[derive(Debug, Clone)]
/// # Mutable state of a training run
pub struct TrainingState {
    pub status: TrainingStatus,
    /// 0-based index of the current pass over the training data
    pub epoch: usize,
    pub global_step: usize,
    pub offsets: MinibatchOffsets,
    /// Validation loss recorded every `loss_freq` steps
    pub loss_log: Vec<f64>,
    /// Mean validation loss of each completed pass
    pub batch_loss_log: Vec<f64>,
    /// Validation losses of the pass in progress
    pub current_batch_losses: Vec<f64>,
}

impl TrainingState {
    pub fn new() -> TrainingState {
        TrainingState {
            status: TrainingStatus::Initializing,
            epoch: 0,
            global_step: 0,
            offsets: MinibatchOffsets::default(),
            loss_log: vec![],
            batch_loss_log: vec![],
            current_batch_losses: vec![],
        }
    }

    /// Closes the current pass and returns its mean validation loss, `None` if no validation
    /// batch was scored during the pass.
    fn close_pass(&mut self) -> Option<f64> {
        let losses = std::mem::take(&mut self.current_batch_losses);
        if losses.is_empty() {
            return None;
        }
        let batch_loss = losses.iter().sum::<f64>() / losses.len() as f64;
        self.batch_loss_log.push(batch_loss);
        Some(batch_loss)
    }
}

impl Default for TrainingState {
    fn default() -> Self {
        TrainingState::new()
    }
}

#[derive(Debug, Clone)]
/// # Summary of a completed training run
pub struct TrainingReport {
    /// `Finished` or `EarlyStopped`
    pub status: TrainingStatus,
    pub epochs: usize,
    pub global_step: usize,
    /// Interval in global steps between two entries of `loss_log`
    pub loss_freq: usize,
    pub loss_log: Vec<f64>,
    pub batch_loss_log: Vec<f64>,
}

impl TrainingReport {
    /// Writes the loss curves as CSV: validation loss against global step, and mean validation
    /// loss against epoch.
    pub fn save_loss_curves<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        global_loss_path: P,
        batch_loss_path: Q,
    ) -> Result<(), NmtError> {
        let mut writer = csv::Writer::from_path(global_loss_path)?;
        writer.write_record(&["step", "loss"])?;
        for (index, loss) in self.loss_log.iter().enumerate() {
            writer.serialize((index * self.loss_freq, loss))?;
        }
        writer.flush()?;

        let mut writer = csv::Writer::from_path(batch_loss_path)?;
        writer.write_record(&["epoch", "loss"])?;
        for (epoch, loss) in self.batch_loss_log.iter().enumerate() {
            writer.serialize((epoch, loss))?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn final_loss(&self) -> Option<f64> {
        self.loss_log.last().copied()
    }
}

/// Number of global steps between two validation evaluations. The step budget assumes one extra
/// batch per pass.
pub fn loss_frequency(train_step: usize, dataset_size: usize, batch_size: usize) -> (usize, usize) {
    let global_max_step = train_step * (dataset_size / batch_size.max(1) + 1);
    let loss_freq = if global_max_step > 100 {
        global_max_step / 100
    } else {
        1
    };
    (global_max_step, loss_freq)
}

/// # Sequence-to-sequence trainer
/// Owns the optimizer, the early stopper and the training bookkeeping for one run; borrows the
/// model whose variables it updates.
pub struct Seq2SeqTrainer<'a> {
    translation_model: &'a TranslationModel,
    optimizer: nn::Optimizer,
    framer: SequenceFramer,
    early_stopper: EarlyStopper,
    batch_size: usize,
    train_step: usize,
    ignore_index: Option<i64>,
    max_gradient_norm: Option<f64>,
    log_file: Option<File>,
    show_progress: bool,
}

impl<'a> Seq2SeqTrainer<'a> {
    pub fn new(
        translation_model: &'a TranslationModel,
        options: &TrainingOptions,
        special_token_ids: SpecialTokenIds,
    ) -> Result<Seq2SeqTrainer<'a>, NmtError> {
        let optimizer =
            nn::Adam::default().build(translation_model.var_store(), options.learning_rate)?;
        let framer = SequenceFramer::new(
            options.max_time,
            options.reverse_source,
            special_token_ids,
        );
        let ignore_index = if options.ignore_padding_in_loss {
            Some(special_token_ids.pad)
        } else {
            None
        };
        Ok(Seq2SeqTrainer {
            translation_model,
            optimizer,
            framer,
            early_stopper: EarlyStopper::new(
                options.early_stopping_window,
                options.early_stopping_threshold,
            ),
            batch_size: options.batch_size,
            train_step: options.train_step,
            ignore_index,
            max_gradient_norm: options.max_gradient_norm,
            log_file: None,
            show_progress: true,
        })
    }

    /// Appends the per-pass loss messages to `path`.
    pub fn with_log_file<P: Into<PathBuf>>(mut self, path: P) -> Result<Self, NmtError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.into())?;
        self.log_file = Some(file);
        Ok(self)
    }

    pub fn with_progress_bar(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    fn batch_loss(&self, batch: &Seq2SeqBatch, train: bool) -> tch::Tensor {
        let output = self.translation_model.model().forward_t(
            &batch.encoder_inputs,
            &batch.decoder_inputs,
            train,
        );
        sequence_cross_entropy(&output.logits, &batch.decoder_labels, self.ignore_index)
    }

    /// Forward pass, backward pass and optimizer step on one batch. Returns the training loss.
    pub fn train_batch(&mut self, batch: &Seq2SeqBatch) -> f64 {
        let loss = self.batch_loss(batch, true);
        match self.max_gradient_norm {
            Some(max_norm) => self.optimizer.backward_step_clip_norm(&loss, max_norm),
            None => self.optimizer.backward_step(&loss),
        }
        loss.double_value(&[])
    }

    /// Scores one batch without tracking gradients.
    pub fn evaluate_batch(&self, batch: &Seq2SeqBatch) -> f64 {
        tch::no_grad(|| self.batch_loss(batch, false).double_value(&[]))
    }

    fn validation_loss(
        &self,
        valid_corpus: &ParallelCorpus,
        offset: &mut usize,
    ) -> Result<f64, NmtError> {
        let minibatch = valid_corpus.minibatch(self.batch_size, *offset)?;
        *offset = minibatch.next_offset;
        let batch = self.framer.frame(
            &minibatch.source,
            &minibatch.target,
            self.translation_model.device(),
        )?;
        Ok(self.evaluate_batch(&batch))
    }

    fn write_log(&mut self, message: &str) -> Result<(), NmtError> {
        if let Some(file) = self.log_file.as_mut() {
            writeln!(file, "{}", message)?;
        }
        Ok(())
    }

    fn progress_bar(&self, global_max_step: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let progress_bar = ProgressBar::new(global_max_step as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        {
            progress_bar.set_style(style);
        }
        progress_bar
    }

    /// Runs the training loop until all passes are done or the early stopper fires.
    pub fn train(
        &mut self,
        train_corpus: &ParallelCorpus,
        valid_corpus: &ParallelCorpus,
    ) -> Result<TrainingReport, NmtError> {
        if train_corpus.is_empty() || valid_corpus.is_empty() {
            return Err(NmtError::ValueError(
                "training and validation corpora must not be empty".into(),
            ));
        }
        let (global_max_step, loss_freq) =
            loss_frequency(self.train_step, train_corpus.len(), self.batch_size);
        info!(
            "training on {} sentence pairs for {} passes (~{} steps, validation every {} steps)",
            train_corpus.len(),
            self.train_step,
            global_max_step,
            loss_freq
        );

        let mut state = TrainingState::new();
        self.early_stopper.reset();
        let progress_bar = self.progress_bar(global_max_step);
        let device = self.translation_model.device();

        for epoch in 0..self.train_step {
            state.epoch = epoch;
            state.status = TrainingStatus::RunningEpoch;
            loop {
                let minibatch = train_corpus.minibatch(self.batch_size, state.offsets.train)?;
                let batch = self
                    .framer
                    .frame(&minibatch.source, &minibatch.target, device)?;
                let train_loss = self.train_batch(&batch);
                state.offsets.train = minibatch.next_offset;

                if state.global_step % loss_freq == 0 {
                    state.status = TrainingStatus::EvaluatingValidation;
                    let valid_loss = self.validation_loss(valid_corpus, &mut state.offsets.valid)?;
                    debug!(
                        "step {}: train loss {:.6}, validation loss {:.6}",
                        state.global_step, train_loss, valid_loss
                    );
                    state.loss_log.push(valid_loss);
                    state.current_batch_losses.push(valid_loss);
                    progress_bar.set_message(format!("loss: {:.6}", valid_loss));
                    state.status = TrainingStatus::RunningEpoch;
                }
                state.global_step += 1;
                progress_bar.inc(1);

                if minibatch.completes_pass {
                    break;
                }
            }

            match state.close_pass() {
                Some(batch_loss) => {
                    let message = format!(
                        "Batch: {}/{}, batch loss: {}",
                        epoch + 1,
                        self.train_step,
                        batch_loss
                    );
                    progress_bar.println(&message);
                    info!("{}", message);
                    self.write_log(&message)?;
                    if self.early_stopper.update(batch_loss) && epoch > self.train_step / 2 {
                        info!("early stopping at step: {}", state.global_step);
                        state.status = TrainingStatus::EarlyStopped;
                        break;
                    }
                }
                None => warn!(
                    "no validation loss recorded during pass {}/{}",
                    epoch + 1,
                    self.train_step
                ),
            }
        }

        if !state.status.is_terminal() {
            state.status = TrainingStatus::Finished;
        }
        progress_bar.finish_and_clear();

        Ok(TrainingReport {
            status: state.status,
            epochs: state.epoch + 1,
            global_step: state.global_step,
            loss_freq,
            loss_log: state.loss_log,
            batch_loss_log: state.batch_loss_log,
        })
    }
}
