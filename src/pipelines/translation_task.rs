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

//! # Translation task
//!
//! Ties the data, model, training and evaluation blocks into the two run modes of the `nmt`
//! binary:
//! - `train`: builds the vocabularies from the training corpora, trains a fresh model, saves the
//!   checkpoint, the dictionaries and the loss curves, then evaluates on the test corpus
//! - `eval`: restores the checkpoint and dictionaries of a previous run and evaluates on the
//!   test corpus
//!
//! All artifacts live in the model directory `$NMT_ROOT/<option.output>`.
//!
//! ```no_run
//! use rust_nmt::pipelines::translation_task::{Mode, ModelArtifacts, TaskConfig, TranslationTask};
//! use rust_nmt::Config;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = TaskConfig::from_file("configs/nmt.json")?;
//! let artifacts = ModelArtifacts::from_environment(&config.option.output)?;
//! let task = TranslationTask::new(config, artifacts, false);
//!
//! let stdin = std::io::stdin();
//! let outcome = task.run(Mode::Train, &mut stdin.lock(), &mut std::io::stdout())?;
//! # Ok(())
//! # }
//! ```

use crate::common::error::NmtError;
use crate::common::{Config, DeviceOption};
use crate::data::{read_words, ParallelCorpus, SpecialTokenIds, Vocabulary};
use crate::pipelines::common::TranslationModel;
use crate::pipelines::evaluation::{EvaluationReport, Seq2SeqEvaluator};
use crate::pipelines::training::{Seq2SeqTrainer, TrainingReport, TrainingStatus};
use crate::seq2seq::{AttentionKind, Seq2SeqConfig};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable locating the root of all model directories
pub const NMT_ROOT_VARIABLE: &str = "NMT_ROOT";

/// Number of training pairs kept in debug runs
pub const DEBUG_TRAINING_SIZE: usize = 1000;

fn default_output() -> String {
    "model/buf".to_string()
}

fn default_true() -> bool {
    true
}

fn default_attention_layer_size() -> i64 {
    256
}

fn default_learning_rate() -> f64 {
    1e-3
}

fn default_early_stopping_window() -> usize {
    5
}

fn default_early_stopping_threshold() -> f64 {
    0.1
}

#[derive(Debug, Serialize, Deserialize, Clone)]
/// # `option` section of the task configuration
/// Training hyper-parameters and model architecture.
pub struct TrainingOptions {
    /// Number of passes over the training corpus
    pub train_step: usize,
    pub max_time: usize,
    pub batch_size: usize,
    pub vocabulary_size: usize,
    pub embedding_size: i64,
    pub hidden_units: i64,
    pub layers: i64,
    /// Model directory, relative to `$NMT_ROOT`
    #[serde(default = "default_output")]
    pub output: String,
    #[serde(default = "default_true")]
    pub bidirectional: bool,
    #[serde(default)]
    pub attention: AttentionKind,
    #[serde(default = "default_attention_layer_size")]
    pub attention_layer_size: i64,
    #[serde(default)]
    pub dropout: f64,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default)]
    pub max_gradient_norm: Option<f64>,
    #[serde(default = "default_true")]
    pub reverse_source: bool,
    #[serde(default)]
    pub ignore_padding_in_loss: bool,
    #[serde(default = "default_true")]
    pub bridge_encoder_state: bool,
    #[serde(default = "default_early_stopping_window")]
    pub early_stopping_window: usize,
    #[serde(default = "default_early_stopping_threshold")]
    pub early_stopping_threshold: f64,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub device: DeviceOption,
}

impl TrainingOptions {
    /// Model architecture described by these options. Source and target vocabularies share the
    /// configured size.
    pub fn model_config(&self) -> Seq2SeqConfig {
        Seq2SeqConfig {
            source_vocab_size: self.vocabulary_size as i64,
            target_vocab_size: self.vocabulary_size as i64,
            embedding_size: self.embedding_size,
            hidden_units: self.hidden_units,
            layers: self.layers,
            bidirectional: self.bidirectional,
            attention: self.attention,
            attention_layer_size: self.attention_layer_size,
            dropout: self.dropout,
            bridge_encoder_state: self.bridge_encoder_state,
        }
    }

    pub fn validate(&self) -> Result<(), NmtError> {
        let positive = [
            ("train_step", self.train_step as i64),
            ("max_time", self.max_time as i64),
            ("batch_size", self.batch_size as i64),
            ("vocabulary_size", self.vocabulary_size as i64),
            ("embedding_size", self.embedding_size),
            ("hidden_units", self.hidden_units),
            ("layers", self.layers),
            ("attention_layer_size", self.attention_layer_size),
        ];
        for (name, value) in positive.iter() {
            if *value <= 0 {
                return Err(NmtError::InvalidConfigurationError(format!(
                    "option.{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(NmtError::InvalidConfigurationError(format!(
                "option.dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if self.learning_rate <= 0.0 {
            return Err(NmtError::InvalidConfigurationError(format!(
                "option.learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.early_stopping_window < 2 {
            return Err(NmtError::InvalidConfigurationError(format!(
                "option.early_stopping_window must be at least 2, got {}",
                self.early_stopping_window
            )));
        }
        if let Some(max_gradient_norm) = self.max_gradient_norm {
            if max_gradient_norm <= 0.0 {
                return Err(NmtError::InvalidConfigurationError(format!(
                    "option.max_gradient_norm must be positive, got {}",
                    max_gradient_norm
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
/// # `data` section of the task configuration
/// Paths to the whitespace-tokenized corpora, one sentence per line.
pub struct DataPaths {
    pub source_train_data: PathBuf,
    pub target_train_data: PathBuf,
    pub source_valid_data: PathBuf,
    pub target_valid_data: PathBuf,
    pub source_test_data: PathBuf,
    pub target_test_data: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
/// # Task configuration
/// JSON document with an `option`, a `data` and a `const` section.
///
/// ```json
/// {
///   "option": {"train_step": 10, "max_time": 20, "batch_size": 32, "vocabulary_size": 8000,
///              "embedding_size": 128, "hidden_units": 256, "layers": 2, "output": "model/en-fr"},
///   "data": {"source_train_data": "data/train.en", "target_train_data": "data/train.fr",
///            "source_valid_data": "data/valid.en", "target_valid_data": "data/valid.fr",
///            "source_test_data": "data/test.en", "target_test_data": "data/test.fr"},
///   "const": {"PAD": 0, "BOS": 1, "EOS": 2}
/// }
/// ```
pub struct TaskConfig {
    pub option: TrainingOptions,
    pub data: DataPaths,
    #[serde(rename = "const")]
    pub special_tokens: SpecialTokenIds,
}

impl Config for TaskConfig {}

impl TaskConfig {
    pub fn validate(&self) -> Result<(), NmtError> {
        self.option.validate()?;
        self.special_tokens.validate(self.option.vocabulary_size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// # Run mode of the translation task
pub enum Mode {
    Train,
    Eval,
}

impl FromStr for Mode {
    type Err = NmtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Mode::Train),
            "eval" => Ok(Mode::Eval),
            other => Err(NmtError::InvalidModeError(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Train => write!(f, "train"),
            Mode::Eval => write!(f, "eval"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// # Paths of the files written in a model directory
pub struct ModelArtifacts {
    directory: PathBuf,
}

impl ModelArtifacts {
    pub fn new<P: Into<PathBuf>>(directory: P) -> ModelArtifacts {
        ModelArtifacts {
            directory: directory.into(),
        }
    }

    /// Resolves `output` against the `NMT_ROOT` environment variable.
    pub fn from_environment<P: AsRef<Path>>(output: P) -> Result<ModelArtifacts, NmtError> {
        let root = std::env::var_os(NMT_ROOT_VARIABLE)
            .ok_or_else(|| NmtError::MissingEnvironmentVariable(NMT_ROOT_VARIABLE.to_string()))?;
        Ok(ModelArtifacts::new(PathBuf::from(root).join(output)))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn model_path(&self) -> PathBuf {
        self.directory.join("model.ot")
    }

    pub fn source_dictionary_path(&self) -> PathBuf {
        self.directory.join("source_dictionary.json")
    }

    pub fn source_reverse_dictionary_path(&self) -> PathBuf {
        self.directory.join("source_reverse_dictionary.json")
    }

    pub fn target_dictionary_path(&self) -> PathBuf {
        self.directory.join("target_dictionary.json")
    }

    pub fn target_reverse_dictionary_path(&self) -> PathBuf {
        self.directory.join("target_reverse_dictionary.json")
    }

    pub fn global_loss_path(&self) -> PathBuf {
        self.directory.join("model_global_loss.csv")
    }

    pub fn batch_loss_path(&self) -> PathBuf {
        self.directory.join("model_batch_loss.csv")
    }

    pub fn evaluate_input_path(&self) -> PathBuf {
        self.directory.join("model.evaluate_input")
    }

    pub fn evaluate_predict_path(&self) -> PathBuf {
        self.directory.join("model.evaluate_predict")
    }

    pub fn log_path(&self) -> PathBuf {
        self.directory.join("log")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// # Outcome of the model directory preparation
pub enum DirectoryDecision {
    /// The directory did not exist and was created
    Created,
    /// The directory existed, the user agreed to replace it
    Overwritten,
    /// The directory existed, the user refused to replace it
    Declined,
}

/// Creates the model directory. An existing directory is only replaced after the user answers
/// `yes` on `input`; `no` or the end of the input declines. Any other answer asks again.
pub fn prepare_model_directory<R, W>(
    directory: &Path,
    input: &mut R,
    output: &mut W,
) -> Result<DirectoryDecision, NmtError>
where
    R: BufRead,
    W: Write,
{
    let decision = if directory.exists() {
        writeln!(output, "Warning: model {} exists.", directory.display())?;
        writeln!(output, "Old model will be overwritten.")?;
        loop {
            writeln!(output, "Do you want to continue? [yes|no]")?;
            write!(output, "> ")?;
            output.flush()?;
            let mut answer = String::new();
            if input.read_line(&mut answer)? == 0 {
                break DirectoryDecision::Declined;
            }
            match answer.trim() {
                "yes" => {
                    fs::remove_dir_all(directory)?;
                    break DirectoryDecision::Overwritten;
                }
                "no" => break DirectoryDecision::Declined,
                _ => writeln!(output, "You can only input \"yes\" or \"no\".")?,
            }
        }
    } else {
        DirectoryDecision::Created
    };
    if decision != DirectoryDecision::Declined {
        info!("Make new model: {}", directory.display());
        fs::create_dir_all(directory)?;
    }
    Ok(decision)
}

#[derive(Debug)]
/// # Result of a task run
pub enum TaskOutcome {
    /// The user refused to overwrite the model directory, nothing was done
    Declined,
    Trained {
        training: TrainingReport,
        evaluation: EvaluationReport,
    },
    Evaluated(EvaluationReport),
}

/// # Source and target vocabularies of a run
pub struct Vocabularies {
    pub source: Vocabulary,
    pub target: Vocabulary,
}

impl Vocabularies {
    fn save(&self, artifacts: &ModelArtifacts) -> Result<(), NmtError> {
        self.source.save(
            artifacts.source_dictionary_path(),
            artifacts.source_reverse_dictionary_path(),
        )?;
        self.target.save(
            artifacts.target_dictionary_path(),
            artifacts.target_reverse_dictionary_path(),
        )
    }

    fn load(
        artifacts: &ModelArtifacts,
        special_token_ids: SpecialTokenIds,
    ) -> Result<Vocabularies, NmtError> {
        Ok(Vocabularies {
            source: Vocabulary::load(
                artifacts.source_dictionary_path(),
                artifacts.source_reverse_dictionary_path(),
                special_token_ids,
            )?,
            target: Vocabulary::load(
                artifacts.target_dictionary_path(),
                artifacts.target_reverse_dictionary_path(),
                special_token_ids,
            )?,
        })
    }
}

/// # Translation task
/// Runs training or evaluation as described by a `TaskConfig`, writing every artifact through
/// a `ModelArtifacts`.
pub struct TranslationTask {
    config: TaskConfig,
    artifacts: ModelArtifacts,
    debug: bool,
    show_progress: bool,
}

impl TranslationTask {
    pub fn new(config: TaskConfig, artifacts: ModelArtifacts, debug: bool) -> TranslationTask {
        TranslationTask {
            config,
            artifacts,
            debug,
            show_progress: true,
        }
    }

    pub fn with_progress_bar(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn artifacts(&self) -> &ModelArtifacts {
        &self.artifacts
    }

    /// Runs the task in the given mode. `input` and `output` carry the overwrite confirmation
    /// dialogue of the train mode.
    pub fn run<R, W>(&self, mode: Mode, input: &mut R, output: &mut W) -> Result<TaskOutcome, NmtError>
    where
        R: BufRead,
        W: Write,
    {
        self.config.validate()?;
        if let Some(seed) = self.config.option.seed {
            tch::manual_seed(seed);
        }
        info!("running in {} mode", mode);
        match mode {
            Mode::Train => {
                let decision = prepare_model_directory(self.artifacts.directory(), input, output)?;
                if decision == DirectoryDecision::Declined {
                    info!("model directory left untouched");
                    return Ok(TaskOutcome::Declined);
                }
                let (translation_model, vocabularies, training) = self.train()?;
                let evaluation = self.evaluate_model(&translation_model, &vocabularies)?;
                Ok(TaskOutcome::Trained {
                    training,
                    evaluation,
                })
            }
            Mode::Eval => Ok(TaskOutcome::Evaluated(self.evaluate()?)),
        }
    }

    fn build_vocabularies(&self) -> Result<Vocabularies, NmtError> {
        let size = self.config.option.vocabulary_size;
        let special_token_ids = self.config.special_tokens;
        let source = Vocabulary::build(
            read_words(&self.config.data.source_train_data)?,
            size,
            special_token_ids,
        )?;
        let target = Vocabulary::build(
            read_words(&self.config.data.target_train_data)?,
            size,
            special_token_ids,
        )?;
        info!(
            "vocabularies built: {} source and {} target entries",
            source.len(),
            target.len()
        );
        Ok(Vocabularies { source, target })
    }

    /// Trains a fresh model and persists it with its vocabularies in the model directory.
    /// Expects the model directory to exist.
    pub fn train(&self) -> Result<(TranslationModel, Vocabularies, TrainingReport), NmtError> {
        let options = &self.config.option;
        let data = &self.config.data;
        let vocabularies = self.build_vocabularies()?;

        let mut train_corpus = ParallelCorpus::from_files(
            &data.source_train_data,
            &data.target_train_data,
            &vocabularies.source,
            &vocabularies.target,
        )?;
        if self.debug {
            train_corpus.truncate(DEBUG_TRAINING_SIZE);
        }
        let valid_corpus = ParallelCorpus::from_files(
            &data.source_valid_data,
            &data.target_valid_data,
            &vocabularies.source,
            &vocabularies.target,
        )?;

        let translation_model =
            TranslationModel::new(&options.model_config(), options.device.resolve());
        let report = {
            let mut trainer =
                Seq2SeqTrainer::new(&translation_model, options, self.config.special_tokens)?
                    .with_log_file(self.artifacts.log_path())?
                    .with_progress_bar(self.show_progress);
            trainer.train(&train_corpus, &valid_corpus)?
        };

        translation_model.save(self.artifacts.model_path())?;
        vocabularies.save(&self.artifacts)?;
        match report.status {
            TrainingStatus::Finished => {
                report.save_loss_curves(
                    self.artifacts.global_loss_path(),
                    self.artifacts.batch_loss_path(),
                )?;
            }
            TrainingStatus::EarlyStopped => {
                warn!("training stopped early, loss curves are not saved")
            }
            _ => {}
        }
        info!(
            "model saved in {} after {} steps",
            self.artifacts.directory().display(),
            report.global_step
        );
        Ok((translation_model, vocabularies, report))
    }

    /// Restores the model and vocabularies of the model directory and evaluates them.
    pub fn evaluate(&self) -> Result<EvaluationReport, NmtError> {
        let options = &self.config.option;
        let vocabularies = Vocabularies::load(&self.artifacts, self.config.special_tokens)?;
        let translation_model = TranslationModel::load(
            &options.model_config(),
            options.device.resolve(),
            self.artifacts.model_path(),
        )?;
        self.evaluate_model(&translation_model, &vocabularies)
    }

    fn evaluate_model(
        &self,
        translation_model: &TranslationModel,
        vocabularies: &Vocabularies,
    ) -> Result<EvaluationReport, NmtError> {
        let options = &self.config.option;
        let test_corpus = ParallelCorpus::from_files(
            &self.config.data.source_test_data,
            &self.config.data.target_test_data,
            &vocabularies.source,
            &vocabularies.target,
        )?;
        let evaluator = Seq2SeqEvaluator::new(
            translation_model,
            options.max_time,
            options.batch_size,
            options.reverse_source,
            self.config.special_tokens,
        )
        .ignore_padding_in_loss(options.ignore_padding_in_loss);
        let report = evaluator.evaluate(&test_corpus, &vocabularies.source, &vocabularies.target)?;
        report.save(
            self.artifacts.evaluate_input_path(),
            self.artifacts.evaluate_predict_path(),
        )?;
        Ok(report)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn mode_parsing() {
        assert_eq!("train".parse::<Mode>().unwrap(), Mode::Train);
        assert_eq!("eval".parse::<Mode>().unwrap(), Mode::Eval);
        assert!(matches!(
            "predict".parse::<Mode>(),
            Err(NmtError::InvalidModeError(_))
        ));
    }

    #[test]
    fn existing_directory_is_kept_on_refusal() {
        let root = tempfile::tempdir().unwrap();
        let mut input = Cursor::new("maybe\nno\n");
        let mut output = Vec::new();
        let decision = prepare_model_directory(root.path(), &mut input, &mut output).unwrap();
        assert_eq!(decision, DirectoryDecision::Declined);
        assert!(root.path().exists());
        let prompt = String::from_utf8(output).unwrap();
        assert!(prompt.contains("You can only input"));
    }
}
