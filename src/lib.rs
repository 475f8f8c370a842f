//! Attentional sequence-to-sequence neural machine translation in Rust, built on
//! [tch-rs](https://github.com/LaurentMazare/tch-rs) (libtorch bindings).
//!
//! The crate trains and evaluates word-level translation models made of a stacked, optionally
//! bi-directional LSTM encoder and an attentional LSTM decoder (additive or multiplicative
//! attention). It covers the whole workflow:
//! - building vocabularies from whitespace-tokenized corpora and persisting them as JSON
//! - batching, padding and framing parallel sentences into time-major tensors
//! - teacher-forced training with Adam, periodic validation and early stopping
//! - greedy decoding of a test corpus
//!
//! The `nmt` binary drives a full run from a JSON configuration file:
//!
//! ```bash
//! NMT_ROOT=/path/to/models nmt --mode train --config configs/nmt.json
//! NMT_ROOT=/path/to/models nmt --mode eval --config configs/nmt.json
//! ```
//!
//! # Library usage
//!
//! ```no_run
//! use rust_nmt::pipelines::translation_task::{Mode, ModelArtifacts, TaskConfig, TranslationTask};
//! use rust_nmt::Config;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = TaskConfig::from_file("configs/nmt.json")?;
//! let artifacts = ModelArtifacts::new("/tmp/nmt/model");
//! let task = TranslationTask::new(config, artifacts, false);
//! let stdin = std::io::stdin();
//! task.run(Mode::Train, &mut stdin.lock(), &mut std::io::stdout())?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//! - `data`: corpus reading, vocabulary, batching and framing
//! - `seq2seq`: encoder, attention, decoder and the composed model
//! - `pipelines`: training loop, evaluation, early stopping and the translation task
//! - `common`: configuration, device selection and error types

pub mod common;
pub mod data;
pub mod pipelines;
pub mod seq2seq;

pub use common::error::NmtError;
pub use common::{Config, DeviceOption};
