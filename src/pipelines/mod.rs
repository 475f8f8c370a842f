//! # Training and evaluation pipelines
//!
//! End-to-end blocks built on top of the `data` and `seq2seq` modules:
//! - `common::TranslationModel`: a model with the variable store owning its weights
//! - `training::Seq2SeqTrainer`: teacher-forced training loop with periodic validation
//! - `early_stopping::EarlyStopper`: sliding-window stopping criterion on validation losses
//! - `evaluation::Seq2SeqEvaluator`: greedy decoding of a test corpus
//! - `translation_task::TranslationTask`: configuration-driven `train` and `eval` runs, writing
//!   the checkpoint, dictionaries, loss curves and predictions in a model directory

pub mod common;
pub mod early_stopping;
pub mod evaluation;
pub mod training;
pub mod translation_task;
