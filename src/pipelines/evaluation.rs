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

//! # Greedy decoding of a test corpus
//!
//! The evaluator walks the test corpus in `ceil(N / batch_size)` batches. The last batch wraps
//! around to the start of the corpus, the extra predictions are dropped so that exactly one
//! prediction is produced per test sentence.

use crate::common::error::NmtError;
use crate::data::{batches_per_pass, ParallelCorpus, SequenceFramer, SpecialTokenIds, Vocabulary};
use crate::pipelines::common::TranslationModel;
use crate::seq2seq::sequence_cross_entropy;
use log::{debug, info};
use std::convert::TryFrom;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tch::{Device, Tensor};

#[derive(Debug, Clone)]
/// # Detokenized sources and predictions of a test corpus
pub struct EvaluationReport {
    /// Source sentences as fed to the model (truncated, never reversed)
    pub input_sentences: Vec<String>,
    pub predicted_sentences: Vec<String>,
    /// Mean loss of the greedy logits against the labels over all test batches
    pub mean_loss: f64,
}

impl EvaluationReport {
    /// Writes one sentence per line to each file.
    pub fn save<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_path: P,
        predict_path: Q,
    ) -> Result<(), NmtError> {
        write_lines(input_path.as_ref(), &self.input_sentences)?;
        write_lines(predict_path.as_ref(), &self.predicted_sentences)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.predicted_sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicted_sentences.is_empty()
    }
}

fn write_lines(path: &Path, lines: &[String]) -> Result<(), NmtError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for line in lines {
        writeln!(writer, "{}", line)?;
    }
    writer.flush()?;
    Ok(())
}

/// Splits time-major predictions (*max time*, *batch size*) into one identifier row per example.
fn prediction_rows(predictions: &Tensor) -> Result<Vec<Vec<i64>>, NmtError> {
    let max_time = predictions.size()[0] as usize;
    let flat = Vec::<i64>::try_from(
        predictions
            .transpose(0, 1)
            .contiguous()
            .view([-1])
            .to_device(Device::Cpu),
    )?;
    Ok(flat
        .chunks(max_time.max(1))
        .map(|row| row.to_vec())
        .collect())
}

/// # Greedy evaluator
pub struct Seq2SeqEvaluator<'a> {
    translation_model: &'a TranslationModel,
    framer: SequenceFramer,
    batch_size: usize,
    ignore_index: Option<i64>,
}

impl<'a> Seq2SeqEvaluator<'a> {
    pub fn new(
        translation_model: &'a TranslationModel,
        max_time: usize,
        batch_size: usize,
        reverse_source: bool,
        special_token_ids: SpecialTokenIds,
    ) -> Seq2SeqEvaluator<'a> {
        Seq2SeqEvaluator {
            translation_model,
            framer: SequenceFramer::new(max_time, reverse_source, special_token_ids),
            batch_size,
            ignore_index: None,
        }
    }

    /// Excludes PAD labels from the reported loss.
    pub fn ignore_padding_in_loss(mut self, ignore: bool) -> Self {
        self.ignore_index = if ignore {
            Some(self.framer.special_token_ids().pad)
        } else {
            None
        };
        self
    }

    /// Decodes every test sentence and detokenizes sources and predictions.
    pub fn evaluate(
        &self,
        test_corpus: &ParallelCorpus,
        source_vocabulary: &Vocabulary,
        target_vocabulary: &Vocabulary,
    ) -> Result<EvaluationReport, NmtError> {
        if test_corpus.is_empty() {
            return Err(NmtError::ValueError("test corpus is empty".into()));
        }
        if self.batch_size == 0 {
            return Err(NmtError::ValueError("batch size must be positive".into()));
        }
        let batch_count = batches_per_pass(test_corpus.len(), self.batch_size);
        let bos = self.framer.special_token_ids().bos;
        let max_time = self.framer.max_time();
        let device = self.translation_model.device();
        info!(
            "evaluating {} test sentences in {} batches",
            test_corpus.len(),
            batch_count
        );

        let mut offset = 0;
        let mut losses = Vec::with_capacity(batch_count);
        let mut predicted_ids: Vec<Vec<i64>> = Vec::with_capacity(batch_count * self.batch_size);
        for batch_index in 0..batch_count {
            let minibatch = test_corpus.minibatch(self.batch_size, offset)?;
            offset = minibatch.next_offset;
            let batch = self
                .framer
                .frame(&minibatch.source, &minibatch.target, device)?;

            let (loss, predictions) = tch::no_grad(|| {
                let output = self.translation_model.model().greedy_decode(
                    &batch.encoder_inputs,
                    bos,
                    max_time as i64,
                );
                let loss = sequence_cross_entropy(
                    &output.logits,
                    &batch.decoder_labels,
                    self.ignore_index,
                );
                (loss.double_value(&[]), output.predictions)
            });
            debug!("test batch {}/{}: loss {:.6}", batch_index + 1, batch_count, loss);
            losses.push(loss);
            predicted_ids.extend(prediction_rows(&predictions)?);
        }
        predicted_ids.truncate(test_corpus.len());

        let input_sentences = test_corpus
            .source()
            .iter()
            .map(|sentence| {
                source_vocabulary.decode_to_string(&sentence[..sentence.len().min(max_time)])
            })
            .collect();
        let predicted_sentences = predicted_ids
            .iter()
            .map(|ids| target_vocabulary.decode_to_string(ids))
            .collect();
        let mean_loss = losses.iter().sum::<f64>() / losses.len() as f64;
        info!("test loss: {}", mean_loss);

        Ok(EvaluationReport {
            input_sentences,
            predicted_sentences,
            mean_loss,
        })
    }
}
