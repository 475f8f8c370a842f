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

use crate::common::error::NmtError;
use crate::data::vocab::SpecialTokenIds;
use tch::{Device, Tensor};

#[derive(Debug, Clone, PartialEq)]
/// # Padded identifiers of a batch, one row per example
pub struct FramedSequences {
    /// Source identifiers, truncated, optionally reversed, PAD-filled (batch, max_time)
    pub encoder_inputs: Vec<Vec<i64>>,
    /// BOS followed by the target identifiers (batch, max_time)
    pub decoder_inputs: Vec<Vec<i64>>,
    /// Target identifiers followed by EOS (batch, max_time)
    pub decoder_labels: Vec<Vec<i64>>,
}

#[derive(Debug)]
/// # Time-major model inputs for a batch
/// All tensors are `Int64` of shape (*max_time*, *batch size*), column `b` holding example `b`.
pub struct Seq2SeqBatch {
    pub encoder_inputs: Tensor,
    pub decoder_inputs: Tensor,
    pub decoder_labels: Tensor,
}

impl Seq2SeqBatch {
    pub fn batch_size(&self) -> i64 {
        self.encoder_inputs.size()[1]
    }

    pub fn max_time(&self) -> i64 {
        self.encoder_inputs.size()[0]
    }
}

/// # Sequence framer
/// Pads and truncates parallel batches to a fixed number of time steps and derives the decoder
/// inputs (shifted right, BOS first) and labels (EOS last) from the target sentences.
#[derive(Debug, Clone)]
pub struct SequenceFramer {
    max_time: usize,
    reverse_source: bool,
    special_token_ids: SpecialTokenIds,
}

impl SequenceFramer {
    pub fn new(
        max_time: usize,
        reverse_source: bool,
        special_token_ids: SpecialTokenIds,
    ) -> SequenceFramer {
        SequenceFramer {
            max_time,
            reverse_source,
            special_token_ids,
        }
    }

    pub fn max_time(&self) -> usize {
        self.max_time
    }

    pub fn special_token_ids(&self) -> SpecialTokenIds {
        self.special_token_ids
    }

    fn pad(&self, mut sequence: Vec<i64>) -> Vec<i64> {
        sequence.truncate(self.max_time);
        sequence.resize(self.max_time, self.special_token_ids.pad);
        sequence
    }

    /// Frames a batch as plain identifier rows. Source tokens beyond `max_time` are dropped before
    /// reversal, so a reversed source always starts with its last kept token.
    pub fn frame_ids<S, T>(&self, source: &[S], target: &[T]) -> Result<FramedSequences, NmtError>
    where
        S: AsRef<[i64]>,
        T: AsRef<[i64]>,
    {
        if self.max_time == 0 {
            return Err(NmtError::ValueError("max_time must be positive".into()));
        }
        if source.len() != target.len() {
            return Err(NmtError::ValueError(format!(
                "source batch has {} sentences, target batch has {}",
                source.len(),
                target.len()
            )));
        }

        let encoder_inputs = source
            .iter()
            .map(|sentence| {
                let sentence = sentence.as_ref();
                let mut kept = sentence[..sentence.len().min(self.max_time)].to_vec();
                if self.reverse_source {
                    kept.reverse();
                }
                self.pad(kept)
            })
            .collect();

        let decoder_inputs = target
            .iter()
            .map(|sentence| {
                let mut shifted = Vec::with_capacity(sentence.as_ref().len() + 1);
                shifted.push(self.special_token_ids.bos);
                shifted.extend_from_slice(sentence.as_ref());
                self.pad(shifted)
            })
            .collect();

        let decoder_labels = target
            .iter()
            .map(|sentence| {
                let mut labels = sentence.as_ref().to_vec();
                labels.push(self.special_token_ids.eos);
                self.pad(labels)
            })
            .collect();

        Ok(FramedSequences {
            encoder_inputs,
            decoder_inputs,
            decoder_labels,
        })
    }

    /// Frames a batch into time-major tensors placed on `device`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use rust_nmt::data::{SequenceFramer, SpecialTokenIds};
    /// use tch::Device;
    ///
    /// let framer = SequenceFramer::new(5, true, SpecialTokenIds::default());
    /// let source = vec![vec![4, 5, 6], vec![7]];
    /// let target = vec![vec![8, 9], vec![10, 11, 12]];
    /// let batch = framer.frame(&source, &target, Device::Cpu)?;
    /// assert_eq!(batch.encoder_inputs.size(), vec![5, 2]);
    /// # Ok::<(), rust_nmt::NmtError>(())
    /// ```
    pub fn frame<S, T>(
        &self,
        source: &[S],
        target: &[T],
        device: Device,
    ) -> Result<Seq2SeqBatch, NmtError>
    where
        S: AsRef<[i64]>,
        T: AsRef<[i64]>,
    {
        let framed = self.frame_ids(source, target)?;
        let batch_size = source.len() as i64;
        let max_time = self.max_time as i64;
        let to_time_major = |rows: &[Vec<i64>]| {
            let flat: Vec<i64> = rows.iter().flatten().copied().collect();
            Tensor::from_slice(&flat)
                .view([batch_size, max_time])
                .transpose(0, 1)
                .contiguous()
                .to(device)
        };

        Ok(Seq2SeqBatch {
            encoder_inputs: to_time_major(&framed.encoder_inputs),
            decoder_inputs: to_time_major(&framed.decoder_inputs),
            decoder_labels: to_time_major(&framed.decoder_labels),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reversal_happens_after_truncation() {
        let framer = SequenceFramer::new(3, true, SpecialTokenIds::default());
        let framed = framer.frame_ids(&[vec![4i64, 5, 6, 7]], &[vec![8i64]]).unwrap();
        assert_eq!(framed.encoder_inputs, vec![vec![6, 5, 4]]);
    }

    #[test]
    fn short_target_is_padded() {
        let framer = SequenceFramer::new(4, false, SpecialTokenIds::default());
        let framed = framer.frame_ids(&[vec![4i64]], &[vec![9i64]]).unwrap();
        assert_eq!(framed.encoder_inputs, vec![vec![4, 0, 0, 0]]);
        assert_eq!(framed.decoder_inputs, vec![vec![1, 9, 0, 0]]);
        assert_eq!(framed.decoder_labels, vec![vec![9, 2, 0, 0]]);
    }
}
