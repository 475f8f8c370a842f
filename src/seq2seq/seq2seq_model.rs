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

use crate::common::dropout::Dropout;
use crate::seq2seq::attention::{AttentionKind, AttentionMemory};
use crate::seq2seq::decoder::{DecoderState, Seq2SeqDecoder};
use crate::seq2seq::encoder::Seq2SeqEncoder;
use crate::Config;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use tch::kind::Kind::Int64;
use tch::nn::Init;
use tch::{nn, Reduction, Tensor};

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone)]
/// # Sequence-to-sequence model configuration
/// Defines the model architecture (embedding and hidden sizes, number of layers, attention
/// variant...). Built from the `option` section of the task configuration, or loaded from JSON.
pub struct Seq2SeqConfig {
    pub source_vocab_size: i64,
    pub target_vocab_size: i64,
    pub embedding_size: i64,
    pub hidden_units: i64,
    pub layers: i64,
    #[serde(default = "default_true")]
    pub bidirectional: bool,
    #[serde(default)]
    pub attention: AttentionKind,
    pub attention_layer_size: i64,
    #[serde(default)]
    pub dropout: f64,
    /// Starts the decoder from the encoder final state instead of zeros
    #[serde(default = "default_true")]
    pub bridge_encoder_state: bool,
}

impl Config for Seq2SeqConfig {}

impl Seq2SeqConfig {
    pub fn directions(&self) -> i64 {
        if self.bidirectional {
            2
        } else {
            1
        }
    }

    /// Hidden size of the decoder, equal to the encoder output size.
    pub fn decoder_hidden_size(&self) -> i64 {
        self.directions() * self.hidden_units
    }
}

/// # Output of a teacher-forced forward pass
pub struct Seq2SeqModelOutput {
    /// Logits for every decoder step (*target time*, *batch size*, *target vocabulary size*)
    pub logits: Tensor,
    /// Attention weights for every decoder step (*target time*, *batch size*, *source time*)
    pub attention_weights: Tensor,
}

/// # Output of greedy decoding
pub struct GreedyDecoderOutput {
    /// Argmax token at every step (*max time*, *batch size*)
    pub predictions: Tensor,
    /// Logits that produced the predictions (*max time*, *batch size*, *target vocabulary size*)
    pub logits: Tensor,
}

/// # Attentional sequence-to-sequence model
/// Source and target embeddings, a stacked (bi-directional) LSTM encoder and an attentional LSTM
/// decoder. All inputs are time-major identifier tensors of shape (*time*, *batch size*).
/// Recurrent state only lives for the duration of a call.
///
/// # Example
///
/// ```no_run
/// use rust_nmt::seq2seq::{AttentionKind, Seq2SeqConfig, Seq2SeqModel};
/// use tch::{nn, Device, Kind, Tensor};
///
/// let config = Seq2SeqConfig {
///     source_vocab_size: 20,
///     target_vocab_size: 20,
///     embedding_size: 8,
///     hidden_units: 16,
///     layers: 2,
///     bidirectional: true,
///     attention: AttentionKind::Luong,
///     attention_layer_size: 16,
///     dropout: 0.0,
///     bridge_encoder_state: true,
/// };
/// let vs = nn::VarStore::new(Device::Cpu);
/// let model = Seq2SeqModel::new(vs.root() / "seq2seq", &config);
///
/// let encoder_inputs = Tensor::randint(20, [5, 2], (Kind::Int64, Device::Cpu));
/// let decoder_inputs = Tensor::randint(20, [5, 2], (Kind::Int64, Device::Cpu));
/// let output = model.forward_t(&encoder_inputs, &decoder_inputs, false);
/// assert_eq!(output.logits.size(), vec![5, 2, 20]);
/// ```
#[derive(Debug)]
pub struct Seq2SeqModel {
    source_embeddings: nn::Embedding,
    target_embeddings: nn::Embedding,
    encoder: Seq2SeqEncoder,
    decoder: Seq2SeqDecoder,
    dropout: Dropout,
    bridge_encoder_state: bool,
}

impl Seq2SeqModel {
    /// Build a new `Seq2SeqModel`
    ///
    /// # Arguments
    ///
    /// * `p` - Variable store path for the root of the model
    /// * `config` - `Seq2SeqConfig` object defining the model architecture
    pub fn new<'p, P>(p: P, config: &Seq2SeqConfig) -> Seq2SeqModel
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        let embedding_config = nn::EmbeddingConfig {
            ws_init: Init::Uniform { lo: -1.0, up: 1.0 },
            ..Default::default()
        };
        let source_embeddings = nn::embedding(
            p / "source_embeddings",
            config.source_vocab_size,
            config.embedding_size,
            embedding_config,
        );
        let target_embeddings = nn::embedding(
            p / "target_embeddings",
            config.target_vocab_size,
            config.embedding_size,
            embedding_config,
        );
        let encoder = Seq2SeqEncoder::new(p / "encoder", config);
        let decoder = Seq2SeqDecoder::new(p / "decoder", config);

        Seq2SeqModel {
            source_embeddings,
            target_embeddings,
            encoder,
            decoder,
            dropout: Dropout::new(config.dropout),
            bridge_encoder_state: config.bridge_encoder_state,
        }
    }

    /// Encodes a source batch (*source time*, *batch size*) and returns the attention memory
    /// with the initial decoder state.
    pub fn encode(&self, encoder_inputs: &Tensor, train: bool) -> (AttentionMemory, DecoderState) {
        let embedded = encoder_inputs
            .apply(&self.source_embeddings)
            .apply_t(&self.dropout, train);
        let encoder_output = self.encoder.forward(&embedded);
        let memory = self
            .decoder
            .attention()
            .prepare_memory(&encoder_output.hidden_states);
        let bridged_state = if self.bridge_encoder_state {
            Some(encoder_output.final_state)
        } else {
            None
        };
        let state = self.decoder.initial_state(
            bridged_state,
            encoder_inputs.size()[1],
            encoder_inputs.device(),
        );
        (memory, state)
    }

    /// Forward pass with teacher forcing: the decoder consumes `decoder_inputs` (ground truth
    /// shifted right) rather than its own predictions.
    ///
    /// # Arguments
    ///
    /// * `encoder_inputs` - Source identifiers (*source time*, *batch size*)
    /// * `decoder_inputs` - Target identifiers starting with BOS (*target time*, *batch size*)
    /// * `train` - boolean flag to turn on/off the dropout layers in the model
    pub fn forward_t(
        &self,
        encoder_inputs: &Tensor,
        decoder_inputs: &Tensor,
        train: bool,
    ) -> Seq2SeqModelOutput {
        let (memory, mut state) = self.encode(encoder_inputs, train);
        let embedded = decoder_inputs
            .apply(&self.target_embeddings)
            .apply_t(&self.dropout, train);

        let target_time = decoder_inputs.size()[0];
        let mut all_logits = Vec::with_capacity(target_time as usize);
        let mut all_attention_weights = Vec::with_capacity(target_time as usize);
        for t in 0..target_time {
            let step_output = self.decoder.step(&embedded.get(t), &state, &memory, train);
            all_logits.push(step_output.logits);
            all_attention_weights.push(step_output.attention_weights);
            state = step_output.state;
        }

        Seq2SeqModelOutput {
            logits: Tensor::stack(&all_logits, 0),
            attention_weights: Tensor::stack(&all_attention_weights, 0),
        }
    }

    /// Greedy decoding: starting from BOS, the argmax of every step is fed back as the next
    /// input, for exactly `max_time` steps. Nothing stops at EOS; callers truncate predictions.
    pub fn greedy_decode(
        &self,
        encoder_inputs: &Tensor,
        bos_token_id: i64,
        max_time: i64,
    ) -> GreedyDecoderOutput {
        let (memory, mut state) = self.encode(encoder_inputs, false);
        let batch_size = encoder_inputs.size()[1];
        let mut token = Tensor::full([batch_size], bos_token_id, (Int64, encoder_inputs.device()));

        let mut all_logits = Vec::with_capacity(max_time as usize);
        let mut predictions = Vec::with_capacity(max_time as usize);
        for _ in 0..max_time {
            let embedded = token.apply(&self.target_embeddings);
            let step_output = self.decoder.step(&embedded, &state, &memory, false);
            token = step_output.logits.argmax(-1, false);
            predictions.push(token.shallow_clone());
            all_logits.push(step_output.logits);
            state = step_output.state;
        }

        GreedyDecoderOutput {
            predictions: Tensor::stack(&predictions, 0),
            logits: Tensor::stack(&all_logits, 0),
        }
    }
}

/// Mean cross-entropy of time-major logits (*time*, *batch size*, *vocabulary size*) against
/// labels (*time*, *batch size*). Positions whose label equals `ignore_index` do not contribute.
pub fn sequence_cross_entropy(logits: &Tensor, labels: &Tensor, ignore_index: Option<i64>) -> Tensor {
    let vocab_size = logits.size()[2];
    logits.reshape([-1, vocab_size]).cross_entropy_loss::<Tensor>(
        &labels.reshape([-1]),
        None,
        Reduction::Mean,
        ignore_index.unwrap_or(-100),
        0.0,
    )
}
