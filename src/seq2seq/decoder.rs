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
use crate::seq2seq::attention::{Attention, AttentionKind, AttentionMemory};
use crate::seq2seq::Seq2SeqConfig;
use std::borrow::Borrow;
use tch::kind::Kind::Float;
use tch::nn::{LSTMState, RNN};
use tch::{nn, Device, Tensor};

/// # Recurrent state threaded between decoder steps
pub struct DecoderState {
    /// `(hidden, cell)` of the LSTM stack, each (*layers*, *batch size*, *decoder hidden size*)
    pub lstm_state: LSTMState,
    /// Previous attentional vector (*batch size*, *attention layer size*), fed back as input by
    /// the Luong decoder. Always `None` for the Bahdanau decoder.
    pub attentional: Option<Tensor>,
}

/// # Output of a single decoder step
pub struct DecoderStepOutput {
    /// Unnormalized scores over the target vocabulary (*batch size*, *target vocabulary size*)
    pub logits: Tensor,
    /// State to pass to the next step
    pub state: DecoderState,
    /// Attention weights over the source (*batch size*, *source time*)
    pub attention_weights: Tensor,
}

/// Layers specific to the attention variant, between the LSTM output and the vocabulary projection.
#[derive(Debug)]
enum AttentionHead {
    /// Projects the top hidden state to the embedding size
    Bahdanau { hidden_projection: nn::Linear },
    /// Merges the top hidden state and the context into the attentional vector
    Luong { attention_layer: nn::Linear },
}

/// # Attentional LSTM decoder
/// Consumes one embedded target token per call. With Bahdanau attention the context is computed
/// from the previous top hidden state and fed into the LSTM alongside the embedding; with Luong
/// attention the context is computed from the new top hidden state and merged with it by an
/// attention layer whose output is fed to the next step.
#[derive(Debug)]
pub struct Seq2SeqDecoder {
    lstm: nn::LSTM,
    attention: Attention,
    head: AttentionHead,
    output_projection: nn::Linear,
    dropout: Dropout,
    layers: i64,
    hidden_size: i64,
    attention_layer_size: i64,
}

impl Seq2SeqDecoder {
    pub fn new<'p, P>(p: P, config: &Seq2SeqConfig) -> Seq2SeqDecoder
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        let hidden_size = config.decoder_hidden_size();
        let rnn_config = nn::RNNConfig {
            num_layers: config.layers,
            batch_first: false,
            ..Default::default()
        };
        let attention = Attention::new(
            p / "attention",
            config.attention,
            hidden_size,
            hidden_size,
        );

        let (lstm_input_size, head, output_size) =
            match config.attention {
                AttentionKind::Bahdanau => {
                    let hidden_projection = nn::linear(
                        p / "hidden_projection",
                        hidden_size,
                        config.embedding_size,
                        Default::default(),
                    );
                    (
                        config.embedding_size + hidden_size,
                        AttentionHead::Bahdanau { hidden_projection },
                        config.embedding_size,
                    )
                }
                AttentionKind::Luong => {
                    let linear_config = nn::LinearConfig {
                        bias: false,
                        ..Default::default()
                    };
                    let attention_layer = nn::linear(
                        p / "attention_layer",
                        2 * hidden_size,
                        config.attention_layer_size,
                        linear_config,
                    );
                    (
                        config.embedding_size + config.attention_layer_size,
                        AttentionHead::Luong { attention_layer },
                        config.attention_layer_size,
                    )
                }
            };

        let lstm = nn::lstm(p / "lstm", lstm_input_size, hidden_size, rnn_config);
        let output_projection = nn::linear(
            p / "output_projection",
            output_size,
            config.target_vocab_size,
            Default::default(),
        );

        Seq2SeqDecoder {
            lstm,
            attention,
            head,
            output_projection,
            dropout: Dropout::new(config.dropout),
            layers: config.layers,
            hidden_size,
            attention_layer_size: config.attention_layer_size,
        }
    }

    pub fn attention(&self) -> &Attention {
        &self.attention
    }

    /// Initial decoder state. The LSTM stack starts from `encoder_state` when provided (bridged
    /// from the encoder final state) and from zeros otherwise.
    pub fn initial_state(
        &self,
        encoder_state: Option<LSTMState>,
        batch_size: i64,
        device: Device,
    ) -> DecoderState {
        let lstm_state = match encoder_state {
            Some(state) => state,
            None => {
                let zeros =
                    || Tensor::zeros([self.layers, batch_size, self.hidden_size], (Float, device));
                LSTMState((zeros(), zeros()))
            }
        };
        let attentional = match self.attention.kind() {
            AttentionKind::Luong => Some(Tensor::zeros(
                [batch_size, self.attention_layer_size],
                (Float, device),
            )),
            AttentionKind::Bahdanau => None,
        };
        DecoderState {
            lstm_state,
            attentional,
        }
    }

    fn top_hidden_state(&self, state: &LSTMState) -> Tensor {
        (state.0).0.get(self.layers - 1)
    }

    /// Runs one decoding step.
    ///
    /// # Arguments
    ///
    /// * `embedded_token` - Embedded previous target token (*batch size*, *embedding size*)
    /// * `state` - State returned by the previous step or by `initial_state`
    /// * `memory` - Encoder hidden states prepared by the attention mechanism
    /// * `train` - boolean flag to turn on/off the dropout layers in the model
    pub fn step(
        &self,
        embedded_token: &Tensor,
        state: &DecoderState,
        memory: &AttentionMemory,
        train: bool,
    ) -> DecoderStepOutput {
        match &self.head {
            AttentionHead::Bahdanau { hidden_projection } => {
                let query = self.top_hidden_state(&state.lstm_state);
                let (context, attention_weights) = self.attention.forward(&query, memory);
                let lstm_input = Tensor::cat(&[embedded_token.tanh(), context], 1).unsqueeze(0);
                let (output, lstm_state) = self.lstm.seq_init(&lstm_input, &state.lstm_state);
                let logits = output
                    .squeeze_dim(0)
                    .apply(hidden_projection)
                    .tanh()
                    .apply_t(&self.dropout, train)
                    .apply(&self.output_projection);
                DecoderStepOutput {
                    logits,
                    state: DecoderState {
                        lstm_state,
                        attentional: None,
                    },
                    attention_weights,
                }
            }
            AttentionHead::Luong { attention_layer } => {
                let previous_attentional = match &state.attentional {
                    Some(attentional) => attentional.shallow_clone(),
                    None => Tensor::zeros(
                        [embedded_token.size()[0], self.attention_layer_size],
                        (Float, embedded_token.device()),
                    ),
                };
                let lstm_input =
                    Tensor::cat(&[embedded_token.shallow_clone(), previous_attentional], 1)
                        .unsqueeze(0);
                let (output, lstm_state) = self.lstm.seq_init(&lstm_input, &state.lstm_state);
                let hidden = output.squeeze_dim(0);
                let (context, attention_weights) = self.attention.forward(&hidden, memory);
                let attentional = Tensor::cat(&[hidden, context], 1)
                    .apply(attention_layer)
                    .tanh();
                let logits = attentional
                    .apply_t(&self.dropout, train)
                    .apply(&self.output_projection);
                DecoderStepOutput {
                    logits,
                    state: DecoderState {
                        lstm_state,
                        attentional: Some(attentional),
                    },
                    attention_weights,
                }
            }
        }
    }
}
