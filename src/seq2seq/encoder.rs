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

use crate::seq2seq::Seq2SeqConfig;
use std::borrow::Borrow;
use tch::nn::{LSTMState, RNN};
use tch::{nn, Tensor};

/// # Output of the recurrent encoder
pub struct EncoderOutput {
    /// Top layer hidden state at every step (*source time*, *batch size*, *directions x hidden units*)
    pub hidden_states: Tensor,
    /// Final `(hidden, cell)` state per layer, each of shape (*layers*, *batch size*, *directions x hidden units*).
    /// Forward and backward states are concatenated along the last dimension.
    pub final_state: LSTMState,
}

/// # Stacked (bi-directional) LSTM encoder
/// Both directions run over the full embedded source independently. The decoder hidden size is
/// the encoder output size, `directions x hidden_units`.
#[derive(Debug)]
pub struct Seq2SeqEncoder {
    lstm: nn::LSTM,
    layers: i64,
    directions: i64,
    hidden_units: i64,
}

impl Seq2SeqEncoder {
    pub fn new<'p, P>(p: P, config: &Seq2SeqConfig) -> Seq2SeqEncoder
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        let rnn_config = nn::RNNConfig {
            num_layers: config.layers,
            bidirectional: config.bidirectional,
            batch_first: false,
            ..Default::default()
        };
        let lstm = nn::lstm(
            p / "lstm",
            config.embedding_size,
            config.hidden_units,
            rnn_config,
        );
        Seq2SeqEncoder {
            lstm,
            layers: config.layers,
            directions: config.directions(),
            hidden_units: config.hidden_units,
        }
    }

    pub fn output_size(&self) -> i64 {
        self.directions * self.hidden_units
    }

    /// Encodes an embedded source of shape (*source time*, *batch size*, *embedding size*),
    /// starting from a zero state.
    pub fn forward(&self, embedded_inputs: &Tensor) -> EncoderOutput {
        let (hidden_states, state) = self.lstm.seq(embedded_inputs);
        let final_state = LSTMState((
            self.merge_directions(&(state.0).0),
            self.merge_directions(&(state.0).1),
        ));
        EncoderOutput {
            hidden_states,
            final_state,
        }
    }

    /// (*layers x directions*, *batch*, *hidden*) -> (*layers*, *batch*, *directions x hidden*)
    fn merge_directions(&self, state: &Tensor) -> Tensor {
        if self.directions == 1 {
            return state.shallow_clone();
        }
        let batch_size = state.size()[1];
        state
            .view([self.layers, self.directions, batch_size, self.hidden_units])
            .permute([0, 2, 1, 3])
            .contiguous()
            .view([self.layers, batch_size, self.directions * self.hidden_units])
    }
}
