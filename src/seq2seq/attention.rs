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

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use tch::kind::Kind::Float;
use tch::{nn, Tensor};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
/// # Attention scoring function
pub enum AttentionKind {
    /// Additive scoring `v · tanh(W_m s + W_q h)`, context computed from the previous decoder state
    Bahdanau,
    /// Multiplicative scoring `h · W_m s`, context computed from the current decoder state and
    /// combined with it by an attention layer
    Luong,
}

impl Default for AttentionKind {
    fn default() -> Self {
        AttentionKind::Luong
    }
}

#[derive(Debug)]
/// # Encoder outputs prepared for attention
/// Projected keys are computed once per source batch and reused at every decoder step.
pub struct AttentionMemory {
    /// Encoder hidden states (*source time*, *batch size*, *memory size*)
    pub values: Tensor,
    /// Projected encoder hidden states (*source time*, *batch size*, *attention units*)
    pub keys: Tensor,
}

/// Normalizes scores of shape (*batch size*, *source time*) and returns the weighted average of
/// the memory values along with the weights. Softmax subtracts the row maximum before
/// exponentiation, so long sources do not overflow.
fn weighted_context(scores: &Tensor, memory: &AttentionMemory) -> (Tensor, Tensor) {
    let weights = scores.softmax(-1, Float);
    let context = weights
        .unsqueeze(1)
        .bmm(&memory.values.transpose(0, 1))
        .squeeze_dim(1);
    (context, weights)
}

#[derive(Debug)]
pub struct BahdanauAttention {
    memory_layer: nn::Linear,
    query_layer: nn::Linear,
    score_layer: nn::Linear,
}

impl BahdanauAttention {
    pub fn new<'p, P>(p: P, memory_size: i64, query_size: i64, units: i64) -> BahdanauAttention
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        let memory_layer = nn::linear(p / "memory_layer", memory_size, units, Default::default());
        let query_layer = nn::linear(p / "query_layer", query_size, units, Default::default());
        let score_layer = nn::linear(p / "score_layer", units, 1, Default::default());
        BahdanauAttention {
            memory_layer,
            query_layer,
            score_layer,
        }
    }

    pub fn forward(&self, query: &Tensor, memory: &AttentionMemory) -> (Tensor, Tensor) {
        let scores = (&memory.keys + query.apply(&self.query_layer).unsqueeze(0))
            .tanh()
            .apply(&self.score_layer)
            .squeeze_dim(-1)
            .transpose(0, 1);
        weighted_context(&scores, memory)
    }
}

#[derive(Debug)]
pub struct LuongAttention {
    memory_layer: nn::Linear,
}

impl LuongAttention {
    pub fn new<'p, P>(p: P, memory_size: i64, query_size: i64) -> LuongAttention
    where
        P: Borrow<nn::Path<'p>>,
    {
        let p = p.borrow();
        let linear_config = nn::LinearConfig {
            bias: false,
            ..Default::default()
        };
        let memory_layer = nn::linear(p / "memory_layer", memory_size, query_size, linear_config);
        LuongAttention { memory_layer }
    }

    pub fn forward(&self, query: &Tensor, memory: &AttentionMemory) -> (Tensor, Tensor) {
        let scores = memory
            .keys
            .transpose(0, 1)
            .bmm(&query.unsqueeze(-1))
            .squeeze_dim(-1);
        weighted_context(&scores, memory)
    }
}

#[derive(Debug)]
/// # Attention mechanism of the decoder
/// Holds one of the two supported scoring functions. Both return a context of the memory size
/// (*batch size*, *memory size*) and weights of shape (*batch size*, *source time*) summing to one
/// over the source time dimension.
pub enum Attention {
    Bahdanau(BahdanauAttention),
    Luong(LuongAttention),
}

impl Attention {
    /// Creates the attention mechanism. For `Bahdanau` the number of attention units equals the
    /// query size.
    pub fn new<'p, P>(p: P, kind: AttentionKind, memory_size: i64, query_size: i64) -> Attention
    where
        P: Borrow<nn::Path<'p>>,
    {
        match kind {
            AttentionKind::Bahdanau => Attention::Bahdanau(BahdanauAttention::new(
                p,
                memory_size,
                query_size,
                query_size,
            )),
            AttentionKind::Luong => {
                Attention::Luong(LuongAttention::new(p, memory_size, query_size))
            }
        }
    }

    pub fn kind(&self) -> AttentionKind {
        match self {
            Attention::Bahdanau(_) => AttentionKind::Bahdanau,
            Attention::Luong(_) => AttentionKind::Luong,
        }
    }

    /// Projects the encoder hidden states (*source time*, *batch size*, *memory size*) into keys.
    pub fn prepare_memory(&self, encoder_hidden_states: &Tensor) -> AttentionMemory {
        let keys = match self {
            Attention::Bahdanau(attention) => encoder_hidden_states.apply(&attention.memory_layer),
            Attention::Luong(attention) => encoder_hidden_states.apply(&attention.memory_layer),
        };
        AttentionMemory {
            values: encoder_hidden_states.shallow_clone(),
            keys,
        }
    }

    /// Returns `(context, attention weights)` for a decoder query of shape (*batch size*, *query size*).
    pub fn forward(&self, query: &Tensor, memory: &AttentionMemory) -> (Tensor, Tensor) {
        match self {
            Attention::Bahdanau(attention) => attention.forward(query, memory),
            Attention::Luong(attention) => attention.forward(query, memory),
        }
    }
}
