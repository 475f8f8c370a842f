//! # Attentional sequence-to-sequence model
//!
//! Recurrent encoder-decoder for neural machine translation ([Neural Machine Translation by Jointly Learning to Align and Translate](https://arxiv.org/abs/1409.0473) Bahdanau, Cho, Bengio, 2014;
//! [Effective Approaches to Attention-based Neural Machine Translation](https://arxiv.org/abs/1508.04025) Luong, Pham, Manning, 2015).
//! The model is implemented in the `seq2seq_model::Seq2SeqModel` struct, composed of:
//! - `encoder::Seq2SeqEncoder`: stacked LSTM over the embedded source, optionally bi-directional
//!   (forward and backward states concatenated per layer and per step)
//! - `attention::Attention`: additive (Bahdanau) or multiplicative (Luong) scoring of the encoder
//!   states against the decoder state, producing one context vector per decoder step
//! - `decoder::Seq2SeqDecoder`: single-step attentional LSTM stack emitting vocabulary logits
//!
//! Recurrent state is never stored in the modules: the encoder returns its final state, and each
//! decoder step takes a `DecoderState` and returns the next one.
//!
//! ```no_run
//! use rust_nmt::seq2seq::{sequence_cross_entropy, AttentionKind, Seq2SeqConfig, Seq2SeqModel};
//! use tch::nn::OptimizerConfig;
//! use tch::{nn, Device, Kind, Tensor};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Seq2SeqConfig {
//!     source_vocab_size: 8000,
//!     target_vocab_size: 8000,
//!     embedding_size: 128,
//!     hidden_units: 256,
//!     layers: 2,
//!     bidirectional: true,
//!     attention: AttentionKind::Bahdanau,
//!     attention_layer_size: 256,
//!     dropout: 0.1,
//!     bridge_encoder_state: true,
//! };
//! let vs = nn::VarStore::new(Device::cuda_if_available());
//! let model = Seq2SeqModel::new(vs.root() / "seq2seq", &config);
//! let mut optimizer = nn::Adam::default().build(&vs, 1e-3)?;
//!
//! let encoder_inputs = Tensor::randint(8000, [30, 64], (Kind::Int64, vs.device()));
//! let decoder_inputs = Tensor::randint(8000, [30, 64], (Kind::Int64, vs.device()));
//! let decoder_labels = Tensor::randint(8000, [30, 64], (Kind::Int64, vs.device()));
//!
//! let output = model.forward_t(&encoder_inputs, &decoder_inputs, true);
//! let loss = sequence_cross_entropy(&output.logits, &decoder_labels, None);
//! optimizer.backward_step(&loss);
//!
//! let translation = model.greedy_decode(&encoder_inputs, 1, 30);
//! # Ok(())
//! # }
//! ```

mod attention;
mod decoder;
mod encoder;
mod seq2seq_model;

pub use attention::{Attention, AttentionKind, AttentionMemory, BahdanauAttention, LuongAttention};
pub use decoder::{DecoderState, DecoderStepOutput, Seq2SeqDecoder};
pub use encoder::{EncoderOutput, Seq2SeqEncoder};
pub use seq2seq_model::{
    sequence_cross_entropy, GreedyDecoderOutput, Seq2SeqConfig, Seq2SeqModel, Seq2SeqModelOutput,
};
