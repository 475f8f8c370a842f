//! # Corpus preparation
//!
//! Everything between raw text files and model-ready tensors:
//! - `corpus`: whitespace tokenization, corpus readers and the `ParallelCorpus` of aligned identifier sequences
//! - `vocab`: frequency-ranked word vocabulary with reserved PAD/BOS/EOS/UNK identifiers, persisted as JSON tables
//! - `batcher`: contiguous batches with wraparound over a fixed-size dataset
//! - `framing`: padding/truncation into time-major encoder inputs, decoder inputs and decoder labels
//!
//! ```no_run
//! use rust_nmt::data::{read_words, ParallelCorpus, SequenceFramer, SpecialTokenIds, Vocabulary};
//! use tch::Device;
//!
//! # fn main() -> Result<(), rust_nmt::NmtError> {
//! let special_token_ids = SpecialTokenIds::default();
//! let source_vocabulary = Vocabulary::build(read_words("train.en")?, 8000, special_token_ids)?;
//! let target_vocabulary = Vocabulary::build(read_words("train.fr")?, 8000, special_token_ids)?;
//! let corpus = ParallelCorpus::from_files(
//!     "train.en",
//!     "train.fr",
//!     &source_vocabulary,
//!     &target_vocabulary,
//! )?;
//!
//! let framer = SequenceFramer::new(30, true, special_token_ids);
//! let minibatch = corpus.minibatch(64, 0)?;
//! let batch = framer.frame(&minibatch.source, &minibatch.target, Device::Cpu)?;
//! # Ok(())
//! # }
//! ```

pub mod batcher;
pub mod corpus;
pub mod framing;
pub mod vocab;

pub use batcher::{batches_per_pass, batchnize, Minibatch};
pub use corpus::{read_data, read_words, tokenize, ParallelCorpus, ParallelMinibatch};
pub use framing::{FramedSequences, Seq2SeqBatch, SequenceFramer};
pub use vocab::{SpecialTokenIds, Vocabulary, BOS_TOKEN, EOS_TOKEN, PAD_TOKEN, UNK_TOKEN};
