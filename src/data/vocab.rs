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
use crate::data::corpus::tokenize;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Padding token
pub const PAD_TOKEN: &str = "<pad>";
/// Beginning of sequence token, first decoder input
pub const BOS_TOKEN: &str = "<s>";
/// End of sequence token, last decoder label
pub const EOS_TOKEN: &str = "</s>";
/// Unknown token, substituted for out-of-vocabulary words
pub const UNK_TOKEN: &str = "<unk>";

fn default_unk_id() -> i64 {
    3
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
/// # Reserved token identifiers
/// Read from the `const` section of the task configuration. The UNK identifier is optional and
/// defaults to 3.
pub struct SpecialTokenIds {
    #[serde(rename = "PAD")]
    pub pad: i64,
    #[serde(rename = "BOS")]
    pub bos: i64,
    #[serde(rename = "EOS")]
    pub eos: i64,
    #[serde(rename = "UNK", default = "default_unk_id")]
    pub unk: i64,
}

impl Default for SpecialTokenIds {
    fn default() -> Self {
        SpecialTokenIds {
            pad: 0,
            bos: 1,
            eos: 2,
            unk: 3,
        }
    }
}

impl SpecialTokenIds {
    fn pairs(&self) -> [(&'static str, i64); 4] {
        [
            (PAD_TOKEN, self.pad),
            (BOS_TOKEN, self.bos),
            (EOS_TOKEN, self.eos),
            (UNK_TOKEN, self.unk),
        ]
    }

    /// Number of reserved entries in every vocabulary.
    pub fn count(&self) -> usize {
        self.pairs().len()
    }

    pub fn is_reserved(&self, id: i64) -> bool {
        self.pairs().iter().any(|(_, reserved_id)| *reserved_id == id)
    }

    /// Checks that the reserved identifiers are distinct and fit in a vocabulary of the given size.
    pub fn validate(&self, vocabulary_size: usize) -> Result<(), NmtError> {
        if vocabulary_size < self.count() {
            return Err(NmtError::InvalidConfigurationError(format!(
                "vocabulary size {} cannot hold the {} reserved tokens",
                vocabulary_size,
                self.count()
            )));
        }
        let pairs = self.pairs();
        for (position, (token, id)) in pairs.iter().enumerate() {
            if *id < 0 || *id >= vocabulary_size as i64 {
                return Err(NmtError::InvalidConfigurationError(format!(
                    "reserved id {} for {} is outside of [0, {})",
                    id, token, vocabulary_size
                )));
            }
            if let Some((other, _)) = pairs[..position].iter().find(|(_, other)| other == id) {
                return Err(NmtError::InvalidConfigurationError(format!(
                    "{} and {} share the reserved id {}",
                    other, token, id
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
/// # Word-level vocabulary
/// Bidirectional mapping between tokens and identifiers in `[0, vocabulary_size)`. Built once from
/// a training corpus by keeping the most frequent tokens, immutable afterwards.
pub struct Vocabulary {
    token_to_id: HashMap<String, i64>,
    id_to_token: HashMap<i64, String>,
    special_token_ids: SpecialTokenIds,
}

impl Vocabulary {
    /// Builds a vocabulary holding at most `vocabulary_size` entries, reserved tokens included.
    ///
    /// Tokens are ranked by descending frequency, ties broken by first occurrence. If the corpus
    /// has fewer distinct tokens than requested the vocabulary is simply smaller.
    ///
    /// # Example
    ///
    /// ```
    /// use rust_nmt::data::{SpecialTokenIds, Vocabulary};
    ///
    /// let words = "a b b c c c".split_whitespace();
    /// let vocabulary = Vocabulary::build(words, 6, SpecialTokenIds::default())?;
    /// assert_eq!(vocabulary.token_to_id("c"), 4);
    /// assert_eq!(vocabulary.token_to_id("b"), 5);
    /// assert_eq!(vocabulary.token_to_id("a"), SpecialTokenIds::default().unk);
    /// # Ok::<(), rust_nmt::NmtError>(())
    /// ```
    pub fn build<I, S>(
        tokens: I,
        vocabulary_size: usize,
        special_token_ids: SpecialTokenIds,
    ) -> Result<Vocabulary, NmtError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        special_token_ids.validate(vocabulary_size)?;

        let reserved_tokens = special_token_ids.pairs();
        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        for (position, token) in tokens.into_iter().enumerate() {
            let token = token.as_ref();
            if reserved_tokens.iter().any(|(reserved, _)| *reserved == token) {
                continue;
            }
            counts
                .entry(token.to_string())
                .or_insert((0, position))
                .0 += 1;
        }
        let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
        ranked.sort_by(|(_, (count_a, first_a)), (_, (count_b, first_b))| {
            count_b.cmp(count_a).then(first_a.cmp(first_b))
        });

        let mut token_to_id = HashMap::with_capacity(vocabulary_size);
        for (token, id) in reserved_tokens.iter() {
            token_to_id.insert(token.to_string(), *id);
        }
        let mut free_ids = (0..vocabulary_size as i64).filter(|id| !special_token_ids.is_reserved(*id));
        for (token, _) in ranked {
            match free_ids.next() {
                Some(id) => {
                    token_to_id.insert(token, id);
                }
                None => break,
            }
        }
        let id_to_token = token_to_id
            .iter()
            .map(|(token, id)| (*id, token.clone()))
            .collect();

        Ok(Vocabulary {
            token_to_id,
            id_to_token,
            special_token_ids,
        })
    }

    pub fn len(&self) -> usize {
        self.token_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_to_id.is_empty()
    }

    pub fn special_token_ids(&self) -> SpecialTokenIds {
        self.special_token_ids
    }

    /// Returns the identifier of a token, the UNK identifier for out-of-vocabulary tokens.
    pub fn token_to_id(&self, token: &str) -> i64 {
        self.token_to_id
            .get(token)
            .copied()
            .unwrap_or(self.special_token_ids.unk)
    }

    pub fn id_to_token(&self, id: i64) -> Option<&str> {
        self.id_to_token.get(&id).map(String::as_str)
    }

    pub fn encode<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<i64> {
        tokens
            .iter()
            .map(|token| self.token_to_id(token.as_ref()))
            .collect()
    }

    /// Tokenizes a raw sentence on whitespace and maps it to identifiers.
    pub fn encode_sentence(&self, sentence: &str) -> Vec<i64> {
        self.encode(&tokenize(sentence))
    }

    /// Maps identifiers back to tokens. Reading stops at the first EOS; PAD and BOS are skipped.
    /// Identifiers absent from the vocabulary are rendered as the UNK token.
    pub fn decode(&self, ids: &[i64]) -> Vec<&str> {
        ids.iter()
            .take_while(|id| **id != self.special_token_ids.eos)
            .filter(|id| **id != self.special_token_ids.pad && **id != self.special_token_ids.bos)
            .map(|id| self.id_to_token(*id).unwrap_or(UNK_TOKEN))
            .collect()
    }

    /// Space-joined form of [`Vocabulary::decode`].
    pub fn decode_to_string(&self, ids: &[i64]) -> String {
        self.decode(ids).join(" ")
    }

    /// Persists the forward (token to id) and reverse (id to token) tables as two JSON files.
    pub fn save<P: AsRef<Path>, R: AsRef<Path>>(
        &self,
        dictionary_path: P,
        reverse_dictionary_path: R,
    ) -> Result<(), NmtError> {
        let dictionary: BTreeMap<&str, i64> = self
            .token_to_id
            .iter()
            .map(|(token, id)| (token.as_str(), *id))
            .collect();
        let reverse_dictionary: BTreeMap<i64, &str> = self
            .id_to_token
            .iter()
            .map(|(id, token)| (*id, token.as_str()))
            .collect();

        let f = File::create(dictionary_path)?;
        serde_json::to_writer(BufWriter::new(f), &dictionary)?;
        let f = File::create(reverse_dictionary_path)?;
        serde_json::to_writer(BufWriter::new(f), &reverse_dictionary)?;
        Ok(())
    }

    /// Restores a vocabulary saved with [`Vocabulary::save`]. The two tables must be inverse of
    /// each other and agree with the reserved identifiers of the current configuration.
    pub fn load<P: AsRef<Path>, R: AsRef<Path>>(
        dictionary_path: P,
        reverse_dictionary_path: R,
        special_token_ids: SpecialTokenIds,
    ) -> Result<Vocabulary, NmtError> {
        let f = File::open(dictionary_path)?;
        let token_to_id: HashMap<String, i64> = serde_json::from_reader(BufReader::new(f))?;
        let f = File::open(reverse_dictionary_path)?;
        let id_to_token: HashMap<i64, String> = serde_json::from_reader(BufReader::new(f))?;

        if token_to_id.len() != id_to_token.len()
            || token_to_id
                .iter()
                .any(|(token, id)| id_to_token.get(id) != Some(token))
        {
            return Err(NmtError::SerializationError(
                "dictionary and reverse dictionary are not inverse of each other".into(),
            ));
        }
        for (token, id) in special_token_ids.pairs().iter() {
            if token_to_id.get(*token) != Some(id) {
                return Err(NmtError::InvalidConfigurationError(format!(
                    "saved dictionary maps {} to {:?}, configuration expects {}",
                    token,
                    token_to_id.get(*token),
                    id
                )));
            }
        }

        Ok(Vocabulary {
            token_to_id,
            id_to_token,
            special_token_ids,
        })
    }
}
