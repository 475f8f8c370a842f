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
use crate::data::batcher::batchnize;
use crate::data::vocab::Vocabulary;
use std::fs;
use std::path::Path;

/// Splits a sentence on whitespace.
pub fn tokenize(sentence: &str) -> Vec<&str> {
    sentence.split_whitespace().collect()
}

fn read_to_string(path: &Path) -> Result<String, NmtError> {
    fs::read_to_string(path)
        .map_err(|error| NmtError::IOError(format!("{}: {}", path.display(), error)))
}

/// Reads a corpus file, one tokenized sentence per line. Empty lines are kept as empty sentences
/// so that parallel files stay aligned.
pub fn read_data<P: AsRef<Path>>(path: P) -> Result<Vec<Vec<String>>, NmtError> {
    let content = read_to_string(path.as_ref())?;
    Ok(content
        .lines()
        .map(|line| tokenize(line).into_iter().map(String::from).collect())
        .collect())
}

/// Reads a corpus file as a flat stream of tokens, the input of the vocabulary builder.
pub fn read_words<P: AsRef<Path>>(path: P) -> Result<Vec<String>, NmtError> {
    let content = read_to_string(path.as_ref())?;
    Ok(tokenize(&content).into_iter().map(String::from).collect())
}

#[derive(Debug, Clone, PartialEq)]
/// # Aligned source and target sentences as token identifiers
pub struct ParallelCorpus {
    source: Vec<Vec<i64>>,
    target: Vec<Vec<i64>>,
}

/// # Source and target halves of one training step
pub struct ParallelMinibatch<'a> {
    pub source: Vec<&'a Vec<i64>>,
    pub target: Vec<&'a Vec<i64>>,
    pub next_offset: usize,
    pub completes_pass: bool,
}

impl ParallelCorpus {
    pub fn new(source: Vec<Vec<i64>>, target: Vec<Vec<i64>>) -> Result<ParallelCorpus, NmtError> {
        if source.len() != target.len() {
            return Err(NmtError::ValueError(format!(
                "parallel corpus is misaligned: {} source and {} target sentences",
                source.len(),
                target.len()
            )));
        }
        Ok(ParallelCorpus { source, target })
    }

    /// Reads a source and a target file and converts both to identifiers with their vocabulary.
    pub fn from_files<P: AsRef<Path>, Q: AsRef<Path>>(
        source_path: P,
        target_path: Q,
        source_vocabulary: &Vocabulary,
        target_vocabulary: &Vocabulary,
    ) -> Result<ParallelCorpus, NmtError> {
        let source = read_data(source_path)?
            .iter()
            .map(|sentence| source_vocabulary.encode(sentence))
            .collect();
        let target = read_data(target_path)?
            .iter()
            .map(|sentence| target_vocabulary.encode(sentence))
            .collect();
        ParallelCorpus::new(source, target)
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn source(&self) -> &[Vec<i64>] {
        &self.source
    }

    pub fn target(&self) -> &[Vec<i64>] {
        &self.target
    }

    /// Keeps the first `size` pairs only.
    pub fn truncate(&mut self, size: usize) {
        self.source.truncate(size);
        self.target.truncate(size);
    }

    /// Draws the same slice from both sides, see [`batchnize`].
    pub fn minibatch(
        &self,
        batch_size: usize,
        offset: usize,
    ) -> Result<ParallelMinibatch<'_>, NmtError> {
        let source = batchnize(&self.source, batch_size, offset)?;
        let target = batchnize(&self.target, batch_size, offset)?;
        Ok(ParallelMinibatch {
            source: source.examples,
            target: target.examples,
            next_offset: source.next_offset,
            completes_pass: source.completes_pass,
        })
    }
}
