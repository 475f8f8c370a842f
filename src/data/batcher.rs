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

#[derive(Debug, Clone, PartialEq)]
/// # Contiguous slice of a dataset
pub struct Minibatch<'a, T> {
    /// Examples of the batch, always `batch_size` of them
    pub examples: Vec<&'a T>,
    /// Offset to pass to the next call
    pub next_offset: usize,
    /// True if this batch reached or crossed the end of the dataset
    pub completes_pass: bool,
}

/// Slices `batch_size` examples starting at `offset`, wrapping around to the start of the dataset
/// when it is exhausted. The next offset is `(offset + batch_size) % examples.len()`: it returns to
/// 0 exactly when a pass ends on a batch boundary. When the dataset size is not a multiple of the
/// batch size, the wrapping batch mixes the end of one pass with the start of the next.
///
/// # Example
///
/// ```
/// use rust_nmt::data::batchnize;
///
/// let examples = vec![0, 1, 2, 3, 4];
/// let batch = batchnize(&examples, 2, 4)?;
/// assert_eq!(batch.examples, vec![&4, &0]);
/// assert_eq!(batch.next_offset, 1);
/// assert!(batch.completes_pass);
/// # Ok::<(), rust_nmt::NmtError>(())
/// ```
pub fn batchnize<T>(
    examples: &[T],
    batch_size: usize,
    offset: usize,
) -> Result<Minibatch<'_, T>, NmtError> {
    if examples.is_empty() {
        return Err(NmtError::ValueError(
            "cannot draw a batch from an empty dataset".into(),
        ));
    }
    if batch_size == 0 {
        return Err(NmtError::ValueError("batch size must be positive".into()));
    }
    let offset = offset % examples.len();
    let batch = examples
        .iter()
        .cycle()
        .skip(offset)
        .take(batch_size)
        .collect();

    Ok(Minibatch {
        examples: batch,
        next_offset: (offset + batch_size) % examples.len(),
        completes_pass: offset + batch_size >= examples.len(),
    })
}

/// Number of batches needed to visit every example once.
pub fn batches_per_pass(dataset_size: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        0
    } else {
        (dataset_size + batch_size - 1) / batch_size
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn batch_larger_than_dataset_cycles() {
        let examples = vec!['a', 'b'];
        let batch = batchnize(&examples, 5, 1).unwrap();
        assert_eq!(batch.examples, vec![&'b', &'a', &'b', &'a', &'b']);
        assert_eq!(batch.next_offset, 0);
        assert!(batch.completes_pass);
    }

    #[test]
    fn rejects_degenerate_inputs() {
        let empty: Vec<u8> = vec![];
        assert!(batchnize(&empty, 2, 0).is_err());
        assert!(batchnize(&[1u8], 0, 0).is_err());
        assert_eq!(batches_per_pass(5, 2), 3);
        assert_eq!(batches_per_pass(4, 2), 2);
    }
}
