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

use std::collections::VecDeque;

/// # Sliding-window early stopping
/// Keeps the last `max_size` monitored losses. Once the window is full, signals a stop when the
/// improvement across it (oldest minus newest loss) falls below `edge_threshold`.
///
/// # Example
///
/// ```
/// use rust_nmt::pipelines::early_stopping::EarlyStopper;
///
/// let mut early_stopper = EarlyStopper::new(3, 0.1);
/// assert!(!early_stopper.update(2.0));
/// assert!(!early_stopper.update(1.0));
/// assert!(!early_stopper.update(0.98));
/// assert!(early_stopper.update(0.95));
/// ```
#[derive(Debug, Clone)]
pub struct EarlyStopper {
    window: VecDeque<f64>,
    max_size: usize,
    edge_threshold: f64,
}

impl EarlyStopper {
    pub fn new(max_size: usize, edge_threshold: f64) -> EarlyStopper {
        let max_size = max_size.max(2);
        EarlyStopper {
            window: VecDeque::with_capacity(max_size + 1),
            max_size,
            edge_threshold,
        }
    }

    /// Records a loss and returns true if training should stop.
    pub fn update(&mut self, loss: f64) -> bool {
        self.window.push_back(loss);
        if self.window.len() > self.max_size {
            self.window.pop_front();
        }
        match self.improvement() {
            Some(improvement) => improvement < self.edge_threshold,
            None => false,
        }
    }

    /// Oldest minus newest loss of a full window, `None` until the window is full.
    pub fn improvement(&self) -> Option<f64> {
        if self.window.len() < self.max_size {
            return None;
        }
        match (self.window.front(), self.window.back()) {
            (Some(oldest), Some(newest)) => Some(oldest - newest),
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}

impl Default for EarlyStopper {
    fn default() -> Self {
        EarlyStopper::new(5, 0.1)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn increasing_loss_stops() {
        let mut early_stopper = EarlyStopper::new(2, 0.0);
        assert!(!early_stopper.update(1.0));
        assert!(early_stopper.update(1.2));
    }

    #[test]
    fn steady_improvement_continues() {
        let mut early_stopper = EarlyStopper::default();
        for step in 0..20 {
            assert!(!early_stopper.update(10.0 - step as f64));
        }
    }
}
