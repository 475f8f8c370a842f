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
use tch::Device;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
/// # Compute backend selection
/// All tensors of a model and its batches live on the device resolved from this option.
pub enum DeviceOption {
    /// CPU backend
    Cpu,
    /// First CUDA device. Training fails at the first tensor allocation if CUDA is unavailable.
    Cuda,
    /// CUDA if available, CPU otherwise
    Auto,
}

impl Default for DeviceOption {
    fn default() -> Self {
        DeviceOption::Auto
    }
}

impl DeviceOption {
    pub fn resolve(&self) -> Device {
        match self {
            DeviceOption::Cpu => Device::Cpu,
            DeviceOption::Cuda => Device::Cuda(0),
            DeviceOption::Auto => Device::cuda_if_available(),
        }
    }
}
