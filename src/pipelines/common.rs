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

//! # Common blocks for the training and evaluation pipelines
//! `TranslationModel` ties a `Seq2SeqModel` to the variable store holding its weights, so that
//! the trainer, the evaluator and checkpointing share a single owner of the parameters.
use crate::common::error::NmtError;
use crate::seq2seq::{Seq2SeqConfig, Seq2SeqModel};
use std::path::Path;
use tch::{nn, Device};

/// # Sequence-to-sequence model with its variable store
pub struct TranslationModel {
    var_store: nn::VarStore,
    model: Seq2SeqModel,
    config: Seq2SeqConfig,
}

impl TranslationModel {
    /// Creates a freshly initialized model on `device`.
    pub fn new(config: &Seq2SeqConfig, device: Device) -> TranslationModel {
        let var_store = nn::VarStore::new(device);
        let model = Seq2SeqModel::new(var_store.root() / "seq2seq", config);
        TranslationModel {
            var_store,
            model,
            config: config.clone(),
        }
    }

    /// Creates a model and restores its weights from a checkpoint written by [`TranslationModel::save`].
    pub fn load<P: AsRef<Path>>(
        config: &Seq2SeqConfig,
        device: Device,
        checkpoint_path: P,
    ) -> Result<TranslationModel, NmtError> {
        let mut translation_model = TranslationModel::new(config, device);
        translation_model.var_store.load(checkpoint_path)?;
        Ok(translation_model)
    }

    pub fn save<P: AsRef<Path>>(&self, checkpoint_path: P) -> Result<(), NmtError> {
        self.var_store.save(checkpoint_path)?;
        Ok(())
    }

    pub fn model(&self) -> &Seq2SeqModel {
        &self.model
    }

    pub fn var_store(&self) -> &nn::VarStore {
        &self.var_store
    }

    pub fn config(&self) -> &Seq2SeqConfig {
        &self.config
    }

    pub fn device(&self) -> Device {
        self.var_store.device()
    }
}
