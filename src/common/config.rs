// Copyright 2019 Guillaume Becquin
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
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// # Utility to deserialize JSON config files
pub trait Config
where
    Self: DeserializeOwned + Serialize,
{
    /// Loads a `Config` object from a JSON file. The format is expected to be aligned with the
    /// fields of the implementing struct. Missing required fields are reported as an
    /// `InvalidConfigurationError`.
    ///
    /// # Parameters
    ///
    /// * `path` - `Path` to the configuration JSON file.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use rust_nmt::pipelines::translation_task::TaskConfig;
    /// use rust_nmt::Config;
    /// use std::path::Path;
    ///
    /// let config_path = Path::new("path/to/config.json");
    /// let config = TaskConfig::from_file(config_path)?;
    /// # Ok::<(), rust_nmt::NmtError>(())
    /// ```
    fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, NmtError> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|error| {
            NmtError::InvalidConfigurationError(format!(
                "could not open configuration file {}: {}",
                path.display(),
                error
            ))
        })?;
        let br = BufReader::new(f);
        serde_json::from_reader(br).map_err(|error| {
            NmtError::InvalidConfigurationError(format!(
                "could not parse configuration {}: {}",
                path.display(),
                error
            ))
        })
    }

    /// Writes the configuration back to a JSON file (pretty-printed).
    fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), NmtError> {
        let f = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(f), self)?;
        Ok(())
    }
}
