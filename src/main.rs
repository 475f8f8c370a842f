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

use anyhow::Result;
use clap::{ArgAction, Parser};
use rust_nmt::pipelines::translation_task::{
    Mode, ModelArtifacts, TaskConfig, TaskOutcome, TranslationTask,
};
use rust_nmt::Config;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// `train` or `eval`
    #[arg(short, long)]
    mode: String,

    /// JSON task configuration
    #[arg(short, long)]
    config: PathBuf,

    /// Trains on the first 1000 pairs only and logs at debug level
    #[arg(short, long, default_value_t = false, action = ArgAction::Set)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let mode: Mode = args.mode.parse()?;
    let config = TaskConfig::from_file(&args.config)?;
    let artifacts = ModelArtifacts::from_environment(&config.option.output)?;
    let task = TranslationTask::new(config, artifacts, args.debug);

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    match task.run(mode, &mut stdin.lock(), &mut stdout)? {
        TaskOutcome::Declined => {}
        TaskOutcome::Trained {
            training,
            evaluation,
        } => {
            log::info!(
                "training {:?} after {} epochs, test loss {}",
                training.status,
                training.epochs,
                evaluation.mean_loss
            );
        }
        TaskOutcome::Evaluated(evaluation) => {
            log::info!(
                "{} test sentences decoded, test loss {}",
                evaluation.len(),
                evaluation.mean_loss
            );
        }
    }
    Ok(())
}
