use rust_nmt::data::{read_words, ParallelCorpus, Vocabulary};
use rust_nmt::pipelines::common::TranslationModel;
use rust_nmt::pipelines::evaluation::Seq2SeqEvaluator;
use rust_nmt::pipelines::training::{loss_frequency, TrainingStatus};
use rust_nmt::pipelines::translation_task::{
    prepare_model_directory, DirectoryDecision, Mode, ModelArtifacts, TaskConfig, TaskOutcome,
    TranslationTask,
};
use rust_nmt::{Config, NmtError};
use std::fs;
use std::io::Cursor;
use std::path::Path;
use tch::Device;

const PAIRS: [(&str, &str); 5] = [
    ("a b c", "w x"),
    ("b c d", "x y z"),
    ("c d a", "y z"),
    ("d a b", "z w x"),
    ("a c", "w y"),
];

fn write_corpora(directory: &Path, pair_count: usize) -> anyhow::Result<()> {
    let mut source = String::new();
    let mut target = String::new();
    for (source_sentence, target_sentence) in PAIRS.iter().take(pair_count) {
        source.push_str(source_sentence);
        source.push('\n');
        target.push_str(target_sentence);
        target.push('\n');
    }
    for split in ["train", "valid", "test"].iter() {
        fs::write(directory.join(format!("{}.src", split)), &source)?;
        fs::write(directory.join(format!("{}.tgt", split)), &target)?;
    }
    Ok(())
}

fn write_config(directory: &Path, attention: &str) -> anyhow::Result<TaskConfig> {
    let data = |name: &str| directory.join(name).display().to_string();
    let config = serde_json::json!({
        "option": {
            "train_step": 1,
            "max_time": 5,
            "batch_size": 2,
            "vocabulary_size": 20,
            "embedding_size": 8,
            "hidden_units": 8,
            "layers": 2,
            "output": "model",
            "attention": attention,
            "attention_layer_size": 8,
            "seed": 7,
            "device": "cpu"
        },
        "data": {
            "source_train_data": data("train.src"),
            "target_train_data": data("train.tgt"),
            "source_valid_data": data("valid.src"),
            "target_valid_data": data("valid.tgt"),
            "source_test_data": data("test.src"),
            "target_test_data": data("test.tgt")
        },
        "const": {"PAD": 0, "BOS": 1, "EOS": 2}
    });
    let config_path = directory.join("config.json");
    fs::write(&config_path, serde_json::to_string_pretty(&config)?)?;
    Ok(TaskConfig::from_file(&config_path)?)
}

fn line_count(path: &Path) -> anyhow::Result<usize> {
    Ok(fs::read_to_string(path)?.lines().count())
}

#[test]
fn task_config_defaults() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    let config = write_config(directory.path(), "luong")?;

    assert_eq!(config.special_tokens.unk, 3);
    assert!(config.option.bidirectional);
    assert!(config.option.reverse_source);
    assert_eq!(config.option.early_stopping_window, 5);
    assert!(config.option.max_gradient_norm.is_none());
    assert_eq!(config.option.model_config().decoder_hidden_size(), 16);
    config.validate()?;
    Ok(())
}

#[test]
fn invalid_configuration_is_rejected() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    let mut config = write_config(directory.path(), "luong")?;
    config.option.batch_size = 0;
    assert!(matches!(
        config.validate(),
        Err(NmtError::InvalidConfigurationError(_))
    ));

    config.option.batch_size = 2;
    config.option.early_stopping_window = 1;
    assert!(matches!(
        config.validate(),
        Err(NmtError::InvalidConfigurationError(_))
    ));

    config.option.early_stopping_window = 2;
    config.validate()?;
    for max_gradient_norm in [0.0, -1.0].iter() {
        config.option.max_gradient_norm = Some(*max_gradient_norm);
        assert!(matches!(
            config.validate(),
            Err(NmtError::InvalidConfigurationError(_))
        ));
    }
    config.option.max_gradient_norm = Some(5.0);
    config.validate()?;

    fs::write(directory.path().join("broken.json"), "{\"option\": {}}")?;
    assert!(matches!(
        TaskConfig::from_file(directory.path().join("broken.json")),
        Err(NmtError::InvalidConfigurationError(_))
    ));
    Ok(())
}

#[test]
fn unknown_mode_is_rejected() {
    assert!(matches!(
        "predict".parse::<Mode>(),
        Err(NmtError::InvalidModeError(_))
    ));
}

#[test]
fn loss_frequency_follows_step_budget() {
    assert_eq!(loss_frequency(1, 4, 2), (3, 1));
    assert_eq!(loss_frequency(10, 1000, 32), (320, 3));
}

#[test]
fn model_directory_preparation() -> anyhow::Result<()> {
    let root = tempfile::tempdir()?;
    let directory = root.path().join("model");

    let mut output = Vec::new();
    let decision = prepare_model_directory(&directory, &mut Cursor::new(""), &mut output)?;
    assert_eq!(decision, DirectoryDecision::Created);
    assert!(directory.is_dir());

    fs::write(directory.join("model.ot"), "stale")?;
    let decision =
        prepare_model_directory(&directory, &mut Cursor::new("nope\nyes\n"), &mut output)?;
    assert_eq!(decision, DirectoryDecision::Overwritten);
    assert!(directory.is_dir());
    assert!(!directory.join("model.ot").exists());

    fs::write(directory.join("model.ot"), "kept")?;
    let decision = prepare_model_directory(&directory, &mut Cursor::new(""), &mut output)?;
    assert_eq!(decision, DirectoryDecision::Declined);
    assert!(directory.join("model.ot").exists());
    Ok(())
}

#[test]
fn train_then_evaluate() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    write_corpora(directory.path(), 4)?;

    for attention in ["luong", "bahdanau"].iter() {
        let config = write_config(directory.path(), attention)?;
        let artifacts = ModelArtifacts::new(directory.path().join(format!("model_{}", attention)));
        let task = TranslationTask::new(config.clone(), artifacts.clone(), false)
            .with_progress_bar(false);

        let outcome = task.run(Mode::Train, &mut Cursor::new(""), &mut Vec::new())?;
        match outcome {
            TaskOutcome::Trained {
                training,
                evaluation,
            } => {
                assert_eq!(training.status, TrainingStatus::Finished);
                assert!(training.status.is_terminal());
                assert_eq!(training.epochs, 1);
                assert_eq!(training.global_step, 2);
                assert!(training.loss_log.iter().all(|loss| loss.is_finite()));
                assert!(training.final_loss().is_some());
                assert_eq!(training.batch_loss_log.len(), 1);
                assert!(evaluation.mean_loss.is_finite());
                assert_eq!(evaluation.len(), 4);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        for path in [
            artifacts.model_path(),
            artifacts.source_dictionary_path(),
            artifacts.source_reverse_dictionary_path(),
            artifacts.target_dictionary_path(),
            artifacts.target_reverse_dictionary_path(),
            artifacts.global_loss_path(),
            artifacts.batch_loss_path(),
            artifacts.log_path(),
        ]
        .iter()
        {
            assert!(path.is_file(), "missing {}", path.display());
        }
        assert_eq!(line_count(&artifacts.evaluate_input_path())?, 4);
        assert_eq!(line_count(&artifacts.evaluate_predict_path())?, 4);
        assert_eq!(
            fs::read_to_string(artifacts.evaluate_input_path())?
                .lines()
                .next(),
            Some("a b c")
        );

        fs::remove_file(artifacts.evaluate_predict_path())?;
        let task = TranslationTask::new(config, artifacts.clone(), false);
        match task.run(Mode::Eval, &mut Cursor::new(""), &mut Vec::new())? {
            TaskOutcome::Evaluated(evaluation) => {
                assert_eq!(evaluation.len(), 4);
                assert!(evaluation.mean_loss.is_finite());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(line_count(&artifacts.evaluate_predict_path())?, 4);
    }
    Ok(())
}

#[test]
fn declined_overwrite_does_nothing() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    write_corpora(directory.path(), 4)?;
    let config = write_config(directory.path(), "luong")?;
    let artifacts = ModelArtifacts::new(directory.path().join("existing"));
    fs::create_dir_all(artifacts.directory())?;

    let task = TranslationTask::new(config, artifacts.clone(), false).with_progress_bar(false);
    let outcome = task.run(Mode::Train, &mut Cursor::new("no\n"), &mut Vec::new())?;

    assert!(matches!(outcome, TaskOutcome::Declined));
    assert!(!artifacts.model_path().exists());
    Ok(())
}

#[test]
fn evaluation_without_checkpoint_fails() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    write_corpora(directory.path(), 4)?;
    let config = write_config(directory.path(), "luong")?;
    let task = TranslationTask::new(
        config,
        ModelArtifacts::new(directory.path().join("missing")),
        false,
    );
    assert!(task
        .run(Mode::Eval, &mut Cursor::new(""), &mut Vec::new())
        .is_err());
    Ok(())
}

#[test]
fn early_stopping_skips_loss_curves() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    write_corpora(directory.path(), 4)?;
    let mut config = write_config(directory.path(), "luong")?;
    // any improvement is below the threshold, stop on the first pass after the halfway mark
    config.option.train_step = 4;
    config.option.early_stopping_window = 2;
    config.option.early_stopping_threshold = 100.0;
    config.validate()?;
    let artifacts = ModelArtifacts::new(directory.path().join("stopped"));
    let task = TranslationTask::new(config, artifacts.clone(), false).with_progress_bar(false);

    match task.run(Mode::Train, &mut Cursor::new(""), &mut Vec::new())? {
        TaskOutcome::Trained {
            training,
            evaluation,
        } => {
            assert_eq!(training.status, TrainingStatus::EarlyStopped);
            assert!(training.status.is_terminal());
            assert_eq!(training.epochs, 4);
            assert_eq!(training.global_step, 8);
            assert_eq!(training.batch_loss_log.len(), 4);
            assert_eq!(evaluation.len(), 4);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    for path in [
        artifacts.model_path(),
        artifacts.source_dictionary_path(),
        artifacts.source_reverse_dictionary_path(),
        artifacts.target_dictionary_path(),
        artifacts.target_reverse_dictionary_path(),
    ]
    .iter()
    {
        assert!(path.is_file(), "missing {}", path.display());
    }
    assert!(!artifacts.global_loss_path().exists());
    assert!(!artifacts.batch_loss_path().exists());
    assert_eq!(line_count(&artifacts.evaluate_predict_path())?, 4);
    Ok(())
}

#[test]
fn uneven_corpus_is_fully_covered() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    write_corpora(directory.path(), 5)?;
    let config = write_config(directory.path(), "bahdanau")?;
    let artifacts = ModelArtifacts::new(directory.path().join("uneven"));
    let task =
        TranslationTask::new(config.clone(), artifacts.clone(), false).with_progress_bar(false);

    match task.run(Mode::Train, &mut Cursor::new(""), &mut Vec::new())? {
        TaskOutcome::Trained {
            training,
            evaluation,
        } => {
            assert_eq!(training.status, TrainingStatus::Finished);
            // the last batch wraps around to the first pair
            assert_eq!(training.global_step, 3);
            assert_eq!(training.loss_log.len(), 3);
            assert_eq!(training.batch_loss_log.len(), 1);
            assert_eq!(evaluation.len(), 5);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(line_count(&artifacts.evaluate_input_path())?, 5);
    assert_eq!(line_count(&artifacts.evaluate_predict_path())?, 5);
    assert_eq!(
        fs::read_to_string(artifacts.evaluate_input_path())?
            .lines()
            .last(),
        Some("a c")
    );

    let task = TranslationTask::new(config, artifacts.clone(), false);
    match task.run(Mode::Eval, &mut Cursor::new(""), &mut Vec::new())? {
        TaskOutcome::Evaluated(evaluation) => assert_eq!(evaluation.len(), 5),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(line_count(&artifacts.evaluate_predict_path())?, 5);
    Ok(())
}

#[test]
fn evaluator_rejects_zero_batch_size() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    write_corpora(directory.path(), 4)?;
    let config = write_config(directory.path(), "luong")?;
    let special_token_ids = config.special_tokens;
    let source_vocabulary = Vocabulary::build(
        read_words(directory.path().join("train.src"))?,
        20,
        special_token_ids,
    )?;
    let target_vocabulary = Vocabulary::build(
        read_words(directory.path().join("train.tgt"))?,
        20,
        special_token_ids,
    )?;
    let test_corpus = ParallelCorpus::from_files(
        directory.path().join("test.src"),
        directory.path().join("test.tgt"),
        &source_vocabulary,
        &target_vocabulary,
    )?;
    let translation_model = TranslationModel::new(&config.option.model_config(), Device::Cpu);

    let evaluator = Seq2SeqEvaluator::new(&translation_model, 5, 0, true, special_token_ids);
    assert!(matches!(
        evaluator.evaluate(&test_corpus, &source_vocabulary, &target_vocabulary),
        Err(NmtError::ValueError(_))
    ));
    Ok(())
}
