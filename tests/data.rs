use rust_nmt::data::{
    batches_per_pass, batchnize, read_data, read_words, ParallelCorpus, SequenceFramer,
    SpecialTokenIds, Vocabulary, BOS_TOKEN, EOS_TOKEN, PAD_TOKEN, UNK_TOKEN,
};
use rust_nmt::NmtError;
use std::collections::HashSet;
use std::convert::TryFrom;
use std::fs;
use tch::Device;

const CORPUS: &str = "the cat sat on the mat\nthe dog ate the cat\na bird sang\n";

#[test]
fn vocabulary_respects_requested_size() -> anyhow::Result<()> {
    let words: Vec<&str> = CORPUS.split_whitespace().collect();
    for size in 4..15 {
        let vocabulary = Vocabulary::build(&words, size, SpecialTokenIds::default())?;
        assert!(vocabulary.len() <= size);
        let ids: HashSet<i64> = (0..size as i64)
            .filter(|id| vocabulary.id_to_token(*id).is_some())
            .collect();
        assert_eq!(ids.len(), vocabulary.len());
    }
    Ok(())
}

#[test]
fn vocabulary_reserved_ids_are_bijective() -> anyhow::Result<()> {
    let special_token_ids = SpecialTokenIds {
        pad: 5,
        bos: 0,
        eos: 7,
        unk: 2,
    };
    let words: Vec<&str> = CORPUS.split_whitespace().collect();
    let vocabulary = Vocabulary::build(&words, 10, special_token_ids)?;

    for (token, id) in [
        (PAD_TOKEN, 5),
        (BOS_TOKEN, 0),
        (EOS_TOKEN, 7),
        (UNK_TOKEN, 2),
    ]
    .iter()
    {
        assert_eq!(vocabulary.token_to_id(token), *id);
        assert_eq!(vocabulary.id_to_token(*id), Some(*token));
    }
    // "the" is the most frequent word and takes the smallest free id
    assert_eq!(vocabulary.token_to_id("the"), 1);
    assert_eq!(vocabulary.token_to_id("cat"), 3);
    assert_eq!(vocabulary.token_to_id("zebra"), 2);
    Ok(())
}

#[test]
fn vocabulary_rejects_invalid_reserved_ids() {
    let duplicated = SpecialTokenIds {
        pad: 0,
        bos: 0,
        eos: 1,
        unk: 2,
    };
    assert!(matches!(
        Vocabulary::build(vec!["a"], 10, duplicated),
        Err(NmtError::InvalidConfigurationError(_))
    ));
    assert!(matches!(
        Vocabulary::build(vec!["a"], 3, SpecialTokenIds::default()),
        Err(NmtError::InvalidConfigurationError(_))
    ));
}

#[test]
fn vocabulary_detokenization() -> anyhow::Result<()> {
    let words: Vec<&str> = CORPUS.split_whitespace().collect();
    let vocabulary = Vocabulary::build(&words, 20, SpecialTokenIds::default())?;

    let sentence = "the dog sat on the mat";
    let ids = vocabulary.encode_sentence(sentence);
    assert_eq!(vocabulary.decode_to_string(&ids), sentence);

    let mut framed: Vec<i64> = vec![1];
    framed.extend(ids.iter());
    framed.extend([2, 0, 0].iter());
    framed.push(ids[0]);
    assert_eq!(vocabulary.decode_to_string(&framed), sentence);
    Ok(())
}

#[test]
fn vocabulary_save_load() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    let dictionary_path = directory.path().join("source_dictionary.json");
    let reverse_dictionary_path = directory.path().join("source_reverse_dictionary.json");

    let words: Vec<&str> = CORPUS.split_whitespace().collect();
    let vocabulary = Vocabulary::build(&words, 12, SpecialTokenIds::default())?;
    vocabulary.save(&dictionary_path, &reverse_dictionary_path)?;
    let restored = Vocabulary::load(
        &dictionary_path,
        &reverse_dictionary_path,
        SpecialTokenIds::default(),
    )?;
    assert_eq!(restored, vocabulary);

    let other_special_token_ids = SpecialTokenIds {
        pad: 1,
        bos: 0,
        eos: 2,
        unk: 3,
    };
    assert!(Vocabulary::load(
        &dictionary_path,
        &reverse_dictionary_path,
        other_special_token_ids
    )
    .is_err());
    Ok(())
}

#[test]
fn corpus_files_are_read_line_by_line() -> anyhow::Result<()> {
    let directory = tempfile::tempdir()?;
    let source_path = directory.path().join("train.src");
    let target_path = directory.path().join("train.tgt");
    fs::write(&source_path, CORPUS)?;
    fs::write(&target_path, "le chat\nle chien\nun oiseau\n")?;

    let sentences = read_data(&source_path)?;
    assert_eq!(sentences.len(), 3);
    assert_eq!(sentences[2], vec!["a", "bird", "sang"]);
    assert_eq!(read_words(&source_path)?.len(), 14);

    let source_vocabulary =
        Vocabulary::build(read_words(&source_path)?, 20, SpecialTokenIds::default())?;
    let target_vocabulary =
        Vocabulary::build(read_words(&target_path)?, 20, SpecialTokenIds::default())?;
    let corpus = ParallelCorpus::from_files(
        &source_path,
        &target_path,
        &source_vocabulary,
        &target_vocabulary,
    )?;
    assert_eq!(corpus.len(), 3);
    assert_eq!(corpus.target()[1].len(), 2);

    fs::write(&target_path, "le chat\n")?;
    assert!(ParallelCorpus::from_files(
        &source_path,
        &target_path,
        &source_vocabulary,
        &target_vocabulary
    )
    .is_err());
    Ok(())
}

#[test]
fn batcher_visits_every_example_in_a_pass() -> anyhow::Result<()> {
    let examples: Vec<usize> = (0..10).collect();
    for batch_size in 1..13 {
        let mut offset = 0;
        let mut seen = HashSet::new();
        let passes = batches_per_pass(examples.len(), batch_size);
        for call in 0..passes {
            let minibatch = batchnize(&examples, batch_size, offset)?;
            assert_eq!(minibatch.examples.len(), batch_size);
            seen.extend(minibatch.examples.iter().map(|example| **example));
            offset = minibatch.next_offset;
            assert_eq!(minibatch.completes_pass, call == passes - 1);
        }
        assert_eq!(seen.len(), examples.len());
        assert_eq!(offset == 0, examples.len() % batch_size == 0);
    }
    Ok(())
}

#[test]
fn batcher_wraps_around() -> anyhow::Result<()> {
    let examples = vec!['a', 'b', 'c', 'd', 'e'];
    let minibatch = batchnize(&examples, 3, 3)?;
    assert_eq!(minibatch.examples, vec![&'d', &'e', &'a']);
    assert_eq!(minibatch.next_offset, 1);
    assert!(minibatch.completes_pass);

    let empty: Vec<char> = vec![];
    assert!(batchnize(&empty, 3, 0).is_err());
    assert!(batchnize(&examples, 0, 0).is_err());
    Ok(())
}

#[test]
fn framer_shifts_decoder_inputs_and_labels() -> anyhow::Result<()> {
    let special_token_ids = SpecialTokenIds::default();
    let framer = SequenceFramer::new(5, false, special_token_ids);
    let source: Vec<Vec<i64>> = vec![vec![4, 5, 6, 7, 8, 9, 10], vec![11]];
    let target: Vec<Vec<i64>> = vec![vec![12, 13, 14], vec![15, 16, 17, 18, 19, 20]];
    let framed = framer.frame_ids(&source, &target)?;

    assert_eq!(framed.encoder_inputs[0], vec![4, 5, 6, 7, 8]);
    assert_eq!(framed.encoder_inputs[1], vec![11, 0, 0, 0, 0]);
    for (row, sentence) in target.iter().enumerate() {
        let inputs = &framed.decoder_inputs[row];
        let labels = &framed.decoder_labels[row];
        assert_eq!(inputs[0], special_token_ids.bos);
        let shifted = sentence.len().min(4);
        assert_eq!(inputs[1..=shifted], labels[..shifted]);
        let mut expected_labels = sentence.clone();
        expected_labels.push(special_token_ids.eos);
        expected_labels.resize(8, special_token_ids.pad);
        assert_eq!(labels[..], expected_labels[..5]);
    }
    Ok(())
}

#[test]
fn framer_builds_time_major_tensors() -> anyhow::Result<()> {
    let framer = SequenceFramer::new(4, true, SpecialTokenIds::default());
    let source: Vec<Vec<i64>> = vec![vec![4, 5, 6], vec![7, 8]];
    let target: Vec<Vec<i64>> = vec![vec![9], vec![10, 11]];
    let batch = framer.frame(&source, &target, Device::Cpu)?;

    assert_eq!(batch.encoder_inputs.size(), vec![4, 2]);
    assert_eq!(batch.batch_size(), 2);
    assert_eq!(batch.max_time(), 4);
    let first_column = Vec::<i64>::try_from(batch.encoder_inputs.select(1, 0).contiguous())?;
    assert_eq!(first_column, vec![6, 5, 4, 0]);
    let second_labels = Vec::<i64>::try_from(batch.decoder_labels.select(1, 1).contiguous())?;
    assert_eq!(second_labels, vec![10, 11, 2, 0]);

    assert!(framer.frame(&source, &target[..1], Device::Cpu).is_err());
    Ok(())
}
