#[macro_use]
extern crate criterion;

use criterion::{black_box, Criterion};
use rust_nmt::data::{SequenceFramer, SpecialTokenIds};
use rust_nmt::seq2seq::{sequence_cross_entropy, AttentionKind, Seq2SeqConfig, Seq2SeqModel};
use std::time::{Duration, Instant};
use tch::kind::Kind;
use tch::nn::OptimizerConfig;
use tch::{nn, no_grad, Device, Tensor};

fn bench_config(attention: AttentionKind) -> Seq2SeqConfig {
    Seq2SeqConfig {
        source_vocab_size: 8000,
        target_vocab_size: 8000,
        embedding_size: 128,
        hidden_units: 256,
        layers: 2,
        bidirectional: true,
        attention,
        attention_layer_size: 256,
        dropout: 0.0,
        bridge_encoder_state: true,
    }
}

fn greedy_decode(iters: u64, model: &Seq2SeqModel, encoder_inputs: &Tensor) -> Duration {
    let mut duration = Duration::new(0, 0);
    for _i in 0..iters {
        let start = Instant::now();
        let _ = no_grad(|| model.greedy_decode(encoder_inputs, 1, 30));
        duration = duration.checked_add(start.elapsed()).unwrap();
    }
    duration
}

fn bench_seq2seq(c: &mut Criterion) {
    let device = Device::cuda_if_available();
    let framer = SequenceFramer::new(30, true, SpecialTokenIds::default());
    let source: Vec<Vec<i64>> = (0..64).map(|i| (4..20 + i % 10).collect()).collect();
    let target: Vec<Vec<i64>> = (0..64).map(|i| (4..18 + i % 12).collect()).collect();
    let batch = framer.frame(&source, &target, device).unwrap();

    for attention in [AttentionKind::Luong, AttentionKind::Bahdanau].iter() {
        let vs = nn::VarStore::new(device);
        let model = Seq2SeqModel::new(vs.root() / "seq2seq", &bench_config(*attention));
        let mut optimizer = nn::Adam::default().build(&vs, 1e-3).unwrap();

        c.bench_function(&format!("Training step ({:?})", attention), |b| {
            b.iter(|| {
                let output =
                    model.forward_t(&batch.encoder_inputs, &batch.decoder_inputs, true);
                let loss = sequence_cross_entropy(&output.logits, &batch.decoder_labels, None);
                optimizer.backward_step(&loss);
                black_box(loss.to_kind(Kind::Float))
            })
        });
        c.bench_function(&format!("Greedy decoding ({:?})", attention), |b| {
            b.iter_custom(|iters| black_box(greedy_decode(iters, &model, &batch.encoder_inputs)))
        });
    }
}

criterion_group! {
name = benches;
config = Criterion::default().sample_size(10);
targets = bench_seq2seq
}

criterion_main!(benches);
