use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::{criterion_group, criterion_main};

use phylonj::builder::{build_tree, Method};
use phylonj::distance::{DistanceMatrix, DistanceModel, DistanceOptions, SequenceRecord};
use phylonj::progress::NoProgress;
use phylonj::simulate::{generate_tree, Distr};
use phylonj::tree::root_the_tree;
use rand::prelude::*;

fn random_matrix(n_leaves: usize) -> DistanceMatrix {
    generate_tree(n_leaves, true, Distr::Uniform)
        .unwrap()
        .distance_matrix()
        .unwrap()
}

fn random_alignment(n_sequences: usize, n_sites: usize) -> Vec<SequenceRecord> {
    let mut rng = thread_rng();
    let reference: Vec<u8> = (0..n_sites).map(|_| *b"ACGT".choose(&mut rng).unwrap()).collect();
    (0..n_sequences)
        .map(|i| {
            let mut residues = reference.clone();
            for site in residues.iter_mut() {
                if rng.gen_bool(0.1) {
                    *site = *b"ACGT".choose(&mut rng).unwrap();
                }
            }
            SequenceRecord::new(&format!("seq{i}"), &residues)
        })
        .collect()
}

fn builders(c: &mut Criterion) {
    for n_leaves in [50, 200] {
        let matrix = random_matrix(n_leaves);
        for method in [Method::NeighborJoining, Method::Upgma] {
            c.bench_with_input(
                BenchmarkId::new(format!("{method:?}"), n_leaves),
                &matrix,
                |b, m| {
                    b.iter(|| build_tree(m, method, &NoProgress).unwrap());
                },
            );
        }
    }
}

fn rooting(c: &mut Criterion) {
    let matrix = random_matrix(200);
    let tree = build_tree(&matrix, Method::NeighborJoining, &NoProgress)
        .unwrap()
        .unwrap();

    c.bench_with_input(BenchmarkId::new("root_the_tree", 200), &tree, |b, t| {
        b.iter(|| root_the_tree(t.clone()).unwrap());
    });
}

fn sequence_distances(c: &mut Criterion) {
    let records = random_alignment(100, 1000);

    c.bench_with_input(
        BenchmarkId::new("jukes_cantor", records.len()),
        &records,
        |b, r| {
            b.iter(|| {
                DistanceMatrix::from_sequences(
                    r,
                    DistanceModel::JukesCantor,
                    DistanceOptions::default(),
                    &NoProgress,
                )
                .unwrap()
            });
        },
    );
}

criterion_group!(benches, builders, rooting, sequence_distances);
criterion_main!(benches);
