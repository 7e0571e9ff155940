//! Measurements of experiment matrix generation.

use std::path::Path;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hivebatch_core::materialize::BatchSettings;
use hivebatch_core::variables::{generate, GenContext};
use hivebatch_core::xml::Document;
use hivebatch_core::{criteria, AuxConfig, Materializer, MutationSet, ScenarioSpec};

criterion_group!(matrix, generate_sets, build_units);
criterion_main!(matrix);

const TEMPLATE: &str = include_str!("../tests/data/main.xml");

/// Measures criteria parsing plus mutation set generation for a large
/// density sweep.
fn generate_sets(c: &mut Criterion) {
    let aux = AuxConfig::default();
    let scenario = ScenarioSpec::parse("QS.24x24", 4).unwrap();
    let ctx = GenContext::new(&aux, &scenario);
    c.bench_function("generate_density_c64", |b| {
        b.iter(|| {
            let desc = criteria::parse(black_box("population_density.CD0p5.I8.C64")).unwrap();
            generate(&desc, &ctx).unwrap()
        })
    });
}

/// Measures applying mutation sets to the template in memory.
fn build_units(c: &mut Criterion) {
    let aux = AuxConfig::default();
    let scenario = ScenarioSpec::parse("QS.24x24", 4).unwrap();
    let ctx = GenContext::new(&aux, &scenario);
    let desc = criteria::parse("population_size.Log1024").unwrap();
    let sets: Vec<MutationSet> = generate(&desc, &ctx).unwrap();
    let materializer = Materializer::from_document(
        Document::parse(TEMPLATE).unwrap(),
        "main",
        Path::new("/tmp/hivebatch-bench"),
        BatchSettings::default(),
    );
    c.bench_function("build_units_log1024", |b| {
        b.iter(|| {
            for (i, set) in sets.iter().enumerate() {
                materializer.build_unit(i, &scenario, set).unwrap();
            }
        })
    });
}
