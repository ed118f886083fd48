//! Benchmarks for content matching and filename parsing.
//!
//! Benchmark targets:
//! - Single rule against a page of text: <100us (fuzzy: <2ms)
//! - 100 tags against a page of text: <10ms
//! - Filename grammar parse: <20us

// Criterion macros generate items without docs - this is expected for benchmarks
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::path::Path;
use std::time::Duration;

use papertray::filename::FilenameParser;
use papertray::matching::partial_ratio;
use papertray::models::EntityId;
use papertray::{MatchRule, MatchingAlgorithm, Tag, match_entities};

const PAGE: &str = "ACME Corporation\nInvoice 2019-044\n\
    Date: 13.02.2018\nCustomer: Initech Ltd\n\
    Item                       Qty   Price\n\
    Paper, A4, 500 sheets       10   45,00\n\
    Toner cartridge              2  120,00\n\
    Total due: 1.234,00 EUR (net)\n\
    Thank you for your business. Please pay within 30 days.";

fn page(repeats: usize) -> String {
    vec![PAGE; repeats].join("\n\n")
}

fn tags(count: usize) -> Vec<Tag> {
    let algorithms = [
        MatchingAlgorithm::Any,
        MatchingAlgorithm::All,
        MatchingAlgorithm::Literal,
        MatchingAlgorithm::Regex,
    ];
    (0..count)
        .map(|i| Tag {
            id: EntityId::new(i64::try_from(i).unwrap_or(i64::MAX)),
            name: format!("tag{i:03}"),
            slug: format!("tag{i:03}"),
            rule: MatchRule::new(format!("keyword{i} invoice"), algorithms[i % algorithms.len()]),
            colour: 1,
        })
        .collect()
}

// ============================================================================
// Rule Benchmarks
// ============================================================================

fn bench_rule_algorithms(c: &mut Criterion) {
    let mut group = c.benchmark_group("rule_algorithms");
    group.measurement_time(Duration::from_secs(5));
    let text = page(1);

    let rules = [
        ("any", MatchRule::new("walmart target acme", MatchingAlgorithm::Any)),
        ("all", MatchRule::new("invoice \"total due\" toner", MatchingAlgorithm::All)),
        ("literal", MatchRule::new("toner cartridge", MatchingAlgorithm::Literal)),
        ("regex", MatchRule::new(r"invoice \d{4}-\d{3}", MatchingAlgorithm::Regex)),
        ("fuzzy", MatchRule::new("Initech Limited", MatchingAlgorithm::Fuzzy)),
    ];

    for (name, rule) in &rules {
        group.bench_with_input(BenchmarkId::new("match", name), &text, |b, text| {
            b.iter(|| rule.matches(black_box(text)));
        });
    }

    group.finish();
}

fn bench_tag_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("tag_scaling");
    let text = page(4);

    for count in [1usize, 10, 50, 100] {
        let tags = tags(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("tags", count), &tags, |b, tags| {
            b.iter(|| match_entities(black_box(tags), black_box(&text)));
        });
    }

    group.finish();
}

fn bench_partial_ratio(c: &mut Criterion) {
    let mut group = c.benchmark_group("partial_ratio");

    for repeats in [1usize, 4, 16] {
        let text = page(repeats);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_with_input(BenchmarkId::new("pages", repeats), &text, |b, text| {
            b.iter(|| partial_ratio(black_box("initech limited"), black_box(text)));
        });
    }

    group.finish();
}

// ============================================================================
// Filename Benchmarks
// ============================================================================

fn bench_filename_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("filename_parsing");
    let parser = FilenameParser::default();

    let names = [
        ("title", "Invoice.pdf"),
        ("correspondent_title", "ACME - Invoice 42.pdf"),
        ("full", "20180213Z - ACME - Invoice - bills,tax,2018.pdf"),
    ];

    for (name, file) in names {
        group.bench_with_input(BenchmarkId::new("parse", name), &file, |b, file| {
            b.iter(|| parser.parse(black_box(Path::new(file))));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_rule_algorithms,
    bench_tag_scaling,
    bench_partial_ratio,
    bench_filename_parsing
);
criterion_main!(benches);
