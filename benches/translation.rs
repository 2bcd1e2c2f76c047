//! Translation Pipeline Performance Benchmarks
//!
//! Benchmarks for the text processing around a model response.
//! These benchmarks measure the performance of:
//! - Micro-format parsing
//! - SQL validation with identifier quoting
//! - Prompt construction with a large context

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use parley::engine::context::QuoteStyle;
use parley::translator::{build_prompt, parse_response, Mode, TranslationRequest};
use parley::validation::validate_sql;

fn bench_parse_response(c: &mut Criterion) {
    let response = "Here you go.\nCommand: kubectl get pods --all-namespaces -o wide\n\
                    Suggested next steps:\n1. Describe the failing pod\n2. Show its logs\n\
                    3. Restart the deployment\n4. Scale the deployment";

    c.bench_function("parse_response", |b| {
        b.iter(|| parse_response(black_box(response)).unwrap());
    });
}

fn bench_validate_sql(c: &mut Criterion) {
    let simple = "SELECT id FROM users";
    let camel = "SELECT userId, firstName, lastName FROM \"UserAccounts\" \
                 WHERE createdAt > '2024-01-01' AND note <> 'isActive' -- lastLogin\n\
                 ORDER BY lastLogin DESC";

    c.bench_function("validate_sql_simple", |b| {
        b.iter(|| validate_sql(black_box(simple), QuoteStyle::DoubleQuote).unwrap());
    });

    c.bench_function("validate_sql_camel_case", |b| {
        b.iter(|| validate_sql(black_box(camel), QuoteStyle::DoubleQuote).unwrap());
    });
}

fn bench_build_prompt(c: &mut Criterion) {
    let context = (0..200)
        .map(|i| format!("Table public.table_{i}: id (integer), name (text), created_at (timestamp)"))
        .collect::<Vec<_>>()
        .join("\n");
    let request = TranslationRequest {
        prompt: "how many rows were created yesterday".to_string(),
        command_label: "SQL query".to_string(),
        context,
    };

    c.bench_function("build_prompt_200_tables", |b| {
        b.iter(|| build_prompt(black_box(&request), Mode::Command));
    });
}

criterion_group!(benches, bench_parse_response, bench_validate_sql, bench_build_prompt);
criterion_main!(benches);
