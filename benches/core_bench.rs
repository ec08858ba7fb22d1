//! Benchmarks for upset's hot paths.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use indexmap::IndexMap;
use serde_json::{json, Value};
use std::path::Path;
use upset::core::artifacts::unique_file_name;
use upset::core::expander::expand_value;
use upset::core::parser::parse_plan;
use upset::core::types::Binding;
use upset::resources::template::substitute;

fn bench_template_substitute(c: &mut Criterion) {
    let mut subs = IndexMap::new();
    subs.insert("user".to_string(), "deploy".to_string());
    subs.insert("home".to_string(), "/home/deploy".to_string());

    let mut group = c.benchmark_group("template_substitute");
    for lines in [10, 100, 1000] {
        let text = "export PATH=$home/bin:$PATH # owned by ${user}, costs $$5\n".repeat(lines);
        group.bench_with_input(BenchmarkId::from_parameter(lines), &text, |b, text| {
            b.iter(|| black_box(substitute(black_box(text), &subs)));
        });
    }
    group.finish();
}

fn nested_tree(width: usize) -> Value {
    let entries: Vec<Value> = (0..width)
        .map(|i| {
            json!({
                "path": format!("/home/{{user}}/dir{i}"),
                "ensure": "dir",
                "permissions": "{user},{group},700",
                "backup": true,
                "nested": {"target": "/srv/{group}/{user}", "n": i}
            })
        })
        .collect();
    json!({ "paths": entries })
}

fn bench_expand(c: &mut Criterion) {
    let mut binding = Binding::new();
    binding.insert("user".to_string(), "user1".to_string());
    binding.insert("group".to_string(), "group1".to_string());

    let mut group = c.benchmark_group("expand_value");
    for width in [1, 16, 128] {
        let tree = nested_tree(width);
        group.bench_with_input(BenchmarkId::from_parameter(width), &tree, |b, tree| {
            b.iter(|| black_box(expand_value(black_box(tree), &binding).unwrap()));
        });
    }
    group.finish();
}

fn bench_plan_parse(c: &mut Criterion) {
    let yaml = r#"
- name: base directories
  plugin: paths
  foreach:
    - user: alice
      group: staff
    - user: bob
      group: staff
  variables:
    paths:
      - path: /home/{user}/.config
        ensure: path
        permissions: "/-/-/{user},{group},700"
      - path: /home/{user}/.profile
        ensure: file
        template: profile
        mode: update
  files:
    profile: ./templates/profile
- name: motd
  plugin: paths
  variables:
    paths:
      - path: /etc/motd
        ensure: in_file
        text: "Managed by upset\n"
"#;
    let json = serde_json::to_string(&serde_yaml_ng::from_str::<Value>(yaml).unwrap()).unwrap();

    c.bench_function("plan_parse_yaml", |b| {
        b.iter(|| black_box(parse_plan(black_box(yaml), Path::new("plan.yaml"), false).unwrap()));
    });
    c.bench_function("plan_parse_json", |b| {
        b.iter(|| black_box(parse_plan(black_box(&json), Path::new("plan.json"), true).unwrap()));
    });
}

fn bench_unique_file_name(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("template");
    std::fs::write(&path, "Hello, $user!").unwrap();

    c.bench_function("unique_file_name", |b| {
        b.iter(|| black_box(unique_file_name(black_box(&path)).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_template_substitute,
    bench_expand,
    bench_plan_parse,
    bench_unique_file_name
);
criterion_main!(benches);
