//! Performance benchmarks for the directive scanner.
//!
//! Measures scanning throughput over synthetic annotated headers of
//! increasing class counts, and a full scan → emit run.

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;

use pyglue::{Generator, ModuleBuilder, Scanner};

/// Build a synthetic annotated header with `classes` wrapped classes.
fn synthetic_header(classes: usize) -> String {
    let mut header = String::from("#define MAX_SIZE 1024\n#define NAMESPACE \"test:\"\n\n");
    for i in 0..classes {
        header.push_str(&format!(
            "// Class number {i}.\nCLASS(Class{i}, )\n  char *name;\n  uint64_t size;\n\n  Class{i} METHOD(Class{i}, Con, char *urn, int mode);\n\n  // Reads data.\n  int METHOD(Class{i}, read, OUT char *buffer, int length);\n  uint64_t METHOD(Class{i}, seek, uint64_t offset, int whence);\nEND_CLASS\n\n"
        ));
    }
    header
}

fn scanner_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("scanner/class_counts");

    for classes in [1usize, 10, 50] {
        let header = synthetic_header(classes);
        group.throughput(Throughput::Bytes(header.len() as u64));
        group.bench_function(format!("classes_{classes}"), |b| {
            b.iter(|| {
                let mut scanner = Scanner::new(ModuleBuilder::new("benchmod"));
                scanner.scan(black_box(&header));
                black_box(scanner.into_builder())
            });
        });
    }

    group.finish();
}

fn emit_benchmarks(c: &mut Criterion) {
    let header = synthetic_header(25);
    c.bench_function("scan_and_emit/classes_25", |b| {
        b.iter(|| {
            let mut generator = Generator::new("benchmod");
            generator.parse_source("bench.h", black_box(&header));
            black_box(generator.generate().unwrap().len())
        });
    });
}

criterion_group!(benches, scanner_benchmarks, emit_benchmarks);
criterion_main!(benches);
