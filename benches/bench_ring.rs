use std::{
  hint::black_box,
  sync::Arc,
  thread,
};

use arenabuf_ring::Ring;
use criterion::{
  BenchmarkId,
  Criterion,
  criterion_group,
  criterion_main,
};

fn bench_ring_push_pop(c: &mut Criterion) {
  let mut group = c.benchmark_group("ring_push_pop");

  for capacity in [64, 512] {
    group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, &cap| {
      let ring = Ring::new(cap);
      b.iter(|| {
        for i in 0..cap {
          let _ = ring.push(black_box(i));
        }
        while let Some(value) = ring.pop() {
          black_box(value);
        }
      });
    });
  }

  group.finish();
}

fn bench_ring_contended(c: &mut Criterion) {
  c.bench_function("ring_four_producers", |b| {
    b.iter(|| {
      let ring = Arc::new(Ring::new(4096));
      let producers: Vec<_> = (0..4)
        .map(|_| {
          let ring = Arc::clone(&ring);
          thread::spawn(move || {
            for i in 0..1000usize {
              let _ = ring.push(i);
            }
          })
        })
        .collect();
      for producer in producers {
        let _ = producer.join();
      }
      black_box(ring.len());
    });
  });
}

criterion_group!(benches, bench_ring_push_pop, bench_ring_contended);
criterion_main!(benches);
