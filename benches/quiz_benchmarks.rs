use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::SmallRng;

use lecquiz::catalog::{Binding, Bindings, Question};
use lecquiz::engine::template::expand;
use lecquiz::engine::unlock::best_record;
use lecquiz::generator::{DemoBackend, prepare};
use lecquiz::session::result::ProgressRecord;

fn make_records(count: usize) -> Vec<ProgressRecord> {
    (0..count)
        .map(|i| {
            serde_json::from_value(serde_json::json!({
                "email": "a@example.com", "levelId": "level-1",
                "correctCount": i % 4, "totalQuestions": 3,
                "correctRate": [0, 33, 67, 100][i % 4],
                "skipCount": (i % 3) as u32, "errorCount": 0,
                "fraudCount": (i % 5 == 0) as u32,
                "perfectWithoutSkip": false, "elapsedTime": 60,
                "startTime": 1_700_000_000_000i64 + i as i64 * 1000,
                "endTime": 1_700_000_060_000i64 + i as i64 * 1000
            }))
            .unwrap()
        })
        .collect()
}

fn bench_expand(c: &mut Criterion) {
    let mut bindings = Bindings::new();
    bindings.insert("R".into(), Binding::Number(47.0));
    bindings.insert("I".into(), Binding::Number(1.5));
    bindings.insert("unit".into(), Binding::Text("V".into()));
    let template = "A {{R}} Ω resistor carries {{I}} A: {{R * I}} {{unit}}, {{(R + 3) / (I * 2)}}";

    c.bench_function("expand (4 placeholders)", |b| {
        b.iter(|| expand(black_box(template), black_box(&bindings)))
    });
}

fn bench_prepare(c: &mut Criterion) {
    let mut bank: Vec<Question> = Vec::new();
    for questions in DemoBackend::questions().unwrap().into_values() {
        bank.extend(questions);
    }
    let mut rng = SmallRng::seed_from_u64(7);

    c.bench_function("prepare (demo bank, shuffled)", |b| {
        b.iter(|| prepare(black_box(&bank), true, &mut rng))
    });
}

fn bench_best_record(c: &mut Criterion) {
    let records = make_records(200);

    c.bench_function("best_record (200 attempts)", |b| {
        b.iter(|| best_record(black_box(&records)))
    });
}

criterion_group!(benches, bench_expand, bench_prepare, bench_best_record);
criterion_main!(benches);
