//! Benchmarks for endorsement advancement.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use endorseflow::core::StagePosition;
use endorseflow::pipeline::plan_reorder;
use endorseflow::testing::PipelineFixture;

fn advance_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let fixture = PipelineFixture::new();
    let stages = runtime
        .block_on(fixture.seed_standard_stages())
        .expect("seed stages");
    let actor = fixture.actor();

    c.bench_function("create_and_advance_to_terminal", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let endorsement = fixture.create_at(stages.research.id).await.expect("create");
                fixture
                    .pipeline
                    .advance(endorsement.id, stages.interview.id, None, &actor)
                    .await
                    .expect("advance");
                black_box(
                    fixture
                        .pipeline
                        .advance(endorsement.id, stages.endorsed.id, None, &actor)
                        .await
                        .expect("lock"),
                )
            })
        });
    });

    let all = stages.all();
    let reversed: Vec<_> = all
        .iter()
        .rev()
        .enumerate()
        .map(|(i, s)| StagePosition::new(s.id, i32::try_from(i).unwrap_or(i32::MAX)))
        .collect();
    c.bench_function("plan_reorder_reverse", |b| {
        b.iter(|| black_box(plan_reorder(&all, &reversed)));
    });
}

criterion_group!(benches, advance_benchmark);
criterion_main!(benches);
