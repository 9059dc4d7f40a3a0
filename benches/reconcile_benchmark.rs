use chrono::{TimeZone, Utc};
use criterion::{criterion_group, criterion_main, Criterion};
use fitfeed::feed::{reconcile, FeedEngine, PendingMutation};
use fitfeed::models::{Identity, Post, PostId};
use std::collections::{BTreeSet, HashMap};
use std::hint::black_box;

const FEED_SIZE: usize = 500;

/// A feed page where every tenth post shares its timestamp with the next.
fn snapshot() -> Vec<Post> {
    (0..FEED_SIZE)
        .map(|i| Post {
            id: PostId::new(format!("post-{i:04}")),
            author: Identity::new(format!("user{}@example.com", i % 37)),
            author_display_name: Some(format!("User {}", i % 37)),
            author_photo_ref: None,
            description: "Intervals".to_string(),
            photo_ref: format!("file:///{i}.jpg"),
            location_label: None,
            likes: (0..(i % 8))
                .map(|l| Identity::new(format!("fan{l}@example.com")))
                .collect::<BTreeSet<_>>(),
            created_at: Utc
                .timestamp_opt(1_700_000_000 + (i - i % 10 / 9) as i64, 0)
                .unwrap(),
        })
        .collect()
}

fn benchmark_reconcile(c: &mut Criterion) {
    let base = snapshot();
    let me = Identity::new("me@example.com");

    let pending: HashMap<PostId, PendingMutation> = base
        .iter()
        .step_by(25)
        .enumerate()
        .map(|(n, post)| {
            let mutation = if n % 4 == 0 {
                PendingMutation::Delete
            } else {
                PendingMutation::Like {
                    identity: me.clone(),
                    liked: true,
                }
            };
            (post.id.clone(), mutation)
        })
        .collect();

    let mut group = c.benchmark_group("feed_reconciliation");

    group.bench_function("reconcile_with_overlays", |b| {
        b.iter(|| reconcile(black_box(&base), black_box(&pending)))
    });

    group.bench_function("apply_snapshot_reversed", |b| {
        let mut reversed = base.clone();
        reversed.reverse();
        b.iter(|| {
            let mut engine = FeedEngine::new();
            engine.apply_snapshot(black_box(reversed.clone()));
            engine.posts().len()
        })
    });

    group.bench_function("optimistic_like_then_snapshot", |b| {
        let mut engine = FeedEngine::new();
        engine.apply_snapshot(base.clone());
        let target = base[FEED_SIZE / 2].id.clone();
        b.iter(|| {
            engine
                .apply_optimistic_like(black_box(&target), &me)
                .unwrap();
            engine.apply_snapshot(base.clone());
            engine.clear_pending(&target)
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_reconcile);
criterion_main!(benches);
