use std::time::Duration;

use coord_store::InMemoryCoordinationStore;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use twopc::{
    Coordinator, CoordinatorConfig, InMemoryHooks, NodePayload, Participant, ParticipantConfig,
    ParticipantPath, ParticipantReport, TracingAlertSink, TransactionOutcome, VoteLedger,
};

async fn run_transaction(participants: usize, fail_one: bool) -> TransactionOutcome {
    let store = InMemoryCoordinationStore::new();
    let config = CoordinatorConfig::default().with_abort_grace(Duration::from_millis(1));

    let (session, events) = store.connect().await;
    let mut coordinator = Coordinator::new(session, events, TracingAlertSink, config);
    let txn = coordinator.begin_transaction().await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..participants {
        let hooks = InMemoryHooks::new();
        hooks.set_fail_on_prepare(fail_one && i == 0);
        let (session, events) = store.connect().await;
        let mut participant = Participant::new(
            session,
            events,
            hooks,
            TracingAlertSink,
            ParticipantConfig::default(),
        );
        participant.register(&txn).await.unwrap();
        tasks.push(tokio::spawn(async move {
            participant.run().await.unwrap();
            participant
        }));
    }

    coordinator.notify_to_prepare().await.unwrap();
    let outcome = coordinator.run().await.unwrap();

    for task in tasks {
        task.await.unwrap().close().await.unwrap();
    }
    coordinator.close().await.unwrap();
    outcome
}

fn bench_commit_round_trip(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("twopc/commit_round_trip");

    for participants in [1, 5, 20] {
        group.bench_with_input(
            BenchmarkId::from_parameter(participants),
            &participants,
            |b, &n| {
                b.iter(|| {
                    let outcome = rt.block_on(run_transaction(n, false));
                    assert_eq!(outcome, TransactionOutcome::Committed);
                });
            },
        );
    }
    group.finish();
}

fn bench_abort_round_trip(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("twopc/abort_round_trip_5", |b| {
        b.iter(|| {
            let outcome = rt.block_on(run_transaction(5, true));
            assert_eq!(outcome, TransactionOutcome::Aborted);
        });
    });
}

fn bench_vote_ledger(c: &mut Criterion) {
    let members: Vec<ParticipantPath> = (0..100)
        .map(|i| ParticipantPath::new(format!("/transactions/dx0000000000/participant-{i:010}")))
        .collect();

    c.bench_function("twopc/vote_ledger_100_prepared", |b| {
        b.iter(|| {
            let mut ledger = VoteLedger::new();
            for member in &members {
                ledger.record(member, ParticipantReport::Prepared);
            }
            assert!(ledger.all_report(&members, ParticipantReport::Prepared));
        });
    });
}

fn bench_parse_payload(c: &mut Criterion) {
    c.bench_function("twopc/parse_payload", |b| {
        b.iter(|| {
            for data in [&b"PREPARE"[..], b"PREPARED", b"COMMIT", b"COMMITTED", b""] {
                NodePayload::parse(data).unwrap();
            }
        });
    });
}

criterion_group!(
    benches,
    bench_commit_round_trip,
    bench_abort_round_trip,
    bench_vote_ledger,
    bench_parse_payload,
);
criterion_main!(benches);
