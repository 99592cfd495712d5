//! End-to-end runs of the participant over the in-memory adapters.

use elgamal_core::bus::{param_channel, result_channel, StubEncryptService};
use elgamal_core::{DomainParameters, Participant, ParticipantConfig, ResultMessage, SecretSampler};
use std::sync::Arc;
use std::time::Duration;

const PARAMS: DomainParameters = DomainParameters { p: 467, a: 2 };

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[tokio::test]
async fn test_flooded_feed_dispatches_one_request_per_round() {
    init_tracing();

    // plaintexts must stay below p to decrypt unchanged
    let plaintexts = vec![100u64, 200, 300, 400, 450];
    let stub = Arc::new(StubEncryptService::new(PARAMS, plaintexts.clone()).holding());
    let (sink, mut results) = result_channel();
    let (tx, feed) = param_channel(64);

    let config = ParticipantConfig::default().with_probe_timeout(Duration::from_millis(10));
    let participant = Participant::new(config, stub.clone(), sink);
    let task = tokio::spawn(participant.run(feed));

    for round in 1..=5usize {
        // the first notification starts the round, the rest arrive while in flight
        for _ in 0..10 {
            tx.send(PARAMS).await.unwrap();
        }
        stub.wait_for_requests(round).await;
        assert_eq!(stub.request_count(), round);

        stub.release(1);
        let message = results.recv().await.unwrap();
        assert_eq!(message, ResultMessage { data: plaintexts[round - 1] as i64 });
    }

    let summary = task.await.unwrap().unwrap();
    assert_eq!(summary.state.round_index, 5);
    assert!(summary.state.finished);
    assert_eq!(stub.request_count(), 5);
}

#[tokio::test]
async fn test_lingering_participant_ignores_after_completion() {
    init_tracing();

    let stub = Arc::new(StubEncryptService::new(PARAMS, vec![]));
    let (sink, mut results) = result_channel();
    let (tx, feed) = param_channel(64);

    let config = ParticipantConfig::new(2).unwrap().lingering();
    let participant = Participant::with_sampler(config, stub.clone(), sink, SecretSampler::with_seed(21));
    let task = tokio::spawn(participant.run(feed));

    for round in 1..=2usize {
        tx.send(PARAMS).await.unwrap();
        stub.wait_for_requests(round).await;
        assert_eq!(results.recv().await, Some(ResultMessage { data: round as i64 }));
    }

    for _ in 0..20 {
        tx.send(PARAMS).await.unwrap();
    }
    drop(tx);

    let summary = task.await.unwrap().unwrap();
    assert_eq!(summary.results.len(), 2);
    assert_eq!(summary.state.round_index, 2);
    assert!(summary.state.finished);
    assert_eq!(stub.request_count(), 2);
    assert!(results.recv().await.is_none());
}

#[tokio::test]
async fn test_recovers_after_invalid_parameters_and_failures() {
    init_tracing();

    let stub = Arc::new(StubEncryptService::new(PARAMS, vec![42]));
    let (sink, mut results) = result_channel();
    let (tx, feed) = param_channel(64);

    let config = ParticipantConfig::new(1).unwrap();
    let participant = Participant::with_sampler(config, stub.clone(), sink, SecretSampler::with_seed(5));
    let task = tokio::spawn(participant.run(feed));

    tx.send(DomainParameters::new(1, 2)).await.unwrap();
    tx.send(DomainParameters::new(2, 2)).await.unwrap();

    stub.fail_next(2);
    for attempt in 1..=3usize {
        tx.send(PARAMS).await.unwrap();
        stub.wait_for_requests(attempt).await;
    }

    assert_eq!(results.recv().await, Some(ResultMessage { data: 42 }));
    let summary = task.await.unwrap().unwrap();
    assert_eq!(summary.state.round_index, 1);
    assert_eq!(stub.request_count(), 3);
}

#[tokio::test]
async fn test_large_plaintext_wraps_to_signed() {
    init_tracing();

    let params = DomainParameters::new(18_446_744_073_709_551_557, 2);
    let m = (1u64 << 63) + 5;
    let stub = Arc::new(StubEncryptService::new(params, vec![m]).with_ephemeral(987_654_321));
    let (sink, mut results) = result_channel();
    let (tx, feed) = param_channel(4);

    let participant = Participant::new(ParticipantConfig::new(1).unwrap(), stub, sink);
    let task = tokio::spawn(participant.run(feed));
    tx.send(params).await.unwrap();

    assert_eq!(
        results.recv().await,
        Some(ResultMessage { data: -9_223_372_036_854_775_803 })
    );
    let summary = task.await.unwrap().unwrap();
    assert_eq!(summary.results[0].x, m);
}
