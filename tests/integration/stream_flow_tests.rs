//! Orchestrator-level tests for the start/continue pull protocol.

use chrono::{Duration as ChronoDuration, Utc};

use pix_outgoing_stream::orchestrator::{InvalidTokenReason, PullOutcome, RETRY_AFTER_SECONDS};
use pix_outgoing_stream::slots::MAX_THREAD_SLOTS;
use pix_outgoing_stream::token::TokenPayload;

use super::test_helpers::{codec, harness, seed_stream};

const ISPB: &str = "12345678";

#[tokio::test]
async fn start_without_snapshot_returns_no_content_and_keeps_slot() {
    let app = harness().await;

    let outcome = app
        .orchestrator
        .start(ISPB, "client-0")
        .await
        .expect("start");

    assert_eq!(outcome, PullOutcome::NoContent { slot: 0 });
    assert_eq!(
        app.slots.active_leases(ISPB).await.expect("count"),
        1,
        "an empty pull must retain its lease"
    );
}

#[tokio::test]
async fn start_with_snapshot_delivers_framed_batch_and_token() {
    let app = harness().await;
    seed_stream(
        &app.streams,
        ISPB,
        "stream-a",
        41,
        Utc::now(),
        &["<Envelope>one</Envelope>", "<Envelope>two</Envelope>"],
    )
    .await;

    let outcome = app
        .orchestrator
        .start(ISPB, "client-0")
        .await
        .expect("start");

    let PullOutcome::Delivered {
        slot,
        token,
        content_type,
        body,
    } = outcome
    else {
        panic!("expected a delivered batch, got {outcome:?}");
    };

    assert_eq!(slot, 0);
    assert_eq!(content_type, "multipart/mixed; boundary=PIX-STREAM");
    let one = body.find("<Envelope>one</Envelope>").expect("first message");
    let two = body.find("<Envelope>two</Envelope>").expect("second message");
    assert!(one < two, "messages must keep snapshot order");

    let payload = codec().verify(&token).expect("token verifies");
    assert_eq!(payload.ispb, ISPB);
    assert_eq!(payload.thread, 0);
    assert_eq!(payload.cursor_seq, 41);
    assert_eq!(payload.cursor_offset, "stream-a");
}

#[tokio::test]
async fn continuation_refetches_the_latest_snapshot() {
    let app = harness().await;
    seed_stream(
        &app.streams,
        ISPB,
        "stream-a",
        1,
        Utc::now() - ChronoDuration::seconds(2),
        &["<Envelope>stale</Envelope>"],
    )
    .await;

    let first = app
        .orchestrator
        .start(ISPB, "client-0")
        .await
        .expect("start");
    let PullOutcome::Delivered { token, .. } = first else {
        panic!("expected a delivered batch, got {first:?}");
    };

    seed_stream(
        &app.streams,
        ISPB,
        "stream-b",
        2,
        Utc::now(),
        &["<Envelope>fresh</Envelope>"],
    )
    .await;

    let second = app
        .orchestrator
        .next(ISPB, &token, "client-0")
        .await
        .expect("next");
    let PullOutcome::Delivered { token, body, .. } = second else {
        panic!("expected a delivered batch, got {second:?}");
    };

    assert!(body.contains("<Envelope>fresh</Envelope>"));
    assert!(!body.contains("<Envelope>stale</Envelope>"));
    let payload = codec().verify(&token).expect("token verifies");
    assert_eq!(payload.cursor_offset, "stream-b");
    assert_eq!(payload.cursor_seq, 2);
}

#[tokio::test]
async fn continuation_with_mismatched_ispb_is_rejected() {
    let app = harness().await;
    seed_stream(&app.streams, ISPB, "stream-a", 1, Utc::now(), &["<x/>"]).await;

    let outcome = app
        .orchestrator
        .start(ISPB, "client-0")
        .await
        .expect("start");
    let PullOutcome::Delivered { token, .. } = outcome else {
        panic!("expected a delivered batch, got {outcome:?}");
    };

    let crossed = app
        .orchestrator
        .next("99999999", &token, "client-0")
        .await
        .expect("next");

    assert_eq!(
        crossed,
        PullOutcome::InvalidToken {
            reason: InvalidTokenReason::ParticipantMismatch,
        }
    );
    assert_eq!(
        app.slots.active_leases("99999999").await.expect("count"),
        0,
        "a rejected token must not consume capacity"
    );
}

#[tokio::test]
async fn continuation_with_garbage_token_is_rejected_without_consuming_capacity() {
    let app = harness().await;

    let outcome = app
        .orchestrator
        .next(ISPB, "definitely-not-a-token", "client-0")
        .await
        .expect("next");

    assert_eq!(
        outcome,
        PullOutcome::InvalidToken {
            reason: InvalidTokenReason::Malformed,
        }
    );
    assert_eq!(app.slots.active_leases(ISPB).await.expect("count"), 0);
}

#[tokio::test]
async fn continuation_with_expired_token_is_rejected() {
    let app = harness().await;
    let now = Utc::now().timestamp_millis();
    let token = codec()
        .encode(&TokenPayload {
            ispb: ISPB.to_owned(),
            thread: 0,
            cursor_seq: 1,
            cursor_offset: "stream-a".to_owned(),
            shard: format!("sa-east-1:{ISPB}"),
            issued_at: now - 600_000,
            exp: now - 300_000,
        })
        .expect("encode");

    let outcome = app
        .orchestrator
        .next(ISPB, &token, "client-0")
        .await
        .expect("next");

    assert_eq!(
        outcome,
        PullOutcome::InvalidToken {
            reason: InvalidTokenReason::Expired,
        }
    );
}

#[tokio::test]
async fn seventh_start_is_exhausted() {
    let app = harness().await;

    for idx in 0..MAX_THREAD_SLOTS {
        let outcome = app
            .orchestrator
            .start(ISPB, &format!("client-{idx}"))
            .await
            .expect("start");
        assert!(
            matches!(outcome, PullOutcome::NoContent { .. }),
            "reservation {idx} must succeed, got {outcome:?}"
        );
    }

    let seventh = app
        .orchestrator
        .start(ISPB, "client-6")
        .await
        .expect("start");
    assert_eq!(
        seventh,
        PullOutcome::Exhausted {
            retry_after_seconds: RETRY_AFTER_SECONDS,
        }
    );
}

#[tokio::test]
async fn release_restores_capacity_for_a_saturated_participant() {
    let app = harness().await;

    for idx in 0..MAX_THREAD_SLOTS {
        app.orchestrator
            .start(ISPB, &format!("client-{idx}"))
            .await
            .expect("start");
    }

    app.orchestrator
        .release(ISPB, "client-2")
        .await
        .expect("release");

    let outcome = app
        .orchestrator
        .start(ISPB, "client-late")
        .await
        .expect("start");
    assert!(
        matches!(outcome, PullOutcome::NoContent { .. }),
        "released capacity must be reusable, got {outcome:?}"
    );
}
