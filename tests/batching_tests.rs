mod common;

use common::{counts, id, ids, ScriptedEndpoint};
use std::sync::Arc;
use std::time::Duration;
use view_batcher::services::views::parse_batch_response;
use view_batcher::{Aggregator, AggregatorConfig, BatchAck, FlushHandle, FlushOutcome, SkipReason, SubmitError};

fn aggregator(endpoint: &Arc<ScriptedEndpoint>) -> Aggregator<ScriptedEndpoint> {
    Aggregator::new(AggregatorConfig::default(), Arc::clone(endpoint))
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_views_submit_once_and_confirm_counts() {
    let endpoint = Arc::new(ScriptedEndpoint::new());
    endpoint.push_reply(Ok(BatchAck::with_counts(counts(&[("p1", 10), ("p2", 4)]))));
    let agg = aggregator(&endpoint);

    agg.record_view("p1");
    agg.record_view("p2");
    agg.record_view("p1");
    assert_eq!(agg.pending_ids(), ids(&["p1", "p2"]));

    let outcome = agg.flush_now().wait().await;
    assert!(matches!(outcome, FlushOutcome::Confirmed { size: 2, .. }), "got {:?}", outcome);

    assert_eq!(agg.view_count("p1"), 10);
    assert_eq!(agg.view_count("p2"), 4);
    assert_eq!(agg.pending_len(), 0);
    assert!(!agg.timer_armed(), "Empty pending set should not re-arm the timer");
    assert_eq!(endpoint.submissions(), vec![ids(&["p1", "p2"])]);
}

#[tokio::test(start_paused = true)]
async fn test_repeated_view_is_one_batch_entry() {
    let endpoint = Arc::new(ScriptedEndpoint::new());
    let agg = aggregator(&endpoint);

    for _ in 0..10 {
        agg.record_view("p1");
    }
    assert_eq!(agg.pending_len(), 1);

    agg.flush_now().wait().await;
    assert_eq!(endpoint.submissions(), vec![ids(&["p1"])]);
}

#[tokio::test(start_paused = true)]
async fn test_empty_ids_are_ignored() {
    let endpoint = Arc::new(ScriptedEndpoint::new());
    let agg = aggregator(&endpoint);

    agg.record_view("");
    agg.record_view("   ");

    assert_eq!(agg.pending_len(), 0);
    assert!(!agg.timer_armed());
    assert_eq!(agg.flush_now().wait().await, FlushOutcome::Skipped(SkipReason::Empty));
    assert!(endpoint.submissions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_threshold_flushes_without_waiting_for_timer() {
    let endpoint = Arc::new(ScriptedEndpoint::new());
    let agg = aggregator(&endpoint);

    for i in 1..=4 {
        agg.record_view(format!("p{}", i));
    }
    assert!(agg.timer_armed());
    assert!(!agg.is_processing());

    agg.record_view("p5");
    assert!(agg.is_processing(), "Fifth distinct view should start a flush immediately");
    assert!(!agg.timer_armed(), "Threshold flush cancels the armed timer");

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(endpoint.submissions(), vec![ids(&["p1", "p2", "p3", "p4", "p5"])]);
    assert_eq!(agg.pending_len(), 0);

    // The canceled timer must not produce a second, empty-handed flush later.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(endpoint.submissions().len(), 1);

    let snap = agg.telemetry();
    assert_eq!(snap.trigger_stats.threshold, 1);
    assert_eq!(snap.trigger_stats.delay, 0);
    assert_eq!(snap.trigger_stats.timers_canceled, 1);
}

#[tokio::test(start_paused = true)]
async fn test_delay_flushes_single_view() {
    let endpoint = Arc::new(ScriptedEndpoint::new());
    let agg = aggregator(&endpoint);

    agg.record_view("p1");
    assert!(agg.timer_armed());

    tokio::time::sleep(Duration::from_millis(2_900)).await;
    assert!(endpoint.submissions().is_empty(), "Nothing should flush before the delay elapses");

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(endpoint.submissions(), vec![ids(&["p1"])]);
    assert_eq!(agg.view_count("p1"), 1);
    assert_eq!(agg.pending_len(), 0);
    assert!(!agg.timer_armed());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(endpoint.submissions().len(), 1, "Exactly one delayed flush");
    assert_eq!(agg.telemetry().trigger_stats.delay, 1);
}

#[tokio::test(start_paused = true)]
async fn test_new_views_do_not_postpone_armed_timer() {
    let endpoint = Arc::new(ScriptedEndpoint::new());
    let agg = aggregator(&endpoint);

    agg.record_view("p1");
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    agg.record_view("p2");

    // Original deadline is t=3000ms, not t=5000ms.
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(endpoint.submissions(), vec![ids(&["p1", "p2"])]);
    assert_eq!(agg.telemetry().trigger_stats.timers_armed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_never_two_flushes_in_flight() {
    let endpoint = Arc::new(ScriptedEndpoint::gated());
    let agg = aggregator(&endpoint);

    for i in 1..=5 {
        agg.record_view(format!("a{}", i));
    }
    assert!(agg.is_processing());

    let second = agg.flush_now();
    assert!(matches!(second, FlushHandle::Skipped(SkipReason::InFlight)));

    // Enough new views to cross the threshold again while the first batch is out.
    for i in 1..=6 {
        agg.record_view(format!("b{}", i));
        assert!(!agg.flush_now().is_submitted());
    }
    assert!(!agg.timer_armed(), "No timer while a flush is in flight");

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(endpoint.submissions().len(), 1);
    assert_eq!(agg.pending_len(), 11, "In-flight batch stays pending until it settles");

    // First batch settles; the six queued views immediately form the next batch.
    endpoint.release(1);
    tokio::time::sleep(Duration::from_millis(10)).await;
    let submissions = endpoint.submissions();
    assert_eq!(submissions.len(), 2);
    assert_eq!(submissions[1], ids(&["b1", "b2", "b3", "b4", "b5", "b6"]));
    assert!(agg.is_processing());

    endpoint.release(1);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!agg.is_processing());
    assert_eq!(agg.pending_len(), 0);
    assert_eq!(endpoint.max_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_flush_keeps_views_for_retry() {
    let endpoint = Arc::new(ScriptedEndpoint::new());
    endpoint.push_reply(Err(SubmitError::Malformed("truncated body".to_string())));
    endpoint.push_reply(Ok(BatchAck::with_counts(counts(&[("p1", 3), ("p2", 1), ("p3", 8)]))));
    let agg = aggregator(&endpoint);

    agg.record_view("p1");
    agg.record_view("p2");

    let first = agg.flush_now().wait().await;
    assert!(matches!(first, FlushOutcome::Failed { size: 2, .. }), "got {:?}", first);
    assert_eq!(agg.pending_ids(), ids(&["p1", "p2"]));
    assert_eq!(agg.view_count("p1"), 0, "Failure must not touch confirmed counts");
    assert!(!agg.is_processing());
    assert!(agg.timer_armed(), "Leftover views re-arm the timer");

    agg.record_view("p3");
    let second = agg.flush_now().wait().await;
    assert!(matches!(second, FlushOutcome::Confirmed { size: 3, .. }), "got {:?}", second);

    let submissions = endpoint.submissions();
    assert!(submissions[0].iter().all(|item| submissions[1].contains(item)));
    assert_eq!(agg.view_count("p1"), 3);
    assert_eq!(agg.view_count("p3"), 8);
    assert_eq!(agg.pending_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_flush_retries_on_next_timer() {
    let endpoint = Arc::new(ScriptedEndpoint::new());
    endpoint.push_reply(Err(SubmitError::Rejected("error".to_string())));
    let agg = aggregator(&endpoint);

    agg.record_view("p1");
    tokio::time::sleep(Duration::from_millis(3_100)).await;
    assert_eq!(endpoint.submissions().len(), 1);
    assert_eq!(agg.pending_len(), 1);

    tokio::time::sleep(Duration::from_millis(3_100)).await;
    assert_eq!(endpoint.submissions(), vec![ids(&["p1"]), ids(&["p1"])]);
    assert_eq!(agg.pending_len(), 0);
    assert_eq!(agg.view_count("p1"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_success_without_counts_increments_locally() {
    let endpoint = Arc::new(ScriptedEndpoint::new());
    endpoint.push_reply(Ok(BatchAck::without_counts()));
    let agg = aggregator(&endpoint);

    agg.seed_initial_count("p1", 2);
    agg.record_view("p1");
    agg.record_view("p2");

    let outcome = agg.flush_now().wait().await;
    assert!(matches!(outcome, FlushOutcome::Degraded { size: 2, .. }), "got {:?}", outcome);
    assert!(outcome.is_success());
    assert_eq!(agg.view_count("p1"), 3);
    assert_eq!(agg.view_count("p2"), 1);
    assert_eq!(agg.pending_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_views_recorded_during_flight_stay_pending() {
    let endpoint = Arc::new(ScriptedEndpoint::gated());
    let agg = aggregator(&endpoint);

    agg.record_view("p1");
    let handle = agg.flush_now();
    assert!(handle.is_submitted());

    agg.record_view("p2");
    endpoint.release(1);
    let outcome = handle.wait().await;
    assert!(matches!(outcome, FlushOutcome::Confirmed { size: 1, .. }));

    assert_eq!(endpoint.submissions()[0], ids(&["p1"]));
    assert_eq!(agg.pending_ids(), vec![id("p2")]);
    assert!(agg.timer_armed());
}

#[tokio::test(start_paused = true)]
async fn test_success_reply_with_odd_data_is_not_resubmitted() {
    let endpoint = Arc::new(ScriptedEndpoint::new());
    endpoint.push_reply(parse_batch_response(r#"{"status":"success","data":"ok"}"#));
    let agg = aggregator(&endpoint);

    agg.record_view("p1");
    let outcome = agg.flush_now().wait().await;
    assert!(matches!(outcome, FlushOutcome::Degraded { size: 1, .. }), "got {:?}", outcome);
    assert_eq!(agg.pending_len(), 0);
    assert_eq!(agg.view_count("p1"), 1);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(endpoint.submissions().len(), 1, "Accepted batch must not be sent again");
}
