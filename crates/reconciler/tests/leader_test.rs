//! Leadership lifecycle tests.
//!
//! **Scenario:** GIVEN election signals WHEN leadership changes THEN exactly
//! one reconciler writes to the destination, and only while leading.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use targetsync_core::{Error, Result, SyncConfig, Target};
use targetsync_reconciler::testing::{ChannelLocker, ChannelSource, RecordingDestination};
use targetsync_reconciler::{LeaderRunner, LeaderState};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;

struct Fleet {
    elections: mpsc::UnboundedSender<bool>,
    source: Arc<ChannelSource>,
    destination: Arc<RecordingDestination>,
    state: watch::Receiver<LeaderState>,
    scope: CancellationToken,
    task: JoinHandle<Result<()>>,
}

fn start(source: Vec<Target>, destination: Vec<Target>) -> Fleet {
    let (locker, elections) = ChannelLocker::new();
    let source = Arc::new(ChannelSource::new(source));
    let destination = Arc::new(RecordingDestination::with_targets(destination));
    let runner = Arc::new(LeaderRunner::new(
        Arc::new(SyncConfig::with_remove_delay(Duration::from_secs(5))),
        Arc::new(locker),
        source.clone(),
        destination.clone(),
    ));
    let state = runner.state();
    let scope = CancellationToken::new();
    let task = tokio::spawn({
        let scope = scope.clone();
        async move { runner.run(scope).await }
    });
    Fleet {
        elections,
        source,
        destination,
        state,
        scope,
        task,
    }
}

async fn wait_for(state: &mut watch::Receiver<LeaderState>, expected: LeaderState) {
    state
        .wait_for(|s| *s == expected)
        .await
        .expect("runner dropped its state");
}

#[tokio::test(start_paused = true)]
async fn given_no_election_when_contending_then_no_writes() {
    let mut fleet = start(vec![Target::new("10.0.0.1")], vec![]);

    wait_for(&mut fleet.state, LeaderState::Contending).await;
    sleep(Duration::from_secs(30)).await;

    assert!(fleet.destination.calls().is_empty());
    assert_eq!(fleet.source.subscriptions(), 0);

    fleet.scope.cancel();
    assert!(matches!(fleet.task.await.unwrap(), Err(Error::Cancelled)));
}

#[tokio::test(start_paused = true)]
async fn given_elected_when_source_has_new_target_then_added() {
    let mut fleet = start(vec![Target::new("10.0.0.1")], vec![]);

    fleet.elections.send(true).unwrap();
    wait_for(&mut fleet.state, LeaderState::Leading).await;
    sleep(Duration::from_millis(10)).await;

    let additions = fleet.destination.additions();
    assert_eq!(additions.len(), 1);
    assert_eq!(additions[0].targets, vec![Target::new("10.0.0.1")]);
    assert!(fleet.destination.removal_attempts().is_empty());

    fleet.scope.cancel();
    assert!(matches!(fleet.task.await.unwrap(), Err(Error::Cancelled)));
    assert_eq!(*fleet.state.borrow(), LeaderState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn given_leadership_lost_when_removal_pending_then_no_write_until_reelected() {
    let mut fleet = start(vec![], vec![Target::new("10.0.0.2")]);

    fleet.elections.send(true).unwrap();
    wait_for(&mut fleet.state, LeaderState::Leading).await;
    sleep(Duration::from_secs(1)).await;

    fleet.elections.send(false).unwrap();
    wait_for(&mut fleet.state, LeaderState::Following).await;
    let lost_at = Instant::now();

    sleep(Duration::from_secs(30)).await;
    assert!(fleet.destination.writes().is_empty());

    fleet.elections.send(true).unwrap();
    wait_for(&mut fleet.state, LeaderState::Leading).await;
    let regained_at = Instant::now();
    sleep(Duration::from_secs(6)).await;

    let writes = fleet.destination.writes();
    assert_eq!(writes.len(), 1);
    assert!(writes[0].at >= regained_at + Duration::from_secs(5));
    assert!(writes.iter().all(|w| w.at > lost_at));
    assert_eq!(fleet.source.subscriptions(), 2);

    fleet.scope.cancel();
    assert!(matches!(fleet.task.await.unwrap(), Err(Error::Cancelled)));
}

#[tokio::test(start_paused = true)]
async fn given_repeated_election_when_leading_then_single_term_runs() {
    let mut fleet = start(vec![Target::new("10.0.0.1")], vec![]);

    fleet.elections.send(true).unwrap();
    fleet.elections.send(true).unwrap();
    sleep(Duration::from_millis(10)).await;
    wait_for(&mut fleet.state, LeaderState::Leading).await;

    fleet.source.publish(vec![Target::new("10.0.0.1"), Target::new("10.0.0.4")]);
    sleep(Duration::from_millis(10)).await;

    let added: Vec<String> = fleet
        .destination
        .additions()
        .into_iter()
        .flat_map(|call| call.targets)
        .map(|t| t.ip)
        .collect();
    assert_eq!(added, vec!["10.0.0.1", "10.0.0.4"]);

    fleet.scope.cancel();
    assert!(matches!(fleet.task.await.unwrap(), Err(Error::Cancelled)));
}

#[tokio::test(start_paused = true)]
async fn given_destination_unreadable_when_leading_then_run_fails() {
    let fleet = start(vec![Target::new("10.0.0.1")], vec![]);
    fleet.destination.fail_reads(true);

    fleet.elections.send(true).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), fleet.task)
        .await
        .expect("runner did not stop")
        .unwrap();

    assert!(matches!(result, Err(Error::DestinationRead { .. })));
    assert_eq!(*fleet.state.borrow(), LeaderState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn given_follower_when_scope_cancelled_then_stops_cleanly() {
    let mut fleet = start(vec![], vec![]);

    fleet.elections.send(false).unwrap();
    wait_for(&mut fleet.state, LeaderState::Following).await;
    fleet.scope.cancel();

    assert!(matches!(fleet.task.await.unwrap(), Err(Error::Cancelled)));
    assert!(fleet.destination.calls().is_empty());
}
