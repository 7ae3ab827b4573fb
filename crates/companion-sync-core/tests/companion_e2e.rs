//! Primary/companion end-to-end tests
//!
//! Two engines run over an in-memory `LoopbackTransport` pair. The loopback
//! delivers callbacks synchronously into each engine's queue, so flushing
//! both engines a few times is enough to reach a quiescent state.
//!
//! ## What These Tests Verify
//!
//! - Drops are silent and non-fatal (not set up, unreachable)
//! - Snapshots propagate and overwrite the mirror
//! - A companion toggle that cannot be sent leaves the mirror unchanged
//! - Completions flow both ways and merge by action text
//! - Activation errors still publish connectivity
//! - Handoff re-activation, single delegate binding, weak callbacks
//! - Coalescing while the companion is out of reach

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use companion_sync_core::dispatch::received_ack;
use companion_sync_core::handlers::{weak_callback, CompletionHandler, ConnectivityHandler};
use companion_sync_core::{
    CompanionEngine, CompletionEvent, ConnectivityState, ContextSnapshot, Delivery, DropReason,
    EngineConfig, EngineHandle, LoopbackTransport, MergeOutcome, Payload, PointMessage,
    SessionState, SetupOutcome, SyncError, SyncEvent, Transport, TransportError,
};

// ============================================================================
// Helpers
// ============================================================================

struct Pair {
    primary: EngineHandle,
    companion: EngineHandle,
    primary_end: Arc<LoopbackTransport>,
    companion_end: Arc<LoopbackTransport>,
}

impl Pair {
    fn spawn() -> Self {
        let (primary_end, companion_end) = LoopbackTransport::pair();
        let primary = CompanionEngine::spawn(primary_end.clone(), EngineConfig::primary()).unwrap();
        let companion =
            CompanionEngine::spawn(companion_end.clone(), EngineConfig::companion()).unwrap();
        Self {
            primary,
            companion,
            primary_end,
            companion_end,
        }
    }

    async fn connected() -> Self {
        let pair = Self::spawn();
        pair.primary.set_up().await.unwrap();
        pair.companion.set_up().await.unwrap();
        pair.settle().await;
        pair
    }

    async fn settle(&self) {
        for _ in 0..4 {
            self.primary.flush().await.unwrap();
            self.companion.flush().await.unwrap();
        }
    }

    async fn publish_walk_and_water(&self) {
        self.primary.update_mentor_message("Hi", "A").await.unwrap();
        self.primary
            .update_action_todos(todos(), vec![false, false])
            .await
            .unwrap();
        self.settle().await;
    }
}

fn todos() -> Vec<String> {
    vec!["walk".to_string(), "drink water".to_string()]
}

fn drain(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ============================================================================
// Scenarios
// ============================================================================

/// Pushing before setup is a silent no-op
#[tokio::test]
async fn test_push_without_setup_is_noop() {
    let pair = Pair::spawn();

    let delivery = pair.primary.update_mentor_message("Hi", "A").await.unwrap();

    assert_eq!(delivery, Delivery::Dropped(DropReason::NotActivated));
    assert!(!pair.companion_end.has_pending_context());
    // The local content is kept for the next push
    assert_eq!(pair.primary.observed().mentor_message, "Hi");
}

/// Sending while the companion is out of reach drops without blocking
#[tokio::test]
async fn test_send_while_unreachable_is_dropped() {
    let pair = Pair::connected().await;
    pair.publish_walk_and_water().await;

    pair.primary_end.set_reachable(false);
    pair.settle().await;
    assert_eq!(
        pair.companion.connectivity(),
        Some(ConnectivityState::new(true, true, false))
    );

    let message = PointMessage::TodoCompletion(CompletionEvent::new("walk", true));
    assert_eq!(
        pair.companion.send(message).await.unwrap(),
        Delivery::Dropped(DropReason::NotReachable)
    );

    let toggle = pair.companion.set_completion("walk", true).await.unwrap();
    assert_eq!(toggle.message, Some(Delivery::Dropped(DropReason::NotReachable)));
    assert_eq!(toggle.merge, None);
    assert_eq!(pair.companion.observed().todo_completion_status, vec![false, false]);

    pair.primary_end.set_reachable(true);
    pair.settle().await;

    // Primary never heard about it, and the mirror did not move ahead of it
    assert_eq!(pair.primary.observed().todo_completion_status, vec![false, false]);
    assert_eq!(pair.companion.observed().todo_completion_status, vec![false, false]);
}

/// A full snapshot pushed by the primary replaces the mirror
#[tokio::test]
async fn test_push_snapshot_reaches_mirror() {
    let pair = Pair::connected().await;
    pair.publish_walk_and_water().await;

    let snapshot = ContextSnapshot::new(
        "Rest is part of the work.",
        "Sage",
        vec!["stretch".to_string()],
        vec![true],
        0.0,
    )
    .unwrap();
    assert!(pair.primary.push(snapshot).await.unwrap().is_handed());
    pair.settle().await;

    let mirror = pair.companion.observed();
    assert_eq!(mirror.mentor_message, "Rest is part of the work.");
    assert_eq!(mirror.action_todos, vec!["stretch".to_string()]);
    assert_eq!(mirror.todo_completion_status, vec![true]);
    assert_eq!(mirror.last_timestamp, pair.primary.observed().last_timestamp);

    let err = pair.companion.push(ContextSnapshot::default()).await.unwrap_err();
    assert!(matches!(err, SyncError::NotAuthoritative));
}

/// Two pushes in a row leave the mirror at the second one
#[tokio::test]
async fn test_second_snapshot_wins_on_mirror() {
    let pair = Pair::connected().await;

    pair.primary.update_mentor_message("Hi", "A").await.unwrap();
    pair.primary
        .update_action_todos(todos(), vec![false, false])
        .await
        .unwrap();
    pair.primary
        .update_action_todos(todos(), vec![true, false])
        .await
        .unwrap();
    pair.settle().await;

    let mirror = pair.companion.observed();
    assert_eq!(mirror.mentor_message, "Hi");
    assert_eq!(mirror.mentor_character, "A");
    assert_eq!(mirror.action_todos, todos());
    assert_eq!(mirror.todo_completion_status, vec![true, false]);
}

/// A completion from the companion lands at the matching index on the primary
#[tokio::test]
async fn test_companion_completion_merges_on_primary() {
    let pair = Pair::connected().await;
    pair.publish_walk_and_water().await;

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let handler: CompletionHandler = Arc::new(move |event: CompletionEvent| sink.lock().push(event));
    pair.primary.register_completion_handler(handler).await.unwrap();

    let toggle = pair.companion.set_completion("walk", true).await.unwrap();
    assert_eq!(toggle.merge, Some(MergeOutcome::Applied { index: 0, changed: true }));
    assert_eq!(toggle.push, None);
    assert_eq!(toggle.message, Some(Delivery::Handed));
    pair.settle().await;

    assert_eq!(pair.primary.observed().todo_completion_status, vec![true, false]);
    assert_eq!(*received.lock(), vec![CompletionEvent::new("walk", true)]);
    // Primary re-pushed; mirror agrees
    assert_eq!(pair.companion.observed().todo_completion_status, vec![true, false]);
}

/// Activation errors are logged; connectivity is still published
#[tokio::test]
async fn test_activation_error_still_publishes_connectivity() {
    let (transport, _peer) = LoopbackTransport::pair();
    transport.fail_next_activation(TransportError::Rejected("radio off".to_string()));
    let engine = CompanionEngine::spawn(transport.clone(), EngineConfig::primary()).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handler: ConnectivityHandler =
        Arc::new(move |state: ConnectivityState| sink.lock().push(state));
    engine.register_connectivity_handler(handler).await.unwrap();

    engine.set_up().await.unwrap();
    engine.flush().await.unwrap();

    let observed = engine.observed();
    assert_eq!(observed.session, SessionState::Activated);
    assert_eq!(observed.connectivity, Some(transport.connectivity()));
    assert_eq!(*seen.lock(), vec![transport.connectivity()]);
}

// ============================================================================
// Session lifecycle
// ============================================================================

#[tokio::test]
async fn test_handoff_reactivates_session() {
    let pair = Pair::connected().await;
    pair.publish_walk_and_water().await;
    assert_eq!(pair.companion_end.activation_count(), 1);

    pair.companion_end.simulate_handoff();
    pair.settle().await;

    assert_eq!(pair.companion_end.activation_count(), 2);
    assert_eq!(pair.companion.observed().session, SessionState::Activated);

    // The fresh session keeps syncing
    pair.primary
        .update_action_todos(todos(), vec![false, true])
        .await
        .unwrap();
    pair.settle().await;
    assert_eq!(pair.companion.observed().todo_completion_status, vec![false, true]);
}

#[tokio::test]
async fn test_repeated_setup_keeps_single_binding() {
    let pair = Pair::connected().await;
    pair.publish_walk_and_water().await;

    assert_eq!(pair.primary.set_up().await.unwrap(), SetupOutcome::Rebound);
    assert_eq!(pair.primary.set_up().await.unwrap(), SetupOutcome::Rebound);
    assert_eq!(pair.primary_end.activation_count(), 1);
    assert_eq!(pair.primary_end.delegate_bindings(), 3);

    let calls = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let counter = calls.clone();
        let handler: CompletionHandler = Arc::new(move |_: CompletionEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        pair.primary.register_completion_handler(handler).await.unwrap();
    }

    pair.companion.set_completion("drink water", true).await.unwrap();
    pair.settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unsupported_platform_stays_inert() {
    let (transport, _peer) = LoopbackTransport::pair();
    transport.set_supported(false);
    let engine = CompanionEngine::spawn(transport.clone(), EngineConfig::primary()).unwrap();

    assert_eq!(engine.set_up().await.unwrap(), SetupOutcome::Unsupported);
    let delivery = engine.update_mentor_message("Hi", "A").await.unwrap();

    assert_eq!(delivery, Delivery::Dropped(DropReason::Unsupported));
    assert_eq!(transport.activation_count(), 0);
    assert_eq!(engine.observed().session, SessionState::Unactivated);
    assert_eq!(engine.connectivity(), None);
}

// ============================================================================
// Handler bindings
// ============================================================================

struct Screen {
    shown: AtomicUsize,
}

#[tokio::test]
async fn test_weak_handler_outlived_by_engine() {
    let pair = Pair::connected().await;
    pair.publish_walk_and_water().await;

    let screen = Arc::new(Screen {
        shown: AtomicUsize::new(0),
    });
    let handler = weak_callback(&screen, |screen: &Screen, _: CompletionEvent| {
        screen.shown.fetch_add(1, Ordering::SeqCst);
    });
    pair.primary.register_completion_handler(handler).await.unwrap();

    pair.companion.set_completion("walk", true).await.unwrap();
    pair.settle().await;
    assert_eq!(screen.shown.load(Ordering::SeqCst), 1);

    // Tear the screen down; the binding stays but does nothing
    drop(screen);
    pair.companion.set_completion("walk", false).await.unwrap();
    pair.settle().await;

    assert_eq!(pair.primary.observed().todo_completion_status, vec![false, false]);
}

#[tokio::test]
async fn test_cleared_handler_is_not_invoked() {
    let pair = Pair::connected().await;
    pair.publish_walk_and_water().await;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let handler: CompletionHandler = Arc::new(move |_: CompletionEvent| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    pair.primary.register_completion_handler(handler).await.unwrap();
    assert!(pair.primary.clear_completion_handler().await.unwrap());

    pair.companion.set_completion("walk", true).await.unwrap();
    pair.settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(pair.primary.observed().todo_completion_status, vec![true, false]);
}

// ============================================================================
// Delivery behaviour
// ============================================================================

#[tokio::test]
async fn test_pushes_while_unreachable_are_coalesced() {
    let pair = Pair::connected().await;
    pair.publish_walk_and_water().await;
    let before = pair.companion.stats().await.unwrap().snapshots_received;

    pair.primary_end.set_reachable(false);
    for flags in [vec![true, false], vec![true, true], vec![false, true]] {
        let delivery = pair.primary.update_action_todos(todos(), flags).await.unwrap();
        assert!(delivery.is_handed());
    }
    pair.settle().await;
    assert!(pair.companion_end.has_pending_context());
    assert_eq!(pair.companion.observed().todo_completion_status, vec![false, false]);

    pair.primary_end.set_reachable(true);
    pair.settle().await;

    assert!(!pair.companion_end.has_pending_context());
    assert_eq!(pair.companion.observed().todo_completion_status, vec![false, true]);
    let after = pair.companion.stats().await.unwrap().snapshots_received;
    assert_eq!(after, before + 1);
}

#[tokio::test]
async fn test_primary_toggle_reaches_companion() {
    let pair = Pair::connected().await;
    pair.publish_walk_and_water().await;

    let toggle = pair.primary.set_completion("drink water", true).await.unwrap();
    assert_eq!(toggle.push, Some(Delivery::Handed));
    assert_eq!(toggle.message, Some(Delivery::Handed));
    pair.settle().await;

    assert_eq!(pair.companion.observed().todo_completion_status, vec![false, true]);
}

#[tokio::test]
async fn test_companion_toggle_never_pushes() {
    let pair = Pair::connected().await;
    pair.publish_walk_and_water().await;
    let mut events = pair.companion.subscribe();

    let toggle = pair.companion.set_completion("walk", true).await.unwrap();
    pair.settle().await;

    assert_eq!(toggle.push, None);
    assert!(!pair.primary_end.has_pending_context());
    assert!(!drain(&mut events)
        .iter()
        .any(|event| matches!(event, SyncEvent::ContextPushed { .. })));
    // Applied locally once the primary took the message
    assert_eq!(pair.companion.observed().completion_of("walk"), Some(true));
}

#[tokio::test]
async fn test_unknown_completion_from_companion_is_dropped() {
    let pair = Pair::connected().await;
    pair.publish_walk_and_water().await;
    let mut events = pair.primary.subscribe();

    // Bypass the companion's own list check
    let message = PointMessage::TodoCompletion(CompletionEvent::new("meditate", true));
    assert!(pair.companion.send(message).await.unwrap().is_handed());
    pair.settle().await;

    let observed = pair.primary.observed();
    assert_eq!(observed.action_todos.len(), 2);
    assert_eq!(observed.todo_completion_status, vec![false, false]);
    assert!(drain(&mut events).contains(&SyncEvent::CompletionDropped(CompletionEvent::new(
        "meditate", true
    ))));
    assert_eq!(pair.primary.stats().await.unwrap().completions_unknown, 1);
}

#[tokio::test]
async fn test_primary_ignores_snapshots() {
    let pair = Pair::connected().await;
    pair.publish_walk_and_water().await;
    let mut events = pair.primary.subscribe();

    let rogue = companion_sync_core::ContextSnapshot::new(
        "Overwritten",
        "B",
        vec!["nothing".to_string()],
        vec![true],
        1.0,
    )
    .unwrap();
    pair.companion_end
        .update_shared_context(rogue.to_payload().unwrap())
        .unwrap();
    pair.settle().await;

    assert_eq!(pair.primary.observed().mentor_message, "Hi");
    assert!(drain(&mut events)
        .iter()
        .any(|event| matches!(event, SyncEvent::MessageRejected { .. })));
}

// ============================================================================
// Request / reply
// ============================================================================

#[tokio::test]
async fn test_initial_data_request_replies_with_snapshot() {
    let pair = Pair::connected().await;
    pair.publish_walk_and_water().await;

    let replies: Arc<Mutex<Vec<Payload>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = replies.clone();
    let delivery = pair
        .companion
        .send_with_reply(
            PointMessage::InitialDataRequest,
            Box::new(move |reply: Payload| sink.lock().push(reply)),
        )
        .await
        .unwrap();
    assert!(delivery.is_handed());
    pair.settle().await;

    let replies = replies.lock();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0]["mentorMessage"], "Hi");
    assert_eq!(replies[0]["actionTodos"], serde_json::json!(["walk", "drink water"]));
}

#[tokio::test]
async fn test_completion_with_reply_is_acknowledged() {
    let pair = Pair::connected().await;
    pair.publish_walk_and_water().await;

    let replies: Arc<Mutex<Vec<Payload>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = replies.clone();
    pair.companion
        .send_with_reply(
            PointMessage::TodoCompletion(CompletionEvent::new("walk", true)),
            Box::new(move |reply: Payload| sink.lock().push(reply)),
        )
        .await
        .unwrap();
    pair.settle().await;

    assert_eq!(*replies.lock(), vec![received_ack()]);
}

#[tokio::test]
async fn test_late_companion_requests_initial_data() {
    let pair = Pair::spawn();
    pair.primary.set_up().await.unwrap();
    pair.publish_walk_and_water().await;

    pair.companion.set_up().await.unwrap();
    pair.settle().await;

    let mirror = pair.companion.observed();
    assert_eq!(mirror.mentor_message, "Hi");
    assert_eq!(mirror.action_todos, todos());
    assert!(pair.companion.stats().await.unwrap().dispatch.sent >= 1);
}

#[tokio::test]
async fn test_events_announce_mirror_updates() {
    let pair = Pair::connected().await;
    let mut events = pair.companion.subscribe();

    pair.publish_walk_and_water().await;

    let applied: Vec<_> = drain(&mut events)
        .into_iter()
        .filter(|event| matches!(event, SyncEvent::ContextApplied { .. }))
        .collect();
    assert!(!applied.is_empty());
    assert!(matches!(
        applied.last(),
        Some(SyncEvent::ContextApplied { actions: 2, .. })
    ));
}
