//! Companion engine - single owner of all synchronization state
//!
//! ## Architecture
//!
//! ```text
//!   EngineHandle (any task)          transport callbacks (any thread)
//!         │                                     │
//!         │ Command + oneshot ack               │ ForwardingDelegate
//!         ▼                                     ▼
//!   ┌──────────────────── unbounded mpsc ─────────────────────┐
//!   └──────────────────────────┬──────────────────────────────┘
//!                              ▼
//!   ┌─────────────────────────────────────────────────────────┐
//!   │ CompanionEngine task                                    │
//!   │   PeerSession · ContextSynchronizer · Dispatcher        │
//!   │   CompletionBridge · HandlerSet                         │
//!   └──────────────┬──────────────────────────┬───────────────┘
//!                  ▼                          ▼
//!      RwLock<ObservedState>        broadcast<SyncEvent>
//! ```
//!
//! Every mutation runs on the engine task, one command at a time, so
//! multi-field state is never observed half-written. The engine runs until
//! [`EngineHandle::shutdown`] or until every handle is dropped; the
//! forwarding delegate and reply callbacks only hold weak senders.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, trace, warn};

use crate::completion::{CompletionBridge, MergeOutcome};
use crate::config::EngineConfig;
use crate::context::ContextSynchronizer;
use crate::dispatch::{received_ack, DispatchStats, Dispatcher, PointMessage, KEY_STATUS};
use crate::error::{SyncError, SyncResult};
use crate::events::{ObservedState, SyncEvent};
use crate::handlers::{CompletionHandler, ConnectivityHandler, HandlerSet};
use crate::session::{PeerSession, SetupOutcome};
use crate::transport::{
    Delivery, DropReason, ReplyHandler, Transport, TransportDelegate, TransportError,
};
use crate::types::{CompletionEvent, ConnectivityState, ContextSnapshot, Payload};

/// What a local completion toggle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleOutcome {
    /// Effect on the local action list; `None` when the mirroring side could
    /// not hand the toggle to its peer and left its list untouched
    pub merge: Option<MergeOutcome>,
    /// Snapshot re-push (authoritative side, flag changed)
    pub push: Option<Delivery>,
    /// `todoCompletion` point message to the peer
    pub message: Option<Delivery>,
}

/// Counters collected by the engine task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub dispatch: DispatchStats,
    pub completions_applied: u64,
    pub completions_unknown: u64,
    pub snapshots_received: u64,
}

/// Transport callbacks, marshalled onto the engine task
enum TransportCallback {
    ActivationComplete {
        state: ConnectivityState,
        error: Option<TransportError>,
    },
    ReachabilityChanged(bool),
    MessageReceived {
        payload: Payload,
        reply: Option<ReplyHandler>,
    },
    ContextReceived(Payload),
    SessionInactive,
    SessionDeactivated,
}

enum Command {
    SetUp {
        ack: oneshot::Sender<SetupOutcome>,
    },
    UpdateMentorMessage {
        message: String,
        character: String,
        ack: oneshot::Sender<SyncResult<Delivery>>,
    },
    UpdateActionTodos {
        texts: Vec<String>,
        completion: Vec<bool>,
        ack: oneshot::Sender<SyncResult<Delivery>>,
    },
    Push {
        snapshot: ContextSnapshot,
        ack: oneshot::Sender<SyncResult<Delivery>>,
    },
    SetCompletion {
        event: CompletionEvent,
        ack: oneshot::Sender<ToggleOutcome>,
    },
    RegisterCompletionHandler {
        handler: Option<CompletionHandler>,
        ack: oneshot::Sender<bool>,
    },
    RegisterConnectivityHandler {
        handler: Option<ConnectivityHandler>,
        ack: oneshot::Sender<bool>,
    },
    Send {
        message: PointMessage,
        ack: oneshot::Sender<Delivery>,
    },
    SendWithReply {
        message: PointMessage,
        on_reply: ReplyHandler,
        ack: oneshot::Sender<Delivery>,
    },
    PushNow {
        ack: oneshot::Sender<Delivery>,
    },
    RequestInitialData {
        ack: oneshot::Sender<Delivery>,
    },
    InitialDataReply(Payload),
    Snapshot {
        ack: oneshot::Sender<ContextSnapshot>,
    },
    Stats {
        ack: oneshot::Sender<EngineStats>,
    },
    Transport(TransportCallback),
    Flush {
        ack: oneshot::Sender<()>,
    },
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

/// Forwards transport callbacks into the engine's queue. No logic of its own.
struct ForwardingDelegate {
    tx: WeakUnboundedSender<Command>,
}

impl ForwardingDelegate {
    fn forward(&self, callback: TransportCallback) {
        let Some(tx) = self.tx.upgrade() else {
            trace!("Engine stopped; dropping transport callback");
            return;
        };
        if tx.send(Command::Transport(callback)).is_err() {
            trace!("Engine stopped; dropping transport callback");
        }
    }
}

impl TransportDelegate for ForwardingDelegate {
    fn on_activation_complete(&self, state: ConnectivityState, error: Option<TransportError>) {
        self.forward(TransportCallback::ActivationComplete { state, error });
    }

    fn on_reachability_changed(&self, reachable: bool) {
        self.forward(TransportCallback::ReachabilityChanged(reachable));
    }

    fn on_message_received(&self, payload: Payload, reply: Option<ReplyHandler>) {
        self.forward(TransportCallback::MessageReceived { payload, reply });
    }

    fn on_context_received(&self, payload: Payload) {
        self.forward(TransportCallback::ContextReceived(payload));
    }

    fn on_session_inactive(&self) {
        self.forward(TransportCallback::SessionInactive);
    }

    fn on_session_deactivated(&self) {
        self.forward(TransportCallback::SessionDeactivated);
    }
}

/// The engine task's state. Created by [`CompanionEngine::spawn`].
pub struct CompanionEngine {
    config: EngineConfig,
    session: PeerSession,
    context: ContextSynchronizer,
    dispatcher: Dispatcher,
    bridge: CompletionBridge,
    handlers: HandlerSet,
    delegate: Arc<ForwardingDelegate>,
    observed: Arc<RwLock<ObservedState>>,
    events: broadcast::Sender<SyncEvent>,
    self_tx: WeakUnboundedSender<Command>,
}

impl CompanionEngine {
    /// Start the engine task on the current tokio runtime
    pub fn spawn(transport: Arc<dyn Transport>, config: EngineConfig) -> SyncResult<EngineHandle> {
        config.validate()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_channel_capacity);
        let observed = Arc::new(RwLock::new(ObservedState::default()));
        let config = Arc::new(config);

        let engine = CompanionEngine {
            config: (*config).clone(),
            session: PeerSession::new(transport),
            context: ContextSynchronizer::new(),
            dispatcher: Dispatcher::new(),
            bridge: CompletionBridge::new(),
            handlers: HandlerSet::new(),
            delegate: Arc::new(ForwardingDelegate { tx: tx.downgrade() }),
            observed: observed.clone(),
            events: events.clone(),
            self_tx: tx.downgrade(),
        };
        tokio::spawn(engine.run(rx));

        Ok(EngineHandle {
            tx,
            observed,
            events,
            config,
        })
    }

    async fn run(mut self, mut rx: UnboundedReceiver<Command>) {
        info!(role = %self.config.role, "Companion engine started");

        while let Some(command) = rx.recv().await {
            if !self.handle(command) {
                break;
            }
        }

        info!(role = %self.config.role, "Companion engine stopped");
    }

    /// Process one command. Returns false to stop the task.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::SetUp { ack } => {
                let outcome = self.session.set_up(self.delegate.clone());
                self.sync_session_state();
                let _ = ack.send(outcome);
            }
            Command::UpdateMentorMessage {
                message,
                character,
                ack,
            } => {
                let result = self.update_mentor_message(message, character);
                let _ = ack.send(result);
            }
            Command::UpdateActionTodos {
                texts,
                completion,
                ack,
            } => {
                let result = self.update_action_todos(texts, completion);
                let _ = ack.send(result);
            }
            Command::Push { snapshot, ack } => {
                let result = self.push_snapshot(snapshot);
                let _ = ack.send(result);
            }
            Command::SetCompletion { event, ack } => {
                let outcome = self.toggle_local(event);
                let _ = ack.send(outcome);
            }
            Command::RegisterCompletionHandler { handler, ack } => {
                let replaced = self.handlers.set_completion(handler);
                if replaced {
                    debug!("Replaced completion handler binding");
                }
                let _ = ack.send(replaced);
            }
            Command::RegisterConnectivityHandler { handler, ack } => {
                let replaced = self.handlers.set_connectivity(handler);
                if replaced {
                    debug!("Replaced connectivity handler binding");
                }
                let _ = ack.send(replaced);
            }
            Command::Send { message, ack } => {
                let delivery = self.send_point(&message);
                let _ = ack.send(delivery);
            }
            Command::SendWithReply {
                message,
                on_reply,
                ack,
            } => {
                let delivery = self
                    .dispatcher
                    .send_with_reply(&self.session, &message, on_reply);
                self.record_send(message.discriminator(), &delivery);
                let _ = ack.send(delivery);
            }
            Command::PushNow { ack } => {
                let delivery = if self.is_authoritative() {
                    self.push_current()
                } else {
                    warn!("Push ignored: only the authoritative device pushes snapshots");
                    Delivery::Dropped(DropReason::NotAuthoritative)
                };
                let _ = ack.send(delivery);
            }
            Command::RequestInitialData { ack } => {
                let delivery = self.request_initial_data();
                let _ = ack.send(delivery);
            }
            Command::InitialDataReply(payload) => self.on_initial_data_reply(payload),
            Command::Snapshot { ack } => {
                let _ = ack.send(self.context.current().clone());
            }
            Command::Stats { ack } => {
                let _ = ack.send(self.stats());
            }
            Command::Transport(callback) => self.on_transport(callback),
            Command::Flush { ack } => {
                let _ = ack.send(());
            }
            Command::Shutdown { ack } => {
                let _ = ack.send(());
                return false;
            }
        }
        true
    }

    fn on_transport(&mut self, callback: TransportCallback) {
        match callback {
            TransportCallback::ActivationComplete { state, error } => {
                self.on_activation_complete(state, error)
            }
            TransportCallback::ReachabilityChanged(reachable) => {
                self.on_reachability_changed(reachable)
            }
            TransportCallback::MessageReceived { payload, reply } => {
                self.on_message_received(payload, reply)
            }
            TransportCallback::ContextReceived(payload) => self.on_context_received(payload),
            TransportCallback::SessionInactive => self.session.on_session_inactive(),
            TransportCallback::SessionDeactivated => {
                self.session.on_session_deactivated();
                self.sync_session_state();
            }
        }
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    fn on_activation_complete(&mut self, state: ConnectivityState, error: Option<TransportError>) {
        let state = self.session.on_activation_complete(state, error.as_ref());
        self.publish_connectivity(state);

        if error.is_some() {
            return;
        }

        if self.is_authoritative() {
            if !self.context.current().is_empty() {
                debug!("Pushing current snapshot to freshly activated session");
                self.push_current();
            }
        } else if self.config.request_initial_data && self.session.is_reachable() {
            self.request_initial_data();
        }
    }

    fn on_reachability_changed(&mut self, reachable: bool) {
        let state = self.session.on_reachability_changed(reachable);
        self.publish_connectivity(state);

        let mirror_empty = self.context.received_count() == 0;
        if !self.is_authoritative()
            && state.is_reachable
            && self.session.is_activated()
            && self.config.request_initial_data
            && mirror_empty
        {
            self.request_initial_data();
        }
    }

    // ========================================================================
    // Authoritative content
    // ========================================================================

    fn update_mentor_message(&mut self, message: String, character: String) -> SyncResult<Delivery> {
        self.require_authoritative()?;
        self.context.current_mut().set_mentor(message, character);
        self.refresh_content();
        Ok(self.push_current())
    }

    fn update_action_todos(
        &mut self,
        texts: Vec<String>,
        completion: Vec<bool>,
    ) -> SyncResult<Delivery> {
        self.require_authoritative()?;
        self.context.current_mut().set_actions(texts, completion)?;
        self.refresh_content();
        Ok(self.push_current())
    }

    fn push_snapshot(&mut self, snapshot: ContextSnapshot) -> SyncResult<Delivery> {
        self.require_authoritative()?;
        let delivery = self.context.push(&self.session, snapshot);
        self.refresh_content();
        Ok(self.report_push(delivery))
    }

    fn push_current(&mut self) -> Delivery {
        let delivery = self.context.push_current(&self.session);
        self.report_push(delivery)
    }

    fn report_push(&self, delivery: Delivery) -> Delivery {
        match &delivery {
            Delivery::Handed => {
                self.refresh_content();
                self.emit(SyncEvent::ContextPushed {
                    timestamp: self.context.current().timestamp(),
                });
            }
            Delivery::Dropped(reason) => self.emit(SyncEvent::PushDropped(reason.clone())),
        }
        delivery
    }

    // ========================================================================
    // Inbound snapshots
    // ========================================================================

    fn on_context_received(&mut self, payload: Payload) {
        if self.is_authoritative() {
            warn!("Ignoring shared context received on the authoritative device");
            self.emit(SyncEvent::MessageRejected {
                message: "shared context received by authoritative device".to_string(),
            });
            return;
        }
        self.apply_snapshot_payload(&payload);
    }

    fn apply_snapshot_payload(&mut self, payload: &Payload) {
        match self.context.on_receive(payload) {
            Ok(snapshot) => {
                let timestamp = snapshot.timestamp();
                let actions = snapshot.action_texts().len();
                self.refresh_content();
                self.emit(SyncEvent::ContextApplied { timestamp, actions });
            }
            Err(error) => {
                warn!(%error, "Dropping malformed shared context");
                self.emit(SyncEvent::MessageRejected {
                    message: error.to_string(),
                });
            }
        }
    }

    // ========================================================================
    // Point messages
    // ========================================================================

    fn send_point(&mut self, message: &PointMessage) -> Delivery {
        let delivery = self.dispatcher.send(&self.session, message);
        self.record_send(message.discriminator(), &delivery);
        delivery
    }

    fn record_send(&self, kind: &'static str, delivery: &Delivery) {
        match delivery {
            Delivery::Handed => self.emit(SyncEvent::MessageSent { kind }),
            Delivery::Dropped(reason) => self.emit(SyncEvent::MessageDropped {
                kind,
                reason: reason.clone(),
            }),
        }
    }

    fn on_message_received(&mut self, payload: Payload, reply: Option<ReplyHandler>) {
        let message = match self.dispatcher.decode(&payload) {
            Ok(message) => message,
            Err(error) => {
                self.emit(SyncEvent::MessageRejected {
                    message: error.to_string(),
                });
                return;
            }
        };

        let response = match message {
            PointMessage::TodoCompletion(event) => {
                self.merge_remote(event);
                received_ack()
            }
            PointMessage::InitialDataRequest if self.is_authoritative() => {
                info!("Answering initial data request");
                let reply = self.context.reply_payload();
                self.refresh_content();
                match reply {
                    Ok(payload) => payload,
                    Err(error) => {
                        warn!(%error, "Snapshot could not be encoded; acknowledging only");
                        received_ack()
                    }
                }
            }
            PointMessage::InitialDataRequest => {
                debug!("Initial data requested from the mirroring device; acknowledging only");
                received_ack()
            }
        };

        if let Some(reply) = reply {
            reply(response);
        }
    }

    fn request_initial_data(&mut self) -> Delivery {
        let tx = self.self_tx.clone();
        let on_reply: ReplyHandler = Box::new(move |reply: Payload| match tx.upgrade() {
            Some(tx) => {
                if tx.send(Command::InitialDataReply(reply)).is_err() {
                    trace!("Engine stopped before initial data arrived");
                }
            }
            None => trace!("Engine stopped before initial data arrived"),
        });

        let message = PointMessage::InitialDataRequest;
        let delivery = self
            .dispatcher
            .send_with_reply(&self.session, &message, on_reply);
        self.record_send(message.discriminator(), &delivery);
        delivery
    }

    fn on_initial_data_reply(&mut self, payload: Payload) {
        if payload.contains_key(KEY_STATUS) {
            debug!("Initial data request acknowledged without data");
            return;
        }
        if self.is_authoritative() {
            debug!("Ignoring initial data reply on the authoritative device");
            return;
        }
        info!("Received initial data");
        self.apply_snapshot_payload(&payload);
    }

    // ========================================================================
    // Completion feedback
    // ========================================================================

    fn merge_remote(&mut self, event: CompletionEvent) {
        match self.bridge.merge(self.context.current_mut(), &event) {
            MergeOutcome::Applied { changed, .. } => {
                self.refresh_content();
                self.emit(SyncEvent::CompletionMerged {
                    event: event.clone(),
                    changed,
                    remote: true,
                });
                self.handlers.notify_completion(event);

                if changed && self.is_authoritative() && self.config.repush_on_completion {
                    self.push_current();
                }
            }
            MergeOutcome::UnknownIdentifier => self.emit(SyncEvent::CompletionDropped(event)),
        }
    }

    /// A toggle made on this device.
    ///
    /// Both sides tell the peer with a point message. The authoritative side
    /// updates its own list first and re-pushes the snapshot; the mirroring
    /// side only updates its list once the peer has taken the message.
    fn toggle_local(&mut self, event: CompletionEvent) -> ToggleOutcome {
        if !self.is_authoritative() {
            return self.toggle_on_mirror(event);
        }

        let merge = self.bridge.merge(self.context.current_mut(), &event);
        let MergeOutcome::Applied { changed, .. } = merge else {
            return self.toggle_dropped(event, merge);
        };
        self.announce_local_merge(&event, changed);

        let push = (changed && self.config.repush_on_completion).then(|| self.push_current());
        let message = Some(self.send_point(&CompletionBridge::outbound(event)));

        ToggleOutcome {
            merge: Some(merge),
            push,
            message,
        }
    }

    fn toggle_on_mirror(&mut self, event: CompletionEvent) -> ToggleOutcome {
        if self.context.current().position_of(&event.action_identifier).is_none() {
            let merge = self.bridge.merge(self.context.current_mut(), &event);
            return self.toggle_dropped(event, merge);
        }

        let delivery = self.send_point(&CompletionBridge::outbound(event.clone()));
        if !delivery.is_handed() {
            debug!(
                action = %event.action_identifier,
                "Toggle not delivered; mirror left unchanged"
            );
            return ToggleOutcome {
                merge: None,
                push: None,
                message: Some(delivery),
            };
        }

        let merge = self.bridge.merge(self.context.current_mut(), &event);
        if let MergeOutcome::Applied { changed, .. } = merge {
            self.announce_local_merge(&event, changed);
        }

        ToggleOutcome {
            merge: Some(merge),
            push: None,
            message: Some(delivery),
        }
    }

    fn toggle_dropped(&self, event: CompletionEvent, merge: MergeOutcome) -> ToggleOutcome {
        self.emit(SyncEvent::CompletionDropped(event));
        ToggleOutcome {
            merge: Some(merge),
            push: None,
            message: None,
        }
    }

    fn announce_local_merge(&self, event: &CompletionEvent, changed: bool) {
        self.refresh_content();
        self.emit(SyncEvent::CompletionMerged {
            event: event.clone(),
            changed,
            remote: false,
        });
    }

    // ========================================================================
    // Observable state
    // ========================================================================

    fn publish_connectivity(&mut self, state: ConnectivityState) {
        self.observed.write().connectivity = Some(state);
        self.sync_session_state();
        self.emit(SyncEvent::ConnectivityChanged(state));
        self.handlers.notify_connectivity(state);
    }

    fn sync_session_state(&self) {
        let state = self.session.state();
        let changed = {
            let mut observed = self.observed.write();
            let changed = observed.session != state;
            observed.session = state;
            changed
        };
        if changed {
            self.emit(SyncEvent::SessionStateChanged(state));
        }
    }

    fn refresh_content(&self) {
        self.observed.write().apply_snapshot(self.context.current());
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn stats(&self) -> EngineStats {
        EngineStats {
            dispatch: self.dispatcher.stats(),
            completions_applied: self.bridge.applied_count(),
            completions_unknown: self.bridge.unknown_count(),
            snapshots_received: self.context.received_count(),
        }
    }

    fn is_authoritative(&self) -> bool {
        self.config.role.is_authoritative()
    }

    fn require_authoritative(&self) -> SyncResult<()> {
        if self.is_authoritative() {
            Ok(())
        } else {
            warn!(role = %self.config.role, "Content update rejected on mirroring device");
            Err(SyncError::NotAuthoritative)
        }
    }
}

/// Cloneable caller-side API of a running [`CompanionEngine`]
#[derive(Clone)]
pub struct EngineHandle {
    tx: UnboundedSender<Command>,
    observed: Arc<RwLock<ObservedState>>,
    events: broadcast::Sender<SyncEvent>,
    config: Arc<EngineConfig>,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("role", &self.config.role)
            .field("running", &!self.tx.is_closed())
            .finish()
    }
}

impl EngineHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> SyncResult<T> {
        let (ack, rx) = oneshot::channel();
        self.tx
            .send(make(ack))
            .map_err(|_| SyncError::EngineStopped)?;
        rx.await.map_err(|_| SyncError::EngineStopped)
    }

    /// Bind the transport delegate and activate the session.
    ///
    /// Safe to call repeatedly: later calls replace the binding and do not
    /// activate again.
    pub async fn set_up(&self) -> SyncResult<SetupOutcome> {
        self.request(|ack| Command::SetUp { ack }).await
    }

    /// Set the mentor message and character, then push
    pub async fn update_mentor_message(
        &self,
        message: impl Into<String>,
        character: impl Into<String>,
    ) -> SyncResult<Delivery> {
        let message = message.into();
        let character = character.into();
        self.request(|ack| Command::UpdateMentorMessage {
            message,
            character,
            ack,
        })
        .await?
    }

    /// Replace the action list, then push
    pub async fn update_action_todos(
        &self,
        texts: Vec<String>,
        completion: Vec<bool>,
    ) -> SyncResult<Delivery> {
        if texts.len() != completion.len() {
            return Err(SyncError::LengthMismatch {
                texts: texts.len(),
                flags: completion.len(),
            });
        }
        self.request(|ack| Command::UpdateActionTodos {
            texts,
            completion,
            ack,
        })
        .await?
    }

    /// Replace the whole snapshot and push it (authoritative side).
    ///
    /// The timestamp is restamped on handoff.
    pub async fn push(&self, snapshot: ContextSnapshot) -> SyncResult<Delivery> {
        self.request(|ack| Command::Push { snapshot, ack }).await?
    }

    /// Toggle an action on this device and tell the peer
    pub async fn set_completion(
        &self,
        action_identifier: impl Into<String>,
        is_completed: bool,
    ) -> SyncResult<ToggleOutcome> {
        let event = CompletionEvent::new(action_identifier, is_completed);
        self.request(|ack| Command::SetCompletion { event, ack })
            .await
    }

    /// Replace the completion-received binding. Returns true if one was replaced.
    pub async fn register_completion_handler(&self, handler: CompletionHandler) -> SyncResult<bool> {
        self.request(|ack| Command::RegisterCompletionHandler {
            handler: Some(handler),
            ack,
        })
        .await
    }

    /// Remove the completion-received binding. Returns true if one was set.
    pub async fn clear_completion_handler(&self) -> SyncResult<bool> {
        self.request(|ack| Command::RegisterCompletionHandler { handler: None, ack })
            .await
    }

    /// Replace the connectivity-changed binding. Returns true if one was replaced.
    pub async fn register_connectivity_handler(
        &self,
        handler: ConnectivityHandler,
    ) -> SyncResult<bool> {
        self.request(|ack| Command::RegisterConnectivityHandler {
            handler: Some(handler),
            ack,
        })
        .await
    }

    /// Remove the connectivity-changed binding. Returns true if one was set.
    pub async fn clear_connectivity_handler(&self) -> SyncResult<bool> {
        self.request(|ack| Command::RegisterConnectivityHandler { handler: None, ack })
            .await
    }

    /// Fire-and-forget point message
    pub async fn send(&self, message: PointMessage) -> SyncResult<Delivery> {
        self.request(|ack| Command::Send { message, ack }).await
    }

    /// Point message expecting one reply; `on_reply` never runs if dropped
    pub async fn send_with_reply(
        &self,
        message: PointMessage,
        on_reply: ReplyHandler,
    ) -> SyncResult<Delivery> {
        self.request(|ack| Command::SendWithReply {
            message,
            on_reply,
            ack,
        })
        .await
    }

    /// Re-push the current snapshot (authoritative side)
    pub async fn push_now(&self) -> SyncResult<Delivery> {
        self.request(|ack| Command::PushNow { ack }).await
    }

    /// Ask the peer for its current snapshot
    pub async fn request_initial_data(&self) -> SyncResult<Delivery> {
        self.request(|ack| Command::RequestInitialData { ack }).await
    }

    /// The engine's local snapshot (authoritative content or mirror)
    pub async fn snapshot(&self) -> SyncResult<ContextSnapshot> {
        self.request(|ack| Command::Snapshot { ack }).await
    }

    /// Dispatch, merge and receipt counters
    pub async fn stats(&self) -> SyncResult<EngineStats> {
        self.request(|ack| Command::Stats { ack }).await
    }

    /// Wait until every command and callback queued before this call is processed
    pub async fn flush(&self) -> SyncResult<()> {
        self.request(|ack| Command::Flush { ack }).await
    }

    /// Stop the engine task
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.request(|ack| Command::Shutdown { ack }).await
    }

    /// Copy of the observable state
    pub fn observed(&self) -> ObservedState {
        self.observed.read().clone()
    }

    /// Latest published connectivity, `None` before activation
    pub fn connectivity(&self) -> Option<ConnectivityState> {
        self.observed.read().connectivity
    }

    /// New receiver for [`SyncEvent`]s emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Configuration the engine was spawned with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// False once the engine task has stopped
    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}
