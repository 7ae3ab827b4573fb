//! Point-message dispatcher
//!
//! Small typed messages that travel outside the snapshot channel and need
//! the peer to be reachable right now.
//!
//! ## Wire format
//!
//! ```text
//! todo completion   { "action": "todoCompletion", "todoText": string, "isCompleted": bool }
//! initial data      { "request": "initialData" }          (expects a reply)
//! acknowledgement   { "status": "received" }              (reply only)
//! ```
//!
//! The discriminator is read from `action`, then `type`, then `request`.
//! Unknown discriminators and malformed bodies are logged and dropped so
//! that mismatched app versions on the two devices never crash each other.

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};
use crate::session::PeerSession;
use crate::transport::{Delivery, DropReason, ReplyHandler, Transport};
use crate::types::payload;
use crate::types::{CompletionEvent, Payload};

/// Primary discriminator key
pub const KEY_ACTION: &str = "action";
/// Legacy discriminator key
pub const KEY_TYPE: &str = "type";
/// Discriminator key for request messages
pub const KEY_REQUEST: &str = "request";
/// Acknowledgement key
pub const KEY_STATUS: &str = "status";

/// Discriminator value of a todo completion
pub const ACTION_TODO_COMPLETION: &str = "todoCompletion";
/// Discriminator value of an initial data request
pub const REQUEST_INITIAL_DATA: &str = "initialData";

/// Messages discriminated by `action`
#[derive(Serialize)]
#[serde(tag = "action")]
enum ActionWire<'a> {
    #[serde(rename = "todoCompletion")]
    TodoCompletion(&'a CompletionEvent),
}

/// Messages discriminated by `request`
#[derive(Serialize)]
#[serde(tag = "request")]
enum RequestWire {
    #[serde(rename = "initialData")]
    InitialData,
}

/// A decoded point message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointMessage {
    /// An action item was (un)completed on the sending device
    TodoCompletion(CompletionEvent),
    /// The sender wants the current snapshot as a reply
    InitialDataRequest,
}

impl PointMessage {
    /// The discriminator value written on the wire
    pub fn discriminator(&self) -> &'static str {
        match self {
            PointMessage::TodoCompletion(_) => ACTION_TODO_COMPLETION,
            PointMessage::InitialDataRequest => REQUEST_INITIAL_DATA,
        }
    }

    pub fn to_payload(&self) -> SyncResult<Payload> {
        match self {
            PointMessage::TodoCompletion(event) => {
                payload::encode(&ActionWire::TodoCompletion(event))
            }
            PointMessage::InitialDataRequest => payload::encode(&RequestWire::InitialData),
        }
    }

    /// Decode by discriminator: `action`, then `type`, then `request`.
    ///
    /// The message body is read independently of which key carried the
    /// discriminator, so older peers using `type` still decode.
    pub fn from_payload(payload: &Payload) -> SyncResult<Self> {
        let discriminator = [KEY_ACTION, KEY_TYPE, KEY_REQUEST]
            .iter()
            .find_map(|key| payload.get(*key).and_then(Value::as_str))
            .ok_or_else(|| SyncError::MalformedPayload("no message discriminator".to_string()))?;

        match discriminator {
            ACTION_TODO_COMPLETION => Ok(PointMessage::TodoCompletion(payload::decode(payload)?)),
            REQUEST_INITIAL_DATA => Ok(PointMessage::InitialDataRequest),
            other => Err(SyncError::UnknownMessage(other.to_string())),
        }
    }
}

/// `{"status": "received"}`
pub fn received_ack() -> Payload {
    let mut ack = Payload::new();
    ack.insert(KEY_STATUS.to_string(), Value::String("received".to_string()));
    ack
}

/// Counters for the point-message channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub sent: u64,
    pub dropped: u64,
    pub received: u64,
    pub rejected: u64,
}

/// Sends and demultiplexes point messages
#[derive(Debug, Default)]
pub struct Dispatcher {
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    /// Fire-and-forget. Dropped (not queued) when the peer is unreachable.
    pub fn send(&mut self, session: &PeerSession, message: &PointMessage) -> Delivery {
        self.deliver(session, message, None)
    }

    /// Send and expect one reply.
    ///
    /// `on_reply` runs at most once, on whatever context the transport
    /// delivers the reply; if the message is dropped it never runs.
    pub fn send_with_reply(
        &mut self,
        session: &PeerSession,
        message: &PointMessage,
        on_reply: ReplyHandler,
    ) -> Delivery {
        self.deliver(session, message, Some(on_reply))
    }

    fn deliver(
        &mut self,
        session: &PeerSession,
        message: &PointMessage,
        reply: Option<ReplyHandler>,
    ) -> Delivery {
        let kind = message.discriminator();

        let precheck = if session.is_inert() {
            Some(DropReason::Unsupported)
        } else if !session.is_activated() {
            Some(DropReason::NotActivated)
        } else if !session.is_reachable() {
            Some(DropReason::NotReachable)
        } else {
            None
        };
        if let Some(reason) = precheck {
            debug!(kind, %reason, "Point message dropped");
            self.stats.dropped += 1;
            return Delivery::Dropped(reason);
        }

        let payload = match message.to_payload() {
            Ok(payload) => payload,
            Err(error) => {
                warn!(kind, %error, "Point message could not be encoded");
                self.stats.dropped += 1;
                return Delivery::Dropped(DropReason::Rejected(error.to_string()));
            }
        };

        match session.transport().send_message(payload, reply) {
            Ok(()) => {
                debug!(kind, "Point message sent");
                self.stats.sent += 1;
                Delivery::Handed
            }
            Err(error) => {
                warn!(kind, %error, "Point message dropped by transport");
                self.stats.dropped += 1;
                Delivery::Dropped(error.into())
            }
        }
    }

    /// Decode an inbound payload, logging anything unusable.
    ///
    /// The error is returned for reporting only; callers drop the message.
    pub fn decode(&mut self, payload: &Payload) -> SyncResult<PointMessage> {
        let decoded = PointMessage::from_payload(payload);
        match &decoded {
            Ok(_) => self.stats.received += 1,
            Err(SyncError::UnknownMessage(kind)) => {
                warn!(%kind, "Dropping point message with unknown discriminator");
                self.stats.rejected += 1;
            }
            Err(error) => {
                warn!(%error, "Dropping malformed point message");
                self.stats.rejected += 1;
            }
        }
        decoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    use crate::transport::{LoopbackTransport, Transport, TransportDelegate, TransportError};
    use crate::types::ConnectivityState;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Inbox {
        messages: Mutex<Vec<Payload>>,
    }

    impl TransportDelegate for Inbox {
        fn on_activation_complete(&self, _: ConnectivityState, _: Option<TransportError>) {}
        fn on_reachability_changed(&self, _: bool) {}
        fn on_message_received(&self, payload: Payload, reply: Option<ReplyHandler>) {
            self.messages.lock().push(payload);
            if let Some(reply) = reply {
                reply(received_ack());
            }
        }
        fn on_context_received(&self, _: Payload) {}
        fn on_session_inactive(&self) {}
        fn on_session_deactivated(&self) {}
    }

    fn payload(value: serde_json::Value) -> Payload {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("test payload must be an object"),
        }
    }

    fn connected() -> (
        PeerSession,
        Arc<LoopbackTransport>,
        Arc<LoopbackTransport>,
        Arc<Inbox>,
    ) {
        let (transport, peer) = LoopbackTransport::pair();
        let inbox = Arc::new(Inbox::default());
        peer.set_delegate(inbox.clone());
        peer.activate();
        let mut session = PeerSession::new(transport.clone());
        session.set_up(Arc::new(Inbox::default()));
        session.on_activation_complete(transport.connectivity(), None);
        (session, transport, peer, inbox)
    }

    #[test]
    fn test_completion_wire_shape() {
        let message = PointMessage::TodoCompletion(CompletionEvent::new("walk", true));
        assert_eq!(
            serde_json::Value::Object(message.to_payload().unwrap()),
            json!({"action": "todoCompletion", "todoText": "walk", "isCompleted": true})
        );
    }

    #[test]
    fn test_initial_data_wire_shape() {
        assert_eq!(
            serde_json::Value::Object(PointMessage::InitialDataRequest.to_payload().unwrap()),
            json!({"request": "initialData"})
        );
    }

    #[test]
    fn test_completion_extra_keys_ignored() {
        let p = payload(json!({
            "action": "todoCompletion",
            "todoText": "walk",
            "isCompleted": true,
            "sentFrom": "watch"
        }));
        assert_eq!(
            PointMessage::from_payload(&p).unwrap(),
            PointMessage::TodoCompletion(CompletionEvent::new("walk", true))
        );
    }

    #[test]
    fn test_decode_legacy_type_discriminator() {
        let p = payload(json!({"type": "todoCompletion", "todoText": "walk", "isCompleted": false}));
        assert_eq!(
            PointMessage::from_payload(&p).unwrap(),
            PointMessage::TodoCompletion(CompletionEvent::new("walk", false))
        );
    }

    #[test]
    fn test_decode_initial_data_request() {
        let p = payload(json!({"request": "initialData"}));
        assert_eq!(
            PointMessage::from_payload(&p).unwrap(),
            PointMessage::InitialDataRequest
        );
    }

    #[test]
    fn test_unknown_discriminator_is_dropped() {
        let mut dispatcher = Dispatcher::new();
        let p = payload(json!({"action": "voiceRecording", "duration": 3.5}));
        assert!(dispatcher.decode(&p).is_err());
        assert_eq!(dispatcher.stats().rejected, 1);
        assert!(matches!(
            PointMessage::from_payload(&p),
            Err(SyncError::UnknownMessage(kind)) if kind == "voiceRecording"
        ));
    }

    #[test]
    fn test_missing_fields_are_dropped() {
        let mut dispatcher = Dispatcher::new();
        let p = payload(json!({"action": "todoCompletion", "todoText": "walk"}));
        assert!(dispatcher.decode(&p).is_err());
        let p = payload(json!({"todoText": "walk", "isCompleted": true}));
        assert!(dispatcher.decode(&p).is_err());
        assert_eq!(dispatcher.stats().rejected, 2);
    }

    #[test]
    fn test_send_when_unreachable_is_dropped() {
        let (mut session, transport, _peer, inbox) = connected();
        transport.set_link(ConnectivityState::new(true, true, false));
        session.on_reachability_changed(false);

        let mut dispatcher = Dispatcher::new();
        let message = PointMessage::TodoCompletion(CompletionEvent::new("walk", true));

        assert_eq!(
            dispatcher.send(&session, &message),
            Delivery::Dropped(DropReason::NotReachable)
        );
        assert!(inbox.messages.lock().is_empty());
        assert_eq!(dispatcher.stats().dropped, 1);
    }

    #[test]
    fn test_send_before_activation_is_dropped() {
        let (transport, _peer) = LoopbackTransport::pair();
        let session = PeerSession::new(transport);
        let mut dispatcher = Dispatcher::new();

        let delivery = dispatcher.send(&session, &PointMessage::InitialDataRequest);
        assert_eq!(delivery, Delivery::Dropped(DropReason::NotActivated));
    }

    #[test]
    fn test_send_with_reply_invokes_handler_once() {
        let (session, _transport, _peer, inbox) = connected();
        let replies = Arc::new(Mutex::new(Vec::new()));
        let sink = replies.clone();

        let mut dispatcher = Dispatcher::new();
        let delivery = dispatcher.send_with_reply(
            &session,
            &PointMessage::InitialDataRequest,
            Box::new(move |reply: Payload| sink.lock().push(reply)),
        );

        assert!(delivery.is_handed());
        assert_eq!(inbox.messages.lock().len(), 1);
        assert_eq!(*replies.lock(), vec![received_ack()]);
    }
}
