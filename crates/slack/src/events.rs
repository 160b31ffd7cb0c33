use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    ThreadStarted(ThreadStartedEvent),
    UserMessage(UserMessageEvent),
    Mention(MentionEvent),
    ThreadReply(ThreadReplyEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::ThreadStarted(_) => SlackEventType::ThreadStarted,
            Self::UserMessage(_) => SlackEventType::UserMessage,
            Self::Mention(_) => SlackEventType::Mention,
            Self::ThreadReply(_) => SlackEventType::ThreadReply,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    pub fn channel_id(&self) -> Option<&str> {
        match self {
            Self::ThreadStarted(event) => Some(&event.channel_id),
            Self::UserMessage(event) => Some(&event.channel_id),
            Self::Mention(event) => Some(&event.channel_id),
            Self::ThreadReply(event) => Some(&event.channel_id),
            Self::Unsupported { .. } => None,
        }
    }

    pub fn thread_ts(&self) -> Option<&str> {
        match self {
            Self::ThreadStarted(event) => Some(&event.thread_ts),
            Self::UserMessage(event) => event.thread_ts.as_deref().or(event.ts.as_deref()),
            Self::Mention(event) => Some(&event.ts),
            Self::ThreadReply(event) => Some(&event.thread_ts),
            Self::Unsupported { .. } => None,
        }
    }

    /// Maps a raw Events API `event` object.
    ///
    /// Direct messages become user messages, `app_mention` becomes a mention or a
    /// thread reply depending on `thread_ts`. Bot traffic, edits and plain channel
    /// chatter are unsupported so the bot never answers itself.
    pub fn from_event_json(event: &Value) -> Self {
        let raw = match RawEvent::deserialize(event) {
            Ok(raw) => raw,
            Err(_) => {
                let event_type =
                    event.get("type").and_then(Value::as_str).unwrap_or("unknown").to_owned();
                return Self::Unsupported { event_type };
            }
        };
        let unsupported = || Self::Unsupported { event_type: raw.event_type.clone() };

        match raw.event_type.as_str() {
            "assistant_thread_started" => {
                let Some(thread) = raw.assistant_thread.clone() else {
                    return unsupported();
                };
                match (thread.user_id, thread.channel_id, thread.thread_ts) {
                    (Some(user_id), Some(channel_id), Some(thread_ts)) => {
                        Self::ThreadStarted(ThreadStartedEvent { user_id, channel_id, thread_ts })
                    }
                    _ => unsupported(),
                }
            }
            "message" => {
                let from_bot = raw.bot_id.is_some()
                    || raw.subtype.as_deref().is_some_and(|subtype| subtype != "file_share");
                if from_bot || raw.channel_type.as_deref() != Some("im") {
                    return unsupported();
                }
                let (Some(user_id), Some(channel_id)) = (raw.user.clone(), raw.channel.clone())
                else {
                    return unsupported();
                };
                Self::UserMessage(UserMessageEvent {
                    user_id,
                    channel_id,
                    ts: raw.ts.clone(),
                    thread_ts: raw.thread_ts.clone(),
                    text: raw.text.clone().unwrap_or_default(),
                })
            }
            "app_mention" => {
                let (Some(user_id), Some(channel_id), Some(ts)) =
                    (raw.user.clone(), raw.channel.clone(), raw.ts.clone())
                else {
                    return unsupported();
                };
                let text = raw.text.clone().unwrap_or_default();
                match raw.thread_ts.clone().filter(|thread_ts| *thread_ts != ts) {
                    Some(thread_ts) => Self::ThreadReply(ThreadReplyEvent {
                        user_id,
                        channel_id,
                        ts,
                        thread_ts,
                        text,
                    }),
                    None => Self::Mention(MentionEvent { user_id, channel_id, ts, text }),
                }
            }
            _ => unsupported(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    ThreadStarted,
    UserMessage,
    Mention,
    ThreadReply,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadStartedEvent {
    pub user_id: String,
    pub channel_id: String,
    pub thread_ts: String,
}

/// A message in the assistant's direct-message surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserMessageEvent {
    pub user_id: String,
    pub channel_id: String,
    pub ts: Option<String>,
    pub thread_ts: Option<String>,
    pub text: String,
}

/// Top-level `@mention` in a channel; the reply opens a thread under `ts`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MentionEvent {
    pub user_id: String,
    pub channel_id: String,
    pub ts: String,
    pub text: String,
}

/// `@mention` inside an existing channel thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadReplyEvent {
    pub user_id: String,
    pub channel_id: String,
    pub ts: String,
    pub thread_ts: String,
    pub text: String,
}

#[derive(Clone, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    subtype: Option<String>,
    user: Option<String>,
    bot_id: Option<String>,
    channel: Option<String>,
    channel_type: Option<String>,
    text: Option<String>,
    ts: Option<String>,
    thread_ts: Option<String>,
    assistant_thread: Option<RawAssistantThread>,
}

#[derive(Clone, Deserialize)]
struct RawAssistantThread {
    user_id: Option<String>,
    channel_id: Option<String>,
    thread_ts: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("thread start handler failure: {0}")]
    ThreadStarted(String),
    #[error("user message handler failure: {0}")]
    UserMessage(String),
    #[error("mention handler failure: {0}")]
    Mention(String),
    #[error("thread reply handler failure: {0}")]
    ThreadReply(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// Everything the assistant reacts to. Implementations own their sinks and
/// report failures to the user themselves; an `Err` here is only logged.
#[async_trait]
pub trait ConversationService: Send + Sync {
    async fn thread_started(
        &self,
        event: &ThreadStartedEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError>;

    async fn user_message(
        &self,
        event: &UserMessageEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError>;

    async fn mention(
        &self,
        event: &MentionEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError>;

    async fn thread_reply(
        &self,
        event: &ThreadReplyEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError>;
}

/// Registers one handler per supported event type, all backed by `service`.
pub fn conversation_dispatcher<S>(service: Arc<S>) -> EventDispatcher
where
    S: ConversationService + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(ThreadStartedHandler { service: service.clone() });
    dispatcher.register(UserMessageHandler { service: service.clone() });
    dispatcher.register(MentionHandler { service: service.clone() });
    dispatcher.register(ThreadReplyHandler { service });
    dispatcher
}

pub struct ThreadStartedHandler<S> {
    service: Arc<S>,
}

#[async_trait]
impl<S> EventHandler for ThreadStartedHandler<S>
where
    S: ConversationService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::ThreadStarted
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::ThreadStarted(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        self.service.thread_started(event, ctx).await?;
        Ok(HandlerResult::Processed)
    }
}

pub struct UserMessageHandler<S> {
    service: Arc<S>,
}

#[async_trait]
impl<S> EventHandler for UserMessageHandler<S>
where
    S: ConversationService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::UserMessage
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::UserMessage(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        self.service.user_message(event, ctx).await?;
        Ok(HandlerResult::Processed)
    }
}

pub struct MentionHandler<S> {
    service: Arc<S>,
}

#[async_trait]
impl<S> EventHandler for MentionHandler<S>
where
    S: ConversationService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::Mention
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Mention(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        self.service.mention(event, ctx).await?;
        Ok(HandlerResult::Processed)
    }
}

pub struct ThreadReplyHandler<S> {
    service: Arc<S>,
}

#[async_trait]
impl<S> EventHandler for ThreadReplyHandler<S>
where
    S: ConversationService + 'static,
{
    fn event_type(&self) -> SlackEventType {
        SlackEventType::ThreadReply
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::ThreadReply(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        self.service.thread_reply(event, ctx).await?;
        Ok(HandlerResult::Processed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex;

    use super::{
        conversation_dispatcher, ConversationService, EventContext, EventDispatcher,
        EventHandlerError, HandlerResult, MentionEvent, SlackEnvelope, SlackEvent,
        ThreadReplyEvent, ThreadStartedEvent, UserMessageEvent,
    };

    #[derive(Default)]
    struct RecordingService {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ConversationService for RecordingService {
        async fn thread_started(
            &self,
            event: &ThreadStartedEvent,
            _ctx: &EventContext,
        ) -> Result<(), EventHandlerError> {
            self.seen.lock().await.push(format!("started:{}", event.thread_ts));
            Ok(())
        }

        async fn user_message(
            &self,
            event: &UserMessageEvent,
            _ctx: &EventContext,
        ) -> Result<(), EventHandlerError> {
            self.seen.lock().await.push(format!("message:{}", event.text));
            Ok(())
        }

        async fn mention(
            &self,
            event: &MentionEvent,
            _ctx: &EventContext,
        ) -> Result<(), EventHandlerError> {
            self.seen.lock().await.push(format!("mention:{}", event.ts));
            Err(EventHandlerError::Mention("boom".to_owned()))
        }

        async fn thread_reply(
            &self,
            event: &ThreadReplyEvent,
            _ctx: &EventContext,
        ) -> Result<(), EventHandlerError> {
            self.seen.lock().await.push(format!("reply:{}", event.thread_ts));
            Ok(())
        }
    }

    fn envelope(event: SlackEvent) -> SlackEnvelope {
        SlackEnvelope { envelope_id: "env-1".to_owned(), event }
    }

    #[test]
    fn maps_assistant_thread_started() {
        let event = SlackEvent::from_event_json(&json!({
            "type": "assistant_thread_started",
            "assistant_thread": { "user_id": "U1", "channel_id": "D1", "thread_ts": "1.0" }
        }));

        assert_eq!(
            event,
            SlackEvent::ThreadStarted(ThreadStartedEvent {
                user_id: "U1".to_owned(),
                channel_id: "D1".to_owned(),
                thread_ts: "1.0".to_owned(),
            })
        );
    }

    #[test]
    fn maps_file_share_direct_message_and_ignores_bot_echo() {
        let event = SlackEvent::from_event_json(&json!({
            "type": "message",
            "subtype": "file_share",
            "channel_type": "im",
            "user": "U1",
            "channel": "D1",
            "ts": "1.1",
            "thread_ts": "1.0",
            "text": "what is this?",
            "files": [{ "id": "F1", "filetype": "png" }]
        }));
        let SlackEvent::UserMessage(message) = event else {
            panic!("expected user message, got {event:?}");
        };
        assert_eq!(message.thread_ts.as_deref(), Some("1.0"));
        assert_eq!(message.text, "what is this?");

        let echo = SlackEvent::from_event_json(&json!({
            "type": "message",
            "channel_type": "im",
            "bot_id": "B1",
            "channel": "D1",
            "ts": "1.2",
            "text": "hello!"
        }));
        assert!(matches!(echo, SlackEvent::Unsupported { .. }));

        let channel_chatter = SlackEvent::from_event_json(&json!({
            "type": "message",
            "channel_type": "channel",
            "user": "U1",
            "channel": "C1",
            "ts": "1.3",
            "text": "lunch?"
        }));
        assert!(matches!(channel_chatter, SlackEvent::Unsupported { .. }));
    }

    #[test]
    fn app_mention_splits_on_thread_ts() {
        let top_level = SlackEvent::from_event_json(&json!({
            "type": "app_mention", "user": "U1", "channel": "C1", "ts": "5.0", "text": "<@B> hi"
        }));
        assert!(matches!(top_level, SlackEvent::Mention(ref event) if event.ts == "5.0"));
        assert_eq!(top_level.thread_ts(), Some("5.0"));

        let in_thread = SlackEvent::from_event_json(&json!({
            "type": "app_mention", "user": "U1", "channel": "C1",
            "ts": "5.2", "thread_ts": "5.0", "text": "<@B> more"
        }));
        assert!(matches!(
            in_thread,
            SlackEvent::ThreadReply(ref event) if event.thread_ts == "5.0"
        ));
    }

    #[test]
    fn unknown_or_malformed_events_are_unsupported() {
        assert_eq!(
            SlackEvent::from_event_json(&json!({ "type": "reaction_added" })),
            SlackEvent::Unsupported { event_type: "reaction_added".to_owned() }
        );
        assert!(matches!(
            SlackEvent::from_event_json(&json!({ "type": "assistant_thread_started" })),
            SlackEvent::Unsupported { .. }
        ));
        assert!(matches!(
            SlackEvent::from_event_json(&json!({ "no_type": true })),
            SlackEvent::Unsupported { .. }
        ));
    }

    #[tokio::test]
    async fn dispatcher_routes_each_event_type_to_the_service() {
        let service = Arc::new(RecordingService::default());
        let dispatcher = conversation_dispatcher(service.clone());
        assert_eq!(dispatcher.handler_count(), 4);

        let ctx = EventContext::default();
        let started = envelope(SlackEvent::ThreadStarted(ThreadStartedEvent {
            user_id: "U1".to_owned(),
            channel_id: "D1".to_owned(),
            thread_ts: "1.0".to_owned(),
        }));
        let reply = envelope(SlackEvent::ThreadReply(ThreadReplyEvent {
            user_id: "U1".to_owned(),
            channel_id: "C1".to_owned(),
            ts: "2.1".to_owned(),
            thread_ts: "2.0".to_owned(),
            text: "again".to_owned(),
        }));

        assert_eq!(dispatcher.dispatch(&started, &ctx).await, Ok(HandlerResult::Processed));
        assert_eq!(dispatcher.dispatch(&reply, &ctx).await, Ok(HandlerResult::Processed));
        assert_eq!(*service.seen.lock().await, vec!["started:1.0", "reply:2.0"]);
    }

    #[tokio::test]
    async fn dispatcher_surfaces_handler_errors() {
        let dispatcher = conversation_dispatcher(Arc::new(RecordingService::default()));
        let mention = envelope(SlackEvent::Mention(MentionEvent {
            user_id: "U1".to_owned(),
            channel_id: "C1".to_owned(),
            ts: "3.0".to_owned(),
            text: "hi".to_owned(),
        }));

        let result = dispatcher.dispatch(&mention, &EventContext::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn dispatcher_returns_ignored_when_no_handler_registered() {
        let dispatcher = EventDispatcher::new();
        let result = dispatcher
            .dispatch(
                &envelope(SlackEvent::Unsupported { event_type: "hello".to_owned() }),
                &EventContext::default(),
            )
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
    }
}
