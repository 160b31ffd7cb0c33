//! The conversation flows behind each Slack event.
//!
//! Every flow owns its sink and reports failures to the user itself, so the
//! dispatcher only ever sees errors raised while sending that notice.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use mooai_agent::{AgentInvoker, InvokeError};
use mooai_core::{
    config::{ContinuationMode, LlmConfig},
    domain::{
        conversation::ConversationKey,
        reply::AgentReply,
        thread_state::{ThreadAction, ThreadEvent, ThreadState},
    },
    errors::DomainError,
    prompts::{starter_prompts, ASSISTANT_GREETING, MENTION_GREETING, THINKING_STATUS},
};

use crate::{
    api::SlackApiError,
    attachments::AttachmentExtractor,
    blocks::error_message,
    events::{
        ConversationService, EventContext, EventHandlerError, MentionEvent, ThreadReplyEvent,
        ThreadStartedEvent, UserMessageEvent,
    },
    formatter::format_turns,
    presentation::{present, PresentationTarget},
    sink::{AssistantSink, MessageSink, SinkFactory, ThreadFetcher},
    thread::SlackMessage,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssistantSettings {
    pub continuation_mode: ContinuationMode,
    pub structured_output: bool,
    pub system_instructions: Option<String>,
}

impl AssistantSettings {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            continuation_mode: config.continuation_mode,
            structured_output: config.structured_output,
            system_instructions: config.system_instructions.clone(),
        }
    }
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            continuation_mode: ContinuationMode::FullThread,
            structured_output: true,
            system_instructions: None,
        }
    }
}

#[derive(Debug, Error)]
enum FlowError {
    #[error(transparent)]
    Slack(#[from] SlackApiError),
    #[error(transparent)]
    Invoke(#[from] InvokeError),
    #[error(transparent)]
    Identity(#[from] DomainError),
}

/// One inbound message that needs an answer.
struct Question<'a> {
    user_id: &'a str,
    channel_id: &'a str,
    thread_ts: Option<&'a str>,
    text: &'a str,
}

enum Answer {
    Delivered,
    /// Identity was incomplete; the user has already been told.
    Abandoned,
}

type ThreadId = (String, String);

pub struct AssistantService {
    invoker: Arc<AgentInvoker>,
    sinks: Arc<dyn SinkFactory>,
    fetcher: Arc<dyn ThreadFetcher>,
    extractor: AttachmentExtractor,
    settings: AssistantSettings,
    threads: Mutex<HashMap<ThreadId, ThreadState>>,
}

impl AssistantService {
    pub fn new(
        invoker: Arc<AgentInvoker>,
        sinks: Arc<dyn SinkFactory>,
        fetcher: Arc<dyn ThreadFetcher>,
        extractor: AttachmentExtractor,
        settings: AssistantSettings,
    ) -> Self {
        Self {
            invoker,
            sinks,
            fetcher,
            extractor,
            settings,
            threads: Mutex::new(HashMap::new()),
        }
    }

    pub async fn thread_state(&self, channel_id: &str, thread_ts: &str) -> ThreadState {
        let threads = self.threads.lock().await;
        threads.get(&(channel_id.to_owned(), thread_ts.to_owned())).copied().unwrap_or_default()
    }

    async fn advance(
        &self,
        channel_id: &str,
        thread_ts: &str,
        event: ThreadEvent,
    ) -> Vec<ThreadAction> {
        let mut threads = self.threads.lock().await;
        let state = threads.entry((channel_id.to_owned(), thread_ts.to_owned())).or_default();
        match state.apply(event) {
            Ok(transition) => {
                debug!(
                    event_name = "slack.thread.transition",
                    channel_id,
                    thread_ts,
                    from = ?transition.from,
                    to = ?transition.to,
                    "thread state advanced"
                );
                *state = transition.to;
                transition.actions
            }
            Err(error) => {
                warn!(
                    event_name = "slack.thread.transition_rejected",
                    channel_id,
                    thread_ts,
                    error = %error,
                    "ignoring out-of-order thread event"
                );
                Vec::new()
            }
        }
    }

    /// Resets the thread and, unless the user was already told, posts the notice.
    async fn fail<S>(
        &self,
        channel_id: &str,
        thread_ts: &str,
        sink: &S,
        summary: Option<&str>,
        ctx: &EventContext,
    ) -> Result<(), SlackApiError>
    where
        S: MessageSink + ?Sized,
    {
        let actions = self.advance(channel_id, thread_ts, ThreadEvent::Failed).await;
        let Some(summary) = summary else {
            return Ok(());
        };
        if !actions.contains(&ThreadAction::NotifyError) {
            return Ok(());
        }
        let notice = error_message(summary, &ctx.correlation_id);
        sink.send_message(&notice.fallback_text, Some(&notice.blocks)).await
    }

    async fn settle(&self, channel_id: &str, thread_ts: &str) {
        self.advance(channel_id, thread_ts, ThreadEvent::ReplyDelivered).await;
        self.advance(channel_id, thread_ts, ThreadEvent::ReplySettled).await;
    }

    async fn answer(
        &self,
        question: &Question<'_>,
        target: PresentationTarget<'_>,
        ctx: &EventContext,
    ) -> Result<Answer, FlowError> {
        let reply = match self.settings.continuation_mode {
            ContinuationMode::FullThread => {
                let Some(messages) = fetch_thread_for(
                    self.fetcher.as_ref(),
                    Some(question.channel_id),
                    question.thread_ts,
                    &target,
                    &ctx.correlation_id,
                )
                .await?
                else {
                    return Ok(Answer::Abandoned);
                };
                let attachments = self.extractor.extract(&messages).await;
                let turns = format_turns(&messages, &attachments);
                self.invoker
                    .invoke(
                        &turns,
                        self.settings.system_instructions.as_deref(),
                        self.settings.structured_output,
                    )
                    .await?
            }
            ContinuationMode::ResponseHandle => {
                let key = ConversationKey::from_parts(
                    Some(question.user_id),
                    Some(question.channel_id),
                    question.thread_ts,
                )?;
                let text = self
                    .invoker
                    .invoke_single(
                        &key,
                        question.text,
                        self.settings.system_instructions.as_deref(),
                    )
                    .await?;
                AgentReply::Text(text)
            }
        };

        present(&reply, target).await?;
        Ok(Answer::Delivered)
    }

    /// Shared tail of every answering flow: invoke, present, settle or fail.
    async fn respond(
        &self,
        question: &Question<'_>,
        target: PresentationTarget<'_>,
        ctx: &EventContext,
    ) -> Result<(), SlackApiError> {
        let thread_ts = question.thread_ts.unwrap_or_default();
        let actions =
            self.advance(question.channel_id, thread_ts, ThreadEvent::UserMessageReceived).await;

        if actions.contains(&ThreadAction::SetThinkingStatus) {
            if let PresentationTarget::AssistantThread(sink) = target {
                if let Err(status_error) = sink.set_status(THINKING_STATUS).await {
                    warn!(
                        event_name = "slack.thread.status_failed",
                        correlation_id = %ctx.correlation_id,
                        channel_id = question.channel_id,
                        error = %status_error,
                        "could not set thinking status"
                    );
                }
            }
        }
        if !actions.contains(&ThreadAction::InvokeAgent) {
            return Ok(());
        }

        match self.answer(question, target, ctx).await {
            Ok(Answer::Delivered) => {
                info!(
                    event_name = "slack.reply.delivered",
                    correlation_id = %ctx.correlation_id,
                    channel_id = question.channel_id,
                    thread_ts,
                    "reply delivered"
                );
                self.settle(question.channel_id, thread_ts).await;
                Ok(())
            }
            Ok(Answer::Abandoned) => {
                self.fail(question.channel_id, thread_ts, &target, None, ctx).await
            }
            Err(flow_error) => {
                error!(
                    event_name = "slack.reply.failed",
                    correlation_id = %ctx.correlation_id,
                    channel_id = question.channel_id,
                    thread_ts,
                    error = %flow_error,
                    "failed to answer message"
                );
                let summary = flow_error.to_string();
                self.fail(question.channel_id, thread_ts, &target, Some(&summary), ctx).await
            }
        }
    }
}

#[async_trait]
impl ConversationService for AssistantService {
    async fn thread_started(
        &self,
        event: &ThreadStartedEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError> {
        let sink = self.sinks.assistant_thread(&event.channel_id, &event.thread_ts);
        let actions =
            self.advance(&event.channel_id, &event.thread_ts, ThreadEvent::ThreadStarted).await;

        let greeted = async {
            if actions.contains(&ThreadAction::SendGreeting) {
                sink.send_message(ASSISTANT_GREETING, None).await?;
            }
            if actions.contains(&ThreadAction::SetStarterPrompts) {
                sink.set_suggested_prompts(&starter_prompts(), None).await?;
            }
            Ok::<(), SlackApiError>(())
        }
        .await;

        if let Err(greeting_error) = greeted {
            error!(
                event_name = "slack.thread.greeting_failed",
                correlation_id = %ctx.correlation_id,
                channel_id = %event.channel_id,
                thread_ts = %event.thread_ts,
                error = %greeting_error,
                "failed to greet new assistant thread"
            );
            let summary = greeting_error.to_string();
            self.fail(&event.channel_id, &event.thread_ts, sink.as_ref(), Some(&summary), ctx)
                .await
                .map_err(|error| EventHandlerError::ThreadStarted(error.to_string()))?;
        }
        Ok(())
    }

    async fn user_message(
        &self,
        event: &UserMessageEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError> {
        let thread_ts = event.thread_ts.as_deref().or(event.ts.as_deref());
        let sink = self.sinks.assistant_thread(&event.channel_id, thread_ts.unwrap_or_default());
        let question = Question {
            user_id: &event.user_id,
            channel_id: &event.channel_id,
            thread_ts,
            text: &event.text,
        };
        self.respond(&question, PresentationTarget::AssistantThread(sink.as_ref()), ctx)
            .await
            .map_err(|error| EventHandlerError::UserMessage(error.to_string()))
    }

    async fn mention(
        &self,
        event: &MentionEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError> {
        let sink = self.sinks.channel_thread(&event.channel_id, &event.ts);
        sink.send_message(MENTION_GREETING, None)
            .await
            .map_err(|error| EventHandlerError::Mention(error.to_string()))?;

        let question = Question {
            user_id: &event.user_id,
            channel_id: &event.channel_id,
            thread_ts: Some(&event.ts),
            text: &event.text,
        };
        self.respond(&question, PresentationTarget::ChannelThread(sink.as_ref()), ctx)
            .await
            .map_err(|error| EventHandlerError::Mention(error.to_string()))
    }

    async fn thread_reply(
        &self,
        event: &ThreadReplyEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError> {
        let sink = self.sinks.channel_thread(&event.channel_id, &event.thread_ts);
        let question = Question {
            user_id: &event.user_id,
            channel_id: &event.channel_id,
            thread_ts: Some(&event.thread_ts),
            text: &event.text,
        };
        self.respond(&question, PresentationTarget::ChannelThread(sink.as_ref()), ctx)
            .await
            .map_err(|error| EventHandlerError::ThreadReply(error.to_string()))
    }
}

/// Reads a whole thread, or tells the user once and returns `None` when the
/// channel or thread identity is missing. No model call should follow a `None`.
pub async fn fetch_thread_for<S>(
    fetcher: &dyn ThreadFetcher,
    channel_id: Option<&str>,
    thread_ts: Option<&str>,
    sink: &S,
    correlation_id: &str,
) -> Result<Option<Vec<SlackMessage>>, SlackApiError>
where
    S: MessageSink + ?Sized,
{
    let channel_id = channel_id.map(str::trim).filter(|value| !value.is_empty());
    let thread_ts = thread_ts.map(str::trim).filter(|value| !value.is_empty());

    let (Some(channel_id), Some(thread_ts)) = (channel_id, thread_ts) else {
        error!(
            event_name = "slack.thread.missing_identity",
            correlation_id,
            has_channel = channel_id.is_some(),
            has_thread = thread_ts.is_some(),
            "cannot fetch thread without channel and thread identity"
        );
        let notice = error_message("missing channel or thread", correlation_id);
        sink.send_message(&notice.fallback_text, Some(&notice.blocks)).await?;
        return Ok(None);
    };

    let messages = fetcher.fetch_thread(channel_id, thread_ts).await?;
    debug!(
        event_name = "slack.thread.fetched",
        channel_id,
        thread_ts,
        messages = messages.len(),
        "fetched thread history"
    );
    Ok(Some(messages))
}
