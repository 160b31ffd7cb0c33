use async_trait::async_trait;
use tracing::debug;

use mooai_core::{
    domain::reply::{AgentReply, StructuredResult},
    prompts::FOLLOWUP_PROMPTS_TITLE,
};

use crate::{
    api::SlackApiError,
    blocks::{reply_message, Block},
    markdown::markdown_to_mrkdwn,
    sink::{AssistantSink, MessageSink},
};

/// Where a reply is rendered. Only assistant threads have titles and suggested prompts.
#[derive(Clone, Copy)]
pub enum PresentationTarget<'a> {
    AssistantThread(&'a dyn AssistantSink),
    ChannelThread(&'a dyn MessageSink),
}

#[async_trait]
impl MessageSink for PresentationTarget<'_> {
    async fn send_message(
        &self,
        text: &str,
        blocks: Option<&[Block]>,
    ) -> Result<(), SlackApiError> {
        match self {
            Self::AssistantThread(sink) => sink.send_message(text, blocks).await,
            Self::ChannelThread(sink) => sink.send_message(text, blocks).await,
        }
    }
}

pub async fn present(
    reply: &AgentReply,
    target: PresentationTarget<'_>,
) -> Result<(), SlackApiError> {
    match reply {
        AgentReply::Text(text) => target.send_message(&markdown_to_mrkdwn(text), None).await,
        AgentReply::Structured(result) => present_structured(result, target).await,
    }
}

async fn present_structured(
    result: &StructuredResult,
    target: PresentationTarget<'_>,
) -> Result<(), SlackApiError> {
    let thread_title = result.thread_title.as_deref().map(str::trim);
    if let Some(title) = thread_title.filter(|title| !title.is_empty()) {
        match target {
            PresentationTarget::AssistantThread(sink) => sink.set_title(title).await?,
            PresentationTarget::ChannelThread(_) => {
                debug!(event_name = "slack.present.title_skipped", "channel threads have no title");
            }
        }
    }

    let body = markdown_to_mrkdwn(&result.response);
    let message = reply_message(result.message_title.as_deref(), &body);
    target.send_message(&message.fallback_text, Some(&message.blocks)).await?;

    let prompts = result.suggested_prompts();
    if prompts.is_empty() {
        return Ok(());
    }
    match target {
        PresentationTarget::AssistantThread(sink) => {
            sink.set_suggested_prompts(&prompts, Some(FOLLOWUP_PROMPTS_TITLE)).await
        }
        PresentationTarget::ChannelThread(_) => {
            debug!(
                event_name = "slack.present.followups_skipped",
                count = prompts.len(),
                "channel threads have no suggested prompts"
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use mooai_core::{
        domain::reply::{AgentReply, StructuredResult, SuggestedPrompt, ERROR_MESSAGE_TITLE},
        prompts::FOLLOWUP_PROMPTS_TITLE,
    };

    use super::{present, PresentationTarget};
    use crate::blocks::{Block, TextObject};
    use crate::sink::fakes::{RecordingSink, SinkCall};

    fn structured() -> StructuredResult {
        StructuredResult {
            thread_title: Some("🐮 Cow facts".to_owned()),
            message_title: Some("🥛 Milk".to_owned()),
            response: "Cows have **four** stomach compartments.".to_owned(),
            followups: Some(vec!["🐄 Why four?".to_owned(), "🌾 What do cows eat?".to_owned()]),
        }
    }

    #[tokio::test]
    async fn plain_text_is_sent_verbatim_when_no_markdown() {
        let sink = RecordingSink::default();
        present(&AgentReply::Text("hello!".to_owned()), PresentationTarget::AssistantThread(&sink))
            .await
            .expect("present");

        assert_eq!(
            sink.calls().await,
            vec![SinkCall::Message { text: "hello!".to_owned(), blocks: Vec::new() }]
        );
    }

    #[tokio::test]
    async fn structured_reply_sets_title_then_body_then_followups() {
        let sink = RecordingSink::default();
        present(&AgentReply::Structured(structured()), PresentationTarget::AssistantThread(&sink))
            .await
            .expect("present");

        let calls = sink.calls().await;
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], SinkCall::Title("🐮 Cow facts".to_owned()));

        let SinkCall::Message { text, blocks } = &calls[1] else {
            panic!("expected message, got {:?}", calls[1]);
        };
        assert_eq!(text, "Cows have *four* stomach compartments.");
        assert!(matches!(
            &blocks[0],
            Block::Header { text: TextObject::Plain { text, .. }, .. } if text == "🥛 Milk"
        ));

        assert_eq!(
            calls[2],
            SinkCall::Prompts {
                prompts: vec![
                    SuggestedPrompt::same("🐄 Why four?"),
                    SuggestedPrompt::same("🌾 What do cows eat?"),
                ],
                title: Some(FOLLOWUP_PROMPTS_TITLE.to_owned()),
            }
        );
    }

    #[tokio::test]
    async fn channel_thread_gets_body_only() {
        let sink = RecordingSink::default();
        present(&AgentReply::Structured(structured()), PresentationTarget::ChannelThread(&sink))
            .await
            .expect("present");

        let calls = sink.calls().await;
        assert_eq!(calls.len(), 1);
        assert!(matches!(calls[0], SinkCall::Message { .. }));
    }

    #[tokio::test]
    async fn degraded_result_renders_error_header_without_title_or_prompts() {
        let sink = RecordingSink::default();
        let degraded = StructuredResult::degraded("backend exploded");
        present(&AgentReply::Structured(degraded), PresentationTarget::AssistantThread(&sink))
            .await
            .expect("present");

        let calls = sink.calls().await;
        assert_eq!(calls.len(), 1);
        let SinkCall::Message { text, blocks } = &calls[0] else {
            panic!("expected message");
        };
        assert!(text.contains("I'm sorry, I encountered an error"));
        assert!(matches!(
            &blocks[0],
            Block::Header { text: TextObject::Plain { text, .. }, .. }
                if text == ERROR_MESSAGE_TITLE
        ));
    }

    #[tokio::test]
    async fn empty_followups_do_not_touch_prompts() {
        let sink = RecordingSink::default();
        let result = StructuredResult {
            thread_title: None,
            message_title: None,
            response: "ok".to_owned(),
            followups: Some(Vec::new()),
        };
        present(&AgentReply::Structured(result), PresentationTarget::AssistantThread(&sink))
            .await
            .expect("present");

        assert_eq!(sink.messages().await, vec!["ok".to_owned()]);
        assert_eq!(sink.calls().await.len(), 1);
    }
}
