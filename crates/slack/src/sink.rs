use std::sync::Arc;

use async_trait::async_trait;

use mooai_core::domain::reply::SuggestedPrompt;

use crate::{
    api::{SlackApiError, SlackWebClient},
    blocks::Block,
    thread::{DownloadedFile, SlackMessage},
};

/// Posts into one conversation thread.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send_message(
        &self,
        text: &str,
        blocks: Option<&[Block]>,
    ) -> Result<(), SlackApiError>;
}

/// Extra surfaces only an assistant thread has.
#[async_trait]
pub trait AssistantSink: MessageSink {
    async fn set_title(&self, title: &str) -> Result<(), SlackApiError>;
    async fn set_suggested_prompts(
        &self,
        prompts: &[SuggestedPrompt],
        title: Option<&str>,
    ) -> Result<(), SlackApiError>;
    async fn set_status(&self, status: &str) -> Result<(), SlackApiError>;
}

#[async_trait]
pub trait ThreadFetcher: Send + Sync {
    async fn fetch_thread(
        &self,
        channel_id: &str,
        thread_ts: &str,
    ) -> Result<Vec<SlackMessage>, SlackApiError>;
}

#[async_trait]
pub trait FileDownloader: Send + Sync {
    async fn fetch_file(&self, file_id: &str) -> Result<DownloadedFile, SlackApiError>;
}

#[async_trait]
impl ThreadFetcher for SlackWebClient {
    async fn fetch_thread(
        &self,
        channel_id: &str,
        thread_ts: &str,
    ) -> Result<Vec<SlackMessage>, SlackApiError> {
        SlackWebClient::fetch_thread(self, channel_id, thread_ts).await
    }
}

#[async_trait]
impl FileDownloader for SlackWebClient {
    async fn fetch_file(&self, file_id: &str) -> Result<DownloadedFile, SlackApiError> {
        SlackWebClient::fetch_file(self, file_id).await
    }
}

/// Sink bound to a `(channel, thread_ts)` pair.
#[derive(Clone)]
pub struct SlackThreadSink {
    client: Arc<SlackWebClient>,
    channel_id: String,
    thread_ts: String,
}

impl SlackThreadSink {
    pub fn new(
        client: Arc<SlackWebClient>,
        channel_id: impl Into<String>,
        thread_ts: impl Into<String>,
    ) -> Self {
        Self { client, channel_id: channel_id.into(), thread_ts: thread_ts.into() }
    }
}

#[async_trait]
impl MessageSink for SlackThreadSink {
    async fn send_message(
        &self,
        text: &str,
        blocks: Option<&[Block]>,
    ) -> Result<(), SlackApiError> {
        self.client.post_message(&self.channel_id, Some(&self.thread_ts), text, blocks).await?;
        Ok(())
    }
}

#[async_trait]
impl AssistantSink for SlackThreadSink {
    async fn set_title(&self, title: &str) -> Result<(), SlackApiError> {
        self.client.set_title(&self.channel_id, &self.thread_ts, title).await
    }

    async fn set_suggested_prompts(
        &self,
        prompts: &[SuggestedPrompt],
        title: Option<&str>,
    ) -> Result<(), SlackApiError> {
        self.client.set_suggested_prompts(&self.channel_id, &self.thread_ts, prompts, title).await
    }

    async fn set_status(&self, status: &str) -> Result<(), SlackApiError> {
        self.client.set_status(&self.channel_id, &self.thread_ts, status).await
    }
}

/// Hands out sinks bound to a thread. Assistant threads and channel threads are
/// distinct surfaces even though Slack serves both through the same client.
pub trait SinkFactory: Send + Sync {
    fn assistant_thread(&self, channel_id: &str, thread_ts: &str) -> Arc<dyn AssistantSink>;
    fn channel_thread(&self, channel_id: &str, thread_ts: &str) -> Arc<dyn MessageSink>;
}

#[derive(Clone)]
pub struct SlackSinks {
    client: Arc<SlackWebClient>,
}

impl SlackSinks {
    pub fn new(client: Arc<SlackWebClient>) -> Self {
        Self { client }
    }
}

impl SinkFactory for SlackSinks {
    fn assistant_thread(&self, channel_id: &str, thread_ts: &str) -> Arc<dyn AssistantSink> {
        Arc::new(SlackThreadSink::new(self.client.clone(), channel_id, thread_ts))
    }

    fn channel_thread(&self, channel_id: &str, thread_ts: &str) -> Arc<dyn MessageSink> {
        Arc::new(SlackThreadSink::new(self.client.clone(), channel_id, thread_ts))
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use mooai_core::domain::reply::SuggestedPrompt;

    use super::{AssistantSink, FileDownloader, MessageSink, SinkFactory, ThreadFetcher};
    use crate::{
        api::SlackApiError,
        blocks::Block,
        thread::{DownloadedFile, SlackMessage},
    };

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum SinkCall {
        Message { text: String, blocks: Vec<Block> },
        Title(String),
        Prompts { prompts: Vec<SuggestedPrompt>, title: Option<String> },
        Status(String),
    }

    /// Records every sink call in order.
    #[derive(Default)]
    pub struct RecordingSink {
        calls: Mutex<Vec<SinkCall>>,
    }

    impl RecordingSink {
        pub async fn calls(&self) -> Vec<SinkCall> {
            self.calls.lock().await.clone()
        }

        pub async fn messages(&self) -> Vec<String> {
            self.calls
                .lock()
                .await
                .iter()
                .filter_map(|call| match call {
                    SinkCall::Message { text, .. } => Some(text.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn send_message(
            &self,
            text: &str,
            blocks: Option<&[Block]>,
        ) -> Result<(), SlackApiError> {
            self.calls.lock().await.push(SinkCall::Message {
                text: text.to_owned(),
                blocks: blocks.map(<[Block]>::to_vec).unwrap_or_default(),
            });
            Ok(())
        }
    }

    #[async_trait]
    impl AssistantSink for RecordingSink {
        async fn set_title(&self, title: &str) -> Result<(), SlackApiError> {
            self.calls.lock().await.push(SinkCall::Title(title.to_owned()));
            Ok(())
        }

        async fn set_suggested_prompts(
            &self,
            prompts: &[SuggestedPrompt],
            title: Option<&str>,
        ) -> Result<(), SlackApiError> {
            self.calls.lock().await.push(SinkCall::Prompts {
                prompts: prompts.to_vec(),
                title: title.map(str::to_owned),
            });
            Ok(())
        }

        async fn set_status(&self, status: &str) -> Result<(), SlackApiError> {
            self.calls.lock().await.push(SinkCall::Status(status.to_owned()));
            Ok(())
        }
    }

    /// Every thread resolves to the same recorder, tagged with where it was opened.
    #[derive(Default)]
    pub struct RecordingSinks {
        pub sink: Arc<RecordingSink>,
        opened: std::sync::Mutex<Vec<(&'static str, String, String)>>,
    }

    impl RecordingSinks {
        pub fn opened(&self) -> Vec<(&'static str, String, String)> {
            self.opened.lock().map(|opened| opened.clone()).unwrap_or_default()
        }

        fn record(&self, surface: &'static str, channel_id: &str, thread_ts: &str) {
            if let Ok(mut opened) = self.opened.lock() {
                opened.push((surface, channel_id.to_owned(), thread_ts.to_owned()));
            }
        }
    }

    impl SinkFactory for RecordingSinks {
        fn assistant_thread(&self, channel_id: &str, thread_ts: &str) -> Arc<dyn AssistantSink> {
            self.record("assistant", channel_id, thread_ts);
            self.sink.clone()
        }

        fn channel_thread(&self, channel_id: &str, thread_ts: &str) -> Arc<dyn MessageSink> {
            self.record("channel", channel_id, thread_ts);
            self.sink.clone()
        }
    }

    /// Serves files by id; unknown ids fail like a missing Slack file.
    #[derive(Default)]
    pub struct ScriptedDownloader {
        files: HashMap<String, DownloadedFile>,
        requests: Mutex<Vec<String>>,
    }

    impl ScriptedDownloader {
        pub fn with_file(mut self, id: &str, filename: &str, bytes: Vec<u8>) -> Self {
            self.files
                .insert(id.to_owned(), DownloadedFile { filename: filename.to_owned(), bytes });
            self
        }

        pub async fn requests(&self) -> Vec<String> {
            self.requests.lock().await.clone()
        }
    }

    #[async_trait]
    impl FileDownloader for ScriptedDownloader {
        async fn fetch_file(&self, file_id: &str) -> Result<DownloadedFile, SlackApiError> {
            self.requests.lock().await.push(file_id.to_owned());
            self.files.get(file_id).cloned().ok_or_else(|| SlackApiError::Api {
                method: "files.info".to_owned(),
                error: "file_not_found".to_owned(),
            })
        }
    }

    #[derive(Default)]
    pub struct ScriptedFetcher {
        threads: Mutex<VecDeque<Result<Vec<SlackMessage>, SlackApiError>>>,
        requests: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedFetcher {
        pub fn with_threads(threads: Vec<Result<Vec<SlackMessage>, SlackApiError>>) -> Self {
            Self { threads: Mutex::new(threads.into()), requests: Mutex::new(Vec::new()) }
        }

        pub async fn requests(&self) -> Vec<(String, String)> {
            self.requests.lock().await.clone()
        }
    }

    #[async_trait]
    impl ThreadFetcher for ScriptedFetcher {
        async fn fetch_thread(
            &self,
            channel_id: &str,
            thread_ts: &str,
        ) -> Result<Vec<SlackMessage>, SlackApiError> {
            self.requests.lock().await.push((channel_id.to_owned(), thread_ts.to_owned()));
            self.threads.lock().await.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }
}
