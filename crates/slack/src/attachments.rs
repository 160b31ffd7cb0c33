//! Turns Slack file attachments into model content parts.
//!
//! Every file is handled independently. Unsupported types, failed downloads and
//! anything over a limit are skipped with a log line, never surfaced to the user.

use std::collections::HashMap;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{debug, info, warn};

use mooai_core::{
    attachments::{AttachmentBudget, AttachmentLimits, FileKind},
    domain::turn::ContentPart,
};

use crate::{
    sink::FileDownloader,
    thread::{FileDescriptor, SlackMessage},
};

/// Content parts per message timestamp. Messages without accepted files are absent.
pub type AttachmentMap = HashMap<String, Vec<ContentPart>>;

pub struct AttachmentExtractor {
    downloader: Arc<dyn FileDownloader>,
    limits: AttachmentLimits,
}

impl AttachmentExtractor {
    pub fn new(downloader: Arc<dyn FileDownloader>, limits: AttachmentLimits) -> Self {
        Self { downloader, limits }
    }

    /// A fresh budget is used for every call.
    pub async fn extract(&self, messages: &[SlackMessage]) -> AttachmentMap {
        let mut budget = AttachmentBudget::new(self.limits);
        let mut by_ts = AttachmentMap::new();

        for message in messages {
            let Some(ts) = message.ts.as_deref() else {
                continue;
            };
            if message.files.is_empty() {
                continue;
            }

            let mut parts = Vec::new();
            for file in &message.files {
                if let Some(part) = self.extract_file(file, &mut budget).await {
                    parts.push(part);
                }
            }

            if !parts.is_empty() {
                by_ts.insert(ts.to_owned(), parts);
            }
        }

        by_ts
    }

    async fn extract_file(
        &self,
        file: &FileDescriptor,
        budget: &mut AttachmentBudget,
    ) -> Option<ContentPart> {
        let filetype = file.filetype.as_deref().unwrap_or_default();
        let Some(kind) = FileKind::from_filetype(filetype) else {
            info!(
                event_name = "slack.attachment.skipped",
                file_id = %file.id,
                filetype,
                reason = "unsupported_type",
                "skipping unsupported file type"
            );
            return None;
        };

        let downloaded = match self.downloader.fetch_file(&file.id).await {
            Ok(downloaded) => downloaded,
            Err(error) => {
                warn!(
                    event_name = "slack.attachment.download_failed",
                    file_id = %file.id,
                    error = %error,
                    "failed to download attachment"
                );
                return None;
            }
        };
        let bytes = downloaded.bytes.len() as u64;

        match kind {
            FileKind::Image { mime } => {
                if let Err(rejection) = budget.check_image(bytes) {
                    warn!(
                        event_name = "slack.attachment.skipped",
                        file_id = %file.id,
                        reason = %rejection,
                        "image rejected"
                    );
                    return None;
                }
                Some(ContentPart::Image {
                    mime: mime.to_owned(),
                    base64: STANDARD.encode(&downloaded.bytes),
                })
            }
            FileKind::Document { mime } => {
                if let Err(rejection) = budget.check_document_size(bytes) {
                    warn!(
                        event_name = "slack.attachment.skipped",
                        file_id = %file.id,
                        reason = %rejection,
                        "document rejected before page count"
                    );
                    return None;
                }
                let Some(pages) = count_pdf_pages(&downloaded.bytes) else {
                    warn!(
                        event_name = "slack.attachment.skipped",
                        file_id = %file.id,
                        filename = %downloaded.filename,
                        reason = "unknown_page_count",
                        "could not determine PDF page count"
                    );
                    return None;
                };
                if let Err(rejection) = budget.admit_document(&file.id, bytes, pages) {
                    warn!(
                        event_name = "slack.attachment.skipped",
                        file_id = %file.id,
                        bytes,
                        pages,
                        reason = %rejection,
                        "document rejected by request budget"
                    );
                    return None;
                }

                info!(
                    event_name = "slack.attachment.admitted",
                    file_id = %file.id,
                    filename = %downloaded.filename,
                    bytes,
                    pages,
                    total_bytes = budget.total_document_bytes(),
                    total_pages = budget.total_document_pages(),
                    "document admitted"
                );
                Some(ContentPart::Document {
                    filename: downloaded.filename,
                    mime: mime.to_owned(),
                    base64: STANDARD.encode(&downloaded.bytes),
                })
            }
        }
    }
}

/// Page count from the document's page tree, or `None` when the file does not parse.
pub fn count_pdf_pages(bytes: &[u8]) -> Option<u32> {
    let document = match lopdf::Document::load_mem(bytes) {
        Ok(document) => document,
        Err(error) => {
            debug!(
                event_name = "slack.attachment.pdf_unreadable",
                error = %error,
                "PDF did not parse"
            );
            return None;
        }
    };
    u32::try_from(document.get_pages().len()).ok().filter(|pages| *pages > 0)
}
