//! Attachment eligibility rules and the per-fetch admission budget for documents.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const MIB: u64 = 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentLimits {
    pub max_image_bytes: u64,
    pub max_document_bytes: u64,
    pub max_document_pages: u32,
}

impl Default for AttachmentLimits {
    fn default() -> Self {
        Self { max_image_bytes: 20 * MIB, max_document_bytes: 32 * MIB, max_document_pages: 100 }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Image { mime: &'static str },
    Document { mime: &'static str },
}

impl FileKind {
    /// Maps a platform `filetype` to a supported kind. Unsupported types yield `None`.
    pub fn from_filetype(filetype: &str) -> Option<Self> {
        match filetype.trim().to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Document { mime: "application/pdf" }),
            "png" => Some(Self::Image { mime: "image/png" }),
            "jpg" | "jpeg" => Some(Self::Image { mime: "image/jpeg" }),
            "webp" => Some(Self::Image { mime: "image/webp" }),
            "gif" => Some(Self::Image { mime: "image/gif" }),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Image { mime } | Self::Document { mime } => mime,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AdmissionRejection {
    #[error("file `{file_id}` was already included")]
    AlreadyIncluded { file_id: String },
    #[error("file is {bytes} bytes, limit is {limit}")]
    FileTooLarge { bytes: u64, limit: u64 },
    #[error("document has {pages} pages, limit is {limit}")]
    TooManyPages { pages: u32, limit: u32 },
    #[error("document budget would reach {total} bytes, limit is {limit}")]
    ByteBudgetExceeded { total: u64, limit: u64 },
    #[error("document budget would reach {total} pages, limit is {limit}")]
    PageBudgetExceeded { total: u32, limit: u32 },
}

/// Running document totals for one conversation fetch.
///
/// Admission is greedy and order dependent: earlier documents win, and a later
/// document is refused as soon as either dimension would overflow.
#[derive(Clone, Debug)]
pub struct AttachmentBudget {
    limits: AttachmentLimits,
    total_document_bytes: u64,
    total_document_pages: u32,
    seen_ids: HashSet<String>,
}

impl AttachmentBudget {
    pub fn new(limits: AttachmentLimits) -> Self {
        Self { limits, total_document_bytes: 0, total_document_pages: 0, seen_ids: HashSet::new() }
    }

    pub fn limits(&self) -> AttachmentLimits {
        self.limits
    }

    pub fn total_document_bytes(&self) -> u64 {
        self.total_document_bytes
    }

    pub fn total_document_pages(&self) -> u32 {
        self.total_document_pages
    }

    pub fn check_image(&self, bytes: u64) -> Result<(), AdmissionRejection> {
        if bytes > self.limits.max_image_bytes {
            return Err(AdmissionRejection::FileTooLarge {
                bytes,
                limit: self.limits.max_image_bytes,
            });
        }
        Ok(())
    }

    /// Single-file size gate, applied before the document is parsed for pages.
    pub fn check_document_size(&self, bytes: u64) -> Result<(), AdmissionRejection> {
        if bytes > self.limits.max_document_bytes {
            return Err(AdmissionRejection::FileTooLarge {
                bytes,
                limit: self.limits.max_document_bytes,
            });
        }
        Ok(())
    }

    pub fn can_admit_document(
        &self,
        file_id: &str,
        bytes: u64,
        pages: u32,
    ) -> Result<(), AdmissionRejection> {
        if self.seen_ids.contains(file_id) {
            return Err(AdmissionRejection::AlreadyIncluded { file_id: file_id.to_owned() });
        }
        if pages > self.limits.max_document_pages {
            return Err(AdmissionRejection::TooManyPages {
                pages,
                limit: self.limits.max_document_pages,
            });
        }

        let total_bytes = self.total_document_bytes.saturating_add(bytes);
        if total_bytes > self.limits.max_document_bytes {
            return Err(AdmissionRejection::ByteBudgetExceeded {
                total: total_bytes,
                limit: self.limits.max_document_bytes,
            });
        }

        let total_pages = self.total_document_pages.saturating_add(pages);
        if total_pages > self.limits.max_document_pages {
            return Err(AdmissionRejection::PageBudgetExceeded {
                total: total_pages,
                limit: self.limits.max_document_pages,
            });
        }

        Ok(())
    }

    /// Checks and records a document in one step. Nothing changes on rejection.
    pub fn admit_document(
        &mut self,
        file_id: &str,
        bytes: u64,
        pages: u32,
    ) -> Result<(), AdmissionRejection> {
        self.can_admit_document(file_id, bytes, pages)?;
        self.total_document_bytes += bytes;
        self.total_document_pages += pages;
        self.seen_ids.insert(file_id.to_owned());
        Ok(())
    }
}

impl Default for AttachmentBudget {
    fn default() -> Self {
        Self::new(AttachmentLimits::default())
    }
}
