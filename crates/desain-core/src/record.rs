use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DesainError;
use crate::wire;

/// Lifecycle stage of a design request.
///
/// The serialized form is the string the `desains` table stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "dalam antrian")]
    Queued,
    #[serde(rename = "proses")]
    InProgress,
    #[serde(rename = "revisi")]
    Revision,
    #[serde(rename = "selesai")]
    Done,
}

impl Status {
    pub const ALL: &[Status] = &[
        Status::Queued,
        Status::InProgress,
        Status::Revision,
        Status::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Queued => "dalam antrian",
            Status::InProgress => "proses",
            Status::Revision => "revisi",
            Status::Done => "selesai",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Status::Queued => "Queued",
            Status::InProgress => "In Progress",
            Status::Revision => "Revision",
            Status::Done => "Done",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "dalam antrian" => Some(Status::Queued),
            "proses" => Some(Status::InProgress),
            "revisi" => Some(Status::Revision),
            "selesai" => Some(Status::Done),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// The status-filtered lists a client works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusView {
    /// Freshly submitted and in-progress work.
    New,
    /// Results posted, waiting on the client.
    Revision,
    /// Approved work.
    Done,
}

impl StatusView {
    pub const ALL: &[StatusView] = &[StatusView::New, StatusView::Revision, StatusView::Done];

    pub fn statuses(&self) -> &'static [Status] {
        match self {
            StatusView::New => &[Status::Queued, Status::InProgress],
            StatusView::Revision => &[Status::Revision],
            StatusView::Done => &[Status::Done],
        }
    }

    pub fn includes(&self, status: Status) -> bool {
        self.statuses().contains(&status)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusView::New => "new",
            StatusView::Revision => "revision",
            StatusView::Done => "done",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "new" | "baru" => Some(StatusView::New),
            "revision" | "revisi" => Some(StatusView::Revision),
            "done" | "selesai" => Some(StatusView::Done),
            _ => None,
        }
    }
}

impl fmt::Display for StatusView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignRecord {
    #[serde(deserialize_with = "wire::string_or_number")]
    pub id: String,
    #[serde(rename = "nama_client")]
    pub client_name: String,
    #[serde(rename = "tanggal_briefing")]
    pub briefing_date: NaiveDate,
    #[serde(rename = "briefing", default, deserialize_with = "wire::null_as_default")]
    pub briefing_text: String,
    #[serde(rename = "files", default, deserialize_with = "wire::null_as_default")]
    pub reference_files: Vec<String>,
    #[serde(rename = "hasil_files", default, deserialize_with = "wire::null_as_default")]
    pub result_files: Vec<String>,
    pub status: Status,
    #[serde(
        rename = "briefing_dilihat",
        default = "wire::default_true",
        deserialize_with = "wire::null_as_true"
    )]
    pub briefing_seen: bool,
    #[serde(
        rename = "hasil_dilihat",
        default = "wire::default_true",
        deserialize_with = "wire::null_as_true"
    )]
    pub result_seen: bool,
    #[serde(rename = "user_id")]
    pub owner_user_id: String,
    pub created_at: DateTime<Utc>,
}

impl DesignRecord {
    /// Apply an already-guarded patch to this record in place.
    pub fn apply(&mut self, patch: &RecordPatch) {
        if let Some(ref text) = patch.briefing_text {
            self.briefing_text = text.clone();
        }
        if let Some(ref files) = patch.reference_files {
            self.reference_files = files.clone();
        }
        if let Some(ref files) = patch.result_files {
            self.result_files = files.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(seen) = patch.briefing_seen {
            self.briefing_seen = seen;
        }
        if let Some(seen) = patch.result_seen {
            self.result_seen = seen;
        }
    }

    /// Every blob URI the record references.
    pub fn attachment_urls(&self) -> impl Iterator<Item = &str> {
        self.reference_files
            .iter()
            .chain(self.result_files.iter())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRecord {
    #[serde(rename = "nama_client")]
    pub client_name: String,
    #[serde(rename = "tanggal_briefing")]
    pub briefing_date: NaiveDate,
    #[serde(rename = "briefing", default)]
    pub briefing_text: String,
    #[serde(rename = "user_id")]
    pub owner_user_id: String,
    #[serde(rename = "files", default)]
    pub reference_files: Vec<String>,
    pub status: Status,
}

impl CreateRecord {
    pub fn validate(&self) -> Result<(), DesainError> {
        if self.client_name.trim().is_empty() {
            return Err(DesainError::InvalidInput("client name is required".into()));
        }
        if self.owner_user_id.is_empty() {
            return Err(DesainError::InvalidInput("owner is required".into()));
        }
        if self.reference_files.iter().any(|f| f.is_empty()) {
            return Err(DesainError::InvalidInput("empty attachment reference".into()));
        }
        Ok(())
    }
}

/// A partial update. Only present fields are sent to the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
    #[serde(rename = "briefing", skip_serializing_if = "Option::is_none")]
    pub briefing_text: Option<String>,
    #[serde(rename = "files", skip_serializing_if = "Option::is_none")]
    pub reference_files: Option<Vec<String>>,
    #[serde(rename = "hasil_files", skip_serializing_if = "Option::is_none")]
    pub result_files: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(rename = "briefing_dilihat", skip_serializing_if = "Option::is_none")]
    pub briefing_seen: Option<bool>,
    #[serde(rename = "hasil_dilihat", skip_serializing_if = "Option::is_none")]
    pub result_seen: Option<bool>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        *self == RecordPatch::default()
    }

    /// Whether the patch edits client-authored content.
    pub fn touches_briefing(&self) -> bool {
        self.briefing_text.is_some() || self.reference_files.is_some()
    }

    /// Whether the patch edits designer-authored content.
    pub fn touches_results(&self) -> bool {
        self.result_files.is_some()
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Empty means any status.
    pub statuses: Vec<Status>,
    pub owner_user_id: Option<String>,
}

impl RecordFilter {
    pub fn for_view(view: StatusView, owner_user_id: Option<String>) -> Self {
        Self {
            statuses: view.statuses().to_vec(),
            owner_user_id,
        }
    }

    pub fn matches(&self, record: &DesignRecord) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&record.status))
            && self
                .owner_user_id
                .as_ref()
                .is_none_or(|owner| *owner == record.owner_user_id)
    }
}
