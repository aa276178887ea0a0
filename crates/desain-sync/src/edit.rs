use chrono::NaiveDate;
use desain_core::attachment::LocalFile;
use desain_core::record::{DesignRecord, RecordPatch};

use crate::AttachmentStaging;

/// Input for a new design request.
#[derive(Debug, Clone)]
pub struct NewDesign {
    pub client_name: String,
    pub briefing_date: NaiveDate,
    pub briefing_text: String,
    /// Uploaded in this order.
    pub files: Vec<LocalFile>,
}

/// An in-progress edit of a record's briefing and reference files.
#[derive(Debug, Clone)]
pub struct RecordEdit {
    record_id: String,
    original_briefing: String,
    pub briefing_text: String,
    pub attachments: AttachmentStaging,
}

impl RecordEdit {
    pub fn for_record(record: &DesignRecord) -> Self {
        Self {
            record_id: record.id.clone(),
            original_briefing: record.briefing_text.clone(),
            briefing_text: record.briefing_text.clone(),
            attachments: AttachmentStaging::new(record.reference_files.clone()),
        }
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    /// Nothing staged and the text unchanged.
    pub fn is_noop(&self) -> bool {
        !self.attachments.has_changes() && self.briefing_text == self.original_briefing
    }

    /// The patch to send once attachments are resolved. `files` is `None`
    /// when the attachment list did not change.
    pub(crate) fn patch(&self, files: Option<Vec<String>>) -> RecordPatch {
        RecordPatch {
            briefing_text: (self.briefing_text != self.original_briefing)
                .then(|| self.briefing_text.clone()),
            reference_files: files,
            ..Default::default()
        }
    }
}
