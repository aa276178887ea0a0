mod edit;
mod error;
mod session;
mod staging;
mod store;

pub use edit::{NewDesign, RecordEdit};
pub use error::SyncError;
pub use session::{SessionGate, MIN_PASSWORD_LEN};
pub use staging::AttachmentStaging;
pub use store::{RecordStore, RecordView};
