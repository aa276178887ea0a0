pub mod attachment;
pub mod error;
pub mod filter;
pub mod record;
pub mod session;
pub mod transition;
mod wire;

pub use attachment::LocalFile;
pub use error::DesainError;
pub use filter::apply_local_filter;
pub use record::{CreateRecord, DesignRecord, RecordFilter, RecordPatch, Status, StatusView};
pub use session::{Session, UserIdentity};
pub use transition::guard_patch;
