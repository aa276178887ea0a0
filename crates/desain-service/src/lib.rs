mod http;
#[cfg(feature = "test-helpers")]
pub mod memory;
mod storage;
mod traits;

pub use http::{SupabaseConfig, SupabaseService, DEFAULT_TABLE};
pub use storage::SupabaseStorage;
pub use traits::{AuthService, RecordService, ServiceError};
