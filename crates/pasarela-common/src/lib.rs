pub mod errors;
pub mod id;

pub use errors::{ConfigError, PasarelaError, StorageError};
pub use id::{new_transaction_id, now_millis, SessionId};
