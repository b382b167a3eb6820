pub mod backoff;
pub mod controller;
pub mod executor;
pub mod item;
pub mod local;
pub mod operation;
pub mod pairing;
pub mod paths;
pub mod remote;
pub mod timestamps;
pub mod transfer;
pub mod transfer_file;
pub mod transfer_info;

#[cfg(test)]
pub(crate) mod test_remote;

pub use controller::{SyncController, SyncError};
pub use executor::{SyncExecutor, SyncResult};
pub use item::{ItemError, SyncItem, SyncItems, SyncSummary, ValidationResult};
pub use operation::Operation;
pub use remote::{HttpRemote, RemoteFiles};
pub use timestamps::TimestampStore;
pub use transfer_file::{FileKind, TransferFile};
pub use transfer_info::TransferInfo;
