mod client;

pub use client::{
    ApiErrorClass, BatchDeleteReport, DeleteResult, DeleteStatus, EntryList, EntryType,
    RemoteClient, RemoteEntry, RemoteError, TransferLink,
};
