//! Stores, entries and the manager that discovers them

mod diagnostics;
mod entry;
mod manager;
mod store;

pub use diagnostics::DiagnosticLog;
pub use entry::StoreEntry;
pub use manager::{KeyStoreManager, ManagerConfig, ManagerEvent};
pub use store::{KeyStore, StoreEvent, StoreKind};
