// Audit artifacts: the content-addressed store, file seals and the ledger
// event log format.

pub mod cas;
pub mod events;
pub mod seal;

pub use cas::{CasPut, ContentStore, FsContentStore, MemoryContentStore};
pub use events::{EventKind, EventRecord};
pub use seal::SealRecord;
