//! In-memory fakes and builders for testing the extract function without Google APIs.
//!
//! Every fake is cheap to clone and clones share state, so a test can hand one clone to the
//! component under test and inspect the recorded calls through another.

pub mod clock;
pub mod event;
pub mod extract_client;
pub mod secret_store;
pub mod sink;

pub use clock::ManualClock;
pub use event::{json_message, table_message, view_message};
pub use extract_client::MemoryExtractClient;
pub use secret_store::MemorySecretStore;
pub use sink::{MemorySink, PublishedMessage};
