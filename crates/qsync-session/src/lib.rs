//! qsync-session: authenticated identity and its durable persistence.
//!
//! Owns the single live [`session::Session`] per store, persists it through
//! an injected [`storage::SessionStorage`] backend, and recovers from
//! corrupt records by erasing them and falling back to the
//! unauthenticated state. Never mutated by push events.

pub mod session;
pub mod storage;

pub use session::{CorruptSessionError, RehydrateOutcome, Session, SessionStore, initials};
pub use storage::{FileSessionStorage, MemorySessionStorage, SessionStorage, StorageError};
