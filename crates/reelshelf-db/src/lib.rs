//! Local storage for reelshelf.
//!
//! Uses `rusqlite` (bundled `SQLite`) to persist named records, and builds
//! the watchlist store and the "for you" discover parameters on top of it.

mod connection;
mod migrations;
/// Derived "for you" discover parameters.
pub mod recommend;
/// Named record storage.
pub mod storage;
/// Persisted watchlist.
pub mod watchlist;

pub use connection::{open_db, open_memory_db};
pub use recommend::{FOR_YOU_GENRE_LIMIT, for_you_genres, for_you_params};
pub use storage::{MemoryStore, PersistenceError, RecordStore, SqliteStore};
pub use watchlist::{WATCHLIST_RECORD, WatchlistStore};
