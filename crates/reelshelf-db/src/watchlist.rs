//! The user's watchlist, persisted on every change.
//!
//! Movies are kept in insertion order with set semantics on the movie id.
//! The whole list is written to the `watchlist-storage` record after each
//! mutation. A failed write is logged and the in-memory list stays
//! authoritative for the rest of the session.

use std::collections::HashSet;

use reelshelf_api::tmdb::MovieSummary;
use serde::{Deserialize, Serialize};

use crate::storage::{PersistenceError, RecordStore};

/// Name of the persisted watchlist record.
pub const WATCHLIST_RECORD: &str = "watchlist-storage";

/// Version written into the record envelope.
const RECORD_VERSION: u32 = 0;

#[derive(Debug, Serialize)]
struct EnvelopeRef<'a> {
    state: StateRef<'a>,
    version: u32,
}

#[derive(Debug, Serialize)]
struct StateRef<'a> {
    movies: &'a [MovieSummary],
}

#[derive(Debug, Deserialize)]
struct Envelope {
    state: State,
    #[serde(default)]
    version: u32,
}

#[derive(Debug, Deserialize)]
struct State {
    #[serde(default)]
    movies: Vec<MovieSummary>,
}

/// Insertion-ordered set of movies keyed by id.
#[derive(Debug)]
pub struct WatchlistStore<S> {
    movies: Vec<MovieSummary>,
    ids: HashSet<u64>,
    store: S,
}

impl<S: RecordStore> WatchlistStore<S> {
    /// Rehydrates the watchlist from `store`.
    ///
    /// An absent, unreadable or corrupt record yields an empty watchlist.
    pub fn open(store: S) -> Self {
        let movies = match load(&store) {
            Ok(movies) => movies,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable watchlist, starting empty");
                Vec::new()
            }
        };

        let mut watchlist = Self {
            movies: Vec::with_capacity(movies.len()),
            ids: HashSet::with_capacity(movies.len()),
            store,
        };
        for movie in movies {
            if watchlist.ids.insert(movie.id) {
                watchlist.movies.push(movie);
            }
        }
        tracing::debug!(count = watchlist.movies.len(), "Watchlist rehydrated");
        watchlist
    }

    /// Adds `movie` unless its id is already present.
    ///
    /// Returns `true` if the movie was added. An existing entry is left
    /// untouched, even if `movie` carries different fields.
    pub fn add(&mut self, movie: MovieSummary) -> bool {
        if !self.ids.insert(movie.id) {
            return false;
        }
        self.movies.push(movie);
        self.persist();
        true
    }

    /// Removes the movie with `id`. Returns `true` if it was present.
    pub fn remove(&mut self, id: u64) -> bool {
        if !self.ids.remove(&id) {
            return false;
        }
        self.movies.retain(|m| m.id != id);
        self.persist();
        true
    }

    /// Whether a movie with `id` is in the watchlist.
    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    /// Removes every movie.
    pub fn clear(&mut self) {
        self.movies.clear();
        self.ids.clear();
        self.persist();
    }

    /// Movies in insertion order.
    #[must_use]
    pub fn list(&self) -> &[MovieSummary] {
        &self.movies
    }

    /// Number of movies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.movies.len()
    }

    /// Whether the watchlist is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.movies.is_empty()
    }

    /// Writes the whole list, logging a failure instead of returning it.
    fn persist(&self) {
        if let Err(e) = save(&self.store, &self.movies) {
            tracing::warn!(error = %e, "Failed to persist watchlist");
        }
    }
}

/// Reads and decodes the watchlist record. Absent means empty.
fn load<S: RecordStore>(store: &S) -> Result<Vec<MovieSummary>, PersistenceError> {
    let Some(text) = store.read(WATCHLIST_RECORD)? else {
        return Ok(Vec::new());
    };
    let envelope: Envelope =
        serde_json::from_str(&text).map_err(|source| PersistenceError::Corrupt {
            name: String::from(WATCHLIST_RECORD),
            source,
        })?;
    if envelope.version != RECORD_VERSION {
        tracing::debug!(version = envelope.version, "Reading watchlist record of another version");
    }
    Ok(envelope.state.movies)
}

/// Encodes and writes the watchlist record.
fn save<S: RecordStore>(store: &S, movies: &[MovieSummary]) -> Result<(), PersistenceError> {
    let envelope = EnvelopeRef {
        state: StateRef { movies },
        version: RECORD_VERSION,
    };
    let text = serde_json::to_string(&envelope).map_err(|source| PersistenceError::Encode {
        name: String::from(WATCHLIST_RECORD),
        source,
    })?;
    store.write(WATCHLIST_RECORD, &text)
}
