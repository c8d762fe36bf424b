//! Purpose: Thread-safe mapping façade over the backing engine.
//! Exports: `Store`, `Scan`.
//! Role: Owns the guard discipline (liveness, reentrancy, one coarse lock)
//! and the commit schedule; every public operation funnels through it.
//! Invariants: The engine handle is touched only under the store lock and is
//! released exactly once.
//! Invariants: While a scan is open, every other public call fails with
//! `Reentrant`; the flag is checked before lock acquisition so a nested call
//! from the scan's own consumer fails instead of deadlocking.
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::engine::Engine;
use crate::error::{Error, ErrorKind};
use crate::key::Key;
use crate::schedule::CommitSchedule;
use crate::stamp;

pub struct Store {
    identity: PathBuf,
    read_only: bool,
    iterating: AtomicBool,
    state: Mutex<State>,
}

struct State {
    engine: Option<Engine>,
    schedule: CommitSchedule,
}

impl Store {
    /// Open or create the backing file read-write.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::open_with(path.as_ref(), false)
    }

    /// Connect to an existing backing file without permitting mutation.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::open_with(path.as_ref(), true)
    }

    fn open_with(path: &Path, read_only: bool) -> Result<Self, Error> {
        let identity = path.to_path_buf();
        let engine = if read_only {
            Engine::open_read_only(&identity)?
        } else {
            Engine::open(&identity)?
        };
        let rows = engine.count()?;
        info!(store = %identity.display(), rows, "store ready");
        Ok(Self {
            identity,
            read_only,
            iterating: AtomicBool::new(false),
            state: Mutex::new(State {
                engine: Some(engine),
                schedule: CommitSchedule::new(Instant::now()),
            }),
        })
    }

    pub fn identity(&self) -> &Path {
        &self.identity
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Number of records.
    pub fn len(&self) -> Result<u64, Error> {
        let state = self.guard()?;
        self.engine_of(&state)?.count()
    }

    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    /// Mutations batched since the last flush.
    pub fn pending_writes(&self) -> Result<u64, Error> {
        let state = self.guard()?;
        Ok(state.schedule.pending())
    }

    /// Fetch and decode the value for `key`, or fail with `NotFound`.
    pub fn get<'k, K: Into<Key<'k>>>(&self, key: K) -> Result<Value, Error> {
        let id = key.into().as_text()?;
        let raw = {
            let state = self.guard()?;
            self.engine_of(&state)?.fetch(id)?
        };
        match raw {
            Some(json) => decode_value(&self.identity, id, &json),
            None => Err(Error::new(ErrorKind::NotFound)
                .with_message("no such record")
                .with_path(&self.identity)
                .with_key(id)),
        }
    }

    /// Like `get`, but absent keys yield `default` instead of an error.
    pub fn get_or<'k, K: Into<Key<'k>>>(&self, key: K, default: Value) -> Result<Value, Error> {
        let id = key.into().as_text()?;
        let raw = {
            let state = self.guard()?;
            self.engine_of(&state)?.fetch(id)?
        };
        match raw {
            Some(json) => decode_value(&self.identity, id, &json),
            None => Ok(default),
        }
    }

    pub fn contains<'k, K: Into<Key<'k>>>(&self, key: K) -> Result<bool, Error> {
        let id = key.into().as_text()?;
        let state = self.guard()?;
        self.engine_of(&state)?.exists(id)
    }

    /// Upsert `value` under `key`, stamped with the current time. May trigger
    /// an automatic flush once the batch is large or old enough.
    pub fn set<'k, K, V>(&self, key: K, value: &V) -> Result<(), Error>
    where
        K: Into<Key<'k>>,
        V: Serialize + ?Sized,
    {
        let id = key.into().as_text()?;
        let json = self.encode_value(value)?;
        let mut state = self.guard()?;
        let state = &mut *state;
        self.engine_of_ref(&state.engine)?
            .upsert(id, &stamp::wall_stamp(), &json)?;
        state.schedule.record_write();
        self.flush_if_due(state)
    }

    /// Remove the record for `key`; absent keys are a no-op.
    pub fn remove<'k, K: Into<Key<'k>>>(&self, key: K) -> Result<(), Error> {
        let id = key.into().as_text()?;
        let mut state = self.guard()?;
        let state = &mut *state;
        self.engine_of_ref(&state.engine)?.delete(id)?;
        state.schedule.record_write();
        self.flush_if_due(state)
    }

    /// Force a flush of the pending batch.
    pub fn commit(&self) -> Result<(), Error> {
        let mut state = self.guard()?;
        self.flush_locked(&mut *state)
    }

    /// Flush once, release the engine handle, and leave the store closed.
    /// Safe to call again: a second close is a no-op.
    pub fn close(&self) -> Result<(), Error> {
        if self.iterating.load(Ordering::Acquire) {
            return Err(self.reentrant_error());
        }
        let mut state = self.lock_state();
        let Some(engine) = state.engine.take() else {
            return Ok(());
        };
        if let Err(err) = engine.flush() {
            state.engine = Some(engine);
            return Err(err);
        }
        let (flushed, elapsed) = state.schedule.mark_flushed(Instant::now());
        info!(
            store = %self.identity.display(),
            writes = flushed,
            elapsed_secs = elapsed.as_secs_f64(),
            "flushed pending writes"
        );
        engine.finish()?;
        info!(store = %self.identity.display(), "store closed");
        Ok(())
    }

    /// Traverse every record lazily, in the engine's native scan order. The
    /// scan holds the store lock for its whole lifetime; until it is dropped,
    /// every other public call fails with `Reentrant`. A fresh call re-scans.
    pub fn scan(&self) -> Result<Scan<'_>, Error> {
        let state = self.guard()?;
        let rows = self.engine_of(&state)?.rows()?;
        self.iterating.store(true, Ordering::Release);
        Ok(Scan {
            store: self,
            rows: rows.into_iter(),
            _state: state,
        })
    }

    /// Detached copy of all keys, materialized under the lock.
    pub fn keys(&self) -> Result<Vec<String>, Error> {
        let state = self.guard()?;
        self.engine_of(&state)?.ids()
    }

    pub fn to_map(&self) -> Result<Map<String, Value>, Error> {
        let rows = self.raw_rows()?;
        let mut map = Map::with_capacity(rows.len());
        for (id, json) in rows {
            let value = decode_value(&self.identity, &id, &json)?;
            map.insert(id, value);
        }
        Ok(map)
    }

    pub fn to_vec(&self) -> Result<Vec<(String, Value)>, Error> {
        let rows = self.raw_rows()?;
        let mut pairs = Vec::with_capacity(rows.len());
        for (id, json) in rows {
            let value = decode_value(&self.identity, &id, &json)?;
            pairs.push((id, value));
        }
        Ok(pairs)
    }

    fn raw_rows(&self) -> Result<Vec<(String, String)>, Error> {
        let state = self.guard()?;
        self.engine_of(&state)?.rows()
    }

    /// Liveness and reentrancy checks shared by every operation. The
    /// iteration flag is read before the lock; an open scan already holds
    /// the lock, so checking afterwards would deadlock the scan's own thread.
    fn guard(&self) -> Result<MutexGuard<'_, State>, Error> {
        if self.iterating.load(Ordering::Acquire) {
            return Err(self.reentrant_error());
        }
        let state = self.lock_state();
        if state.engine.is_none() {
            return Err(self.closed_error());
        }
        Ok(state)
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn engine_of<'s>(&self, state: &'s MutexGuard<'_, State>) -> Result<&'s Engine, Error> {
        self.engine_of_ref(&state.engine)
    }

    fn engine_of_ref<'s>(&self, engine: &'s Option<Engine>) -> Result<&'s Engine, Error> {
        engine.as_ref().ok_or_else(|| self.closed_error())
    }

    fn flush_if_due(&self, state: &mut State) -> Result<(), Error> {
        if state.schedule.is_due(Instant::now()) {
            self.flush_locked(state)
        } else {
            Ok(())
        }
    }

    fn flush_locked(&self, state: &mut State) -> Result<(), Error> {
        self.engine_of_ref(&state.engine)?.flush()?;
        let (flushed, elapsed) = state.schedule.mark_flushed(Instant::now());
        info!(
            store = %self.identity.display(),
            writes = flushed,
            elapsed_secs = elapsed.as_secs_f64(),
            "flushed pending writes"
        );
        Ok(())
    }

    fn encode_value<V: Serialize + ?Sized>(&self, value: &V) -> Result<String, Error> {
        serde_json::to_string(value).map_err(|err| {
            Error::new(ErrorKind::Serialize)
                .with_message("value is not representable as canonical JSON")
                .with_path(&self.identity)
                .with_source(err)
        })
    }

    fn closed_error(&self) -> Error {
        Error::new(ErrorKind::Closed)
            .with_message("store already closed")
            .with_path(&self.identity)
    }

    fn reentrant_error(&self) -> Error {
        Error::new(ErrorKind::Reentrant)
            .with_message("store cannot be accessed while a scan is open")
            .with_path(&self.identity)
    }
}

impl Drop for Store {
    /// Scoped-resource cleanup: owning a `Store` guarantees a final commit
    /// and handle release on scope exit. `close()` is the error-aware form.
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Live traversal over all records. Rows are read off the engine when the
/// scan is created; JSON decoding happens lazily per item. Dropping the scan
/// releases the store lock and clears the iteration flag on every exit path.
pub struct Scan<'a> {
    store: &'a Store,
    rows: std::vec::IntoIter<(String, String)>,
    _state: MutexGuard<'a, State>,
}

impl Iterator for Scan<'_> {
    type Item = Result<(String, Value), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let (id, json) = self.rows.next()?;
        Some(decode_value(&self.store.identity, &id, &json).map(|value| (id, value)))
    }
}

impl Drop for Scan<'_> {
    fn drop(&mut self) {
        self.store.iterating.store(false, Ordering::Release);
    }
}

fn decode_value(identity: &Path, id: &str, json: &str) -> Result<Value, Error> {
    serde_json::from_str(json).map_err(|err| {
        Error::new(ErrorKind::Serialize)
            .with_message("stored value is not canonical JSON")
            .with_path(identity)
            .with_key(id)
            .with_source(err)
    })
}
