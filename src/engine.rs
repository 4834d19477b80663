//! Engine Module
//!
//! The persistent store that coordinates the mapping and its backing file.
//!
//! ## Responsibilities
//! - Load the backing file on open
//! - Serve reads from memory without touching the file
//! - Apply mutations and coalesce their flushes
//! - Reload when told the file changed underneath it
//! - Final flush on close

mod gate;

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::cancel::CancellationToken;
use crate::codec;
use crate::config::Config;
use crate::crypto;
use crate::error::{Result, VaultError};
use crate::mapping::Mapping;
use crate::serializer::{Serializer, SerializerKind};

use self::gate::{FlushGate, FlushTicket};

/// Physical writes per gate hold: the triggering write plus one catch-up
const MAX_WRITES_PER_HOLD: usize = 2;

/// Mapping plus the generation of its latest mutation
struct State {
    mapping: Mapping,
    generation: u64,
}

/// The persistent key-value store
///
/// ## Concurrency Model
///
/// - **Reads** (get/contains_key/keys/count): shared lock on the mapping.
///   Never wait on flush I/O.
/// - **Mutations** (upsert/remove/get_or_create/clear): exclusive lock on the
///   mapping, released before any I/O. Each bumps `generation`.
/// - **Flushes**: single-flight through `gate`. A mutation that finds a flush
///   running only sets the request flag; the running flush picks it up when
///   its current write finishes. A burst of writers that lands while no flush
///   is running costs one write, plus at most one more for writers that
///   arrived during it. The holder never performs more than two writes, so
///   a mutation does not wait on writes other mutations keep requesting.
///
/// The store is clean when `generation == persisted_generation`.
pub struct Engine {
    /// Store configuration
    config: Config,

    /// Backing file reader/writer (variant fixed at open)
    serializer: Serializer,

    /// In-memory mapping and mutation generation
    state: RwLock<State>,

    /// Generation of the last snapshot that reached the backing file
    persisted_generation: AtomicU64,

    /// Single-flight flush guard
    gate: FlushGate,

    /// Physical writes performed (for testing and debugging)
    flush_count: AtomicU64,
}

impl Engine {
    /// Open or create a store with the given config
    ///
    /// On startup:
    /// 1. Validate the encryption settings
    /// 2. Create the parent directory if needed
    /// 3. Remove a stale temp file from an interrupted flush
    /// 4. Load the backing file (missing file = empty store)
    pub fn open(config: Config) -> Result<Self> {
        // Step 1: Fails fast on inconsistent encryption settings
        let serializer = Serializer::from_config(&config)?;

        // Step 2: Create parent directory
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Step 3: Leftover from a crash mid-flush
        serializer.remove_stale_temp();

        // Step 4: Load
        let estimated_size = serializer.backing_len()?;
        let mapping = serializer.deserialize(estimated_size)?;

        tracing::info!(
            path = %config.path.display(),
            kind = ?serializer.kind(),
            entries = mapping.len(),
            "Opened store"
        );

        Ok(Self::from_parts(config, serializer, mapping))
    }

    /// Async twin of [`open`](Self::open)
    pub async fn open_async(config: Config, cancel: &CancellationToken) -> Result<Self> {
        let serializer = Serializer::from_config(&config)?;
        cancel.check()?;

        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        serializer.remove_stale_temp();

        let estimated_size = serializer.backing_len_async().await?;
        let mapping = serializer.deserialize_async(estimated_size, cancel).await?;

        tracing::info!(
            path = %config.path.display(),
            kind = ?serializer.kind(),
            entries = mapping.len(),
            "Opened store (async)"
        );

        Ok(Self::from_parts(config, serializer, mapping))
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified backing file
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().path(path).build();
        Self::open(config)
    }

    fn from_parts(config: Config, serializer: Serializer, mapping: Mapping) -> Self {
        Self {
            config,
            serializer,
            state: RwLock::new(State {
                mapping,
                generation: 0,
            }),
            persisted_generation: AtomicU64::new(0),
            gate: FlushGate::new(),
            flush_count: AtomicU64::new(0),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get a value by key
    ///
    /// Reflects every completed mutation, flushed or not.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.state.read().mapping.get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.state.read().mapping.contains_key(key)
    }

    /// Stored spellings of all keys (unordered)
    pub fn keys(&self) -> Vec<String> {
        self.state.read().mapping.keys().map(str::to_owned).collect()
    }

    /// Number of entries
    pub fn count(&self) -> usize {
        self.state.read().mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Decode a value stored with [`upsert_value`](Self::upsert_value)
    pub fn get_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Insert or overwrite a key
    ///
    /// Always succeeds from the caller's view. If the coalesced flush this
    /// triggers fails, the store stays dirty and the error is logged; the
    /// next flush retries.
    pub fn upsert(&self, key: impl Into<String>, value: impl Into<Bytes>) {
        {
            let mut state = self.state.write();
            state.mapping.insert(key, value.into());
            state.generation += 1;
        }
        self.request_flush();
    }

    /// Encode `value` with bincode and upsert it
    pub fn upsert_value<T: Serialize + ?Sized>(&self, key: impl Into<String>, value: &T) -> Result<()> {
        let bytes = bincode::serialize(value)?;
        self.upsert(key, bytes);
        Ok(())
    }

    /// Remove a key. Returns whether it existed.
    ///
    /// Only an actual removal marks the store dirty.
    pub fn remove(&self, key: &str) -> bool {
        let removed = {
            let mut state = self.state.write();
            let removed = state.mapping.remove(key).is_some();
            if removed {
                state.generation += 1;
            }
            removed
        };

        if removed {
            self.request_flush();
        }
        removed
    }

    /// Return the value for `key`, creating it with `factory` if absent.
    ///
    /// The factory runs under the write lock, so concurrent callers for the
    /// same missing key see exactly one created value. An existing key is
    /// returned without mutation or flush.
    pub fn get_or_create<F, V>(&self, key: &str, factory: F) -> Bytes
    where
        F: FnOnce() -> V,
        V: Into<Bytes>,
    {
        if let Some(existing) = self.get(key) {
            return existing;
        }

        let created = {
            let mut state = self.state.write();
            if let Some(existing) = state.mapping.get(key) {
                return existing.clone();
            }
            let value: Bytes = factory().into();
            state.mapping.insert(key, value.clone());
            state.generation += 1;
            value
        };

        self.request_flush();
        created
    }

    /// Remove every entry
    pub fn clear(&self) {
        let cleared = {
            let mut state = self.state.write();
            if state.mapping.is_empty() {
                false
            } else {
                state.mapping.clear();
                state.generation += 1;
                true
            }
        };

        if cleared {
            self.request_flush();
        }
    }

    // =========================================================================
    // Flush
    // =========================================================================

    /// Persist the current state, waiting for any in-flight flush first.
    ///
    /// A clean store performs no write, so calling this twice in a row
    /// writes at most once.
    pub fn flush(&self) -> Result<()> {
        let ticket = self.gate.enter_blocking();
        // Requested under the gate so a failed flush by the previous holder
        // is retried here
        self.gate.request();
        self.drain(ticket)
    }

    /// Async twin of [`flush`](Self::flush)
    ///
    /// Cancellation leaves the backing file and in-memory state unchanged and
    /// the store dirty.
    pub async fn flush_async(&self, cancel: &CancellationToken) -> Result<()> {
        let ticket = cancel.run(async { Ok(self.gate.enter_async().await) }).await?;
        self.gate.request();
        self.drain_async(ticket, cancel).await
    }

    /// Entry point for mutations: flush now, or leave the request for the
    /// flush already running
    fn request_flush(&self) {
        self.gate.request();

        let Some(ticket) = self.gate.try_enter() else {
            tracing::trace!("Flush in progress, request coalesced");
            return;
        };

        if let Err(e) = self.drain(ticket) {
            tracing::warn!(
                path = %self.config.path.display(),
                error = %e,
                "Coalesced flush failed, store remains dirty"
            );
        }
    }

    /// Serve flush requests while holding the gate, at most
    /// `MAX_WRITES_PER_HOLD` writes. Requests raised after that are left for
    /// the next mutation, `flush` or `close`.
    fn drain<'a>(&'a self, mut ticket: FlushTicket<'a>) -> Result<()> {
        let mut writes = 0;
        loop {
            while writes < MAX_WRITES_PER_HOLD && self.gate.take_request() {
                writes += 1;
                self.persist()?;
            }
            drop(ticket);

            // A request that raced the release, if budget remains
            if writes >= MAX_WRITES_PER_HOLD || !self.gate.has_request() {
                return Ok(());
            }
            match self.gate.try_enter() {
                Some(next) => ticket = next,
                None => return Ok(()),
            }
        }
    }

    async fn drain_async<'a>(&'a self, mut ticket: FlushTicket<'a>, cancel: &CancellationToken) -> Result<()> {
        let mut writes = 0;
        loop {
            while writes < MAX_WRITES_PER_HOLD && self.gate.take_request() {
                writes += 1;
                self.persist_async(cancel).await?;
            }
            drop(ticket);

            if writes >= MAX_WRITES_PER_HOLD || !self.gate.has_request() {
                return Ok(());
            }
            match self.gate.try_enter() {
                Some(next) => ticket = next,
                None => return Ok(()),
            }
        }
    }

    /// One physical write of the current snapshot. Caller holds the gate.
    /// Returns false when already clean.
    fn persist(&self) -> Result<bool> {
        let Some((snapshot, generation)) = self.dirty_snapshot() else {
            return Ok(false);
        };

        self.serializer
            .serialize(&snapshot, self.estimated_size(&snapshot))?;
        self.mark_persisted(generation, snapshot.len());
        Ok(true)
    }

    async fn persist_async(&self, cancel: &CancellationToken) -> Result<bool> {
        let Some((snapshot, generation)) = self.dirty_snapshot() else {
            return Ok(false);
        };

        self.serializer
            .serialize_async(&snapshot, self.estimated_size(&snapshot), cancel)
            .await?;
        self.mark_persisted(generation, snapshot.len());
        Ok(true)
    }

    /// Copy of the mapping if it has unpersisted changes.
    /// Values are refcounted, so this copies keys only.
    fn dirty_snapshot(&self) -> Option<(Mapping, u64)> {
        let state = self.state.read();
        if state.generation == self.persisted_generation.load(Ordering::Acquire) {
            return None;
        }
        Some((state.mapping.clone(), state.generation))
    }

    fn mark_persisted(&self, generation: u64, entries: usize) {
        self.persisted_generation.store(generation, Ordering::Release);
        let writes = self.flush_count.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(generation, entries, writes, "Flushed store");
    }

    /// Expected backing-file size for a snapshot
    fn estimated_size(&self, snapshot: &Mapping) -> usize {
        let encoded = codec::encoded_len(snapshot);
        if self.serializer.kind().is_encrypted() {
            crypto::ciphertext_len(encoded)
        } else {
            encoded
        }
    }

    // =========================================================================
    // Reload
    // =========================================================================

    /// Replace the in-memory state with the backing file's contents.
    ///
    /// For callers told externally that the file changed. Transient I/O
    /// errors are retried `reload_retries` times; decode and decryption
    /// errors fail immediately and leave the current state in place.
    /// Unflushed mutations are discarded.
    pub fn reload(&self) -> Result<()> {
        let ticket = self.gate.enter_blocking();
        let backoff = Duration::from_millis(self.config.reload_backoff_ms);

        let mut attempt = 0;
        let loaded = loop {
            let loaded = self
                .serializer
                .backing_len()
                .and_then(|len| self.serializer.deserialize(len));

            match loaded {
                Err(VaultError::Io(e)) if attempt < self.config.reload_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %e, "Reload failed, retrying");
                    std::thread::sleep(backoff);
                }
                other => break other,
            }
        };

        self.finish_reload(ticket, loaded)
    }

    /// Async twin of [`reload`](Self::reload)
    pub async fn reload_async(&self, cancel: &CancellationToken) -> Result<()> {
        let ticket = cancel.run(async { Ok(self.gate.enter_async().await) }).await?;
        let backoff = Duration::from_millis(self.config.reload_backoff_ms);

        let mut attempt = 0;
        let loaded = loop {
            let loaded = match self.serializer.backing_len_async().await {
                Ok(len) => self.serializer.deserialize_async(len, cancel).await,
                Err(e) => Err(e),
            };

            match loaded {
                Err(VaultError::Io(e)) if attempt < self.config.reload_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %e, "Reload failed, retrying");
                    let slept = cancel
                        .run(async {
                            tokio::time::sleep(backoff).await;
                            Ok(())
                        })
                        .await;
                    if let Err(e) = slept {
                        break Err(e);
                    }
                }
                other => break other,
            }
        };

        self.finish_reload(ticket, loaded)
    }

    /// Install a successful load, then serve flush requests that arrived
    /// while the reload held the gate. Runs on failure too.
    fn finish_reload(&self, ticket: FlushTicket<'_>, loaded: Result<Mapping>) -> Result<()> {
        let result = loaded.map(|mapping| self.install(mapping));
        if let Err(e) = self.drain(ticket) {
            tracing::warn!(error = %e, "Flush after reload failed, store remains dirty");
        }
        result
    }

    /// Swap in a freshly loaded mapping; it matches the file, so clean
    fn install(&self, mapping: Mapping) {
        let mut state = self.state.write();
        if state.generation != self.persisted_generation.load(Ordering::Acquire) {
            tracing::warn!(
                path = %self.config.path.display(),
                "Reload discarded unflushed mutations"
            );
        }

        let entries = mapping.len();
        state.mapping = mapping;
        state.generation += 1;
        self.persisted_generation
            .store(state.generation, Ordering::Release);

        tracing::info!(path = %self.config.path.display(), entries, "Reloaded store");
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the store gracefully
    ///
    /// Flushes pending changes and reports any failure.
    pub fn close(self) -> Result<()> {
        self.flush()?;
        tracing::info!(path = %self.config.path.display(), "Closed store");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Whether there are mutations not yet on disk
    pub fn is_dirty(&self) -> bool {
        self.state.read().generation != self.persisted_generation.load(Ordering::Acquire)
    }

    /// Whether a physical flush is running right now
    pub fn is_flushing(&self) -> bool {
        self.gate.is_in_progress()
    }

    /// Number of physical writes of the backing file
    pub fn physical_flush_count(&self) -> u64 {
        self.flush_count.load(Ordering::Relaxed)
    }

    /// Serializer variant in use
    pub fn kind(&self) -> SerializerKind {
        self.serializer.kind()
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        self.serializer.path()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for Engine {
    /// Best-effort final flush; use [`Engine::close`] to observe failures
    fn drop(&mut self) {
        if !self.is_dirty() {
            return;
        }
        if let Err(e) = self.flush() {
            tracing::error!(
                path = %self.config.path.display(),
                error = %e,
                "Final flush on drop failed, unflushed changes lost"
            );
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("path", &self.config.path)
            .field("kind", &self.kind())
            .field("count", &self.count())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
