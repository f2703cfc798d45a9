use std::{fmt, sync::Arc};

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    core::{
        driver::{DbConnection, DriverSet},
        types::{Credentials, Dialect, Fingerprint},
    },
    error::{AppError, AppResult},
};

/// A tested, cached connection for one fingerprint.
#[derive(Clone)]
pub struct ConnectionHandle {
    fingerprint: Fingerprint,
    database_name: String,
    dialect: Dialect,
    conn: Arc<dyn DbConnection>,
}

impl ConnectionHandle {
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub(crate) fn connection(&self) -> &dyn DbConnection {
        self.conn.as_ref()
    }

    pub fn same_connection(&self, other: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&self.conn, &other.conn)
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("fingerprint", &self.fingerprint)
            .field("dialect", &self.dialect)
            .finish()
    }
}

/// Digest over the parts of the credentials the fingerprint leaves out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TargetSignature([u8; 32]);

impl TargetSignature {
    fn of(creds: &Credentials) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(creds.dialect.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(creds.port.unwrap_or(0).to_be_bytes());
        hasher.update([0u8]);
        hasher.update(creds.password.as_bytes());
        TargetSignature(hasher.finalize().into())
    }
}

struct Entry {
    handle: ConnectionHandle,
    signature: TargetSignature,
}

/// Creates, tests and caches live connections keyed by credential fingerprint.
///
/// Creation is serialized per fingerprint; lookups of cached handles only touch the
/// shard holding that key.
pub struct ConnectionRegistry {
    drivers: DriverSet,
    entries: DashMap<Fingerprint, Entry>,
    gates: DashMap<Fingerprint, Arc<Mutex<()>>>,
}

impl ConnectionRegistry {
    pub fn new(drivers: DriverSet) -> Self {
        Self {
            drivers,
            entries: DashMap::new(),
            gates: DashMap::new(),
        }
    }

    pub fn fingerprint_of(creds: &Credentials) -> Fingerprint {
        Fingerprint::of(creds)
    }

    /// Returns the fingerprint of a live, tested connection for `creds`, reusing the cached
    /// one when it still answers and was opened with the same password, port and dialect.
    pub async fn create_and_test(&self, creds: &Credentials) -> AppResult<Fingerprint> {
        self.create_and_test_handle(creds)
            .await
            .map(|handle| handle.fingerprint)
    }

    /// Like [`create_and_test`](Self::create_and_test), but hands back the handle that was
    /// tested while the fingerprint's gate was held, so a concurrent replacement or eviction
    /// cannot change what the caller receives.
    pub async fn create_and_test_handle(&self, creds: &Credentials) -> AppResult<ConnectionHandle> {
        let fingerprint = Self::fingerprint_of(creds);

        let gate = self
            .gates
            .entry(fingerprint.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = gate.lock().await;

        let res = self.acquire(creds, &fingerprint).await;
        if !self.entries.contains_key(&fingerprint) {
            // Only this caller (and the map) still reference the gate.
            self.gates
                .remove_if(&fingerprint, |_, g| Arc::strong_count(g) <= 2);
        }
        res
    }

    /// Must run under the fingerprint's gate.
    async fn acquire(
        &self,
        creds: &Credentials,
        fingerprint: &Fingerprint,
    ) -> AppResult<ConnectionHandle> {
        let signature = TargetSignature::of(creds);
        let cached = self
            .entries
            .get(fingerprint)
            .map(|e| (e.handle.clone(), e.signature == signature));
        let mut stale = false;

        if let Some((handle, same_target)) = cached {
            if same_target {
                match handle.connection().ping().await {
                    Ok(()) => {
                        debug!(%fingerprint, "reusing cached connection");
                        return Ok(handle);
                    }
                    Err(e) => {
                        warn!(%fingerprint, error=%e, "liveness check failed; reopening");
                        stale = true;
                    }
                }
            } else {
                info!(%fingerprint, "connection parameters changed; opening a new connection");
            }
        }

        match self.open(creds, fingerprint).await {
            Ok(handle) => {
                self.entries.insert(
                    fingerprint.clone(),
                    Entry {
                        handle: handle.clone(),
                        signature,
                    },
                );
                info!(%fingerprint, dialect=%creds.dialect, "connection cached");
                Ok(handle)
            }
            Err(e) => {
                if stale {
                    self.evict(fingerprint);
                }
                Err(e)
            }
        }
    }

    async fn open(&self, creds: &Credentials, fingerprint: &Fingerprint) -> AppResult<ConnectionHandle> {
        let driver = self.drivers.get(creds.dialect)?;
        let conn = driver.open(creds).await.map_err(|e| match e {
            AppError::Connection { .. } => e,
            other => AppError::connection(fingerprint.as_str(), other),
        })?;
        conn.ping()
            .await
            .map_err(|e| AppError::connection(fingerprint.as_str(), format!("liveness check failed: {e}")))?;
        Ok(ConnectionHandle {
            fingerprint: fingerprint.clone(),
            database_name: creds.database_name.trim().to_string(),
            dialect: creds.dialect,
            conn,
        })
    }

    pub fn handle_for(&self, fingerprint: &Fingerprint) -> AppResult<ConnectionHandle> {
        self.entries
            .get(fingerprint)
            .map(|e| e.handle.clone())
            .ok_or_else(|| AppError::NotFound(format!("no connection registered for {fingerprint}")))
    }

    /// Drops the cached entry. Sessions still holding the handle keep it alive until they
    /// switch or release.
    pub fn evict(&self, fingerprint: &Fingerprint) -> Option<ConnectionHandle> {
        let removed = self.entries.remove(fingerprint).map(|(_, e)| e.handle);
        // A gate still held by a connect in progress stays; that connect removes it.
        self.gates
            .remove_if(fingerprint, |_, g| Arc::strong_count(g) <= 1);
        if removed.is_some() {
            info!(%fingerprint, "connection evicted");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("drivers", &self.drivers)
            .field("entries", &self.entries.len())
            .finish()
    }
}
