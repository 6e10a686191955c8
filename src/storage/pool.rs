use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Condvar, Mutex, MutexGuard, RawMutex};
use rusqlite::Connection;
use tracing::{debug, info, warn};
use crate::core::error::{Error, ErrorKind, Result};
use crate::storage::sqlite::with_deadline;

/// Transaction ID generator for anonymous transactions
static TRANSACTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

type ConnectionGuard = ArcMutexGuard<RawMutex, Connection>;
type Opener = Box<dyn Fn() -> Result<Connection> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: usize,
    pub acquire_timeout: Option<Duration>,   // None = wait forever
    pub execute_timeout: Option<Duration>,   // None = no statement deadline
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_connections: num_cpus::get().max(1),
            acquire_timeout: Some(Duration::from_secs(30)),
            execute_timeout: None,
        }
    }
}

/// One physical connection with its own mutex and in-use counter
pub struct PooledConnection {
    pub id: usize,
    handle: Arc<Mutex<Connection>>,
    in_use: AtomicUsize,
    pinned: AtomicBool,   // bound to an open transaction
}

impl PooledConnection {
    fn new(id: usize, connection: Connection) -> Self {
        PooledConnection {
            id,
            handle: Arc::new(Mutex::new(connection)),
            in_use: AtomicUsize::new(0),
            pinned: AtomicBool::new(false),
        }
    }

    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::SeqCst)
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned.load(Ordering::SeqCst)
    }
}

/// Claim on a connection; released on drop whatever the exit path
struct Checkout {
    connection: Arc<PooledConnection>,
    pinned: bool,
}

impl Checkout {
    // Called with the pool state locked so selection and claim are atomic
    fn new(connection: Arc<PooledConnection>, pinned: bool) -> Self {
        connection.in_use.fetch_add(1, Ordering::SeqCst);
        if pinned {
            connection.pinned.store(true, Ordering::SeqCst);
        }
        Checkout { connection, pinned }
    }
}

impl Drop for Checkout {
    fn drop(&mut self) {
        if self.pinned {
            self.connection.pinned.store(false, Ordering::SeqCst);
        }
        self.connection.in_use.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Counts a caller inside `checkout` for the lifetime of the guard
struct Waiter<'a>(&'a AtomicUsize);

impl<'a> Waiter<'a> {
    fn register(waiting: &'a AtomicUsize) -> Self {
        waiting.fetch_add(1, Ordering::SeqCst);
        Waiter(waiting)
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Locked connection owned by an open transaction.
/// Field order matters: the mutex is unlocked before the claim is released.
struct Pinned {
    guard: ConnectionGuard,
    _checkout: Checkout,
}

struct BoundTransaction {
    connection_id: usize,
    slot: Mutex<Option<Pinned>>,
}

struct PoolState {
    connections: Vec<Arc<PooledConnection>>,
    transactions: HashMap<String, Arc<BoundTransaction>>,
    pending_opens: usize,
}

/// Snapshot of pool metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub connections: usize,
    pub max_connections: usize,
    pub open_transactions: usize,
    pub busy: usize,
    pub created: usize,
}

/// Growable set of connections with transaction affinity.
///
/// The state mutex only guards metadata (connection list, transaction map);
/// statements run under the per-connection mutex, so unrelated connections
/// proceed concurrently.
pub struct ConnectionPool {
    config: PoolConfig,
    state: Mutex<PoolState>,
    available: Condvar,   // a connection was published, released or unpinned
    waiting: AtomicUsize,
    opener: Opener,
    created: AtomicUsize,
}

impl ConnectionPool {
    pub fn new<F>(config: PoolConfig, opener: F) -> Self
    where
        F: Fn() -> Result<Connection> + Send + Sync + 'static,
    {
        ConnectionPool {
            config: PoolConfig {
                max_connections: config.max_connections.max(1),
                ..config
            },
            state: Mutex::new(PoolState {
                connections: Vec::new(),
                transactions: HashMap::new(),
                pending_opens: 0,
            }),
            available: Condvar::new(),
            waiting: AtomicUsize::new(0),
            opener: Box::new(opener),
            created: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Run `f` on a connection.
    ///
    /// With a transaction id, the transaction's bound connection is used and
    /// calls on the same transaction are serialized. Without one, the
    /// least-busy unpinned connection is used; when every connection is
    /// pinned the call waits for one to be released, up to `acquire_timeout`.
    pub fn with_connection<T>(
        &self,
        transaction: Option<&str>,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        match transaction {
            Some(id) => {
                let bound = self.bound(id)?;
                let slot = self.lock_slot(id, &bound)?;
                match slot.as_ref() {
                    Some(pinned) => with_deadline(&pinned.guard, self.config.execute_timeout, f),
                    // Closed while we were waiting
                    None => Err(Error::unknown_transaction(id)),
                }
            }
            None => {
                let checkout = self.checkout(false)?;
                let result = self
                    .lock_connection(&checkout.connection)
                    .and_then(|guard| with_deadline(&guard, self.config.execute_timeout, f));
                drop(checkout);
                self.notify_available();
                result
            }
        }
    }

    /// Open a transaction on a dedicated connection and return its id
    pub fn begin(&self, name: Option<String>) -> Result<String> {
        let id = match name {
            Some(name) if name.is_empty() => {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    "transaction id must not be empty".to_string(),
                ))
            }
            Some(name) => name,
            None => format!("tx-{}", TRANSACTION_ID_COUNTER.fetch_add(1, Ordering::SeqCst)),
        };

        if self.state.lock().transactions.contains_key(&id) {
            return Err(already_exists(&id));
        }

        // Only idle connections are pinned, so no plain caller is queued on it
        let checkout = self.checkout(true)?;
        let begun = self.lock_connection(&checkout.connection).and_then(|guard| {
            guard.execute_batch("BEGIN")?;
            Ok(guard)
        });
        let guard = match begun {
            Ok(guard) => guard,
            Err(err) => {
                drop(checkout);
                self.notify_available();
                return Err(err);
            }
        };

        let connection_id = checkout.connection.id;
        let bound = Arc::new(BoundTransaction {
            connection_id,
            slot: Mutex::new(Some(Pinned {
                guard,
                _checkout: checkout,
            })),
        });

        let mut state = self.state.lock();
        if state.transactions.contains_key(&id) {
            // Lost a race against a begin with the same name
            drop(state);
            if let Some(pinned) = bound.slot.lock().take() {
                let _ = pinned.guard.execute_batch("ROLLBACK");
            }
            self.notify_available();
            return Err(already_exists(&id));
        }
        state.transactions.insert(id.clone(), bound);
        drop(state);

        debug!(transaction = %id, connection = connection_id, "transaction started");
        Ok(id)
    }

    pub fn commit(&self, id: &str) -> Result<()> {
        self.finish(id, true)
    }

    pub fn rollback(&self, id: &str) -> Result<()> {
        self.finish(id, false)
    }

    pub fn has_transaction(&self, id: &str) -> bool {
        self.state.lock().transactions.contains_key(id)
    }

    /// Id of the connection a transaction is bound to
    pub fn transaction_connection(&self, id: &str) -> Result<usize> {
        Ok(self.bound(id)?.connection_id)
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            connections: state.connections.len(),
            max_connections: self.config.max_connections,
            open_transactions: state.transactions.len(),
            busy: state.connections.iter().filter(|c| c.in_use() > 0).count(),
            created: self.created.load(Ordering::SeqCst),
        }
    }

    /// Drop every open transaction (rolled back by the engine) with a warning
    pub fn close(&self) {
        let leaked: Vec<(String, Arc<BoundTransaction>)> =
            self.state.lock().transactions.drain().collect();
        for (id, bound) in leaked {
            warn!(transaction = %id, "closing pool with an open transaction, rolling back");
            if let Some(pinned) = bound.slot.lock().take() {
                if let Err(err) = pinned.guard.execute_batch("ROLLBACK") {
                    warn!(transaction = %id, error = %err, "rollback on close failed");
                }
            }
        }
        self.notify_available();
        info!(connections = self.state.lock().connections.len(), "connection pool closed");
    }

    fn finish(&self, id: &str, commit: bool) -> Result<()> {
        let bound = self
            .state
            .lock()
            .transactions
            .remove(id)
            .ok_or_else(|| Error::unknown_transaction(id))?;

        // Waits for a statement still running inside the transaction
        let pinned = bound
            .slot
            .lock()
            .take()
            .ok_or_else(|| Error::unknown_transaction(id))?;

        let statement = if commit { "COMMIT" } else { "ROLLBACK" };
        let result = pinned.guard.execute_batch(statement);

        if let Err(err) = &result {
            warn!(transaction = %id, error = %err, "{} failed", statement);
            if !pinned.guard.is_autocommit() {
                if let Err(err) = pinned.guard.execute_batch("ROLLBACK") {
                    warn!(transaction = %id, error = %err, "rollback after failed commit failed");
                }
            }
        }
        drop(pinned);
        self.notify_available();

        result?;
        debug!(transaction = %id, connection = bound.connection_id, "transaction {}", statement.to_lowercase());
        Ok(())
    }

    fn bound(&self, id: &str) -> Result<Arc<BoundTransaction>> {
        self.state
            .lock()
            .transactions
            .get(id)
            .cloned()
            .ok_or_else(|| Error::unknown_transaction(id))
    }

    fn lock_slot<'a>(
        &self,
        id: &str,
        bound: &'a BoundTransaction,
    ) -> Result<MutexGuard<'a, Option<Pinned>>> {
        match self.config.acquire_timeout {
            Some(timeout) => bound.slot.try_lock_for(timeout).ok_or_else(|| {
                Error::new(
                    ErrorKind::Timeout,
                    format!("waited {}ms for transaction '{}'", timeout.as_millis(), id),
                )
            }),
            None => Ok(bound.slot.lock()),
        }
    }

    fn lock_connection(&self, connection: &PooledConnection) -> Result<ConnectionGuard> {
        match self.config.acquire_timeout {
            Some(timeout) => connection.handle.try_lock_arc_for(timeout).ok_or_else(|| {
                Error::new(
                    ErrorKind::Timeout,
                    format!("waited {}ms for connection {}", timeout.as_millis(), connection.id),
                )
            }),
            None => Ok(connection.handle.lock_arc()),
        }
    }

    /// Least-busy selection, growing the pool while it is saturated.
    ///
    /// A transaction (`pin`) only takes an idle connection. Callers that find
    /// nothing usable wait for a release until `acquire_timeout`.
    fn checkout(&self, pin: bool) -> Result<Checkout> {
        let deadline = self.config.acquire_timeout.map(|timeout| Instant::now() + timeout);
        let mut growth_error = None;
        // Registered before the first look so a concurrent release always notifies
        let _waiter = Waiter::register(&self.waiting);
        let mut state = self.state.lock();

        loop {
            let candidate = least_busy(&state.connections);
            let idle = candidate.as_ref().map_or(false, |c| c.in_use() == 0);
            let below_max =
                state.connections.len() + state.pending_opens < self.config.max_connections;

            if !idle && below_max && growth_error.is_none() {
                state.pending_opens += 1;
                let opened = MutexGuard::unlocked(&mut state, || (self.opener)());
                state.pending_opens -= 1;

                match opened {
                    Ok(connection) => {
                        let id = self.created.fetch_add(1, Ordering::SeqCst);
                        let pooled = Arc::new(PooledConnection::new(id, connection));
                        state.connections.push(Arc::clone(&pooled));
                        self.available.notify_all();
                        debug!(
                            connection = id,
                            connections = state.connections.len(),
                            max = self.config.max_connections,
                            "connection pool grew"
                        );
                        return Ok(Checkout::new(pooled, pin));
                    }
                    Err(err) => {
                        self.available.notify_all();
                        warn!(error = %err, "could not open a new connection, reusing an existing one");
                        growth_error = Some(err);
                        continue;
                    }
                }
            }

            match candidate {
                Some(connection) if idle || !pin => return Ok(Checkout::new(connection, pin)),
                _ => {}
            }

            if state.connections.is_empty() && state.pending_opens == 0 {
                let reason = growth_error
                    .map(|err| err.to_string())
                    .unwrap_or_else(|| "no connection could be opened".to_string());
                return Err(Error::new(ErrorKind::ConnectionExhausted, reason));
            }

            let timed_out = match deadline {
                Some(deadline) => self.available.wait_until(&mut state, deadline).timed_out(),
                None => {
                    self.available.wait(&mut state);
                    false
                }
            };

            if timed_out {
                let waited = self.config.acquire_timeout.unwrap_or_default().as_millis();
                let wanted = if pin { "an idle connection" } else { "a connection not bound to a transaction" };
                return Err(Error::new(
                    ErrorKind::Timeout,
                    format!("waited {}ms for {}", waited, wanted),
                ));
            }
        }
    }

    /// Wake callers blocked in `checkout` after a claim was dropped
    fn notify_available(&self) {
        if self.waiting.load(Ordering::SeqCst) > 0 {
            // Taking the state lock orders this after the waiter's last check
            let _state = self.state.lock();
            self.available.notify_all();
        }
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        let state = self.state.lock();
        for id in state.transactions.keys() {
            warn!(transaction = %id, "connection pool dropped with an open transaction");
        }
    }
}

fn least_busy(connections: &[Arc<PooledConnection>]) -> Option<Arc<PooledConnection>> {
    connections
        .iter()
        .filter(|c| !c.is_pinned())
        .min_by_key(|c| c.in_use())
        .cloned()
}

fn already_exists(id: &str) -> Error {
    Error::new(
        ErrorKind::TransactionAlreadyExists,
        format!("transaction '{}' is already open", id),
    )
}
