//! Run-scoped execution context.
//!
//! The context is a typed key/value message bus shared by every recipe and
//! every file task of one run. It carries cross-cutting state: the current
//! cycle's details, accumulated data-table rows, the error and timeout
//! observation callbacks, and the wall-clock budget. All operations are
//! safe under concurrent per-file tasks.

use crate::data_table::DataTableStore;
use crate::error::RecipeError;
use crate::recipe::RecipeIdentity;
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

type Message = Arc<dyn Any + Send + Sync>;

/// Observation hook invoked on contained failures. Must not panic.
pub type ErrorHandler = Arc<dyn Fn(&RecipeError) + Send + Sync>;

/// Observation hook invoked once when the run's wall-clock budget is
/// exceeded. Must not panic.
pub type TimeoutHandler = Arc<dyn Fn(&RecipeError, &ExecutionContext) + Send + Sync>;

/// Message key holding the run's wall-clock budget as a [`Duration`].
pub const RUN_TIMEOUT: &str = "remold.run-timeout";

/// Message key any recipe may set to halt remaining work in the current
/// cycle. Cleared when the next cycle begins.
pub const PANIC: &str = "remold.panic";

const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(4 * 60);

/// Run-scoped typed message bus.
pub struct ExecutionContext {
    messages: DashMap<String, Message>,
    new_messages: AtomicBool,
    on_error: RwLock<Option<ErrorHandler>>,
    on_timeout: RwLock<Option<TimeoutHandler>>,
    data_tables: DataTableStore,
    cycle: RwLock<Arc<CycleState>>,
}

impl ExecutionContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages: DashMap::new(),
            new_messages: AtomicBool::new(false),
            on_error: RwLock::new(None),
            on_timeout: RwLock::new(None),
            data_tables: DataTableStore::default(),
            cycle: RwLock::new(Arc::new(CycleState::new(0))),
        }
    }

    /// Store a value under `key`, replacing any previous one. Marks the
    /// context as having new messages, which feeds the scheduler's
    /// convergence check.
    pub fn put_message<T: Any + Send + Sync>(&self, key: &str, value: T) {
        self.messages.insert(key.to_string(), Arc::new(value));
        self.new_messages.store(true, Ordering::Release);
    }

    /// Look up a typed value. `None` when absent or of another type.
    #[must_use]
    pub fn get_message<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.messages
            .get(key)
            .and_then(|m| Arc::clone(m.value()).downcast::<T>().ok())
    }

    /// Remove and return a typed value (get-and-remove semantics).
    #[must_use]
    pub fn poll_message<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.messages
            .remove(key)
            .and_then(|(_, m)| m.downcast::<T>().ok())
    }

    /// Fetch the value under `key`, inserting the supplier's result first
    /// when absent. `None` when an existing value has a different type.
    pub fn compute_message_if_absent<T, F>(&self, key: &str, supplier: F) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let mut inserted = false;
        let value = {
            let entry = self.messages.entry(key.to_string()).or_insert_with(|| {
                inserted = true;
                Arc::new(supplier()) as Message
            });
            Arc::clone(entry.value())
        };
        if inserted {
            self.new_messages.store(true, Ordering::Release);
        }
        value.downcast::<T>().ok()
    }

    /// Append `value` to the `Vec<T>` stored under `key`, creating it when
    /// absent. The stored collection is copied, not mutated in place, so
    /// readers holding the previous `Arc` are unaffected.
    pub fn put_message_in_collection<T>(&self, key: &str, value: T)
    where
        T: Any + Clone + Send + Sync,
    {
        {
            let mut entry = self
                .messages
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Vec::<T>::new()) as Message);
            let mut next = Arc::clone(entry.value())
                .downcast::<Vec<T>>()
                .map(|v| (*v).clone())
                .unwrap_or_default();
            next.push(value);
            *entry.value_mut() = Arc::new(next);
        }
        self.new_messages.store(true, Ordering::Release);
    }

    /// Whether any message was stored since the flag was last taken.
    #[must_use]
    pub fn has_new_messages(&self) -> bool {
        self.new_messages.load(Ordering::Acquire)
    }

    /// Read and reset the new-messages flag.
    pub fn take_new_messages(&self) -> bool {
        self.new_messages.swap(false, Ordering::AcqRel)
    }

    /// Install the error observation hook.
    pub fn set_on_error(&self, handler: ErrorHandler) {
        *self.on_error.write() = Some(handler);
    }

    /// The error observation hook; a no-op when none was installed.
    #[must_use]
    pub fn on_error(&self) -> ErrorHandler {
        self.on_error
            .read()
            .clone()
            .unwrap_or_else(|| Arc::new(|_| {}))
    }

    /// Install the timeout observation hook.
    pub fn set_on_timeout(&self, handler: TimeoutHandler) {
        *self.on_timeout.write() = Some(handler);
    }

    /// The timeout observation hook; a no-op when none was installed.
    #[must_use]
    pub fn on_timeout(&self) -> TimeoutHandler {
        self.on_timeout
            .read()
            .clone()
            .unwrap_or_else(|| Arc::new(|_, _| {}))
    }

    /// The run's wall-clock budget; defaults to four minutes.
    #[must_use]
    pub fn run_timeout(&self) -> Duration {
        self.get_message::<Duration>(RUN_TIMEOUT)
            .map_or(DEFAULT_RUN_TIMEOUT, |d| *d)
    }

    /// Set the run's wall-clock budget.
    pub fn set_run_timeout(&self, budget: Duration) {
        self.put_message(RUN_TIMEOUT, budget);
    }

    /// Ask the engine to halt remaining work in the current cycle.
    pub fn request_panic(&self) {
        self.put_message(PANIC, true);
    }

    /// Whether a panic was requested this cycle.
    #[must_use]
    pub fn is_panicked(&self) -> bool {
        self.messages.contains_key(PANIC)
    }

    /// Details of the cycle currently executing.
    #[must_use]
    pub fn cycle(&self) -> Arc<CycleState> {
        Arc::clone(&self.cycle.read())
    }

    /// Start a new cycle: fresh change tracking, panic flag cleared.
    pub fn begin_cycle(&self, cycle: usize) {
        self.messages.remove(PANIC);
        *self.cycle.write() = Arc::new(CycleState::new(cycle));
    }

    /// The data-table row store for this run.
    #[must_use]
    pub fn data_tables(&self) -> &DataTableStore {
        &self.data_tables
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("messages", &self.messages.len())
            .field("cycle", &self.cycle.read().cycle())
            .finish()
    }
}

/// Details of the cycle currently executing, consumed by the
/// idempotence-guard recipes.
#[derive(Debug)]
pub struct CycleState {
    cycle: usize,
    current_position: AtomicU64,
    changed_identities: DashSet<RecipeIdentity>,
    changed_names: DashSet<String>,
}

impl CycleState {
    fn new(cycle: usize) -> Self {
        Self {
            cycle,
            current_position: AtomicU64::new(0),
            changed_identities: DashSet::new(),
            changed_names: DashSet::new(),
        }
    }

    /// One-based cycle number, 0 before the first cycle starts.
    #[inline]
    #[must_use]
    pub fn cycle(&self) -> usize {
        self.cycle
    }

    /// Pre-order position of the recipe stack currently executing.
    #[must_use]
    pub fn current_position(&self) -> u64 {
        self.current_position.load(Ordering::Acquire)
    }

    /// Record which recipe stack is executing. Set by the engine.
    pub fn set_current_position(&self, position: u64) {
        self.current_position.store(position, Ordering::Release);
    }

    /// Record that `identity` made a change this cycle.
    pub fn record_change(&self, identity: RecipeIdentity, name: &str) {
        self.changed_identities.insert(identity);
        self.changed_names.insert(name.to_string());
    }

    /// Whether the given recipe identity already made a change this cycle.
    #[must_use]
    pub fn has_changed(&self, identity: &RecipeIdentity) -> bool {
        self.changed_identities.contains(identity)
    }

    /// Whether any recipe with the given name already made a change this
    /// cycle.
    #[must_use]
    pub fn has_changed_name(&self, name: &str) -> bool {
        self.changed_names.contains(name)
    }
}
