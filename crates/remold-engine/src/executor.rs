//! Pluggable per-file work dispatch.
//!
//! Within one scan or edit sub-phase, per-file work units are independent
//! and may run concurrently; the engine joins the whole batch before the
//! next phase begins, so phases act as synchronization barriers. No
//! ordering is guaranteed among the tasks of one batch.

use parking_lot::Mutex;

/// Executes one phase's batch of file tasks.
///
/// Implementations must run every task to completion before returning;
/// the engine relies on the join for its phase barrier.
pub trait TaskExecutor: Send + Sync {
    /// Run all tasks and wait for them.
    fn run_all<'a>(&self, tasks: Vec<Box<dyn FnOnce() + Send + 'a>>);
}

/// Runs tasks sequentially on the calling thread. Deterministic; the
/// default.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl TaskExecutor for InlineExecutor {
    fn run_all<'a>(&self, tasks: Vec<Box<dyn FnOnce() + Send + 'a>>) {
        for task in tasks {
            task();
        }
    }
}

/// Dispatches tasks onto the rayon global pool, joining at scope exit.
#[derive(Debug, Clone, Copy, Default)]
pub struct RayonExecutor;

impl TaskExecutor for RayonExecutor {
    fn run_all<'a>(&self, tasks: Vec<Box<dyn FnOnce() + Send + 'a>>) {
        rayon::scope(|scope| {
            for task in tasks {
                scope.spawn(move |_| task());
            }
        });
    }
}

/// Map `f` over `items` through `executor`, preserving slot order in the
/// returned vector regardless of execution order.
pub fn map_concurrently<T, R, F>(executor: &dyn TaskExecutor, items: &[T], f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Send + Sync,
{
    let slots: Vec<Mutex<Option<R>>> = items.iter().map(|_| Mutex::new(None)).collect();
    {
        let f = &f;
        let tasks: Vec<Box<dyn FnOnce() + Send + '_>> = items
            .iter()
            .zip(slots.iter())
            .map(|(item, slot)| {
                Box::new(move || {
                    *slot.lock() = Some(f(item));
                }) as Box<dyn FnOnce() + Send + '_>
            })
            .collect();
        executor.run_all(tasks);
    }
    slots.into_iter()
        .map(|slot| {
            slot.into_inner()
                .expect("executor must run every task in the batch")
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn inline_runs_in_order() {
        let order = Mutex::new(Vec::new());
        let items = vec![1, 2, 3];
        let out = map_concurrently(&InlineExecutor, &items, |n| {
            order.lock().push(*n);
            n * 10
        });

        assert_eq!(out, vec![10, 20, 30]);
        assert_eq!(*order.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn rayon_preserves_slot_order() {
        let items: Vec<usize> = (0..64).collect();
        let out = map_concurrently(&RayonExecutor, &items, |n| n + 1);
        let expected: Vec<usize> = (1..=64).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn rayon_runs_every_task() {
        let count = AtomicUsize::new(0);
        let items: Vec<usize> = (0..128).collect();
        map_concurrently(&RayonExecutor, &items, |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(count.load(Ordering::SeqCst), 128);
    }
}
