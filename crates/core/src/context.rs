//! Per-run compilation context.
//!
//! Everything a run needs beyond the configuration itself (options, the
//! worker pool) travels through a [`RunContext`] so that two compilations
//! in the same process never share state.

use crate::error::SchemaError;
use std::num::NonZeroUsize;
use std::thread;

/// Knobs for a single compilation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Number of worker threads for per-type node construction. `1` runs
    /// every job inline on the calling thread.
    pub workers: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            workers: thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
        }
    }
}

impl CompileOptions {
    pub fn sequential() -> Self {
        CompileOptions { workers: 1 }
    }
}

pub struct RunContext {
    options: CompileOptions,
}

impl RunContext {
    pub fn new(options: CompileOptions) -> Self {
        RunContext { options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// Run `job` over every item, splitting the items into contiguous chunks
    /// across scoped worker threads. Jobs communicate results through
    /// write-once slots they own; the first error in item order wins.
    pub fn for_each<J, F>(&self, items: &[J], job: F) -> Result<(), SchemaError>
    where
        J: Sync,
        F: Fn(&J) -> Result<(), SchemaError> + Sync,
    {
        let workers = self.options.workers.max(1).min(items.len());
        if workers <= 1 {
            return items.iter().try_for_each(job);
        }

        let chunk = items.len().div_ceil(workers);
        let job = &job;
        let outcomes: Vec<Result<(), SchemaError>> = thread::scope(|scope| {
            let handles: Vec<_> = items
                .chunks(chunk)
                .map(|part| scope.spawn(move || part.iter().try_for_each(job)))
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join().unwrap_or_else(|_| {
                        Err(SchemaError::Internal("worker thread panicked".to_owned()))
                    })
                })
                .collect()
        });
        outcomes.into_iter().collect()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        RunContext::new(CompileOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    #[test]
    fn every_slot_written_once_in_parallel() {
        let ctx = RunContext::new(CompileOptions { workers: 4 });
        let slots: Vec<OnceLock<usize>> = (0..37).map(|_| OnceLock::new()).collect();
        let ids: Vec<usize> = (0..slots.len()).collect();
        ctx.for_each(&ids, |&i| {
            slots[i]
                .set(i * 2)
                .map_err(|_| SchemaError::Internal(format!("slot {} written twice", i)))
        })
        .unwrap();
        for (i, slot) in slots.iter().enumerate() {
            assert_eq!(slot.get(), Some(&(i * 2)));
        }
    }

    #[test]
    fn first_error_in_item_order_is_reported() {
        let ctx = RunContext::new(CompileOptions { workers: 3 });
        let ids: Vec<usize> = (0..9).collect();
        let err = ctx
            .for_each(&ids, |&i| {
                if i == 2 || i == 7 {
                    Err(SchemaError::Internal(format!("job {}", i)))
                } else {
                    Ok(())
                }
            })
            .unwrap_err();
        assert_eq!(err, SchemaError::Internal("job 2".into()));
    }

    #[test]
    fn sequential_runs_inline() {
        let ctx = RunContext::new(CompileOptions::sequential());
        let ids = [1, 2, 3];
        let seen = std::sync::Mutex::new(Vec::new());
        ctx.for_each(&ids, |&i| {
            seen.lock().unwrap().push(i);
            Ok(())
        })
        .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }
}
