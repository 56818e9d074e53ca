// crates/seamscale-core/src/executor.rs
//
// Bounded-concurrency executor.
//
// Design:
//   • Exactly `concurrency` worker threads are spawned for the duration of one
//     `execute` call. They pull from a zero-capacity (rendezvous) channel, so
//     an item is only handed over when a worker is idle. At most
//     `concurrency` transforms are ever in flight and the producer never runs
//     ahead of the pool.
//   • Items are dispatched in origin order but complete in any order. Callers
//     that need ordering feed completions into a `ReorderBuffer`.
//   • A failing or panicking transform only fails its own item.
//   • Cancellation stops the dispatch loop before the next hand-off. Items a
//     worker has received but not started are reported Cancelled; items
//     already running may finish.
//   • Progress updates are numbered under a short lock and handed to a
//     reporter thread, so a slow sink never holds up a worker.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::progress::{ProgressSink, ProgressUpdate};
use crate::types::{ProcessingResult, WorkItem};

// ── Public types ──────────────────────────────────────────────────────────────

/// What happened to one work item.
#[derive(Debug)]
pub enum Outcome<O> {
    Done(O),
    Failed(Error),
    Cancelled,
}

/// One finished work item, tagged with its origin index.
#[derive(Debug)]
pub struct Completion<O> {
    pub index:   usize,
    pub label:   String,
    pub outcome: Outcome<O>,
}

/// Returned by `execute` once every dispatched item has completed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Items pulled from the source and handed to a worker.
    pub dispatched: usize,
    /// True if dispatch stopped early because of cancellation.
    pub cancelled:  bool,
}

/// Successful output of a file-level transform.
#[derive(Clone, Debug, Default)]
pub struct ItemOutput {
    pub output:   Option<PathBuf>,
    pub messages: Vec<String>,
}

// ── Executor ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Executor {
    concurrency:     usize,
    eta_min_samples: usize,
    eta_min_elapsed: Duration,
}

impl Executor {
    pub fn new(concurrency: usize) -> Result<Self> {
        if concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".into()));
        }
        Ok(Self {
            concurrency,
            eta_min_samples: 3,
            eta_min_elapsed: Duration::from_secs(1),
        })
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self::new(config.threads)?
            .with_eta_thresholds(config.eta_min_samples, Duration::from_millis(config.eta_min_elapsed_ms)))
    }

    pub fn with_eta_thresholds(mut self, samples: usize, elapsed: Duration) -> Self {
        self.eta_min_samples = samples;
        self.eta_min_elapsed = elapsed;
        self
    }

    pub fn concurrency(&self) -> usize { self.concurrency }

    /// Run `transform` over `items` on the worker pool, streaming each
    /// completion to `on_complete` from the worker thread that produced it.
    ///
    /// `total` is only used for progress reporting; pass 0 if unknown.
    /// Blocks until every dispatched item has completed.
    pub fn execute<I, O, T, C>(
        &self,
        items:       impl IntoIterator<Item = WorkItem<I>>,
        total:       usize,
        transform:   T,
        progress:    &dyn ProgressSink,
        cancel:      &CancelToken,
        on_complete: C,
    ) -> DispatchStats
    where
        I: Send,
        O: Send,
        T: Fn(I, &CancelToken) -> Result<O> + Sync,
        C: Fn(Completion<O>) + Sync,
    {
        let (tx, rx)  = bounded::<WorkItem<I>>(0);
        let (ptx, prx) = unbounded::<ProgressUpdate>();
        let started   = Instant::now();
        let completed = Mutex::new(0usize);
        let mut stats = DispatchStats::default();

        debug!("executor: {} workers", self.concurrency);

        thread::scope(|s| {
            s.spawn(move || {
                for update in prx.iter() {
                    progress.on_item_complete(&update);
                }
            });

            for _ in 0..self.concurrency {
                let rx          = rx.clone();
                let ptx         = ptx.clone();
                let transform   = &transform;
                let on_complete = &on_complete;
                let completed   = &completed;
                s.spawn(move || {
                    for item in rx.iter() {
                        let completion = run_one(item, transform, cancel);

                        if !matches!(completion.outcome, Outcome::Cancelled) {
                            // Numbered and queued under one lock so the sink
                            // sees strictly increasing counts.
                            let mut n = completed.lock();
                            *n += 1;
                            let _ = ptx.send(ProgressUpdate {
                                completed: *n,
                                total,
                                elapsed:   started.elapsed(),
                                label:     completion.label.clone(),
                                success:   matches!(completion.outcome, Outcome::Done(_)),
                                eta_min_samples: self.eta_min_samples,
                                eta_min_elapsed: self.eta_min_elapsed,
                            });
                        }

                        on_complete(completion);
                    }
                });
            }
            drop(rx);
            drop(ptx);

            for item in items {
                if cancel.is_cancelled() {
                    on_complete(Completion { index: item.index, label: item.label, outcome: Outcome::Cancelled });
                    stats.cancelled = true;
                    break;
                }
                if let Err(e) = tx.send(item) {
                    // Only possible if every worker died.
                    let item = e.into_inner();
                    warn!("executor: no live workers, dropping item {}", item.index);
                    on_complete(Completion { index: item.index, label: item.label, outcome: Outcome::Cancelled });
                    stats.cancelled = true;
                    break;
                }
                stats.dispatched += 1;
            }
            drop(tx);
        });

        debug!(
            "executor: dispatched {} items in {:.2}s (cancelled={})",
            stats.dispatched, started.elapsed().as_secs_f64(), stats.cancelled,
        );
        stats
    }

    /// File-level batch: run every item, collect one `ProcessingResult` per
    /// item in origin order. Items never started because of cancellation are
    /// marked Cancelled, so the result count always equals the item count.
    pub fn run_batch<I, T>(
        &self,
        items:     Vec<WorkItem<I>>,
        transform: T,
        progress:  &dyn ProgressSink,
        cancel:    &CancelToken,
    ) -> Vec<ProcessingResult>
    where
        I: Send,
        T: Fn(I, &CancelToken) -> Result<ItemOutput> + Sync,
    {
        let total  = items.len();
        let labels: Vec<(usize, String)> = items.iter().map(|i| (i.index, i.label.clone())).collect();
        let results = Mutex::new(Vec::with_capacity(total));

        self.execute(items, total, transform, progress, cancel, |c: Completion<ItemOutput>| {
            let r = match c.outcome {
                Outcome::Done(out) => {
                    let mut r = ProcessingResult::succeeded(c.index, c.label, out.output);
                    r.messages = out.messages;
                    r
                }
                Outcome::Failed(e) => ProcessingResult::failed(c.index, c.label, e),
                Outcome::Cancelled => ProcessingResult::cancelled(c.index, c.label),
            };
            results.lock().push(r);
        });

        let mut results = results.into_inner();
        let mut seen = vec![false; labels.iter().map(|(i, _)| i + 1).max().unwrap_or(0)];
        for r in &results {
            if let Some(slot) = seen.get_mut(r.index) { *slot = true; }
        }
        for (index, label) in labels {
            if !seen[index] {
                results.push(ProcessingResult::cancelled(index, label));
            }
        }
        results.sort_by_key(|r| r.index);
        results
    }
}

// ── Internal implementation ───────────────────────────────────────────────────

fn run_one<I, O, T>(item: WorkItem<I>, transform: &T, cancel: &CancelToken) -> Completion<O>
where
    T: Fn(I, &CancelToken) -> Result<O>,
{
    let WorkItem { index, label, input } = item;

    if cancel.is_cancelled() {
        return Completion { index, label, outcome: Outcome::Cancelled };
    }

    let outcome = match catch_unwind(AssertUnwindSafe(|| transform(input, cancel))) {
        Ok(Ok(out))                 => Outcome::Done(out),
        Ok(Err(Error::Cancelled))   => Outcome::Cancelled,
        Ok(Err(e))                  => {
            debug!("item {index} ({label}) failed: {e}");
            Outcome::Failed(e)
        }
        Err(payload) => {
            let msg = payload.downcast_ref::<&str>().map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            warn!("item {index} ({label}) panicked: {msg}");
            Outcome::Failed(Error::transform(format!("transform panicked: {msg}")))
        }
    };

    Completion { index, label, outcome }
}
