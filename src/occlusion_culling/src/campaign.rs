//! Single-writer coverage accumulation on a dedicated thread.
//!
//! Visibility queries run in parallel anywhere; their results are sent over a
//! channel to one worker thread that owns the [`CoverageState`] and folds
//! subsets in arrival order. Each fold is reported through an optional
//! callback.
//!
//! Cancellation is cooperative: [`CoverageWorker::stop`] makes further
//! submissions fail, and [`CoverageWorker::finish`] drains what was already
//! queued and hands the final state back.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context};

use crate::accuracy::AccuracyReport;
use crate::coverage::{CoverageState, FoldReport};
use crate::culling::VisibleSubset;

/// One fold as seen by the callback.
#[derive(Debug, Clone)]
pub struct CoverageUpdate {
    /// Zero-based arrival order of the subset.
    pub sequence: u64,
    pub report: FoldReport,
    pub accuracy: Option<AccuracyReport>,
}

/// Callback invoked on the worker thread after every fold.
pub type UpdateCallback = Arc<dyn Fn(&CoverageUpdate) + Send + Sync>;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct WorkerStats {
    /// Subsets accepted by `submit`
    pub submitted: u64,
    /// Submissions refused after `stop`
    pub rejected: u64,
    /// Subsets folded by the worker
    pub folded: u64,
    /// Points observed across all folded subsets
    pub points_observed: u64,
    pub newly_covered: u64,
    /// Coverage ratio after the latest fold
    pub ratio: f64,
}

struct Submission {
    subset: VisibleSubset,
    accuracy: Option<AccuracyReport>,
}

/// Owner of a [`CoverageState`] fed over a channel.
pub struct CoverageWorker {
    tx: Option<Sender<Submission>>,
    handle: Option<JoinHandle<CoverageState>>,
    accepting: Arc<AtomicBool>,
    stats: Arc<Mutex<WorkerStats>>,
    folded: Arc<AtomicU64>,
}

impl CoverageWorker {
    /// Start a worker that takes ownership of `state`.
    pub fn spawn(state: CoverageState, callback: Option<UpdateCallback>) -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let folded = Arc::new(AtomicU64::new(0));

        let stats_clone = Arc::clone(&stats);
        let folded_clone = Arc::clone(&folded);
        let handle = thread::Builder::new()
            .name("coverage-worker".to_string())
            .spawn(move || Self::worker_loop(rx, state, stats_clone, folded_clone, callback))
            .context("failed to spawn coverage worker thread")?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
            accepting: Arc::new(AtomicBool::new(true)),
            stats,
            folded,
        })
    }

    /// Queue a subset for folding.
    ///
    /// Returns `false` if the worker was stopped or has exited.
    pub fn submit(&self, subset: VisibleSubset) -> bool {
        self.send(Submission {
            subset,
            accuracy: None,
        })
    }

    /// Queue a subset together with its accuracy report, which is added to
    /// the state's campaign accuracy range.
    pub fn submit_with_accuracy(&self, subset: VisibleSubset, accuracy: AccuracyReport) -> bool {
        self.send(Submission {
            subset,
            accuracy: Some(accuracy),
        })
    }

    fn send(&self, submission: Submission) -> bool {
        let Some(tx) = self.tx.as_ref() else {
            return false;
        };
        if !self.accepting.load(Ordering::Acquire) {
            self.stats.lock().rejected += 1;
            return false;
        }
        if tx.send(submission).is_err() {
            // Worker thread has exited
            return false;
        }
        self.stats.lock().submitted += 1;
        true
    }

    /// Refuse further submissions. Already queued subsets are still folded.
    pub fn stop(&self) {
        self.accepting.store(false, Ordering::Release);
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().clone()
    }

    /// Number of subsets folded so far.
    pub fn folded(&self) -> u64 {
        self.folded.load(Ordering::Relaxed)
    }

    /// Close the channel, fold everything still queued and return the state.
    pub fn finish(mut self) -> anyhow::Result<CoverageState> {
        self.stop();
        drop(self.tx.take());
        let handle = self
            .handle
            .take()
            .ok_or_else(|| anyhow!("coverage worker already joined"))?;
        handle
            .join()
            .map_err(|_| anyhow!("coverage worker thread panicked"))
    }

    fn worker_loop(
        rx: Receiver<Submission>,
        mut state: CoverageState,
        stats: Arc<Mutex<WorkerStats>>,
        folded: Arc<AtomicU64>,
        callback: Option<UpdateCallback>,
    ) -> CoverageState {
        tracing::debug!(model_size = state.model_size(), "coverage worker started");

        for (sequence, Submission { subset, accuracy }) in (0u64..).zip(rx.iter()) {
            let report = state.fold(&subset);
            if let Some(accuracy) = &accuracy {
                state.record_accuracy(accuracy);
            }

            {
                let mut s = stats.lock();
                s.folded += 1;
                s.points_observed += subset.len() as u64;
                s.newly_covered += report.newly_covered.len() as u64;
                s.ratio = report.ratio;
            }
            folded.fetch_add(1, Ordering::Relaxed);

            if let Some(callback) = &callback {
                callback(&CoverageUpdate {
                    sequence,
                    report,
                    accuracy,
                });
            }
        }

        tracing::debug!(
            folded = state.poses_folded(),
            ratio = state.ratio(),
            "coverage worker stopped"
        );
        state
    }
}

impl Drop for CoverageWorker {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
