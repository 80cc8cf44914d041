use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;
use std::time::Instant;
use tracing::{debug, error};

use crate::domain::{CCError, JobKind};
use crate::export::ExportReport;
use crate::scan::ScanResult;

#[derive(Debug)]
pub enum JobOutcome {
    Scanned(Result<ScanResult, CCError>),
    Exported(Result<ExportReport, CCError>),
}

impl JobOutcome {
    fn lost(kind: JobKind) -> Self {
        match kind {
            JobKind::Scan => JobOutcome::Scanned(Err(CCError::WorkerLost(kind))),
            JobKind::Export => JobOutcome::Exported(Err(CCError::WorkerLost(kind))),
        }
    }
}

struct Pending {
    kind: JobKind,
    started: Instant,
    receiver: Receiver<JobOutcome>,
}

/// Runs at most one blocking job off the event loop thread.
///
/// A second dispatch while a job is outstanding is rejected. Jobs can not be
/// cancelled and have no timeout.
#[derive(Default)]
pub struct Worker {
    pending: Option<Pending>,
}

impl Worker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn running(&self) -> Option<JobKind> {
        self.pending.as_ref().map(|p| p.kind)
    }

    pub fn dispatch<F>(&mut self, kind: JobKind, job: F) -> Result<(), CCError>
    where
        F: FnOnce() -> JobOutcome + Send + 'static,
    {
        if let Some(pending) = &self.pending {
            return Err(CCError::Busy(pending.kind));
        }
        let (sender, receiver) = mpsc::channel();
        thread::Builder::new()
            .name(format!("charcheck-{kind}"))
            .spawn(move || {
                // The receiver is gone when the model was dropped, nothing to report to.
                let _ = sender.send(job());
            })?;
        debug!("Dispatched {kind}");
        self.pending = Some(Pending {
            kind,
            started: Instant::now(),
            receiver,
        });
        Ok(())
    }

    /// Non blocking, returns the outcome once the job has finished.
    pub fn poll(&mut self) -> Option<JobOutcome> {
        let pending = self.pending.as_ref()?;
        let outcome = match pending.receiver.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => {
                error!("Worker for {} exited without a result", pending.kind);
                JobOutcome::lost(pending.kind)
            }
        };
        self.finish(outcome)
    }

    /// Blocks until the outstanding job is done.
    pub fn wait(&mut self) -> Option<JobOutcome> {
        let pending = self.pending.as_ref()?;
        let outcome = pending
            .receiver
            .recv()
            .unwrap_or_else(|_| JobOutcome::lost(pending.kind));
        self.finish(outcome)
    }

    fn finish(&mut self, outcome: JobOutcome) -> Option<JobOutcome> {
        if let Some(pending) = self.pending.take() {
            debug!(
                "{} finished after {}ms",
                pending.kind,
                pending.started.elapsed().as_millis()
            );
        }
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};

    #[test]
    fn idle_worker_has_nothing_to_report() {
        let mut worker = Worker::new();
        assert!(worker.running().is_none());
        assert!(worker.poll().is_none());
        assert!(worker.wait().is_none());
    }

    #[test]
    fn second_dispatch_is_rejected_while_busy() {
        let mut worker = Worker::new();
        let gate = Arc::new(Barrier::new(2));
        let job_gate = Arc::clone(&gate);
        worker
            .dispatch(JobKind::Scan, move || {
                job_gate.wait();
                JobOutcome::Scanned(Ok(ScanResult::default()))
            })
            .unwrap();
        assert_eq!(worker.running(), Some(JobKind::Scan));
        assert!(worker.poll().is_none());

        let second = worker.dispatch(JobKind::Export, || {
            JobOutcome::Exported(Err(CCError::NoFile))
        });
        assert!(matches!(second, Err(CCError::Busy(JobKind::Scan))));

        gate.wait();
        assert!(matches!(
            worker.wait(),
            Some(JobOutcome::Scanned(Ok(result))) if result.is_empty()
        ));
        assert!(worker.running().is_none());
    }

    #[test]
    fn poll_eventually_delivers() {
        let mut worker = Worker::new();
        worker
            .dispatch(JobKind::Export, || JobOutcome::Exported(Err(CCError::NoFile)))
            .unwrap();
        let outcome = loop {
            if let Some(outcome) = worker.poll() {
                break outcome;
            }
            thread::sleep(std::time::Duration::from_millis(5));
        };
        assert!(matches!(outcome, JobOutcome::Exported(Err(CCError::NoFile))));
        assert!(worker.running().is_none());
    }

    #[test]
    fn panicking_job_is_reported_as_lost() {
        let mut worker = Worker::new();
        worker
            .dispatch(JobKind::Scan, || panic!("boom"))
            .unwrap();
        assert!(matches!(
            worker.wait(),
            Some(JobOutcome::Scanned(Err(CCError::WorkerLost(JobKind::Scan))))
        ));
    }
}
