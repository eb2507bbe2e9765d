use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::TranslationError;
use crate::providers::TranslationBackend;
use crate::reconcile::{OrderedTagEntry, PromptListReconciler, ReconcileOutcome};

const QUEUE_DEPTH: usize = 16;

pub type JobId = u64;

/// Work handed to the background worker. Jobs own their inputs, so the
/// caller's entries are only replaced once a finished result comes back.
#[derive(Debug, Clone)]
pub enum TranslationJob {
    Reconcile { text: String },
    FillMissing { entries: Vec<OrderedTagEntry> },
    Retranslate { entry: OrderedTagEntry },
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Reconciled(ReconcileOutcome),
    Filled {
        entries: Vec<OrderedTagEntry>,
        filled: usize,
    },
    Retranslated(OrderedTagEntry),
    Failed(TranslationError),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobEvent {
    pub id: JobId,
    pub outcome: JobOutcome,
}

/// Cancels one submitted job without touching the rest of the queue.
#[derive(Debug, Clone)]
pub struct JobHandle {
    id: JobId,
    token: CancellationToken,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

struct Envelope {
    id: JobId,
    job: TranslationJob,
    token: CancellationToken,
}

/// Runs translation jobs one at a time off the caller's task and reports
/// each result as a [`JobEvent`].
pub struct TranslationWorker {
    jobs: mpsc::Sender<Envelope>,
    shutdown: CancellationToken,
    next_id: AtomicU64,
    task: JoinHandle<()>,
}

impl TranslationWorker {
    pub fn spawn<B>(reconciler: PromptListReconciler<B>) -> (Self, mpsc::Receiver<JobEvent>)
    where
        B: TranslationBackend + 'static,
    {
        let (job_tx, job_rx) = mpsc::channel(QUEUE_DEPTH);
        let (event_tx, event_rx) = mpsc::channel(QUEUE_DEPTH);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_loop(reconciler, job_rx, event_tx, shutdown.clone()));
        let worker = Self {
            jobs: job_tx,
            shutdown,
            next_id: AtomicU64::new(1),
            task,
        };
        (worker, event_rx)
    }

    pub async fn submit(&self, job: TranslationJob) -> Result<JobHandle, TranslationError> {
        if self.shutdown.is_cancelled() {
            return Err(TranslationError::Cancelled);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.shutdown.child_token();
        let envelope = Envelope {
            id,
            job,
            token: token.clone(),
        };
        self.jobs
            .send(envelope)
            .await
            .map_err(|_| TranslationError::Cancelled)?;
        debug!("queued translation job {id}");
        Ok(JobHandle { id, token })
    }

    /// Cancels the in-flight job and every queued one, and stops taking new ones.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub async fn join(self) {
        self.shutdown.cancel();
        drop(self.jobs);
        if let Err(err) = self.task.await {
            warn!("translation worker task failed: {err}");
        }
    }
}

async fn run_loop<B>(
    reconciler: PromptListReconciler<B>,
    mut jobs: mpsc::Receiver<Envelope>,
    events: mpsc::Sender<JobEvent>,
    shutdown: CancellationToken,
) where
    B: TranslationBackend + 'static,
{
    loop {
        let envelope = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = jobs.recv() => match next {
                Some(envelope) => envelope,
                None => break,
            },
        };

        let id = envelope.id;
        let outcome = if envelope.token.is_cancelled() {
            JobOutcome::Cancelled
        } else {
            tokio::select! {
                biased;
                _ = envelope.token.cancelled() => JobOutcome::Cancelled,
                outcome = run_job(&reconciler, envelope.job) => outcome,
            }
        };
        if outcome == JobOutcome::Cancelled {
            info!("translation job {id} cancelled");
        }

        if events.send(JobEvent { id, outcome }).await.is_err() {
            debug!("event receiver dropped, stopping translation worker");
            return;
        }
    }

    // queued jobs still get an answer
    jobs.close();
    while let Some(envelope) = jobs.recv().await {
        info!("translation job {} cancelled before it started", envelope.id);
        let event = JobEvent {
            id: envelope.id,
            outcome: JobOutcome::Cancelled,
        };
        if events.send(event).await.is_err() {
            return;
        }
    }
}

async fn run_job<B: TranslationBackend>(
    reconciler: &PromptListReconciler<B>,
    job: TranslationJob,
) -> JobOutcome {
    match job {
        TranslationJob::Reconcile { text } => {
            JobOutcome::Reconciled(reconciler.reconcile_text(&text).await)
        }
        TranslationJob::FillMissing { mut entries } => {
            match reconciler.reconcile_missing_only(&mut entries).await {
                Ok(filled) => JobOutcome::Filled { entries, filled },
                Err(err) => JobOutcome::Failed(err),
            }
        }
        TranslationJob::Retranslate { mut entry } => {
            match reconciler.retranslate_entry(&mut entry).await {
                Ok(()) => JobOutcome::Retranslated(entry),
                Err(err) => JobOutcome::Failed(err),
            }
        }
    }
}
