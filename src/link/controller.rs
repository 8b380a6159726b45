use std::future::Future;

use anyhow::{bail, Context, Result};
use log::{error, info};
use tokio::runtime::{Builder, Handle};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

enum JobHandle {
    Task(JoinHandle<()>),
    Thread(std::thread::JoinHandle<()>),
}

impl JobHandle {
    fn is_finished(&self) -> bool {
        match self {
            JobHandle::Task(handle) => handle.is_finished(),
            JobHandle::Thread(handle) => handle.is_finished(),
        }
    }
}

/// A cancellable background job. `done` fires once the job's future has
/// returned or been dropped.
struct BackgroundJob {
    cancel: CancellationToken,
    done: CancellationToken,
    handle: JobHandle,
}

/// Owns at most one running link loop.
///
/// Jobs run as a task on the caller's tokio runtime when there is one, and on
/// a dedicated thread with its own current-thread runtime otherwise.
pub struct LinkController {
    job: Option<BackgroundJob>,
}

impl Default for LinkController {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkController {
    pub fn new() -> Self {
        Self { job: None }
    }

    pub fn is_running(&self) -> bool {
        self.job
            .as_ref()
            .is_some_and(|job| {
                !job.cancel.is_cancelled() && !job.done.is_cancelled() && !job.handle.is_finished()
            })
    }

    /// Starts `make(cancel)` in the background. A previous job that is still
    /// winding down finishes before the new one begins, so two loops never
    /// write at the same time.
    pub fn start<F, Fut>(&mut self, make: F) -> Result<()>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_running() {
            bail!("link loop already active");
        }

        let previous = self.job.take().map(|job| job.done);
        let cancel = CancellationToken::new();
        let done = CancellationToken::new();

        let guard = done.clone().drop_guard();
        let token = cancel.clone();
        let job = async move {
            let _guard = guard;
            if let Some(previous) = previous {
                previous.cancelled().await;
            }
            if !token.is_cancelled() {
                make(token).await;
            }
        };

        let handle = match Handle::try_current() {
            Ok(runtime) => JobHandle::Task(runtime.spawn(job)),
            Err(_) => {
                info!("No tokio runtime on caller, hosting link loop on its own thread");
                let thread = std::thread::Builder::new()
                    .name("postura-link".into())
                    .spawn(move || {
                        match Builder::new_current_thread().enable_all().build() {
                            Ok(runtime) => runtime.block_on(job),
                            Err(err) => error!("Failed to build link runtime: {err}"),
                        }
                    })
                    .context("failed to spawn link thread")?;
                JobHandle::Thread(thread)
            }
        };

        self.job = Some(BackgroundJob {
            cancel,
            done,
            handle,
        });
        Ok(())
    }

    /// Signals the running job to stop without waiting for it. Returns
    /// whether a job was running.
    pub fn stop(&mut self) -> bool {
        let was_running = self.is_running();
        if let Some(job) = &self.job {
            job.cancel.cancel();
        }
        was_running
    }

    /// Token that fires when the current (or last) job has fully exited.
    pub fn finished(&self) -> Option<CancellationToken> {
        self.job.as_ref().map(|job| job.done.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn is_threaded(controller: &LinkController) -> bool {
        matches!(
            controller.job.as_ref().map(|job| &job.handle),
            Some(JobHandle::Thread(_))
        )
    }

    #[tokio::test]
    async fn test_inline_job_runs_until_stopped() {
        let mut controller = LinkController::new();
        controller
            .start(|cancel| async move { cancel.cancelled().await })
            .unwrap();

        assert!(controller.is_running());
        assert!(!is_threaded(&controller));
        assert!(controller.start(|_| async {}).is_err());

        assert!(controller.stop());
        assert!(!controller.stop());
        tokio::time::timeout(Duration::from_secs(1), controller.finished().unwrap().cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_restart_waits_for_previous_job() {
        let active = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicUsize::new(0));
        let mut controller = LinkController::new();

        for _ in 0..3 {
            let active = active.clone();
            let overlap = overlap.clone();
            controller
                .start(move |cancel| async move {
                    if active.fetch_add(1, Ordering::SeqCst) > 0 {
                        overlap.fetch_add(1, Ordering::SeqCst);
                    }
                    cancel.cancelled().await;
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
                .unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
            controller.stop();
        }

        tokio::time::timeout(Duration::from_secs(2), controller.finished().unwrap().cancelled())
            .await
            .unwrap();
        assert_eq!(overlap.load(Ordering::SeqCst), 0);
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_without_runtime_uses_dedicated_thread() {
        let ran = Arc::new(AtomicUsize::new(0));
        let mut controller = LinkController::new();
        let counter = ran.clone();
        controller
            .start(move |cancel| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                cancel.cancelled().await;
            })
            .unwrap();
        assert!(is_threaded(&controller));

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while ran.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(ran.load(Ordering::SeqCst), 1);

        controller.stop();
        let done = controller.finished().unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !done.is_cancelled() && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(done.is_cancelled());
    }
}
