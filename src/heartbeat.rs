//! Periodic progress reporting while a flow waits on the user.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

/// Receives progress ticks while an authentication flow is waiting.
///
/// Implemented for `Fn()` closures, which are called on every tick. Implement the trait directly
/// to also be told when waiting ends.
pub trait Progress: Send + Sync {
    /// Called once per progress interval.
    fn tick(&self);

    /// Called once when waiting ends, on every exit path, after the last [`tick`](Self::tick).
    fn finish(&self) {}
}

impl<F> Progress for F
where
    F: Fn() + Send + Sync,
{
    fn tick(&self) {
        self();
    }
}

/// A [`Progress`] that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl Progress for Silent {
    fn tick(&self) {}
}

/// A running ticker. Stop it with [`stop`](Self::stop); dropping it aborts the task instead.
pub(crate) struct Heartbeat {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    progress: Arc<dyn Progress>,
}

impl Heartbeat {
    /// Start ticking `progress` every `period`, the first tick one period from now.
    ///
    /// A zero period never ticks.
    pub(crate) fn start(period: Duration, progress: Arc<dyn Progress>) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let ticker = Arc::clone(&progress);

        let task = tokio::spawn(async move {
            if period.is_zero() {
                let _ = stop_rx.await;
                return;
            }

            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = interval.tick() => ticker.tick(),
                }
            }
        });

        Self {
            stop: Some(stop_tx),
            task: Some(task),
            progress,
        }
    }

    /// Stop ticking and wait for the ticker task to end, then call [`Progress::finish`].
    pub(crate) async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                tracing::debug!(%error, "heartbeat task ended abnormally");
            }
        }
        self.progress.finish();
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
