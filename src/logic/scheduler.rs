//! Periodic task runner
//!
//! Fires a task on a fixed interval until shutdown is signalled. A tick that
//! overruns the interval delays the next one; missed ticks are dropped, so
//! runs of the same task never overlap and never pile up.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Spawn `task` every `period` until `shutdown` flips to `true`
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut task: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(task = name, period_secs = period.as_secs_f64(), "periodic task started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!(task = name, "tick");
                    task().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(task = name, "periodic task stopped");
    })
}
