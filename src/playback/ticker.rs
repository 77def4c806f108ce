// Periodic position task
// One thread running a current-thread tokio runtime, torn down without joining

use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error};

/// Repeating job that fires immediately and then every `interval`.
///
/// Stopping never waits: a tick already running is allowed to finish.
pub struct PositionTicker {
    cancel: Option<oneshot::Sender<()>>,
}

impl PositionTicker {
    pub fn start<F>(interval: Duration, mut tick: F) -> std::io::Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let interval = interval.max(Duration::from_millis(1));
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();

        thread::Builder::new()
            .name("audioplayer-position".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!("Failed to start position ticker: {}", e);
                        return;
                    }
                };

                runtime.block_on(async move {
                    let mut ticks = tokio::time::interval(interval);
                    loop {
                        tokio::select! {
                            biased;
                            _ = &mut cancel_rx => break,
                            _ = ticks.tick() => tick(),
                        }
                    }
                });
                debug!("Position ticker stopped");
            })?;

        Ok(Self {
            cancel: Some(cancel_tx),
        })
    }

    pub fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    pub fn is_running(&self) -> bool {
        self.cancel.as_ref().map(|c| !c.is_closed()).unwrap_or(false)
    }
}

impl Drop for PositionTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn fires_immediately_then_periodically() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let mut ticker = PositionTicker::start(Duration::from_millis(20), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        thread::sleep(Duration::from_millis(110));
        ticker.stop();
        let fired = count.load(Ordering::SeqCst);
        assert!(fired >= 3, "only {} ticks", fired);
    }

    #[test]
    fn no_ticks_after_stop() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let mut ticker = PositionTicker::start(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        thread::sleep(Duration::from_millis(35));
        ticker.stop();
        assert!(!ticker.is_running());

        // Allow an in-flight tick to land before sampling
        thread::sleep(Duration::from_millis(15));
        let after_stop = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn dropping_stops_the_ticker() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let ticker = PositionTicker::start(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        drop(ticker);

        thread::sleep(Duration::from_millis(15));
        let after_drop = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(40));
        assert_eq!(count.load(Ordering::SeqCst), after_drop);
    }
}
