//! Buffer-availability monitor.
//!
//! Runs on its own thread while the engine is playing, blocking in the output's bounded
//! wait call so the engine loop itself only ever blocks on its channels. Each time the
//! output reports free space the monitor drops a token into a single-slot channel.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::output::OutputWaiter;

/// Running monitor. Dropping it without [`Monitor::stop`] detaches the thread; it exits
/// on its own once the stop sender is gone.
pub(crate) struct Monitor {
    stop_tx: Sender<()>,
    join: JoinHandle<()>,
}

impl Monitor {
    /// Start a monitor for `waiter`; returns it with the receiving end of its signal slot.
    pub(crate) fn spawn(
        waiter: Arc<dyn OutputWaiter>,
        timeout: Duration,
        retry_delay: Duration,
    ) -> (Self, Receiver<()>) {
        let (signal_tx, signal_rx) = crossbeam_channel::bounded(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let join = std::thread::spawn(move || {
            monitor_main(waiter.as_ref(), timeout, retry_delay, &signal_tx, &stop_rx)
        });
        (Self { stop_tx, join }, signal_rx)
    }

    /// Ask the thread to exit and wait until it has.
    ///
    /// Once this returns no further signal can be sent.
    pub(crate) fn stop(self) {
        let _ = self.stop_tx.send(());
        if self.join.join().is_err() {
            tracing::warn!("availability monitor panicked");
        }
    }
}

fn monitor_main(
    waiter: &dyn OutputWaiter,
    timeout: Duration,
    retry_delay: Duration,
    signal_tx: &Sender<()>,
    stop_rx: &Receiver<()>,
) {
    loop {
        match stop_rx.try_recv() {
            Err(TryRecvError::Empty) => {}
            _ => return,
        }
        let started = Instant::now();
        match waiter.wait(timeout) {
            Ok(true) => {
                crossbeam_channel::select! {
                    send(signal_tx, ()) -> res => {
                        if res.is_err() {
                            return;
                        }
                    }
                    recv(stop_rx) -> _ => return,
                }
            }
            Ok(false) => {
                // A waiter that gives up early (e.g. while paused) would spin otherwise.
                if started.elapsed() < timeout && stop_rx.recv_timeout(retry_delay).is_ok() {
                    return;
                }
            }
            Err(e) => {
                // Device layer occasionally fails a wait; back off and try again.
                tracing::trace!("output wait failed: {e:#}");
                if stop_rx.recv_timeout(retry_delay).is_ok() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::{Result, anyhow};

    struct ScriptedWaiter {
        calls: AtomicUsize,
        fail_first: usize,
    }

    impl OutputWaiter for ScriptedWaiter {
        fn wait(&self, _timeout: Duration) -> Result<bool> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(anyhow!("EINTR"))
            } else {
                Ok(true)
            }
        }
    }

    struct NeverReady;

    impl OutputWaiter for NeverReady {
        fn wait(&self, timeout: Duration) -> Result<bool> {
            std::thread::sleep(timeout);
            Ok(false)
        }
    }

    #[test]
    fn signals_when_output_has_space() {
        let waiter = Arc::new(ScriptedWaiter {
            calls: AtomicUsize::new(0),
            fail_first: 0,
        });
        let (monitor, rx) = Monitor::spawn(waiter, Duration::from_millis(5), Duration::from_millis(1));
        assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());
        monitor.stop();
    }

    #[test]
    fn wait_errors_are_retried_not_surfaced() {
        let waiter = Arc::new(ScriptedWaiter {
            calls: AtomicUsize::new(0),
            fail_first: 3,
        });
        let (monitor, rx) =
            Monitor::spawn(waiter.clone(), Duration::from_millis(5), Duration::from_millis(1));
        assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());
        assert!(waiter.calls.load(Ordering::SeqCst) >= 4);
        monitor.stop();
    }

    #[test]
    fn stop_returns_while_signal_slot_is_full() {
        let waiter = Arc::new(ScriptedWaiter {
            calls: AtomicUsize::new(0),
            fail_first: 0,
        });
        let (monitor, rx) = Monitor::spawn(waiter, Duration::from_millis(5), Duration::from_millis(1));
        // Nobody drains the slot, so the thread ends up parked on delivery.
        std::thread::sleep(Duration::from_millis(20));
        monitor.stop();
        // At most the one buffered token remains and the sender is gone.
        let mut drained = 0;
        while rx.try_recv().is_ok() {
            drained += 1;
        }
        assert!(drained <= 1);
        assert!(rx.recv_timeout(Duration::from_millis(20)).is_err());
    }

    struct ImmediatelyFull {
        calls: AtomicUsize,
    }

    impl OutputWaiter for ImmediatelyFull {
        fn wait(&self, _timeout: Duration) -> Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        }
    }

    #[test]
    fn early_no_space_answers_are_paced() {
        let waiter = Arc::new(ImmediatelyFull {
            calls: AtomicUsize::new(0),
        });
        let (monitor, rx) =
            Monitor::spawn(waiter.clone(), Duration::from_millis(50), Duration::from_millis(20));
        std::thread::sleep(Duration::from_millis(100));
        monitor.stop();
        assert!(rx.try_recv().is_err());
        // Roughly one call per retry delay, not a busy loop.
        assert!(waiter.calls.load(Ordering::SeqCst) <= 10);
    }

    #[test]
    fn stop_returns_while_waiting_for_space() {
        let (monitor, rx) =
            Monitor::spawn(Arc::new(NeverReady), Duration::from_millis(10), Duration::from_millis(1));
        monitor.stop();
        assert!(rx.try_recv().is_err());
    }
}
