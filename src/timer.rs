//! Cancelable countdown running on its own thread.

use std::{
    io,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam::{
    channel::{self, Sender, TryRecvError},
    select,
};

/// Counts down from a duration, reporting the remaining time every `interval`
/// and calling a finish callback once it reaches zero.
///
/// The first tick fires right away with the full duration. No tick is sent for
/// zero; `on_finish` is called instead. Dropping the handle cancels the countdown.
pub struct Countdown {
    cancel: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Countdown {
    pub fn start<T, F>(
        duration: Duration,
        interval: Duration,
        mut on_tick: T,
        on_finish: F,
    ) -> io::Result<Self>
    where
        T: FnMut(Duration) + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = channel::bounded::<()>(1);
        let interval = interval.max(Duration::from_millis(1));
        let deadline = Instant::now() + duration;

        let thread = thread::Builder::new()
            .name("countdown".to_owned())
            .spawn(move || {
                loop {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }

                    on_tick(remaining);
                    select! {
                        recv(cancel_rx) -> _ => return,
                        default(remaining.min(interval)) => {}
                    }
                }

                // A cancel that raced with the last tick still wins
                if !matches!(cancel_rx.try_recv(), Err(TryRecvError::Empty)) {
                    return;
                }

                on_finish();
            })?;

        Ok(Self {
            cancel: Some(cancel_tx),
            thread: Some(thread),
        })
    }

    /// Only calls `on_finish` after `duration`, without intermediate ticks.
    pub fn after<F>(duration: Duration, on_finish: F) -> io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        Self::start(duration, duration, |_| {}, on_finish)
    }

    /// Stops the countdown. Neither callback runs after this returns,
    /// unless it is called from inside one of them.
    pub fn cancel(mut self) {
        self.cancel_inner();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |x| x.is_finished())
    }

    fn cancel_inner(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.try_send(());
        }

        let Some(thread) = self.thread.take() else {
            return;
        };

        // Cancelling from a callback must not wait for itself
        if thread.thread().id() != thread::current().id() {
            let _ = thread.join();
        }
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        // Signal only; dropping should never block
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.try_send(());
        }
    }
}
