//! Connection deadlines: the request timeout, body read timing and write timing.
//!
//! [`TimeoutController`] only keeps deadlines. It never cancels anything by
//! itself: the message reader and the output producer poll it next to their
//! I/O and turn an expiry into a cancellation of the pending operation, so
//! timeouts surface through the same error paths as malformed input.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use tokio::time::{Instant, Sleep, sleep_until};
use tracing::trace;

use crate::config::ServerLimits;

/// What the connection does when the request timeout fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutAction {
    /// Close quietly, used while idling between requests.
    StopProcessingNextRequest,
    /// Reject the request with 408.
    SendTimeoutResponse,
    AbortConnection,
}

/// Which deadline expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// The deadline set with [`TimeoutControl::set_timeout`].
    Request,
    /// A timed body read made no progress.
    Read,
    /// A write did not complete in time.
    Write,
}

/// Deadline bookkeeping consumed by the connection.
#[cfg_attr(test, mockall::automock)]
pub trait TimeoutControl: Send + Sync {
    /// Arms the request timeout unless one is already armed.
    fn set_timeout(&self, timeout: Duration, action: TimeoutAction);

    /// Arms the request timeout, replacing any armed one.
    fn reset_timeout(&self, timeout: Duration, action: TimeoutAction);

    fn cancel_timeout(&self);

    fn start_timing_reads(&self);

    /// Stops the read clock while the application is not keeping up.
    fn pause_timing_reads(&self);

    fn resume_timing_reads(&self);

    fn stop_timing_reads(&self);

    /// Records read progress, restarting the read window.
    fn bytes_read(&self, count: usize);

    fn start_timing_write(&self, size: usize);

    fn stop_timing_write(&self);

    /// Resolves once the request timeout or the read timing expires.
    fn poll_expired(&self, waker: &Waker) -> Poll<(TimeoutAction, TimeoutKind)>;

    /// Resolves once the write timing expires.
    fn poll_write_expired(&self, waker: &Waker) -> Poll<()>;
}

/// [`TimeoutControl`] on top of `tokio::time`.
pub struct TimeoutController {
    read_window: Duration,
    write_timeout: Duration,
    state: Mutex<TimerState>,
}

#[derive(Default)]
struct TimerState {
    request: Option<(Instant, TimeoutAction)>,
    reads: ReadTiming,
    write: Option<Instant>,
    read_sleep: Option<Pin<Box<Sleep>>>,
    write_sleep: Option<Pin<Box<Sleep>>>,
    read_waker: Option<Waker>,
    write_waker: Option<Waker>,
}

#[derive(Debug, Default, Clone, Copy)]
struct ReadTiming {
    timing: bool,
    paused: bool,
    deadline: Option<Instant>,
}

impl ReadTiming {
    fn active_deadline(&self) -> Option<Instant> {
        if self.timing && !self.paused { self.deadline } else { None }
    }
}

impl TimerState {
    fn wake_reader(&mut self) {
        if let Some(waker) = self.read_waker.take() {
            waker.wake();
        }
    }

    fn wake_writer(&mut self) {
        if let Some(waker) = self.write_waker.take() {
            waker.wake();
        }
    }

    fn next_read_deadline(&self) -> Option<Instant> {
        let request = self.request.map(|(deadline, _)| deadline);
        match (request, self.reads.active_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Clears and returns the first expired read-side deadline.
    fn take_read_expired(&mut self, now: Instant) -> Option<(TimeoutAction, TimeoutKind)> {
        if let Some((deadline, action)) = self.request
            && deadline <= now
        {
            self.request = None;
            return Some((action, TimeoutKind::Request));
        }
        if self.reads.active_deadline().is_some_and(|deadline| deadline <= now) {
            self.reads = ReadTiming::default();
            return Some((TimeoutAction::SendTimeoutResponse, TimeoutKind::Read));
        }
        None
    }
}

impl TimeoutController {
    pub fn new(limits: &ServerLimits) -> Self {
        Self {
            read_window: limits.request_body_read_timeout,
            write_timeout: limits.response_write_timeout,
            state: Mutex::new(TimerState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits for the request timeout or the read timing to expire.
    pub async fn expired(&self) -> (TimeoutAction, TimeoutKind) {
        std::future::poll_fn(|cx| self.poll_expired(cx.waker())).await
    }
}

/// Polls `sleep` towards `deadline`, creating it on first use.
fn poll_sleep(sleep: &mut Option<Pin<Box<Sleep>>>, deadline: Instant, cx: &mut Context<'_>) -> Poll<()> {
    let sleep = sleep.get_or_insert_with(|| Box::pin(sleep_until(deadline)));
    if sleep.deadline() != deadline {
        sleep.as_mut().reset(deadline);
    }
    sleep.as_mut().poll(cx)
}

impl TimeoutControl for TimeoutController {
    fn set_timeout(&self, timeout: Duration, action: TimeoutAction) {
        let mut state = self.state();
        if state.request.is_none() {
            state.request = Some((Instant::now() + timeout, action));
            state.wake_reader();
        }
    }

    fn reset_timeout(&self, timeout: Duration, action: TimeoutAction) {
        let mut state = self.state();
        state.request = Some((Instant::now() + timeout, action));
        state.wake_reader();
    }

    fn cancel_timeout(&self) {
        self.state().request = None;
    }

    fn start_timing_reads(&self) {
        let mut state = self.state();
        state.reads = ReadTiming { timing: true, paused: false, deadline: Some(Instant::now() + self.read_window) };
        state.wake_reader();
    }

    fn pause_timing_reads(&self) {
        let mut state = self.state();
        if state.reads.timing {
            trace!("pause timing reads");
            state.reads.paused = true;
        }
    }

    fn resume_timing_reads(&self) {
        let mut state = self.state();
        if state.reads.timing && state.reads.paused {
            trace!("resume timing reads");
            state.reads.paused = false;
            state.reads.deadline = Some(Instant::now() + self.read_window);
            state.wake_reader();
        }
    }

    fn stop_timing_reads(&self) {
        self.state().reads = ReadTiming::default();
    }

    fn bytes_read(&self, count: usize) {
        let mut state = self.state();
        if count > 0 && state.reads.active_deadline().is_some() {
            state.reads.deadline = Some(Instant::now() + self.read_window);
        }
    }

    fn start_timing_write(&self, size: usize) {
        trace!(size, "start timing write");
        let mut state = self.state();
        state.write = Some(Instant::now() + self.write_timeout);
        state.wake_writer();
    }

    fn stop_timing_write(&self) {
        self.state().write = None;
    }

    fn poll_expired(&self, waker: &Waker) -> Poll<(TimeoutAction, TimeoutKind)> {
        let mut cx = Context::from_waker(waker);
        let mut state = self.state();
        loop {
            if let Some(expired) = state.take_read_expired(Instant::now()) {
                return Poll::Ready(expired);
            }
            let Some(deadline) = state.next_read_deadline() else {
                state.read_waker = Some(waker.clone());
                return Poll::Pending;
            };
            if poll_sleep(&mut state.read_sleep, deadline, &mut cx).is_pending() {
                state.read_waker = Some(waker.clone());
                return Poll::Pending;
            }
        }
    }

    fn poll_write_expired(&self, waker: &Waker) -> Poll<()> {
        let mut cx = Context::from_waker(waker);
        let mut state = self.state();
        let Some(deadline) = state.write else {
            state.write_waker = Some(waker.clone());
            return Poll::Pending;
        };
        if deadline <= Instant::now() || poll_sleep(&mut state.write_sleep, deadline, &mut cx).is_ready() {
            state.write = None;
            return Poll::Ready(());
        }
        state.write_waker = Some(waker.clone());
        Poll::Pending
    }
}

impl fmt::Debug for TimeoutController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("TimeoutController")
            .field("request", &state.request)
            .field("reads", &state.reads)
            .field("write", &state.write)
            .finish_non_exhaustive()
    }
}
