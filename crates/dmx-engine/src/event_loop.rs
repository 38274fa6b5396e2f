//! Background event loop thread
//!
//! One thread per open transport context repeatedly drives the transport's
//! blocking event-processing call so that transfer completions get
//! dispatched. The lifecycle is an explicit state machine held in a single
//! atomic word; the loop body only ever reads the state between calls, so
//! the blocking call runs without any lock held and completion dispatch
//! cannot contend with stop requests.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::transport::BulkTransport;

/// Lifecycle states of the event loop thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// No thread exists
    Idle = 0,
    /// The thread is pumping events
    Running = 1,
    /// A stop has been requested; the thread will exit after the current
    /// event-processing call returns
    StopRequested = 2,
    /// The thread body has exited
    Stopped = 3,
}

impl LoopState {
    fn from_u8(value: u8) -> LoopState {
        match value {
            0 => LoopState::Idle,
            1 => LoopState::Running,
            2 => LoopState::StopRequested,
            _ => LoopState::Stopped,
        }
    }
}

/// Handle to the background thread pumping a transport context
///
/// Created on the session's 0→1 open transition and joined on the N→0 close
/// transition. Not restartable; a fresh loop is spawned for each
/// handle-holding period.
pub struct EventLoop<T: BulkTransport> {
    transport: Arc<T>,
    state: Arc<AtomicU8>,
    thread: Option<JoinHandle<()>>,
}

impl<T: BulkTransport> EventLoop<T> {
    /// Spawn the event loop thread for a transport context
    pub fn spawn(transport: Arc<T>) -> std::io::Result<Self> {
        let state = Arc::new(AtomicU8::new(LoopState::Running as u8));
        let loop_state = Arc::clone(&state);
        let loop_transport = Arc::clone(&transport);

        let thread = thread::Builder::new()
            .name("dmx-events".to_string())
            .spawn(move || {
                debug!("event loop thread running");
                loop {
                    if loop_state.load(Ordering::Acquire) == LoopState::StopRequested as u8 {
                        break;
                    }
                    if let Err(e) = loop_transport.process_events() {
                        warn!("event processing failed: {e}");
                    }
                }
                loop_state.store(LoopState::Stopped as u8, Ordering::Release);
                debug!("event loop thread stopped");
            })?;

        Ok(Self {
            transport,
            state,
            thread: Some(thread),
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Ask the thread to stop and wake it out of a blocked
    /// event-processing call
    pub fn request_stop(&self) {
        let stopped = self.state.compare_exchange(
            LoopState::Running as u8,
            LoopState::StopRequested as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if stopped.is_ok() {
            self.transport.interrupt();
        }
    }

    /// Stop the thread if still running and block until it has exited
    pub fn join(mut self) {
        self.request_stop();
        self.join_thread();
    }

    fn join_thread(&mut self) {
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("event loop thread panicked");
            }
        }
    }
}

impl<T: BulkTransport> Drop for EventLoop<T> {
    fn drop(&mut self) {
        self.request_stop();
        self.join_thread();
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::transport::mock::MockTransport;

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(1);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn test_spawn_runs_until_stopped() {
        let transport = Arc::new(MockTransport::new());
        let event_loop = EventLoop::spawn(Arc::clone(&transport)).unwrap();
        assert_eq!(event_loop.state(), LoopState::Running);

        event_loop.request_stop();
        assert!(wait_until(|| event_loop.state() == LoopState::Stopped));
        event_loop.join();
    }

    #[test]
    fn test_request_stop_is_idempotent() {
        let transport = Arc::new(MockTransport::new());
        let event_loop = EventLoop::spawn(transport).unwrap();

        event_loop.request_stop();
        event_loop.request_stop();
        assert!(wait_until(|| event_loop.state() == LoopState::Stopped));
        event_loop.join();
    }

    #[test]
    fn test_drop_stops_thread() {
        let transport = Arc::new(MockTransport::new());
        let event_loop = EventLoop::spawn(transport).unwrap();
        // Drop must not hang on the blocked event-processing call
        drop(event_loop);
    }
}
