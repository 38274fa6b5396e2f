//! Device session lifecycle
//!
//! A session reference-counts open device handles on one transport context
//! and runs the event loop thread for exactly the period during which at
//! least one handle is open. Opens and closes serialize through a single
//! mutex so concurrent callers cannot double-spawn the loop or stop it while
//! a handle is still open.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::event_loop::{EventLoop, LoopState};
use crate::transport::{BulkTransport, DeviceFilter, DeviceId};

struct SessionState<T: BulkTransport> {
    open_devices: u32,
    event_loop: Option<EventLoop<T>>,
}

/// Reference-counted device lifecycle over one transport context
pub struct DeviceSession<T: BulkTransport> {
    transport: Arc<T>,
    state: Mutex<SessionState<T>>,
}

impl<T: BulkTransport> DeviceSession<T> {
    /// Create a session over a transport context
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            state: Mutex::new(SessionState {
                open_devices: 0,
                event_loop: None,
            }),
        }
    }

    /// The transport this session manages devices on
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Open the device matching the filter
    ///
    /// The first successful open starts the event loop thread. If the thread
    /// cannot be spawned the device is closed again and the error reported.
    pub fn open(&self, filter: &DeviceFilter) -> Result<DeviceId, SessionError> {
        let mut state = self.lock_state();
        let device = self.transport.open(filter)?;

        if state.open_devices == 0 {
            match EventLoop::spawn(Arc::clone(&self.transport)) {
                Ok(event_loop) => state.event_loop = Some(event_loop),
                Err(e) => {
                    self.transport.close(device);
                    return Err(SessionError::SpawnFailed(e));
                }
            }
        }
        state.open_devices += 1;
        info!(device = device.0, open = state.open_devices, "opened device");
        Ok(device)
    }

    /// Close an open device
    ///
    /// On the last handle the loop stop is requested before the underlying
    /// close: the close cancels any pending transfers, and those
    /// cancellation completions are what unblock an event-processing call in
    /// flight. The caller then blocks until the loop thread has exited.
    pub fn close(&self, device: DeviceId) {
        let mut state = self.lock_state();
        if state.open_devices == 0 {
            warn!(device = device.0, "close with no devices open");
            self.transport.close(device);
            return;
        }

        let last = state.open_devices == 1;
        if last {
            if let Some(event_loop) = &state.event_loop {
                event_loop.request_stop();
            }
        }
        self.transport.close(device);
        state.open_devices -= 1;

        if last {
            if let Some(event_loop) = state.event_loop.take() {
                debug!("waiting for event loop thread");
                event_loop.join();
            }
        }
        debug!(device = device.0, open = state.open_devices, "closed device");
    }

    /// Number of handles currently open
    pub fn open_devices(&self) -> u32 {
        self.lock_state().open_devices
    }

    /// Lifecycle state of the event loop thread
    pub fn loop_state(&self) -> LoopState {
        self.lock_state()
            .event_loop
            .as_ref()
            .map(|event_loop| event_loop.state())
            .unwrap_or(LoopState::Idle)
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: BulkTransport> Drop for DeviceSession<T> {
    fn drop(&mut self) {
        let state = self.lock_state();
        info!(remaining = state.open_devices, "device session destroyed");
        // A still-present event loop is stopped by its own Drop after the
        // session state is released.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    fn session() -> (Arc<MockTransport>, DeviceSession<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let session = DeviceSession::new(Arc::clone(&transport));
        (transport, session)
    }

    #[test]
    fn test_first_open_starts_loop() {
        let (transport, session) = session();
        assert_eq!(session.loop_state(), LoopState::Idle);

        let device = session.open(&DeviceFilter::new(0x04d8, 0x0053)).unwrap();
        assert_eq!(session.open_devices(), 1);
        assert_eq!(session.loop_state(), LoopState::Running);
        assert_eq!(transport.opens(), 1);

        session.close(device);
        assert_eq!(session.open_devices(), 0);
        assert_eq!(session.loop_state(), LoopState::Idle);
        assert_eq!(transport.closes(), 1);
    }

    #[test]
    fn test_second_open_reuses_loop() {
        let (transport, session) = session();
        let filter = DeviceFilter::new(0x04d8, 0x0053);

        let first = session.open(&filter).unwrap();
        let second = session.open(&filter).unwrap();
        assert_ne!(first, second);
        assert_eq!(session.open_devices(), 2);
        assert_eq!(session.loop_state(), LoopState::Running);

        session.close(first);
        // One handle still open: the loop keeps running
        assert_eq!(session.loop_state(), LoopState::Running);

        session.close(second);
        assert_eq!(session.open_devices(), 0);
        assert_eq!(session.loop_state(), LoopState::Idle);
        assert_eq!(transport.closes(), 2);
    }

    #[test]
    fn test_reopen_after_full_stop_spawns_fresh_loop() {
        let (_transport, session) = session();
        let filter = DeviceFilter::new(0x04d8, 0x0053);

        let device = session.open(&filter).unwrap();
        session.close(device);
        assert_eq!(session.loop_state(), LoopState::Idle);

        let device = session.open(&filter).unwrap();
        assert_eq!(session.loop_state(), LoopState::Running);
        session.close(device);
    }

    #[test]
    fn test_close_without_open_is_reported_not_fatal() {
        let (transport, session) = session();
        session.close(DeviceId(7));
        assert_eq!(transport.closes(), 1);
        assert_eq!(session.open_devices(), 0);
    }
}
