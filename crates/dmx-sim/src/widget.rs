//! Virtual widget simulation
//!
//! A [`SimTransport`] holds a pool of configured widgets. Opening a device
//! claims the first widget matching the filter; closing returns it to the
//! pool. Outbound transfers are decoded into frames and answered according
//! to the widget's configuration; inbound transfers wait for a generated
//! response or time out. All completions are dispatched from
//! `process_events`, which blocks on a condition variable between work, so
//! the transport exercises the engine's event loop exactly like an
//! asynchronous USB context does.

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::Sender;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use dmx_engine::{
    BulkTransport, Completion, DeviceFilter, DeviceId, Direction, Transfer, TransferKind,
    TransferStatus, TransportError,
};
use dmx_frame::{encode_frame, Command, FrameDecoder};

/// Vendor id the simulated widget enumerates with
pub const DEFAULT_VENDOR_ID: u16 = 0x04d8;
/// Product id the simulated widget enumerates with
pub const DEFAULT_PRODUCT_ID: u16 = 0x0053;

/// Configuration for one simulated widget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimWidgetConfig {
    /// USB vendor id the widget matches
    pub vendor_id: u16,
    /// USB product id the widget matches
    pub product_id: u16,
    /// Whether the widget answers decoded requests
    pub respond: bool,
    /// Delay between receiving a request and the response becoming readable
    pub response_delay: Duration,
    /// Fail every open of this widget
    pub open_fails: bool,
    /// Reject every transfer submission
    pub refuse_submissions: bool,
    /// Complete outbound transfers with this status instead of success
    pub fail_outbound: Option<TransferStatus>,
    /// Never complete inbound transfers, not even with a timeout; simulates
    /// a lost completion
    pub swallow_inbound: bool,
}

impl Default for SimWidgetConfig {
    fn default() -> Self {
        Self {
            vendor_id: DEFAULT_VENDOR_ID,
            product_id: DEFAULT_PRODUCT_ID,
            respond: true,
            response_delay: Duration::ZERO,
            open_fails: false,
            refuse_submissions: false,
            fail_outbound: None,
            swallow_inbound: false,
        }
    }
}

impl SimWidgetConfig {
    fn matches(&self, filter: &DeviceFilter) -> bool {
        self.vendor_id == filter.vendor_id && self.product_id == filter.product_id
    }
}

/// A claimed widget with its receive-side state
struct SimDevice {
    config: SimWidgetConfig,
    decoder: FrameDecoder,
    /// Generated responses, each readable from its instant onward
    responses: VecDeque<(Instant, Vec<u8>)>,
}

/// An inbound transfer waiting for response data
struct PendingRead {
    device: DeviceId,
    max_len: usize,
    deadline: Instant,
    completions: Sender<Completion>,
}

/// A completion ready to dispatch on the next event-processing pass
struct ReadyCompletion {
    completions: Sender<Completion>,
    completion: Completion,
}

#[derive(Default)]
struct SimState {
    /// Unclaimed widgets
    pool: Vec<SimWidgetConfig>,
    devices: HashMap<DeviceId, SimDevice>,
    next_device: u32,
    queue: VecDeque<ReadyCompletion>,
    pending: Vec<PendingRead>,
    interrupted: bool,
}

/// In-memory transport backed by simulated widgets
#[derive(Default)]
pub struct SimTransport {
    inner: Mutex<SimState>,
    events: Condvar,
}

impl SimTransport {
    /// Create a transport with an empty widget pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a widget to the pool
    pub fn add_widget(&self, config: SimWidgetConfig) {
        self.lock().pool.push(config);
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Generate the widget's answer to one decoded request frame
    fn response_for(command: u16, payload: &[u8]) -> Option<Vec<u8>> {
        let bytes = match Command::from_code(command) {
            Some(Command::Echo) => encode_frame(Command::Echo.code(), payload),
            Some(Command::TxDmx) => encode_frame(Command::TxDmx.code(), &[]),
            None => return None,
        };
        bytes.ok()
    }
}

impl BulkTransport for SimTransport {
    fn open(&self, filter: &DeviceFilter) -> Result<DeviceId, TransportError> {
        let mut state = self.lock();
        let Some(index) = state.pool.iter().position(|c| c.matches(filter)) else {
            return Err(TransportError::NotFound {
                vendor_id: filter.vendor_id,
                product_id: filter.product_id,
            });
        };
        if state.pool[index].open_fails {
            return Err(TransportError::OpenFailed(
                "simulated open failure".to_string(),
            ));
        }

        let config = state.pool.remove(index);
        state.next_device += 1;
        let device = DeviceId(state.next_device);
        state.devices.insert(
            device,
            SimDevice {
                config,
                decoder: FrameDecoder::new(),
                responses: VecDeque::new(),
            },
        );
        debug!(device = device.0, "widget claimed");
        Ok(device)
    }

    fn close(&self, device: DeviceId) {
        let mut state = self.lock();
        let Some(claimed) = state.devices.remove(&device) else {
            trace!(device = device.0, "close of unknown device ignored");
            return;
        };
        state.pool.push(claimed.config);

        // Pending reads on the closed device become cancellations, delivered
        // on the next event-processing pass
        let mut index = 0;
        while index < state.pending.len() {
            if state.pending[index].device == device {
                let read = state.pending.remove(index);
                state.queue.push_back(ReadyCompletion {
                    completions: read.completions,
                    completion: Completion {
                        device,
                        direction: Direction::In,
                        status: TransferStatus::Cancelled,
                        data: Vec::new(),
                        actual_len: 0,
                    },
                });
            } else {
                index += 1;
            }
        }
        debug!(device = device.0, "widget released");
        self.events.notify_all();
    }

    fn submit(&self, device: DeviceId, transfer: Transfer) -> Result<(), TransportError> {
        let mut state = self.lock();
        let now = Instant::now();
        let timeout = transfer.timeout;

        let Some(claimed) = state.devices.get_mut(&device) else {
            return Err(TransportError::SubmitFailed(format!(
                "device {} is not open",
                device.0
            )));
        };
        if claimed.config.refuse_submissions {
            return Err(TransportError::SubmitFailed(
                "simulated submission refusal".to_string(),
            ));
        }

        match transfer.kind {
            TransferKind::Out { data } => {
                let status = claimed.config.fail_outbound.unwrap_or(TransferStatus::Completed);
                let actual_len = if status.is_success() {
                    claimed.decoder.push_bytes(&data);
                    while let Some(frame) = claimed.decoder.next_frame() {
                        trace!(
                            device = device.0,
                            command = frame.command,
                            len = frame.payload.len(),
                            "widget received request"
                        );
                        if !claimed.config.respond {
                            continue;
                        }
                        if let Some(response) = Self::response_for(frame.command, &frame.payload) {
                            let ready_at = now + claimed.config.response_delay;
                            claimed.responses.push_back((ready_at, response));
                        }
                    }
                    data.len()
                } else {
                    0
                };
                state.queue.push_back(ReadyCompletion {
                    completions: transfer.completions,
                    completion: Completion {
                        device,
                        direction: Direction::Out,
                        status,
                        data: Vec::new(),
                        actual_len,
                    },
                });
            }
            TransferKind::In { max_len } => {
                state.pending.push(PendingRead {
                    device,
                    max_len,
                    deadline: now + timeout,
                    completions: transfer.completions,
                });
            }
        }
        self.events.notify_all();
        Ok(())
    }

    fn process_events(&self) -> Result<(), TransportError> {
        let mut state = self.lock();
        loop {
            if state.interrupted {
                state.interrupted = false;
                return Ok(());
            }

            let now = Instant::now();
            let mut ready: Vec<ReadyCompletion> = state.queue.drain(..).collect();

            let mut index = 0;
            while index < state.pending.len() {
                let device = state.pending[index].device;
                if state
                    .devices
                    .get(&device)
                    .is_some_and(|claimed| claimed.config.swallow_inbound)
                {
                    index += 1;
                    continue;
                }
                let response = state.devices.get_mut(&device).and_then(|claimed| {
                    if claimed.responses.front().is_some_and(|(at, _)| *at <= now) {
                        claimed.responses.pop_front().map(|(_, data)| data)
                    } else {
                        None
                    }
                });

                if let Some(mut data) = response {
                    let read = state.pending.remove(index);
                    data.truncate(read.max_len);
                    let actual_len = data.len();
                    ready.push(ReadyCompletion {
                        completions: read.completions,
                        completion: Completion {
                            device,
                            direction: Direction::In,
                            status: TransferStatus::Completed,
                            data,
                            actual_len,
                        },
                    });
                } else if state.pending[index].deadline <= now {
                    let read = state.pending.remove(index);
                    ready.push(ReadyCompletion {
                        completions: read.completions,
                        completion: Completion {
                            device,
                            direction: Direction::In,
                            status: TransferStatus::TimedOut,
                            data: Vec::new(),
                            actual_len: 0,
                        },
                    });
                } else {
                    index += 1;
                }
            }

            if !ready.is_empty() {
                drop(state);
                for item in ready {
                    if item.completions.send(item.completion).is_err() {
                        trace!("completion receiver dropped");
                    }
                }
                return Ok(());
            }

            // Nothing ready: sleep until the nearest response or deadline
            let mut wake_at: Option<Instant> = None;
            for read in &state.pending {
                // Swallowed reads never mature; waking for them would spin
                if state
                    .devices
                    .get(&read.device)
                    .is_some_and(|claimed| claimed.config.swallow_inbound)
                {
                    continue;
                }
                wake_at = Some(wake_at.map_or(read.deadline, |w| w.min(read.deadline)));
                if let Some(claimed) = state.devices.get(&read.device) {
                    if let Some((at, _)) = claimed.responses.front() {
                        wake_at = Some(wake_at.map_or(*at, |w| w.min(*at)));
                    }
                }
            }
            state = match wake_at {
                Some(at) => {
                    let timeout = at.saturating_duration_since(Instant::now());
                    self.events
                        .wait_timeout(state, timeout)
                        .unwrap_or_else(|e| e.into_inner())
                        .0
                }
                None => self
                    .events
                    .wait(state)
                    .unwrap_or_else(|e| e.into_inner()),
            };
        }
    }

    fn interrupt(&self) {
        self.lock().interrupted = true;
        self.events.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::channel;

    use super::*;

    fn widget_filter() -> DeviceFilter {
        DeviceFilter::new(DEFAULT_VENDOR_ID, DEFAULT_PRODUCT_ID)
    }

    fn transport_with_widget(config: SimWidgetConfig) -> SimTransport {
        let transport = SimTransport::new();
        transport.add_widget(config);
        transport
    }

    #[test]
    fn test_open_claims_matching_widget() {
        let transport = transport_with_widget(SimWidgetConfig::default());

        let device = transport.open(&widget_filter()).unwrap();

        // The pool is empty now
        assert!(matches!(
            transport.open(&widget_filter()),
            Err(TransportError::NotFound { .. })
        ));

        // Closing returns the widget to the pool
        transport.close(device);
        transport.open(&widget_filter()).unwrap();
    }

    #[test]
    fn test_open_no_matching_widget() {
        let transport = transport_with_widget(SimWidgetConfig::default());
        let result = transport.open(&DeviceFilter::new(0x1234, 0x5678));
        assert!(matches!(result, Err(TransportError::NotFound { .. })));
    }

    #[test]
    fn test_open_failure_configured() {
        let transport = transport_with_widget(SimWidgetConfig {
            open_fails: true,
            ..SimWidgetConfig::default()
        });
        assert!(matches!(
            transport.open(&widget_filter()),
            Err(TransportError::OpenFailed(_))
        ));
    }

    #[test]
    fn test_outbound_completion_dispatched() {
        let transport = transport_with_widget(SimWidgetConfig::default());
        let device = transport.open(&widget_filter()).unwrap();

        let frame = encode_frame(Command::Echo.code(), &[1, 2, 3]).unwrap();
        let frame_len = frame.len();
        let (tx, rx) = channel();
        transport
            .submit(
                device,
                Transfer::bulk_out(frame, Duration::from_millis(100), tx),
            )
            .unwrap();

        transport.process_events().unwrap();
        let completion = rx.try_recv().unwrap();
        assert_eq!(completion.direction, Direction::Out);
        assert_eq!(completion.status, TransferStatus::Completed);
        assert_eq!(completion.actual_len, frame_len);
    }

    #[test]
    fn test_echo_request_produces_response() {
        let transport = transport_with_widget(SimWidgetConfig::default());
        let device = transport.open(&widget_filter()).unwrap();
        let (tx, rx) = channel();

        let frame = encode_frame(Command::Echo.code(), &[0xAB, 0xCD]).unwrap();
        transport
            .submit(
                device,
                Transfer::bulk_out(frame, Duration::from_millis(100), tx.clone()),
            )
            .unwrap();
        transport.process_events().unwrap();
        assert_eq!(rx.try_recv().unwrap().direction, Direction::Out);

        transport
            .submit(
                device,
                Transfer::bulk_in(1024, Duration::from_millis(100), tx),
            )
            .unwrap();
        transport.process_events().unwrap();

        let completion = rx.try_recv().unwrap();
        assert_eq!(completion.direction, Direction::In);
        assert_eq!(completion.status, TransferStatus::Completed);
        assert_eq!(
            completion.data,
            encode_frame(Command::Echo.code(), &[0xAB, 0xCD]).unwrap()
        );
    }

    #[test]
    fn test_silent_widget_read_times_out() {
        let transport = transport_with_widget(SimWidgetConfig {
            respond: false,
            ..SimWidgetConfig::default()
        });
        let device = transport.open(&widget_filter()).unwrap();
        let (tx, rx) = channel();

        let frame = encode_frame(Command::Echo.code(), &[]).unwrap();
        transport
            .submit(
                device,
                Transfer::bulk_out(frame, Duration::from_millis(50), tx.clone()),
            )
            .unwrap();
        transport.process_events().unwrap();
        rx.try_recv().unwrap();

        transport
            .submit(
                device,
                Transfer::bulk_in(1024, Duration::from_millis(20), tx),
            )
            .unwrap();
        transport.process_events().unwrap();

        let completion = rx.try_recv().unwrap();
        assert_eq!(completion.status, TransferStatus::TimedOut);
        assert!(completion.data.is_empty());
    }

    #[test]
    fn test_failing_outbound_status() {
        let transport = transport_with_widget(SimWidgetConfig {
            fail_outbound: Some(TransferStatus::Stall),
            ..SimWidgetConfig::default()
        });
        let device = transport.open(&widget_filter()).unwrap();
        let (tx, rx) = channel();

        let frame = encode_frame(Command::TxDmx.code(), &[0]).unwrap();
        transport
            .submit(
                device,
                Transfer::bulk_out(frame, Duration::from_millis(50), tx),
            )
            .unwrap();
        transport.process_events().unwrap();

        let completion = rx.try_recv().unwrap();
        assert_eq!(completion.status, TransferStatus::Stall);
        assert_eq!(completion.actual_len, 0);
    }

    #[test]
    fn test_refused_submission() {
        let transport = transport_with_widget(SimWidgetConfig {
            refuse_submissions: true,
            ..SimWidgetConfig::default()
        });
        let device = transport.open(&widget_filter()).unwrap();
        let (tx, _rx) = channel();

        let frame = encode_frame(Command::Echo.code(), &[]).unwrap();
        let result = transport.submit(
            device,
            Transfer::bulk_out(frame, Duration::from_millis(50), tx),
        );
        assert!(matches!(result, Err(TransportError::SubmitFailed(_))));
    }

    #[test]
    fn test_close_cancels_pending_read() {
        let transport = transport_with_widget(SimWidgetConfig::default());
        let device = transport.open(&widget_filter()).unwrap();
        let (tx, rx) = channel();

        transport
            .submit(device, Transfer::bulk_in(1024, Duration::from_secs(5), tx))
            .unwrap();
        transport.close(device);
        transport.process_events().unwrap();

        let completion = rx.try_recv().unwrap();
        assert_eq!(completion.status, TransferStatus::Cancelled);
    }

    #[test]
    fn test_swallowed_inbound_never_completes() {
        let transport = transport_with_widget(SimWidgetConfig {
            swallow_inbound: true,
            ..SimWidgetConfig::default()
        });
        let device = transport.open(&widget_filter()).unwrap();
        let (tx, rx) = channel();

        transport
            .submit(
                device,
                Transfer::bulk_in(1024, Duration::from_millis(10), tx),
            )
            .unwrap();

        // Well past the transfer deadline; the read must still be pending
        std::thread::sleep(Duration::from_millis(30));
        transport.interrupt();
        transport.process_events().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_interrupt_unblocks_event_processing() {
        let transport = transport_with_widget(SimWidgetConfig::default());
        transport.interrupt();
        // Level-triggered: the pending interrupt makes this return promptly
        transport.process_events().unwrap();
    }
}
