//! Blocking request/response exchanges
//!
//! An exchange submits one framed request as an outbound transfer, then
//! chains the inbound transfer off the outbound completion and hands the
//! captured response bytes back to the caller. The caller thread drives the
//! state machine from `wait` by receiving completion messages the event loop
//! thread dispatched; the old callback-and-condvar rendezvous becomes a
//! deadline-bounded channel receive, so a lost completion surfaces as a
//! `Timeout` error instead of a hang.
//!
//! Only one exchange may be in flight per channel. Inbound bytes are a raw
//! capture; nothing validates markers or reassembles frames on this path
//! (see `dmx_frame::FrameDecoder` for after-the-fact validation).

use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use dmx_frame::display::{format_command, hex_dump};
use dmx_frame::{encode_frame, Command};

use crate::error::ExchangeError;
use crate::transport::{BulkTransport, Completion, DeviceId, Direction, Transfer, TransferStatus};

/// Per-transfer timeout used unless overridden in [`ExchangeConfig`]
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default inbound read size; a multiple of the packet size so the transport
/// never overflows the final packet
pub const DEFAULT_READ_LEN: usize = 1024;

/// Slack added on top of the two transfer timeouts when computing the
/// exchange deadline
const WAIT_MARGIN: Duration = Duration::from_millis(250);

/// States of one request/response exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// Nothing in flight
    Idle,
    /// Outbound transfer submitted
    Sent,
    /// Outbound completed; inbound transfer submitted
    InboundSubmitted,
    /// Inbound transfer completed (with or without data)
    ResponseReady,
    /// The exchange failed; see the error returned from `send`/`wait`
    Faulted,
}

/// Tunables for an exchange channel
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Timeout applied to the outbound and inbound transfers individually
    pub transfer_timeout: Duration,
    /// Inbound read buffer size
    pub read_len: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
            read_len: DEFAULT_READ_LEN,
        }
    }
}

/// How a completed exchange ended
///
/// The transport reports inbound timeouts as completions, so a timed-out
/// read still finishes the exchange; it is surfaced as [`NoResponse`] rather
/// than an error so callers cannot mistake it for captured data.
///
/// [`NoResponse`]: ExchangeOutcome::NoResponse
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// The widget answered; `data` is the raw captured bytes
    Responded {
        /// Raw bytes as received, unvalidated
        data: Vec<u8>,
        /// Time from request submission to response completion
        elapsed: Duration,
    },
    /// The inbound transfer completed without data
    NoResponse {
        /// Status the inbound transfer completed with
        status: TransferStatus,
        /// Time from request submission to the completion
        elapsed: Duration,
    },
}

/// One-request-at-a-time exchange channel over an open device
///
/// Requires the session's event loop to be running; without it no
/// completions are dispatched and every `wait` ends in a `Timeout` error.
pub struct ExchangeChannel<T: BulkTransport> {
    transport: Arc<T>,
    device: DeviceId,
    config: ExchangeConfig,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
    state: ExchangeState,
    sent_at: Option<Instant>,
}

impl<T: BulkTransport> ExchangeChannel<T> {
    /// Create a channel over an open device with default configuration
    pub fn new(transport: Arc<T>, device: DeviceId) -> Self {
        Self::with_config(transport, device, ExchangeConfig::default())
    }

    /// Create a channel with explicit configuration
    pub fn with_config(transport: Arc<T>, device: DeviceId, config: ExchangeConfig) -> Self {
        let (completion_tx, completion_rx) = channel();
        Self {
            transport,
            device,
            config,
            completion_tx,
            completion_rx,
            state: ExchangeState::Idle,
            sent_at: None,
        }
    }

    /// Device this channel exchanges with
    pub fn device(&self) -> DeviceId {
        self.device
    }

    /// Current exchange state
    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Frame and submit a request
    ///
    /// Fails with [`ExchangeError::Busy`] while a previous exchange is still
    /// in flight, and with [`ExchangeError::Submit`] when the transport
    /// rejects the transfer — in which case no completion will ever arrive,
    /// so callers must not proceed to `wait`.
    pub fn send(&mut self, command: u16, payload: &[u8]) -> Result<(), ExchangeError> {
        if matches!(
            self.state,
            ExchangeState::Sent | ExchangeState::InboundSubmitted
        ) {
            return Err(ExchangeError::Busy);
        }

        let frame = encode_frame(command, payload)?;

        // Drop completions left over from a faulted or abandoned exchange
        while self.completion_rx.try_recv().is_ok() {}

        debug!(
            command = %format_command(command),
            len = frame.len(),
            "submitting request"
        );
        let transfer = Transfer::bulk_out(
            frame,
            self.config.transfer_timeout,
            self.completion_tx.clone(),
        );
        if let Err(e) = self.transport.submit(self.device, transfer) {
            self.state = ExchangeState::Idle;
            return Err(ExchangeError::Submit(e));
        }

        self.sent_at = Some(Instant::now());
        self.state = ExchangeState::Sent;
        Ok(())
    }

    /// [`send`](ExchangeChannel::send) with a known widget command
    pub fn send_command(&mut self, command: Command, payload: &[u8]) -> Result<(), ExchangeError> {
        self.send(command.code(), payload)
    }

    /// Block until the in-flight exchange completes
    ///
    /// Drives the exchange state machine from the completion channel:
    /// outbound success chains the inbound transfer, outbound failure ends
    /// the exchange as [`ExchangeError::Faulted`], and the inbound
    /// completion — whatever its status — produces an [`ExchangeOutcome`].
    /// The whole exchange is bounded by twice the transfer timeout plus a
    /// margin; if no completion arrives by then the wait ends in
    /// [`ExchangeError::Timeout`].
    pub fn wait(&mut self) -> Result<ExchangeOutcome, ExchangeError> {
        if !matches!(
            self.state,
            ExchangeState::Sent | ExchangeState::InboundSubmitted
        ) {
            return Err(ExchangeError::NotInFlight);
        }
        let Some(sent_at) = self.sent_at else {
            return Err(ExchangeError::NotInFlight);
        };

        // Outbound and inbound each get one transfer timeout; the margin
        // covers scheduling between the two submissions.
        let deadline = sent_at + self.config.transfer_timeout * 2 + WAIT_MARGIN;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.state = ExchangeState::Faulted;
                return Err(ExchangeError::Timeout {
                    waited: sent_at.elapsed(),
                });
            }

            let completion = match self.completion_rx.recv_timeout(remaining) {
                Ok(completion) => completion,
                Err(RecvTimeoutError::Timeout) => {
                    self.state = ExchangeState::Faulted;
                    return Err(ExchangeError::Timeout {
                        waited: sent_at.elapsed(),
                    });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.state = ExchangeState::Faulted;
                    return Err(ExchangeError::Disconnected);
                }
            };

            match (completion.direction, self.state) {
                (Direction::Out, ExchangeState::Sent) => {
                    if completion.status.is_success() {
                        trace!(sent = completion.actual_len, "request transfer complete");
                        let transfer = Transfer::bulk_in(
                            self.config.read_len,
                            self.config.transfer_timeout,
                            self.completion_tx.clone(),
                        );
                        if let Err(e) = self.transport.submit(self.device, transfer) {
                            self.state = ExchangeState::Faulted;
                            return Err(ExchangeError::Submit(e));
                        }
                        self.state = ExchangeState::InboundSubmitted;
                    } else {
                        warn!(status = completion.status.name(), "request transfer faulted");
                        self.state = ExchangeState::Faulted;
                        return Err(ExchangeError::Faulted(completion.status));
                    }
                }
                (Direction::In, ExchangeState::InboundSubmitted) => {
                    let elapsed = sent_at.elapsed();
                    self.sent_at = None;
                    self.state = ExchangeState::ResponseReady;

                    if completion.status == TransferStatus::Completed {
                        debug!(
                            len = completion.data.len(),
                            elapsed_ms = elapsed.as_millis() as u64,
                            data = %hex_dump(&completion.data),
                            "response received"
                        );
                        return Ok(ExchangeOutcome::Responded {
                            data: completion.data,
                            elapsed,
                        });
                    }

                    debug!(
                        status = completion.status.name(),
                        "exchange finished without response"
                    );
                    return Ok(ExchangeOutcome::NoResponse {
                        status: completion.status,
                        elapsed,
                    });
                }
                _ => {
                    trace!(
                        direction = ?completion.direction,
                        status = completion.status.name(),
                        "ignoring stale completion"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use dmx_frame::FrameError;

    fn channel_over_mock() -> ExchangeChannel<MockTransport> {
        ExchangeChannel::new(Arc::new(MockTransport::new()), DeviceId(1))
    }

    #[test]
    fn test_second_send_is_busy() {
        let mut exchange = channel_over_mock();
        exchange.send_command(Command::Echo, &[1]).unwrap();
        assert!(matches!(
            exchange.send_command(Command::Echo, &[2]),
            Err(ExchangeError::Busy)
        ));
    }

    #[test]
    fn test_wait_without_send() {
        let mut exchange = channel_over_mock();
        assert!(matches!(exchange.wait(), Err(ExchangeError::NotInFlight)));
        assert_eq!(exchange.state(), ExchangeState::Idle);
    }

    #[test]
    fn test_oversized_payload_rejected_before_submit() {
        let mut exchange = channel_over_mock();
        let payload = vec![0u8; 514];
        assert!(matches!(
            exchange.send_command(Command::TxDmx, &payload),
            Err(ExchangeError::Frame(FrameError::PayloadTooLarge { .. }))
        ));
        assert_eq!(exchange.state(), ExchangeState::Idle);
    }

    #[test]
    fn test_refused_submission_leaves_channel_idle() {
        let transport = Arc::new(MockTransport::new());
        transport.refuse_submissions();
        let mut exchange = ExchangeChannel::new(transport, DeviceId(1));

        assert!(matches!(
            exchange.send_command(Command::Echo, &[]),
            Err(ExchangeError::Submit(_))
        ));
        assert_eq!(exchange.state(), ExchangeState::Idle);
        // No completion will ever arrive; wait must refuse rather than block
        assert!(matches!(exchange.wait(), Err(ExchangeError::NotInFlight)));
    }
}
