//! DMX Widget Request/Response Engine
//!
//! This crate drives framed request/response exchanges with a USB DMX widget
//! over a bulk-transfer transport. The transport itself is a collaborator
//! behind the [`BulkTransport`] trait; the engine supplies everything above
//! it:
//!
//! - [`DeviceSession`] reference-counts open device handles and runs the
//!   event loop thread while at least one handle is open.
//! - [`EventLoop`] owns the background thread that pumps the transport's
//!   blocking event-processing call. Transfer completions are dispatched on
//!   that thread and delivered to waiting exchanges as messages.
//! - [`ExchangeChannel`] submits one framed request at a time and blocks the
//!   caller until the correlated response transfer completes, faults, or the
//!   exchange deadline passes.
//!
//! # Concurrency model
//!
//! Two threads of control: the caller (send/wait) and one event loop thread
//! per transport context. Completions cross the thread boundary as owned
//! [`Completion`] messages over a channel rather than as callbacks mutating
//! shared buffers, so the only shared state is the loop's atomic lifecycle
//! word and the session's open-device count.
//!
//! Only one exchange may be in flight per channel; a second `send` before
//! `wait` finishes is rejected rather than queued.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dmx_engine::{DeviceFilter, DeviceSession, ExchangeChannel, ExchangeOutcome};
//! use dmx_frame::Command;
//!
//! let transport = Arc::new(open_transport()?);
//! let session = DeviceSession::new(Arc::clone(&transport));
//! let device = session.open(&DeviceFilter::new(0x04d8, 0x0053))?;
//!
//! let mut exchange = ExchangeChannel::new(Arc::clone(&transport), device);
//! exchange.send_command(Command::TxDmx, &[0, 255, 128])?;
//! match exchange.wait()? {
//!     ExchangeOutcome::Responded { data, elapsed } => { /* raw captured bytes */ }
//!     ExchangeOutcome::NoResponse { status, .. } => { /* widget stayed silent */ }
//! }
//!
//! session.close(device);
//! ```

pub mod error;
pub mod event_loop;
pub mod exchange;
pub mod session;
pub mod transport;

pub use error::{ExchangeError, SessionError, TransportError};
pub use event_loop::{EventLoop, LoopState};
pub use exchange::{
    ExchangeChannel, ExchangeConfig, ExchangeOutcome, ExchangeState, DEFAULT_TRANSFER_TIMEOUT,
};
pub use session::DeviceSession;
pub use transport::{
    BulkTransport, Completion, DeviceFilter, DeviceId, Direction, Transfer, TransferKind,
    TransferStatus,
};
