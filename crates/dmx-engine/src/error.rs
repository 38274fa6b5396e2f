//! Error types for the engine

use std::time::Duration;

use thiserror::Error;

use crate::transport::TransferStatus;

/// Errors reported by a transport implementation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No connected device matched the filter
    #[error("no device matching {vendor_id:04x}:{product_id:04x}")]
    NotFound { vendor_id: u16, product_id: u16 },

    /// The transport rejected the open
    #[error("failed to open device: {0}")]
    OpenFailed(String),

    /// The transport rejected a transfer submission
    #[error("transfer submission rejected: {0}")]
    SubmitFailed(String),

    /// The blocking event-processing call failed
    #[error("event processing failed: {0}")]
    EventProcessing(String),
}

/// Errors that can occur while opening a device through a session
#[derive(Debug, Error)]
pub enum SessionError {
    /// The underlying transport open failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The event loop thread could not be started
    #[error("failed to start event loop thread")]
    SpawnFailed(#[source] std::io::Error),
}

/// Errors that can occur during a request/response exchange
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The request could not be framed
    #[error(transparent)]
    Frame(#[from] dmx_frame::FrameError),

    /// The transport rejected a transfer submission; no completion will
    /// arrive for this exchange
    #[error(transparent)]
    Submit(#[from] TransportError),

    /// An exchange is already in flight on this channel
    #[error("an exchange is already in flight")]
    Busy,

    /// `wait` was called with no exchange in flight
    #[error("no exchange in flight")]
    NotInFlight,

    /// The request transfer completed with a non-success status, so no
    /// response transfer was submitted
    #[error("request transfer faulted: {}", .0.name())]
    Faulted(TransferStatus),

    /// No completion arrived before the exchange deadline
    #[error("no completion within {waited:?}")]
    Timeout { waited: Duration },

    /// The completion channel disconnected; the transport context is gone
    #[error("completion channel disconnected")]
    Disconnected,
}
