//! Bulk-transfer transport abstraction
//!
//! The engine does not talk to USB directly; it drives any transport that can
//! open a device by vendor/product id, accept asynchronous bulk transfer
//! submissions, and dispatch their completions from a blocking
//! event-processing call. Completions are delivered as owned messages over a
//! channel carried by each transfer, so transfer state never has to be
//! mutated from two threads.

use std::sync::mpsc::Sender;
use std::time::Duration;

use crate::error::TransportError;

/// Identifies an open device on a transport context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceId(pub u32);

impl DeviceId {
    /// Get the raw handle value
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

/// Vendor/product match for opening a device
///
/// This is the descriptor filter handed over from whatever enumeration layer
/// sits in front of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceFilter {
    /// USB vendor id
    pub vendor_id: u16,
    /// USB product id
    pub product_id: u16,
}

impl DeviceFilter {
    /// Create a filter for the given vendor/product pair
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

/// Transfer direction relative to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// Host to device
    Out,
    /// Device to host
    In,
}

/// Final status of a completed transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransferStatus {
    /// Transfer completed normally
    Completed,
    /// Transfer timed out before completing
    TimedOut,
    /// Transfer was cancelled, typically because the device was closed
    Cancelled,
    /// Endpoint stalled
    Stall,
    /// Device disconnected
    NoDevice,
    /// Any other transport-level failure
    Error,
}

impl TransferStatus {
    /// Whether this status represents a successful transfer
    pub fn is_success(&self) -> bool {
        matches!(self, TransferStatus::Completed)
    }

    /// Returns a human-readable name for the status
    pub fn name(&self) -> &'static str {
        match self {
            TransferStatus::Completed => "completed",
            TransferStatus::TimedOut => "timed out",
            TransferStatus::Cancelled => "cancelled",
            TransferStatus::Stall => "stall",
            TransferStatus::NoDevice => "no device",
            TransferStatus::Error => "error",
        }
    }
}

/// A completed transfer, dispatched on the event loop thread
#[derive(Debug, Clone)]
pub struct Completion {
    /// Device the transfer ran on
    pub device: DeviceId,
    /// Direction of the completed transfer
    pub direction: Direction,
    /// Final status
    pub status: TransferStatus,
    /// Bytes received, for inbound transfers that completed with data
    pub data: Vec<u8>,
    /// Bytes actually moved on the wire
    pub actual_len: usize,
}

/// What a submitted transfer should move
#[derive(Debug)]
pub enum TransferKind {
    /// Write these bytes to the device
    Out {
        /// Encoded frame to send
        data: Vec<u8>,
    },
    /// Read up to `max_len` bytes from the device
    In {
        /// Read buffer size; should be a multiple of the packet size
        max_len: usize,
    },
}

/// An asynchronous bulk transfer submission
#[derive(Debug)]
pub struct Transfer {
    /// Payload or read request
    pub kind: TransferKind,
    /// Per-transfer timeout enforced by the transport
    pub timeout: Duration,
    /// Where the transport delivers the completion
    pub completions: Sender<Completion>,
}

impl Transfer {
    /// Build an outbound transfer
    pub fn bulk_out(data: Vec<u8>, timeout: Duration, completions: Sender<Completion>) -> Self {
        Self {
            kind: TransferKind::Out { data },
            timeout,
            completions,
        }
    }

    /// Build an inbound transfer
    pub fn bulk_in(max_len: usize, timeout: Duration, completions: Sender<Completion>) -> Self {
        Self {
            kind: TransferKind::In { max_len },
            timeout,
            completions,
        }
    }

    /// Direction of this transfer
    pub fn direction(&self) -> Direction {
        match self.kind {
            TransferKind::Out { .. } => Direction::Out,
            TransferKind::In { .. } => Direction::In,
        }
    }
}

/// A bulk-transfer transport context
///
/// Implementations must uphold three contracts the engine relies on:
///
/// - Completions are dispatched only from within [`process_events`]
///   (the event loop thread), by sending on the transfer's channel.
/// - Closing a device cancels its pending transfers; the cancellations are
///   dispatched as [`TransferStatus::Cancelled`] completions, which is what
///   unblocks an event-processing call in flight during shutdown.
/// - [`interrupt`] is level-triggered: it wakes a blocked
///   [`process_events`], and if none is blocked, the next call returns
///   promptly instead.
///
/// [`process_events`]: BulkTransport::process_events
/// [`interrupt`]: BulkTransport::interrupt
pub trait BulkTransport: Send + Sync + 'static {
    /// Open the device matching the filter
    fn open(&self, filter: &DeviceFilter) -> Result<DeviceId, TransportError>;

    /// Close an open device, cancelling its pending transfers
    fn close(&self, device: DeviceId);

    /// Submit an asynchronous bulk transfer
    fn submit(&self, device: DeviceId, transfer: Transfer) -> Result<(), TransportError>;

    /// Block until at least one completion has been dispatched or
    /// [`interrupt`](BulkTransport::interrupt) is observed
    fn process_events(&self) -> Result<(), TransportError>;

    /// Wake a thread blocked in [`process_events`](BulkTransport::process_events)
    fn interrupt(&self);
}
