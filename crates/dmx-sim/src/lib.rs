//! Simulated DMX widget transport
//!
//! Provides an in-memory [`BulkTransport`](dmx_engine::BulkTransport)
//! implementation that behaves like a connected widget: it decodes framed
//! requests off outbound transfers, generates protocol-accurate responses,
//! and dispatches completions from its blocking event-processing call the
//! same way a real asynchronous transport would. Fault injection (refused
//! submissions, failing outbound transfers, silent widgets) is configured
//! per widget.

pub mod widget;

pub use widget::{SimTransport, SimWidgetConfig, DEFAULT_PRODUCT_ID, DEFAULT_VENDOR_ID};
