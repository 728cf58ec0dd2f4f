//! Transport layer for web and terminal playgrounds.
//!
//! Provides:
//! - Wire protocol (JSON, plots as base64)
//! - Message dispatch shared by every transport
//! - WebSocket transport (feature: websocket)
//! - Keyboard shortcut bridge (feature: tui)

pub mod dispatch;
pub mod protocol;

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "tui")]
pub mod tui;

pub use protocol::{ClientMessage, ServerMessage};

#[cfg(feature = "websocket")]
pub use websocket::create_router;
