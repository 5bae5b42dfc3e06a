//! # gpui-vm-console
//!
//! A GPUI dialog that attaches to the shell of a remote VM.
//!
//! The console renders a local terminal emulator (alacritty_terminal) and
//! relays it over a WebSocket event stream: keystrokes go out as `data`
//! frames, shell output comes back as `data` frames, and the grid size is
//! pushed whenever it changes while connected.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         ConsoleView                          │
//! │        header · canvas · keyboard/paste · fullscreen         │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │
//! ┌──────────────────────────────▼───────────────────────────────┐
//! │                      ConsoleController                       │
//! │   mount · reconnect · resize sync · ordered four-step close  │
//! └───────────────┬──────────────────────────────┬───────────────┘
//!                 │                              │
//! ┌───────────────▼──────────────┐ ┌─────────────▼───────────────┐
//! │       TerminalSurface        │ │      TransportSession       │
//! │  Term · fit · write · input  │ │  state table · notices      │
//! └──────────────────────────────┘ └─────────────┬───────────────┘
//!                                                │ Connector / Transport
//!                                  ┌─────────────▼───────────────┐
//!                                  │     WebSocketConnector      │
//!                                  │  tungstenite on a thread    │
//!                                  └─────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use gpui_vm_console::{
//!     ConsoleConfig, ConsoleController, ConsoleView, ContainerSize, SessionDescriptor,
//!     TokenStore, WebSocketConnector,
//! };
//! use std::sync::Arc;
//!
//! let config = ConsoleConfig::default();
//! let connector = Arc::new(WebSocketConnector::new(&config.endpoint)?);
//! let credentials = Arc::new(TokenStore::with_token("secret"));
//! let controller = ConsoleController::mount(
//!     SessionDescriptor::new("42").with_name("build-runner"),
//!     credentials,
//!     connector,
//!     config.surface_options(),
//!     Some(ContainerSize::new(960.0, 600.0)),
//! )?;
//! cx.open_window(options, |window, cx| {
//!     cx.new(|cx| ConsoleView::new(controller, &config, window, cx))
//! })?;
//! ```
//!
//! ## Modules
//!
//! - [`surface`]: terminal emulator sized to its container
//! - [`protocol`]: JSON event frames
//! - [`transport`]: `Transport`/`Connector` seams and transport events
//! - [`websocket`]: tungstenite implementation of the transport
//! - [`session`]: connection state machine and user-visible notices
//! - [`console`]: lifecycle, reconnect and teardown
//! - [`view`]: the GPUI dialog
//! - [`render`], [`colors`], [`input`]: painting, palette and keyboard mapping
//! - [`auth`], [`config`]: credentials and configuration

pub mod auth;
pub mod colors;
pub mod config;
pub mod console;
pub mod event;
pub mod input;
pub mod protocol;
pub mod render;
pub mod session;
pub mod surface;
pub mod transport;
pub mod view;
pub mod websocket;

#[cfg(test)]
mod testing;

pub use auth::{CredentialSource, TokenStore};
pub use colors::ColorPalette;
pub use config::{ConfigError, ConsoleConfig};
pub use console::{ConsoleController, ResizeWatch, TeardownReport, TeardownStep};
pub use protocol::{ClientMessage, ServerMessage, VmId};
pub use session::{ConnectionState, TransportSession};
pub use surface::{CellSize, ContainerSize, GridSize, SurfaceError, SurfaceOptions, TerminalSurface};
pub use transport::{Connector, SessionDescriptor, Transport, TransportError, TransportEvent};
pub use view::ConsoleView;
pub use websocket::WebSocketConnector;
