//! Terminal pager for dlog
//!
//! This crate provides the terminal user interface: view state,
//! keybindings, event handling, and the log viewer screen.

pub mod app;
pub mod config;
pub mod tui;
pub mod ui;

pub use app::{Action, AppState, ViewSource};
pub use config::{KeyBinding, KeyBindings};
pub use tui::{Event, EventHandler, Tui};
pub use ui::components::{HelpOverlay, StatusBar, pager_hints};
pub use ui::screens::LogViewerScreen;
pub use ui::{Layout, Theme};
