//! Pager state and actions

mod action;
mod state;
mod view;

pub use action::Action;
pub use state::AppState;
pub use view::ViewSource;
