use dlog_types::Direction;

/// All possible actions in the pager (command pattern)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    // Container navigation
    SwitchContainer(Direction),
    Quit,

    // Scrolling
    ScrollUp(usize),
    ScrollDown(usize),
    ScrollToTop,
    ScrollToBottom,
    PageUp,
    PageDown,

    // UI toggles
    ToggleFollow,
    ToggleHelp,
    DismissError,
}
