//! The per-window descriptor attached to leaf containers. All fields are
//! snapshots of ICCCM/EWMH properties, refreshed on PropertyNotify.

use serde::{Deserialize, Serialize};

use crate::model::geometry::Rect;

/// Raw X11 window id. The tree never talks to the server itself; ids are
/// only carried so the reactor can address requests.
pub type XWindowId = u32;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DockPosition {
    Top,
    Bottom,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Struts {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

/// EWMH window type, reduced to the kinds that change placement.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WindowType {
    #[default]
    Normal,
    Dialog,
    Utility,
    Toolbar,
    Splash,
    Dock,
}

impl WindowType {
    /// Types that are adopted as floating rather than tiled.
    pub fn wants_floating(self) -> bool {
        matches!(
            self,
            WindowType::Dialog | WindowType::Utility | WindowType::Toolbar | WindowType::Splash
        )
    }
}

/// What the reactor must do to hand input focus to a window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FocusAction {
    /// Plain `SetInputFocus`.
    SetInput,
    /// `WM_PROTOCOLS`/`WM_TAKE_FOCUS` client message, no `SetInputFocus`.
    TakeFocus,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct WindowInfo {
    pub id: XWindowId,
    /// Decoration frame the client is reparented into. Allocated by the
    /// reactor at adoption time.
    #[serde(default)]
    pub frame: Option<XWindowId>,
    pub leader: Option<XWindowId>,
    pub transient_for: Option<XWindowId>,
    pub class: String,
    pub instance: String,
    pub title: String,
    /// Whether `title` came from `_NET_WM_NAME` (UTF-8) rather than the
    /// legacy `WM_NAME`.
    pub title_is_utf8: bool,
    pub window_type: WindowType,
    pub dock: Option<DockPosition>,
    /// `WM_TAKE_FOCUS` advertised in `WM_PROTOCOLS`.
    pub needs_take_focus: bool,
    /// `WM_DELETE_WINDOW` advertised in `WM_PROTOCOLS`.
    pub supports_delete: bool,
    /// The `input` field of `WM_HINTS`; true when absent.
    pub accepts_input: bool,
    /// Urgency bit of `WM_HINTS`.
    pub urgent: bool,
    pub struts: Option<Struts>,
    /// Client geometry from adoption time; floating placement starts here.
    pub geometry: Rect,
    /// Indices of assignment rules that already ran for this window.
    pub ran_assignments: Vec<usize>,
}

impl WindowInfo {
    pub fn new(id: XWindowId) -> Self {
        Self { id, accepts_input: true, ..Default::default() }
    }

    pub fn focus_action(&self) -> FocusAction {
        if self.needs_take_focus {
            FocusAction::TakeFocus
        } else {
            FocusAction::SetInput
        }
    }

    /// Vertical space a dock client reserves, from its struts when present,
    /// else its requested geometry.
    pub fn reserved_height(&self) -> u32 {
        match (&self.struts, &self.dock) {
            (Some(s), Some(DockPosition::Top)) if s.top > 0 => s.top,
            (Some(s), Some(DockPosition::Bottom)) if s.bottom > 0 => s.bottom,
            _ => self.geometry.height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn focus_action_defaults_to_set_input() {
        let win = WindowInfo::new(0x400001);
        assert_eq!(win.focus_action(), FocusAction::SetInput);
    }

    #[test]
    fn take_focus_suppresses_set_input() {
        let mut win = WindowInfo::new(0x400002);
        win.needs_take_focus = true;
        assert_eq!(win.focus_action(), FocusAction::TakeFocus);
    }

    #[test]
    fn utility_and_dialog_types_float() {
        assert!(WindowType::Utility.wants_floating());
        assert!(WindowType::Dialog.wants_floating());
        assert!(WindowType::Splash.wants_floating());
        assert!(!WindowType::Normal.wants_floating());
        assert!(!WindowType::Dock.wants_floating());
    }

    #[test]
    fn dock_reserved_height_prefers_struts() {
        let mut win = WindowInfo::new(0x400003);
        win.dock = Some(DockPosition::Top);
        win.geometry = Rect::new(0, 0, 1024, 30);
        assert_eq!(win.reserved_height(), 30);
        win.struts = Some(Struts { top: 24, ..Default::default() });
        assert_eq!(win.reserved_height(), 24);
    }
}
