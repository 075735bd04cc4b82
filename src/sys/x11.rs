//! The X11 connection wrapper. Owns the only connection in the process;
//! everything the reactor wants from the server goes through here.

use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};
use x11rb::connection::Connection;
use x11rb::properties::{WmHints, WmSizeHints};
use x11rb::protocol::xproto::{
    Atom, AtomEnum, ChangeWindowAttributesAux, ClientMessageEvent, ConfigureNotifyEvent,
    ConfigureRequestEvent, ConfigureWindowAux, ConnectionExt, CreateWindowAux, EventMask,
    InputFocus, PropMode, Screen, SetMode, StackMode, Window, WindowClass,
    CONFIGURE_NOTIFY_EVENT,
};
use x11rb::protocol::{randr, randr::ConnectionExt as _, Event};
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::{COPY_DEPTH_FROM_PARENT, CURRENT_TIME, NONE};

use crate::model::geometry::Rect;
use crate::model::window::{DockPosition, Struts, WindowInfo, WindowType, XWindowId};

x11rb::atom_manager! {
    pub Atoms:
    AtomsCookie {
        WM_PROTOCOLS,
        WM_DELETE_WINDOW,
        WM_TAKE_FOCUS,
        WM_STATE,
        WM_CLIENT_LEADER,
        UTF8_STRING,
        _NET_SUPPORTED,
        _NET_SUPPORTING_WM_CHECK,
        _NET_WM_NAME,
        _NET_CLIENT_LIST,
        _NET_CLIENT_LIST_STACKING,
        _NET_CURRENT_DESKTOP,
        _NET_ACTIVE_WINDOW,
        _NET_WORKAREA,
        _NET_CLOSE_WINDOW,
        _NET_MOVERESIZE_WINDOW,
        _NET_WM_STATE,
        _NET_WM_STATE_FULLSCREEN,
        _NET_WM_STATE_DEMANDS_ATTENTION,
        _NET_WM_WINDOW_TYPE,
        _NET_WM_WINDOW_TYPE_NORMAL,
        _NET_WM_WINDOW_TYPE_DIALOG,
        _NET_WM_WINDOW_TYPE_UTILITY,
        _NET_WM_WINDOW_TYPE_TOOLBAR,
        _NET_WM_WINDOW_TYPE_SPLASH,
        _NET_WM_WINDOW_TYPE_DOCK,
        _NET_WM_STRUT,
        _NET_WM_STRUT_PARTIAL,
        I3_SOCKET_PATH,
        I3_CONFIG_PATH,
        I3_SYNC,
    }
}

#[derive(Error, Debug)]
pub enum XError {
    #[error("failed to connect to the X server: {0}")]
    Connect(#[from] x11rb::errors::ConnectError),
    #[error("connection to the X server lost: {0}")]
    Connection(#[from] x11rb::errors::ConnectionError),
    #[error("X request failed: {0}")]
    Reply(#[from] x11rb::errors::ReplyError),
    #[error("X request failed: {0}")]
    ReplyOrId(#[from] x11rb::errors::ReplyOrIdError),
    #[error("another window manager is already running")]
    BecomeWm,
}

pub type Result<T> = std::result::Result<T, XError>;

/// Outgoing requests with event side effects are remembered here so the
/// echo coming back from the server can be swallowed instead of being
/// treated as a user action. Entries expire after five seconds.
const IGNORE_TTL: Duration = Duration::from_secs(5);

struct IgnoreEntry {
    sequence: u16,
    response_type: Option<u8>,
    added: Instant,
}

#[derive(Default)]
pub struct IgnoreTable {
    entries: Vec<IgnoreEntry>,
}

impl IgnoreTable {
    pub fn insert(&mut self, sequence: u16, response_type: Option<u8>) {
        self.entries.push(IgnoreEntry { sequence, response_type, added: Instant::now() });
    }

    /// True when `event` is the echo of one of our own requests.
    pub fn should_ignore(&self, event: &Event) -> bool {
        let Some(sequence) = event.wire_sequence_number() else { return false };
        let response_type = event.response_type();
        self.entries.iter().any(|entry| {
            entry.sequence == sequence
                && entry.response_type.map_or(true, |expected| expected == response_type)
        })
    }

    pub fn gc(&mut self) {
        let now = Instant::now();
        self.entries.retain(|entry| now.duration_since(entry.added) < IGNORE_TTL);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// The `WM_TAKE_FOCUS` handoff message, ICCCM 4.1.7.
pub fn take_focus_message(window: XWindowId, atoms: &Atoms, time: u32) -> ClientMessageEvent {
    ClientMessageEvent::new(
        32,
        window,
        atoms.WM_PROTOCOLS,
        [atoms.WM_TAKE_FOCUS, time, 0, 0, 0],
    )
}

/// The `WM_DELETE_WINDOW` close request.
pub fn delete_message(window: XWindowId, atoms: &Atoms) -> ClientMessageEvent {
    ClientMessageEvent::new(
        32,
        window,
        atoms.WM_PROTOCOLS,
        [atoms.WM_DELETE_WINDOW, CURRENT_TIME, 0, 0, 0],
    )
}

pub struct XConn {
    pub conn: RustConnection,
    pub screen_num: usize,
    pub atoms: Atoms,
    pub root: Window,
}

pub struct OutputInfo {
    pub name: String,
    pub rect: Rect,
}

impl XConn {
    pub fn connect() -> Result<XConn> {
        let (conn, screen_num) = x11rb::connect(None)?;
        let atoms = Atoms::new(&conn)?.reply()?;
        let root = conn.setup().roots[screen_num].root;
        Ok(XConn { conn, screen_num, atoms, root })
    }

    pub fn screen(&self) -> &Screen {
        &self.conn.setup().roots[self.screen_num]
    }

    /// Claim the substructure redirect on the root. Only one client may
    /// hold it; an Access error means another manager is running.
    pub fn become_wm(&self) -> Result<()> {
        let change = ChangeWindowAttributesAux::default().event_mask(
            EventMask::SUBSTRUCTURE_REDIRECT
                | EventMask::SUBSTRUCTURE_NOTIFY
                | EventMask::STRUCTURE_NOTIFY
                | EventMask::PROPERTY_CHANGE,
        );
        let result = self.conn.change_window_attributes(self.root, &change)?.check();
        if let Err(x11rb::errors::ReplyError::X11Error(ref error)) = result {
            if error.error_kind == x11rb::protocol::ErrorKind::Access {
                return Err(XError::BecomeWm);
            }
        }
        result.map_err(XError::from)
    }

    /// Active outputs via RandR; a lone fallback screen when none report.
    pub fn outputs(&self) -> Result<Vec<OutputInfo>> {
        let reply = self.conn.randr_get_monitors(self.root, true)?.reply()?;
        let mut outputs = Vec::new();
        for monitor in &reply.monitors {
            let name = self
                .conn
                .get_atom_name(monitor.name)?
                .reply()
                .map(|r| String::from_utf8_lossy(&r.name).into_owned())
                .unwrap_or_else(|_| format!("monitor-{}", outputs.len()));
            outputs.push(OutputInfo {
                name,
                rect: Rect::new(
                    monitor.x as i32,
                    monitor.y as i32,
                    monitor.width as u32,
                    monitor.height as u32,
                ),
            });
        }
        if outputs.is_empty() {
            let screen = self.screen();
            outputs.push(OutputInfo {
                name: "default".to_string(),
                rect: Rect::new(0, 0, screen.width_in_pixels as u32, screen.height_in_pixels as u32),
            });
        }
        Ok(outputs)
    }

    pub fn select_randr_events(&self) -> Result<()> {
        self.conn
            .randr_select_input(self.root, randr::NotifyMask::SCREEN_CHANGE)?
            .check()?;
        Ok(())
    }

    /// Top-level windows that are viewable and not override-redirect, for
    /// adoption at startup or after a restart.
    pub fn scan_windows(&self) -> Result<Vec<XWindowId>> {
        let tree = self.conn.query_tree(self.root)?.reply()?;
        let mut manageable = Vec::new();
        for window in tree.children {
            let attrs = match self.conn.get_window_attributes(window)?.reply() {
                Ok(attrs) => attrs,
                Err(_) => continue,
            };
            if attrs.override_redirect
                || attrs.map_state != x11rb::protocol::xproto::MapState::VIEWABLE
            {
                continue;
            }
            manageable.push(window);
        }
        Ok(manageable)
    }

    pub fn is_manage_eligible(&self, window: XWindowId) -> bool {
        self.conn
            .get_window_attributes(window)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .is_some_and(|attrs| !attrs.override_redirect)
    }

    /// Read every property the window descriptor tracks, in one batch of
    /// round trips.
    pub fn read_window_info(&self, window: XWindowId) -> WindowInfo {
        let mut info = WindowInfo::new(window);
        self.refresh_title(&mut info);
        self.refresh_class(&mut info);
        self.refresh_hints(&mut info);
        self.refresh_protocols(&mut info);
        self.refresh_struts(&mut info);
        info.leader = self.window_property(window, self.atoms.WM_CLIENT_LEADER);
        info.transient_for =
            self.window_property(window, AtomEnum::WM_TRANSIENT_FOR.into());
        info.window_type = self.window_type(window);
        if info.window_type == WindowType::Dock {
            info.dock = Some(self.dock_position(&info));
        }
        if let Some(geom) = self
            .conn
            .get_geometry(window)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
        {
            info.geometry =
                Rect::new(geom.x as i32, geom.y as i32, geom.width as u32, geom.height as u32);
        }
        info
    }

    pub fn refresh_title(&self, info: &mut WindowInfo) {
        if let Some(title) = self.utf8_property(info.id, self.atoms._NET_WM_NAME) {
            info.title = title;
            info.title_is_utf8 = true;
        } else if let Some(title) = self.text_property(info.id, AtomEnum::WM_NAME.into()) {
            info.title = title;
            info.title_is_utf8 = false;
        }
    }

    pub fn refresh_class(&self, info: &mut WindowInfo) {
        // WM_CLASS is two NUL-terminated strings: instance, then class
        if let Some(raw) = self.raw_property(info.id, AtomEnum::WM_CLASS.into()) {
            let mut parts = raw.split(|&b| b == 0);
            if let Some(instance) = parts.next() {
                info.instance = String::from_utf8_lossy(instance).into_owned();
            }
            if let Some(class) = parts.next() {
                info.class = String::from_utf8_lossy(class).into_owned();
            }
        }
    }

    pub fn refresh_hints(&self, info: &mut WindowInfo) {
        if let Ok(cookie) = WmHints::get(&self.conn, info.id) {
            if let Ok(Some(hints)) = cookie.reply() {
                info.urgent = hints.urgent;
                info.accepts_input = hints.input.unwrap_or(true);
            }
        }
    }

    pub fn refresh_protocols(&self, info: &mut WindowInfo) {
        info.needs_take_focus = false;
        info.supports_delete = false;
        if let Ok(cookie) = self.conn.get_property(
            false,
            info.id,
            self.atoms.WM_PROTOCOLS,
            AtomEnum::ATOM,
            0,
            32,
        ) {
            if let Ok(reply) = cookie.reply() {
                if let Some(values) = reply.value32() {
                    for atom in values {
                        if atom == self.atoms.WM_TAKE_FOCUS {
                            info.needs_take_focus = true;
                        } else if atom == self.atoms.WM_DELETE_WINDOW {
                            info.supports_delete = true;
                        }
                    }
                }
            }
        }
    }

    pub fn refresh_struts(&self, info: &mut WindowInfo) {
        for atom in [self.atoms._NET_WM_STRUT_PARTIAL, self.atoms._NET_WM_STRUT] {
            if let Ok(cookie) =
                self.conn.get_property(false, info.id, atom, AtomEnum::CARDINAL, 0, 12)
            {
                if let Ok(reply) = cookie.reply() {
                    if let Some(values) = reply.value32() {
                        let values: Vec<u32> = values.collect();
                        if values.len() >= 4 {
                            info.struts = Some(Struts {
                                left: values[0],
                                right: values[1],
                                top: values[2],
                                bottom: values[3],
                            });
                            return;
                        }
                    }
                }
            }
        }
    }

    fn window_type(&self, window: XWindowId) -> WindowType {
        let Ok(cookie) = self.conn.get_property(
            false,
            window,
            self.atoms._NET_WM_WINDOW_TYPE,
            AtomEnum::ATOM,
            0,
            8,
        ) else {
            return WindowType::Normal;
        };
        let Ok(reply) = cookie.reply() else { return WindowType::Normal };
        let Some(values) = reply.value32() else { return WindowType::Normal };
        for atom in values {
            let atoms = &self.atoms;
            let kind = if atom == atoms._NET_WM_WINDOW_TYPE_DOCK {
                Some(WindowType::Dock)
            } else if atom == atoms._NET_WM_WINDOW_TYPE_DIALOG {
                Some(WindowType::Dialog)
            } else if atom == atoms._NET_WM_WINDOW_TYPE_UTILITY {
                Some(WindowType::Utility)
            } else if atom == atoms._NET_WM_WINDOW_TYPE_TOOLBAR {
                Some(WindowType::Toolbar)
            } else if atom == atoms._NET_WM_WINDOW_TYPE_SPLASH {
                Some(WindowType::Splash)
            } else if atom == atoms._NET_WM_WINDOW_TYPE_NORMAL {
                Some(WindowType::Normal)
            } else {
                None
            };
            if let Some(kind) = kind {
                return kind;
            }
        }
        WindowType::Normal
    }

    fn dock_position(&self, info: &WindowInfo) -> DockPosition {
        match &info.struts {
            Some(struts) if struts.bottom > struts.top => DockPosition::Bottom,
            Some(_) => DockPosition::Top,
            // no struts: guess from the requested position
            None => {
                let screen = self.screen();
                if info.geometry.y > screen.height_in_pixels as i32 / 2 {
                    DockPosition::Bottom
                } else {
                    DockPosition::Top
                }
            }
        }
    }

    fn raw_property(&self, window: XWindowId, atom: Atom) -> Option<Vec<u8>> {
        let reply = self
            .conn
            .get_property(false, window, atom, AtomEnum::ANY, 0, 2048)
            .ok()?
            .reply()
            .ok()?;
        if reply.value.is_empty() {
            None
        } else {
            Some(reply.value)
        }
    }

    fn text_property(&self, window: XWindowId, atom: Atom) -> Option<String> {
        self.raw_property(window, atom)
            .map(|raw| String::from_utf8_lossy(&raw).into_owned())
    }

    fn utf8_property(&self, window: XWindowId, atom: Atom) -> Option<String> {
        let reply = self
            .conn
            .get_property(false, window, atom, self.atoms.UTF8_STRING, 0, 2048)
            .ok()?
            .reply()
            .ok()?;
        if reply.value.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&reply.value).into_owned())
        }
    }

    fn window_property(&self, window: XWindowId, atom: Atom) -> Option<XWindowId> {
        let reply = self
            .conn
            .get_property(false, window, atom, AtomEnum::WINDOW, 0, 1)
            .ok()?
            .reply()
            .ok()?;
        let value = reply.value32()?.next();
        value.filter(|&w| w != NONE)
    }

    /// Create the decoration frame a client gets reparented into.
    pub fn create_frame(&self, rect: Rect) -> Result<Window> {
        let frame = self.conn.generate_id()?;
        let aux = CreateWindowAux::new()
            .event_mask(
                EventMask::SUBSTRUCTURE_REDIRECT
                    | EventMask::SUBSTRUCTURE_NOTIFY
                    | EventMask::ENTER_WINDOW
                    | EventMask::BUTTON_PRESS
                    | EventMask::EXPOSURE,
            )
            .background_pixel(self.screen().black_pixel);
        self.conn.create_window(
            COPY_DEPTH_FROM_PARENT,
            frame,
            self.root,
            rect.x as i16,
            rect.y as i16,
            rect.width.max(1) as u16,
            rect.height.max(1) as u16,
            0,
            WindowClass::INPUT_OUTPUT,
            0,
            &aux,
        )?;
        Ok(frame)
    }

    /// Reparent `window` into `frame`, returning the request sequence for
    /// the ignore table.
    pub fn reparent(&self, window: XWindowId, frame: Window, x: i16, y: i16) -> Result<u16> {
        let cookie = self.conn.reparent_window(window, frame, x, y)?;
        Ok(cookie.sequence_number() as u16)
    }

    pub fn subscribe_window_events(&self, window: XWindowId) -> Result<()> {
        let change = ChangeWindowAttributesAux::default()
            .event_mask(EventMask::PROPERTY_CHANGE | EventMask::STRUCTURE_NOTIFY);
        self.conn.change_window_attributes(window, &change)?;
        self.conn.change_save_set(SetMode::INSERT, window)?;
        Ok(())
    }

    pub fn configure(&self, window: XWindowId, rect: Rect) -> Result<u16> {
        let aux = ConfigureWindowAux::new()
            .x(rect.x)
            .y(rect.y)
            .width(rect.width.max(1))
            .height(rect.height.max(1));
        let cookie = self.conn.configure_window(window, &aux)?;
        Ok(cookie.sequence_number() as u16)
    }

    pub fn map(&self, window: XWindowId) -> Result<u16> {
        let cookie = self.conn.map_window(window)?;
        Ok(cookie.sequence_number() as u16)
    }

    pub fn unmap(&self, window: XWindowId) -> Result<u16> {
        let cookie = self.conn.unmap_window(window)?;
        Ok(cookie.sequence_number() as u16)
    }

    pub fn destroy(&self, window: XWindowId) -> Result<()> {
        self.conn.destroy_window(window)?;
        Ok(())
    }

    pub fn raise(&self, window: XWindowId) -> Result<()> {
        let aux = ConfigureWindowAux::new().stack_mode(StackMode::ABOVE);
        self.conn.configure_window(window, &aux)?;
        Ok(())
    }

    pub fn set_input_focus(&self, window: XWindowId) -> Result<()> {
        self.conn
            .set_input_focus(InputFocus::POINTER_ROOT, window, CURRENT_TIME)?;
        Ok(())
    }

    pub fn send_take_focus(&self, window: XWindowId, time: u32) -> Result<()> {
        let event = take_focus_message(window, &self.atoms, time);
        debug!(window, "sending WM_TAKE_FOCUS");
        self.conn.send_event(false, window, EventMask::NO_EVENT, event)?;
        Ok(())
    }

    pub fn send_delete(&self, window: XWindowId) -> Result<()> {
        let event = delete_message(window, &self.atoms);
        self.conn.send_event(false, window, EventMask::NO_EVENT, event)?;
        Ok(())
    }

    pub fn kill_client(&self, window: XWindowId) -> Result<()> {
        self.conn.kill_client(window)?;
        Ok(())
    }

    /// Deny a configure request by restating the current geometry, as a
    /// synthetic ConfigureNotify.
    pub fn deny_configure(&self, event: &ConfigureRequestEvent, rect: Rect) -> Result<()> {
        let notify = ConfigureNotifyEvent {
            response_type: CONFIGURE_NOTIFY_EVENT,
            sequence: 0,
            event: event.window,
            window: event.window,
            above_sibling: NONE,
            x: rect.x as i16,
            y: rect.y as i16,
            width: rect.width as u16,
            height: rect.height as u16,
            border_width: 0,
            override_redirect: false,
        };
        self.conn
            .send_event(false, event.window, EventMask::STRUCTURE_NOTIFY, notify)?;
        Ok(())
    }

    /// Forward a configure request for a window we do not manage.
    pub fn forward_configure(&self, event: &ConfigureRequestEvent) -> Result<()> {
        let aux = ConfigureWindowAux::from_configure_request(event);
        self.conn.configure_window(event.window, &aux)?;
        Ok(())
    }

    /// Answer an I3_SYNC round trip with the identical payload.
    pub fn sync_reply(&self, target: XWindowId, cookie: u32) -> Result<()> {
        let event = ClientMessageEvent::new(
            32,
            target,
            self.atoms.I3_SYNC,
            [target, cookie, 0, 0, 0],
        );
        self.conn.send_event(false, target, EventMask::NO_EVENT, event)?;
        Ok(())
    }

    pub fn set_withdrawn(&self, window: XWindowId) {
        // WM_STATE WithdrawnState(0); failures here are harmless since the
        // window may already be gone
        let data: [u32; 2] = [0, NONE];
        if let Err(e) = self.conn.change_property32(
            PropMode::REPLACE,
            window,
            self.atoms.WM_STATE,
            self.atoms.WM_STATE,
            &data,
        ) {
            warn!(window, error = %e, "failed to set withdrawn state");
        }
    }

    pub fn set_normal_state(&self, window: XWindowId) -> Result<()> {
        // WM_STATE NormalState(1)
        let data: [u32; 2] = [1, NONE];
        self.conn.change_property32(
            PropMode::REPLACE,
            window,
            self.atoms.WM_STATE,
            self.atoms.WM_STATE,
            &data,
        )?;
        Ok(())
    }

    /// Clamp a client's floating size request against WM_NORMAL_HINTS.
    pub fn apply_size_hints(&self, window: XWindowId, mut rect: Rect) -> Rect {
        if let Ok(cookie) = WmSizeHints::get_normal_hints(&self.conn, window) {
            if let Ok(Some(hints)) = cookie.reply() {
                if let Some((min_w, min_h)) = hints.min_size {
                    rect.width = rect.width.max(min_w.max(0) as u32);
                    rect.height = rect.height.max(min_h.max(0) as u32);
                }
                if let Some((max_w, max_h)) = hints.max_size {
                    if max_w > 0 {
                        rect.width = rect.width.min(max_w as u32);
                    }
                    if max_h > 0 {
                        rect.height = rect.height.min(max_h as u32);
                    }
                }
            }
        }
        rect
    }

    pub fn flush(&self) -> Result<()> {
        self.conn.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_atoms() -> Atoms {
        // sequentially numbered fake atoms; only identity matters here
        let mut next = 100u32;
        let mut alloc = || {
            next += 1;
            next
        };
        Atoms {
            WM_PROTOCOLS: alloc(),
            WM_DELETE_WINDOW: alloc(),
            WM_TAKE_FOCUS: alloc(),
            WM_STATE: alloc(),
            WM_CLIENT_LEADER: alloc(),
            UTF8_STRING: alloc(),
            _NET_SUPPORTED: alloc(),
            _NET_SUPPORTING_WM_CHECK: alloc(),
            _NET_WM_NAME: alloc(),
            _NET_CLIENT_LIST: alloc(),
            _NET_CLIENT_LIST_STACKING: alloc(),
            _NET_CURRENT_DESKTOP: alloc(),
            _NET_ACTIVE_WINDOW: alloc(),
            _NET_WORKAREA: alloc(),
            _NET_CLOSE_WINDOW: alloc(),
            _NET_MOVERESIZE_WINDOW: alloc(),
            _NET_WM_STATE: alloc(),
            _NET_WM_STATE_FULLSCREEN: alloc(),
            _NET_WM_STATE_DEMANDS_ATTENTION: alloc(),
            _NET_WM_WINDOW_TYPE: alloc(),
            _NET_WM_WINDOW_TYPE_NORMAL: alloc(),
            _NET_WM_WINDOW_TYPE_DIALOG: alloc(),
            _NET_WM_WINDOW_TYPE_UTILITY: alloc(),
            _NET_WM_WINDOW_TYPE_TOOLBAR: alloc(),
            _NET_WM_WINDOW_TYPE_SPLASH: alloc(),
            _NET_WM_WINDOW_TYPE_DOCK: alloc(),
            _NET_WM_STRUT: alloc(),
            _NET_WM_STRUT_PARTIAL: alloc(),
            I3_SOCKET_PATH: alloc(),
            I3_CONFIG_PATH: alloc(),
            I3_SYNC: alloc(),
        }
    }

    #[test]
    fn take_focus_message_shape() {
        let atoms = fake_atoms();
        let message = take_focus_message(0x800002, &atoms, 12345);
        assert_eq!(message.format, 32);
        assert_eq!(message.window, 0x800002);
        assert_eq!(message.type_, atoms.WM_PROTOCOLS);
        let data = message.data.as_data32();
        assert_eq!(data[0], atoms.WM_TAKE_FOCUS);
        assert_eq!(data[1], 12345);
    }

    #[test]
    fn ignore_table_matches_sequence_and_type() {
        use x11rb::protocol::xproto::UnmapNotifyEvent;
        let mut table = IgnoreTable::default();
        table.insert(42, Some(x11rb::protocol::xproto::UNMAP_NOTIFY_EVENT));
        let event = Event::UnmapNotify(UnmapNotifyEvent {
            response_type: x11rb::protocol::xproto::UNMAP_NOTIFY_EVENT,
            sequence: 42,
            event: 1,
            window: 1,
            from_configure: false,
        });
        assert!(table.should_ignore(&event));
        let other = Event::UnmapNotify(UnmapNotifyEvent {
            response_type: x11rb::protocol::xproto::UNMAP_NOTIFY_EVENT,
            sequence: 43,
            event: 1,
            window: 1,
            from_configure: false,
        });
        assert!(!table.should_ignore(&other));
    }

    #[test]
    fn ignore_table_gc_drops_stale_entries() {
        let mut table = IgnoreTable::default();
        table.insert(1, None);
        table.entries[0].added = Instant::now() - Duration::from_secs(6);
        table.insert(2, None);
        table.gc();
        assert_eq!(table.len(), 1);
    }
}
