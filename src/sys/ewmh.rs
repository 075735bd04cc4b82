//! EWMH root-window bookkeeping: everything pagers and bars read to
//! understand what the manager is doing.

use x11rb::connection::Connection;
use x11rb::protocol::xproto::{AtomEnum, ConnectionExt, PropMode, WindowClass};
use x11rb::wrapper::ConnectionExt as _;
use x11rb::COPY_DEPTH_FROM_PARENT;

use super::x11::{Result, XConn};
use crate::model::geometry::Rect;
use crate::model::window::XWindowId;

pub const WM_NAME: &str = "trellis";

impl XConn {
    /// Announce the supported hints and create the `_NET_SUPPORTING_WM_CHECK`
    /// child window. Returns the check window.
    pub fn init_ewmh(&self) -> Result<XWindowId> {
        let atoms = &self.atoms;
        let supported = [
            atoms._NET_SUPPORTED,
            atoms._NET_SUPPORTING_WM_CHECK,
            atoms._NET_WM_NAME,
            atoms._NET_CLIENT_LIST,
            atoms._NET_CLIENT_LIST_STACKING,
            atoms._NET_CURRENT_DESKTOP,
            atoms._NET_ACTIVE_WINDOW,
            atoms._NET_WORKAREA,
            atoms._NET_CLOSE_WINDOW,
            atoms._NET_WM_STATE,
            atoms._NET_WM_STATE_FULLSCREEN,
            atoms._NET_WM_STATE_DEMANDS_ATTENTION,
            atoms._NET_WM_WINDOW_TYPE,
            atoms._NET_WM_STRUT_PARTIAL,
        ];
        self.conn.change_property32(
            PropMode::REPLACE,
            self.root,
            atoms._NET_SUPPORTED,
            AtomEnum::ATOM,
            &supported,
        )?;

        let check = self.conn.generate_id()?;
        self.conn.create_window(
            COPY_DEPTH_FROM_PARENT,
            check,
            self.root,
            -1,
            -1,
            1,
            1,
            0,
            WindowClass::INPUT_ONLY,
            0,
            &Default::default(),
        )?;
        for window in [check, self.root] {
            self.conn.change_property32(
                PropMode::REPLACE,
                window,
                atoms._NET_SUPPORTING_WM_CHECK,
                AtomEnum::WINDOW,
                &[check],
            )?;
        }
        self.conn.change_property8(
            PropMode::REPLACE,
            check,
            atoms._NET_WM_NAME,
            atoms.UTF8_STRING,
            WM_NAME.as_bytes(),
        )?;
        Ok(check)
    }

    pub fn set_client_list(&self, clients: &[XWindowId]) -> Result<()> {
        for atom in [self.atoms._NET_CLIENT_LIST, self.atoms._NET_CLIENT_LIST_STACKING] {
            self.conn.change_property32(
                PropMode::REPLACE,
                self.root,
                atom,
                AtomEnum::WINDOW,
                clients,
            )?;
        }
        Ok(())
    }

    pub fn set_current_desktop(&self, index: u32) -> Result<()> {
        self.conn.change_property32(
            PropMode::REPLACE,
            self.root,
            self.atoms._NET_CURRENT_DESKTOP,
            AtomEnum::CARDINAL,
            &[index],
        )?;
        Ok(())
    }

    pub fn set_active_window(&self, window: Option<XWindowId>) -> Result<()> {
        self.conn.change_property32(
            PropMode::REPLACE,
            self.root,
            self.atoms._NET_ACTIVE_WINDOW,
            AtomEnum::WINDOW,
            &[window.unwrap_or(x11rb::NONE)],
        )?;
        Ok(())
    }

    /// One x/y/width/height quadruple per desktop.
    pub fn set_workarea(&self, areas: &[Rect]) -> Result<()> {
        let mut values = Vec::with_capacity(areas.len() * 4);
        for rect in areas {
            values.push(rect.x as u32);
            values.push(rect.y as u32);
            values.push(rect.width);
            values.push(rect.height);
        }
        self.conn.change_property32(
            PropMode::REPLACE,
            self.root,
            self.atoms._NET_WORKAREA,
            AtomEnum::CARDINAL,
            &values,
        )?;
        Ok(())
    }

    /// Advertise the IPC socket and config paths for discovery by clients.
    pub fn set_discovery_paths(&self, socket_path: &str, config_path: &str) -> Result<()> {
        self.conn.change_property8(
            PropMode::REPLACE,
            self.root,
            self.atoms.I3_SOCKET_PATH,
            self.atoms.UTF8_STRING,
            socket_path.as_bytes(),
        )?;
        self.conn.change_property8(
            PropMode::REPLACE,
            self.root,
            self.atoms.I3_CONFIG_PATH,
            self.atoms.UTF8_STRING,
            config_path.as_bytes(),
        )?;
        Ok(())
    }
}
