//! The reactor keeps the tree and the X server in agreement. It drains X
//! events and IPC requests on one thread, funnels both into tree
//! mutations, settles, and pushes the resulting geometry, mapping, and
//! focus state back out.

pub mod adopt;
pub mod push;

use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::path::PathBuf;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{debug, error, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{ClientMessageEvent, ConfigureRequestEvent, PropertyNotifyEvent};
use x11rb::protocol::Event;

use crate::commands::{self, exec, parse, SideEffect};
use crate::common::config::Config;
use crate::ipc::protocol::{EventType, MessageType};
use crate::ipc::server::{IncomingRequest, IpcServer};
use crate::ipc::reply;
use crate::model::rules::{self, Assignment};
use crate::model::snapshot;
use crate::model::tree::{
    ContainerKind, Effect, KillPolicy, Tree, WindowChange, WorkspaceChange,
};
use crate::model::window::XWindowId;
use crate::model::Rect;
use crate::sys::spawn;
use crate::sys::x11::{IgnoreTable, XConn, XError};

/// Why the main loop returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunResult {
    Exit,
    Restart,
}

pub struct Reactor {
    pub x: XConn,
    pub tree: Tree,
    pub config: Config,
    pub config_path: PathBuf,
    assignments: Vec<Assignment>,
    pub ipc: IpcServer,
    ignore: IgnoreTable,
    push_state: push::PushState,
    pending_syncs: Vec<(XWindowId, u32)>,
    /// Server time of the latest event carrying one, for WM_TAKE_FOCUS.
    last_timestamp: u32,
    stop: Option<RunResult>,
}

impl Reactor {
    pub fn new(
        x: XConn,
        config: Config,
        config_path: PathBuf,
        ipc: IpcServer,
        restored: Option<Tree>,
    ) -> Result<Reactor, XError> {
        let assignments = rules::compile(&config.assignments);
        let tree = restored.unwrap_or_default();
        let mut reactor = Reactor {
            x,
            tree,
            config,
            config_path,
            assignments,
            ipc,
            ignore: IgnoreTable::default(),
            push_state: push::PushState::default(),
            pending_syncs: Vec::new(),
            last_timestamp: x11rb::CURRENT_TIME,
            stop: None,
        };
        reactor.bootstrap()?;
        Ok(reactor)
    }

    fn bootstrap(&mut self) -> Result<(), XError> {
        self.x.become_wm()?;
        let check = self.x.init_ewmh()?;
        debug!(check, "EWMH check window created");
        self.x.select_randr_events().unwrap_or_else(|e| {
            warn!(error = %e, "RandR unavailable, falling back to one output");
        });
        self.reconfigure_outputs()?;
        let socket = self.ipc.socket_path.display().to_string();
        let config_path = self.config_path.display().to_string();
        self.x.set_discovery_paths(&socket, &config_path)?;

        // windows that already exist (fresh start or restart-in-place)
        for window in self.x.scan_windows()? {
            if self.tree.leaf_by_window(window).is_some() {
                // carried over in the snapshot; reattach our machinery
                adopt::readopt(self, window);
            } else {
                adopt::manage(self, window, true);
            }
        }
        self.settle_and_push();
        Ok(())
    }

    /// Outputs as RandR reports them: new ones are added, vanished ones
    /// are evacuated into the first surviving output.
    pub fn reconfigure_outputs(&mut self) -> Result<(), XError> {
        let reported = self.x.outputs()?;
        for info in &reported {
            match self.tree.output_by_name(&info.name) {
                Some(output) => self.tree.map[output].rect = info.rect,
                None => {
                    let output = self.tree.add_output(&info.name, info.rect);
                    let ws = self.tree.create_on_output(output, &self.config);
                    self.tree.map[ws].fullscreen_mode =
                        crate::model::tree::FullscreenMode::Output;
                    info!(output = %info.name, "output appeared");
                }
            }
        }

        let vanished: Vec<_> = self.tree.map[self.tree.root]
            .children
            .iter()
            .copied()
            .filter(|&o| {
                let name = &self.tree.map[o].name;
                name != "__i3" && !reported.iter().any(|i| i.name == *name)
            })
            .collect();
        if !vanished.is_empty() {
            let survivor = self.tree.map[self.tree.root]
                .children
                .iter()
                .copied()
                .find(|&o| {
                    self.tree.map[o].name != "__i3" && !vanished.contains(&o)
                });
            if let Some(survivor) = survivor {
                for output in vanished {
                    info!(output = %self.tree.map[output].name, "output disappeared, evacuating");
                    if let Some(content) = self.tree.content_of(output) {
                        for ws in self.tree.map[content].children.clone() {
                            self.tree
                                .move_workspace_to_output(ws, survivor, &self.config)
                                .map_err(|e| warn!(error = %e, "evacuation failed"))
                                .ok();
                        }
                    }
                    self.tree.close(output, KillPolicy::None, false);
                    self.tree.effects.push(Effect::OutputEvent);
                }
            }
        }

        // make sure the focus rests somewhere real
        if self
            .tree
            .workspace_of(self.tree.focused)
            .map_or(true, |ws| !self.tree.map.contains_key(ws))
        {
            if let Some(output) = self.tree.focused_output() {
                if let Some(ws) = self.tree.visible_workspace_on(output) {
                    let target = self.tree.descend_focused(ws);
                    self.tree.set_focus(target);
                }
            }
        }
        Ok(())
    }

    /// The main loop. One turn: drain X events FIFO, then queued IPC
    /// commands, one settle step, one flush.
    pub fn run(&mut self) -> Result<RunResult, XError> {
        info!("entering event loop");
        loop {
            self.x.flush()?;
            self.wait_for_activity()?;

            while let Some(event) = self.x.conn.poll_for_event()? {
                self.handle_x_event(event);
            }

            self.ipc.accept_pending();
            let requests = self.ipc.read_requests();
            for request in requests {
                self.handle_ipc_request(request);
            }

            self.settle_and_push();

            for (window, cookie) in std::mem::take(&mut self.pending_syncs) {
                self.x.sync_reply(window, cookie).unwrap_or_else(|e| {
                    warn!(error = %e, "sync reply failed");
                });
            }
            self.ignore.gc();

            if let Some(result) = self.stop {
                return Ok(result);
            }
        }
    }

    fn wait_for_activity(&mut self) -> Result<(), XError> {
        let x_fd = self.x.conn.stream().as_raw_fd();
        let listener_fd = self.ipc.listener_fd();
        let client_fds = self.ipc.client_fds();
        let mut fds: Vec<PollFd> = Vec::with_capacity(2 + client_fds.len());
        let borrow = |fd: RawFd| unsafe { BorrowedFd::borrow_raw(fd) };
        fds.push(PollFd::new(borrow(x_fd), PollFlags::POLLIN));
        fds.push(PollFd::new(borrow(listener_fd), PollFlags::POLLIN));
        for fd in &client_fds {
            fds.push(PollFd::new(borrow(*fd), PollFlags::POLLIN));
        }
        // bounded wait so the ignore table is collected even when idle
        match poll(&mut fds, PollTimeout::from(1000u16)) {
            Ok(_) => Ok(()),
            Err(nix::errno::Errno::EINTR) => Ok(()),
            Err(e) => {
                error!(error = %e, "poll failed");
                Err(XError::Connection(x11rb::errors::ConnectionError::UnknownError))
            }
        }
    }

    /// Execute a parsed command batch and absorb its side effects.
    pub fn run_commands(&mut self, input: &str) -> Vec<commands::CommandReply> {
        let commands = match parse::parse(input) {
            Ok(commands) => commands,
            Err(e) => {
                warn!(input, error = %e, "rejected command");
                return vec![commands::CommandReply::err(e.to_string())];
            }
        };
        let outcome = exec::run(&mut self.tree, &self.config, &commands);
        for effect in outcome.side_effects {
            match effect {
                SideEffect::Spawn(command_line) => spawn::spawn(&command_line),
                SideEffect::Restart => {
                    if let Err(e) =
                        snapshot::save_to(&self.tree, &crate::common::config::snapshot_file())
                    {
                        warn!(error = %e, "could not save the layout before restarting");
                    }
                    self.stop = Some(RunResult::Restart);
                }
                SideEffect::Reload => self.reload_config(),
                SideEffect::Exit => self.stop = Some(RunResult::Exit),
            }
        }
        outcome.replies
    }

    fn reload_config(&mut self) {
        match Config::load_or_default(&self.config_path) {
            Ok(config) => {
                for issue in config.validate() {
                    warn!(issue = %issue, "config issue");
                }
                self.assignments = rules::compile(&config.assignments);
                self.config = config;
                info!("configuration reloaded");
            }
            Err(e) => error!(error = %e, "keeping the old configuration"),
        }
    }

    fn handle_x_event(&mut self, event: Event) {
        if self.ignore.should_ignore(&event) {
            return;
        }
        match event {
            Event::MapRequest(e) => adopt::manage(self, e.window, false),
            Event::UnmapNotify(e) => {
                let Some(leaf) = self.tree.leaf_by_window(e.window) else { return };
                if self.tree.map[leaf].ignore_unmap > 0 {
                    self.tree.map[leaf].ignore_unmap -= 1;
                    return;
                }
                self.x.set_withdrawn(e.window);
                self.tree.close(leaf, KillPolicy::None, false);
            }
            Event::DestroyNotify(e) => {
                if let Some(leaf) = self.tree.leaf_by_window(e.window) {
                    self.tree.close(leaf, KillPolicy::None, false);
                }
            }
            Event::ConfigureRequest(e) => self.handle_configure_request(e),
            Event::PropertyNotify(e) => self.handle_property_notify(e),
            Event::ClientMessage(e) => self.handle_client_message(e),
            Event::EnterNotify(e) => {
                if !self.config.focus_follows_mouse {
                    return;
                }
                self.last_timestamp = e.time;
                let leaf = self
                    .tree
                    .leaf_by_frame(e.event)
                    .or_else(|| self.tree.leaf_by_window(e.event));
                if let Some(leaf) = leaf {
                    self.tree.set_focus(leaf);
                }
            }
            Event::ButtonPress(e) => {
                self.last_timestamp = e.time;
                let leaf = self
                    .tree
                    .leaf_by_frame(e.event)
                    .or_else(|| self.tree.leaf_by_window(e.child));
                if let Some(leaf) = leaf {
                    self.tree.set_focus(leaf);
                    if let Some(wrapper) =
                        self.tree.ancestor_of_kind(leaf, ContainerKind::FloatingWrapper)
                    {
                        // raise the floating window being interacted with
                        let _ = wrapper;
                        if let Some(frame) =
                            self.tree.map[leaf].window.as_ref().and_then(|w| w.frame)
                        {
                            self.x.raise(frame).ok();
                        }
                    }
                }
            }
            Event::RandrScreenChangeNotify(_) => {
                if let Err(e) = self.reconfigure_outputs() {
                    error!(error = %e, "output reconfiguration failed");
                }
            }
            Event::MappingNotify(_) => {
                // keysym translation lives outside; nothing to regrab here
            }
            Event::Error(e) => {
                warn!(?e, "X error (continuing)");
            }
            _ => {}
        }
    }

    fn handle_configure_request(&mut self, event: ConfigureRequestEvent) {
        match self.tree.leaf_by_window(event.window) {
            Some(leaf) => {
                // managed windows do not get to pick their geometry
                let rect = self.tree.map[leaf].window_rect;
                self.x.deny_configure(&event, rect).unwrap_or_else(|e| {
                    warn!(error = %e, "could not answer configure request");
                });
            }
            None => {
                self.x.forward_configure(&event).unwrap_or_else(|e| {
                    warn!(error = %e, "could not forward configure request");
                });
            }
        }
    }

    fn handle_property_notify(&mut self, event: PropertyNotifyEvent) {
        self.last_timestamp = event.time;
        let Some(leaf) = self.tree.leaf_by_window(event.window) else { return };
        let atoms = self.x.atoms;
        let atom = event.atom;
        let Some(mut info) = self.tree.map[leaf].window.clone() else { return };

        if atom == u32::from(x11rb::protocol::xproto::AtomEnum::WM_NAME)
            || atom == atoms._NET_WM_NAME
        {
            let before = info.title.clone();
            self.x.refresh_title(&mut info);
            if info.title != before {
                self.tree.map[leaf].name = info.title.clone();
                self.tree.effects.push(Effect::WindowEvent {
                    change: WindowChange::Title,
                    window: info.id,
                });
            }
        } else if atom == u32::from(x11rb::protocol::xproto::AtomEnum::WM_HINTS) {
            self.x.refresh_hints(&mut info);
            let urgent = info.urgent && leaf != self.tree.focused;
            info.urgent = urgent;
            self.tree.map[leaf].window = Some(info.clone());
            self.tree.propagate_urgency(leaf);
            self.tree.effects.push(Effect::WindowEvent {
                change: WindowChange::Urgent,
                window: info.id,
            });
            return;
        } else if atom == atoms.WM_PROTOCOLS {
            self.x.refresh_protocols(&mut info);
        } else if atom == atoms._NET_WM_STRUT || atom == atoms._NET_WM_STRUT_PARTIAL {
            self.x.refresh_struts(&mut info);
        } else if atom == u32::from(x11rb::protocol::xproto::AtomEnum::WM_CLASS) {
            self.x.refresh_class(&mut info);
        }
        self.tree.map[leaf].window = Some(info);
    }

    fn handle_client_message(&mut self, event: ClientMessageEvent) {
        let atoms = self.x.atoms;
        let data = event.data.as_data32();
        if event.type_ == atoms.I3_SYNC {
            self.pending_syncs.push((data[0], data[1]));
        } else if event.type_ == atoms._NET_ACTIVE_WINDOW {
            if let Some(leaf) = self.tree.leaf_by_window(event.window) {
                if let Some(ws) = self.tree.workspace_of(leaf) {
                    if !self.tree.workspace_is_visible(ws)
                        && !self.tree.map[ws].name.starts_with("__")
                    {
                        self.tree.show_workspace(ws, &self.config);
                    }
                }
                self.tree.set_focus(leaf);
            }
        } else if event.type_ == atoms._NET_WM_STATE {
            // data: action (0 remove / 1 add / 2 toggle), then properties
            if data[1] == atoms._NET_WM_STATE_FULLSCREEN
                || data[2] == atoms._NET_WM_STATE_FULLSCREEN
            {
                if let Some(leaf) = self.tree.leaf_by_window(event.window) {
                    let arg = match data[0] {
                        0 => "fullscreen disable",
                        1 => "fullscreen enable",
                        _ => "fullscreen toggle",
                    };
                    let focused = self.tree.focused;
                    self.tree.set_focus(leaf);
                    self.run_commands(arg);
                    if self.tree.map.contains_key(focused) {
                        self.tree.set_focus(focused);
                    }
                }
            }
        } else if event.type_ == atoms._NET_CLOSE_WINDOW {
            if let Some(leaf) = self.tree.leaf_by_window(event.window) {
                self.tree.close(leaf, KillPolicy::Window, false);
            }
        } else if event.type_ == atoms._NET_CURRENT_DESKTOP {
            let order = self.tree.workspaces_in_order(None);
            if let Some(&ws) = order.get(data[0] as usize) {
                self.tree.show_workspace(ws, &self.config);
            }
        } else if event.type_ == atoms._NET_MOVERESIZE_WINDOW {
            if let Some(leaf) = self.tree.leaf_by_window(event.window) {
                if let Some(wrapper) =
                    self.tree.ancestor_of_kind(leaf, ContainerKind::FloatingWrapper)
                {
                    self.tree.map[wrapper].rect =
                        Rect::new(data[1] as i32, data[2] as i32, data[3], data[4]);
                }
            }
        }
    }

    fn handle_ipc_request(&mut self, request: IncomingRequest) {
        let IncomingRequest { client, message_type, payload } = request;
        match message_type {
            MessageType::Command => {
                let input = String::from_utf8_lossy(&payload).into_owned();
                debug!(input = %input, "IPC command");
                let replies = self.run_commands(&input);
                let body = serde_json::to_vec(&replies).unwrap_or_else(|_| b"[]".to_vec());
                self.ipc.send_reply(client, MessageType::Command, &body);
            }
            MessageType::GetWorkspaces => {
                let body = reply::workspaces_json(&self.tree).to_string();
                self.ipc.send_reply(client, message_type, body.as_bytes());
            }
            MessageType::Subscribe => self.ipc.subscribe(client, &payload),
            MessageType::GetOutputs => {
                let body = reply::outputs_json(&self.tree).to_string();
                self.ipc.send_reply(client, message_type, body.as_bytes());
            }
            MessageType::GetTree => {
                let body = reply::tree_json(&self.tree).to_string();
                self.ipc.send_reply(client, message_type, body.as_bytes());
            }
            MessageType::GetMarks => {
                let body = reply::marks_json(&self.tree).to_string();
                self.ipc.send_reply(client, message_type, body.as_bytes());
            }
            MessageType::GetBarConfig => {
                let body = reply::bar_config_json().to_string();
                self.ipc.send_reply(client, message_type, body.as_bytes());
            }
            MessageType::GetVersion => {
                let body = reply::version_json().to_string();
                self.ipc.send_reply(client, message_type, body.as_bytes());
            }
        }
    }

    /// Settle the tree, apply queued window teardowns, emit IPC events,
    /// and push geometry/mapping/focus to the server.
    fn settle_and_push(&mut self) {
        self.tree.settle(&self.config);
        for effect in self.tree.take_effects() {
            self.apply_effect(effect);
        }
        push::push(
            &self.x,
            &mut self.tree,
            &mut self.push_state,
            &mut self.ignore,
            self.last_timestamp,
        );
    }

    fn apply_effect(&mut self, effect: Effect) {
        match effect {
            Effect::CloseWindow { window, frame, policy, supports_delete } => {
                match policy {
                    KillPolicy::None => {
                        self.x.set_withdrawn(window);
                    }
                    KillPolicy::Window => {
                        if supports_delete {
                            self.x.send_delete(window).ok();
                        } else {
                            self.x.kill_client(window).ok();
                        }
                    }
                    KillPolicy::Client => {
                        self.x.kill_client(window).ok();
                    }
                }
                if let Some(frame) = frame {
                    self.x.unmap(frame).ok();
                    self.x.destroy(frame).ok();
                }
                self.push_state.forget(window, frame);
            }
            Effect::WorkspaceEvent { change, name } => {
                let change = match change {
                    WorkspaceChange::Init => "init",
                    WorkspaceChange::Focus => "focus",
                    WorkspaceChange::Empty => "empty",
                    WorkspaceChange::Urgent => "urgent",
                };
                let payload =
                    serde_json::json!({ "change": change, "current": { "name": name } });
                self.ipc.broadcast(EventType::Workspace, payload.to_string().as_bytes());
            }
            Effect::WindowEvent { change, window } => {
                let change = match change {
                    WindowChange::New => "new",
                    WindowChange::Close => "close",
                    WindowChange::Focus => "focus",
                    WindowChange::Title => "title",
                    WindowChange::FullscreenMode => "fullscreen_mode",
                    WindowChange::Move => "move",
                    WindowChange::Urgent => "urgent",
                };
                let container = self
                    .tree
                    .leaf_by_window(window)
                    .map(|leaf| reply::container_json(&self.tree, leaf))
                    .unwrap_or(serde_json::json!({ "window": window }));
                let payload =
                    serde_json::json!({ "change": change, "container": container });
                self.ipc.broadcast(EventType::Window, payload.to_string().as_bytes());
            }
            Effect::OutputEvent => {
                let payload = serde_json::json!({ "change": "unspecified" });
                self.ipc.broadcast(EventType::Output, payload.to_string().as_bytes());
            }
            Effect::ModeEvent { name } => {
                let payload = serde_json::json!({ "change": name });
                self.ipc.broadcast(EventType::Mode, payload.to_string().as_bytes());
            }
        }
    }
}
