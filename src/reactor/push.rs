//! Pushing tree state out to X. Compares the settled tree against what was
//! last sent and emits only the difference: configure, map/unmap, restack,
//! input focus, and the root properties bars read.

use tracing::{trace, warn};

use crate::common::collections::{HashMap, HashSet};
use crate::model::geometry::Rect;
use crate::model::tree::{ContainerId, ContainerKind, FullscreenMode, Tree};
use crate::model::window::{FocusAction, XWindowId};
use crate::sys::x11::{IgnoreTable, XConn};

#[derive(Default)]
pub struct PushState {
    /// Client windows whose frame is currently mapped.
    visible: HashSet<XWindowId>,
    frame_rects: HashMap<XWindowId, Rect>,
    client_rects: HashMap<XWindowId, Rect>,
    focused: Option<XWindowId>,
    client_list: Vec<XWindowId>,
    current_desktop: Option<u32>,
}

impl PushState {
    pub fn forget(&mut self, window: XWindowId, frame: Option<XWindowId>) {
        self.visible.remove(&window);
        self.client_rects.remove(&window);
        if let Some(frame) = frame {
            self.frame_rects.remove(&frame);
        }
        if self.focused == Some(window) {
            self.focused = None;
        }
    }
}

struct DesiredLeaf {
    leaf: ContainerId,
    window: XWindowId,
    frame: Option<XWindowId>,
    rect: Rect,
    window_rect: Rect,
    visible: bool,
}

/// Everything a settled tree implies for the server, in one pass.
pub fn push(
    x: &XConn,
    tree: &mut Tree,
    state: &mut PushState,
    ignore: &mut IgnoreTable,
    time: u32,
) {
    let desired = collect_desired(tree);

    for entry in &desired {
        if entry.visible {
            push_geometry(x, state, ignore, entry);
        }
    }
    // unmap before map so a window moving between workspaces never flickers
    for entry in &desired {
        if !entry.visible && state.visible.contains(&entry.window) {
            hide(x, tree, state, ignore, entry);
        }
    }
    for entry in &desired {
        if entry.visible && !state.visible.contains(&entry.window) {
            show(x, state, ignore, entry);
        }
    }

    push_focus(x, tree, state, time);
    push_root_properties(x, tree, state, &desired);

    if let Err(e) = x.flush() {
        warn!(error = %e, "flush failed");
    }
}

fn collect_desired(tree: &Tree) -> Vec<DesiredLeaf> {
    let global_fullscreen = tree
        .map
        .iter()
        .find(|(_, c)| {
            c.fullscreen_mode == FullscreenMode::Global && c.kind != ContainerKind::Workspace
        })
        .map(|(id, _)| id);

    let mut desired = Vec::new();
    for leaf in tree.leaves_under(tree.root) {
        let Some(window) = tree.map[leaf].window.as_ref() else { continue };
        let ws = tree.workspace_of(leaf);
        let in_dock = tree.ancestor_of_kind(leaf, ContainerKind::Dockarea).is_some();
        let mut visible = match ws {
            Some(ws) => tree.workspace_is_visible(ws),
            None => in_dock,
        };
        if let Some(fullscreen) = global_fullscreen {
            visible = tree.is_ancestor(fullscreen, leaf) || in_dock;
        }
        desired.push(DesiredLeaf {
            leaf,
            window: window.id,
            frame: window.frame,
            rect: tree.map[leaf].rect,
            window_rect: tree.map[leaf].window_rect,
            visible,
        });
    }
    desired
}

fn push_geometry(x: &XConn, state: &mut PushState, ignore: &mut IgnoreTable, entry: &DesiredLeaf) {
    if let Some(frame) = entry.frame {
        if state.frame_rects.get(&frame) != Some(&entry.rect) {
            match x.configure(frame, entry.rect) {
                Ok(sequence) => {
                    ignore.insert(sequence, None);
                    state.frame_rects.insert(frame, entry.rect);
                }
                Err(e) => warn!(frame, error = %e, "frame configure failed"),
            }
        }
        // the client sits inside the frame, in frame coordinates
        let inner = Rect::new(
            entry.window_rect.x - entry.rect.x,
            entry.window_rect.y - entry.rect.y,
            entry.window_rect.width,
            entry.window_rect.height,
        );
        if state.client_rects.get(&entry.window) != Some(&inner) {
            match x.configure(entry.window, inner) {
                Ok(sequence) => {
                    ignore.insert(sequence, None);
                    state.client_rects.insert(entry.window, inner);
                }
                Err(e) => warn!(window = entry.window, error = %e, "client configure failed"),
            }
        }
    } else if state.client_rects.get(&entry.window) != Some(&entry.window_rect) {
        // frameless (dock) clients are configured in root coordinates
        match x.configure(entry.window, entry.window_rect) {
            Ok(sequence) => {
                ignore.insert(sequence, None);
                state.client_rects.insert(entry.window, entry.window_rect);
            }
            Err(e) => warn!(window = entry.window, error = %e, "dock configure failed"),
        }
    }
}

fn show(x: &XConn, state: &mut PushState, ignore: &mut IgnoreTable, entry: &DesiredLeaf) {
    trace!(window = entry.window, "mapping");
    if let Some(frame) = entry.frame {
        match x.map(frame) {
            Ok(sequence) => ignore.insert(sequence, None),
            Err(e) => warn!(frame, error = %e, "frame map failed"),
        }
    }
    match x.map(entry.window) {
        Ok(sequence) => {
            ignore.insert(sequence, None);
            state.visible.insert(entry.window);
        }
        Err(e) => warn!(window = entry.window, error = %e, "map failed"),
    }
}

fn hide(
    x: &XConn,
    tree: &mut Tree,
    state: &mut PushState,
    ignore: &mut IgnoreTable,
    entry: &DesiredLeaf,
) {
    trace!(window = entry.window, "unmapping");
    match x.unmap(entry.window) {
        Ok(sequence) => {
            // this unmap is ours; the notify must not close the leaf
            tree.map[entry.leaf].ignore_unmap += 1;
            ignore.insert(sequence, None);
            state.visible.remove(&entry.window);
        }
        Err(e) => warn!(window = entry.window, error = %e, "unmap failed"),
    }
    if let Some(frame) = entry.frame {
        match x.unmap(frame) {
            Ok(sequence) => ignore.insert(sequence, None),
            Err(e) => warn!(frame, error = %e, "frame unmap failed"),
        }
    }
}

fn push_focus(x: &XConn, tree: &Tree, state: &mut PushState, time: u32) {
    let focused_leaf = tree.focused;
    let target = tree.map.get(focused_leaf).and_then(|c| c.window.as_ref());
    let target_id = target.map(|w| w.id);
    if state.focused == target_id {
        return;
    }
    match target {
        Some(window) => {
            match window.focus_action() {
                FocusAction::SetInput => {
                    if let Err(e) = x.set_input_focus(window.id) {
                        warn!(window = window.id, error = %e, "SetInputFocus failed");
                        return;
                    }
                }
                FocusAction::TakeFocus => {
                    if let Err(e) = x.send_take_focus(window.id, time) {
                        warn!(window = window.id, error = %e, "WM_TAKE_FOCUS failed");
                        return;
                    }
                }
            }
            // raise the frame so the focused window is on top of its stack
            if let Some(frame) = window.frame {
                x.raise(frame).ok();
            }
        }
        None => {
            x.set_input_focus(x.root).ok();
        }
    }
    state.focused = target_id;
    x.set_active_window(target_id).ok();
}

fn push_root_properties(x: &XConn, tree: &Tree, state: &mut PushState, desired: &[DesiredLeaf]) {
    let clients: Vec<XWindowId> = desired.iter().map(|d| d.window).collect();
    if clients != state.client_list {
        x.set_client_list(&clients).ok();
        state.client_list = clients;
    }

    let order = tree.workspaces_in_order(None);
    let current = tree
        .workspace_of(tree.focused)
        .and_then(|ws| order.iter().position(|&w| w == ws))
        .map(|i| i as u32);
    if current != state.current_desktop {
        if let Some(index) = current {
            x.set_current_desktop(index).ok();
        }
        state.current_desktop = current;
    }

    let workareas: Vec<Rect> = order
        .iter()
        .filter_map(|&ws| tree.output_of(ws))
        .filter_map(|output| tree.content_of(output))
        .map(|content| tree.map[content].rect)
        .collect();
    x.set_workarea(&workareas).ok();
}
