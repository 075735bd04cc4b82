//! The container tree: one arena owning every node, from the root down to
//! individual windows. Parent links are plain keys into the arena, never
//! owning references.
//!
//! Mutations push their externally visible consequences (window close
//! requests, IPC events) into an effect queue drained by the reactor after
//! each batch. The tree itself never talks to X.

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use thiserror::Error;
use tracing::debug;

use crate::common::collections::HashMap;
use crate::common::config::Config;
use crate::model::geometry::Rect;
use crate::model::window::{WindowInfo, XWindowId};

slotmap::new_key_type! { pub struct ContainerId; }

impl ContainerId {
    /// Stable numeric form used in IPC payloads.
    pub fn as_u64(self) -> u64 {
        slotmap::Key::data(&self).as_ffi()
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    Root,
    Output,
    Content,
    Dockarea,
    Workspace,
    Split,
    Leaf,
    FloatingWrapper,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    #[default]
    Split,
    Stacked,
    Tabbed,
    Dockarea,
    Output,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Unset,
    Horizontal,
    Vertical,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FullscreenMode {
    #[default]
    None,
    /// Covers one output. On workspaces this doubles as "currently visible".
    Output,
    Global,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FloatingState {
    #[default]
    AutoOff,
    UserOff,
    AutoOn,
    UserOn,
}

impl FloatingState {
    pub fn is_floating(self) -> bool {
        self >= FloatingState::AutoOn
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KillPolicy {
    /// Just unmanage; the X window is already gone or should survive.
    None,
    /// Ask politely via `WM_DELETE_WINDOW` (fall back to killing).
    Window,
    /// `KillClient` the whole connection.
    Client,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(clippy::enum_variant_names)]
pub enum WorkspaceChange {
    Init,
    Focus,
    Empty,
    Urgent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowChange {
    New,
    Close,
    Focus,
    Title,
    FullscreenMode,
    Move,
    Urgent,
}

/// Externally visible consequence of a tree mutation, drained by the
/// reactor after each command/event batch.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    CloseWindow {
        window: XWindowId,
        frame: Option<XWindowId>,
        policy: KillPolicy,
        supports_delete: bool,
    },
    WorkspaceEvent {
        change: WorkspaceChange,
        name: String,
    },
    WindowEvent {
        change: WindowChange,
        window: XWindowId,
    },
    OutputEvent,
    ModeEvent {
        name: String,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TreeError {
    #[error("a {child:?} container cannot be attached to a {parent:?} container")]
    InvalidAttach {
        child: ContainerKind,
        parent: ContainerKind,
    },
    #[error("container is not attached to a parent")]
    Detached,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Container {
    pub parent: Option<ContainerId>,
    pub kind: ContainerKind,
    pub orientation: Orientation,
    pub layout: Layout,
    pub rect: Rect,
    pub window_rect: Rect,
    pub deco_rect: Rect,
    /// Client-requested geometry, kept for floating placement.
    pub geometry: Rect,
    pub percent: f64,
    /// Tiling children in spatial order.
    pub children: Vec<ContainerId>,
    /// Direct children (tiling and floating) in most-recently-focused order.
    pub focus_stack: Vec<ContainerId>,
    /// Floating wrappers; only populated on workspaces.
    pub floating_children: Vec<ContainerId>,
    pub fullscreen_mode: FullscreenMode,
    pub floating: FloatingState,
    pub urgent: bool,
    pub sticky_group: Option<String>,
    pub mark: Option<String>,
    /// For floating wrappers: the tiling sibling to return next to when
    /// floating is disabled.
    #[serde(default)]
    pub tiling_anchor: Option<ContainerId>,
    pub name: String,
    /// Parsed leading decimal of a workspace name, -1 otherwise.
    pub num: i32,
    /// Pending self-caused UnmapNotify events to swallow.
    pub ignore_unmap: u32,
    pub window: Option<WindowInfo>,
}

impl Container {
    fn new(kind: ContainerKind) -> Self {
        Self {
            parent: None,
            kind,
            orientation: Orientation::Unset,
            layout: match kind {
                ContainerKind::Output => Layout::Output,
                ContainerKind::Dockarea => Layout::Dockarea,
                _ => Layout::Split,
            },
            rect: Rect::default(),
            window_rect: Rect::default(),
            deco_rect: Rect::default(),
            geometry: Rect::default(),
            percent: 0.0,
            children: Vec::new(),
            focus_stack: Vec::new(),
            floating_children: Vec::new(),
            fullscreen_mode: FullscreenMode::None,
            floating: FloatingState::AutoOff,
            urgent: false,
            sticky_group: None,
            mark: None,
            tiling_anchor: None,
            name: String::new(),
            num: -1,
            ignore_unmap: 0,
            window: None,
        }
    }

    pub fn is_floating(&self) -> bool {
        self.floating.is_floating()
    }

    pub fn is_leaf(&self) -> bool {
        self.kind == ContainerKind::Leaf
    }
}

/// Parse the workspace number from a leading decimal, i3-style.
pub fn workspace_num(name: &str) -> i32 {
    let digits: &str = &name[..name.len() - name.trim_start_matches(|c: char| c.is_ascii_digit()).len()];
    if digits.is_empty() {
        return -1;
    }
    digits.parse().unwrap_or(-1)
}

#[derive(Serialize, Deserialize)]
pub struct Tree {
    pub map: SlotMap<ContainerId, Container>,
    pub root: ContainerId,
    /// The focused container; following focus-stack heads from the root
    /// always reaches it.
    pub focused: ContainerId,
    /// Back-and-forth memory: the workspace we most recently switched away
    /// from.
    pub previous_workspace: Option<String>,
    /// Most recently scratched containers, head = newest.
    pub scratchpad_order: Vec<ContainerId>,
    #[serde(skip)]
    pub effects: Vec<Effect>,
    #[serde(skip)]
    by_window: HashMap<XWindowId, ContainerId>,
    #[serde(skip)]
    by_frame: HashMap<XWindowId, ContainerId>,
}

impl Tree {
    /// A tree with the root and the synthetic `__i3` output (which carries
    /// the scratchpad workspace and is never rendered).
    pub fn new() -> Self {
        let mut map = SlotMap::with_key();
        let root = map.insert(Container::new(ContainerKind::Root));
        map[root].name = "root".to_string();
        let mut tree = Self {
            map,
            root,
            focused: root,
            previous_workspace: None,
            scratchpad_order: Vec::new(),
            effects: Vec::new(),
            by_window: HashMap::default(),
            by_frame: HashMap::default(),
        };
        let internal = tree.add_output("__i3", Rect::default());
        let content = tree.content_of(internal).unwrap();
        let scratch = tree.new_container(ContainerKind::Workspace);
        tree.map[scratch].name = "__i3_scratch".to_string();
        tree.attach(scratch, content, false).unwrap();
        tree
    }

    pub fn new_container(&mut self, kind: ContainerKind) -> ContainerId {
        self.map.insert(Container::new(kind))
    }

    /// Create an output container with its dockareas and content slot.
    pub fn add_output(&mut self, name: &str, rect: Rect) -> ContainerId {
        let output = self.new_container(ContainerKind::Output);
        self.map[output].name = name.to_string();
        self.map[output].rect = rect;
        self.attach(output, self.root, false).unwrap();
        if name != "__i3" {
            let top = self.new_container(ContainerKind::Dockarea);
            self.map[top].name = "topdock".to_string();
            self.attach(top, output, false).unwrap();
        }
        let content = self.new_container(ContainerKind::Content);
        self.map[content].name = "content".to_string();
        self.attach(content, output, false).unwrap();
        if name != "__i3" {
            let bottom = self.new_container(ContainerKind::Dockarea);
            self.map[bottom].name = "bottomdock".to_string();
            self.attach(bottom, output, false).unwrap();
        }
        self.effects.push(Effect::OutputEvent);
        output
    }

    pub fn content_of(&self, output: ContainerId) -> Option<ContainerId> {
        self.map[output]
            .children
            .iter()
            .copied()
            .find(|c| self.map[*c].kind == ContainerKind::Content)
    }

    pub fn dockarea_of(&self, output: ContainerId, top: bool) -> Option<ContainerId> {
        let name = if top { "topdock" } else { "bottomdock" };
        self.map[output]
            .children
            .iter()
            .copied()
            .find(|c| self.map[*c].kind == ContainerKind::Dockarea && self.map[*c].name == name)
    }

    fn can_attach(child: ContainerKind, parent: ContainerKind) -> bool {
        use ContainerKind::*;
        match parent {
            Root => child == Output,
            Output => matches!(child, Dockarea | Content),
            Content => child == Workspace,
            Dockarea => child == Leaf,
            Workspace => matches!(child, Split | Leaf | FloatingWrapper),
            Split => matches!(child, Split | Leaf),
            FloatingWrapper => matches!(child, Split | Leaf),
            Leaf => false,
        }
    }

    /// Insert `child` under `parent` (tail unless `at_head`), rebalance the
    /// siblings' percentages and append to the parent's focus stack.
    pub fn attach(
        &mut self,
        child: ContainerId,
        parent: ContainerId,
        at_head: bool,
    ) -> Result<(), TreeError> {
        let child_kind = self.map[child].kind;
        let parent_kind = self.map[parent].kind;
        if !Self::can_attach(child_kind, parent_kind) {
            return Err(TreeError::InvalidAttach { child: child_kind, parent: parent_kind });
        }
        debug_assert!(self.map[child].parent.is_none(), "attach of an attached container");

        self.map[child].parent = Some(parent);
        if child_kind == ContainerKind::FloatingWrapper {
            self.map[parent].floating_children.push(child);
        } else {
            if at_head {
                self.map[parent].children.insert(0, child);
            } else {
                self.map[parent].children.push(child);
            }
            self.map[child].percent = 0.0;
            if tiles(parent_kind) {
                self.fix_percent(parent);
            }
        }
        self.map[parent].focus_stack.push(child);
        Ok(())
    }

    /// Insert `child` at a specific position among `parent`'s tiling
    /// children.
    pub fn attach_at(
        &mut self,
        child: ContainerId,
        parent: ContainerId,
        index: usize,
    ) -> Result<(), TreeError> {
        self.attach(child, parent, false)?;
        let children = &mut self.map[parent].children;
        if let Some(cur) = children.iter().position(|&c| c == child) {
            let id = children.remove(cur);
            let index = index.min(children.len());
            children.insert(index, id);
        }
        Ok(())
    }

    /// Insert `child` directly after `after` under the same parent.
    pub fn attach_after(
        &mut self,
        child: ContainerId,
        after: ContainerId,
    ) -> Result<(), TreeError> {
        let parent = self.map[after].parent.ok_or(TreeError::Detached)?;
        self.attach(child, parent, false)?;
        let children = &mut self.map[parent].children;
        if let (Some(cur), Some(anchor)) = (
            children.iter().position(|&c| c == child),
            children.iter().position(|&c| c == after),
        ) {
            let id = children.remove(cur);
            children.insert(anchor + 1, id);
        }
        Ok(())
    }

    /// Remove `child` from its parent, sharing the freed percentage among
    /// the remaining siblings. Does not destroy the container.
    pub fn detach(&mut self, child: ContainerId) -> Result<ContainerId, TreeError> {
        let parent = self.map[child].parent.ok_or(TreeError::Detached)?;
        let was_tiling = self.map[child].kind != ContainerKind::FloatingWrapper;
        self.map[parent].children.retain(|&c| c != child);
        self.map[parent].floating_children.retain(|&c| c != child);
        self.map[parent].focus_stack.retain(|&c| c != child);
        self.map[child].parent = None;
        self.map[child].percent = 0.0;
        if was_tiling && tiles(self.map[parent].kind) && !self.map[parent].children.is_empty() {
            self.fix_percent(parent);
        }
        Ok(parent)
    }

    /// Splice `new` into `old`'s position, taking over its percentage and
    /// focus-stack slot. `old` is left detached.
    pub fn replace(&mut self, old: ContainerId, new: ContainerId) -> Result<(), TreeError> {
        let parent = self.map[old].parent.ok_or(TreeError::Detached)?;
        let percent = self.map[old].percent;
        let child_pos = self.map[parent].children.iter().position(|&c| c == old);
        let float_pos = self.map[parent].floating_children.iter().position(|&c| c == old);
        let focus_pos = self.map[parent].focus_stack.iter().position(|&c| c == old);

        if let Some(pos) = child_pos {
            self.map[parent].children[pos] = new;
        }
        if let Some(pos) = float_pos {
            self.map[parent].floating_children[pos] = new;
        }
        if let Some(pos) = focus_pos {
            self.map[parent].focus_stack[pos] = new;
        }
        self.map[old].parent = None;
        self.map[old].percent = 0.0;
        self.map[new].parent = Some(parent);
        self.map[new].percent = percent;
        Ok(())
    }

    /// Normalize the tiling children of `parent` so their percentages sum
    /// to 1. Children without a share get a fair one first; rounding error
    /// lands in the last child.
    pub fn fix_percent(&mut self, parent: ContainerId) {
        let children = self.map[parent].children.clone();
        if children.is_empty() {
            return;
        }
        let mut total = 0.0;
        let mut with_percent = 0usize;
        for &c in &children {
            let p = self.map[c].percent;
            if p > 0.0 {
                total += p;
                with_percent += 1;
            }
        }
        if with_percent != children.len() {
            for &c in &children {
                if self.map[c].percent <= 0.0 {
                    let share = if with_percent == 0 { 1.0 } else { total / with_percent as f64 };
                    self.map[c].percent = share;
                    total += share;
                }
            }
        }
        if total <= 0.0 {
            let equal = 1.0 / children.len() as f64;
            for &c in &children {
                self.map[c].percent = equal;
            }
        } else {
            for &c in &children {
                self.map[c].percent /= total;
            }
        }
        let sum: f64 = children.iter().map(|&c| self.map[c].percent).sum();
        let last = *children.last().unwrap();
        self.map[last].percent += 1.0 - sum;
    }

    /// Follow focus-stack heads from `from` down to a leaf or an empty
    /// container.
    pub fn descend_focused(&self, from: ContainerId) -> ContainerId {
        let mut current = from;
        while let Some(&next) = self.map[current].focus_stack.first() {
            current = next;
        }
        current
    }

    pub fn ancestor_of_kind(&self, node: ContainerId, kind: ContainerKind) -> Option<ContainerId> {
        let mut current = Some(node);
        while let Some(id) = current {
            if self.map[id].kind == kind {
                return Some(id);
            }
            current = self.map[id].parent;
        }
        None
    }

    pub fn workspace_of(&self, node: ContainerId) -> Option<ContainerId> {
        self.ancestor_of_kind(node, ContainerKind::Workspace)
    }

    pub fn output_of(&self, node: ContainerId) -> Option<ContainerId> {
        self.ancestor_of_kind(node, ContainerKind::Output)
    }

    pub fn is_ancestor(&self, ancestor: ContainerId, node: ContainerId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.map[id].parent;
        }
        false
    }

    /// A workspace is visible when it holds its output's visibility slot.
    pub fn workspace_is_visible(&self, workspace: ContainerId) -> bool {
        self.map[workspace].kind == ContainerKind::Workspace
            && self.map[workspace].fullscreen_mode == FullscreenMode::Output
            && self.map[workspace].parent.is_some()
    }

    pub fn visible_workspace_on(&self, output: ContainerId) -> Option<ContainerId> {
        let content = self.content_of(output)?;
        self.map[content]
            .children
            .iter()
            .copied()
            .find(|&ws| self.map[ws].fullscreen_mode == FullscreenMode::Output)
    }

    /// Every leaf under `node`, tiling before floating, in tree order.
    pub fn leaves_under(&self, node: ContainerId) -> Vec<ContainerId> {
        let mut leaves = Vec::new();
        self.collect_leaves(node, &mut leaves);
        leaves
    }

    fn collect_leaves(&self, node: ContainerId, out: &mut Vec<ContainerId>) {
        if self.map[node].is_leaf() {
            out.push(node);
            return;
        }
        for &child in &self.map[node].children {
            self.collect_leaves(child, out);
        }
        for &child in &self.map[node].floating_children {
            self.collect_leaves(child, out);
        }
    }

    pub fn all_workspaces(&self) -> Vec<ContainerId> {
        let mut out = Vec::new();
        for &output in &self.map[self.root].children {
            if let Some(content) = self.content_of(output) {
                out.extend(self.map[content].children.iter().copied());
            }
        }
        out
    }

    pub fn leaf_by_window(&self, window: XWindowId) -> Option<ContainerId> {
        self.by_window.get(&window).copied()
    }

    pub fn leaf_by_frame(&self, frame: XWindowId) -> Option<ContainerId> {
        self.by_frame.get(&frame).copied()
    }

    /// Bind a window descriptor to a leaf and index it.
    pub fn set_window(&mut self, leaf: ContainerId, window: WindowInfo) {
        debug_assert_eq!(self.map[leaf].kind, ContainerKind::Leaf);
        self.by_window.insert(window.id, leaf);
        if let Some(frame) = window.frame {
            self.by_frame.insert(frame, leaf);
        }
        self.map[leaf].name = window.title.clone();
        self.map[leaf].urgent = window.urgent;
        self.map[leaf].geometry = window.geometry;
        self.map[leaf].window = Some(window);
    }

    /// Re-derive the window and frame indexes, used after a snapshot load.
    pub fn reindex_windows(&mut self) {
        self.by_window.clear();
        self.by_frame.clear();
        let leaves: Vec<ContainerId> = self
            .map
            .iter()
            .filter(|(_, c)| c.window.is_some())
            .map(|(id, _)| id)
            .collect();
        for leaf in leaves {
            let window = self.map[leaf].window.clone().unwrap();
            self.by_window.insert(window.id, leaf);
            if let Some(frame) = window.frame {
                self.by_frame.insert(frame, leaf);
            }
        }
    }

    /// Recursive teardown. Emits close requests for every window in the
    /// subtree, detaches and frees it, collapses emptied splits, and prunes
    /// the workspace when this removed its last content.
    pub fn close(&mut self, id: ContainerId, policy: KillPolicy, dont_kill_parent: bool) {
        let children: Vec<ContainerId> = self.map[id]
            .children
            .iter()
            .chain(self.map[id].floating_children.iter())
            .copied()
            .collect();
        for child in children {
            self.close(child, policy, true);
        }

        if let Some(window) = self.map[id].window.take() {
            self.by_window.remove(&window.id);
            if let Some(frame) = window.frame {
                self.by_frame.remove(&frame);
            }
            self.effects.push(Effect::CloseWindow {
                window: window.id,
                frame: window.frame,
                policy,
                supports_delete: window.supports_delete,
            });
            self.effects.push(Effect::WindowEvent {
                change: WindowChange::Close,
                window: window.id,
            });
        }

        let refocus = self.is_ancestor(id, self.focused);
        let parent = self.map[id].parent;
        if parent.is_some() {
            self.detach(id).expect("attached container");
        }
        self.scratchpad_order.retain(|&c| c != id);
        self.map.remove(id);
        debug!(?id, "closed container");

        let Some(parent) = parent else { return };
        if refocus {
            self.focused = self.descend_focused(parent);
        }

        match self.map[parent].kind {
            ContainerKind::Split if !dont_kill_parent => {
                if self.map[parent].children.is_empty() {
                    self.close(parent, KillPolicy::None, false);
                } else {
                    self.maybe_collapse(parent);
                }
            }
            ContainerKind::Workspace => {
                if self.map[parent].children.is_empty()
                    && self.map[parent].floating_children.is_empty()
                    && !self.workspace_is_visible(parent)
                    && self.workspace_is_prunable(parent)
                {
                    self.effects.push(Effect::WorkspaceEvent {
                        change: WorkspaceChange::Empty,
                        name: self.map[parent].name.clone(),
                    });
                    self.close(parent, KillPolicy::None, false);
                }
            }
            _ => {}
        }
    }

    /// Auto-created (numbered) workspaces vanish when empty; user-named and
    /// internal ones stay.
    pub fn workspace_is_prunable(&self, workspace: ContainerId) -> bool {
        let con = &self.map[workspace];
        con.num >= 0 && !con.name.starts_with("__")
    }

    /// The reduction rule: a non-workspace split with exactly one child is
    /// replaced by that child.
    pub fn maybe_collapse(&mut self, split: ContainerId) {
        if self.map[split].kind != ContainerKind::Split {
            return;
        }
        if self.map[split].children.len() != 1 {
            return;
        }
        let only = self.map[split].children[0];
        // lift the child out, then splice it into the split's slot
        self.map[split].children.clear();
        self.map[split].focus_stack.clear();
        self.map[only].parent = None;
        if self.replace(split, only).is_ok() {
            let focused_here = self.focused == split;
            self.map.remove(split);
            if focused_here {
                self.focused = self.descend_focused(only);
            }
        }
    }

    /// Reduce redundant single-child splits. A split whose only child is
    /// another split is flattened; a split holding one leaf survives only
    /// as a passthrough encoding a pending split direction, i.e. when its
    /// orientation differs from its parent's. Returns true when anything
    /// changed, so callers can iterate to a fixed point.
    fn reduce_splits(&mut self) -> bool {
        let singles: Vec<ContainerId> = self
            .map
            .iter()
            .filter(|(_, c)| c.kind == ContainerKind::Split && c.children.len() == 1)
            .map(|(id, _)| id)
            .collect();
        let mut changed = false;
        for split in singles {
            if !self.map.contains_key(split) {
                continue;
            }
            let only = self.map[split].children[0];
            let redundant = if self.map[only].kind == ContainerKind::Split {
                true
            } else {
                match self.map[split].parent {
                    Some(parent) => self.map[parent].orientation == self.map[split].orientation,
                    None => false,
                }
            };
            if redundant {
                self.maybe_collapse(split);
                changed = true;
            }
        }
        changed
    }

    /// Recompute the urgent bit bottom-up for the path from `node` to the
    /// root. Leaves derive it from their window; inner nodes from children.
    pub fn propagate_urgency(&mut self, node: ContainerId) {
        let mut current = Some(node);
        while let Some(id) = current {
            let derived = if self.map[id].is_leaf() {
                self.map[id].window.as_ref().is_some_and(|w| w.urgent)
            } else {
                let con = &self.map[id];
                con.children
                    .iter()
                    .chain(con.floating_children.iter())
                    .any(|&c| self.map[c].urgent)
            };
            let changed = self.map[id].urgent != derived;
            self.map[id].urgent = derived;
            if changed && self.map[id].kind == ContainerKind::Workspace {
                self.effects.push(Effect::WorkspaceEvent {
                    change: WorkspaceChange::Urgent,
                    name: self.map[id].name.clone(),
                });
            }
            current = self.map[id].parent;
        }
    }

    /// The settle step: runs after every event/command batch, restoring the
    /// structural invariants before anything is pushed out to X.
    pub fn settle(&mut self, config: &Config) {
        while self.reduce_splits() {}

        let parents: Vec<ContainerId> = self
            .map
            .iter()
            .filter(|(_, c)| tiles(c.kind) && !c.children.is_empty())
            .map(|(id, _)| id)
            .collect();
        for parent in parents {
            self.fix_percent(parent);
        }

        // prune empty, invisible, auto-named workspaces
        let prunable: Vec<ContainerId> = self
            .all_workspaces()
            .into_iter()
            .filter(|&ws| {
                self.map[ws].children.is_empty()
                    && self.map[ws].floating_children.is_empty()
                    && !self.workspace_is_visible(ws)
                    && self.workspace_is_prunable(ws)
            })
            .collect();
        for ws in prunable {
            if self.map.contains_key(ws) {
                self.effects.push(Effect::WorkspaceEvent {
                    change: WorkspaceChange::Empty,
                    name: self.map[ws].name.clone(),
                });
                self.close(ws, KillPolicy::None, false);
            }
        }

        let leaves: Vec<ContainerId> = self
            .map
            .iter()
            .filter(|(_, c)| c.is_leaf())
            .map(|(id, _)| id)
            .collect();
        for leaf in leaves {
            self.propagate_urgency(leaf);
        }

        self.render(config);
    }

    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Structural health check used by tests; returns one message per
    /// violated invariant.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        for (id, con) in self.map.iter() {
            for &child in con.children.iter().chain(con.floating_children.iter()) {
                match self.map.get(child) {
                    None => issues.push(format!("{id:?} references freed child {child:?}")),
                    Some(c) => {
                        if c.parent != Some(id) {
                            issues.push(format!("{child:?} has stale parent link"));
                        }
                        if !Self::can_attach(c.kind, con.kind) {
                            issues.push(format!(
                                "kind discipline violated: {:?} under {:?}",
                                c.kind, con.kind
                            ));
                        }
                    }
                }
            }
            if con.is_leaf()
                && con.window.is_none()
                && con.parent.is_some()
                && con.sticky_group.is_none()
            {
                issues.push(format!("leaf {id:?} without a window"));
            }
            if !con.children.is_empty() && tiles(con.kind) {
                let sum: f64 = con.children.iter().map(|&c| self.map[c].percent).sum();
                if (sum - 1.0).abs() > 1e-6 {
                    issues.push(format!("{id:?} children percents sum to {sum}"));
                }
            }
            if con.kind == ContainerKind::Split && con.children.len() < 2 && con.parent.is_some() {
                let passthrough = con.children.len() == 1
                    && self.map[con.children[0]].kind != ContainerKind::Split
                    && con
                        .parent
                        .is_some_and(|p| self.map[p].orientation != con.orientation);
                if !passthrough {
                    issues.push(format!("{id:?} is a split with {} children", con.children.len()));
                }
            }
            for &child in &con.focus_stack {
                if !self.map.contains_key(child) {
                    issues.push(format!("{id:?} focus stack references freed {child:?}"));
                }
            }
        }
        // exactly one visible workspace per output with content
        for &output in &self.map[self.root].children {
            if let Some(content) = self.content_of(output) {
                let visible = self.map[content]
                    .children
                    .iter()
                    .filter(|&&ws| self.map[ws].fullscreen_mode == FullscreenMode::Output)
                    .count();
                if visible > 1 {
                    issues.push(format!(
                        "output {} has {visible} visible workspaces",
                        self.map[output].name
                    ));
                }
            }
        }
        if !self.map.contains_key(self.focused) {
            issues.push("focused container was freed".to_string());
        }
        issues
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

/// Kinds whose tiling children carry percentages.
fn tiles(kind: ContainerKind) -> bool {
    matches!(kind, ContainerKind::Workspace | ContainerKind::Split | ContainerKind::FloatingWrapper)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::window::WindowInfo;

    /// One output, one visible workspace, nothing else.
    pub(crate) fn tree_with_workspace(name: &str) -> (Tree, ContainerId, ContainerId) {
        let mut tree = Tree::new();
        let output = tree.add_output("fake-0", Rect::new(0, 0, 1024, 768));
        let content = tree.content_of(output).unwrap();
        let ws = tree.new_container(ContainerKind::Workspace);
        tree.map[ws].name = name.to_string();
        tree.map[ws].num = workspace_num(name);
        tree.map[ws].fullscreen_mode = FullscreenMode::Output;
        tree.map[ws].orientation = Orientation::Horizontal;
        tree.attach(ws, content, false).unwrap();
        tree.focused = ws;
        (tree, output, ws)
    }

    pub(crate) fn open_leaf(tree: &mut Tree, parent: ContainerId, window: XWindowId) -> ContainerId {
        let leaf = tree.new_container(ContainerKind::Leaf);
        tree.attach(leaf, parent, false).unwrap();
        tree.set_window(leaf, WindowInfo::new(window));
        tree.focused = leaf;
        leaf
    }

    #[test]
    fn workspace_num_parses_leading_decimal() {
        assert_eq!(workspace_num("5"), 5);
        assert_eq!(workspace_num("10: mail"), 10);
        assert_eq!(workspace_num("web"), -1);
        assert_eq!(workspace_num(""), -1);
        assert_eq!(workspace_num("__i3_scratch"), -1);
    }

    #[test]
    fn attach_gives_fair_share() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let a = open_leaf(&mut tree, ws, 1);
        assert!((tree.map[a].percent - 1.0).abs() < 1e-6);
        let b = open_leaf(&mut tree, ws, 2);
        assert!((tree.map[a].percent - 0.5).abs() < 1e-6);
        assert!((tree.map[b].percent - 0.5).abs() < 1e-6);
        let c = open_leaf(&mut tree, ws, 3);
        for id in [a, b, c] {
            assert!((tree.map[id].percent - 1.0 / 3.0).abs() < 1e-6);
        }
        assert!(tree.validate().is_empty(), "{:?}", tree.validate());
    }

    #[test]
    fn attach_rescales_uneven_shares() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let a = open_leaf(&mut tree, ws, 1);
        let b = open_leaf(&mut tree, ws, 2);
        tree.map[a].percent = 0.25;
        tree.map[b].percent = 0.75;
        let c = open_leaf(&mut tree, ws, 3);
        // the new child takes 1/3; the old 25/75 ratio is preserved
        assert!((tree.map[c].percent - 1.0 / 3.0).abs() < 1e-6);
        assert!((tree.map[a].percent / tree.map[b].percent - 1.0 / 3.0).abs() < 1e-6);
        let sum: f64 = [a, b, c].iter().map(|&i| tree.map[i].percent).sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn detach_redistributes_share() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let a = open_leaf(&mut tree, ws, 1);
        let b = open_leaf(&mut tree, ws, 2);
        let c = open_leaf(&mut tree, ws, 3);
        tree.detach(b).unwrap();
        assert!((tree.map[a].percent - 0.5).abs() < 1e-6);
        assert!((tree.map[c].percent - 0.5).abs() < 1e-6);
    }

    #[test]
    fn kind_discipline_is_enforced() {
        let mut tree = Tree::new();
        let ws = tree.new_container(ContainerKind::Workspace);
        let ws2 = tree.new_container(ContainerKind::Workspace);
        assert_eq!(
            tree.attach(ws2, ws, false),
            Err(TreeError::InvalidAttach {
                child: ContainerKind::Workspace,
                parent: ContainerKind::Workspace
            })
        );
    }

    #[test]
    fn close_collapses_single_child_split() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let split = tree.new_container(ContainerKind::Split);
        tree.map[split].orientation = Orientation::Horizontal;
        tree.attach(split, ws, false).unwrap();
        let a = open_leaf(&mut tree, split, 1);
        let b = open_leaf(&mut tree, split, 2);
        tree.close(b, KillPolicy::None, false);
        // the split collapsed away; the leaf took its slot
        assert_eq!(tree.map[a].parent, Some(ws));
        assert!(!tree.map.contains_key(split));
        assert!(tree.validate().is_empty(), "{:?}", tree.validate());
    }

    #[test]
    fn close_emits_window_requests() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let a = open_leaf(&mut tree, ws, 7);
        tree.take_effects();
        tree.close(a, KillPolicy::Window, false);
        let effects = tree.take_effects();
        assert!(effects.contains(&Effect::CloseWindow {
            window: 7,
            frame: None,
            policy: KillPolicy::Window,
            supports_delete: false,
        }));
        assert!(tree.leaf_by_window(7).is_none());
    }

    #[test]
    fn closing_last_leaf_prunes_invisible_numbered_workspace() {
        let (mut tree, output, ws) = tree_with_workspace("2");
        let content = tree.content_of(output).unwrap();
        let other = tree.new_container(ContainerKind::Workspace);
        tree.map[other].name = "3".to_string();
        tree.map[other].num = 3;
        tree.attach(other, content, false).unwrap();
        let leaf = open_leaf(&mut tree, other, 9);
        tree.focused = tree.descend_focused(ws);
        tree.close(leaf, KillPolicy::None, false);
        assert!(!tree.map.contains_key(other), "invisible empty workspace must be pruned");
    }

    #[test]
    fn visible_empty_workspace_survives() {
        let (mut tree, _, ws) = tree_with_workspace("2");
        let leaf = open_leaf(&mut tree, ws, 9);
        tree.close(leaf, KillPolicy::None, false);
        assert!(tree.map.contains_key(ws));
    }

    #[test]
    fn named_workspace_is_not_pruned() {
        let (mut tree, output, _) = tree_with_workspace("1");
        let content = tree.content_of(output).unwrap();
        let named = tree.new_container(ContainerKind::Workspace);
        tree.map[named].name = "mail".to_string();
        tree.attach(named, content, false).unwrap();
        let leaf = open_leaf(&mut tree, named, 4);
        tree.close(leaf, KillPolicy::None, false);
        assert!(tree.map.contains_key(named));
    }

    #[test]
    fn replace_preserves_percent_and_focus_slot() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let a = open_leaf(&mut tree, ws, 1);
        let _b = open_leaf(&mut tree, ws, 2);
        tree.map[a].percent = 0.3;
        let split = tree.new_container(ContainerKind::Split);
        let focus_pos = tree.map[ws].focus_stack.iter().position(|&c| c == a).unwrap();
        tree.replace(a, split).unwrap();
        assert!((tree.map[split].percent - 0.3).abs() < 1e-9);
        assert_eq!(tree.map[ws].focus_stack[focus_pos], split);
        assert_eq!(tree.map[ws].children[0], split);
    }

    #[test]
    fn settle_reduces_redundant_split_and_renders() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        // same orientation as the workspace: the wrap adds nothing
        let split = tree.new_container(ContainerKind::Split);
        tree.map[split].orientation = Orientation::Horizontal;
        tree.attach(split, ws, false).unwrap();
        let a = open_leaf(&mut tree, split, 1);
        let config = Config::default();
        tree.settle(&config);
        assert_eq!(tree.map[a].parent, Some(ws));
        assert!(!tree.map.contains_key(split));
        assert_eq!(tree.map[a].rect, Rect::new(0, 0, 1024, 768));
        assert!(tree.validate().is_empty(), "{:?}", tree.validate());
    }

    #[test]
    fn settle_keeps_passthrough_split() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        // orientation differs: this split encodes a pending direction
        let split = tree.new_container(ContainerKind::Split);
        tree.map[split].orientation = Orientation::Vertical;
        tree.attach(split, ws, false).unwrap();
        let a = open_leaf(&mut tree, split, 1);
        let config = Config::default();
        tree.settle(&config);
        assert_eq!(tree.map[a].parent, Some(split));
        assert!(tree.map.contains_key(split));
        assert!(tree.validate().is_empty(), "{:?}", tree.validate());
    }
}
