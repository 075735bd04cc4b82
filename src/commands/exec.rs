//! Command execution against the tree. Every batch ends with one settle
//! step; nothing is pushed to X in between.

use tracing::debug;

use super::{
    Command, CommandReply, Criteria, FocusTarget, KillTarget, LayoutArg, MoveTarget, Operation,
    ResizeKind, SideEffect, SplitAxis, ToggleArg, WorkspaceTarget,
};
use crate::common::config::Config;
use crate::model::focus::Direction;
use crate::model::tree::{
    ContainerId, ContainerKind, Effect, FloatingState, FullscreenMode, KillPolicy, Layout,
    Orientation, Tree, WindowChange,
};

/// How far one floating `move <direction>` nudges the wrapper.
const FLOAT_MOVE_STEP: i32 = 10;
/// Tiling shares may not shrink past this fraction.
const MIN_PERCENT: f64 = 0.05;

pub struct Outcome {
    pub replies: Vec<CommandReply>,
    pub side_effects: Vec<SideEffect>,
}

pub fn run(tree: &mut Tree, config: &Config, commands: &[Command]) -> Outcome {
    let mut replies = Vec::new();
    let mut side_effects = Vec::new();
    for command in commands {
        replies.push(run_command(tree, config, command, &mut side_effects));
    }
    tree.settle(config);
    Outcome { replies, side_effects }
}

fn run_command(
    tree: &mut Tree,
    config: &Config,
    command: &Command,
    side_effects: &mut Vec<SideEffect>,
) -> CommandReply {
    for operation in &command.operations {
        // the selection is re-evaluated before every operation; a previous
        // operation may have killed or moved containers
        let selection: Vec<ContainerId> = match &command.criteria {
            Some(criteria) => resolve(tree, criteria),
            None => vec![tree.focused],
        };
        if let Err(message) = apply(tree, config, operation, &selection, side_effects) {
            return CommandReply::err(message);
        }
    }
    CommandReply::ok()
}

/// Enumerate the leaves matching every predicate. An empty result is not
/// an error; the operations simply have nothing to do.
fn resolve(tree: &Tree, criteria: &Criteria) -> Vec<ContainerId> {
    let compile = |pattern: &Option<String>| -> Option<regex::Regex> {
        pattern.as_deref().and_then(|p| regex::Regex::new(p).ok())
    };
    let class = compile(&criteria.class);
    let instance = compile(&criteria.instance);
    let title = compile(&criteria.title);

    tree.leaves_under(tree.root)
        .into_iter()
        .filter(|&leaf| {
            let con = &tree.map[leaf];
            let Some(window) = con.window.as_ref() else { return false };
            if let Some(re) = &class {
                if !re.is_match(&window.class) {
                    return false;
                }
            }
            if let Some(re) = &instance {
                if !re.is_match(&window.instance) {
                    return false;
                }
            }
            if let Some(re) = &title {
                if !re.is_match(&window.title) {
                    return false;
                }
            }
            if let Some(mark) = &criteria.mark {
                if con.mark.as_deref() != Some(mark.as_str()) {
                    return false;
                }
            }
            if let Some(con_id) = criteria.con_id {
                if leaf.as_u64() != con_id {
                    return false;
                }
            }
            if let Some(window_id) = criteria.window_id {
                if window.id != window_id {
                    return false;
                }
            }
            if let Some(urgent) = criteria.urgent {
                if con.urgent != urgent {
                    return false;
                }
            }
            if let Some(floating) = criteria.floating {
                let is_floating = tree
                    .ancestor_of_kind(leaf, ContainerKind::FloatingWrapper)
                    .is_some();
                if is_floating != floating {
                    return false;
                }
            }
            true
        })
        .collect()
}

fn apply(
    tree: &mut Tree,
    config: &Config,
    operation: &Operation,
    selection: &[ContainerId],
    side_effects: &mut Vec<SideEffect>,
) -> Result<(), String> {
    match operation {
        Operation::Focus(target) => apply_focus(tree, config, *target, selection),
        Operation::Move(target) => {
            for &con in selection {
                if tree.map.contains_key(con) {
                    move_container(tree, config, con, target)?;
                }
            }
            Ok(())
        }
        Operation::Resize { kind, direction, px, ppt } => {
            for &con in selection {
                if tree.map.contains_key(con) {
                    resize(tree, con, *kind, *direction, *px, *ppt);
                }
            }
            Ok(())
        }
        Operation::Split(axis) => {
            for &con in selection {
                if tree.map.contains_key(con) {
                    split(tree, con, *axis);
                }
            }
            Ok(())
        }
        Operation::Layout(arg) => {
            for &con in selection {
                if tree.map.contains_key(con) {
                    set_layout(tree, con, *arg);
                }
            }
            Ok(())
        }
        Operation::Floating(arg) => {
            for &con in selection {
                if tree.map.contains_key(con) {
                    toggle_floating(tree, config, con, *arg);
                }
            }
            Ok(())
        }
        Operation::Fullscreen { arg, global } => {
            for &con in selection {
                if tree.map.contains_key(con) {
                    set_fullscreen(tree, con, *arg, *global);
                }
            }
            Ok(())
        }
        Operation::Kill(target) => {
            let policy = match target {
                KillTarget::Window => KillPolicy::Window,
                KillTarget::Client => KillPolicy::Client,
            };
            for &con in selection {
                if tree.map.contains_key(con) && !is_structural(tree, con) {
                    tree.close(con, policy, false);
                }
            }
            Ok(())
        }
        Operation::Mark(name) => {
            // marks are unique; stealing one from another container is fine
            let holders: Vec<ContainerId> = tree
                .map
                .iter()
                .filter(|(_, c)| c.mark.as_deref() == Some(name.as_str()))
                .map(|(id, _)| id)
                .collect();
            for holder in holders {
                tree.map[holder].mark = None;
            }
            if let Some(&con) = selection.first() {
                if tree.map.contains_key(con) {
                    tree.map[con].mark = Some(name.clone());
                }
            }
            Ok(())
        }
        Operation::Unmark => {
            for &con in selection {
                if tree.map.contains_key(con) {
                    tree.map[con].mark = None;
                }
            }
            Ok(())
        }
        Operation::Workspace(target) => apply_workspace(tree, config, target),
        Operation::MoveWorkspaceToOutput(output_name) => {
            let output = tree
                .output_by_name(output_name)
                .ok_or_else(|| format!("no output named \"{output_name}\""))?;
            let ws = tree
                .workspace_of(tree.focused)
                .ok_or_else(|| "focus is not on a workspace".to_string())?;
            tree.move_workspace_to_output(ws, output, config)
                .map_err(|e| e.to_string())
        }
        Operation::ScratchpadShow => {
            tree.scratchpad_show();
            Ok(())
        }
        Operation::Exec(command_line) => {
            side_effects.push(SideEffect::Spawn(command_line.clone()));
            Ok(())
        }
        Operation::Nop => Ok(()),
        Operation::Restart => {
            side_effects.push(SideEffect::Restart);
            Ok(())
        }
        Operation::Reload => {
            side_effects.push(SideEffect::Reload);
            Ok(())
        }
        Operation::Exit => {
            side_effects.push(SideEffect::Exit);
            Ok(())
        }
    }
}

/// Containers the user cannot kill or float directly.
fn is_structural(tree: &Tree, con: ContainerId) -> bool {
    matches!(
        tree.map[con].kind,
        ContainerKind::Root
            | ContainerKind::Output
            | ContainerKind::Content
            | ContainerKind::Dockarea
            | ContainerKind::Workspace
    )
}

fn apply_focus(
    tree: &mut Tree,
    config: &Config,
    target: FocusTarget,
    selection: &[ContainerId],
) -> Result<(), String> {
    match target {
        FocusTarget::This => {
            if let Some(&con) = selection.first() {
                if tree.map.contains_key(con) {
                    if let Some(ws) = tree.workspace_of(con) {
                        if !tree.workspace_is_visible(ws)
                            && !tree.map[ws].name.starts_with("__")
                        {
                            tree.show_workspace(ws, config);
                        }
                    }
                    tree.set_focus(con);
                }
            }
            Ok(())
        }
        FocusTarget::Direction(direction) => {
            tree.focus_direction(direction);
            Ok(())
        }
        FocusTarget::Parent => {
            tree.focus_parent();
            Ok(())
        }
        FocusTarget::Child => {
            tree.focus_child();
            Ok(())
        }
        FocusTarget::Floating => {
            tree.focus_floating();
            Ok(())
        }
        FocusTarget::Tiling => {
            tree.focus_tiling();
            Ok(())
        }
        FocusTarget::ModeToggle => {
            tree.focus_mode_toggle();
            Ok(())
        }
    }
}

fn apply_workspace(
    tree: &mut Tree,
    config: &Config,
    target: &WorkspaceTarget,
) -> Result<(), String> {
    match target {
        WorkspaceTarget::Name(name) => {
            tree.show_workspace_by_name(name, config);
            Ok(())
        }
        WorkspaceTarget::Number(number) => {
            let existing = tree
                .all_workspaces()
                .into_iter()
                .find(|&ws| tree.map[ws].num == *number);
            match existing {
                Some(ws) => tree.show_workspace(ws, config),
                None => tree.show_workspace_by_name(&number.to_string(), config),
            }
            Ok(())
        }
        WorkspaceTarget::BackAndForth => {
            tree.back_and_forth(config);
            Ok(())
        }
        WorkspaceTarget::Next => {
            if let Some(ws) = tree.workspace_next(false) {
                tree.show_workspace(ws, config);
            }
            Ok(())
        }
        WorkspaceTarget::Prev => {
            if let Some(ws) = tree.workspace_prev(false) {
                tree.show_workspace(ws, config);
            }
            Ok(())
        }
        WorkspaceTarget::NextOnOutput => {
            if let Some(ws) = tree.workspace_next(true) {
                tree.show_workspace(ws, config);
            }
            Ok(())
        }
        WorkspaceTarget::PrevOnOutput => {
            if let Some(ws) = tree.workspace_prev(true) {
                tree.show_workspace(ws, config);
            }
            Ok(())
        }
    }
}

fn move_container(
    tree: &mut Tree,
    config: &Config,
    con: ContainerId,
    target: &MoveTarget,
) -> Result<(), String> {
    if is_structural(tree, con) {
        return Ok(());
    }
    match target {
        MoveTarget::Direction(direction) => move_in_direction(tree, config, con, *direction),
        MoveTarget::ToWorkspace(name) => {
            let (ws, _) = tree.workspace_get(name, config);
            move_to_workspace(tree, con, ws)
        }
        MoveTarget::ToWorkspaceNumber(number) => {
            let ws = tree
                .all_workspaces()
                .into_iter()
                .find(|&ws| tree.map[ws].num == *number);
            let ws = match ws {
                Some(ws) => ws,
                None => tree.workspace_get(&number.to_string(), config).0,
            };
            move_to_workspace(tree, con, ws)
        }
        MoveTarget::ToWorkspaceCurrent => {
            let ws = tree
                .workspace_of(tree.focused)
                .ok_or_else(|| "focus is not on a workspace".to_string())?;
            move_to_workspace(tree, con, ws)
        }
        MoveTarget::WorkspaceNext => {
            let ws = tree.workspace_next(false).ok_or("no next workspace")?;
            move_to_workspace(tree, con, ws)
        }
        MoveTarget::WorkspacePrev => {
            let ws = tree.workspace_prev(false).ok_or("no previous workspace")?;
            move_to_workspace(tree, con, ws)
        }
        MoveTarget::ToOutput(name) => {
            let output = tree
                .output_by_name(name)
                .ok_or_else(|| format!("no output named \"{name}\""))?;
            let ws = tree
                .visible_workspace_on(output)
                .ok_or_else(|| format!("output \"{name}\" has no workspace"))?;
            move_to_workspace(tree, con, ws)
        }
        MoveTarget::Scratchpad => {
            tree.set_focus(con);
            tree.scratchpad_move();
            Ok(())
        }
    }
}

/// Detach `con` and clean up what its absence leaves behind: an emptied
/// split closes, a single-child split collapses.
fn detach_and_tidy(tree: &mut Tree, con: ContainerId) -> Result<ContainerId, String> {
    let parent = tree.detach(con).map_err(|e| e.to_string())?;
    tidy(tree, parent);
    Ok(parent)
}

fn tidy(tree: &mut Tree, parent: ContainerId) {
    if !tree.map.contains_key(parent) || tree.map[parent].kind != ContainerKind::Split {
        return;
    }
    if tree.map[parent].children.is_empty() {
        tree.close(parent, KillPolicy::None, false);
    } else {
        tree.maybe_collapse(parent);
    }
}

fn move_to_workspace(tree: &mut Tree, con: ContainerId, ws: ContainerId) -> Result<(), String> {
    let old_ws = tree.workspace_of(con).ok_or("container is not on a workspace")?;
    if old_ws == ws {
        return Ok(());
    }
    let wrapper = tree.ancestor_of_kind(con, ContainerKind::FloatingWrapper);
    let moving = wrapper.unwrap_or(con);
    let source_rect = tree.output_of(old_ws).map(|o| tree.map[o].rect).unwrap_or_default();
    let target_rect = tree.output_of(ws).map(|o| tree.map[o].rect).unwrap_or_default();
    let carried_focus = tree.focused == moving || tree.is_ancestor(moving, tree.focused);

    let old_parent = tree.detach(moving).map_err(|e| e.to_string())?;
    if wrapper.is_some() {
        let rect = tree.map[moving].rect;
        tree.map[moving].rect = crate::model::geometry::translate_between_outputs(
            rect,
            &source_rect,
            &target_rect,
        );
        tree.attach(moving, ws, false).map_err(|e| e.to_string())?;
    } else {
        let (parent, after) = tree.insertion_point(ws);
        match after {
            Some(after) => tree.attach_after(moving, after).map_err(|e| e.to_string())?,
            None => tree.attach(moving, parent, false).map_err(|e| e.to_string())?,
        }
    }
    tidy(tree, old_parent);

    if let Some(window) = tree.map[con].window.as_ref() {
        let window_id = window.id;
        tree.effects.push(Effect::WindowEvent {
            change: WindowChange::Move,
            window: window_id,
        });
    }

    // focus stays on the workspace the container left
    if carried_focus && tree.map.contains_key(old_ws) {
        let fallback = tree.descend_focused(old_ws);
        tree.set_focus(fallback);
    }
    debug!(?con, to = %tree.map[ws].name, "moved container to workspace");
    Ok(())
}

fn move_in_direction(
    tree: &mut Tree,
    config: &Config,
    con: ContainerId,
    direction: Direction,
) -> Result<(), String> {
    // floating containers just get nudged
    if let Some(wrapper) = tree.ancestor_of_kind(con, ContainerKind::FloatingWrapper) {
        let (dx, dy) = match direction {
            Direction::Left => (-FLOAT_MOVE_STEP, 0),
            Direction::Right => (FLOAT_MOVE_STEP, 0),
            Direction::Up => (0, -FLOAT_MOVE_STEP),
            Direction::Down => (0, FLOAT_MOVE_STEP),
        };
        let rect = tree.map[wrapper].rect;
        tree.map[wrapper].rect = rect.translate(dx, dy);
        return Ok(());
    }

    let orientation = direction.orientation();
    let forward = direction.forward();
    let mut branch = con;
    loop {
        let Some(parent) = tree.map[branch].parent else { return Ok(()) };
        let pcon = &tree.map[parent];
        if !matches!(pcon.kind, ContainerKind::Split | ContainerKind::Workspace) {
            return Ok(());
        }
        if pcon.orientation == orientation {
            let pos = pcon
                .children
                .iter()
                .position(|&c| c == branch)
                .ok_or("container lost its parent slot")?;
            let len = pcon.children.len();
            let neighbor = if forward {
                (pos + 1 < len).then(|| pcon.children[pos + 1])
            } else {
                pos.checked_sub(1).map(|i| pcon.children[i])
            };
            if let Some(neighbor) = neighbor {
                return place_next_to(tree, con, parent, branch, neighbor, forward);
            }
            if pcon.kind == ContainerKind::Workspace {
                return move_to_adjacent_output(tree, con, direction);
            }
        } else if pcon.kind == ContainerKind::Workspace {
            return reorient_and_move(tree, config, parent, con, direction);
        }
        branch = parent;
    }
}

/// Move `con` next to (or into) `neighbor` under `parent`.
fn place_next_to(
    tree: &mut Tree,
    con: ContainerId,
    parent: ContainerId,
    branch: ContainerId,
    neighbor: ContainerId,
    forward: bool,
) -> Result<(), String> {
    if branch == con && tree.map[neighbor].kind == ContainerKind::Split {
        // the neighbor is a container: enter it at the near edge
        let old_parent = tree.detach(con).map_err(|e| e.to_string())?;
        tree.attach(con, neighbor, forward).map_err(|e| e.to_string())?;
        tidy(tree, old_parent);
        tree.set_focus(con);
        return Ok(());
    }

    let old_parent = if branch == con {
        tree.detach(con).map_err(|e| e.to_string())?
    } else {
        detach_and_tidy(tree, con)?
    };

    let anchor = if branch == con { neighbor } else { branch };
    if !tree.map.contains_key(anchor) {
        // the branch dissolved while being tidied; fall back to the parent
        tree.attach(con, parent, !forward).map_err(|e| e.to_string())?;
    } else {
        let index = tree.map[parent]
            .children
            .iter()
            .position(|&c| c == anchor)
            .map(|i| if forward { i + 1 } else { i })
            .unwrap_or(0);
        tree.attach_at(con, parent, index).map_err(|e| e.to_string())?;
    }
    if branch == con {
        tidy(tree, old_parent);
    }
    tree.set_focus(con);
    Ok(())
}

/// At the workspace edge: carry the container over to the neighboring
/// output's visible workspace, entering at the far side.
fn move_to_adjacent_output(
    tree: &mut Tree,
    con: ContainerId,
    direction: Direction,
) -> Result<(), String> {
    let Some(output) = tree.output_of(con) else { return Ok(()) };
    let Some(target_output) = tree.output_in_direction(output, direction) else {
        return Ok(());
    };
    let Some(ws) = tree.visible_workspace_on(target_output) else { return Ok(()) };
    let old_parent = tree.detach(con).map_err(|e| e.to_string())?;
    // entering from the left edge when moving right, and vice versa
    tree.attach(con, ws, direction.forward()).map_err(|e| e.to_string())?;
    tidy(tree, old_parent);
    tree.set_focus(con);
    Ok(())
}

/// Moving against the workspace's orientation: wrap the existing children
/// in a split carrying the old orientation, flip the workspace, and place
/// the container on the requested side.
fn reorient_and_move(
    tree: &mut Tree,
    config: &Config,
    ws: ContainerId,
    con: ContainerId,
    direction: Direction,
) -> Result<(), String> {
    let _ = config;
    let only_child = tree.map[ws].children.len() == 1;
    if only_child && tree.map[ws].children[0] == con {
        tree.map[ws].orientation = direction.orientation();
        return Ok(());
    }

    let old_parent = detach_and_tidy(tree, con)?;
    let _ = old_parent;
    let old_orientation = tree.map[ws].orientation;
    let residents = tree.map[ws].children.clone();
    if residents.len() > 1 {
        let split = tree.new_container(ContainerKind::Split);
        tree.map[split].orientation = old_orientation;
        for child in residents {
            tree.detach(child).map_err(|e| e.to_string())?;
            tree.attach(child, split, false).map_err(|e| e.to_string())?;
        }
        tree.attach(split, ws, false).map_err(|e| e.to_string())?;
    }
    tree.map[ws].orientation = direction.orientation();
    tree.attach(con, ws, !direction.forward()).map_err(|e| e.to_string())?;
    tree.set_focus(con);
    Ok(())
}

fn resize(
    tree: &mut Tree,
    con: ContainerId,
    kind: ResizeKind,
    direction: Direction,
    px: u32,
    ppt: u32,
) {
    // floating: pixels, applied to the wrapper rectangle
    if let Some(wrapper) = tree.ancestor_of_kind(con, ContainerKind::FloatingWrapper) {
        let rect = tree.map[wrapper].rect;
        let px = px as i32;
        let sign = if kind == ResizeKind::Grow { 1 } else { -1 };
        let delta = sign * px;
        let mut new = rect;
        match direction {
            Direction::Up => {
                new.y -= delta;
                new.height = (new.height as i32 + delta).max(1) as u32;
            }
            Direction::Down => {
                new.height = (new.height as i32 + delta).max(1) as u32;
            }
            Direction::Left => {
                new.x -= delta;
                new.width = (new.width as i32 + delta).max(1) as u32;
            }
            Direction::Right => {
                new.width = (new.width as i32 + delta).max(1) as u32;
            }
        }
        tree.map[wrapper].rect = new;
        return;
    }

    // tiling: move a share of the parent axis between two adjacent siblings
    let orientation = direction.orientation();
    let mut current = con;
    loop {
        let Some(parent) = tree.map[current].parent else { return };
        let pcon = &tree.map[parent];
        if !matches!(pcon.kind, ContainerKind::Split | ContainerKind::Workspace) {
            return;
        }
        if pcon.orientation == orientation {
            let pos = match pcon.children.iter().position(|&c| c == current) {
                Some(pos) => pos,
                None => return,
            };
            let neighbor = if direction.forward() {
                pcon.children.get(pos + 1).copied()
            } else {
                pos.checked_sub(1).and_then(|i| pcon.children.get(i).copied())
            };
            if let Some(neighbor) = neighbor {
                let delta = ppt as f64 / 100.0;
                let delta = if kind == ResizeKind::Grow { delta } else { -delta };
                let mine = tree.map[current].percent;
                let theirs = tree.map[neighbor].percent;
                // clamp so neither side vanishes
                let delta = delta
                    .min(theirs - MIN_PERCENT)
                    .max(MIN_PERCENT - mine);
                tree.map[current].percent = mine + delta;
                tree.map[neighbor].percent = theirs - delta;
                return;
            }
        }
        current = parent;
    }
}

fn split(tree: &mut Tree, con: ContainerId, axis: SplitAxis) {
    let orientation = match axis {
        SplitAxis::Horizontal => Orientation::Horizontal,
        SplitAxis::Vertical => Orientation::Vertical,
    };
    if tree.map[con].kind == ContainerKind::Workspace {
        tree.map[con].orientation = orientation;
        return;
    }
    if is_structural(tree, con) {
        return;
    }
    let split = tree.new_container(ContainerKind::Split);
    tree.map[split].orientation = orientation;
    if tree.replace(con, split).is_err() {
        tree.map.remove(split);
        return;
    }
    tree.attach(con, split, false).expect("leaf under fresh split");
    tree.set_focus(con);
}

fn set_layout(tree: &mut Tree, con: ContainerId, arg: LayoutArg) {
    let target = if matches!(tree.map[con].kind, ContainerKind::Workspace | ContainerKind::Split)
    {
        con
    } else {
        match tree.map[con].parent {
            Some(parent)
                if matches!(
                    tree.map[parent].kind,
                    ContainerKind::Workspace | ContainerKind::Split
                ) =>
            {
                parent
            }
            _ => return,
        }
    };
    let next = match arg {
        LayoutArg::Default => Layout::Split,
        LayoutArg::Stacked => Layout::Stacked,
        LayoutArg::Tabbed => Layout::Tabbed,
        LayoutArg::Toggle => match tree.map[target].layout {
            Layout::Split => Layout::Stacked,
            Layout::Stacked => Layout::Tabbed,
            _ => Layout::Split,
        },
    };
    tree.map[target].layout = next;
    if next != Layout::Split && tree.map[target].orientation == Orientation::Unset {
        tree.map[target].orientation = Orientation::Horizontal;
    }
}

fn toggle_floating(tree: &mut Tree, config: &Config, con: ContainerId, arg: ToggleArg) {
    if is_structural(tree, con) {
        return;
    }
    let wrapper = tree.ancestor_of_kind(con, ContainerKind::FloatingWrapper);
    let enable = match arg {
        ToggleArg::Enable => true,
        ToggleArg::Disable => false,
        ToggleArg::Toggle => wrapper.is_none(),
    };
    match (enable, wrapper) {
        (true, None) => float_container(tree, config, con, FloatingState::UserOn),
        (false, Some(wrapper)) => unfloat_container(tree, con, wrapper),
        _ => {}
    }
}

/// Detach from tiling and wrap in a floating wrapper on the workspace,
/// remembering the tiling neighbor for the way back.
pub(crate) fn float_container(
    tree: &mut Tree,
    config: &Config,
    con: ContainerId,
    state: FloatingState,
) {
    let Some(ws) = tree.workspace_of(con) else { return };
    let old_parent = match tree.map[con].parent {
        Some(parent) => parent,
        None => return,
    };
    let anchor = {
        let siblings = &tree.map[old_parent].children;
        let pos = siblings.iter().position(|&c| c == con);
        match pos {
            Some(pos) if pos > 0 => Some(siblings[pos - 1]),
            _ if old_parent != ws => Some(old_parent),
            _ => None,
        }
    };

    let geometry = tree.map[con].geometry;
    let current = tree.map[con].rect;
    if tree.detach(con).is_err() {
        return;
    }

    let wrapper = tree.new_container(ContainerKind::FloatingWrapper);
    tree.map[wrapper].floating = state;
    tree.map[wrapper].tiling_anchor = anchor;
    let border = config.border_width;
    let base = if geometry.is_empty() { current } else { geometry };
    let mut rect = crate::model::geometry::Rect::new(
        base.x,
        base.y,
        base.width + 2 * border,
        base.height + 2 * border + config.deco_height,
    );
    rect = crate::model::geometry::clamp_floating_size(
        rect,
        config.floating_minimum_size,
        config.floating_maximum_size,
    );
    if !geometry.is_empty() {
        let ws_rect = tree.map[ws].rect;
        rect = rect.centered_in(&ws_rect);
    }
    tree.map[wrapper].rect = rect;
    tree.map[con].floating = state;
    tree.attach(wrapper, ws, false).expect("wrapper under workspace");
    tree.attach(con, wrapper, false).expect("container under wrapper");
    tidy(tree, old_parent);
    tree.set_focus(con);
}

/// Return a floating subtree to tiling, next to its former neighbor when
/// that neighbor still exists. The whole wrapper content moves, not just
/// the focused leaf.
fn unfloat_container(tree: &mut Tree, con: ContainerId, wrapper: ContainerId) {
    let Some(ws) = tree.workspace_of(wrapper) else { return };
    let anchor = tree.map[wrapper].tiling_anchor;
    let Some(&subtree) = tree.map[wrapper].children.first() else { return };
    if tree.detach(subtree).is_err() {
        return;
    }
    // the wrapper dies quietly; it never had a window of its own
    if tree.detach(wrapper).is_ok() {
        tree.map.remove(wrapper);
    }
    tree.map[subtree].floating = FloatingState::UserOff;

    let anchored = anchor.filter(|&a| {
        tree.map.contains_key(a)
            && tree.workspace_of(a) == Some(ws)
            && tree
                .ancestor_of_kind(a, ContainerKind::FloatingWrapper)
                .is_none()
    });
    let attached = match anchored {
        Some(anchor) if tree.map[anchor].is_leaf() => {
            tree.attach_after(subtree, anchor).is_ok()
        }
        Some(anchor) => tree.attach(subtree, anchor, true).is_ok(),
        None => false,
    };
    if !attached {
        let (parent, after) = tree.insertion_point(ws);
        let fallback = match after {
            Some(after) => tree.attach_after(subtree, after),
            None => tree.attach(subtree, parent, false),
        };
        if fallback.is_err() {
            // last resort: directly under the workspace
            let _ = tree.attach(subtree, ws, false);
        }
    }
    if tree.map.contains_key(con) {
        tree.set_focus(con);
    } else {
        let target = tree.descend_focused(subtree);
        tree.set_focus(target);
    }
}

fn set_fullscreen(tree: &mut Tree, con: ContainerId, arg: ToggleArg, global: bool) {
    if is_structural(tree, con) {
        return;
    }
    let current = tree.map[con].fullscreen_mode;
    let enable = match arg {
        ToggleArg::Enable => true,
        ToggleArg::Disable => false,
        ToggleArg::Toggle => current == FullscreenMode::None,
    };
    if enable {
        // fullscreen is exclusive: global everywhere, output mode per output
        let scope_output = tree.output_of(con);
        let others: Vec<ContainerId> = tree
            .map
            .iter()
            .filter(|(id, c)| {
                *id != con
                    && c.kind != ContainerKind::Workspace
                    && c.fullscreen_mode != FullscreenMode::None
            })
            .map(|(id, _)| id)
            .collect();
        for other in others {
            let clears = global
                || tree.map[other].fullscreen_mode == FullscreenMode::Global
                || tree.output_of(other) == scope_output;
            if clears {
                tree.map[other].fullscreen_mode = FullscreenMode::None;
            }
        }
        tree.map[con].fullscreen_mode =
            if global { FullscreenMode::Global } else { FullscreenMode::Output };
    } else {
        tree.map[con].fullscreen_mode = FullscreenMode::None;
    }
    if let Some(window) = tree.map[con].window.as_ref() {
        let window_id = window.id;
        tree.effects.push(Effect::WindowEvent {
            change: WindowChange::FullscreenMode,
            window: window_id,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::parse::parse;
    use crate::model::tree::tests::{open_leaf, tree_with_workspace};
    use crate::model::Rect;

    fn run_str(tree: &mut Tree, config: &Config, input: &str) -> Outcome {
        let commands = parse(input).unwrap();
        run(tree, config, &commands)
    }

    #[test]
    fn kill_sequence_empties_workspace() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let a = open_leaf(&mut tree, ws, 1);
        let _b = open_leaf(&mut tree, ws, 2);
        tree.set_focus(a);
        let config = Config::default();
        let outcome = run_str(&mut tree, &config, "kill ; kill");
        assert!(outcome.replies.iter().all(|r| r.success));
        assert!(tree.map[ws].children.is_empty());
        assert!(tree.map.contains_key(ws), "visible workspace survives");
        assert!(tree.validate().is_empty(), "{:?}", tree.validate());
    }

    #[test]
    fn resize_then_split_matches_expected_shares() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        tree.map[ws].orientation = Orientation::Vertical;
        let upper = open_leaf(&mut tree, ws, 1);
        let lower = open_leaf(&mut tree, ws, 2);
        tree.set_focus(lower);
        let config = Config::default();

        run_str(&mut tree, &config, "resize grow up 10 px or 25 ppt");
        assert!((tree.map[upper].percent - 0.25).abs() < 1e-6);
        assert!((tree.map[lower].percent - 0.75).abs() < 1e-6);

        run_str(&mut tree, &config, "split h");
        // the lower child is now wrapped; the wrap took over its share
        let wrap = tree.map[ws].children[1];
        assert_eq!(tree.map[wrap].kind, ContainerKind::Split);
        assert!((tree.map[upper].percent - 0.25).abs() < 1e-6);
        assert!((tree.map[wrap].percent - 0.75).abs() < 1e-6);
        assert!(tree.validate().is_empty(), "{:?}", tree.validate());
    }

    #[test]
    fn floating_round_trip_returns_to_neighbor() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let a = open_leaf(&mut tree, ws, 1);
        let b = open_leaf(&mut tree, ws, 2);
        let c = open_leaf(&mut tree, ws, 3);
        tree.set_focus(b);
        let config = Config::default();

        run_str(&mut tree, &config, "floating enable");
        assert!(tree
            .ancestor_of_kind(tree.focused, ContainerKind::FloatingWrapper)
            .is_some());
        assert_eq!(tree.map[ws].children, vec![a, c]);

        run_str(&mut tree, &config, "floating disable");
        assert_eq!(tree.map[ws].children, vec![a, b, c], "returns next to prior neighbor");
        assert_eq!(tree.workspace_of(b), Some(ws));
        assert!(tree.validate().is_empty(), "{:?}", tree.validate());
    }

    #[test]
    fn layout_stacked_then_default_preserves_focus() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let _a = open_leaf(&mut tree, ws, 1);
        let b = open_leaf(&mut tree, ws, 2);
        tree.set_focus(b);
        let config = Config::default();
        run_str(&mut tree, &config, "layout stacked");
        assert_eq!(tree.map[ws].layout, Layout::Stacked);
        assert_eq!(tree.focused, b);
        run_str(&mut tree, &config, "layout default");
        assert_eq!(tree.map[ws].layout, Layout::Split);
        assert_eq!(tree.focused, b);
    }

    #[test]
    fn move_between_workspaces_round_trips() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let a = open_leaf(&mut tree, ws, 1);
        let b = open_leaf(&mut tree, ws, 2);
        tree.set_focus(b);
        let config = Config::default();

        run_str(&mut tree, &config, "move to workspace 2");
        assert_eq!(tree.map[ws].children, vec![a]);
        let ws2 = tree.workspace_by_name("2").unwrap();
        assert_eq!(tree.workspace_of(b), Some(ws2));
        // focus stayed on the source workspace
        assert_eq!(tree.workspace_of(tree.focused), Some(ws));

        run_str(&mut tree, &config, "[id=2] move to workspace 1");
        assert_eq!(tree.workspace_of(b), Some(ws));
        assert!(tree.workspace_by_name("2").is_none(), "emptied workspace 2 was pruned");
        assert!(tree.validate().is_empty(), "{:?}", tree.validate());
    }

    #[test]
    fn directional_move_reorders_siblings() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let a = open_leaf(&mut tree, ws, 1);
        let b = open_leaf(&mut tree, ws, 2);
        let c = open_leaf(&mut tree, ws, 3);
        tree.set_focus(a);
        let config = Config::default();
        run_str(&mut tree, &config, "move right");
        assert_eq!(tree.map[ws].children, vec![b, a, c]);
        run_str(&mut tree, &config, "move right");
        assert_eq!(tree.map[ws].children, vec![b, c, a]);
        assert_eq!(tree.focused, a);
    }

    #[test]
    fn move_against_orientation_reshapes_workspace() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let a = open_leaf(&mut tree, ws, 1);
        let b = open_leaf(&mut tree, ws, 2);
        let c = open_leaf(&mut tree, ws, 3);
        tree.set_focus(b);
        let config = Config::default();
        run_str(&mut tree, &config, "move down");
        assert_eq!(tree.map[ws].orientation, Orientation::Vertical);
        assert_eq!(tree.map[ws].children.len(), 2);
        assert_eq!(tree.map[ws].children[1], b, "moved container sits below");
        // the old horizontal row survives as one wrapped split
        let wrapped = tree.map[ws].children[0];
        assert_eq!(tree.map[wrapped].kind, ContainerKind::Split);
        assert_eq!(tree.map[wrapped].orientation, Orientation::Horizontal);
        assert_eq!(tree.map[wrapped].children, vec![a, c]);
        assert!(tree.validate().is_empty(), "{:?}", tree.validate());
    }

    #[test]
    fn move_with_single_sibling_just_flips_orientation() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let a = open_leaf(&mut tree, ws, 1);
        let b = open_leaf(&mut tree, ws, 2);
        tree.set_focus(b);
        let config = Config::default();
        run_str(&mut tree, &config, "move down");
        assert_eq!(tree.map[ws].orientation, Orientation::Vertical);
        assert_eq!(tree.map[ws].children, vec![a, b]);
        assert!(tree.validate().is_empty(), "{:?}", tree.validate());
    }

    #[test]
    fn criteria_select_by_mark_and_empty_selection_is_ok() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let a = open_leaf(&mut tree, ws, 1);
        let b = open_leaf(&mut tree, ws, 2);
        tree.set_focus(a);
        let config = Config::default();
        run_str(&mut tree, &config, "mark editor");
        assert_eq!(tree.map[a].mark.as_deref(), Some("editor"));

        let outcome = run_str(&mut tree, &config, "[con_mark=editor] kill");
        assert!(outcome.replies[0].success);
        assert!(!tree.map.contains_key(a));
        assert!(tree.map.contains_key(b));

        // criteria that match nothing succeed and change nothing
        let outcome = run_str(&mut tree, &config, "[class=nothing_matches] kill");
        assert!(outcome.replies[0].success);
        assert!(tree.map.contains_key(b));
    }

    #[test]
    fn fullscreen_global_is_exclusive() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let a = open_leaf(&mut tree, ws, 1);
        let b = open_leaf(&mut tree, ws, 2);
        let config = Config::default();
        tree.set_focus(a);
        run_str(&mut tree, &config, "fullscreen enable");
        assert_eq!(tree.map[a].fullscreen_mode, FullscreenMode::Output);
        tree.set_focus(b);
        run_str(&mut tree, &config, "fullscreen enable global");
        assert_eq!(tree.map[b].fullscreen_mode, FullscreenMode::Global);
        assert_eq!(tree.map[a].fullscreen_mode, FullscreenMode::None);
    }

    #[test]
    fn exec_and_exit_become_side_effects() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let _a = open_leaf(&mut tree, ws, 1);
        let config = Config::default();
        let outcome = run_str(&mut tree, &config, "exec firefox ; exit");
        assert_eq!(
            outcome.side_effects,
            vec![SideEffect::Spawn("firefox".into()), SideEffect::Exit]
        );
    }

    #[test]
    fn floating_move_nudges_rect() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let wrapper = tree.new_container(ContainerKind::FloatingWrapper);
        tree.map[wrapper].floating = FloatingState::UserOn;
        tree.attach(wrapper, ws, false).unwrap();
        tree.map[wrapper].rect = Rect::new(100, 100, 200, 150);
        let leaf = open_leaf(&mut tree, wrapper, 5);
        tree.set_focus(leaf);
        let config = Config::default();
        run_str(&mut tree, &config, "move right ; move down ; move down");
        assert_eq!(tree.map[wrapper].rect.x, 110);
        assert_eq!(tree.map[wrapper].rect.y, 120);
    }

    #[test]
    fn workspace_number_prefers_numeric_match() {
        let (mut tree, _, _ws) = tree_with_workspace("1");
        let config = Config::default();
        let (named, _) = tree.workspace_get("5: mail", &config);
        let leaf = open_leaf(&mut tree, named, 8);
        let _ = leaf;
        run_str(&mut tree, &config, "workspace number 5");
        assert_eq!(tree.workspace_of(tree.focused), Some(named));
    }
}
