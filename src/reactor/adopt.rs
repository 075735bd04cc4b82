//! Window adoption: turning a MapRequest into a managed leaf. Reads the
//! client's properties, applies assignment rules, picks the workspace and
//! tiling/floating placement, and wires up the decoration frame.

use tracing::{debug, info, warn};

use super::Reactor;
use crate::commands::{exec, parse, Criteria};
use crate::model::rules;
use crate::model::tree::{
    ContainerId, ContainerKind, Effect, FloatingState, Tree, WindowChange,
};
use crate::model::window::{DockPosition, WindowInfo, XWindowId};
use crate::model::Rect;

/// Manage a window. `already_mapped` is true for windows found by the
/// startup scan; reparenting those produces an UnmapNotify we caused.
pub fn manage(reactor: &mut Reactor, window: XWindowId, already_mapped: bool) {
    if reactor.tree.leaf_by_window(window).is_some() {
        return;
    }
    if !reactor.x.is_manage_eligible(window) {
        debug!(window, "override-redirect window left alone");
        return;
    }

    let mut info = reactor.x.read_window_info(window);
    // a window being managed for the first time has no container yet, so
    // there is no mark for the mark predicate to see
    let placement = rules::evaluate(&reactor.assignments, &info, None);
    info.ran_assignments.extend(placement.ran.iter().copied());

    if let Some(position) = info.dock {
        adopt_dock(reactor, info, position);
        return;
    }

    let target_ws = target_workspace(reactor, &placement);
    let floating = placement.floating
        || info.window_type.wants_floating()
        || info.transient_for.is_some();

    let leaf = reactor.tree.new_container(ContainerKind::Leaf);
    if floating {
        attach_floating(reactor, leaf, target_ws, &info);
    } else {
        attach_tiling(&mut reactor.tree, leaf, target_ws);
    }

    // the decoration frame wraps the client; geometry is settled later
    match reactor.x.create_frame(info.geometry) {
        Ok(frame) => {
            info.frame = Some(frame);
            match reactor.x.reparent(window, frame, 0, 0) {
                Ok(sequence) => {
                    if already_mapped {
                        reactor.tree.map[leaf].ignore_unmap += 1;
                    }
                    reactor.ignore.insert(
                        sequence,
                        Some(x11rb::protocol::xproto::UNMAP_NOTIFY_EVENT),
                    );
                }
                Err(e) => warn!(window, error = %e, "reparent failed"),
            }
        }
        Err(e) => warn!(window, error = %e, "no decoration frame for this window"),
    }
    if let Err(e) = reactor.x.subscribe_window_events(window) {
        warn!(window, error = %e, "could not subscribe to window events");
    }
    reactor.x.set_normal_state(window).ok();

    let window_id = info.id;
    reactor.tree.set_window(leaf, info);
    reactor.tree.effects.push(Effect::WindowEvent {
        change: WindowChange::New,
        window: window_id,
    });

    // new windows take focus when their workspace is in view
    if reactor.tree.workspace_is_visible(target_ws) {
        reactor.tree.set_focus(leaf);
    }

    for command in placement.commands {
        run_assignment_command(reactor, window_id, &command);
    }
    info!(window, floating, "adopted window");
}

/// Reattach machinery to a window carried over through restart-in-place:
/// fresh frame, fresh event subscription, same leaf.
pub fn readopt(reactor: &mut Reactor, window: XWindowId) {
    let Some(leaf) = reactor.tree.leaf_by_window(window) else { return };
    let Some(mut info) = reactor.tree.map[leaf].window.clone() else { return };
    match reactor.x.create_frame(reactor.tree.map[leaf].rect) {
        Ok(frame) => {
            info.frame = Some(frame);
            if let Ok(sequence) = reactor.x.reparent(window, frame, 0, 0) {
                reactor.tree.map[leaf].ignore_unmap += 1;
                reactor
                    .ignore
                    .insert(sequence, Some(x11rb::protocol::xproto::UNMAP_NOTIFY_EVENT));
            }
        }
        Err(e) => warn!(window, error = %e, "no frame after restart"),
    }
    reactor.x.subscribe_window_events(window).ok();
    reactor.tree.set_window(leaf, info);
    debug!(window, "re-adopted after restart");
}

fn target_workspace(reactor: &mut Reactor, placement: &rules::Placement) -> ContainerId {
    if let Some(name) = &placement.workspace {
        let (ws, created) = reactor.tree.workspace_get(name, &reactor.config);
        if created {
            debug!(name = %name, "assignment created workspace");
        }
        return ws;
    }
    if let Some(output_name) = &placement.output {
        match reactor
            .tree
            .output_by_name(output_name)
            .and_then(|output| reactor.tree.visible_workspace_on(output))
        {
            Some(ws) => return ws,
            None => {
                warn!(output = %output_name, "assigned output is missing, using the focused one");
            }
        }
    }
    reactor
        .tree
        .workspace_of(reactor.tree.focused)
        .filter(|&ws| !reactor.tree.map[ws].name.starts_with("__"))
        .unwrap_or_else(|| {
            let output = reactor.tree.focused_output().expect("a real output exists");
            reactor
                .tree
                .visible_workspace_on(output)
                .unwrap_or_else(|| reactor.tree.create_on_output(output, &reactor.config))
        })
}

fn attach_tiling(tree: &mut Tree, leaf: ContainerId, ws: ContainerId) {
    let (parent, after) = tree.insertion_point(ws);
    let attached = match after {
        Some(after) => tree.attach_after(leaf, after),
        None => tree.attach(leaf, parent, false),
    };
    if attached.is_err() {
        // fall back to the workspace tail; the settle step sorts the rest
        tree.attach(leaf, ws, false).expect("leaf under workspace");
    }
}

fn attach_floating(reactor: &mut Reactor, leaf: ContainerId, ws: ContainerId, info: &WindowInfo) {
    let border = reactor.config.border_width;
    let deco = reactor.config.deco_height;
    let geometry = if info.geometry.is_empty() {
        Rect::new(0, 0, 400, 300)
    } else {
        info.geometry
    };
    let geometry = reactor.x.apply_size_hints(info.id, geometry);
    let mut rect = Rect::new(
        geometry.x,
        geometry.y,
        geometry.width + 2 * border,
        geometry.height + 2 * border + deco,
    );
    rect = crate::model::geometry::clamp_floating_size(
        rect,
        reactor.config.floating_minimum_size,
        reactor.config.floating_maximum_size,
    );
    // center windows that did not ask for a position
    let ws_rect = reactor.tree.map[ws].rect;
    if geometry.x == 0 && geometry.y == 0 {
        rect = rect.centered_in(&ws_rect);
    }

    let tree = &mut reactor.tree;
    let wrapper = tree.new_container(ContainerKind::FloatingWrapper);
    tree.map[wrapper].floating = FloatingState::AutoOn;
    tree.map[leaf].floating = FloatingState::AutoOn;
    tree.map[wrapper].rect = rect;
    tree.attach(wrapper, ws, false).expect("wrapper under workspace");
    tree.attach(leaf, wrapper, false).expect("leaf under wrapper");
}

fn adopt_dock(reactor: &mut Reactor, info: WindowInfo, position: DockPosition) {
    let Some(output) = reactor.tree.focused_output() else { return };
    let Some(dockarea) = reactor.tree.dockarea_of(output, position == DockPosition::Top)
    else {
        warn!(window = info.id, "no dockarea for dock client");
        return;
    };
    let leaf = reactor.tree.new_container(ContainerKind::Leaf);
    reactor
        .tree
        .attach(leaf, dockarea, false)
        .expect("dock client under dockarea");
    let window_id = info.id;
    reactor.x.subscribe_window_events(window_id).ok();
    reactor.tree.set_window(leaf, info);
    reactor.tree.effects.push(Effect::WindowEvent {
        change: WindowChange::New,
        window: window_id,
    });
    info!(window = window_id, ?position, "adopted dock client");
}

/// Assignment `command` actions run against the new window, addressed by
/// id so they cannot hit whatever happens to be focused.
fn run_assignment_command(reactor: &mut Reactor, window: XWindowId, command: &str) {
    match parse::parse(command) {
        Ok(mut commands) => {
            for parsed in &mut commands {
                if parsed.criteria.is_none() {
                    parsed.criteria = Some(Criteria {
                        window_id: Some(window),
                        ..Default::default()
                    });
                }
            }
            let outcome = exec::run(&mut reactor.tree, &reactor.config, &commands);
            for reply in outcome.replies {
                if !reply.success {
                    warn!(command, error = ?reply.error, "assignment command failed");
                }
            }
        }
        Err(e) => warn!(command, error = %e, "unparsable assignment command"),
    }
}
