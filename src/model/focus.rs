//! Focus discipline. Every container keeps its direct children in
//! most-recently-focused order; the globally focused container is the one
//! reached by following the heads of those stacks from the root.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::model::tree::{
    ContainerId, ContainerKind, Effect, Orientation, Tree, WindowChange,
};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    pub fn orientation(self) -> Orientation {
        match self {
            Direction::Left | Direction::Right => Orientation::Horizontal,
            Direction::Up | Direction::Down => Orientation::Vertical,
        }
    }

    pub fn forward(self) -> bool {
        matches!(self, Direction::Right | Direction::Down)
    }
}

impl Tree {
    /// Make `id` the focused container. Each ancestor moves the relevant
    /// child to the head of its focus stack; ancestors that already point
    /// at the right child are left untouched, so entries above the common
    /// ancestor of the old and new focus keep their order.
    pub fn set_focus(&mut self, id: ContainerId) {
        let mut current = id;
        while let Some(parent) = self.map[current].parent {
            let stack = &mut self.map[parent].focus_stack;
            if stack.first() != Some(&current) {
                stack.retain(|&c| c != current);
                stack.insert(0, current);
            }
            current = parent;
        }
        self.focused = id;
        trace!(?id, "focus");

        // focusing a leaf clears its urgency
        if let Some(window_id) = self.map[id].window.as_ref().map(|w| w.id) {
            let was_urgent = self.map[id].window.as_ref().is_some_and(|w| w.urgent);
            if was_urgent {
                if let Some(window) = self.map[id].window.as_mut() {
                    window.urgent = false;
                }
                self.propagate_urgency(id);
            }
            self.effects.push(Effect::WindowEvent {
                change: WindowChange::Focus,
                window: window_id,
            });
        }
    }

    pub fn focused_leaf(&self) -> ContainerId {
        self.descend_focused(self.root)
    }

    /// Move focus in a direction. Walks up until an ancestor's orientation
    /// matches, picks the neighboring sibling (wrapping), and descends by
    /// focus order. Falls over to the next output when the workspace has no
    /// neighbor in that direction.
    pub fn focus_direction(&mut self, direction: Direction) -> bool {
        match self.neighbor_in_direction(self.focused, direction) {
            Some(target) => {
                let target = self.descend_focused(target);
                self.set_focus(target);
                true
            }
            None => false,
        }
    }

    /// The container that would receive focus when moving `direction` from
    /// `start`, without changing any state.
    pub fn neighbor_in_direction(
        &self,
        start: ContainerId,
        direction: Direction,
    ) -> Option<ContainerId> {
        // floating windows cycle among their workspace's wrappers
        if let Some(wrapper) = self.ancestor_of_kind(start, ContainerKind::FloatingWrapper) {
            let ws = self.map[wrapper].parent?;
            let floats = &self.map[ws].floating_children;
            if floats.len() < 2 {
                return None;
            }
            let pos = floats.iter().position(|&c| c == wrapper)?;
            let len = floats.len();
            let next = if direction.forward() { (pos + 1) % len } else { (pos + len - 1) % len };
            return Some(floats[next]);
        }

        let mut current = start;
        while let Some(parent) = self.map[current].parent {
            let pcon = &self.map[parent];
            let splits_here = matches!(pcon.kind, ContainerKind::Split | ContainerKind::Workspace);
            if splits_here
                && pcon.orientation == direction.orientation()
                && pcon.children.len() > 1
            {
                let pos = pcon.children.iter().position(|&c| c == current)?;
                let len = pcon.children.len();
                let next =
                    if direction.forward() { (pos + 1) % len } else { (pos + len - 1) % len };
                return Some(pcon.children[next]);
            }
            if pcon.kind == ContainerKind::Content {
                break;
            }
            current = parent;
        }

        // no neighbor on this workspace; try the output next door
        let output = self.output_of(start)?;
        let target_output = self.output_in_direction(output, direction)?;
        let ws = self.visible_workspace_on(target_output)?;
        Some(ws)
    }

    pub(crate) fn output_in_direction(
        &self,
        from: ContainerId,
        direction: Direction,
    ) -> Option<ContainerId> {
        let (cx, cy) = self.map[from].rect.center_of();
        let mut best: Option<(i32, ContainerId)> = None;
        for &output in &self.map[self.root].children {
            if output == from || self.map[output].name == "__i3" {
                continue;
            }
            let (ox, oy) = self.map[output].rect.center_of();
            let (aligned, distance) = match direction {
                Direction::Left => (ox < cx, cx - ox),
                Direction::Right => (ox > cx, ox - cx),
                Direction::Up => (oy < cy, cy - oy),
                Direction::Down => (oy > cy, oy - cy),
            };
            if aligned && best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, output));
            }
        }
        best.map(|(_, output)| output)
    }

    /// Focus the enclosing container; stops at the workspace.
    pub fn focus_parent(&mut self) -> bool {
        if self.map[self.focused].kind == ContainerKind::Workspace {
            return false;
        }
        match self.map[self.focused].parent {
            Some(parent)
                if !matches!(
                    self.map[parent].kind,
                    ContainerKind::Content | ContainerKind::Dockarea | ContainerKind::Root
                ) =>
            {
                // wrappers are invisible to the user; step through them
                let target = if self.map[parent].kind == ContainerKind::FloatingWrapper {
                    self.map[parent].parent.unwrap_or(parent)
                } else {
                    parent
                };
                self.set_focus(target);
                true
            }
            _ => false,
        }
    }

    /// Descend one focus level.
    pub fn focus_child(&mut self) -> bool {
        match self.map[self.focused].focus_stack.first().copied() {
            Some(child) => {
                self.set_focus(child);
                true
            }
            None => false,
        }
    }

    /// Swap focus between the floating and tiling halves of the current
    /// workspace.
    pub fn focus_mode_toggle(&mut self) -> bool {
        let on_floating =
            self.ancestor_of_kind(self.focused, ContainerKind::FloatingWrapper).is_some();
        if on_floating {
            self.focus_tiling()
        } else {
            self.focus_floating()
        }
    }

    pub fn focus_floating(&mut self) -> bool {
        let Some(ws) = self.workspace_of(self.focused) else { return false };
        let target = self.map[ws]
            .focus_stack
            .iter()
            .copied()
            .find(|&c| self.map[c].kind == ContainerKind::FloatingWrapper);
        match target {
            Some(wrapper) => {
                let leaf = self.descend_focused(wrapper);
                self.set_focus(leaf);
                true
            }
            None => false,
        }
    }

    pub fn focus_tiling(&mut self) -> bool {
        let Some(ws) = self.workspace_of(self.focused) else { return false };
        let target = self.map[ws]
            .focus_stack
            .iter()
            .copied()
            .find(|&c| self.map[c].kind != ContainerKind::FloatingWrapper);
        match target {
            Some(child) => {
                let leaf = self.descend_focused(child);
                self.set_focus(leaf);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tree::tests::{open_leaf, tree_with_workspace};
    use crate::model::tree::{ContainerKind, FloatingState, Orientation};

    #[test]
    fn focus_reorders_ancestor_stacks() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let a = open_leaf(&mut tree, ws, 1);
        let b = open_leaf(&mut tree, ws, 2);
        tree.set_focus(a);
        assert_eq!(tree.focused_leaf(), a);
        assert_eq!(tree.map[ws].focus_stack[0], a);
        tree.set_focus(b);
        assert_eq!(tree.focused_leaf(), b);
        assert_eq!(tree.map[ws].focus_stack, vec![b, a]);
    }

    #[test]
    fn focus_keeps_unrelated_stacks_intact() {
        // two splits side by side; focusing within the right split must not
        // disturb the left split's internal order
        let (mut tree, _, ws) = tree_with_workspace("1");
        let left = tree.new_container(ContainerKind::Split);
        tree.map[left].orientation = Orientation::Vertical;
        tree.attach(left, ws, false).unwrap();
        let l1 = open_leaf(&mut tree, left, 1);
        let l2 = open_leaf(&mut tree, left, 2);
        let right = tree.new_container(ContainerKind::Split);
        tree.map[right].orientation = Orientation::Vertical;
        tree.attach(right, ws, false).unwrap();
        let r1 = open_leaf(&mut tree, right, 3);
        let r2 = open_leaf(&mut tree, right, 4);

        tree.set_focus(l1);
        tree.set_focus(r2);
        tree.set_focus(r1);
        // left's stack still remembers l1 on top
        assert_eq!(tree.map[left].focus_stack[0], l1);
        assert_eq!(tree.map[left].focus_stack[1], l2);
        assert_eq!(tree.map[right].focus_stack, vec![r1, r2]);
    }

    #[test]
    fn direction_moves_between_siblings_and_wraps() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let a = open_leaf(&mut tree, ws, 1);
        let b = open_leaf(&mut tree, ws, 2);
        let c = open_leaf(&mut tree, ws, 3);
        tree.set_focus(b);
        assert!(tree.focus_direction(Direction::Right));
        assert_eq!(tree.focused, c);
        assert!(tree.focus_direction(Direction::Right));
        assert_eq!(tree.focused, a, "focus wraps around");
        assert!(tree.focus_direction(Direction::Left));
        assert_eq!(tree.focused, c);
    }

    #[test]
    fn direction_descends_by_focus_order() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let a = open_leaf(&mut tree, ws, 1);
        let split = tree.new_container(ContainerKind::Split);
        tree.map[split].orientation = Orientation::Vertical;
        tree.attach(split, ws, false).unwrap();
        let top = open_leaf(&mut tree, split, 2);
        let bottom = open_leaf(&mut tree, split, 3);
        tree.set_focus(top);
        tree.set_focus(a);
        assert!(tree.focus_direction(Direction::Right));
        assert_eq!(tree.focused, top, "descends to the split's last focused leaf");
        let _ = bottom;
    }

    #[test]
    fn vertical_direction_needs_matching_orientation() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let _a = open_leaf(&mut tree, ws, 1);
        let b = open_leaf(&mut tree, ws, 2);
        tree.set_focus(b);
        assert!(!tree.focus_direction(Direction::Down), "no vertical ancestor to move in");
    }

    #[test]
    fn mode_toggle_swaps_between_floating_and_tiling() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let tiled = open_leaf(&mut tree, ws, 1);
        let wrapper = tree.new_container(ContainerKind::FloatingWrapper);
        tree.map[wrapper].floating = FloatingState::UserOn;
        tree.attach(wrapper, ws, false).unwrap();
        let floated = open_leaf(&mut tree, wrapper, 2);

        tree.set_focus(floated);
        assert!(tree.focus_mode_toggle());
        assert_eq!(tree.focused, tiled);
        assert!(tree.focus_mode_toggle());
        assert_eq!(tree.focused, floated);
    }

    #[test]
    fn focus_clears_urgency() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let a = open_leaf(&mut tree, ws, 1);
        tree.map[a].window.as_mut().unwrap().urgent = true;
        tree.propagate_urgency(a);
        assert!(tree.map[ws].urgent);
        tree.set_focus(a);
        assert!(!tree.map[a].urgent);
        assert!(!tree.map[ws].urgent);
    }
}
