//! The scratchpad: an internal workspace on the synthetic output that
//! parks floating containers until they are summoned back.

use tracing::debug;

use crate::model::geometry::Rect;
use crate::model::tree::{ContainerId, ContainerKind, FloatingState, Tree};

pub const SCRATCHPAD_WORKSPACE: &str = "__i3_scratch";

impl Tree {
    fn scratchpad_workspace(&self) -> ContainerId {
        self.workspace_by_name(SCRATCHPAD_WORKSPACE)
            .expect("scratchpad workspace exists for the process lifetime")
    }

    /// Park the focused container on the scratchpad. Tiling containers are
    /// wrapped and sized to half the output's width and three quarters of
    /// its height first.
    pub fn scratchpad_move(&mut self) -> bool {
        let focused = self.focused;
        if !matches!(
            self.map[focused].kind,
            ContainerKind::Leaf | ContainerKind::Split
        ) {
            return false;
        }
        let Some(ws) = self.workspace_of(focused) else { return false };
        if self.map[ws].name == SCRATCHPAD_WORKSPACE {
            return false;
        }

        let wrapper = match self.ancestor_of_kind(focused, ContainerKind::FloatingWrapper) {
            Some(wrapper) => {
                self.detach(wrapper).expect("wrapper is attached");
                wrapper
            }
            None => {
                let output_rect = self
                    .output_of(focused)
                    .map(|o| self.map[o].rect)
                    .unwrap_or_default();
                self.detach(focused).expect("focused is attached");
                let wrapper = self.new_container(ContainerKind::FloatingWrapper);
                self.map[wrapper].floating = FloatingState::AutoOn;
                self.map[focused].floating = FloatingState::AutoOn;
                let size = Rect::new(0, 0, output_rect.width / 2, output_rect.height * 3 / 4);
                self.map[wrapper].rect = size.centered_in(&output_rect);
                self.attach(focused, wrapper, false).expect("leaf under wrapper");
                wrapper
            }
        };

        let scratch = self.scratchpad_workspace();
        self.attach(wrapper, scratch, false).expect("wrapper under scratchpad");
        self.scratchpad_order.retain(|&c| c != wrapper);
        self.scratchpad_order.insert(0, wrapper);
        debug!(?wrapper, "moved container to scratchpad");

        let fallback = self.descend_focused(ws);
        self.set_focus(fallback);
        true
    }

    /// Cycle the scratchpad: hide the scratchpad window currently shown on
    /// the focused workspace, or summon the most recently parked one.
    pub fn scratchpad_show(&mut self) -> bool {
        let Some(current) = self.workspace_of(self.focused) else { return false };
        if self.map[current].name == SCRATCHPAD_WORKSPACE {
            return false;
        }

        // a scratchpad window already visible here goes back
        let shown = self.map[current]
            .floating_children
            .iter()
            .copied()
            .find(|wrapper| self.scratchpad_order.contains(wrapper));
        if let Some(wrapper) = shown {
            self.detach(wrapper).expect("wrapper is attached");
            let scratch = self.scratchpad_workspace();
            self.attach(wrapper, scratch, false).expect("wrapper under scratchpad");
            let fallback = self.descend_focused(current);
            self.set_focus(fallback);
            return true;
        }

        let scratch = self.scratchpad_workspace();
        let next = self
            .scratchpad_order
            .iter()
            .copied()
            .find(|&wrapper| self.map[wrapper].parent == Some(scratch));
        let Some(wrapper) = next else { return false };
        self.detach(wrapper).expect("wrapper parked on scratchpad");
        self.attach(wrapper, current, false).expect("wrapper under workspace");

        // center on this output unless the remembered position is on it
        let output_rect = self
            .output_of(current)
            .map(|o| self.map[o].rect)
            .unwrap_or_default();
        let rect = self.map[wrapper].rect;
        let (cx, cy) = rect.center_of();
        if !output_rect.contains(cx, cy) {
            self.map[wrapper].rect = rect.centered_in(&output_rect);
        }

        let target = self.descend_focused(wrapper);
        self.set_focus(target);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tree::tests::{open_leaf, tree_with_workspace};

    #[test]
    fn move_wraps_and_parks_tiled_container() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let keep = open_leaf(&mut tree, ws, 1);
        let scratched = open_leaf(&mut tree, ws, 2);
        tree.set_focus(scratched);
        assert!(tree.scratchpad_move());

        let scratch = tree.workspace_by_name(SCRATCHPAD_WORKSPACE).unwrap();
        assert_eq!(tree.map[scratch].floating_children.len(), 1);
        let wrapper = tree.map[scratch].floating_children[0];
        assert!(tree.map[wrapper].floating.is_floating());
        assert_eq!(tree.map[wrapper].rect.width, 512);
        assert_eq!(tree.map[wrapper].rect.height, 576);
        assert_eq!(tree.focused, keep);
        assert!((tree.map[keep].percent - 1.0).abs() < 1e-6);
    }

    #[test]
    fn show_summons_and_hides() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let keep = open_leaf(&mut tree, ws, 1);
        let scratched = open_leaf(&mut tree, ws, 2);
        tree.set_focus(scratched);
        tree.scratchpad_move();

        assert!(tree.scratchpad_show());
        assert_eq!(tree.focused, scratched);
        assert_eq!(tree.map[ws].floating_children.len(), 1);

        // showing again sends it back
        assert!(tree.scratchpad_show());
        assert!(tree.map[ws].floating_children.is_empty());
        assert_eq!(tree.focused, keep);
        let scratch = tree.workspace_by_name(SCRATCHPAD_WORKSPACE).unwrap();
        assert_eq!(tree.map[scratch].floating_children.len(), 1);
    }

    #[test]
    fn most_recently_parked_comes_back_first() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let _keep = open_leaf(&mut tree, ws, 1);
        let first = open_leaf(&mut tree, ws, 2);
        let second = open_leaf(&mut tree, ws, 3);
        tree.set_focus(first);
        tree.scratchpad_move();
        tree.set_focus(second);
        tree.scratchpad_move();

        assert!(tree.scratchpad_show());
        assert_eq!(tree.focused, second);
    }
}
