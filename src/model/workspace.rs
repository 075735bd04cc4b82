//! Workspace lifecycle and visibility. Workspaces come into existence on
//! demand (a switch, an assignment, a replacement for an emptied output)
//! and vanish once empty and out of sight; the visible workspace per
//! output is the one holding the output's fullscreen slot.

use tracing::{debug, warn};

use crate::common::config::{Config, OrientationSetting, WorkspaceLayoutSetting};
use crate::model::geometry::translate_between_outputs;
use crate::model::tree::{
    workspace_num, ContainerId, ContainerKind, Effect, FullscreenMode, KillPolicy, Layout,
    Orientation, Tree, TreeError, WorkspaceChange,
};

impl Tree {
    pub fn workspace_by_name(&self, name: &str) -> Option<ContainerId> {
        self.all_workspaces().into_iter().find(|&ws| self.map[ws].name == name)
    }

    pub fn output_by_name(&self, name: &str) -> Option<ContainerId> {
        self.map[self.root]
            .children
            .iter()
            .copied()
            .find(|&o| self.map[o].name == name)
    }

    /// The output the focused container sits on, never the synthetic one.
    pub fn focused_output(&self) -> Option<ContainerId> {
        match self.output_of(self.focused) {
            Some(output) if self.map[output].name != "__i3" => Some(output),
            _ => self.map[self.root]
                .children
                .iter()
                .copied()
                .find(|&o| self.map[o].name != "__i3"),
        }
    }

    /// Look up a workspace by name, creating it if needed. New workspaces
    /// land on the output their name is pinned to, else the focused output.
    pub fn workspace_get(&mut self, name: &str, config: &Config) -> (ContainerId, bool) {
        if let Some(ws) = self.workspace_by_name(name) {
            return (ws, false);
        }
        let pinned = config
            .workspace_outputs
            .iter()
            .find(|pin| pin.workspace == name)
            .map(|pin| pin.output.clone());
        let output = match pinned {
            Some(output_name) => match self.output_by_name(&output_name) {
                Some(output) => Some(output),
                None => {
                    warn!(workspace = name, output = %output_name, "assigned output is missing");
                    None
                }
            },
            None => None,
        };
        let output = output
            .or_else(|| self.focused_output())
            .expect("at least one real output");
        let ws = self.create_workspace(name, output, config);
        (ws, true)
    }

    fn create_workspace(&mut self, name: &str, output: ContainerId, config: &Config) -> ContainerId {
        let content = self.content_of(output).expect("output has a content container");
        let ws = self.new_container(ContainerKind::Workspace);
        self.map[ws].name = name.to_string();
        self.map[ws].num = workspace_num(name);
        self.map[ws].orientation = match config.default_orientation {
            OrientationSetting::Horizontal => Orientation::Horizontal,
            OrientationSetting::Vertical => Orientation::Vertical,
            OrientationSetting::Auto => {
                let rect = self.map[output].rect;
                if rect.height > rect.width {
                    Orientation::Vertical
                } else {
                    Orientation::Horizontal
                }
            }
        };
        self.map[ws].layout = match config.workspace_layout {
            WorkspaceLayoutSetting::Default => Layout::Split,
            WorkspaceLayoutSetting::Stacked => Layout::Stacked,
            WorkspaceLayoutSetting::Tabbed => Layout::Tabbed,
        };
        self.attach(ws, content, false).expect("workspace under content");
        debug!(name, output = %self.map[output].name, "created workspace");
        self.effects.push(Effect::WorkspaceEvent {
            change: WorkspaceChange::Init,
            name: name.to_string(),
        });
        ws
    }

    /// Synthesize a fresh workspace on `output`: first an unused configured
    /// name not pinned elsewhere, else the lowest free number.
    pub fn create_on_output(&mut self, output: ContainerId, config: &Config) -> ContainerId {
        let output_name = self.map[output].name.clone();
        for candidate in &config.workspace_names {
            if self.workspace_by_name(candidate).is_some() {
                continue;
            }
            let pinned_elsewhere = config
                .workspace_outputs
                .iter()
                .any(|pin| pin.workspace == *candidate && pin.output != output_name);
            if !pinned_elsewhere {
                return self.create_workspace(&candidate.clone(), output, config);
            }
        }
        let mut number = 1;
        while self
            .all_workspaces()
            .into_iter()
            .any(|ws| self.map[ws].num == number)
        {
            number += 1;
        }
        self.create_workspace(&number.to_string(), output, config)
    }

    /// Switch the workspace's output to it. Handles back-and-forth memory,
    /// sticky windows, focus, and pruning of the workspace being left.
    pub fn show_workspace(&mut self, ws: ContainerId, config: &Config) {
        let old = self.workspace_of(self.focused);
        if old == Some(ws) {
            if config.workspace_auto_back_and_forth {
                if let Some(previous) = self.previous_workspace.clone() {
                    let (previous_ws, _) = self.workspace_get(&previous, config);
                    if previous_ws != ws {
                        self.show_workspace(previous_ws, config);
                    }
                    return;
                }
            }
            return;
        }

        let output = self.output_of(ws).expect("workspace is attached");
        let content = self.content_of(output).expect("output has content");
        for sibling in self.map[content].children.clone() {
            if sibling != ws && self.map[sibling].fullscreen_mode == FullscreenMode::Output {
                self.map[sibling].fullscreen_mode = FullscreenMode::None;
            }
        }
        self.map[ws].fullscreen_mode = FullscreenMode::Output;

        if let Some(old) = old {
            if self.map.contains_key(old) {
                self.previous_workspace = Some(self.map[old].name.clone());
            }
        }

        self.reassign_sticky_windows(ws);

        let target = self.descend_focused(ws);
        self.set_focus(target);
        self.effects.push(Effect::WorkspaceEvent {
            change: WorkspaceChange::Focus,
            name: self.map[ws].name.clone(),
        });

        // leaving an empty auto-named workspace destroys it
        if let Some(old) = old {
            if self.map.contains_key(old)
                && old != ws
                && self.map[old].children.is_empty()
                && self.map[old].floating_children.is_empty()
                && !self.workspace_is_visible(old)
                && self.workspace_is_prunable(old)
            {
                self.effects.push(Effect::WorkspaceEvent {
                    change: WorkspaceChange::Empty,
                    name: self.map[old].name.clone(),
                });
                self.close(old, KillPolicy::None, false);
            }
        }
    }

    pub fn show_workspace_by_name(&mut self, name: &str, config: &Config) {
        if name.starts_with("__") {
            warn!(name, "refusing to show an internal workspace");
            return;
        }
        let (ws, _) = self.workspace_get(name, config);
        self.show_workspace(ws, config);
    }

    pub fn back_and_forth(&mut self, config: &Config) -> bool {
        match self.previous_workspace.clone() {
            Some(name) => {
                self.show_workspace_by_name(&name, config);
                true
            }
            None => false,
        }
    }

    /// Workspaces in traversal order: numbered ones ascending, then named
    /// ones in tree order. Internal workspaces are skipped.
    pub fn workspaces_in_order(&self, output: Option<ContainerId>) -> Vec<ContainerId> {
        let all: Vec<ContainerId> = self
            .all_workspaces()
            .into_iter()
            .filter(|&ws| !self.map[ws].name.starts_with("__"))
            .filter(|&ws| output.map_or(true, |o| self.output_of(ws) == Some(o)))
            .collect();
        let mut numbered: Vec<ContainerId> =
            all.iter().copied().filter(|&ws| self.map[ws].num >= 0).collect();
        numbered.sort_by_key(|&ws| self.map[ws].num);
        let named: Vec<ContainerId> =
            all.into_iter().filter(|&ws| self.map[ws].num < 0).collect();
        numbered.extend(named);
        numbered
    }

    pub fn workspace_next(&self, restrict_output: bool) -> Option<ContainerId> {
        self.workspace_step(1, restrict_output)
    }

    pub fn workspace_prev(&self, restrict_output: bool) -> Option<ContainerId> {
        self.workspace_step(-1, restrict_output)
    }

    fn workspace_step(&self, step: i32, restrict_output: bool) -> Option<ContainerId> {
        let current = self.workspace_of(self.focused)?;
        let output = if restrict_output { self.output_of(current) } else { None };
        let order = self.workspaces_in_order(output);
        if order.is_empty() {
            return None;
        }
        let pos = order.iter().position(|&ws| ws == current)?;
        let len = order.len() as i32;
        let next = (pos as i32 + step).rem_euclid(len) as usize;
        Some(order[next])
    }

    /// Relocate `ws` (content and floating wrappers) onto `target_output`.
    /// A source output about to be emptied gets a replacement workspace
    /// first; floating rectangles keep their offset from the workspace
    /// origin.
    pub fn move_workspace_to_output(
        &mut self,
        ws: ContainerId,
        target_output: ContainerId,
        config: &Config,
    ) -> Result<(), TreeError> {
        let source_output = self.output_of(ws).ok_or(TreeError::Detached)?;
        if source_output == target_output {
            return Ok(());
        }
        let source_content = self.content_of(source_output).ok_or(TreeError::Detached)?;
        let target_content = self.content_of(target_output).ok_or(TreeError::Detached)?;
        let was_visible = self.workspace_is_visible(ws);

        if self.map[source_content].children.len() == 1 {
            let replacement = self.create_on_output(source_output, config);
            debug!(
                replacement = %self.map[replacement].name,
                "created replacement workspace on emptied output"
            );
        }

        let source_rect = self.map[source_output].rect;
        let target_rect = self.map[target_output].rect;
        self.detach(ws)?;
        self.map[ws].fullscreen_mode = FullscreenMode::None;
        self.attach(ws, target_content, false)?;
        for wrapper in self.map[ws].floating_children.clone() {
            let rect = self.map[wrapper].rect;
            self.map[wrapper].rect = translate_between_outputs(rect, &source_rect, &target_rect);
        }

        if was_visible {
            // hand the source's visibility slot to some remaining workspace
            let remaining = self.map[source_content].children.clone();
            if !remaining.iter().any(|&w| self.map[w].fullscreen_mode == FullscreenMode::Output) {
                if let Some(&first) = remaining.first() {
                    self.map[first].fullscreen_mode = FullscreenMode::Output;
                }
            }
        }

        // the moved workspace takes over visibility on its new output
        for sibling in self.map[target_content].children.clone() {
            if sibling != ws && self.map[sibling].fullscreen_mode == FullscreenMode::Output {
                self.map[sibling].fullscreen_mode = FullscreenMode::None;
            }
        }
        self.map[ws].fullscreen_mode = FullscreenMode::Output;
        self.reassign_sticky_windows(ws);
        let target = self.descend_focused(ws);
        self.set_focus(target);
        self.effects.push(Effect::WorkspaceEvent {
            change: WorkspaceChange::Focus,
            name: self.map[ws].name.clone(),
        });
        self.effects.push(Effect::OutputEvent);
        Ok(())
    }

    /// Recompute the workspace's urgency from its subtree, emitting the
    /// workspace event when the flag flips.
    pub fn update_urgent_flag(&mut self, ws: ContainerId) {
        self.propagate_urgency(ws);
    }

    /// Where a fresh tiling child of `ws` lands: the enclosing container
    /// and the sibling to insert after, following the focus chain through
    /// the tiling half only.
    pub fn insertion_point(&self, ws: ContainerId) -> (ContainerId, Option<ContainerId>) {
        let mut parent = ws;
        loop {
            let next = self.map[parent]
                .focus_stack
                .iter()
                .copied()
                .find(|&c| self.map[c].kind != ContainerKind::FloatingWrapper);
            match next {
                Some(child) if self.map[child].is_leaf() => return (parent, Some(child)),
                Some(child) => parent = child,
                None => return (parent, None),
            }
        }
    }

    /// At most one member of a sticky group shows the window. When a
    /// workspace becomes visible, its group members steal the window from
    /// wherever it currently rests; the leftmost candidate wins.
    fn reassign_sticky_windows(&mut self, ws: ContainerId) {
        let targets: Vec<ContainerId> = self
            .leaves_under(ws)
            .into_iter()
            .filter(|&leaf| {
                self.map[leaf].sticky_group.is_some() && self.map[leaf].window.is_none()
            })
            .collect();
        for target in targets {
            let group = self.map[target].sticky_group.clone().unwrap();
            let donor = self
                .map
                .iter()
                .filter(|(id, c)| {
                    c.sticky_group.as_deref() == Some(group.as_str())
                        && c.window.is_some()
                        && *id != target
                })
                .map(|(id, _)| id)
                .next();
            if let Some(donor) = donor {
                let window = self.map[donor].window.take().unwrap();
                debug!(group = %group, "sticky window reassigned");
                self.set_window(target, window);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::geometry::Rect;
    use crate::model::tree::tests::{open_leaf, tree_with_workspace};
    use crate::model::tree::Tree;

    fn two_output_tree() -> (Tree, ContainerId, ContainerId, ContainerId) {
        let (mut tree, first, ws) = tree_with_workspace("5");
        let second = tree.add_output("fake-1", Rect::new(1024, 0, 1024, 768));
        let config = Config::default();
        let other = tree.create_on_output(second, &config);
        tree.map[other].fullscreen_mode = FullscreenMode::Output;
        (tree, first, second, ws)
    }

    #[test]
    fn workspace_get_creates_once() {
        let (mut tree, _, _) = tree_with_workspace("1");
        let config = Config::default();
        let (a, created_a) = tree.workspace_get("2", &config);
        let (b, created_b) = tree.workspace_get("2", &config);
        assert!(created_a);
        assert!(!created_b);
        assert_eq!(a, b);
        assert_eq!(tree.map[a].num, 2);
    }

    #[test]
    fn workspace_get_honors_output_pin() {
        let (mut tree, _first, second, _ws) = two_output_tree();
        let mut config = Config::default();
        config.workspace_outputs.push(crate::common::config::WorkspaceOutputConfig {
            workspace: "mail".into(),
            output: "fake-1".into(),
        });
        let (ws, created) = tree.workspace_get("mail", &config);
        assert!(created);
        assert_eq!(tree.output_of(ws), Some(second));
    }

    #[test]
    fn missing_assigned_output_falls_back_to_focused() {
        let (mut tree, first, ws) = tree_with_workspace("1");
        tree.focused = tree.descend_focused(ws);
        let mut config = Config::default();
        config.workspace_outputs.push(crate::common::config::WorkspaceOutputConfig {
            workspace: "mail".into(),
            output: "gone-9".into(),
        });
        let (created_ws, _) = tree.workspace_get("mail", &config);
        assert_eq!(tree.output_of(created_ws), Some(first));
    }

    #[test]
    fn create_on_output_prefers_configured_names_then_numbers() {
        let (mut tree, output, _) = tree_with_workspace("1");
        let mut config = Config::default();
        config.workspace_names = vec!["1".into(), "web".into()];
        // "1" is taken, "web" is free
        let ws = tree.create_on_output(output, &config);
        assert_eq!(tree.map[ws].name, "web");
        // now both taken; next free number is 2
        let ws2 = tree.create_on_output(output, &config);
        assert_eq!(tree.map[ws2].name, "2");
        assert_eq!(tree.map[ws2].num, 2);
    }

    #[test]
    fn show_swaps_visibility_and_records_back_and_forth() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let leaf = open_leaf(&mut tree, ws, 1);
        tree.set_focus(leaf);
        let config = Config::default();
        let (other, _) = tree.workspace_get("2", &config);
        tree.show_workspace(other, &config);
        assert!(tree.workspace_is_visible(other));
        assert!(!tree.workspace_is_visible(ws));
        assert_eq!(tree.previous_workspace.as_deref(), Some("1"));
        assert_eq!(tree.workspace_of(tree.focused), Some(other));
    }

    #[test]
    fn leaving_empty_numbered_workspace_prunes_it() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        tree.focused = ws;
        let config = Config::default();
        let (other, _) = tree.workspace_get("2", &config);
        tree.show_workspace(other, &config);
        assert!(!tree.map.contains_key(ws), "empty workspace 1 should be gone");
    }

    #[test]
    fn back_and_forth_round_trips() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let leaf = open_leaf(&mut tree, ws, 1);
        tree.set_focus(leaf);
        let config = Config::default();
        let (other, _) = tree.workspace_get("2", &config);
        tree.show_workspace(other, &config);
        assert!(tree.back_and_forth(&config));
        assert_eq!(tree.workspace_of(tree.focused).map(|w| tree.map[w].name.clone()),
            Some("1".to_string()));
    }

    #[test]
    fn traversal_orders_numbered_then_named() {
        let (mut tree, _, _) = tree_with_workspace("5");
        let config = Config::default();
        let (_mail, _) = tree.workspace_get("mail", &config);
        let (_two, _) = tree.workspace_get("2", &config);
        let names: Vec<String> = tree
            .workspaces_in_order(None)
            .into_iter()
            .map(|ws| tree.map[ws].name.clone())
            .collect();
        assert_eq!(names, vec!["2", "5", "mail"]);
    }

    #[test]
    fn next_and_prev_wrap() {
        let (mut tree, _, ws5) = tree_with_workspace("5");
        tree.focused = tree.descend_focused(ws5);
        let config = Config::default();
        let (ws2, _) = tree.workspace_get("2", &config);
        // focused is on "5"; next wraps to "2"
        assert_eq!(tree.workspace_next(false), Some(ws2));
        assert_eq!(tree.workspace_prev(false), Some(ws2));
    }

    #[test]
    fn move_to_output_creates_replacement_and_translates_floating() {
        let (mut tree, first, second, ws) = two_output_tree();
        let config = Config::default();
        // one floating window at (100, 100) on the source output
        let wrapper = tree.new_container(ContainerKind::FloatingWrapper);
        tree.map[wrapper].floating = crate::model::tree::FloatingState::AutoOn;
        tree.attach(wrapper, ws, false).unwrap();
        tree.map[wrapper].rect = Rect::new(100, 100, 200, 150);
        let leaf = open_leaf(&mut tree, wrapper, 42);
        tree.set_focus(leaf);

        tree.move_workspace_to_output(ws, second, &config).unwrap();

        assert_eq!(tree.output_of(ws), Some(second));
        assert_eq!(tree.map[wrapper].rect, Rect::new(1124, 100, 200, 150));
        // the emptied source got a fresh workspace
        let source_content = tree.content_of(first).unwrap();
        assert_eq!(tree.map[source_content].children.len(), 1);
        let replacement = tree.map[source_content].children[0];
        assert!(tree.workspace_is_visible(replacement));
        assert!(tree.validate().is_empty(), "{:?}", tree.validate());
    }

    #[test]
    fn sticky_window_follows_workspace_switch() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let holder = open_leaf(&mut tree, ws, 77);
        tree.map[holder].sticky_group = Some("notes".into());
        tree.set_focus(holder);
        let config = Config::default();
        let (other, _) = tree.workspace_get("2", &config);
        let placeholder = tree.new_container(ContainerKind::Leaf);
        tree.attach(placeholder, other, false).unwrap();
        tree.map[placeholder].sticky_group = Some("notes".into());

        tree.show_workspace(other, &config);
        assert!(tree.map[placeholder].window.is_some(), "window moved to the shown member");
        assert!(tree.map[holder].window.is_none());
        assert_eq!(tree.leaf_by_window(77), Some(placeholder));
    }
}
