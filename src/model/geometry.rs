//! Rectangle math and the layout solver.
//!
//! `Tree::render` computes every container's `rect`, `window_rect` and
//! `deco_rect` top-down from the output rectangles. It only writes
//! geometry; mapping, stacking and focus pushes are derived from the tree
//! afterwards.

use serde::{Deserialize, Serialize};

use crate::common::config::{Config, OuterGaps, SizeSpec};
use crate::model::tree::{ContainerId, ContainerKind, FullscreenMode, Layout, Orientation, Tree};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x
            && x < self.x + self.width as i32
            && y >= self.y
            && y < self.y + self.height as i32
    }

    pub fn translate(&self, dx: i32, dy: i32) -> Rect {
        Rect { x: self.x + dx, y: self.y + dy, ..*self }
    }

    /// Shrink by `amount` on every side, saturating at zero size.
    pub fn inset(&self, amount: u32) -> Rect {
        Rect {
            x: self.x + amount as i32,
            y: self.y + amount as i32,
            width: self.width.saturating_sub(2 * amount),
            height: self.height.saturating_sub(2 * amount),
        }
    }

    pub fn center_of(&self) -> (i32, i32) {
        (self.x + self.width as i32 / 2, self.y + self.height as i32 / 2)
    }

    /// Position `self` centered inside `outer`, size unchanged.
    pub fn centered_in(&self, outer: &Rect) -> Rect {
        Rect {
            x: outer.x + (outer.width.saturating_sub(self.width) / 2) as i32,
            y: outer.y + (outer.height.saturating_sub(self.height) / 2) as i32,
            ..*self
        }
    }

    pub fn is_empty(&self) -> bool { self.width == 0 || self.height == 0 }
}

/// Clamp a floating rectangle to the configured minimum and maximum sizes.
/// A `-1` extent means unlimited on that axis.
pub fn clamp_floating_size(mut rect: Rect, minimum: SizeSpec, maximum: SizeSpec) -> Rect {
    if minimum.width > 0 {
        rect.width = rect.width.max(minimum.width as u32);
    }
    if minimum.height > 0 {
        rect.height = rect.height.max(minimum.height as u32);
    }
    if maximum.width > 0 {
        rect.width = rect.width.min(maximum.width as u32);
    }
    if maximum.height > 0 {
        rect.height = rect.height.min(maximum.height as u32);
    }
    rect
}

/// Translate a floating rectangle so its offset relative to the workspace
/// origin is preserved across an output move.
pub fn translate_between_outputs(rect: Rect, from: &Rect, to: &Rect) -> Rect {
    rect.translate(to.x - from.x, to.y - from.y)
}

/// The tiling area left inside a workspace once the outer gaps are taken.
fn apply_outer_gaps(rect: Rect, outer: &OuterGaps) -> Rect {
    Rect {
        x: rect.x + outer.left as i32,
        y: rect.y + outer.top as i32,
        width: rect.width.saturating_sub(outer.left + outer.right),
        height: rect.height.saturating_sub(outer.top + outer.bottom),
    }
}

impl Tree {
    /// Recompute geometry for the whole tree.
    pub fn render(&mut self, config: &Config) {
        let outputs: Vec<ContainerId> = self.map[self.root].children.clone();
        let mut bound: Option<Rect> = None;
        for output in &outputs {
            let rect = self.map[*output].rect;
            bound = Some(match bound {
                None => rect,
                Some(b) => union(b, rect),
            });
        }
        if let Some(bound) = bound {
            self.map[self.root].rect = bound;
        }
        for output in outputs {
            self.render_output(output, config);
        }
    }

    fn render_output(&mut self, output: ContainerId, config: &Config) {
        let rect = self.map[output].rect;
        let mut top = 0u32;
        let mut bottom = 0u32;
        let children = self.map[output].children.clone();

        // Dockareas first: their struts carve the content area.
        for child in &children {
            if self.map[*child].kind != ContainerKind::Dockarea {
                continue;
            }
            let height: u32 = self.map[*child]
                .children
                .iter()
                .map(|dock| {
                    self.map[*dock].window.as_ref().map_or(0, |w| w.reserved_height())
                })
                .sum();
            let at_top = self.map[*child].name == "topdock";
            let dock_rect = if at_top {
                top = height;
                Rect::new(rect.x, rect.y, rect.width, height)
            } else {
                bottom = height;
                Rect::new(
                    rect.x,
                    rect.y + rect.height.saturating_sub(height) as i32,
                    rect.width,
                    height,
                )
            };
            self.map[*child].rect = dock_rect;
            let mut y = dock_rect.y;
            for dock in self.map[*child].children.clone() {
                let h = self.map[dock].window.as_ref().map_or(0, |w| w.reserved_height());
                let r = Rect::new(dock_rect.x, y, dock_rect.width, h);
                self.map[dock].rect = r;
                self.map[dock].window_rect = r;
                y += h as i32;
            }
        }

        let content_rect = Rect::new(
            rect.x,
            rect.y + top as i32,
            rect.width,
            rect.height.saturating_sub(top + bottom),
        );
        for child in children {
            if self.map[child].kind != ContainerKind::Content {
                continue;
            }
            self.map[child].rect = content_rect;
            for workspace in self.map[child].children.clone() {
                self.map[workspace].rect = content_rect;
                self.render_container(workspace, content_rect, config);
                for wrapper in self.map[workspace].floating_children.clone() {
                    self.render_floating(wrapper, config);
                }
            }
        }
    }

    fn render_floating(&mut self, wrapper: ContainerId, config: &Config) {
        let rect = clamp_floating_size(
            self.map[wrapper].rect,
            config.floating_minimum_size,
            config.floating_maximum_size,
        );
        self.map[wrapper].rect = rect;
        let border = config.border_width;
        let inner = Rect {
            x: rect.x + border as i32,
            y: rect.y + (border + config.deco_height) as i32,
            width: rect.width.saturating_sub(2 * border),
            height: rect.height.saturating_sub(2 * border + config.deco_height),
        };
        self.map[wrapper].deco_rect =
            Rect::new(0, 0, rect.width, config.deco_height);
        for child in self.map[wrapper].children.clone() {
            self.render_container(child, inner, config);
        }
    }

    /// Lay out one tiling container and its subtree inside `rect`.
    fn render_container(&mut self, id: ContainerId, rect: Rect, config: &Config) {
        // A global-fullscreen container covers the root; an output-fullscreen
        // leaf covers its output. Workspaces use Output mode for visibility,
        // so only non-workspace containers escape their slot here.
        let con = &self.map[id];
        let rect = match con.fullscreen_mode {
            FullscreenMode::Global if con.kind != ContainerKind::Workspace => {
                self.map[self.root].rect
            }
            FullscreenMode::Output if con.kind != ContainerKind::Workspace => {
                let output = self
                    .ancestor_of_kind(id, ContainerKind::Output)
                    .map(|o| self.map[o].rect)
                    .unwrap_or(rect);
                output
            }
            _ => rect,
        };
        self.map[id].rect = rect;

        if self.map[id].window.is_some() {
            let fullscreen = self.map[id].fullscreen_mode != FullscreenMode::None;
            let border = if fullscreen { 0 } else { config.border_width };
            self.map[id].window_rect = rect.inset(border);
            return;
        }

        let children = self.map[id].children.clone();
        if children.is_empty() {
            return;
        }
        // the workspace rect spans the whole content area; its children are
        // laid out inside the outer gaps
        let rect = if self.map[id].kind == ContainerKind::Workspace {
            apply_outer_gaps(rect, &config.gaps.outer)
        } else {
            rect
        };
        match self.map[id].layout {
            Layout::Stacked => {
                let deco_block = config.deco_height * children.len() as u32;
                let body = Rect {
                    x: rect.x,
                    y: rect.y + deco_block as i32,
                    width: rect.width,
                    height: rect.height.saturating_sub(deco_block),
                };
                for (i, child) in children.iter().enumerate() {
                    self.map[*child].deco_rect = Rect::new(
                        0,
                        (config.deco_height * i as u32) as i32,
                        rect.width,
                        config.deco_height,
                    );
                    self.render_container(*child, body, config);
                }
            }
            Layout::Tabbed => {
                let body = Rect {
                    x: rect.x,
                    y: rect.y + config.deco_height as i32,
                    width: rect.width,
                    height: rect.height.saturating_sub(config.deco_height),
                };
                let tab_width = rect.width / children.len() as u32;
                for (i, child) in children.iter().enumerate() {
                    self.map[*child].deco_rect = Rect::new(
                        (tab_width * i as u32) as i32,
                        0,
                        tab_width,
                        config.deco_height,
                    );
                    self.render_container(*child, body, config);
                }
            }
            _ => self.render_axis(id, rect, config),
        }
    }

    fn render_axis(&mut self, id: ContainerId, rect: Rect, config: &Config) {
        let children = self.map[id].children.clone();
        let horizontal = self.map[id].orientation != Orientation::Vertical;
        let inner_gap = if horizontal {
            config.gaps.inner.horizontal
        } else {
            config.gaps.inner.vertical
        };
        // percentages partition what is left after the inter-child gaps
        let total_gap = inner_gap * children.len().saturating_sub(1) as u32;
        let axis_len = if horizontal { rect.width } else { rect.height };
        let usable = axis_len.saturating_sub(total_gap) as f64;

        let mut offset = 0u32;
        let mut assigned = 0u32;
        for (i, child) in children.iter().enumerate() {
            let percent = self.map[*child].percent;
            let len = if i == children.len() - 1 {
                // the last child absorbs rounding error
                (usable as u32).saturating_sub(assigned)
            } else {
                (usable * percent).floor() as u32
            };
            let child_rect = if horizontal {
                Rect::new(rect.x + offset as i32, rect.y, len, rect.height)
            } else {
                Rect::new(rect.x, rect.y + offset as i32, rect.width, len)
            };
            self.render_container(*child, child_rect, config);
            offset += len + inner_gap;
            assigned += len;
        }
    }
}

fn union(a: Rect, b: Rect) -> Rect {
    let x1 = a.x.min(b.x);
    let y1 = a.y.min(b.y);
    let x2 = (a.x + a.width as i32).max(b.x + b.width as i32);
    let y2 = (a.y + a.height as i32).max(b.y + b.height as i32);
    Rect::new(x1, y1, (x2 - x1) as u32, (y2 - y1) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_applies_minimum() {
        let min = SizeSpec { width: 60, height: 40 };
        let out = clamp_floating_size(Rect::new(0, 0, 20, 20), min, SizeSpec::UNLIMITED);
        assert_eq!((out.width, out.height), (60, 40));
    }

    #[test]
    fn clamp_applies_maximum() {
        let max = SizeSpec { width: 100, height: 100 };
        let out = clamp_floating_size(Rect::new(0, 0, 150, 150), SizeSpec::UNLIMITED, max);
        assert_eq!((out.width, out.height), (100, 100));
    }

    #[test]
    fn unlimited_leaves_size_alone() {
        let out = clamp_floating_size(
            Rect::new(0, 0, 2048, 2048),
            SizeSpec::UNLIMITED,
            SizeSpec::UNLIMITED,
        );
        assert_eq!((out.width, out.height), (2048, 2048));
    }

    #[test]
    fn gaps_carve_the_tiling_area() {
        use crate::model::tree::tests::{open_leaf, tree_with_workspace};
        let (mut tree, _, ws) = tree_with_workspace("1");
        let a = open_leaf(&mut tree, ws, 1);
        let b = open_leaf(&mut tree, ws, 2);
        let mut config = Config::default();
        config.gaps.outer = crate::common::config::OuterGaps {
            top: 10,
            left: 10,
            bottom: 10,
            right: 10,
        };
        config.gaps.inner.horizontal = 10;
        tree.settle(&config);
        // 1024x768 output: outer gaps leave 1004x748, one inner gap leaves
        // 994 to split between the two children
        assert_eq!(tree.map[ws].rect, Rect::new(0, 0, 1024, 768));
        assert_eq!(tree.map[a].rect, Rect::new(10, 10, 497, 748));
        assert_eq!(tree.map[b].rect, Rect::new(517, 10, 497, 748));
    }

    #[test]
    fn zero_gaps_partition_the_full_axis() {
        use crate::model::tree::tests::{open_leaf, tree_with_workspace};
        let (mut tree, _, ws) = tree_with_workspace("1");
        let a = open_leaf(&mut tree, ws, 1);
        let b = open_leaf(&mut tree, ws, 2);
        let config = Config::default();
        tree.settle(&config);
        assert_eq!(tree.map[a].rect, Rect::new(0, 0, 512, 768));
        assert_eq!(tree.map[b].rect, Rect::new(512, 0, 512, 768));
    }

    #[test]
    fn output_translation_preserves_workspace_offset() {
        let from = Rect::new(0, 0, 1024, 768);
        let to = Rect::new(1024, 0, 1024, 768);
        let moved = translate_between_outputs(Rect::new(100, 100, 200, 150), &from, &to);
        assert_eq!(moved, Rect::new(1124, 100, 200, 150));
    }
}
