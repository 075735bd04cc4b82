//! JSON bodies for IPC replies and events. The tree dump mirrors the
//! in-memory containers closely enough that a client can reconstruct the
//! exact layout.

use serde_json::{json, Value};

use crate::model::geometry::Rect;
use crate::model::tree::{ContainerId, ContainerKind, Layout, Orientation, Tree};

pub const VERSION: (u32, u32, u32) = (0, 4, 0);

fn rect_json(rect: &Rect) -> Value {
    json!({
        "x": rect.x,
        "y": rect.y,
        "width": rect.width,
        "height": rect.height,
    })
}

fn kind_ordinal(kind: ContainerKind) -> u8 {
    match kind {
        ContainerKind::Root => 0,
        ContainerKind::Output => 1,
        ContainerKind::Content => 2,
        ContainerKind::Dockarea => 3,
        ContainerKind::Workspace => 4,
        ContainerKind::Split => 5,
        ContainerKind::Leaf => 6,
        ContainerKind::FloatingWrapper => 7,
    }
}

fn orientation_name(orientation: Orientation) -> &'static str {
    match orientation {
        Orientation::Unset => "none",
        Orientation::Horizontal => "horizontal",
        Orientation::Vertical => "vertical",
    }
}

fn layout_name(layout: Layout) -> &'static str {
    match layout {
        Layout::Split => "default",
        Layout::Stacked => "stacked",
        Layout::Tabbed => "tabbed",
        Layout::Dockarea => "dockarea",
        Layout::Output => "output",
    }
}

pub fn container_json(tree: &Tree, id: ContainerId) -> Value {
    let con = &tree.map[id];
    let nodes: Vec<Value> =
        con.children.iter().map(|&child| container_json(tree, child)).collect();
    let floating_nodes: Vec<Value> =
        con.floating_children.iter().map(|&child| container_json(tree, child)).collect();
    let focus: Vec<u64> = con.focus_stack.iter().map(|c| c.as_u64()).collect();
    json!({
        "id": id.as_u64(),
        "type": kind_ordinal(con.kind),
        "orientation": orientation_name(con.orientation),
        "layout": layout_name(con.layout),
        "percent": if con.percent > 0.0 { Value::from(con.percent) } else { Value::Null },
        "rect": rect_json(&con.rect),
        "window_rect": rect_json(&con.window_rect),
        "deco_rect": rect_json(&con.deco_rect),
        "geometry": rect_json(&con.geometry),
        "name": con.name,
        "num": con.num,
        "urgent": con.urgent,
        "focused": id == tree.focused,
        "focus": focus,
        "nodes": nodes,
        "floating_nodes": floating_nodes,
        "window": con.window.as_ref().map(|w| w.id),
    })
}

pub fn tree_json(tree: &Tree) -> Value {
    container_json(tree, tree.root)
}

pub fn workspaces_json(tree: &Tree) -> Value {
    let mut entries = Vec::new();
    for ws in tree.workspaces_in_order(None) {
        let con = &tree.map[ws];
        let output = tree
            .output_of(ws)
            .map(|o| tree.map[o].name.clone())
            .unwrap_or_default();
        let focused = tree.workspace_of(tree.focused) == Some(ws);
        entries.push(json!({
            "num": con.num,
            "name": con.name,
            "visible": tree.workspace_is_visible(ws),
            "focused": focused,
            "urgent": con.urgent,
            "rect": rect_json(&con.rect),
            "output": output,
        }));
    }
    Value::Array(entries)
}

pub fn outputs_json(tree: &Tree) -> Value {
    let mut entries = Vec::new();
    for &output in &tree.map[tree.root].children {
        let con = &tree.map[output];
        let active = con.name != "__i3";
        let current = tree
            .visible_workspace_on(output)
            .map(|ws| tree.map[ws].name.clone());
        entries.push(json!({
            "name": con.name,
            "active": active,
            "current_workspace": current,
            "rect": rect_json(&con.rect),
        }));
    }
    Value::Array(entries)
}

pub fn marks_json(tree: &Tree) -> Value {
    let marks: Vec<&str> = tree
        .map
        .iter()
        .filter_map(|(_, c)| c.mark.as_deref())
        .collect();
    json!(marks)
}

pub fn bar_config_json() -> Value {
    // bar ids; the decoration sidecar owns actual bar configuration
    json!([])
}

pub fn version_json() -> Value {
    let (major, minor, patch) = VERSION;
    json!({
        "major": major,
        "minor": minor,
        "patch": patch,
        "human_readable": format!("{major}.{minor}.{patch}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tree::tests::{open_leaf, tree_with_workspace};

    #[test]
    fn tree_dump_has_the_documented_keys() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let leaf = open_leaf(&mut tree, ws, 0x900001);
        tree.set_focus(leaf);
        let dump = tree_json(&tree);
        for key in [
            "id", "type", "orientation", "layout", "percent", "rect", "window_rect",
            "deco_rect", "geometry", "name", "num", "urgent", "focused", "focus", "nodes",
            "floating_nodes", "window",
        ] {
            assert!(dump.get(key).is_some(), "missing key {key}");
        }
        assert_eq!(dump["type"], 0);
        assert_eq!(dump["window"], Value::Null);
    }

    #[test]
    fn focused_flag_lands_on_the_focused_leaf() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let leaf = open_leaf(&mut tree, ws, 0x900002);
        tree.set_focus(leaf);
        let dump = tree_json(&tree);
        fn find_focused(value: &Value) -> Option<u64> {
            if value["focused"] == Value::Bool(true) {
                return value["window"].as_u64();
            }
            for child in value["nodes"].as_array().into_iter().flatten() {
                if let Some(found) = find_focused(child) {
                    return Some(found);
                }
            }
            None
        }
        assert_eq!(find_focused(&dump), Some(0x900002));
    }

    #[test]
    fn workspace_reply_reports_visibility() {
        let (mut tree, _, _ws) = tree_with_workspace("2");
        let config = crate::common::config::Config::default();
        let (_other, _) = tree.workspace_get("9", &config);
        let reply = workspaces_json(&tree);
        let entries = reply.as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["name"], "2");
        assert_eq!(entries[0]["visible"], true);
        assert_eq!(entries[1]["name"], "9");
        assert_eq!(entries[1]["visible"], false);
    }

    #[test]
    fn outputs_reply_marks_internal_output_inactive() {
        let (tree, _, _) = tree_with_workspace("1");
        let reply = outputs_json(&tree);
        let entries = reply.as_array().unwrap();
        let internal = entries.iter().find(|e| e["name"] == "__i3").unwrap();
        assert_eq!(internal["active"], false);
        let real = entries.iter().find(|e| e["name"] == "fake-0").unwrap();
        assert_eq!(real["active"], true);
        assert_eq!(real["current_workspace"], "1");
    }
}
