//! Tree snapshots for restart-in-place. The whole arena is serialized to
//! JSON; the replacement process loads it, reindexes the window maps and
//! re-manages the still-alive X windows it finds.

use std::path::Path;

use anyhow::Context;
use tracing::{info, warn};

use crate::model::tree::Tree;

pub fn save(tree: &Tree) -> anyhow::Result<String> {
    serde_json::to_string(tree).context("serializing layout")
}

pub fn load(buf: &str) -> anyhow::Result<Tree> {
    let mut tree: Tree = serde_json::from_str(buf).context("parsing layout snapshot")?;
    tree.reindex_windows();
    Ok(tree)
}

pub fn save_to(tree: &Tree, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let buf = save(tree)?;
    std::fs::write(path, buf)
        .with_context(|| format!("writing layout snapshot {}", path.display()))?;
    info!(path = %path.display(), "layout snapshot written");
    Ok(())
}

/// Restore from a snapshot file. Any failure falls back to an empty tree;
/// a stale layout must never keep the manager from starting.
pub fn load_from(path: &Path) -> Tree {
    let restored = std::fs::read_to_string(path)
        .context("reading layout snapshot")
        .and_then(|buf| load(&buf));
    match restored {
        Ok(tree) => {
            info!(path = %path.display(), "layout snapshot restored");
            tree
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unusable layout snapshot");
            Tree::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tree::tests::{open_leaf, tree_with_workspace};

    #[test]
    fn snapshot_round_trips_identically() {
        let (mut tree, _, ws) = tree_with_workspace("1");
        let a = open_leaf(&mut tree, ws, 0x500001);
        let _b = open_leaf(&mut tree, ws, 0x500002);
        tree.set_focus(a);
        tree.take_effects();

        let first = save(&tree).unwrap();
        let restored = load(&first).unwrap();
        let second = save(&restored).unwrap();
        assert_eq!(first, second);
        assert_eq!(restored.focused, tree.focused);
        assert_eq!(restored.leaf_by_window(0x500001), Some(a));
    }

    #[test]
    fn malformed_snapshot_yields_fresh_tree() {
        let dir = std::env::temp_dir().join("trellis-snapshot-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        let tree = load_from(&path);
        assert!(tree.validate().is_empty());
        assert!(tree.workspace_by_name("__i3_scratch").is_some());
    }
}
