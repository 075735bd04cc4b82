use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Default decoration strip height in pixels. Title rendering itself is done
/// by the decoration sidecar; the tree only reserves the space.
fn default_deco_height() -> u32 { 18 }
fn default_border_width() -> u32 { 2 }
fn yes() -> bool { true }

pub fn config_dir() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from("/etc")).join("trellis")
}

pub fn config_file() -> PathBuf { config_dir().join("trellis.toml") }

pub fn runtime_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join("trellis")
}

/// Where `restart` serializes the tree for the replacement process.
pub fn snapshot_file() -> PathBuf {
    runtime_dir().join(format!("restart-{}.json", std::process::id()))
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeSpec {
    pub width: i32,
    pub height: i32,
}

impl SizeSpec {
    pub const UNLIMITED: SizeSpec = SizeSpec { width: -1, height: -1 };
}

fn default_floating_minimum() -> SizeSpec { SizeSpec { width: 75, height: 50 } }
fn default_floating_maximum() -> SizeSpec { SizeSpec::UNLIMITED }

/// Space between windows and the screen edges.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct OuterGaps {
    #[serde(default)]
    pub top: u32,
    #[serde(default)]
    pub left: u32,
    #[serde(default)]
    pub bottom: u32,
    #[serde(default)]
    pub right: u32,
}

/// Space between adjacent tiling windows.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct InnerGaps {
    #[serde(default)]
    pub horizontal: u32,
    #[serde(default)]
    pub vertical: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct GapSettings {
    #[serde(default)]
    pub outer: OuterGaps,
    #[serde(default)]
    pub inner: InnerGaps,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrientationSetting {
    #[default]
    Auto,
    Horizontal,
    Vertical,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceLayoutSetting {
    #[default]
    Default,
    Stacked,
    Tabbed,
}

/// One window assignment rule: every populated match field must hold for the
/// rule to apply. `title`, `class` and `instance` are regexes; the rest are
/// exact predicates.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct AssignmentConfig {
    pub title: Option<String>,
    pub class: Option<String>,
    pub instance: Option<String>,
    /// Matches a container carrying this mark (windows re-managed after a
    /// restart keep theirs).
    pub mark: Option<String>,
    /// Matches one specific X11 window id.
    pub window_id: Option<u32>,
    /// True matches transient windows, false matches non-transient ones.
    pub transient_for: Option<bool>,
    /// True matches dock clients, false matches regular windows.
    pub dock: Option<bool>,
    #[serde(default)]
    pub floating: bool,
    /// Send matching windows to this workspace.
    pub workspace: Option<String>,
    /// Send matching windows to this output.
    pub output: Option<String>,
    /// Run this command string against the new window.
    pub command: Option<String>,
}

/// Pins a workspace name to an output, consulted when the workspace is
/// first created.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceOutputConfig {
    pub workspace: String,
    pub output: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "yes")]
    pub focus_follows_mouse: bool,
    #[serde(default)]
    pub workspace_auto_back_and_forth: bool,
    #[serde(default = "default_border_width")]
    pub border_width: u32,
    #[serde(default = "default_deco_height")]
    pub deco_height: u32,
    #[serde(default)]
    pub gaps: GapSettings,
    #[serde(default)]
    pub default_orientation: OrientationSetting,
    #[serde(default)]
    pub workspace_layout: WorkspaceLayoutSetting,
    #[serde(default = "default_floating_minimum")]
    pub floating_minimum_size: SizeSpec,
    #[serde(default = "default_floating_maximum")]
    pub floating_maximum_size: SizeSpec,
    /// Preferred names for auto-created workspaces, in order.
    #[serde(default)]
    pub workspace_names: Vec<String>,
    #[serde(default)]
    pub assignments: Vec<AssignmentConfig>,
    #[serde(default)]
    pub workspace_outputs: Vec<WorkspaceOutputConfig>,
    /// Commands launched once at startup.
    #[serde(default)]
    pub exec: Vec<String>,
    /// Status bar sidecar command; a failure is logged, not respawned.
    pub bar_command: Option<String>,
    /// Overrides the default IPC socket path.
    pub ipc_socket: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            focus_follows_mouse: true,
            workspace_auto_back_and_forth: false,
            border_width: default_border_width(),
            deco_height: default_deco_height(),
            gaps: GapSettings::default(),
            default_orientation: OrientationSetting::default(),
            workspace_layout: WorkspaceLayoutSetting::default(),
            floating_minimum_size: default_floating_minimum(),
            floating_maximum_size: default_floating_maximum(),
            workspace_names: Vec::new(),
            assignments: Vec::new(),
            workspace_outputs: Vec::new(),
            exec: Vec::new(),
            bar_command: None,
            ipc_socket: None,
        }
    }
}

impl Config {
    pub fn read(path: &Path) -> anyhow::Result<Config> {
        let buf = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&buf)
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Config> {
        if path.exists() {
            Self::read(path)
        } else {
            Ok(Config::default())
        }
    }

    fn parse(buf: &str) -> anyhow::Result<Config> {
        let config: Config = toml::from_str(buf).context("parsing config")?;
        Ok(config)
    }

    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.deco_height == 0 {
            issues.push("deco_height must be at least 1".to_string());
        }
        for (index, rule) in self.assignments.iter().enumerate() {
            if rule.title.is_none()
                && rule.class.is_none()
                && rule.instance.is_none()
                && rule.mark.is_none()
                && rule.window_id.is_none()
                && rule.transient_for.is_none()
                && rule.dock.is_none()
            {
                issues.push(format!("assignment {index} has no match criteria"));
            }
            if rule.workspace.is_none() && rule.output.is_none() && rule.command.is_none() {
                issues.push(format!("assignment {index} has no action"));
            }
            for (field, pattern) in [
                ("title", rule.title.as_deref()),
                ("class", rule.class.as_deref()),
                ("instance", rule.instance.as_deref()),
            ] {
                if let Some(pattern) = pattern {
                    if let Err(e) = regex::Regex::new(pattern) {
                        issues.push(format!("assignment {index}: bad {field} pattern: {e}"));
                    }
                }
            }
        }
        for (index, pin) in self.workspace_outputs.iter().enumerate() {
            if pin.workspace.is_empty() {
                issues.push(format!("workspace_outputs {index} has an empty workspace name"));
            }
        }
        let mut seen = std::collections::HashSet::new();
        for name in &self.workspace_names {
            if !seen.insert(name) {
                issues.push(format!("duplicate workspace name {name:?}"));
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert!(config.focus_follows_mouse);
        assert_eq!(config.border_width, 2);
        assert_eq!(config.floating_minimum_size, SizeSpec { width: 75, height: 50 });
        assert_eq!(config.floating_maximum_size, SizeSpec::UNLIMITED);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn parses_assignments_and_sizes() {
        let config = Config::parse(
            r#"
            floating_minimum_size = { width = 60, height = 40 }
            workspace_names = ["web", "mail"]

            [[assignments]]
            class = "^Gimp$"
            floating = true

            [[assignments]]
            title = "Calculator"
            workspace = "5"
            "#,
        )
        .unwrap();
        assert_eq!(config.floating_minimum_size, SizeSpec { width: 60, height: 40 });
        assert_eq!(config.assignments.len(), 2);
        assert!(config.assignments[0].floating);
        assert_eq!(config.assignments[1].workspace.as_deref(), Some("5"));
        assert!(config.validate().is_empty());
    }

    #[test]
    fn parses_gaps() {
        let config = Config::parse(
            r#"
            [gaps.outer]
            top = 8
            left = 8
            bottom = 8
            right = 8

            [gaps.inner]
            horizontal = 6
            vertical = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.gaps.outer.top, 8);
        assert_eq!(config.gaps.inner.horizontal, 6);
        assert_eq!(config.gaps.inner.vertical, 4);
        // gaps default to zero
        assert_eq!(Config::default().gaps, GapSettings::default());
    }

    #[test]
    fn validate_flags_empty_rules() {
        let config = Config::parse("[[assignments]]\nworkspace = \"3\"\n").unwrap();
        let issues = config.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].contains("no match criteria"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::parse("animate = true").is_err());
    }
}
