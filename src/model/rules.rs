//! Assignment rules, evaluated once per window at adoption time. Rules a
//! window has already seen are recorded on its descriptor and never run
//! again, so re-managing after a restart cannot double-apply them.

use regex::Regex;
use tracing::warn;

use crate::common::config::AssignmentConfig;
use crate::model::window::WindowInfo;

pub struct Matcher {
    pub title: Option<Regex>,
    pub class: Option<Regex>,
    pub instance: Option<Regex>,
    pub mark: Option<String>,
    pub window_id: Option<u32>,
    pub transient: Option<bool>,
    pub dock: Option<bool>,
}

impl Matcher {
    fn from_config(rule: &AssignmentConfig) -> Option<Matcher> {
        let compile = |field: &str, pattern: &Option<String>| -> Result<Option<Regex>, ()> {
            match pattern {
                None => Ok(None),
                Some(p) => match Regex::new(p) {
                    Ok(re) => Ok(Some(re)),
                    Err(e) => {
                        warn!(field, pattern = p.as_str(), error = %e, "ignoring assignment with bad pattern");
                        Err(())
                    }
                },
            }
        };
        Some(Matcher {
            title: compile("title", &rule.title).ok()?,
            class: compile("class", &rule.class).ok()?,
            instance: compile("instance", &rule.instance).ok()?,
            mark: rule.mark.clone(),
            window_id: rule.window_id,
            transient: rule.transient_for,
            dock: rule.dock,
        })
    }

    /// `mark` is the mark on the container the window is (or will be)
    /// bound to; fresh windows have none.
    pub fn matches(&self, window: &WindowInfo, mark: Option<&str>) -> bool {
        if let Some(re) = &self.title {
            if !re.is_match(&window.title) {
                return false;
            }
        }
        if let Some(re) = &self.class {
            if !re.is_match(&window.class) {
                return false;
            }
        }
        if let Some(re) = &self.instance {
            if !re.is_match(&window.instance) {
                return false;
            }
        }
        if let Some(wanted) = &self.mark {
            if mark != Some(wanted.as_str()) {
                return false;
            }
        }
        if let Some(id) = self.window_id {
            if window.id != id {
                return false;
            }
        }
        if let Some(transient) = self.transient {
            if window.transient_for.is_some() != transient {
                return false;
            }
        }
        if let Some(dock) = self.dock {
            if window.dock.is_some() != dock {
                return false;
            }
        }
        true
    }
}

pub struct Assignment {
    /// Position in the config, recorded in `ran_assignments`.
    pub index: usize,
    pub matcher: Matcher,
    pub floating: bool,
    pub workspace: Option<String>,
    pub output: Option<String>,
    pub command: Option<String>,
}

pub fn compile(rules: &[AssignmentConfig]) -> Vec<Assignment> {
    rules
        .iter()
        .enumerate()
        .filter_map(|(index, rule)| {
            let matcher = Matcher::from_config(rule)?;
            Some(Assignment {
                index,
                matcher,
                floating: rule.floating,
                workspace: rule.workspace.clone(),
                output: rule.output.clone(),
                command: rule.command.clone(),
            })
        })
        .collect()
}

/// Outcome of evaluating every applicable rule against one window.
#[derive(Default, Debug, PartialEq)]
pub struct Placement {
    /// First matching workspace target, if any.
    pub workspace: Option<String>,
    /// First matching output target, considered only without a workspace.
    pub output: Option<String>,
    pub floating: bool,
    /// Every matching command action, in rule order.
    pub commands: Vec<String>,
    /// Rule indices that matched, to be appended to `ran_assignments`.
    pub ran: Vec<usize>,
}

pub fn evaluate(
    assignments: &[Assignment],
    window: &WindowInfo,
    mark: Option<&str>,
) -> Placement {
    let mut placement = Placement::default();
    for rule in assignments {
        if window.ran_assignments.contains(&rule.index) {
            continue;
        }
        if !rule.matcher.matches(window, mark) {
            continue;
        }
        placement.ran.push(rule.index);
        placement.floating |= rule.floating;
        if placement.workspace.is_none() && placement.output.is_none() {
            if let Some(ws) = &rule.workspace {
                placement.workspace = Some(ws.clone());
            } else if let Some(output) = &rule.output {
                placement.output = Some(output.clone());
            }
        }
        if let Some(command) = &rule.command {
            placement.commands.push(command.clone());
        }
    }
    placement
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::window::DockPosition;

    fn window(class: &str, title: &str) -> WindowInfo {
        let mut win = WindowInfo::new(0x600001);
        win.class = class.to_string();
        win.title = title.to_string();
        win
    }

    fn rules() -> Vec<Assignment> {
        compile(&[
            AssignmentConfig {
                class: Some("^Gimp$".into()),
                floating: true,
                ..Default::default()
            },
            AssignmentConfig {
                title: Some("Mail".into()),
                workspace: Some("mail".into()),
                ..Default::default()
            },
            AssignmentConfig {
                title: Some("Mail".into()),
                workspace: Some("elsewhere".into()),
                command: Some("mark inbox".into()),
                ..Default::default()
            },
        ])
    }

    #[test]
    fn first_placement_wins_and_commands_accumulate() {
        let placement = evaluate(&rules(), &window("Thunderbird", "Mail - Inbox"), None);
        assert_eq!(placement.workspace.as_deref(), Some("mail"));
        assert_eq!(placement.commands, vec!["mark inbox".to_string()]);
        assert_eq!(placement.ran, vec![1, 2]);
        assert!(!placement.floating);
    }

    #[test]
    fn floating_rule_applies() {
        let placement = evaluate(&rules(), &window("Gimp", "untitled"), None);
        assert!(placement.floating);
        assert!(placement.workspace.is_none());
    }

    #[test]
    fn already_ran_rules_are_skipped() {
        let mut win = window("Thunderbird", "Mail - Inbox");
        win.ran_assignments = vec![1];
        let placement = evaluate(&rules(), &win, None);
        assert_eq!(placement.workspace.as_deref(), Some("elsewhere"));
    }

    #[test]
    fn exact_predicates_match_id_transient_dock_and_mark() {
        let compiled = compile(&[
            AssignmentConfig {
                window_id: Some(0x600001),
                workspace: Some("pinned".into()),
                ..Default::default()
            },
            AssignmentConfig {
                transient_for: Some(true),
                floating: true,
                ..Default::default()
            },
            AssignmentConfig {
                dock: Some(true),
                command: Some("nop".into()),
                ..Default::default()
            },
            AssignmentConfig {
                mark: Some("sticky-notes".into()),
                output: Some("fake-1".into()),
                ..Default::default()
            },
        ]);

        let plain = window("X", "x");
        let placement = evaluate(&compiled, &plain, None);
        assert_eq!(placement.workspace.as_deref(), Some("pinned"));
        assert!(!placement.floating);
        assert!(placement.commands.is_empty());

        let mut transient = window("X", "x");
        transient.id = 0x600099;
        transient.transient_for = Some(0x600001);
        let placement = evaluate(&compiled, &transient, None);
        assert!(placement.floating);
        assert!(placement.workspace.is_none());

        let mut docked = window("X", "x");
        docked.id = 0x600098;
        docked.dock = Some(DockPosition::Top);
        let placement = evaluate(&compiled, &docked, None);
        assert_eq!(placement.commands, vec!["nop".to_string()]);

        let mut marked = window("X", "x");
        marked.id = 0x600097;
        let placement = evaluate(&compiled, &marked, Some("sticky-notes"));
        assert_eq!(placement.output.as_deref(), Some("fake-1"));
        let placement = evaluate(&compiled, &marked, None);
        assert!(placement.output.is_none());
    }

    #[test]
    fn bad_patterns_are_dropped_at_compile() {
        let compiled = compile(&[AssignmentConfig {
            title: Some("(unclosed".into()),
            workspace: Some("1".into()),
            ..Default::default()
        }]);
        assert!(compiled.is_empty());
    }
}
