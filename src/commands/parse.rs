//! Text form of commands: `;` separates commands, `,` separates operations
//! within one command, and a leading `[key=value ...]` block narrows the
//! selection. Quoting with `"` is honored everywhere.

use thiserror::Error;

use super::{
    Command, Criteria, FocusTarget, KillTarget, LayoutArg, MoveTarget, Operation, ResizeKind,
    SplitAxis, ToggleArg, WorkspaceTarget,
};
use crate::model::focus::Direction;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command: {0}")]
    UnknownOperation(String),
    #[error("malformed criteria: {0}")]
    BadCriteria(String),
    #[error("{0} expects an argument")]
    MissingArgument(&'static str),
    #[error("invalid argument for {0}: {1}")]
    BadArgument(&'static str, String),
}

/// Split `input` at top-level occurrences of `sep`, honoring quotes and
/// criteria brackets.
fn split_level(input: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut depth = 0usize;
    let mut chars = input.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '\\' if in_quotes => {
                current.push(ch);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '[' if !in_quotes => {
                depth += 1;
                current.push(ch);
            }
            ']' if !in_quotes => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            c if c == sep && !in_quotes && depth == 0 => {
                parts.push(current.clone());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    parts.push(current);
    parts
}

/// Whitespace tokenization with quote support; quotes are stripped.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut seen_quote = false;
    let mut chars = input.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                seen_quote = true;
            }
            '\\' if in_quotes => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() || seen_quote {
                    tokens.push(std::mem::take(&mut current));
                    seen_quote = false;
                }
            }
            _ => current.push(ch),
        }
    }
    if !current.is_empty() || seen_quote {
        tokens.push(current);
    }
    tokens
}

pub fn parse(input: &str) -> Result<Vec<Command>, ParseError> {
    let mut commands = Vec::new();
    for chunk in split_level(input, ';') {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        commands.push(parse_command(chunk)?);
    }
    Ok(commands)
}

fn parse_command(input: &str) -> Result<Command, ParseError> {
    let (criteria, rest) = if let Some(stripped) = input.strip_prefix('[') {
        let end = stripped
            .find(']')
            .ok_or_else(|| ParseError::BadCriteria("unterminated '['".into()))?;
        let criteria = parse_criteria(&stripped[..end])?;
        (Some(criteria), stripped[end + 1..].trim())
    } else {
        (None, input)
    };

    let mut operations = Vec::new();
    for op in split_level(rest, ',') {
        let op = op.trim();
        if op.is_empty() {
            continue;
        }
        operations.push(parse_operation(op)?);
    }
    if operations.is_empty() {
        return Err(ParseError::UnknownOperation(input.to_string()));
    }
    Ok(Command { criteria, operations })
}

fn parse_criteria(input: &str) -> Result<Criteria, ParseError> {
    let mut criteria = Criteria::default();
    for token in tokenize(input) {
        let (key, value) = match token.split_once('=') {
            Some((key, value)) => (key.to_string(), value.trim_matches('"').to_string()),
            None => (token.clone(), String::new()),
        };
        match key.as_str() {
            "class" => criteria.class = Some(value),
            "instance" => criteria.instance = Some(value),
            "title" => criteria.title = Some(value),
            "con_mark" | "mark" => criteria.mark = Some(value),
            "con_id" => {
                criteria.con_id = Some(
                    parse_number(&value)
                        .ok_or_else(|| ParseError::BadCriteria(format!("con_id={value}")))?,
                )
            }
            "id" => {
                criteria.window_id = Some(
                    parse_number(&value)
                        .map(|v| v as u32)
                        .ok_or_else(|| ParseError::BadCriteria(format!("id={value}")))?,
                )
            }
            "urgent" => criteria.urgent = Some(value != "false"),
            "floating" => criteria.floating = Some(true),
            "tiling" => criteria.floating = Some(false),
            other => return Err(ParseError::BadCriteria(other.to_string())),
        }
    }
    Ok(criteria)
}

fn parse_number(value: &str) -> Option<u64> {
    if let Some(hex) = value.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).ok()
    } else {
        value.parse().ok()
    }
}

fn direction(token: &str) -> Option<Direction> {
    match token {
        "left" => Some(Direction::Left),
        "right" => Some(Direction::Right),
        "up" => Some(Direction::Up),
        "down" => Some(Direction::Down),
        _ => None,
    }
}

fn parse_operation(input: &str) -> Result<Operation, ParseError> {
    let tokens = tokenize(input);
    let mut words = tokens.iter().map(String::as_str);
    let head = words.next().ok_or(ParseError::UnknownOperation(input.to_string()))?;
    let rest: Vec<&str> = words.collect();

    match head {
        "focus" => parse_focus(&rest),
        "move" => parse_move(&rest),
        "resize" => parse_resize(&rest),
        "split" => match rest.first().copied() {
            Some("h") | Some("horizontal") => Ok(Operation::Split(SplitAxis::Horizontal)),
            Some("v") | Some("vertical") => Ok(Operation::Split(SplitAxis::Vertical)),
            Some(other) => Err(ParseError::BadArgument("split", other.to_string())),
            None => Err(ParseError::MissingArgument("split")),
        },
        "layout" => match rest.first().copied() {
            Some("default") => Ok(Operation::Layout(LayoutArg::Default)),
            Some("stacked") | Some("stacking") => Ok(Operation::Layout(LayoutArg::Stacked)),
            Some("tabbed") => Ok(Operation::Layout(LayoutArg::Tabbed)),
            Some("toggle") => Ok(Operation::Layout(LayoutArg::Toggle)),
            Some(other) => Err(ParseError::BadArgument("layout", other.to_string())),
            None => Err(ParseError::MissingArgument("layout")),
        },
        "floating" => match rest.first().copied() {
            Some("enable") => Ok(Operation::Floating(ToggleArg::Enable)),
            Some("disable") => Ok(Operation::Floating(ToggleArg::Disable)),
            Some("toggle") | None => Ok(Operation::Floating(ToggleArg::Toggle)),
            Some(other) => Err(ParseError::BadArgument("floating", other.to_string())),
        },
        "fullscreen" => {
            let mut arg = ToggleArg::Toggle;
            let mut global = false;
            for token in rest {
                match token {
                    "enable" => arg = ToggleArg::Enable,
                    "disable" => arg = ToggleArg::Disable,
                    "toggle" => arg = ToggleArg::Toggle,
                    "global" => global = true,
                    other => {
                        return Err(ParseError::BadArgument("fullscreen", other.to_string()))
                    }
                }
            }
            Ok(Operation::Fullscreen { arg, global })
        }
        "kill" => match rest.first().copied() {
            Some("window") | None => Ok(Operation::Kill(KillTarget::Window)),
            Some("client") => Ok(Operation::Kill(KillTarget::Client)),
            Some(other) => Err(ParseError::BadArgument("kill", other.to_string())),
        },
        "mark" => match rest.first() {
            Some(name) => Ok(Operation::Mark(name.to_string())),
            None => Err(ParseError::MissingArgument("mark")),
        },
        "unmark" => Ok(Operation::Unmark),
        "workspace" => parse_workspace(&rest),
        "scratchpad" => match rest.first().copied() {
            Some("show") => Ok(Operation::ScratchpadShow),
            _ => Err(ParseError::BadArgument("scratchpad", rest.join(" "))),
        },
        "exec" => {
            let raw = input.strip_prefix("exec").unwrap_or(input).trim();
            let raw = raw.strip_prefix("--no-startup-id").unwrap_or(raw).trim();
            if raw.is_empty() {
                return Err(ParseError::MissingArgument("exec"));
            }
            Ok(Operation::Exec(raw.to_string()))
        }
        "nop" => Ok(Operation::Nop),
        "restart" => Ok(Operation::Restart),
        "reload" => Ok(Operation::Reload),
        "exit" => Ok(Operation::Exit),
        other => Err(ParseError::UnknownOperation(other.to_string())),
    }
}

fn parse_focus(rest: &[&str]) -> Result<Operation, ParseError> {
    let target = match rest.first().copied() {
        None => FocusTarget::This,
        Some("parent") => FocusTarget::Parent,
        Some("child") => FocusTarget::Child,
        Some("floating") => FocusTarget::Floating,
        Some("tiling") => FocusTarget::Tiling,
        Some("mode_toggle") => FocusTarget::ModeToggle,
        Some(token) => match direction(token) {
            Some(d) => FocusTarget::Direction(d),
            None => return Err(ParseError::BadArgument("focus", token.to_string())),
        },
    };
    Ok(Operation::Focus(target))
}

fn parse_move(rest: &[&str]) -> Result<Operation, ParseError> {
    // optional "container"/"window" noise words
    let rest: Vec<&str> = rest
        .iter()
        .copied()
        .filter(|t| *t != "container" && *t != "window")
        .collect();
    match rest.as_slice() {
        [token] if direction(token).is_some() => {
            Ok(Operation::Move(MoveTarget::Direction(direction(token).unwrap())))
        }
        ["scratchpad"] => Ok(Operation::Move(MoveTarget::Scratchpad)),
        ["workspace", "next"] => Ok(Operation::Move(MoveTarget::WorkspaceNext)),
        ["workspace", "prev"] => Ok(Operation::Move(MoveTarget::WorkspacePrev)),
        ["to", "workspace", "current"] => Ok(Operation::Move(MoveTarget::ToWorkspaceCurrent)),
        ["to", "workspace", "number", number] => {
            let number = number
                .parse()
                .map_err(|_| ParseError::BadArgument("move", number.to_string()))?;
            Ok(Operation::Move(MoveTarget::ToWorkspaceNumber(number)))
        }
        ["to", "workspace", name @ ..] if !name.is_empty() => {
            Ok(Operation::Move(MoveTarget::ToWorkspace(name.join(" "))))
        }
        ["to", "output", name @ ..] if !name.is_empty() => {
            Ok(Operation::Move(MoveTarget::ToOutput(name.join(" "))))
        }
        ["workspace", "to", "output", name @ ..] if !name.is_empty() => {
            // "move workspace to output X" relocates the whole workspace
            Ok(Operation::MoveWorkspaceToOutput(name.join(" ")))
        }
        _ => Err(ParseError::BadArgument("move", rest.join(" "))),
    }
}

fn parse_resize(rest: &[&str]) -> Result<Operation, ParseError> {
    let mut words = rest.iter().copied();
    let kind = match words.next() {
        Some("grow") => ResizeKind::Grow,
        Some("shrink") => ResizeKind::Shrink,
        Some(other) => return Err(ParseError::BadArgument("resize", other.to_string())),
        None => return Err(ParseError::MissingArgument("resize")),
    };
    let direction = match words.next() {
        Some("width") => Direction::Right,
        Some("height") => Direction::Down,
        Some(token) => {
            direction(token).ok_or_else(|| ParseError::BadArgument("resize", token.to_string()))?
        }
        None => return Err(ParseError::MissingArgument("resize")),
    };
    // [N px] [or M ppt], both defaulting to 10
    let mut px = 10u32;
    let mut ppt = 10u32;
    let numbers: Vec<&str> = words.collect();
    let mut i = 0;
    while i < numbers.len() {
        match numbers[i] {
            "or" => i += 1,
            value => {
                let parsed: u32 = value
                    .parse()
                    .map_err(|_| ParseError::BadArgument("resize", value.to_string()))?;
                match numbers.get(i + 1).copied() {
                    Some("px") => px = parsed,
                    Some("ppt") => ppt = parsed,
                    other => {
                        return Err(ParseError::BadArgument(
                            "resize",
                            other.unwrap_or("<end>").to_string(),
                        ))
                    }
                }
                i += 2;
            }
        }
    }
    Ok(Operation::Resize { kind, direction, px, ppt })
}

fn parse_workspace(rest: &[&str]) -> Result<Operation, ParseError> {
    let target = match rest {
        [] => return Err(ParseError::MissingArgument("workspace")),
        ["back_and_forth"] => WorkspaceTarget::BackAndForth,
        ["next"] => WorkspaceTarget::Next,
        ["prev"] => WorkspaceTarget::Prev,
        ["next_on_output"] => WorkspaceTarget::NextOnOutput,
        ["prev_on_output"] => WorkspaceTarget::PrevOnOutput,
        ["number", number] => WorkspaceTarget::Number(
            number
                .parse()
                .map_err(|_| ParseError::BadArgument("workspace", number.to_string()))?,
        ),
        name => WorkspaceTarget::Name(name.join(" ")),
    };
    Ok(Operation::Workspace(target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kill_sequences_with_arbitrary_whitespace() {
        for input in ["kill ; kill", "kill;kill", "kill\t;\tkill", "  kill  ;  kill  "] {
            let commands = parse(input).unwrap();
            assert_eq!(commands.len(), 2, "input {input:?}");
            for command in &commands {
                assert_eq!(command.operations, vec![Operation::Kill(KillTarget::Window)]);
            }
        }
    }

    #[test]
    fn operations_split_on_commas() {
        let commands = parse("split v, layout stacked, focus parent").unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(
            commands[0].operations,
            vec![
                Operation::Split(SplitAxis::Vertical),
                Operation::Layout(LayoutArg::Stacked),
                Operation::Focus(FocusTarget::Parent),
            ]
        );
    }

    #[test]
    fn criteria_block_is_parsed() {
        let commands = parse("[class=\"^Fire\" title=\"doc x\" urgent=latest] focus").unwrap();
        let criteria = commands[0].criteria.as_ref().unwrap();
        assert_eq!(criteria.class.as_deref(), Some("^Fire"));
        assert_eq!(criteria.title.as_deref(), Some("doc x"));
        assert_eq!(criteria.urgent, Some(true));
        assert_eq!(commands[0].operations, vec![Operation::Focus(FocusTarget::This)]);
    }

    #[test]
    fn resize_with_px_and_ppt() {
        let commands = parse("resize grow up 10 px or 25 ppt").unwrap();
        assert_eq!(
            commands[0].operations,
            vec![Operation::Resize {
                kind: ResizeKind::Grow,
                direction: Direction::Up,
                px: 10,
                ppt: 25,
            }]
        );
    }

    #[test]
    fn resize_defaults_to_ten() {
        let commands = parse("resize shrink width").unwrap();
        assert_eq!(
            commands[0].operations,
            vec![Operation::Resize {
                kind: ResizeKind::Shrink,
                direction: Direction::Right,
                px: 10,
                ppt: 10,
            }]
        );
    }

    #[test]
    fn workspace_names_can_be_quoted_and_spaced() {
        let commands = parse("workspace \"5: mail\"").unwrap();
        assert_eq!(
            commands[0].operations,
            vec![Operation::Workspace(WorkspaceTarget::Name("5: mail".into()))]
        );
        let commands = parse("workspace number 5").unwrap();
        assert_eq!(
            commands[0].operations,
            vec![Operation::Workspace(WorkspaceTarget::Number(5))]
        );
    }

    #[test]
    fn move_targets() {
        assert_eq!(
            parse("move to workspace 2").unwrap()[0].operations,
            vec![Operation::Move(MoveTarget::ToWorkspace("2".into()))]
        );
        assert_eq!(
            parse("move container to output fake-1").unwrap()[0].operations,
            vec![Operation::Move(MoveTarget::ToOutput("fake-1".into()))]
        );
        assert_eq!(
            parse("move workspace to output fake-1").unwrap()[0].operations,
            vec![Operation::MoveWorkspaceToOutput("fake-1".into())]
        );
        assert_eq!(
            parse("move scratchpad").unwrap()[0].operations,
            vec![Operation::Move(MoveTarget::Scratchpad)]
        );
    }

    #[test]
    fn exec_keeps_the_raw_command_line() {
        let commands = parse("exec --no-startup-id urxvt -e \"tmux a\"").unwrap();
        assert_eq!(
            commands[0].operations,
            vec![Operation::Exec("urxvt -e \"tmux a\"".into())]
        );
    }

    #[test]
    fn semicolons_inside_quotes_do_not_split() {
        let commands = parse("exec sh -c \"a; b\"").unwrap();
        assert_eq!(commands.len(), 1);
    }

    #[test]
    fn unknown_words_are_rejected() {
        assert!(matches!(parse("frobnicate"), Err(ParseError::UnknownOperation(_))));
        assert!(matches!(parse("focus sideways"), Err(ParseError::BadArgument(_, _))));
    }
}
