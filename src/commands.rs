//! Command records and their execution. The text grammar (`;` between
//! commands, `,` between operations, `[...]` criteria prefixes) is parsed
//! here into plain records; `exec` interprets them against the tree.

pub mod exec;
pub mod parse;

use serde::{Deserialize, Serialize};

use crate::model::focus::Direction;

/// Conjunction of window predicates selecting the containers a command
/// applies to. Patterns are uncompiled here; matching compiles lazily.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Criteria {
    pub class: Option<String>,
    pub instance: Option<String>,
    pub title: Option<String>,
    pub mark: Option<String>,
    pub con_id: Option<u64>,
    pub window_id: Option<u32>,
    pub urgent: Option<bool>,
    pub floating: Option<bool>,
}

impl Criteria {
    pub fn is_empty(&self) -> bool {
        *self == Criteria::default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FocusTarget {
    /// Bare `focus`: focus the selection itself.
    This,
    Direction(Direction),
    Parent,
    Child,
    Floating,
    Tiling,
    ModeToggle,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MoveTarget {
    Direction(Direction),
    ToWorkspace(String),
    ToWorkspaceNumber(i32),
    ToWorkspaceCurrent,
    WorkspaceNext,
    WorkspacePrev,
    ToOutput(String),
    Scratchpad,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeKind {
    Grow,
    Shrink,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SplitAxis {
    Horizontal,
    Vertical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutArg {
    Default,
    Stacked,
    Tabbed,
    Toggle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToggleArg {
    Enable,
    Disable,
    Toggle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KillTarget {
    Window,
    Client,
}

#[derive(Clone, Debug, PartialEq)]
pub enum WorkspaceTarget {
    Name(String),
    Number(i32),
    BackAndForth,
    Next,
    Prev,
    NextOnOutput,
    PrevOnOutput,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operation {
    Focus(FocusTarget),
    Move(MoveTarget),
    Resize {
        kind: ResizeKind,
        direction: Direction,
        px: u32,
        ppt: u32,
    },
    Split(SplitAxis),
    Layout(LayoutArg),
    Floating(ToggleArg),
    Fullscreen {
        arg: ToggleArg,
        global: bool,
    },
    Kill(KillTarget),
    Mark(String),
    Unmark,
    Workspace(WorkspaceTarget),
    /// `move workspace to output X`: relocate the whole workspace.
    MoveWorkspaceToOutput(String),
    ScratchpadShow,
    Exec(String),
    Nop,
    Restart,
    Reload,
    Exit,
}

/// One `;`-separated command: optional criteria plus its operations.
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    pub criteria: Option<Criteria>,
    pub operations: Vec<Operation>,
}

/// Per-command outcome, aggregated in input order for the IPC reply.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CommandReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandReply {
    pub fn ok() -> Self {
        Self { success: true, error: None }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self { success: false, error: Some(message.into()) }
    }
}

/// Work the executor cannot perform against the tree alone; the reactor
/// picks these up after the settle step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SideEffect {
    Spawn(String),
    Restart,
    Reload,
    Exit,
}
