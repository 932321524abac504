mod context;
mod history;
mod interceptor;
mod stack;

pub use context::CommandContext;
pub use history::{Action, CommandHistory, HistoryEntry, Stage};
pub use interceptor::CommandInterceptor;
pub use stack::CommandStack;

use crate::error::Result;

/// Identifier of a diagram element touched by a command.
pub type ElementId = String;

/// Event fired once per outermost call with every element it touched.
pub const ELEMENTS_CHANGED_EVENT: &str = "elements.changed";

/// Event fired once per outermost call after the history changed.
pub const CHANGED_EVENT: &str = "commandStack.changed";

/// The public call that opened the running transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Execute,
    Undo,
    Redo,
    Clear,
    /// Reverting the actions of a failed transaction
    Rollback,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Execute => "execute",
            Trigger::Undo => "undo",
            Trigger::Redo => "redo",
            Trigger::Clear => "clear",
            Trigger::Rollback => "rollback",
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle phases of a command, in the order they fire.
///
/// Each phase is published as `commandStack.<command>.<phase>` and then as
/// `commandStack.<phase>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    CanExecute,
    PreExecute,
    PreExecuted,
    Execute,
    Executed,
    PostExecute,
    PostExecuted,
    Revert,
    Reverted,
}

impl Phase {
    pub const ALL: [Phase; 9] = [
        Phase::CanExecute,
        Phase::PreExecute,
        Phase::PreExecuted,
        Phase::Execute,
        Phase::Executed,
        Phase::PostExecute,
        Phase::PostExecuted,
        Phase::Revert,
        Phase::Reverted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::CanExecute => "canExecute",
            Phase::PreExecute => "preExecute",
            Phase::PreExecuted => "preExecuted",
            Phase::Execute => "execute",
            Phase::Executed => "executed",
            Phase::PostExecute => "postExecute",
            Phase::PostExecuted => "postExecuted",
            Phase::Revert => "revert",
            Phase::Reverted => "reverted",
        }
    }

    /// Name of the event fired for `command` in this phase.
    pub fn scoped_event(&self, command: &str) -> String {
        format!("commandStack.{command}.{}", self.as_str())
    }

    /// Name of the event fired for every command in this phase.
    pub fn event(&self) -> String {
        format!("commandStack.{}", self.as_str())
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logic bound to one command name.
///
/// Every method is optional. `execute` must store in the context whatever
/// `revert` needs to restore the exact previous state, because `revert`
/// only ever sees that context.
pub trait CommandHandler {
    /// Returning `false` turns `execute` into a silent no-op.
    fn can_execute(&self, _context: &CommandContext) -> bool {
        true
    }

    fn pre_execute(&self, _context: &CommandContext) -> Result<()> {
        Ok(())
    }

    /// Applies the command and returns the elements it touched.
    fn execute(&self, _context: &CommandContext) -> Result<Vec<ElementId>> {
        Ok(Vec::new())
    }

    fn post_execute(&self, _context: &CommandContext) -> Result<()> {
        Ok(())
    }

    /// Undoes `execute` and returns the elements it touched.
    fn revert(&self, _context: &CommandContext) -> Result<Vec<ElementId>> {
        Ok(Vec::new())
    }
}
