use super::CommandContext;

/// Part of a command's lifecycle a nested command was issued from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// `preExecute` up to `preExecuted`
    Pre,
    /// `execute` up to `executed`, the part redo runs again
    Execute,
    /// `postExecute` up to `postExecuted`
    Post,
}

/// One executed command as recorded in the history.
#[derive(Debug, Clone)]
pub struct Action {
    /// Id of the history entry this action belongs to
    pub id: u64,
    pub command: String,
    pub context: CommandContext,
    /// The command this one was issued from, as an index into the same
    /// list, and the stage that command was in at the time
    pub parent: Option<(usize, Stage)>,
}

/// A single undo step: every command one outermost call ran, in the order
/// they were issued. The outermost command comes first.
#[derive(Debug, Clone, Default)]
pub struct HistoryEntry {
    pub id: u64,
    pub actions: Vec<Action>,
    /// Commands issued while this entry was last undone; redo reverts them
    /// before replaying `actions`
    pub follow_ups: Vec<Action>,
}

impl HistoryEntry {
    /// The command the caller asked for.
    pub fn command(&self) -> Option<&str> {
        self.actions.first().map(|action| action.command.as_str())
    }
}

/// Commands of `actions` issued from `index` while it was in `stage`.
pub(crate) fn children(actions: &[Action], index: usize, stage: Stage) -> Vec<usize> {
    actions
        .iter()
        .enumerate()
        .filter(|(_, action)| action.parent == Some((index, stage)))
        .map(|(child, _)| child)
        .collect()
}

/// Commands of `actions` that were not issued from another one.
pub(crate) fn roots(actions: &[Action]) -> Vec<usize> {
    actions
        .iter()
        .enumerate()
        .filter(|(_, action)| action.parent.is_none())
        .map(|(index, _)| index)
        .collect()
}

/// The order undo reverts `actions` in: the exact reverse of the order
/// their effects were applied.
pub(crate) fn revert_order(actions: &[Action]) -> Vec<usize> {
    fn visit(actions: &[Action], index: usize, order: &mut Vec<usize>) {
        for stage in [Stage::Post, Stage::Execute] {
            for child in children(actions, index, stage).into_iter().rev() {
                visit(actions, child, order);
            }
        }
        order.push(index);
        for child in children(actions, index, Stage::Pre).into_iter().rev() {
            visit(actions, child, order);
        }
    }

    let mut order = Vec::with_capacity(actions.len());
    for root in roots(actions).into_iter().rev() {
        visit(actions, root, &mut order);
    }
    order
}

/// Linear undo/redo history.
///
/// Entries before `position` can be undone, entries from `position` on can
/// be redone. Pushing a new entry drops the redo branch.
#[derive(Debug, Default)]
pub struct CommandHistory {
    entries: Vec<HistoryEntry>,
    position: usize,
    limit: Option<usize>,
}

impl CommandHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A history keeping at most `limit` entries, dropping the oldest.
    pub fn with_limit(limit: Option<usize>) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.truncate(self.position);
        self.entries.push(entry);
        self.position = self.entries.len();

        if let Some(limit) = self.limit {
            let overflow = self.entries.len().saturating_sub(limit);
            if overflow > 0 {
                self.entries.drain(..overflow);
                self.position -= overflow;
            }
        }
    }

    /// The entry `undo` would revert.
    pub fn undo_entry(&self) -> Option<&HistoryEntry> {
        self.position.checked_sub(1).and_then(|index| self.entries.get(index))
    }

    /// The entry `redo` would replay.
    pub fn redo_entry(&self) -> Option<&HistoryEntry> {
        self.entries.get(self.position)
    }

    /// Swaps in the updated record of the entry `redo` would replay.
    pub(crate) fn replace_redo_entry(&mut self, entry: HistoryEntry) {
        if let Some(slot) = self.entries.get_mut(self.position) {
            *slot = entry;
        }
    }

    pub(crate) fn step_back(&mut self) {
        self.position = self.position.saturating_sub(1);
    }

    pub(crate) fn step_forward(&mut self) {
        self.position = (self.position + 1).min(self.entries.len());
    }

    pub fn can_undo(&self) -> bool {
        self.undo_entry().is_some()
    }

    pub fn can_redo(&self) -> bool {
        self.redo_entry().is_some()
    }

    /// Index of the most recent undoable entry, `None` when nothing can be
    /// undone.
    pub fn stack_index(&self) -> Option<usize> {
        self.position.checked_sub(1)
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.position = 0;
    }
}
