use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::{Rc, Weak};

use serde_json::Value;

use super::history::{children, revert_order, roots};
use super::{
    Action, CHANGED_EVENT, CommandContext, CommandHandler, CommandHistory, ELEMENTS_CHANGED_EVENT,
    ElementId, HistoryEntry, Phase, Stage, Trigger,
};
use crate::config::StackConfig;
use crate::error::{Error, Result};
use crate::event::{Event, EventBus, Payload};

/// Which list of the running entry a command is recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum List {
    Actions,
    FollowUps,
}

/// Position of a recorded command within the running entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Node {
    list: List,
    index: usize,
}

/// Something the running transaction applied to the model.
#[derive(Debug, Clone, Copy)]
enum Step {
    Executed(Node),
    Reverted(Node),
}

/// A command whose lifecycle is currently running.
#[derive(Debug)]
struct Frame {
    node: Node,
    stage: Stage,
    /// Recorded nested commands a replay expects the handler to issue again
    pending: VecDeque<usize>,
}

/// State of the transaction opened by the outermost public call.
#[derive(Debug, Default)]
struct Execution {
    trigger: Option<Trigger>,
    entry: HistoryEntry,
    frames: Vec<Frame>,
    journal: Vec<Step>,
    /// Reverted commands a rollback still has to apply again
    restore: Option<HashSet<Node>>,
    dirty: Vec<ElementId>,
}

impl Execution {
    fn list(&self, list: List) -> &[Action] {
        match list {
            List::Actions => &self.entry.actions,
            List::FollowUps => &self.entry.follow_ups,
        }
    }

    fn list_mut(&mut self, list: List) -> &mut Vec<Action> {
        match list {
            List::Actions => &mut self.entry.actions,
            List::FollowUps => &mut self.entry.follow_ups,
        }
    }
}

/// Transactional undo/redo stack driven through an [`EventBus`].
///
/// Every command runs through a fixed sequence of bus events so other
/// components can veto it, prepare it or react to it without the handler
/// knowing about them:
///
/// - `canExecute`
/// - `preExecute`, handler `pre_execute`, `preExecuted`
/// - `execute`, handler `execute`, `executed`
/// - `postExecute`, handler `post_execute`, `postExecuted`
///
/// Commands executed while another call is running (from a handler or a
/// listener, during an execute, an undo or a redo) join that call's
/// transaction: the outermost call produces a single history entry and a
/// single `commandStack.changed` no matter how many commands it fanned out
/// to. Each nested command is recorded under the command and stage it was
/// issued from, which lets redo replay them in their original order.
///
/// # Example
///
/// ```rust
/// use diagram_commands::{CommandContext, CommandHandler, CommandStack, EventBus, Result};
/// use std::rc::Rc;
///
/// struct Noop;
///
/// impl CommandHandler for Noop {}
///
/// fn main() -> Result<()> {
///     let stack = CommandStack::new(Rc::new(EventBus::new()));
///     stack.register("noop", Noop);
///
///     assert!(stack.execute("noop", CommandContext::new())?);
///     assert!(stack.can_undo());
///
///     stack.undo()?;
///     assert!(stack.can_redo());
///     Ok(())
/// }
/// ```
pub struct CommandStack {
    event_bus: Rc<EventBus>,
    handlers: RefCell<HashMap<String, Rc<dyn CommandHandler>>>,
    history: RefCell<CommandHistory>,
    execution: RefCell<Execution>,
    config: StackConfig,
    next_id: Cell<u64>,
    this: Weak<CommandStack>,
}

impl std::fmt::Debug for CommandStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandStack")
            .field("handlers", &self.handler_names())
            .field("history", &self.history.borrow())
            .field("execution", &self.execution.borrow())
            .field("config", &self.config)
            .finish()
    }
}

impl CommandStack {
    pub fn new(event_bus: Rc<EventBus>) -> Rc<Self> {
        Self::with_config(event_bus, StackConfig::default())
    }

    pub fn with_config(event_bus: Rc<EventBus>, config: StackConfig) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            event_bus,
            handlers: RefCell::new(HashMap::new()),
            history: RefCell::new(CommandHistory::with_limit(config.history_limit)),
            execution: RefCell::new(Execution::default()),
            config,
            next_id: Cell::new(1),
            this: this.clone(),
        })
    }

    /// A weak handle handlers can keep to issue nested commands.
    pub fn downgrade(&self) -> Weak<CommandStack> {
        self.this.clone()
    }

    pub fn event_bus(&self) -> &Rc<EventBus> {
        &self.event_bus
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    /// Binds `handler` to `command`, replacing any previous handler.
    pub fn register<H: CommandHandler + 'static>(&self, command: &str, handler: H) {
        self.register_shared(command, Rc::new(handler));
    }

    pub fn register_shared(&self, command: &str, handler: Rc<dyn CommandHandler>) {
        if self.handlers.borrow_mut().insert(command.to_owned(), handler).is_some() {
            log::debug!("replaced command handler for <{command}>");
        }
    }

    /// Builds a handler with access to this stack and binds it to `command`.
    pub fn register_handler<H, F>(&self, command: &str, ctor: F)
    where
        H: CommandHandler + 'static,
        F: FnOnce(&CommandStack) -> H,
    {
        let handler = ctor(self);
        self.register(command, handler);
    }

    pub fn handler_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    /// Executes `command` with `context`.
    ///
    /// Returns `Ok(false)` when the command was vetoed in `canExecute`.
    /// Fails with [`Error::UnknownCommand`] when no handler is registered,
    /// and with any unhandled listener or handler failure, in which case
    /// everything the outermost call applied is reverted and nothing is
    /// committed.
    ///
    /// When a redo replays a command whose handler issues the same nested
    /// command again, the recorded one is replayed from its stored context
    /// and `context` is ignored.
    pub fn execute(&self, command: &str, context: CommandContext) -> Result<bool> {
        let handler = self.handler(command)?;

        if let Some(node) = self.claim_pending(command) {
            log::debug!("replaying nested <{command}> from its recorded context");
            self.replay(node, true)?;
            return Ok(true);
        }

        let trigger = self.current_trigger();
        if trigger == Some(Trigger::Rollback) {
            log::debug!("skipping <{command}> issued during rollback");
            return Ok(false);
        }

        if !self.evaluate_can_execute(command, handler.as_ref(), &context)? {
            log::debug!("<{command}> vetoed");
            return Ok(false);
        }

        if trigger.is_some() {
            self.run(command, handler.as_ref(), context)?;
            return Ok(true);
        }

        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.open(
            Trigger::Execute,
            HistoryEntry {
                id,
                ..HistoryEntry::default()
            },
        );

        if let Err(error) = self.run(command, handler.as_ref(), context) {
            self.rollback();
            self.close();
            return Err(error);
        }

        let execution = self.close();
        log::debug!(
            "commit entry {} <{}> ({} actions)",
            execution.entry.id,
            execution.entry.command().unwrap_or_default(),
            execution.entry.actions.len()
        );

        self.history.borrow_mut().push(execution.entry);
        self.notify(Trigger::Execute, execution.dirty)?;
        Ok(true)
    }

    /// Runs only the veto phase for `command`.
    pub fn can_execute(&self, command: &str, context: &CommandContext) -> Result<bool> {
        let handler = self.handler(command)?;
        self.evaluate_can_execute(command, handler.as_ref(), context)
    }

    /// Reverts the most recent history entry. Returns `Ok(false)` when there
    /// is nothing to undo.
    ///
    /// Commands executed while the entry is being reverted are recorded as
    /// its follow-ups, and redo reverts them again first. On failure the
    /// entry is re-applied and the history is left untouched.
    pub fn undo(&self) -> Result<bool> {
        self.ensure_idle("undo")?;

        let entry = self.history.borrow().undo_entry().cloned();
        let Some(mut entry) = entry else {
            return Ok(false);
        };

        log::debug!("undo entry {} ({} actions)", entry.id, entry.actions.len());

        entry.follow_ups.clear();
        self.open(Trigger::Undo, entry);

        if let Err(error) = self.revert_all(List::Actions) {
            log::error!("undo failed: {error}");
            self.rollback();
            self.close();
            return Err(error);
        }

        let execution = self.close();
        {
            let mut history = self.history.borrow_mut();
            history.step_back();
            history.replace_redo_entry(execution.entry);
        }
        self.notify(Trigger::Undo, execution.dirty)?;
        Ok(true)
    }

    /// Replays the next undone history entry. Returns `Ok(false)` when there
    /// is nothing to redo.
    ///
    /// The stored contexts are reused: only the `execute`/`executed` phases
    /// run again, there is no veto and no new history entry. On failure the
    /// replayed commands are reverted and the history is left untouched.
    pub fn redo(&self) -> Result<bool> {
        self.ensure_idle("redo")?;

        let entry = self.history.borrow().redo_entry().cloned();
        let Some(entry) = entry else {
            return Ok(false);
        };

        log::debug!("redo entry {} ({} actions)", entry.id, entry.actions.len());

        let roots = roots(&entry.actions);
        self.open(Trigger::Redo, entry);

        let result = self.revert_all(List::FollowUps).and_then(|()| {
            roots.into_iter().try_for_each(|index| {
                self.replay(
                    Node {
                        list: List::Actions,
                        index,
                    },
                    true,
                )
            })
        });

        if let Err(error) = result {
            log::error!("redo failed: {error}");
            self.rollback();
            self.close();
            return Err(error);
        }

        let mut execution = self.close();
        execution.entry.follow_ups.clear();
        {
            let mut history = self.history.borrow_mut();
            history.replace_redo_entry(execution.entry);
            history.step_forward();
        }
        self.notify(Trigger::Redo, execution.dirty)?;
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        self.history.borrow().can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.borrow().can_redo()
    }

    /// Drops the whole history. `commandStack.changed` fires unless `emit`
    /// is `false`.
    pub fn clear(&self, emit: bool) -> Result<()> {
        self.ensure_idle("clear")?;

        self.history.borrow_mut().clear();

        if emit {
            self.event_bus.fire(CHANGED_EVENT, trigger_payload(Trigger::Clear))?;
        }
        Ok(())
    }

    /// Index of the most recent undoable entry.
    pub fn stack_index(&self) -> Option<usize> {
        self.history.borrow().stack_index()
    }

    /// Number of history entries, undone ones included.
    pub fn len(&self) -> usize {
        self.history.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.borrow().is_empty()
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.history.borrow().entries().to_vec()
    }

    /// Whether an `execute`, `undo` or `redo` is currently running.
    pub fn is_executing(&self) -> bool {
        self.current_trigger().is_some()
    }

    fn handler(&self, command: &str) -> Result<Rc<dyn CommandHandler>> {
        self.handlers
            .borrow()
            .get(command)
            .cloned()
            .ok_or_else(|| Error::UnknownCommand(command.to_owned()))
    }

    fn current_trigger(&self) -> Option<Trigger> {
        self.execution.borrow().trigger
    }

    /// History moves cannot join a running transaction.
    fn ensure_idle(&self, command: &str) -> Result<()> {
        match self.current_trigger() {
            Some(trigger) => Err(Error::IllegalInvocation {
                command: command.to_owned(),
                trigger,
            }),
            None => Ok(()),
        }
    }

    fn open(&self, trigger: Trigger, entry: HistoryEntry) {
        *self.execution.borrow_mut() = Execution {
            trigger: Some(trigger),
            entry,
            ..Execution::default()
        };
    }

    fn close(&self) -> Execution {
        std::mem::take(&mut *self.execution.borrow_mut())
    }

    /// Appends `command` to the running entry, under the command whose
    /// lifecycle is running. Outside of any command, undo records into the
    /// follow-ups and everything else into the actions.
    fn record(&self, command: &str, context: CommandContext) -> Node {
        let mut execution = self.execution.borrow_mut();

        let (list, parent) = match execution.frames.last() {
            Some(frame) => (frame.node.list, Some((frame.node.index, frame.stage))),
            None if execution.trigger == Some(Trigger::Undo) => (List::FollowUps, None),
            None => (List::Actions, None),
        };

        let id = execution.entry.id;
        let actions = execution.list_mut(list);
        actions.push(Action {
            id,
            command: command.to_owned(),
            context,
            parent,
        });

        Node {
            list,
            index: actions.len() - 1,
        }
    }

    fn push_frame(&self, node: Node, stage: Stage, pending: VecDeque<usize>) {
        self.execution
            .borrow_mut()
            .frames
            .push(Frame { node, stage, pending });
    }

    /// Pops the innermost frame, handing back the nested commands it never
    /// claimed.
    fn pop_frame(&self) -> VecDeque<usize> {
        self.execution
            .borrow_mut()
            .frames
            .pop()
            .map(|frame| frame.pending)
            .unwrap_or_default()
    }

    fn set_stage(&self, stage: Stage) {
        if let Some(frame) = self.execution.borrow_mut().frames.last_mut() {
            frame.stage = stage;
        }
    }

    /// Matches a nested `execute` against the recorded commands the running
    /// replay expects, first one with the same name wins.
    fn claim_pending(&self, command: &str) -> Option<Node> {
        let mut execution = self.execution.borrow_mut();
        let Execution { frames, entry, .. } = &mut *execution;

        let frame = frames.last_mut()?;
        let actions = match frame.node.list {
            List::Actions => &entry.actions,
            List::FollowUps => &entry.follow_ups,
        };

        let position = frame
            .pending
            .iter()
            .position(|&index| actions.get(index).is_some_and(|action| action.command == command))?;
        let index = frame.pending.remove(position)?;

        Some(Node {
            list: frame.node.list,
            index,
        })
    }

    fn action_parts(&self, node: Node) -> Result<(String, CommandContext)> {
        self.execution
            .borrow()
            .list(node.list)
            .get(node.index)
            .map(|action| (action.command.clone(), action.context.clone()))
            .ok_or_else(|| Error::failed(format!("no recorded command at {node:?}")))
    }

    /// Undoes what the failed transaction applied, newest first, without
    /// firing events.
    fn rollback(&self) {
        let (id, journal) = {
            let mut execution = self.execution.borrow_mut();
            execution.trigger = Some(Trigger::Rollback);
            execution.frames.clear();
            execution.dirty.clear();

            let journal = std::mem::take(&mut execution.journal);
            execution.restore = Some(
                journal
                    .iter()
                    .filter_map(|step| match step {
                        Step::Reverted(node) => Some(*node),
                        Step::Executed(_) => None,
                    })
                    .collect(),
            );
            (execution.entry.id, journal)
        };

        for step in journal.into_iter().rev() {
            let result = match step {
                Step::Executed(node) => self.silent_revert(node),
                Step::Reverted(node) => self.replay(node, false),
            };
            if let Err(error) = result {
                log::error!("rollback of entry {id} failed at {step:?}: {error}");
            }
        }
    }

    fn silent_revert(&self, node: Node) -> Result<()> {
        let (command, context) = self.action_parts(node)?;
        log::warn!("rolling back <{command}>");
        self.handler(&command)?.revert(&context).map(|_| ())
    }

    /// During a rollback only the reverted commands are applied again, each
    /// once.
    fn should_apply(&self, node: Node) -> bool {
        match &mut self.execution.borrow_mut().restore {
            Some(restore) => restore.remove(&node),
            None => true,
        }
    }

    fn evaluate_can_execute(
        &self,
        command: &str,
        handler: &dyn CommandHandler,
        context: &CommandContext,
    ) -> Result<bool> {
        match self.fire_phase(command, Phase::CanExecute, context, None)? {
            Some(value) => Ok(is_truthy(&value)),
            None => Ok(handler.can_execute(context)),
        }
    }

    /// Records `command` and takes it through its whole lifecycle.
    fn run(&self, command: &str, handler: &dyn CommandHandler, context: CommandContext) -> Result<()> {
        let node = self.record(command, context.clone());

        self.push_frame(node, Stage::Pre, VecDeque::new());
        let result = self.run_phases(node, command, handler, &context);
        self.pop_frame();

        result
    }

    fn run_phases(
        &self,
        node: Node,
        command: &str,
        handler: &dyn CommandHandler,
        context: &CommandContext,
    ) -> Result<()> {
        self.fire_phase(command, Phase::PreExecute, context, None)?;
        handler.pre_execute(context)?;
        self.fire_phase(command, Phase::PreExecuted, context, None)?;

        self.set_stage(Stage::Execute);
        self.execute_step(node, command, handler, context)?;

        self.set_stage(Stage::Post);
        self.fire_phase(command, Phase::PostExecute, context, None)?;
        handler.post_execute(context)?;
        self.fire_phase(command, Phase::PostExecuted, context, None)?;

        Ok(())
    }

    fn execute_step(
        &self,
        node: Node,
        command: &str,
        handler: &dyn CommandHandler,
        context: &CommandContext,
    ) -> Result<()> {
        self.fire_phase(command, Phase::Execute, context, None)?;
        let elements = handler.execute(context)?;
        self.mark_dirty(&elements);
        self.execution.borrow_mut().journal.push(Step::Executed(node));
        self.fire_phase(command, Phase::Executed, context, Some(&elements))?;

        Ok(())
    }

    fn revert_step(&self, node: Node) -> Result<()> {
        let (command, context) = self.action_parts(node)?;
        let handler = self.handler(&command)?;

        self.fire_phase(&command, Phase::Revert, &context, None)?;
        let elements = handler.revert(&context)?;
        self.mark_dirty(&elements);
        self.execution.borrow_mut().journal.push(Step::Reverted(node));
        self.fire_phase(&command, Phase::Reverted, &context, Some(&elements))?;

        Ok(())
    }

    fn revert_all(&self, list: List) -> Result<()> {
        let order = revert_order(self.execution.borrow().list(list));
        order
            .into_iter()
            .try_for_each(|index| self.revert_step(Node { list, index }))
    }

    /// Applies a recorded command again from its stored context.
    ///
    /// Only `execute`/`executed` fire. Nested commands the handler issues
    /// again are claimed from the recorded ones; with `nested` set, the ones
    /// it issued from its other stages, or does not issue again, are replayed
    /// around it.
    fn replay(&self, node: Node, nested: bool) -> Result<()> {
        let (command, context) = self.action_parts(node)?;
        let [pre, executing, post] = {
            let execution = self.execution.borrow();
            let actions = execution.list(node.list);
            [Stage::Pre, Stage::Execute, Stage::Post].map(|stage| children(actions, node.index, stage))
        };
        let child = |index| Node {
            list: node.list,
            index,
        };

        if nested {
            for index in pre {
                self.replay(child(index), true)?;
            }
        }

        if self.should_apply(node) {
            let handler = self.handler(&command)?;
            self.push_frame(node, Stage::Execute, executing.into());
            let result = self.execute_step(node, &command, handler.as_ref(), &context);
            let unclaimed = self.pop_frame();
            result?;

            for index in unclaimed {
                self.replay(child(index), true)?;
            }
        } else if nested {
            for index in executing {
                self.replay(child(index), true)?;
            }
        }

        if nested {
            for index in post {
                self.replay(child(index), true)?;
            }
        }

        Ok(())
    }

    /// Fires `commandStack.<command>.<phase>` and then, unless propagation
    /// was stopped, `commandStack.<phase>` on the same event. Silent while
    /// rolling back.
    fn fire_phase(
        &self,
        command: &str,
        phase: Phase,
        context: &CommandContext,
        elements: Option<&[ElementId]>,
    ) -> Result<Option<Value>> {
        let trigger = self.current_trigger();
        if trigger == Some(Trigger::Rollback) {
            return Ok(None);
        }

        let scoped = phase.scoped_event(command);

        let mut event = Event::new(scoped.clone())
            .with("command", command)
            .with_attachment(context.clone());
        if let Some(trigger) = trigger {
            event.set("trigger", trigger.as_str());
        }
        if let Some(elements) = elements {
            event.set("elements", elements.to_vec());
        }

        let mut result = self.event_bus.fire_as(&scoped, &mut event)?;
        if !event.is_propagation_stopped() {
            result = self.event_bus.fire_as(&phase.event(), &mut event)?;
        }

        Ok(result)
    }

    fn mark_dirty(&self, elements: &[ElementId]) {
        if !elements.is_empty() {
            self.execution.borrow_mut().dirty.extend_from_slice(elements);
        }
    }

    fn notify(&self, trigger: Trigger, dirty: Vec<ElementId>) -> Result<()> {
        if self.config.emit_elements_changed {
            let mut seen = HashSet::new();
            let elements: Vec<ElementId> = dirty
                .into_iter()
                .rev()
                .filter(|id| seen.insert(id.clone()))
                .collect();

            let mut payload = trigger_payload(trigger);
            payload.insert("elements".to_owned(), elements.into());
            self.event_bus.fire(ELEMENTS_CHANGED_EVENT, payload)?;
        }

        self.event_bus.fire(CHANGED_EVENT, trigger_payload(trigger))?;
        Ok(())
    }
}

fn trigger_payload(trigger: Trigger) -> Payload {
    let mut payload = Payload::new();
    payload.insert("trigger".to_owned(), trigger.as_str().into());
    payload
}

/// Truthiness of a listener's return value in `canExecute`.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
