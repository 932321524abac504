use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use diagram_commands::command::{CHANGED_EVENT, ELEMENTS_CHANGED_EVENT};
use diagram_commands::event::{ERROR_EVENT, Payload};
use diagram_commands::{
    CommandContext, CommandHandler, CommandStack, ElementId, Error, Event, EventBus, Flow, Phase,
    Result, StackConfig, Trigger,
};
use serde_json::{Value, json};

type Items = Rc<RefCell<Vec<String>>>;

/// Appends `value` to a shared list; the list stands in for the diagram.
struct AppendHandler {
    items: Items,
}

impl CommandHandler for AppendHandler {
    fn can_execute(&self, context: &CommandContext) -> bool {
        context.get::<String>("value").is_some_and(|value| !value.is_empty())
    }

    fn execute(&self, context: &CommandContext) -> Result<Vec<ElementId>> {
        let value = context.require::<String>("value")?;
        let mut items = self.items.borrow_mut();
        context.set("index", items.len());
        items.push(value.clone());
        Ok(vec![value])
    }

    fn revert(&self, context: &CommandContext) -> Result<Vec<ElementId>> {
        let index = context.require::<usize>("index")?;
        let value = self.items.borrow_mut().remove(index);
        Ok(vec![value])
    }
}

/// Appends every entry of `values` through nested `append` commands issued
/// from its own `execute`.
struct AppendAllHandler {
    command_stack: Weak<CommandStack>,
}

impl CommandHandler for AppendAllHandler {
    fn execute(&self, context: &CommandContext) -> Result<Vec<ElementId>> {
        let command_stack = self
            .command_stack
            .upgrade()
            .ok_or_else(|| Error::failed("stack dropped"))?;
        for value in context.require::<Vec<String>>("values")? {
            command_stack.execute("append", append_context(&value))?;
        }
        Ok(Vec::new())
    }
}

/// Brackets a nested `append` of `inner` between "[" and "]", all from its
/// own `execute`, so the order of its work matters.
struct WrapHandler {
    items: Items,
    command_stack: Weak<CommandStack>,
}

impl CommandHandler for WrapHandler {
    fn execute(&self, context: &CommandContext) -> Result<Vec<ElementId>> {
        let command_stack = self
            .command_stack
            .upgrade()
            .ok_or_else(|| Error::failed("stack dropped"))?;
        let inner = context.require::<String>("inner")?;

        self.items.borrow_mut().push("[".to_string());
        command_stack.execute("append", append_context(&inner))?;
        self.items.borrow_mut().push("]".to_string());

        Ok(vec!["[".to_string(), "]".to_string()])
    }

    fn revert(&self, _context: &CommandContext) -> Result<Vec<ElementId>> {
        let mut items = self.items.borrow_mut();
        for bracket in ["]", "["] {
            if let Some(index) = items.iter().rposition(|item| item == bracket) {
                items.remove(index);
            }
        }
        Ok(vec!["[".to_string(), "]".to_string()])
    }
}

struct Fixture {
    event_bus: Rc<EventBus>,
    command_stack: Rc<CommandStack>,
    items: Items,
}

fn setup() -> Fixture {
    setup_with_config(StackConfig::default())
}

fn setup_with_config(config: StackConfig) -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();

    let event_bus = Rc::new(EventBus::new());
    let command_stack = CommandStack::with_config(event_bus.clone(), config);
    let items: Items = Rc::new(RefCell::new(Vec::new()));

    command_stack.register(
        "append",
        AppendHandler {
            items: items.clone(),
        },
    );
    command_stack.register_handler("append.all", |stack| AppendAllHandler {
        command_stack: stack.downgrade(),
    });
    command_stack.register_handler("wrap", |stack| WrapHandler {
        items: items.clone(),
        command_stack: stack.downgrade(),
    });

    Fixture {
        event_bus,
        command_stack,
        items,
    }
}

fn append_context(value: &str) -> CommandContext {
    CommandContext::new().with("value", value.to_string())
}

fn snapshot(items: &Items) -> Vec<String> {
    items.borrow().clone()
}

fn count_events(event_bus: &EventBus, kind: &str) -> Rc<Cell<usize>> {
    let count = Rc::new(Cell::new(0));
    let counter = count.clone();
    event_bus.on(kind, move |_| {
        counter.set(counter.get() + 1);
        Ok(Flow::Continue)
    });
    count
}

#[test]
fn test_execute_undo_redo() {
    let fixture = setup();
    let stack = &fixture.command_stack;

    assert!(!stack.can_undo());
    assert_eq!(stack.stack_index(), None);

    assert!(stack.execute("append", append_context("a")).unwrap());
    assert_eq!(snapshot(&fixture.items), vec!["a"]);
    assert!(stack.can_undo());
    assert!(!stack.can_redo());
    assert_eq!(stack.stack_index(), Some(0));

    assert!(stack.undo().unwrap());
    assert!(fixture.items.borrow().is_empty());
    assert!(!stack.can_undo());
    assert!(stack.can_redo());
    assert_eq!(stack.stack_index(), None);

    assert!(stack.redo().unwrap());
    assert_eq!(snapshot(&fixture.items), vec!["a"]);
    assert_eq!(stack.len(), 1);
}

#[test]
fn test_undo_and_redo_on_empty_history_are_noops() {
    let fixture = setup();
    let changed = count_events(&fixture.event_bus, CHANGED_EVENT);

    assert!(!fixture.command_stack.undo().unwrap());
    assert!(!fixture.command_stack.redo().unwrap());
    assert_eq!(changed.get(), 0);
}

#[test]
fn test_unknown_command_fails() {
    let fixture = setup();

    let result = fixture.command_stack.execute("missing", CommandContext::new());
    assert_eq!(result, Err(Error::UnknownCommand("missing".to_string())));

    let result = fixture.command_stack.can_execute("missing", &CommandContext::new());
    assert!(matches!(result, Err(Error::UnknownCommand(_))));
    assert!(!fixture.command_stack.can_undo());
}

#[test]
fn test_lifecycle_events_fire_in_order() {
    let fixture = setup();
    let log = Rc::new(RefCell::new(Vec::new()));

    for phase in Phase::ALL {
        for name in [phase.scoped_event("append"), phase.event()] {
            let log = log.clone();
            let recorded = name.trim_start_matches("commandStack.").to_string();
            fixture.event_bus.on(name, move |_| {
                log.borrow_mut().push(recorded.clone());
                Ok(Flow::Continue)
            });
        }
    }
    let inner = log.clone();
    fixture.event_bus.on(CHANGED_EVENT, move |event| {
        let trigger = event.get("trigger").and_then(Value::as_str).unwrap_or_default();
        inner.borrow_mut().push(format!("changed:{trigger}"));
        Ok(Flow::Continue)
    });

    fixture.command_stack.execute("append", append_context("a")).unwrap();
    assert_eq!(
        *log.borrow(),
        vec![
            "append.canExecute",
            "canExecute",
            "append.preExecute",
            "preExecute",
            "append.preExecuted",
            "preExecuted",
            "append.execute",
            "execute",
            "append.executed",
            "executed",
            "append.postExecute",
            "postExecute",
            "append.postExecuted",
            "postExecuted",
            "changed:execute",
        ]
    );

    log.borrow_mut().clear();
    fixture.command_stack.undo().unwrap();
    assert_eq!(
        *log.borrow(),
        vec!["append.revert", "revert", "append.reverted", "reverted", "changed:undo"]
    );

    log.borrow_mut().clear();
    fixture.command_stack.redo().unwrap();
    assert_eq!(
        *log.borrow(),
        vec!["append.execute", "execute", "append.executed", "executed", "changed:redo"]
    );
}

#[test]
fn test_stop_propagation_skips_unscoped_phase_event() {
    let fixture = setup();
    let generic = count_events(&fixture.event_bus, "commandStack.preExecute");

    fixture.event_bus.on("commandStack.append.preExecute", |event| {
        event.stop_propagation();
        Ok(Flow::Continue)
    });

    fixture.command_stack.execute("append", append_context("a")).unwrap();

    assert_eq!(generic.get(), 0);
    assert_eq!(snapshot(&fixture.items), vec!["a"]);
}

#[test]
fn test_listener_veto_is_silent_noop() {
    let fixture = setup();
    let changed = count_events(&fixture.event_bus, CHANGED_EVENT);
    let pre_execute = count_events(&fixture.event_bus, "commandStack.preExecute");

    fixture
        .event_bus
        .on_priority("commandStack.append.canExecute", 10, |_| Ok(Flow::Veto));

    let executed = fixture.command_stack.execute("append", append_context("a")).unwrap();

    assert!(!executed);
    assert!(fixture.items.borrow().is_empty());
    assert!(!fixture.command_stack.can_undo());
    assert_eq!(fixture.command_stack.stack_index(), None);
    assert_eq!(changed.get(), 0);
    assert_eq!(pre_execute.get(), 0);
}

#[test]
fn test_handler_veto_and_can_execute() {
    let fixture = setup();
    let stack = &fixture.command_stack;

    assert!(!stack.can_execute("append", &append_context("")).unwrap());
    assert!(stack.can_execute("append", &append_context("a")).unwrap());

    assert!(!stack.execute("append", append_context("")).unwrap());
    assert!(fixture.items.borrow().is_empty());
    assert!(!stack.can_undo());
}

#[test]
fn test_can_execute_does_not_mutate() {
    let fixture = setup();
    let changed = count_events(&fixture.event_bus, CHANGED_EVENT);

    assert!(fixture.command_stack.can_execute("append", &append_context("a")).unwrap());

    assert!(fixture.items.borrow().is_empty());
    assert!(!fixture.command_stack.can_undo());
    assert_eq!(changed.get(), 0);
}

#[test]
fn test_listener_value_overrides_handler_can_execute() {
    let fixture = setup();

    fixture
        .event_bus
        .on("commandStack.append.canExecute", |_| Ok(Flow::Return(json!(true))));

    // the handler alone would refuse an empty value
    assert!(fixture.command_stack.can_execute("append", &append_context("")).unwrap());
}

#[test]
fn test_generic_can_execute_listener_vetoes_every_command() {
    let fixture = setup();

    fixture.event_bus.on("commandStack.canExecute", |_| Ok(Flow::Veto));

    assert!(!fixture.command_stack.execute("append", append_context("a")).unwrap());
    assert!(
        !fixture
            .command_stack
            .execute("append.all", CommandContext::new().with("values", vec!["b".to_string()]))
            .unwrap()
    );
    assert!(fixture.items.borrow().is_empty());
}

#[test]
fn test_nested_execute_in_handler_is_one_undo_step() {
    let fixture = setup();
    let stack = &fixture.command_stack;
    let changed = count_events(&fixture.event_bus, CHANGED_EVENT);

    let values = vec!["a".to_string(), "b".to_string()];
    stack
        .execute("append.all", CommandContext::new().with("values", values))
        .unwrap();

    assert_eq!(snapshot(&fixture.items), vec!["a", "b"]);
    assert_eq!(stack.len(), 1);
    assert_eq!(changed.get(), 1);

    let entry = &stack.entries()[0];
    let commands: Vec<&str> = entry.actions.iter().map(|action| action.command.as_str()).collect();
    assert_eq!(commands, vec!["append.all", "append", "append"]);
    assert_eq!(entry.command(), Some("append.all"));

    stack.undo().unwrap();
    assert!(fixture.items.borrow().is_empty());
    assert!(!stack.can_undo());
    assert_eq!(changed.get(), 2);

    stack.redo().unwrap();
    assert_eq!(snapshot(&fixture.items), vec!["a", "b"]);
    assert_eq!(stack.len(), 1);
    assert_eq!(changed.get(), 3);
}

#[test]
fn test_nested_execute_from_listener_folds_into_transaction() {
    let fixture = setup();
    let stack = fixture.command_stack.clone();

    let nested = stack.clone();
    fixture.event_bus.on("commandStack.append.postExecuted", move |event| {
        let context = CommandContext::from_event(event).ok_or_else(|| Error::failed("no context"))?;
        if context.get::<String>("value").as_deref() == Some("a") {
            nested.execute("append", append_context("follower"))?;
        }
        Ok(Flow::Continue)
    });

    stack.execute("append", append_context("a")).unwrap();

    assert_eq!(snapshot(&fixture.items), vec!["a", "follower"]);
    assert_eq!(stack.len(), 1);

    stack.undo().unwrap();
    assert!(fixture.items.borrow().is_empty());

    stack.redo().unwrap();
    assert_eq!(snapshot(&fixture.items), vec!["a", "follower"]);
}

#[test]
fn test_execute_after_undo_discards_redo_branch() {
    let fixture = setup();
    let stack = &fixture.command_stack;

    stack.execute("append", append_context("a")).unwrap();
    stack.execute("append", append_context("b")).unwrap();
    stack.undo().unwrap();
    assert!(stack.can_redo());

    stack.execute("append", append_context("c")).unwrap();

    assert!(!stack.can_redo());
    assert!(!stack.redo().unwrap());
    assert_eq!(snapshot(&fixture.items), vec!["a", "c"]);
    assert_eq!(stack.len(), 2);
}

#[test]
fn test_undo_all_then_redo_all_restores_state() {
    let fixture = setup();
    let stack = &fixture.command_stack;

    for value in ["a", "b", "c"] {
        stack.execute("append", append_context(value)).unwrap();
    }
    stack
        .execute(
            "append.all",
            CommandContext::new().with("values", vec!["d".to_string(), "e".to_string()]),
        )
        .unwrap();
    let expected = snapshot(&fixture.items);

    while stack.can_undo() {
        stack.undo().unwrap();
    }
    assert!(fixture.items.borrow().is_empty());

    while stack.can_redo() {
        stack.redo().unwrap();
    }
    assert_eq!(snapshot(&fixture.items), expected);
    assert_eq!(stack.stack_index(), Some(3));
}

#[test]
fn test_redo_is_not_vetoable() {
    let fixture = setup();
    let stack = &fixture.command_stack;

    stack.execute("append", append_context("a")).unwrap();
    stack.undo().unwrap();

    fixture.event_bus.on("commandStack.canExecute", |_| Ok(Flow::Veto));

    assert!(stack.redo().unwrap());
    assert_eq!(snapshot(&fixture.items), vec!["a"]);
}

#[test]
fn test_redo_reuses_stored_context() {
    let fixture = setup();
    let stack = &fixture.command_stack;
    let context = append_context("a");

    stack.execute("append", context.clone()).unwrap();
    stack.undo().unwrap();
    stack.redo().unwrap();

    let stored = &stack.entries()[0].actions[0].context;
    assert!(stored.ptr_eq(&context));
}

#[test]
fn test_executed_event_carries_context_and_elements() {
    let fixture = setup();
    let seen = Rc::new(RefCell::new(None));

    let inner = seen.clone();
    fixture.event_bus.on("commandStack.append.executed", move |event| {
        let context = CommandContext::from_event(event);
        let value = context.and_then(|context| context.get::<String>("value"));
        *inner.borrow_mut() = Some((value, event.get("elements").cloned(), event.get("trigger").cloned()));
        Ok(Flow::Continue)
    });

    fixture.command_stack.execute("append", append_context("a")).unwrap();

    let (value, elements, trigger) = seen.borrow().clone().unwrap();
    assert_eq!(value.as_deref(), Some("a"));
    assert_eq!(elements, Some(json!(["a"])));
    assert_eq!(trigger, Some(json!("execute")));
}

#[test]
fn test_elements_changed_fires_once_with_unique_elements() {
    let fixture = setup();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let inner = seen.clone();
    fixture.event_bus.on(ELEMENTS_CHANGED_EVENT, move |event| {
        inner.borrow_mut().push(event.get("elements").cloned().unwrap_or(Value::Null));
        Ok(Flow::Continue)
    });

    let values = vec!["a".to_string(), "b".to_string(), "a".to_string()];
    fixture
        .command_stack
        .execute("append.all", CommandContext::new().with("values", values))
        .unwrap();

    assert_eq!(*seen.borrow(), vec![json!(["a", "b"])]);
}

#[test]
fn test_elements_changed_can_be_disabled() {
    let fixture = setup_with_config(StackConfig {
        emit_elements_changed: false,
        ..StackConfig::default()
    });
    let elements_changed = count_events(&fixture.event_bus, ELEMENTS_CHANGED_EVENT);
    let changed = count_events(&fixture.event_bus, CHANGED_EVENT);

    fixture.command_stack.execute("append", append_context("a")).unwrap();

    assert_eq!(elements_changed.get(), 0);
    assert_eq!(changed.get(), 1);
}

#[test]
fn test_listener_error_aborts_and_rolls_back() {
    let fixture = setup();
    let changed = count_events(&fixture.event_bus, CHANGED_EVENT);

    fixture.event_bus.on("commandStack.append.postExecute", |event| {
        let context = CommandContext::from_event(event).ok_or_else(|| Error::failed("no context"))?;
        match context.get::<String>("value").as_deref() {
            Some("b") => Err(Error::failed("b is not allowed")),
            _ => Ok(Flow::Continue),
        }
    });

    let values = vec!["a".to_string(), "b".to_string()];
    let result = fixture
        .command_stack
        .execute("append.all", CommandContext::new().with("values", values));

    assert_eq!(result, Err(Error::failed("b is not allowed")));
    assert!(fixture.items.borrow().is_empty());
    assert!(!fixture.command_stack.can_undo());
    assert!(!fixture.command_stack.is_executing());
    assert_eq!(changed.get(), 0);

    // the stack is usable again afterwards
    fixture.command_stack.execute("append", append_context("c")).unwrap();
    assert_eq!(snapshot(&fixture.items), vec!["c"]);
    assert_eq!(fixture.command_stack.len(), 1);
}

#[test]
fn test_swallowed_listener_error_lets_command_commit() {
    let fixture = setup();

    fixture.event_bus.on(ERROR_EVENT, |event| {
        event.prevent_default();
        Ok(Flow::Continue)
    });
    fixture
        .event_bus
        .on("commandStack.append.executed", |_| Err(Error::failed("ignored")));

    assert!(fixture.command_stack.execute("append", append_context("a")).unwrap());
    assert_eq!(snapshot(&fixture.items), vec!["a"]);
    assert!(fixture.command_stack.can_undo());
}

#[test]
fn test_undo_inside_transaction_is_illegal() {
    let fixture = setup();

    let nested = fixture.command_stack.clone();
    fixture.event_bus.on("commandStack.append.postExecute", move |_| {
        nested.undo()?;
        Ok(Flow::Continue)
    });

    let result = fixture.command_stack.execute("append", append_context("a"));

    assert!(matches!(
        result,
        Err(Error::IllegalInvocation {
            trigger: Trigger::Execute,
            ..
        })
    ));
    assert!(fixture.items.borrow().is_empty());
    assert!(!fixture.command_stack.can_undo());
}

#[test]
fn test_execute_during_undo_joins_the_undo() {
    let fixture = setup();
    let stack = &fixture.command_stack;
    stack.execute("append", append_context("a")).unwrap();
    let changed = count_events(&fixture.event_bus, CHANGED_EVENT);

    let nested = stack.clone();
    fixture.event_bus.on("commandStack.append.reverted", move |event| {
        let context = CommandContext::from_event(event).ok_or_else(|| Error::failed("no context"))?;
        if context.get::<String>("value").as_deref() == Some("a") {
            nested.execute("append", append_context("placeholder"))?;
        }
        Ok(Flow::Continue)
    });

    assert!(stack.undo().unwrap());
    assert_eq!(snapshot(&fixture.items), vec!["placeholder"]);
    assert!(!stack.can_undo());
    assert!(stack.can_redo());
    assert_eq!(stack.len(), 1);
    assert_eq!(changed.get(), 1);
    assert_eq!(stack.entries()[0].follow_ups.len(), 1);

    // redo takes the placeholder out again before replaying
    assert!(stack.redo().unwrap());
    assert_eq!(snapshot(&fixture.items), vec!["a"]);
    assert_eq!(stack.stack_index(), Some(0));
    assert!(stack.entries()[0].follow_ups.is_empty());

    assert!(stack.undo().unwrap());
    assert_eq!(snapshot(&fixture.items), vec!["placeholder"]);
    assert_eq!(changed.get(), 3);
}

#[test]
fn test_redo_replays_nested_work_in_original_order() {
    let fixture = setup();
    let stack = &fixture.command_stack;

    stack
        .execute("wrap", CommandContext::new().with("inner", "x".to_string()))
        .unwrap();
    let forward = snapshot(&fixture.items);
    assert_eq!(forward, vec!["[", "x", "]"]);
    assert_eq!(stack.len(), 1);

    let commands: Vec<String> = stack.entries()[0]
        .actions
        .iter()
        .map(|action| action.command.clone())
        .collect();
    assert_eq!(commands, vec!["wrap", "append"]);

    stack.undo().unwrap();
    assert!(fixture.items.borrow().is_empty());

    stack.redo().unwrap();
    assert_eq!(snapshot(&fixture.items), forward);

    stack.undo().unwrap();
    stack.redo().unwrap();
    assert_eq!(snapshot(&fixture.items), forward);
    assert_eq!(stack.entries()[0].actions.len(), 2);
}

#[test]
fn test_failed_undo_reapplies_what_it_reverted() {
    let fixture = setup();
    let stack = &fixture.command_stack;
    let values = vec!["a".to_string(), "b".to_string()];
    stack
        .execute("append.all", CommandContext::new().with("values", values))
        .unwrap();
    let changed = count_events(&fixture.event_bus, CHANGED_EVENT);

    // "b" is reverted first, then reverting "a" fails
    let pinned = fixture.event_bus.on("commandStack.append.revert", |event| {
        let context = CommandContext::from_event(event).ok_or_else(|| Error::failed("no context"))?;
        match context.get::<String>("value").as_deref() {
            Some("a") => Err(Error::failed("a is pinned")),
            _ => Ok(Flow::Continue),
        }
    });

    assert_eq!(stack.undo(), Err(Error::failed("a is pinned")));
    assert_eq!(snapshot(&fixture.items), vec!["a", "b"]);
    assert!(stack.can_undo());
    assert!(!stack.can_redo());
    assert_eq!(stack.stack_index(), Some(0));
    assert!(!stack.is_executing());
    assert_eq!(changed.get(), 0);

    fixture.event_bus.off("commandStack.append.revert", Some(pinned));
    assert!(stack.undo().unwrap());
    assert!(fixture.items.borrow().is_empty());
}

#[test]
fn test_failed_redo_reverts_what_it_replayed() {
    let fixture = setup();
    let stack = &fixture.command_stack;
    let values = vec!["a".to_string(), "b".to_string()];
    stack
        .execute("append.all", CommandContext::new().with("values", values))
        .unwrap();
    stack.undo().unwrap();
    let changed = count_events(&fixture.event_bus, CHANGED_EVENT);

    let failing = fixture.event_bus.on("commandStack.append.executed", |event| {
        let context = CommandContext::from_event(event).ok_or_else(|| Error::failed("no context"))?;
        match context.get::<String>("value").as_deref() {
            Some("b") => Err(Error::failed("b cannot come back")),
            _ => Ok(Flow::Continue),
        }
    });

    assert_eq!(stack.redo(), Err(Error::failed("b cannot come back")));
    assert!(fixture.items.borrow().is_empty());
    assert!(stack.can_redo());
    assert!(!stack.can_undo());
    assert!(!stack.is_executing());
    assert_eq!(changed.get(), 0);

    fixture.event_bus.off("commandStack.append.executed", Some(failing));
    assert!(stack.redo().unwrap());
    assert_eq!(snapshot(&fixture.items), vec!["a", "b"]);
}

#[test]
fn test_swallowed_error_during_undo_lets_it_finish() {
    let fixture = setup();
    fixture.command_stack.execute("append", append_context("a")).unwrap();

    fixture.event_bus.on(ERROR_EVENT, |event| {
        event.prevent_default();
        Ok(Flow::Continue)
    });
    fixture
        .event_bus
        .on("commandStack.append.reverted", |_| Err(Error::failed("ignored")));

    assert!(fixture.command_stack.undo().unwrap());
    assert!(fixture.items.borrow().is_empty());
    assert!(fixture.command_stack.can_redo());
}

#[test]
fn test_redo_inside_transaction_leaves_state_untouched() {
    let fixture = setup();
    fixture.command_stack.execute("append", append_context("a")).unwrap();
    fixture.command_stack.undo().unwrap();

    let nested = fixture.command_stack.clone();
    fixture.event_bus.on("commandStack.append.executed", move |_| {
        nested.redo()?;
        Ok(Flow::Continue)
    });

    let result = fixture.command_stack.execute("append", append_context("b"));

    assert!(matches!(
        result,
        Err(Error::IllegalInvocation {
            trigger: Trigger::Execute,
            ..
        })
    ));
    assert!(fixture.items.borrow().is_empty());
    assert!(fixture.command_stack.can_redo());
    assert_eq!(fixture.command_stack.stack_index(), None);
}

#[test]
fn test_clear_drops_history() {
    let fixture = setup();
    let triggers = Rc::new(RefCell::new(Vec::new()));

    let inner = triggers.clone();
    fixture.event_bus.on(CHANGED_EVENT, move |event| {
        inner.borrow_mut().push(event.get("trigger").cloned().unwrap_or(Value::Null));
        Ok(Flow::Continue)
    });

    fixture.command_stack.execute("append", append_context("a")).unwrap();
    fixture.command_stack.execute("append", append_context("b")).unwrap();
    fixture.command_stack.undo().unwrap();

    fixture.command_stack.clear(true).unwrap();
    assert!(!fixture.command_stack.can_undo());
    assert!(!fixture.command_stack.can_redo());
    assert!(fixture.command_stack.is_empty());

    fixture.command_stack.execute("append", append_context("c")).unwrap();
    fixture.command_stack.clear(false).unwrap();

    assert_eq!(
        *triggers.borrow(),
        vec![json!("execute"), json!("execute"), json!("undo"), json!("clear"), json!("execute")]
    );
}

#[test]
fn test_reregistering_handler_replaces_it() {
    struct Refuse;

    impl CommandHandler for Refuse {
        fn can_execute(&self, _context: &CommandContext) -> bool {
            false
        }
    }

    let fixture = setup();
    fixture.command_stack.register("append", Refuse);

    assert!(!fixture.command_stack.execute("append", append_context("a")).unwrap());
    assert!(fixture.items.borrow().is_empty());
    assert_eq!(fixture.command_stack.handler_names(), vec!["append", "append.all", "wrap"]);
}

#[test]
fn test_handler_without_methods_is_noop() {
    struct Empty;

    impl CommandHandler for Empty {}

    let fixture = setup();
    fixture.command_stack.register("empty", Empty);

    assert!(fixture.command_stack.execute("empty", CommandContext::new()).unwrap());
    assert!(fixture.command_stack.undo().unwrap());
    assert!(fixture.command_stack.redo().unwrap());
}

#[test]
fn test_history_limit_drops_oldest_steps() {
    let fixture = setup_with_config(StackConfig {
        history_limit: Some(2),
        ..StackConfig::default()
    });
    let stack = &fixture.command_stack;

    for value in ["a", "b", "c"] {
        stack.execute("append", append_context(value)).unwrap();
    }

    assert_eq!(stack.len(), 2);
    stack.undo().unwrap();
    stack.undo().unwrap();
    assert!(!stack.can_undo());
    assert_eq!(snapshot(&fixture.items), vec!["a"]);
}

#[test]
fn test_commands_issued_from_changed_listener_start_new_entry() {
    let fixture = setup();
    let stack = fixture.command_stack.clone();
    let fired = Rc::new(Cell::new(false));

    let nested = stack.clone();
    let once = fired.clone();
    fixture.event_bus.on(CHANGED_EVENT, move |_| {
        if !once.replace(true) {
            nested.execute("append", append_context("after"))?;
        }
        Ok(Flow::Continue)
    });

    stack.execute("append", append_context("a")).unwrap();

    assert_eq!(snapshot(&fixture.items), vec!["a", "after"]);
    assert_eq!(stack.len(), 2);
}

#[test]
fn test_event_payload_reaches_generic_changed_listener() {
    let fixture = setup();
    let payload = Rc::new(RefCell::new(Payload::new()));

    let inner = payload.clone();
    fixture.event_bus.on(CHANGED_EVENT, move |event: &mut Event| {
        *inner.borrow_mut() = event.data().clone();
        Ok(Flow::Continue)
    });

    fixture.command_stack.execute("append", append_context("a")).unwrap();

    assert_eq!(payload.borrow().get("trigger"), Some(&json!("execute")));
}
