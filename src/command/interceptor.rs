use std::cell::RefCell;
use std::rc::Rc;

use super::{CommandContext, Phase};
use crate::event::{Event, EventBus, Flow, ListenerId, ListenerResult};

/// Registration helper for listeners on command lifecycle events.
///
/// `commands` selects which commands to hook; an empty slice hooks every
/// command through the un-scoped `commandStack.<phase>` event. The phase
/// shorthands hand the listener the command context instead of the raw
/// event.
///
/// ```rust
/// use diagram_commands::{CommandInterceptor, EventBus, Flow};
/// use std::rc::Rc;
///
/// let interceptor = CommandInterceptor::new(Rc::new(EventBus::new()));
/// interceptor.can_execute(&["shape.delete"], 1500, |context| {
///     // veto deleting locked shapes
///     if context.get::<bool>("locked").unwrap_or(false) {
///         Ok(Flow::Veto)
///     } else {
///         Ok(Flow::Continue)
///     }
/// });
/// ```
pub struct CommandInterceptor {
    event_bus: Rc<EventBus>,
    registrations: RefCell<Vec<(Vec<String>, ListenerId)>>,
}

impl std::fmt::Debug for CommandInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandInterceptor")
            .field("registrations", &self.registrations.borrow().len())
            .finish()
    }
}

impl CommandInterceptor {
    pub fn new(event_bus: Rc<EventBus>) -> Self {
        Self {
            event_bus,
            registrations: RefCell::new(Vec::new()),
        }
    }

    /// Hooks `phase` of `commands` with a listener receiving the raw event.
    pub fn on<F>(&self, commands: &[&str], phase: Phase, priority: i32, listener: F) -> ListenerId
    where
        F: Fn(&mut Event) -> ListenerResult + 'static,
    {
        let events = Self::event_names(commands, phase);
        let id = self.event_bus.on_priority(events.clone(), priority, listener);
        self.registrations.borrow_mut().push((events, id));
        id
    }

    /// Hooks `phase` of `commands` with a listener receiving the context.
    pub fn on_context<F>(&self, commands: &[&str], phase: Phase, priority: i32, listener: F) -> ListenerId
    where
        F: Fn(&CommandContext) -> ListenerResult + 'static,
    {
        self.on(commands, phase, priority, move |event| {
            match CommandContext::from_event(event) {
                Some(context) => listener(&context),
                None => Ok(Flow::Continue),
            }
        })
    }

    pub fn can_execute<F>(&self, commands: &[&str], priority: i32, listener: F) -> ListenerId
    where
        F: Fn(&CommandContext) -> ListenerResult + 'static,
    {
        self.on_context(commands, Phase::CanExecute, priority, listener)
    }

    pub fn pre_execute<F>(&self, commands: &[&str], priority: i32, listener: F) -> ListenerId
    where
        F: Fn(&CommandContext) -> ListenerResult + 'static,
    {
        self.on_context(commands, Phase::PreExecute, priority, listener)
    }

    pub fn pre_executed<F>(&self, commands: &[&str], priority: i32, listener: F) -> ListenerId
    where
        F: Fn(&CommandContext) -> ListenerResult + 'static,
    {
        self.on_context(commands, Phase::PreExecuted, priority, listener)
    }

    pub fn execute<F>(&self, commands: &[&str], priority: i32, listener: F) -> ListenerId
    where
        F: Fn(&CommandContext) -> ListenerResult + 'static,
    {
        self.on_context(commands, Phase::Execute, priority, listener)
    }

    pub fn executed<F>(&self, commands: &[&str], priority: i32, listener: F) -> ListenerId
    where
        F: Fn(&CommandContext) -> ListenerResult + 'static,
    {
        self.on_context(commands, Phase::Executed, priority, listener)
    }

    pub fn post_execute<F>(&self, commands: &[&str], priority: i32, listener: F) -> ListenerId
    where
        F: Fn(&CommandContext) -> ListenerResult + 'static,
    {
        self.on_context(commands, Phase::PostExecute, priority, listener)
    }

    pub fn post_executed<F>(&self, commands: &[&str], priority: i32, listener: F) -> ListenerId
    where
        F: Fn(&CommandContext) -> ListenerResult + 'static,
    {
        self.on_context(commands, Phase::PostExecuted, priority, listener)
    }

    pub fn revert<F>(&self, commands: &[&str], priority: i32, listener: F) -> ListenerId
    where
        F: Fn(&CommandContext) -> ListenerResult + 'static,
    {
        self.on_context(commands, Phase::Revert, priority, listener)
    }

    pub fn reverted<F>(&self, commands: &[&str], priority: i32, listener: F) -> ListenerId
    where
        F: Fn(&CommandContext) -> ListenerResult + 'static,
    {
        self.on_context(commands, Phase::Reverted, priority, listener)
    }

    /// Removes every listener registered through this interceptor.
    pub fn detach(&self) {
        for (events, id) in self.registrations.borrow_mut().drain(..) {
            self.event_bus.off(events, Some(id));
        }
    }

    fn event_names(commands: &[&str], phase: Phase) -> Vec<String> {
        if commands.is_empty() {
            vec![phase.event()]
        } else {
            commands.iter().map(|command| phase.scoped_event(command)).collect()
        }
    }
}
