use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::event::{
    DEFAULT_PRIORITY, ERROR_EVENT, ErrorDetails, Event, IntoEventNames, ListenerId,
    ListenerResult, Payload,
};

type Callback = Rc<dyn Fn(&mut Event) -> ListenerResult>;

/// Shared between the records of one `once` registration.
struct OnceState {
    fired: Cell<bool>,
    events: Vec<String>,
}

struct Listener {
    id: ListenerId,
    priority: i32,
    callback: Callback,
    once: Option<Rc<OnceState>>,
    removed: Cell<bool>,
}

/// A synchronous, priority-ordered event dispatcher.
///
/// Listeners are kept per event name in descending priority order; equal
/// priorities keep registration order. Dispatch is reentrant: listeners may
/// register, remove and fire while a dispatch is running. Records removed
/// during a dispatch are only flagged and get compacted once the outermost
/// dispatch returns, so a running dispatch can always find its position.
pub struct EventBus {
    listeners: RefCell<HashMap<String, Vec<Rc<Listener>>>>,
    next_id: Cell<u64>,
    dispatch_depth: Cell<usize>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners = self.listeners.borrow();
        f.debug_struct("EventBus")
            .field("events", &format!("<{} event types>", listeners.len()))
            .field("dispatch_depth", &self.dispatch_depth.get())
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
            dispatch_depth: Cell::new(0),
        }
    }

    /// Registers `listener` at [`DEFAULT_PRIORITY`].
    pub fn on<F>(&self, events: impl IntoEventNames, listener: F) -> ListenerId
    where
        F: Fn(&mut Event) -> ListenerResult + 'static,
    {
        self.on_priority(events, DEFAULT_PRIORITY, listener)
    }

    /// Registers `listener` for every given event name. Higher priorities
    /// are invoked first.
    pub fn on_priority<F>(&self, events: impl IntoEventNames, priority: i32, listener: F) -> ListenerId
    where
        F: Fn(&mut Event) -> ListenerResult + 'static,
    {
        self.add_listeners(events.into_event_names(), priority, Rc::new(listener), false)
    }

    /// Registers a listener that runs at most once, at [`DEFAULT_PRIORITY`].
    pub fn once<F>(&self, events: impl IntoEventNames, listener: F) -> ListenerId
    where
        F: Fn(&mut Event) -> ListenerResult + 'static,
    {
        self.once_priority(events, DEFAULT_PRIORITY, listener)
    }

    /// Registers a listener that is removed right before it is first invoked.
    ///
    /// When registered for several events it fires once in total.
    pub fn once_priority<F>(&self, events: impl IntoEventNames, priority: i32, listener: F) -> ListenerId
    where
        F: Fn(&mut Event) -> ListenerResult + 'static,
    {
        self.add_listeners(events.into_event_names(), priority, Rc::new(listener), true)
    }

    /// Removes the given listener from the named events, or every listener
    /// of those events when `listener` is `None`.
    ///
    /// Listeners removed while a dispatch is running are skipped by it if it
    /// has not reached them yet.
    pub fn off(&self, events: impl IntoEventNames, listener: Option<ListenerId>) {
        {
            let listeners = self.listeners.borrow();
            for name in events.into_event_names() {
                let Some(records) = listeners.get(&name) else {
                    continue;
                };
                records
                    .iter()
                    .filter(|record| listener.is_none_or(|id| record.id == id))
                    .for_each(|record| record.removed.set(true));
            }
        }

        if self.dispatch_depth.get() == 0 {
            self.compact();
        }
    }

    /// Builds an event from plain data without firing it.
    pub fn create_event(&self, kind: impl Into<String>, data: Payload) -> Event {
        Event::new(kind).with_data(data)
    }

    /// Fires `kind` with a fresh event carrying `data`.
    pub fn fire(&self, kind: &str, data: Payload) -> Result<Option<Value>> {
        let mut event = self.create_event(kind, data);
        self.dispatch(kind, &mut event)
    }

    /// Fires a caller-owned event under its own type.
    pub fn fire_event(&self, event: &mut Event) -> Result<Option<Value>> {
        let kind = event.kind().to_owned();
        self.dispatch(&kind, event)
    }

    /// Fires a caller-owned event under `kind`, restoring the event's own
    /// type afterwards.
    pub fn fire_as(&self, kind: &str, event: &mut Event) -> Result<Option<Value>> {
        let original = event.set_kind(kind.to_owned());
        let result = self.dispatch(kind, event);
        event.set_kind(original);
        result
    }

    pub fn has_listeners(&self, kind: &str) -> bool {
        self.listener_count(kind) > 0
    }

    pub fn listener_count(&self, kind: &str) -> usize {
        self.listeners
            .borrow()
            .get(kind)
            .map_or(0, |records| records.iter().filter(|record| !record.removed.get()).count())
    }

    fn add_listeners(&self, events: Vec<String>, priority: i32, callback: Callback, once: bool) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let once = once.then(|| {
            Rc::new(OnceState {
                fired: Cell::new(false),
                events: events.clone(),
            })
        });

        let mut listeners = self.listeners.borrow_mut();
        for name in events {
            let records = listeners.entry(name).or_default();
            // Insert before the first strictly lower priority so ties keep
            // registration order.
            let position = records
                .iter()
                .position(|record| record.priority < priority)
                .unwrap_or(records.len());
            records.insert(
                position,
                Rc::new(Listener {
                    id,
                    priority,
                    callback: callback.clone(),
                    once: once.clone(),
                    removed: Cell::new(false),
                }),
            );
        }

        id
    }

    fn dispatch(&self, kind: &str, event: &mut Event) -> Result<Option<Value>> {
        if kind.is_empty() {
            return Err(Error::MissingEventType);
        }

        if !self.has_listeners(kind) {
            return Ok(None);
        }

        let _guard = DispatchGuard::enter(self);

        let mut cursor: Option<Rc<Listener>> = None;
        let mut return_value = None;

        while !event.is_propagation_stopped() {
            let Some(listener) = self.next_listener(kind, cursor.as_ref()) else {
                break;
            };
            return_value = self.invoke(kind, event, &listener)?;
            cursor = Some(listener);
        }

        if return_value.is_none() && event.is_default_prevented() {
            return_value = Some(Value::Bool(false));
        }

        Ok(return_value)
    }

    /// The first live record after `cursor` in the current list.
    ///
    /// The list is re-read on every step so listeners added behind the
    /// running one during this dispatch are still reached.
    fn next_listener(&self, kind: &str, cursor: Option<&Rc<Listener>>) -> Option<Rc<Listener>> {
        let listeners = self.listeners.borrow();
        let records = listeners.get(kind)?;

        let start = match cursor {
            None => 0,
            Some(current) => records.iter().position(|record| Rc::ptr_eq(record, current))? + 1,
        };

        records[start..].iter().find(|record| !record.removed.get()).cloned()
    }

    fn invoke(&self, kind: &str, event: &mut Event, listener: &Listener) -> Result<Option<Value>> {
        if let Some(once) = &listener.once {
            if once.fired.replace(true) {
                return Ok(None);
            }
            self.off(once.events.clone(), Some(listener.id));
        }

        match (listener.callback)(event) {
            Ok(flow) => {
                let value = flow.into_value();
                if let Some(value) = &value {
                    if *value == Value::Bool(false) {
                        event.prevent_default();
                    }
                    event.set_return_value(value.clone());
                    event.stop_propagation();
                }
                Ok(value)
            }
            Err(error) => {
                if kind != ERROR_EVENT && self.handle_error(kind, event, &error) {
                    log::warn!("handled error in event listener for <{kind}>: {error}");
                    Ok(None)
                } else {
                    log::error!("unhandled error in event listener for <{kind}>: {error}");
                    Err(error)
                }
            }
        }
    }

    /// Reports a listener failure on the `error` channel, together with the
    /// payload of the event being dispatched. Returns whether an error
    /// listener prevented the default, i.e. took care of it.
    fn handle_error(&self, kind: &str, event: &Event, error: &Error) -> bool {
        let mut error_event = Event::new(ERROR_EVENT)
            .with("error", error.to_string())
            .with("event_type", kind)
            .with("event", Value::Object(event.data().clone()))
            .with_attachment(ErrorDetails {
                event_type: kind.to_owned(),
                data: event.data().clone(),
                error: error.clone(),
            });

        match self.fire_event(&mut error_event) {
            Ok(_) => error_event.is_default_prevented(),
            Err(secondary) => {
                log::error!("error listener failed while handling <{kind}>: {secondary}");
                false
            }
        }
    }

    fn compact(&self) {
        let mut listeners = self.listeners.borrow_mut();
        listeners.retain(|_, records| {
            records.retain(|record| !record.removed.get());
            !records.is_empty()
        });
    }
}

struct DispatchGuard<'a> {
    bus: &'a EventBus,
}

impl<'a> DispatchGuard<'a> {
    fn enter(bus: &'a EventBus) -> Self {
        bus.dispatch_depth.set(bus.dispatch_depth.get() + 1);
        Self { bus }
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        let depth = self.bus.dispatch_depth.get() - 1;
        self.bus.dispatch_depth.set(depth);
        if depth == 0 {
            self.bus.compact();
        }
    }
}
