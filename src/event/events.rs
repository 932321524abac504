use std::any::Any;
use std::rc::Rc;

use serde_json::Value;

use crate::error::Error;

/// Plain payload fields carried by an event.
pub type Payload = serde_json::Map<String, Value>;

/// A single dispatch's mutable event record.
///
/// Every listener invoked during one `fire` sees and may mutate the same
/// instance. Besides the JSON payload an event can carry one typed
/// attachment, which is how non-serializable data such as a command context
/// travels to listeners.
#[derive(Clone)]
pub struct Event {
    kind: String,
    data: Payload,
    attachment: Option<Rc<dyn Any>>,
    propagation_stopped: bool,
    default_prevented: bool,
    return_value: Option<Value>,
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.kind)
            .field("data", &self.data)
            .field("attachment", &self.attachment.as_ref().map(|_| "<attachment>"))
            .field("propagation_stopped", &self.propagation_stopped)
            .field("default_prevented", &self.default_prevented)
            .field("return_value", &self.return_value)
            .finish()
    }
}

impl Event {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: Payload::new(),
            attachment: None,
            propagation_stopped: false,
            default_prevented: false,
            return_value: None,
        }
    }

    /// Replaces the payload fields.
    pub fn with_data(mut self, data: Payload) -> Self {
        self.data = data;
        self
    }

    /// Adds one payload field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Attaches a typed value, replacing any previous attachment.
    pub fn with_attachment<T: Any>(mut self, attachment: T) -> Self {
        self.attachment = Some(Rc::new(attachment));
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub(crate) fn set_kind(&mut self, kind: String) -> String {
        std::mem::replace(&mut self.kind, kind)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn data(&self) -> &Payload {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Payload {
        &mut self.data
    }

    /// The typed attachment, if there is one of type `T`.
    pub fn attachment<T: Any>(&self) -> Option<&T> {
        self.attachment.as_deref()?.downcast_ref::<T>()
    }

    /// Ends the dispatch after the current listener.
    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    /// Marks the default action as vetoed.
    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented
    }

    /// The value the most recent short-circuiting listener returned.
    pub fn return_value(&self) -> Option<&Value> {
        self.return_value.as_ref()
    }

    pub(crate) fn set_return_value(&mut self, value: Value) {
        self.return_value = Some(value);
    }
}

/// Attachment of the `error` event describing a failed listener.
#[derive(Debug, Clone)]
pub struct ErrorDetails {
    /// Type of the event whose listener failed
    pub event_type: String,
    /// Payload of that event at the time of the failure
    pub data: Payload,
    /// The failure the listener returned
    pub error: Error,
}
