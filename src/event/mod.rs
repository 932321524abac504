mod bus;
mod events;

pub use bus::EventBus;
pub use events::{ErrorDetails, Event, Payload};

use crate::error::Result;

/// Priority used when a listener is registered without one.
pub const DEFAULT_PRIORITY: i32 = 1000;

/// Name of the channel listener failures are reported on.
pub const ERROR_EVENT: &str = "error";

/// What a listener tells the bus after it ran.
///
/// `Continue` lets lower-priority listeners run. `Veto` and `Return` end the
/// dispatch and become the value returned by `fire`; `Veto` also marks the
/// event's default action as prevented.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Flow {
    #[default]
    Continue,
    Veto,
    Return(serde_json::Value),
}

impl Flow {
    /// The externally visible value of this outcome, `None` for `Continue`.
    pub fn into_value(self) -> Option<serde_json::Value> {
        match self {
            Flow::Continue => None,
            Flow::Veto => Some(serde_json::Value::Bool(false)),
            Flow::Return(value) => Some(value),
        }
    }
}

pub type ListenerResult = Result<Flow>;

/// Handle returned on registration, used to remove one specific listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

/// Anything that names one or more events.
pub trait IntoEventNames {
    fn into_event_names(self) -> Vec<String>;
}

impl IntoEventNames for &str {
    fn into_event_names(self) -> Vec<String> {
        vec![self.to_owned()]
    }
}

impl IntoEventNames for String {
    fn into_event_names(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoEventNames for &String {
    fn into_event_names(self) -> Vec<String> {
        vec![self.clone()]
    }
}

impl IntoEventNames for &[&str] {
    fn into_event_names(self) -> Vec<String> {
        self.iter().map(|name| (*name).to_owned()).collect()
    }
}

impl<const N: usize> IntoEventNames for [&str; N] {
    fn into_event_names(self) -> Vec<String> {
        self.iter().map(|name| (*name).to_owned()).collect()
    }
}

impl IntoEventNames for Vec<String> {
    fn into_event_names(self) -> Vec<String> {
        self
    }
}

impl IntoEventNames for Vec<&str> {
    fn into_event_names(self) -> Vec<String> {
        self.into_iter().map(str::to_owned).collect()
    }
}
