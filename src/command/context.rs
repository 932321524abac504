use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::event::Event;

/// Shared, mutable property bag a command executes with.
///
/// Clones share the same storage: the caller, the handler and every
/// interceptor see the same values, and the copy kept in the history is the
/// one `revert` and redo work from. Handlers keep their undo bookkeeping
/// (`old_parent`, `old_bounds`, ...) here.
#[derive(Clone, Default)]
pub struct CommandContext {
    values: Rc<RefCell<HashMap<String, Box<dyn Any>>>>,
}

impl std::fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandContext")
            .field("keys", &self.keys())
            .finish()
    }
}

impl CommandContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Any>(self, key: impl Into<String>, value: T) -> Self {
        self.set(key, value);
        self
    }

    pub fn set<T: Any>(&self, key: impl Into<String>, value: T) {
        self.values.borrow_mut().insert(key.into(), Box::new(value));
    }

    /// A copy of the value under `key` if it has type `T`.
    pub fn get<T: Any + Clone>(&self, key: &str) -> Option<T> {
        self.values.borrow().get(key)?.downcast_ref::<T>().cloned()
    }

    /// Like [`get`](Self::get) but fails when the value is missing.
    pub fn require<T: Any + Clone>(&self, key: &str) -> Result<T> {
        self.get(key)
            .ok_or_else(|| Error::failed(format!("missing context property <{key}>")))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.borrow().contains_key(key)
    }

    pub fn remove(&self, key: &str) -> bool {
        self.values.borrow_mut().remove(key).is_some()
    }

    /// Mutates the value under `key` in place. `f` must not access this
    /// context.
    pub fn update<T: Any, R>(&self, key: &str, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut values = self.values.borrow_mut();
        let value = values.get_mut(key)?.downcast_mut::<T>()?;
        Some(f(value))
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Whether both handles share the same storage.
    pub fn ptr_eq(&self, other: &CommandContext) -> bool {
        Rc::ptr_eq(&self.values, &other.values)
    }

    /// The context a command lifecycle event carries.
    pub fn from_event(event: &Event) -> Option<CommandContext> {
        event.attachment::<CommandContext>().cloned()
    }
}
