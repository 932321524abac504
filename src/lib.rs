#![warn(clippy::all, rust_2018_idioms)]

pub mod command;
pub mod config;
pub mod element;
pub mod error;
pub mod event;
pub mod id_generator;
pub mod modeling;

pub use command::{CommandContext, CommandHandler, CommandInterceptor, CommandStack, ElementId, Phase, Trigger};
pub use config::StackConfig;
pub use element::{ElementRegistry, Shape, ShapeRef};
pub use error::{Error, Result};
pub use event::{Event, EventBus, Flow, ListenerId, ListenerResult};
pub use modeling::Modeling;
