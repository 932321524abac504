//! Reference modeling commands over the [`element`](crate::element) model.
//!
//! These handlers are the minimal diagram operations the command stack is
//! exercised with: creating, moving, resizing and deleting shapes. Moving and
//! deleting fan out to nested commands for children, which the stack folds
//! into a single undo step.

mod handlers;

pub use handlers::{CreateShapeHandler, DeleteShapeHandler, MoveShapeHandler, ResizeShapeHandler};

use std::rc::Rc;

use egui::{Rect, Vec2};

use crate::command::{CommandContext, CommandStack};
use crate::element::{ElementRegistry, ShapeRef};
use crate::error::Result;

pub const CREATE_SHAPE: &str = "shape.create";
pub const MOVE_SHAPE: &str = "shape.move";
pub const RESIZE_SHAPE: &str = "shape.resize";
pub const DELETE_SHAPE: &str = "shape.delete";

/// Context property names used by the modeling handlers.
pub mod keys {
    pub const SHAPE: &str = "shape";
    pub const PARENT: &str = "parent";
    pub const PARENT_INDEX: &str = "parent_index";
    pub const NEW_PARENT: &str = "new_parent";
    pub const DELTA: &str = "delta";
    pub const NEW_BOUNDS: &str = "new_bounds";
    pub const OLD_BOUNDS: &str = "old_bounds";
    pub const OLD_PARENT: &str = "old_parent";
    pub const OLD_PARENT_INDEX: &str = "old_parent_index";
}

/// Entry point for diagram changes; every method goes through the stack.
#[derive(Debug)]
pub struct Modeling {
    command_stack: Rc<CommandStack>,
    registry: Rc<ElementRegistry>,
}

impl Modeling {
    /// Registers the modeling handlers on `command_stack`.
    pub fn new(command_stack: Rc<CommandStack>, registry: Rc<ElementRegistry>) -> Self {
        Self::register_handlers(&command_stack, &registry);
        Self {
            command_stack,
            registry,
        }
    }

    pub fn register_handlers(command_stack: &CommandStack, registry: &Rc<ElementRegistry>) {
        let create_registry = registry.clone();
        command_stack.register_handler(CREATE_SHAPE, |_| CreateShapeHandler::new(create_registry));
        command_stack.register_handler(MOVE_SHAPE, |stack| MoveShapeHandler::new(stack.downgrade()));
        command_stack.register(RESIZE_SHAPE, ResizeShapeHandler);
        let delete_registry = registry.clone();
        command_stack.register_handler(DELETE_SHAPE, |stack| {
            DeleteShapeHandler::new(delete_registry, stack.downgrade())
        });
    }

    pub fn command_stack(&self) -> &Rc<CommandStack> {
        &self.command_stack
    }

    pub fn registry(&self) -> &Rc<ElementRegistry> {
        &self.registry
    }

    pub fn create_shape(&self, shape: &ShapeRef, parent: &ShapeRef) -> Result<bool> {
        let context = CommandContext::new()
            .with(keys::SHAPE, shape.clone())
            .with(keys::PARENT, parent.clone());
        self.command_stack.execute(CREATE_SHAPE, context)
    }

    pub fn create_shape_at(&self, shape: &ShapeRef, parent: &ShapeRef, index: usize) -> Result<bool> {
        let context = CommandContext::new()
            .with(keys::SHAPE, shape.clone())
            .with(keys::PARENT, parent.clone())
            .with(keys::PARENT_INDEX, index);
        self.command_stack.execute(CREATE_SHAPE, context)
    }

    /// Moves `shape` and its children by `delta`, re-parenting it when
    /// `new_parent` is given.
    pub fn move_shape(&self, shape: &ShapeRef, delta: Vec2, new_parent: Option<&ShapeRef>) -> Result<bool> {
        let context = CommandContext::new()
            .with(keys::SHAPE, shape.clone())
            .with(keys::DELTA, delta);
        if let Some(new_parent) = new_parent {
            context.set(keys::NEW_PARENT, new_parent.clone());
        }
        self.command_stack.execute(MOVE_SHAPE, context)
    }

    pub fn resize_shape(&self, shape: &ShapeRef, new_bounds: Rect) -> Result<bool> {
        let context = CommandContext::new()
            .with(keys::SHAPE, shape.clone())
            .with(keys::NEW_BOUNDS, new_bounds);
        self.command_stack.execute(RESIZE_SHAPE, context)
    }

    pub fn delete_shape(&self, shape: &ShapeRef) -> Result<bool> {
        let context = CommandContext::new().with(keys::SHAPE, shape.clone());
        self.command_stack.execute(DELETE_SHAPE, context)
    }
}
