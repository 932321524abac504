use std::rc::{Rc, Weak};

use egui::{Rect, Vec2};

use super::{DELETE_SHAPE, MOVE_SHAPE, keys};
use crate::command::{CommandContext, CommandHandler, CommandStack, ElementId};
use crate::element::{ElementRegistry, ShapeRef, add_child, is_valid_size, remove_child};
use crate::error::{Error, Result};

fn id_of(shape: &ShapeRef) -> ElementId {
    shape.borrow().id().to_owned()
}

fn upgrade(stack: &Weak<CommandStack>) -> Result<Rc<CommandStack>> {
    stack
        .upgrade()
        .ok_or_else(|| Error::failed("command stack dropped"))
}

/// Detaches `shape` from its parent and remembers where it was.
fn detach(context: &CommandContext, shape: &ShapeRef) -> Option<ShapeRef> {
    let parent = shape.borrow().parent()?;
    let index = remove_child(&parent, shape)?;
    context.set(keys::OLD_PARENT, parent.clone());
    context.set(keys::OLD_PARENT_INDEX, index);
    Some(parent)
}

/// Puts `shape` back where [`detach`] found it.
fn reattach(context: &CommandContext, shape: &ShapeRef) -> Option<ShapeRef> {
    let parent = context.get::<ShapeRef>(keys::OLD_PARENT)?;
    let current = shape.borrow().parent();
    if let Some(current) = current {
        remove_child(&current, shape);
    }
    add_child(&parent, shape, context.get::<usize>(keys::OLD_PARENT_INDEX));
    Some(parent)
}

/// `shape.create`: adds `shape` to `parent` at `parent_index`.
pub struct CreateShapeHandler {
    registry: Rc<ElementRegistry>,
}

impl CreateShapeHandler {
    pub fn new(registry: Rc<ElementRegistry>) -> Self {
        Self { registry }
    }
}

impl CommandHandler for CreateShapeHandler {
    fn can_execute(&self, context: &CommandContext) -> bool {
        match (
            context.get::<ShapeRef>(keys::SHAPE),
            context.get::<ShapeRef>(keys::PARENT),
        ) {
            (Some(shape), Some(_)) => !self.registry.contains(shape.borrow().id()),
            _ => false,
        }
    }

    fn execute(&self, context: &CommandContext) -> Result<Vec<ElementId>> {
        let shape = context.require::<ShapeRef>(keys::SHAPE)?;
        let parent = context.require::<ShapeRef>(keys::PARENT)?;

        add_child(&parent, &shape, context.get::<usize>(keys::PARENT_INDEX));
        self.registry.add(&shape);

        Ok(vec![id_of(&shape), id_of(&parent)])
    }

    fn revert(&self, context: &CommandContext) -> Result<Vec<ElementId>> {
        let shape = context.require::<ShapeRef>(keys::SHAPE)?;
        let parent = context.require::<ShapeRef>(keys::PARENT)?;

        remove_child(&parent, &shape);
        self.registry.remove(shape.borrow().id());

        Ok(vec![id_of(&shape), id_of(&parent)])
    }
}

/// `shape.move`: translates `shape` by `delta` and optionally re-parents it
/// to `new_parent`. Children follow through nested moves.
pub struct MoveShapeHandler {
    command_stack: Weak<CommandStack>,
}

impl MoveShapeHandler {
    pub fn new(command_stack: Weak<CommandStack>) -> Self {
        Self { command_stack }
    }
}

impl CommandHandler for MoveShapeHandler {
    fn execute(&self, context: &CommandContext) -> Result<Vec<ElementId>> {
        let shape = context.require::<ShapeRef>(keys::SHAPE)?;
        let delta = context.require::<Vec2>(keys::DELTA)?;

        let old_bounds = shape.borrow().bounds();
        context.set(keys::OLD_BOUNDS, old_bounds);
        shape.borrow_mut().translate(delta);

        let mut touched = vec![id_of(&shape)];

        if let Some(new_parent) = context.get::<ShapeRef>(keys::NEW_PARENT) {
            if let Some(old_parent) = detach(context, &shape) {
                touched.push(id_of(&old_parent));
            }
            add_child(&new_parent, &shape, None);
            touched.push(id_of(&new_parent));
        }

        Ok(touched)
    }

    fn post_execute(&self, context: &CommandContext) -> Result<()> {
        let shape = context.require::<ShapeRef>(keys::SHAPE)?;
        let delta = context.require::<Vec2>(keys::DELTA)?;

        let children: Vec<ShapeRef> = shape.borrow().children().to_vec();
        if children.is_empty() {
            return Ok(());
        }

        let command_stack = upgrade(&self.command_stack)?;
        for child in children {
            let child_context = CommandContext::new()
                .with(keys::SHAPE, child)
                .with(keys::DELTA, delta);
            command_stack.execute(MOVE_SHAPE, child_context)?;
        }

        Ok(())
    }

    fn revert(&self, context: &CommandContext) -> Result<Vec<ElementId>> {
        let shape = context.require::<ShapeRef>(keys::SHAPE)?;
        let old_bounds = context.require::<Rect>(keys::OLD_BOUNDS)?;

        shape.borrow_mut().set_bounds(old_bounds);

        let mut touched = vec![id_of(&shape)];

        if let Some(new_parent) = context.get::<ShapeRef>(keys::NEW_PARENT) {
            remove_child(&new_parent, &shape);
            touched.push(id_of(&new_parent));
            if let Some(old_parent) = reattach(context, &shape) {
                touched.push(id_of(&old_parent));
            }
        }

        Ok(touched)
    }
}

/// `shape.resize`: replaces the bounds of `shape` with `new_bounds`.
#[derive(Debug, Default)]
pub struct ResizeShapeHandler;

impl CommandHandler for ResizeShapeHandler {
    fn can_execute(&self, context: &CommandContext) -> bool {
        context
            .get::<Rect>(keys::NEW_BOUNDS)
            .is_some_and(|bounds| is_valid_size(&bounds))
    }

    fn execute(&self, context: &CommandContext) -> Result<Vec<ElementId>> {
        let shape = context.require::<ShapeRef>(keys::SHAPE)?;
        let new_bounds = context.require::<Rect>(keys::NEW_BOUNDS)?;

        let old_bounds = shape.borrow().bounds();
        context.set(keys::OLD_BOUNDS, old_bounds);
        shape.borrow_mut().set_bounds(new_bounds);

        Ok(vec![id_of(&shape)])
    }

    fn revert(&self, context: &CommandContext) -> Result<Vec<ElementId>> {
        let shape = context.require::<ShapeRef>(keys::SHAPE)?;
        let old_bounds = context.require::<Rect>(keys::OLD_BOUNDS)?;

        shape.borrow_mut().set_bounds(old_bounds);

        Ok(vec![id_of(&shape)])
    }
}

/// `shape.delete`: removes `shape` and, before it, all of its children.
pub struct DeleteShapeHandler {
    registry: Rc<ElementRegistry>,
    command_stack: Weak<CommandStack>,
}

impl DeleteShapeHandler {
    pub fn new(registry: Rc<ElementRegistry>, command_stack: Weak<CommandStack>) -> Self {
        Self {
            registry,
            command_stack,
        }
    }
}

impl CommandHandler for DeleteShapeHandler {
    fn pre_execute(&self, context: &CommandContext) -> Result<()> {
        let shape = context.require::<ShapeRef>(keys::SHAPE)?;

        let children: Vec<ShapeRef> = shape.borrow().children().to_vec();
        if children.is_empty() {
            return Ok(());
        }

        let command_stack = upgrade(&self.command_stack)?;
        for child in children {
            command_stack.execute(DELETE_SHAPE, CommandContext::new().with(keys::SHAPE, child))?;
        }

        Ok(())
    }

    fn execute(&self, context: &CommandContext) -> Result<Vec<ElementId>> {
        let shape = context.require::<ShapeRef>(keys::SHAPE)?;

        let mut touched = vec![id_of(&shape)];
        if let Some(parent) = detach(context, &shape) {
            touched.push(id_of(&parent));
        }
        self.registry.remove(shape.borrow().id());

        Ok(touched)
    }

    fn revert(&self, context: &CommandContext) -> Result<Vec<ElementId>> {
        let shape = context.require::<ShapeRef>(keys::SHAPE)?;

        let mut touched = vec![id_of(&shape)];
        if let Some(parent) = reattach(context, &shape) {
            touched.push(id_of(&parent));
        }
        self.registry.add(&shape);

        Ok(touched)
    }
}
