use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use egui::{Rect, Vec2};

mod common;

pub use common::{MIN_ELEMENT_SIZE, is_valid_size};

use crate::command::ElementId;

pub type ShapeRef = Rc<RefCell<Shape>>;

/// A rectangular diagram element that may contain other shapes.
///
/// Children are owned by their parent; the back reference is weak.
pub struct Shape {
    id: ElementId,
    bounds: Rect,
    parent: Option<Weak<RefCell<Shape>>>,
    children: Vec<ShapeRef>,
}

impl std::fmt::Debug for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let children: Vec<ElementId> = self.children.iter().map(|child| child.borrow().id.clone()).collect();
        f.debug_struct("Shape")
            .field("id", &self.id)
            .field("bounds", &self.bounds)
            .field("parent", &self.parent().map(|parent| parent.borrow().id.clone()))
            .field("children", &children)
            .finish()
    }
}

impl Shape {
    pub fn new(id: impl Into<ElementId>, bounds: Rect) -> ShapeRef {
        Rc::new(RefCell::new(Self {
            id: id.into(),
            bounds,
            parent: None,
            children: Vec::new(),
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn set_bounds(&mut self, bounds: Rect) {
        self.bounds = bounds;
    }

    pub fn translate(&mut self, delta: Vec2) {
        self.bounds = self.bounds.translate(delta);
    }

    pub fn parent(&self) -> Option<ShapeRef> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn children(&self) -> &[ShapeRef] {
        &self.children
    }

    /// Position of `child` among this shape's children.
    pub fn child_index(&self, child: &ShapeRef) -> Option<usize> {
        self.children.iter().position(|candidate| Rc::ptr_eq(candidate, child))
    }
}

/// Inserts `child` into `parent` at `index` (appending when `None` or out of
/// range) and points the child back at it.
pub fn add_child(parent: &ShapeRef, child: &ShapeRef, index: Option<usize>) {
    let mut parent_shape = parent.borrow_mut();
    let index = index
        .unwrap_or(parent_shape.children.len())
        .min(parent_shape.children.len());
    parent_shape.children.insert(index, child.clone());
    child.borrow_mut().parent = Some(Rc::downgrade(parent));
}

/// Detaches `child` from `parent`, returning the index it had.
pub fn remove_child(parent: &ShapeRef, child: &ShapeRef) -> Option<usize> {
    let index = parent.borrow().child_index(child)?;
    parent.borrow_mut().children.remove(index);
    child.borrow_mut().parent = None;
    Some(index)
}

/// Id lookup for every shape currently part of the diagram.
#[derive(Debug, Default)]
pub struct ElementRegistry {
    shapes: RefCell<HashMap<ElementId, ShapeRef>>,
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, shape: &ShapeRef) {
        let id = shape.borrow().id().to_owned();
        self.shapes.borrow_mut().insert(id, shape.clone());
    }

    pub fn remove(&self, id: &str) -> Option<ShapeRef> {
        self.shapes.borrow_mut().remove(id)
    }

    pub fn get(&self, id: &str) -> Option<ShapeRef> {
        self.shapes.borrow().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.shapes.borrow().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.shapes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.borrow().is_empty()
    }

    pub fn ids(&self) -> Vec<ElementId> {
        let mut ids: Vec<ElementId> = self.shapes.borrow().keys().cloned().collect();
        ids.sort();
        ids
    }
}

/// Factory functions for creating shapes
pub mod factory {
    use super::*;
    use crate::id_generator::generate_id;
    use egui::{Pos2, Vec2};

    /// Create a shape with a generated id
    pub fn create_shape(position: Pos2, size: Vec2) -> ShapeRef {
        Shape::new(generate_id("shape"), Rect::from_min_size(position, size))
    }

    /// Create the root container shapes are placed in
    pub fn create_root() -> ShapeRef {
        Shape::new(generate_id("root"), Rect::NOTHING)
    }
}
