use egui::Rect;

// Smallest width and height a shape may be resized to
pub const MIN_ELEMENT_SIZE: f32 = 2.0;

/// Whether `rect` meets the minimum shape dimensions
pub fn is_valid_size(rect: &Rect) -> bool {
    rect.width() >= MIN_ELEMENT_SIZE && rect.height() >= MIN_ELEMENT_SIZE
}
