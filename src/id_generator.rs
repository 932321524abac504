use uuid::Uuid;

/// Generates a unique element id such as `shape_0f9c...`.
pub fn generate_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}
