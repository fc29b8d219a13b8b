//! Common utility functions

use uuid::Uuid;

/// Generate a new UUID v4
pub fn generate_id() -> Uuid {
    Uuid::new_v4()
}

/// Mask sensitive data for logging and API responses
pub fn mask_sensitive(data: &str) -> String {
    if data.len() <= 8 {
        "***".to_string()
    } else {
        format!("{}***{}", &data[..4], &data[data.len() - 4..])
    }
}
