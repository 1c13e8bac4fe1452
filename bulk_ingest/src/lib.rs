pub mod pipeline;
pub mod record;

// re-export serde_json so callers can build record payloads without
// depending on it directly
pub use serde_json;
