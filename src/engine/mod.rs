//! Draft engine: snapshot comparison, initial-snapshot resolution, fallback
//! cache and the debounced autosave task.

pub mod cache;
pub mod change_detector;
pub mod persister;
pub mod resolver;
