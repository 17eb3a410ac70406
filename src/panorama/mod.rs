// Public API
pub use catalog::{InMemoryPanoramaCatalog, PanoramaCatalog, PanoramaPoint};

// Internal modules
mod catalog;
