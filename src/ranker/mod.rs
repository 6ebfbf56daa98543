pub mod consolidate;

pub use consolidate::consolidate;
