//! Desired module - the caller's target description of an image and the
//! name/tag rules applied to it.

pub mod model;
pub mod load;
pub mod name;

pub use model::{BuildOptions, DesiredState, ImageState};
