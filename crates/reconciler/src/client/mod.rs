//! Client module - the image store capability used by the reconciler.

pub mod docker;
pub mod fake;
pub mod live;

pub use docker::ImageOps;
pub use fake::{FakeImageStore, StoreCall};
