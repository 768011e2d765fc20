//! Docker module - bollard-backed daemon access for image operations.

pub mod client;
pub mod descriptor;
pub mod error_map;
pub mod image;
pub mod stream;

pub use client::{DockerClient, DockerError};
pub use descriptor::ImageDescriptor;
pub use image::{BuildRequest, ContainerLimits};
pub use stream::{ProgressEvent, ProgressSink, ProgressStream, ProgressSummary};
