//! Image store trait - abstract interface for all image operations.
//!
//! The reconciler reaches the daemon only through this trait.
//! `live.rs` provides the real Bollard-backed implementation.
//! `fake.rs` provides a test double.

use std::path::Path;
use std::pin::Pin;

use crate::docker::client::DockerError;
use crate::docker::descriptor::ImageDescriptor;
use crate::docker::image::{BuildRequest, ByteStream};
use crate::docker::stream::RawProgressStream;

/// Unified async interface over an image store.
///
/// Object-safe thanks to `Pin<Box<…>>` returns for futures and streams.
/// Streaming operations yield progress events; an event carrying an error
/// is the store's way of reporting failure and ends the operation.
pub trait ImageOps: Send + Sync {
    // ── Lookup ──────────────────────────────────────────────────

    fn find_image<'a>(
        &'a self,
        name: &'a str,
        tag: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Option<ImageDescriptor>, DockerError>> + Send + 'a>>;

    // ── Acquisition ─────────────────────────────────────────────

    fn pull_image<'a>(&'a self, name: &'a str, tag: &'a str) -> RawProgressStream<'a>;

    fn build_image<'a>(&'a self, request: BuildRequest) -> RawProgressStream<'a>;

    fn load_image<'a>(&'a self, source: &'a Path) -> RawProgressStream<'a>;

    // ── Archive ─────────────────────────────────────────────────

    fn export_image<'a>(&'a self, name_tag: &'a str) -> ByteStream<'a>;

    // ── Tag / push / remove ─────────────────────────────────────

    fn tag_image<'a>(
        &'a self,
        source: &'a str,
        repo: &'a str,
        tag: &'a str,
        force: bool,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<bool, DockerError>> + Send + 'a>>;

    fn push_image<'a>(&'a self, repo: &'a str, tag: &'a str) -> RawProgressStream<'a>;

    fn remove_image<'a>(
        &'a self,
        name_tag: &'a str,
        force: bool,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<(), DockerError>> + Send + 'a>>;
}
