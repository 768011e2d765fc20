//! Live - implements `ImageOps` for the real Bollard-backed `DockerClient`.

use std::path::Path;
use std::pin::Pin;

use crate::client::docker::ImageOps;
use crate::docker::client::{DockerClient, DockerError};
use crate::docker::descriptor::ImageDescriptor;
use crate::docker::image::{BuildRequest, ByteStream};
use crate::docker::stream::RawProgressStream;

impl ImageOps for DockerClient {
    // ── Lookup ──────────────────────────────────────────────────

    fn find_image<'a>(
        &'a self,
        name: &'a str,
        tag: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Option<ImageDescriptor>, DockerError>> + Send + 'a>> {
        Box::pin(self.find_image(name, tag))
    }

    // ── Acquisition ─────────────────────────────────────────────

    fn pull_image<'a>(&'a self, name: &'a str, tag: &'a str) -> RawProgressStream<'a> {
        DockerClient::pull_image(self, name, tag)
    }

    fn build_image<'a>(&'a self, request: BuildRequest) -> RawProgressStream<'a> {
        DockerClient::build_image(self, request)
    }

    fn load_image<'a>(&'a self, source: &'a Path) -> RawProgressStream<'a> {
        DockerClient::load_image(self, source)
    }

    // ── Archive ─────────────────────────────────────────────────

    fn export_image<'a>(&'a self, name_tag: &'a str) -> ByteStream<'a> {
        DockerClient::export_image(self, name_tag)
    }

    // ── Tag / push / remove ─────────────────────────────────────

    fn tag_image<'a>(
        &'a self,
        source: &'a str,
        repo: &'a str,
        tag: &'a str,
        force: bool,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<bool, DockerError>> + Send + 'a>> {
        Box::pin(self.tag_image(source, repo, tag, force))
    }

    fn push_image<'a>(&'a self, repo: &'a str, tag: &'a str) -> RawProgressStream<'a> {
        DockerClient::push_image(self, repo, tag)
    }

    fn remove_image<'a>(
        &'a self,
        name_tag: &'a str,
        force: bool,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<(), DockerError>> + Send + 'a>> {
        Box::pin(self.remove_image(name_tag, force))
    }
}
