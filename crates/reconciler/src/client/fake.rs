//! Fake - test double for image store operations.
//!
//! Provides a deterministic [`FakeImageStore`] that implements [`ImageOps`]
//! using in-memory state, plus an ordered log of every call made against
//! it. Useful for unit-testing the reconciler without a running daemon.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use bytes::Bytes;
use tokio::sync::Mutex;

use crate::client::docker::ImageOps;
use crate::docker::client::DockerError;
use crate::docker::descriptor::ImageDescriptor;
use crate::docker::image::{BuildRequest, ByteStream};
use crate::docker::stream::{ProgressEvent, RawProgressStream};

/// One recorded call against the fake store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Find { name: String, tag: String },
    Pull { name: String, tag: String },
    Build { tag: String, context: PathBuf },
    Load { source: PathBuf },
    Export { name_tag: String },
    Tag { source: String, repo: String, tag: String, force: bool },
    Push { repo: String, tag: String },
    Remove { name_tag: String, force: bool },
}

impl StoreCall {
    /// Anything but a lookup has side effects (on the store, a registry, or disk).
    pub fn is_mutating(&self) -> bool {
        !matches!(self, StoreCall::Find { .. })
    }
}

// ── In-memory state ─────────────────────────────────────────────

/// Mutable inner state protected by a mutex.
#[derive(Default)]
struct Inner {
    /// Local images keyed by `name:tag`.
    images: HashMap<String, ImageDescriptor>,
    /// What a pull of `name:tag` yields.
    registry: HashMap<String, ImageDescriptor>,
    /// What loading an archive at a path yields.
    archives: HashMap<PathBuf, ImageDescriptor>,
    build_failure: Option<(Option<i64>, String)>,
    push_failure: Option<String>,
    tag_failure: Option<String>,
    tag_rejected: bool,
    remove_failure: Option<String>,
    export_failure: Option<String>,
    next_id: u64,
    calls: Vec<StoreCall>,
}

impl Inner {
    fn insert(&mut self, image: ImageDescriptor) {
        for tag in image.repo_tags.clone() {
            self.images.insert(tag, image.clone());
        }
    }
}

/// A fake image store for deterministic testing.
///
/// The builder methods allow pre-populating local images, registry content
/// and failures before running the reconciler.
pub struct FakeImageStore {
    inner: Mutex<Inner>,
}

impl FakeImageStore {
    /// Create an empty fake store.
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }

    /// Seed a local image under each of its repo tags.
    pub async fn add_image(&self, image: ImageDescriptor) {
        self.inner.lock().await.insert(image);
    }

    /// Make `image` available for pulling under each of its repo tags.
    pub async fn add_registry_image(&self, image: ImageDescriptor) {
        let mut state = self.inner.lock().await;
        for tag in image.repo_tags.clone() {
            state.registry.insert(tag, image.clone());
        }
    }

    /// Make loading the archive at `path` produce `image`.
    pub async fn add_archive(&self, path: impl Into<PathBuf>, image: ImageDescriptor) {
        self.inner.lock().await.archives.insert(path.into(), image);
    }

    pub async fn fail_build(&self, code: Option<i64>, message: &str) {
        self.inner.lock().await.build_failure = Some((code, message.to_string()));
    }

    pub async fn fail_push(&self, message: &str) {
        self.inner.lock().await.push_failure = Some(message.to_string());
    }

    pub async fn fail_tag(&self, message: &str) {
        self.inner.lock().await.tag_failure = Some(message.to_string());
    }

    /// Make tagging report `false` without an error.
    pub async fn reject_tag(&self) {
        self.inner.lock().await.tag_rejected = true;
    }

    pub async fn fail_remove(&self, message: &str) {
        self.inner.lock().await.remove_failure = Some(message.to_string());
    }

    pub async fn fail_export(&self, message: &str) {
        self.inner.lock().await.export_failure = Some(message.to_string());
    }

    pub async fn has_image(&self, name_tag: &str) -> bool {
        self.inner.lock().await.images.contains_key(name_tag)
    }

    /// Every call made so far, in order.
    pub async fn calls(&self) -> Vec<StoreCall> {
        self.inner.lock().await.calls.clone()
    }

    pub async fn mutating_calls(&self) -> Vec<StoreCall> {
        self.calls().await.into_iter().filter(StoreCall::is_mutating).collect()
    }
}

impl Default for FakeImageStore {
    fn default() -> Self {
        Self::new()
    }
}

// ── ImageOps implementation ─────────────────────────────────────

impl ImageOps for FakeImageStore {
    // ── Lookup ──────────────────────────────────────────────────

    fn find_image<'a>(
        &'a self,
        name: &'a str,
        tag: &'a str,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<Option<ImageDescriptor>, DockerError>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.inner.lock().await;
            state.calls.push(StoreCall::Find { name: name.to_string(), tag: tag.to_string() });
            Ok(state.images.get(&format!("{}:{}", name, tag)).cloned())
        })
    }

    // ── Acquisition ─────────────────────────────────────────────

    fn pull_image<'a>(&'a self, name: &'a str, tag: &'a str) -> RawProgressStream<'a> {
        Box::pin(async_stream::stream! {
            // Events are computed under the lock and yielded after it is
            // released, so the consumer may look images up mid-stream.
            let events: Vec<Result<ProgressEvent, DockerError>> = {
                let mut state = self.inner.lock().await;
                state.calls.push(StoreCall::Pull { name: name.to_string(), tag: tag.to_string() });

                let key = format!("{}:{}", name, tag);
                match state.registry.get(&key).cloned() {
                    Some(image) => {
                        state.insert(image.clone());
                        vec![
                            Ok(ProgressEvent::status(format!("Pulling from {}", name))),
                            Ok(ProgressEvent::status(format!("Digest: {}", image.id))),
                            Ok(ProgressEvent::status(format!("Status: Downloaded newer image for {}", key))),
                        ]
                    }
                    None => vec![Ok(ProgressEvent::failure(
                        None,
                        format!("pull access denied for {}, repository does not exist or may require 'docker login'", name),
                    ))],
                }
            };
            for event in events {
                yield event;
            }
        })
    }

    fn build_image<'a>(&'a self, request: BuildRequest) -> RawProgressStream<'a> {
        Box::pin(async_stream::stream! {
            let events: Vec<Result<ProgressEvent, DockerError>> = {
                let mut state = self.inner.lock().await;
                state.calls.push(StoreCall::Build {
                    tag: request.tag.clone(),
                    context: request.context.clone(),
                });

                let mut events = vec![Ok(ProgressEvent::stream("Step 1/2 : FROM scratch\n"))];
                match state.build_failure.clone() {
                    Some((code, message)) => {
                        events.push(Ok(ProgressEvent::failure(code, message)));
                    }
                    None => {
                        state.next_id += 1;
                        let id = format!("sha256:built{}", state.next_id);
                        state.insert(ImageDescriptor::new(id.clone(), vec![request.tag.clone()]));
                        events.push(Ok(ProgressEvent::stream(format!("Successfully built {}\n", id))));
                        events.push(Ok(ProgressEvent::stream(format!(
                            "Successfully tagged {}\n",
                            request.tag
                        ))));
                    }
                }
                events
            };
            for event in events {
                yield event;
            }
        })
    }

    fn load_image<'a>(&'a self, source: &'a Path) -> RawProgressStream<'a> {
        Box::pin(async_stream::stream! {
            let events: Vec<Result<ProgressEvent, DockerError>> = {
                let mut state = self.inner.lock().await;
                state.calls.push(StoreCall::Load { source: source.to_path_buf() });

                match state.archives.get(source).cloned() {
                    Some(image) => {
                        let loaded: Vec<_> = image
                            .repo_tags
                            .iter()
                            .map(|t| Ok(ProgressEvent::stream(format!("Loaded image: {}\n", t))))
                            .collect();
                        state.insert(image);
                        loaded
                    }
                    None => vec![Ok(ProgressEvent::failure(None, "invalid tar header"))],
                }
            };
            for event in events {
                yield event;
            }
        })
    }

    // ── Archive ─────────────────────────────────────────────────

    fn export_image<'a>(&'a self, name_tag: &'a str) -> ByteStream<'a> {
        Box::pin(async_stream::stream! {
            let chunks: Vec<Result<Bytes, DockerError>> = {
                let mut state = self.inner.lock().await;
                state.calls.push(StoreCall::Export { name_tag: name_tag.to_string() });

                if let Some(message) = state.export_failure.clone() {
                    vec![Err(DockerError::Progress { code: None, message })]
                } else if state.images.contains_key(name_tag) {
                    vec![
                        Ok(Bytes::from_static(b"fake-image-")),
                        Ok(Bytes::from(format!("archive:{}", name_tag))),
                    ]
                } else {
                    vec![Err(DockerError::ImageNotFound(name_tag.to_string()))]
                }
            };
            for chunk in chunks {
                yield chunk;
            }
        })
    }

    // ── Tag / push / remove ─────────────────────────────────────

    fn tag_image<'a>(
        &'a self,
        source: &'a str,
        repo: &'a str,
        tag: &'a str,
        force: bool,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<bool, DockerError>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.inner.lock().await;
            state.calls.push(StoreCall::Tag {
                source: source.to_string(),
                repo: repo.to_string(),
                tag: tag.to_string(),
                force,
            });

            if let Some(message) = state.tag_failure.clone() {
                return Err(DockerError::Progress { code: None, message });
            }
            if state.tag_rejected {
                return Ok(false);
            }

            let mut image = state
                .images
                .get(source)
                .cloned()
                .ok_or_else(|| DockerError::ImageNotFound(source.to_string()))?;
            let target = format!("{}:{}", repo, tag);
            if !image.has_tag(&target) {
                image.repo_tags.push(target);
            }
            state.insert(image);
            Ok(true)
        })
    }

    fn push_image<'a>(&'a self, repo: &'a str, tag: &'a str) -> RawProgressStream<'a> {
        Box::pin(async_stream::stream! {
            let events: Vec<Result<ProgressEvent, DockerError>> = {
                let mut state = self.inner.lock().await;
                state.calls.push(StoreCall::Push { repo: repo.to_string(), tag: tag.to_string() });

                let mut events = vec![Ok(ProgressEvent::status(format!(
                    "The push refers to repository [{}]",
                    repo
                )))];
                match state.push_failure.clone() {
                    Some(message) => events.push(Ok(ProgressEvent::failure(None, message))),
                    None => {
                        events.push(Ok(ProgressEvent::status("Pushed")));
                        events.push(Ok(ProgressEvent::status(format!(
                            "{}: digest: sha256:fake size: 1234",
                            tag
                        ))));
                    }
                }
                events
            };
            for event in events {
                yield event;
            }
        })
    }

    fn remove_image<'a>(
        &'a self,
        name_tag: &'a str,
        force: bool,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<(), DockerError>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.inner.lock().await;
            state.calls.push(StoreCall::Remove { name_tag: name_tag.to_string(), force });

            if let Some(message) = state.remove_failure.clone() {
                return Err(DockerError::Progress { code: None, message });
            }
            state
                .images
                .remove(name_tag)
                .map(|_| ())
                .ok_or_else(|| DockerError::ImageNotFound(name_tag.to_string()))
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    fn image(id: &str, tag: &str) -> ImageDescriptor {
        ImageDescriptor::new(id, vec![tag.to_string()])
    }

    #[tokio::test]
    async fn test_find_seeded_image() {
        let fake = FakeImageStore::new();
        fake.add_image(image("sha256:a", "app:v1")).await;

        assert!(fake.find_image("app", "v1").await.unwrap().is_some());
        assert!(fake.find_image("app", "v2").await.unwrap().is_none());
        assert!(fake.mutating_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_pull_from_registry() {
        let fake = FakeImageStore::new();
        fake.add_registry_image(image("sha256:r", "app:latest")).await;

        let events: Vec<_> = fake.pull_image("app", "latest").collect().await;
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.as_ref().map(|ev| !ev.is_error()).unwrap_or(false)));
        assert!(fake.has_image("app:latest").await);
    }

    #[tokio::test]
    async fn test_pull_unknown_reports_error_event() {
        let fake = FakeImageStore::new();
        let events: Vec<_> = fake.pull_image("ghost", "latest").collect().await;
        assert_eq!(events.len(), 1);
        assert!(events[0].as_ref().unwrap().is_error());
        assert!(!fake.has_image("ghost:latest").await);
    }

    #[tokio::test]
    async fn test_tag_copies_image() {
        let fake = FakeImageStore::new();
        fake.add_image(image("sha256:a", "app:v1")).await;

        assert!(fake.tag_image("app:v1", "reg.local/app", "v1", true).await.unwrap());
        let tagged = fake.find_image("reg.local/app", "v1").await.unwrap().unwrap();
        assert_eq!(tagged.id, "sha256:a");
        assert!(tagged.has_tag("app:v1"));
    }

    #[tokio::test]
    async fn test_remove_missing_image_errors() {
        let fake = FakeImageStore::new();
        let err = fake.remove_image("app:v1", false).await.unwrap_err();
        assert!(matches!(err, DockerError::ImageNotFound(_)));
        assert_eq!(fake.mutating_calls().await.len(), 1);
    }
}
