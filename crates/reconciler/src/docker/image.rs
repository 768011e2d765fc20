//! Image domain - find, pull, build, load, export, tag, push, remove.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_stream::Stream;

use super::client::{DockerClient, DockerError};
use super::descriptor::ImageDescriptor;
use super::stream::{boxed, ProgressEvent, RawProgressStream};
use crate::desired::name::{resolve_repository_name, DEFAULT_REGISTRY};

pub type ByteStream<'a> = Pin<Box<dyn Stream<Item = Result<Bytes, DockerError>> + Send + 'a>>;

/// Resource limits applied to the intermediate build containers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerLimits {
    /// Memory limit in bytes.
    pub memory: Option<i32>,
    /// Total memory (memory + swap), -1 disables swap.
    pub memswap: Option<i32>,
    /// CPU shares (relative weight).
    pub cpushares: Option<i32>,
    /// CPUs in which to allow execution, e.g. "0-3" or "0,1".
    pub cpusetcpus: Option<String>,
}

/// Everything the daemon needs to build `tag` from a context directory.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildRequest {
    pub context: PathBuf,
    /// Full `name:tag` reference for the resulting image.
    pub tag: String,
    pub dockerfile: String,
    pub rm: bool,
    pub nocache: bool,
    pub pull: bool,
    pub buildargs: HashMap<String, String>,
    pub container_limits: Option<ContainerLimits>,
    /// Request timeout in seconds for this build only.
    pub http_timeout: Option<u64>,
}

/// Pack a build context directory into an in-memory tarball.
fn pack_context(dir: &Path) -> Result<Vec<u8>, std::io::Error> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);
    builder.append_dir_all(".", dir)?;
    builder.into_inner()
}

impl DockerClient {
    /// Find the local image tagged exactly `name:tag`.
    ///
    /// Names on the default registry are retried without the registry
    /// prefix (and without `library/`), since the daemon stores them short.
    pub async fn find_image(
        &self,
        name: &str,
        tag: &str,
    ) -> Result<Option<ImageDescriptor>, DockerError> {
        if name.is_empty() {
            return Ok(None);
        }

        let mut ids = self.image_lookup(name, tag).await?;

        if ids.is_empty() {
            if let Some((registry, repo_name)) = resolve_repository_name(name) {
                if registry == DEFAULT_REGISTRY && repo_name != name {
                    ids = self.image_lookup(&repo_name, tag).await?;
                    if ids.is_empty() {
                        if let Some(short) = repo_name.strip_prefix("library/") {
                            ids = self.image_lookup(short, tag).await?;
                        }
                    }
                }
            }
        }

        match ids.as_slice() {
            [] => Ok(None),
            [id] => {
                let inspect = self.client.inspect_image(id).await?;
                Ok(Some(ImageDescriptor::from(inspect)))
            }
            _ => Err(DockerError::AmbiguousImage(format!("{}:{}", name, tag))),
        }
    }

    /// Ids of local images whose RepoTags contain `name:tag`.
    async fn image_lookup(&self, name: &str, tag: &str) -> Result<Vec<String>, DockerError> {
        use bollard::query_parameters::ListImagesOptionsBuilder;

        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        filters.insert("reference".to_string(), vec![name.to_string()]);
        let options = ListImagesOptionsBuilder::default().filters(&filters).build();

        let images = self.client.list_images(Some(options)).await?;
        let lookup = format!("{}:{}", name, tag);

        let mut ids: Vec<String> = images
            .into_iter()
            .filter(|image| image.repo_tags.iter().any(|t| t == &lookup))
            .map(|image| image.id)
            .collect();
        ids.dedup();

        tracing::trace!(lookup = %lookup, matches = ids.len(), "Image lookup");
        Ok(ids)
    }

    /// Pull `name:tag` from its registry.
    pub fn pull_image<'a>(&'a self, name: &'a str, tag: &'a str) -> RawProgressStream<'a> {
        use bollard::query_parameters::CreateImageOptions;

        boxed(async_stream::try_stream! {
            let options = Some(CreateImageOptions {
                from_image: Some(name.to_string()),
                tag: Some(tag.to_string()),
                ..Default::default()
            });

            let mut stream = self.client.create_image(options, None, None);
            while let Some(info) = stream.next().await {
                let info = info.map_err(DockerError::from)?;
                yield ProgressEvent::from(info);
            }
        })
    }

    /// Build an image from a context directory.
    pub fn build_image<'a>(&'a self, request: BuildRequest) -> RawProgressStream<'a> {
        use bollard::query_parameters::BuildImageOptionsBuilder;

        boxed(async_stream::try_stream! {
            let context = request.context.clone();
            let tarball = tokio::task::spawn_blocking(move || pack_context(&context))
                .await
                .map_err(|e| DockerError::Io(std::io::Error::other(e)))?
                .map_err(DockerError::from)?;

            let mut builder = BuildImageOptionsBuilder::default()
                .dockerfile(&request.dockerfile)
                .t(&request.tag)
                .rm(request.rm)
                .forcerm(request.rm)
                .nocache(request.nocache);
            if request.pull {
                builder = builder.pull("true");
            }
            if !request.buildargs.is_empty() {
                builder = builder.buildargs(&request.buildargs);
            }
            if let Some(limits) = &request.container_limits {
                if let Some(memory) = limits.memory {
                    builder = builder.memory(memory);
                }
                if let Some(memswap) = limits.memswap {
                    builder = builder.memswap(memswap);
                }
                if let Some(shares) = limits.cpushares {
                    builder = builder.cpushares(shares);
                }
                if let Some(cpus) = &limits.cpusetcpus {
                    builder = builder.cpusetcpus(cpus);
                }
            }
            let options = builder.build();

            // The timeout is opaque to the reconciler; it only scopes this call.
            let client = match request.http_timeout {
                Some(secs) => self.client.clone().with_timeout(Duration::from_secs(secs)),
                None => self.client.clone(),
            };

            tracing::debug!(
                tag = %request.tag,
                context = %request.context.display(),
                bytes = tarball.len(),
                "Sending build context"
            );

            let mut stream = client.build_image(options, None, Some(bollard::body_full(tarball.into())));
            while let Some(info) = stream.next().await {
                let info = info.map_err(DockerError::from)?;
                yield ProgressEvent::from(info);
            }
        })
    }

    /// Load images from a `docker save` archive.
    pub fn load_image<'a>(&'a self, source: &'a Path) -> RawProgressStream<'a> {
        use bollard::query_parameters::ImportImageOptionsBuilder;

        boxed(async_stream::try_stream! {
            let archive = tokio::fs::read(source).await.map_err(DockerError::from)?;
            let options = ImportImageOptionsBuilder::default().quiet(false).build();

            let mut stream = self.client.import_image(options, bollard::body_full(archive.into()), None);
            while let Some(info) = stream.next().await {
                let info = info.map_err(DockerError::from)?;
                yield ProgressEvent::from(info);
            }
        })
    }

    /// Stream the `docker save` tarball of an image.
    pub fn export_image<'a>(&'a self, name_tag: &'a str) -> ByteStream<'a> {
        Box::pin(
            self.client
                .export_image(name_tag)
                .map(|chunk| chunk.map_err(DockerError::from)),
        )
    }

    /// Tag `source` as `repo:tag`.
    ///
    /// The daemon API has no force flag: re-tagging always overwrites.
    pub async fn tag_image(
        &self,
        source: &str,
        repo: &str,
        tag: &str,
        force: bool,
    ) -> Result<bool, DockerError> {
        use bollard::query_parameters::TagImageOptionsBuilder;

        tracing::debug!(source, repo, tag, force, "Tagging image");
        let options = TagImageOptionsBuilder::default().repo(repo).tag(tag).build();
        self.client.tag_image(source, Some(options)).await?;
        Ok(true)
    }

    /// Push `repo:tag` to its registry.
    pub fn push_image<'a>(&'a self, repo: &'a str, tag: &'a str) -> RawProgressStream<'a> {
        use bollard::query_parameters::PushImageOptionsBuilder;

        boxed(async_stream::try_stream! {
            let options = PushImageOptionsBuilder::default().tag(tag).build();

            let mut stream = self.client.push_image(repo, Some(options), None);
            while let Some(info) = stream.next().await {
                let info = info.map_err(DockerError::from)?;
                yield ProgressEvent::from(info);
            }
        })
    }

    /// Remove an image by reference.
    pub async fn remove_image(&self, name_tag: &str, force: bool) -> Result<(), DockerError> {
        use bollard::query_parameters::RemoveImageOptions;

        let options = Some(RemoveImageOptions {
            force,
            noprune: false,
            ..Default::default()
        });

        self.client
            .remove_image(name_tag, options, None)
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                } => DockerError::ImageNotFound(name_tag.to_string()),
                other => DockerError::from(other),
            })?;

        Ok(())
    }
}
