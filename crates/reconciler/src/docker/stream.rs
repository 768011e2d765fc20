use std::io::Write;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bollard::models::{
    BuildInfo, CreateImageInfo, ErrorDetail as BollardErrorDetail, ProgressDetail, PushImageInfo,
};
use serde::{Deserialize, Serialize};
use tokio_stream::{Stream, StreamExt};

use crate::docker::client::DockerError;

/// Error payload attached to a failed progress event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// One line of daemon output from a build, pull, load or push.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "errorDetail", default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<ErrorDetail>,
}

impl ProgressEvent {
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            ..Default::default()
        }
    }

    pub fn stream(text: impl Into<String>) -> Self {
        Self {
            stream: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn failure(code: Option<i64>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            error: Some(message.clone()),
            error_detail: Some(ErrorDetail {
                code,
                message: Some(message),
            }),
            ..Default::default()
        }
    }

    fn from_daemon(
        id: Option<String>,
        stream: Option<String>,
        status: Option<String>,
        progress: Option<ProgressDetail>,
        error: Option<BollardErrorDetail>,
    ) -> Self {
        let error_detail = error.map(|e| ErrorDetail {
            code: e.code,
            message: e.message,
        });
        Self {
            id,
            stream,
            status,
            progress: progress.and_then(render_progress),
            error: error_detail.as_ref().and_then(|d| d.message.clone()),
            error_detail,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some() || self.error_detail.is_some()
    }

    /// The terminal error carried by this event, if any.
    pub fn to_error(&self) -> Option<DockerError> {
        if !self.is_error() {
            return None;
        }
        let detail = self.error_detail.clone().unwrap_or_default();
        let message = detail
            .message
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "unknown error".to_string());
        Some(DockerError::Progress {
            code: detail.code,
            message,
        })
    }

    /// Human-readable form of the event for the output sink.
    pub fn render(&self) -> String {
        if let Some(stream) = &self.stream {
            return stream.clone();
        }
        if let Some(status) = &self.status {
            return match (&self.id, &self.progress) {
                (Some(id), Some(progress)) => format!("{} {} {}", id, status, progress),
                (Some(id), None) => format!("{} {}", id, status),
                _ => status.clone(),
            };
        }
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

// Build and load both yield `BuildInfo`.
impl From<BuildInfo> for ProgressEvent {
    fn from(info: BuildInfo) -> Self {
        Self::from_daemon(info.id, info.stream, info.status, info.progress_detail, info.error_detail)
    }
}

impl From<CreateImageInfo> for ProgressEvent {
    fn from(info: CreateImageInfo) -> Self {
        Self::from_daemon(info.id, None, info.status, info.progress_detail, info.error_detail)
    }
}

impl From<PushImageInfo> for ProgressEvent {
    fn from(info: PushImageInfo) -> Self {
        Self::from_daemon(None, None, info.status, info.progress_detail, info.error_detail)
    }
}

fn render_progress(detail: ProgressDetail) -> Option<String> {
    match (detail.current, detail.total) {
        (Some(current), Some(total)) if total > 0 => Some(format!("{}/{}", current, total)),
        (Some(current), _) => Some(current.to_string()),
        _ => None,
    }
}

/// Destination for relayed daemon output.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &ProgressEvent);
}

/// Writes rendered events to the console. Stdout is reserved for the
/// reconciliation result, so the default target is stderr.
pub struct ConsoleSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleSink {
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }

    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }
}

impl ProgressSink for ConsoleSink {
    fn emit(&self, event: &ProgressEvent) {
        let line = event.render();
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "{}", line.trim_end_matches('\n'));
        }
    }
}

/// Relays events as debug-level tracing records.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn emit(&self, event: &ProgressEvent) {
        tracing::debug!(output = %event.render().trim_end(), "daemon progress");
    }
}

pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: &ProgressEvent) {}
}

pub type RawProgressStream<'a> =
    Pin<Box<dyn Stream<Item = Result<ProgressEvent, DockerError>> + Send + 'a>>;

/// Box a daemon progress stream. The bound fixes the error type that `?`
/// converts into inside `try_stream!` blocks.
pub fn boxed<'a, S>(stream: S) -> RawProgressStream<'a>
where
    S: Stream<Item = Result<ProgressEvent, DockerError>> + Send + 'a,
{
    Box::pin(stream)
}

/// What a fully consumed progress stream reported.
#[derive(Debug, Clone, Default)]
pub struct ProgressSummary {
    pub events: u64,
    pub last_status: Option<String>,
    /// Concatenated `stream` text (build logs).
    pub output: Vec<String>,
}

/// Wraps a raw daemon stream: relays each event to the sink, and turns an
/// error-bearing event into a terminal `Err` after which the stream ends.
pub struct ProgressStream<'a> {
    inner: RawProgressStream<'a>,
    sink: Arc<dyn ProgressSink>,
    summary: ProgressSummary,
    finished: bool,
}

impl<'a> ProgressStream<'a> {
    pub fn new(inner: RawProgressStream<'a>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            inner,
            sink,
            summary: ProgressSummary::default(),
            finished: false,
        }
    }

    /// Consume the stream to completion.
    ///
    /// On failure the summary gathered so far is returned alongside the error
    /// so callers can include the build log in their message.
    pub async fn drain(mut self) -> Result<ProgressSummary, (DockerError, ProgressSummary)> {
        while let Some(item) = self.next().await {
            if let Err(e) = item {
                return Err((e, self.summary));
            }
        }
        Ok(self.summary)
    }
}

impl Stream for ProgressStream<'_> {
    type Item = Result<ProgressEvent, DockerError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // ProgressStream is Unpin (boxed inner stream, Arc sink)
        let this = self.as_mut().get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(event))) => {
                this.sink.emit(&event);
                this.summary.events += 1;

                if let Some(err) = event.to_error() {
                    this.finished = true;
                    return Poll::Ready(Some(Err(err)));
                }
                if let Some(text) = &event.stream {
                    this.summary.output.push(text.clone());
                }
                if let Some(status) = &event.status {
                    this.summary.last_status = Some(status.clone());
                }
                Poll::Ready(Some(Ok(event)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.finished = true;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
