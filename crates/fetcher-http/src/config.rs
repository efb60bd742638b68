//! HTTP transport configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("fetcher/", env!("CARGO_PKG_VERSION"));

/// HTTP method used for uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadMethod {
    #[default]
    Post,
    Put,
}

impl UploadMethod {
    pub(crate) fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
        }
    }
}

/// Settings for one transport session.
///
/// Use [`foreground`](Self::foreground) for interactive work and
/// [`background`](Self::background) for long-running transfers.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub connect_timeout: Duration,
    /// Whole-request timeout; `None` lets long transfers run indefinitely.
    pub request_timeout: Option<Duration>,
    pub user_agent: String,
    /// Where downloads are streamed before the completion pipeline reads them.
    pub download_dir: PathBuf,
    /// Minimum spacing between progress events for one operation.
    pub progress_interval: Duration,
    pub upload_method: UploadMethod,
    /// Upload body chunk size; progress is reported per chunk.
    pub upload_chunk_size: usize,
    /// Report `BackgroundDrainCompleted` whenever the last running operation ends.
    pub report_drain: bool,
}

impl HttpTransportConfig {
    /// Interactive session: short timeouts, frequent progress.
    pub fn foreground() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Some(Duration::from_secs(60)),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            download_dir: std::env::temp_dir(),
            progress_interval: Duration::from_millis(100),
            upload_method: UploadMethod::Post,
            upload_chunk_size: 64 * 1024,
            report_drain: false,
        }
    }

    /// Long-running session: no overall timeout, drain notifications on.
    pub fn background() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: None,
            progress_interval: Duration::from_millis(500),
            report_drain: true,
            ..Self::foreground()
        }
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    #[must_use]
    pub const fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    #[must_use]
    pub const fn with_upload_method(mut self, method: UploadMethod) -> Self {
        self.upload_method = method;
        self
    }

    #[must_use]
    pub fn with_upload_chunk_size(mut self, size: usize) -> Self {
        self.upload_chunk_size = size.max(1);
        self
    }

    #[must_use]
    pub const fn with_report_drain(mut self, report: bool) -> Self {
        self.report_drain = report;
        self
    }
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self::foreground()
    }
}
