//! HTTP fetcher over an ordered list of mirrors.
//!
//! Every request walks the mirror list in order and stops at the first mirror
//! that answers with a success status. Connection errors, timeouts and error
//! statuses are logged and the next mirror is tried; once the list is
//! exhausted the caller gets [`FetchError::MirrorExhausted`].
//!
//! Downloads to disk are streamed through a [`CHUNK_SIZE`] buffer. Resumable
//! downloads send `Range: bytes=<len>-` for an existing partial file, and a
//! `416 Range Not Satisfiable` reply means the file is already complete.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RANGE;
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, info, warn};

use crate::contract::{FetchOutcome, Fetcher};
use crate::error::FetchError;

/// Write buffer size for streamed downloads.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Applied to connecting, to waiting for the response head and to every body
/// read, independently for each mirror attempt.
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

pub const USER_AGENT: &str = concat!("train-mirror/", env!("CARGO_PKG_VERSION"));

/// Ordered base URLs, tried first to last on every fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorList {
    bases: Vec<String>,
}

impl MirrorList {
    /// Builds a list from base URLs; blank entries are skipped and trailing
    /// slashes dropped. An empty result is an error.
    pub fn new<I, S>(bases: I) -> Result<Self, FetchError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let bases: Vec<String> = bases
            .into_iter()
            .map(|b| b.as_ref().trim().trim_end_matches('/').to_string())
            .filter(|b| !b.is_empty())
            .collect();
        if bases.is_empty() {
            return Err(FetchError::NoMirrors);
        }
        Ok(MirrorList { bases })
    }

    /// Joins `base` and `relative` with exactly one `/`.
    pub fn join(base: &str, relative: &str) -> String {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            relative.trim_start_matches('/')
        )
    }

    /// Candidate URLs for `relative`, in mirror order.
    pub fn urls_for<'a>(&'a self, relative: &'a str) -> impl Iterator<Item = String> + 'a {
        self.bases.iter().map(move |base| Self::join(base, relative))
    }

    pub fn bases(&self) -> &[String] {
        &self.bases
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }
}

/// Result of walking the mirror list for one request.
enum Opened {
    Response { url: String, response: Response },
    /// Only produced for ranged requests.
    RangeComplete { url: String },
}

/// [`Fetcher`] backed by `reqwest` and a [`MirrorList`].
pub struct MirrorFetcher {
    client: Client,
    mirrors: MirrorList,
    timeout: Duration,
}

impl MirrorFetcher {
    pub fn new(mirrors: MirrorList) -> Result<Self, FetchError> {
        Self::with_timeout(mirrors, ATTEMPT_TIMEOUT)
    }

    pub fn with_timeout(mirrors: MirrorList, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;
        info!(
            mirrors = ?mirrors.bases(),
            timeout_secs = timeout.as_secs_f64(),
            "[FETCH] Initialised mirror fetcher"
        );
        Ok(MirrorFetcher {
            client,
            mirrors,
            timeout,
        })
    }

    pub fn mirrors(&self) -> &MirrorList {
        &self.mirrors
    }

    async fn open(&self, relative: &str, range_from: Option<u64>) -> Result<Opened, FetchError> {
        let mut attempts = 0;
        let mut last_error = String::from("no mirror attempted");

        for url in self.mirrors.urls_for(relative) {
            attempts += 1;
            let mut request = self.client.get(&url);
            if let Some(offset) = range_from {
                request = request.header(RANGE, format!("bytes={offset}-"));
            }

            let response = match tokio::time::timeout(self.timeout, request.send()).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    warn!(url = %url, error = %e, "[FETCH] Mirror request failed, trying next mirror");
                    last_error = e.to_string();
                    continue;
                }
                Err(_) => {
                    warn!(url = %url, timeout_secs = self.timeout.as_secs_f64(), "[FETCH] Mirror timed out, trying next mirror");
                    last_error = format!("timed out after {:?}", self.timeout);
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::RANGE_NOT_SATISFIABLE && range_from.is_some() {
                return Ok(Opened::RangeComplete { url });
            }
            if !status.is_success() {
                warn!(url = %url, status = %status, "[FETCH] Mirror returned error status, trying next mirror");
                last_error = format!("HTTP {status} from {url}");
                continue;
            }
            return Ok(Opened::Response { url, response });
        }

        Err(FetchError::MirrorExhausted {
            path: relative.to_string(),
            attempts,
            last_error,
        })
    }

    /// Copies the response body into `sink`, returning the bytes written.
    async fn stream_body<W: Write>(
        &self,
        relative: &str,
        mut response: Response,
        sink: &mut W,
        sink_path: &Path,
    ) -> Result<u64, FetchError> {
        let mut written = 0u64;
        loop {
            let chunk = match tokio::time::timeout(self.timeout, response.chunk()).await {
                Ok(Ok(Some(chunk))) => chunk,
                Ok(Ok(None)) => return Ok(written),
                Ok(Err(e)) => {
                    return Err(FetchError::Interrupted {
                        path: relative.to_string(),
                        written,
                        reason: e.to_string(),
                    })
                }
                Err(_) => {
                    return Err(FetchError::Interrupted {
                        path: relative.to_string(),
                        written,
                        reason: format!("no data received for {:?}", self.timeout),
                    })
                }
            };
            sink.write_all(&chunk)
                .map_err(|e| FetchError::io(sink_path, e))?;
            written += chunk.len() as u64;
        }
    }
}

#[async_trait]
impl Fetcher for MirrorFetcher {
    async fn fetch_bytes(&self, relative: &str) -> Result<Vec<u8>, FetchError> {
        let (url, response) = match self.open(relative, None).await? {
            Opened::Response { url, response } => (url, response),
            Opened::RangeComplete { .. } => return Ok(Vec::new()),
        };
        info!(url = %url, "[FETCH] Fetching");

        let mut body = Vec::new();
        self.stream_body(relative, response, &mut body, Path::new(relative))
            .await?;
        debug!(url = %url, bytes = body.len(), "[FETCH] Fetched into memory");
        Ok(body)
    }

    async fn fetch_to_file(
        &self,
        relative: &str,
        destination: &Path,
        resume: bool,
    ) -> Result<FetchOutcome, FetchError> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| FetchError::io(parent, e))?;
        }

        let offset = if resume {
            match fs::metadata(destination) {
                Ok(meta) if meta.is_file() => meta.len(),
                _ => 0,
            }
        } else {
            0
        };
        let range_from = (offset > 0).then_some(offset);
        if let Some(offset) = range_from {
            debug!(path = relative, offset, "[FETCH] Continuing download of partial file");
        }

        let (url, response) = match self.open(relative, range_from).await? {
            Opened::Response { url, response } => (url, response),
            Opened::RangeComplete { url } => {
                debug!(url = %url, offset, "[FETCH] Range not satisfiable, partial file is complete");
                return Ok(FetchOutcome::AlreadyComplete);
            }
        };
        info!(url = %url, destination = %destination.display(), "[FETCH] Fetching");

        // A mirror that ignores the Range header sends the whole body again.
        let append = range_from.is_some() && response.status() == StatusCode::PARTIAL_CONTENT;
        let resumed_from = if append { offset } else { 0 };
        // Non-resumable downloads land in a sibling file first, so a failed
        // refetch leaves the existing copy alone.
        let staging = (!resume).then(|| staging_path(destination));
        let write_path = staging.as_deref().unwrap_or(destination);

        let file = if append {
            OpenOptions::new().append(true).open(destination)
        } else {
            File::create(write_path)
        }
        .map_err(|e| FetchError::io(write_path, e))?;

        let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
        let mut result = match self
            .stream_body(relative, response, &mut writer, write_path)
            .await
        {
            Ok(bytes) => writer
                .flush()
                .map(|_| bytes)
                .map_err(|e| FetchError::io(write_path, e)),
            Err(e) => Err(e),
        };
        drop(writer);

        if let Some(staging) = staging.as_deref().filter(|_| result.is_ok()) {
            if let Err(e) = fs::rename(staging, destination) {
                result = Err(FetchError::io(destination, e));
            }
        }

        match result {
            Ok(bytes) => {
                debug!(url = %url, bytes, resumed_from, "[FETCH] Download complete");
                Ok(FetchOutcome::Written {
                    bytes,
                    resumed_from,
                })
            }
            Err(e) if resume => {
                warn!(path = relative, error = %e, "[FETCH] Unable to complete download, keeping partial file for resume");
                Err(e)
            }
            Err(e) => {
                if let Err(remove_err) = fs::remove_file(write_path) {
                    if remove_err.kind() != std::io::ErrorKind::NotFound {
                        warn!(
                            path = %write_path.display(),
                            error = %remove_err,
                            "[FETCH] Failed to remove partial download"
                        );
                    }
                }
                Err(e)
            }
        }
    }
}

/// `<dir>/.<name>.part` next to `destination`.
fn staging_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{name}.part"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_list_rejects_empty() {
        assert!(matches!(
            MirrorList::new(Vec::<String>::new()),
            Err(FetchError::NoMirrors)
        ));
        assert!(matches!(MirrorList::new(["", "  "]), Err(FetchError::NoMirrors)));
    }

    #[test]
    fn mirror_list_preserves_order_and_trims() {
        let list = MirrorList::new(["http://a.example/", " http://b.example "]).unwrap();
        assert_eq!(list.bases(), ["http://a.example", "http://b.example"]);
        let urls: Vec<_> = list.urls_for("FreeNAS/trains.txt").collect();
        assert_eq!(
            urls,
            [
                "http://a.example/FreeNAS/trains.txt",
                "http://b.example/FreeNAS/trains.txt"
            ]
        );
    }

    #[test]
    fn join_uses_single_separator() {
        assert_eq!(MirrorList::join("http://m/", "/p/LATEST"), "http://m/p/LATEST");
        assert_eq!(MirrorList::join("http://m", "p/LATEST"), "http://m/p/LATEST");
    }

    #[test]
    fn staging_file_is_a_hidden_sibling() {
        assert_eq!(
            staging_path(Path::new("/srv/FreeNAS/stable/ChangeLog.txt")),
            PathBuf::from("/srv/FreeNAS/stable/.ChangeLog.txt.part")
        );
    }

    #[test]
    fn user_agent_names_tool_and_version() {
        assert!(USER_AGENT.starts_with("train-mirror/"));
        assert!(USER_AGENT.ends_with(env!("CARGO_PKG_VERSION")));
    }
}
