//! Line-delimited JSON host loop.
//!
//! Input events, one per line:
//! - `{"event":"install"}`
//! - `{"event":"activate"}`
//! - `{"event":"fetch","url":"/assets/logo.png","destination":"image","method":"GET"}`
//!
//! Install and activate run to completion before the next line is read.
//! Fetches run concurrently; each reply is written as soon as its response
//! resolves, and detached cache writes finish before the host exits.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use swgate_client::resolve;
use swgate_core::{
    ActivateReport, Destination, FetchOutcome, InstallOutcome, InterceptedRequest, LifecycleHandler, WriteStatus,
};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinSet;
use url::Url;

use crate::clients::Output;
use crate::error::HostError;

fn default_method() -> String {
    "GET".into()
}

/// A lifecycle event read from the input stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum HostEvent {
    Install,
    Activate,
    Fetch {
        url: String,
        #[serde(default)]
        destination: String,
        #[serde(default = "default_method")]
        method: String,
    },
}

pub fn parse_event(line: &str) -> Result<HostEvent, HostError> {
    Ok(serde_json::from_str(line)?)
}

/// A line written back for each event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum HostReply {
    Install {
        skip_waiting: bool,
        seeded: usize,
        seed_failures: usize,
    },
    Activate {
        current: String,
        deleted: Vec<String>,
        failed: Vec<String>,
        claimed: usize,
        notified: usize,
    },
    Fetch {
        url: String,
        class: &'static str,
        source: &'static str,
        status: u16,
        content_type: Option<String>,
        bytes: usize,
        write: &'static str,
    },
    Error {
        message: String,
    },
}

impl HostReply {
    fn error(err: impl std::fmt::Display) -> Self {
        HostReply::Error { message: err.to_string() }
    }
}

impl From<InstallOutcome> for HostReply {
    fn from(outcome: InstallOutcome) -> Self {
        HostReply::Install {
            skip_waiting: outcome.skip_waiting,
            seeded: outcome.seeded,
            seed_failures: outcome.seed_failures,
        }
    }
}

impl From<ActivateReport> for HostReply {
    fn from(report: ActivateReport) -> Self {
        HostReply::Activate {
            current: report.current,
            deleted: report.deleted,
            failed: report.failed,
            claimed: report.claimed,
            notified: report.notified,
        }
    }
}

impl From<&FetchOutcome> for HostReply {
    fn from(outcome: &FetchOutcome) -> Self {
        let write = match outcome.write {
            WriteStatus::NotStored => "not_stored",
            WriteStatus::Stored => "stored",
            WriteStatus::Failed(_) => "failed",
            WriteStatus::Pending(_) => "pending",
        };
        HostReply::Fetch {
            url: outcome.response.url.clone(),
            class: outcome.class.as_str(),
            source: outcome.source.as_str(),
            status: outcome.response.status,
            content_type: outcome.response.content_type().map(str::to_string),
            bytes: outcome.response.body.len(),
            write,
        }
    }
}

/// Drives a [`LifecycleHandler`] from an event stream.
pub struct Host {
    handler: Arc<dyn LifecycleHandler>,
    origin: Url,
    output: Output,
}

impl Host {
    pub fn new(handler: Arc<dyn LifecycleHandler>, origin: Url, output: Output) -> Self {
        Self { handler, origin, output }
    }

    fn emit(&self, reply: &HostReply) {
        if let Err(e) = self.output.send(reply) {
            tracing::warn!(error = %e, "dropped reply");
        }
    }

    fn request(&self, url: &str, destination: &str, method: &str) -> Result<InterceptedRequest, HostError> {
        let url = resolve(&self.origin, url)?;
        Ok(InterceptedRequest::get(url)
            .with_method(method)
            .with_destination(Destination::from(destination)))
    }

    async fn install(&self) -> HostReply {
        match self.handler.on_install().await {
            Ok(outcome) => outcome.into(),
            Err(e) => HostReply::error(e),
        }
    }

    async fn activate(&self) -> HostReply {
        match self.handler.on_activate().await {
            Ok(report) => report.into(),
            Err(e) => HostReply::error(e),
        }
    }

    /// Serve one fetch: reply as soon as the response resolves, then let a
    /// detached cache write finish.
    async fn fetch(&self, url: String, destination: String, method: String) {
        let request = match self.request(&url, &destination, &method) {
            Ok(request) => request,
            Err(e) => return self.emit(&HostReply::error(e)),
        };

        match self.handler.on_fetch(request).await {
            Ok(mut outcome) => {
                self.emit(&HostReply::from(&outcome));
                outcome.settle().await;
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "fetch failed");
                self.emit(&HostReply::error(e));
            }
        }
    }

    /// Read events until end of input, then wait for in-flight fetches.
    pub async fn run<R>(self, input: R) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let host = Arc::new(self);
        let mut lines = BufReader::new(input).lines();
        let mut inflight = JoinSet::new();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match parse_event(line) {
                Ok(HostEvent::Install) => host.emit(&host.install().await),
                Ok(HostEvent::Activate) => host.emit(&host.activate().await),
                Ok(HostEvent::Fetch { url, destination, method }) => {
                    let host = Arc::clone(&host);
                    inflight.spawn(async move { host.fetch(url, destination, method).await });
                }
                Err(e) => host.emit(&HostReply::error(e)),
            }
        }

        while let Some(result) = inflight.join_next().await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "fetch task failed");
            }
        }

        Ok(())
    }
}
