//! `netq fetch`: download URLs through one `NetworkQueue`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::HumanBytes;
use netq_http::{HttpTransfer, HttpTransferConfig};
use netq_queue::{
    ChannelObserver, NetworkQueue, QueueConfig, QueueEvent, QueueObservers, QueueRunSummary,
};
use reqwest::Url;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::CliError;
use crate::parser::FetchArgs;
use crate::progress::BarSink;

/// One URL and where its body goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    pub url: Url,
    pub dest: PathBuf,
}

/// Resolve every URL to a unique destination under `output_dir`.
pub fn plan(urls: &[String], output_dir: &Path) -> Result<Vec<FetchPlan>, CliError> {
    let mut used = HashSet::new();
    urls.iter()
        .enumerate()
        .map(|(index, raw)| {
            let url = Url::parse(raw)
                .map_err(|err| CliError::Arguments(format!("{raw}: {err}")))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(CliError::Arguments(format!(
                    "{raw}: unsupported scheme '{}'",
                    url.scheme()
                )));
            }

            let base = file_name(&url);
            let mut name = base.clone();
            let mut prefix = index + 1;
            while !used.insert(name.clone()) {
                name = format!("{prefix}-{base}");
                prefix += 1;
            }
            Ok(FetchPlan {
                dest: output_dir.join(name),
                url,
            })
        })
        .collect()
}

/// Last path segment, falling back to the host.
fn file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .or_else(|| url.host_str())
        .unwrap_or("download")
        .to_string()
}

fn queue_config(args: &FetchArgs) -> QueueConfig {
    QueueConfig::new()
        .with_accurate_progress(args.accurate_progress)
        .with_cancel_on_failure(!args.no_cancel_on_failure)
        .with_max_concurrent(args.max_concurrent)
}

/// Run the fetch command to completion.
pub async fn run(args: FetchArgs) -> Result<QueueRunSummary> {
    let plans = plan(&args.urls, &args.output_dir)?;
    std::fs::create_dir_all(&args.output_dir)
        .map_err(CliError::from)
        .with_context(|| format!("Failed to create {}", args.output_dir.display()))?;

    let mut http = HttpTransferConfig::new();
    if let Some(secs) = args.timeout {
        http = http.with_timeout(Duration::from_secs(secs));
    }
    let client = http
        .build_client()
        .map_err(|err| CliError::Client(err.to_string()))?;

    let queue = NetworkQueue::with_config(queue_config(&args));
    let bar = Arc::new(BarSink::new(format!("0/{}", plans.len()), args.quiet));
    queue.set_download_progress_sink(&bar);
    let (observer, mut events) = ChannelObserver::new();
    queue.set_observers(QueueObservers::all(&observer));

    for plan in &plans {
        let transfer = HttpTransfer::get(client.clone(), plan.url.clone()).save_to(&plan.dest);
        queue
            .enqueue(Arc::new(transfer))
            .with_context(|| format!("Failed to queue {}", plan.url))?;
    }

    tracing::debug!(count = plans.len(), output_dir = %args.output_dir.display(), "Fetching");
    queue.go();

    let summary = tokio::select! {
        summary = wait_for_run(&mut events, &bar, plans.len()) => summary?,
        _ = tokio::signal::ctrl_c() => {
            queue.reset();
            bar.abandon("interrupted");
            return Err(CliError::Interrupted.into());
        }
    };

    if summary.is_success() {
        bar.finish(format!(
            "{} files, {}",
            summary.finished,
            HumanBytes(summary.downloaded_bytes)
        ));
        Ok(summary)
    } else {
        bar.abandon(format!("{} of {} done", summary.finished, summary.total()));
        Err(CliError::TransfersFailed {
            failed: summary.failed + summary.cancelled,
            total: summary.total(),
        }
        .into())
    }
}

async fn wait_for_run(
    events: &mut UnboundedReceiver<QueueEvent>,
    bar: &BarSink,
    total: usize,
) -> Result<QueueRunSummary> {
    let mut done = 0_usize;
    while let Some(event) = events.recv().await {
        match event {
            QueueEvent::RequestFinished { .. } => {
                done += 1;
                bar.set_message(format!("{done}/{total}"));
            }
            QueueEvent::RequestFailed { error, .. } => {
                done += 1;
                bar.println(format!("✗ {error}"));
                bar.set_message(format!("{done}/{total}"));
            }
            QueueEvent::WillRedirect { location, .. } => {
                tracing::debug!(%location, "Redirected");
            }
            QueueEvent::QueueFinished { summary } => return Ok(summary),
            QueueEvent::RequestStarted { .. } | QueueEvent::ResponseHeaders { .. } => {}
        }
    }
    anyhow::bail!("queue stopped reporting before the run finished")
}
