//! Streaming artifact download with scheme and status enforcement.

use crate::updater::error::ErrorCode;
use crate::utils::progress::{DownloadProgress, ProgressHook};
use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Stream `url` to `dest`, creating parent directories as needed.
///
/// Policy: the scheme must be `https` (case-insensitively; relaxed only
/// when `require_https` is off, a test-only knob) and the response status
/// must be 2xx. The body is streamed chunk by chunk so artifacts of any
/// size download in constant memory; each chunk drives the optional
/// progress hook.
pub async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    require_https: bool,
    app: &str,
    on_progress: Option<&ProgressHook>,
) -> Result<()> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|err| anyhow!("{}: invalid download url: {err}", ErrorCode::NetDownload))?;
    if require_https && parsed.scheme() != "https" {
        bail!(
            "{}: insecure download url scheme {:?}",
            ErrorCode::NetDownload,
            parsed.scheme()
        );
    }

    let mut response = client
        .get(parsed)
        .send()
        .await
        .map_err(|err| anyhow!("{}: download request: {err}", ErrorCode::NetDownload))?;
    let status = response.status();
    if !status.is_success() {
        bail!(
            "{}: download http status: {}",
            ErrorCode::NetDownload,
            status.as_u16()
        );
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create download dir: {}", parent.display()))?;
    }
    let mut file = tokio::fs::File::create(dest)
        .await
        .with_context(|| format!("create download file: {}", dest.display()))?;

    let total = response.content_length();
    let mut downloaded = 0u64;
    loop {
        let chunk = response
            .chunk()
            .await
            .map_err(|err| anyhow!("{}: read download body: {err}", ErrorCode::NetDownload))?;
        let Some(chunk) = chunk else { break };
        file.write_all(&chunk).await.context("write download file")?;
        downloaded += chunk.len() as u64;
        notify(on_progress, app, downloaded, total, false);
    }
    file.flush().await.context("flush download file")?;
    notify(on_progress, app, downloaded, total, true);
    Ok(())
}

fn notify(hook: Option<&ProgressHook>, app: &str, downloaded: u64, total: Option<u64>, done: bool) {
    if let Some(hook) = hook {
        hook(&DownloadProgress {
            app: app.to_string(),
            downloaded,
            total,
            done,
        });
    }
}
