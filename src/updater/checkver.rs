//! Version discovery against GitHub release endpoints.
//!
//! Discovery queries `<api>/repos/<owner>/<repo>/releases/latest`, tries
//! the manifest's named-capture regex against each asset download URL, and
//! renders the `replace` template from the first match to obtain the new
//! version string. When the discovered version is newer than the manifest's,
//! the pinned artifact block is rewritten from the `autoupdate` templates —
//! and its hash cleared, because a digest pinned for the old version cannot
//! vouch for the new one. The rewritten manifest must immediately
//! re-resolve to a verifiable artifact or the transaction dies before any
//! network download.

use crate::manifest::{Checkver, Manifest};
use crate::updater::error::{ErrorCode, UpdateError};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
struct GithubRelease {
    #[serde(default)]
    assets: Vec<GithubAsset>,
}

#[derive(Debug, Deserialize)]
struct GithubAsset {
    #[serde(default)]
    browser_download_url: String,
}

/// Result of a successful discovery: the rendered version plus the named
/// captures it was rendered from.
#[derive(Debug, Clone)]
pub struct Discovery {
    /// Version string produced by the `replace` template.
    pub version: String,
    /// Named captures harvested from the matching asset URL.
    pub captures: HashMap<String, String>,
}

/// Query the release endpoint and render the discovered version.
///
/// Returns `Ok(None)` when the manifest declares no complete `checkver`
/// block — discovery is strictly opt-in.
pub async fn discover_latest(
    client: &reqwest::Client,
    api_base: &str,
    checkver: &Checkver,
) -> Result<Option<Discovery>, UpdateError> {
    if !checkver.is_complete() {
        return Ok(None);
    }
    let (owner, repo) = parse_github_repo(&checkver.github)?;
    let endpoint = format!(
        "{}/repos/{owner}/{repo}/releases/latest",
        api_base.trim_end_matches('/')
    );

    let response = client
        .get(&endpoint)
        .header(reqwest::header::ACCEPT, "application/vnd.github+json")
        .header(reqwest::header::USER_AGENT, "appstract")
        .send()
        .await
        .map_err(|err| {
            UpdateError::tagged(
                ErrorCode::NetCheckverRequest,
                format!("{}: checkver request failed: {err}", ErrorCode::NetCheckverRequest),
            )
        })?;
    let status = response.status();
    if !status.is_success() {
        return Err(UpdateError::tagged(
            ErrorCode::NetCheckverHttp,
            format!(
                "{}: checkver http status: {}",
                ErrorCode::NetCheckverHttp,
                status.as_u16()
            ),
        ));
    }
    let release: GithubRelease = response.json().await.map_err(|err| {
        UpdateError::tagged(
            ErrorCode::NetCheckverRequest,
            format!("decode checkver response: {err}"),
        )
    })?;

    let re = Regex::new(&checkver.regex).map_err(|err| {
        UpdateError::tagged(
            ErrorCode::ManifestIncomplete,
            format!("compile checkver regex: {err}"),
        )
    })?;
    for asset in &release.assets {
        let Some(caps) = re.captures(&asset.browser_download_url) else {
            continue;
        };
        let mut captures = HashMap::new();
        for name in re.capture_names().flatten() {
            if let Some(matched) = caps.name(name) {
                captures.insert(name.to_string(), matched.as_str().to_string());
            }
        }
        let version = render_template(&checkver.replace, &captures);
        if version.is_empty() {
            return Err(UpdateError::tagged(
                ErrorCode::ManifestIncomplete,
                "checkver replace produced empty version",
            ));
        }
        return Ok(Some(Discovery { version, captures }));
    }
    Err(UpdateError::tagged(
        ErrorCode::ManifestIncomplete,
        "checkver found no matching release assets",
    ))
}

/// Run discovery and rewrite `manifest` in place when a newer version is
/// found.
///
/// A discovery that matches the manifest's current version (or renders
/// empty) is a no-op. A rewrite always clears the artifact hash, so the
/// immediate re-resolution fails loudly unless the manifest carries a
/// restorable digest.
pub async fn apply_checkver(
    client: &reqwest::Client,
    api_base: &str,
    manifest: &mut Manifest,
) -> Result<(), UpdateError> {
    let Some(discovery) = discover_latest(client, api_base, &manifest.checkver).await? else {
        return Ok(());
    };
    if discovery.version.is_empty() || discovery.version == manifest.version {
        return Ok(());
    }

    let mut artifact = manifest.autoupdate.architecture.x64.clone();
    if artifact.url.is_empty() {
        return Err(UpdateError::tagged(
            ErrorCode::ManifestIncomplete,
            format!(
                "checkver found newer version {} but autoupdate.64bit.url is empty",
                discovery.version
            ),
        ));
    }
    artifact.url = render_template(&artifact.url, &discovery.captures);
    artifact.extract_dir = render_template(&artifact.extract_dir, &discovery.captures);
    artifact.hash.clear();
    manifest.version = discovery.version;
    manifest.architecture.x64 = artifact;

    manifest.resolve_artifact_64().map_err(|err| {
        UpdateError::tagged(
            ErrorCode::ManifestIncomplete,
            format!(
                "checkver resolved newer version {} but no verifiable hash is available: {err:#}",
                manifest.version
            ),
        )
    })?;
    Ok(())
}

/// Substitute captures into a template.
///
/// For each capture `name`, the forms `${name}`, `$name` and `$matchName`
/// (first letter uppercased) are replaced in that order; the most specific
/// form goes first so `$name` cannot eat the prefix of a `$matchName`
/// occurrence.
pub fn render_template(template: &str, captures: &HashMap<String, String>) -> String {
    if template.is_empty() {
        return String::new();
    }
    let mut out = template.to_string();
    for (name, value) in captures {
        out = out.replace(&format!("${{{name}}}"), value);
        out = out.replace(&format!("${name}"), value);
        out = out.replace(&format!("$match{}", upper_first(name)), value);
    }
    out
}

fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn parse_github_repo(raw: &str) -> Result<(String, String), UpdateError> {
    let url = reqwest::Url::parse(raw).map_err(|err| {
        UpdateError::tagged(
            ErrorCode::ManifestIncomplete,
            format!("invalid checkver.github url: {err}"),
        )
    })?;
    let path = url.path().trim_end_matches(".git").trim_matches('/');
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() < 2 {
        return Err(UpdateError::tagged(
            ErrorCode::ManifestIncomplete,
            format!("invalid checkver.github path: {raw}"),
        ));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}
