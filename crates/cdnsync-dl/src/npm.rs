use std::{collections::HashMap, fs::File, io::Read, path::Path};

use cdnsync_package::Autoupdate;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Deserialize;
use tracing::{debug, warn};
use ureq::Agent;
use url::Url;

use crate::{
    error::{DownloadError, ErrorContext, Result},
    http_client::SHARED_AGENT,
    source::VersionSource,
    types::Candidate,
};

/// Characters escaped in a registry path segment. `@` stays literal so scoped
/// names become `@scope%2Fname`.
const NAME_SEGMENT: &AsciiSet = &CONTROLS.add(b' ').add(b'/').add(b'%').add(b'?').add(b'#');

#[derive(Debug, Deserialize)]
struct Packument {
    #[serde(default)]
    versions: HashMap<String, PackumentVersion>,
    #[serde(default)]
    time: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct PackumentVersion {
    dist: Dist,
}

#[derive(Debug, Deserialize)]
struct Dist {
    tarball: String,
}

pub struct NpmSource {
    registry: String,
    agent: Agent,
}

impl NpmSource {
    pub fn new(registry: impl Into<String>) -> Self {
        Self {
            registry: registry.into().trim_end_matches('/').to_string(),
            agent: SHARED_AGENT.clone(),
        }
    }

    pub fn packument_url(&self, name: &str) -> String {
        format!(
            "{}/{}",
            self.registry,
            utf8_percent_encode(name, NAME_SEGMENT)
        )
    }
}

impl VersionSource for NpmSource {
    fn candidates(&self, autoupdate: &Autoupdate) -> Result<Vec<Candidate>> {
        let url = self.packument_url(&autoupdate.target);
        debug!("fetching packument {url}");

        let resp = self.agent.get(&url).call()?;
        let status = resp.status().as_u16();
        if status != 200 {
            return Err(DownloadError::HttpError { status, url });
        }
        // Streamed: packuments of long-lived packages exceed ureq's default
        // body limit.
        parse_packument(&url, resp.into_body().into_reader())
    }

    fn fetch_archive(
        &self,
        _autoupdate: &Autoupdate,
        candidate: &Candidate,
        archive: &Path,
    ) -> Result<()> {
        let url = Url::parse(&candidate.locator).map_err(|source| {
            DownloadError::InvalidUrl {
                url: candidate.locator.clone(),
                source,
            }
        })?;
        debug!("downloading {url}");

        let resp = self.agent.get(url.as_str()).call()?;
        let status = resp.status().as_u16();
        if status != 200 {
            return Err(DownloadError::HttpError {
                status,
                url: url.to_string(),
            });
        }

        let mut file = File::create(archive)
            .with_context(|| format!("creating {}", archive.display()))?;
        let mut reader = resp.into_body().into_reader();
        std::io::copy(&mut reader, &mut file)
            .with_context(|| format!("writing {}", archive.display()))?;
        Ok(())
    }
}

/// Joins `versions` with `time` into candidates. Versions without a
/// publish time are dropped.
fn parse_packument(url: &str, body: impl Read) -> Result<Vec<Candidate>> {
    let packument: Packument = serde_json::from_reader(body).map_err(|err| {
        DownloadError::InvalidResponse {
            url: url.to_string(),
            reason: err.to_string(),
        }
    })?;

    let mut candidates = Vec::with_capacity(packument.versions.len());
    for (version, meta) in packument.versions {
        let Some(published) = packument.time.get(&version) else {
            warn!("{url}: version {version} has no publish time, skipping");
            continue;
        };
        let timestamp = match DateTime::parse_from_rfc3339(published) {
            Ok(t) => t.with_timezone(&Utc),
            Err(err) => {
                warn!("{url}: bad publish time '{published}' for {version}: {err}");
                continue;
            }
        };
        candidates.push(Candidate::new(version, timestamp, meta.dist.tarball));
    }
    candidates.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    Ok(candidates)
}
