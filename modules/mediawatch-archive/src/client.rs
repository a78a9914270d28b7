use std::num::NonZeroU32;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::StatusCode;
use tracing::debug;

use mediawatch_common::config::InternetArchiveConfig;

use crate::cdx::{CdxRecord, CdxRequest, CdxTime};
use crate::error::{ArchiveError, Result};
use crate::gate::ErrorGate;
use crate::snapshot::{Snapshot, SnapshotId};

/// Wayback CDX search endpoint.
/// https://github.com/internetarchive/wayback/tree/master/wayback-cdx-server
const CDX_SEARCH_URL: &str = "http://web.archive.org/cdx/search/cdx";

/// Captures are searched within this window around the requested instant.
const SEARCH_WINDOW_HOURS: i64 = 6;

/// Safety cap on the number of CDX rows per search.
const SEARCH_LIMIT: u32 = 100;

/// Rate-limited client for the web archive.
///
/// All outbound requests pass the connection limiter, then both
/// persistent error gates. Observed 429s and connection errors update
/// the matching gate so every worker sharing the client backs off.
pub struct ArchiveClient {
    http: reqwest::Client,
    limiter: DefaultDirectRateLimiter,
    gate_429: ErrorGate,
    gate_connect: ErrorGate,
}

impl ArchiveClient {
    pub fn new(config: &InternetArchiveConfig, timeout: StdDuration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        let rate = NonZeroU32::new(config.limiter_max_rate).unwrap_or(NonZeroU32::MIN);
        let period = StdDuration::from_secs(config.limiter_time_period.max(1)) / rate.get();
        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(rate))
            .allow_burst(rate);

        Ok(Self {
            http,
            limiter: RateLimiter::direct(quota),
            gate_429: ErrorGate::new(
                "429 HTTP",
                config.state_dir.join("error_429"),
                config.relaxation_time_after_error_429,
            ),
            gate_connect: ErrorGate::new(
                "connection",
                config.state_dir.join("error_connect"),
                config.relaxation_time_after_error_connect,
            ),
        })
    }

    /// Find the capture of `url` closest to `target`, searching
    /// `target ± 6h` with the upper bound clamped to the present.
    pub async fn find_closest(&self, url: &str, target: DateTime<Utc>) -> Result<SnapshotId> {
        let (from, to) = search_window(target, Utc::now());
        let request = CdxRequest {
            url: url.to_string(),
            filter: Some("statuscode:200".to_string()),
            from: Some(CdxTime::DateTime(from)),
            to: Some(CdxTime::DateTime(to)),
            limit: Some(SEARCH_LIMIT),
        };

        let candidates = self.search(request).await?;
        debug!(url, %target, candidates = candidates.len(), "CDX search complete");

        pick_closest(candidates, target).ok_or(ArchiveError::NotYetAvailable { requested: target })
    }

    /// Run a CDX search and parse every response line, failing closed on
    /// the first malformed one.
    pub async fn search(&self, request: CdxRequest) -> Result<Vec<SnapshotId>> {
        let body = self.get(CDX_SEARCH_URL, request.into_params()).await?;

        body.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| Ok(SnapshotId::from_record(&CdxRecord::parse_line(line)?)))
            .collect()
    }

    /// Retrieve the capture body as text.
    pub async fn fetch(&self, id: &SnapshotId) -> Result<Snapshot> {
        let text = self.get(&id.web_url(), Vec::new()).await?;
        Ok(Snapshot {
            id: id.clone(),
            text,
        })
    }

    async fn get(&self, url: &str, params: Vec<(&'static str, String)>) -> Result<String> {
        // Gates first: inside a relaxation window we fail fast without
        // consuming a rate-limiter slot or touching the network.
        let now = Utc::now();
        self.gate_429.check(now)?;
        self.gate_connect.check(now)?;

        self.limiter.until_ready().await;

        let response = self.http.get(url).query(&params).send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                self.gate_connect.notify(Utc::now());
            }
            ArchiveError::Http(e)
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            self.gate_429.notify(Utc::now());
            return Err(ArchiveError::RateLimited {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(ArchiveError::Status {
                status,
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }
}

/// Compute the CDX search window for a target instant. The upper bound is
/// clamped to `now` so future instants never request impossible data.
fn search_window(target: DateTime<Utc>, now: DateTime<Utc>) -> (NaiveDateTime, NaiveDateTime) {
    let from = target - Duration::hours(SEARCH_WINDOW_HOURS);
    let to = (target + Duration::hours(SEARCH_WINDOW_HOURS)).min(now);
    (from.naive_utc(), to.naive_utc())
}

/// Pick the capture whose timestamp minimises |capture − target|.
fn pick_closest(candidates: Vec<SnapshotId>, target: DateTime<Utc>) -> Option<SnapshotId> {
    candidates
        .into_iter()
        .min_by_key(|id| (id.timestamp.and_utc() - target).abs())
}
