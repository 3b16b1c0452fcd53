//! Bet API adapter: volleyball fixture list, pre-match and live odds
//!
//! Two REST endpoints, both authenticated by a token appended to the URL:
//!   upcoming: `{upcoming_url}{token}` → today's fixtures
//!   odds:     `{odds_url}{token}&event_id={id}` → odds history, newest line first
//!
//! Market `91_1` is the match winner line. Its `ss` field carries the running
//! set score; `"-"` in an odds field means the book is suspended.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeDelta};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use live_monitor::{FeedError, FixtureSource, LiveFeed, LiveSnapshot, PrematchOdds, UpcomingFixture};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

pub const DEFAULT_UPCOMING_URL: &str = "https://api.b365api.com/v1/bet365/upcoming?sport_id=91&token=";
pub const DEFAULT_ODDS_URL: &str     = "https://api.b365api.com/v2/event/odds?token=";
const SUSPENDED: &str                = "-";

// ====================================================================
// Wire types
// ====================================================================

#[derive(Debug, Deserialize)]
pub struct UpcomingResponse {
    #[serde(default)]
    pub results: Vec<UpcomingEntry>,
}

#[derive(Debug, Deserialize)]
pub struct UpcomingEntry {
    pub id:     String,
    /// Unix seconds as a string
    pub time:   String,
    #[serde(default)]
    pub league: Named,
    #[serde(default)]
    pub home:   Named,
    #[serde(default)]
    pub away:   Named,
}

#[derive(Debug, Default, Deserialize)]
pub struct Named {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct OddsResponse {
    pub results: Option<OddsResults>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OddsResults {
    #[serde(default)]
    pub odds: OddsBook,
}

#[derive(Debug, Default, Deserialize)]
pub struct OddsBook {
    #[serde(rename = "91_1", default)]
    pub match_winner: Vec<OddsLine>,
}

#[derive(Debug, Deserialize)]
pub struct OddsLine {
    #[serde(default)]
    pub home_od:  String,
    #[serde(default)]
    pub away_od:  String,
    pub ss:       Option<String>,
    pub add_time: Option<String>,
}

impl OddsResponse {
    fn latest_line(&self) -> Option<&OddsLine> {
        self.results.as_ref()?.odds.match_winner.first()
    }
}

// ====================================================================
// Parsing
// ====================================================================

/// `"-"` and empty fields mean no price.
pub fn parse_odds(raw: &str) -> Result<Option<f64>, FeedError> {
    let raw = raw.trim();
    if raw.is_empty() || raw == SUSPENDED {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| FeedError::Decode(format!("odds value {raw:?}")))
}

/// First instant of the next local day.
pub fn next_local_midnight(now: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    now.date_naive()
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|t| t.and_local_timezone(*now.offset()).single())
        .unwrap_or(now + TimeDelta::hours(24))
}

/// Fixtures starting after `now` and before the next local midnight.
pub fn upcoming_for_today(body: UpcomingResponse, now: DateTime<FixedOffset>) -> Vec<UpcomingFixture> {
    let midnight = next_local_midnight(now);
    body.results
        .into_iter()
        .filter_map(|entry| {
            let Some(starts_at) = entry
                .time
                .trim()
                .parse::<i64>()
                .ok()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
            else {
                warn!(fixture_id = %entry.id, time = %entry.time, "unreadable start time, skipped");
                return None;
            };
            let starts_at = starts_at.with_timezone(now.offset());
            (starts_at > now && starts_at < midnight).then(|| UpcomingFixture {
                id:     entry.id,
                starts_at,
                league: entry.league.name,
                home:   entry.home.name,
                away:   entry.away.name,
            })
        })
        .collect()
}

/// Pre-match prices from the newest line. `None` when missing or suspended.
pub fn prematch_odds(body: &OddsResponse) -> Result<Option<PrematchOdds>, FeedError> {
    let Some(line) = body.latest_line() else {
        return Ok(None);
    };
    match (parse_odds(&line.home_od)?, parse_odds(&line.away_od)?) {
        (Some(home), Some(away)) => Ok(Some(PrematchOdds { home, away })),
        _ => Ok(None),
    }
}

pub fn live_snapshot(fixture_id: &str, body: &OddsResponse) -> Result<LiveSnapshot, FeedError> {
    let line = body
        .latest_line()
        .ok_or_else(|| FeedError::NotFound(fixture_id.to_string()))?;
    Ok(LiveSnapshot {
        fixture_id: fixture_id.to_string(),
        score:      line.ss.clone().unwrap_or_default(),
        home_odds:  parse_odds(&line.home_od)?,
        away_odds:  parse_odds(&line.away_od)?,
    })
}

// ====================================================================
// Client
// ====================================================================

#[derive(Debug, Clone)]
pub struct BetApiConfig {
    pub upcoming_url:     String,
    pub odds_url:         String,
    pub token:            String,
    pub requests_per_sec: u32,
    pub timeout:          Duration,
}

impl BetApiConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            upcoming_url:     DEFAULT_UPCOMING_URL.to_string(),
            odds_url:         DEFAULT_ODDS_URL.to_string(),
            token:            token.into(),
            requests_per_sec: 3,
            timeout:          Duration::from_secs(10),
        }
    }
}

pub struct BetApiClient {
    http:    reqwest::Client,
    config:  BetApiConfig,
    limiter: DefaultDirectRateLimiter,
}

impl BetApiClient {
    pub fn new(config: BetApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent("volley-live/0.1")
            .build()
            .context("failed to create reqwest client")?;
        let rate = NonZeroU32::new(config.requests_per_sec).unwrap_or(NonZeroU32::MIN);
        Ok(Self {
            http,
            config,
            limiter: RateLimiter::direct(Quota::per_second(rate)),
        })
    }

    pub fn upcoming_url(&self) -> String {
        format!("{}{}", self.config.upcoming_url, self.config.token)
    }

    pub fn odds_url(&self, fixture_id: &str) -> String {
        format!("{}{}&event_id={}", self.config.odds_url, self.config.token, fixture_id)
    }

    /// GET + JSON decode. Errors never carry the URL, it holds the token.
    async fn get_json<T: DeserializeOwned>(&self, url: &str, endpoint: &str) -> Result<T, FeedError> {
        self.limiter.until_ready().await;

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FeedError::Transport(e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FeedError::Status { status: status.as_u16(), endpoint: endpoint.to_string() });
        }

        resp.json::<T>()
            .await
            .map_err(|e| FeedError::Decode(e.without_url().to_string()))
    }

    async fn fetch_odds(&self, fixture_id: &str) -> Result<OddsResponse, FeedError> {
        self.get_json(&self.odds_url(fixture_id), "odds").await
    }
}

#[async_trait]
impl FixtureSource for BetApiClient {
    async fn fetch_upcoming(&self, now: DateTime<FixedOffset>) -> Result<Vec<UpcomingFixture>, FeedError> {
        let body: UpcomingResponse = self.get_json(&self.upcoming_url(), "upcoming").await?;
        let total = body.results.len();
        let today = upcoming_for_today(body, now);
        debug!(total, today = today.len(), "upcoming fixtures");
        Ok(today)
    }

    async fn fetch_prematch_odds(&self, fixture: &UpcomingFixture) -> Result<Option<PrematchOdds>, FeedError> {
        let body = self.fetch_odds(&fixture.id).await?;
        prematch_odds(&body)
    }
}

#[async_trait]
impl LiveFeed for BetApiClient {
    async fn fetch_snapshot(&self, fixture_id: &str) -> Result<LiveSnapshot, FeedError> {
        let body = self.fetch_odds(fixture_id).await?;
        live_snapshot(fixture_id, &body)
    }
}
