//! Read-only HTTP listing of today's qualifying fixtures.
//!
//!   GET /                 → api version
//!   GET /health           → ok
//!   GET /upcoming_events  → {"upcomingEvents": [...]}

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use live_monitor::Fixture;
use serde::Serialize;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::feed_db::SqliteStore;

#[derive(Clone)]
pub struct HttpState {
    pub store:       SqliteStore,
    pub api_version: String,
    pub utc_offset:  FixedOffset,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingEventView {
    pub event_id:  String,
    pub league:    String,
    pub home:      String,
    pub away:      String,
    pub favorite:  String,
    pub home_odds: f64,
    pub away_odds: f64,
    pub starts_at: String,
}

#[derive(Debug, Serialize)]
struct UpcomingEventsResponse {
    #[serde(rename = "upcomingEvents")]
    upcoming_events: Vec<UpcomingEventView>,
}

/// `02 Jan 06 15:04 +03:00`
pub fn format_start(t: DateTime<FixedOffset>) -> String {
    t.format("%d %b %y %H:%M %:z").to_string()
}

impl From<&Fixture> for UpcomingEventView {
    fn from(f: &Fixture) -> Self {
        Self {
            event_id:  f.id.clone(),
            league:    f.league.clone(),
            home:      f.home.clone(),
            away:      f.away.clone(),
            favorite:  f.favorite.to_string(),
            home_odds: f.home_odds,
            away_odds: f.away_odds,
            starts_at: format_start(f.starts_at),
        }
    }
}

type Response = (&'static str, &'static str, String);

async fn route(method: &str, path: &str, state: &HttpState) -> Response {
    let path = path.split('?').next().unwrap_or_default();
    match (method, path) {
        ("GET", "/") => ("HTTP/1.1 200 OK", "text/plain; charset=utf-8", state.api_version.clone()),
        ("GET", "/health") => ("HTTP/1.1 200 OK", "text/plain; charset=utf-8", "ok".to_string()),
        ("GET", "/upcoming_events") => {
            let today = Utc::now().with_timezone(&state.utc_offset).date_naive();
            match state.store.fixtures_on(today).await {
                Ok(fixtures) => {
                    let body = UpcomingEventsResponse {
                        upcoming_events: fixtures.iter().map(UpcomingEventView::from).collect(),
                    };
                    let json = serde_json::to_string_pretty(&body).unwrap_or_else(|_| "{}".to_string());
                    ("HTTP/1.1 200 OK", "application/json; charset=utf-8", json)
                }
                Err(e) => {
                    warn!("upcoming_events: {e}");
                    (
                        "HTTP/1.1 500 Internal Server Error",
                        "text/plain; charset=utf-8",
                        "store unavailable".to_string(),
                    )
                }
            }
        }
        _ => (
            "HTTP/1.1 404 Not Found",
            "text/plain; charset=utf-8",
            "not found".to_string(),
        ),
    }
}

async fn handle_http_connection(mut stream: TcpStream, state: HttpState) -> Result<()> {
    let mut buf = vec![0u8; 8192];
    let n = stream.read(&mut buf).await.context("http read")?;
    if n == 0 {
        return Ok(());
    }

    let req = String::from_utf8_lossy(&buf[..n]);
    let first_line = req.lines().next().unwrap_or_default();
    let mut parts = first_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("");

    let (status_line, content_type, body) = route(method, path, &state).await;

    let resp = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(resp.as_bytes()).await.context("http write")?;
    Ok(())
}

pub async fn start_http_server(state: HttpState, bind: SocketAddr, stop: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(bind).await.context("http bind")?;
    info!("http listening on http://{} (GET /, /health, /upcoming_events)", bind);

    loop {
        let (stream, peer) = tokio::select! {
            _ = stop.cancelled() => break,
            accepted = listener.accept() => accepted.context("http accept")?,
        };
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_http_connection(stream, state).await {
                debug!("http handler err {}: {}", peer, e);
            }
        });
    }
    Ok(())
}
