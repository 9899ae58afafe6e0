use axum::{
    extract::{Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Redirect, Response},
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::jobs::Job;
use crate::state::AppState;
use crate::tracking::{EmailEvent, EmailEventKind};

/// Transparent 1x1 GIF.
const PIXEL: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

/// Ids stay strings so a mangled link still gets its pixel or redirect.
#[derive(Debug, Default, Deserialize)]
pub struct TrackQuery {
    pub l: Option<String>,
    pub c: Option<String>,
    pub w: Option<String>,
    pub u: Option<String>,
}

fn parse_id(raw: Option<&str>) -> Option<Uuid> {
    raw.and_then(|s| Uuid::parse_str(s.trim()).ok())
}

impl TrackQuery {
    fn event(&self, kind: EmailEventKind) -> Option<EmailEvent> {
        let Some(lead_id) = parse_id(self.l.as_deref()) else {
            debug!(raw = ?self.l, "Tracking hit without a usable lead id");
            return None;
        };
        Some(EmailEvent {
            kind,
            lead_id,
            campaign_id: parse_id(self.c.as_deref()),
            workflow_id: parse_id(self.w.as_deref()),
            target_url: self.u.clone(),
        })
    }
}

/// GET /track/open
pub async fn handle_open(State(state): State<AppState>, Query(q): Query<TrackQuery>) -> Response {
    if let Some(event) = q.event(EmailEventKind::Open) {
        state.jobs.enqueue(Job::TrackEmailEvent(event));
    }
    (
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate"),
        ],
        Bytes::from_static(PIXEL),
    )
        .into_response()
}

/// GET /track/click
pub async fn handle_click(State(state): State<AppState>, Query(q): Query<TrackQuery>) -> Response {
    if let Some(event) = q.event(EmailEventKind::Click) {
        state.jobs.enqueue(Job::TrackEmailEvent(event));
    }
    Redirect::temporary(redirect_target(q.u.as_deref())).into_response()
}

/// Absolute http(s) targets that fit in a `Location` header; `/` otherwise.
fn redirect_target(raw: Option<&str>) -> &str {
    raw.map(str::trim)
        .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
        .filter(|u| HeaderValue::from_str(u).is_ok())
        .unwrap_or("/")
}
