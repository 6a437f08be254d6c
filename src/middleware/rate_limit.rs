use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use uuid::Uuid;

use crate::middleware::auth::Claims;

const WINDOW: Duration = Duration::from_secs(1);
// Past this many tracked tenants, expired windows are swept on the next call.
const SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct Window {
    start: Instant,
    count: u32,
}

/// Fixed one-second window per organization, so one tenant's scripts cannot
/// starve another tenant's management calls.
#[derive(Clone, Debug)]
pub struct TenantRateLimiter {
    rps: u32,
    windows: Arc<Mutex<HashMap<Uuid, Window>>>,
}

impl TenantRateLimiter {
    pub fn new(rps: u32) -> Self {
        Self {
            rps: rps.max(1),
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// `Err` carries how long until the organization's window reopens.
    fn check(&self, organization_id: Uuid, now: Instant) -> Result<(), Duration> {
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if windows.len() > SWEEP_THRESHOLD {
            windows.retain(|_, w| now.duration_since(w.start) < WINDOW);
        }

        let window = windows.entry(organization_id).or_insert(Window {
            start: now,
            count: 0,
        });
        let elapsed = now.duration_since(window.start);
        if elapsed >= WINDOW {
            *window = Window {
                start: now,
                count: 0,
            };
        }
        if window.count < self.rps {
            window.count += 1;
            Ok(())
        } else {
            Err(WINDOW.saturating_sub(now.duration_since(window.start)))
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        match self.windows.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

/// Runs inside the bearer-auth layer; requests without claims pass through.
pub async fn tenant_rate_limit(
    State(limiter): State<TenantRateLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(organization_id) = req.extensions().get::<Claims>().map(|c| c.org) else {
        return next.run(req).await;
    };

    if let Err(retry_after) = limiter.check(organization_id, Instant::now()) {
        tracing::warn!(
            organization_id = %organization_id,
            path = %req.uri().path(),
            limit = limiter.rps,
            "Management API rate limit exceeded"
        );
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "rate_limit_exceeded" })),
        )
            .into_response();
        let seconds = retry_after.as_secs_f64().ceil().max(1.0) as u64;
        if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        return response;
    }
    next.run(req).await
}
