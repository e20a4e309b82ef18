//! Home Assistant service calls after a restore.
//!
//! After an automation or script is written back, Home Assistant must
//! reload that domain before the change takes effect. Calls are fire and
//! forget: a restore that succeeded on disk is reported as such even when
//! the reload cannot be delivered.

use crate::models::settings::HaCredentials;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the credentials came from, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSource {
    Supervisor,
    Environment,
    Stored,
}

#[derive(Debug, Clone)]
pub struct HaAuth {
    pub base_url: String,
    pub token: String,
    pub source: AuthSource,
}

impl HaAuth {
    /// Resolve credentials in priority order: Supervisor token (add-on
    /// deployments), then environment variables, then stored credentials.
    pub fn resolve(stored: Option<&HaCredentials>) -> Option<HaAuth> {
        // HASSIO_TOKEN is the pre-2021 name for the same token.
        for var in ["SUPERVISOR_TOKEN", "HASSIO_TOKEN"] {
            if let Ok(token) = std::env::var(var) {
                if !token.is_empty() {
                    return Some(HaAuth {
                        base_url: "http://supervisor/core".into(),
                        token,
                        source: AuthSource::Supervisor,
                    });
                }
            }
        }

        if let (Ok(url), Ok(token)) = (
            std::env::var("HOME_ASSISTANT_URL"),
            std::env::var("LONG_LIVED_ACCESS_TOKEN"),
        ) {
            if !url.is_empty() && !token.is_empty() {
                return Some(HaAuth {
                    base_url: url,
                    token,
                    source: AuthSource::Environment,
                });
            }
        }

        let stored = stored?;
        match (&stored.home_assistant_url, &stored.long_lived_access_token) {
            (Some(url), Some(token)) if !url.is_empty() && !token.is_empty() => Some(HaAuth {
                base_url: url.clone(),
                token: token.clone(),
                source: AuthSource::Stored,
            }),
            _ => None,
        }
    }

    fn api_base(&self) -> String {
        to_api_base(&self.base_url)
    }
}

/// Normalize a configured URL into the REST API base: trailing slashes are
/// trimmed and `/api` appended unless already present.
fn to_api_base(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.ends_with("/api") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/api")
    }
}

/// Ask Home Assistant to run `domain.service` (e.g. `automation.reload`).
/// Spawned in the background; failures are logged, never surfaced.
pub fn call_service(auth: &HaAuth, service: &str) {
    let Some((domain, name)) = service.split_once('.') else {
        tracing::warn!(service, "Malformed service name, expected domain.service");
        return;
    };

    let url = format!("{}/services/{domain}/{name}", auth.api_base());
    let token = auth.token.clone();
    let supervisor = auth.source == AuthSource::Supervisor;
    let service = service.to_string();

    tokio::spawn(async move {
        let client = match reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build() {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build HTTP client");
                return;
            }
        };

        let mut request = client
            .post(&url)
            .bearer_auth(&token)
            .json(&serde_json::json!({}));
        if supervisor {
            request = request.header("X-Supervisor-Token", &token);
        }

        match request.send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(service = %service, "Reload triggered");
            }
            Ok(resp) => {
                tracing::warn!(service = %service, status = %resp.status(), "Reload rejected");
            }
            Err(e) => {
                tracing::warn!(service = %service, error = %e, "Reload request failed");
            }
        }
    });
}
