use anyhow::{bail, Context, Result};
use reqwest::cookie::Jar;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::channel::SessionIdentity;

/// Cookie holding the backend access token
pub const ACCESS_COOKIE: &str = "access_token";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Serialize)]
struct GoogleLoginRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateInterviewRequest<'a> {
    company_name: &'a str,
    job_description: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateInterviewResponse {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    data: Option<InterviewData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InterviewData {
    interview_token: String,
    email: String,
}

/// Cookie-authenticated client for the interview backend
pub struct BackendClient {
    http: reqwest::Client,
    base_url: Url,
}

impl BackendClient {
    /// `access_token` seeds the cookie jar, e.g. one copied from a browser
    /// session. Without it, call [`login_google`](Self::login_google) first.
    pub fn new(base_url: &str, access_token: Option<&str>) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid backend URL: {}", base_url))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let jar = Arc::new(Jar::default());
        if let Some(token) = access_token {
            jar.add_cookie_str(&format!("{}={}", ACCESS_COOKIE, token), &base_url);
        }

        let http = reqwest::Client::builder()
            .cookie_provider(jar)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Exchange a Google ID token for backend session cookies
    pub async fn login_google(&self, id_token: &str) -> Result<()> {
        let url = self.endpoint("auth/login/google/")?;
        info!("Logging in with Google at {}", url);

        let response = self
            .http
            .post(url)
            .json(&GoogleLoginRequest { token: id_token })
            .send()
            .await
            .context("Google login request failed")?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            bail!("Google login rejected ({}): {}", status, body);
        }

        Ok(())
    }

    /// Whether the current access cookie is accepted by the backend
    pub async fn verify(&self) -> Result<bool> {
        let url = self.endpoint("auth/token/verify/")?;
        debug!("Verifying session at {}", url);

        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({}))
            .send()
            .await
            .context("Token verify request failed")?;

        let valid = response.status() == StatusCode::OK;
        if !valid {
            warn!("Session cookie rejected ({})", response.status());
        }
        Ok(valid)
    }

    /// Register an interview and return the identity to stream it with
    pub async fn create_interview(
        &self,
        company_name: &str,
        job_description: &str,
    ) -> Result<SessionIdentity> {
        let url = self.endpoint("interview/create/")?;
        info!("Creating interview for {}", company_name);

        let response = self
            .http
            .post(url)
            .json(&CreateInterviewRequest {
                company_name,
                job_description,
            })
            .send()
            .await
            .context("Create interview request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Create interview failed with status {}", status);
        }

        let body: CreateInterviewResponse = response
            .json()
            .await
            .context("Invalid create interview response")?;

        let Some(data) = body.data else {
            bail!(
                "Create interview returned no interview: {}",
                body.detail.unwrap_or_else(|| "no detail".to_string())
            );
        };

        let identity = SessionIdentity::new(data.interview_token, data.email);
        if !identity.is_complete() {
            bail!("Create interview returned an incomplete identity");
        }
        Ok(identity)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Invalid endpoint path: {}", path))
    }
}
