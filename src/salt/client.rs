use std::fmt;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::debug;

use super::error::SaltError;
use super::types::{EAuth, JobRecord, LoginRecord, LoginRequest, Lowstate, SaltReturn, StateJob};

const AUTH_HEADER: &str = "X-Auth-Token";

/// The four calls a deployment makes against the Salt API, in order.
pub trait SaltApi {
    /// Open the HTTP session.
    async fn setup(&mut self) -> Result<(), SaltError>;
    /// Authenticate and keep the session token.
    async fn login(&mut self) -> Result<(), SaltError>;
    /// Apply `state` on `host` asynchronously and return the job records.
    async fn apply_state(&mut self, host: &str, state: &str) -> Result<StateJob, SaltError>;
    /// Log out and close the session. Safe to call in any state.
    async fn teardown(&mut self) -> Result<(), SaltError>;
}

/// Client for the `rest_cherrypy` interface of a Salt master.
pub struct SaltClient {
    user: String,
    password: String,
    base_url: String,
    eauth: EAuth,
    connect_timeout: Duration,
    http: Option<Client>,
    token: Option<String>,
}

impl SaltClient {
    pub fn new(user: String, password: String, url: String, eauth: EAuth) -> Self {
        Self {
            user,
            password,
            base_url: url.trim_end_matches('/').to_string(),
            eauth,
            connect_timeout: Duration::from_secs(10),
            http: None,
            token: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[allow(dead_code)]
    pub fn is_logged_in(&self) -> bool {
        self.token.is_some()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn post(&self, path: &str) -> Result<RequestBuilder, SaltError> {
        let http = self.http.as_ref().ok_or(SaltError::NotSetUp)?;
        Ok(http
            .post(self.endpoint(path))
            .header("Accept", "application/json"))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SaltError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(SaltError::Unauthorized);
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(SaltError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

impl fmt::Debug for SaltClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaltClient")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("eauth", &self.eauth)
            .field("session", &self.http.is_some())
            .field("logged_in", &self.token.is_some())
            .finish()
    }
}

impl SaltApi for SaltClient {
    async fn setup(&mut self) -> Result<(), SaltError> {
        let client = Client::builder()
            .connect_timeout(self.connect_timeout)
            .build()?;
        self.http = Some(client);
        Ok(())
    }

    async fn login(&mut self) -> Result<(), SaltError> {
        let body = LoginRequest {
            username: &self.user,
            password: &self.password,
            eauth: self.eauth,
        };
        let response = self.post("login")?.json(&body).send().await?;
        let response = Self::check(response).await?;

        let parsed = response.json::<SaltReturn<LoginRecord>>().await?;
        let record = parsed
            .entries
            .into_iter()
            .next()
            .ok_or(SaltError::MissingToken)?;
        debug!(user = ?record.user, expire = ?record.expire, "salt session opened");
        self.token = Some(record.token);
        Ok(())
    }

    async fn apply_state(&mut self, host: &str, state: &str) -> Result<StateJob, SaltError> {
        let token = self.token.as_deref().ok_or(SaltError::NotLoggedIn)?;
        let lowstate = [Lowstate::apply_state(host, state)];
        let response = self
            .post("")?
            .header(AUTH_HEADER, token)
            .json(&lowstate)
            .send()
            .await?;
        let response = Self::check(response).await?;

        let parsed = response.json::<SaltReturn<JobRecord>>().await?;
        let job = StateJob {
            records: parsed.entries,
        };
        if job.jid().is_none() {
            return Err(SaltError::MissingJid {
                target: host.to_string(),
            });
        }
        Ok(job)
    }

    async fn teardown(&mut self) -> Result<(), SaltError> {
        let result = match (self.http.as_ref(), self.token.as_deref()) {
            (Some(http), Some(token)) => {
                let response = http
                    .post(self.endpoint("logout"))
                    .header("Accept", "application/json")
                    .header(AUTH_HEADER, token)
                    .send()
                    .await;
                match response {
                    Ok(r) => Self::check(r).await.map(|_| ()),
                    Err(e) => Err(e.into()),
                }
            }
            _ => Ok(()),
        };
        self.token = None;
        self.http = None;
        result
    }
}
