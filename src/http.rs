use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::error::BagsError;

const MAX_RETRIES: usize = 3;
const BASE_DELAY_MS: u64 = 200;

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    service: &'static str,
    base: String,
    has_token: bool,
}

impl ApiClient {
    /// An empty token is accepted here and rejected on the first request, so
    /// offline commands can run without one.
    pub fn new(service: &'static str, base: String, token: &str) -> Result<Self, BagsError> {
        let token = token.trim();
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("hubmapbags/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| BagsError::Http {
                    service,
                    message: err.to_string(),
                })?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if !token.is_empty() {
            let mut bearer = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| BagsError::MissingToken)?;
            bearer.set_sensitive(true);
            headers.insert(AUTHORIZATION, bearer);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| BagsError::Http {
                service,
                message: err.to_string(),
            })?;
        Ok(Self {
            client,
            service,
            base: base.trim_end_matches('/').to_string(),
            has_token: !token.is_empty(),
        })
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    pub fn get_json(&self, path: &str, id: &str) -> Result<Value, BagsError> {
        self.require_token()?;
        let url = self.url(path);
        tracing::debug!(service = self.service, %url, "GET");
        let response = self.send_with_retries(|| self.client.get(&url))?;
        self.read_json(response, id)
    }

    pub fn post_json(&self, path: &str, body: &Value, id: &str) -> Result<Value, BagsError> {
        self.require_token()?;
        let url = self.url(path);
        tracing::debug!(service = self.service, %url, "POST");
        let response = self.send_with_retries(|| self.client.post(&url).json(body))?;
        self.read_json(response, id)
    }

    pub fn head(&self, path: &str) -> Result<HeadResponse, BagsError> {
        self.require_token()?;
        let url = self.url(path);
        tracing::debug!(service = self.service, %url, "HEAD");
        let response = self.send_with_retries(|| self.client.head(&url))?;
        Ok(HeadResponse {
            status: response.status().as_u16(),
            final_url: response.url().to_string(),
        })
    }

    fn require_token(&self) -> Result<(), BagsError> {
        if self.has_token {
            Ok(())
        } else {
            Err(BagsError::MissingToken)
        }
    }

    fn read_json(&self, response: Response, id: &str) -> Result<Value, BagsError> {
        let response = self.handle_status(response, id)?;
        let value: Value = response.json().map_err(|err| BagsError::MalformedResponse {
            service: self.service,
            message: err.to_string(),
        })?;
        if is_bare_miss(&value) {
            return Err(BagsError::NotFound {
                service: self.service,
                id: id.to_string(),
            });
        }
        Ok(value)
    }

    fn handle_status(&self, response: Response, id: &str) -> Result<Response, BagsError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        match status {
            404 => Err(BagsError::NotFound {
                service: self.service,
                id: id.to_string(),
            }),
            401 | 403 => Err(BagsError::Unauthorized {
                service: self.service,
                status,
            }),
            _ => {
                let message = response
                    .text()
                    .unwrap_or_else(|_| format!("{} request failed", self.service));
                Err(BagsError::Status {
                    service: self.service,
                    status,
                    message,
                })
            }
        }
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, BagsError>
    where
        F: FnMut() -> RequestBuilder,
    {
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        tracing::warn!(service = self.service, status, attempt, "retrying");
                        backoff(attempt);
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        tracing::warn!(service = self.service, error = %err, attempt, "retrying");
                        backoff(attempt);
                        attempt += 1;
                        continue;
                    }
                    return Err(BagsError::Http {
                        service: self.service,
                        message: err.to_string(),
                    });
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadResponse {
    pub status: u16,
    pub final_url: String,
}

/// The services answer some misses with 200 and a bare `message` or `error` object.
fn is_bare_miss(value: &Value) -> bool {
    value
        .as_object()
        .map(|object| {
            object.len() <= 2 && (object.contains_key("message") || object.contains_key("error"))
        })
        .unwrap_or(false)
}

fn backoff(attempt: usize) {
    let delay = BASE_DELAY_MS * (attempt as u64 + 1);
    thread::sleep(Duration::from_millis(delay));
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
