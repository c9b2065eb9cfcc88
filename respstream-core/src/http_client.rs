use std::io::BufReader;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::config::Config;
use crate::error::{CoreResult, StreamError};
use crate::responses::CreateResponseRequest;
use crate::sse::SseDecoder;

/// Frame source over a live streamed response body.
pub type ResponseStream = SseDecoder<BufReader<reqwest::blocking::Response>>;

/// Thin blocking wrapper around reqwest with the defaults the stream needs.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    user_agent: String,
    base_url: String,
    api_key: SecretString,
    organization: Option<String>,
}

impl HttpClient {
    pub fn new(cfg: &Config, api_key: SecretString) -> CoreResult<Self> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_millis(cfg.http.connect_timeout_ms))
            .timeout(Duration::from_millis(cfg.http.request_timeout_ms));
        if let Some(n) = cfg.http.pool_max_idle_per_host {
            builder = builder.pool_max_idle_per_host(n);
        }
        let inner = builder
            .build()
            .map_err(|e| StreamError::Other(anyhow::anyhow!("http client build failed: {e}")))?;
        Ok(Self {
            inner,
            user_agent: concat!("respstream/", env!("CARGO_PKG_VERSION")).to_string(),
            base_url: cfg.api.base_url.trim_end_matches('/').to_string(),
            api_key,
            organization: cfg.api.organization.clone(),
        })
    }

    /// Build a client whose key comes from the environment variable named in the config.
    pub fn from_config(cfg: &Config) -> CoreResult<Self> {
        Self::new(cfg, cfg.api.api_key()?)
    }

    pub fn responses_url(&self) -> String {
        format!("{}/v1/responses", self.base_url)
    }

    /// POST a streaming create-response request and hand back the SSE frame
    /// source over its body. Non-2xx statuses are mapped before any frame is read.
    pub fn open_stream(&self, request: &CreateResponseRequest) -> CoreResult<ResponseStream> {
        if !request.stream {
            return Err(StreamError::Other(anyhow::anyhow!(
                "open_stream requires a request with stream = true"
            )));
        }
        let url = self.responses_url();
        let mut req = self
            .inner
            .post(&url)
            .json(request)
            .bearer_auth(self.api_key.expose_secret())
            .header("User-Agent", &self.user_agent)
            .header("Accept", "text/event-stream");
        if let Some(org) = &self.organization {
            req = req.header("OpenAI-Organization", org);
        }

        let resp = req
            .send()
            .map_err(|e| StreamError::Transport(format!("POST {url}: {e}")))?;

        let status = resp.status();
        let headers = resp.headers().clone();
        if !status.is_success() {
            let ra = parse_retry_after(&headers);
            let body = resp.text().unwrap_or_default();
            return Err(map_http_error(status, ra, &body));
        }

        debug!(
            url = %url,
            model = %request.model,
            request_id = extract_request_id(&headers).as_deref().unwrap_or("-"),
            "opened response stream"
        );
        Ok(SseDecoder::new(BufReader::new(resp)))
    }
}

fn extract_request_id(headers: &reqwest::header::HeaderMap) -> Option<String> {
    static CANDIDATES: [&str; 2] = ["x-request-id", "request-id"];
    for k in CANDIDATES {
        if let Some(v) = headers.get(k)
            && let Ok(s) = v.to_str()
        {
            return Some(s.to_string());
        }
    }
    None
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    if let Some(v) = headers.get("retry-after")
        && let Ok(s) = v.to_str()
        && let Ok(secs) = s.trim().parse::<u64>()
    {
        return Some(secs);
    }
    // HTTP-date forms are ignored.
    None
}

fn map_http_error(status: StatusCode, retry_after: Option<u64>, body: &str) -> StreamError {
    let message = match status {
        StatusCode::TOO_MANY_REQUESTS => "rate limited".to_string(),
        s if s.is_server_error() => "service unavailable".to_string(),
        _ => truncate(body, 300),
    };
    StreamError::Http {
        status: status.as_u16(),
        message,
        retry_after,
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut t = s[..end].to_string();
    t.push_str("...");
    t
}
