//! `HostRpc` — the loopback REST channel to the host instance (spec §4.9,
//! grounded in `rest_api_util.py`). Chunked reads capped at 50MB; network
//! errors are swallowed so the host can simply re-issue the job.

use std::io::Read;

use serde::{de::DeserializeOwned, Serialize};

const API_SERVER_BASE: &str = "http://127.0.0.1";
const MAX_RESPONSE_SIZE: u64 = 1024 * 1024 * 50;

#[derive(Debug, thiserror::Error)]
pub enum HostRpcError {
    #[error("response exceeds the {MAX_RESPONSE_SIZE} byte cap")]
    ResponseTooLarge,
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed response body: {0}")]
    Malformed(String),
}

pub struct HostRpc {
    http: reqwest::blocking::Client,
    base_url: String,
}

impl HostRpc {
    pub fn new(base_url_override: Option<String>) -> Self {
        let http = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("building the host RPC client cannot fail with these options");
        HostRpc {
            http,
            base_url: base_url_override.unwrap_or_else(|| API_SERVER_BASE.to_string()),
        }
    }

    /// `GET /api/getJob`. Returns `Ok(None)` on any network failure or an
    /// empty body — the caller's poll loop treats both as "no job yet".
    pub fn get_job<T: DeserializeOwned>(&self) -> Option<T> {
        let url = format!("{}/api/getJob", self.base_url);
        let resp = self.http.get(&url).send().ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let bytes = read_capped(resp).ok()?;
        if bytes.is_empty() {
            return None;
        }
        serde_json::from_slice(&bytes).ok()
    }

    /// `POST /api/putJobResult`. Failures are ignored (spec §4.9: "ignore
    /// network errors (the host will re-issue)").
    pub fn put_job_result<T: Serialize>(&self, session: &str, job_result: &T) {
        let url = format!("{}/api/putJobResult", self.base_url);
        let body = serde_json::json!({ "session": session, "jobResult": job_result });
        let _ = self.http.post(&url).json(&body).send();
    }
}

fn read_capped(mut resp: reqwest::blocking::Response) -> Result<Vec<u8>, HostRpcError> {
    if let Some(len) = resp.content_length() {
        if len > MAX_RESPONSE_SIZE {
            return Err(HostRpcError::ResponseTooLarge);
        }
    }

    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024 * 1024];
    loop {
        let n = resp
            .read(&mut chunk)
            .map_err(|e| HostRpcError::Network(e.to_string()))?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() as u64 > MAX_RESPONSE_SIZE {
            return Err(HostRpcError::ResponseTooLarge);
        }
    }
    Ok(buf)
}
