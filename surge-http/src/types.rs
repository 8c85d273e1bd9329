use bytes::Bytes;

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
    /// Response headers (lowercased header names). Multiple values are joined with ", ".
    pub headers: Vec<(String, String)>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: http::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: http::Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn post(url: impl Into<String>, body: Bytes) -> Self {
        Self {
            method: http::Method::POST,
            url: url.into(),
            headers: Vec::new(),
            body,
        }
    }

    /// POST with a JSON-encoded body and `Content-Type: application/json`.
    pub fn post_json<T: serde::Serialize + ?Sized>(
        url: impl Into<String>,
        body: &T,
    ) -> Result<Self> {
        let encoded = serde_json::to_vec(body).map_err(Error::Json)?;
        Ok(Self::post(url, Bytes::from(encoded))
            .with_header("content-type", "application/json"))
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}
