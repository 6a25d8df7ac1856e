use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, RANGE,
};

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    /// Resume offset; sent as an open-ended `bytes=<start>-` range.
    pub range_start: Option<u64>,
    pub basic_auth: Option<(String, String)>,
}

impl DownloadRequest {
    pub fn new(url: String) -> Self {
        Self {
            url,
            range_start: None,
            basic_auth: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeadResponse {
    pub status_code: u16,
    pub total_bytes: Option<u64>,
    pub accept_ranges: bool,
}

/// Streaming response: header facts plus the body as a plain reader, so
/// transfers can be driven by fakes in tests.
pub struct StreamResponse {
    pub status_code: u16,
    pub total_bytes: Option<u64>,
    /// Total from `Content-Range: bytes a-b/total`, when the server sent one.
    pub content_range_total: Option<u64>,
    pub body: Box<dyn Read + Send>,
}

pub trait NetClient: Send + Sync {
    fn head(&self, req: &DownloadRequest) -> CoreResult<HeadResponse>;
    fn get_stream(&self, req: &DownloadRequest) -> CoreResult<StreamResponse>;
}

#[derive(Clone)]
pub struct ReqwestNetClient {
    client: Client,
}

impl ReqwestNetClient {
    pub fn new(user_agent: &str) -> CoreResult<Self> {
        // No overall timeout: bodies can take arbitrarily long to stream.
        let client = Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None::<Duration>)
            .build()
            .map_err(|err| CoreError::Network(err.to_string()))?;
        Ok(Self { client })
    }

    fn request_headers(&self, req: &DownloadRequest) -> CoreResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(start) = req.range_start {
            let value = format!("bytes={}-", start);
            headers.insert(
                RANGE,
                HeaderValue::from_str(&value).map_err(|err| CoreError::Network(err.to_string()))?,
            );
        }
        Ok(headers)
    }
}

impl NetClient for ReqwestNetClient {
    fn head(&self, req: &DownloadRequest) -> CoreResult<HeadResponse> {
        let mut request = self.client.head(&req.url);
        if let Some((user, pass)) = &req.basic_auth {
            request = request.basic_auth(user, Some(pass));
        }
        let resp = request
            .send()
            .map_err(|err| CoreError::Network(err.to_string()))?;
        let status_code = resp.status().as_u16();
        let headers = resp.headers();
        let total_bytes = headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());
        let accept_ranges = headers
            .get(ACCEPT_RANGES)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.eq_ignore_ascii_case("bytes"))
            .unwrap_or(false);

        Ok(HeadResponse {
            status_code,
            total_bytes,
            accept_ranges,
        })
    }

    fn get_stream(&self, req: &DownloadRequest) -> CoreResult<StreamResponse> {
        let mut request = self.client.get(&req.url).headers(self.request_headers(req)?);
        if let Some((user, pass)) = &req.basic_auth {
            request = request.basic_auth(user, Some(pass));
        }
        let resp = request
            .send()
            .map_err(|err| CoreError::Network(err.to_string()))?;
        let status_code = resp.status().as_u16();
        let headers = resp.headers();
        let total_bytes = headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());
        let content_range_total = headers
            .get(CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(content_range_total);

        Ok(StreamResponse {
            status_code,
            total_bytes,
            content_range_total,
            body: Box::new(resp),
        })
    }
}

fn content_range_total(value: &str) -> Option<u64> {
    value.rsplit('/').next()?.trim().parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_range_total() {
        assert_eq!(content_range_total("bytes 100-4999/5000"), Some(5000));
        assert_eq!(content_range_total("bytes */1234"), Some(1234));
        assert_eq!(content_range_total("bytes 0-1/*"), None);
        assert_eq!(content_range_total("garbage"), None);
    }

    #[test]
    fn request_defaults_have_no_range() {
        let req = DownloadRequest::new("https://host/file.rar".to_string());
        assert!(req.range_start.is_none());
        assert!(req.basic_auth.is_none());
    }
}
