//! HTTP plumbing for the CRTM stop times endpoint.

mod client;
mod pool;

pub use client::HttpClient;
pub use pool::PooledClient;

use reqwest::{Method, Request, Url};

use crate::error::{CrtmError, Result};

pub const CRTM_STOP_TIMES_URL: &str = "https://www.crtm.es/widgets/api/GetStopsTimes.php";

/// Base URL of the stop times API plus the fixed query it expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopTimesEndpoint {
    url: Url,
}

impl StopTimesEndpoint {
    pub fn new(base_url: &str) -> Result<Self> {
        let url = Url::parse(base_url)
            .map_err(|e| CrtmError::InvalidConfig(format!("bad endpoint {base_url:?}: {e}")))?;
        Ok(Self { url })
    }

    pub fn crtm() -> Result<Self> {
        Self::new(CRTM_STOP_TIMES_URL)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Builds the GET request for one stop.
    ///
    /// `type=1`, `orderBy=2` and `stopTimesByIti=3` select the JSON answer
    /// with arrivals ordered by time and grouped per itinerary.
    pub fn request(&self, cod_stop: &str) -> Request {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("codStop", cod_stop)
            .append_pair("type", "1")
            .append_pair("orderBy", "2")
            .append_pair("stopTimesByIti", "3");
        Request::new(Method::GET, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_carries_fixed_query() {
        let endpoint = StopTimesEndpoint::crtm().unwrap();
        let req = endpoint.request("8_17491");

        assert_eq!(req.method(), Method::GET);
        assert_eq!(req.url().host_str(), Some("www.crtm.es"));
        assert_eq!(
            req.url().query(),
            Some("codStop=8_17491&type=1&orderBy=2&stopTimesByIti=3")
        );
    }

    #[test]
    fn test_request_does_not_mutate_endpoint() {
        let endpoint = StopTimesEndpoint::new("http://127.0.0.1:9/stops").unwrap();
        let _ = endpoint.request("a");
        let second = endpoint.request("b");
        assert_eq!(
            second.url().as_str(),
            "http://127.0.0.1:9/stops?codStop=b&type=1&orderBy=2&stopTimesByIti=3"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            StopTimesEndpoint::new("not a url"),
            Err(CrtmError::InvalidConfig(_))
        ));
    }
}
