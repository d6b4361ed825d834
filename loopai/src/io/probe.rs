//! HTTP reachability probe backing `website_exists`.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::fault::Fault;

/// Blocking HTTP client reused across evaluations.
///
/// Redirects are followed (reqwest's default policy), so the reported status
/// is the final response's.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::blocking::Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("loopai/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        Ok(Self { client })
    }

    /// Status code of a GET to `url`, bounded by `timeout` end to end.
    pub fn status(&self, url: &str, timeout: Duration) -> Result<u16, Fault> {
        debug!(url, timeout_secs = timeout.as_secs(), "probing url");
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .map_err(|e| Fault::ProbeFault(format!("GET {url}: {e}")))?;
        Ok(response.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn unreachable_url_is_a_probe_fault_within_bound() {
        let probe = HttpProbe::new().expect("client");
        let started = Instant::now();
        let result = probe.status("http://127.0.0.1:9/", Duration::from_secs(1));
        assert!(matches!(result, Err(Fault::ProbeFault(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn malformed_url_is_a_probe_fault() {
        let probe = HttpProbe::new().expect("client");
        let result = probe.status("not a url", Duration::from_secs(1));
        assert!(matches!(result, Err(Fault::ProbeFault(_))));
    }
}
