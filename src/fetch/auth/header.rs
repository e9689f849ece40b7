use crate::fetch::client::HttpClient;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderName, HeaderValue, USER_AGENT};

/// An [`HttpClient`] wrapper that sets a fixed HTTP header on every request.
///
/// The chart endpoint of the market-data provider rejects requests without a
/// browser-like `User-Agent`.
pub struct Header<C> {
    inner: C,
    name: HeaderName,
    value: HeaderValue,
}

impl<C> Header<C> {
    pub fn new(inner: C, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("invalid header name '{name}'"))?;
        let value = HeaderValue::from_str(value)
            .with_context(|| format!("invalid value for header '{name}'"))?;
        Ok(Self { inner, name, value })
    }

    pub fn user_agent(inner: C, agent: &str) -> Result<Self> {
        let value = HeaderValue::from_str(agent)
            .with_context(|| format!("invalid user agent '{agent}'"))?;
        Ok(Self {
            inner,
            name: USER_AGENT,
            value,
        })
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for Header<C> {
    async fn execute(&self, mut req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        req.headers_mut().insert(self.name.clone(), self.value.clone());
        self.inner.execute(req).await
    }
}
