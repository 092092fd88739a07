use ahash::AHashMap;
use std::net::IpAddr;

/// Snapshot of the request facts rules can look at.
///
/// Header names are kept exactly as supplied and looked up case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    address: IpAddr,
    host: Option<String>,
    headers: AHashMap<String, String>,
    path: Option<String>,
}

impl RequestInfo {
    pub fn new(address: IpAddr) -> Self {
        Self { address, host: None, headers: AHashMap::new(), path: None }
    }

    /// Resolved client host name
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Add a header, replacing any previous value under the same name
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers.extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn address(&self) -> IpAddr {
        self.address
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn headers(&self) -> &AHashMap<String, String> {
        &self.headers
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }
}
