//! Remote host identity and URL canonicalization.

use std::fmt;

use url::Url;

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("missing host: {0}")]
    MissingHost(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize a URL string before it is sent to a remote.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let mut parsed = Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str() {
        let host = host.to_lowercase();
        parsed
            .set_host(Some(&host))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Scheme, host and port of a remote. Two requests share a target when they
/// would reach the same origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    scheme: String,
    host: String,
    port: u16,
}

impl Target {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self { scheme: scheme.into().to_lowercase(), host: host.into().to_lowercase(), port }
    }

    /// Target of an absolute URL, filling in the scheme's default port.
    pub fn from_url(url: &Url) -> Result<Self, UrlError> {
        let host = url.host_str().ok_or_else(|| UrlError::MissingHost(url.to_string()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| UrlError::UnsupportedScheme(url.scheme().to_string()))?;
        Ok(Self::new(url.scheme(), host, port))
    }

    pub fn parse(input: &str) -> Result<Self, UrlError> {
        Self::from_url(&canonicalize(input)?)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Root URL of the target, used for existence probes.
    pub fn root_url(&self) -> Result<Url, UrlError> {
        Url::parse(&format!("{self}/")).map_err(|e| UrlError::InvalidUrl(e.to_string()))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_default_scheme() {
        let url = canonicalize("registry.npmjs.org").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("registry.npmjs.org"));
    }

    #[test]
    fn test_canonicalize_lowercase_host_and_fragment() {
        let url = canonicalize("  https://REPO1.Maven.org/maven2/junit?x=1#top ").unwrap();
        assert_eq!(url.host_str(), Some("repo1.maven.org"));
        assert_eq!(url.query(), Some("x=1"));
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn test_canonicalize_rejects() {
        assert!(matches!(canonicalize("   "), Err(UrlError::Empty)));
        assert!(matches!(canonicalize("ftp://example.com"), Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_target_default_ports() {
        let https = Target::parse("https://registry.npmjs.org/lodash").unwrap();
        assert_eq!(https.port(), 443);
        assert_eq!(https.to_string(), "https://registry.npmjs.org:443");

        let http = Target::parse("http://localhost/").unwrap();
        assert_eq!(http.port(), 80);
    }

    #[test]
    fn test_same_origin_same_target() {
        let a = Target::parse("https://Repo1.maven.org/maven2/a.pom").unwrap();
        let b = Target::parse("https://repo1.maven.org:443/maven2/b.jar").unwrap();
        let other = Target::parse("https://repo.maven.apache.org/maven2/").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, other);
    }

    #[test]
    fn test_root_url() {
        let target = Target::new("https", "registry.npmjs.org", 8443);
        assert_eq!(target.root_url().unwrap().as_str(), "https://registry.npmjs.org:8443/");
    }
}
