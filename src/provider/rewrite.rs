//! Host swapping for asset URLs.

use url::Url;

/// Rewrites origin asset URLs onto a CDN distribution host.
#[derive(Debug, Clone)]
pub struct UrlRewriter {
    site_host: String,
    cdn_host: String,
}

impl UrlRewriter {
    /// Create a rewriter. Hosts are compared case-insensitively and any
    /// `:port` suffix on the site host is ignored.
    pub fn new(site_host: &str, cdn_host: &str) -> Self {
        Self {
            site_host: strip_port(site_host).to_ascii_lowercase(),
            cdn_host: cdn_host.trim().to_ascii_lowercase(),
        }
    }

    /// The origin host.
    pub fn site_host(&self) -> &str {
        &self.site_host
    }

    /// The CDN distribution host.
    pub fn cdn_host(&self) -> &str {
        &self.cdn_host
    }

    /// Swap the site host for the CDN host, preserving path, query and
    /// fragment. Anything that is not an http(s) URL on the site host comes
    /// back unchanged.
    pub fn rewrite(&self, original: &str) -> String {
        self.try_rewrite(original)
            .unwrap_or_else(|| original.to_string())
    }

    fn try_rewrite(&self, original: &str) -> Option<String> {
        let protocol_relative = original.starts_with("//");
        let mut url = if protocol_relative {
            Url::parse(&format!("https:{original}")).ok()?
        } else {
            Url::parse(original).ok()?
        };

        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }

        if !url.host_str()?.eq_ignore_ascii_case(&self.site_host) {
            return None;
        }

        url.set_host(Some(&self.cdn_host)).ok()?;
        url.set_port(None).ok()?;

        let rewritten = url.to_string();
        if protocol_relative {
            rewritten.strip_prefix("https:").map(str::to_string)
        } else {
            Some(rewritten)
        }
    }
}

fn strip_port(host: &str) -> &str {
    let host = host.trim();
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}
