//! Request context and routing decisions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Content category of a requested asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    Images,
    Videos,
    StaticFiles,
    Api,
}

impl ContentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Images => "images",
            Self::Videos => "videos",
            Self::StaticFiles => "static_files",
            Self::Api => "api",
        }
    }

    /// Infer the category from a URL path.
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.to_ascii_lowercase();
        if path.starts_with("/api/") || path.starts_with("/wp-json/") {
            return Some(Self::Api);
        }

        let file = path.rsplit('/').next().unwrap_or_default();
        let (_, ext) = file.rsplit_once('.')?;

        match ext {
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "avif" | "svg" | "ico" | "bmp" => {
                Some(Self::Images)
            }
            "mp4" | "webm" | "mov" | "m4v" | "m3u8" | "ts" | "mkv" | "ogv" => Some(Self::Videos),
            "css" | "js" | "mjs" | "woff" | "woff2" | "ttf" | "otf" | "eot" | "map" | "txt"
            | "pdf" | "zip" => Some(Self::StaticFiles),
            "json" => Some(Self::Api),
            _ => None,
        }
    }
}

impl fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContentCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "images" => Ok(Self::Images),
            "videos" => Ok(Self::Videos),
            "static_files" => Ok(Self::StaticFiles),
            "api" => Ok(Self::Api),
            other => Err(format!("unknown content category: {other}")),
        }
    }
}

/// Client device class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Desktop,
    Mobile,
    Tablet,
    #[default]
    Unknown,
}

/// Client connection class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionClass {
    Fast,
    Slow,
    #[default]
    Unknown,
}

/// Per-request routing input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingContext {
    /// Region code of the client (e.g. `EU`, `US`, `GB`)
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub content_category: Option<ContentCategory>,
    #[serde(default)]
    pub device: DeviceClass,
    #[serde(default)]
    pub connection: ConnectionClass,
}

impl RoutingContext {
    /// Context with the content category inferred from the URL.
    pub fn for_url(url: &str) -> Self {
        Self {
            content_category: category_of(url),
            ..Self::default()
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_category(mut self, category: ContentCategory) -> Self {
        self.content_category = Some(category);
        self
    }
}

fn category_of(url: &str) -> Option<ContentCategory> {
    let parsed = if url.starts_with("//") {
        Url::parse(&format!("https:{url}"))
    } else {
        Url::parse(url)
    };

    match parsed {
        Ok(u) => ContentCategory::from_path(u.path()),
        // Relative path
        Err(_) => ContentCategory::from_path(url.split(['?', '#']).next().unwrap_or_default()),
    }
}

/// Why a provider was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteReason {
    #[serde(rename = "geographic")]
    Geographic,
    #[serde(rename = "content")]
    Content,
    #[serde(rename = "load-balanced")]
    LoadBalanced,
    #[serde(rename = "none-healthy")]
    NoneHealthy,
}

impl RouteReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Geographic => "geographic",
            Self::Content => "content",
            Self::LoadBalanced => "load-balanced",
            Self::NoneHealthy => "none-healthy",
        }
    }
}

impl fmt::Display for RouteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one routing call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub provider: Option<String>,
    pub reason: RouteReason,
    pub context: RoutingContext,
    pub timestamp: DateTime<Utc>,
}

impl RoutingDecision {
    pub fn new(provider: Option<String>, reason: RouteReason, context: RoutingContext) -> Self {
        Self {
            provider,
            reason,
            context,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_path() {
        assert_eq!(ContentCategory::from_path("/img/logo.PNG"), Some(ContentCategory::Images));
        assert_eq!(ContentCategory::from_path("/v/intro.mp4"), Some(ContentCategory::Videos));
        assert_eq!(
            ContentCategory::from_path("/wp-content/theme/style.css"),
            Some(ContentCategory::StaticFiles)
        );
        assert_eq!(ContentCategory::from_path("/api/v1/items"), Some(ContentCategory::Api));
        assert_eq!(ContentCategory::from_path("/about"), None);
        assert_eq!(ContentCategory::from_path("/dir.d/file"), None);
    }

    #[test]
    fn test_for_url() {
        let ctx = RoutingContext::for_url("https://www.example.com/a/b.webp?v=3");
        assert_eq!(ctx.content_category, Some(ContentCategory::Images));
        assert_eq!(ctx.region, None);

        let ctx = RoutingContext::for_url("//www.example.com/app.js");
        assert_eq!(ctx.content_category, Some(ContentCategory::StaticFiles));

        let ctx = RoutingContext::for_url("/media/clip.webm#t=10");
        assert_eq!(ctx.content_category, Some(ContentCategory::Videos));
    }

    #[test]
    fn test_category_serde_names() {
        let json = serde_json::to_string(&ContentCategory::StaticFiles).unwrap();
        assert_eq!(json, "\"static_files\"");
        assert_eq!("VIDEOS".parse::<ContentCategory>(), Ok(ContentCategory::Videos));
        assert!("fonts".parse::<ContentCategory>().is_err());
    }

    #[test]
    fn test_reason_names() {
        assert_eq!(
            serde_json::to_string(&RouteReason::LoadBalanced).unwrap(),
            "\"load-balanced\""
        );
        assert_eq!(RouteReason::NoneHealthy.to_string(), "none-healthy");
    }
}
