//! Records persisted in the catalog store and exposed through the API.
//!
//! Field names follow the JSON the site and admin panel already consume,
//! which is why most structs are camelCase while the host-facing video
//! fields keep their snake_case names.

use std::{fmt, str::FromStr};

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 5000;
pub const MAX_REPORT_DESCRIPTION_LEN: usize = 1000;
pub const DEFAULT_DURATION: &str = "00:00";
pub const DEFAULT_CATEGORY_ICON: &str = "📁";
pub const DEFAULT_CATEGORY_COLOR: &str = "#6366f1";

/// Declares a string-backed enum with serde, `as_str` and `FromStr`.
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = anyhow::Error;

            fn from_str(value: &str) -> Result<Self> {
                match value.trim() {
                    $($text => Ok($name::$variant),)+
                    other => Err(anyhow!(concat!("invalid ", stringify!($name), ": {}"), other)),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(
    /// Visibility of a video on the public site.
    VideoStatus {
        Public => "public",
        Private => "private",
        Unlisted => "unlisted",
        Processing => "processing",
    }
);

string_enum!(AdPlacement {
    HomeTop => "home_top",
    HomeSidebar => "home_sidebar",
    HomeInfeed => "home_infeed",
    HomeFooter => "home_footer",
    WatchSidebar => "watch_sidebar",
    WatchBelow => "watch_below",
    WatchRelated => "watch_related",
    WatchOverlay => "watch_overlay",
    SearchTop => "search_top",
    CategoryTop => "category_top",
    Popunder => "popunder",
    Interstitial => "interstitial",
});

string_enum!(AdType {
    Banner => "banner",
    Script => "script",
    Html => "html",
    Image => "image",
    Video => "video",
});

string_enum!(AdDevice {
    All => "all",
    Desktop => "desktop",
    Mobile => "mobile",
});

string_enum!(ReportReason {
    Broken => "broken",
    Copyright => "copyright",
    Inappropriate => "inappropriate",
    Spam => "spam",
    Misleading => "misleading",
    Other => "other",
});

string_enum!(ReportStatus {
    Pending => "pending",
    Reviewing => "reviewing",
    Resolved => "resolved",
    Dismissed => "dismissed",
});

string_enum!(SettingType {
    String => "string",
    Number => "number",
    Boolean => "boolean",
    Json => "json",
    Array => "array",
});

impl ReportStatus {
    /// Closing states stamp `resolvedAt`.
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Resolved | Self::Dismissed)
    }
}

impl AdPlacement {
    /// Human readable name and nominal size for the admin placement picker.
    pub fn describe(self) -> (&'static str, &'static str) {
        match self {
            Self::HomeTop => ("Home - Top Banner", "728x90"),
            Self::HomeSidebar => ("Home - Sidebar", "300x600"),
            Self::HomeInfeed => ("Home - In-Feed", "Native"),
            Self::HomeFooter => ("Home - Footer", "728x90"),
            Self::WatchSidebar => ("Watch - Sidebar", "300x250"),
            Self::WatchBelow => ("Watch - Below Player", "728x90"),
            Self::WatchRelated => ("Watch - Related Videos", "Native"),
            Self::WatchOverlay => ("Watch - Video Overlay", "480x70"),
            Self::SearchTop => ("Search - Top", "728x90"),
            Self::CategoryTop => ("Category - Top", "728x90"),
            Self::Popunder => ("Popunder", "Full Page"),
            Self::Interstitial => ("Interstitial", "Full Page"),
        }
    }
}

/// Category summary embedded in video responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: String,
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub id: String,
    #[serde(rename = "file_code")]
    pub file_code: String,
    #[serde(rename = "embed_code")]
    pub embed_code: String,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub thumbnail: String,
    #[serde(default, skip_serializing)]
    pub thumbnail_public_id: Option<String>,
    pub duration: String,
    pub category: Option<CategoryRef>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub views: i64,
    pub likes: i64,
    pub dislikes: i64,
    pub status: VideoStatus,
    pub featured: bool,
    pub upload_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoRecord {
    pub fn category_id(&self) -> Option<&str> {
        self.category.as_ref().map(|category| category.id.as_str())
    }
}

/// Everything needed to insert a video. The store derives id, slug and
/// timestamps.
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub file_code: String,
    pub embed_code: String,
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    pub thumbnail_public_id: Option<String>,
    pub duration: String,
    pub category_id: Option<String>,
    pub tags: Vec<String>,
    pub status: VideoStatus,
    pub featured: bool,
    pub views: i64,
}

impl NewVideo {
    pub fn new(
        file_code: impl Into<String>,
        embed_code: impl Into<String>,
        title: impl Into<String>,
        thumbnail: impl Into<String>,
    ) -> Self {
        Self {
            file_code: file_code.into(),
            embed_code: embed_code.into(),
            title: title.into(),
            description: String::new(),
            thumbnail: thumbnail.into(),
            thumbnail_public_id: None,
            duration: DEFAULT_DURATION.to_string(),
            category_id: None,
            tags: Vec::new(),
            status: VideoStatus::Public,
            featured: false,
            views: 0,
        }
    }
}

/// Partial admin update. `category: Some(None)` clears the category.
#[derive(Debug, Clone, Default)]
pub struct VideoPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub thumbnail_public_id: Option<Option<String>>,
    pub category: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub status: Option<VideoStatus>,
    pub featured: Option<bool>,
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRecord {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub thumbnail: String,
    pub icon: String,
    pub video_count: i64,
    pub order: i64,
    pub is_active: bool,
    pub color: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub is_active: Option<bool>,
    pub order: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdSize {
    pub width: i64,
    pub height: i64,
}

impl Default for AdSize {
    fn default() -> Self {
        Self {
            width: 728,
            height: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdRecord {
    pub id: String,
    pub name: String,
    pub placement: AdPlacement,
    #[serde(rename = "type")]
    pub ad_type: AdType,
    pub code: String,
    pub image_url: String,
    pub target_url: String,
    pub size: AdSize,
    pub device: AdDevice,
    pub enabled: bool,
    pub impressions: i64,
    pub clicks: i64,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub priority: i64,
    pub ctr: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields an admin may set on an ad. On create the required ones are checked
/// by the handler; on update only present fields are written.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdInput {
    pub name: Option<String>,
    pub placement: Option<AdPlacement>,
    #[serde(rename = "type")]
    pub ad_type: Option<AdType>,
    pub code: Option<String>,
    pub image_url: Option<String>,
    pub target_url: Option<String>,
    pub size: Option<AdSize>,
    pub device: Option<AdDevice>,
    pub enabled: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub start_date: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    pub end_date: Option<Option<DateTime<Utc>>>,
    pub priority: Option<i64>,
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`).
pub(crate) fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Click-through rate in percent, rounded to two decimals.
pub fn click_through_rate(clicks: i64, impressions: i64) -> f64 {
    if impressions <= 0 {
        return 0.0;
    }
    let ratio = clicks as f64 / impressions as f64 * 100.0;
    (ratio * 100.0).round() / 100.0
}

/// Video summary attached to reports in the admin listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportVideoRef {
    pub id: String,
    pub title: String,
    pub thumbnail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRecord {
    pub id: String,
    pub video_id: String,
    pub reason: ReportReason,
    pub description: String,
    pub email: String,
    pub ip: String,
    pub status: ReportStatus,
    pub admin_notes: String,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<ReportVideoRef>,
}

#[derive(Debug, Clone)]
pub struct NewReport {
    pub video_id: String,
    pub reason: ReportReason,
    pub description: String,
    pub email: String,
    pub ip: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingRecord {
    pub key: String,
    pub value: serde_json::Value,
    #[serde(rename = "type")]
    pub value_type: SettingType,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of per-video, per-day counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyAnalytics {
    pub video_id: String,
    pub date: String,
    pub views: i64,
    pub unique_views: i64,
    pub likes: i64,
    pub dislikes: i64,
    pub shares: i64,
    pub avg_watch_time: f64,
}

/// Lowercases and collapses every run of non `[a-z0-9]` characters into a
/// single dash, trimming dashes at both ends.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;
    for c in value.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Video slugs are suffixed with the host file code so equal titles stay
/// unique.
pub fn video_slug(title: &str, file_code: &str) -> String {
    let prefix: String = file_code.chars().take(8).collect();
    format!("{}-{}", slugify(title), prefix)
}

/// Trims, lowercases and drops empty tags while keeping first-seen order.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Splits the comma separated form the upload form submits.
pub fn parse_tag_list(raw: &str) -> Vec<String> {
    normalize_tags(raw.split(','))
}

/// Renders a length in seconds as `mm:ss`, or `h:mm:ss` past an hour.
pub fn format_duration(total_seconds: i64) -> String {
    let total_seconds = total_seconds.max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// Keeps at most `max` characters.
pub fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("  Hello, World!  "), "hello-world");
        assert_eq!(slugify("Rust & Tokio -- 2024"), "rust-tokio-2024");
        assert_eq!(slugify("---"), "");
        assert_eq!(slugify("Ünïcode Title"), "n-code-title");
    }

    #[test]
    fn video_slug_appends_file_code_prefix() {
        assert_eq!(video_slug("My Clip", "abcdefghijk"), "my-clip-abcdefgh");
        assert_eq!(video_slug("Short", "xy"), "short-xy");
    }

    #[test]
    fn tags_are_normalized_and_deduplicated() {
        assert_eq!(
            parse_tag_list(" Rust, tokio ,,RUST, Axum "),
            vec!["rust", "tokio", "axum"]
        );
        assert!(parse_tag_list("").is_empty());
    }

    #[test]
    fn durations_render_with_optional_hours() {
        assert_eq!(format_duration(0), "00:00");
        assert_eq!(format_duration(75), "01:15");
        assert_eq!(format_duration(3_725), "1:02:05");
        assert_eq!(format_duration(-5), "00:00");
    }

    #[test]
    fn click_through_rate_rounds_to_two_places() {
        assert_eq!(click_through_rate(0, 0), 0.0);
        assert_eq!(click_through_rate(1, 3), 33.33);
        assert_eq!(click_through_rate(5, 10), 50.0);
    }

    #[test]
    fn enums_round_trip_through_strings() {
        for status in VideoStatus::ALL {
            assert_eq!(status.as_str().parse::<VideoStatus>().unwrap(), *status);
        }
        assert!("archived".parse::<VideoStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&AdPlacement::WatchOverlay).unwrap(),
            "\"watch_overlay\""
        );
        assert!(ReportStatus::Dismissed.is_closed());
        assert!(!ReportStatus::Reviewing.is_closed());
    }

    #[test]
    fn ad_input_distinguishes_null_from_missing_dates() {
        let input: AdInput = serde_json::from_str(r#"{"startDate": null}"#).unwrap();
        assert_eq!(input.start_date, Some(None));
        assert_eq!(input.end_date, None);
    }

    #[test]
    fn video_json_keeps_host_field_names() {
        let now = Utc::now();
        let record = VideoRecord {
            id: "v1".into(),
            file_code: "abc".into(),
            embed_code: "https://abyss.to/embed/abc".into(),
            title: "t".into(),
            slug: "t-abc".into(),
            description: String::new(),
            thumbnail: "thumb".into(),
            thumbnail_public_id: Some("cdn/1".into()),
            duration: DEFAULT_DURATION.into(),
            category: None,
            tags: vec![],
            views: 0,
            likes: 0,
            dislikes: 0,
            status: VideoStatus::Public,
            featured: false,
            upload_date: now,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["file_code"], "abc");
        assert_eq!(json["embed_code"], "https://abyss.to/embed/abc");
        assert!(json.get("uploadDate").is_some());
        assert!(json.get("thumbnailPublicId").is_none());
    }
}
