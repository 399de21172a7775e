// src/features/context_features.rs
use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, Timelike};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::f64::consts::PI;
use url::Url;

use super::schema::{AutomaticFeature as F, AutomaticFeatures};
use crate::models::{DataQualityIssue, IssueKind, RawContext};

const REFERENCE_WIDTH: f64 = 1920.0;
const REFERENCE_HEIGHT: f64 = 1080.0;
const DEFAULT_WIDTH: f64 = 1366.0;
const DEFAULT_HEIGHT: f64 = 768.0;
const MIN_VIEWPORT: f64 = 240.0;
const MAX_PLAUSIBLE_VIEWPORT: f64 = 16_384.0;
const MOBILE_BREAKPOINT: f64 = 768.0;
const DESKTOP_BREAKPOINT: f64 = 1024.0;
const WIDE_BREAKPOINT: f64 = 1920.0;
const MAX_OFFSET_HOURS: f64 = 14.0;
const MIN_OFFSET_HOURS: f64 = -12.0;

static MAIL_HOSTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|\.)(mail\.google\.com|outlook\.live\.com|outlook\.office(365)?\.com|mail\.yahoo\.com|mail\.proton\.me|webmail\.[a-z0-9.-]+|mail\.[a-z0-9.-]+)$")
        .expect("mail host pattern is a valid regex")
});

static SOCIAL_HOSTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|\.)(facebook\.com|fb\.me|instagram\.com|twitter\.com|x\.com|t\.co|linkedin\.com|lnkd\.in|tiktok\.com|pinterest\.[a-z.]+|reddit\.com|youtube\.com|youtu\.be|whatsapp\.com|wa\.me|t\.me)$")
        .expect("social host pattern is a valid regex")
});

static SEARCH_HOSTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|\.)(google|bing|duckduckgo|yahoo|baidu|yandex|ecosia|startpage|qwant)\.[a-z.]+$")
        .expect("search host pattern is a valid regex")
});

/// Builds the 45-wide automatic block, logging any recovered input problems.
pub fn prepare_features(context: &RawContext) -> AutomaticFeatures {
    let (features, issues) = prepare_features_with_report(context);
    if !issues.is_empty() {
        for issue in &issues {
            debug!("Context feature data-quality issue: {}", issue);
        }
        warn!(
            "Context features: {} input value(s) clamped or defaulted ({})",
            issues.len(),
            issues
                .iter()
                .map(|i| i.field)
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    features
}

/// Same as [`prepare_features`] but returns the data-quality issues instead of
/// logging them.
pub fn prepare_features_with_report(
    context: &RawContext,
) -> (AutomaticFeatures, Vec<DataQualityIssue>) {
    let mut features = AutomaticFeatures::defaults();
    let mut issues = Vec::new();

    encode_temporal(context, &mut features, &mut issues);
    encode_device(context, &mut features, &mut issues);
    encode_network(context, &mut features, &mut issues);
    encode_session(context, &mut features, &mut issues);

    (features, issues)
}

/// Maps `value` in a period of length `period` onto the unit circle.
pub fn cyclical_encode(value: f64, period: f64) -> (f64, f64) {
    let angle = 2.0 * PI * (value.rem_euclid(period) / period);
    (angle.sin(), angle.cos())
}

fn flag(condition: bool) -> f64 {
    if condition {
        1.0
    } else {
        0.0
    }
}

// --- Temporal ---

/// Parses `UTC`, `GMT`, `Z`, `+HH:MM`, `-HHMM`, `+H`, `UTC+3`, `GMT-05:00`.
/// IANA zone names return `None`; they carry no offset without a tz database.
fn parse_utc_offset(tz: &str) -> Option<FixedOffset> {
    let trimmed = tz.trim();
    let upper = trimmed.to_ascii_uppercase();
    let rest = upper
        .strip_prefix("UTC")
        .or_else(|| upper.strip_prefix("GMT"))
        .unwrap_or(&upper);
    if rest.is_empty() || rest == "Z" {
        return FixedOffset::east_opt(0);
    }

    let (sign, digits) = match rest.chars().next()? {
        '+' => (1, &rest[1..]),
        '-' => (-1, &rest[1..]),
        _ => return None,
    };
    let (hours, minutes) = match digits.split_once(':') {
        Some((h, m)) => (parse_offset_part(h)?, parse_offset_part(m)?),
        None if digits.len() == 4 => (
            parse_offset_part(digits.get(..2)?)?,
            parse_offset_part(digits.get(2..)?)?,
        ),
        None => (parse_offset_part(digits)?, 0),
    };
    if hours > MAX_OFFSET_HOURS as i32 || !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// One or two ASCII digits.
fn parse_offset_part(part: &str) -> Option<i32> {
    if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

/// True when the zone is written as an offset rather than a zone name.
fn is_offset_notation(tz: &str) -> bool {
    let upper = tz.trim().to_ascii_uppercase();
    upper.starts_with('+')
        || upper.starts_with('-')
        || upper.starts_with("UTC")
        || upper.starts_with("GMT")
}

fn parse_local_time(
    timestamp: &str,
    zone: Option<FixedOffset>,
) -> Option<(NaiveDateTime, Option<FixedOffset>)> {
    let trimmed = timestamp.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
        // An explicit visitor zone wins over whatever offset the client serialized with.
        let local = match zone {
            Some(offset) => instant.with_timezone(&offset),
            None => instant,
        };
        return Some((local.naive_local(), Some(*local.offset())));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|naive| (naive, zone))
}

fn encode_temporal(
    context: &RawContext,
    features: &mut AutomaticFeatures,
    issues: &mut Vec<DataQualityIssue>,
) {
    let zone = match context.timezone.as_deref() {
        Some(tz) => {
            let parsed = parse_utc_offset(tz);
            if parsed.is_none() && is_offset_notation(tz) {
                issues.push(DataQualityIssue::new(
                    "timezone",
                    IssueKind::Unparsable,
                    format!("could not parse offset {:?}", tz),
                ));
            }
            parsed
        }
        None => None,
    };

    let Some(timestamp) = context.local_timestamp.as_deref() else {
        if let Some(offset) = zone {
            set_offset(features, offset);
        }
        return;
    };

    let Some((local, offset)) = parse_local_time(timestamp, zone) else {
        issues.push(DataQualityIssue::new(
            "local_timestamp",
            IssueKind::Unparsable,
            format!("could not parse {:?}", timestamp),
        ));
        if let Some(offset) = zone {
            set_offset(features, offset);
        }
        return;
    };

    let hour = local.hour() as f64 + local.minute() as f64 / 60.0;
    let weekday = local.weekday().num_days_from_monday();
    let (hour_sin, hour_cos) = cyclical_encode(hour, 24.0);
    let (weekday_sin, weekday_cos) = cyclical_encode(weekday as f64, 7.0);
    let (month_sin, month_cos) = cyclical_encode(local.month0() as f64, 12.0);

    features.set(F::HourSin, hour_sin);
    features.set(F::HourCos, hour_cos);
    features.set(F::WeekdaySin, weekday_sin);
    features.set(F::WeekdayCos, weekday_cos);
    features.set(F::MonthSin, month_sin);
    features.set(F::MonthCos, month_cos);
    features.set(F::IsWeekend, flag(weekday >= 5));
    features.set(F::IsBusinessHours, flag((9.0..18.0).contains(&hour)));
    features.set(F::IsNight, flag(hour >= 22.0 || hour < 6.0));
    features.set(F::DayOfMonthNorm, (local.day() as f64 - 1.0) / 30.0);
    features.set(F::HasLocalTime, 1.0);
    if let Some(offset) = offset {
        set_offset(features, offset);
    }
}

fn set_offset(features: &mut AutomaticFeatures, offset: FixedOffset) {
    let hours = (offset.local_minus_utc() as f64 / 3600.0).clamp(MIN_OFFSET_HOURS, MAX_OFFSET_HOURS);
    features.set(F::UtcOffsetNorm, hours / MAX_OFFSET_HOURS);
}

// --- Device ---

/// Reads a numeric field, recording non-finite values and values below
/// `hard_min` (physically impossible) as issues. Values above `hard_max` are
/// recorded and clamped; anything else is returned untouched.
fn checked_number(
    field: &'static str,
    value: Option<f64>,
    hard_min: f64,
    hard_max: f64,
    issues: &mut Vec<DataQualityIssue>,
) -> Option<f64> {
    let v = value?;
    if !v.is_finite() {
        issues.push(DataQualityIssue::new(field, IssueKind::NotFinite, format!("{}", v)));
        return None;
    }
    if v < hard_min || v > hard_max {
        issues.push(DataQualityIssue::new(
            field,
            IssueKind::OutOfRange,
            format!("{} outside [{}, {}], clamped", v, hard_min, hard_max),
        ));
        return Some(v.clamp(hard_min, hard_max));
    }
    Some(v)
}

fn encode_device(
    context: &RawContext,
    features: &mut AutomaticFeatures,
    issues: &mut Vec<DataQualityIssue>,
) {
    let width = checked_number(
        "viewport_width",
        context.viewport_width,
        1.0,
        MAX_PLAUSIBLE_VIEWPORT,
        issues,
    )
    .map(|w| w.max(MIN_VIEWPORT))
    .unwrap_or(DEFAULT_WIDTH);
    let height = checked_number(
        "viewport_height",
        context.viewport_height,
        1.0,
        MAX_PLAUSIBLE_VIEWPORT,
        issues,
    )
    .map(|h| h.max(MIN_VIEWPORT))
    .unwrap_or(DEFAULT_HEIGHT);

    features.set(F::ViewportWidthNorm, width / REFERENCE_WIDTH);
    features.set(F::ViewportHeightNorm, height / REFERENCE_HEIGHT);
    features.set(F::AspectRatioNorm, (width / height).clamp(0.25, 4.0) / 4.0);
    features.set(F::IsMobileViewport, flag(width < MOBILE_BREAKPOINT));
    features.set(
        F::IsTabletViewport,
        flag((MOBILE_BREAKPOINT..DESKTOP_BREAKPOINT).contains(&width)),
    );
    features.set(F::IsDesktopViewport, flag(width >= DESKTOP_BREAKPOINT));
    features.set(F::IsWideViewport, flag(width >= WIDE_BREAKPOINT));
    features.set(F::IsPortrait, flag(height > width));

    if let Some(touch) = context.touch_capable {
        features.set(F::TouchCapable, flag(touch));
    }

    if let Some(cores) = checked_number(
        "hardware_concurrency",
        context.hardware_concurrency,
        1.0,
        1024.0,
        issues,
    ) {
        features.set(F::HardwareConcurrencyNorm, cores.clamp(1.0, 32.0).log2() / 5.0);
    }

    if let Some(dpr) = checked_number(
        "device_pixel_ratio",
        context.device_pixel_ratio,
        0.1,
        16.0,
        issues,
    ) {
        features.set(F::DevicePixelRatioNorm, dpr.clamp(0.5, 4.0) / 4.0);
    }

    if let Some(reduce) = context.prefers_reduced_motion {
        features.set(F::PrefersReducedMotion, flag(reduce));
    }

    if let Some(scheme) = context.color_scheme.as_deref() {
        match scheme.trim().to_ascii_lowercase().as_str() {
            "dark" => {
                features.set(F::PrefersDark, 1.0);
                features.set(F::ColorSchemeUnknown, 0.0);
            }
            "light" => {
                features.set(F::PrefersLight, 1.0);
                features.set(F::ColorSchemeUnknown, 0.0);
            }
            "" | "no-preference" | "no_preference" => {}
            other => issues.push(DataQualityIssue::new(
                "color_scheme",
                IssueKind::UnknownToken,
                format!("unrecognised color scheme {:?}", other),
            )),
        }
    }
}

// --- Network ---

fn connection_quality(effective_type: &str) -> Option<f64> {
    match effective_type.trim().to_ascii_lowercase().as_str() {
        "slow-2g" | "slow_2g" => Some(0.0),
        "2g" => Some(1.0 / 3.0),
        "3g" => Some(2.0 / 3.0),
        "4g" | "5g" | "wifi" | "ethernet" => Some(1.0),
        _ => None,
    }
}

fn encode_network(
    context: &RawContext,
    features: &mut AutomaticFeatures,
    issues: &mut Vec<DataQualityIssue>,
) {
    if let Some(effective_type) = context.network_effective_type.as_deref() {
        match connection_quality(effective_type) {
            Some(quality) => features.set(F::ConnectionQuality, quality),
            None => issues.push(DataQualityIssue::new(
                "network_effective_type",
                IssueKind::UnknownToken,
                format!("unrecognised connection type {:?}", effective_type),
            )),
        }
    }

    if let Some(downlink) = checked_number(
        "network_downlink_mbps",
        context.network_downlink_mbps,
        0.0,
        10_000.0,
        issues,
    ) {
        let capped = downlink.min(100.0);
        features.set(F::DownlinkNorm, (1.0 + capped).ln() / (101.0f64).ln());
    }

    if let Some(rtt) = checked_number("network_rtt_ms", context.network_rtt_ms, 0.0, 60_000.0, issues)
    {
        features.set(F::RttNorm, rtt.min(3000.0) / 3000.0);
    }

    if let Some(save_data) = context.save_data {
        features.set(F::SaveData, flag(save_data));
    }
}

// --- Session & social ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferrerKind {
    Direct,
    Search,
    Social,
    Email,
    Internal,
    Other,
}

impl ReferrerKind {
    fn feature(self) -> F {
        match self {
            ReferrerKind::Direct => F::ReferrerDirect,
            ReferrerKind::Search => F::ReferrerSearch,
            ReferrerKind::Social => F::ReferrerSocial,
            ReferrerKind::Email => F::ReferrerEmail,
            ReferrerKind::Internal => F::ReferrerInternal,
            ReferrerKind::Other => F::ReferrerOther,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Home,
    Product,
    Catalog,
    Content,
    Checkout,
    Other,
}

fn parse_lenient_url(raw: &str) -> Option<Url> {
    Url::parse(raw)
        .ok()
        .filter(|u| u.host_str().is_some())
        .or_else(|| Url::parse(&format!("https://{}", raw)).ok())
        .filter(|u| u.host_str().is_some_and(|h| h.contains('.')))
}

fn bare_host(url: &Url) -> Option<String> {
    url.host_str()
        .map(|h| h.trim_start_matches("www.").to_ascii_lowercase())
}

pub fn classify_referrer(referrer: Option<&str>, entry_page: Option<&str>) -> Option<ReferrerKind> {
    let raw = match referrer.map(str::trim) {
        None | Some("") => return Some(ReferrerKind::Direct),
        Some(r) => r,
    };
    let host = parse_lenient_url(raw).as_ref().and_then(bare_host)?;

    let entry_host = entry_page
        .and_then(|e| Url::parse(e.trim()).ok())
        .as_ref()
        .and_then(bare_host);
    if entry_host.as_deref() == Some(host.as_str()) {
        return Some(ReferrerKind::Internal);
    }

    let kind = if MAIL_HOSTS.is_match(&host) {
        ReferrerKind::Email
    } else if SOCIAL_HOSTS.is_match(&host) {
        ReferrerKind::Social
    } else if SEARCH_HOSTS.is_match(&host) {
        ReferrerKind::Search
    } else {
        ReferrerKind::Other
    };
    Some(kind)
}

const CHECKOUT_SEGMENTS: &[&str] = &["cart", "carrito", "checkout", "pago", "basket", "cesta"];
const PRODUCT_SEGMENTS: &[&str] = &["product", "products", "producto", "productos", "item", "p"];
const CATALOG_SEGMENTS: &[&str] = &[
    "catalog", "catalogo", "category", "categoria", "categorias", "collections", "shop",
    "tienda", "search", "buscar", "ofertas",
];
const CONTENT_SEGMENTS: &[&str] = &[
    "blog", "news", "noticias", "article", "articulo", "guia", "guides", "docs", "ayuda", "help",
];
const HOME_SEGMENTS: &[&str] = &["index.html", "index.php", "home", "inicio"];

pub fn classify_entry_page(entry_page: &str) -> EntryKind {
    let trimmed = entry_page.trim();
    let path = match Url::parse(trimmed) {
        Ok(url) if url.host_str().is_some() => url.path().to_string(),
        _ => trimmed
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    let lowered = path.to_ascii_lowercase();
    let segments: Vec<&str> = lowered.split('/').filter(|s| !s.is_empty()).collect();

    // Two-letter locale prefixes ("/es/", "/en") don't change the page kind.
    let meaningful: Vec<&str> = segments
        .iter()
        .copied()
        .filter(|s| !(s.len() == 2 && s.chars().all(|c| c.is_ascii_alphabetic())))
        .collect();

    if meaningful.is_empty() || (meaningful.len() == 1 && HOME_SEGMENTS.contains(&meaningful[0])) {
        return EntryKind::Home;
    }
    let has_any = |set: &[&str]| meaningful.iter().any(|s| set.contains(s));
    if has_any(CHECKOUT_SEGMENTS) {
        EntryKind::Checkout
    } else if has_any(PRODUCT_SEGMENTS) {
        EntryKind::Product
    } else if has_any(CATALOG_SEGMENTS) {
        EntryKind::Catalog
    } else if has_any(CONTENT_SEGMENTS) {
        EntryKind::Content
    } else {
        EntryKind::Other
    }
}

fn encode_session(
    context: &RawContext,
    features: &mut AutomaticFeatures,
    issues: &mut Vec<DataQualityIssue>,
) {
    let referrer_kind = classify_referrer(context.referrer.as_deref(), context.entry_page.as_deref())
        .unwrap_or_else(|| {
            issues.push(DataQualityIssue::new(
                "referrer",
                IssueKind::Unparsable,
                format!("could not parse {:?}", context.referrer),
            ));
            ReferrerKind::Other
        });
    features.set(F::ReferrerDirect, 0.0);
    features.set(referrer_kind.feature(), 1.0);

    if let Some(visits) =
        checked_number("visit_count", context.visit_count, 0.0, f64::MAX, issues)
    {
        let visits = visits.clamp(1.0, 100.0);
        features.set(F::VisitCountNorm, (1.0 + visits).ln() / (101.0f64).ln());
        features.set(F::IsFirstVisit, flag(visits <= 1.0));
        features.set(F::IsFrequentVisitor, flag(visits >= 5.0));
    }

    if let Some(entry) = context.entry_page.as_deref() {
        let slot = match classify_entry_page(entry) {
            EntryKind::Home => Some(F::EntryHome),
            EntryKind::Product => Some(F::EntryProduct),
            EntryKind::Catalog => Some(F::EntryCatalog),
            EntryKind::Content => Some(F::EntryContent),
            EntryKind::Checkout => Some(F::EntryCheckout),
            EntryKind::Other => None,
        };
        if let Some(slot) = slot {
            features.set(slot, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distance(a: (f64, f64), b: (f64, f64)) -> f64 {
        ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
    }

    fn desktop_afternoon() -> RawContext {
        RawContext {
            local_timestamp: Some("2024-05-14T14:00:00".to_string()),
            viewport_width: Some(1920.0),
            viewport_height: Some(1080.0),
            touch_capable: Some(false),
            ..RawContext::default()
        }
    }

    #[test]
    fn test_cyclical_encoding_wraps_midnight() {
        let late = cyclical_encode(23.0, 24.0);
        let midnight = cyclical_encode(0.0, 24.0);
        let noon = cyclical_encode(12.0, 24.0);
        assert!(distance(late, midnight) < 0.3);
        assert!((distance(midnight, noon) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_context_yields_schema_defaults() {
        let (features, issues) = prepare_features_with_report(&RawContext::default());
        assert!(issues.is_empty());
        assert_eq!(features, AutomaticFeatures::defaults());
    }

    #[test]
    fn test_desktop_afternoon_encoding() {
        let (features, issues) = prepare_features_with_report(&desktop_afternoon());
        assert!(issues.is_empty());
        let (hour_sin, hour_cos) = cyclical_encode(14.0, 24.0);
        assert!((features[F::HourSin] - hour_sin).abs() < 1e-12);
        assert!((features[F::HourCos] - hour_cos).abs() < 1e-12);
        assert_eq!(features[F::HasLocalTime], 1.0);
        assert_eq!(features[F::IsBusinessHours], 1.0);
        assert_eq!(features[F::IsNight], 0.0);
        // 2024-05-14 was a Tuesday.
        assert_eq!(features[F::IsWeekend], 0.0);
        assert_eq!(features[F::ViewportWidthNorm], 1.0);
        assert_eq!(features[F::ViewportHeightNorm], 1.0);
        assert_eq!(features[F::IsWideViewport], 1.0);
        assert_eq!(features[F::IsDesktopViewport], 1.0);
        assert_eq!(features[F::TouchCapable], 0.0);
        assert_eq!(features[F::ReferrerDirect], 1.0);
    }

    #[test]
    fn test_timezone_converts_utc_instant_to_local_clock() {
        let ctx = RawContext {
            local_timestamp: Some("2024-05-14T23:30:00Z".to_string()),
            timezone: Some("UTC+2".to_string()),
            ..RawContext::default()
        };
        let features = prepare_features(&ctx);
        // 23:30Z is 01:30 on Wednesday in UTC+2.
        let (hour_sin, _) = cyclical_encode(1.5, 24.0);
        assert!((features[F::HourSin] - hour_sin).abs() < 1e-12);
        assert_eq!(features[F::IsNight], 1.0);
        assert!((features[F::UtcOffsetNorm] - 2.0 / 14.0).abs() < 1e-12);
    }

    #[test]
    fn test_parse_utc_offset_variants() {
        assert_eq!(parse_utc_offset("UTC").map(|o| o.local_minus_utc()), Some(0));
        assert_eq!(parse_utc_offset("+05:30").map(|o| o.local_minus_utc()), Some(19_800));
        assert_eq!(parse_utc_offset("-0800").map(|o| o.local_minus_utc()), Some(-28_800));
        assert_eq!(parse_utc_offset("GMT-3").map(|o| o.local_minus_utc()), Some(-10_800));
        assert!(parse_utc_offset("Europe/Madrid").is_none());
        assert_eq!(parse_utc_offset("+14").map(|o| o.local_minus_utc()), Some(50_400));
    }

    #[test]
    fn test_malformed_offsets_are_reported_not_fatal() {
        for tz in ["+1é1", "UTC+999999", "GMT+15", "-12:75", "+", "UTC-1:2:3", "+٣"] {
            assert!(parse_utc_offset(tz).is_none(), "{tz} should not parse");
            let ctx = RawContext {
                local_timestamp: Some("2024-05-14T14:00:00".to_string()),
                timezone: Some(tz.to_string()),
                ..RawContext::default()
            };
            let (features, issues) = prepare_features_with_report(&ctx);
            assert_eq!(issues.len(), 1, "{tz}");
            assert_eq!(issues[0].field, "timezone");
            assert_eq!(issues[0].kind, IssueKind::Unparsable);
            assert_eq!(features[F::HasLocalTime], 1.0);
            assert_eq!(
                features[F::UtcOffsetNorm],
                AutomaticFeatures::defaults()[F::UtcOffsetNorm]
            );
        }
    }

    #[test]
    fn test_zone_names_are_not_reported() {
        let ctx = RawContext {
            timezone: Some("Europe/Madrid".to_string()),
            ..RawContext::default()
        };
        let (_, issues) = prepare_features_with_report(&ctx);
        assert!(issues.is_empty());
    }

    #[test]
    fn test_malformed_values_are_clamped_not_rejected() {
        let ctx = RawContext {
            local_timestamp: Some("yesterday afternoon".to_string()),
            viewport_width: Some(-50.0),
            hardware_concurrency: Some(f64::INFINITY),
            network_effective_type: Some("6g".to_string()),
            visit_count: Some(-4.0),
            ..RawContext::default()
        };
        let (features, issues) = prepare_features_with_report(&ctx);
        let fields: Vec<_> = issues.iter().map(|i| i.field).collect();
        assert_eq!(
            fields,
            vec![
                "local_timestamp",
                "viewport_width",
                "hardware_concurrency",
                "network_effective_type",
                "visit_count"
            ]
        );
        assert_eq!(features[F::HasLocalTime], 0.0);
        assert_eq!(features[F::ViewportWidthNorm], MIN_VIEWPORT / REFERENCE_WIDTH);
        assert_eq!(features[F::IsMobileViewport], 1.0);
        assert_eq!(features[F::HardwareConcurrencyNorm], 0.4);
        assert_eq!(features[F::ConnectionQuality], 0.75);
        assert_eq!(features[F::IsFirstVisit], 1.0);
        for value in features.as_slice() {
            assert!(value.is_finite());
        }
    }

    #[test]
    fn test_referrer_classification() {
        assert_eq!(classify_referrer(None, None), Some(ReferrerKind::Direct));
        assert_eq!(
            classify_referrer(Some("https://www.google.es/search?q=sofa"), None),
            Some(ReferrerKind::Search)
        );
        assert_eq!(
            classify_referrer(Some("https://mail.google.com/mail/u/0"), None),
            Some(ReferrerKind::Email)
        );
        assert_eq!(
            classify_referrer(Some("https://t.co/abc"), None),
            Some(ReferrerKind::Social)
        );
        assert_eq!(
            classify_referrer(
                Some("https://www.tienda.example/blog/post"),
                Some("https://tienda.example/productos/42")
            ),
            Some(ReferrerKind::Internal)
        );
        assert_eq!(
            classify_referrer(Some("news.ycombinator.com"), None),
            Some(ReferrerKind::Other)
        );
        assert_eq!(classify_referrer(Some("::not a url::"), None), None);
    }

    #[test]
    fn test_entry_page_classification() {
        assert_eq!(classify_entry_page("/"), EntryKind::Home);
        assert_eq!(classify_entry_page("/es/"), EntryKind::Home);
        assert_eq!(classify_entry_page("https://tienda.example/inicio"), EntryKind::Home);
        assert_eq!(classify_entry_page("/productos/silla-42?ref=x"), EntryKind::Product);
        assert_eq!(classify_entry_page("/categoria/sofas"), EntryKind::Catalog);
        assert_eq!(classify_entry_page("/blog/tendencias"), EntryKind::Content);
        assert_eq!(classify_entry_page("/es/carrito"), EntryKind::Checkout);
        assert_eq!(classify_entry_page("/sobre-nosotros"), EntryKind::Other);
    }

    #[test]
    fn test_session_features_for_returning_search_visitor() {
        let ctx = RawContext {
            referrer: Some("https://www.bing.com/search?q=lamparas".to_string()),
            visit_count: Some(7.0),
            entry_page: Some("/categoria/lamparas".to_string()),
            ..RawContext::default()
        };
        let features = prepare_features(&ctx);
        assert_eq!(features[F::ReferrerDirect], 0.0);
        assert_eq!(features[F::ReferrerSearch], 1.0);
        assert_eq!(features[F::IsFirstVisit], 0.0);
        assert_eq!(features[F::IsFrequentVisitor], 1.0);
        assert_eq!(features[F::EntryCatalog], 1.0);
    }
}
