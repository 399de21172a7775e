// src/models/context.rs
//! Request-scoped inputs to the prediction core.
//!
//! `RawContext` is what the browser reports about the current visit. Every
//! field is optional; an anonymous first visit with no client hints is the
//! common case, not an error. `UserProfile` and `VisualPreferences` arrive
//! already validated from the profile service.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt;

/// Ephemeral per-request signals: time, device, network and session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawContext {
    /// Local wall-clock time of the visitor (RFC 3339 or naive ISO-8601)
    pub local_timestamp: Option<String>,
    /// `UTC`, `Z`, `+HH:MM`, `-HHMM` or `UTC+H`
    pub timezone: Option<String>,

    pub viewport_width: Option<f64>,
    pub viewport_height: Option<f64>,
    pub touch_capable: Option<bool>,
    pub hardware_concurrency: Option<f64>,
    pub device_pixel_ratio: Option<f64>,
    pub prefers_reduced_motion: Option<bool>,
    /// `light`, `dark` or `no-preference`
    pub color_scheme: Option<String>,

    /// Network Information API `effectiveType`: `slow-2g`, `2g`, `3g`, `4g`
    pub network_effective_type: Option<String>,
    pub network_downlink_mbps: Option<f64>,
    pub network_rtt_ms: Option<f64>,
    pub save_data: Option<bool>,

    pub referrer: Option<String>,
    pub visit_count: Option<f64>,
    pub entry_page: Option<String>,
}

/// Category of a data-quality problem found while reading raw input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    WrongType,
    OutOfRange,
    NotFinite,
    Unparsable,
    UnknownToken,
}

/// A recovered input problem. These are logged, never returned as errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataQualityIssue {
    pub field: &'static str,
    pub kind: IssueKind,
    pub detail: String,
}

impl DataQualityIssue {
    pub fn new(field: &'static str, kind: IssueKind, detail: impl Into<String>) -> Self {
        Self {
            field,
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for DataQualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}): {}", self.field, self.kind, self.detail)
    }
}

/// Sub-objects the client SDK may group fields under.
const FIELD_GROUPS: [&str; 4] = ["temporal", "device", "network", "session"];

fn lookup<'a>(root: &'a Map<String, JsonValue>, keys: &[&str]) -> Option<&'a JsonValue> {
    let direct = keys.iter().find_map(|k| root.get(*k));
    direct
        .or_else(|| {
            FIELD_GROUPS.iter().find_map(|group| {
                root.get(*group)
                    .and_then(JsonValue::as_object)
                    .and_then(|obj| keys.iter().find_map(|k| obj.get(*k)))
            })
        })
        .filter(|v| !v.is_null())
}

fn coerce_f64(
    field: &'static str,
    value: Option<&JsonValue>,
    issues: &mut Vec<DataQualityIssue>,
) -> Option<f64> {
    match value? {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => match s.trim().parse::<f64>() {
            Ok(v) => Some(v),
            Err(_) => {
                issues.push(DataQualityIssue::new(
                    field,
                    IssueKind::Unparsable,
                    format!("expected a number, got {:?}", s),
                ));
                None
            }
        },
        JsonValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        other => {
            issues.push(DataQualityIssue::new(
                field,
                IssueKind::WrongType,
                format!("expected a number, got {}", other),
            ));
            None
        }
    }
}

fn coerce_bool(
    field: &'static str,
    value: Option<&JsonValue>,
    issues: &mut Vec<DataQualityIssue>,
) -> Option<bool> {
    match value? {
        JsonValue::Bool(b) => Some(*b),
        JsonValue::Number(n) => n.as_f64().map(|v| v != 0.0),
        JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => {
                issues.push(DataQualityIssue::new(
                    field,
                    IssueKind::Unparsable,
                    format!("expected a boolean, got {:?}", s),
                ));
                None
            }
        },
        other => {
            issues.push(DataQualityIssue::new(
                field,
                IssueKind::WrongType,
                format!("expected a boolean, got {}", other),
            ));
            None
        }
    }
}

fn coerce_string(
    field: &'static str,
    value: Option<&JsonValue>,
    issues: &mut Vec<DataQualityIssue>,
) -> Option<String> {
    match value? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        other => {
            issues.push(DataQualityIssue::new(
                field,
                IssueKind::WrongType,
                format!("expected a string, got {}", other),
            ));
            None
        }
    }
}

/// Timestamps may arrive as epoch milliseconds; those are rendered as UTC
/// RFC 3339 so the feature processor sees a single representation.
fn coerce_timestamp(
    value: Option<&JsonValue>,
    issues: &mut Vec<DataQualityIssue>,
) -> Option<String> {
    match value? {
        JsonValue::Number(n) => {
            let millis = n.as_f64()?;
            match chrono::DateTime::<chrono::Utc>::from_timestamp_millis(millis as i64) {
                Some(ts) => Some(ts.to_rfc3339()),
                None => {
                    issues.push(DataQualityIssue::new(
                        "local_timestamp",
                        IssueKind::OutOfRange,
                        format!("epoch millis {} out of range", millis),
                    ));
                    None
                }
            }
        }
        other => coerce_string("local_timestamp", Some(other), issues),
    }
}

impl RawContext {
    /// Builds a context from loosely-shaped client JSON, logging anything that
    /// had to be coerced or dropped.
    pub fn from_json(value: &JsonValue) -> Self {
        let (context, issues) = Self::from_json_with_report(value);
        if !issues.is_empty() {
            for issue in &issues {
                debug!("RawContext data-quality issue: {}", issue);
            }
            warn!(
                "RawContext: {} field(s) coerced or dropped while reading client payload",
                issues.len()
            );
        }
        context
    }

    pub fn from_json_with_report(value: &JsonValue) -> (Self, Vec<DataQualityIssue>) {
        let mut issues = Vec::new();
        let root = match value.as_object() {
            Some(obj) => obj,
            None => {
                issues.push(DataQualityIssue::new(
                    "context",
                    IssueKind::WrongType,
                    format!("expected an object, got {}", value),
                ));
                return (Self::default(), issues);
            }
        };

        let context = Self {
            local_timestamp: coerce_timestamp(
                lookup(root, &["local_timestamp", "localTimestamp", "timestamp"]),
                &mut issues,
            ),
            timezone: coerce_string(
                "timezone",
                lookup(root, &["timezone", "timeZone", "tz"]),
                &mut issues,
            ),
            viewport_width: coerce_f64(
                "viewport_width",
                lookup(root, &["viewport_width", "viewportWidth", "innerWidth"]),
                &mut issues,
            ),
            viewport_height: coerce_f64(
                "viewport_height",
                lookup(root, &["viewport_height", "viewportHeight", "innerHeight"]),
                &mut issues,
            ),
            touch_capable: coerce_bool(
                "touch_capable",
                lookup(root, &["touch_capable", "touchCapable", "touch"]),
                &mut issues,
            ),
            hardware_concurrency: coerce_f64(
                "hardware_concurrency",
                lookup(root, &["hardware_concurrency", "hardwareConcurrency"]),
                &mut issues,
            ),
            device_pixel_ratio: coerce_f64(
                "device_pixel_ratio",
                lookup(root, &["device_pixel_ratio", "devicePixelRatio"]),
                &mut issues,
            ),
            prefers_reduced_motion: coerce_bool(
                "prefers_reduced_motion",
                lookup(root, &["prefers_reduced_motion", "prefersReducedMotion"]),
                &mut issues,
            ),
            color_scheme: coerce_string(
                "color_scheme",
                lookup(root, &["color_scheme", "colorScheme", "prefersColorScheme"]),
                &mut issues,
            ),
            network_effective_type: coerce_string(
                "network_effective_type",
                lookup(root, &["network_effective_type", "effectiveType", "effective_type"]),
                &mut issues,
            ),
            network_downlink_mbps: coerce_f64(
                "network_downlink_mbps",
                lookup(root, &["network_downlink_mbps", "downlink"]),
                &mut issues,
            ),
            network_rtt_ms: coerce_f64(
                "network_rtt_ms",
                lookup(root, &["network_rtt_ms", "rtt"]),
                &mut issues,
            ),
            save_data: coerce_bool(
                "save_data",
                lookup(root, &["save_data", "saveData"]),
                &mut issues,
            ),
            referrer: coerce_string(
                "referrer",
                lookup(root, &["referrer", "referer"]),
                &mut issues,
            ),
            visit_count: coerce_f64(
                "visit_count",
                lookup(root, &["visit_count", "visitCount", "visits"]),
                &mut issues,
            ),
            entry_page: coerce_string(
                "entry_page",
                lookup(root, &["entry_page", "entryPage", "landing_page"]),
                &mut issues,
            ),
        };

        (context, issues)
    }
}

/// Persisted customer profile as supplied by the profile service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    /// `persona`, `empresa` or `profesional`
    #[serde(rename = "tipo_cliente", alias = "client_type")]
    pub client_type: Option<String>,
    #[serde(rename = "intereses", alias = "interests")]
    pub interests: Vec<String>,
    /// `bajo`, `medio`, `alto` or `premium`
    #[serde(rename = "presupuesto", alias = "budget")]
    pub budget_band: Option<String>,
    #[serde(rename = "antiguedad_dias", alias = "account_age_days")]
    pub account_age_days: Option<f64>,
}

/// Persisted visual preferences as supplied by the profile service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualPreferences {
    /// `claro`, `oscuro`, `oscuro_premium`, `alto_contraste` or `automatico`
    #[serde(rename = "esquema_colores", alias = "color_scheme")]
    pub color_scheme: Option<String>,
    /// `compacta`, `normal` or `espaciosa`
    #[serde(rename = "densidad", alias = "density")]
    pub density: Option<String>,
    /// `sans`, `serif`, `mono` or `redondeada`
    #[serde(rename = "tipografia", alias = "typography")]
    pub typography: Option<String>,
    /// `ninguna`, `reducida`, `normal` or `completa`
    #[serde(rename = "nivel_animacion", alias = "animation_level")]
    pub animation_level: Option<String>,
    #[serde(rename = "escala_fuente", alias = "font_scale")]
    pub font_scale: Option<f64>,
    /// Priority name -> weight in [0, 1]
    #[serde(rename = "prioridades", alias = "priorities")]
    pub priorities: BTreeMap<String, f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_reads_flat_and_grouped_fields() {
        let payload = json!({
            "viewportWidth": 1920,
            "device": { "viewport_height": "1080", "touch": false },
            "session": { "visits": 3, "referrer": "https://www.google.com/search?q=x" },
            "temporal": { "timestamp": "2024-05-14T14:00:00+02:00" }
        });
        let (ctx, issues) = RawContext::from_json_with_report(&payload);
        assert!(issues.is_empty(), "unexpected issues: {:?}", issues);
        assert_eq!(ctx.viewport_width, Some(1920.0));
        assert_eq!(ctx.viewport_height, Some(1080.0));
        assert_eq!(ctx.touch_capable, Some(false));
        assert_eq!(ctx.visit_count, Some(3.0));
        assert_eq!(
            ctx.local_timestamp.as_deref(),
            Some("2024-05-14T14:00:00+02:00")
        );
    }

    #[test]
    fn test_from_json_drops_wrong_types_with_issues() {
        let payload = json!({
            "viewport_width": "wide",
            "touch_capable": [true],
            "hardware_concurrency": { "cores": 8 },
            "color_scheme": "dark"
        });
        let (ctx, issues) = RawContext::from_json_with_report(&payload);
        assert_eq!(ctx.viewport_width, None);
        assert_eq!(ctx.touch_capable, None);
        assert_eq!(ctx.hardware_concurrency, None);
        assert_eq!(ctx.color_scheme.as_deref(), Some("dark"));
        assert_eq!(issues.len(), 3);
        assert_eq!(issues[0].field, "viewport_width");
        assert_eq!(issues[0].kind, IssueKind::Unparsable);
    }

    #[test]
    fn test_from_json_accepts_epoch_millis() {
        let payload = json!({ "local_timestamp": 1_715_695_200_000_i64 });
        let (ctx, issues) = RawContext::from_json_with_report(&payload);
        assert!(issues.is_empty());
        assert!(ctx
            .local_timestamp
            .as_deref()
            .is_some_and(|ts| ts.starts_with("2024-05-14T14:00:00")));
    }

    #[test]
    fn test_from_json_non_object_is_empty_context() {
        let (ctx, issues) = RawContext::from_json_with_report(&json!([1, 2, 3]));
        assert_eq!(ctx, RawContext::default());
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_profile_accepts_spanish_and_english_keys() {
        let es: UserProfile = serde_json::from_value(json!({
            "tipo_cliente": "persona",
            "intereses": ["tecnologia"],
            "presupuesto": "alto"
        }))
        .unwrap();
        let en: UserProfile = serde_json::from_value(json!({
            "client_type": "persona",
            "interests": ["tecnologia"],
            "budget": "alto"
        }))
        .unwrap();
        assert_eq!(es, en);

        let visual: VisualPreferences =
            serde_json::from_value(json!({ "esquema_colores": "oscuro_premium" })).unwrap();
        assert_eq!(visual.color_scheme.as_deref(), Some("oscuro_premium"));
        assert!(visual.priorities.is_empty());
    }
}
