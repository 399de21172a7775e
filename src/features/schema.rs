// src/features/schema.rs
//! Versioned layout of the 80-wide style feature vector.
//!
//! Each block is declared once in a `feature_block!` table: name, valid range,
//! no-signal default and description. The macro generates a typed index enum
//! (so a profile index can never be used against the automatic block), the
//! fixed-width block struct, and the metadata reported by the CLI. Changing
//! any row's position or default is a breaking change and requires bumping
//! `SCHEMA_VERSION`; cached fingerprints and trained artifacts both depend on
//! it.

use serde::Serialize;
use std::ops::Index;

pub const SCHEMA_VERSION: &str = "style-features/v1";

pub const AUTOMATIC_WIDTH: usize = 45;
pub const PROFILE_WIDTH: usize = 15;
pub const VISUAL_WIDTH: usize = 20;
pub const FEATURE_VECTOR_SIZE: usize = AUTOMATIC_WIDTH + PROFILE_WIDTH + VISUAL_WIDTH;

/// Feature metadata, one row per vector index
#[derive(Debug, Clone, Serialize)]
pub struct FeatureMetadata {
    pub index: usize,
    pub block: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub min_value: f64,
    pub max_value: f64,
    pub default_value: f64,
}

/// A feature enum positioned inside the merged vector.
pub trait FeatureSlot: Copy {
    const OFFSET: usize;

    fn local_index(self) -> usize;

    fn global_index(self) -> usize {
        Self::OFFSET + self.local_index()
    }
}

macro_rules! feature_block {
    (
        $(#[$enum_meta:meta])*
        enum $feature:ident;
        $(#[$block_meta:meta])*
        struct $block:ident;
        block = $block_name:literal, offset = $offset:expr, width = $width:expr;
        $(
            $variant:ident => $name:literal, [$min:expr, $max:expr], default $default:expr, $desc:literal;
        )+
    ) => {
        $(#[$enum_meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(usize)]
        pub enum $feature {
            $($variant),+
        }

        impl $feature {
            pub const WIDTH: usize = $width;
            pub const ALL: [$feature; $width] = [$($feature::$variant),+];

            pub fn name(self) -> &'static str {
                match self {
                    $($feature::$variant => $name),+
                }
            }

            pub fn description(self) -> &'static str {
                match self {
                    $($feature::$variant => $desc),+
                }
            }

            pub fn range(self) -> (f64, f64) {
                match self {
                    $($feature::$variant => ($min, $max)),+
                }
            }

            pub fn default_value(self) -> f64 {
                match self {
                    $($feature::$variant => $default),+
                }
            }
        }

        impl FeatureSlot for $feature {
            const OFFSET: usize = $offset;

            fn local_index(self) -> usize {
                self as usize
            }
        }

        $(#[$block_meta])*
        #[derive(Debug, Clone, Copy, PartialEq)]
        pub struct $block {
            values: [f64; $width],
        }

        impl $block {
            pub const WIDTH: usize = $width;

            /// The block as seen for a caller that supplied no signal at all.
            pub fn defaults() -> Self {
                let mut values = [0.0; $width];
                for feature in $feature::ALL {
                    values[feature as usize] = feature.default_value();
                }
                Self { values }
            }

            /// Stores `value` clamped into the feature's declared range.
            /// Non-finite values leave the no-signal default in place.
            pub fn set(&mut self, feature: $feature, value: f64) {
                let (min, max) = feature.range();
                self.values[feature as usize] = if value.is_finite() {
                    value.clamp(min, max)
                } else {
                    feature.default_value()
                };
            }

            pub fn get(&self, feature: $feature) -> f64 {
                self.values[feature as usize]
            }

            pub fn as_slice(&self) -> &[f64] {
                &self.values
            }

            pub fn metadata() -> Vec<FeatureMetadata> {
                $feature::ALL
                    .iter()
                    .map(|f| {
                        let (min_value, max_value) = f.range();
                        FeatureMetadata {
                            index: f.global_index(),
                            block: $block_name,
                            name: f.name(),
                            description: f.description(),
                            min_value,
                            max_value,
                            default_value: f.default_value(),
                        }
                    })
                    .collect()
            }
        }

        impl Default for $block {
            fn default() -> Self {
                Self::defaults()
            }
        }

        impl Index<$feature> for $block {
            type Output = f64;

            fn index(&self, feature: $feature) -> &f64 {
                &self.values[feature as usize]
            }
        }
    };
}

feature_block! {
    /// Indices 0-44: signals captured from the request itself.
    enum AutomaticFeature;
    /// The 45-wide block built from a `RawContext`.
    struct AutomaticFeatures;
    block = "automatic", offset = 0, width = AUTOMATIC_WIDTH;

    // --- Temporal (0-11) ---
    HourSin => "hour_sin", [-1.0, 1.0], default 0.0, "Sine of local hour over a 24h period.";
    HourCos => "hour_cos", [-1.0, 1.0], default 0.0, "Cosine of local hour over a 24h period.";
    WeekdaySin => "weekday_sin", [-1.0, 1.0], default 0.0, "Sine of weekday (Mon=0) over 7 days.";
    WeekdayCos => "weekday_cos", [-1.0, 1.0], default 0.0, "Cosine of weekday (Mon=0) over 7 days.";
    MonthSin => "month_sin", [-1.0, 1.0], default 0.0, "Sine of month (Jan=0) over 12 months.";
    MonthCos => "month_cos", [-1.0, 1.0], default 0.0, "Cosine of month (Jan=0) over 12 months.";
    IsWeekend => "is_weekend", [0.0, 1.0], default 2.0 / 7.0, "Saturday or Sunday.";
    IsBusinessHours => "is_business_hours", [0.0, 1.0], default 0.375, "Local hour in [9, 18).";
    IsNight => "is_night", [0.0, 1.0], default 1.0 / 3.0, "Local hour >= 22 or < 6.";
    DayOfMonthNorm => "day_of_month_norm", [0.0, 1.0], default 0.5, "(day - 1) / 30.";
    UtcOffsetNorm => "utc_offset_norm", [-1.0, 1.0], default 0.0, "UTC offset in hours / 14.";
    HasLocalTime => "has_local_time", [0.0, 1.0], default 0.0, "A parsable local timestamp was supplied.";

    // --- Device (12-23) ---
    ViewportWidthNorm => "viewport_width_norm", [0.125, 2.0], default 1366.0 / 1920.0, "Viewport width / 1920.";
    ViewportHeightNorm => "viewport_height_norm", [240.0 / 1080.0, 2.0], default 768.0 / 1080.0, "Viewport height / 1080.";
    AspectRatioNorm => "aspect_ratio_norm", [0.0625, 1.0], default (1366.0 / 768.0) / 4.0, "Width / height clamped to [0.25, 4], divided by 4.";
    IsMobileViewport => "is_mobile_viewport", [0.0, 1.0], default 0.0, "Width < 768.";
    IsTabletViewport => "is_tablet_viewport", [0.0, 1.0], default 0.0, "768 <= width < 1024.";
    IsDesktopViewport => "is_desktop_viewport", [0.0, 1.0], default 1.0, "Width >= 1024.";
    IsWideViewport => "is_wide_viewport", [0.0, 1.0], default 0.0, "Width >= 1920.";
    IsPortrait => "is_portrait", [0.0, 1.0], default 0.0, "Height greater than width.";
    TouchCapable => "touch_capable", [0.0, 1.0], default 0.5, "Touch input available; 0.5 when unknown.";
    HardwareConcurrencyNorm => "hardware_concurrency_norm", [0.0, 1.0], default 0.4, "log2(cores clamped to [1, 32]) / 5.";
    DevicePixelRatioNorm => "device_pixel_ratio_norm", [0.125, 1.0], default 0.25, "Device pixel ratio clamped to [0.5, 4], divided by 4.";
    PrefersReducedMotion => "prefers_reduced_motion", [0.0, 1.0], default 0.0, "prefers-reduced-motion: reduce.";

    // --- Network & color scheme (24-30) ---
    ConnectionQuality => "connection_quality", [0.0, 1.0], default 0.75, "Ordinal effective connection type: slow-2g 0 .. 4g 1.";
    DownlinkNorm => "downlink_norm", [0.0, 1.0], default (11.0f64).ln() / (101.0f64).ln(), "ln(1 + Mbps) / ln(101).";
    RttNorm => "rtt_norm", [0.0, 1.0], default 100.0 / 3000.0, "Round-trip time in ms / 3000.";
    SaveData => "save_data", [0.0, 1.0], default 0.0, "Data-saver mode requested.";
    PrefersDark => "prefers_dark", [0.0, 1.0], default 0.0, "prefers-color-scheme: dark.";
    PrefersLight => "prefers_light", [0.0, 1.0], default 0.0, "prefers-color-scheme: light.";
    ColorSchemeUnknown => "color_scheme_unknown", [0.0, 1.0], default 1.0, "No usable color-scheme preference.";

    // --- Session & social (31-44) ---
    ReferrerDirect => "referrer_direct", [0.0, 1.0], default 1.0, "No referrer.";
    ReferrerSearch => "referrer_search", [0.0, 1.0], default 0.0, "Referred by a search engine.";
    ReferrerSocial => "referrer_social", [0.0, 1.0], default 0.0, "Referred by a social network.";
    ReferrerEmail => "referrer_email", [0.0, 1.0], default 0.0, "Referred by a webmail client.";
    ReferrerInternal => "referrer_internal", [0.0, 1.0], default 0.0, "Referred from the same site.";
    ReferrerOther => "referrer_other", [0.0, 1.0], default 0.0, "Any other or unparsable referrer.";
    VisitCountNorm => "visit_count_norm", [0.0, 1.0], default (2.0f64).ln() / (101.0f64).ln(), "ln(1 + visits) / ln(101), visits clamped to [1, 100].";
    IsFirstVisit => "is_first_visit", [0.0, 1.0], default 1.0, "First recorded visit.";
    IsFrequentVisitor => "is_frequent_visitor", [0.0, 1.0], default 0.0, "Five or more visits.";
    EntryHome => "entry_home", [0.0, 1.0], default 0.0, "Landed on the home page.";
    EntryProduct => "entry_product", [0.0, 1.0], default 0.0, "Landed on a product page.";
    EntryCatalog => "entry_catalog", [0.0, 1.0], default 0.0, "Landed on a listing, category or search page.";
    EntryContent => "entry_content", [0.0, 1.0], default 0.0, "Landed on editorial content.";
    EntryCheckout => "entry_checkout", [0.0, 1.0], default 0.0, "Landed on cart or checkout.";
}

feature_block! {
    /// Indices 45-59: signals from the persisted customer profile.
    enum ProfileFeature;
    /// The 15-wide block built from a `UserProfile`.
    struct ProfileFeatures;
    block = "profile", offset = AUTOMATIC_WIDTH, width = PROFILE_WIDTH;

    ClientPersona => "client_persona", [0.0, 1.0], default 0.0, "Individual customer.";
    ClientEmpresa => "client_empresa", [0.0, 1.0], default 0.0, "Business customer.";
    ClientProfesional => "client_profesional", [0.0, 1.0], default 0.0, "Professional / freelance customer.";
    BudgetLevel => "budget_level", [0.0, 1.0], default 0.5, "Budget band: bajo 0, medio 1/3, alto 2/3, premium 1.";
    InterestTecnologia => "interest_tecnologia", [0.0, 1.0], default 0.0, "Interested in technology.";
    InterestModa => "interest_moda", [0.0, 1.0], default 0.0, "Interested in fashion.";
    InterestHogar => "interest_hogar", [0.0, 1.0], default 0.0, "Interested in home.";
    InterestDeportes => "interest_deportes", [0.0, 1.0], default 0.0, "Interested in sports.";
    InterestViajes => "interest_viajes", [0.0, 1.0], default 0.0, "Interested in travel.";
    InterestGastronomia => "interest_gastronomia", [0.0, 1.0], default 0.0, "Interested in food.";
    InterestFinanzas => "interest_finanzas", [0.0, 1.0], default 0.0, "Interested in finance.";
    InterestEntretenimiento => "interest_entretenimiento", [0.0, 1.0], default 0.0, "Interested in entertainment.";
    InterestBreadth => "interest_breadth", [0.0, 1.0], default 0.0, "Recognised interests / 8.";
    ProfileCompleteness => "profile_completeness", [0.0, 1.0], default 0.0, "Populated profile fields / 4.";
    AccountAgeNorm => "account_age_norm", [0.0, 1.0], default 0.0, "ln(1 + account age in days) / ln(3651).";
}

feature_block! {
    /// Indices 60-79: signals from persisted visual preferences.
    enum VisualFeature;
    /// The 20-wide block built from `VisualPreferences`.
    struct VisualFeatures;
    block = "visual", offset = AUTOMATIC_WIDTH + PROFILE_WIDTH, width = VISUAL_WIDTH;

    SchemeClaro => "scheme_claro", [0.0, 1.0], default 0.0, "Light color scheme.";
    SchemeOscuro => "scheme_oscuro", [0.0, 1.0], default 0.0, "Dark color scheme.";
    SchemeOscuroPremium => "scheme_oscuro_premium", [0.0, 1.0], default 0.0, "Premium dark color scheme.";
    SchemeAltoContraste => "scheme_alto_contraste", [0.0, 1.0], default 0.0, "High-contrast color scheme.";
    SchemeAutomatico => "scheme_automatico", [0.0, 1.0], default 0.0, "Follow the system color scheme.";
    DensityLevel => "density_level", [0.0, 1.0], default 0.5, "compacta 0, normal 0.5, espaciosa 1.";
    TypographySans => "typography_sans", [0.0, 1.0], default 0.0, "Sans-serif typography.";
    TypographySerif => "typography_serif", [0.0, 1.0], default 0.0, "Serif typography.";
    TypographyMono => "typography_mono", [0.0, 1.0], default 0.0, "Monospace typography.";
    TypographyRedondeada => "typography_redondeada", [0.0, 1.0], default 0.0, "Rounded typography.";
    AnimationLevel => "animation_level", [0.0, 1.0], default 2.0 / 3.0, "ninguna 0, reducida 1/3, normal 2/3, completa 1.";
    FontScaleNorm => "font_scale_norm", [0.0, 1.0], default 0.2 / 0.7, "(font scale clamped to [0.8, 1.5] - 0.8) / 0.7.";
    PriorityPrecio => "priority_precio", [0.0, 1.0], default 0.5, "Weight given to price.";
    PriorityCalidad => "priority_calidad", [0.0, 1.0], default 0.5, "Weight given to quality.";
    PriorityRapidez => "priority_rapidez", [0.0, 1.0], default 0.5, "Weight given to speed.";
    PriorityEstetica => "priority_estetica", [0.0, 1.0], default 0.5, "Weight given to aesthetics.";
    PriorityAccesibilidad => "priority_accesibilidad", [0.0, 1.0], default 0.5, "Weight given to accessibility.";
    PrioritySostenibilidad => "priority_sostenibilidad", [0.0, 1.0], default 0.5, "Weight given to sustainability.";
    PriorityConcentration => "priority_concentration", [0.0, 1.0], default 1.0 / 6.0, "Largest priority weight / sum of weights.";
    PreferencesSet => "preferences_set", [0.0, 1.0], default 0.0, "Visual preferences were supplied.";
}

const _: () = assert!(<ProfileFeature as FeatureSlot>::OFFSET == AutomaticFeature::WIDTH);
const _: () = assert!(
    <VisualFeature as FeatureSlot>::OFFSET == AutomaticFeature::WIDTH + ProfileFeature::WIDTH
);
const _: () = assert!(
    AutomaticFeature::WIDTH + ProfileFeature::WIDTH + VisualFeature::WIDTH == FEATURE_VECTOR_SIZE
);

/// The merged model input. Only the merger builds one, so its layout always
/// follows the schema above.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    values: [f64; FEATURE_VECTOR_SIZE],
}

impl FeatureVector {
    pub const LEN: usize = FEATURE_VECTOR_SIZE;

    pub(crate) fn from_blocks(
        automatic: &AutomaticFeatures,
        profile: &ProfileFeatures,
        visual: &VisualFeatures,
    ) -> Self {
        let mut values = [0.0; FEATURE_VECTOR_SIZE];
        values[..AUTOMATIC_WIDTH].copy_from_slice(automatic.as_slice());
        values[AUTOMATIC_WIDTH..AUTOMATIC_WIDTH + PROFILE_WIDTH]
            .copy_from_slice(profile.as_slice());
        values[AUTOMATIC_WIDTH + PROFILE_WIDTH..].copy_from_slice(visual.as_slice());
        Self { values }
    }

    pub fn get<F: FeatureSlot>(&self, feature: F) -> f64 {
        self.values[feature.global_index()]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        FEATURE_VECTOR_SIZE
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn profile_block(&self) -> &[f64] {
        &self.values[AUTOMATIC_WIDTH..AUTOMATIC_WIDTH + PROFILE_WIDTH]
    }

    pub fn visual_block(&self) -> &[f64] {
        &self.values[AUTOMATIC_WIDTH + PROFILE_WIDTH..]
    }
}

impl<F: FeatureSlot> Index<F> for FeatureVector {
    type Output = f64;

    fn index(&self, feature: F) -> &f64 {
        &self.values[feature.global_index()]
    }
}

/// Metadata for all 80 indices in vector order.
pub fn get_feature_metadata() -> Vec<FeatureMetadata> {
    let mut metadata = AutomaticFeatures::metadata();
    metadata.extend(ProfileFeatures::metadata());
    metadata.extend(VisualFeatures::metadata());
    metadata
}
