// src/features/visual_features.rs
use log::debug;

use super::profile_features::normalize_token;
use super::schema::{VisualFeature as V, VisualFeatures};
use crate::models::VisualPreferences;

const PRIORITY_SLOTS: [(V, &[&str]); 6] = [
    (V::PriorityPrecio, &["precio", "price"]),
    (V::PriorityCalidad, &["calidad", "quality"]),
    (V::PriorityRapidez, &["rapidez", "velocidad", "speed"]),
    (V::PriorityEstetica, &["estetica", "aesthetics", "diseno"]),
    (V::PriorityAccesibilidad, &["accesibilidad", "accessibility"]),
    (V::PrioritySostenibilidad, &["sostenibilidad", "sustainability"]),
];

fn scheme_slot(token: &str) -> Option<V> {
    match token {
        "claro" | "light" => Some(V::SchemeClaro),
        "oscuro" | "dark" => Some(V::SchemeOscuro),
        "oscuro_premium" | "dark_premium" => Some(V::SchemeOscuroPremium),
        "alto_contraste" | "high_contrast" => Some(V::SchemeAltoContraste),
        "automatico" | "auto" | "system" => Some(V::SchemeAutomatico),
        _ => None,
    }
}

fn typography_slot(token: &str) -> Option<V> {
    match token {
        "sans" | "sans_serif" => Some(V::TypographySans),
        "serif" => Some(V::TypographySerif),
        "mono" | "monospace" => Some(V::TypographyMono),
        "redondeada" | "rounded" => Some(V::TypographyRedondeada),
        _ => None,
    }
}

/// Encodes persisted visual preferences into the 20-wide visual block.
pub fn encode_visual(preferences: &VisualPreferences) -> VisualFeatures {
    let mut features = VisualFeatures::defaults();
    features.set(V::PreferencesSet, 1.0);

    if let Some(scheme) = preferences.color_scheme.as_deref() {
        match scheme_slot(&normalize_token(scheme)) {
            Some(slot) => features.set(slot, 1.0),
            None => debug!("Visual encoder: unknown color scheme {:?}", scheme),
        }
    }

    if let Some(density) = preferences.density.as_deref() {
        let level = match normalize_token(density).as_str() {
            "compacta" | "compact" => Some(0.0),
            "normal" => Some(0.5),
            "espaciosa" | "spacious" => Some(1.0),
            _ => None,
        };
        match level {
            Some(level) => features.set(V::DensityLevel, level),
            None => debug!("Visual encoder: unknown density {:?}", density),
        }
    }

    if let Some(typography) = preferences.typography.as_deref() {
        match typography_slot(&normalize_token(typography)) {
            Some(slot) => features.set(slot, 1.0),
            None => debug!("Visual encoder: unknown typography {:?}", typography),
        }
    }

    if let Some(animation) = preferences.animation_level.as_deref() {
        let level = match normalize_token(animation).as_str() {
            "ninguna" | "none" => Some(0.0),
            "reducida" | "reduced" => Some(1.0 / 3.0),
            "normal" => Some(2.0 / 3.0),
            "completa" | "full" => Some(1.0),
            _ => None,
        };
        match level {
            Some(level) => features.set(V::AnimationLevel, level),
            None => debug!("Visual encoder: unknown animation level {:?}", animation),
        }
    }

    if let Some(scale) = preferences.font_scale.filter(|s| s.is_finite()) {
        features.set(V::FontScaleNorm, (scale.clamp(0.8, 1.5) - 0.8) / 0.7);
    }

    if !preferences.priorities.is_empty() {
        let mut weights = [0.5f64; 6];
        for (name, weight) in &preferences.priorities {
            let token = normalize_token(name);
            match PRIORITY_SLOTS
                .iter()
                .position(|(_, aliases)| aliases.contains(&token.as_str()))
            {
                Some(i) if weight.is_finite() => weights[i] = (*weight).clamp(0.0, 1.0),
                Some(_) => debug!("Visual encoder: non-finite weight for {:?}", name),
                None => debug!("Visual encoder: unknown priority {:?}", name),
            }
        }
        for ((slot, _), weight) in PRIORITY_SLOTS.iter().zip(weights.iter()) {
            features.set(*slot, *weight);
        }
        let total: f64 = weights.iter().sum();
        let largest = weights.iter().cloned().fold(0.0, f64::max);
        let concentration = if total > 0.0 { largest / total } else { 1.0 / 6.0 };
        features.set(V::PriorityConcentration, concentration);
    }

    features
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_dark_premium_preferences() {
        let mut priorities = BTreeMap::new();
        priorities.insert("Estética".to_string(), 1.0);
        priorities.insert("precio".to_string(), 0.2);
        let preferences = VisualPreferences {
            color_scheme: Some("oscuro_premium".to_string()),
            density: Some("espaciosa".to_string()),
            typography: Some("Serif".to_string()),
            animation_level: Some("reducida".to_string()),
            font_scale: Some(1.15),
            priorities,
        };
        let features = encode_visual(&preferences);
        assert_eq!(features[V::SchemeOscuroPremium], 1.0);
        assert_eq!(features[V::SchemeOscuro], 0.0);
        assert_eq!(features[V::DensityLevel], 1.0);
        assert_eq!(features[V::TypographySerif], 1.0);
        assert!((features[V::AnimationLevel] - 1.0 / 3.0).abs() < 1e-12);
        assert!((features[V::FontScaleNorm] - 0.5).abs() < 1e-12);
        assert_eq!(features[V::PriorityEstetica], 1.0);
        assert_eq!(features[V::PriorityPrecio], 0.2);
        assert_eq!(features[V::PriorityCalidad], 0.5);
        // 1.0 / (1.0 + 0.2 + 4 * 0.5)
        assert!((features[V::PriorityConcentration] - 1.0 / 3.2).abs() < 1e-12);
        assert_eq!(features[V::PreferencesSet], 1.0);
    }

    #[test]
    fn test_empty_preferences_differ_from_anonymous_only_by_flag() {
        let features = encode_visual(&VisualPreferences::default());
        let defaults = VisualFeatures::defaults();
        for feature in V::ALL {
            if feature == V::PreferencesSet {
                assert_eq!(features[feature], 1.0);
            } else {
                assert_eq!(features[feature], defaults[feature], "{}", feature.name());
            }
        }
    }
}
