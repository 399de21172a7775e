// src/features/profile_features.rs
use log::debug;

use super::schema::{ProfileFeature as P, ProfileFeatures};
use crate::models::UserProfile;

const INTEREST_SLOTS: [(P, &[&str]); 8] = [
    (P::InterestTecnologia, &["tecnologia", "technology", "tech"]),
    (P::InterestModa, &["moda", "fashion"]),
    (P::InterestHogar, &["hogar", "home", "decoracion"]),
    (P::InterestDeportes, &["deportes", "deporte", "sports"]),
    (P::InterestViajes, &["viajes", "viaje", "travel"]),
    (P::InterestGastronomia, &["gastronomia", "comida", "food"]),
    (P::InterestFinanzas, &["finanzas", "finance"]),
    (P::InterestEntretenimiento, &["entretenimiento", "ocio", "entertainment"]),
];

/// Lowercases, strips Spanish diacritics and joins words with underscores so
/// "Oscuro Premium", "oscuro-premium" and "oscuro_premium" compare equal.
pub fn normalize_token(raw: &str) -> String {
    raw.trim()
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            ' ' | '-' => '_',
            other => other,
        })
        .collect()
}

fn budget_level(band: &str) -> Option<f64> {
    match normalize_token(band).as_str() {
        "bajo" | "low" => Some(0.0),
        "medio" | "medium" => Some(1.0 / 3.0),
        "alto" | "high" => Some(2.0 / 3.0),
        "premium" => Some(1.0),
        _ => None,
    }
}

/// Encodes a persisted profile into the 15-wide profile block.
pub fn encode_profile(profile: &UserProfile) -> ProfileFeatures {
    let mut features = ProfileFeatures::defaults();

    if let Some(client_type) = profile.client_type.as_deref() {
        match normalize_token(client_type).as_str() {
            "persona" | "individual" | "particular" => features.set(P::ClientPersona, 1.0),
            "empresa" | "business" | "company" => features.set(P::ClientEmpresa, 1.0),
            "profesional" | "professional" | "autonomo" => {
                features.set(P::ClientProfesional, 1.0)
            }
            other => debug!("Profile encoder: unknown client type {:?}", other),
        }
    }

    if let Some(band) = profile.budget_band.as_deref() {
        match budget_level(band) {
            Some(level) => features.set(P::BudgetLevel, level),
            None => debug!("Profile encoder: unknown budget band {:?}", band),
        }
    }

    let mut matched = 0usize;
    for (slot, aliases) in INTEREST_SLOTS.iter() {
        let present = profile
            .interests
            .iter()
            .any(|interest| aliases.contains(&normalize_token(interest).as_str()));
        if present {
            features.set(*slot, 1.0);
            matched += 1;
        }
    }
    features.set(P::InterestBreadth, matched as f64 / INTEREST_SLOTS.len() as f64);

    let populated = [
        profile.client_type.is_some(),
        !profile.interests.is_empty(),
        profile.budget_band.is_some(),
        profile.account_age_days.is_some(),
    ]
    .iter()
    .filter(|set| **set)
    .count();
    features.set(P::ProfileCompleteness, populated as f64 / 4.0);

    if let Some(days) = profile.account_age_days.filter(|d| d.is_finite()) {
        let days = days.clamp(0.0, 3650.0);
        features.set(P::AccountAgeNorm, (1.0 + days).ln() / (3651.0f64).ln());
    }

    features
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_token() {
        assert_eq!(normalize_token("  Tecnología "), "tecnologia");
        assert_eq!(normalize_token("Oscuro Premium"), "oscuro_premium");
        assert_eq!(normalize_token("alto-contraste"), "alto_contraste");
    }

    #[test]
    fn test_persona_profile_encoding() {
        let profile = UserProfile {
            client_type: Some("persona".to_string()),
            interests: vec![
                "Tecnología".to_string(),
                "viajes".to_string(),
                "astrologia".to_string(),
            ],
            budget_band: Some("alto".to_string()),
            account_age_days: Some(3650.0),
        };
        let features = encode_profile(&profile);
        assert_eq!(features[P::ClientPersona], 1.0);
        assert_eq!(features[P::ClientEmpresa], 0.0);
        assert!((features[P::BudgetLevel] - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(features[P::InterestTecnologia], 1.0);
        assert_eq!(features[P::InterestViajes], 1.0);
        assert_eq!(features[P::InterestModa], 0.0);
        assert_eq!(features[P::InterestBreadth], 0.25);
        assert_eq!(features[P::ProfileCompleteness], 1.0);
        assert!((features[P::AccountAgeNorm] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_profile_matches_anonymous_defaults() {
        assert_eq!(
            encode_profile(&UserProfile::default()),
            ProfileFeatures::defaults()
        );
    }
}
