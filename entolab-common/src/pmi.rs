//! PMI estimation via thermal summation
//!
//! Estimates the Post-Mortem Interval from the developmentally most advanced
//! insect life stage observed on the remains and the accumulated degree-hours
//! (ADH) that stage requires at the scene's ambient temperature.
//!
//! # Model
//!
//! Insect development rate is roughly linear in temperature above a
//! species-specific developmental-zero ("base") temperature. Each life stage
//! transition requires a fixed quantity of accumulated degree-hours:
//!
//! ```text
//! ADH = hours * (ambient_temp - base_temp)
//! ```
//!
//! Observing a specimen in stage S therefore bounds the elapsed time to the
//! half-open interval `[ADH_to_reach(S), ADH_to_reach(next(S))) / effective`,
//! where `effective = ambient_temp - base_temp`.
//!
//! # Pure Functions
//!
//! This module contains only pure, synchronous functions. No database or
//! HTTP framework dependencies.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ========================================
// Life stages
// ========================================

/// Necrophagous insect life stage, ordered by developmental progress.
///
/// The derived `Ord` follows development order, so the "oldest" stage in a
/// collection of detections is simply the maximum.
///
/// # Examples
///
/// ```
/// use entolab_common::pmi::LifeStage;
///
/// assert!(LifeStage::Egg < LifeStage::Instar3);
/// assert!(LifeStage::Pupa < LifeStage::Adult);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifeStage {
    Egg,
    #[serde(rename = "instar_1")]
    Instar1,
    #[serde(rename = "instar_2")]
    Instar2,
    #[serde(rename = "instar_3")]
    Instar3,
    Pupa,
    Adult,
}

impl LifeStage {
    /// All stages in development order
    pub const ALL: [LifeStage; 6] = [
        LifeStage::Egg,
        LifeStage::Instar1,
        LifeStage::Instar2,
        LifeStage::Instar3,
        LifeStage::Pupa,
        LifeStage::Adult,
    ];

    /// The next development stage, or `None` for the final (adult) stage
    pub fn next(&self) -> Option<LifeStage> {
        let idx = Self::ALL.iter().position(|s| s == self)?;
        Self::ALL.get(idx + 1).copied()
    }

    /// Stable string form used in database columns and API payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            LifeStage::Egg => "egg",
            LifeStage::Instar1 => "instar_1",
            LifeStage::Instar2 => "instar_2",
            LifeStage::Instar3 => "instar_3",
            LifeStage::Pupa => "pupa",
            LifeStage::Adult => "adult",
        }
    }

    /// Parse from the stable string form
    pub fn parse(s: &str) -> Option<LifeStage> {
        match s {
            "egg" => Some(LifeStage::Egg),
            "instar_1" => Some(LifeStage::Instar1),
            "instar_2" => Some(LifeStage::Instar2),
            "instar_3" => Some(LifeStage::Instar3),
            "pupa" => Some(LifeStage::Pupa),
            "adult" => Some(LifeStage::Adult),
            _ => None,
        }
    }
}

// ========================================
// Species development data
// ========================================

/// Forensically significant blow fly species with built-in development data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Species {
    LuciliaSericata,
    CalliphoraVicina,
    ChrysomyaMegacephala,
}

impl Species {
    /// All species with built-in development tables
    pub const ALL: [Species; 3] = [
        Species::LuciliaSericata,
        Species::CalliphoraVicina,
        Species::ChrysomyaMegacephala,
    ];

    /// Stable string form used in database columns and API payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Species::LuciliaSericata => "lucilia_sericata",
            Species::CalliphoraVicina => "calliphora_vicina",
            Species::ChrysomyaMegacephala => "chrysomya_megacephala",
        }
    }

    /// Parse from the stable string form; unknown species return `None`
    pub fn parse(s: &str) -> Option<Species> {
        match s {
            "lucilia_sericata" => Some(Species::LuciliaSericata),
            "calliphora_vicina" => Some(Species::CalliphoraVicina),
            "chrysomya_megacephala" => Some(Species::ChrysomyaMegacephala),
            _ => None,
        }
    }

    /// Developmental-zero (base) temperature in °C
    pub fn base_temp_c(&self) -> f64 {
        match self {
            Species::LuciliaSericata => 9.0,
            Species::CalliphoraVicina => 6.0,
            Species::ChrysomyaMegacephala => 10.0,
        }
    }

    /// Accumulated degree-hours (above base) required to reach a stage.
    ///
    /// Zero for the egg stage (deposition). Values are laboratory means at
    /// constant rearing temperatures from the forensic entomology
    /// literature, rounded to whole degree-hours.
    pub fn adh_to_reach(&self, stage: LifeStage) -> f64 {
        match self {
            Species::LuciliaSericata => match stage {
                LifeStage::Egg => 0.0,
                LifeStage::Instar1 => 270.0,
                LifeStage::Instar2 => 510.0,
                LifeStage::Instar3 => 850.0,
                LifeStage::Pupa => 2160.0,
                LifeStage::Adult => 3770.0,
            },
            Species::CalliphoraVicina => match stage {
                LifeStage::Egg => 0.0,
                LifeStage::Instar1 => 350.0,
                LifeStage::Instar2 => 700.0,
                LifeStage::Instar3 => 1200.0,
                LifeStage::Pupa => 3000.0,
                LifeStage::Adult => 5300.0,
            },
            Species::ChrysomyaMegacephala => match stage {
                LifeStage::Egg => 0.0,
                LifeStage::Instar1 => 240.0,
                LifeStage::Instar2 => 450.0,
                LifeStage::Instar3 => 750.0,
                LifeStage::Pupa => 1900.0,
                LifeStage::Adult => 3300.0,
            },
        }
    }
}

// ========================================
// Estimation
// ========================================

/// PMI estimation errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PmiError {
    /// Ambient temperature at or below the developmental-zero temperature:
    /// no degree-hours accumulate and the model gives no estimate
    #[error("Ambient temperature {ambient_c}°C is at or below the base temperature {base_c}°C")]
    BelowBaseTemperature { ambient_c: f64, base_c: f64 },
}

/// PMI estimate as a half-open interval in hours
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PmiEstimate {
    /// Minimum hours since colonization
    pub min_hours: f64,
    /// Maximum hours since colonization; `None` when the observed stage is
    /// terminal (adult) and the model gives no upper bound
    pub max_hours: Option<f64>,
    /// The observed (oldest) life stage the estimate is based on
    pub stage: LifeStage,
    /// Species the development data came from; `None` when the conservative
    /// cross-species fallback was used
    pub species: Option<Species>,
    /// Ambient temperature the estimate was computed at
    pub ambient_temp_c: f64,
}

/// Estimate PMI for an observed stage of a known species.
///
/// # Examples
///
/// ```
/// use entolab_common::pmi::{estimate_for_species, LifeStage, Species};
///
/// let est = estimate_for_species(Species::LuciliaSericata, LifeStage::Instar2, 25.0).unwrap();
/// // 510 ADH at 16°C effective: ~31.9 hours minimum
/// assert!((est.min_hours - 510.0 / 16.0).abs() < 1e-9);
/// assert!(est.max_hours.unwrap() > est.min_hours);
/// ```
pub fn estimate_for_species(
    species: Species,
    stage: LifeStage,
    ambient_temp_c: f64,
) -> Result<PmiEstimate, PmiError> {
    let base_c = species.base_temp_c();
    let effective = ambient_temp_c - base_c;
    if effective <= 0.0 {
        return Err(PmiError::BelowBaseTemperature {
            ambient_c: ambient_temp_c,
            base_c,
        });
    }

    let min_hours = species.adh_to_reach(stage) / effective;
    let max_hours = stage
        .next()
        .map(|next| species.adh_to_reach(next) / effective);

    Ok(PmiEstimate {
        min_hours,
        max_hours,
        stage,
        species: Some(species),
        ambient_temp_c,
    })
}

/// Estimate PMI, falling back to the most conservative interval across the
/// built-in development table when the species is unknown.
///
/// The fallback takes the smallest lower bound and the largest upper bound
/// over all species whose base temperature lies below the ambient
/// temperature. If none does, the error reports the lowest base in the
/// table.
pub fn estimate(
    species: Option<Species>,
    stage: LifeStage,
    ambient_temp_c: f64,
) -> Result<PmiEstimate, PmiError> {
    if let Some(species) = species {
        return estimate_for_species(species, stage, ambient_temp_c);
    }

    let mut min_hours: Option<f64> = None;
    let mut max_hours: Option<f64> = None;
    let mut any_viable = false;

    for candidate in Species::ALL {
        match estimate_for_species(candidate, stage, ambient_temp_c) {
            Ok(est) => {
                any_viable = true;
                min_hours = Some(match min_hours {
                    Some(m) => m.min(est.min_hours),
                    None => est.min_hours,
                });
                if let Some(upper) = est.max_hours {
                    max_hours = Some(match max_hours {
                        Some(m) => m.max(upper),
                        None => upper,
                    });
                }
            }
            Err(PmiError::BelowBaseTemperature { .. }) => continue,
        }
    }

    if !any_viable {
        let lowest_base = Species::ALL
            .iter()
            .map(|s| s.base_temp_c())
            .fold(f64::INFINITY, f64::min);
        return Err(PmiError::BelowBaseTemperature {
            ambient_c: ambient_temp_c,
            base_c: lowest_base,
        });
    }

    Ok(PmiEstimate {
        min_hours: min_hours.unwrap_or(0.0),
        max_hours: if stage.next().is_some() {
            max_hours
        } else {
            None
        },
        stage,
        species: None,
        ambient_temp_c,
    })
}

// ========================================
// Tests
// ========================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_ordering_follows_development() {
        assert!(LifeStage::Egg < LifeStage::Instar1);
        assert!(LifeStage::Instar1 < LifeStage::Instar2);
        assert!(LifeStage::Instar2 < LifeStage::Instar3);
        assert!(LifeStage::Instar3 < LifeStage::Pupa);
        assert!(LifeStage::Pupa < LifeStage::Adult);

        // Oldest stage is the maximum
        let stages = [LifeStage::Instar2, LifeStage::Egg, LifeStage::Pupa];
        assert_eq!(stages.iter().max(), Some(&LifeStage::Pupa));
    }

    #[test]
    fn test_stage_string_roundtrip() {
        for stage in LifeStage::ALL {
            assert_eq!(LifeStage::parse(stage.as_str()), Some(stage));
        }
        assert_eq!(LifeStage::parse("maggot"), None);
    }

    #[test]
    fn test_species_string_roundtrip() {
        for species in Species::ALL {
            assert_eq!(Species::parse(species.as_str()), Some(species));
        }
        assert_eq!(Species::parse("musca_domestica"), None);
    }

    #[test]
    fn test_adh_tables_monotonic() {
        // Development only accumulates; each stage requires strictly more
        // degree-hours than the one before it.
        for species in Species::ALL {
            let mut prev = -1.0;
            for stage in LifeStage::ALL {
                let adh = species.adh_to_reach(stage);
                assert!(adh > prev, "{:?} table not monotonic at {:?}", species, stage);
                prev = adh;
            }
        }
    }

    #[test]
    fn test_estimate_known_species_interval() {
        let est =
            estimate_for_species(Species::LuciliaSericata, LifeStage::Instar3, 25.0).unwrap();
        let effective = 25.0 - 9.0;
        assert!((est.min_hours - 850.0 / effective).abs() < 1e-9);
        assert!((est.max_hours.unwrap() - 2160.0 / effective).abs() < 1e-9);
        assert_eq!(est.species, Some(Species::LuciliaSericata));
    }

    #[test]
    fn test_estimate_egg_has_zero_lower_bound() {
        let est = estimate_for_species(Species::CalliphoraVicina, LifeStage::Egg, 20.0).unwrap();
        assert_eq!(est.min_hours, 0.0);
        assert!((est.max_hours.unwrap() - 350.0 / 14.0).abs() < 1e-9);
    }

    #[test]
    fn test_estimate_adult_has_open_upper_bound() {
        let est = estimate_for_species(Species::LuciliaSericata, LifeStage::Adult, 25.0).unwrap();
        assert!(est.min_hours > 0.0);
        assert_eq!(est.max_hours, None);
    }

    #[test]
    fn test_estimate_below_base_temperature_rejected() {
        let err = estimate_for_species(Species::ChrysomyaMegacephala, LifeStage::Pupa, 10.0)
            .unwrap_err();
        assert_eq!(
            err,
            PmiError::BelowBaseTemperature {
                ambient_c: 10.0,
                base_c: 10.0
            }
        );
    }

    #[test]
    fn test_unknown_species_conservative_interval() {
        let est = estimate(None, LifeStage::Instar2, 25.0).unwrap();

        // Lower bound: smallest across the table
        let expected_min = Species::ALL
            .iter()
            .map(|s| s.adh_to_reach(LifeStage::Instar2) / (25.0 - s.base_temp_c()))
            .fold(f64::INFINITY, f64::min);
        assert!((est.min_hours - expected_min).abs() < 1e-9);

        // Upper bound: largest across the table
        let expected_max = Species::ALL
            .iter()
            .map(|s| s.adh_to_reach(LifeStage::Instar3) / (25.0 - s.base_temp_c()))
            .fold(f64::NEG_INFINITY, f64::max);
        assert!((est.max_hours.unwrap() - expected_max).abs() < 1e-9);

        assert_eq!(est.species, None);
    }

    #[test]
    fn test_unknown_species_skips_nonviable_bases() {
        // 9.5°C is above Calliphora vicina's base (6.0) but below the other
        // two; the fallback must still produce an estimate from the viable
        // species alone.
        let est = estimate(None, LifeStage::Instar1, 9.5).unwrap();
        let effective = 9.5 - 6.0;
        assert!((est.min_hours - 350.0 / effective).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_species_all_below_base_rejected() {
        let err = estimate(None, LifeStage::Instar1, 5.0).unwrap_err();
        assert_eq!(
            err,
            PmiError::BelowBaseTemperature {
                ambient_c: 5.0,
                base_c: 6.0
            }
        );
    }
}
