//! Katalog der empfehlbaren Interventionen.
//!
//! Der globale Aktionsraum ist in vier aufeinanderfolgende, disjunkte Bereiche
//! unterteilt (Nährstoffe, Bewegung, Schlaf, Lebensstil). Der [`ActionCatalog`]
//! übersetzt zwischen einem flachen globalen Index und dem Paar
//! (Kategorie, lokale Kennung).

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

use crate::config::ActionSpaceConfig;
use crate::error::{CoreError, Result};

/// Die vier sich gegenseitig ausschließenden Arten von Empfehlungen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionCategory {
    Nutrient,
    Exercise,
    Sleep,
    Lifestyle,
}

impl ActionCategory {
    /// Kategorien in Katalogreihenfolge.
    pub const ALL: [ActionCategory; 4] = [
        ActionCategory::Nutrient,
        ActionCategory::Exercise,
        ActionCategory::Sleep,
        ActionCategory::Lifestyle,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ActionCategory::Nutrient => "nutrient",
            ActionCategory::Exercise => "exercise",
            ActionCategory::Sleep => "sleep",
            ActionCategory::Lifestyle => "lifestyle",
        }
    }

    fn position(self) -> usize {
        match self {
            ActionCategory::Nutrient => 0,
            ActionCategory::Exercise => 1,
            ActionCategory::Sleep => 2,
            ActionCategory::Lifestyle => 3,
        }
    }
}

impl fmt::Display for ActionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Eine konkrete Empfehlung. Kategorie und `local_id` bestimmen eindeutig
/// einen globalen Index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub category: ActionCategory,
    pub local_id: usize,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dosage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<String>,
    /// Vertrauen in die Empfehlung, 0.0 bis 1.0.
    pub confidence: f32,
    #[serde(default)]
    pub reasoning: String,
}

impl Action {
    #[must_use]
    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }
}

// (name, dosage, frequency, timing)
const NUTRIENT_CATALOG: &[(&str, &str, &str, &str)] = &[
    ("Magnesium Glycinate", "300mg", "daily", "before_bed"),
    ("Zinc Chelate", "15mg", "daily", "with_meal"),
    ("Omega-3 EPA/DHA", "1000mg", "daily", "with_meal"),
    ("Vitamin D3", "2000IU", "daily", "morning"),
    ("Vitamin B Complex", "1 tablet", "daily", "morning"),
    ("Coenzyme Q10", "100mg", "daily", "with_meal"),
    ("Probiotics", "10B CFU", "daily", "empty_stomach"),
    ("Iron Bisglycinate", "25mg", "daily", "empty_stomach"),
    ("Curcumin", "500mg", "twice_daily", "with_meal"),
    ("Ashwagandha", "300mg", "twice_daily", "any_time"),
];

// (name, duration, frequency)
const EXERCISE_CATALOG: &[(&str, &str, &str)] = &[
    ("Yoga", "30min", "daily"),
    ("HIIT", "20min", "3x_week"),
    ("Walking", "45min", "daily"),
    ("Swimming", "30min", "3x_week"),
    ("Strength Training", "45min", "3x_week"),
    ("Cycling", "30min", "daily"),
    ("Stretching", "15min", "daily"),
    ("Meditation", "20min", "daily"),
];

const NUTRIENT_REASONING: &[&str] = &[
    "Based on your unique signal pattern, your absorption of this nutrient is optimal.",
    "Your recent biomarkers suggest a deficiency that this can address.",
    "Users with similar patterns saw significant improvement with this recommendation.",
];

const EXERCISE_REASONING: &[&str] = &[
    "Your Lactate Recovery Curve suggests you respond better to this exercise type.",
    "This activity level matches your current energy state from the signals.",
    "Pattern matching shows this exercise type improves your specific markers.",
];

const GENERIC_REASONING: &str = "Based on your bio-signal analysis.";

/// Wählt eine menschenlesbare Begründung für eine Kategorie.
pub fn reasoning_for<R: Rng + ?Sized>(category: ActionCategory, rng: &mut R) -> &'static str {
    let options = match category {
        ActionCategory::Nutrient => NUTRIENT_REASONING,
        ActionCategory::Exercise => EXERCISE_REASONING,
        ActionCategory::Sleep | ActionCategory::Lifestyle => return GENERIC_REASONING,
    };
    options.choose(rng).copied().unwrap_or(GENERIC_REASONING)
}

/// Bildet globale Aktionsindizes auf Kategorien und Katalogeinträge ab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCatalog {
    bounds: [Range<usize>; 4],
}

impl ActionCatalog {
    /// Berechnet die vier halboffenen Bereiche per kumulativer Summe.
    #[must_use]
    pub fn new(space: &ActionSpaceConfig) -> Self {
        let sizes = [
            space.num_nutrients,
            space.num_exercises,
            space.num_sleep_patterns,
            space.num_lifestyle,
        ];
        let mut start = 0;
        let bounds = sizes.map(|size| {
            let range = start..start + size;
            start += size;
            range
        });
        Self { bounds }
    }

    /// Größe des gesamten Aktionsraums.
    #[must_use]
    pub fn total(&self) -> usize {
        self.bounds[3].end
    }

    #[must_use]
    pub fn range(&self, category: ActionCategory) -> Range<usize> {
        self.bounds[category.position()].clone()
    }

    /// Zerlegt einen globalen Index in (Kategorie, lokale Kennung).
    pub fn locate(&self, index: usize) -> Result<(ActionCategory, usize)> {
        ActionCategory::ALL
            .iter()
            .zip(&self.bounds)
            .find(|(_, range)| range.contains(&index))
            .map(|(category, range)| (*category, index - range.start))
            .ok_or(CoreError::ActionIndexOutOfRange {
                index,
                total: self.total(),
            })
    }

    /// Baut die [`Action`] zu einem globalen Index. Fehlt die lokale Kennung im
    /// kuratierten Katalog, wird ein generischer Name erzeugt.
    pub fn index_to_action(&self, index: usize, confidence: f32) -> Result<Action> {
        let (category, local_id) = self.locate(index)?;
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let mut action = Action {
            category,
            local_id,
            name: format!("{category}_{local_id}"),
            dosage: None,
            frequency: None,
            duration: None,
            timing: None,
            confidence,
            reasoning: String::new(),
        };

        match category {
            ActionCategory::Nutrient => {
                let (name, dosage, frequency, timing) = NUTRIENT_CATALOG
                    .get(local_id)
                    .map(|(n, d, f, t)| ((*n).to_string(), *d, *f, *t))
                    .unwrap_or_else(|| {
                        (format!("Nutrient_{local_id}"), "standard", "daily", "any")
                    });
                action.name = name;
                action.dosage = Some(dosage.into());
                action.frequency = Some(frequency.into());
                action.timing = Some(timing.into());
            }
            ActionCategory::Exercise => {
                let (name, duration, frequency) = EXERCISE_CATALOG
                    .get(local_id)
                    .map(|(n, d, f)| ((*n).to_string(), *d, *f))
                    .unwrap_or_else(|| (format!("Exercise_{local_id}"), "30min", "daily"));
                action.name = name;
                action.duration = Some(duration.into());
                action.frequency = Some(frequency.into());
            }
            ActionCategory::Sleep | ActionCategory::Lifestyle => {}
        }

        Ok(action)
    }

    /// Umkehrung von [`ActionCatalog::index_to_action`].
    pub fn action_to_index(&self, action: &Action) -> Result<usize> {
        let range = self.range(action.category);
        if action.local_id >= range.len() {
            return Err(CoreError::UnknownLocalId {
                category: action.category,
                local_id: action.local_id,
                size: range.len(),
            });
        }
        Ok(range.start + action.local_id)
    }
}
