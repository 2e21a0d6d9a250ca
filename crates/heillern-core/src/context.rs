//! Datenstrukturen für externe Kontextdaten (Wetter, Epidemiologie, ...).
//!
//! Ein [`ExternalDataPoint`] ist das Austauschformat, in dem die externe
//! Datenpipeline ihre Messwerte liefert. Hier wird nur die konsumierende Seite
//! abgebildet: Ableitung von A-priori-Wahrscheinlichkeiten und die Auflösung
//! von Widersprüchen zwischen externer Lage und internem Sensorbefund. Bei
//! Widerspruch gilt immer der interne Befund.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Grundwahrscheinlichkeit für Influenza ohne externen Kontext.
const INFLUENZA_BASE_PRIOR: f64 = 0.05;
/// Erhöhte Wahrscheinlichkeit bei einem gemeldeten Ausbruch.
const OUTBREAK_PRIOR: f64 = 0.15;
/// ILI-Rate, unter der die regionale Lage als unauffällig gilt.
const LOW_ILI_RATE: f64 = 3.0;
const HIGH_VIRAL_LOAD: &str = "high_viral_load";

/// Qualitätsstufe, die die Pipeline einem Datenpunkt zuweist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataQuality {
    Verified,
    #[default]
    Trusted,
    Unverified,
    Rejected,
}

/// Ein externer Messwert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExternalDataPoint {
    /// Eine eindeutige Kennung, z. B. `ili_rate_seoul`.
    pub id: Option<String>,
    /// Art des Messwerts (z. B. "ili_rate", "air_quality", "outbreak_alert").
    /// Das Feld heißt im JSON `type`.
    pub r#type: String,
    /// Domain der liefernden Quelle.
    pub source: String,
    pub value: f64,
    pub unit: Option<String>,
    /// Vertrauenswert der Quelle, 0.0 bis 1.0.
    pub trust_score: Option<f64>,
    #[serde(default)]
    pub quality: DataQuality,
    /// ISO-8601-Zeitstempel der Messung.
    pub ts: Option<String>,
    /// Zusätzliche strukturierte Angaben (z. B. `disease` bei Ausbruchsmeldungen).
    pub features: Option<BTreeMap<String, Value>>,
}

/// Ergebnis der Widerspruchsprüfung.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub trust_internal: bool,
    pub flag_for_review: bool,
    pub explanation: String,
    pub action: String,
}

/// Leitet A-priori-Wahrscheinlichkeiten aus den nicht abgelehnten Datenpunkten ab.
#[must_use]
pub fn bayesian_priors(points: &[ExternalDataPoint]) -> BTreeMap<String, f64> {
    let mut priors = BTreeMap::new();
    for point in points.iter().filter(|p| p.quality != DataQuality::Rejected) {
        match point.r#type.as_str() {
            "ili_rate" => {
                priors.insert(
                    "influenza".to_string(),
                    INFLUENZA_BASE_PRIOR * (1.0 + point.value / 10.0),
                );
            }
            "outbreak_alert" => {
                let disease = point
                    .features
                    .as_ref()
                    .and_then(|f| f.get("disease"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                priors.insert(disease.to_string(), OUTBREAK_PRIOR);
            }
            _ => {}
        }
    }
    priors
}

/// Prüft einen externen Datenpunkt gegen den internen Befund.
///
/// Erkannt wird derzeit genau eine Konstellation: niedrige ILI-Rate
/// (`< 3`) bei internem Befund `high_viral_load`. Weitere Paare werden ohne
/// fachliche Vorgabe nicht abgeleitet.
#[must_use]
pub fn resolve_conflict(
    point: &ExternalDataPoint,
    internal_assessment: &str,
    internal_confidence: f64,
) -> ConflictResolution {
    let conflict = point.r#type == "ili_rate"
        && point.value < LOW_ILI_RATE
        && internal_assessment == HIGH_VIRAL_LOAD;

    if !conflict {
        return ConflictResolution {
            trust_internal: true,
            flag_for_review: false,
            explanation: String::new(),
            action: String::new(),
        };
    }

    ConflictResolution {
        trust_internal: true,
        flag_for_review: true,
        explanation: format!(
            "CONFLICT DETECTED: External source ({}) indicates low regional risk, but internal \
             sensor shows high individual risk. DECISION: Trust internal sensor (confidence: {:.1}%).",
            point.source,
            internal_confidence * 100.0
        ),
        action: "Despite low regional trends, your specific sample shows elevated markers. \
                 Immediate precautionary measures recommended."
            .to_string(),
    }
}
