use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::DosingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    /// Cockcroft-Gault correction applied to the numerator.
    pub fn gender_factor(&self) -> f64 {
        match self {
            Sex::Male => 1.0,
            Sex::Female => 0.85,
        }
    }

    pub fn from_is_male(is_male: bool) -> Self {
        if is_male {
            Sex::Male
        } else {
            Sex::Female
        }
    }

    pub fn is_male(&self) -> bool {
        matches!(self, Sex::Male)
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sex::Male => write!(f, "Male"),
            Sex::Female => write!(f, "Female"),
        }
    }
}

impl FromStr for Sex {
    type Err = DosingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "m" | "male" => Ok(Sex::Male),
            "f" | "female" => Ok(Sex::Female),
            other => Err(DosingError::Parse(format!("Unknown sex value: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientParameters {
    pub age: i32,
    pub weight: f64,
    pub serum_creatinine: f64,
    pub sex: Sex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentBand {
    pub crcl_min: f64,
    pub crcl_max: f64,
    pub dose: f64,
    pub interval: u32,
    #[serde(default)]
    pub monitoring: bool,
}

impl AdjustmentBand {
    /// Inclusive on both ends; adjacent bands may share a boundary value.
    pub fn contains(&self, crcl: f64) -> bool {
        self.crcl_min <= crcl && crcl <= self.crcl_max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrugEntry {
    pub name: String,
    pub usual_dose: f64,
    pub usual_interval: u32,
    pub crcl_threshold: f64,
    #[serde(default)]
    pub is_weight_based: bool,
    #[serde(default)]
    pub contraindications: String,
    pub adjustments: Vec<AdjustmentBand>,
}

impl DrugEntry {
    pub fn has_contraindications(&self) -> bool {
        !self.contraindications.is_empty()
    }
}

/// Intermediate values of the Cockcroft-Gault arithmetic, kept for display only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationTrace {
    pub age_term: f64,
    pub weight_product: f64,
    pub gender_factor: f64,
    pub adjusted_product: f64,
    pub unrounded_crcl: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrclEstimate {
    pub crcl: f64,
    pub trace: CalculationTrace,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContraindicationAdvisory {
    pub contraindications: String,
    pub crcl: f64,
    pub crcl_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "regime", rename_all = "snake_case")]
pub enum DosingOutcome {
    UsualDose {
        dose: f64,
        interval: u32,
    },
    AdjustedDose {
        dose: f64,
        interval: u32,
        crcl_min: f64,
        crcl_max: f64,
        close_monitoring: bool,
    },
    NoRecommendation,
}

impl DosingOutcome {
    pub fn dose(&self) -> Option<f64> {
        match self {
            DosingOutcome::UsualDose { dose, .. } | DosingOutcome::AdjustedDose { dose, .. } => {
                Some(*dose)
            }
            DosingOutcome::NoRecommendation => None,
        }
    }

    pub fn interval(&self) -> Option<u32> {
        match self {
            DosingOutcome::UsualDose { interval, .. }
            | DosingOutcome::AdjustedDose { interval, .. } => Some(*interval),
            DosingOutcome::NoRecommendation => None,
        }
    }

    pub fn close_monitoring(&self) -> bool {
        matches!(
            self,
            DosingOutcome::AdjustedDose {
                close_monitoring: true,
                ..
            }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            DosingOutcome::UsualDose { .. } => "usual_dose",
            DosingOutcome::AdjustedDose { .. } => "adjusted_dose",
            DosingOutcome::NoRecommendation => "no_recommendation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseRecommendation {
    /// Name as requested by the caller, echoed back in messages.
    pub drug_name: String,
    /// Formulary entry actually used; differs from `drug_name` after a fallback.
    pub resolved_drug: String,
    pub used_fallback: bool,
    pub crcl: f64,
    pub crcl_threshold: f64,
    pub usual_dose: f64,
    pub usual_interval: u32,
    pub contraindication: Option<ContraindicationAdvisory>,
    pub outcome: DosingOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub day: usize,
    pub serum_creatinine: f64,
    pub crcl: f64,
    pub below_threshold: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub min_crcl: f64,
    pub max_crcl: f64,
    pub mean_crcl: f64,
    /// Last day's CrCl minus the first day's.
    pub crcl_change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub drug_name: String,
    pub resolved_drug: String,
    pub used_fallback: bool,
    pub crcl_threshold: f64,
    pub usual_dose: f64,
    pub usual_interval: u32,
    pub contraindications: String,
    pub points: Vec<TrendPoint>,
    pub contraindication_risk: bool,
    pub switch_day: Option<usize>,
    pub summary: Option<TrendSummary>,
}

impl TrendResult {
    pub fn days(&self) -> Vec<usize> {
        self.points.iter().map(|p| p.day).collect()
    }

    pub fn crcl_series(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.crcl).collect()
    }

    pub fn serum_creatinine_series(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.serum_creatinine).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: String,
    pub parameters: PatientParameters,
    pub drug_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientEvaluation {
    pub patient_id: String,
    pub estimate: CrclEstimate,
    pub recommendation: DoseRecommendation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedPatient {
    pub patient_id: String,
    pub failure_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub n_evaluated: usize,
    pub n_failed: usize,
    pub n_usual_dose: usize,
    pub n_adjusted_dose: usize,
    pub n_no_recommendation: usize,
    pub n_fallback: usize,
    pub n_contraindication_advisories: usize,
    pub mean_crcl: Option<f64>,
    pub std_crcl: Option<f64>,
    pub min_crcl: Option<f64>,
    pub max_crcl: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResults {
    pub evaluations: Vec<PatientEvaluation>,
    pub failed_patients: Vec<FailedPatient>,
    pub summary: BatchSummary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub output_path: String,
    pub formulary_path: Option<String>,
    pub save_outputs: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output_path: "./crcl_results".to_string(),
            formulary_path: None,
            save_outputs: false,
        }
    }
}
