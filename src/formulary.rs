//! Drug formulary: per-drug dosing rules keyed by drug name.
//!
//! Entries keep their registration order. The first registered entry is the
//! reference drug used when a lookup misses.

use crate::{errors::DosingError, models::*, Result};
use itertools::Itertools;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

static BUILTIN_FORMULARY: Lazy<Formulary> = Lazy::new(build_builtin_formulary);

/// Shared built-in formulary, built once per process.
pub fn default_formulary() -> &'static Formulary {
    &BUILTIN_FORMULARY
}

#[derive(Debug, Clone)]
pub struct Formulary {
    entries: Vec<DrugEntry>,
    index: HashMap<String, usize>,
}

/// A data-authoring defect found by [`Formulary::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormularyIssue {
    pub drug_name: String,
    pub kind: IssueKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueKind {
    InvalidInterval,
    NegativeDose,
    InvertedBand,
    NoBands,
    Overlap,
    Gap,
    CoverageStart,
    CoverageEnd,
}

impl Formulary {
    pub fn from_entries(entries: Vec<DrugEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(DosingError::Formulary(
                "Formulary must contain at least one drug".to_string(),
            ));
        }

        let mut index = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            if index.insert(entry.name.clone(), i).is_some() {
                return Err(DosingError::Formulary(format!(
                    "Duplicate drug name: {}",
                    entry.name
                )));
            }
        }

        Ok(Self { entries, index })
    }

    /// Load a JSON array of drug entries. Array order is registration order.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let entries: Vec<DrugEntry> = serde_json::from_str(&contents)?;
        log::info!(
            "Loaded {} formulary entries from {}",
            entries.len(),
            path.as_ref().display()
        );
        Self::from_entries(entries)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&DrugEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn default_drug(&self) -> &DrugEntry {
        &self.entries[0]
    }

    /// Look up `name`, falling back to the reference drug on a miss.
    /// The flag reports whether the fallback was taken.
    pub fn lookup_or_default(&self, name: &str) -> (&DrugEntry, bool) {
        match self.get(name) {
            Some(entry) => (entry, false),
            None => {
                log::warn!(
                    "Drug '{}' not in formulary, using {} rules",
                    name,
                    self.default_drug().name
                );
                (self.default_drug(), true)
            }
        }
    }

    pub fn sorted_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).sorted().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DrugEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Report authoring defects across all entries. Nothing here blocks dose
    /// resolution; a query that lands in a gap simply yields no recommendation.
    pub fn validate(&self) -> Vec<FormularyIssue> {
        self.entries.iter().flat_map(validate_entry).collect()
    }
}

fn issue(entry: &DrugEntry, kind: IssueKind, detail: String) -> FormularyIssue {
    FormularyIssue {
        drug_name: entry.name.clone(),
        kind,
        detail,
    }
}

fn validate_entry(entry: &DrugEntry) -> Vec<FormularyIssue> {
    let mut issues = Vec::new();

    if entry.usual_interval == 0 {
        issues.push(issue(
            entry,
            IssueKind::InvalidInterval,
            "usual interval is 0 hours".to_string(),
        ));
    }
    if entry.usual_dose < 0.0 {
        issues.push(issue(
            entry,
            IssueKind::NegativeDose,
            format!("usual dose {}", entry.usual_dose),
        ));
    }
    if entry.adjustments.is_empty() {
        issues.push(issue(entry, IssueKind::NoBands, "no adjustment bands defined".to_string()));
        return issues;
    }

    for band in &entry.adjustments {
        if band.interval == 0 {
            issues.push(issue(
                entry,
                IssueKind::InvalidInterval,
                format!("band {}-{} has a 0 hour interval", band.crcl_min, band.crcl_max),
            ));
        }
        if band.dose < 0.0 {
            issues.push(issue(
                entry,
                IssueKind::NegativeDose,
                format!("band {}-{} dose {}", band.crcl_min, band.crcl_max, band.dose),
            ));
        }
        if band.crcl_min > band.crcl_max {
            issues.push(issue(
                entry,
                IssueKind::InvertedBand,
                format!("band min {} exceeds max {}", band.crcl_min, band.crcl_max),
            ));
        }
    }

    let bands: Vec<&AdjustmentBand> = entry
        .adjustments
        .iter()
        .filter(|b| b.crcl_min <= b.crcl_max)
        .sorted_by(|a, b| a.crcl_min.total_cmp(&b.crcl_min))
        .collect();

    let Some(first) = bands.first() else {
        return issues;
    };
    if first.crcl_min > 0.0 {
        issues.push(issue(
            entry,
            IssueKind::CoverageStart,
            format!("CrCl values in [0, {}) are not covered", first.crcl_min),
        ));
    }

    let mut covered_to = first.crcl_max;
    for band in bands.iter().skip(1) {
        if band.crcl_min > covered_to {
            issues.push(issue(
                entry,
                IssueKind::Gap,
                format!("CrCl values in ({}, {}) are not covered", covered_to, band.crcl_min),
            ));
        } else if band.crcl_min < covered_to {
            issues.push(issue(
                entry,
                IssueKind::Overlap,
                format!(
                    "band {}-{} overlaps coverage up to {}",
                    band.crcl_min, band.crcl_max, covered_to
                ),
            ));
        }
        covered_to = covered_to.max(band.crcl_max);
    }

    if covered_to < entry.crcl_threshold {
        issues.push(issue(
            entry,
            IssueKind::CoverageEnd,
            format!(
                "CrCl values in ({}, {}] are not covered",
                covered_to, entry.crcl_threshold
            ),
        ));
    }

    issues
}

fn band(crcl_min: f64, crcl_max: f64, dose: f64, interval: u32) -> AdjustmentBand {
    AdjustmentBand {
        crcl_min,
        crcl_max,
        dose,
        interval,
        monitoring: false,
    }
}

fn monitored(crcl_min: f64, crcl_max: f64, dose: f64, interval: u32) -> AdjustmentBand {
    AdjustmentBand {
        monitoring: true,
        ..band(crcl_min, crcl_max, dose, interval)
    }
}

fn drug(
    name: &str,
    usual_dose: f64,
    usual_interval: u32,
    crcl_threshold: f64,
    contraindications: &str,
    adjustments: Vec<AdjustmentBand>,
) -> DrugEntry {
    DrugEntry {
        name: name.into(),
        usual_dose,
        usual_interval,
        crcl_threshold,
        is_weight_based: false,
        contraindications: contraindications.into(),
        adjustments,
    }
}

fn weight_based(entry: DrugEntry) -> DrugEntry {
    DrugEntry {
        is_weight_based: true,
        ..entry
    }
}

fn build_builtin_formulary() -> Formulary {
    let entries = vec![
        // Reference drug: must stay first.
        drug("Meropenem", 1000.0, 8, 50.0, "Known hypersensitivity", vec![
            band(30.0, 50.0, 1000.0, 12),
            band(10.0, 30.0, 500.0, 12),
            monitored(0.0, 10.0, 500.0, 24),
        ]),
        drug("Vancomycin", 1000.0, 12, 50.0, "Hypersensitivity, ototoxicity risk", vec![
            band(20.0, 50.0, 1000.0, 24),
            monitored(0.0, 20.0, 500.0, 48),
        ]),
        weight_based(drug("Gentamicin", 5.0, 24, 50.0, "Nephrotoxicity, ototoxicity", vec![
            band(30.0, 50.0, 3.0, 24),
            band(10.0, 30.0, 2.0, 24),
            monitored(0.0, 10.0, 1.0, 48),
        ])),
        drug("Ceftriaxone", 1000.0, 24, 50.0, "Hyperbilirubinemia in neonates", vec![
            band(0.0, 50.0, 1000.0, 24),
        ]),
        drug("Piperacillin-Tazobactam", 3375.0, 6, 40.0, "Penicillin allergy", vec![
            band(20.0, 40.0, 3375.0, 8),
            monitored(0.0, 20.0, 2250.0, 8),
        ]),
        // No band below 10 mL/min; validate() reports the gap.
        drug("Levofloxacin", 500.0, 24, 50.0, "QT prolongation risk", vec![
            band(20.0, 50.0, 500.0, 48),
            monitored(10.0, 20.0, 250.0, 48),
        ]),
        drug("Ciprofloxacin", 500.0, 12, 60.0, "QT prolongation, tendon rupture risk", vec![
            band(30.0, 60.0, 500.0, 24),
            monitored(0.0, 30.0, 250.0, 24),
        ]),
        drug("Amoxicillin", 500.0, 8, 30.0, "Penicillin allergy", vec![
            band(10.0, 30.0, 500.0, 12),
            monitored(0.0, 10.0, 500.0, 24),
        ]),
        drug("Azithromycin", 500.0, 24, 50.0, "QT prolongation risk", vec![
            band(0.0, 50.0, 500.0, 24),
        ]),
        drug("Fluconazole", 400.0, 24, 50.0, "Hepatotoxicity risk", vec![
            band(0.0, 50.0, 200.0, 24),
        ]),
        weight_based(drug("Amikacin", 15.0, 24, 60.0, "Nephrotoxicity, ototoxicity", vec![
            band(40.0, 60.0, 10.0, 24),
            band(20.0, 40.0, 7.5, 24),
            monitored(0.0, 20.0, 7.5, 48),
        ])),
        drug("Caspofungin", 50.0, 24, 50.0, "Hepatic impairment", vec![
            band(0.0, 50.0, 50.0, 24),
        ]),
        drug("Levetiracetam", 500.0, 12, 80.0, "Hypersensitivity", vec![
            band(50.0, 80.0, 500.0, 12),
            band(30.0, 50.0, 250.0, 12),
            monitored(0.0, 30.0, 250.0, 24),
        ]),
        drug("Diltiazem", 60.0, 6, 50.0, "Heart block, hypotension", vec![
            band(0.0, 50.0, 60.0, 6),
        ]),
    ];

    let index = entries
        .iter()
        .enumerate()
        .map(|(i, e)| (e.name.clone(), i))
        .collect();

    Formulary { entries, index }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_contents() {
        let formulary = default_formulary();
        assert_eq!(formulary.len(), 14);
        assert_eq!(formulary.default_drug().name, "Meropenem");

        let gentamicin = formulary.get("Gentamicin").unwrap();
        assert!(gentamicin.is_weight_based);
        assert_eq!(gentamicin.adjustments.len(), 3);
        assert!(gentamicin.adjustments[2].monitoring);
    }

    #[test]
    fn test_lookup_falls_back_to_reference_drug() {
        let formulary = default_formulary();
        let (entry, used_fallback) = formulary.lookup_or_default("NonexistentDrug");
        assert_eq!(entry.name, "Meropenem");
        assert!(used_fallback);

        let (entry, used_fallback) = formulary.lookup_or_default("Vancomycin");
        assert_eq!(entry.name, "Vancomycin");
        assert!(!used_fallback);
    }

    #[test]
    fn test_sorted_names() {
        let names = default_formulary().sorted_names();
        assert_eq!(names.first(), Some(&"Amikacin"));
        assert_eq!(names.last(), Some(&"Vancomycin"));
    }

    #[test]
    fn test_builtin_validation_reports_only_levofloxacin_gap() {
        let issues = default_formulary().validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].drug_name, "Levofloxacin");
        assert_eq!(issues[0].kind, IssueKind::CoverageStart);
    }

    #[test]
    fn test_validation_detects_gap_overlap_and_end() {
        let entry = drug("Broken", 100.0, 0, 60.0, "", vec![
            band(0.0, 20.0, 50.0, 12),
            band(25.0, 40.0, 50.0, 12),
            band(35.0, 50.0, 50.0, 0),
        ]);
        let formulary = Formulary::from_entries(vec![entry]).unwrap();
        let kinds: Vec<IssueKind> = formulary.validate().iter().map(|i| i.kind).collect();

        assert!(kinds.contains(&IssueKind::InvalidInterval));
        assert!(kinds.contains(&IssueKind::Gap));
        assert!(kinds.contains(&IssueKind::Overlap));
        assert!(kinds.contains(&IssueKind::CoverageEnd));
        assert!(!kinds.contains(&IssueKind::CoverageStart));
    }

    #[test]
    fn test_from_entries_rejects_duplicates_and_empty() {
        assert!(Formulary::from_entries(Vec::new()).is_err());

        let a = drug("Same", 1.0, 8, 50.0, "", vec![band(0.0, 50.0, 1.0, 8)]);
        let result = Formulary::from_entries(vec![a.clone(), a]);
        assert!(matches!(result, Err(DosingError::Formulary(_))));
    }

    #[test]
    fn test_json_roundtrip_preserves_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("formulary.json");

        default_formulary().save_json(&path).unwrap();
        let loaded = Formulary::load_json(&path).unwrap();

        assert_eq!(loaded.len(), 14);
        assert_eq!(loaded.default_drug().name, "Meropenem");
        assert_eq!(loaded.get("Amikacin"), default_formulary().get("Amikacin"));
    }
}
