use crate::{formulary::Formulary, models::*, renal::{round2, CrclCalculator}, Result};

pub struct DoseResolver;

impl DoseResolver {
    /// Map a CrCl value onto a drug's dosing rules.
    ///
    /// Unknown drug names resolve against the formulary's reference drug. A CrCl
    /// that lands outside every band yields `DosingOutcome::NoRecommendation`.
    pub fn resolve_dose(
        formulary: &Formulary,
        crcl: f64,
        drug_name: &str,
        weight: f64,
    ) -> DoseRecommendation {
        let (entry, used_fallback) = formulary.lookup_or_default(drug_name);
        let usual_dose = Self::scale_dose(entry, entry.usual_dose, weight);

        let contraindication = if entry.has_contraindications() && crcl < entry.crcl_threshold {
            log::warn!(
                "{} may be contraindicated ({}) at CrCl {} mL/min",
                drug_name, entry.contraindications, crcl
            );
            Some(ContraindicationAdvisory {
                contraindications: entry.contraindications.clone(),
                crcl,
                crcl_threshold: entry.crcl_threshold,
            })
        } else {
            None
        };

        let outcome = if crcl > entry.crcl_threshold {
            DosingOutcome::UsualDose {
                dose: usual_dose,
                interval: entry.usual_interval,
            }
        } else {
            match entry.adjustments.iter().find(|band| band.contains(crcl)) {
                Some(band) => DosingOutcome::AdjustedDose {
                    dose: Self::scale_dose(entry, band.dose, weight),
                    interval: band.interval,
                    crcl_min: band.crcl_min,
                    crcl_max: band.crcl_max,
                    close_monitoring: band.monitoring,
                },
                None => {
                    log::warn!(
                        "No adjustment band for {} at CrCl {} mL/min",
                        entry.name, crcl
                    );
                    DosingOutcome::NoRecommendation
                }
            }
        };

        DoseRecommendation {
            drug_name: drug_name.to_string(),
            resolved_drug: entry.name.clone(),
            used_fallback,
            crcl,
            crcl_threshold: entry.crcl_threshold,
            usual_dose,
            usual_interval: entry.usual_interval,
            contraindication,
            outcome,
        }
    }

    /// Estimate CrCl for a patient, then resolve the dose. Invalid patient
    /// inputs stop here and never reach dose resolution.
    pub fn resolve_for_patient(
        formulary: &Formulary,
        params: &PatientParameters,
        drug_name: &str,
    ) -> Result<(CrclEstimate, DoseRecommendation)> {
        let estimate = CrclCalculator::estimate(params)?;
        let recommendation =
            Self::resolve_dose(formulary, estimate.crcl, drug_name, params.weight);
        Ok((estimate, recommendation))
    }

    fn scale_dose(entry: &DrugEntry, dose: f64, weight: f64) -> f64 {
        if entry.is_weight_based {
            round2(dose * weight)
        } else {
            dose
        }
    }
}
