use crate::{dosing::DoseResolver, formulary::Formulary, models::*};
use rayon::prelude::*;
use statrs::statistics::Statistics;

pub struct BatchEvaluator;

impl BatchEvaluator {
    /// Evaluate every patient independently and in parallel.
    ///
    /// Patients whose inputs fail validation are collected as failures; the rest
    /// of the cohort is unaffected. Output order follows input order.
    pub fn evaluate(records: &[PatientRecord], formulary: &Formulary) -> BatchResults {
        log::info!("Starting batch evaluation for {} patients", records.len());

        let outcomes: Vec<Result<PatientEvaluation, FailedPatient>> = records
            .par_iter()
            .map(|record| {
                let resolved = DoseResolver::resolve_for_patient(
                    formulary,
                    &record.parameters,
                    &record.drug_name,
                );
                match resolved {
                    Ok((estimate, recommendation)) => Ok(PatientEvaluation {
                        patient_id: record.id.clone(),
                        estimate,
                        recommendation,
                    }),
                    Err(e) => {
                        log::error!("Failed to evaluate patient {}: {}", record.id, e);
                        Err(FailedPatient {
                            patient_id: record.id.clone(),
                            failure_reason: e.to_string(),
                        })
                    }
                }
            })
            .collect();

        let mut evaluations = Vec::new();
        let mut failed_patients = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(evaluation) => evaluations.push(evaluation),
                Err(failed) => failed_patients.push(failed),
            }
        }

        log::info!("Successfully evaluated {} patients", evaluations.len());
        if !failed_patients.is_empty() {
            log::warn!("Failed to evaluate {} patients", failed_patients.len());
        }

        let summary = Self::summarize(&evaluations, failed_patients.len());

        BatchResults {
            evaluations,
            failed_patients,
            summary,
        }
    }

    fn summarize(evaluations: &[PatientEvaluation], n_failed: usize) -> BatchSummary {
        let count = |pred: fn(&PatientEvaluation) -> bool| {
            evaluations.iter().filter(|e| pred(e)).count()
        };

        let crcl_values: Vec<f64> = evaluations.iter().map(|e| e.estimate.crcl).collect();
        let (mean_crcl, std_crcl, min_crcl, max_crcl) = if crcl_values.is_empty() {
            (None, None, None, None)
        } else {
            // Sample standard deviation is undefined for a single patient.
            let std = if crcl_values.len() > 1 {
                Some((&crcl_values).std_dev())
            } else {
                None
            };
            (
                Some((&crcl_values).mean()),
                std,
                Some((&crcl_values).min()),
                Some((&crcl_values).max()),
            )
        };

        BatchSummary {
            n_evaluated: evaluations.len(),
            n_failed,
            n_usual_dose: count(|e| {
                matches!(e.recommendation.outcome, DosingOutcome::UsualDose { .. })
            }),
            n_adjusted_dose: count(|e| {
                matches!(e.recommendation.outcome, DosingOutcome::AdjustedDose { .. })
            }),
            n_no_recommendation: count(|e| {
                e.recommendation.outcome == DosingOutcome::NoRecommendation
            }),
            n_fallback: count(|e| e.recommendation.used_fallback),
            n_contraindication_advisories: count(|e| e.recommendation.contraindication.is_some()),
            mean_crcl,
            std_crcl,
            min_crcl,
            max_crcl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formulary::default_formulary;

    fn record(id: &str, age: i32, weight: f64, scr: f64, drug: &str) -> PatientRecord {
        PatientRecord {
            id: id.to_string(),
            parameters: PatientParameters {
                age,
                weight,
                serum_creatinine: scr,
                sex: Sex::Male,
            },
            drug_name: drug.to_string(),
        }
    }

    #[test]
    fn test_batch_separates_failures() {
        let records = vec![
            record("1", 50, 70.0, 1.4, "Meropenem"),
            record("2", 50, 70.0, -1.0, "Meropenem"),
            record("3", 50, 70.0, 2.0, "Unknown"),
            record("4", 80, 60.0, 9.0, "Levofloxacin"),
        ];

        let results = BatchEvaluator::evaluate(&records, default_formulary());

        assert_eq!(results.evaluations.len(), 3);
        assert_eq!(results.failed_patients.len(), 1);
        assert_eq!(results.failed_patients[0].patient_id, "2");

        let ids: Vec<&str> = results.evaluations.iter().map(|e| e.patient_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3", "4"]);

        let summary = &results.summary;
        assert_eq!(summary.n_usual_dose, 1);
        assert_eq!(summary.n_adjusted_dose, 1);
        assert_eq!(summary.n_no_recommendation, 1);
        assert_eq!(summary.n_fallback, 1);
        assert_eq!(summary.n_failed, 1);
        assert_eq!(summary.max_crcl, Some(62.5));
    }

    #[test]
    fn test_batch_matches_single_evaluation() {
        let records: Vec<PatientRecord> = (1..=50)
            .map(|i| {
                let (weight, scr) = (50.0 + i as f64, 0.5 + i as f64 * 0.05);
                record(&i.to_string(), 20 + i, weight, scr, "Gentamicin")
            })
            .collect();

        let results = BatchEvaluator::evaluate(&records, default_formulary());
        for (evaluation, record) in results.evaluations.iter().zip(&records) {
            let (_, single) = DoseResolver::resolve_for_patient(
                default_formulary(),
                &record.parameters,
                &record.drug_name,
            )
            .unwrap();
            assert_eq!(evaluation.recommendation, single);
        }
    }

    #[test]
    fn test_empty_batch() {
        let results = BatchEvaluator::evaluate(&[], default_formulary());
        assert_eq!(results.summary.n_evaluated, 0);
        assert!(results.summary.mean_crcl.is_none());
    }
}
