use crate::{models::*, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Text rendering of results for a presentation layer.
pub struct ReportFormatter;

impl ReportFormatter {
    pub fn calculation_steps(estimate: &CrclEstimate) -> String {
        let t = &estimate.trace;
        format!(
            "CrCl Calculation Steps:\n\
             1. (140 - age) = {}\n\
             2. Step 1 × weight = {}\n\
             3. Step 2 × gender factor ({}) = {}\n\
             4. Step 3 ÷ (72 × serum creatinine) = {:.2}\n\
             Final CrCl: {} mL/min",
            t.age_term,
            t.weight_product,
            t.gender_factor,
            t.adjusted_product,
            t.unrounded_crcl,
            estimate.crcl
        )
    }

    pub fn dose_summary(rec: &DoseRecommendation) -> String {
        let usual = format!(
            "For {}, usual dose: **{} mg every {} hours**",
            rec.drug_name, rec.usual_dose, rec.usual_interval
        );

        match &rec.outcome {
            DosingOutcome::UsualDose { dose, interval } => format!(
                "{}, recommended dose: **{} mg every {} hours**. (CrCl > {} mL/min)",
                usual, dose, interval, rec.crcl_threshold
            ),
            DosingOutcome::AdjustedDose {
                dose,
                interval,
                crcl_min,
                crcl_max,
                close_monitoring,
            } => format!(
                "{}, recommended dose: **{} mg every {} hours**{}. (CrCl {}-{} mL/min)",
                usual,
                dose,
                interval,
                if *close_monitoring { " with close monitoring" } else { "" },
                crcl_min,
                crcl_max
            ),
            DosingOutcome::NoRecommendation => format!(
                "No dosing recommendation available for {} at CrCl {} mL/min.",
                rec.drug_name, rec.crcl
            ),
        }
    }

    pub fn contraindication_warning(rec: &DoseRecommendation) -> Option<String> {
        rec.contraindication.as_ref().map(|advisory| {
            format!(
                "Warning: {} may be contraindicated ({}) at CrCl {} mL/min. Consult a clinician.",
                rec.drug_name, advisory.contraindications, advisory.crcl
            )
        })
    }

    pub fn trend_contraindication_warning(trend: &TrendResult) -> Option<String> {
        if !trend.contraindication_risk {
            return None;
        }
        Some(format!(
            "Warning: {} may be contraindicated ({}) at low CrCl. Consult a clinician.",
            trend.drug_name, trend.contraindications
        ))
    }

    /// Switch-day message, or the advice to stay on the adjusted regimen.
    pub fn trend_summary(trend: &TrendResult) -> String {
        match trend.switch_day {
            Some(day) => format!(
                "For {}, switch to usual dose (**{} mg every {} hours**) on Day {} when CrCl exceeds {} mL/min.",
                trend.drug_name, trend.usual_dose, trend.usual_interval, day, trend.crcl_threshold
            ),
            None => format!(
                "For {}, CrCl remains ≤ {} mL/min. Continue recommended dose based on CrCl.",
                trend.drug_name, trend.crcl_threshold
            ),
        }
    }

    /// Free-text prompt for a conversational assistant. Its reply is display-only.
    pub fn assistant_prompt(drug_name: &str, crcl: f64) -> String {
        format!(
            "Provide general guidance on dose adjustments for {} based on creatinine clearance of {} mL/min.",
            drug_name, crcl
        )
    }

    pub fn input_echo(params: &PatientParameters, drug_name: &str) -> String {
        format!(
            "Input Parameters:\n\
             - Age: {} years\n\
             - Weight: {} kg\n\
             - Serum Creatinine: {} mg/dL\n\
             - Gender: {}\n\
             - Drug: {}",
            params.age, params.weight, params.serum_creatinine, params.sex, drug_name
        )
    }
}

pub struct OutputManager;

impl OutputManager {
    /// Write the series and full result for a charting collaborator.
    pub fn save_trend<P: AsRef<Path>>(trend: &TrendResult, output_path: P) -> Result<()> {
        let output_dir = output_path.as_ref();
        fs::create_dir_all(output_dir)?;

        let mut file = File::create(output_dir.join("trend_series.csv"))?;
        writeln!(file, "DAY,SCR,CRCL,BELOW_THRESHOLD")?;
        for point in &trend.points {
            writeln!(
                file,
                "{},{},{},{}",
                point.day, point.serum_creatinine, point.crcl, point.below_threshold
            )?;
        }

        let json_string = serde_json::to_string_pretty(trend)?;
        fs::write(output_dir.join("trend_result.json"), json_string)?;

        log::info!("Trend results saved to: {}", output_dir.display());
        Ok(())
    }

    pub fn save_batch<P: AsRef<Path>>(results: &BatchResults, output_path: P) -> Result<()> {
        let output_dir = output_path.as_ref();
        fs::create_dir_all(output_dir)?;

        Self::save_evaluations(&results.evaluations, output_dir)?;
        Self::save_failed_patients_log(&results.failed_patients, output_dir)?;

        let json_string = serde_json::to_string_pretty(results)?;
        fs::write(output_dir.join("batch_results.json"), json_string)?;

        log::info!("Batch results saved to: {}", output_dir.display());
        Ok(())
    }

    fn save_evaluations(evaluations: &[PatientEvaluation], output_dir: &Path) -> Result<()> {
        let mut file = File::create(output_dir.join("batch_results.csv"))?;

        writeln!(
            file,
            "ID,DRUG,RESOLVED_DRUG,CRCL,REGIME,DOSE,INTERVAL,MONITORING,CONTRAINDICATION_ADVISORY"
        )?;
        for evaluation in evaluations {
            let rec = &evaluation.recommendation;
            writeln!(
                file,
                "{},{},{},{},{},{},{},{},{}",
                evaluation.patient_id,
                rec.drug_name,
                rec.resolved_drug,
                evaluation.estimate.crcl,
                rec.outcome.label(),
                rec.outcome.dose().map_or("NA".to_string(), |v| v.to_string()),
                rec.outcome.interval().map_or("NA".to_string(), |v| v.to_string()),
                rec.outcome.close_monitoring(),
                rec.contraindication.is_some(),
            )?;
        }

        Ok(())
    }

    fn save_failed_patients_log(failed: &[FailedPatient], output_dir: &Path) -> Result<()> {
        if failed.is_empty() {
            return Ok(());
        }

        let mut file = File::create(output_dir.join("failed_patients.log"))?;
        writeln!(file, "FAILED PATIENT LOG")?;
        writeln!(file, "==================")?;
        writeln!(file)?;
        writeln!(file, "Total failed patients: {}", failed.len())?;
        writeln!(file)?;

        for patient in failed {
            writeln!(file, "Patient ID: {}", patient.patient_id)?;
            writeln!(file, "Failure Reason: {}", patient.failure_reason)?;
            writeln!(file, "---")?;
        }

        Ok(())
    }
}
