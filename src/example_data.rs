use crate::{formulary::Formulary, models::*, renal::round2, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Lowest serum creatinine accepted by the calculator forms (mg/dL).
const MIN_SERUM_CREATININE: f64 = 0.1;

pub struct ExampleDataGenerator;

impl ExampleDataGenerator {
    /// Write a synthetic cohort CSV (`ID,AGE,WT,SCR,SEX,DRUG`) drawing drugs from `formulary`.
    pub fn generate_cohort<P: AsRef<Path>>(
        output_path: P,
        n_patients: usize,
        formulary: &Formulary,
    ) -> Result<()> {
        let mut rng = StdRng::seed_from_u64(42); // Reproducible results
        let drugs = formulary.sorted_names();
        let mut file = File::create(output_path)?;

        writeln!(file, "ID,AGE,WT,SCR,SEX,DRUG")?;
        for patient_id in 1..=n_patients {
            let patient = Self::generate_patient(&mut rng);
            let drug = drugs[rng.gen_range(0..drugs.len())];
            writeln!(
                file,
                "{},{},{},{},{},{}",
                patient_id,
                patient.age,
                patient.weight,
                patient.serum_creatinine,
                if patient.sex.is_male() { "M" } else { "F" },
                drug
            )?;
        }

        log::info!("Generated example cohort with {} patients", n_patients);
        Ok(())
    }

    fn generate_patient(rng: &mut StdRng) -> PatientParameters {
        PatientParameters {
            age: rng.gen_range(18..=95),
            weight: round2(rng.gen_range(40.0..130.0)),
            serum_creatinine: round2(rng.gen_range(0.5..6.0)),
            sex: Sex::from_is_male(rng.gen_bool(0.5)),
        }
    }

    /// The calculator's default daily series: 1.4 mg/dL falling by 0.2 per day,
    /// floored at the minimum accepted value.
    pub fn default_daily_creatinine(days: usize) -> Vec<f64> {
        (0..days)
            .map(|i| round2((1.4 - i as f64 * 0.2).max(MIN_SERUM_CREATININE)))
            .collect()
    }

    pub fn generate_daily_creatinine<P: AsRef<Path>>(output_path: P, days: usize) -> Result<()> {
        let mut file = File::create(output_path)?;
        writeln!(file, "DAY,SCR")?;
        for (day, scr) in (1..).zip(Self::default_daily_creatinine(days)) {
            writeln!(file, "{},{}", day, scr)?;
        }

        log::info!("Generated example daily creatinine series for {} days", days);
        Ok(())
    }
}
