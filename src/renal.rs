use crate::{errors::DosingError, models::*, Result};

const INVALID_INPUT_MESSAGE: &str =
    "Invalid inputs: Age, weight, and serum creatinine must be positive.";

/// Round to two decimal places, halves away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct CrclCalculator;

impl CrclCalculator {
    /// Cockcroft-Gault creatinine clearance in mL/min.
    ///
    /// Fails with a validation error when any of age, weight or serum creatinine
    /// is not strictly positive. Ages of 140 and above are not clamped and yield
    /// a zero or negative clearance.
    pub fn estimate_crcl(
        age: i32,
        weight: f64,
        serum_creatinine: f64,
        sex: Sex,
    ) -> Result<CrclEstimate> {
        // Negated comparisons so NaN is rejected too.
        if age <= 0 || !(weight > 0.0) || !(serum_creatinine > 0.0) {
            return Err(DosingError::Validation(INVALID_INPUT_MESSAGE.to_string()));
        }

        let gender_factor = sex.gender_factor();
        let age_term = (140 - age) as f64;
        let weight_product = age_term * weight;
        let adjusted_product = weight_product * gender_factor;
        let unrounded_crcl = adjusted_product / (72.0 * serum_creatinine);
        let crcl = round2(unrounded_crcl);

        log::debug!(
            "CrCl estimate: age={} weight={} scr={} sex={} -> {} mL/min",
            age, weight, serum_creatinine, sex, crcl
        );

        Ok(CrclEstimate {
            crcl,
            trace: CalculationTrace {
                age_term,
                weight_product,
                gender_factor,
                adjusted_product,
                unrounded_crcl,
            },
        })
    }

    pub fn estimate(params: &PatientParameters) -> Result<CrclEstimate> {
        Self::estimate_crcl(params.age, params.weight, params.serum_creatinine, params.sex)
    }
}
