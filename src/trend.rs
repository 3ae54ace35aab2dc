use crate::{
    errors::DosingError, formulary::Formulary, models::*, renal::{round2, CrclCalculator}, Result,
};
use statrs::statistics::Statistics;

pub struct TrendProjector;

impl TrendProjector {
    /// Project CrCl over daily serum creatinine values (day 1 first) and locate
    /// the first day CrCl rises strictly above the drug's threshold.
    ///
    /// The first invalid day aborts the whole projection.
    pub fn project_trend(
        formulary: &Formulary,
        age: i32,
        weight: f64,
        sex: Sex,
        daily_serum_creatinine: &[f64],
        drug_name: &str,
    ) -> Result<TrendResult> {
        let (entry, used_fallback) = formulary.lookup_or_default(drug_name);
        let threshold = entry.crcl_threshold;

        let mut points = Vec::with_capacity(daily_serum_creatinine.len());
        for (day, &serum_creatinine) in (1..).zip(daily_serum_creatinine) {
            let estimate = CrclCalculator::estimate_crcl(age, weight, serum_creatinine, sex)
                .map_err(|e| DosingError::InvalidDay {
                    day,
                    message: e.to_string(),
                })?;
            points.push(TrendPoint {
                day,
                serum_creatinine,
                crcl: estimate.crcl,
                below_threshold: estimate.crcl < threshold,
            });
        }

        let contraindication_risk =
            entry.has_contraindications() && points.iter().any(|p| p.below_threshold);
        let switch_day = points.iter().find(|p| p.crcl > threshold).map(|p| p.day);
        let summary = Self::summarize(&points);

        log::debug!(
            "Trend for {} over {} days: threshold={} switch_day={:?}",
            drug_name,
            points.len(),
            threshold,
            switch_day
        );

        let usual_dose = if entry.is_weight_based {
            round2(entry.usual_dose * weight)
        } else {
            entry.usual_dose
        };

        Ok(TrendResult {
            drug_name: drug_name.to_string(),
            resolved_drug: entry.name.clone(),
            used_fallback,
            crcl_threshold: threshold,
            usual_dose,
            usual_interval: entry.usual_interval,
            contraindications: entry.contraindications.clone(),
            points,
            contraindication_risk,
            switch_day,
            summary,
        })
    }

    fn summarize(points: &[TrendPoint]) -> Option<TrendSummary> {
        let (first, last) = (points.first()?, points.last()?);
        let values: Vec<f64> = points.iter().map(|p| p.crcl).collect();

        Some(TrendSummary {
            min_crcl: (&values).min(),
            max_crcl: (&values).max(),
            mean_crcl: round2((&values).mean()),
            crcl_change: round2(last.crcl - first.crcl),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formulary::default_formulary;

    fn project(series: &[f64], drug: &str) -> Result<TrendResult> {
        TrendProjector::project_trend(default_formulary(), 50, 70.0, Sex::Male, series, drug)
    }

    #[test]
    fn test_switch_day_is_first_day_above_threshold() {
        // CrCl: 43.75, 54.69, 62.5, 87.5
        let result = project(&[2.0, 1.6, 1.4, 1.0], "Meropenem").unwrap();
        assert_eq!(result.switch_day, Some(2));
        assert_eq!(result.days(), vec![1, 2, 3, 4]);
        assert!(result.points[0].below_threshold);
        assert!(!result.points[1].below_threshold);
        assert!(result.contraindication_risk);
    }

    #[test]
    fn test_value_equal_to_threshold_does_not_switch() {
        // 90 * 70 / (72 * 1.75) = 50.0 exactly
        let result = project(&[2.0, 1.75], "Meropenem").unwrap();
        assert_eq!(result.points[1].crcl, 50.0);
        assert!(!result.points[1].below_threshold);
        assert_eq!(result.switch_day, None);
    }

    #[test]
    fn test_no_switch_is_valid_outcome() {
        let result = project(&[3.0, 2.8, 2.5], "Ciprofloxacin").unwrap();
        assert_eq!(result.switch_day, None);
        assert_eq!(result.crcl_threshold, 60.0);
    }

    #[test]
    fn test_invalid_day_fails_whole_projection() {
        let err = project(&[1.4, 1.2, 0.0, 1.0], "Meropenem").unwrap_err();
        match err {
            DosingError::InvalidDay { day, .. } => assert_eq!(day, 3),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_no_risk_when_always_above_threshold() {
        let result = project(&[1.0, 0.9], "Meropenem").unwrap();
        assert!(!result.contraindication_risk);
        assert_eq!(result.switch_day, Some(1));
    }

    #[test]
    fn test_summary_statistics() {
        let result = project(&[2.0, 1.4, 1.0], "Vancomycin").unwrap();
        let summary = result.summary.unwrap();
        assert_eq!(summary.min_crcl, 43.75);
        assert_eq!(summary.max_crcl, 87.5);
        assert!((summary.mean_crcl - 64.58).abs() < 1e-9);
        assert!((summary.crcl_change - 43.75).abs() < 1e-9);
    }

    #[test]
    fn test_empty_series() {
        let result = project(&[], "Meropenem").unwrap();
        assert!(result.points.is_empty());
        assert!(result.summary.is_none());
        assert_eq!(result.switch_day, None);
        assert!(!result.contraindication_risk);
    }

    #[test]
    fn test_unknown_drug_uses_reference_threshold() {
        let result = project(&[1.4], "NonexistentDrug").unwrap();
        assert!(result.used_fallback);
        assert_eq!(result.resolved_drug, "Meropenem");
        assert_eq!(result.crcl_threshold, 50.0);
    }
}
