use crate::{errors::DosingError, models::*, Result};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

pub struct PatientCsvParser;

impl PatientCsvParser {
    /// Parse a cohort file with columns `ID,AGE,WT,SCR,SEX,DRUG`.
    ///
    /// Values are read as-is; positivity is checked later by the estimator so
    /// a bad row fails only that patient.
    pub fn parse_patients<P: AsRef<Path>>(file_path: P) -> Result<Vec<PatientRecord>> {
        let rows = Self::read_rows(file_path)?;

        rows.iter()
            .map(|row| -> Result<PatientRecord> {
                Ok(PatientRecord {
                    id: Self::parse_string(row, "ID")?,
                    parameters: PatientParameters {
                        age: Self::parse_int(row, "AGE")?,
                        weight: Self::parse_float(row, "WT")?,
                        serum_creatinine: Self::parse_float(row, "SCR")?,
                        sex: Self::parse_string(row, "SEX")?.parse()?,
                    },
                    drug_name: Self::parse_string(row, "DRUG")?,
                })
            })
            .collect()
    }

    /// Parse daily measurements with columns `DAY,SCR`, returned in day order.
    ///
    /// Rows may appear in any order, but the days must be exactly `1..=n`.
    pub fn parse_daily_creatinine<P: AsRef<Path>>(file_path: P) -> Result<Vec<f64>> {
        let rows = Self::read_rows(file_path)?;

        let mut measurements = rows
            .iter()
            .map(|row| -> Result<(i32, f64)> {
                Ok((Self::parse_int(row, "DAY")?, Self::parse_float(row, "SCR")?))
            })
            .collect::<Result<Vec<_>>>()?;
        measurements.sort_by_key(|(day, _)| *day);

        for pair in measurements.windows(2) {
            if pair[0].0 == pair[1].0 {
                return Err(DosingError::Parse(format!(
                    "Duplicate measurement for day {}",
                    pair[0].0
                )));
            }
        }

        // Days are numbered by position downstream, so they must run 1..=n.
        for (expected, (day, _)) in (1..).zip(&measurements) {
            if *day != expected {
                return Err(DosingError::Parse(format!(
                    "Expected day {} but found day {}; days must run consecutively from 1",
                    expected, day
                )));
            }
        }

        Ok(measurements.into_iter().map(|(_, scr)| scr).collect())
    }

    fn read_rows<P: AsRef<Path>>(file_path: P) -> Result<Vec<HashMap<String, String>>> {
        let file = File::open(file_path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.to_uppercase())
            .collect();

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            let row = headers
                .iter()
                .cloned()
                .zip(record.iter().map(str::to_string))
                .collect();
            rows.push(row);
        }

        Ok(rows)
    }

    fn parse_string(row: &HashMap<String, String>, key: &str) -> Result<String> {
        row.get(key)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| DosingError::Parse(format!("Missing column: {}", key)))
    }

    fn parse_float(row: &HashMap<String, String>, key: &str) -> Result<f64> {
        row.get(key)
            .ok_or_else(|| DosingError::Parse(format!("Missing column: {}", key)))?
            .parse::<f64>()
            .map_err(|_| DosingError::Parse(format!("Invalid float value for {}", key)))
    }

    fn parse_int(row: &HashMap<String, String>, key: &str) -> Result<i32> {
        row.get(key)
            .ok_or_else(|| DosingError::Parse(format!("Missing column: {}", key)))?
            .parse::<i32>()
            .map_err(|_| DosingError::Parse(format!("Invalid integer value for {}", key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_patients() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("patients.csv");
        fs::write(
            &path,
            "ID,AGE,WT,SCR,SEX,DRUG\n1,50,70,1.4,M,Meropenem\n2, 65 ,55.5,2.1,Female,Gentamicin\n",
        )
        .unwrap();

        let records = PatientCsvParser::parse_patients(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].parameters.sex, Sex::Male);
        assert_eq!(records[1].parameters.age, 65);
        assert_eq!(records[1].drug_name, "Gentamicin");
    }

    #[test]
    fn test_parse_patients_rejects_bad_number() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("patients.csv");
        fs::write(&path, "ID,AGE,WT,SCR,SEX,DRUG\n1,fifty,70,1.4,M,Meropenem\n").unwrap();

        let err = PatientCsvParser::parse_patients(&path).unwrap_err();
        assert!(matches!(err, DosingError::Parse(_)));
    }

    #[test]
    fn test_parse_daily_creatinine_orders_by_day() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("daily.csv");
        fs::write(&path, "day,scr\n2,1.2\n1,1.4\n3,1.0\n").unwrap();

        let values = PatientCsvParser::parse_daily_creatinine(&path).unwrap();
        assert_eq!(values, vec![1.4, 1.2, 1.0]);
    }

    #[test]
    fn test_parse_daily_creatinine_rejects_duplicate_day() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("daily.csv");
        fs::write(&path, "DAY,SCR\n1,1.4\n1,1.2\n").unwrap();

        assert!(PatientCsvParser::parse_daily_creatinine(&path).is_err());
    }

    #[test]
    fn test_parse_daily_creatinine_rejects_missing_day() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("daily.csv");
        fs::write(&path, "DAY,SCR\n1,2.0\n2,1.8\n5,1.4\n").unwrap();

        let err = PatientCsvParser::parse_daily_creatinine(&path).unwrap_err();
        assert!(matches!(err, DosingError::Parse(_)));
        assert!(err.to_string().contains("found day 5"));
    }

    #[test]
    fn test_parse_daily_creatinine_rejects_day_zero() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("daily.csv");
        fs::write(&path, "DAY,SCR\n0,1.4\n1,1.2\n2,1.0\n").unwrap();

        let err = PatientCsvParser::parse_daily_creatinine(&path).unwrap_err();
        assert!(matches!(err, DosingError::Parse(_)));

        fs::write(&path, "DAY,SCR\n-1,1.4\n1,1.2\n").unwrap();
        assert!(PatientCsvParser::parse_daily_creatinine(&path).is_err());
    }
}
