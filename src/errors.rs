use thiserror::Error;

#[derive(Error, Debug)]
pub enum DosingError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid input for Day {day}: {message}")]
    InvalidDay { day: usize, message: String },

    #[error("Formulary error: {0}")]
    Formulary(String),

    #[error("Data parsing error: {0}")]
    Parse(String),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl DosingError {
    /// True for patient-input precondition failures, which end a single computation.
    pub fn is_validation(&self) -> bool {
        matches!(self, DosingError::Validation(_) | DosingError::InvalidDay { .. })
    }
}
