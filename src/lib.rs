//! Renal dose adjustment library
//!
//! Estimates creatinine clearance with the Cockcroft-Gault equation, maps it onto
//! banded per-drug dosing rules, and projects daily serum creatinine series to find
//! the day a patient can return to the usual dose.

pub mod models;
pub mod renal;
pub mod formulary;
pub mod dosing;
pub mod trend;
pub mod batch;
pub mod parser;
pub mod output;
pub mod session;
pub mod example_data;
pub mod errors;

pub use models::*;
pub use errors::*;
pub use formulary::{default_formulary, Formulary};
pub use renal::CrclCalculator;
pub use dosing::DoseResolver;
pub use trend::TrendProjector;

/// Re-export commonly used types
pub type Result<T> = std::result::Result<T, DosingError>;
