//! Conversation and trend state for one interactive session.
//!
//! The history is owned by whoever drives the UI and passed in explicitly; the
//! dosing core never reads it.

use crate::{models::*, output::ReportFormatter, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const GUIDANCE_HEADER: &str = "\n\n**Additional Guidance from AI Model:**\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// External assistant that turns a prompt into free-text guidance.
pub trait GuidanceProvider {
    fn guidance(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionHistory {
    pub messages: Vec<ChatMessage>,
    pub trend_points: Vec<TrendPoint>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    /// Record one calculator submission: the request and the rendered outcome.
    ///
    /// Returns the assistant prompt when the calculation succeeded.
    pub fn record_calculation(
        &mut self,
        params: &PatientParameters,
        drug_name: &str,
        outcome: &Result<(CrclEstimate, DoseRecommendation)>,
    ) -> Option<String> {
        self.push(
            Role::User,
            format!(
                "Calculate dose for age {}, weight {} kg, serum creatinine {} mg/dL, gender {}, drug {}",
                params.age, params.weight, params.serum_creatinine, params.sex, drug_name
            ),
        );

        match outcome {
            Ok((estimate, rec)) => {
                let content = format!(
                    "{}\n\n{}\n\n**Dose Recommendation**: {}",
                    ReportFormatter::input_echo(params, drug_name),
                    ReportFormatter::calculation_steps(estimate),
                    ReportFormatter::dose_summary(rec)
                );
                self.push(Role::Assistant, content);
                Some(ReportFormatter::assistant_prompt(drug_name, estimate.crcl))
            }
            Err(e) => {
                self.push(Role::Assistant, format!("Error: {}", e));
                None
            }
        }
    }

    /// Ask the provider and append its reply to the latest assistant message.
    /// A provider failure leaves the history untouched.
    pub fn append_guidance<G: GuidanceProvider + ?Sized>(
        &mut self,
        provider: &G,
        prompt: &str,
    ) -> Result<()> {
        let response = provider.guidance(prompt)?;
        match self.messages.iter_mut().rev().find(|m| m.role == Role::Assistant) {
            Some(message) => {
                message.content.push_str(GUIDANCE_HEADER);
                message.content.push_str(&response);
            }
            None => self.push(Role::Assistant, response),
        }
        Ok(())
    }

    /// Replace the stored trend with a fresh projection; runs are never merged.
    pub fn record_trend(&mut self, trend: &TrendResult) {
        self.trend_points = trend.points.clone();
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.trend_points.clear();
    }
}
