//! Contact requests captured from the landing page (`leads`).

use crate::domain::TimeMs;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Sales pipeline stage of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Interested,
    Converted,
    NotInterested,
    Inactive,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Interested => "interested",
            LeadStatus::Converted => "converted",
            LeadStatus::NotInterested => "not_interested",
            LeadStatus::Inactive => "inactive",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "new" => Ok(LeadStatus::New),
            "contacted" => Ok(LeadStatus::Contacted),
            "interested" => Ok(LeadStatus::Interested),
            "converted" => Ok(LeadStatus::Converted),
            "not_interested" => Ok(LeadStatus::NotInterested),
            "inactive" => Ok(LeadStatus::Inactive),
            other => Err(format!("unknown lead status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lead {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub investment_size: String,
    pub message: Option<String>,
    pub consent_given: bool,
    pub status: LeadStatus,
    pub assigned_to: Option<String>,
    pub notes: Option<String>,
    pub source: String,
    pub follow_up_date: Option<TimeMs>,
    pub last_contact: Option<TimeMs>,
    pub language_preference: String,
    pub original_referrer: Option<String>,
    /// Free-form JSON object, `{}` when nothing was stored.
    pub additional_data: serde_json::Value,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
}

/// A contact form submission.
#[derive(Debug, Clone)]
pub struct NewLead {
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub investment_size: String,
    pub message: Option<String>,
    pub language_preference: String,
    pub original_referrer: Option<String>,
    pub additional_data: Option<serde_json::Value>,
}

/// Admin edit of a lead. The outer `None` leaves a field unchanged; an inner
/// `None` clears it.
#[derive(Debug, Clone)]
pub struct LeadUpdate {
    pub status: LeadStatus,
    pub notes: Option<Option<String>>,
    pub assigned_to: Option<Option<String>>,
    pub follow_up_date: Option<Option<TimeMs>>,
    pub additional_data: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lead_status_round_trips_through_text() {
        for status in [
            LeadStatus::New,
            LeadStatus::Contacted,
            LeadStatus::Interested,
            LeadStatus::Converted,
            LeadStatus::NotInterested,
            LeadStatus::Inactive,
        ] {
            assert_eq!(LeadStatus::from_str(status.as_str()), Ok(status));
        }
        assert!(LeadStatus::from_str("archived").is_err());
    }

    #[test]
    fn test_lead_status_serialization() {
        let json = serde_json::to_string(&LeadStatus::NotInterested).unwrap();
        assert_eq!(json, "\"not_interested\"");
    }
}
