use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    Human,
    Assistant,
    System,
}

/// One structured action the model took during an assistant turn, kept for the audit trail.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct ToolCallRecord {
    pub id: String,
    pub function_name: String,
    pub function_arguments: String,
    /// Human readable outcome of the action
    pub content: String,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct Message {
    pub persona: Persona,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRecord>,
}

impl Message {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            persona: Persona::Human,
            content: content.into(),
            tool_calls: vec![],
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            persona: Persona::Assistant,
            content: content.into(),
            tool_calls: vec![],
        }
    }
}

/// Named fields of a claim.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[serde(rename_all = "snake_case")]
pub enum ClaimField {
    PolicyholderName,
    PolicyholderEmail,
    PolicyholderPhone,
    PolicyholderContactInfo,
    PolicyNumber,
    IncidentDateTime,
    IncidentLocation,
    IncidentDescription,
    InvolvedParties,
    InjuriesDescription,
    VehicleInfo,
    Witnesses,
    PoliceReportNumber,
    ExtraDetails,
}

impl ClaimField {
    /// Fields the model may edit.  The policyholder phone comes from the caller id when a claim
    /// is opened; other contact details go to `PolicyholderContactInfo`.
    pub const EDITABLE: &'static [ClaimField] = &[
        ClaimField::PolicyholderName,
        ClaimField::PolicyholderEmail,
        ClaimField::PolicyholderContactInfo,
        ClaimField::PolicyNumber,
        ClaimField::IncidentDateTime,
        ClaimField::IncidentLocation,
        ClaimField::IncidentDescription,
        ClaimField::InvolvedParties,
        ClaimField::InjuriesDescription,
        ClaimField::VehicleInfo,
        ClaimField::Witnesses,
        ClaimField::PoliceReportNumber,
        ClaimField::ExtraDetails,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimField::PolicyholderName => "policyholder_name",
            ClaimField::PolicyholderEmail => "policyholder_email",
            ClaimField::PolicyholderPhone => "policyholder_phone",
            ClaimField::PolicyholderContactInfo => "policyholder_contact_info",
            ClaimField::PolicyNumber => "policy_number",
            ClaimField::IncidentDateTime => "incident_date_time",
            ClaimField::IncidentLocation => "incident_location",
            ClaimField::IncidentDescription => "incident_description",
            ClaimField::InvolvedParties => "involved_parties",
            ClaimField::InjuriesDescription => "injuries_description",
            ClaimField::VehicleInfo => "vehicle_info",
            ClaimField::Witnesses => "witnesses",
            ClaimField::PoliceReportNumber => "police_report_number",
            ClaimField::ExtraDetails => "extra_details",
        }
    }

    /// Editable field by name, `None` for unknown or read-only fields.
    pub fn parse(name: &str) -> Option<ClaimField> {
        Self::EDITABLE.iter().copied().find(|f| f.as_str() == name)
    }
}

/// The insurance claim under discussion, as a map of field to free text.
#[derive(Serialize, Deserialize, Clone, Default, PartialEq, Debug)]
#[serde(transparent)]
pub struct Claim(pub BTreeMap<ClaimField, String>);

impl Claim {
    /// A fresh claim for a caller, with the phone number already filled in.
    pub fn for_caller(phone_number: &str) -> Self {
        let mut claim = Self::default();
        claim.set(ClaimField::PolicyholderPhone, phone_number);
        claim
    }

    pub fn set(&mut self, field: ClaimField, value: impl Into<String>) {
        self.0.insert(field, value.into());
    }
}

#[cfg(test)]
impl Claim {
    pub fn get(&self, field: ClaimField) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct Reminder {
    pub title: String,
    pub description: String,
    pub due_date_time: String,
}

/// Durable history of one conversation with a phone number.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct CallRecord {
    pub id: Uuid,
    pub phone_number: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub claim: Claim,
    #[serde(default)]
    pub reminders: Vec<Reminder>,
    #[serde(default)]
    pub recognition_retry: u32,
    /// Set once the end-of-call side effects ran for the current connection
    #[serde(default)]
    pub call_ended: bool,
}

impl CallRecord {
    pub fn new(phone_number: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            phone_number: phone_number.into(),
            created_at: OffsetDateTime::now_utc(),
            messages: vec![],
            claim: Claim::default(),
            reminders: vec![],
            recognition_retry: 0,
            call_ended: false,
        }
    }

    /// Insert the reminder, or overwrite the one sharing its title.  Returns true when an
    /// existing entry was updated.
    pub fn upsert_reminder(&mut self, reminder: Reminder) -> bool {
        match self.reminders.iter_mut().find(|r| r.title == reminder.title) {
            Some(existing) => {
                existing.description = reminder.description;
                existing.due_date_time = reminder.due_date_time;
                true
            }
            None => {
                self.reminders.push(reminder);
                false
            }
        }
    }
}
