//! Local payload field names <-> remote column names.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::error::AppError;
use crate::models::{RecordKind, REMOTE_ID_FIELD};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownFieldPolicy {
    /// Local fields without a rule are left out of the remote row.
    #[default]
    Drop,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRule {
    pub local: &'static str,
    pub remote: &'static str,
    pub required: bool,
}

const fn rule(local: &'static str, remote: &'static str) -> FieldRule {
    FieldRule { local, remote, required: false }
}

const fn required(local: &'static str, remote: &'static str) -> FieldRule {
    FieldRule { local, remote, required: true }
}

const REGISTRATION_RULES: &[FieldRule] = &[
    required("childName", "child_name"),
    required("gender", "gender"),
    rule("dateOfBirth", "date_of_birth"),
    rule("ageMonths", "age_months"),
    rule("fatherName", "father_name"),
    rule("fatherOccupation", "father_occupation"),
    rule("motherName", "mother_name"),
    rule("motherOccupation", "mother_occupation"),
    rule("guardianContact", "guardian_contact"),
    rule("province", "province"),
    rule("district", "district"),
    rule("municipality", "municipality"),
    rule("wardNumber", "ward_number"),
    rule("tole", "tole"),
    rule("registrationDate", "registration_date"),
    rule("registeredBy", "registered_by"),
    rule("localId", "local_id"),
];

const SCREENING_RULES: &[FieldRule] = &[
    required("patientId", "registration_id"),
    required("doseDate", "dose_date"),
    rule("doseNumber", "dose_number"),
    rule("doseAmountMl", "dose_amount_ml"),
    rule("weightKg", "weight_kg"),
    rule("heightCm", "height_cm"),
    rule("temperature", "temperature"),
    rule("hasFever", "has_fever"),
    rule("hasCough", "has_cough"),
    rule("hasDiarrhea", "has_diarrhea"),
    rule("healthStatus", "health_status"),
    rule("sideEffects", "side_effects"),
    rule("administeredBy", "administered_by"),
    rule("remarks", "remarks"),
    rule("localId", "local_id"),
];

#[derive(Debug, Clone)]
pub struct FieldMapping {
    kind: RecordKind,
    rules: Vec<FieldRule>,
    unknown: UnknownFieldPolicy,
    remote_id_column: &'static str,
}

impl FieldMapping {
    pub fn new(kind: RecordKind, rules: Vec<FieldRule>, unknown: UnknownFieldPolicy) -> Self {
        Self {
            kind,
            rules,
            unknown,
            remote_id_column: "id",
        }
    }

    pub fn registrations() -> Self {
        Self::new(
            RecordKind::Registration,
            REGISTRATION_RULES.to_vec(),
            UnknownFieldPolicy::Drop,
        )
    }

    pub fn screenings() -> Self {
        Self::new(
            RecordKind::Screening,
            SCREENING_RULES.to_vec(),
            UnknownFieldPolicy::Drop,
        )
    }

    pub fn for_kind(kind: RecordKind) -> Self {
        match kind {
            RecordKind::Registration => Self::registrations(),
            RecordKind::Screening => Self::screenings(),
        }
    }

    pub fn with_unknown_policy(mut self, unknown: UnknownFieldPolicy) -> Self {
        self.unknown = unknown;
        self
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn remote_id_column(&self) -> &'static str {
        self.remote_id_column
    }

    /// Check the table is a bijection and, when the remote columns are
    /// known, that every target column exists.
    pub fn validate(&self, remote_columns: Option<&[&str]>) -> Result<(), AppError> {
        let mut locals = HashSet::new();
        let mut remotes = HashSet::new();

        for r in &self.rules {
            if r.local.is_empty() || r.remote.is_empty() {
                return Err(AppError::Config(format!(
                    "{} mapping has an empty field name",
                    self.kind
                )));
            }
            if !locals.insert(r.local) {
                return Err(AppError::Config(format!(
                    "{} mapping maps local field {} twice",
                    self.kind, r.local
                )));
            }
            if !remotes.insert(r.remote) {
                return Err(AppError::Config(format!(
                    "{} mapping targets remote column {} twice",
                    self.kind, r.remote
                )));
            }
            if let Some(columns) = remote_columns {
                if !columns.contains(&r.remote) {
                    return Err(AppError::Config(format!(
                        "{} mapping targets unknown remote column {}",
                        self.kind, r.remote
                    )));
                }
            }
        }

        Ok(())
    }

    /// Required local fields that are absent or null in `payload`.
    pub fn missing_required(&self, payload: &Map<String, Value>) -> Vec<&'static str> {
        self.rules
            .iter()
            .filter(|r| r.required)
            .filter(|r| payload.get(r.local).is_none_or(Value::is_null))
            .map(|r| r.local)
            .collect()
    }

    /// Rename a local payload into a remote row. Absent and null fields are
    /// omitted rather than sent as null.
    pub fn to_remote(&self, payload: &Map<String, Value>) -> Result<Map<String, Value>, AppError> {
        if self.unknown == UnknownFieldPolicy::Reject {
            if let Some(field) = payload
                .keys()
                .find(|k| k.as_str() != REMOTE_ID_FIELD && self.remote_name(k).is_none())
            {
                return Err(AppError::BadRequest(format!(
                    "unknown {} field: {}",
                    self.kind, field
                )));
            }
        }

        let mut row = Map::new();
        for r in &self.rules {
            match payload.get(r.local) {
                Some(Value::Null) | None => {}
                Some(value) => {
                    row.insert(r.remote.to_string(), value.clone());
                }
            }
        }
        Ok(row)
    }

    /// Rename a remote row back into local names. The remote id column is
    /// surfaced as `remoteId`; columns without a rule are dropped.
    pub fn to_local(&self, row: &Map<String, Value>) -> Map<String, Value> {
        let mut payload = Map::new();
        for (column, value) in row {
            if column == self.remote_id_column {
                payload.insert(REMOTE_ID_FIELD.to_string(), value.clone());
            } else if let Some(local) = self.local_name(column) {
                payload.insert(local.to_string(), value.clone());
            }
        }
        payload
    }

    /// Remote id of an inserted row, as a string.
    pub fn remote_id_of(&self, row: &Map<String, Value>) -> Option<String> {
        match row.get(self.remote_id_column)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn remote_name(&self, local: &str) -> Option<&'static str> {
        self.rules.iter().find(|r| r.local == local).map(|r| r.remote)
    }

    pub fn local_name(&self, remote: &str) -> Option<&'static str> {
        self.rules.iter().find(|r| r.remote == remote).map(|r| r.local)
    }
}
