//! Patient and user records
//!
//! Form input arrives as loose strings; `NewPatient::validate` turns it into a
//! `ValidPatient` with a parsed birth date and a computed age.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Oldest birth date accepted, in years before today
pub const MAX_AGE_YEARS: i32 = 120;

/// Patient sex as recorded on the form
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
    Other,
}

impl Sex {
    /// Parse the short or long form in English or Portuguese
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "m" | "male" | "masculino" => Some(Sex::Male),
            "f" | "female" | "feminino" => Some(Sex::Female),
            "o" | "other" | "outro" => Some(Sex::Other),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
            Sex::Other => "other",
        }
    }
}

impl std::fmt::Display for Sex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Patient data as submitted, before validation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPatient {
    pub first_name: String,
    pub last_name: String,
    pub sex: String,
    /// `YYYY-MM-DD`
    pub birth_date: String,
}

/// Patient data that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidPatient {
    pub first_name: String,
    pub last_name: String,
    pub sex: Sex,
    pub birth_date: NaiveDate,
    pub age: u32,
}

impl NewPatient {
    /// Validate the form against `today`.
    ///
    /// Every field is required; the birth date must fall within the last
    /// `MAX_AGE_YEARS` years and not in the future.
    pub fn validate(&self, today: NaiveDate) -> Result<ValidPatient, String> {
        let first_name = self.first_name.trim();
        let last_name = self.last_name.trim();
        let sex = self.sex.trim();
        let birth = self.birth_date.trim();

        if first_name.is_empty() || last_name.is_empty() || sex.is_empty() || birth.is_empty() {
            return Err("Fill in first name, last name, sex and birth date".to_string());
        }

        let sex = Sex::parse(sex)
            .ok_or_else(|| format!("Unknown sex '{}'", sex))?;

        let birth_date = NaiveDate::parse_from_str(birth, "%Y-%m-%d")
            .map_err(|_| format!("Birth date '{}' must use YYYY-MM-DD", birth))?;

        if birth_date > today {
            return Err("Birth date cannot be in the future".to_string());
        }
        if birth_date < min_birth_date(today) {
            return Err(format!("Birth date cannot be more than {} years ago", MAX_AGE_YEARS));
        }

        Ok(ValidPatient {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            sex,
            birth_date,
            age: age_on(birth_date, today),
        })
    }
}

/// Earliest birth date accepted on `today`
pub fn min_birth_date(today: NaiveDate) -> NaiveDate {
    today
        .with_year(today.year() - MAX_AGE_YEARS)
        // 29 February has no counterpart in most years
        .or_else(|| NaiveDate::from_ymd_opt(today.year() - MAX_AGE_YEARS, 3, 1))
        .unwrap_or(NaiveDate::MIN)
}

/// Age in whole years on `today`
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> u32 {
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age.max(0) as u32
}

/// A stored patient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub sex: Sex,
    pub birth_date: NaiveDate,
    pub age: u32,
    /// Uploaded document paths, first one is analysed
    pub documents: Vec<PathBuf>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PatientRecord {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn primary_document(&self) -> Option<&Path> {
        self.documents.first().map(PathBuf::as_path)
    }
}

/// Row shown in the patient list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientSummary {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub sex: Sex,
    pub age: u32,
    pub document_count: usize,
}

/// A registered clinician
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn form(birth: &str) -> NewPatient {
        NewPatient {
            first_name: " Ana ".to_string(),
            last_name: "Souza".to_string(),
            sex: "F".to_string(),
            birth_date: birth.to_string(),
        }
    }

    #[test]
    fn test_age_before_and_after_birthday() {
        assert_eq!(age_on(date(1990, 6, 15), date(2024, 6, 14)), 33);
        assert_eq!(age_on(date(1990, 6, 15), date(2024, 6, 15)), 34);
        assert_eq!(age_on(date(2024, 1, 1), date(2024, 1, 1)), 0);
    }

    #[test]
    fn test_validate_trims_and_computes_age() {
        let valid = form("1990-06-15").validate(date(2024, 7, 1)).unwrap();
        assert_eq!(valid.first_name, "Ana");
        assert_eq!(valid.sex, Sex::Female);
        assert_eq!(valid.age, 34);
    }

    #[test]
    fn test_validate_rejects_bad_dates() {
        let today = date(2024, 7, 1);
        assert!(form("2030-01-01").validate(today).is_err());
        assert!(form("1890-01-01").validate(today).is_err());
        assert!(form("15/06/1990").validate(today).is_err());
        assert!(form("1904-07-01").validate(today).is_ok());
    }

    #[test]
    fn test_validate_requires_all_fields() {
        let mut patient = form("1990-06-15");
        patient.last_name = "  ".to_string();
        assert!(patient.validate(date(2024, 7, 1)).is_err());
    }

    #[test]
    fn test_sex_parse() {
        assert_eq!(Sex::parse("Masculino"), Some(Sex::Male));
        assert_eq!(Sex::parse("other"), Some(Sex::Other));
        assert_eq!(Sex::parse("x"), None);
    }

    #[test]
    fn test_min_birth_date_leap_day() {
        assert_eq!(min_birth_date(date(2024, 2, 29)), date(1904, 2, 29));
        assert_eq!(min_birth_date(date(2025, 3, 10)), date(1905, 3, 10));
    }
}
