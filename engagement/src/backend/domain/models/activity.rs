use serde_json::Value;

use crate::backend::storage::{server_timestamp, Fields};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedMedication {
    pub medication_name: String,
    pub dosage: String,
}

impl ValidatedMedication {
    pub fn parse(medication_name: &str, dosage: &str) -> Result<Self, ActivityValidationError> {
        let medication_name = medication_name.trim();
        let dosage = dosage.trim();
        if medication_name.is_empty() {
            return Err(ActivityValidationError::EmptyMedicationName);
        }
        if dosage.is_empty() {
            return Err(ActivityValidationError::EmptyDosage);
        }
        Ok(Self {
            medication_name: medication_name.to_string(),
            dosage: dosage.to_string(),
        })
    }

    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("medicationName".to_string(), Value::from(self.medication_name.clone()));
        fields.insert("dosage".to_string(), Value::from(self.dosage.clone()));
        fields.insert("timestamp".to_string(), server_timestamp());
        fields
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedJournal {
    pub text: String,
}

impl ValidatedJournal {
    pub fn parse(text: &str) -> Result<Self, ActivityValidationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ActivityValidationError::EmptyJournalEntry);
        }
        Ok(Self {
            text: text.to_string(),
        })
    }

    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("text".to_string(), Value::from(self.text.clone()));
        fields.insert("timestamp".to_string(), server_timestamp());
        fields
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActivityValidationError {
    #[error("Please enter a medication name")]
    EmptyMedicationName,
    #[error("Please enter a dosage")]
    EmptyDosage,
    #[error("Please write something in your journal")]
    EmptyJournalEntry,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_medication_validation() {
        let medication = ValidatedMedication::parse(" Ibuprofen ", " 200mg").unwrap();
        assert_eq!(medication.medication_name, "Ibuprofen");
        assert_eq!(medication.dosage, "200mg");

        assert_eq!(
            ValidatedMedication::parse("", "200mg"),
            Err(ActivityValidationError::EmptyMedicationName)
        );
        assert_eq!(
            ValidatedMedication::parse("Ibuprofen", "  "),
            Err(ActivityValidationError::EmptyDosage)
        );
    }

    #[test]
    fn test_journal_validation() {
        assert_eq!(ValidatedJournal::parse(" felt good ").unwrap().text, "felt good");
        assert_eq!(
            ValidatedJournal::parse("\n\t"),
            Err(ActivityValidationError::EmptyJournalEntry)
        );
    }
}
