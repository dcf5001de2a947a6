//! Activity logging flows: medication intake and journal entries.
//!
//! Both flows append a leaf record to the user's history and run through the
//! badge service so the first entry of each kind unlocks its badge.

use log::{error, info};
use shared::{BadgeFlag, HistoryKind, UserId};
use std::sync::Arc;

use crate::backend::domain::badge_service::BadgeService;
use crate::backend::domain::commands::activity::{
    ActivityResult, LogMedicationCommand, WriteJournalCommand,
};
use crate::backend::domain::models::activity::{
    ActivityValidationError, ValidatedJournal, ValidatedMedication,
};
use crate::backend::identity::IdentityService;
use crate::backend::storage::{DocumentStore, Fields, StoreError, UserPaths};

#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error(transparent)]
    Validation(#[from] ActivityValidationError),
    #[error("Please sign in to log activity")]
    NotSignedIn,
    #[error("Failed to save entry: {0}")]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct ActivityService {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityService>,
    badges: BadgeService,
    paths: UserPaths,
}

impl ActivityService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityService>,
        badges: BadgeService,
        paths: UserPaths,
    ) -> Self {
        Self {
            store,
            identity,
            badges,
            paths,
        }
    }

    pub async fn log_medication(&self, command: LogMedicationCommand) -> Result<ActivityResult, ActivityError> {
        let medication = ValidatedMedication::parse(&command.medication_name, &command.dosage)?;
        let user = self.require_user()?;

        let result = self
            .record(&user, HistoryKind::MedicationLogs, BadgeFlag::FirstMedication, medication.to_fields())
            .await?;
        info!(
            "Logged medication {} ({}) for {}",
            medication.medication_name, medication.dosage, user
        );
        Ok(result)
    }

    pub async fn write_journal(&self, command: WriteJournalCommand) -> Result<ActivityResult, ActivityError> {
        let journal = ValidatedJournal::parse(&command.text)?;
        let user = self.require_user()?;

        let result = self
            .record(&user, HistoryKind::Journal, BadgeFlag::FirstJournal, journal.to_fields())
            .await?;
        info!("Saved journal entry {} for {}", result.record_id, user);
        Ok(result)
    }

    fn require_user(&self) -> Result<UserId, ActivityError> {
        self.identity
            .current_identity()
            .ok_or(ActivityError::NotSignedIn)
    }

    async fn record(
        &self,
        user: &UserId,
        kind: HistoryKind,
        flag: BadgeFlag,
        fields: Fields,
    ) -> Result<ActivityResult, ActivityError> {
        let collection = self.paths.history(user, kind);
        let outcome = self
            .badges
            .run_first_action(user, flag, || {
                self.store.append_to_collection(&collection, fields)
            })
            .await
            .map_err(|e| {
                error!("Failed to save {} entry for {}: {}", kind, user, e);
                ActivityError::Store(e)
            })?;

        Ok(ActivityResult {
            record_id: outcome.value,
            badge_unlocked: outcome.badge_unlocked,
        })
    }
}
