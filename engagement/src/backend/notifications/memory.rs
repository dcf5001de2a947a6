//! In-process notifier. Optionally mirrors its schedules to a YAML file so a
//! command-line session can see what earlier sessions installed.

use anyhow::Context;
use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use super::{
    LocalNotifier, NotificationChannel, NotificationContent, NotificationError, PermissionStatus,
    WeeklyTrigger,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledNotification {
    pub identifier: String,
    pub content: NotificationContent,
    pub trigger: WeeklyTrigger,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ScheduleFile {
    #[serde(default)]
    permission: PermissionStatus,
    #[serde(default)]
    schedules: Vec<ScheduledNotification>,
}

#[derive(Clone)]
struct NotifierState {
    permission: PermissionStatus,
    request_answer: PermissionStatus,
    channel: Option<NotificationChannel>,
    schedules: BTreeMap<String, ScheduledNotification>,
}

struct NotifierInner {
    state: Mutex<NotifierState>,
    file: Option<PathBuf>,
    failing: AtomicBool,
    request_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    schedule_calls: AtomicUsize,
}

#[derive(Clone)]
pub struct MemoryNotifier {
    inner: Arc<NotifierInner>,
}

impl MemoryNotifier {
    /// Permission starts undetermined; a request is answered with `Granted`
    pub fn new() -> Self {
        Self::with_permission(PermissionStatus::Undetermined)
    }

    pub fn with_permission(permission: PermissionStatus) -> Self {
        Self::build(permission, BTreeMap::new(), None)
    }

    /// Notifier backed by `schedules.yaml` inside `directory`
    pub fn open<P: AsRef<Path>>(directory: P) -> anyhow::Result<Self> {
        let file = directory.as_ref().join("schedules.yaml");
        let saved = if file.exists() {
            let yaml_content = fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            serde_yaml::from_str::<ScheduleFile>(&yaml_content)
                .with_context(|| format!("Failed to parse {}", file.display()))?
        } else {
            ScheduleFile::default()
        };

        info!(
            "Loaded {} notification schedules from {}",
            saved.schedules.len(),
            file.display()
        );
        let schedules = saved
            .schedules
            .into_iter()
            .map(|scheduled| (scheduled.identifier.clone(), scheduled))
            .collect();
        Ok(Self::build(saved.permission, schedules, Some(file)))
    }

    fn build(
        permission: PermissionStatus,
        schedules: BTreeMap<String, ScheduledNotification>,
        file: Option<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(NotifierInner {
                state: Mutex::new(NotifierState {
                    permission,
                    request_answer: PermissionStatus::Granted,
                    channel: None,
                    schedules,
                }),
                file,
                failing: AtomicBool::new(false),
                request_calls: AtomicUsize::new(0),
                cancel_calls: AtomicUsize::new(0),
                schedule_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// Change the permission, e.g. to simulate the user revoking it
    pub fn set_permission(&self, permission: PermissionStatus) {
        self.inner.state.lock().permission = permission;
    }

    /// What the user answers the next time they are prompted
    #[cfg(test)]
    pub fn set_request_answer(&self, answer: PermissionStatus) {
        self.inner.state.lock().request_answer = answer;
    }

    /// Make every `schedule` call fail with `Unavailable`
    #[cfg(test)]
    pub fn fail_schedules(&self, failing: bool) {
        self.inner.failing.store(failing, Ordering::SeqCst);
    }

    pub fn schedules(&self) -> Vec<ScheduledNotification> {
        self.inner.state.lock().schedules.values().cloned().collect()
    }

    pub fn schedule_for(&self, identifier: &str) -> Option<ScheduledNotification> {
        self.inner.state.lock().schedules.get(identifier).cloned()
    }

    pub fn channel(&self) -> Option<NotificationChannel> {
        self.inner.state.lock().channel.clone()
    }

    #[cfg(test)]
    pub fn request_calls(&self) -> usize {
        self.inner.request_calls.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn cancel_calls(&self) -> usize {
        self.inner.cancel_calls.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub fn schedule_calls(&self) -> usize {
        self.inner.schedule_calls.load(Ordering::SeqCst)
    }

    /// Apply `change` to a copy of the state, save the copy, then install it.
    /// Neither memory nor the file changes when `change` or the save fails.
    fn commit<T>(
        &self,
        change: impl FnOnce(&mut NotifierState) -> Result<T, NotificationError>,
    ) -> Result<T, NotificationError> {
        let mut state = self.inner.state.lock();
        let mut next = state.clone();
        let outcome = change(&mut next)?;
        self.save(&next)?;
        *state = next;
        Ok(outcome)
    }

    fn save(&self, state: &NotifierState) -> Result<(), NotificationError> {
        let file = match &self.inner.file {
            Some(file) => file,
            None => return Ok(()),
        };

        let snapshot = ScheduleFile {
            permission: state.permission,
            schedules: state.schedules.values().cloned().collect(),
        };
        let yaml_content =
            serde_yaml::to_string(&snapshot).context("Failed to serialize notification schedules")?;

        let temp_path = file.with_extension("tmp");
        fs::write(&temp_path, yaml_content)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        fs::rename(&temp_path, file)
            .with_context(|| format!("Failed to move {} into place", file.display()))?;
        debug!("Saved notification schedules to {:?}", file);
        Ok(())
    }
}

impl Default for MemoryNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalNotifier for MemoryNotifier {
    async fn configure_channel(&self, channel: &NotificationChannel) -> Result<(), NotificationError> {
        debug!("Configured notification channel '{}'", channel.id);
        self.inner.state.lock().channel = Some(channel.clone());
        Ok(())
    }

    async fn permission_status(&self) -> Result<PermissionStatus, NotificationError> {
        Ok(self.inner.state.lock().permission)
    }

    async fn request_permission(&self) -> Result<PermissionStatus, NotificationError> {
        self.inner.request_calls.fetch_add(1, Ordering::SeqCst);
        self.commit(|state| {
            state.permission = state.request_answer;
            Ok(state.permission)
        })
    }

    async fn cancel(&self, identifier: &str) -> Result<(), NotificationError> {
        self.inner.cancel_calls.fetch_add(1, Ordering::SeqCst);
        if self.schedule_for(identifier).is_none() {
            return Ok(());
        }
        self.commit(|state| {
            state.schedules.remove(identifier);
            Ok(())
        })?;
        debug!("Cancelled notification schedule {}", identifier);
        Ok(())
    }

    async fn schedule(
        &self,
        identifier: &str,
        content: NotificationContent,
        trigger: WeeklyTrigger,
    ) -> Result<(), NotificationError> {
        self.inner.schedule_calls.fetch_add(1, Ordering::SeqCst);
        trigger.validate()?;
        if self.inner.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::Unavailable("scheduler offline".to_string()));
        }

        let replaced = self.commit(|state| {
            if !state.permission.is_granted() {
                warn!("Refusing to schedule {}: permission {:?}", identifier, state.permission);
                return Err(NotificationError::PermissionDenied);
            }
            let scheduled = ScheduledNotification {
                identifier: identifier.to_string(),
                content,
                trigger,
            };
            Ok(state.schedules.insert(identifier.to_string(), scheduled).is_some())
        })?;
        if replaced {
            debug!("Replaced existing schedule {}", identifier);
        }
        Ok(())
    }
}
