use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use shared::{
    domain::{Backup, BackupType, Settings, SettingsPatch},
    protocol::{BackupEntry, CreateBackupResponse},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    api::{BackupApi, HttpBackupApi},
    config::ClientConfig,
    error::{ApiClientError, StoreError},
};

pub const DEFAULT_REFRESH_DELAY: Duration = Duration::from_millis(2000);
const EVENT_CAPACITY: usize = 256;
const RESTORE_STARTED_MESSAGE: &str = "Restore initiated successfully";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreState {
    pub backups: Vec<Backup>,
    pub loading: bool,
    pub error: Option<String>,
    pub settings: Settings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    SetBackups(Vec<Backup>),
    SetLoading(bool),
    SetError(Option<String>),
    UpdateSettings(SettingsPatch),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    BackupsUpdated(Vec<Backup>),
    LoadingChanged(bool),
    ErrorChanged(Option<String>),
    SettingsUpdated(Settings),
}

impl StoreState {
    fn apply(&mut self, mutation: Mutation) -> StoreEvent {
        match mutation {
            Mutation::SetBackups(backups) => {
                self.backups = backups;
                StoreEvent::BackupsUpdated(self.backups.clone())
            }
            Mutation::SetLoading(loading) => {
                self.loading = loading;
                StoreEvent::LoadingChanged(loading)
            }
            Mutation::SetError(error) => {
                self.error = error;
                StoreEvent::ErrorChanged(self.error.clone())
            }
            Mutation::UpdateSettings(patch) => {
                self.settings = self.settings.merged(&patch);
                StoreEvent::SettingsUpdated(self.settings)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    FetchBackups,
    CreateBackup,
    RestoreBackup,
    DeleteBackup,
}

/// How an action reports a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    StateOnly,
    Propagate,
    OutcomeRecord,
}

impl Action {
    pub const ALL: [Action; 4] = [
        Action::FetchBackups,
        Action::CreateBackup,
        Action::RestoreBackup,
        Action::DeleteBackup,
    ];

    pub const fn error_policy(self) -> ErrorPolicy {
        match self {
            Action::FetchBackups => ErrorPolicy::StateOnly,
            Action::CreateBackup => ErrorPolicy::Propagate,
            Action::RestoreBackup | Action::DeleteBackup => ErrorPolicy::OutcomeRecord,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Action::FetchBackups => "fetch_backups",
            Action::CreateBackup => "create_backup",
            Action::RestoreBackup => "restore_backup",
            Action::DeleteBackup => "delete_backup",
        }
    }

    fn failure_prefix(self) -> &'static str {
        match self {
            Action::FetchBackups => "Failed to load backups",
            Action::CreateBackup => "Backup creation failed",
            Action::RestoreBackup => "Restore failed",
            Action::DeleteBackup => "Delete failed",
        }
    }

    fn failure_outcome(self, err: &ApiClientError) -> ActionOutcome {
        match self {
            Action::RestoreBackup => ActionOutcome::failed(Some(err.to_string())),
            _ => ActionOutcome::failed(None),
        }
    }
}

#[derive(Debug)]
enum Failure {
    Recorded,
    Raised(ApiClientError),
    Reported(ActionOutcome),
}

impl Failure {
    fn into_outcome(self) -> ActionOutcome {
        match self {
            Failure::Reported(outcome) => outcome,
            Failure::Raised(err) => ActionOutcome::failed(Some(err.to_string())),
            Failure::Recorded => ActionOutcome::failed(None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: Option<String>,
}

impl ActionOutcome {
    fn succeeded(message: Option<String>) -> Self {
        Self {
            success: true,
            message,
        }
    }

    fn failed(message: Option<String>) -> Self {
        Self {
            success: false,
            message,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateOutcome {
    pub status: Option<String>,
    pub output: Option<String>,
    pub backup_name: Option<String>,
}

impl From<CreateBackupResponse> for CreateOutcome {
    fn from(value: CreateBackupResponse) -> Self {
        Self {
            backup_name: value.resolved_backup_name(),
            status: value.status,
            output: value.output,
        }
    }
}

pub struct BackupStore {
    api: Arc<dyn BackupApi>,
    state: Mutex<StoreState>,
    events: broadcast::Sender<StoreEvent>,
    refresh_delay: Duration,
    refresh_tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BackupStore {
    pub fn new(api: Arc<dyn BackupApi>) -> Arc<Self> {
        Self::with_refresh_delay(api, DEFAULT_REFRESH_DELAY)
    }

    pub fn with_refresh_delay(api: Arc<dyn BackupApi>, refresh_delay: Duration) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            api,
            state: Mutex::new(StoreState::default()),
            events,
            refresh_delay,
            refresh_tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn from_config(config: &ClientConfig) -> anyhow::Result<Arc<Self>> {
        let api = HttpBackupApi::new(config)?;
        Ok(Self::with_refresh_delay(
            Arc::new(api),
            config.refresh_delay(),
        ))
    }

    pub fn refresh_delay(&self) -> Duration {
        self.refresh_delay
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> StoreState {
        self.state.lock().await.clone()
    }

    pub async fn backups(&self) -> Vec<Backup> {
        self.state.lock().await.backups.clone()
    }

    pub async fn settings(&self) -> Settings {
        self.state.lock().await.settings
    }

    pub async fn is_loading(&self) -> bool {
        self.state.lock().await.loading
    }

    pub async fn error(&self) -> Option<String> {
        self.state.lock().await.error.clone()
    }

    async fn commit(&self, mutation: Mutation) {
        let mut state = self.state.lock().await;
        let event = state.apply(mutation);
        // Sent under the lock so subscribers see events in commit order.
        let _ = self.events.send(event);
    }

    async fn begin(&self, action: Action) {
        debug!(action = action.name(), "store action started");
        self.commit(Mutation::SetLoading(true)).await;
        self.commit(Mutation::SetError(None)).await;
    }

    async fn finish(&self, action: Action) {
        self.commit(Mutation::SetLoading(false)).await;
        debug!(action = action.name(), "store action finished");
    }

    async fn record_failure(&self, action: Action, err: ApiClientError) -> Failure {
        let policy = action.error_policy();
        warn!(
            action = action.name(),
            ?policy,
            code = ?err.code(),
            error = %err,
            "store action failed"
        );
        let message = format!("{}: {err}", action.failure_prefix());
        self.commit(Mutation::SetError(Some(message))).await;

        match policy {
            ErrorPolicy::StateOnly => Failure::Recorded,
            ErrorPolicy::Propagate => Failure::Raised(err),
            ErrorPolicy::OutcomeRecord => Failure::Reported(action.failure_outcome(&err)),
        }
    }

    pub async fn fetch_backups(&self) {
        let action = Action::FetchBackups;
        self.begin(action).await;

        match self.api.list_backups().await {
            Ok(entries) => {
                let backups: Vec<Backup> =
                    entries.into_iter().map(BackupEntry::into_backup).collect();
                info!(count = backups.len(), "backup listing refreshed");
                self.commit(Mutation::SetBackups(backups)).await;
            }
            Err(err) => {
                self.record_failure(action, err).await;
            }
        }

        self.finish(action).await;
    }

    /// On success a listing refresh is scheduled after the refresh delay,
    /// outside this action's loading window.
    pub async fn create_backup(
        self: &Arc<Self>,
        backup_type: BackupType,
    ) -> Result<CreateOutcome, StoreError> {
        let action = Action::CreateBackup;
        self.begin(action).await;

        let result = match self.api.create_backup(backup_type).await {
            Ok(response) => {
                let outcome = CreateOutcome::from(response);
                info!(
                    %backup_type,
                    backup = outcome.backup_name.as_deref().unwrap_or("<unreported>"),
                    "backup creation accepted"
                );
                self.schedule_refresh().await;
                Ok(outcome)
            }
            Err(err) => match self.record_failure(action, err).await {
                Failure::Raised(err) => Err(StoreError::Create(err)),
                Failure::Recorded | Failure::Reported(_) => Ok(CreateOutcome::default()),
            },
        };

        self.finish(action).await;
        result
    }

    pub async fn restore_backup(&self, name: &str) -> ActionOutcome {
        let action = Action::RestoreBackup;
        self.begin(action).await;

        let outcome = match self.api.restore_backup(name).await {
            Ok(_) => {
                info!(backup = name, "backup restore initiated");
                ActionOutcome::succeeded(Some(RESTORE_STARTED_MESSAGE.to_string()))
            }
            Err(err) => self.record_failure(action, err).await.into_outcome(),
        };

        self.finish(action).await;
        outcome
    }

    pub async fn delete_backup(&self, id: &str) -> ActionOutcome {
        let action = Action::DeleteBackup;
        self.begin(action).await;

        let outcome = match self.api.delete_backup(id).await {
            Ok(_) => {
                info!(backup = id, "backup deleted");
                self.fetch_backups().await;
                ActionOutcome::succeeded(None)
            }
            Err(err) => self.record_failure(action, err).await.into_outcome(),
        };

        self.finish(action).await;
        outcome
    }

    pub async fn update_settings(&self, patch: SettingsPatch) -> Settings {
        let mut state = self.state.lock().await;
        let event = state.apply(Mutation::UpdateSettings(patch));
        let _ = self.events.send(event);
        state.settings
    }

    // The task only holds a weak reference, so a dropped store is never refreshed.
    async fn schedule_refresh(self: &Arc<Self>) {
        let store: Weak<Self> = Arc::downgrade(self);
        let delay = self.refresh_delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(store) = store.upgrade() else {
                debug!("store dropped before delayed refresh");
                return;
            };
            debug!("running delayed backup refresh");
            store.fetch_backups().await;
        });

        let mut tasks = self.refresh_tasks.lock().await;
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
        debug!(
            delay_ms = delay.as_millis() as u64,
            pending = tasks.len(),
            "delayed backup refresh scheduled"
        );
    }

    pub async fn pending_refreshes(&self) -> usize {
        let mut tasks = self.refresh_tasks.lock().await;
        tasks.retain(|task| !task.is_finished());
        tasks.len()
    }

    /// Waits for every refresh scheduled so far to run (or be cancelled).
    pub async fn settle(&self) {
        let tasks = std::mem::take(&mut *self.refresh_tasks.lock().await);
        for task in tasks {
            if let Err(err) = task.await {
                if !err.is_cancelled() {
                    warn!(error = %err, "delayed backup refresh task failed");
                }
            }
        }
    }

    pub async fn shutdown(&self) {
        let tasks = std::mem::take(&mut *self.refresh_tasks.lock().await);
        if !tasks.is_empty() {
            info!(count = tasks.len(), "cancelling pending backup refreshes");
        }
        for task in tasks {
            task.abort();
        }
    }
}

impl Drop for BackupStore {
    fn drop(&mut self) {
        for task in self.refresh_tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
