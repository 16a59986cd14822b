pub mod api;
pub mod config;
pub mod error;
pub mod store;

pub use api::{BackupApi, HttpBackupApi};
pub use config::{load_config, ClientConfig};
pub use error::{ApiClientError, StoreError};
pub use store::{
    Action, ActionOutcome, BackupStore, CreateOutcome, ErrorPolicy, Mutation, StoreEvent,
    StoreState,
};
