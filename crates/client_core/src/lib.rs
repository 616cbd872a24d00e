pub mod config;
pub mod coordinator;
pub mod realtime;
pub mod rest;
pub mod subscription;
pub mod view_model;

pub use config::{load_settings, load_settings_file, resolve_backend_url, Settings};
pub use coordinator::{DualWriteCoordinator, RealtimeWrite, SubmitError, SubmitReport};
pub use realtime::{
    firebase::FirebaseRealtimeStore, memory::MemoryRealtimeStore, store_from_settings,
    RealtimeStore, SnapshotStream,
};
pub use rest::{RestClient, RestError};
pub use subscription::{SubscriptionHandle, SubscriptionManager};
pub use view_model::{Notice, NoticeKind, ViewEvent, ViewModel, ViewState};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
