pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

pub use application::ports::connectivity::{ConnectivityMonitor, ConnectivityStream};
pub use application::ports::local_store::LocalStore;
pub use application::ports::remote_source::{RemoteDataSource, RemoteError, RemoteWrite};
pub use application::services::{
    CachedRepository, EntityWatch, MessageRepository, PollRepository, ProfileRepository,
    SerieRepository, StreakRepository,
};
pub use shared::config::{AppConfig, SyncConfig};
pub use shared::error::{AppError, Result};

/// ログ設定の初期化
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tsudoi_sync=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
