use crate::application::ports::connectivity::{ConnectivityMonitor, ConnectivityStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// プラットフォームの到達性コールバックに駆動される接続状態モニター。
///
/// 現在値は単一ワードのアトミックとして保持し、変化は watch チャネルで
/// 配信する。同じ値の連続通知は送信側で抑制する。
pub struct NetworkStatusMonitor {
    online: Arc<AtomicBool>,
    tx: Arc<watch::Sender<bool>>,
}

impl NetworkStatusMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self {
            online: Arc::new(AtomicBool::new(initially_online)),
            tx: Arc::new(tx),
        }
    }

    /// プラットフォーム層へ渡す更新用ハンドル。
    pub fn handle(&self) -> ConnectivityHandle {
        ConnectivityHandle {
            online: Arc::clone(&self.online),
            tx: Arc::clone(&self.tx),
        }
    }
}

impl ConnectivityMonitor for NetworkStatusMonitor {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn observe(&self) -> ConnectivityStream {
        ConnectivityStream::new(self.tx.subscribe())
    }
}

/// 到達性コールバックから状態を流し込むハンドル。
#[derive(Clone)]
pub struct ConnectivityHandle {
    online: Arc<AtomicBool>,
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityHandle {
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        self.tx.send_if_modified(|current| {
            if *current != online {
                *current = online;
                true
            } else {
                false
            }
        });
    }

    /// プラットフォーム側の監視が失敗した。配送を保証できないため
    /// オフライン扱いに倒す。
    pub fn report_failure(&self, reason: &str) {
        tracing::warn!("Connectivity watch failed, assuming offline: {}", reason);
        self.set_online(false);
    }
}
