use tokio::sync::watch;

/// ネットワーク到達性を監視するポート。
///
/// `is_online` は書き込み経路のゲートとして同期的に読む。
/// `observe` は読み取り経路のモード切り替えに使うストリームを返す。
pub trait ConnectivityMonitor: Send + Sync {
    /// 現在オンラインかどうか。失敗し得ない単一ワードの読み取り。
    fn is_online(&self) -> bool;

    /// 現在値から始まり、変化のたびに1回だけ値を流すストリーム。
    fn observe(&self) -> ConnectivityStream;
}

/// 接続状態の変化列。同じ値を連続して返さない。
pub struct ConnectivityStream {
    rx: watch::Receiver<bool>,
    last: Option<bool>,
}

impl ConnectivityStream {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx, last: None }
    }

    /// 次の状態を返す。初回は現在値。送信側が閉じたら `None`。
    pub async fn next(&mut self) -> Option<bool> {
        loop {
            match self.last {
                None => {
                    let current = *self.rx.borrow_and_update();
                    self.last = Some(current);
                    return Some(current);
                }
                Some(previous) => {
                    if self.rx.changed().await.is_err() {
                        return None;
                    }
                    let current = *self.rx.borrow_and_update();
                    if current != previous {
                        self.last = Some(current);
                        return Some(current);
                    }
                }
            }
        }
    }
}
