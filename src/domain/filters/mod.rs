use crate::domain::entities::CacheEntity;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

pub mod descriptor;
pub mod message_filter;
pub mod poll_filter;
pub mod profile_filter;
pub mod serie_filter;
pub mod streak_filter;

pub use descriptor::{Clause, CmpOp, QueryDescriptor};
pub use message_filter::MessageFilter;
pub use poll_filter::PollFilter;
pub use profile_filter::ProfileFilter;
pub use serie_filter::SerieFilter;
pub use streak_filter::StreakFilter;

/// コレクションごとに名前付きで定義されるクエリ形。
///
/// 同じデータと同じ `now` に対して、`descriptor` のリモート実行と
/// `matches` のローカル実行は同じ部分集合を選ばなければならない。
pub trait EntityFilter: Clone + Send + Sync + 'static {
    type Entity: CacheEntity;

    /// リモート側のルール。`now` は秒精度に丸めて埋め込む。
    fn descriptor(&self, now: DateTime<Utc>) -> QueryDescriptor;

    /// ローカル側のルール。キャッシュ済みエンティティに対して評価する。
    fn matches(&self, entity: &Self::Entity, now: DateTime<Utc>) -> bool;

    /// 呼び出し側へ返す結果列の順序。
    fn compare(&self, a: &Self::Entity, b: &Self::Entity) -> Ordering;
}
