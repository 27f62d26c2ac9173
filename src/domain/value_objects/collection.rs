use serde::{Deserialize, Serialize};
use std::fmt;

/// ローカルストアとリモートの双方で使う論理コレクション名。
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Messages,
    Polls,
    Series,
    Profiles,
    Streaks,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Messages,
        Collection::Polls,
        Collection::Series,
        Collection::Profiles,
        Collection::Streaks,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            Collection::Messages => "messages",
            Collection::Polls => "polls",
            Collection::Series => "series",
            Collection::Profiles => "profiles",
            Collection::Streaks => "streaks",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table_name())
    }
}
