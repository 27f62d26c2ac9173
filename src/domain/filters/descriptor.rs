use crate::domain::value_objects::Collection;
use serde_json::Value;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn eval(self, lhs: i64, rhs: i64) -> bool {
        match self {
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
        }
    }
}

/// バックエンドが実行できる問い合わせ条件。
///
/// 時刻の比較は秒精度の整数で行う。フィールドが欠けているドキュメントは
/// `ArrayNotContains` を除きどの条件にも一致しない。
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Eq { field: &'static str, value: Value },
    ArrayContains { field: &'static str, value: Value },
    ArrayNotContains { field: &'static str, value: Value },
    Cmp { field: &'static str, op: CmpOp, value: i64 },
}

impl Clause {
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Clause::Eq { field, value } => doc.get(field) == Some(value),
            Clause::ArrayContains { field, value } => doc
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
            Clause::ArrayNotContains { field, value } => !doc
                .get(field)
                .and_then(Value::as_array)
                .is_some_and(|items| items.contains(value)),
            Clause::Cmp { field, op, value } => doc
                .get(field)
                .and_then(Value::as_i64)
                .is_some_and(|lhs| op.eval(lhs, *value)),
        }
    }
}

/// リモートデータソースへ渡す論理クエリ。
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    pub collection: Collection,
    pub clauses: Vec<Clause>,
}

impl QueryDescriptor {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            clauses: Vec::new(),
        }
    }

    pub fn with(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.clauses.iter().all(|clause| clause.matches(doc))
    }
}
