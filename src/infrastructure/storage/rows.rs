use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct StoredDocRow {
    pub id: String,
    pub doc: String,
}
