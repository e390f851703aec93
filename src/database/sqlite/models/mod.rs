
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A generated worksheet saved to the history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Worksheet {
    pub id: i64,
    pub topic: String,
    pub subject: String,
    pub student_profile: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWorksheet {
    pub topic: String,
    pub subject: String,
    pub student_profile: String,
    pub content: String,
}

impl NewWorksheet {
    /// Names of the fields that are empty after trimming
    #[inline]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("topic", &self.topic),
            ("subject", &self.subject),
            ("student_profile", &self.student_profile),
            ("content", &self.content),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }
}
