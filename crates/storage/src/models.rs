use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A scored client. Field names on the wire match the public API contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Client {
    pub id: i64,
    #[serde(rename = "OKVED2Name")]
    pub category_name: String,
    #[serde(rename = "leavingChance")]
    pub churn_score: f64,
}

impl Client {
    pub fn new(id: i64, category_name: impl Into<String>, churn_score: f64) -> Self {
        Self {
            id,
            category_name: category_name.into(),
            churn_score,
        }
    }
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientPatch {
    #[serde(rename = "OKVED2Name", default)]
    pub category_name: Option<String>,
    #[serde(rename = "leavingChance", default)]
    pub churn_score: Option<f64>,
}

impl ClientPatch {
    pub fn apply(self, mut client: Client) -> Client {
        if let Some(name) = self.category_name {
            client.category_name = name;
        }
        if let Some(score) = self.churn_score {
            client.churn_score = score;
        }
        client
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Upload {
    pub id: String,
    pub digest: String,
    pub root: String,
    pub cities: i64,
    pub created_at: i64,
}
