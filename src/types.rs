use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cluster label for articles with no sufficiently similar coverage.
pub const NOISE_LABEL: i64 = -1;

/// Editorial lean of an outlet, inherited by its articles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    Left,
    #[default]
    Center,
    Right,
}

impl Bias {
    /// Fixed category order. Ties in dominance resolve to the earliest entry.
    pub const ALL: [Bias; 3] = [Bias::Left, Bias::Center, Bias::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bias::Left => "left",
            Bias::Center => "center",
            Bias::Right => "right",
        }
    }

    /// Parses a stored label, treating anything unrecognised as `Center`.
    pub fn from_label(label: Option<&str>) -> Self {
        label.and_then(|l| l.parse().ok()).unwrap_or_default()
    }
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bias {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "left" => Ok(Bias::Left),
            "center" | "centre" => Ok(Bias::Center),
            "right" => Ok(Bias::Right),
            other => Err(format!("unknown bias label: {}", other)),
        }
    }
}

/// An article as stored by the scraping side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub category: Option<String>,
    pub outlet_id: Option<i64>,
    pub bias: Bias,
    pub image_url: Option<String>,
    pub issue_id: Option<String>,
}

/// One embedded article, handed from the vectorizer to the grouper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub article_id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub text_length: usize,
}

/// Cluster membership for one article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub article_id: i64,
    #[serde(default)]
    pub title: String,
    pub cluster_id: i64,
    #[serde(default)]
    pub text_length: usize,
}

impl ClusterAssignment {
    pub fn is_noise(&self) -> bool {
        self.cluster_id == NOISE_LABEL
    }
}

/// Links a cluster produced in this run to the issue created for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterIssueMapping {
    pub cluster_id: i64,
    pub issue_id: String,
}

/// A synthesized cross-outlet record for one real-world event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub image_url: Option<String>,
    pub bias_left_pct: f64,
    pub bias_center_pct: f64,
    pub bias_right_pct: f64,
    pub dominant_bias: Bias,
    pub source_count: i64,
    pub updated_at: String,
}

/// Article ids belonging to `cluster_id`, in assignment order.
pub fn article_ids_for_cluster(assignments: &[ClusterAssignment], cluster_id: i64) -> Vec<i64> {
    assignments
        .iter()
        .filter(|a| a.cluster_id == cluster_id)
        .map(|a| a.article_id)
        .collect()
}
