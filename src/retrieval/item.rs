//! Retrieved units and fused candidates

use serde::{Deserialize, Serialize};

/// Content and citation fields carried alongside a retrieved chunk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// Section text
    pub text: String,

    /// Title of the parent document
    pub title: String,

    /// Court identifier (KKO, KHO, HO, ...)
    pub court: Option<String>,

    /// Decision year
    pub year: Option<i32>,

    /// Case identifier such as `KKO:2022:18`
    pub case_id: Option<String>,

    pub section_type: Option<String>,
    pub section_title: Option<String>,
    pub url: Option<String>,

    #[serde(default)]
    pub legal_domains: Vec<String>,

    /// Owning tenant; `None` for globally shared content
    pub tenant: Option<String>,

    /// Position of the section within its document
    pub position: usize,
}

/// One retrieved unit from a single source
///
/// `score` is on the producing source's own scale and is never compared
/// across sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
    /// Section/chunk identifier
    pub id: String,

    /// Parent document identifier
    pub document_id: String,

    pub score: f32,

    pub payload: ChunkPayload,
}

impl ScoredItem {
    pub fn new(
        id: impl Into<String>,
        document_id: impl Into<String>,
        score: f32,
        payload: ChunkPayload,
    ) -> Self {
        Self {
            id: id.into(),
            document_id: document_id.into(),
            score,
            payload,
        }
    }
}

/// An item after rank fusion
///
/// `score` is a dimensionless rank-derived value. It is not a probability
/// and must not be compared with any per-source score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedCandidate {
    pub id: String,
    pub document_id: String,
    pub score: f64,

    /// Payload from the first list that produced this id
    pub payload: ChunkPayload,

    /// Number of lists the id appeared in
    pub appearances: usize,

    /// Best (smallest, 1-based) rank achieved in any list
    pub best_rank: usize,
}
