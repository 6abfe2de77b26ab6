use serde::{Deserialize, Serialize};

// Upstream's own rate-limit window as reported by `x-rate-limit-*` headers.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RateMeta {
    pub remaining: Option<i32>,
    pub limit: Option<i32>,
    pub reset_at: Option<String>,
}
