//! Query-string paging parameters.
//!
//! `page` and `limit` arrive as raw strings so that junk values fall back to
//! the defaults instead of failing the request.

use serde::Deserialize;

use crate::config::PaginationConfig;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// Normalized `(page, limit)`: both ≥ 1, `limit` capped at `max_limit`.
pub fn resolve(query: &PageQuery, config: &PaginationConfig) -> (u64, u64) {
    let page = positive(query.page.as_deref()).unwrap_or(1);
    let limit = positive(query.limit.as_deref())
        .unwrap_or(config.default_limit)
        .min(config.max_limit);
    (page, limit)
}

fn positive(raw: Option<&str>) -> Option<u64> {
    raw?.trim().parse::<u64>().ok().filter(|n| *n > 0)
}
