use serde::{Serialize, Deserialize};
use crate::challenge::{ChallengeStatus, ChallengeView};

fn default_page() -> u64 { 1 }
fn default_limit() -> u64 { 20 }

const MAX_LIMIT: u64 = 100;

/// Filters for `GET /challenges`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChallengeQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sport: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ChallengeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

impl Default for ChallengeQuery {
    fn default() -> Self {
        ChallengeQuery {
            sport: None,
            status: None,
            search: None,
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl ChallengeQuery {
    pub fn limit(&self) -> u64 {
        self.limit.clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit())
    }

    /// `team_names` are the display names of the teams involved; the search term is matched
    /// case-insensitively against them, the sport and the message.
    pub fn matches(&self, view: &ChallengeView, team_names: &[&str]) -> bool {
        if let Some(sport) = &self.sport {
            if !view.sport.eq_ignore_ascii_case(sport) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if view.status != status {
                return false;
            }
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            let hit = view.sport.to_lowercase().contains(&needle)
                || view.message.as_deref().is_some_and(|m| m.to_lowercase().contains(&needle))
                || team_names.iter().any(|n| n.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> Paginated<T> {
    /// Cut one page out of the full, already ordered result set.
    pub fn from_items(all: Vec<T>, query: &ChallengeQuery) -> Self {
        let total = all.len() as u64;
        let limit = query.limit();
        let total_pages = if total == 0 { 0 } else { total.div_ceil(limit) };
        let items = all
            .into_iter()
            .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
            .take(limit as usize)
            .collect();
        Paginated {
            items,
            total,
            page: query.page.max(1),
            limit,
            total_pages,
        }
    }
}
