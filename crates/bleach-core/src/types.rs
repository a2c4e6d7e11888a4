use crate::error::ApiError;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

/// One fetched page of items plus the cursor for the page after it.
///
/// `next_cursor == None` is the only end-of-pagination signal; a page with
/// no items but a cursor is a normal mid-sequence page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, next_cursor: Option<&str>) -> Self {
        Self {
            items,
            next_cursor: next_cursor.map(str::to_string),
        }
    }

    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire envelopes
// ---------------------------------------------------------------------------

/// Collection response envelope for the v2 list endpoints.
///
/// `data` is omitted by the platform when a page has no results, `meta` is
/// always present. A body without `meta` is not a page we understand.
#[derive(Debug, Clone, Deserialize)]
pub struct ListEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    pub meta: Option<ResponseMeta>,
}

impl<T> ListEnvelope<T> {
    pub fn into_page(self) -> Result<Page<T>, ApiError> {
        let meta = self
            .meta
            .ok_or_else(|| ApiError::Malformed("response has no 'meta' object".into()))?;
        Ok(Page {
            items: self.data,
            next_cursor: meta.next_token.filter(|t| !t.is_empty()),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseMeta {
    #[serde(default)]
    pub result_count: Option<u32>,
    #[serde(default)]
    pub next_token: Option<String>,
}

/// Single-object response envelope (`/2/users/me`, mutation results).
#[derive(Debug, Clone, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

/// Problem object returned in error bodies.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiProblem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
}

impl ApiProblem {
    pub fn message(&self) -> String {
        self.detail
            .clone()
            .or_else(|| self.title.clone())
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// Anything with a stable platform identifier.
pub trait Identified {
    fn id(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencedTweet {
    #[serde(rename = "type")]
    pub ref_type: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tweet {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub referenced_tweets: Vec<ReferencedTweet>,
}

impl Identified for User {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Prefix the platform puts on the text of a repost.
pub const REPOST_PREFIX: &str = "RT ";

impl Tweet {
    pub fn is_repost(&self) -> bool {
        self.text.starts_with(REPOST_PREFIX)
    }

    /// Id of the original post a repost points at. Falls back to this
    /// item's own id when the platform omitted `referenced_tweets`.
    pub fn repost_source_id(&self) -> &str {
        self.referenced_tweets
            .iter()
            .find(|r| r.ref_type == "retweeted")
            .map(|r| r.id.as_str())
            .unwrap_or(&self.id)
    }
}

impl Identified for Tweet {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwitterList {
    pub id: String,
    pub name: String,
}

impl Identified for TwitterList {
    fn id(&self) -> &str {
        &self.id
    }
}

/// A member of an owned list, tagged with the list it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListMember {
    pub list_id: String,
    pub user: User,
}

impl Identified for ListMember {
    fn id(&self) -> &str {
        &self.user.id
    }
}

// ---------------------------------------------------------------------------
// Mutation results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct FollowingResult {
    pub following: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LikedResult {
    pub liked: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeletedResult {
    pub deleted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetweetedResult {
    pub retweeted: bool,
}

// ---------------------------------------------------------------------------
// OAuth token endpoint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}
