//! Blocking HTTP implementation of [`TwitterApi`] against the v2 REST API.

use std::time::Duration;

use chrono::Utc;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::api::TwitterApi;
use crate::credentials::Credentials;
use crate::error::{ApiError, ApiResult, BleachError, Result};
use crate::oauth::OAuthApp;
use crate::types::{
    ApiProblem, DataEnvelope, DeletedResult, FollowingResult, LikedResult, ListEnvelope, Page,
    RetweetedResult, Tweet, TwitterList, User,
};

pub const DEFAULT_BASE_URL: &str = "https://api.twitter.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const FOLLOWING_PAGE_SIZE: u32 = 1000;
const LIKES_PAGE_SIZE: u32 = 50;
const TWEETS_PAGE_SIZE: u32 = 50;
const LISTS_PAGE_SIZE: u32 = 100;
const MEMBERS_PAGE_SIZE: u32 = 100;

const TWEET_FIELDS: &str = "created_at,referenced_tweets";

pub struct HttpClient {
    http: Client,
    base_url: String,
    credentials: Credentials,
    oauth: Option<OAuthApp>,
    refreshed: bool,
}

impl HttpClient {
    pub fn new(base_url: &str, credentials: Credentials, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bleach/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            oauth: None,
            refreshed: false,
        })
    }

    /// Enable credential refresh through `app`'s token endpoint.
    pub fn with_oauth(mut self, app: OAuthApp) -> Self {
        self.oauth = Some(app);
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// True once a refresh has replaced the credentials this client was
    /// built with.
    pub fn was_refreshed(&self) -> bool {
        self.refreshed
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.bearer_auth(&self.credentials.access_token)
    }

    /// Send and return the body of a 2xx response; classify anything else.
    fn send(&self, req: RequestBuilder) -> ApiResult<String> {
        let response = self.authed(req).send()?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.text()?;
        if status.is_success() {
            Ok(body)
        } else {
            let err = classify(status, &headers, &body);
            debug!(status = status.as_u16(), error = %err, "request failed");
            Err(err)
        }
    }

    fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        max_results: u32,
        cursor: Option<&str>,
        extra: &[(&str, &str)],
    ) -> ApiResult<Page<T>> {
        let mut query: Vec<(&str, String)> = vec![("max_results", max_results.to_string())];
        if let Some(token) = cursor {
            query.push(("pagination_token", token.to_string()));
        }
        query.extend(extra.iter().map(|(k, v)| (*k, v.to_string())));

        let body = self.send(self.http.get(self.url(path)).query(&query))?;
        let envelope: ListEnvelope<T> = parse(&body)?;
        envelope.into_page()
    }

    /// Send a mutation and check the boolean the platform reports back.
    fn mutate<R: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        confirmed: impl Fn(&R) -> bool,
        what: &str,
    ) -> ApiResult<()> {
        let body = self.send(req)?;
        let envelope: DataEnvelope<R> = parse(&body)?;
        if confirmed(&envelope.data) {
            Ok(())
        } else {
            Err(ApiError::Malformed(format!("{what} was not confirmed: {body}")))
        }
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("refresh_capable", &self.oauth.is_some())
            .finish_non_exhaustive()
    }
}

fn parse<T: DeserializeOwned>(body: &str) -> ApiResult<T> {
    serde_json::from_str(body).map_err(|e| ApiError::Malformed(e.to_string()))
}

/// Map a non-2xx response onto the loop's outcome classes.
pub fn classify(status: StatusCode, headers: &HeaderMap, body: &str) -> ApiError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited {
            retry_after: rate_limit_reset_in(headers),
        },
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized,
        s if s.is_server_error() => ApiError::ServiceUnavailable {
            status: Some(s.as_u16()),
        },
        s => {
            let message = serde_json::from_str::<ApiProblem>(body)
                .map(|p| p.message())
                .unwrap_or_else(|_| {
                    let trimmed = body.trim();
                    if trimmed.is_empty() {
                        s.canonical_reason().unwrap_or("unknown error").to_string()
                    } else {
                        trimmed.to_string()
                    }
                });
            ApiError::Other {
                status: Some(s.as_u16()),
                message,
            }
        }
    }
}

/// Time until the `x-rate-limit-reset` epoch, when the header is present
/// and in the future.
fn rate_limit_reset_in(headers: &HeaderMap) -> Option<Duration> {
    let reset: i64 = headers
        .get("x-rate-limit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())?;
    let remaining = reset - Utc::now().timestamp();
    (remaining > 0).then(|| Duration::from_secs(remaining as u64))
}

// ---------------------------------------------------------------------------
// TwitterApi
// ---------------------------------------------------------------------------

impl TwitterApi for HttpClient {
    fn me(&self) -> ApiResult<User> {
        let body = self.send(self.http.get(self.url("/2/users/me")))?;
        let envelope: DataEnvelope<User> = parse(&body)?;
        Ok(envelope.data)
    }

    fn following(&self, user_id: &str, cursor: Option<&str>) -> ApiResult<Page<User>> {
        self.get_page(
            &format!("/2/users/{user_id}/following"),
            FOLLOWING_PAGE_SIZE,
            cursor,
            &[],
        )
    }

    fn liked_tweets(&self, user_id: &str, cursor: Option<&str>) -> ApiResult<Page<Tweet>> {
        self.get_page(
            &format!("/2/users/{user_id}/liked_tweets"),
            LIKES_PAGE_SIZE,
            cursor,
            &[("tweet.fields", TWEET_FIELDS)],
        )
    }

    fn user_tweets(&self, user_id: &str, cursor: Option<&str>) -> ApiResult<Page<Tweet>> {
        self.get_page(
            &format!("/2/users/{user_id}/tweets"),
            TWEETS_PAGE_SIZE,
            cursor,
            &[("tweet.fields", TWEET_FIELDS)],
        )
    }

    fn owned_lists(&self, user_id: &str, cursor: Option<&str>) -> ApiResult<Page<TwitterList>> {
        self.get_page(
            &format!("/2/users/{user_id}/owned_lists"),
            LISTS_PAGE_SIZE,
            cursor,
            &[],
        )
    }

    fn list_members(&self, list_id: &str, cursor: Option<&str>) -> ApiResult<Page<User>> {
        self.get_page(
            &format!("/2/lists/{list_id}/members"),
            MEMBERS_PAGE_SIZE,
            cursor,
            &[],
        )
    }

    fn unfollow(&self, user_id: &str, target_user_id: &str) -> ApiResult<()> {
        let req = self
            .http
            .delete(self.url(&format!("/2/users/{user_id}/following/{target_user_id}")));
        self.mutate(req, |r: &FollowingResult| !r.following, "unfollow")
    }

    fn like(&self, user_id: &str, tweet_id: &str) -> ApiResult<()> {
        let req = self
            .http
            .post(self.url(&format!("/2/users/{user_id}/likes")))
            .json(&serde_json::json!({ "tweet_id": tweet_id }));
        self.mutate(req, |r: &LikedResult| r.liked, "like")
    }

    fn unlike(&self, user_id: &str, tweet_id: &str) -> ApiResult<()> {
        let req = self
            .http
            .delete(self.url(&format!("/2/users/{user_id}/likes/{tweet_id}")));
        self.mutate(req, |r: &LikedResult| !r.liked, "unlike")
    }

    fn delete_tweet(&self, tweet_id: &str) -> ApiResult<()> {
        let req = self.http.delete(self.url(&format!("/2/tweets/{tweet_id}")));
        self.mutate(req, |r: &DeletedResult| r.deleted, "delete")
    }

    fn unretweet(&self, user_id: &str, source_tweet_id: &str) -> ApiResult<()> {
        let req = self
            .http
            .delete(self.url(&format!("/2/users/{user_id}/retweets/{source_tweet_id}")));
        self.mutate(req, |r: &RetweetedResult| !r.retweeted, "unretweet")
    }

    fn delete_list(&self, list_id: &str) -> ApiResult<()> {
        let req = self.http.delete(self.url(&format!("/2/lists/{list_id}")));
        self.mutate(req, |r: &DeletedResult| r.deleted, "list delete")
    }

    fn refresh_credentials(&mut self) -> Result<()> {
        let app = self.oauth.as_ref().ok_or_else(|| {
            BleachError::RefreshUnavailable("no OAuth client id configured".into())
        })?;
        let refresh_token = self.credentials.refresh_token.as_deref().ok_or_else(|| {
            BleachError::RefreshUnavailable("session has no refresh token".into())
        })?;
        let fresh = app.refresh(&self.http, refresh_token)?;
        info!("obtained new access token");
        self.credentials = fresh;
        self.refreshed = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
