use crate::error::{ApiResult, Result};
use crate::types::{Page, Tweet, TwitterList, User};

/// The platform operations the bleach loops drive.
///
/// Every call is classified into an [`ApiResult`]; implementations never
/// leak transport status codes to callers. Cursors passed in are either
/// `None` or a value returned verbatim by a previous page of the same
/// collection.
pub trait TwitterApi {
    /// Resolve the account the current credentials belong to.
    fn me(&self) -> ApiResult<User>;

    fn following(&self, user_id: &str, cursor: Option<&str>) -> ApiResult<Page<User>>;
    fn liked_tweets(&self, user_id: &str, cursor: Option<&str>) -> ApiResult<Page<Tweet>>;
    fn user_tweets(&self, user_id: &str, cursor: Option<&str>) -> ApiResult<Page<Tweet>>;
    fn owned_lists(&self, user_id: &str, cursor: Option<&str>) -> ApiResult<Page<TwitterList>>;
    fn list_members(&self, list_id: &str, cursor: Option<&str>) -> ApiResult<Page<User>>;

    fn unfollow(&self, user_id: &str, target_user_id: &str) -> ApiResult<()>;
    fn like(&self, user_id: &str, tweet_id: &str) -> ApiResult<()>;
    fn unlike(&self, user_id: &str, tweet_id: &str) -> ApiResult<()>;
    fn delete_tweet(&self, tweet_id: &str) -> ApiResult<()>;
    fn unretweet(&self, user_id: &str, source_tweet_id: &str) -> ApiResult<()>;
    fn delete_list(&self, list_id: &str) -> ApiResult<()>;

    /// Exchange the held refresh token for a new access token and replace
    /// the held credentials in place.
    ///
    /// Fails when the client has no refresh capability or the token
    /// endpoint does not report success.
    fn refresh_credentials(&mut self) -> Result<()>;
}
