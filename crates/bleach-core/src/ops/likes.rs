use std::time::Duration;

use crate::api::TwitterApi;
use crate::bulk::{Operation, Sleeper, ThreadSleeper};
use crate::error::ApiResult;
use crate::types::{Page, Tweet};

/// Pause between the re-like and the unlike.
pub const RELIKE_PAUSE: Duration = Duration::from_secs(2);

/// Unlike every post the subject has liked.
///
/// With `relike` each post is liked again before being unliked. The
/// platform keeps listing some likes whose unlike silently does nothing;
/// toggling the like clears them.
pub struct LikesOp<'s> {
    user_id: String,
    relike: bool,
    pause: Duration,
    sleeper: &'s dyn Sleeper,
}

impl LikesOp<'static> {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            relike: false,
            pause: RELIKE_PAUSE,
            sleeper: &ThreadSleeper,
        }
    }
}

impl<'s> LikesOp<'s> {
    pub fn with_relike<'t>(self, pause: Duration, sleeper: &'t dyn Sleeper) -> LikesOp<'t> {
        LikesOp {
            user_id: self.user_id,
            relike: true,
            pause,
            sleeper,
        }
    }
}

impl std::fmt::Debug for LikesOp<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LikesOp")
            .field("user_id", &self.user_id)
            .field("relike", &self.relike)
            .field("pause", &self.pause)
            .finish_non_exhaustive()
    }
}

impl<C: TwitterApi + ?Sized> Operation<C> for LikesOp<'_> {
    type Item = Tweet;

    fn name(&self) -> &'static str {
        "likes"
    }

    fn list_page(&self, api: &C, cursor: Option<&str>) -> ApiResult<Page<Tweet>> {
        api.liked_tweets(&self.user_id, cursor)
    }

    fn act(&self, api: &C, item: &Tweet) -> ApiResult<()> {
        if self.relike {
            api.like(&self.user_id, &item.id)?;
            self.sleeper.sleep(self.pause);
        }
        api.unlike(&self.user_id, &item.id)
    }
}
