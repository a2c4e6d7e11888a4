use crate::api::TwitterApi;
use crate::bulk::Operation;
use crate::error::ApiResult;
use crate::types::{Page, Tweet};

/// Delete every post on the subject's timeline, undoing reposts instead of
/// deleting them.
#[derive(Debug, Clone)]
pub struct TweetsOp {
    user_id: String,
}

impl TweetsOp {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

impl<C: TwitterApi + ?Sized> Operation<C> for TweetsOp {
    type Item = Tweet;

    fn name(&self) -> &'static str {
        "tweets"
    }

    fn list_page(&self, api: &C, cursor: Option<&str>) -> ApiResult<Page<Tweet>> {
        api.user_tweets(&self.user_id, cursor)
    }

    fn act(&self, api: &C, item: &Tweet) -> ApiResult<()> {
        if item.is_repost() {
            api.unretweet(&self.user_id, item.repost_source_id())
        } else {
            api.delete_tweet(&item.id)
        }
    }
}
