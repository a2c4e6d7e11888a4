use crate::api::TwitterApi;
use crate::bulk::Operation;
use crate::error::ApiResult;
use crate::types::{Page, User};

/// Unfollow every account the subject follows.
#[derive(Debug, Clone)]
pub struct FollowsOp {
    user_id: String,
}

impl FollowsOp {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

impl<C: TwitterApi + ?Sized> Operation<C> for FollowsOp {
    type Item = User;

    fn name(&self) -> &'static str {
        "follows"
    }

    fn list_page(&self, api: &C, cursor: Option<&str>) -> ApiResult<Page<User>> {
        api.following(&self.user_id, cursor)
    }

    fn act(&self, api: &C, item: &User) -> ApiResult<()> {
        api.unfollow(&self.user_id, &item.id)
    }
}
