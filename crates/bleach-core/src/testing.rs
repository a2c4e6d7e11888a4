//! In-memory doubles shared by the unit tests.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::io::{self, Write};
use std::rc::Rc;
use std::time::Duration;

use crate::api::TwitterApi;
use crate::bulk::Sleeper;
use crate::error::{ApiError, ApiResult, BleachError, Result};
use crate::types::{Page, Tweet, TwitterList, User};

pub fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        name: format!("User {id}"),
        username: format!("user{id}"),
    }
}

pub fn tweet(id: &str, text: &str) -> Tweet {
    Tweet {
        id: id.to_string(),
        text: text.to_string(),
        created_at: None,
        referenced_tweets: vec![],
    }
}

pub fn list(id: &str, name: &str) -> TwitterList {
    TwitterList {
        id: id.to_string(),
        name: name.to_string(),
    }
}

// ---------------------------------------------------------------------------
// SharedBuffer
// ---------------------------------------------------------------------------

/// A `Write` target that can still be read after being boxed into a sink.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A writer that refuses every write.
#[derive(Debug, Default)]
pub struct BrokenWriter;

impl Write for BrokenWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::other("disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingSleeper
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
    }
}

// ---------------------------------------------------------------------------
// FakeApi
// ---------------------------------------------------------------------------

/// Scripted [`TwitterApi`].
///
/// Each collection serves its queued pages in order and then reports an
/// empty last page. Mutating calls pop from `mutations`, succeeding once it
/// is empty. Every call is logged to `calls` as `"<endpoint> <args>"`.
#[derive(Debug, Default)]
pub struct FakeApi {
    pub me: Option<User>,
    pub following: RefCell<VecDeque<ApiResult<Page<User>>>>,
    pub liked: RefCell<VecDeque<ApiResult<Page<Tweet>>>>,
    pub tweets: RefCell<VecDeque<ApiResult<Page<Tweet>>>>,
    pub lists: RefCell<VecDeque<ApiResult<Page<TwitterList>>>>,
    pub members: RefCell<HashMap<String, VecDeque<ApiResult<Page<User>>>>>,
    pub mutations: RefCell<VecDeque<ApiResult<()>>>,
    pub calls: RefCell<Vec<String>>,
    pub refresh_fails: bool,
    pub refreshes: Cell<u32>,
}

impl FakeApi {
    pub fn refreshes(&self) -> u32 {
        self.refreshes.get()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn log(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    fn next_page<T>(queue: &RefCell<VecDeque<ApiResult<Page<T>>>>) -> ApiResult<Page<T>> {
        queue
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(Page::last(vec![])))
    }

    fn mutate(&self, call: String) -> ApiResult<()> {
        self.log(call);
        self.mutations.borrow_mut().pop_front().unwrap_or(Ok(()))
    }
}

impl TwitterApi for FakeApi {
    fn me(&self) -> ApiResult<User> {
        self.log("me".to_string());
        self.me.clone().ok_or(ApiError::Unauthorized)
    }

    fn following(&self, user_id: &str, cursor: Option<&str>) -> ApiResult<Page<User>> {
        self.log(format!("following {user_id} {cursor:?}"));
        Self::next_page(&self.following)
    }

    fn liked_tweets(&self, user_id: &str, cursor: Option<&str>) -> ApiResult<Page<Tweet>> {
        self.log(format!("liked_tweets {user_id} {cursor:?}"));
        Self::next_page(&self.liked)
    }

    fn user_tweets(&self, user_id: &str, cursor: Option<&str>) -> ApiResult<Page<Tweet>> {
        self.log(format!("user_tweets {user_id} {cursor:?}"));
        Self::next_page(&self.tweets)
    }

    fn owned_lists(&self, user_id: &str, cursor: Option<&str>) -> ApiResult<Page<TwitterList>> {
        self.log(format!("owned_lists {user_id} {cursor:?}"));
        Self::next_page(&self.lists)
    }

    fn list_members(&self, list_id: &str, cursor: Option<&str>) -> ApiResult<Page<User>> {
        self.log(format!("list_members {list_id} {cursor:?}"));
        self.members
            .borrow_mut()
            .get_mut(list_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Ok(Page::last(vec![])))
    }

    fn unfollow(&self, user_id: &str, target_user_id: &str) -> ApiResult<()> {
        self.mutate(format!("unfollow {user_id} {target_user_id}"))
    }

    fn like(&self, user_id: &str, tweet_id: &str) -> ApiResult<()> {
        self.mutate(format!("like {user_id} {tweet_id}"))
    }

    fn unlike(&self, user_id: &str, tweet_id: &str) -> ApiResult<()> {
        self.mutate(format!("unlike {user_id} {tweet_id}"))
    }

    fn delete_tweet(&self, tweet_id: &str) -> ApiResult<()> {
        self.mutate(format!("delete_tweet {tweet_id}"))
    }

    fn unretweet(&self, user_id: &str, source_tweet_id: &str) -> ApiResult<()> {
        self.mutate(format!("unretweet {user_id} {source_tweet_id}"))
    }

    fn delete_list(&self, list_id: &str) -> ApiResult<()> {
        self.mutate(format!("delete_list {list_id}"))
    }

    fn refresh_credentials(&mut self) -> Result<()> {
        self.refreshes.set(self.refreshes.get() + 1);
        self.log("refresh".to_string());
        if self.refresh_fails {
            return Err(BleachError::RefreshUnavailable("no refresh token".into()));
        }
        Ok(())
    }
}
