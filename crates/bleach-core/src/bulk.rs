//! The paginate / act / retry / advance loop shared by every bleach
//! operation.
//!
//! One pass fetches a page, prepends whatever was rate limited on the
//! previous pass, and acts on each item in order. A rate-limited item is
//! queued for the next pass and the loop sleeps out the platform window
//! before moving on. An expired token is refreshed and the same page is
//! fetched again. A service outage resets pagination to the first page and
//! retries up to a fixed ceiling, after which the operation is abandoned.
//!
//! The return value is the number of items acted on. Normal exhaustion and
//! an abandoned run are not distinguished by the caller; the log line at
//! the end says which one happened.

use std::collections::{HashSet, VecDeque};
use std::fmt::Debug;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::api::TwitterApi;
use crate::archive::{ArchiveRecord, ArchiveSink};
use crate::error::{ApiError, ApiResult, BleachError, Result};
use crate::types::{Identified, Page};

/// Platform-imposed rate limit window.
pub const RATE_LIMIT_WAIT: Duration = Duration::from_secs(900);
pub const UNAVAILABLE_WAIT: Duration = Duration::from_secs(5);
pub const MAX_UNAVAILABLE_IN_A_ROW: u32 = 5;

// ---------------------------------------------------------------------------
// Sleeper
// ---------------------------------------------------------------------------

/// Blocking wait used for rate-limit and outage backoff.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

// ---------------------------------------------------------------------------
// LoopPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopPolicy {
    /// Stop once more than this many items have been acted on.
    ///
    /// The check runs before each action with `acted > limit`, so a limit of
    /// `L` performs `L + 1` actions when enough items exist.
    pub limit: Option<u64>,
    /// Run everything except the mutating call.
    pub dry_run: bool,
    pub rate_limit_wait: Duration,
    pub unavailable_wait: Duration,
    pub max_unavailable: u32,
    /// Consecutive malformed pages tolerated before giving up. `None` keeps
    /// refetching forever.
    pub max_malformed: Option<u32>,
}

impl Default for LoopPolicy {
    fn default() -> Self {
        Self {
            limit: None,
            dry_run: false,
            rate_limit_wait: RATE_LIMIT_WAIT,
            unavailable_wait: UNAVAILABLE_WAIT,
            max_unavailable: MAX_UNAVAILABLE_IN_A_ROW,
            max_malformed: None,
        }
    }
}

impl LoopPolicy {
    fn limit_exceeded(&self, acted: u64) -> bool {
        self.limit.is_some_and(|limit| acted > limit)
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveTiming {
    /// Archive once the action succeeded (or was skipped by a dry run).
    AfterAct,
    /// Archive when the item is first seen, before acting. Used when the
    /// action destroys data the archive needs.
    BeforeAct,
}

/// One resource binding for the bulk loop: how to list a page and how to
/// act on one item.
pub trait Operation<C: TwitterApi + ?Sized> {
    type Item: ArchiveRecord + Identified + Debug;

    fn name(&self) -> &'static str;

    fn list_page(&self, api: &C, cursor: Option<&str>) -> ApiResult<Page<Self::Item>>;

    fn act(&self, api: &C, item: &Self::Item) -> ApiResult<()>;

    fn archive_timing(&self) -> ArchiveTiming {
        ArchiveTiming::AfterAct
    }

    fn archive(
        &self,
        _api: &mut C,
        item: &Self::Item,
        sink: &mut ArchiveSink,
        _runner: &BulkLoop<'_>,
    ) -> Result<()> {
        sink.record(item).map_err(|source| BleachError::Archive {
            operation: self.name().to_string(),
            source,
        })
    }
}

// ---------------------------------------------------------------------------
// BulkLoop
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Termination {
    Exhausted,
    LimitReached,
    UnavailableCeiling,
    MalformedCeiling,
    RefreshFailed,
    Fatal(ApiError),
}

struct LoopState<T> {
    cursor: Option<String>,
    retry_queue: Vec<Pending<T>>,
    unavailable_in_a_row: u32,
    malformed_in_a_row: u32,
}

struct Pending<T> {
    item: T,
    carried: bool,
}

pub struct BulkLoop<'s> {
    policy: LoopPolicy,
    sleeper: &'s dyn Sleeper,
}

impl<'s> BulkLoop<'s> {
    pub fn new(policy: LoopPolicy, sleeper: &'s dyn Sleeper) -> Self {
        Self { policy, sleeper }
    }

    pub fn policy(&self) -> &LoopPolicy {
        &self.policy
    }

    pub fn sleeper(&self) -> &'s dyn Sleeper {
        self.sleeper
    }

    /// Drive `op` until pagination is exhausted, the limit is hit, or a
    /// failure ends the operation. Returns the number of items acted on.
    ///
    /// Only an archive write failure is returned as an error; every API
    /// failure is absorbed here and ends the loop with a log line.
    pub fn run<C, O>(&self, api: &mut C, op: &O, mut archive: Option<&mut ArchiveSink>) -> Result<u64>
    where
        C: TwitterApi + ?Sized,
        O: Operation<C>,
    {
        let operation = op.name();
        let timing = op.archive_timing();
        let mut acted: u64 = 0;
        // Ids archived ahead of their action; a refetched page must not
        // archive them again.
        let mut archived_before: HashSet<String> = HashSet::new();
        let mut state: LoopState<O::Item> = LoopState {
            cursor: None,
            retry_queue: Vec::new(),
            unavailable_in_a_row: 0,
            malformed_in_a_row: 0,
        };

        let end = loop {
            if self.policy.limit_exceeded(acted) {
                break Termination::LimitReached;
            }

            let page = match op.list_page(api, state.cursor.as_deref()) {
                Ok(page) => page,
                Err(e) => match self.recover(api, operation, e, &mut state) {
                    Ok(()) => continue,
                    Err(t) => break t,
                },
            };
            state.unavailable_in_a_row = 0;
            state.malformed_in_a_row = 0;

            let carried = std::mem::take(&mut state.retry_queue);
            debug!(
                operation,
                cursor = ?state.cursor,
                carried = carried.len(),
                fetched = page.items.len(),
                "processing page"
            );
            let mut work: VecDeque<Pending<O::Item>> = carried
                .into_iter()
                .map(|queued| Pending {
                    item: queued.item,
                    carried: true,
                })
                .chain(page.items.into_iter().map(|item| Pending {
                    item,
                    carried: false,
                }))
                .collect();

            let mut interrupted = None;
            while let Some(pending) = work.pop_front() {
                if self.policy.limit_exceeded(acted) {
                    break;
                }

                if timing == ArchiveTiming::BeforeAct {
                    if let Some(sink) = archive.as_deref_mut() {
                        if archived_before.insert(pending.item.id().to_string()) {
                            op.archive(api, &pending.item, sink, self)?;
                        }
                    }
                }

                let result = if self.policy.dry_run {
                    Ok(())
                } else {
                    op.act(api, &pending.item)
                };

                match result {
                    Ok(()) => {
                        acted += 1;
                        debug!(operation, item_id = pending.item.id(), acted, "acted on item");
                        if timing == ArchiveTiming::AfterAct {
                            if let Some(sink) = archive.as_deref_mut() {
                                op.archive(api, &pending.item, sink, self)?;
                            }
                        }
                    }
                    Err(ApiError::RateLimited { retry_after }) => {
                        info!(
                            operation,
                            acted,
                            platform_reset = ?retry_after,
                            wait_secs = self.policy.rate_limit_wait.as_secs(),
                            "rate limit exceeded, waiting out the window"
                        );
                        state.retry_queue.push(pending);
                        self.sleeper.sleep(self.policy.rate_limit_wait);
                    }
                    Err(ApiError::Malformed(reason)) => {
                        warn!(operation, item_id = pending.item.id(), %reason, "unexpected mutation response, skipping item");
                    }
                    Err(e) => {
                        if e == ApiError::Unauthorized {
                            // Page items come back on the refetch, including
                            // any queued earlier in this pass; only carried
                            // items would otherwise be lost.
                            state.retry_queue.retain(|p| p.carried);
                            if pending.carried {
                                state.retry_queue.push(pending);
                            }
                            state
                                .retry_queue
                                .extend(work.drain(..).filter(|p| p.carried));
                        }
                        interrupted = Some(e);
                        break;
                    }
                }
            }

            if let Some(e) = interrupted {
                match self.recover(api, operation, e, &mut state) {
                    Ok(()) => continue,
                    Err(t) => break t,
                }
            }

            match page.next_cursor {
                Some(next) => state.cursor = Some(next),
                None => break Termination::Exhausted,
            }
        };

        self.log_end(operation, acted, &end, state.retry_queue.len());
        Ok(acted)
    }

    /// Decide whether a failed fetch or action can be retried. `Ok` means
    /// fetch again with whatever cursor `state` now holds.
    fn recover<C, T>(
        &self,
        api: &mut C,
        operation: &str,
        err: ApiError,
        state: &mut LoopState<T>,
    ) -> std::result::Result<(), Termination>
    where
        C: TwitterApi + ?Sized,
    {
        match err {
            ApiError::Unauthorized => {
                info!(operation, "authentication failed, access token may have expired");
                match api.refresh_credentials() {
                    Ok(()) => {
                        info!(operation, "access token refreshed");
                        Ok(())
                    }
                    Err(e) => {
                        error!(operation, error = %e, "could not refresh access token");
                        Err(Termination::RefreshFailed)
                    }
                }
            }
            ApiError::ServiceUnavailable { status } => {
                state.unavailable_in_a_row += 1;
                if state.unavailable_in_a_row < self.policy.max_unavailable {
                    info!(
                        operation,
                        ?status,
                        attempt = state.unavailable_in_a_row,
                        wait_secs = self.policy.unavailable_wait.as_secs(),
                        "service unavailable, resetting pagination and trying again"
                    );
                    state.retry_queue.clear();
                    state.cursor = None;
                    self.sleeper.sleep(self.policy.unavailable_wait);
                    Ok(())
                } else {
                    Err(Termination::UnavailableCeiling)
                }
            }
            ApiError::RateLimited { retry_after } => {
                info!(
                    operation,
                    platform_reset = ?retry_after,
                    wait_secs = self.policy.rate_limit_wait.as_secs(),
                    "page fetch rate limited, waiting out the window"
                );
                self.sleeper.sleep(self.policy.rate_limit_wait);
                Ok(())
            }
            ApiError::Malformed(reason) => {
                state.malformed_in_a_row += 1;
                warn!(
                    operation,
                    %reason,
                    attempt = state.malformed_in_a_row,
                    "page response not understood, fetching again"
                );
                match self.policy.max_malformed {
                    Some(max) if state.malformed_in_a_row >= max => {
                        Err(Termination::MalformedCeiling)
                    }
                    _ => Ok(()),
                }
            }
            other @ ApiError::Other { .. } => Err(Termination::Fatal(other)),
        }
    }

    fn log_end(&self, operation: &str, acted: u64, end: &Termination, abandoned: usize) {
        match end {
            Termination::Exhausted => {
                if abandoned > 0 {
                    warn!(operation, abandoned, "last page reached with rate-limited items still queued");
                }
                info!(operation, acted, "no more pages")
            }
            Termination::LimitReached => info!(operation, acted, limit = ?self.policy.limit, "limit reached"),
            Termination::UnavailableCeiling => error!(
                operation,
                acted,
                failures = self.policy.max_unavailable,
                "service unavailable too many times in a row, bailing"
            ),
            Termination::MalformedCeiling => error!(
                operation,
                acted,
                "too many malformed pages in a row, bailing"
            ),
            Termination::RefreshFailed => error!(operation, acted, "giving up after failed token refresh"),
            Termination::Fatal(e) => error!(operation, acted, error = %e, "unrecoverable api error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{user, FakeApi, RecordingSleeper, SharedBuffer};
    use crate::types::User;
    use std::cell::{Cell, RefCell};

    /// Operation that serves scripted pages and action results instead of
    /// talking to the api.
    #[derive(Default)]
    struct ScriptedOp {
        pages: RefCell<VecDeque<ApiResult<Page<User>>>>,
        acts: RefCell<VecDeque<ApiResult<()>>>,
        fetched_with: RefCell<Vec<Option<String>>>,
        acted_on: RefCell<Vec<String>>,
        endless: bool,
        generated: Cell<u32>,
    }

    impl ScriptedOp {
        fn with_pages(pages: Vec<ApiResult<Page<User>>>) -> Self {
            Self {
                pages: RefCell::new(pages.into()),
                ..Default::default()
            }
        }

        fn endless() -> Self {
            Self {
                endless: true,
                ..Default::default()
            }
        }

        fn script_acts(&self, acts: Vec<ApiResult<()>>) {
            *self.acts.borrow_mut() = acts.into();
        }

        fn acted_on(&self) -> Vec<String> {
            self.acted_on.borrow().clone()
        }

        fn fetched_with(&self) -> Vec<Option<String>> {
            self.fetched_with.borrow().clone()
        }
    }

    impl Operation<FakeApi> for ScriptedOp {
        type Item = User;

        fn name(&self) -> &'static str {
            "scripted"
        }

        fn list_page(&self, _api: &FakeApi, cursor: Option<&str>) -> ApiResult<Page<User>> {
            self.fetched_with.borrow_mut().push(cursor.map(str::to_string));
            if let Some(next) = self.pages.borrow_mut().pop_front() {
                return next;
            }
            if self.endless {
                let n = self.generated.get();
                self.generated.set(n + 2);
                let cursor = format!("c{n}");
                return Ok(Page::new(
                    vec![user(&format!("g{n}")), user(&format!("g{}", n + 1))],
                    Some(cursor.as_str()),
                ));
            }
            Ok(Page::last(vec![]))
        }

        fn act(&self, _api: &FakeApi, item: &User) -> ApiResult<()> {
            self.acted_on.borrow_mut().push(item.id.clone());
            self.acts.borrow_mut().pop_front().unwrap_or(Ok(()))
        }
    }

    fn users(ids: &[&str]) -> Vec<User> {
        ids.iter().map(|id| user(id)).collect()
    }

    fn run(op: &ScriptedOp, policy: LoopPolicy) -> (u64, FakeApi, RecordingSleeper) {
        let mut api = FakeApi::default();
        let sleeper = RecordingSleeper::default();
        let acted = BulkLoop::new(policy, &sleeper).run(&mut api, op, None).unwrap();
        (acted, api, sleeper)
    }

    #[test]
    fn three_pages_of_two_are_all_acted_on_and_archived_in_order() {
        let op = ScriptedOp::with_pages(vec![
            Ok(Page::new(users(&["1", "2"]), Some("p2"))),
            Ok(Page::new(users(&["3", "4"]), Some("p3"))),
            Ok(Page::last(users(&["5", "6"]))),
        ]);
        let buf = SharedBuffer::default();
        let mut sink = ArchiveSink::new(buf.clone());
        let mut api = FakeApi::default();
        let sleeper = RecordingSleeper::default();

        let acted = BulkLoop::new(LoopPolicy::default(), &sleeper)
            .run(&mut api, &op, Some(&mut sink))
            .unwrap();
        drop(sink);

        assert_eq!(acted, 6);
        let lines: Vec<String> = buf.contents().lines().map(str::to_string).collect();
        assert_eq!(lines.len(), 6);
        let ids: Vec<&str> = lines.iter().map(|l| l.split(',').next().unwrap()).collect();
        assert_eq!(ids, ["1", "2", "3", "4", "5", "6"]);
        assert_eq!(
            op.fetched_with(),
            vec![None, Some("p2".to_string()), Some("p3".to_string())]
        );
        assert!(sleeper.sleeps().is_empty());
    }

    #[test]
    fn empty_page_with_cursor_does_not_end_pagination() {
        let op = ScriptedOp::with_pages(vec![
            Ok(Page::new(vec![], Some("p2"))),
            Ok(Page::new(vec![], Some("p3"))),
            Ok(Page::last(users(&["1"]))),
        ]);
        let (acted, _, _) = run(&op, LoopPolicy::default());
        assert_eq!(acted, 1);
        assert_eq!(op.fetched_with().len(), 3);
    }

    #[test]
    fn page_without_cursor_ends_even_with_items() {
        let op = ScriptedOp::with_pages(vec![
            Ok(Page::last(users(&["1", "2"]))),
            Ok(Page::last(users(&["never"]))),
        ]);
        let (acted, _, _) = run(&op, LoopPolicy::default());
        assert_eq!(acted, 2);
        assert_eq!(op.fetched_with().len(), 1);
    }

    #[test]
    fn rate_limited_items_are_retried_first_on_next_pass() {
        let op = ScriptedOp::with_pages(vec![
            Ok(Page::new(users(&["1", "2", "3"]), Some("p2"))),
            Ok(Page::last(users(&["4"]))),
        ]);
        op.script_acts(vec![
            Ok(()),
            Err(ApiError::RateLimited { retry_after: None }),
            Ok(()),
        ]);
        let (acted, _, sleeper) = run(&op, LoopPolicy::default());

        assert_eq!(acted, 4);
        assert_eq!(op.acted_on(), ["1", "2", "3", "2", "4"]);
        assert_eq!(sleeper.sleeps(), vec![RATE_LIMIT_WAIT]);
    }

    #[test]
    fn limit_performs_one_extra_action() {
        let op = ScriptedOp::endless();
        let (acted, _, _) = run(
            &op,
            LoopPolicy {
                limit: Some(2),
                ..Default::default()
            },
        );
        assert_eq!(acted, 3);
        assert_eq!(op.acted_on().len(), 3);
    }

    #[test]
    fn limit_zero_still_acts_once() {
        let op = ScriptedOp::endless();
        let (acted, _, _) = run(
            &op,
            LoopPolicy {
                limit: Some(0),
                ..Default::default()
            },
        );
        assert_eq!(acted, 1);
    }

    #[test]
    fn service_unavailable_resets_cursor_and_clears_retry_queue() {
        let op = ScriptedOp::with_pages(vec![
            Ok(Page::new(users(&["1", "2"]), Some("p2"))),
            Err(ApiError::ServiceUnavailable { status: Some(503) }),
            Ok(Page::last(users(&["3"]))),
        ]);
        op.script_acts(vec![
            Ok(()),
            Err(ApiError::RateLimited { retry_after: None }),
        ]);
        let (acted, _, sleeper) = run(&op, LoopPolicy::default());

        // "2" was queued, then dropped by the outage reset
        assert_eq!(op.acted_on(), ["1", "2", "3"]);
        assert_eq!(acted, 2);
        assert_eq!(
            op.fetched_with(),
            vec![None, Some("p2".to_string()), None]
        );
        assert_eq!(sleeper.sleeps(), vec![RATE_LIMIT_WAIT, UNAVAILABLE_WAIT]);
    }

    #[test]
    fn four_outages_in_a_row_are_retried() {
        let mut pages: Vec<ApiResult<Page<User>>> = (0..4)
            .map(|_| Err(ApiError::ServiceUnavailable { status: Some(503) }))
            .collect();
        pages.push(Ok(Page::last(users(&["1"]))));
        let op = ScriptedOp::with_pages(pages);
        let (acted, _, sleeper) = run(&op, LoopPolicy::default());
        assert_eq!(acted, 1);
        assert_eq!(sleeper.sleeps(), vec![UNAVAILABLE_WAIT; 4]);
    }

    #[test]
    fn five_outages_in_a_row_abandon_the_operation() {
        let mut pages: Vec<ApiResult<Page<User>>> = (0..5)
            .map(|_| Err(ApiError::ServiceUnavailable { status: Some(503) }))
            .collect();
        pages.push(Ok(Page::last(users(&["1"]))));
        let op = ScriptedOp::with_pages(pages);
        let (acted, _, sleeper) = run(&op, LoopPolicy::default());
        assert_eq!(acted, 0);
        assert_eq!(op.fetched_with().len(), 5);
        assert_eq!(sleeper.sleeps().len(), 4);
    }

    #[test]
    fn successful_fetch_resets_outage_counter() {
        let outage = || Err(ApiError::ServiceUnavailable { status: None });
        let op = ScriptedOp::with_pages(vec![
            outage(),
            outage(),
            outage(),
            outage(),
            Ok(Page::new(users(&["1"]), Some("p2"))),
            outage(),
            outage(),
            outage(),
            outage(),
            Ok(Page::last(users(&["2"]))),
        ]);
        let (acted, _, _) = run(&op, LoopPolicy::default());
        // the second run of outages restarts from the first page
        assert_eq!(acted, 2);
        assert_eq!(op.fetched_with().len(), 10);
    }

    #[test]
    fn unauthorized_fetch_refreshes_and_keeps_cursor() {
        let op = ScriptedOp::with_pages(vec![
            Ok(Page::new(users(&["1"]), Some("p2"))),
            Err(ApiError::Unauthorized),
            Ok(Page::last(users(&["2"]))),
        ]);
        let mut api = FakeApi::default();
        let sleeper = RecordingSleeper::default();
        let acted = BulkLoop::new(LoopPolicy::default(), &sleeper)
            .run(&mut api, &op, None)
            .unwrap();

        assert_eq!(acted, 2);
        assert_eq!(api.refreshes(), 1);
        assert_eq!(
            op.fetched_with(),
            vec![None, Some("p2".to_string()), Some("p2".to_string())]
        );
    }

    #[test]
    fn failed_refresh_ends_the_operation() {
        let op = ScriptedOp::with_pages(vec![
            Err(ApiError::Unauthorized),
            Ok(Page::last(users(&["1"]))),
        ]);
        let mut api = FakeApi {
            refresh_fails: true,
            ..Default::default()
        };
        let sleeper = RecordingSleeper::default();
        let acted = BulkLoop::new(LoopPolicy::default(), &sleeper)
            .run(&mut api, &op, None)
            .unwrap();
        assert_eq!(acted, 0);
        assert_eq!(op.fetched_with().len(), 1);
    }

    #[test]
    fn unauthorized_action_refetches_same_page_and_keeps_carried_items() {
        let op = ScriptedOp::with_pages(vec![
            Ok(Page::new(users(&["1", "2"]), Some("p2"))),
            Ok(Page::new(users(&["3", "4"]), Some("p3"))),
            // p2 again after the refresh
            Ok(Page::new(users(&["3", "4"]), Some("p3"))),
            Ok(Page::last(users(&["5"]))),
        ]);
        op.script_acts(vec![
            Ok(()),
            Err(ApiError::RateLimited { retry_after: None }),
            Err(ApiError::Unauthorized),
        ]);
        let mut api = FakeApi::default();
        let sleeper = RecordingSleeper::default();
        let acted = BulkLoop::new(LoopPolicy::default(), &sleeper)
            .run(&mut api, &op, None)
            .unwrap();

        assert_eq!(api.refreshes(), 1);
        assert_eq!(op.acted_on(), ["1", "2", "2", "2", "3", "4", "5"]);
        assert_eq!(acted, 5);
        assert_eq!(
            op.fetched_with(),
            vec![
                None,
                Some("p2".to_string()),
                Some("p2".to_string()),
                Some("p3".to_string())
            ]
        );
    }

    #[test]
    fn unauthorized_after_rate_limit_does_not_repeat_page_items() {
        let op = ScriptedOp::with_pages(vec![
            Ok(Page::last(users(&["1", "2", "3"]))),
            Ok(Page::last(users(&["1", "2", "3"]))),
        ]);
        op.script_acts(vec![
            Err(ApiError::RateLimited { retry_after: None }),
            Err(ApiError::Unauthorized),
        ]);
        let buf = SharedBuffer::default();
        let mut sink = ArchiveSink::new(buf.clone());
        let mut api = FakeApi::default();
        let sleeper = RecordingSleeper::default();

        let acted = BulkLoop::new(LoopPolicy::default(), &sleeper)
            .run(&mut api, &op, Some(&mut sink))
            .unwrap();
        drop(sink);

        assert_eq!(api.refreshes(), 1);
        assert_eq!(op.acted_on(), ["1", "2", "1", "2", "3"]);
        assert_eq!(acted, 3);
        assert_eq!(
            buf.contents(),
            "1,\"User 1\",user1\n2,\"User 2\",user2\n3,\"User 3\",user3\n"
        );
    }

    #[test]
    fn other_error_ends_the_operation() {
        let op = ScriptedOp::with_pages(vec![
            Ok(Page::new(users(&["1", "2"]), Some("p2"))),
            Ok(Page::last(users(&["3"]))),
        ]);
        op.script_acts(vec![
            Ok(()),
            Err(ApiError::Other {
                status: Some(403),
                message: "Forbidden".into(),
            }),
        ]);
        let (acted, _, _) = run(&op, LoopPolicy::default());
        assert_eq!(acted, 1);
        assert_eq!(op.fetched_with().len(), 1);
    }

    #[test]
    fn malformed_page_is_refetched_without_advancing() {
        let op = ScriptedOp::with_pages(vec![
            Ok(Page::new(users(&["1"]), Some("p2"))),
            Err(ApiError::Malformed("no meta".into())),
            Err(ApiError::Malformed("no meta".into())),
            Ok(Page::last(users(&["2"]))),
        ]);
        let (acted, _, sleeper) = run(&op, LoopPolicy::default());
        assert_eq!(acted, 2);
        assert_eq!(
            op.fetched_with(),
            vec![
                None,
                Some("p2".to_string()),
                Some("p2".to_string()),
                Some("p2".to_string())
            ]
        );
        assert!(sleeper.sleeps().is_empty());
    }

    #[test]
    fn malformed_ceiling_bounds_refetching_when_configured() {
        let op = ScriptedOp::with_pages(
            (0..10)
                .map(|_| Err(ApiError::Malformed("garbage".into())))
                .collect(),
        );
        let (acted, _, _) = run(
            &op,
            LoopPolicy {
                max_malformed: Some(3),
                ..Default::default()
            },
        );
        assert_eq!(acted, 0);
        assert_eq!(op.fetched_with().len(), 3);
    }

    #[test]
    fn malformed_action_response_skips_the_item() {
        let op = ScriptedOp::with_pages(vec![Ok(Page::last(users(&["1", "2"])))]);
        op.script_acts(vec![Err(ApiError::Malformed("deleted: false".into()))]);
        let (acted, _, _) = run(&op, LoopPolicy::default());
        assert_eq!(acted, 1);
        assert_eq!(op.acted_on(), ["1", "2"]);
    }

    #[test]
    fn rate_limited_fetch_waits_and_refetches_same_cursor() {
        let op = ScriptedOp::with_pages(vec![
            Ok(Page::new(users(&["1"]), Some("p2"))),
            Err(ApiError::RateLimited { retry_after: None }),
            Ok(Page::last(users(&["2"]))),
        ]);
        let (acted, _, sleeper) = run(&op, LoopPolicy::default());
        assert_eq!(acted, 2);
        assert_eq!(sleeper.sleeps(), vec![RATE_LIMIT_WAIT]);
        assert_eq!(op.fetched_with()[1], op.fetched_with()[2]);
    }

    #[test]
    fn dry_run_counts_and_archives_without_acting() {
        let op = ScriptedOp::with_pages(vec![
            Ok(Page::new(users(&["1", "2"]), Some("p2"))),
            Ok(Page::last(users(&["3"]))),
        ]);
        let buf = SharedBuffer::default();
        let mut sink = ArchiveSink::new(buf.clone());
        let mut api = FakeApi::default();
        let sleeper = RecordingSleeper::default();
        let policy = LoopPolicy {
            dry_run: true,
            ..Default::default()
        };

        let acted = BulkLoop::new(policy, &sleeper)
            .run(&mut api, &op, Some(&mut sink))
            .unwrap();

        assert_eq!(acted, 3);
        assert!(op.acted_on().is_empty());
        assert_eq!(sink.records(), 3);
    }

    #[test]
    fn rate_limited_items_are_not_archived_until_acted() {
        let op = ScriptedOp::with_pages(vec![
            Ok(Page::new(users(&["1", "2"]), Some("p2"))),
            Ok(Page::last(vec![])),
        ]);
        op.script_acts(vec![Err(ApiError::RateLimited { retry_after: None })]);
        let buf = SharedBuffer::default();
        let mut sink = ArchiveSink::new(buf.clone());
        let mut api = FakeApi::default();
        let sleeper = RecordingSleeper::default();

        BulkLoop::new(LoopPolicy::default(), &sleeper)
            .run(&mut api, &op, Some(&mut sink))
            .unwrap();
        drop(sink);

        assert_eq!(buf.contents(), "2,\"User 2\",user2\n1,\"User 1\",user1\n");
    }
}
