use tracing::debug;

use crate::api::TwitterApi;
use crate::archive::ArchiveSink;
use crate::bulk::{ArchiveTiming, BulkLoop, LoopPolicy, Operation};
use crate::error::{ApiResult, BleachError, Result};
use crate::types::{ListMember, Page, TwitterList};

/// Delete every list the subject owns.
///
/// Deleting a list also drops its membership, so lists are archived when
/// first seen: a `LIST` line for the list followed by one line per member.
#[derive(Debug, Clone)]
pub struct ListsOp {
    user_id: String,
}

impl ListsOp {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

impl<C: TwitterApi + ?Sized> Operation<C> for ListsOp {
    type Item = TwitterList;

    fn name(&self) -> &'static str {
        "lists"
    }

    fn list_page(&self, api: &C, cursor: Option<&str>) -> ApiResult<Page<TwitterList>> {
        api.owned_lists(&self.user_id, cursor)
    }

    fn act(&self, api: &C, item: &TwitterList) -> ApiResult<()> {
        api.delete_list(&item.id)
    }

    fn archive_timing(&self) -> ArchiveTiming {
        ArchiveTiming::BeforeAct
    }

    fn archive(
        &self,
        api: &mut C,
        item: &TwitterList,
        sink: &mut ArchiveSink,
        runner: &BulkLoop<'_>,
    ) -> Result<()> {
        sink.record(item).map_err(|source| BleachError::Archive {
            operation: "lists".to_string(),
            source,
        })?;

        // Members are paged by the same loop; nothing is mutated, every
        // member is just archived.
        let policy = LoopPolicy {
            limit: None,
            dry_run: true,
            ..runner.policy().clone()
        };
        let members = ListMembersOp::new(&item.id);
        let archived = BulkLoop::new(policy, runner.sleeper()).run(api, &members, Some(sink))?;
        debug!(list_id = %item.id, members = archived, "archived list members");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ListMembersOp
// ---------------------------------------------------------------------------

/// Pages through one list's members. Acting on a member does nothing.
#[derive(Debug, Clone)]
pub struct ListMembersOp {
    list_id: String,
}

impl ListMembersOp {
    pub fn new(list_id: impl Into<String>) -> Self {
        Self {
            list_id: list_id.into(),
        }
    }
}

impl<C: TwitterApi + ?Sized> Operation<C> for ListMembersOp {
    type Item = ListMember;

    fn name(&self) -> &'static str {
        "list members"
    }

    fn list_page(&self, api: &C, cursor: Option<&str>) -> ApiResult<Page<ListMember>> {
        let page = api.list_members(&self.list_id, cursor)?;
        Ok(Page {
            items: page
                .items
                .into_iter()
                .map(|user| ListMember {
                    list_id: self.list_id.clone(),
                    user,
                })
                .collect(),
            next_cursor: page.next_cursor,
        })
    }

    fn act(&self, _api: &C, _item: &ListMember) -> ApiResult<()> {
        Ok(())
    }
}
