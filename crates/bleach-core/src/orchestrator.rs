//! Runs the enabled bleach operations for one account, in order.
//!
//! The account is resolved once up front. Each operation then gets its own
//! loop and its own archive file; a failure in one operation is recorded in
//! the report and the next operation still runs.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::api::TwitterApi;
use crate::archive::ArchiveSink;
use crate::bulk::{BulkLoop, Sleeper};
use crate::config::{Config, OperationKind};
use crate::error::{ApiError, BleachError, Result};
use crate::ops::likes::RELIKE_PAUSE;
use crate::ops::{FollowsOp, LikesOp, ListsOp, TweetsOp};
use crate::paths;
use crate::types::User;

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct OperationReport {
    pub operation: OperationKind,
    pub acted: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BleachReport {
    pub user: User,
    pub dry_run: bool,
    pub operations: Vec<OperationReport>,
}

impl BleachReport {
    pub fn total_acted(&self) -> u64 {
        self.operations.iter().map(|o| o.acted).sum()
    }

    pub fn failed(&self) -> impl Iterator<Item = &OperationReport> {
        self.operations.iter().filter(|o| o.error.is_some())
    }
}

// ---------------------------------------------------------------------------
// Bleacher
// ---------------------------------------------------------------------------

/// An open archive sink and the file behind it, if any.
pub type OpenedArchive = Option<(ArchiveSink, Option<PathBuf>)>;

/// Produces the archive sink for one operation, or `None` for no archival.
pub type ArchiveOpener<'s> = Box<dyn FnMut(OperationKind) -> Result<OpenedArchive> + 's>;

pub struct Bleacher<'s, C> {
    api: C,
    config: Config,
    sleeper: &'s dyn Sleeper,
    open_archive: ArchiveOpener<'s>,
}

impl<'s, C: TwitterApi> Bleacher<'s, C> {
    /// Archives go to `config.archive.dir` when set.
    pub fn new(api: C, config: Config, sleeper: &'s dyn Sleeper) -> Self {
        let dir = config.archive.dir.clone();
        let open_archive: ArchiveOpener<'s> =
            Box::new(move |kind: OperationKind| -> Result<OpenedArchive> {
                match &dir {
                    Some(dir) => {
                        let path = paths::archive_path(dir, kind.as_str());
                        let sink = ArchiveSink::open(&path)?;
                        Ok(Some((sink, Some(path))))
                    }
                    None => Ok(None),
                }
            });
        Self {
            api,
            config,
            sleeper,
            open_archive,
        }
    }

    /// Replace how archive sinks are obtained.
    pub fn with_archive_opener(mut self, opener: ArchiveOpener<'s>) -> Self {
        self.open_archive = opener;
        self
    }

    pub fn api(&self) -> &C {
        &self.api
    }

    pub fn into_api(self) -> C {
        self.api
    }

    /// Resolve the account, refreshing credentials once if they were
    /// rejected.
    pub fn whoami(&mut self) -> Result<User> {
        match self.api.me() {
            Ok(user) => Ok(user),
            Err(ApiError::Unauthorized) => {
                info!("authentication failed, refreshing before resolving account");
                self.api.refresh_credentials()?;
                Ok(self.api.me()?)
            }
            Err(e) => Err(BleachError::Api(e)),
        }
    }

    pub fn run(&mut self) -> Result<BleachReport> {
        let user = self.whoami()?;
        info!(user_id = %user.id, username = %user.username, dry_run = self.config.dry_run, "bleaching account");

        let mut operations = Vec::new();
        for kind in self.config.operations.enabled() {
            operations.push(self.run_operation(kind, &user.id));
        }

        Ok(BleachReport {
            user,
            dry_run: self.config.dry_run,
            operations,
        })
    }

    fn run_operation(&mut self, kind: OperationKind, user_id: &str) -> OperationReport {
        let mut report = OperationReport {
            operation: kind,
            acted: 0,
            archive: None,
            error: None,
        };

        let mut sink = match (self.open_archive)(kind) {
            Ok(Some((sink, path))) => {
                report.archive = path;
                Some(sink)
            }
            Ok(None) => None,
            Err(e) => {
                error!(operation = %kind, error = %e, "could not open archive, skipping operation");
                report.error = Some(e.to_string());
                return report;
            }
        };

        info!(operation = %kind, "starting");
        let runner = BulkLoop::new(self.config.policy_for(kind), self.sleeper);
        let api = &mut self.api;
        let result = match kind {
            OperationKind::Follows => runner.run(api, &FollowsOp::new(user_id), sink.as_mut()),
            OperationKind::Likes => {
                let op = if self.config.operations.likes.relike {
                    LikesOp::new(user_id).with_relike(RELIKE_PAUSE, self.sleeper)
                } else {
                    LikesOp::new(user_id)
                };
                runner.run(api, &op, sink.as_mut())
            }
            OperationKind::Tweets => runner.run(api, &TweetsOp::new(user_id), sink.as_mut()),
            OperationKind::Lists => runner.run(api, &ListsOp::new(user_id), sink.as_mut()),
        };

        if let Some(sink) = sink.as_mut() {
            if let Err(e) = sink.flush() {
                warn!(operation = %kind, error = %e, "could not flush archive");
            }
        }

        match result {
            Ok(acted) => report.acted = acted,
            Err(e) => {
                error!(operation = %kind, error = %e, "operation aborted");
                report.error = Some(e.to_string());
            }
        }
        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
