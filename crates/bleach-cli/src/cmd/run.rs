use anyhow::Context;
use bleach_core::config::{Config, OperationKind, WarnLevel};
use bleach_core::{Bleacher, ThreadSleeper};
use clap::Args;
use std::path::{Path, PathBuf};

use crate::context::{self, CredentialSource};
use crate::output::{print_json, print_report};

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Unfollow everyone (selecting any operation disables the unselected ones)
    #[arg(long)]
    pub follows: bool,

    /// Unlike every liked post
    #[arg(long)]
    pub likes: bool,

    /// Delete every post and undo every repost
    #[arg(long)]
    pub tweets: bool,

    /// Delete every owned list
    #[arg(long)]
    pub lists: bool,

    /// Stop each operation after this many items (one extra item is acted on)
    #[arg(long)]
    pub limit: Option<u64>,

    /// Do everything except the removing calls
    #[arg(long)]
    pub dry_run: bool,

    /// Append what gets removed to <DIR>/<operation>.csv
    #[arg(long, value_name = "DIR")]
    pub archive_dir: Option<PathBuf>,

    /// Like each post again before unliking it
    #[arg(long)]
    pub relike: bool,
}

impl RunArgs {
    fn selected(&self) -> Vec<OperationKind> {
        [
            (self.follows, OperationKind::Follows),
            (self.likes, OperationKind::Likes),
            (self.tweets, OperationKind::Tweets),
            (self.lists, OperationKind::Lists),
        ]
        .into_iter()
        .filter_map(|(on, kind)| on.then_some(kind))
        .collect()
    }

    /// Layer the command-line flags over the file config.
    pub fn apply(&self, config: &mut Config) {
        config.operations.select_only(&self.selected());
        if let Some(limit) = self.limit {
            config.operations.set_limit(limit);
        }
        if self.dry_run {
            config.dry_run = true;
        }
        if let Some(dir) = &self.archive_dir {
            config.archive.dir = Some(dir.clone());
        }
        if self.relike {
            config.operations.likes.relike = true;
        }
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

pub fn run(
    config_path: &Path,
    session: Option<&Path>,
    args: RunArgs,
    json: bool,
) -> anyhow::Result<()> {
    let mut config = context::load_config(config_path)?;
    args.apply(&mut config);

    let warnings = config.validate();
    for w in &warnings {
        match w.level {
            WarnLevel::Warning => tracing::warn!("{}", w.message),
            WarnLevel::Error => tracing::error!("{}", w.message),
        }
    }
    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors; see 'bleach config validate'");
    }

    let store = context::session_store(session)?;
    let (creds, source) = context::resolve_credentials(&store)?;
    if source == CredentialSource::Env {
        tracing::debug!("using access token from environment");
    }
    let client = context::build_client(&config, creds)?;

    let sleeper = ThreadSleeper;
    let mut bleacher = Bleacher::new(client, config, &sleeper);
    let result = bleacher.run();
    let client = bleacher.into_api();
    context::persist_refresh(&client, source, &store)?;

    let report = result.context("bleach run failed")?;
    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    let failed: Vec<String> = report.failed().map(|o| o.operation.to_string()).collect();
    if !failed.is_empty() {
        anyhow::bail!("operation(s) failed: {}", failed.join(", "));
    }
    Ok(())
}
