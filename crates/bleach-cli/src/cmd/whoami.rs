use anyhow::Context;
use bleach_core::{Bleacher, ThreadSleeper};
use std::path::Path;

use crate::context;
use crate::output::print_json;

pub fn run(config_path: &Path, session: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let config = context::load_config(config_path)?;
    let store = context::session_store(session)?;
    let (creds, source) = context::resolve_credentials(&store)?;
    let client = context::build_client(&config, creds)?;

    let sleeper = ThreadSleeper;
    let mut bleacher = Bleacher::new(client, config, &sleeper);
    let result = bleacher.whoami();
    context::persist_refresh(&bleacher.into_api(), source, &store)?;
    let user = result.context("failed to resolve account")?;

    if json {
        print_json(&user)?;
    } else {
        println!("@{} ({}) id {}", user.username, user.name, user.id);
    }
    Ok(())
}
