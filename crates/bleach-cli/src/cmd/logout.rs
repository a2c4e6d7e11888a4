use anyhow::Context;
use std::path::Path;

use crate::context;

pub fn run(session: Option<&Path>) -> anyhow::Result<()> {
    let store = context::session_store(session)?;
    let existed = store.path().exists();
    store
        .clear()
        .with_context(|| format!("failed to remove {}", store.path().display()))?;
    if existed {
        println!("Removed session {}", store.path().display());
    } else {
        println!("No session to remove.");
    }
    Ok(())
}
