//! Hook command - feed an inbound SMS into the service
//!
//! Intended to be called by whatever receives the provider's webhook.

use std::path::Path;

use anyhow::Result;

use super::get_context;

pub fn run(data_dir: &Path, from: &str, body: &str, json: bool) -> Result<()> {
    let ctx = get_context(data_dir)?;
    let note = ctx.account_service.receive_inbound(from, body)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&note)?);
    } else {
        println!("Filed note {} for {}", note.id, from);
    }
    Ok(())
}
