//! `provisioner --print-schema`

use anyhow::{Context, Result};

pub fn run() -> Result<()> {
    let schema = serde_json::to_string_pretty(&crate::schema::config_schema())
        .context("Failed to serialize schema")?;
    println!("{schema}");
    Ok(())
}
