//! Dumps every module schema as JSON, for host UIs and patch editors.

use anyhow::Result;

fn main() -> Result<()> {
    let schemas = cvkit_core::dsp::schema();
    println!("{}", serde_json::to_string_pretty(&schemas)?);
    Ok(())
}
