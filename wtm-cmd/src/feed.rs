use std::path::Path;
use wtm_core::registry::SettingsDocument;

/// Print the data feed of the saved tanks.
pub fn run_feed(data: &Path) -> anyhow::Result<()> {
    let document = SettingsDocument::load(data)?;
    println!("{}", wtm_core::feed::render(&document.water_tanks)?);
    Ok(())
}
