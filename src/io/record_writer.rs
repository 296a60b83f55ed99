use crate::types::PipelineResult;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Write `record` as pretty-printed JSON, replacing any previous file.
///
/// The content goes to a sibling temporary file first and is renamed into
/// place, so readers never see a half-written record.
pub fn write_record<T: Serialize, P: AsRef<Path>>(path: P, record: &T) -> PipelineResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(record)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    log::info!("Record written to {}", path.display());
    Ok(())
}
