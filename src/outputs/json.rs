//! JSON export of the article database.
//!
//! The export is an array of records in database order, for consumption
//! by external clients:
//!
//! ```json
//! [
//!   {
//!     "title": "TSMC expands in Arizona",
//!     "url": "https://example.com/tsmc",
//!     "date_processed": "2025-09-10",
//!     "image_path": "images/TSMC expands in Arizona.jpg",
//!     "image_alt_text": "...",
//!     "image_caption": "...",
//!     "reason": "High thematic relevance (Score: 8/10). Justification: ...",
//!     "summary": "- ..."
//!   }
//! ]
//! ```

use crate::models::ArticleRecord;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{error, info, instrument};

/// Write `records` as pretty-printed JSON to `path`, creating parent
/// directories as needed.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = records.len()))]
pub async fn write_records(records: &[ArticleRecord], path: &Path) -> Result<(), Box<dyn Error>> {
    let json = serde_json::to_string_pretty(records)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(parent).await {
            error!(dir = %parent.display(), error = %e, "Failed to create JSON dir");
            return Err(e.into());
        }
    }

    fs::write(path, json).await?;
    info!("Wrote JSON export");
    Ok(())
}
