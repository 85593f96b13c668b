//! Best-effort screenshot evidence

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::browser::BrowserSession;
use crate::error::HarnessError;

/// Write a screenshot of the session's page to `path`.
///
/// Never fails outward: a missing screenshot is logged as a capture error and
/// reported as `None`.
pub async fn capture(session: &mut BrowserSession, path: &Path, full_page: bool) -> Option<PathBuf> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(parent) {
            let err = HarnessError::Capture {
                path: path.to_path_buf(),
                reason: e.to_string(),
            };
            warn!("{}", err);
            return None;
        }
    }

    match session.screenshot(path, full_page).await {
        Ok(()) => {
            info!("Screenshot saved to {}", path.display());
            Some(path.to_path_buf())
        }
        Err(e) => {
            let err = HarnessError::Capture {
                path: path.to_path_buf(),
                reason: e.to_string(),
            };
            warn!("{}", err);
            None
        }
    }
}
