//! Preview of a folder's chosen tracks in ffplay.

use crate::context::WorkFolder;
use crate::encode::PreviewRequest;
use crate::toolkit::{MediaToolkit, ToolError};
use log::info;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("nothing to preview in {}", .0.display())]
    NothingToPreview(PathBuf),

    #[error("failed to launch preview: {0}")]
    Launch(#[from] ToolError),
}

/// Build the preview request for a folder without launching anything.
///
/// Uses the first pending file, or the first finished one once the folder is
/// complete.
pub fn preview_request(folder: &WorkFolder) -> Result<PreviewRequest, PreviewError> {
    let file = folder
        .pending
        .first()
        .or_else(|| folder.finished.first())
        .ok_or_else(|| PreviewError::NothingToPreview(folder.path.clone()))?;

    Ok(PreviewRequest {
        input: folder.path.join(file),
        audio_stream: folder.selected_audio,
        subtitle_ordinal: folder.subtitle_ordinal(),
    })
}

/// Launch a player on the folder's preview file and return immediately.
pub fn preview_folder<T: MediaToolkit + ?Sized>(
    toolkit: &T,
    folder: &WorkFolder,
) -> Result<PreviewRequest, PreviewError> {
    let request = preview_request(folder)?;
    info!("Previewing {}", request.input.display());
    toolkit.launch_preview(&request)?;
    Ok(request)
}
