//! Encoding modules for batchburn

pub mod ffmpeg;

pub use ffmpeg::{
    build_burn_command, build_extract_command, build_filter_chain, build_preview_command,
    escape_filter_value, output_path, AudioMapping, BurnRequest, EncodeError, ExtractRequest,
    ExtractionError, PreviewRequest, NORMALIZED_PIX_FMT,
};
