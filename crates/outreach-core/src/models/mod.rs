pub mod media_file;
pub mod upload;

pub use media_file::{content_type_for_extension, FileInfo, MediaFile};
pub use upload::{RemoteResult, UploadStatus};
