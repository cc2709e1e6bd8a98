/// Default per-file size limit for every upload policy.
pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 10;

/// Default remote folder that uploaded objects are grouped under.
pub const DEFAULT_UPLOAD_FOLDER: &str = "outreach";

pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_LOCAL_STORAGE_PATH: &str = "./media";
pub const DEFAULT_LOCAL_STORAGE_BASE_URL: &str = "http://localhost:3000/media";

/// URI scheme used for locally registered preview handles.
pub const PREVIEW_URI_SCHEME: &str = "preview";

pub const BYTES_PER_MB: u64 = 1024 * 1024;
