//! File fixtures.

use outreach_core::MediaFile;

pub const MB: usize = 1024 * 1024;

pub fn jpeg(name: &str, size: usize) -> MediaFile {
    MediaFile::new(name, "image/jpeg", vec![0xAB; size])
}

pub fn small_jpeg(name: &str) -> MediaFile {
    jpeg(name, 2048)
}

pub fn pdf(name: &str) -> MediaFile {
    MediaFile::new(name, "application/pdf", b"%PDF-1.4\n".to_vec())
}
