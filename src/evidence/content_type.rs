pub const OCTET_STREAM: &str = "application/octet-stream";

/// Extension to MIME type. Anything not listed is served as octet-stream.
const CONTENT_TYPES: &[(&str, &str)] = &[
    // Images
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    // Documents
    ("pdf", "application/pdf"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("xls", "application/vnd.ms-excel"),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    ("ppt", "application/vnd.ms-powerpoint"),
    (
        "pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
    // Video
    ("mp4", "video/mp4"),
    ("mov", "video/quicktime"),
    ("avi", "video/x-msvideo"),
    ("webm", "video/webm"),
    // Audio
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    // Archives
    ("zip", "application/zip"),
    ("rar", "application/x-rar-compressed"),
    ("7z", "application/x-7z-compressed"),
    // Text
    ("txt", "text/plain"),
    ("csv", "text/csv"),
    ("json", "application/json"),
    ("xml", "application/xml"),
    ("html", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
];

/// File type label for an uploaded file name: the lowercased text after the
/// last dot, or the whole lowercased name when there is no dot.
pub fn file_extension(file_name: &str) -> String {
    file_name
        .rsplit('.')
        .next()
        .unwrap_or(file_name)
        .to_lowercase()
}

pub fn content_type_for(extension: &str) -> &'static str {
    let extension = extension.to_lowercase();
    CONTENT_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
        .unwrap_or(OCTET_STREAM)
}
