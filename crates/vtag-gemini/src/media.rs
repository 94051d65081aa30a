//! Media content type detection.

/// Content type assumed when nothing better is known.
pub const FALLBACK_VIDEO_MIME: &str = "video/mp4";

/// Guess a content type from a file name or URL path extension.
pub fn guess_mime_type(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "mpeg" | "mpg" => "video/mpeg",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        "3gp" => "video/3gpp",
        _ => FALLBACK_VIDEO_MIME,
    }
}

/// Prefer a server-reported media type over the extension guess.
pub fn resolve_mime_type(reported: Option<&str>, name: &str) -> String {
    let reported = reported
        .map(|value| value.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .filter(|value| value.starts_with("video/") || value.starts_with("audio/"));

    reported.unwrap_or_else(|| guess_mime_type(name).to_string())
}
