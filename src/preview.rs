//! Content-type negotiation for inline previews.
//!
//! Source and text files are served with a text type so browsers render them
//! instead of downloading. Everything else keeps the type recorded at upload.

const PREVIEW_TYPES: &[(&str, &str)] = &[
    ("py", "text/plain"),
    ("js", "text/javascript"),
    ("ts", "text/typescript"),
    ("jsx", "text/javascript"),
    ("tsx", "text/typescript"),
    ("html", "text/html"),
    ("css", "text/css"),
    ("scss", "text/css"),
    ("json", "application/json"),
    ("xml", "text/xml"),
    ("sql", "text/plain"),
    ("sh", "text/plain"),
    ("bash", "text/plain"),
    ("md", "text/markdown"),
    ("txt", "text/plain"),
    ("java", "text/plain"),
    ("cpp", "text/plain"),
    ("c", "text/plain"),
    ("cs", "text/plain"),
    ("php", "text/plain"),
    ("rb", "text/plain"),
    ("go", "text/plain"),
    ("rs", "text/plain"),
    ("swift", "text/plain"),
    ("kt", "text/plain"),
];

const FALLBACK_TYPE: &str = "application/octet-stream";

/// Lower-cased text after the last `.`, if any.
fn extension(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Response `Content-Type` for previewing `file_name`.
pub fn preview_content_type<'a>(file_name: &str, stored_type: &'a str) -> &'a str {
    let mapped = extension(file_name).and_then(|ext| {
        PREVIEW_TYPES
            .iter()
            .find(|(known, _)| *known == ext)
            .map(|(_, content_type)| *content_type)
    });

    match mapped {
        Some(content_type) => content_type,
        None if stored_type.is_empty() => FALLBACK_TYPE,
        None => stored_type,
    }
}

/// Type to record for an upload when the client did not send one.
pub fn guess_upload_type(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first_or_octet_stream()
        .to_string()
}
