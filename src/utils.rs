use crate::mpris::metadata::TrackMetadata;

/// Renders a playerctl-style template.
///
/// Supports `{{ status }}`, `{{ artist }}`, `{{ title }}` and `{{ album }}`, with any spacing
/// inside the braces. Unknown placeholders are left as written. Substituted values are never
/// scanned again.
pub fn format_metadata(format: &str, status: &str, track: &TrackMetadata) -> String {
    let mut out = String::with_capacity(format.len());
    let mut rest = format;

    while let Some(open) = rest.find("{{") {
        let Some(len) = rest[open + 2..].find("}}") else {
            break;
        };
        let close = open + 2 + len + 2;
        out.push_str(&rest[..open]);

        let value = match rest[open + 2..close - 2].trim() {
            "status" => status,
            "artist" => track.artist.as_str(),
            "title" => track.title.as_str(),
            "album" => track.album.as_str(),
            _ => &rest[open..close],
        };
        out.push_str(value.trim());
        rest = &rest[close..];
    }

    out.push_str(rest);
    out
}
