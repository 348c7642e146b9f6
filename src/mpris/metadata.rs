//! Track metadata as read from an MPRIS player.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
}

/// Helper to extract a string that might be a single value or the first in an array.
/// The MPRIS spec says artist/album are arrays of strings, but some players send a single string.
fn extract_optional_string(
    variant: &dbus::arg::Variant<Box<dyn dbus::arg::RefArg + 'static>>,
) -> Option<String> {
    use dbus::arg::ArgType;
    match variant.0.arg_type() {
        ArgType::Array => variant
            .0
            .as_iter()
            .and_then(|mut iter| iter.next())
            .and_then(|v| v.as_str())
            .map(str::to_string),
        ArgType::String => variant.0.as_str().map(str::to_string),
        _ => None,
    }
}

/// Extract metadata fields from a D-Bus property map.
pub fn extract_metadata(map: &dbus::arg::PropMap) -> TrackMetadata {
    let title = map
        .get("xesam:title")
        .and_then(|v| v.0.as_str())
        .map(str::to_string)
        .unwrap_or_default();
    let artist = map.get("xesam:artist").and_then(extract_optional_string).unwrap_or_default();
    let album = map.get("xesam:album").and_then(extract_optional_string).unwrap_or_default();
    TrackMetadata { title, artist, album }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbus::arg::{PropMap, RefArg, Variant};

    fn boxed<T: RefArg + 'static>(value: T) -> Variant<Box<dyn RefArg + 'static>> {
        Variant(Box::new(value))
    }

    #[test]
    fn reads_artist_array_and_plain_strings() {
        let mut map = PropMap::new();
        map.insert("xesam:title".into(), boxed("Weird Fishes".to_string()));
        map.insert(
            "xesam:artist".into(),
            boxed(vec!["Radiohead".to_string(), "Other".to_string()]),
        );
        map.insert("xesam:album".into(), boxed("In Rainbows".to_string()));

        assert_eq!(
            extract_metadata(&map),
            TrackMetadata {
                title: "Weird Fishes".into(),
                artist: "Radiohead".into(),
                album: "In Rainbows".into(),
            }
        );
    }

    #[test]
    fn missing_fields_are_empty() {
        assert_eq!(extract_metadata(&PropMap::new()), TrackMetadata::default());
    }
}
