//! Storage key generation and URL assembly.
//!
//! Keys combine a sanitized file stem, a millisecond timestamp, and eight
//! random bytes hex-encoded: `report_1700000000000_a1b2c3d4e5f60718.pdf`.
//! The random component keeps keys collision-resistant even for identical
//! names uploaded within the same millisecond.

use chrono::Utc;

use super::error::StorageError;

/// Maximum length of the sanitized file stem inside a key.
const MAX_STEM_LEN: usize = 50;

/// Generate a collision-resistant storage key for an uploaded file.
///
/// The key is `destination/stem_millis_random.ext`; the destination prefix
/// is omitted when empty.
///
/// # Errors
///
/// Returns an invalid key error if the destination is an absolute path or
/// contains `..` components.
pub fn generate_key(original_name: &str, destination: &str) -> Result<String, StorageError> {
    validate_destination(destination)?;

    let (stem, extension) = split_name(original_name);
    let stem = sanitize_stem(&stem);
    let millis = Utc::now().timestamp_millis();
    let random = random_hex();

    let file_name = match extension {
        Some(ext) => format!("{stem}_{millis}_{random}.{ext}"),
        None => format!("{stem}_{millis}_{random}"),
    };

    let destination = destination.trim_matches('/');
    if destination.is_empty() {
        Ok(file_name)
    } else {
        Ok(format!("{destination}/{file_name}"))
    }
}

/// Join a public base URL and a key, collapsing duplicate slashes.
///
/// The scheme's own `//` (as in `https://`) is preserved.
#[must_use]
pub fn join_url(base_url: &str, key: &str) -> String {
    collapse_slashes(&format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        key.trim_start_matches('/')
    ))
}

fn validate_destination(destination: &str) -> Result<(), StorageError> {
    if destination.starts_with('/') {
        return Err(StorageError::invalid_key(format!(
            "destination must be relative: {destination}"
        )));
    }
    if destination.split('/').any(|component| component == "..") {
        return Err(StorageError::invalid_key(format!(
            "destination must not traverse upward: {destination}"
        )));
    }
    Ok(())
}

/// Split a file name into stem and extension; the extension is normalized
/// to lowercase alphanumerics.
fn split_name(original_name: &str) -> (String, Option<String>) {
    match original_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            let ext: String = ext
                .chars()
                .filter(char::is_ascii_alphanumeric)
                .map(|c| c.to_ascii_lowercase())
                .collect();
            if ext.is_empty() {
                (original_name.to_string(), None)
            } else {
                (stem.to_string(), Some(ext))
            }
        }
        _ => (original_name.to_string(), None),
    }
}

/// Replace every non-alphanumeric character with `_` and truncate.
fn sanitize_stem(stem: &str) -> String {
    let sanitized: String = stem
        .chars()
        .take(MAX_STEM_LEN)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();

    if sanitized.is_empty() {
        "file".to_string()
    } else {
        sanitized
    }
}

fn random_hex() -> String {
    let bytes: [u8; 8] = rand::random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn collapse_slashes(url: &str) -> String {
    let (scheme, rest) = match url.find("://") {
        Some(idx) => url.split_at(idx + 3),
        None => ("", url),
    };

    let mut collapsed = String::with_capacity(url.len());
    collapsed.push_str(scheme);
    let mut previous_was_slash = false;
    for c in rest.chars() {
        if c == '/' {
            if !previous_was_slash {
                collapsed.push(c);
            }
            previous_was_slash = true;
        } else {
            previous_was_slash = false;
            collapsed.push(c);
        }
    }
    collapsed
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn components(file_name: &str) -> (String, String, String, Option<String>) {
        let (rest, ext) = match file_name.rsplit_once('.') {
            Some((rest, ext)) => (rest.to_string(), Some(ext.to_string())),
            None => (file_name.to_string(), None),
        };
        let mut parts: Vec<&str> = rest.rsplitn(3, '_').collect();
        parts.reverse();
        assert_eq!(parts.len(), 3, "key should have stem, millis, random");
        (
            parts[0].to_string(),
            parts[1].to_string(),
            parts[2].to_string(),
            ext,
        )
    }

    #[test]
    fn test_key_shape() {
        let key = generate_key("report.pdf", "").expect("valid key");
        let (stem, millis, random, ext) = components(&key);

        assert_eq!(stem, "report");
        assert_eq!(millis.len(), 13);
        assert!(millis.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(random.len(), 16);
        assert!(random.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(ext.as_deref(), Some("pdf"));
    }

    #[test]
    fn test_destination_prefix() {
        let key = generate_key("photo.png", "media/images").expect("valid key");
        assert!(key.starts_with("media/images/photo_"));

        let trimmed = generate_key("photo.png", "/media/").unwrap_err();
        assert!(matches!(trimmed, StorageError::InvalidKey(_)));
    }

    #[test]
    fn test_destination_traversal_rejected() {
        let err = generate_key("photo.png", "media/../secrets").unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }

    #[rstest]
    #[case("my photo (1).png", "my_photo__1_")]
    #[case("rapport-final.pdf", "rapport_final")]
    #[case("...", "___")]
    #[case("", "file")]
    fn test_stem_sanitization(#[case] name: &str, #[case] expected_stem: &str) {
        let key = generate_key(name, "").expect("valid key");
        let (stem, _, _, _) = components(&key);
        assert_eq!(stem, expected_stem);
    }

    #[test]
    fn test_stem_truncated() {
        let long = "a".repeat(80);
        let key = generate_key(&format!("{long}.txt"), "").expect("valid key");
        let (stem, _, _, _) = components(&key);
        assert_eq!(stem.len(), 50);
    }

    #[test]
    fn test_no_extension() {
        let key = generate_key("Makefile", "").expect("valid key");
        assert!(!key.contains('.'));
    }

    #[rstest]
    #[case("/files", "a.png", "/files/a.png")]
    #[case("/files/", "/a.png", "/files/a.png")]
    #[case("/files//", "media//a.png", "/files/media/a.png")]
    #[case("https://cdn.example.com/", "/media/a.png", "https://cdn.example.com/media/a.png")]
    fn test_join_url(#[case] base: &str, #[case] key: &str, #[case] expected: &str) {
        assert_eq!(join_url(base, key), expected);
    }
}

#[cfg(test)]
mod property_tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    // Property: generated keys only contain path-safe characters.
    proptest! {
        #[test]
        fn prop_keys_are_path_safe(name in ".*") {
            let key = generate_key(&name, "").expect("empty destination is always valid");
            for c in key.chars() {
                let is_safe = c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '/';
                prop_assert!(is_safe, "unexpected character in key: {}", c);
            }
        }
    }

    // Property: keys for the same name never collide, even in a tight loop
    // issuing many within one millisecond.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]
        #[test]
        fn prop_keys_unique_for_identical_names(name in "[a-z]{1,20}\\.[a-z]{2,4}") {
            let keys: HashSet<String> = (0..64)
                .map(|_| generate_key(&name, "").expect("valid key"))
                .collect();
            prop_assert_eq!(keys.len(), 64);
        }
    }

    // Property: URL joining never produces `//` outside the scheme.
    proptest! {
        #[test]
        fn prop_join_url_collapses_slashes(
            base in "(https?://[a-z]{1,10}\\.[a-z]{2,3})?(/[a-z/]{0,10})?",
            key in "[a-z0-9_./]{1,30}",
        ) {
            let url = join_url(&base, &key);
            let after_scheme = match url.find("://") {
                Some(idx) => &url[idx + 3..],
                None => url.as_str(),
            };
            prop_assert!(!after_scheme.contains("//"), "duplicate slash in {}", url);
        }
    }
}
