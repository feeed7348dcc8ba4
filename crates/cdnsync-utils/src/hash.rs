use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha512};

use crate::error::{HashError, HashResult};

/// Extensions whose published files carry a subresource integrity hash.
pub const HASHABLE_EXTENSIONS: [&str; 3] = ["js", "mjs", "css"];

/// Returns `true` if clients are expected to verify `path` with an SRI hash.
///
/// The check is performed on the logical (uncompressed) name, so callers
/// must strip any `.br`/`.gz` suffix first.
pub fn is_hashable<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            HASHABLE_EXTENSIONS
                .iter()
                .any(|h| h.eq_ignore_ascii_case(ext))
        })
}

/// Computes the SRI string (`sha512-<base64>`) of an in-memory buffer.
///
/// # Example
///
/// ```
/// use cdnsync_utils::hash::calculate_sri;
///
/// let sri = calculate_sri(b"");
/// assert!(sri.starts_with("sha512-"));
/// ```
pub fn calculate_sri(data: &[u8]) -> String {
    let digest = Sha512::digest(data);
    format!("sha512-{}", STANDARD.encode(digest))
}

/// Computes the SRI string of a file on disk.
///
/// # Errors
///
/// * [`HashError::ReadFailed`] if the file cannot be read.
pub fn calculate_file_sri<P: AsRef<Path>>(file_path: P) -> HashResult<String> {
    let file_path = file_path.as_ref();
    let data = std::fs::read(file_path).map_err(|err| {
        HashError::ReadFailed {
            path: file_path.to_path_buf(),
            source: err,
        }
    })?;
    Ok(calculate_sri(&data))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    const HELLO_SRI: &str =
        "sha512-2zl0qX8kB7fK4a5jfAAwaHoRkTJ01XhJJVjjnBbAF96E6s3Ixi/jTuThK0sUKIF/Cbaidgw/imZM6ulNJDSlkw==";

    #[test]
    fn test_calculate_sri_known_value() {
        assert_eq!(calculate_sri(b"hello world\n"), HELLO_SRI);
        assert_eq!(
            calculate_sri(b""),
            "sha512-z4PhNX7vuL3xVChQ1m2AB9Yg5AULVxXcg/SpIdNs6c5H0NE8XYXysP+DGNKHfuwvY7kxvUdBeoGlODJ6+SfaPg=="
        );
    }

    #[test]
    fn test_calculate_file_sri() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world\n").unwrap();
        assert_eq!(calculate_file_sri(file.path()).unwrap(), HELLO_SRI);
    }

    #[test]
    fn test_calculate_file_sri_missing() {
        assert!(calculate_file_sri("/path/to/nonexistent/file.js").is_err());
    }

    #[test]
    fn test_is_hashable() {
        assert!(is_hashable("dist/app.js"));
        assert!(is_hashable("dist/app.min.JS"));
        assert!(is_hashable("style.css"));
        assert!(is_hashable("module.mjs"));
        assert!(!is_hashable("logo.png"));
        assert!(!is_hashable("font.woff2"));
        assert!(!is_hashable("README"));
    }
}
