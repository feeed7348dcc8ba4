use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

/// Formats a timestamp as an RFC 7231 HTTP-date (`Sun, 06 Nov 1994 08:49:37 GMT`).
pub fn http_date(time: SystemTime) -> String {
    let datetime: DateTime<Utc> = time.into();
    datetime.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Seconds since the Unix epoch, clamped to zero for pre-epoch times.
pub fn epoch_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Weak validator in the `hex(mtime)-hex(size)` form served for published files.
///
/// # Example
///
/// ```
/// use cdnsync_utils::time::etag;
///
/// assert_eq!(etag(1_700_000_000, 1024), "6553f100-400");
/// ```
pub fn etag(last_modified_secs: u64, size: u64) -> String {
    format!("{last_modified_secs:x}-{size:x}")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_http_date() {
        let t = UNIX_EPOCH + Duration::from_secs(784_111_777);
        assert_eq!(http_date(t), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn test_epoch_seconds() {
        let t = UNIX_EPOCH + Duration::from_secs(42);
        assert_eq!(epoch_seconds(t), 42);
        assert_eq!(epoch_seconds(UNIX_EPOCH), 0);
    }

    #[test]
    fn test_etag() {
        assert_eq!(etag(1_700_000_000, 1024), "6553f100-400");
        assert_eq!(etag(0, 0), "0-0");
    }
}
