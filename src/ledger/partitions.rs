//! Key layout for the ledger partitions
//!
//! - `jobs`: job:{job_id} -> Job (JSON)
//! - `events`: event:{job_id}:{revision:016} -> JobEvent (JSON)
//!
//! Job ids are UUIDv7, so lexicographic key order is creation order.

/// Encode a job key: job:{job_id}
pub fn encode_job_key(job_id: &str) -> Vec<u8> {
    format!("job:{}", job_id).into_bytes()
}

/// Decode a job key: job:{job_id} -> job_id
pub fn decode_job_key(key: &[u8]) -> Option<String> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix("job:").map(String::from)
}

/// Encode an event key: event:{job_id}:{revision:016}
pub fn encode_event_key(job_id: &str, revision: u64) -> Vec<u8> {
    format!("event:{}:{:016}", job_id, revision).into_bytes()
}

/// Prefix covering every event of one job
pub fn encode_event_prefix(job_id: &str) -> Vec<u8> {
    format!("event:{}:", job_id).into_bytes()
}

/// Decode an event key -> (job_id, revision)
pub fn decode_event_key(key: &[u8]) -> Option<(String, u64)> {
    let key_str = std::str::from_utf8(key).ok()?;
    let (job_id, revision) = key_str.strip_prefix("event:")?.rsplit_once(':')?;
    if job_id.is_empty() || revision.contains(':') {
        return None;
    }
    Some((job_id.to_string(), revision.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_key_encoding() {
        let job_id = "0192f0c1-7b3e-7cc0-8f1a-1b2c3d4e5f60";
        let key = encode_job_key(job_id);
        assert_eq!(key, format!("job:{}", job_id).as_bytes());
        assert_eq!(decode_job_key(&key).unwrap(), job_id);
        assert_eq!(decode_job_key(b"event:x:1"), None);
    }

    #[test]
    fn test_event_key_encoding() {
        let key = encode_event_key("abc", 42);
        assert_eq!(key, b"event:abc:0000000000000042");
        assert!(key.starts_with(&encode_event_prefix("abc")));

        let (job_id, revision) = decode_event_key(&key).unwrap();
        assert_eq!(job_id, "abc");
        assert_eq!(revision, 42);
    }

    #[test]
    fn test_event_keys_sort_by_revision() {
        assert!(encode_event_key("abc", 9) < encode_event_key("abc", 10));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert_eq!(decode_event_key(b"event:abc"), None);
        assert_eq!(decode_event_key(b"event::5"), None);
        assert_eq!(decode_event_key(b"event:abc:xyz"), None);
    }
}
