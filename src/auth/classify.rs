use crate::engine::{EngineError, EngineFailureClass, ErrorOrigin};

/// Case-insensitive phrases that mark a failure as authentication-related.
/// Matched as substrings of the engine's message, so keep them specific enough
/// not to hit ordinary words (a bare "age" would match "webpage").
const AUTH_SIGNATURES: &[&str] = &[
    "sign in",
    "signin",
    "log in",
    "login",
    "confirm your age",
    "age-restricted",
    "age restricted",
    "inappropriate for some users",
    "cookies",
    "authentication",
    "private video",
    "this video is private",
    "members-only",
    "restricted",
    "unauthorized",
    "forbidden",
    "access denied",
    "session expired",
];

const RATE_LIMIT_SIGNATURES: &[&str] = &["too many requests", "rate limit", "rate-limit"];

const UNAVAILABLE_SIGNATURES: &[&str] = &[
    "video unavailable",
    "not available",
    "has been removed",
    "does not exist",
    "no longer available",
    "unsupported url",
    "not found",
];

const NETWORK_SIGNATURES: &[&str] = &[
    "timed out",
    "timeout",
    "connection",
    "network",
    "unable to download webpage",
    "temporary failure",
    "name resolution",
    "ssl",
];

/// Result of classifying an engine failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Auth,
    Engine(EngineFailureClass),
}

/// Single place where engine failures are sorted into auth and non-auth
pub fn classify(err: &EngineError) -> FailureClass {
    match err.origin {
        ErrorOrigin::Cancelled => return FailureClass::Engine(EngineFailureClass::Cancelled),
        ErrorOrigin::NoOutput => return FailureClass::Engine(EngineFailureClass::NoOutput),
        ErrorOrigin::Spawn => return FailureClass::Engine(EngineFailureClass::Process),
        ErrorOrigin::Reported => {}
    }

    if matches!(err.http_status, Some(401) | Some(403)) {
        return FailureClass::Auth;
    }

    let message = err.message.to_lowercase();
    let mentions = |signatures: &[&str]| signatures.iter().any(|s| message.contains(s));

    if mentions(AUTH_SIGNATURES) {
        return FailureClass::Auth;
    }

    let class = match err.http_status {
        Some(429) => EngineFailureClass::RateLimited,
        Some(404) | Some(410) => EngineFailureClass::Unavailable,
        Some(status) if status >= 500 => EngineFailureClass::Network,
        _ if mentions(RATE_LIMIT_SIGNATURES) => EngineFailureClass::RateLimited,
        _ if mentions(UNAVAILABLE_SIGNATURES) => EngineFailureClass::Unavailable,
        _ if mentions(NETWORK_SIGNATURES) => EngineFailureClass::Network,
        _ => EngineFailureClass::Other,
    };
    FailureClass::Engine(class)
}

pub fn is_auth_failure(err: &EngineError) -> bool {
    classify(err) == FailureClass::Auth
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_auth_messages() {
        let cases = [
            "[youtube] abc: Sign in to confirm your age. This video may be inappropriate",
            "Sign in to confirm you're not a bot. Use --cookies-from-browser",
            "[instagram] xyz: Requested content is not available, login required",
            "Private video. Sign in if you've been granted access",
            "This content is restricted",
            "Access Denied",
            "Your session expired",
        ];
        for message in cases {
            assert!(is_auth_failure(&EngineError::new(message)), "{}", message);
        }
    }

    #[test]
    fn test_auth_status_codes() {
        let err = EngineError::new("HTTP Error 401").with_http_status(401);
        assert_eq!(classify(&err), FailureClass::Auth);
        let err = EngineError::from_stderr("ERROR: HTTP Error 403: Forbidden", Some(1));
        assert_eq!(classify(&err), FailureClass::Auth);
    }

    #[test]
    fn test_non_auth_messages() {
        let cases = [
            (
                "Unable to download webpage: The read operation timed out",
                EngineFailureClass::Network,
            ),
            ("HTTP Error 429: Too Many Requests", EngineFailureClass::RateLimited),
            ("Video unavailable", EngineFailureClass::Unavailable),
            (
                "ERROR: Unsupported URL: https://example.com/",
                EngineFailureClass::Unavailable,
            ),
            ("something odd happened", EngineFailureClass::Other),
        ];
        for (message, expected) in cases {
            let err = EngineError::from_stderr(message, Some(1));
            assert_eq!(classify(&err), FailureClass::Engine(expected), "{}", message);
        }
    }

    #[test]
    fn test_origin_takes_precedence() {
        let mut err = EngineError::cancelled();
        err.message = "sign in".to_string();
        assert_eq!(
            classify(&err),
            FailureClass::Engine(EngineFailureClass::Cancelled)
        );

        let err = EngineError::no_output(Path::new("/tmp/ws"));
        assert_eq!(classify(&err), FailureClass::Engine(EngineFailureClass::NoOutput));

        let err = EngineError::spawn(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(classify(&err), FailureClass::Engine(EngineFailureClass::Process));
    }

    #[test]
    fn test_server_errors_are_network() {
        let err = EngineError::new("HTTP Error 503: Service Unavailable").with_http_status(503);
        assert_eq!(classify(&err), FailureClass::Engine(EngineFailureClass::Network));
    }
}
