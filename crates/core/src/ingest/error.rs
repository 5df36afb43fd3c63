use std::fmt;

/// Failure of one upstream call. Kept typed so the retry wrapper and the batch loop
/// can branch on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    Http { status: u16, body: String },
    /// The provider's daily quota is spent. Never retried; aborts the batch.
    QuotaExceeded { detail: String },
    Transport { detail: String },
    Decode { detail: String },
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Http { status, .. } => Some(*status),
            FetchError::QuotaExceeded { .. } => Some(403),
            _ => None,
        }
    }

    /// 403, 429 and any 5xx are retried; everything else propagates immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Http { status, .. } => {
                *status == 403 || *status == 429 || (500..600).contains(status)
            }
            _ => false,
        }
    }

    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, FetchError::QuotaExceeded { .. })
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Http { status, body } => {
                write!(f, "HTTP {status}: {}", truncate(body, 300))
            }
            FetchError::QuotaExceeded { detail } => write!(f, "quota exceeded: {detail}"),
            FetchError::Transport { detail } => write!(f, "transport error: {detail}"),
            FetchError::Decode { detail } => write!(f, "decode error: {detail}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transport {
            detail: err.to_string(),
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max_chars).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> FetchError {
        FetchError::Http {
            status,
            body: String::new(),
        }
    }

    #[test]
    fn retryable_statuses() {
        for s in [403, 429, 500, 502, 503, 599] {
            assert!(http(s).is_retryable(), "{s}");
        }
        for s in [400, 401, 404, 409, 600] {
            assert!(!http(s).is_retryable(), "{s}");
        }
        assert!(!FetchError::QuotaExceeded {
            detail: "quotaExceeded".into()
        }
        .is_retryable());
        assert!(!FetchError::Transport {
            detail: "reset".into()
        }
        .is_retryable());
    }

    #[test]
    fn display_truncates_long_bodies() {
        let err = FetchError::Http {
            status: 500,
            body: "x".repeat(1000),
        };
        assert!(err.to_string().chars().count() < 320);
    }
}
