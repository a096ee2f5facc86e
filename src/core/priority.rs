//! Claim priority levels for URL ownership arbitration.

use serde::{Deserialize, Serialize};

/// Priority rank of a producer claiming an output URL
///
/// Higher value = stronger claim. User content always beats generated pages,
/// which always beat redirects. Equal-priority claims from different sources
/// are a collision, never a silent overwrite.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ClaimPriority {
    /// Alias/redirect stubs - lowest priority
    Redirect = 5,
    /// Taxonomy pages, feeds and other generated output
    Generated = 40,
    /// User-authored content - highest priority
    Content = 100,
}

impl ClaimPriority {
    /// Numeric rank (stable across versions, used in the persisted cache).
    #[inline]
    pub const fn rank(self) -> u8 {
        self as u8
    }

    /// Reconstruct from a persisted rank. Unknown ranks map to `None`.
    pub const fn from_rank(rank: u8) -> Option<Self> {
        match rank {
            5 => Some(Self::Redirect),
            40 => Some(Self::Generated),
            100 => Some(Self::Content),
            _ => None,
        }
    }
}

impl std::fmt::Display for ClaimPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Redirect => "redirect",
            Self::Generated => "generated",
            Self::Content => "content",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        assert!(ClaimPriority::Content > ClaimPriority::Generated);
        assert!(ClaimPriority::Generated > ClaimPriority::Redirect);
    }

    #[test]
    fn test_rank_roundtrip() {
        for p in [
            ClaimPriority::Redirect,
            ClaimPriority::Generated,
            ClaimPriority::Content,
        ] {
            assert_eq!(ClaimPriority::from_rank(p.rank()), Some(p));
        }
        assert_eq!(ClaimPriority::from_rank(0), None);
    }
}
