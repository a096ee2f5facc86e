//! URL ownership arbitration between content, generated pages and redirects.
//!
//! Every producer that wants to write an output URL claims it here during
//! discovery. Claims are ranked by [`ClaimPriority`]; the table always
//! reflects the highest-priority claimant. Losing a claim is not an error -
//! the loser gets [`ClaimOutcome::Lost`] back and must skip writing output.
//! Two different sources at the *same* priority are ambiguous output and
//! fail the build.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{ClaimPriority, UrlPath};

/// A producer's claim over an output URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlClaim {
    /// The claimed output URL.
    pub url: UrlPath,
    /// Producer kind (e.g. "content", "taxonomy", "redirect").
    pub owner: String,
    /// Source file or generator identifier behind the claim.
    pub source: PathBuf,
    /// Claim strength.
    pub priority: ClaimPriority,
}

/// Result of a successful (non-colliding) claim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The claim is now the owner of the URL. Also returned for an
    /// idempotent re-claim by the same source at the same priority.
    Won,
    /// A higher-priority claim already owns the URL. The caller must not
    /// write output for it; `get_claim` names the winner.
    Lost,
}

impl ClaimOutcome {
    /// True if this claimant owns the URL and may write output.
    #[inline]
    pub fn won(self) -> bool {
        matches!(self, Self::Won)
    }
}

/// Two producers claimed the same URL at equal priority.
#[derive(Debug, Clone, Error)]
#[error(
    "URL collision on '{url}': '{existing_source}' and '{incoming_source}' both claim it at priority {priority}"
)]
pub struct CollisionError {
    pub url: UrlPath,
    pub existing_source: PathBuf,
    pub incoming_source: PathBuf,
    pub priority: ClaimPriority,
}

/// Tracked claim: the claim plus whether it was seeded from a prior build.
#[derive(Debug, Clone)]
struct TrackedClaim {
    claim: UrlClaim,
    /// Seeded claims are advisory: a live claim at >= priority replaces
    /// them without a collision check.
    seeded: bool,
}

/// Serialized claim table for the persisted build cache.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PersistedClaims {
    pub claims: Vec<UrlClaim>,
}

/// Priority-ranked URL claim table.
#[derive(Debug, Default)]
pub struct UrlOwnership {
    claims: FxHashMap<UrlPath, TrackedClaim>,
}

impl UrlOwnership {
    /// Create an empty claim table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a URL for a producer.
    ///
    /// Rules, checked against any existing claim for the same URL:
    /// - no claim: insert, `Won`
    /// - lower priority existing: replace, `Won`
    /// - equal priority, same source: idempotent re-claim, `Won`
    /// - equal priority, different source, existing claim was seeded from a
    ///   prior build: replace (seeds are advisory), `Won`
    /// - equal priority, different source, live: [`CollisionError`]
    /// - higher priority existing: keep it, `Lost`
    pub fn claim(
        &mut self,
        url: UrlPath,
        owner: impl Into<String>,
        source: impl Into<PathBuf>,
        priority: ClaimPriority,
    ) -> Result<ClaimOutcome, CollisionError> {
        let source = source.into();

        if let Some(existing) = self.claims.get(&url) {
            if existing.claim.priority > priority {
                return Ok(ClaimOutcome::Lost);
            }
            if existing.claim.priority == priority
                && existing.claim.source != source
                && !existing.seeded
            {
                return Err(CollisionError {
                    url,
                    existing_source: existing.claim.source.clone(),
                    incoming_source: source,
                    priority,
                });
            }
        }

        self.claims.insert(
            url.clone(),
            TrackedClaim {
                claim: UrlClaim {
                    url,
                    owner: owner.into(),
                    source,
                    priority,
                },
                seeded: false,
            },
        );
        Ok(ClaimOutcome::Won)
    }

    /// Get the current (highest-priority) claim for a URL.
    pub fn get_claim(&self, url: &UrlPath) -> Option<&UrlClaim> {
        self.claims.get(url).map(|t| &t.claim)
    }

    /// Check whether the given source currently owns the URL.
    pub fn owns(&self, url: &UrlPath, source: &Path) -> bool {
        self.get_claim(url).is_some_and(|c| c.source == source)
    }

    /// Number of claimed URLs.
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Check if no URL is claimed.
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Iterate over all current claims.
    pub fn iter(&self) -> impl Iterator<Item = &UrlClaim> {
        self.claims.values().map(|t| &t.claim)
    }

    /// Export claims for the persisted build cache.
    ///
    /// Output is sorted by URL for stable cache files.
    pub fn to_persisted(&self) -> PersistedClaims {
        let mut claims: Vec<_> = self.claims.values().map(|t| t.claim.clone()).collect();
        claims.sort_by(|a, b| a.url.cmp(&b.url));
        PersistedClaims { claims }
    }

    /// Seed the table with claims from a prior build.
    ///
    /// Seeded claims answer `get_claim` like live ones but are advisory:
    /// any live claim at equal or higher priority silently replaces them.
    /// This is how user content wins over a previously-generated taxonomy
    /// page at the same URL across builds.
    pub fn load_persisted(&mut self, persisted: PersistedClaims) {
        for claim in persisted.claims {
            // Live claims always beat stale seeds
            if self.claims.contains_key(&claim.url) {
                continue;
            }
            self.claims.insert(
                claim.url.clone(),
                TrackedClaim {
                    claim,
                    seeded: true,
                },
            );
        }
    }
}
