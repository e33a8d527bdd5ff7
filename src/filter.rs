//! Candidate aggregation and eligibility filtering.
//!
//! Everything here is pure: the same inputs always produce the same ordered
//! output, so a run can be re-planned without touching the platform.
use crate::model::{Presence, Recipient, SkipReason};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

/// Members read from one source, in the order the platform returned them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceContribution {
    pub source: String,
    pub members: Vec<Recipient>,
}

impl SourceContribution {
    pub fn new(source: impl Into<String>, members: Vec<Recipient>) -> Self {
        Self {
            source: source.into(),
            members,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Caps {
    /// Maximum members taken from each source; 0 = unbounded.
    pub per_source: usize,
    /// Maximum distinct candidates accumulated across sources; 0 = unbounded.
    pub scan: usize,
}

/// Deduplicated union of source reads plus whatever the caps cut off.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    pub candidates: Vec<Recipient>,
    pub over_cap: Vec<Recipient>,
}

impl CandidateSet {
    /// Sources are walked in read order. Each one contributes at most
    /// `caps.per_source` members not already taken from an earlier source;
    /// members past that point are cut unless an earlier source already took
    /// them, and once cut they stay out for every later source.
    pub fn collect(contributions: &[SourceContribution], caps: Caps) -> Self {
        let limit = |cap: usize| if cap == 0 { usize::MAX } else { cap };
        let per_source = limit(caps.per_source);
        let scan = limit(caps.scan);

        let mut seen: HashSet<i64> = HashSet::new();
        let mut set = CandidateSet::default();
        for c in contributions {
            let mut taken = 0usize;
            for r in &c.members {
                if !seen.insert(r.id) {
                    continue;
                }
                if taken >= per_source {
                    set.over_cap.push(r.clone());
                    continue;
                }
                taken += 1;
                if set.candidates.len() >= scan {
                    set.over_cap.push(r.clone());
                } else {
                    set.candidates.push(r.clone());
                }
            }
        }
        set
    }
}

/// Optional "seen recently" requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityWindow {
    pub now: DateTime<Utc>,
    pub max_idle: Duration,
}

impl ActivityWindow {
    pub fn days(now: DateTime<Utc>, days: u32) -> Self {
        Self {
            now,
            max_idle: Duration::days(days as i64),
        }
    }

    fn admits(&self, presence: Option<&Presence>) -> bool {
        match presence {
            Some(Presence::LastSeen(at)) => self.now.signed_duration_since(*at) <= self.max_idle,
            // unknown status is kept
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    pub eligible: Vec<Recipient>,
    pub skipped: Vec<(Recipient, SkipReason)>,
}

impl FilterOutcome {
    pub fn eligible_ids(&self) -> Vec<i64> {
        self.eligible.iter().map(|r| r.id).collect()
    }
}

/// Inputs the filter checks each candidate against.
#[derive(Debug, Clone, Copy)]
pub struct Exclusions<'a> {
    pub destination_members: &'a HashSet<i64>,
    pub ledger: &'a HashSet<i64>,
    pub activity: Option<ActivityWindow>,
}

pub fn apply(
    contributions: &[SourceContribution],
    caps: Caps,
    exclusions: Exclusions<'_>,
) -> FilterOutcome {
    let set = CandidateSet::collect(contributions, caps);
    let mut out = FilterOutcome::default();
    for r in set.candidates {
        let reason = if exclusions.destination_members.contains(&r.id) {
            Some(SkipReason::AlreadyMember)
        } else if exclusions.ledger.contains(&r.id) {
            Some(SkipReason::AlreadyInvited)
        } else if exclusions
            .activity
            .is_some_and(|w| !w.admits(r.presence.as_ref()))
        {
            Some(SkipReason::Inactive)
        } else {
            None
        };
        match reason {
            Some(reason) => out.skipped.push((r, reason)),
            None => out.eligible.push(r),
        }
    }
    out.skipped
        .extend(set.over_cap.into_iter().map(|r| (r, SkipReason::OverCap)));
    out
}
