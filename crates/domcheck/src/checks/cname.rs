//! CNAME match check.

use hickory_resolver::{
    TokioAsyncResolver,
    error::ResolveErrorKind,
    proto::rr::{RData, RecordType},
};

/// Upper bound on followed aliases, so a CNAME loop cannot spin forever.
const MAX_CNAME_HOPS: usize = 16;

/// Lower-cases a DNS name and drops the trailing root dot.
pub fn normalize(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Follows `aliases` (owner, target) from `domain` to its canonical name.
///
/// A name with no alias is its own canonical name. All names are compared
/// normalized.
pub fn canonical_name(domain: &str, aliases: &[(String, String)]) -> String {
    let mut current = normalize(domain);
    for _ in 0..MAX_CNAME_HOPS {
        let next = aliases
            .iter()
            .find(|(owner, _)| normalize(owner) == current)
            .map(|(_, target)| normalize(target));
        match next {
            Some(target) if target != current => current = target,
            _ => break,
        }
    }
    current
}

/// Resolves the domain's CNAME chain and compares the canonical name with
/// `expected`.
pub async fn check_cname(resolver: &TokioAsyncResolver, domain: &str, expected: &str) -> bool {
    let aliases: Vec<(String, String)> = match resolver.lookup(domain, RecordType::CNAME).await {
        Ok(lookup) => lookup
            .record_iter()
            .filter_map(|record| match record.data() {
                Some(RData::CNAME(target)) => {
                    Some((record.name().to_utf8(), target.0.to_utf8()))
                }
                _ => None,
            })
            .collect(),
        Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => Vec::new(),
        Err(e) => {
            tracing::debug!("[{domain}] CNAME lookup failed: {e}");
            return false;
        }
    };

    let cname = canonical_name(domain, &aliases);
    let expected = normalize(expected);
    tracing::debug!("[{domain}] Checking CNAME {cname} against {expected}");

    if cname != expected {
        tracing::debug!("[{domain}] CNAME checkup failed");
        return false;
    }
    true
}
