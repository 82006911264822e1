//! Tenant slug derivation.
//!
//! A slug doubles as the tenant's DNS label, so it is restricted to
//! `[a-z0-9-]`, never starts or ends with a hyphen, and stays well below
//! the 63-byte label limit even after a numeric suffix is appended.

use ecms_core::error::{EcmsError, EcmsResult};
use ecms_core::repository::TenantRepository;
use tracing::debug;

/// Candidates tried per name: `base`, `base-1`, ..., `base-99`.
pub const MAX_SLUG_ATTEMPTS: u32 = 100;

const MAX_BASE_LEN: usize = 50;

/// Latin letters with diacritics folded to their ASCII base.
fn fold(c: char) -> Option<&'static str> {
    Some(match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => "a",
        'æ' => "ae",
        'ç' => "c",
        'è' | 'é' | 'ê' | 'ë' => "e",
        'ì' | 'í' | 'î' | 'ï' => "i",
        'ñ' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => "o",
        'œ' => "oe",
        'ù' | 'ú' | 'û' | 'ü' => "u",
        'ý' | 'ÿ' => "y",
        'ß' => "ss",
        _ => return None,
    })
}

/// Derive the base slug from a site name.
///
/// Lower-cases, folds accents, and collapses every run of other
/// characters into a single hyphen. Returns an empty string when nothing
/// usable remains.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for c in name.to_lowercase().chars() {
        let folded = fold(c);
        if !c.is_ascii_alphanumeric() && folded.is_none() {
            pending_hyphen = true;
            continue;
        }
        if pending_hyphen && !slug.is_empty() {
            slug.push('-');
        }
        pending_hyphen = false;
        match folded {
            Some(ascii) => slug.push_str(ascii),
            None => slug.push(c),
        }
    }

    if slug.len() > MAX_BASE_LEN {
        slug.truncate(MAX_BASE_LEN);
        while slug.ends_with('-') {
            slug.pop();
        }
    }
    slug
}

/// The `attempt`-th candidate for `base`: `base` itself first, then
/// `base-1`, `base-2`, ...
pub fn candidate(base: &str, attempt: u32) -> String {
    match attempt {
        0 => base.to_string(),
        n => format!("{base}-{n}"),
    }
}

/// First candidate, starting at `from_attempt`, that no tenant holds yet.
///
/// This is only a pre-check. The unique index still decides at insert
/// time, and callers move on to the next attempt when it reports a
/// conflict.
pub async fn first_free_candidate<R: TenantRepository>(
    tenants: &R,
    base: &str,
    from_attempt: u32,
) -> EcmsResult<(String, u32)> {
    for attempt in from_attempt..MAX_SLUG_ATTEMPTS {
        let slug = candidate(base, attempt);
        if !tenants.slug_exists(&slug).await? {
            return Ok((slug, attempt));
        }
        debug!(slug = %slug, "Slug taken, trying next suffix");
    }
    Err(EcmsError::conflict("tenant", "slug"))
}
