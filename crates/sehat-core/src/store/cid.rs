//! Content id normalization and gateway URL construction.
//!
//! Callers hand us content ids in several shapes (`ipfs://Qm...`,
//! `/ipfs/Qm...`, bare, with stray slashes). Everything is normalized to the
//! bare id before building URLs or hitting a backend.

/// Minimum plausible length of a content id after normalization.
///
/// CIDv0 ids are 46 characters; anything shorter than this is certainly
/// malformed and is rejected before any network attempt.
pub const MIN_CID_LEN: usize = 10;

/// Normalizes a content id: strips `ipfs://` and `/ipfs/` prefixes, leading
/// and trailing slashes, and surrounding whitespace.
///
/// Returns `None` when the remainder is shorter than [`MIN_CID_LEN`].
#[must_use]
pub fn normalize(cid: &str) -> Option<String> {
    let mut rest = cid.trim();
    rest = rest.strip_prefix("ipfs://").unwrap_or(rest);
    rest = rest.strip_prefix("/ipfs/").unwrap_or(rest);
    let cleaned = rest.trim_matches('/').trim();
    if cleaned.len() < MIN_CID_LEN {
        return None;
    }
    Some(cleaned.to_string())
}

/// Builds a browsable gateway URL for a content id.
///
/// The gateway base is coerced to end with `/ipfs/` before the id is
/// appended, so `https://gw.example`, `https://gw.example/ipfs` and
/// `https://gw.example/ipfs/` all produce the same URL. Pure, no I/O.
/// Returns `None` for malformed ids.
#[must_use]
pub fn gateway_url(base: &str, cid: &str) -> Option<String> {
    let cid = normalize(cid)?;
    Some(format!("{}{cid}", ipfs_base(base)))
}

/// Coerces a gateway base URL to end with `/ipfs/`.
fn ipfs_base(base: &str) -> String {
    let trimmed = base.trim_end_matches('/');
    if trimmed.ends_with("/ipfs") {
        format!("{trimmed}/")
    } else {
        format!("{trimmed}/ipfs/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CID: &str = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";

    #[test]
    fn normalize_strips_prefixes() {
        assert_eq!(normalize(CID).as_deref(), Some(CID));
        assert_eq!(normalize(&format!("ipfs://{CID}")).as_deref(), Some(CID));
        assert_eq!(normalize(&format!("/ipfs/{CID}")).as_deref(), Some(CID));
        assert_eq!(normalize(&format!("  {CID}/  ")).as_deref(), Some(CID));
        assert_eq!(normalize(&format!("//{CID}//")).as_deref(), Some(CID));
    }

    #[test]
    fn normalize_rejects_short_ids() {
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("Qm123"), None);
        assert_eq!(normalize("ipfs://"), None);
    }

    #[test]
    fn gateway_url_coerces_base_shapes() {
        let want = format!("https://gateway.pinata.cloud/ipfs/{CID}");
        assert_eq!(
            gateway_url("https://gateway.pinata.cloud/ipfs/", CID).as_deref(),
            Some(want.as_str())
        );
        assert_eq!(
            gateway_url("https://gateway.pinata.cloud/ipfs", CID).as_deref(),
            Some(want.as_str())
        );
        assert_eq!(
            gateway_url("https://gateway.pinata.cloud", CID).as_deref(),
            Some(want.as_str())
        );
        assert_eq!(
            gateway_url("https://gateway.pinata.cloud///", CID).as_deref(),
            Some(want.as_str())
        );
    }

    #[test]
    fn gateway_url_rejects_malformed_cid() {
        assert_eq!(gateway_url("https://ipfs.io/ipfs/", "bad"), None);
    }
}
