//! Fixed identity header pair sent with every request.
//!
//! Listing pages on the target portals serve degraded or empty markup to
//! non-browser agents, so page fetches, probes and downloads all present the
//! same desktop-browser identity.

/// Desktop-browser User-Agent shared by page fetches, probes and downloads.
pub(crate) const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/103.0.5060.114 Safari/537.36";

/// Accept header paired with [`BROWSER_USER_AGENT`].
pub(crate) const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
