//! Reserved top-level names.
//!
//! Sorted. Lookup is binary search; keep it sorted when adding entries.

pub(crate) const RESERVED_NAMES: &[&str] = &[
    "amazon",
    "apple",
    "arpa",
    "bing",
    "bit",
    "blogspot",
    "cloudflare",
    "com",
    "dropbox",
    "edu",
    "eth",
    "facebook",
    "github",
    "gmail",
    "google",
    "gov",
    "instagram",
    "int",
    "linkedin",
    "microsoft",
    "mil",
    "mozilla",
    "net",
    "netflix",
    "nic",
    "onion",
    "org",
    "paypal",
    "reddit",
    "spotify",
    "twitter",
    "wikipedia",
    "wordpress",
    "yahoo",
    "youtube",
];
