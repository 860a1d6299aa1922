use std::collections::BTreeSet;

/// Host names that survived the exclusion predicates, in ascending order.
pub type FilteredSet = BTreeSet<String>;

const STATIC_EXTENSIONS: &[&str] = &[
    "css", "js", "jpg", "jpeg", "png", "gif", "ico", "woff", "woff2", "ttf", "eot", "svg",
];

const CDN_SUFFIXES: &[&str] = &[
    "cloudfront.net",
    "cloudflare.com",
    "amazonaws.com",
    "googleusercontent.com",
];

// "localhost" is covered by "local"; kept so the list reads as the full marker set.
const ENV_MARKERS: &[&str] = &["test", "staging", "dev", "local", "localhost"];

/// Remove noise from a stream of candidate host names.
///
/// Each line is trimmed and dropped if it is malformed or matches any of the
/// exclusion predicates:
/// - static asset suffix (`.js`, `_css`, `.woff2`, ...)
/// - CDN / hosting provider suffix
/// - environment marker anywhere in the name (`test`, `staging`, `dev`, `local`)
/// - leading digit (numeric first label)
///
/// Survivors are deduplicated and returned sorted. Pure and total: any input,
/// including an empty one, yields a set.
pub fn filter_hosts<I, S>(lines: I) -> FilteredSet
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|line| {
            let host = line.as_ref().trim();
            is_retained(host).then(|| host.to_string())
        })
        .collect()
}

/// Whether a single trimmed host name passes every predicate.
pub fn is_retained(host: &str) -> bool {
    if is_malformed(host) {
        return false;
    }
    let lower = host.to_ascii_lowercase();
    !(is_static_asset(&lower)
        || is_cdn_host(&lower)
        || has_env_marker(&lower)
        || has_numeric_prefix(&lower))
}

fn is_malformed(host: &str) -> bool {
    host.is_empty() || host.chars().any(|c| c.is_whitespace() || c.is_control())
}

fn is_static_asset(host: &str) -> bool {
    STATIC_EXTENSIONS.iter().any(|ext| {
        host.strip_suffix(ext)
            .is_some_and(|rest| rest.ends_with('.') || rest.ends_with('_'))
    })
}

fn is_cdn_host(host: &str) -> bool {
    CDN_SUFFIXES.iter().any(|suffix| host.ends_with(suffix))
}

fn has_env_marker(host: &str) -> bool {
    ENV_MARKERS.iter().any(|marker| host.contains(marker))
}

fn has_numeric_prefix(host: &str) -> bool {
    host.starts_with(|c: char| c.is_ascii_digit())
}
