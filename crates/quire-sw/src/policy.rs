//! Fetch applicability and static-path classification.

use http::Method;
use url::Url;

use quire_net::Request;

/// Schemes reserved for browser-extension resources; never intercepted.
const EXTENSION_SCHEMES: &[&str] = &["chrome-extension", "moz-extension"];

/// Whether the URL uses an extension pseudo-scheme.
pub fn is_extension_scheme(url: &Url) -> bool {
    EXTENSION_SCHEMES.contains(&url.scheme())
}

/// Whether the fetch policy applies to this request at all.
///
/// Anything that fails the filter passes through untouched to the host's
/// default handling: it is never looked up in or written to a bucket.
pub fn should_intercept(request: &Request) -> bool {
    request.method == Method::GET && !is_extension_scheme(&request.url)
}

/// Whether a URL points at built static content under the configured path
/// segment. Only such responses are cached from live traffic; dynamic
/// pages carry per-session state (currency-dependent prices, cart counts)
/// that must not be replayed.
pub fn is_static_path(url: &Url, static_segment: &str) -> bool {
    url.path().contains(static_segment)
}
