use crate::UrlError;
use url::Url;

/// Tracking and session query parameters dropped from listing links
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_eid",
    "aid",
    "label",
    "sid",
    "srpvid",
];

/// Resolves a listing link against the site base URL and normalizes it
///
/// Relative and absolute forms of the same link produce the same URL, which is
/// what the dedup store compares.
///
/// # Normalization Steps
///
/// 1. Resolve `link` against `base` (absolute links are kept as-is)
/// 2. Reject anything that is not http(s) or has no host
/// 3. Collapse empty path segments; drop a trailing slash (except for root)
/// 4. Remove the fragment
/// 5. Remove tracking query parameters and sort the remaining ones
///
/// # Examples
///
/// ```
/// use listing_harvest::url::resolve_listing_url;
/// use url::Url;
///
/// let base = Url::parse("https://www.example.test").unwrap();
/// let url = resolve_listing_url(&base, "/hotel/es/sol.html#map").unwrap();
/// assert_eq!(url.as_str(), "https://www.example.test/hotel/es/sol.html");
/// ```
pub fn resolve_listing_url(base: &Url, link: &str) -> Result<Url, UrlError> {
    let mut url = base
        .join(link.trim())
        .map_err(|e| UrlError::Parse(format!("{}: {}", link, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingDomain);
    }

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Collapses empty segments and removes a trailing slash
fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", segments.join("/"))
}

/// Filters out tracking parameters and sorts remaining query parameters
fn filter_and_sort_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    params.sort();

    params
}

fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}
