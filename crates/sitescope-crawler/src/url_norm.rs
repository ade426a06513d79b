//! URL normalisation and site-membership checks.
//!
//! Normalisation is idempotent: `normalize(normalize(u)) == normalize(u)`.

use url::Url;

/// Normalise a URL for deduplication and storage.
///
/// Strips the fragment, lowercases the host, removes default ports,
/// collapses duplicate slashes in the path, sorts query parameters and
/// drops parameters on the tracking deny-list.
pub fn normalize_url(url: &Url, tracking_params: &[String]) -> Url {
    let mut normalized = url.clone();

    normalized.set_fragment(None);

    if let Some(host) = normalized.host_str() {
        let lowered = host.to_lowercase();
        if lowered != host {
            // Hosts always re-set cleanly; the original URL parsed.
            let _ = normalized.set_host(Some(&lowered));
        }
    }

    if let Some(port) = normalized.port() {
        let is_default = (normalized.scheme() == "http" && port == 80)
            || (normalized.scheme() == "https" && port == 443);
        if is_default {
            let _ = normalized.set_port(None);
        }
    }

    let collapsed = collapse_slashes(normalized.path());
    if collapsed != normalized.path() {
        normalized.set_path(&collapsed);
    }

    let mut params: Vec<(String, String)> = normalized
        .query_pairs()
        .filter(|(key, _)| !tracking_params.iter().any(|t| t == key.as_ref()))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    if params.is_empty() {
        normalized.set_query(None);
    } else {
        params.sort();
        let query = params
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{k}={v}")
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        normalized.set_query(Some(&query));
    }

    normalized
}

/// Collapse runs of `/` in a path to a single slash.
pub fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut previous_slash = false;
    for ch in path.chars() {
        if ch == '/' {
            if !previous_slash {
                out.push(ch);
            }
            previous_slash = true;
        } else {
            previous_slash = false;
            out.push(ch);
        }
    }
    out
}

/// Approximate the registrable domain as the last two host labels.
///
/// Good enough for same-site checks without a public-suffix table; hosts
/// with two or fewer labels (and IP literals) are returned unchanged.
pub fn registrable_domain(host: &str) -> &str {
    if host.parse::<std::net::IpAddr>().is_ok() {
        return host;
    }
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() <= 2 {
        return host;
    }
    let cut = host.len()
        - labels[labels.len() - 2..]
            .iter()
            .map(|l| l.len())
            .sum::<usize>()
        - 1;
    &host[cut..]
}

/// Is `candidate` on the same site as `root`?
///
/// Same host always qualifies; with `include_subdomains`, any host sharing
/// the root's registrable domain does.
pub fn same_site(root: &Url, candidate: &Url, include_subdomains: bool) -> bool {
    let (Some(root_host), Some(candidate_host)) = (root.host_str(), candidate.host_str()) else {
        return false;
    };
    let root_host = root_host.to_lowercase();
    let candidate_host = candidate_host.to_lowercase();

    if root_host == candidate_host {
        return true;
    }
    if !include_subdomains {
        return false;
    }
    let root_domain = registrable_domain(&root_host);
    candidate_host == root_domain || candidate_host.ends_with(&format!(".{root_domain}"))
}
