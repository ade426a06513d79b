//! Outbound link extraction.

use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

/// Extract every `<a href>` target resolved to an absolute URL.
///
/// Relative references are joined against `base_url`; unparseable hrefs and
/// non-http(s) schemes (mailto, javascript, tel) are skipped.
pub fn extract_links(html: &str, base_url: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();

    let selector = match Selector::parse("a[href]") {
        Ok(selector) => selector,
        Err(_) => return links,
    };

    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty() {
            continue;
        }
        match base_url.join(href) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => links.push(url),
            Ok(url) => debug!(url = %url, "skipping non-http link"),
            Err(err) => debug!(href = %href, error = %err, "unparseable href"),
        }
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_links() {
        let base = Url::parse("https://a.test/dir/page").unwrap();
        let links = extract_links(
            r#"<body><a href="/x">x</a><a href="y">y</a><a href="https://b.test/z">z</a></body>"#,
            &base,
        );
        let as_strings: Vec<String> = links.iter().map(|u| u.to_string()).collect();
        assert_eq!(
            as_strings,
            vec![
                "https://a.test/x",
                "https://a.test/dir/y",
                "https://b.test/z"
            ]
        );
    }

    #[test]
    fn skips_non_http_schemes() {
        let base = Url::parse("https://a.test/").unwrap();
        let links = extract_links(
            r#"<body><a href="mailto:x@a.test">m</a><a href="javascript:void(0)">j</a>
               <a href="tel:+1">t</a><a href="/ok">ok</a></body>"#,
            &base,
        );
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].path(), "/ok");
    }

    #[test]
    fn empty_hrefs_are_ignored() {
        let base = Url::parse("https://a.test/").unwrap();
        let links = extract_links(r#"<body><a href="">e</a><a href="  ">s</a></body>"#, &base);
        assert!(links.is_empty());
    }
}
