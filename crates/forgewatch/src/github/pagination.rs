//! Parsing of GitHub's `Link` pagination header.

use url::Url;

use crate::platform::PaginationInfo;

/// Parse the Link header to extract pagination info.
///
/// GitHub Link headers look like:
/// `<https://api.github.com/search/repositories?q=x&per_page=100&page=2>; rel="next", <...&page=10>; rel="last"`
pub fn parse_link_header(link_header: &str) -> PaginationInfo {
    let mut info = PaginationInfo::default();

    for part in link_header.split(',') {
        let part = part.trim();

        let mut url = None;
        let mut rel = None;

        for segment in part.split(';') {
            let segment = segment.trim();
            if segment.starts_with('<') && segment.ends_with('>') {
                url = Some(&segment[1..segment.len() - 1]);
            } else if let Some(rel_value) = segment.strip_prefix("rel=") {
                rel = Some(rel_value.trim_matches('"'));
            }
        }

        if let (Some(url), Some(rel_type)) = (url, rel)
            && let Some(page_num) = extract_page_from_url(url)
        {
            match rel_type {
                "last" => info.total_pages = Some(page_num),
                "next" => info.next_page = Some(page_num),
                _ => {}
            }
        }
    }

    info
}

/// Extract the `page` query parameter from a URL.
fn extract_page_from_url(url: &str) -> Option<u32> {
    let url = Url::parse(url).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "page")
        .and_then(|(_, v)| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_next_and_last() {
        let header = r#"<https://api.github.com/search/repositories?q=topic%3Anfc&per_page=100&page=2>; rel="next", <https://api.github.com/search/repositories?q=topic%3Anfc&per_page=100&page=10>; rel="last""#;
        let info = parse_link_header(header);
        assert_eq!(info.next_page, Some(2));
        assert_eq!(info.total_pages, Some(10));
    }

    #[test]
    fn last_page_has_no_next() {
        let header = r#"<https://api.github.com/search/repositories?q=x&page=1>; rel="first", <https://api.github.com/search/repositories?q=x&page=4>; rel="prev""#;
        let info = parse_link_header(header);
        assert_eq!(info.next_page, None);
        assert_eq!(info.total_pages, None);
    }

    #[test]
    fn per_page_is_not_mistaken_for_page() {
        let header = r#"<https://api.github.com/search/repositories?per_page=100&q=x&page=3>; rel="next""#;
        assert_eq!(parse_link_header(header).next_page, Some(3));
    }

    #[test]
    fn garbage_yields_default() {
        assert_eq!(parse_link_header("nonsense"), PaginationInfo::default());
        assert_eq!(parse_link_header(""), PaginationInfo::default());
    }
}
