use std::collections::HashSet;

use scraper::{Html, Node, Selector};
use url::Url;

const SKIPPED_TAGS: [&str; 6] = ["script", "style", "noscript", "template", "svg", "head"];

const ASSET_EXTENSIONS: [&str; 16] = [
    ".pdf", ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".ico", ".css", ".js", ".zip",
    ".mp4", ".mp3", ".xml", ".doc", ".docx",
];

/// Found anywhere in the raw body.
const BLOCK_MARKERS: [&str; 8] = [
    "cf-chl",
    "cf_chl_opt",
    "/cdn-cgi/challenge-platform",
    "px-captcha",
    "verify you are a human",
    "checking your browser before accessing",
    "attention required! | cloudflare",
    "ddos protection by",
];

/// Only meaningful on short pages: a full site can mention these legitimately.
const SHORT_PAGE_BLOCK_MARKERS: [&str; 7] = [
    "captcha",
    "access denied",
    "request blocked",
    "unusual traffic",
    "just a moment",
    "are you a robot",
    "enable javascript and cookies",
];
const SHORT_PAGE_CHARS: usize = 1000;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedPage {
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub text: String,
    /// Same-site links in document order, fragments removed.
    pub links: Vec<Url>,
}

pub fn extract_page(body: &str, base: &Url) -> ExtractedPage {
    let document = Html::parse_document(body);
    let title_selector = Selector::parse("title").unwrap();
    let meta_selector =
        Selector::parse(r#"meta[name="description"], meta[property="og:description"]"#).unwrap();
    let a_tag_selector = Selector::parse("a[href]").unwrap();

    let title = document
        .select(&title_selector)
        .next()
        .map(|t| collapse_whitespace(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let meta_description = document
        .select(&meta_selector)
        .filter_map(|m| m.value().attr("content"))
        .map(collapse_whitespace)
        .find(|d| !d.is_empty());

    let mut raw_text = String::new();
    for node in document.tree.root().descendants() {
        if let Node::Text(text) = node.value() {
            let hidden = node.ancestors().any(|ancestor| match ancestor.value() {
                Node::Element(element) => SKIPPED_TAGS.contains(&element.name()),
                _ => false,
            });
            if !hidden {
                raw_text.push_str(text);
                raw_text.push(' ');
            }
        }
    }

    let mut seen = HashSet::new();
    let links = document
        .select(&a_tag_selector)
        .filter_map(|tag| tag.value().attr("href"))
        .filter_map(|href| resolve_link(href, base))
        .filter(|url| seen.insert(url.to_string()))
        .collect();

    ExtractedPage {
        title,
        meta_description,
        text: collapse_whitespace(&raw_text),
        links,
    }
}

fn resolve_link(href: &str, base: &Url) -> Option<Url> {
    let href = href.trim();
    let lowered = href.to_lowercase();
    if href.is_empty()
        || href.starts_with('#')
        || lowered.starts_with("mailto:")
        || lowered.starts_with("tel:")
        || lowered.starts_with("javascript:")
    {
        return None;
    }

    let mut url = base.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") || !same_site(&url, base) {
        return None;
    }
    url.set_fragment(None);

    let path = url.path().to_lowercase();
    if ASSET_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
        return None;
    }

    let mut page = base.clone();
    page.set_fragment(None);
    match url == page {
        true => None,
        false => Some(url),
    }
}

/// Same host, ignoring a leading `www.`.
pub fn same_site(a: &Url, b: &Url) -> bool {
    fn bare(url: &Url) -> Option<String> {
        url.host_str()
            .map(|h| h.trim_start_matches("www.").to_lowercase())
    }
    bare(a).is_some() && bare(a) == bare(b)
}

/// Rough usefulness of a link for classification. Pages describing what
/// the business does rank first; legal and account pages rank last.
pub fn link_priority(url: &Url) -> i32 {
    let path = url.path().to_lowercase();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let score: i32 = segments
        .iter()
        .flat_map(|segment| segment.split(|c| c == '-' || c == '_' || c == '.'))
        .map(|word| match word {
            "about" | "aboutus" => 10,
            "services" | "service" | "what" | "offer" => 9,
            "products" | "product" | "menu" | "menus" => 8,
            "solutions" | "story" | "mission" => 7,
            "company" | "who" | "catering" | "shop" => 6,
            "pricing" | "industries" => 4,
            "team" | "locations" => 3,
            "contact" | "faq" => 2,
            "careers" | "jobs" => -3,
            "news" | "press" | "events" => -4,
            "blog" | "tag" | "category" | "author" => -5,
            "cart" | "account" | "wishlist" => -8,
            "privacy" | "terms" | "cookie" | "cookies" | "login" | "signin" | "register"
            | "checkout" | "legal" | "wp" | "admin" => -10,
            _ => 0,
        })
        .sum();

    score - segments.len().saturating_sub(1) as i32
}

/// `<loc>` entries of a sitemap that belong to `base`'s site. Nested
/// sitemap indexes are not followed.
pub fn extract_sitemap_urls(body: &str, base: &Url) -> Vec<Url> {
    let document = Html::parse_document(body);
    let loc_selector = Selector::parse("loc").unwrap();

    let mut seen = HashSet::new();
    document
        .select(&loc_selector)
        .map(|loc| loc.text().collect::<String>())
        .filter_map(|raw| Url::parse(raw.trim()).ok())
        .filter(|url| same_site(url, base) && !url.path().to_lowercase().ends_with(".xml"))
        .filter(|url| seen.insert(url.to_string()))
        .collect()
}

pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cuts `text` to at most `max_bytes` on a char boundary. Returns whether
/// anything was cut.
pub fn truncate_utf8(text: &mut String, max_bytes: usize) -> bool {
    if text.len() <= max_bytes {
        return false;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    true
}

/// Bot walls and captcha interstitials served with a 2xx status.
pub fn looks_blocked(raw_body: &str, visible_text: &str) -> bool {
    let body = raw_body.to_lowercase();
    if BLOCK_MARKERS.iter().any(|marker| body.contains(marker)) {
        return true;
    }

    match visible_text.chars().count() < SHORT_PAGE_CHARS {
        true => {
            let text = visible_text.to_lowercase();
            SHORT_PAGE_BLOCK_MARKERS
                .iter()
                .any(|marker| text.contains(marker))
        }
        false => false,
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::{
        extract_page, extract_sitemap_urls, link_priority, looks_blocked, truncate_utf8,
    };

    fn base() -> Url {
        Url::parse("https://www.tonyspizza.com/").unwrap()
    }

    #[test]
    fn extract_page_skips_hidden_text() {
        let body = r#"
            <html>
              <head>
                <title> Tony's   Pizzeria </title>
                <meta name="description" content="Wood fired pizza in Brooklyn">
                <style>.menu { color: red; }</style>
              </head>
              <body>
                <h1>Welcome</h1>
                <script>var tracking = "pizza";</script>
                <noscript>Please enable javascript</noscript>
                <p>Fresh   pizza and
                   pasta daily.</p>
              </body>
            </html>
        "#;

        let page = extract_page(body, &base());

        assert_eq!(page.title.as_deref(), Some("Tony's Pizzeria"));
        assert_eq!(
            page.meta_description.as_deref(),
            Some("Wood fired pizza in Brooklyn")
        );
        assert_eq!(page.text, "Welcome Fresh pizza and pasta daily.");
    }

    #[test]
    fn extract_page_keeps_same_site_links() {
        let body = r##"
            <a href="/about">About</a>
            <a href="https://tonyspizza.com/menu#dinner">Menu</a>
            <a href="/about">About again</a>
            <a href="https://facebook.com/tonys">Facebook</a>
            <a href="mailto:tony@tonyspizza.com">Mail</a>
            <a href="/flyer.pdf">Flyer</a>
            <a href="#top">Top</a>
        "##;

        let page = extract_page(body, &base());
        let links: Vec<&str> = page.links.iter().map(Url::as_str).collect();

        assert_eq!(
            links,
            vec![
                "https://www.tonyspizza.com/about",
                "https://tonyspizza.com/menu"
            ]
        );
    }

    #[test]
    fn link_priority_ranks_informative_pages() {
        let about = base().join("/about-us").unwrap();
        let menu = base().join("/menu").unwrap();
        let blog = base().join("/blog/2023/opening-night").unwrap();
        let privacy = base().join("/privacy-policy").unwrap();

        assert!(link_priority(&about) > link_priority(&menu));
        assert!(link_priority(&menu) > link_priority(&blog));
        assert!(link_priority(&blog) > link_priority(&privacy));
    }

    #[test]
    fn sitemap_urls_same_site_only() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url><loc>https://tonyspizza.com/menu</loc></url>
              <url><loc> https://www.tonyspizza.com/catering </loc></url>
              <url><loc>https://other.com/page</loc></url>
              <url><loc>https://tonyspizza.com/sitemap-posts.xml</loc></url>
            </urlset>"#;

        let urls = extract_sitemap_urls(body, &base());
        let urls: Vec<&str> = urls.iter().map(Url::as_str).collect();

        assert_eq!(
            urls,
            vec![
                "https://tonyspizza.com/menu",
                "https://www.tonyspizza.com/catering"
            ]
        );
    }

    #[test]
    fn truncate_utf8_respects_char_boundary() {
        let mut text = "café crème".to_string();
        assert!(truncate_utf8(&mut text, 4));
        assert_eq!(text, "caf");

        let mut short = "menu".to_string();
        assert!(!truncate_utf8(&mut short, 10));
        assert_eq!(short, "menu");
    }

    #[test]
    fn looks_blocked_detection() {
        assert!(looks_blocked(
            "<div id=\"cf-chl-widget\"></div>",
            "Just a moment..."
        ));
        assert!(looks_blocked("<p>Access Denied</p>", "Access Denied"));

        let long_page = format!("{} contact us, protected by captcha", "pizza ".repeat(300));
        assert!(!looks_blocked(&long_page, &long_page));
    }
}
