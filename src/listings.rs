use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::{debug, info, warn};

pub const DEFAULT_SITE_ORIGIN: &str = "https://www.weworkremotely.com";

const CONTAINER_CSS: &str = "li.new-listing-container";

static CONTAINER_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(CONTAINER_CSS).unwrap());
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Collect one listing URL per `li.new-listing-container` on the index page.
///
/// The job-title link is taken to be the container's second `a[href]`; the
/// first one is the company logo. This mirrors the site's current markup and
/// is the only selection rule: containers with fewer than two links are
/// skipped rather than guessed at.
pub fn extract_listings(html: &str, origin: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let origin = origin.trim_end_matches('/');
    let mut listings = Vec::new();
    let mut containers = 0usize;

    for container in doc.select(&CONTAINER_SEL) {
        containers += 1;
        let Some(href) = container
            .select(&LINK_SEL)
            .nth(1)
            .and_then(|a| a.value().attr("href"))
        else {
            debug!("Listing container #{} has fewer than two links, skipping", containers);
            continue;
        };
        listings.push(absolutize(href, origin));
    }

    if containers == 0 {
        warn!(
            "No `{}` elements on index page; the board's markup may have changed",
            CONTAINER_CSS
        );
    }
    info!("Found {} links in {} listing containers", listings.len(), containers);
    listings
}

fn absolutize(href: &str, origin: &str) -> String {
    if href.starts_with("https") {
        href.to_string()
    } else {
        format!("{}{}", origin, href)
    }
}
