//! Robots.txt handling module
//!
//! robots.txt is fetched once per crawl session from the site's origin.
//! Disallowed URLs are never fetched and a crawl-delay widens the pacing
//! between requests.

mod parser;

pub use parser::{agent_token, ParsedRobots};

use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

/// Fetches robots.txt for the origin of `base_url`
///
/// Never fails: an unreachable or missing robots.txt (any non-2xx status)
/// allows everything.
///
/// # Arguments
///
/// * `client` - The session's HTTP client
/// * `base_url` - Any URL on the crawled site
/// * `user_agent` - The user agent string to match against
pub async fn fetch_robots(client: &Client, base_url: &Url, user_agent: &str) -> ParsedRobots {
    let robots_url = match base_url.join("/robots.txt") {
        Ok(url) => url,
        Err(e) => {
            warn!("Cannot build robots.txt URL from {}: {}", base_url, e);
            return ParsedRobots::allow_all();
        }
    };

    let response = match client.get(robots_url.clone()).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!("Failed to fetch {}: {}; allowing all", robots_url, e);
            return ParsedRobots::allow_all();
        }
    };

    if !response.status().is_success() {
        debug!(
            "{} returned HTTP {}; allowing all",
            robots_url,
            response.status().as_u16()
        );
        return ParsedRobots::allow_all();
    }

    match response.text().await {
        Ok(content) => {
            info!("Loaded {} ({} bytes)", robots_url, content.len());
            ParsedRobots::from_content(&content, user_agent)
        }
        Err(e) => {
            warn!("Failed to read {}: {}; allowing all", robots_url, e);
            ParsedRobots::allow_all()
        }
    }
}
