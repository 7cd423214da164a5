//! Robots.txt rules
//!
//! Permission checks go through the robotstxt crate; the crawl-delay
//! directive, which that crate ignores, is read here.

use robotstxt::DefaultMatcher;
use std::time::Duration;
use url::Url;

/// Robots.txt rules bound to the crawler's user agent
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content (None means allow all)
    content: Option<String>,
    /// Product token matched against `User-agent` lines
    agent: String,
}

/// Product token of a user agent string ("trf5-crawler/0.1 (+url)" gives "trf5-crawler")
pub fn agent_token(user_agent: &str) -> String {
    user_agent
        .split(|c: char| c == '/' || c.is_whitespace())
        .find(|part| !part.is_empty())
        .unwrap_or("*")
        .to_string()
}

impl ParsedRobots {
    /// Creates rules from raw robots.txt content
    ///
    /// # Arguments
    ///
    /// * `content` - The raw robots.txt file content
    /// * `user_agent` - The crawler's user agent string
    pub fn from_content(content: &str, user_agent: &str) -> Self {
        Self {
            content: Some(content.to_string()),
            agent: agent_token(user_agent),
        }
    }

    /// Creates permissive rules
    ///
    /// Used when robots.txt is missing, unreachable, or not obeyed.
    pub fn allow_all() -> Self {
        Self {
            content: None,
            agent: "*".to_string(),
        }
    }

    /// Checks if a URL may be fetched
    pub fn is_allowed(&self, url: &Url) -> bool {
        match &self.content {
            Some(content) if !content.trim().is_empty() => {
                let mut matcher = DefaultMatcher::default();
                matcher.one_agent_allowed_by_robots(content, &self.agent, url.as_str())
            }
            _ => true,
        }
    }

    /// Gets the crawl delay that applies to this agent
    ///
    /// A group naming the agent wins over the `*` group.
    pub fn crawl_delay(&self) -> Option<Duration> {
        let content = self.content.as_deref()?;
        let agent = self.agent.to_lowercase();

        let mut group: Vec<String> = Vec::new();
        let mut group_open = false;
        let mut for_agent = None;
        let mut for_wildcard = None;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match key.trim().to_lowercase().as_str() {
                "user-agent" => {
                    if !group_open {
                        group.clear();
                        group_open = true;
                    }
                    group.push(value.to_lowercase());
                }
                "crawl-delay" => {
                    group_open = false;
                    let Some(delay) = value.parse::<f64>().ok().filter(|d| *d >= 0.0) else {
                        continue;
                    };
                    if group.iter().any(|ua| *ua == agent) {
                        for_agent = Some(delay);
                    } else if group.iter().any(|ua| ua == "*") {
                        for_wildcard = Some(delay);
                    }
                }
                _ => group_open = false,
            }
        }

        for_agent.or(for_wildcard).map(Duration::from_secs_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGENT: &str = "trf5-crawler/0.1 (+https://example.org)";

    fn url(path: &str) -> Url {
        Url::parse("https://www5.trf5.jus.br").unwrap().join(path).unwrap()
    }

    #[test]
    fn test_agent_token() {
        assert_eq!(agent_token(AGENT), "trf5-crawler");
        assert_eq!(agent_token("Bot"), "Bot");
        assert_eq!(agent_token(""), "*");
    }

    #[test]
    fn test_allow_all() {
        let robots = ParsedRobots::allow_all();
        assert!(robots.is_allowed(&url("/cp/")));
        assert_eq!(robots.crawl_delay(), None);
    }

    #[test]
    fn test_disallow_path() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /cp/processo", AGENT);
        assert!(robots.is_allowed(&url("/cp/")));
        assert!(!robots.is_allowed(&url("/cp/processo/0015648")));
    }

    #[test]
    fn test_specific_group() {
        let content = "User-agent: trf5-crawler\nDisallow: /\n\nUser-agent: *\nAllow: /";
        let robots = ParsedRobots::from_content(content, AGENT);
        assert!(!robots.is_allowed(&url("/cp/")));

        let other = ParsedRobots::from_content(content, "OtherBot/1.0");
        assert!(other.is_allowed(&url("/cp/")));
    }

    #[test]
    fn test_empty_content_allows() {
        let robots = ParsedRobots::from_content("", AGENT);
        assert!(robots.is_allowed(&url("/anything")));
    }

    #[test]
    fn test_crawl_delay() {
        let content = "User-agent: *\nCrawl-delay: 2.5\nDisallow: /admin";
        let robots = ParsedRobots::from_content(content, AGENT);
        assert_eq!(robots.crawl_delay(), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_crawl_delay_prefers_agent_group() {
        let content = "User-agent: *\nCrawl-delay: 10\n\nUser-agent: trf5-crawler\nUser-agent: other\nCrawl-delay: 1";
        let robots = ParsedRobots::from_content(content, AGENT);
        assert_eq!(robots.crawl_delay(), Some(Duration::from_secs(1)));

        let robots = ParsedRobots::from_content(content, "SomeBot");
        assert_eq!(robots.crawl_delay(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_crawl_delay_ignores_garbage() {
        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: soon", AGENT);
        assert_eq!(robots.crawl_delay(), None);
    }
}
