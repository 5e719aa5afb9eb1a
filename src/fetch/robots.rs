//! robots.txt parsing and the per-run policy cache.

use crate::config::MAX_DELAY_SECS;
use crate::fetch::transport::Transport;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use url::Url;

/// Rules for one user-agent group.
#[derive(Debug, Clone, Default, PartialEq)]
struct Group {
    allow: Vec<String>,
    disallow: Vec<String>,
    crawl_delay: Option<f64>,
}

/// A parsed robots.txt file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotsTxt {
    /// Groups keyed by lower-cased user-agent token; `*` is the fallback.
    groups: HashMap<String, Group>,
}

impl RobotsTxt {
    /// Parse robots.txt content. Unknown directives and malformed lines are
    /// ignored; consecutive `User-agent` lines share one group.
    pub fn parse(content: &str) -> Self {
        let mut groups: HashMap<String, Group> = HashMap::new();
        let mut agents: Vec<String> = Vec::new();
        let mut current = Group::default();
        let mut in_rules = false;

        let mut flush = |agents: &mut Vec<String>, current: &mut Group| {
            for agent in agents.drain(..) {
                let entry = groups.entry(agent).or_default();
                entry.allow.extend(current.allow.iter().cloned());
                entry.disallow.extend(current.disallow.iter().cloned());
                if entry.crawl_delay.is_none() {
                    entry.crawl_delay = current.crawl_delay;
                }
            }
            *current = Group::default();
        };

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match directive.trim().to_ascii_lowercase().as_str() {
                "user-agent" => {
                    if in_rules {
                        flush(&mut agents, &mut current);
                        in_rules = false;
                    }
                    agents.push(value.to_ascii_lowercase());
                }
                "allow" => {
                    in_rules = true;
                    if !value.is_empty() {
                        current.allow.push(value.to_string());
                    }
                }
                "disallow" => {
                    in_rules = true;
                    if !value.is_empty() {
                        current.disallow.push(value.to_string());
                    }
                }
                "crawl-delay" => {
                    in_rules = true;
                    // Values a Duration cannot hold are ignored.
                    if let Ok(secs) = value.parse::<f64>() {
                        if Duration::try_from_secs_f64(secs).is_ok() {
                            current.crawl_delay = Some(secs);
                        }
                    }
                }
                _ => {}
            }
        }
        flush(&mut agents, &mut current);

        Self { groups }
    }

    /// Allow-all policy, used when a site publishes no robots.txt.
    pub fn allow_all() -> Self {
        Self::default()
    }

    fn group_for(&self, user_agent: &str) -> Option<&Group> {
        let agent = user_agent.to_ascii_lowercase();
        self.groups
            .iter()
            .filter(|(token, _)| !token.is_empty() && token.as_str() != "*" && agent.contains(token.as_str()))
            .max_by_key(|(token, _)| token.len())
            .map(|(_, group)| group)
            .or_else(|| self.groups.get("*"))
    }

    /// Whether `path` may be fetched. The longest matching rule wins; on a tie
    /// `Allow` wins.
    pub fn is_allowed(&self, user_agent: &str, path: &str) -> bool {
        let Some(group) = self.group_for(user_agent) else {
            return true;
        };
        let longest = |rules: &[String]| {
            rules
                .iter()
                .filter(|rule| path_matches(rule, path))
                .map(|rule| rule.len())
                .max()
        };
        match (longest(&group.allow), longest(&group.disallow)) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(allow), Some(disallow)) => allow >= disallow,
        }
    }

    /// The group's `Crawl-delay`, capped at [`MAX_DELAY_SECS`].
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        self.group_for(user_agent)
            .and_then(|g| g.crawl_delay)
            .and_then(|secs| Duration::try_from_secs_f64(secs.min(MAX_DELAY_SECS)).ok())
    }
}

/// Prefix match with support for `*` wildcards and a trailing `$` anchor.
fn path_matches(rule: &str, path: &str) -> bool {
    let (rule, anchored) = match rule.strip_suffix('$') {
        Some(r) => (r, true),
        None => (rule, false),
    };
    let mut parts = rule.split('*');
    let first = parts.next().unwrap_or("");
    if !path.starts_with(first) {
        return false;
    }
    let mut pos = first.len();
    let rest: Vec<&str> = parts.collect();
    for (i, part) in rest.iter().enumerate() {
        let last = i + 1 == rest.len();
        if last && anchored {
            return path.len() >= pos + part.len() && path.ends_with(part);
        }
        match path[pos..].find(part) {
            Some(idx) => pos += idx + part.len(),
            None => return false,
        }
    }
    !anchored || rest.is_empty() && pos == path.len()
}

/// Result of checking a URL against its origin's robots.txt.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub crawl_delay: Option<Duration>,
}

/// Fetches each origin's robots.txt once per run and answers policy checks.
pub struct RobotsPolicy {
    user_agent: String,
    origins: Mutex<HashMap<String, Arc<OnceCell<Arc<RobotsTxt>>>>>,
}

impl RobotsPolicy {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            origins: Mutex::new(HashMap::new()),
        }
    }

    pub async fn check(&self, transport: &dyn Transport, url: &Url) -> PolicyDecision {
        let robots = self.rules_for(transport, url).await;
        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }
        PolicyDecision {
            allowed: robots.is_allowed(&self.user_agent, &path),
            crawl_delay: robots.crawl_delay(&self.user_agent),
        }
    }

    async fn rules_for(&self, transport: &dyn Transport, url: &Url) -> Arc<RobotsTxt> {
        let origin = url.origin().ascii_serialization();
        let cell = {
            let mut origins = self
                .origins
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            Arc::clone(origins.entry(origin.clone()).or_default())
        };
        cell.get_or_init(|| fetch_robots(transport, origin))
            .await
            .clone()
    }
}

async fn fetch_robots(transport: &dyn Transport, origin: String) -> Arc<RobotsTxt> {
    let robots_url = match Url::parse(&format!("{origin}/robots.txt")) {
        Ok(u) => u,
        Err(e) => {
            warn!(%origin, error = %e, "Cannot build robots.txt URL; allowing all");
            return Arc::new(RobotsTxt::allow_all());
        }
    };
    match transport.get(&robots_url).await {
        Ok(resp) if resp.is_success() => {
            info!(url = %robots_url, "Loaded robots.txt");
            Arc::new(RobotsTxt::parse(&resp.body))
        }
        Ok(resp) => {
            debug!(url = %robots_url, status = resp.status, "No robots.txt; allowing all");
            Arc::new(RobotsTxt::allow_all())
        }
        Err(e) => {
            warn!(url = %robots_url, error = %e, "robots.txt fetch failed; allowing all");
            Arc::new(RobotsTxt::allow_all())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UA: &str = "CarnavalDeBarranquilla Bot (+https://github.com/edgarmonza/carnaval-de-barranquilla)";

    #[test]
    fn test_parse_default_group() {
        let robots = RobotsTxt::parse(
            r#"
User-agent: *
Disallow: /admin/
Disallow: /buscar
Allow: /admin/public/
Crawl-delay: 3
"#,
        );

        assert!(robots.is_allowed(UA, "/tags/carnaval-de-barranquilla"));
        assert!(!robots.is_allowed(UA, "/admin/users"));
        assert!(robots.is_allowed(UA, "/admin/public/page"));
        assert!(!robots.is_allowed(UA, "/buscar?q=carnaval"));
        assert_eq!(robots.crawl_delay(UA), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_specific_agent_overrides_wildcard() {
        let robots = RobotsTxt::parse(
            r#"
User-agent: *
Disallow: /

User-agent: carnavaldebarranquilla
Disallow:
"#,
        );

        assert!(robots.is_allowed(UA, "/eventos"));
        assert!(!robots.is_allowed("OtherBot/1.0", "/eventos"));
    }

    #[test]
    fn test_consecutive_agents_share_group() {
        let robots = RobotsTxt::parse(
            r#"
User-agent: googlebot
User-agent: carnavaldebarranquilla
Disallow: /private
"#,
        );

        assert!(!robots.is_allowed(UA, "/private/x"));
        assert!(!robots.is_allowed("Googlebot", "/private/x"));
        assert!(robots.is_allowed("OtherBot", "/private/x"));
    }

    #[test]
    fn test_wildcards_and_anchor() {
        let robots = RobotsTxt::parse(
            r#"
User-agent: *
Disallow: /*.pdf$
Disallow: /*?sessionid=
"#,
        );

        assert!(!robots.is_allowed(UA, "/docs/programa.pdf"));
        assert!(robots.is_allowed(UA, "/docs/programa.pdf.html"));
        assert!(!robots.is_allowed(UA, "/eventos?sessionid=42"));
        assert!(robots.is_allowed(UA, "/eventos?page=2"));
    }

    #[test]
    fn test_empty_file_allows_everything() {
        let robots = RobotsTxt::parse("");
        assert!(robots.is_allowed(UA, "/anything"));
        assert_eq!(robots.crawl_delay(UA), None);
    }

    #[test]
    fn test_out_of_range_crawl_delay_is_ignored() {
        let robots = RobotsTxt::parse("User-agent: *\nCrawl-delay: 1e20\nDisallow: /privado\n");
        assert_eq!(robots.crawl_delay(UA), None);
        assert!(!robots.is_allowed(UA, "/privado"));

        let robots = RobotsTxt::parse("User-agent: *\nCrawl-delay: -2\n");
        assert_eq!(robots.crawl_delay(UA), None);
    }

    #[test]
    fn test_long_crawl_delay_is_capped() {
        let robots = RobotsTxt::parse("User-agent: *\nCrawl-delay: 86400\n");
        assert_eq!(robots.crawl_delay(UA), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_comments_are_stripped() {
        let robots = RobotsTxt::parse("User-agent: * # everyone\nDisallow: /tmp # scratch\n");
        assert!(!robots.is_allowed(UA, "/tmp/file"));
    }
}
