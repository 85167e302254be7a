//! Blocking page fetcher shared by all adapters
//!
//! Applies the configured timeout and user agent, and consults robots.txt
//! before fetching a page when politeness is enabled.

use std::time::Duration;
use anyhow::Result;
use url::Url;

use crate::error::SourceError;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub user_agent: String,
    pub timeout: Duration,
    pub respect_robots: bool,
}

#[derive(Clone)]
pub struct PageFetcher {
    client: reqwest::blocking::Client,
    respect_robots: bool,
}

impl PageFetcher {
    pub fn new(options: &FetchOptions) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(options.user_agent.clone())
            .timeout(options.timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self { client, respect_robots: options.respect_robots })
    }

    /// GET a page body. Non-2xx, transport errors and timeouts are `SourceError`s.
    pub fn get(&self, url: &Url) -> Result<String, SourceError> {
        if self.respect_robots && !self.robots_allows(url) {
            return Err(SourceError::RobotsDisallowed { url: url.to_string() });
        }

        let resp = self.client.get(url.as_str())
            .send()
            .map_err(|e| SourceError::from_reqwest(url.as_str(), &e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::HttpStatus { url: url.to_string(), status: status.as_u16() });
        }

        resp.text().map_err(|e| SourceError::from_reqwest(url.as_str(), &e))
    }

    /// Missing or unreadable robots.txt means everything is allowed.
    fn robots_allows(&self, url: &Url) -> bool {
        let robots_url = match url.join("/robots.txt") {
            Ok(u) => u,
            Err(_) => return true,
        };

        let body = match self.client.get(robots_url.as_str()).send() {
            Ok(resp) if resp.status().is_success() => resp.text().unwrap_or_default(),
            Ok(resp) => {
                tracing::debug!(url = %robots_url, status = resp.status().as_u16(), "no robots.txt");
                return true;
            }
            Err(e) => {
                tracing::debug!(url = %robots_url, error = %e, "robots.txt unreachable");
                return true;
            }
        };

        RobotsRules::parse(&body).allows(&path_and_query(url))
    }
}

fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(q) => format!("{}?{}", url.path(), q),
        None => url.path().to_string(),
    }
}

/// Allow/Disallow rules of the `User-agent: *` group.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RobotsRules {
    allow: Vec<String>,
    disallow: Vec<String>,
}

impl RobotsRules {
    pub fn parse(body: &str) -> Self {
        let mut rules = RobotsRules::default();
        let mut in_star_group = false;
        // consecutive User-agent lines share one group
        let mut last_was_agent = false;

        for raw in body.lines() {
            let line = raw.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if !last_was_agent {
                        in_star_group = false;
                    }
                    if value == "*" {
                        in_star_group = true;
                    }
                    last_was_agent = true;
                }
                "allow" | "disallow" => {
                    last_was_agent = false;
                    if !in_star_group || value.is_empty() {
                        continue;
                    }
                    if key == "allow" {
                        rules.allow.push(value.to_string());
                    } else {
                        rules.disallow.push(value.to_string());
                    }
                }
                _ => last_was_agent = false,
            }
        }

        rules
    }

    /// Longest matching prefix wins; Allow wins a tie.
    pub fn allows(&self, path: &str) -> bool {
        let longest = |rules: &[String]| {
            rules.iter()
                .filter(|r| path.starts_with(r.as_str()))
                .map(|r| r.len())
                .max()
        };

        match (longest(self.allow.as_slice()), longest(self.disallow.as_slice())) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(d)) => a >= d,
        }
    }
}
