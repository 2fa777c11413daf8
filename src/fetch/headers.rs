//! Default request headers with User-Agent rotation

use std::sync::atomic::{AtomicUsize, Ordering};

pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

const STATIC_HEADERS: &[(&str, &str)] = &[
    ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    ("Accept-Language", "zh-CN,zh;q=0.9,en;q=0.8"),
    ("Connection", "keep-alive"),
];

/// Builds the header set every request starts from
pub struct DefaultHeaders {
    user_agents: Vec<String>,
    next: AtomicUsize,
}

impl DefaultHeaders {
    /// Falls back to the built-in agents when `user_agents` is empty
    pub fn new(user_agents: Vec<String>) -> Self {
        let user_agents = if user_agents.is_empty() {
            DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect()
        } else {
            user_agents
        };
        Self {
            user_agents,
            next: AtomicUsize::new(0),
        }
    }

    /// Next User-Agent in round-robin order
    pub fn next_user_agent(&self) -> &str {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.user_agents.len();
        &self.user_agents[idx]
    }

    /// Defaults overlaid with `overrides`; header names compare case-insensitively
    pub fn merge<'a, I>(&self, overrides: I) -> Vec<(String, String)>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut headers: Vec<(String, String)> = STATIC_HEADERS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        headers.push(("User-Agent".to_string(), self.next_user_agent().to_string()));

        for (name, value) in overrides {
            match headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
                Some(existing) => existing.1 = value.clone(),
                None => headers.push((name.clone(), value.clone())),
            }
        }
        headers
    }
}

impl Default for DefaultHeaders {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_user_agents_rotate() {
        let headers = DefaultHeaders::new(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(headers.next_user_agent(), "a");
        assert_eq!(headers.next_user_agent(), "b");
        assert_eq!(headers.next_user_agent(), "a");
    }

    #[test]
    fn test_request_headers_win() {
        let headers = DefaultHeaders::new(vec!["agent".to_string()]);
        let overrides = HashMap::from([
            ("user-agent".to_string(), "custom".to_string()),
            ("X-Token".to_string(), "t".to_string()),
        ]);

        let merged = headers.merge(&overrides);
        assert_eq!(value(&merged, "User-Agent"), Some("custom"));
        assert_eq!(value(&merged, "x-token"), Some("t"));
        assert!(value(&merged, "Accept").is_some());
        assert_eq!(
            merged.iter().filter(|(k, _)| k.eq_ignore_ascii_case("user-agent")).count(),
            1
        );
    }

    #[test]
    fn test_empty_list_uses_builtin_agents() {
        let headers = DefaultHeaders::default();
        assert!(DEFAULT_USER_AGENTS.contains(&headers.next_user_agent()));
    }
}
