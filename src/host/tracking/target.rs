use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;
use url::Url;

/// Hostnames, URL schemes and path prefixes excluded from tracking.
/// Internal browser surfaces and local development servers produce no
/// close-outs at all.
#[derive(Debug, Clone)]
pub struct IgnoreList {
    hosts: HashSet<String>,
    schemes: HashSet<String>,
    path_prefixes: Vec<String>,
}

impl IgnoreList {
    pub fn new(
        hosts: impl IntoIterator<Item = String>,
        schemes: impl IntoIterator<Item = String>,
        path_prefixes: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            hosts: hosts.into_iter().collect(),
            schemes: schemes.into_iter().collect(),
            path_prefixes: path_prefixes.into_iter().collect(),
        }
    }

    pub fn is_ignored(&self, url: &Url) -> bool {
        if self.schemes.contains(url.scheme()) {
            return true;
        }
        if let Some(host) = url.host_str() {
            if self.hosts.contains(host) {
                return true;
            }
        }
        self.path_prefixes
            .iter()
            .any(|prefix| url.path().starts_with(prefix.as_str()))
    }
}

impl Default for IgnoreList {
    fn default() -> Self {
        Self::new(
            ["localhost", "127.0.0.1", "settings", "newtab", "extensions"]
                .map(String::from),
            [
                "about",
                "chrome",
                "chrome-extension",
                "edge",
                "moz-extension",
                "devtools",
                "file",
            ]
            .map(String::from),
            [],
        )
    }
}

/// What a navigation points at, as far as attribution is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabTarget {
    Tracked {
        domain: Arc<str>,
        favicon: Option<Arc<str>>,
    },
    /// Unparseable, hostless or ignore-listed. Never tracked, never closed
    /// out under any name.
    Untracked,
}

/// Domain extraction: parse the URL, take the hostname. Anything that fails
/// to parse is classified untracked rather than propagated as an error.
pub fn classify(url: Option<&str>, favicon: Option<Arc<str>>, ignore: &IgnoreList) -> TabTarget {
    let Some(url) = url else {
        return TabTarget::Untracked;
    };
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!("Unparseable url {url:?}: {e}");
            return TabTarget::Untracked;
        }
    };
    if ignore.is_ignored(&parsed) {
        return TabTarget::Untracked;
    }
    let Some(host) = parsed.host_str() else {
        return TabTarget::Untracked;
    };

    TabTarget::Tracked {
        domain: host.to_lowercase().into(),
        favicon: favicon.filter(|f| !f.is_empty()),
    }
}
