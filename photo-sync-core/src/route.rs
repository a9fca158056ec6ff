//! Destination routing: tags + mode => exactly one repository.

use serde::{Deserialize, Serialize};

use crate::config::Mode;

/// A tag that sends an item to a specific repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    pub tag: String,
    pub repository: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Evaluated in order; the first rule whose tag is present wins.
    pub rules: Vec<RouteRule>,
    pub default_repository: String,
    /// Replaces `default_repository` in development and test mode.
    pub dev_repository: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        RoutingConfig {
            rules: vec![
                RouteRule {
                    tag: "run".to_string(),
                    repository: "lildude/gonefora.run".to_string(),
                },
                RouteRule {
                    tag: "tech".to_string(),
                    repository: "lildude/lildude.co.uk".to_string(),
                },
            ],
            default_repository: "lildude/colinseymour.co.uk".to_string(),
            dev_repository: "lildude/lildude.github.io".to_string(),
        }
    }
}

/// Picks the destination repository for an item. Total and offline.
#[derive(Debug, Clone)]
pub struct Router {
    config: RoutingConfig,
    mode: Mode,
}

impl Router {
    pub fn new(config: RoutingConfig, mode: Mode) -> Self {
        Router { config, mode }
    }

    pub fn destination<S: AsRef<str>>(&self, tags: &[S]) -> &str {
        for rule in &self.config.rules {
            if tags.iter().any(|t| t.as_ref() == rule.tag) {
                return &rule.repository;
            }
        }
        if self.mode.is_development() {
            &self.config.dev_repository
        } else {
            &self.config.default_repository
        }
    }

    /// Tags that only exist to drive routing and never appear on a post.
    pub fn reserved_tags(&self) -> impl Iterator<Item = &str> {
        self.config.rules.iter().map(|r| r.tag.as_str())
    }

    pub fn is_reserved(&self, tag: &str) -> bool {
        self.reserved_tags().any(|t| t == tag)
    }
}
