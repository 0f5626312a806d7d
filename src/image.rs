// src/image.rs

//! Container image references.
//!
//! Parsing is deliberately loose: we only need enough structure to decide
//! whether a reference already names a registry (for registry prefixing and
//! login) and to key digest lookups.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

use crate::errors::AcbError;

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:(?P<host>[A-Za-z0-9.-]+(?::[0-9]+)?)/)?(?P<repo>[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*(?:/[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*)*)(?::(?P<tag>[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}))?(?:@(?P<digest>[A-Za-z][A-Za-z0-9]*:[0-9a-fA-F]{32,}))?$",
        )
        .expect("image reference regex is valid")
    })
}

/// Whether the first path component of a reference names a registry host.
pub fn is_registry_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

/// A parsed image reference such as `myreg.azurecr.io/team/app:v1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageReference {
    pub registry: Option<String>,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

impl ImageReference {
    /// Prefix the reference with `registry` unless it already carries one.
    pub fn with_default_registry(&self, registry: &str) -> Self {
        let mut out = self.clone();
        if out.registry.is_none() && !registry.is_empty() {
            out.registry = Some(registry.trim_end_matches('/').to_string());
        }
        out
    }

    /// Registry used for login; `None` means the default (Docker Hub).
    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    /// The reference without a tag or digest, e.g. `myreg.io/app`.
    pub fn name(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{}/{}", registry, self.repository),
            None => self.repository.clone(),
        }
    }
}

impl FromStr for ImageReference {
    type Err = AcbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let caps = reference_regex()
            .captures(trimmed)
            .ok_or_else(|| AcbError::InvalidImageReference(s.to_string()))?;

        let mut registry = caps.name("host").map(|m| m.as_str().to_string());
        let mut repository = caps
            .name("repo")
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        // `library/ubuntu`: the first component is a namespace, not a host.
        if let Some(host) = registry.take() {
            if is_registry_host(&host) {
                registry = Some(host);
            } else if host.chars().all(|c| !c.is_ascii_uppercase()) {
                repository = format!("{host}/{repository}");
            } else {
                return Err(AcbError::InvalidImageReference(s.to_string()));
            }
        }

        Ok(Self {
            registry,
            repository,
            tag: caps.name("tag").map(|m| m.as_str().to_string()),
            digest: caps.name("digest").map(|m| m.as_str().to_string()),
        })
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}
