//! Parsing of `owner/name[:quant]` model references.

use std::fmt;
use std::str::FromStr;

use crate::error::DownloadError;

/// A parsed model reference. Owner and name are safe to use as path and URL
/// segments: non-empty, limited to `[A-Za-z0-9._-]`, never `.` or `..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelReference {
    pub owner: String,
    pub name: String,
    pub quant_tag: Option<String>,
}

impl ModelReference {
    pub fn parse(text: &str) -> Result<Self, DownloadError> {
        let invalid = |reason: &'static str| DownloadError::InvalidReference {
            input: text.to_string(),
            reason,
        };

        let text_trimmed = text.trim();
        let (repo, tag) = match text_trimmed.split_once(':') {
            Some((repo, tag)) => {
                if tag.contains(':') {
                    return Err(invalid("more than one ':' separator"));
                }
                if tag.is_empty() {
                    return Err(invalid("empty quant tag after ':'"));
                }
                if !tag.chars().all(is_ref_char) {
                    return Err(invalid("quant tag contains disallowed characters"));
                }
                (repo, Some(tag.to_string()))
            }
            None => (text_trimmed, None),
        };

        let (owner, name) = repo
            .split_once('/')
            .ok_or_else(|| invalid("missing '/' between owner and name"))?;
        if name.contains('/') {
            return Err(invalid("repository path must contain exactly one '/'"));
        }
        check_segment(owner).map_err(invalid)?;
        check_segment(name).map_err(invalid)?;

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            quant_tag: tag,
        })
    }

    /// `owner/name`, as used in registry URLs.
    pub fn repo(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

fn check_segment(segment: &str) -> Result<(), &'static str> {
    if segment.is_empty() {
        return Err("owner and name must be non-empty");
    }
    if segment == "." || segment == ".." {
        return Err("path traversal segment");
    }
    if !segment.chars().all(is_ref_char) {
        return Err("owner or name contains disallowed characters");
    }
    Ok(())
}

fn is_ref_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

impl FromStr for ModelReference {
    type Err = DownloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ModelReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)?;
        if let Some(tag) = &self.quant_tag {
            write!(f, ":{}", tag)?;
        }
        Ok(())
    }
}
