//! Mapping stored project URLs onto a GitLab instance and project path.

use url::Url;

use crate::error::GitLabError;

/// GitLab UI path markers; everything from the first match on is dropped.
const UI_SUFFIXES: [&str; 7] = [
    "/-/tree/",
    "/-/blob/",
    "/-/commits/",
    "/-/merge_requests",
    "/-/issues",
    "/-/wiki",
    "/-/settings",
];

/// A project URL split into the instance base URL and the project path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedProjectUrl {
    /// `scheme://host[:port]`, the port only when not the scheme default.
    pub base_url: String,
    /// `group[/subgroup...]/project`.
    pub project_path: String,
}

impl ParsedProjectUrl {
    /// Parse a project web URL such as
    /// `https://gitlab.example.com/group/app/-/tree/main`.
    pub fn parse(raw: &str) -> Result<Self, GitLabError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(GitLabError::InvalidUrl("URL is empty".to_string()));
        }

        let parsed = Url::parse(raw).map_err(|e| GitLabError::InvalidUrl(format!("{raw}: {e}")))?;
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| GitLabError::InvalidUrl(format!("{raw}: missing host")))?;

        let mut base_url = format!("{}://{host}", parsed.scheme());
        if let Some(port) = parsed.port() {
            base_url.push_str(&format!(":{port}"));
        }

        let mut path = parsed.path().trim_start_matches('/').trim_end_matches('/');
        if let Some(idx) = UI_SUFFIXES.iter().find_map(|suffix| path.find(suffix)) {
            path = &path[..idx];
        }

        if path.is_empty() {
            return Err(GitLabError::InvalidUrl(format!("{raw}: no project path")));
        }
        if !path.split('/').all(is_valid_segment) {
            return Err(GitLabError::InvalidUrl(format!(
                "{raw}: path must look like group/project"
            )));
        }

        Ok(Self {
            base_url,
            project_path: path.to_string(),
        })
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_project_url() {
        let parsed = ParsedProjectUrl::parse("https://gitlab.example.com/group/sub/app/").unwrap();
        assert_eq!(parsed.base_url, "https://gitlab.example.com");
        assert_eq!(parsed.project_path, "group/sub/app");
    }

    #[test]
    fn test_parse_keeps_custom_port_and_strips_ui_suffix() {
        let parsed =
            ParsedProjectUrl::parse("http://10.0.0.5:8080/team/app/-/merge_requests/12").unwrap();
        assert_eq!(parsed.base_url, "http://10.0.0.5:8080");
        assert_eq!(parsed.project_path, "team/app");

        let parsed = ParsedProjectUrl::parse("https://gitlab.example.com:443/team/app/-/tree/main").unwrap();
        assert_eq!(parsed.base_url, "https://gitlab.example.com");
        assert_eq!(parsed.project_path, "team/app");
    }

    #[test]
    fn test_parse_rejects_bad_urls() {
        for raw in [
            "",
            "   ",
            "gitlab.example.com/group/app",
            "https://gitlab.example.com",
            "https://gitlab.example.com/group/a%20b",
            "mailto:someone@example.com",
        ] {
            assert!(
                matches!(ParsedProjectUrl::parse(raw), Err(GitLabError::InvalidUrl(_))),
                "{raw:?} should be rejected"
            );
        }
    }
}
