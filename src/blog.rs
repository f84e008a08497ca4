//! Blog post conventions: Jekyll-style front matter and public URLs.
//!
//! Posts are named `YYYY-MM-DD-Slug.md` and start with a header block:
//!
//! ```text
//! ---
//! layout: post
//! title: "Blog Post Title"
//! date: 2022-10-08
//! tags: [GitHub, Actions]
//! ---
//! ```
//!
//! The public URL of a post is `<base>/<yyyy>/<mm>/<dd>/<Slug>`, where the date
//! comes from the header (not the file name; the two can differ when a post is
//! renamed after publishing).

use anyhow::{bail, Context, Result};

use crate::models::PostMetadata;

/// Return the front-matter block (between the first two `---` lines), if any.
fn front_matter(content: &str) -> Option<&str> {
    let mut parts = content.splitn(3, "---");
    let before = parts.next()?;
    if !before.trim().is_empty() {
        return None;
    }
    let header = parts.next()?;
    parts.next()?;
    Some(header)
}

/// Extract the `date` value from a post header, e.g. `2022-10-08`.
///
/// Only the leading `YYYY-MM-DD` is kept when the header carries a time as
/// well (`date: 2022-10-08 10:15:00 +0200`).
pub fn parse_header_date(content: &str) -> Option<String> {
    let header = front_matter(content)?;
    header
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("date"))
        .and_then(|line| line.split_once(':'))
        .map(|(_, value)| value.trim().trim_matches(|c| c == '"' || c == '\''))
        .map(|value| value.split_whitespace().next().unwrap_or(value).to_string())
        .filter(|value| !value.is_empty())
}

/// Parse title, date, and tags from the header. Anything that does not parse
/// as YAML degrades to empty metadata (with the date still recovered by the
/// line-based parser).
pub fn parse_metadata(content: &str) -> PostMetadata {
    let date = parse_header_date(content);
    let Some(header) = front_matter(content) else {
        return PostMetadata::default();
    };

    let value: serde_yaml::Value = match serde_yaml::from_str(header) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "front matter is not valid YAML");
            return PostMetadata {
                date,
                ..PostMetadata::default()
            };
        }
    };

    let title = value
        .get("title")
        .and_then(|t| t.as_str())
        .map(|t| t.trim().to_string());

    let tags = match value.get("tags") {
        Some(serde_yaml::Value::Sequence(seq)) => seq
            .iter()
            .filter_map(|t| match t {
                serde_yaml::Value::String(s) => Some(s.clone()),
                serde_yaml::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        // Jekyll also accepts a space-separated string.
        Some(serde_yaml::Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
        _ => Vec::new(),
    };

    PostMetadata { title, date, tags }
}

/// Build the public URL of a post from its file name and header date.
///
/// `file_name` may include directories; only the last component is used.
pub fn post_url(file_name: &str, date: &str, base_url: &str) -> Result<String> {
    let name = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let stem = name.strip_suffix(".md").unwrap_or(name);

    let parts: Vec<&str> = stem.splitn(4, '-').collect();
    if parts.len() < 4 || !parts[..3].iter().all(|p| p.chars().all(|c| c.is_ascii_digit())) {
        bail!("'{}' does not start with a YYYY-MM-DD- prefix", name);
    }
    let slug = parts[3];

    let date = date
        .trim()
        .strip_prefix("date:")
        .or_else(|| date.trim().strip_prefix("Date:"))
        .unwrap_or(date)
        .trim();
    let parsed = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .with_context(|| format!("invalid post date '{}'", date))?;

    Ok(format!(
        "{}/{}/{}",
        base_url.trim_end_matches('/'),
        parsed.format("%Y/%m/%d"),
        slug
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const POST: &str = "---\nlayout: post\ntitle: \"Securing Actions\"\ndate: 2022-10-08\ntags: [GitHub, Actions, Security]\n---\n\nBody text.\n";

    #[test]
    fn test_parse_header_date() {
        assert_eq!(parse_header_date(POST).as_deref(), Some("2022-10-08"));
    }

    #[test]
    fn test_parse_header_date_with_time() {
        let post = "---\ntitle: x\ndate: '2021-03-04 10:00:00 +0100'\n---\nbody";
        assert_eq!(parse_header_date(post).as_deref(), Some("2021-03-04"));
    }

    #[test]
    fn test_parse_header_date_missing() {
        assert_eq!(parse_header_date("---\ntitle: x\n---\nbody"), None);
        assert_eq!(parse_header_date("no header at all"), None);
    }

    #[test]
    fn test_parse_metadata() {
        let meta = parse_metadata(POST);
        assert_eq!(meta.title.as_deref(), Some("Securing Actions"));
        assert_eq!(meta.date.as_deref(), Some("2022-10-08"));
        assert_eq!(meta.tags, vec!["GitHub", "Actions", "Security"]);
    }

    #[test]
    fn test_parse_metadata_string_tags() {
        let meta = parse_metadata("---\ntags: devops azure\n---\n");
        assert_eq!(meta.tags, vec!["devops", "azure"]);
    }

    #[test]
    fn test_parse_metadata_bad_yaml_keeps_date() {
        let meta = parse_metadata("---\ntitle: [unclosed\ndate: 2020-01-02\n---\n");
        assert_eq!(meta.title, None);
        assert_eq!(meta.date.as_deref(), Some("2020-01-02"));
    }

    #[test]
    fn test_post_url() {
        let url = post_url(
            "2022-10-08-Example-Post.md",
            "2022-10-08",
            "https://example.com/blog",
        )
        .unwrap();
        assert_eq!(url, "https://example.com/blog/2022/10/08/Example-Post");
    }

    #[test]
    fn test_post_url_uses_header_date_and_strips_dirs() {
        let url = post_url(
            "blog/_posts//2022-10-09-Enabling-GitHub-Actions-on-Enterprise-Server.md",
            "Date: 2022-10-08",
            "https://devopsjournal.io/blog/",
        )
        .unwrap();
        assert_eq!(
            url,
            "https://devopsjournal.io/blog/2022/10/08/Enabling-GitHub-Actions-on-Enterprise-Server"
        );
    }

    #[test]
    fn test_post_url_rejects_undated_name() {
        assert!(post_url("about.md", "2022-10-08", "https://example.com").is_err());
    }
}
