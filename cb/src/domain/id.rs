//! Domain ID generation and resolution
//!
//! All IDs use the format: `{6-char-hex}-{type}-{slug}`
//! Example: `01943a-task-write-quarterly-report`
//!
//! Records without a title carry the full UUID in place of the slug:
//! `d29b1c-prediction-0192f3a4c1d27c0e8b5a4f1e2dd29b1c`

use std::collections::HashMap;

/// Maximum slug length kept in an ID
const MAX_SLUG_LEN: usize = 40;

/// Generate a domain ID from type and title
pub fn generate_id(domain_type: &str, title: &str) -> String {
    let uuid = uuid::Uuid::now_v7();
    let simple = uuid.simple().to_string();
    // v7 UUIDs lead with a timestamp; take the random tail so ids created in
    // the same millisecond still differ
    let hex = &simple[simple.len() - 6..];
    let slug = slugify(title);
    if slug.is_empty() {
        format!("{}-{}-{}", hex, domain_type, simple)
    } else {
        format!("{}-{}-{}", hex, domain_type, slug)
    }
}

/// Slugify a title for use in IDs
fn slugify(title: &str) -> String {
    let slug = title
        .to_lowercase()
        .chars()
        // Strip apostrophes entirely, replace other non-alphanumeric with hyphens
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c == '\'' || c == '\u{2019}' || c == '\u{2018}' {
                None
            } else {
                Some('-')
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");

    slug.chars()
        .take(MAX_SLUG_LEN)
        .collect::<String>()
        .trim_end_matches('-')
        .to_string()
}

/// ID resolution for partial matches typed on the command line
pub struct IdResolver<'a> {
    ids: &'a HashMap<String, String>, // id -> display name
}

impl<'a> IdResolver<'a> {
    pub fn new(ids: &'a HashMap<String, String>) -> Self {
        Self { ids }
    }

    /// Resolve a partial reference to a full ID
    ///
    /// Returns:
    /// - Ok(Some(id)) if exactly one match
    /// - Ok(None) if no matches
    /// - Err with candidates if ambiguous
    pub fn resolve(&self, reference: &str) -> Result<Option<String>, Vec<String>> {
        if self.ids.contains_key(reference) {
            return Ok(Some(reference.to_string()));
        }

        let mut matches: Vec<String> = self
            .ids
            .keys()
            .filter(|id| Self::matches(id, reference))
            .cloned()
            .collect();

        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            _ => {
                matches.sort();
                Err(matches)
            }
        }
    }

    /// Check if an ID matches a reference
    fn matches(id: &str, reference: &str) -> bool {
        // Hex prefix match
        if id.starts_with(reference) {
            return true;
        }

        // Slug contains match
        if let Some(slug_start) = id.find('-') {
            let slug_part = &id[slug_start + 1..];
            if slug_part.contains(reference) {
                return true;
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_id() {
        let id = generate_id("task", "Write Quarterly Report");
        assert!(id.contains("-task-"));
        assert!(id.ends_with("write-quarterly-report"));
        assert_eq!(id.split('-').next().unwrap().len(), 6);
    }

    #[test]
    fn test_generate_id_empty_title() {
        let id = generate_id("subtask", "!!!");
        let (prefix, rest) = id.split_once("-subtask-").unwrap();
        assert_eq!(prefix.len(), 6);
        assert_eq!(rest.len(), 32);
        assert!(rest.ends_with(prefix));
    }

    #[test]
    fn test_generate_id_untitled_no_collisions() {
        let ids: HashSet<String> = (0..20_000).map(|_| generate_id("prediction", "")).collect();
        assert_eq!(ids.len(), 20_000);
    }

    #[test]
    fn test_generate_id_unique() {
        let a = generate_id("task", "Same");
        let b = generate_id("task", "Same");
        assert_ne!(a, b);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("Email the team!"), "email-the-team");
        assert_eq!(slugify("Multiple   Spaces"), "multiple-spaces");
        assert_eq!(slugify("don't stop"), "dont-stop");
    }

    #[test]
    fn test_slugify_truncates() {
        let slug = slugify(&"word ".repeat(30));
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn test_id_resolver_exact() {
        let mut ids = HashMap::new();
        ids.insert("019430-task-write-report".to_string(), "Write report".to_string());
        ids.insert("019431-task-review-report".to_string(), "Review report".to_string());

        let resolver = IdResolver::new(&ids);
        assert_eq!(
            resolver.resolve("019430-task-write-report").unwrap(),
            Some("019430-task-write-report".to_string())
        );
    }

    #[test]
    fn test_id_resolver_hex_prefix() {
        let mut ids = HashMap::new();
        ids.insert("019430-task-write-report".to_string(), "Write report".to_string());
        ids.insert("019431-task-review-report".to_string(), "Review report".to_string());

        let resolver = IdResolver::new(&ids);
        assert_eq!(
            resolver.resolve("019430").unwrap(),
            Some("019430-task-write-report".to_string())
        );
    }

    #[test]
    fn test_id_resolver_ambiguous() {
        let mut ids = HashMap::new();
        ids.insert("019430-task-write-report".to_string(), "Write report".to_string());
        ids.insert("019431-task-review-report".to_string(), "Review report".to_string());

        let resolver = IdResolver::new(&ids);
        let candidates = resolver.resolve("report").unwrap_err();
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_id_resolver_no_match() {
        let mut ids = HashMap::new();
        ids.insert("019430-task-write-report".to_string(), "Write report".to_string());

        let resolver = IdResolver::new(&ids);
        assert_eq!(resolver.resolve("nonexistent").unwrap(), None);
    }
}
