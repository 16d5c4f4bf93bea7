use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static VARIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$[a-zA-Z0-9]+").expect("variable pattern is valid"));

// `$` followed by anything but an alphanumeric, or by nothing at all
static INVALID_VARIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$(?:[^a-zA-Z0-9]|$)").expect("invalid variable pattern is valid"));

/// Malformed path template.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PathError {
    #[error("path must be a string")]
    NotAString,

    #[error("path can't be empty")]
    Empty,

    #[error("path can't start with /")]
    LeadingSlash,

    #[error("invalid variable name {token}")]
    InvalidVariable { token: String },

    #[error("path {path} does not compile: {reason}")]
    Pattern { path: String, reason: String },
}

/// A compiled path template such as `game-comment/$gameId/*`.
///
/// `*` matches any run of characters, separators included. `$name` matches
/// one or more characters other than `/` and is captured. The whole name
/// has to match.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    raw: String,
    variables: Vec<String>,
    matcher: Regex,
}

impl PathTemplate {
    /// Check that `path` is a usable template.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] for empty paths, a leading `/` and `$` tokens
    /// that aren't followed by an alphanumeric name.
    pub fn validate(path: &str) -> Result<(), PathError> {
        if path.is_empty() {
            return Err(PathError::Empty);
        }
        if path.starts_with('/') {
            return Err(PathError::LeadingSlash);
        }
        if let Some(token) = INVALID_VARIABLE.find(path) {
            return Err(PathError::InvalidVariable {
                token: token.as_str().to_owned(),
            });
        }
        Ok(())
    }

    /// [`validate`](Self::validate) for a path that arrived as arbitrary JSON.
    ///
    /// # Errors
    ///
    /// [`PathError::NotAString`] for anything but a JSON string.
    pub fn validate_value(path: &serde_json::Value) -> Result<(), PathError> {
        match path {
            serde_json::Value::String(path) => Self::validate(path),
            _ => Err(PathError::NotAString),
        }
    }

    /// Validate and compile `path`.
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate).
    pub fn parse(path: &str) -> Result<Self, PathError> {
        Self::validate(path)?;

        let mut pattern = String::from("^");
        let mut variables = Vec::new();
        let mut last = 0;
        for token in VARIABLE.find_iter(path) {
            push_literal(&mut pattern, &path[last..token.start()]);
            pattern.push_str("([^/]+)");
            variables.push(token.as_str().to_owned());
            last = token.end();
        }
        push_literal(&mut pattern, &path[last..]);
        pattern.push('$');

        let matcher = Regex::new(&pattern).map_err(|e| PathError::Pattern {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            raw: path.to_owned(),
            variables,
            matcher,
        })
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Variable tokens including the `$`, in order of appearance.
    #[must_use]
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// The compiled, anchored pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        self.matcher.as_str()
    }

    #[must_use]
    pub fn is_match(&self, name: &str) -> bool {
        self.matcher.is_match(name)
    }

    /// Captured variable values for `name`, one per [`variables`](Self::variables) entry.
    #[must_use]
    pub fn captures(&self, name: &str) -> Option<Vec<String>> {
        self.matcher.captures(name).map(|caps| {
            caps.iter()
                .skip(1)
                .map(|group| group.map_or_else(String::new, |m| m.as_str().to_owned()))
                .collect()
        })
    }
}

/// Escape a literal chunk, turning each `*` into `.*`.
fn push_literal(pattern: &mut String, chunk: &str) {
    for (i, part) in chunk.split('*').enumerate() {
        if i > 0 {
            pattern.push_str(".*");
        }
        pattern.push_str(&regex::escape(part));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_path() {
        assert_eq!(PathTemplate::validate("game-comment/$gameId/*"), Ok(()));
    }

    #[test]
    fn rejects_non_strings() {
        assert_eq!(
            PathTemplate::validate_value(&serde_json::json!(3)),
            Err(PathError::NotAString)
        );
        assert_eq!(
            PathTemplate::validate_value(&serde_json::json!("a/b")),
            Ok(())
        );
    }

    #[test]
    fn rejects_empty_and_leading_slash() {
        assert_eq!(PathTemplate::validate(""), Err(PathError::Empty));
        assert_eq!(PathTemplate::validate("/bla"), Err(PathError::LeadingSlash));
        assert_eq!(
            PathError::LeadingSlash.to_string(),
            "path can't start with /"
        );
    }

    #[test]
    fn rejects_invalid_variable_names() {
        let err = PathTemplate::validate("bla/$-").unwrap_err();
        assert_eq!(err.to_string(), "invalid variable name $-");
        let err = PathTemplate::validate("bla/$$aa").unwrap_err();
        assert_eq!(err.to_string(), "invalid variable name $$");
        let err = PathTemplate::validate("bla/$").unwrap_err();
        assert_eq!(err.to_string(), "invalid variable name $");
    }

    #[test]
    fn literal_path() {
        let t = PathTemplate::parse("i-am-valid").unwrap();
        assert!(t.variables().is_empty());
        assert!(t.is_match("i-am-valid"));
        assert!(!t.is_match("i-am-valid/x"));
        assert!(!t.is_match("xi-am-valid"));
    }

    #[test]
    fn regex_metacharacters_are_literal() {
        let t = PathTemplate::parse("a.b+(c)").unwrap();
        assert!(t.is_match("a.b+(c)"));
        assert!(!t.is_match("axbb(c)"));
    }

    #[test]
    fn wildcard_spans_separators() {
        let t = PathTemplate::parse("public/*").unwrap();
        assert!(t.is_match("public/"));
        assert!(t.is_match("public/a/b/c"));
        assert!(!t.is_match("private/a"));

        let t = PathTemplate::parse("a*z").unwrap();
        assert!(t.is_match("a/b/z"));
    }

    #[test]
    fn single_variable() {
        let t = PathTemplate::parse("users/$id").unwrap();
        assert_eq!(t.variables(), ["$id"]);
        assert_eq!(t.captures("users/42"), Some(vec!["42".to_owned()]));
        assert_eq!(t.captures("users/42/x"), None);
        assert_eq!(t.captures("users/"), None);
    }

    #[test]
    fn multiple_variables_in_order() {
        let t = PathTemplate::parse("game-comment/$gameId/$userId/$commentId").unwrap();
        assert_eq!(t.variables(), ["$gameId", "$userId", "$commentId"]);
        assert_eq!(
            t.captures("game-comment/g1/u2/c3"),
            Some(vec!["g1".to_owned(), "u2".to_owned(), "c3".to_owned()])
        );
    }

    #[test]
    fn variable_and_wildcard() {
        let t = PathTemplate::parse("$recordName/*").unwrap();
        assert_eq!(t.pattern(), "^([^/]+)/.*$");
        assert_eq!(
            t.captures("chat/room/1"),
            Some(vec!["chat".to_owned()])
        );
    }
}
