//! Detection context: content signatures loaded from YAML.
//!
//! ```yaml
//! rules:
//!   - sid: 1000001
//!     msg: "HTTP GET"
//!     content: "GET |20|/"
//! ```
//!
//! `content` is matched anywhere in the captured bytes. Hex runs between
//! pipes (`|0d 0a|`) stand for raw bytes.

use std::path::Path;

use fxhash::FxHashMap;
use memchr::memmem::Finder;
use serde::Deserialize;

/// Rule file errors.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// The rule file cannot be read.
    #[error("failed to read rules from {path}: {source}")]
    Read {
        /// Rule file path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The YAML does not describe a rule list.
    #[error("invalid rules: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A content string is malformed.
    #[error("rule {sid}: {reason}")]
    Content {
        /// Signature id.
        sid: u32,
        /// What is wrong.
        reason: String,
    },

    /// Two rules share a signature id.
    #[error("duplicate sid {0}")]
    DuplicateSid(u32),
}

/// A rule as written in YAML.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RuleSpec {
    /// Signature id.
    pub sid: u32,
    /// Alert message.
    pub msg: String,
    /// Content pattern.
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<RuleSpec>,
}

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct Rule {
    sid: u32,
    msg: String,
    finder: Finder<'static>,
}

impl Rule {
    /// Signature id.
    #[must_use]
    pub fn sid(&self) -> u32 {
        self.sid
    }

    /// Alert message.
    #[must_use]
    pub fn msg(&self) -> &str {
        &self.msg
    }

    /// Returns true if the pattern occurs in `haystack`.
    #[must_use]
    pub fn matches(&self, haystack: &[u8]) -> bool {
        self.finder.find(haystack).is_some()
    }
}

/// Compiled rule set shared by every detect worker.
#[derive(Debug, Clone, Default)]
pub struct DetectContext {
    rules: Vec<Rule>,
    by_sid: FxHashMap<u32, usize>,
}

impl DetectContext {
    /// Compiles `specs`.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed content string or a duplicate sid.
    pub fn compile(specs: &[RuleSpec]) -> Result<Self, RuleError> {
        let mut context = Self::default();
        for spec in specs {
            if context.by_sid.contains_key(&spec.sid) {
                return Err(RuleError::DuplicateSid(spec.sid));
            }
            let pattern = parse_content(&spec.content).map_err(|reason| RuleError::Content {
                sid: spec.sid,
                reason,
            })?;
            context.by_sid.insert(spec.sid, context.rules.len());
            context.rules.push(Rule {
                sid: spec.sid,
                msg: spec.msg.clone(),
                finder: Finder::new(&pattern).into_owned(),
            });
        }
        tracing::debug!(rules = context.rules.len(), "compiled detection rules");
        Ok(context)
    }

    /// Parses a YAML document with a top-level `rules` list.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid or a rule does not compile.
    pub fn from_yaml_str(text: &str) -> Result<Self, RuleError> {
        let file: RuleFile = serde_yaml::from_str(text)?;
        Self::compile(&file.rules)
    }

    /// Reads and compiles a rule file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not compile.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuleError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RuleError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Compiles the `rules` list of an already parsed YAML value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a rule list.
    pub fn from_value(value: &serde_yaml::Value) -> Result<Self, RuleError> {
        let specs: Vec<RuleSpec> = serde_yaml::from_value(value.clone())?;
        Self::compile(&specs)
    }

    /// Compiled rules, in file order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Rule with signature id `sid`.
    #[must_use]
    pub fn rule(&self, sid: u32) -> Option<&Rule> {
        self.by_sid.get(&sid).map(|&i| &self.rules[i])
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns true if there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Expands `|hex|` runs in a content string.
fn parse_content(content: &str) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(content.len());
    let mut in_hex = false;
    // split yields text, hex, text, hex, ...
    for part in content.split('|') {
        if in_hex {
            for byte in part.split_whitespace() {
                let value = u8::from_str_radix(byte, 16)
                    .map_err(|_| format!("invalid hex byte '{byte}'"))?;
                out.push(value);
            }
        } else {
            out.extend_from_slice(part.as_bytes());
        }
        in_hex = !in_hex;
    }
    // An odd number of pipes leaves the last run open.
    if !in_hex {
        return Err("unterminated hex run".to_string());
    }
    if out.is_empty() {
        return Err("empty content".to_string());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_with_hex() {
        assert_eq!(parse_content("GET |20|/").unwrap(), b"GET /");
        assert_eq!(parse_content("|0d 0a|").unwrap(), b"\r\n");
        assert_eq!(parse_content("plain").unwrap(), b"plain");
    }

    #[test]
    fn test_parse_content_errors() {
        assert!(parse_content("a|41").is_err());
        assert!(parse_content("|zz|").is_err());
        assert!(parse_content("").is_err());
    }

    #[test]
    fn test_rules_from_yaml() {
        let context = DetectContext::from_yaml_str(
            "rules:\n\
             - sid: 1\n  msg: get\n  content: \"GET|20|\"\n\
             - sid: 2\n  msg: ssh\n  content: SSH-2.0\n",
        )
        .unwrap();
        assert_eq!(context.len(), 2);
        assert!(context.rule(1).unwrap().matches(b"xxGET /index"));
        assert!(!context.rule(2).unwrap().matches(b"SSH-1.99"));
        assert_eq!(context.rule(2).unwrap().msg(), "ssh");
    }

    #[test]
    fn test_duplicate_sid_rejected() {
        let specs = vec![
            RuleSpec {
                sid: 7,
                msg: "a".into(),
                content: "a".into(),
            },
            RuleSpec {
                sid: 7,
                msg: "b".into(),
                content: "b".into(),
            },
        ];
        assert!(matches!(
            DetectContext::compile(&specs),
            Err(RuleError::DuplicateSid(7))
        ));
    }
}
