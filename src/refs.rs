//! ref name syntax
//!
//! a ref is one or more fragments of `[-._A-Za-z0-9]` joined by `/`; a
//! refspec optionally prefixes it with `remote:`.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

const FRAGMENT: &str = "[-._A-Za-z0-9]+";

fn rev_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!("^(?:{FRAGMENT}/)*{FRAGMENT}$")).ok())
        .as_ref()
}

fn refspec_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!("^(?:({FRAGMENT}):)?((?:{FRAGMENT}/)*{FRAGMENT})$")).ok()
    })
    .as_ref()
}

/// a parsed `[remote:]ref`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Refspec {
    pub remote: Option<String>,
    pub ref_name: String,
}

/// split a refspec into its optional remote and ref
pub fn parse_refspec(refspec: &str) -> Result<Refspec> {
    let caps = refspec_regex()
        .and_then(|re| re.captures(refspec))
        .ok_or_else(|| Error::InvalidRefspec(refspec.to_string()))?;
    let ref_name = caps
        .get(2)
        .ok_or_else(|| Error::InvalidRefspec(refspec.to_string()))?;
    Ok(Refspec {
        remote: caps.get(1).map(|m| m.as_str().to_string()),
        ref_name: ref_name.as_str().to_string(),
    })
}

/// check that `rev` is a syntactically valid ref name
pub fn validate_rev(rev: &str) -> Result<()> {
    match rev_regex() {
        Some(re) if re.is_match(rev) => Ok(()),
        _ => Err(Error::InvalidRev(rev.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_ref() {
        let spec = parse_refspec("exampleos/x86_64/stable").unwrap();
        assert_eq!(spec.remote, None);
        assert_eq!(spec.ref_name, "exampleos/x86_64/stable");
    }

    #[test]
    fn test_parse_with_remote() {
        let spec = parse_refspec("origin:exampleos/x86_64/stable").unwrap();
        assert_eq!(spec.remote.as_deref(), Some("origin"));
        assert_eq!(spec.ref_name, "exampleos/x86_64/stable");
    }

    #[test]
    fn test_parse_invalid() {
        for bad in ["", ":", "origin:", "a//b", "/a", "a/", "a:b:c", "with space", "é"] {
            assert!(
                matches!(parse_refspec(bad), Err(Error::InvalidRefspec(_))),
                "{:?}",
                bad
            );
        }
    }

    #[test]
    fn test_validate_rev() {
        for good in ["main", "a/b/c", "v1.0", "x86_64", "-._"] {
            assert!(validate_rev(good).is_ok(), "{:?}", good);
        }
        for bad in ["", "a/", "/a", "a//b", "a:b", "a b", "ünï"] {
            assert!(matches!(validate_rev(bad), Err(Error::InvalidRev(_))), "{:?}", bad);
        }
    }
}
