//! String helpers used when resolving configured lists.

use crate::errors::{HcoError, HcoResult};

/// Check that a list separator can split anything.
pub fn check_separator(separator: &str) -> HcoResult<()> {
    if separator.is_empty() {
        return Err(HcoError::configuration("list separator must not be empty"));
    }
    Ok(())
}

/// Check that a wildcard token can be told apart from species names.
///
/// Names are trimmed before they are compared with the wildcard, so the token
/// itself must be non-empty and carry no surrounding whitespace.
pub fn check_wildcard(wildcard: &str) -> HcoResult<()> {
    if wildcard.is_empty() || wildcard.trim() != wildcard {
        return Err(HcoError::configuration(format!(
            "invalid wildcard token '{}'",
            wildcard
        )));
    }
    Ok(())
}

/// Split a delimited list into trimmed tokens.
///
/// An empty (or whitespace-only) list yields no tokens. A list with an empty
/// token between two separators is malformed.
pub fn split_list(list: &str, separator: &str) -> HcoResult<Vec<String>> {
    check_separator(separator)?;
    let list = list.trim();
    if list.is_empty() {
        return Ok(vec![]);
    }

    list.split(separator)
        .map(str::trim)
        .map(|token| {
            if token.is_empty() {
                Err(HcoError::configuration(format!(
                    "malformed list '{}': empty entry",
                    list
                )))
            } else {
                Ok(token.to_string())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_splits_and_trims() {
        assert_eq!(
            split_list(" O3 ; NO;NO2 ", ";").unwrap(),
            vec!["O3", "NO", "NO2"]
        );
        assert_eq!(split_list("CO", "/").unwrap(), vec!["CO"]);
    }

    #[test]
    fn test_empty_list_has_no_tokens() {
        assert!(split_list("", ";").unwrap().is_empty());
        assert!(split_list("   ", ";").unwrap().is_empty());
    }

    #[test]
    fn test_empty_token_is_malformed() {
        let err = split_list("O3;;NO", ";").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = split_list("O3;", ";").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_multi_character_separator() {
        assert_eq!(split_list("a::b", "::").unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_separator() {
        let err = split_list("O3", "").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_wildcard_tokens() {
        assert!(check_wildcard("*").is_ok());
        assert!(check_wildcard("ALL").is_ok());
        assert!(check_wildcard("").is_err());
        assert!(check_wildcard(" ").is_err());
        assert!(check_wildcard(" *").is_err());
    }
}
