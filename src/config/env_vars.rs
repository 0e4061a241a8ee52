use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    // ${VAR}, $VAR and %VAR%
    static ref ENV_VAR_PATTERN: Regex =
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)|%([A-Za-z_][A-Za-z0-9_]*)%")
            .unwrap();
}

/// Expand `${VAR}`, `$VAR` and `%VAR%` references from the process
/// environment. References to unset variables are left as written.
pub fn expand_env_vars(value: &str) -> String {
    if !value.contains('$') && !value.contains('%') {
        return value.to_string();
    }

    ENV_VAR_PATTERN
        .replace_all(value, |caps: &Captures| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or_default();

            std::env::var(name).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

/// Expand an optional value in place.
pub fn expand_optional(value: &mut Option<String>) {
    if let Some(inner) = value.as_mut() {
        *inner = expand_env_vars(inner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    // Every test uses its own variable names; tests run in parallel.

    #[test]
    fn test_brace_style() {
        env::set_var("UNA_TEST_BRACE", "s3cret");
        assert_eq!(expand_env_vars("${UNA_TEST_BRACE}"), "s3cret");
        assert_eq!(expand_env_vars("pre-${UNA_TEST_BRACE}-post"), "pre-s3cret-post");
        env::remove_var("UNA_TEST_BRACE");
    }

    #[test]
    fn test_dollar_style_name_boundaries() {
        env::set_var("UNA_TEST_DOLLAR", "value");
        assert_eq!(expand_env_vars("$UNA_TEST_DOLLAR/keys"), "value/keys");
        assert_eq!(expand_env_vars("$UNA_TEST_DOLLAR-1"), "value-1");
        // Trailing word characters belong to the name.
        assert_eq!(expand_env_vars("$UNA_TEST_DOLLAR123"), "$UNA_TEST_DOLLAR123");
        env::remove_var("UNA_TEST_DOLLAR");
    }

    #[test]
    fn test_percent_style() {
        env::set_var("UNA_TEST_PERCENT", "C:\\Users\\ops");
        assert_eq!(
            expand_env_vars("%UNA_TEST_PERCENT%\\.ssh\\id_rsa"),
            "C:\\Users\\ops\\.ssh\\id_rsa"
        );
        env::remove_var("UNA_TEST_PERCENT");
    }

    #[test]
    fn test_unset_variables_are_kept() {
        assert_eq!(expand_env_vars("${UNA_TEST_UNSET_A}"), "${UNA_TEST_UNSET_A}");
        assert_eq!(expand_env_vars("$UNA_TEST_UNSET_B/x"), "$UNA_TEST_UNSET_B/x");
        assert_eq!(expand_env_vars("%UNA_TEST_UNSET_C%"), "%UNA_TEST_UNSET_C%");
    }

    #[test]
    fn test_malformed_references() {
        assert_eq!(expand_env_vars("$"), "$");
        assert_eq!(expand_env_vars("${"), "${");
        assert_eq!(expand_env_vars("${incomplete"), "${incomplete");
        assert_eq!(expand_env_vars("100%"), "100%");
        assert_eq!(expand_env_vars("%%"), "%%");
    }

    #[test]
    fn test_expand_optional() {
        env::set_var("UNA_TEST_OPTIONAL", "pw");
        let mut value = Some("$UNA_TEST_OPTIONAL".to_string());
        expand_optional(&mut value);
        assert_eq!(value.as_deref(), Some("pw"));

        let mut none: Option<String> = None;
        expand_optional(&mut none);
        assert!(none.is_none());
        env::remove_var("UNA_TEST_OPTIONAL");
    }
}
