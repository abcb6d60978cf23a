use std::env;
use std::str::FromStr;
use tracing::warn;

/// Retrieves an environment variable and splits it into a vector of strings based on a delimiter.
///
/// Empty segments are dropped, so an unset variable yields an empty vector.
pub fn get_env_var_as_vec(var: &str, delimiter: char) -> Vec<String> {
    env::var(var)
        .unwrap_or_default()
        .split(delimiter)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Retrieves an environment variable as a non-empty string.
pub fn get_env_var(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parses an environment variable, falling back to `default` when it is unset or invalid.
pub fn get_env_var_or<T>(var: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match get_env_var(var) {
        Some(raw) => match raw.parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!("Invalid value '{}' for {}, using default {}", raw, var, default);
                default
            }
        },
        None => default,
    }
}

/// Parses a delimited environment variable into typed values, skipping entries that don't parse.
pub fn get_env_var_as_parsed_vec<T: FromStr>(var: &str, delimiter: char) -> Vec<T> {
    get_env_var_as_vec(var, delimiter)
        .into_iter()
        .filter_map(|s| match s.parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid entry '{}' in {}", s, var);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_parsing_skips_blanks() {
        env::set_var("ISSUEDESK_TEST_LIST", "0.1; 0.2;;0.3 ");
        assert_eq!(
            get_env_var_as_vec("ISSUEDESK_TEST_LIST", ';'),
            vec!["0.1", "0.2", "0.3"]
        );
        env::remove_var("ISSUEDESK_TEST_LIST");
    }

    #[test]
    fn test_parsed_vec_drops_garbage() {
        env::set_var("ISSUEDESK_TEST_NUMS", "2;four;6");
        let parsed: Vec<usize> = get_env_var_as_parsed_vec("ISSUEDESK_TEST_NUMS", ';');
        assert_eq!(parsed, vec![2, 6]);
        env::remove_var("ISSUEDESK_TEST_NUMS");
    }

    #[test]
    fn test_invalid_value_falls_back_to_default() {
        env::set_var("ISSUEDESK_TEST_EPS", "wide");
        assert_eq!(get_env_var_or("ISSUEDESK_TEST_EPS", 0.15f64), 0.15);
        env::set_var("ISSUEDESK_TEST_EPS", "0.3");
        assert_eq!(get_env_var_or("ISSUEDESK_TEST_EPS", 0.15f64), 0.3);
        env::remove_var("ISSUEDESK_TEST_EPS");
    }

    #[test]
    fn test_unset_variable_is_none() {
        assert!(get_env_var("ISSUEDESK_TEST_NEVER_SET").is_none());
        assert!(get_env_var_as_vec("ISSUEDESK_TEST_NEVER_SET", ';').is_empty());
    }
}
