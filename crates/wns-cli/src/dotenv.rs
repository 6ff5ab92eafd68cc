//! `.env` support
//!
//! `KEY=value` lines from `./.env` are copied into the process environment
//! before arguments are parsed. Variables that are already set win.

use std::collections::HashMap;
use std::path::Path;

/// Load `./.env` if there is one. Read errors are ignored.
pub fn load_dotenv() {
    load_dotenv_from(Path::new(".env"));
}

/// Returns how many variables were applied.
fn load_dotenv_from(path: &Path) -> usize {
    let Ok(content) = std::fs::read_to_string(path) else {
        return 0;
    };
    let mut applied = 0;
    for (key, value) in parse_dotenv(&content) {
        if std::env::var_os(&key).is_none() {
            // Called before the runtime starts, while the process is single-threaded
            std::env::set_var(&key, value);
            applied += 1;
        }
    }
    applied
}

fn parse_dotenv(content: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            let mut value = value.trim();
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }
            map.insert(key.to_string(), value.to_string());
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotenv() {
        let map = parse_dotenv(
            r#"
# identity
PRIVATE_KEY=abc123
export WNS_TOPIC="/wns/quoted"
SINGLE='single'
EMPTY=
=orphan
"#,
        );
        assert_eq!(map.get("PRIVATE_KEY").unwrap(), "abc123");
        assert_eq!(map.get("WNS_TOPIC").unwrap(), "/wns/quoted");
        assert_eq!(map.get("SINGLE").unwrap(), "single");
        assert_eq!(map.get("EMPTY").unwrap(), "");
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn test_existing_variables_win() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(
            &path,
            "WNS_DOTENV_TEST_SET=from_file\nWNS_DOTENV_TEST_NEW=from_file\n",
        )
        .unwrap();

        std::env::set_var("WNS_DOTENV_TEST_SET", "from_env");
        std::env::remove_var("WNS_DOTENV_TEST_NEW");

        assert_eq!(load_dotenv_from(&path), 1);
        assert_eq!(std::env::var("WNS_DOTENV_TEST_SET").unwrap(), "from_env");
        assert_eq!(std::env::var("WNS_DOTENV_TEST_NEW").unwrap(), "from_file");

        std::env::remove_var("WNS_DOTENV_TEST_SET");
        std::env::remove_var("WNS_DOTENV_TEST_NEW");
    }

    #[test]
    fn test_missing_file_is_ignored() {
        assert_eq!(load_dotenv_from(Path::new("/nonexistent/.env")), 0);
    }
}
