// Tool discovery - find the directory holding the wrapped CLI tool

use std::path::PathBuf;
use tracing::debug;

/// Environment variable pointing at the tool directory
pub const TOOL_PATH_ENV: &str = "PROCBRIDGE_TOOL_PATH";

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

/// Usual install locations for a tool named `tool_name`
pub fn default_candidates(tool_name: &str) -> Vec<PathBuf> {
    vec![
        expand(&format!("~/{}", tool_name)),
        PathBuf::from("/opt").join(tool_name),
    ]
}

/// Locate the tool directory
///
/// The environment variable wins if it names an existing directory;
/// otherwise the first existing candidate is used.
pub fn locate_tool_dir(env_var: &str, candidates: &[PathBuf]) -> Option<PathBuf> {
    if let Ok(value) = std::env::var(env_var) {
        let dir = expand(&value);
        if dir.is_dir() {
            debug!(env_var = %env_var, dir = %dir.display(), "Tool directory from environment");
            return Some(dir);
        }
        debug!(env_var = %env_var, value = %value, "Ignoring tool path that is not a directory");
    }

    candidates.iter().find(|c| c.is_dir()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_wins() {
        let env_dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let var = "PROCBRIDGE_TEST_TOOL_PATH_ENV_WINS";
        std::env::set_var(var, env_dir.path());

        let found = locate_tool_dir(var, &[other.path().to_path_buf()]);

        assert_eq!(found, Some(env_dir.path().to_path_buf()));
        std::env::remove_var(var);
    }

    #[test]
    fn test_falls_back_to_first_existing_candidate() {
        let existing = tempfile::tempdir().unwrap();
        let var = "PROCBRIDGE_TEST_TOOL_PATH_FALLBACK";
        std::env::set_var(var, "/no/such/tool/dir");

        let found = locate_tool_dir(
            var,
            &[PathBuf::from("/no/such/candidate"), existing.path().to_path_buf()],
        );

        assert_eq!(found, Some(existing.path().to_path_buf()));
        std::env::remove_var(var);
    }

    #[test]
    fn test_nothing_found() {
        let found = locate_tool_dir(
            "PROCBRIDGE_TEST_TOOL_PATH_UNSET",
            &[PathBuf::from("/no/such/candidate")],
        );
        assert!(found.is_none());
    }

    #[test]
    fn test_default_candidates_expand_home() {
        let candidates = default_candidates("sysmo-usim-tool");
        assert!(!candidates[0].to_string_lossy().starts_with('~'));
        assert_eq!(candidates[1], PathBuf::from("/opt/sysmo-usim-tool"));
    }
}
