//! Configuration loading and resolution.

use std::path::PathBuf;

/// Environment variable naming the snapshot file.
pub const SNAPSHOT_ENV: &str = "PLOTWATCH_SNAPSHOT";

/// Resolve the snapshot file path.
pub fn resolve_snapshot_path(explicit: Option<&str>) -> String {
    if let Some(path) = explicit {
        return path.to_string();
    }

    if let Ok(env_path) = std::env::var(SNAPSHOT_ENV) {
        if !env_path.trim().is_empty() {
            return env_path;
        }
    }

    let cwd_snapshot = PathBuf::from(".plotwatch/snapshot.pws");
    if cwd_snapshot.exists() {
        return cwd_snapshot.display().to_string();
    }

    resolve_default_snapshot_path()
}

fn resolve_default_snapshot_path() -> String {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());

    format!("{home}/.plotwatch/snapshot.pws")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_wins() {
        assert_eq!(resolve_snapshot_path(Some("/tmp/x.pws")), "/tmp/x.pws");
    }

    #[test]
    fn test_home_default_location() {
        assert!(resolve_default_snapshot_path().ends_with(".plotwatch/snapshot.pws"));
    }
}
