//! Default on-disk locations.

use std::env;
use std::path::PathBuf;

/// Directory (under the home dir) holding linkbot state.
const APP_DIR: &str = ".linkbot";

/// The user's home directory: HOME, falling back to USERPROFILE on Windows.
pub fn home_dir() -> Result<PathBuf, String> {
    ["HOME", "USERPROFILE"]
        .iter()
        .filter_map(|key| env::var(key).ok())
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| "Home directory not set".to_string())
}

/// Where session clients keep their credential caches by default:
/// `~/.linkbot/sessions`.
pub fn default_data_dir() -> Result<PathBuf, String> {
    Ok(home_dir()?.join(APP_DIR).join("sessions"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_env<F: FnOnce()>(home: Option<&str>, userprofile: Option<&str>, f: F) {
        let _guard = ENV_LOCK.lock().unwrap();
        let saved: Vec<_> = ["HOME", "USERPROFILE"]
            .iter()
            .map(|key| (*key, env::var(key).ok()))
            .collect();

        for (key, value) in [("HOME", home), ("USERPROFILE", userprofile)] {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        f();

        for (key, value) in saved {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }

    #[test]
    fn home_dir_prefers_home() {
        with_env(Some("/tmp/home"), Some("/tmp/profile"), || {
            assert_eq!(home_dir().unwrap(), PathBuf::from("/tmp/home"));
        });
    }

    #[test]
    fn home_dir_falls_back_to_userprofile() {
        with_env(Some(""), Some("/tmp/profile"), || {
            assert_eq!(home_dir().unwrap(), PathBuf::from("/tmp/profile"));
        });
    }

    #[test]
    fn home_dir_missing_is_an_error() {
        with_env(None, None, || {
            assert!(home_dir().is_err());
        });
    }

    #[test]
    fn data_dir_lives_under_home() {
        with_env(Some("/tmp/home"), None, || {
            assert_eq!(
                default_data_dir().unwrap(),
                PathBuf::from("/tmp/home/.linkbot/sessions")
            );
        });
    }
}
