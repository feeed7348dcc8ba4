use std::{env, path::PathBuf};

use crate::error::{PathError, PathResult};

/// Resolves a configured path string into an absolute path.
///
/// Expands `$VAR` and `${VAR}`, a leading `~`, and joins relative paths onto
/// the current working directory.
///
/// # Errors
///
/// * [`PathError::Empty`] if the path is empty
/// * [`PathError::CurrentDir`] if the current directory cannot be determined
/// * [`PathError::MissingEnvVar`] if a referenced variable is undefined
/// * [`PathError::UnclosedVariable`] for `${VAR` without a closing brace
pub fn resolve_path(path: &str) -> PathResult<PathBuf> {
    let path = path.trim();
    if path.is_empty() {
        return Err(PathError::Empty);
    }

    let expanded = expand_variables(path)?;
    let path_buf = match expanded.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => {
            home_dir().join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(expanded),
    };

    if path_buf.is_absolute() {
        Ok(path_buf)
    } else {
        env::current_dir()
            .map(|cwd| cwd.join(path_buf))
            .map_err(|err| PathError::CurrentDir { source: err })
    }
}

fn expand_variables(input: &str) -> PathResult<String> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let var = if chars.peek().is_some_and(|(_, next)| *next == '{') {
            chars.next();
            let mut name = String::new();
            let mut closed = false;
            for (_, ch) in chars.by_ref() {
                if ch == '}' {
                    closed = true;
                    break;
                }
                name.push(ch);
            }
            if !closed {
                return Err(PathError::UnclosedVariable {
                    input: input[idx..].to_string(),
                });
            }
            name
        } else {
            let mut name = String::new();
            while let Some((_, ch)) = chars.peek() {
                if ch.is_ascii_alphanumeric() || *ch == '_' {
                    name.push(*ch);
                    chars.next();
                } else {
                    break;
                }
            }
            name
        };

        if var.is_empty() {
            result.push('$');
            continue;
        }

        let value = env::var(&var).map_err(|_| {
            PathError::MissingEnvVar {
                var: var.clone(),
                input: input.to_string(),
            }
        })?;
        result.push_str(&value);
    }

    Ok(result)
}

/// Returns the user's home directory, falling back to `/root`.
pub fn home_dir() -> PathBuf {
    env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/root"))
}

/// Returns `$XDG_CONFIG_HOME`, defaulting to `$HOME/.config`.
pub fn xdg_config_home() -> PathBuf {
    env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns `$XDG_CACHE_HOME`, defaulting to `$HOME/.cache`.
pub fn xdg_cache_home() -> PathBuf {
    env::var("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".cache"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_absolute_unchanged() {
        assert_eq!(
            resolve_path("/srv/packages").unwrap(),
            PathBuf::from("/srv/packages")
        );
    }

    #[test]
    fn test_resolve_empty() {
        assert!(matches!(resolve_path("   "), Err(PathError::Empty)));
    }

    #[test]
    fn test_resolve_env_vars() {
        env::set_var("CDNSYNC_TEST_ROOT", "/data");
        assert_eq!(
            resolve_path("$CDNSYNC_TEST_ROOT/cache").unwrap(),
            PathBuf::from("/data/cache")
        );
        assert_eq!(
            resolve_path("${CDNSYNC_TEST_ROOT}/git").unwrap(),
            PathBuf::from("/data/git")
        );
    }

    #[test]
    fn test_resolve_missing_and_unclosed() {
        assert!(matches!(
            resolve_path("$CDNSYNC_TEST_DEFINITELY_UNSET/x"),
            Err(PathError::MissingEnvVar { .. })
        ));
        assert!(matches!(
            resolve_path("${CDNSYNC_TEST_ROOT"),
            Err(PathError::UnclosedVariable { .. })
        ));
    }

    #[test]
    fn test_resolve_relative_joins_cwd() {
        let resolved = resolve_path("relative/dir").unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("relative/dir"));
    }

    #[test]
    fn test_resolve_tilde() {
        let resolved = resolve_path("~/cdnsync").unwrap();
        assert_eq!(resolved, home_dir().join("cdnsync"));
    }
}
