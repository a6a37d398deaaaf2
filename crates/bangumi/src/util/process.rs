use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use crate::error::{BangumiError, BangumiResult};

/// Find an external tool.
///
/// `<NAME>_PATH` (for example `ARIA2C_PATH`) takes precedence over `PATH`.
pub fn locate_executable(name: &str) -> BangumiResult<PathBuf> {
    let env_name = format!("{}_PATH", name.to_uppercase().replace('-', "_"));
    if let Some(path) = std::env::var_os(&env_name).map(PathBuf::from) {
        if path.is_file() {
            tracing::debug!("Using {name} from {env_name}: {}", path.display());
            return Ok(path);
        }
        tracing::warn!(
            "{env_name} points to {}, which is not a file. Falling back to PATH.",
            path.display()
        );
    }

    which::which(name).map_err(|source| BangumiError::MissingExecutable {
        name: name.to_string(),
        source,
    })
}

/// Shell-quoted command line, for logging only.
pub(crate) fn display_command(program: &Path, args: &[OsString]) -> String {
    let words: Vec<String> = std::iter::once(program.as_os_str())
        .chain(args.iter().map(OsString::as_os_str))
        .map(|word| word.to_string_lossy().into_owned())
        .collect();
    shlex::try_join(words.iter().map(String::as_str)).unwrap_or_else(|_| words.join(" "))
}

/// Last few lines of a captured output stream.
pub(crate) fn output_tail(output: &[u8]) -> String {
    const TAIL_LINES: usize = 5;

    let text = String::from_utf8_lossy(output);
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    lines[lines.len().saturating_sub(TAIL_LINES)..].join(" / ")
}
