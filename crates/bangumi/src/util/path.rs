use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
};

const FORBIDDEN_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];
const MAX_FILENAME_CHARS: usize = 200;
const PLACEHOLDER_FILENAME: &str = "unnamed";

/// Turns an arbitrary title into a file name that is valid on every platform.
///
/// Forbidden characters and control characters are removed, the result is
/// truncated to 200 characters and stripped of leading and trailing spaces
/// and dots. An empty result becomes `unnamed`.
pub fn sanitize_filename(name: &str) -> String {
    let filtered: String = name
        .chars()
        .filter(|c| !FORBIDDEN_CHARS.contains(c) && !c.is_control())
        .take(MAX_FILENAME_CHARS)
        .collect();

    let trimmed = filtered.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        PLACEHOLDER_FILENAME.to_string()
    } else {
        trimmed.to_string()
    }
}

pub trait BangumiPathExt {
    /// Append an extension after the existing one.
    ///
    /// `ep1.ogg` with `aria2` becomes `ep1.ogg.aria2`.
    fn with_appended_extension<T: AsRef<OsStr>>(&self, extension: T) -> PathBuf;
}

impl BangumiPathExt for Path {
    fn with_appended_extension<T: AsRef<OsStr>>(&self, extension: T) -> PathBuf {
        let mut filename = OsString::new();
        if let Some(name) = self.file_name() {
            filename.push(name);
        }
        filename.push(".");
        filename.push(extension);

        self.with_file_name(filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_plain() {
        assert_eq!(sanitize_filename("test"), "test");
        assert_eq!(sanitize_filename("《葬送的芙莉莲》第1话"), "《葬送的芙莉莲》第1话");
    }

    #[test]
    fn test_sanitize_forbidden_chars() {
        for c in ["/", ":", "*", "?", "\"", "<", ">", "|", "\\"] {
            assert_eq!(sanitize_filename(&format!("test{c}file")), "testfile");
        }
    }

    #[test]
    fn test_sanitize_control_chars() {
        assert_eq!(sanitize_filename("test\x00file"), "testfile");
        assert_eq!(sanitize_filename("test\r\nfile\t"), "testfile");
    }

    #[test]
    fn test_sanitize_length() {
        let sanitized = sanitize_filename(&"a".repeat(250));
        assert_eq!(sanitized.chars().count(), 200);

        let sanitized = sanitize_filename(&"第".repeat(250));
        assert_eq!(sanitized.chars().count(), 200);
    }

    #[test]
    fn test_sanitize_empty() {
        assert_eq!(sanitize_filename(""), "unnamed");
        assert_eq!(sanitize_filename(" . "), "unnamed");
        assert_eq!(sanitize_filename("???"), "unnamed");
        assert_eq!(sanitize_filename(". .hidden. ."), "hidden");
    }

    #[test]
    fn test_sanitize_idempotent() {
        let inputs = [
            String::new(),
            " ..a/b:c*d?e\"f<g>h|i\\j.. ".to_string(),
            format!("{}. x", "b".repeat(199)),
            format!(" {}", "c".repeat(300)),
            "\u{7f}\u{1b}[0m title \u{0}".to_string(),
            format!("{}{}", ".".repeat(150), "d".repeat(100)),
        ];
        for input in inputs {
            let once = sanitize_filename(&input);
            let twice = sanitize_filename(&once);
            assert_eq!(once, twice, "input: {input:?}");
            assert!(!once.is_empty());
            assert!(once.chars().count() <= 200);
            assert!(!once.contains(FORBIDDEN_CHARS));
            assert!(!once.chars().any(char::is_control));
        }
    }

    #[test]
    fn test_appended_extension() {
        let path = Path::new("/tmp/ep1.ogg");
        assert_eq!(
            path.with_appended_extension("aria2"),
            PathBuf::from("/tmp/ep1.ogg.aria2")
        );
        assert_eq!(
            PathBuf::from("ep 1.v1.flv").with_appended_extension("st"),
            PathBuf::from("ep 1.v1.flv.st")
        );
    }
}
