//! Filename sanitizer for names that must survive local disks and SMB/NFS shares
//!
//! Output never contains NTFS-reserved characters, control characters or `#`, never
//! starts or ends with whitespace or a dot, is never a Windows device name, fits in
//! [`MAX_NAME_BYTES`], and is never empty. `sanitize(sanitize(x)) == sanitize(x)`.

/// Substitute for every rejected character; a run of rejected characters becomes one
pub const REPLACEMENT: char = '_';

/// Returned when nothing usable is left of the input
pub const PLACEHOLDER: &str = "untitled";

/// Leaves headroom under the usual 255-byte limit for engine suffixes like `.part`
pub const MAX_NAME_BYTES: usize = 200;

const MAX_EXTENSION_BYTES: usize = 16;

const RESERVED_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7",
    "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;

    for c in name.chars() {
        if is_rejected(c) {
            if !in_run {
                out.push(REPLACEMENT);
            }
            in_run = true;
        } else {
            out.push(c);
            in_run = false;
        }
    }

    let trimmed = trim_edges(&out);
    if trimmed.is_empty() {
        return PLACEHOLDER.to_string();
    }

    let bounded = if trimmed.len() > MAX_NAME_BYTES {
        truncate_name(trimmed)
    } else {
        trimmed.to_string()
    };

    // escape after cutting: a cut can expose a bare device name
    let escaped = escape_device_name(bounded);
    if escaped.len() > MAX_NAME_BYTES {
        return truncate_name(&escaped);
    }

    escaped
}

fn is_rejected(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | '#') || c.is_control()
}

fn trim_edges(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || c == '.')
}

/// Cut `s` to at most `max` bytes without splitting a char
fn prefix_within(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn truncate_name(s: &str) -> String {
    if let Some((stem, ext)) = s.rsplit_once('.') {
        let keeps_extension = !ext.is_empty()
            && ext.len() <= MAX_EXTENSION_BYTES
            && ext.chars().all(|c| c.is_ascii_alphanumeric());

        if keeps_extension {
            let stem = trim_edges(prefix_within(stem, MAX_NAME_BYTES - ext.len() - 1));
            if !stem.is_empty() {
                return format!("{}.{}", stem, ext);
            }
        }
    }

    trim_edges(prefix_within(s, MAX_NAME_BYTES)).to_string()
}

fn escape_device_name(name: String) -> String {
    let (stem, rest) = match name.split_once('.') {
        Some((stem, rest)) => (stem, Some(rest)),
        None => (name.as_str(), None),
    };

    if !RESERVED_DEVICE_NAMES
        .iter()
        .any(|reserved| stem.eq_ignore_ascii_case(reserved))
    {
        return name;
    }

    match rest {
        Some(rest) => format!("{}{}.{}", stem, REPLACEMENT, rest),
        None => format!("{}{}", stem, REPLACEMENT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_stable(input: &str) {
        let once = sanitize(input);
        let twice = sanitize(&once);
        assert_eq!(once, twice, "sanitize is not idempotent for {:?}", input);
        assert!(!once.is_empty());
        assert!(once.len() <= MAX_NAME_BYTES);
    }

    #[test]
    fn test_replaces_reserved_characters() {
        assert_eq!(sanitize("a<b>c:d\"e"), "a_b_c_d_e");
        assert_eq!(sanitize("dir/name\\file"), "dir_name_file");
        assert_eq!(sanitize("what?*"), "what_");
    }

    #[test]
    fn test_hash_and_pipe() {
        assert_eq!(
            sanitize("Live #42 | Full Set [abc123].mp4"),
            "Live _42 _ Full Set [abc123].mp4"
        );
    }

    #[test]
    fn test_collapses_runs() {
        assert_eq!(sanitize("a###b"), "a_b");
        assert_eq!(sanitize("a\t\n\rb"), "a_b");
    }

    #[test]
    fn test_trims_whitespace_and_dots() {
        assert_eq!(sanitize("  .hidden title.  "), "hidden title");
        assert_eq!(sanitize("trailing dot."), "trailing dot");
    }

    #[test]
    fn test_placeholder_for_empty_results() {
        assert_eq!(sanitize(""), PLACEHOLDER);
        assert_eq!(sanitize("   "), PLACEHOLDER);
        assert_eq!(sanitize("..."), PLACEHOLDER);
        // only the replacement survives, which is still a valid name
        assert_eq!(sanitize("<>:|?*"), "_");
    }

    #[test]
    fn test_device_names() {
        assert_eq!(sanitize("CON"), "CON_");
        assert_eq!(sanitize("nul.txt"), "nul_.txt");
        assert_eq!(sanitize("CONSOLE.txt"), "CONSOLE.txt");
        assert_eq!(sanitize(&format!("CON{}x", " ".repeat(197))), "CON_");
        assert_eq!(sanitize(&format!("aux{}.txt", " ".repeat(200))), "aux_.txt");
    }

    #[test]
    fn test_truncates_long_names_keeping_extension() {
        let long = format!("{}.webm", "x".repeat(400));
        let out = sanitize(&long);
        assert!(out.len() <= MAX_NAME_BYTES);
        assert!(out.ends_with(".webm"));
    }

    #[test]
    fn test_truncates_on_char_boundary() {
        let long = "é".repeat(300);
        let out = sanitize(&long);
        assert!(out.len() <= MAX_NAME_BYTES);
        assert!(out.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_idempotent_and_total() {
        let long_with_dots = format!("{}. .mp4", "a".repeat(250));
        let long_dots_at_cut = format!("{}{}", "b".repeat(199), ". . . . tail");
        let device_then_long = format!("CON.{}", "z".repeat(196));
        let device_after_cut = format!("CON{}x", " ".repeat(197));
        let device_ext_after_cut = format!("aux{}.txt", " ".repeat(200));
        let inputs = [
            "",
            "plain",
            "#",
            "|#|",
            " . ",
            "a_#b",
            "CON",
            "com1.tar.gz",
            "\u{0}\u{1f}\u{7f}",
            "emoji 🎵 title",
            long_with_dots.as_str(),
            long_dots_at_cut.as_str(),
            "ends with pipe |",
            "x.thisextensioniswaytoolong",
            device_then_long.as_str(),
            device_after_cut.as_str(),
            device_ext_after_cut.as_str(),
        ];
        for input in inputs {
            assert_stable(input);
        }
    }
}
