//! Script-based language hint for callers that don't send one.

/// Unicode block ranges and the language code assumed for each.
/// Devanagari is shared by Hindi and Marathi; Bengali script by Bengali
/// and Assamese. The more common language wins.
const SCRIPTS: &[(char, char, &str)] = &[
    ('\u{0900}', '\u{097F}', "hi"),
    ('\u{0980}', '\u{09FF}', "bn"),
    ('\u{0A00}', '\u{0A7F}', "pa"),
    ('\u{0A80}', '\u{0AFF}', "gu"),
    ('\u{0B00}', '\u{0B7F}', "or"),
    ('\u{0B80}', '\u{0BFF}', "ta"),
    ('\u{0C00}', '\u{0C7F}', "te"),
    ('\u{0C80}', '\u{0CFF}', "kn"),
    ('\u{0D00}', '\u{0D7F}', "ml"),
];

/// Guess a language code from the dominant non-Latin script in `text`.
///
/// Returns `fallback` when the text is Latin-only or has no letters.
pub fn detect_language<'a>(text: &str, fallback: &'a str) -> &'a str {
    let mut counts = [0usize; SCRIPTS.len()];
    for c in text.chars() {
        if let Some(i) = SCRIPTS.iter().position(|(lo, hi, _)| (*lo..=*hi).contains(&c)) {
            counts[i] += 1;
        }
    }

    counts
        .iter()
        .enumerate()
        .filter(|(_, n)| **n > 0)
        .max_by_key(|(_, n)| **n)
        .map(|(i, _)| SCRIPTS[i].2)
        .unwrap_or(fallback)
}

/// Caller-supplied language if it is supported, otherwise a detected one.
pub fn resolve_language(
    requested: Option<&str>,
    text: &str,
    supported: &[String],
    default: &str,
) -> String {
    if let Some(code) = requested.map(str::trim).filter(|c| !c.is_empty()) {
        let code = code.to_lowercase();
        if supported.iter().any(|s| *s == code) {
            return code;
        }
    }
    detect_language(text, default).to_string()
}
