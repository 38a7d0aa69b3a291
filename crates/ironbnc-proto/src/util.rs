//! Mask matching helpers.

/// Match `text` against an IRC-style wildcard `pattern`.
///
/// `*` matches any run of characters (including none), `?` matches any
/// single character; comparison is ASCII case-insensitive. An empty
/// pattern matches only the empty text.
///
/// # Examples
///
/// ```
/// use ironbnc_proto::util::wildcard_match;
///
/// assert!(wildcard_match("*.example.com", "a.example.com"));
/// assert!(wildcard_match("*.EXAMPLE.com", "a.example.COM"));
/// assert!(wildcard_match("te?t", "test"));
/// assert!(!wildcard_match("*.example.com", "a.other.com"));
/// ```
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();
    let text: Vec<char> = text.chars().map(|c| c.to_ascii_lowercase()).collect();

    let mut p = 0;
    let mut t = 0;
    let mut star_p = None;
    let mut star_t = 0;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            // Remember the star for backtracking.
            star_p = Some(p);
            star_t = t;
            p += 1;
        } else if let Some(sp) = star_p {
            // Mismatch after a star: let the star swallow one more char.
            p = sp + 1;
            star_t += 1;
            t = star_t;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }

    p == pattern.len()
}
