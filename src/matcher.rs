//! Wildcard matching for alias names.
//!
//! Only two metacharacters exist: `*` matches any run of characters
//! (including the empty run) and `?` matches exactly one character.
//! Everything else, `/` included, matches itself.
//!
//! The algorithm keeps a single backtrack point (the most recent `*`), so a
//! match costs at most `O(pattern × name)` steps and always terminates.

/// Case-sensitive wildcard match of `name` against `pattern`.
///
/// ```rust
/// use devfs_core::wild_match;
///
/// assert!(wild_match("a*c*e", "abcde"));
/// assert!(wild_match("a?c", "abc"));
/// assert!(!wild_match("a?c", "ac"));
/// ```
pub fn wild_match(pattern: &str, name: &str) -> bool {
    matches_with(pattern, name, |p, n| p == n)
}

/// Case-insensitive variant of [`wild_match`].
///
/// ```rust
/// use devfs_core::wild_match_ignore_case;
///
/// assert!(wild_match_ignore_case("TTY*", "ttyS0"));
/// ```
pub fn wild_match_ignore_case(pattern: &str, name: &str) -> bool {
    matches_with(pattern, name, |p, n| {
        p == n || p.to_lowercase().eq(n.to_lowercase())
    })
}

fn matches_with(pattern: &str, name: &str, eq: impl Fn(char, char) -> bool) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = name.chars().collect();

    let (mut p, mut t) = (0, 0);
    // Position after the last `*` seen, and the text position it was tried at.
    let mut star: Option<(usize, usize)> = None;

    while t < txt.len() {
        match pat.get(p) {
            Some('*') => {
                star = Some((p + 1, t));
                p += 1;
            }
            Some('?') => {
                p += 1;
                t += 1;
            }
            Some(&c) if eq(c, txt[t]) => {
                p += 1;
                t += 1;
            }
            _ => match star {
                // Let the last `*` swallow one more character.
                Some((sp, st)) => {
                    star = Some((sp, st + 1));
                    p = sp;
                    t = st + 1;
                }
                None => return false,
            },
        }
    }

    pat[p..].iter().all(|&c| c == '*')
}
