//! Well-known locations in the store tree.

pub const ARTICLES: &str = "articles";
pub const MESSAGES: &str = "messages";
pub const USERS: &str = "users";

pub fn article(id: &str) -> String {
    format!("{ARTICLES}/{id}")
}

pub fn article_likes(id: &str) -> String {
    format!("{ARTICLES}/{id}/likes")
}

pub fn comments(article_id: &str) -> String {
    format!("{ARTICLES}/{article_id}/comments")
}

pub fn comment(article_id: &str, id: &str) -> String {
    format!("{ARTICLES}/{article_id}/comments/{id}")
}

pub fn message(id: &str) -> String {
    format!("{MESSAGES}/{id}")
}

pub fn user(id: &str) -> String {
    format!("{USERS}/{id}")
}

/// Split a path into its non-empty segments.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Normalized form: no leading, trailing or doubled slashes.
pub fn normalize(path: &str) -> String {
    segments(path).collect::<Vec<_>>().join("/")
}

/// True when `ancestor` is `path` itself or one of its parents.
/// The root (`""`) is an ancestor of everything.
pub fn is_ancestor_or_self(ancestor: &str, path: &str) -> bool {
    let mut a = segments(ancestor);
    let mut p = segments(path);
    loop {
        match (a.next(), p.next()) {
            (None, _) => return true,
            (Some(_), None) => return false,
            (Some(x), Some(y)) if x != y => return false,
            _ => {}
        }
    }
}

/// Two paths are related when one contains the other.
pub fn overlaps(a: &str, b: &str) -> bool {
    is_ancestor_or_self(a, b) || is_ancestor_or_self(b, a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_nested_paths() {
        assert_eq!(comment("a1", "c1"), "articles/a1/comments/c1");
        assert_eq!(article_likes("a1"), "articles/a1/likes");
    }

    #[test]
    fn ancestry_is_segment_wise() {
        assert!(is_ancestor_or_self("articles", "articles/a1/likes"));
        assert!(is_ancestor_or_self("", "users"));
        assert!(!is_ancestor_or_self("art", "articles"));
        assert!(!is_ancestor_or_self("articles/a1", "articles"));
        assert!(overlaps("articles/a1", "articles"));
        assert!(!overlaps("users", "messages"));
    }

    #[test]
    fn normalize_strips_extra_slashes() {
        assert_eq!(normalize("/users//u1/"), "users/u1");
        assert_eq!(normalize("/"), "");
    }
}
