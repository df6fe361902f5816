use serde::{Deserialize, Serialize};

// -- Auth --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Part of the e-mail before the `@`, used as the initial username.
    pub fn local_part(&self) -> &str {
        self.email.split('@').next().unwrap_or_default()
    }
}

// -- Publishing --

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublishRequest {
    pub text: String,
    /// Raw image bytes picked by the user, encoded before writing.
    #[serde(default)]
    pub image: Option<Vec<u8>>,
}

// -- Profile --

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileUpdate {
    pub username: String,
    pub bio: String,
    #[serde(default)]
    pub avatar: Option<Vec<u8>>,
}

// -- Likes --

/// Local view of one viewer's like on one article.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LikeTally {
    pub liked: bool,
    pub count: u64,
}

impl LikeTally {
    pub fn new(liked: bool, count: u64) -> Self {
        Self { liked, count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_part_stops_at_at_sign() {
        assert_eq!(Credentials::new("papy123@mail.fr", "x").local_part(), "papy123");
        assert_eq!(Credentials::new("nodomain", "x").local_part(), "nodomain");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let parsed = serde_json::from_str::<PublishRequest>(r#"{"text":"a","extra":1}"#);
        assert!(parsed.is_err());
    }
}
