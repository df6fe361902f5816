use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Records stored in the tree carry their own key in one of their fields,
/// except where the store key is the only identity (messages).
pub trait Keyed {
    /// The store key this record lives under.
    fn key(&self) -> &str;

    /// Fill in the key from the child name when the stored value lacks it.
    fn assign_key(&mut self, key: &str);
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub user_id: String,
    pub text: String,
    /// Base64 image payload, produced by agora-media.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// `yyyy-MM-dd HH:mm:ss`, formatted on the publishing device.
    pub date: String,
    pub likes: u64,
    /// Entries that do not decode are skipped, never the article.
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_comments"
    )]
    pub comments: Option<BTreeMap<String, Comment>>,
}

fn lenient_comments<'de, D>(deserializer: D) -> Result<Option<BTreeMap<String, Comment>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(Value::Object(entries)) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let comments = entries
        .into_iter()
        .filter_map(|(key, value)| {
            let mut comment: Comment = serde_json::from_value(value).ok()?;
            comment.assign_key(&key);
            Some((key, comment))
        })
        .collect();
    Ok(Some(comments))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub user_id: String,
    pub content: String,
    /// `dd/MM/yyyy HH:mm`
    pub date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Message {
    /// The push key; never written into the stored value.
    #[serde(skip)]
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: String,
    /// Epoch millis.
    pub timestamp: i64,
}

impl Message {
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub username: String,
    pub bio: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_picture_base64: Option<String>,
}

/// Derived from the message collection, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub peer_id: String,
    pub preview: String,
}

impl Keyed for Article {
    fn key(&self) -> &str {
        &self.id
    }

    fn assign_key(&mut self, key: &str) {
        if self.id.is_empty() {
            self.id = key.to_string();
        }
    }
}

impl Keyed for Comment {
    fn key(&self) -> &str {
        &self.id
    }

    fn assign_key(&mut self, key: &str) {
        if self.id.is_empty() {
            self.id = key.to_string();
        }
    }
}

impl Keyed for Message {
    fn key(&self) -> &str {
        &self.id
    }

    fn assign_key(&mut self, key: &str) {
        self.id = key.to_string();
    }
}

impl Keyed for UserProfile {
    fn key(&self) -> &str {
        &self.user_id
    }

    fn assign_key(&mut self, key: &str) {
        if self.user_id.is_empty() {
            self.user_id = key.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn article_uses_backend_field_names() {
        let article = Article {
            id: "a1".into(),
            user_id: "u1".into(),
            text: "hello".into(),
            date: "2025-03-01 10:00:00".into(),
            likes: 2,
            ..Default::default()
        };
        let value = serde_json::to_value(&article).unwrap();
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["likes"], 2);
        assert!(value.get("imageUrl").is_none());
        assert!(value.get("comments").is_none());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let article: Article = serde_json::from_value(json!({ "text": "hi" })).unwrap();
        assert_eq!(article.likes, 0);
        assert!(article.user_id.is_empty());
    }

    #[test]
    fn negative_like_count_does_not_decode() {
        let result = serde_json::from_value::<Article>(json!({ "text": "hi", "likes": -1 }));
        assert!(result.is_err());
    }

    #[test]
    fn bad_comment_does_not_sink_its_article() {
        let article: Article = serde_json::from_value(json!({
            "userId": "u1",
            "text": "hi",
            "comments": {
                "c1": { "userId": "u2", "content": 42 },
                "c2": { "userId": "u3", "content": "nice" }
            }
        }))
        .unwrap();
        assert_eq!(article.text, "hi");
        let comments = article.comments.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments["c2"].id, "c2");

        let odd: Article = serde_json::from_value(json!({ "text": "x", "comments": "oops" })).unwrap();
        assert!(odd.comments.is_none());
    }

    #[test]
    fn message_key_is_not_stored() {
        let mut message: Message = serde_json::from_value(json!({
            "senderId": "a", "receiverId": "b", "text": "yo", "timestamp": 5
        }))
        .unwrap();
        message.assign_key("-Mk1");
        assert_eq!(message.id, "-Mk1");
        assert!(serde_json::to_value(&message).unwrap().get("id").is_none());
        assert!(message.is_between("b", "a"));
        assert!(!message.is_between("a", "c"));
    }

    #[test]
    fn stored_id_wins_over_child_key() {
        let mut comment = Comment { id: "c1".into(), ..Default::default() };
        comment.assign_key("other");
        assert_eq!(comment.key(), "c1");
    }
}
