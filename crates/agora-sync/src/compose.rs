//! Pure functions from decoded snapshots to what a screen renders.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use chrono::NaiveDateTime;

use agora_types::api::LikeTally;
use agora_types::{Article, Comment, Conversation, Keyed, Message};

use crate::mutator::COMMENT_DATE_FORMAT;
use crate::resolver::NameLookup;

/// One row of the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub article: Article,
    pub author_name: String,
    pub liked: bool,
    pub like_count: u64,
}

impl FeedItem {
    pub fn tally(&self) -> LikeTally {
        LikeTally::new(self.liked, self.like_count)
    }
}

/// Newest first. `local` holds this screen's like state per article id and
/// overrides the stored count until the next snapshot carries the change.
pub fn feed<N: NameLookup>(
    articles: &[Article],
    names: &N,
    local: &HashMap<String, LikeTally>,
) -> Vec<FeedItem> {
    articles
        .iter()
        .rev()
        .map(|article| {
            let tally = local
                .get(&article.id)
                .copied()
                .unwrap_or(LikeTally::new(false, article.likes));
            FeedItem {
                author_name: names.name_of(&article.user_id),
                liked: tally.liked,
                like_count: tally.count,
                article: article.clone(),
            }
        })
        .collect()
}

/// One conversation per distinct sender writing to `me`, previewing the
/// first message seen from them.
pub fn inbox(messages: &[Message], me: &str) -> Vec<Conversation> {
    let mut seen = HashSet::new();
    messages
        .iter()
        .filter(|m| m.receiver_id == me)
        .filter(|m| seen.insert(m.sender_id.as_str()))
        .map(|m| Conversation {
            peer_id: m.sender_id.clone(),
            preview: m.text.clone(),
        })
        .collect()
}

/// Messages between `me` and `peer`, oldest first. Equal timestamps keep
/// snapshot order.
pub fn chat(messages: &[Message], me: &str, peer: &str) -> Vec<Message> {
    let mut thread: Vec<Message> = messages
        .iter()
        .filter(|m| m.is_between(me, peer))
        .cloned()
        .collect();
    thread.sort_by_key(|m| m.timestamp);
    thread
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommentOrder {
    #[default]
    Insertion,
    Chronological,
}

impl FromStr for CommentOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "insertion" => Ok(Self::Insertion),
            "chronological" => Ok(Self::Chronological),
            other => Err(format!("unknown comment order '{other}'")),
        }
    }
}

pub fn comments(comments: &[Comment], order: CommentOrder) -> Vec<Comment> {
    let mut list = comments.to_vec();
    if order == CommentOrder::Chronological {
        // Unparsable dates sort last, in their original order.
        list.sort_by_key(|c| {
            let parsed = NaiveDateTime::parse_from_str(&c.date, COMMENT_DATE_FORMAT).ok();
            (parsed.is_none(), parsed)
        });
    }
    list
}

/// Snapshot records followed by pending local ones not yet echoed back.
pub fn merge_pending<T: Keyed + Clone>(snapshot: &[T], pending: &[T]) -> Vec<T> {
    let known: HashSet<&str> = snapshot.iter().map(Keyed::key).collect();
    snapshot
        .iter()
        .chain(pending.iter().filter(|p| !known.contains(p.key())))
        .cloned()
        .collect()
}

/// Drop pending records that `snapshot` now contains.
pub fn retain_unconfirmed<T: Keyed>(pending: &mut Vec<T>, snapshot: &[T]) {
    let known: HashSet<&str> = snapshot.iter().map(Keyed::key).collect();
    pending.retain(|p| !known.contains(p.key()));
}

pub fn user_articles(articles: &[Article], user_id: &str) -> Vec<Article> {
    articles
        .iter()
        .filter(|a| a.user_id == user_id)
        .rev()
        .cloned()
        .collect()
}
