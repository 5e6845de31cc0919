//! Domain events emitted after a workflow commits.

use crate::models::post::Post;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const POST_WAS_CREATED: &str = "PostWasCreatedEvent";
pub const POSTS_WERE_DELETED: &str = "PostsWereDeletedEvent";

/// Type-tagged event envelope handed to the publisher.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DomainEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: Value,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PostWasCreated {
    pub post_id: String,
    pub metadata: Post,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PostsWereDeleted {
    pub username: String,
    pub post_ids: Vec<String>,
}

impl DomainEvent {
    fn new(event_type: &str, payload: impl Serialize) -> Self {
        Self {
            event_type: event_type.to_string(),
            payload: serde_json::to_value(payload).unwrap_or(Value::Null),
        }
    }

    pub fn post_was_created(post: Post) -> Self {
        Self::new(
            POST_WAS_CREATED,
            PostWasCreated {
                post_id: post.post_id.clone(),
                metadata: post,
            },
        )
    }

    pub fn posts_were_deleted(username: &str, post_ids: Vec<String>) -> Self {
        Self::new(
            POSTS_WERE_DELETED,
            PostsWereDeleted {
                username: username.to_string(),
                post_ids,
            },
        )
    }
}
