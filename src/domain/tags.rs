//! Resource tags attached to everything the setup provisions.

use serde::{Deserialize, Serialize};

use super::setup::Setup;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// The tag set applied to every provisioned resource.
pub fn default_tags(setup: &Setup) -> Vec<Tag> {
    vec![
        Tag::new("app", setup.application_name()),
        Tag::new("squad", &setup.squad.code),
        Tag::new("cloud", "true"),
        Tag::new("automated-setup", "true"),
    ]
}
