use async_trait::async_trait;
use serenity::{http::Http, model::id::ChannelId};
use std::sync::Arc;
use tracing::warn;

use crate::audio::transport::ChannelNotifier;

/// Posts session notices to the text channel a command was issued from.
pub struct TextChannelNotifier {
    channel_id: ChannelId,
    http: Arc<Http>,
}

impl TextChannelNotifier {
    pub fn new(channel_id: ChannelId, http: Arc<Http>) -> Self {
        Self { channel_id, http }
    }
}

#[async_trait]
impl ChannelNotifier for TextChannelNotifier {
    async fn notify(&self, message: String) {
        if let Err(e) = self.channel_id.say(&self.http, message).await {
            warn!("Could not post to channel {}: {:?}", self.channel_id, e);
        }
    }
}
