//! Conversations as a screen reads and writes them
//!
//! Reading a thread marks the other side's messages read on the backend, so
//! a fetched thread also discards the cached conversation list and its
//! unread counts.

use super::{
    cache::{QueryCache, QueryKey},
    ClientResult, MarketClient,
};
use crate::domain::{Conversation, Message, MessagePage, NewConversation};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Messaging over a shared client and cache
#[derive(Clone)]
pub struct Messenger {
    client: Arc<MarketClient>,
    cache: Arc<QueryCache>,
}

impl Messenger {
    /// Create a messenger over `client` and `cache`
    pub fn new(client: Arc<MarketClient>, cache: Arc<QueryCache>) -> Self {
        Self { client, cache }
    }

    /// The signed-in user's conversations, read through the cache
    pub async fn conversations(&self) -> ClientResult<Vec<Conversation>> {
        self.cache
            .get_or_fetch(QueryKey::Conversations, || self.client.conversations())
            .await
    }

    /// The first page of a conversation, read through the cache
    pub async fn thread(&self, conversation_id: &str) -> ClientResult<Vec<Message>> {
        let fetched = AtomicBool::new(false);
        let messages = self
            .cache
            .get_or_fetch(
                QueryKey::ConversationMessages(conversation_id.to_string()),
                || {
                    fetched.store(true, Ordering::Relaxed);
                    self.client.messages(conversation_id, MessagePage::default())
                },
            )
            .await?;

        if fetched.load(Ordering::Relaxed) {
            self.cache.invalidate(&[QueryKey::Conversations]).await;
        }
        Ok(messages)
    }

    /// Open a conversation with `participant_id`
    pub async fn start(
        &self,
        participant_id: &str,
        contract_id: Option<&str>,
    ) -> ClientResult<Conversation> {
        let conversation = self
            .client
            .start_conversation(&NewConversation {
                participant_id: participant_id.to_string(),
                contract_id: contract_id.map(str::to_string),
            })
            .await?;
        self.cache.invalidate(&[QueryKey::Conversations]).await;
        Ok(conversation)
    }

    /// Post `content` and discard the thread and list it changes
    pub async fn send(&self, conversation_id: &str, content: &str) -> ClientResult<Message> {
        let message = self.client.send_message(conversation_id, content).await?;
        info!("Sent message {} to {}", message.id, conversation_id);
        self.cache
            .invalidate(&[
                QueryKey::ConversationMessages(conversation_id.to_string()),
                QueryKey::Conversations,
            ])
            .await;
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientError, Session};
    use crate::config::ClientConfig;

    fn offline_messenger() -> Messenger {
        let config = ClientConfig {
            base_url: "http://127.0.0.1:9/api".to_string(),
            timeout_seconds: 2,
            payment_method: "mock_card".to_string(),
        };
        let client = MarketClient::new(&config, Session::in_memory()).unwrap();
        Messenger::new(Arc::new(client), Arc::new(QueryCache::default()))
    }

    #[tokio::test]
    async fn test_blank_message_is_refused_locally() {
        let messenger = offline_messenger();
        let err = messenger.send("c1", " \n ").await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[tokio::test]
    async fn test_cached_thread_is_served_without_backend() {
        let messenger = offline_messenger();
        messenger
            .cache
            .put(QueryKey::ConversationMessages("c1".to_string()), &Vec::<Message>::new())
            .await
            .unwrap();
        messenger
            .cache
            .put(QueryKey::Conversations, &Vec::<Conversation>::new())
            .await
            .unwrap();

        assert!(messenger.thread("c1").await.unwrap().is_empty());
        assert!(messenger.cache.contains(&QueryKey::Conversations).await);
    }
}
