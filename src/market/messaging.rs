//! Direct messaging between users

use super::{db_error, MarketService};
use crate::{
    db::{ConversationQueries, UserQueries},
    domain::{Conversation, Message, MessagePage, NewConversation, NewMessage, User},
    MarketError, MarketResult,
};
use chrono::Utc;
use tracing::info;

/// Most conversations returned by one listing
const CONVERSATION_LIST_LIMIT: u32 = 100;

impl MarketService {
    /// Open a conversation between `caller` and another user
    ///
    /// Opening one that already exists returns it unchanged. A linked
    /// contract must have both users as its parties.
    pub async fn start_conversation(
        &self,
        caller: &User,
        req: NewConversation,
    ) -> MarketResult<Conversation> {
        if req.participant_id == caller.id {
            return Err(MarketError::Validation(
                "You cannot start a conversation with yourself".to_string(),
            ));
        }

        let other = UserQueries::new(&self.db)
            .get_by_id(&req.participant_id)
            .await
            .map_err(db_error("Failed to look up user"))?
            .filter(|r| r.user.is_active)
            .ok_or_else(|| MarketError::NotFound("User not found".to_string()))?;

        if let Some(contract_id) = &req.contract_id {
            let contract = self.load_contract(contract_id).await?;
            if contract.party_role(&caller.id).is_none()
                || contract.party_role(&other.user.id).is_none()
            {
                return Err(MarketError::Validation(
                    "Both users must be parties to the linked contract".to_string(),
                ));
            }
        }

        let conversation = ConversationQueries::new(&self.db)
            .open(&caller.id, &other.user.id, req.contract_id.as_deref(), Utc::now())
            .await
            .map_err(db_error("Failed to open conversation"))?;

        info!(
            "Conversation opened: id={}, user_id={}, with={}",
            conversation.id, caller.id, other.user.id
        );
        Ok(conversation)
    }

    /// The caller's conversations, most recent first
    pub async fn conversations(&self, caller: &User) -> MarketResult<Vec<Conversation>> {
        ConversationQueries::new(&self.db)
            .list_for_user(&caller.id, CONVERSATION_LIST_LIMIT)
            .await
            .map_err(db_error("Failed to list conversations"))
    }

    /// A page of a conversation's messages; the other side's become read
    pub async fn conversation_messages(
        &self,
        caller: &User,
        conversation_id: &str,
        page: MessagePage,
    ) -> MarketResult<Vec<Message>> {
        page.validate().map_err(MarketError::Validation)?;
        self.joined_conversation(caller, conversation_id).await?;

        ConversationQueries::new(&self.db)
            .read_page(conversation_id, &caller.id, page)
            .await
            .map_err(db_error("Failed to load messages"))
    }

    /// Post a message to a conversation the caller takes part in
    pub async fn send_message(
        &self,
        caller: &User,
        conversation_id: &str,
        req: NewMessage,
    ) -> MarketResult<Message> {
        req.validate().map_err(MarketError::Validation)?;
        self.joined_conversation(caller, conversation_id).await?;

        let message = Message {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            sender_id: caller.id.clone(),
            sender_name: caller.profile.full_name.clone(),
            content: req.content.clone(),
            timestamp: Utc::now(),
            is_read: false,
        };
        ConversationQueries::new(&self.db)
            .append(&message, &req.preview())
            .await
            .map_err(db_error("Failed to store message"))?;

        info!(
            "Message sent: conversation_id={}, sender_id={}",
            conversation_id, caller.id
        );
        Ok(message)
    }

    /// Conversations are invisible to anyone outside them
    async fn joined_conversation(&self, caller: &User, id: &str) -> MarketResult<Conversation> {
        ConversationQueries::new(&self.db)
            .get(id, &caller.id)
            .await
            .map_err(db_error("Failed to load conversation"))?
            .filter(|c| c.includes(&caller.id))
            .ok_or_else(|| MarketError::NotFound("Conversation not found".to_string()))
    }
}
