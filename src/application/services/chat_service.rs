use super::store::{SyncedCollectionStore, ViewHandle, WriteFn};
use crate::application::ports::RemoteCollectionSource;
use crate::domain::value_objects::{Collection, LocalId, MatchKey, QueryFilter, RecordId, SortOrder};
use crate::shared::error::{AppError, Result};
use futures::FutureExt;
use serde_json::{json, Value};
use std::sync::Arc;

/// Direct messaging: the session user's chat list, per-chat message views,
/// and optimistic sends that also bump the chat's last-activity summary.
pub struct ChatService {
    store: SyncedCollectionStore,
}

impl ChatService {
    pub fn new(store: SyncedCollectionStore) -> Self {
        Self { store }
    }

    /// Live list of every chat the session user participates in, most recent
    /// activity first. Each entry's author slot carries the counterpart's
    /// resolved profile.
    pub async fn chats(&self) -> Result<ViewHandle> {
        self.store
            .subscribe(
                Collection::Chat,
                QueryFilter::all()
                    .array_contains("users", self.store.session().user_id.as_str()),
                SortOrder::newest_first(),
            )
            .await
    }

    /// Live message view for one chat, oldest first.
    pub async fn messages(&self, chat_id: &RecordId) -> Result<ViewHandle> {
        self.store
            .subscribe(
                Collection::Message,
                QueryFilter::all().eq("chatId", chat_id.as_str()),
                SortOrder::oldest_first(),
            )
            .await
    }

    /// Returns the existing two-party chat with `other_user_id`, creating it
    /// with an empty last-activity summary when none exists.
    pub async fn get_or_create_chat(&self, other_user_id: &str) -> Result<RecordId> {
        if other_user_id.trim().is_empty() {
            return Err(AppError::Validation("Counterpart user is required".to_string()));
        }
        let me = self.store.session().user_id.clone();
        let remote = self.store.remote();

        let mine = remote
            .query(
                Collection::Chat,
                &QueryFilter::all().array_contains("users", me.as_str()),
                &SortOrder::default(),
            )
            .await?;
        if let Some(existing) = mine.into_iter().find(|chat| {
            chat.fields
                .get("users")
                .and_then(Value::as_array)
                .map(|users| users.iter().filter_map(Value::as_str).any(|u| u == other_user_id))
                .unwrap_or(false)
        }) {
            return RecordId::new(existing.id).map_err(AppError::Internal);
        }

        let ack = remote
            .write(
                Collection::Chat,
                json!({
                    "users": [me, other_user_id],
                    "lastMessage": "",
                    "lastMessageTimestamp": null,
                }),
            )
            .await?;
        Ok(ack.id)
    }

    /// Optimistically appends the message, then writes it and bumps the
    /// chat's `lastMessage`/`lastMessageTimestamp` in the same commit.
    pub async fn send_message(&self, chat_id: &RecordId, text: &str) -> Result<LocalId> {
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(AppError::Validation("Message text is required".to_string()));
        }

        let sender_id = self.store.session().user_id.clone();
        let fields = json!({
            "chatId": chat_id.as_str(),
            "senderId": sender_id,
            "text": text,
        });
        let match_key = MatchKey::new(&sender_id, &text);

        let local_id = self
            .store
            .apply_optimistic(Collection::Message, match_key, fields.clone())
            .await;

        let remote = self.store.remote();
        let chat_id = chat_id.clone();
        let write: WriteFn = Arc::new(move || {
            let remote = Arc::clone(&remote);
            let fields = fields.clone();
            let chat_id = chat_id.clone();
            let text = text.clone();
            async move {
                let ack = remote.write(Collection::Message, fields).await?;
                remote
                    .update(
                        Collection::Chat,
                        &chat_id,
                        json!({
                            "lastMessage": text,
                            "lastMessageTimestamp": ack.server_timestamp.timestamp_millis(),
                        }),
                    )
                    .await?;
                Ok(ack)
            }
            .boxed()
        });
        self.store
            .commit(Collection::Message, &local_id, write)
            .await?;
        Ok(local_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::shared::SessionContext;
    use crate::infrastructure::remote::{InMemoryRemoteSource, RemoteProfileResolver};
    use crate::shared::config::AppConfig;
    use std::time::Duration;

    async fn service() -> (ChatService, Arc<InMemoryRemoteSource>) {
        let remote = Arc::new(InMemoryRemoteSource::new());
        remote
            .seed(Collection::User, "u1", json!({"username": "alice"}))
            .await;
        remote
            .seed(Collection::User, "u2", json!({"username": "bob"}))
            .await;
        let resolver = Arc::new(RemoteProfileResolver::new(remote.clone()));
        let store = SyncedCollectionStore::new(
            remote.clone(),
            resolver,
            SessionContext::new("u1", "alice"),
            AppConfig::default(),
        );
        (ChatService::new(store), remote)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn get_or_create_chat_reuses_the_existing_one() {
        let (service, _remote) = service().await;

        let first = service.get_or_create_chat("u2").await.unwrap();
        let second = service.get_or_create_chat("u2").await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn chat_list_resolves_the_counterpart() {
        let (service, _remote) = service().await;
        service.get_or_create_chat("u2").await.unwrap();

        let chats = service.chats().await.unwrap();
        settle().await;

        let view = chats.current();
        assert_eq!(view.len(), 1);
        assert_eq!(
            view.entries[0].author.as_ref().map(|a| a.display_name.as_str()),
            Some("bob")
        );
    }

    #[tokio::test]
    async fn send_message_appears_once_and_bumps_the_chat() {
        let (service, remote) = service().await;
        let chat_id = service.get_or_create_chat("u2").await.unwrap();
        let messages = service.messages(&chat_id).await.unwrap();

        service.send_message(&chat_id, "hi").await.unwrap();
        settle().await;

        let view = messages.current();
        assert_eq!(view.len(), 1);
        assert_eq!(view.entries[0].field_str("text"), Some("hi"));
        assert!(!view.entries[0].local_only);

        let chat = remote
            .read_one(Collection::Chat, &chat_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(chat.fields.get("lastMessage"), Some(&json!("hi")));
        assert!(chat
            .fields
            .get("lastMessageTimestamp")
            .and_then(Value::as_i64)
            .is_some());
    }

    #[tokio::test]
    async fn blank_message_is_rejected() {
        let (service, _remote) = service().await;
        let chat_id = RecordId::new("ch1".to_string()).unwrap();
        let err = service.send_message(&chat_id, "  ").await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
