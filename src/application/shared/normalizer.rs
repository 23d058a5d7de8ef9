use crate::application::ports::{ProfileResolver, RawRecord};
use crate::application::shared::session::SessionContext;
use crate::domain::entities::{EntityRecord, UserProfile};
use crate::domain::value_objects::{Collection, RecordId};
use crate::shared::error::{AppError, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

/// Converts raw remote records into the canonical [`EntityRecord`] shape:
/// stable id, resolved author profile, single timestamp representation.
///
/// The injected resolver is expected to cache per id for the store's
/// lifetime; a resolver miss degrades to the fallback profile instead of
/// failing the record.
pub struct EntityNormalizer {
    resolver: Arc<dyn ProfileResolver>,
    session: SessionContext,
}

impl EntityNormalizer {
    pub fn new(resolver: Arc<dyn ProfileResolver>, session: SessionContext) -> Self {
        Self { resolver, session }
    }

    pub async fn normalize(&self, raw: RawRecord, kind: Collection) -> Result<EntityRecord> {
        if !raw.fields.is_object() {
            return Err(AppError::Normalization(format!(
                "{kind} record {} is not an object: {}",
                raw.id, raw.fields
            )));
        }
        let fields = raw.fields;

        for required in required_fields(kind) {
            if fields.get(*required).map_or(true, Value::is_null) {
                return Err(AppError::Normalization(format!(
                    "{kind} record {} is missing required field `{required}`",
                    raw.id
                )));
            }
        }

        let id = RecordId::new(raw.id).map_err(AppError::Normalization)?;
        let server_timestamp = self.resolve_timestamp(kind, &id, &fields)?;
        let author = self.resolve_author(kind, &fields).await;

        Ok(EntityRecord::authoritative(
            id,
            kind,
            fields,
            author,
            server_timestamp,
        ))
    }

    fn resolve_timestamp(
        &self,
        kind: Collection,
        id: &RecordId,
        fields: &Value,
    ) -> Result<Option<DateTime<Utc>>> {
        let field = timestamp_field(kind);
        match fields.get(field) {
            None | Some(Value::Null) => {
                if timestamp_required(kind) {
                    Err(AppError::Normalization(format!(
                        "{kind} record {id} is missing required field `{field}`"
                    )))
                } else {
                    Ok(None)
                }
            }
            Some(value) => parse_instant(value)
                .map(Some)
                .map_err(|e| AppError::Normalization(format!("{kind} record {id}: {e}"))),
        }
    }

    async fn resolve_author(&self, kind: Collection, fields: &Value) -> Option<UserProfile> {
        let author_id = match kind {
            Collection::User => return None,
            Collection::Chat => chat_counterpart(fields, &self.session.user_id)?,
            other => fields
                .get(author_field(other))
                .and_then(Value::as_str)
                .map(str::to_string)?,
        };

        match self.resolver.resolve_user(&author_id).await {
            Ok(profile) => Some(profile),
            Err(err) => {
                warn!("Falling back to placeholder profile for {author_id}: {err}");
                Some(UserProfile::fallback(&author_id))
            }
        }
    }
}

fn required_fields(kind: Collection) -> &'static [&'static str] {
    match kind {
        Collection::Post => &["userId", "text"],
        Collection::Comment => &["postId", "userId", "text"],
        Collection::Message => &["senderId", "text"],
        Collection::Chat => &["users"],
        Collection::User => &["username"],
        Collection::Like => &["postId", "userId"],
        Collection::Bookmark => &["postId", "bookmarkedBy"],
    }
}

fn author_field(kind: Collection) -> &'static str {
    match kind {
        Collection::Message => "senderId",
        Collection::Bookmark => "bookmarkedBy",
        _ => "userId",
    }
}

pub(crate) fn timestamp_field(kind: Collection) -> &'static str {
    match kind {
        Collection::Message => "timestamp",
        Collection::Chat => "lastMessageTimestamp",
        _ => "createdAt",
    }
}

fn timestamp_required(kind: Collection) -> bool {
    matches!(kind, Collection::Message | Collection::Comment)
}

/// The chat's author slot carries the counterpart's profile: the participant
/// that is not the session user.
fn chat_counterpart(fields: &Value, current_user: &str) -> Option<String> {
    fields
        .get("users")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(Value::as_str)
        .find(|id| *id != current_user)
        .map(str::to_string)
}

/// Accepts every timestamp shape the backend is known to deliver: epoch
/// millis, epoch seconds, RFC 3339 strings, and `{seconds, nanoseconds}`
/// objects.
pub fn parse_instant(value: &Value) -> std::result::Result<DateTime<Utc>, String> {
    match value {
        Value::Number(n) => {
            let raw = n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .ok_or_else(|| format!("unrepresentable timestamp number: {n}"))?;
            let millis = if raw.abs() >= 100_000_000_000 {
                raw
            } else {
                raw.saturating_mul(1000)
            };
            Utc.timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| format!("timestamp out of range: {raw}"))
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| format!("invalid timestamp string `{s}`: {e}")),
        Value::Object(map) => {
            let seconds = map
                .get("seconds")
                .and_then(Value::as_i64)
                .ok_or_else(|| "timestamp object without `seconds`".to_string())?;
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("nanos"))
                .and_then(Value::as_i64)
                .unwrap_or(0);
            Utc.timestamp_opt(seconds, nanos as u32)
                .single()
                .ok_or_else(|| format!("timestamp out of range: {seconds}s {nanos}ns"))
        }
        other => Err(format!("unsupported timestamp representation: {other}")),
    }
}
