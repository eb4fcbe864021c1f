use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::AuthUser;
use crate::db::documents;
use crate::db::{Collection, DatabaseProxy, DocFilter, Document, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedbackCategory {
    Bug,
    Content,
    Feature,
    Other,
}

impl FeedbackCategory {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "BUG" => Some(Self::Bug),
            "CONTENT" => Some(Self::Content),
            "FEATURE" => Some(Self::Feature),
            "OTHER" => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Some(Self::Open),
            "IN_PROGRESS" => Some(Self::InProgress),
            "RESOLVED" => Some(Self::Resolved),
            "CLOSED" => Some(Self::Closed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::InProgress => "IN_PROGRESS",
            Self::Resolved => "RESOLVED",
            Self::Closed => "CLOSED",
        }
    }

    /// Closed is terminal; every other move is allowed.
    pub fn can_transition_to(self, next: TicketStatus) -> bool {
        self != Self::Closed || next == Self::Closed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackTicket {
    pub user_id: String,
    pub category: FeedbackCategory,
    pub subject: String,
    pub message: String,
    pub status: TicketStatus,
    #[serde(default)]
    pub admin_note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketView {
    pub id: String,
    #[serde(flatten)]
    pub ticket: FeedbackTicket,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Document<FeedbackTicket>> for TicketView {
    fn from(doc: Document<FeedbackTicket>) -> Self {
        Self {
            id: doc.id,
            ticket: doc.data,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }
    }
}

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("a closed ticket cannot be reopened")]
    TicketClosed,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub async fn create(
    proxy: &DatabaseProxy,
    user_id: &str,
    category: FeedbackCategory,
    subject: &str,
    message: &str,
) -> Result<TicketView, FeedbackError> {
    let ticket = FeedbackTicket {
        user_id: user_id.to_string(),
        category,
        subject: subject.trim().to_string(),
        message: message.trim().to_string(),
        status: TicketStatus::Open,
        admin_note: None,
    };
    let id = uuid::Uuid::new_v4().to_string();
    let created_at = documents::insert(proxy, Collection::Feedback, &id, Some(user_id), &ticket).await?;
    tracing::info!(ticket_id = %id, ?category, "feedback ticket created");
    Ok(TicketView {
        id,
        ticket,
        created_at,
        updated_at: created_at,
    })
}

pub async fn list_for_user(proxy: &DatabaseProxy, user_id: &str) -> Result<Vec<TicketView>, FeedbackError> {
    let docs =
        documents::list::<FeedbackTicket>(proxy, Collection::Feedback, &DocFilter::new().owner(user_id)).await?;
    Ok(docs.into_iter().map(Into::into).collect())
}

/// Owners see their own tickets; admins see every ticket.
pub async fn get(proxy: &DatabaseProxy, viewer: &AuthUser, id: &str) -> Result<TicketView, FeedbackError> {
    let doc = if viewer.is_admin() {
        documents::get::<FeedbackTicket>(proxy, Collection::Feedback, id)
            .await?
            .ok_or(StoreError::NotFound)?
    } else {
        documents::get_owned::<FeedbackTicket>(proxy, Collection::Feedback, id, &viewer.id).await?
    };
    Ok(doc.into())
}

pub async fn list_all(
    proxy: &DatabaseProxy,
    status: Option<TicketStatus>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<TicketView>, i64), FeedbackError> {
    let mut filter = DocFilter::new();
    if let Some(status) = status {
        filter = filter.field_eq("status", status.as_str());
    }
    let total = documents::count(proxy, Collection::Feedback, &filter).await?;
    let docs = documents::list::<FeedbackTicket>(proxy, Collection::Feedback, &filter.page(limit, offset)).await?;
    Ok((docs.into_iter().map(Into::into).collect(), total))
}

pub async fn update_status(
    proxy: &DatabaseProxy,
    id: &str,
    status: TicketStatus,
    admin_note: Option<String>,
) -> Result<TicketView, FeedbackError> {
    let mut doc = documents::get::<FeedbackTicket>(proxy, Collection::Feedback, id)
        .await?
        .ok_or(StoreError::NotFound)?;
    if !doc.data.status.can_transition_to(status) {
        return Err(FeedbackError::TicketClosed);
    }
    doc.data.status = status;
    if let Some(note) = admin_note {
        doc.data.admin_note = Some(note.trim().to_string()).filter(|n| !n.is_empty());
    }
    doc.version = documents::update(proxy, Collection::Feedback, id, doc.version, &doc.data).await?;
    doc.updated_at = chrono::Utc::now().timestamp_millis();
    Ok(doc.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_is_terminal() {
        assert!(TicketStatus::Open.can_transition_to(TicketStatus::Resolved));
        assert!(TicketStatus::Resolved.can_transition_to(TicketStatus::Open));
        assert!(TicketStatus::Closed.can_transition_to(TicketStatus::Closed));
        assert!(!TicketStatus::Closed.can_transition_to(TicketStatus::Open));
    }

    #[test]
    fn test_status_serde_matches_parse() {
        for status in [
            TicketStatus::Open,
            TicketStatus::InProgress,
            TicketStatus::Resolved,
            TicketStatus::Closed,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(TicketStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(FeedbackCategory::parse("feature"), Some(FeedbackCategory::Feature));
    }

    #[tokio::test]
    async fn test_status_filter_in_admin_listing() {
        let proxy = DatabaseProxy::connect("sqlite::memory:").await.unwrap();
        let a = create(&proxy, "u1", FeedbackCategory::Bug, "Crash", "The app crashes on start")
            .await
            .unwrap();
        create(&proxy, "u2", FeedbackCategory::Other, "Hello", "Just saying thanks a lot")
            .await
            .unwrap();
        update_status(&proxy, &a.id, TicketStatus::Closed, Some("fixed".to_string()))
            .await
            .unwrap();

        let (closed, total) = list_all(&proxy, Some(TicketStatus::Closed), 20, 0).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(closed[0].id, a.id);

        let err = update_status(&proxy, &a.id, TicketStatus::Open, None).await.unwrap_err();
        assert!(matches!(err, FeedbackError::TicketClosed));
    }
}
