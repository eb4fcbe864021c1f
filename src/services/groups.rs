//! Learning groups: membership, roles and the member leaderboard.
//!
//! A group always keeps at least one admin. When the last admin leaves, the
//! longest-standing remaining member is promoted; when the last member
//! leaves, the group is deleted.

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::documents;
use crate::db::operations::group_ids_for_member;
use crate::db::{Collection, DatabaseProxy, DocFilter, Document, StoreError};
use crate::services::gamification::GamificationProfile;
use crate::services::leaderboard::{rank_entries, with_usernames, LeaderboardEntry};

pub const INVITE_CODE_LEN: usize = 8;
const INVITE_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const INVITE_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupRole {
    Admin,
    Member,
}

impl GroupRole {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Some(Self::Admin),
            "MEMBER" => Some(Self::Member),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMember {
    pub user_id: String,
    pub role: GroupRole,
    pub joined_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningGroup {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub invite_code: String,
    pub created_by: String,
    pub members: Vec<GroupMember>,
}

impl LearningGroup {
    pub fn member(&self, user_id: &str) -> Option<&GroupMember> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.member(user_id)
            .is_some_and(|m| m.role == GroupRole::Admin)
    }

    fn admin_count(&self) -> usize {
        self.members
            .iter()
            .filter(|m| m.role == GroupRole::Admin)
            .count()
    }

    /// Drops `user_id` and promotes the oldest member if no admin remains.
    fn remove_member(&mut self, user_id: &str) {
        self.members.retain(|m| m.user_id != user_id);
        if self.admin_count() == 0 {
            if let Some(oldest) = self.members.iter_mut().min_by_key(|m| m.joined_at) {
                oldest.role = GroupRole::Admin;
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum GroupError {
    #[error("group not found")]
    NotFound,
    #[error("not a member of this group")]
    NotMember,
    #[error("only group admins can do this")]
    NotAdmin,
    #[error("already a member of this group")]
    AlreadyMember,
    #[error("member not found")]
    MemberNotFound,
    #[error("a group needs at least one admin")]
    LastAdmin,
    #[error("use leave to remove yourself")]
    CannotRemoveSelf,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupView {
    pub id: String,
    #[serde(flatten)]
    pub group: LearningGroup,
    pub member_count: usize,
    pub created_at: i64,
}

impl From<Document<LearningGroup>> for GroupView {
    fn from(doc: Document<LearningGroup>) -> Self {
        Self {
            id: doc.id,
            member_count: doc.data.members.len(),
            group: doc.data,
            created_at: doc.created_at,
        }
    }
}

pub fn generate_invite_code() -> String {
    let mut rng = rand::rng();
    (0..INVITE_CODE_LEN)
        .map(|_| INVITE_CODE_ALPHABET[rng.random_range(0..INVITE_CODE_ALPHABET.len())] as char)
        .collect()
}

async fn load(proxy: &DatabaseProxy, group_id: &str) -> Result<Document<LearningGroup>, GroupError> {
    documents::get(proxy, Collection::Groups, group_id)
        .await?
        .ok_or(GroupError::NotFound)
}

async fn load_for_member(
    proxy: &DatabaseProxy,
    group_id: &str,
    user_id: &str,
) -> Result<Document<LearningGroup>, GroupError> {
    let doc = load(proxy, group_id).await?;
    if doc.data.member(user_id).is_none() {
        return Err(GroupError::NotMember);
    }
    Ok(doc)
}

async fn load_for_admin(
    proxy: &DatabaseProxy,
    group_id: &str,
    user_id: &str,
) -> Result<Document<LearningGroup>, GroupError> {
    let doc = load_for_member(proxy, group_id, user_id).await?;
    if !doc.data.is_admin(user_id) {
        return Err(GroupError::NotAdmin);
    }
    Ok(doc)
}

async fn save(proxy: &DatabaseProxy, doc: &mut Document<LearningGroup>) -> Result<(), GroupError> {
    doc.version = documents::update(proxy, Collection::Groups, &doc.id, doc.version, &doc.data).await?;
    Ok(())
}

pub async fn create(
    proxy: &DatabaseProxy,
    user_id: &str,
    name: &str,
    description: Option<String>,
) -> Result<GroupView, GroupError> {
    let invite_code = unused_invite_code(proxy).await?;
    let group = LearningGroup {
        name: name.to_string(),
        description,
        invite_code,
        created_by: user_id.to_string(),
        members: vec![GroupMember {
            user_id: user_id.to_string(),
            role: GroupRole::Admin,
            joined_at: Utc::now().timestamp_millis(),
        }],
    };

    let id = uuid::Uuid::new_v4().to_string();
    // ownerless; membership lives in `members`
    let created_at = documents::insert(proxy, Collection::Groups, &id, None, &group).await?;
    Ok(GroupView {
        id,
        member_count: group.members.len(),
        group,
        created_at,
    })
}

async fn unused_invite_code(proxy: &DatabaseProxy) -> Result<String, GroupError> {
    for _ in 0..INVITE_CODE_ATTEMPTS {
        let code = generate_invite_code();
        let taken = documents::count(
            proxy,
            Collection::Groups,
            &DocFilter::new().field_eq("inviteCode", code.clone()),
        )
        .await?;
        if taken == 0 {
            return Ok(code);
        }
    }
    Err(GroupError::Store(StoreError::Conflict))
}

pub async fn list_for_user(proxy: &DatabaseProxy, user_id: &str) -> Result<Vec<GroupView>, GroupError> {
    let ids = group_ids_for_member(proxy, user_id)
        .await
        .map_err(StoreError::from)?;
    let mut groups = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(doc) = documents::get::<LearningGroup>(proxy, Collection::Groups, &id).await? {
            groups.push(doc.into());
        }
    }
    Ok(groups)
}

pub async fn get(proxy: &DatabaseProxy, group_id: &str, user_id: &str) -> Result<GroupView, GroupError> {
    Ok(load_for_member(proxy, group_id, user_id).await?.into())
}

pub async fn join(proxy: &DatabaseProxy, invite_code: &str, user_id: &str) -> Result<GroupView, GroupError> {
    let code = invite_code.trim().to_ascii_uppercase();
    let mut doc = documents::list::<LearningGroup>(
        proxy,
        Collection::Groups,
        &DocFilter::new().field_eq("inviteCode", code),
    )
    .await?
    .into_iter()
    .next()
    .ok_or(GroupError::NotFound)?;

    if doc.data.member(user_id).is_some() {
        return Err(GroupError::AlreadyMember);
    }
    doc.data.members.push(GroupMember {
        user_id: user_id.to_string(),
        role: GroupRole::Member,
        joined_at: Utc::now().timestamp_millis(),
    });
    save(proxy, &mut doc).await?;
    Ok(doc.into())
}

/// Returns `None` when the group was deleted because nobody is left.
pub async fn leave(
    proxy: &DatabaseProxy,
    group_id: &str,
    user_id: &str,
) -> Result<Option<GroupView>, GroupError> {
    let mut doc = load_for_member(proxy, group_id, user_id).await?;
    doc.data.remove_member(user_id);
    if doc.data.members.is_empty() {
        documents::delete(proxy, Collection::Groups, group_id).await?;
        tracing::info!(group_id, "last member left, group deleted");
        return Ok(None);
    }
    save(proxy, &mut doc).await?;
    Ok(Some(doc.into()))
}

pub async fn remove_member(
    proxy: &DatabaseProxy,
    group_id: &str,
    actor_id: &str,
    target_id: &str,
) -> Result<GroupView, GroupError> {
    if actor_id == target_id {
        return Err(GroupError::CannotRemoveSelf);
    }
    let mut doc = load_for_admin(proxy, group_id, actor_id).await?;
    if doc.data.member(target_id).is_none() {
        return Err(GroupError::MemberNotFound);
    }
    doc.data.remove_member(target_id);
    save(proxy, &mut doc).await?;
    Ok(doc.into())
}

pub async fn set_role(
    proxy: &DatabaseProxy,
    group_id: &str,
    actor_id: &str,
    target_id: &str,
    role: GroupRole,
) -> Result<GroupView, GroupError> {
    let mut doc = load_for_admin(proxy, group_id, actor_id).await?;
    let demotes_last_admin =
        role == GroupRole::Member && doc.data.is_admin(target_id) && doc.data.admin_count() == 1;
    if demotes_last_admin {
        return Err(GroupError::LastAdmin);
    }
    let member = doc
        .data
        .members
        .iter_mut()
        .find(|m| m.user_id == target_id)
        .ok_or(GroupError::MemberNotFound)?;
    member.role = role;
    save(proxy, &mut doc).await?;
    Ok(doc.into())
}

pub async fn delete(proxy: &DatabaseProxy, group_id: &str, actor_id: &str) -> Result<(), GroupError> {
    load_for_admin(proxy, group_id, actor_id).await?;
    documents::delete(proxy, Collection::Groups, group_id).await?;
    Ok(())
}

/// Members ranked by total XP.
pub async fn leaderboard(
    proxy: &DatabaseProxy,
    group_id: &str,
    user_id: &str,
) -> Result<Vec<LeaderboardEntry>, GroupError> {
    let doc = load_for_member(proxy, group_id, user_id).await?;
    let mut values = Vec::with_capacity(doc.data.members.len());
    for member in &doc.data.members {
        let xp = documents::get::<GamificationProfile>(proxy, Collection::Gamification, &member.user_id)
            .await?
            .map_or(0, |p| p.data.xp);
        values.push((member.user_id.clone(), xp));
    }
    Ok(rank_entries(with_usernames(proxy, values).await?))
}

/// Removes a departing account from every group it belongs to.
pub async fn remove_user_everywhere(proxy: &DatabaseProxy, user_id: &str) -> Result<usize, GroupError> {
    let ids = group_ids_for_member(proxy, user_id)
        .await
        .map_err(StoreError::from)?;
    for id in &ids {
        leave(proxy, id, user_id).await?;
    }
    Ok(ids.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(id: &str, role: GroupRole, joined_at: i64) -> GroupMember {
        GroupMember {
            user_id: id.to_string(),
            role,
            joined_at,
        }
    }

    fn group(members: Vec<GroupMember>) -> LearningGroup {
        LearningGroup {
            name: "Book club".to_string(),
            description: None,
            invite_code: "ABCDEFGH".to_string(),
            created_by: "a".to_string(),
            members,
        }
    }

    #[test]
    fn test_invite_code_shape() {
        let code = generate_invite_code();
        assert_eq!(code.len(), INVITE_CODE_LEN);
        assert!(code.bytes().all(|b| INVITE_CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_last_admin_leaving_promotes_oldest() {
        let mut g = group(vec![
            member("a", GroupRole::Admin, 1),
            member("c", GroupRole::Member, 30),
            member("b", GroupRole::Member, 20),
        ]);
        g.remove_member("a");
        assert!(g.is_admin("b"));
        assert!(!g.is_admin("c"));
    }

    #[test]
    fn test_removing_member_keeps_admins() {
        let mut g = group(vec![
            member("a", GroupRole::Admin, 1),
            member("b", GroupRole::Member, 2),
        ]);
        g.remove_member("b");
        assert_eq!(g.members.len(), 1);
        assert!(g.is_admin("a"));
    }

    #[tokio::test]
    async fn test_join_leave_lifecycle() {
        let proxy = DatabaseProxy::connect("sqlite::memory:").await.unwrap();
        let created = create(&proxy, "a", "Book club", None).await.unwrap();

        let joined = join(&proxy, &created.group.invite_code.to_lowercase(), "b")
            .await
            .unwrap();
        assert_eq!(joined.member_count, 2);
        assert!(matches!(
            join(&proxy, &created.group.invite_code, "b").await,
            Err(GroupError::AlreadyMember)
        ));

        assert!(matches!(
            set_role(&proxy, &created.id, "a", "a", GroupRole::Member).await,
            Err(GroupError::LastAdmin)
        ));

        let after = leave(&proxy, &created.id, "a").await.unwrap().unwrap();
        assert!(after.group.is_admin("b"));

        assert!(leave(&proxy, &created.id, "b").await.unwrap().is_none());
        assert!(matches!(
            get(&proxy, &created.id, "b").await,
            Err(GroupError::NotFound)
        ));
    }
}
