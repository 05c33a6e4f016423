use crate::error::{EngineError, EngineResult, StorageContext};
use quest_storage::{QuestStorage, StorageError};
use quest_types::{Group, GroupId, UserId};
use rand::RngCore;
use std::sync::Arc;
use tracing::{debug, info};

const INVITE_CODE_ATTEMPTS: usize = 4;

/// Fail with `Forbidden` unless `user` belongs to `group_id`.
pub(crate) async fn ensure_member(
    storage: &dyn QuestStorage,
    user: UserId,
    group_id: GroupId,
) -> EngineResult<()> {
    if storage
        .is_member(user, group_id)
        .await
        .context("check group membership")?
    {
        return Ok(());
    }
    debug!(user = %user, group = %group_id, "Membership check failed");
    Err(EngineError::Forbidden(format!(
        "user {user} is not a member of group {group_id}"
    )))
}

/// Random 16-character hex code.
fn invite_code() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Group creation and joining.
#[derive(Clone)]
pub struct GroupDirectory {
    storage: Arc<dyn QuestStorage>,
}

impl GroupDirectory {
    pub fn new(storage: Arc<dyn QuestStorage>) -> Self {
        Self { storage }
    }

    /// Create a group with a fresh invite code and add `creator` to it.
    pub async fn create_group(&self, name: &str, creator: UserId) -> EngineResult<Group> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidArgument(
                "group name must not be empty".to_string(),
            ));
        }

        let mut attempt = 0;
        let group = loop {
            attempt += 1;
            match self
                .storage
                .create_group(name.to_string(), invite_code())
                .await
            {
                Ok(group) => break group,
                Err(StorageError::Conflict(_)) if attempt < INVITE_CODE_ATTEMPTS => continue,
                Err(err) => return Err(EngineError::storage("create group", err)),
            }
        };

        self.storage
            .add_member(group.id, creator)
            .await
            .context("add group creator")?;
        info!(group = %group.id, creator = %creator, "Group created");
        Ok(group)
    }

    /// Join the group identified by `invite_code`.
    pub async fn join_group(&self, user: UserId, invite_code: &str) -> EngineResult<Group> {
        let group = self
            .storage
            .group_by_invite_code(invite_code.trim())
            .await
            .context("look up invite code")?
            .ok_or_else(|| EngineError::NotFound("invalid invite code".to_string()))?;

        match self.storage.add_member(group.id, user).await {
            Ok(()) => {}
            Err(StorageError::Conflict(_)) => {
                return Err(EngineError::InvalidArgument(format!(
                    "user {user} is already a member of group {}",
                    group.id
                )))
            }
            Err(err) => return Err(EngineError::storage("join group", err)),
        }
        info!(group = %group.id, user = %user, "User joined group");
        Ok(group)
    }

    pub async fn get_group(&self, group_id: GroupId) -> EngineResult<Group> {
        self.storage
            .get_group(group_id)
            .await
            .context("load group")?
            .ok_or_else(|| EngineError::not_found(format!("group {group_id}")))
    }

    pub async fn groups_of(&self, user: UserId) -> EngineResult<Vec<Group>> {
        self.storage.groups_of(user).await.context("list user groups")
    }

    pub async fn members_of(&self, group_id: GroupId) -> EngineResult<Vec<UserId>> {
        self.storage
            .members_of(group_id)
            .await
            .context("list group members")
    }

    pub async fn is_member(&self, user: UserId, group_id: GroupId) -> EngineResult<bool> {
        self.storage
            .is_member(user, group_id)
            .await
            .context("check group membership")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use quest_storage::InMemoryQuestStorage;

    fn directory() -> GroupDirectory {
        GroupDirectory::new(Arc::new(InMemoryQuestStorage::new()))
    }

    #[test]
    fn invite_codes_are_sixteen_hex_chars() {
        let code = invite_code();
        assert_eq!(code.len(), 16);
        assert!(code.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn creator_is_member_and_others_join_by_code() {
        let groups = directory();
        let group = groups.create_group("Household", UserId(1)).await.unwrap();
        assert!(groups.is_member(UserId(1), group.id).await.unwrap());

        let joined = groups.join_group(UserId(2), &group.invite_code).await.unwrap();
        assert_eq!(joined.id, group.id);
        assert_eq!(
            groups.members_of(group.id).await.unwrap(),
            vec![UserId(1), UserId(2)]
        );

        let err = groups
            .join_group(UserId(2), &group.invite_code)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = groups.join_group(UserId(3), "nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn ensure_member_is_forbidden_for_outsiders() {
        let storage: Arc<dyn QuestStorage> = Arc::new(InMemoryQuestStorage::new());
        let groups = GroupDirectory::new(Arc::clone(&storage));
        let group = groups.create_group("Team", UserId(1)).await.unwrap();

        ensure_member(storage.as_ref(), UserId(1), group.id)
            .await
            .unwrap();
        let err = ensure_member(storage.as_ref(), UserId(2), group.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }
}
