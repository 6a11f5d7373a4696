use crate::domain::{ChatId, ChatKind, UserId};

// ============== Authorization ==============

/// Allow-lists from the environment. Empty lists mean "no restriction".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    pub owner_ids: Vec<i64>,
    pub allow_group_ids: Vec<i64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed,
    DeniedUser,
    DeniedGroup,
}

impl AccessDecision {
    pub fn is_allowed(self) -> bool {
        self == AccessDecision::Allowed
    }

    /// Reply text for a denied request.
    pub fn denial_text(self) -> Option<&'static str> {
        match self {
            AccessDecision::Allowed => None,
            AccessDecision::DeniedUser => Some("You are not authorized to use this bot."),
            AccessDecision::DeniedGroup => Some("This group is not allowed to use the bot."),
        }
    }
}

impl AccessPolicy {
    pub fn is_allowed_user(&self, user_id: Option<UserId>) -> bool {
        if self.owner_ids.is_empty() {
            return true;
        }
        let Some(user_id) = user_id else {
            return false;
        };
        self.owner_ids.contains(&user_id.0)
    }

    pub fn is_allowed_chat(&self, chat_id: ChatId, kind: ChatKind) -> bool {
        if self.allow_group_ids.is_empty() || !kind.is_group() {
            return true;
        }
        self.allow_group_ids.contains(&chat_id.0)
    }
}

/// Both the sender check and the group check must pass.
pub fn is_authorized(
    user_id: Option<UserId>,
    chat_id: ChatId,
    kind: ChatKind,
    policy: &AccessPolicy,
) -> AccessDecision {
    if !policy.is_allowed_user(user_id) {
        return AccessDecision::DeniedUser;
    }
    if !policy.is_allowed_chat(chat_id, kind) {
        return AccessDecision::DeniedGroup;
    }
    AccessDecision::Allowed
}
