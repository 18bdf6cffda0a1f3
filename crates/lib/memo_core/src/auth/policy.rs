//! Authorization policy: which operations are public and which need admin.
//!
//! Operations are fully qualified gRPC method paths. Anything not listed
//! requires an authenticated caller.

use std::collections::HashSet;
use std::sync::LazyLock;

/// Operation names.
pub mod ops {
    pub const SIGN_IN: &str = "/memos.api.v1.AuthService/SignIn";
    pub const SIGN_OUT: &str = "/memos.api.v1.AuthService/SignOut";
    pub const REFRESH_TOKEN: &str = "/memos.api.v1.AuthService/RefreshToken";
    pub const GET_CURRENT_USER: &str = "/memos.api.v1.AuthService/GetCurrentUser";

    pub const GET_INSTANCE_PROFILE: &str = "/memos.api.v1.InstanceService/GetInstanceProfile";
    pub const GET_INSTANCE_SETTING: &str = "/memos.api.v1.InstanceService/GetInstanceSetting";
    pub const UPDATE_INSTANCE_SETTING: &str =
        "/memos.api.v1.InstanceService/UpdateInstanceSetting";

    pub const CREATE_USER: &str = "/memos.api.v1.UserService/CreateUser";
    pub const GET_USER: &str = "/memos.api.v1.UserService/GetUser";
    pub const GET_USER_AVATAR: &str = "/memos.api.v1.UserService/GetUserAvatar";
    pub const LIST_USERS: &str = "/memos.api.v1.UserService/ListUsers";
    pub const DELETE_USER: &str = "/memos.api.v1.UserService/DeleteUser";
    pub const LIST_USER_SESSIONS: &str = "/memos.api.v1.UserService/ListUserSessions";
    pub const REVOKE_USER_SESSION: &str = "/memos.api.v1.UserService/RevokeUserSession";
    pub const LIST_PERSONAL_ACCESS_TOKENS: &str =
        "/memos.api.v1.UserService/ListPersonalAccessTokens";
    pub const CREATE_PERSONAL_ACCESS_TOKEN: &str =
        "/memos.api.v1.UserService/CreatePersonalAccessToken";
    pub const DELETE_PERSONAL_ACCESS_TOKEN: &str =
        "/memos.api.v1.UserService/DeletePersonalAccessToken";

    pub const LIST_MEMOS: &str = "/memos.api.v1.MemoService/ListMemos";
    pub const GET_MEMO: &str = "/memos.api.v1.MemoService/GetMemo";
    pub const LIST_MEMO_COMMENTS: &str = "/memos.api.v1.MemoService/ListMemoComments";
    pub const LIST_MEMO_REACTIONS: &str = "/memos.api.v1.MemoService/ListMemoReactions";

    pub const GET_ATTACHMENT_BINARY: &str = "/memos.api.v1.AttachmentService/GetAttachmentBinary";

    pub const LIST_IDENTITY_PROVIDERS: &str =
        "/memos.api.v1.IdentityProviderService/ListIdentityProviders";
    pub const CREATE_IDENTITY_PROVIDER: &str =
        "/memos.api.v1.IdentityProviderService/CreateIdentityProvider";
    pub const UPDATE_IDENTITY_PROVIDER: &str =
        "/memos.api.v1.IdentityProviderService/UpdateIdentityProvider";
    pub const DELETE_IDENTITY_PROVIDER: &str =
        "/memos.api.v1.IdentityProviderService/DeleteIdentityProvider";
}

static PUBLIC_OPERATIONS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        ops::SIGN_IN,
        ops::SIGN_OUT,
        ops::REFRESH_TOKEN,
        ops::GET_CURRENT_USER,
        ops::GET_INSTANCE_PROFILE,
        ops::GET_INSTANCE_SETTING,
        ops::CREATE_USER,
        ops::GET_USER,
        ops::GET_USER_AVATAR,
        ops::LIST_MEMOS,
        ops::GET_MEMO,
        ops::LIST_MEMO_COMMENTS,
        ops::LIST_MEMO_REACTIONS,
        ops::GET_ATTACHMENT_BINARY,
        ops::LIST_IDENTITY_PROVIDERS,
    ])
});

static ADMIN_OPERATIONS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        ops::UPDATE_INSTANCE_SETTING,
        ops::LIST_USERS,
        ops::DELETE_USER,
        ops::CREATE_IDENTITY_PROVIDER,
        ops::UPDATE_IDENTITY_PROVIDER,
        ops::DELETE_IDENTITY_PROVIDER,
    ])
});

/// Access level an operation demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Anonymous callers allowed.
    Public,
    /// Any authenticated caller.
    Authenticated,
    /// Host or admin role.
    Admin,
}

/// May be called without credentials.
pub fn is_public(operation: &str) -> bool {
    PUBLIC_OPERATIONS.contains(operation)
}

/// Requires the admin or host role.
pub fn is_admin_only(operation: &str) -> bool {
    ADMIN_OPERATIONS.contains(operation)
}

/// Every operation open to anonymous callers.
pub fn public_operations() -> impl Iterator<Item = &'static str> {
    PUBLIC_OPERATIONS.iter().copied()
}

/// Every operation reserved for the admin and host roles.
pub fn admin_operations() -> impl Iterator<Item = &'static str> {
    ADMIN_OPERATIONS.iter().copied()
}

/// `None` (no operation resolved) requires authentication.
pub fn access_for(operation: Option<&str>) -> Access {
    match operation {
        Some(op) if is_admin_only(op) => Access::Admin,
        Some(op) if is_public(op) => Access::Public,
        _ => Access::Authenticated,
    }
}
