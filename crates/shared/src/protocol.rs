use serde::{Deserialize, Serialize};

use crate::domain::{Domain, UserRecord};

pub const USER_GET_PATH: &str = "/api/userGet";
pub const USER_POST_PATH: &str = "/api/userPost";
pub const USERS_COLLECTION: &str = "users";

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UserListQuery {
    pub domain: Domain,
}

/// Success body of `GET /api/userGet`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserListResponse {
    pub data: Vec<UserRecord>,
}
