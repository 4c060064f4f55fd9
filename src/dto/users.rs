use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    models::{SubscribedAuthor, User},
    routes::params::Pagination,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AvatarRequest {
    /// `data:image/<ext>;base64,<payload>`
    pub avatar: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AvatarResponse {
    pub avatar: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct UserList {
    #[schema(value_type = Vec<User>)]
    pub items: Vec<User>,
}

#[derive(Debug, Default, Deserialize, ToSchema, IntoParams)]
pub struct SubscriptionQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    /// Maximum number of recipes previewed per author; unbounded when absent.
    pub recipes_limit: Option<u64>,
}

impl SubscriptionQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct SubscriptionList {
    #[schema(value_type = Vec<SubscribedAuthor>)]
    pub items: Vec<SubscribedAuthor>,
}
