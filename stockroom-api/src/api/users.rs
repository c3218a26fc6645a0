//! Caller profile

use axum::Json;
use serde::Serialize;
use stockroom_common::db::{Organization, User};

use super::context::TenantContext;
use crate::db::users;
use crate::error::ApiResult;

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub organization: Organization,
    pub tryout_expires_at: Option<i64>,
}

/// GET /users/me
pub async fn me(tenant: TenantContext) -> ApiResult<Json<MeResponse>> {
    let user = {
        let mut conn = tenant.conn().await;
        users::get(&mut conn, tenant.user_id()).await?
    };

    Ok(Json(MeResponse {
        user,
        organization: (*tenant.organization).clone(),
        tryout_expires_at: tenant.claims.tryout_expires_at,
    }))
}
