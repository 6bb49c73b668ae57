use axum::extract::{Extension, Json, Path, Query};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{DynAPI, NewWithdrawal};
use crate::auth::User;
use crate::entities::{Withdrawal, WithdrawalStatus};
use crate::error::Error;

#[derive(Serialize, Deserialize)]
pub struct ListParams {
    status: Option<WithdrawalStatus>,
}

#[derive(Serialize, Deserialize)]
pub struct RejectParams {
    reason: String,
}

pub async fn create(
    Extension(api): Extension<DynAPI>,
    user: User,
    Json(params): Json<NewWithdrawal>,
) -> Result<Json<Withdrawal>, Error> {
    let withdrawal = api.request_withdrawal(user, params).await?;

    Ok(withdrawal.into())
}

pub async fn list(
    Extension(api): Extension<DynAPI>,
    user: User,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Withdrawal>>, Error> {
    let withdrawals = api.list_withdrawals(user, params.status).await?;

    Ok(withdrawals.into())
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Withdrawal>, Error> {
    let withdrawal = api.find_withdrawal(user, id).await?;

    Ok(withdrawal.into())
}

pub async fn approve(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
) -> Result<Json<Withdrawal>, Error> {
    let withdrawal = api.approve_withdrawal(user, id).await?;

    Ok(withdrawal.into())
}

pub async fn reject(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(id): Path<Uuid>,
    Json(params): Json<RejectParams>,
) -> Result<Json<Withdrawal>, Error> {
    let withdrawal = api.reject_withdrawal(user, id, params.reason).await?;

    Ok(withdrawal.into())
}
