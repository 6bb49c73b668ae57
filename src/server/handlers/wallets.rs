use axum::extract::{Extension, Json, Path};
use serde::Serialize;
use uuid::Uuid;

use crate::api::{DynAPI, NewAdjustment};
use crate::auth::User;
use crate::entities::{LedgerEntry, Posting, WalletAccount};
use crate::error::Error;

#[derive(Serialize)]
pub struct WalletView {
    #[serde(flatten)]
    wallet: WalletAccount,
    may_accept_cash_rides: bool,
}

impl From<WalletAccount> for WalletView {
    fn from(wallet: WalletAccount) -> Self {
        Self {
            may_accept_cash_rides: wallet.may_accept_cash_rides(),
            wallet,
        }
    }
}

pub async fn find(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(account_id): Path<Uuid>,
) -> Result<Json<WalletView>, Error> {
    let wallet = api.find_wallet(user, account_id).await?;

    Ok(Json(wallet.into()))
}

pub async fn entries(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(account_id): Path<Uuid>,
) -> Result<Json<Vec<LedgerEntry>>, Error> {
    let entries = api.list_ledger_entries(user, account_id).await?;

    Ok(entries.into())
}

pub async fn reconcile(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(account_id): Path<Uuid>,
) -> Result<Json<WalletView>, Error> {
    let wallet = api.reconcile_wallet(user, account_id).await?;

    Ok(Json(wallet.into()))
}

pub async fn adjust(
    Extension(api): Extension<DynAPI>,
    user: User,
    Path(account_id): Path<Uuid>,
    Json(params): Json<NewAdjustment>,
) -> Result<Json<Posting>, Error> {
    let posting = api.post_adjustment(user, account_id, params).await?;

    Ok(posting.into())
}
