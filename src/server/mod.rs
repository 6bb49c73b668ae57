mod handlers;

use std::net::SocketAddr;

use axum::{
    extract::Extension,
    routing::{get, patch, post},
    Router,
};

use crate::api::DynAPI;
use crate::error::{unexpected_error, Error};
use crate::server::handlers::{bookings, reviews, trips, wallets, withdrawals};

pub fn router(api: DynAPI) -> Router {
    Router::new()
        .route("/trips", post(trips::publish).get(trips::search))
        .route("/trips/:id", get(trips::find))
        .route(
            "/trips/:id/bookings",
            get(trips::bookings).post(trips::request_seats),
        )
        .route("/trips/:id/otp", patch(trips::issue_otp).get(trips::find_otp))
        .route("/trips/:id/start", patch(trips::start))
        .route("/trips/:id/finish", patch(trips::finish))
        .route("/trips/:id/cancel", patch(trips::cancel))
        .route("/trips/:id/reviews", post(reviews::create))
        .route("/bookings", get(bookings::list))
        .route("/bookings/:id", get(bookings::find))
        .route("/bookings/:id/approve", patch(bookings::approve))
        .route("/bookings/:id/reject", patch(bookings::reject))
        .route("/bookings/:id/cancel", patch(bookings::cancel))
        .route("/wallets/:account_id", get(wallets::find))
        .route("/wallets/:account_id/entries", get(wallets::entries))
        .route("/wallets/:account_id/reconcile", get(wallets::reconcile))
        .route("/wallets/:account_id/adjustments", post(wallets::adjust))
        .route(
            "/withdrawals",
            post(withdrawals::create).get(withdrawals::list),
        )
        .route("/withdrawals/:id", get(withdrawals::find))
        .route("/withdrawals/:id/approve", patch(withdrawals::approve))
        .route("/withdrawals/:id/reject", patch(withdrawals::reject))
        .route("/drivers/:id/reviews", get(reviews::driver_rating))
        .layer(Extension(api))
}

pub async fn serve(api: DynAPI, addr: SocketAddr) -> Result<(), Error> {
    let app = router(api);

    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .map_err(|err| {
            tracing::error!(%err, "server stopped");
            unexpected_error()
        })
}
