mod common;

use futures::future::join_all;
use rust_decimal_macros::dec;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use seatshare::api::{BookingAPI, NewAdjustment, NewWithdrawal, TripAPI, WalletAPI, WithdrawalAPI};
use seatshare::auth::User;
use seatshare::entities::{
    Decision, LedgerKind, PayoutMethod, Posting, Standing, WithdrawalStatus, MAX_POSTING,
};
use seatshare::error::{
    already_resolved_error, insufficient_balance_error, invalid_amount_error,
    invalid_payout_details_error, unauthorized_error,
};

use common::{departing_soon, harness, passenger};

fn upi() -> PayoutMethod {
    PayoutMethod::Upi {
        upi_id: "driver@upi".into(),
    }
}

#[tokio::test]
async fn credit_and_debit_are_idempotent_per_reference() {
    let h = harness();
    let account = h.driver.id;
    let trip_id = Uuid::new_v4();
    let withdrawal_id = Uuid::new_v4();

    assert!(assert_ok!(h.engine.credit(account, dec!(300), trip_id).await).is_posted());
    assert_eq!(
        assert_ok!(h.engine.credit(account, dec!(300), trip_id).await),
        Posting::Duplicate
    );

    assert!(assert_ok!(h.engine.debit(account, dec!(120), withdrawal_id).await).is_posted());
    assert_eq!(
        assert_ok!(h.engine.debit(account, dec!(120), withdrawal_id).await),
        Posting::Duplicate
    );

    let entries = assert_ok!(h.engine.list_ledger_entries(h.admin.clone(), account).await);
    assert_eq!(entries.len(), 2);
    assert_eq!(h.balance(account).await, dec!(180));

    let err = assert_err!(h.engine.debit(account, dec!(0), Uuid::new_v4()).await);
    assert_eq!(err, invalid_amount_error());
}

#[tokio::test]
async fn negative_balance_is_surfaced_not_clamped() {
    let h = harness();
    let account = h.driver.id;

    h.fund(account, dec!(40)).await;
    h.fund(account, dec!(-90)).await;

    let wallet = assert_ok!(h.engine.find_wallet(h.driver.clone(), account).await);
    assert_eq!(wallet.balance, dec!(-50));
    assert_eq!(wallet.standing, Standing::Owing);
    assert!(!wallet.may_accept_cash_rides());
}

#[tokio::test]
async fn adjustments_are_admin_only_and_idempotent() {
    let h = harness();
    let account = h.driver.id;
    let params = NewAdjustment {
        amount: dec!(-25),
        reference_id: Uuid::new_v4(),
        note: "cash ride commission".into(),
    };

    let err = assert_err!(
        h.engine
            .post_adjustment(h.driver.clone(), account, params.clone())
            .await
    );
    assert_eq!(err, unauthorized_error());

    let posting = assert_ok!(
        h.engine
            .post_adjustment(h.admin.clone(), account, params.clone())
            .await
    );
    match posting {
        Posting::Posted(entry) => {
            assert_eq!(entry.kind, LedgerKind::Adjustment);
            assert_eq!(entry.note.as_deref(), Some("cash ride commission"));
        }
        Posting::Duplicate => panic!("first adjustment must post"),
    }

    let repeated = assert_ok!(h.engine.post_adjustment(h.admin.clone(), account, params).await);
    assert_eq!(repeated, Posting::Duplicate);
    assert_eq!(h.balance(account).await, dec!(-25));
}

#[tokio::test]
async fn reconcile_agrees_with_the_entries() {
    let h = harness();
    let account = h.driver.id;

    h.fund(account, dec!(100)).await;
    assert_ok!(h.engine.credit(account, dec!(250.50), Uuid::new_v4()).await);
    assert_ok!(h.engine.debit(account, dec!(50.25), Uuid::new_v4()).await);

    let wallet = assert_ok!(h.engine.reconcile_wallet(h.driver.clone(), account).await);
    assert_eq!(wallet.balance, dec!(300.25));
    assert_eq!(wallet.balance, h.balance(account).await);

    let stranger = User::driver(Uuid::new_v4());
    let err = assert_err!(h.engine.reconcile_wallet(stranger, account).await);
    assert_eq!(err, unauthorized_error());
}

#[tokio::test]
async fn withdrawal_request_needs_cover_and_details() {
    let h = harness();
    h.fund(h.driver.id, dec!(100)).await;

    let err = assert_err!(
        h.engine
            .request_withdrawal(
                h.driver.clone(),
                NewWithdrawal {
                    amount: dec!(150),
                    method: upi(),
                },
            )
            .await
    );
    assert_eq!(err, insufficient_balance_error());

    let err = assert_err!(
        h.engine
            .request_withdrawal(
                h.driver.clone(),
                NewWithdrawal {
                    amount: dec!(-5),
                    method: upi(),
                },
            )
            .await
    );
    assert_eq!(err, invalid_amount_error());

    let err = assert_err!(
        h.engine
            .request_withdrawal(
                h.driver.clone(),
                NewWithdrawal {
                    amount: dec!(10),
                    method: PayoutMethod::Bank {
                        account_number: "".into(),
                        ifsc: "HDFC0000001".into(),
                        holder_name: "Driver".into(),
                    },
                },
            )
            .await
    );
    assert_eq!(err, invalid_payout_details_error());

    let err = assert_err!(
        h.engine
            .request_withdrawal(
                User::passenger(h.driver.id),
                NewWithdrawal {
                    amount: dec!(10),
                    method: upi(),
                },
            )
            .await
    );
    assert_eq!(err, unauthorized_error());
}

#[tokio::test]
async fn approval_rechecks_balance_and_changes_nothing_on_failure() {
    let h = harness();
    h.fund(h.driver.id, dec!(100)).await;

    let large = assert_ok!(
        h.engine
            .request_withdrawal(
                h.driver.clone(),
                NewWithdrawal {
                    amount: dec!(80),
                    method: upi(),
                },
            )
            .await
    );
    let second = assert_ok!(
        h.engine
            .request_withdrawal(
                h.driver.clone(),
                NewWithdrawal {
                    amount: dec!(60),
                    method: upi(),
                },
            )
            .await
    );

    let approved = assert_ok!(h.engine.approve_withdrawal(h.admin.clone(), large.id).await);
    assert_eq!(approved.status, WithdrawalStatus::Approved);
    assert_eq!(h.balance(h.driver.id).await, dec!(20));

    let err = assert_err!(h.engine.approve_withdrawal(h.admin.clone(), second.id).await);
    assert_eq!(err, insufficient_balance_error());

    let second = assert_ok!(h.engine.find_withdrawal(h.driver.clone(), second.id).await);
    assert_eq!(second.status, WithdrawalStatus::Pending);

    let debits = assert_ok!(h.engine.list_ledger_entries(h.admin.clone(), h.driver.id).await)
        .into_iter()
        .filter(|e| e.kind == LedgerKind::WithdrawalDebit)
        .count();
    assert_eq!(debits, 1);

    let err = assert_err!(h.engine.approve_withdrawal(h.admin.clone(), large.id).await);
    assert_eq!(err, already_resolved_error());
    assert_eq!(h.balance(h.driver.id).await, dec!(20));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_approvals_never_overdraw() {
    let h = harness();
    h.fund(h.driver.id, dec!(100)).await;

    let mut ids = vec![];
    for amount in [dec!(70), dec!(60), dec!(50)] {
        let withdrawal = assert_ok!(
            h.engine
                .request_withdrawal(
                    h.driver.clone(),
                    NewWithdrawal {
                        amount,
                        method: upi(),
                    },
                )
                .await
        );
        ids.push(withdrawal.id);
    }

    let approvals = ids.into_iter().map(|id| {
        let engine = h.engine.clone();
        let admin = h.admin.clone();
        tokio::spawn(async move { engine.approve_withdrawal(admin, id).await })
    });

    let approved = join_all(approvals)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .filter(|r| r.is_ok())
        .count();

    // any single request fits, no two of them do
    assert_eq!(approved, 1);

    let balance = h.balance(h.driver.id).await;
    assert!(balance >= dec!(0));

    let wallet = assert_ok!(h.engine.reconcile_wallet(h.admin.clone(), h.driver.id).await);
    assert_eq!(wallet.balance, balance);
}

#[tokio::test]
async fn rejection_records_the_reason_without_ledger_effect() {
    let h = harness();
    h.fund(h.driver.id, dec!(100)).await;

    let withdrawal = assert_ok!(
        h.engine
            .request_withdrawal(
                h.driver.clone(),
                NewWithdrawal {
                    amount: dec!(40),
                    method: upi(),
                },
            )
            .await
    );

    let err = assert_err!(
        h.engine
            .reject_withdrawal(h.driver.clone(), withdrawal.id, "nope".into())
            .await
    );
    assert_eq!(err, unauthorized_error());

    let rejected = assert_ok!(
        h.engine
            .reject_withdrawal(h.admin.clone(), withdrawal.id, " KYC pending ".into())
            .await
    );
    assert_eq!(rejected.status, WithdrawalStatus::Rejected);
    assert_eq!(rejected.admin_note.as_deref(), Some("KYC pending"));
    assert_eq!(h.balance(h.driver.id).await, dec!(100));

    let err = assert_err!(h.engine.approve_withdrawal(h.admin.clone(), withdrawal.id).await);
    assert_eq!(err, already_resolved_error());

    let pending = assert_ok!(
        h.engine
            .list_withdrawals(h.admin.clone(), Some(WithdrawalStatus::Pending))
            .await
    );
    assert!(pending.is_empty());

    let own = assert_ok!(h.engine.list_withdrawals(h.driver.clone(), None).await);
    assert_eq!(own.len(), 1);
}

#[tokio::test]
async fn oversized_postings_are_rejected_before_the_ledger() {
    let h = harness();
    let account = h.driver.id;

    let err = assert_err!(
        h.engine
            .post_adjustment(
                h.admin.clone(),
                account,
                NewAdjustment {
                    amount: rust_decimal::Decimal::MAX,
                    reference_id: Uuid::new_v4(),
                    note: "opening balance".into(),
                },
            )
            .await
    );
    assert_eq!(err, invalid_amount_error());

    let err = assert_err!(h.engine.credit(account, MAX_POSTING + dec!(1), Uuid::new_v4()).await);
    assert_eq!(err, invalid_amount_error());

    h.fund(account, MAX_POSTING).await;
    assert_eq!(h.balance(account).await, MAX_POSTING);

    let entries = assert_ok!(h.engine.list_ledger_entries(h.admin.clone(), account).await);
    assert_eq!(entries.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn trip_credit_and_withdrawal_debit_race_without_lost_updates() {
    let h = harness();
    let account = h.driver.id;
    h.fund(account, dec!(100)).await;

    for _ in 0..5 {
        let trip = h.publish(2, dec!(150), departing_soon()).await;
        let rider = passenger();

        let booking = assert_ok!(h.engine.request_seats(rider.clone(), trip.id, 2).await);
        assert_ok!(
            h.engine
                .decide_booking(h.driver.clone(), booking.id, Decision::Approve)
                .await
        );
        assert_ok!(h.engine.issue_otp(h.driver.clone(), trip.id).await);
        let otp = assert_ok!(h.engine.find_trip_otp(rider, trip.id).await);
        assert_ok!(h.engine.start_trip(h.driver.clone(), trip.id, otp.code).await);

        let withdrawal = assert_ok!(
            h.engine
                .request_withdrawal(
                    h.driver.clone(),
                    NewWithdrawal {
                        amount: dec!(80),
                        method: upi(),
                    },
                )
                .await
        );

        let finish = {
            let engine = h.engine.clone();
            let driver = h.driver.clone();
            let trip_id = trip.id;
            tokio::spawn(async move { engine.finish_trip(driver, trip_id).await })
        };
        let approve = {
            let engine = h.engine.clone();
            let admin = h.admin.clone();
            let withdrawal_id = withdrawal.id;
            tokio::spawn(async move { engine.approve_withdrawal(admin, withdrawal_id).await })
        };

        assert_ok!(finish.await.unwrap());
        assert_ok!(approve.await.unwrap());
    }

    // opening + 5 fares of 300 - 5 withdrawals of 80
    assert_eq!(h.balance(account).await, dec!(1200));

    let wallet = assert_ok!(h.engine.reconcile_wallet(h.admin.clone(), account).await);
    assert_eq!(wallet.balance, dec!(1200));

    let entries = assert_ok!(h.engine.list_ledger_entries(h.admin.clone(), account).await);
    assert_eq!(entries.len(), 11);
}
