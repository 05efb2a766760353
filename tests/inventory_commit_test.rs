mod common;

use common::TestApp;
use rust_decimal_macros::dec;
use storefront_api::errors::ServiceError;
use storefront_api::services::inventory::ReservationLine;
use uuid::Uuid;

#[tokio::test]
async fn commit_decrements_every_line_exactly_once() {
    let app = TestApp::new().await;
    let shirts = app.seed_product("Shirt", "clothing", dec!(25), 10).await;
    let jeans = app.seed_product("Jeans", "clothing", dec!(60), 4).await;

    app.state
        .services
        .inventory
        .commit_reservation(
            Uuid::new_v4(),
            &[
                ReservationLine {
                    product_id: shirts.id,
                    quantity: 3,
                },
                ReservationLine {
                    product_id: jeans.id,
                    quantity: 1,
                },
            ],
        )
        .await
        .unwrap();

    assert_eq!(app.product_stock(shirts.id).await, 7);
    assert_eq!(app.product_stock(jeans.id).await, 3);
}

#[tokio::test]
async fn failed_line_rolls_back_the_whole_commit() {
    let app = TestApp::new().await;
    let plenty = app.seed_product("Notebook", "office", dec!(8), 20).await;
    let scarce = app.seed_product("Limited Print", "art", dec!(200), 1).await;

    let result = app
        .state
        .services
        .inventory
        .commit_reservation(
            Uuid::new_v4(),
            &[
                ReservationLine {
                    product_id: plenty.id,
                    quantity: 5,
                },
                ReservationLine {
                    product_id: scarce.id,
                    quantity: 2,
                },
            ],
        )
        .await;

    assert!(matches!(result, Err(ServiceError::InsufficientStock(_))));
    // The first line's decrement did not survive the abort.
    assert_eq!(app.product_stock(plenty.id).await, 20);
    assert_eq!(app.product_stock(scarce.id).await, 1);
}

#[tokio::test]
async fn unknown_product_fails_the_commit() {
    let app = TestApp::new().await;
    let known = app.seed_product("Pencil", "office", dec!(2), 10).await;

    let result = app
        .state
        .services
        .inventory
        .commit_reservation(
            Uuid::new_v4(),
            &[
                ReservationLine {
                    product_id: known.id,
                    quantity: 1,
                },
                ReservationLine {
                    product_id: Uuid::new_v4(),
                    quantity: 1,
                },
            ],
        )
        .await;

    assert!(matches!(result, Err(ServiceError::NotFound(_))));
    assert_eq!(app.product_stock(known.id).await, 10);
}

#[tokio::test]
async fn invalid_quantities_are_rejected() {
    let app = TestApp::new().await;
    let product = app.seed_product("Eraser", "office", dec!(1), 10).await;

    let zero = app
        .state
        .services
        .inventory
        .commit_reservation(
            Uuid::new_v4(),
            &[ReservationLine {
                product_id: product.id,
                quantity: 0,
            }],
        )
        .await;
    assert!(matches!(zero, Err(ServiceError::InvalidOperation(_))));

    let empty = app
        .state
        .services
        .inventory
        .commit_reservation(Uuid::new_v4(), &[])
        .await;
    assert!(matches!(empty, Err(ServiceError::InvalidOperation(_))));

    assert_eq!(app.product_stock(product.id).await, 10);
}

#[tokio::test]
async fn concurrent_commits_never_oversell() {
    let app = TestApp::new().await;
    let product = app.seed_product("Ticket", "events", dec!(30), 10).await;

    // 20 orders race for 10 units; the conditional decrement admits 10.
    let mut tasks = vec![];
    for _ in 0..20 {
        let inventory = app.state.services.inventory.clone();
        let product_id = product.id;
        tasks.push(tokio::spawn(async move {
            inventory
                .commit_reservation(
                    Uuid::new_v4(),
                    &[ReservationLine {
                        product_id,
                        quantity: 1,
                    }],
                )
                .await
                .is_ok()
        }));
    }

    let mut successes = 0;
    for task in tasks {
        if task.await.unwrap() {
            successes += 1;
        }
    }

    assert_eq!(
        successes, 10,
        "exactly 10 commits should succeed; got {}",
        successes
    );
    assert_eq!(app.product_stock(product.id).await, 0);
}
