use std::sync::Arc;

use chrono::Utc;
use common::{CarServiceId, Money, UserCarId, UserId, WorkshopId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    CarService, GatewayEvent, GatewayStatus, NewOrder, PaymentMethodDraft, PaymentMethodType,
    PaymentReusability, Role, User, UserCar, Workshop,
};
use payments::{
    CheckoutService, InMemoryPaymentGateway, PaymentFlow, RedirectUrls, WebhookProcessor,
};
use store::{InMemoryStore, Store};

struct Fixture {
    checkout: CheckoutService<InMemoryStore>,
    webhooks: WebhookProcessor<InMemoryStore>,
    user_id: UserId,
    order: NewOrder,
}

async fn fixture() -> Fixture {
    let store = InMemoryStore::new();
    let user = User {
        id: UserId::new(),
        username: "bench".to_string(),
        email: "bench@example.com".to_string(),
        phone_number: Some("+6281200000000".to_string()),
        role: Role::User,
        created_at: Utc::now(),
    };
    let workshop = Workshop {
        id: WorkshopId::new(),
        name: "Bench Workshop".to_string(),
        address: "Jl. Benchmark 1".to_string(),
    };
    let car = UserCar {
        id: UserCarId::new(),
        user_id: user.id,
        plate_number: "B 1 BEN".to_string(),
    };
    let services: Vec<CarService> = (0..3)
        .map(|i| CarService {
            id: CarServiceId::new(),
            name: format!("Service {i}"),
            price: Money::from_rupiah(100_000 * (i + 1)),
        })
        .collect();

    store.insert_user(user.clone()).await;
    store.insert_workshop(workshop.clone()).await;
    store.insert_user_car(car.clone()).await;
    for service in &services {
        store.insert_car_service(service.clone()).await;
    }
    let method = store
        .create_payment_method(PaymentMethodDraft {
            name: "QRIS".to_string(),
            method_type: PaymentMethodType::QrCode,
            reusability: PaymentReusability::OneTimeUse,
            fee: Money::from_rupiah(1_000),
            description: None,
            logo_url: None,
            is_active: true,
            e_wallet_payment_config: None,
            virtual_account_config: None,
        })
        .await
        .unwrap();

    Fixture {
        checkout: CheckoutService::new(
            store.clone(),
            Arc::new(InMemoryPaymentGateway::new()),
            RedirectUrls {
                success: "https://bench.example/ok".to_string(),
                failure: "https://bench.example/fail".to_string(),
            },
        ),
        webhooks: WebhookProcessor::new(store),
        user_id: user.id,
        order: NewOrder {
            user_car_id: car.id,
            workshop_id: workshop.id,
            payment_method_id: method.id,
            note: None,
            car_services: services.iter().map(|s| s.id).collect(),
        },
    }
}

fn bench_invoice_checkout(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let f = rt.block_on(fixture());

    c.bench_function("payments/invoice_checkout", |b| {
        b.iter(|| {
            rt.block_on(async {
                f.checkout
                    .create_order(f.user_id, f.order.clone(), PaymentFlow::Invoice)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_checkout_and_settle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let f = rt.block_on(fixture());

    c.bench_function("payments/checkout_and_paid_webhook", |b| {
        b.iter(|| {
            rt.block_on(async {
                let details = f
                    .checkout
                    .create_order(f.user_id, f.order.clone(), PaymentFlow::Invoice)
                    .await
                    .unwrap();
                f.webhooks
                    .apply(GatewayEvent {
                        reference: details.transaction.id.to_string(),
                        status: GatewayStatus::Paid,
                        paid_at: Some(Utc::now()),
                    })
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_invoice_checkout, bench_checkout_and_settle);
criterion_main!(benches);
