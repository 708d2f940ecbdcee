//! End-to-end contract lifecycle through the HTTP API and the client core

use campus_market::{
    api,
    client::{
        views, ClientError, ContractWorkflow, MarketClient, MemoryTokenStore, Messenger,
        MutationOutcome, QueryCache, QueryKey, Session,
    },
    config::{ClientConfig, Config},
    domain::{
        available_actions,
        listing::{GenderRestriction, ResidenceDetails, ResidenceType, ServiceLocation},
        schedule::ScheduleStatus,
        ClientType, Contract, ContractAction, ContractStatus, NewContract, NewService,
        PaymentRequest, RegisterRequest, Role, Service, ServiceFilters, ServiceType,
        VerificationDecision, VerificationStatus,
    },
    MarketApp,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::oneshot;

const ADMIN_EMAIL: &str = "admin@campus.test";
const ADMIN_PASSWORD: &str = "admin-pass";

struct Harness {
    base_url: String,
    provider: ContractWorkflow,
    student: ContractWorkflow,
    service: Service,
    _shutdown: oneshot::Sender<()>,
}

fn client_config(base_url: &str) -> ClientConfig {
    ClientConfig {
        base_url: base_url.to_string(),
        timeout_seconds: 10,
        payment_method: "mock_card".to_string(),
    }
}

fn workflow(base_url: &str, session: Session) -> ContractWorkflow {
    let client = MarketClient::new(&client_config(base_url), session).unwrap();
    ContractWorkflow::new(Arc::new(client), Arc::new(QueryCache::default()))
}

fn register(email: &str, role: Role) -> RegisterRequest {
    RegisterRequest {
        email: email.to_string(),
        password: "password1".to_string(),
        role,
        full_name: email.split('@').next().unwrap().to_string(),
        client_type: (role == Role::Client).then_some(ClientType::Student),
        university: Some("SQU".to_string()),
        student_number: None,
        verification_document: Some("civil-id-scan".to_string()),
    }
}

async fn start(slots: u32) -> Harness {
    let mut config = Config::default();
    config.database.url = "sqlite::memory:".to_string();
    let app = MarketApp::new(config).await.unwrap();
    app.market
        .seed_admin(ADMIN_EMAIL, "Admin", ADMIN_PASSWORD)
        .await
        .unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}/api", listener.local_addr().unwrap());
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(api::serve_listener(app, listener, async move {
        let _ = shutdown_rx.await;
    }));

    let provider = workflow(&base_url, Session::in_memory());
    let student = workflow(&base_url, Session::in_memory());
    let admin = MarketClient::new(&client_config(&base_url), Session::in_memory()).unwrap();

    let provider_user = provider
        .client()
        .register(&register("salim@provider.test", Role::ServiceProvider))
        .await
        .unwrap();
    let student_user = student
        .client()
        .register(&register("amal@student.test", Role::Client))
        .await
        .unwrap();
    assert_eq!(
        student_user.profile.verification_status,
        VerificationStatus::Pending
    );

    admin.login(ADMIN_EMAIL, ADMIN_PASSWORD).await.unwrap();
    let pending = admin.pending_verifications().await.unwrap();
    assert_eq!(pending.len(), 2);
    for user in [&provider_user, &student_user] {
        admin
            .verify_user(&VerificationDecision {
                user_id: user.id.clone(),
                decision: VerificationStatus::Verified,
                rejection_reason: None,
            })
            .await
            .unwrap();
    }

    let service = provider
        .client()
        .create_service(&NewService {
            service_type: ServiceType::Residence,
            title: "Shared flat near SQU".to_string(),
            description: "Two minutes from the north gate".to_string(),
            category: "flat".to_string(),
            price_monthly: Decimal::from(100),
            capacity: slots,
            location: ServiceLocation {
                address: "Al Khoud 6".to_string(),
                city: "Muscat".to_string(),
                university_nearby: "SQU".to_string(),
                coordinates: None,
            },
            transportation: None,
            residence: Some(ResidenceDetails {
                residence_type: ResidenceType::Apartment,
                bedrooms: 2,
                bathrooms: 1,
                furnished: true,
                amenities: vec!["wifi".to_string(), "parking".to_string()],
                gender_restriction: GenderRestriction::Any,
                lease_duration_months: 12,
            }),
            auto_accept: false,
        })
        .await
        .unwrap();

    Harness {
        base_url,
        provider,
        student,
        service,
        _shutdown: shutdown_tx,
    }
}

async fn request_contract(h: &Harness, months: u32) -> Contract {
    h.student
        .client()
        .create_contract(&NewContract {
            service_id: h.service.id.clone(),
            start_date: NaiveDate::from_ymd_opt(2025, 9, 1).unwrap(),
            duration_months: months,
        })
        .await
        .unwrap()
}

fn applied(outcome: MutationOutcome) -> Contract {
    match outcome {
        MutationOutcome::Applied(contract) => contract,
        MutationOutcome::AlreadyInFlight => panic!("mutation was dropped as in flight"),
    }
}

async fn activate(h: &Harness, months: u32) -> Contract {
    let contract = request_contract(h, months).await;
    let accepted = applied(
        h.provider
            .perform(Role::ServiceProvider, &contract, ContractAction::Accept)
            .await
            .unwrap(),
    );
    applied(
        h.student
            .perform(Role::Client, &accepted, ContractAction::Confirm)
            .await
            .unwrap(),
    )
}

#[tokio::test]
async fn contract_runs_from_request_to_review() {
    let h = start(2).await;

    let contract = request_contract(&h, 3).await;
    assert_eq!(contract.status, ContractStatus::PendingProviderApproval);
    assert_eq!(contract.total_amount, Decimal::from(300));
    assert_eq!(contract.payment_schedule.len(), 3);
    assert_eq!(
        contract.total_amount,
        contract.monthly_amount * Decimal::from(contract.duration_months)
    );
    assert!(!available_actions(Role::Client, &contract).contains(&ContractAction::Confirm));

    let accepted = applied(
        h.provider
            .perform(Role::ServiceProvider, &contract, ContractAction::Accept)
            .await
            .unwrap(),
    );
    assert_eq!(accepted.status, ContractStatus::AwaitingClientConfirmation);
    assert!(accepted.provider_signature.signed);

    let active = applied(
        h.student
            .perform(Role::Client, &accepted, ContractAction::Confirm)
            .await
            .unwrap(),
    );
    assert_eq!(active.status, ContractStatus::Active);
    assert!(active.client_signature.signed);
    assert_eq!(
        h.student.client().get_service(&h.service.id).await.unwrap().available_slots,
        1
    );

    let paid = applied(
        h.student
            .perform(Role::Client, &active, ContractAction::Pay)
            .await
            .unwrap(),
    );
    assert_eq!(paid.payment_schedule[0].status, ScheduleStatus::Paid);
    assert!(paid.payment_schedule[0].transaction_id.is_some());
    assert_eq!(paid.paid_installments(), 1);

    let payments = h.provider.client().contract_payments(&contract.id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].amount, Decimal::from(100));
    assert_eq!(payments[0].platform_fee, Decimal::from(10));
    assert_eq!(payments[0].provider_amount, Decimal::from(90));

    let earnings = h.provider.client().provider_earnings().await.unwrap();
    assert_eq!(earnings.total_earnings, Decimal::from(90));
    assert_eq!(earnings.total_platform_fees, Decimal::from(10));

    let completed = applied(
        h.student
            .perform(Role::Client, &paid, ContractAction::Complete)
            .await
            .unwrap(),
    );
    assert_eq!(completed.status, ContractStatus::Completed);
    assert_eq!(
        available_actions(Role::Client, &completed),
        vec![ContractAction::Review]
    );

    h.student
        .review(&completed, 5, 5, "Spotless and quiet")
        .await
        .unwrap();
    let reviews = h.student.client().service_reviews(&h.service.id).await.unwrap();
    assert_eq!(reviews.len(), 1);
    assert!(reviews[0].verified_booking);
}

#[tokio::test]
async fn rejected_contract_offers_nothing() {
    let h = start(2).await;
    let contract = request_contract(&h, 2).await;

    let rejected = applied(
        h.provider
            .perform(Role::ServiceProvider, &contract, ContractAction::Reject)
            .await
            .unwrap(),
    );
    assert_eq!(rejected.status, ContractStatus::Rejected);
    assert!(available_actions(Role::Client, &rejected).is_empty());
    assert!(available_actions(Role::ServiceProvider, &rejected).is_empty());

    let err = h
        .student
        .perform(Role::Client, &rejected, ContractAction::Cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));

    // the backend refuses the same transition on its own
    let err = h.student.client().cancel(&rejected.id).await.unwrap_err();
    assert_eq!(err.status(), Some(409));
}

#[tokio::test]
async fn cancelled_contract_takes_no_payments() {
    let h = start(1).await;
    let active = activate(&h, 2).await;

    let cancelled = applied(
        h.student
            .perform(Role::Client, &active, ContractAction::Cancel)
            .await
            .unwrap(),
    );
    assert_eq!(cancelled.status, ContractStatus::Cancelled);
    assert!(!available_actions(Role::Client, &cancelled).contains(&ContractAction::Pay));
    assert_eq!(
        h.student.client().get_service(&h.service.id).await.unwrap().available_slots,
        1
    );

    let err = h
        .student
        .client()
        .make_payment(&PaymentRequest {
            contract_id: cancelled.id.clone(),
            amount: Decimal::from(100),
            payment_method: "mock_card".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert!(err.user_message("Payment failed").contains("active"));
}

#[tokio::test]
async fn second_tap_while_in_flight_sends_nothing() {
    let h = start(2).await;
    let contract = request_contract(&h, 2).await;

    let (first, second) = tokio::join!(
        h.provider
            .perform(Role::ServiceProvider, &contract, ContractAction::Accept),
        h.provider
            .perform(Role::ServiceProvider, &contract, ContractAction::Accept),
    );
    let first = first.unwrap();
    assert_eq!(second.unwrap(), MutationOutcome::AlreadyInFlight);
    assert_eq!(applied(first).status, ContractStatus::AwaitingClientConfirmation);
    assert!(!h.provider.is_busy(&contract.id));
}

#[tokio::test]
async fn racing_parties_resolve_on_the_backend() {
    let h = start(2).await;
    let contract = request_contract(&h, 2).await;

    // a second device of the same provider
    let other_device = MarketClient::new(&client_config(&h.base_url), Session::in_memory()).unwrap();
    other_device
        .login("salim@provider.test", "password1")
        .await
        .unwrap();

    let (accept, reject) = tokio::join!(
        h.provider.client().provider_accept(&contract.id),
        other_device.provider_reject(&contract.id),
    );
    assert!(accept.is_ok() != reject.is_ok());
    let loser = accept.err().or(reject.err()).unwrap();
    assert_eq!(loser.status(), Some(409));

    let settled = h.student.client().get_contract(&contract.id).await.unwrap();
    assert!(matches!(
        settled.status,
        ContractStatus::AwaitingClientConfirmation | ContractStatus::Rejected
    ));
}

#[tokio::test]
async fn mutations_invalidate_cached_lists() {
    let h = start(2).await;
    let contract = request_contract(&h, 2).await;

    let before = views::contract_cards(h.provider.client(), h.provider.cache(), Role::ServiceProvider)
        .await
        .unwrap();
    assert_eq!(before.len(), 1);
    assert_eq!(before[0].status, ContractStatus::PendingProviderApproval);
    assert!(h.provider.cache().contains(&QueryKey::ProviderContracts).await);

    let mut events = h.provider.cache().bus().subscribe();
    h.provider
        .perform(Role::ServiceProvider, &contract, ContractAction::Accept)
        .await
        .unwrap();
    assert!(!h.provider.cache().contains(&QueryKey::ProviderContracts).await);
    assert!(events.recv().await.is_ok());

    let after = views::contract_cards(h.provider.client(), h.provider.cache(), Role::ServiceProvider)
        .await
        .unwrap();
    assert_eq!(after[0].status, ContractStatus::AwaitingClientConfirmation);
    assert!(after[0].actions.contains(&ContractAction::Cancel));
}

#[tokio::test]
async fn stale_token_is_dropped_on_hydrate() {
    let h = start(1).await;

    let session = Session::new(Arc::new(MemoryTokenStore::with_token("not-a-real-token")));
    let client = MarketClient::new(&client_config(&h.base_url), session.clone()).unwrap();
    assert_eq!(client.hydrate().await.unwrap(), None);
    assert!(session.persisted_token().is_none());

    let err = client.me().await.unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized { .. }));

    // a real token survives a restart
    let token = h.student.client().session().token().unwrap();
    let session = Session::new(Arc::new(MemoryTokenStore::with_token(token)));
    let client = MarketClient::new(&client_config(&h.base_url), session.clone()).unwrap();
    let user = client.hydrate().await.unwrap().unwrap();
    assert_eq!(user.email, "amal@student.test");
    assert_eq!(session.user().map(|u| u.role), Some(Role::Client));
}

#[tokio::test]
async fn listings_search_and_logout() {
    let h = start(1).await;

    let found = h
        .student
        .client()
        .search_services(&ServiceFilters {
            city: Some("muscat".to_string()),
            max_price: Some(Decimal::from(150)),
            limit: 20,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].provider_name, "salim");

    let none = h
        .student
        .client()
        .search_services(&ServiceFilters {
            max_price: Some(Decimal::from(50)),
            limit: 20,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(none.is_empty());

    h.student.client().logout().await.unwrap();
    assert!(h.student.client().session().current().is_none());
    let err = h.student.client().client_contracts().await.unwrap_err();
    assert!(matches!(err, ClientError::Unauthorized { .. }));
}

fn messenger(base_url: &str, workflow: &ContractWorkflow) -> Messenger {
    let session = workflow.client().session().clone();
    let client = MarketClient::new(&client_config(base_url), session).unwrap();
    Messenger::new(Arc::new(client), Arc::new(QueryCache::default()))
}

#[tokio::test]
async fn parties_message_about_a_contract() {
    let h = start(1).await;
    let contract = request_contract(&h, 1).await;
    let student = messenger(&h.base_url, &h.student);
    let provider = messenger(&h.base_url, &h.provider);

    let conversation = student
        .start(&contract.provider_id, Some(&contract.id))
        .await
        .unwrap();
    student
        .send(&conversation.id, "Can I move in a week early?")
        .await
        .unwrap();

    let inbox = provider.conversations().await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].id, conversation.id);
    assert_eq!(inbox[0].unread_count, 1);
    assert_eq!(
        inbox[0].last_message.as_deref(),
        Some("Can I move in a week early?")
    );

    let thread = provider.thread(&conversation.id).await.unwrap();
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].sender_name, "amal");
    assert_eq!(provider.conversations().await.unwrap()[0].unread_count, 0);

    provider.send(&conversation.id, "Yes, from the 25th").await.unwrap();
    let thread = student.thread(&conversation.id).await.unwrap();
    assert_eq!(thread.len(), 2);
    assert_eq!(thread[1].content, "Yes, from the 25th");

    // the same pair reopens the same conversation
    let again = provider.start(&contract.client_id, None).await.unwrap();
    assert_eq!(again.id, conversation.id);

    let outsider = MarketClient::new(&client_config(&h.base_url), Session::in_memory()).unwrap();
    outsider
        .register(&register("huda@student.test", Role::Client))
        .await
        .unwrap();
    let err = outsider
        .messages(&conversation.id, Default::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NotFound(_)));
}
