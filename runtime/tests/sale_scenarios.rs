//! End-to-end scenarios driven through the balancer.
//!
//! Every test launches a full system (servers, estimator, coordinator) and
//! talks to it the way a transport would, through `RequestHandler::handle`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use chrono::Duration as ChronoDuration;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use ticket_sale_core::{Config, CustomerId, Method, RequestHandler, RequestKind, Response, SaleError, ServerId};
use ticket_sale_runtime::{Balancer, launch, launch_with_clock};
use ticket_sale_testing::{CustomerSession, ManualClock, RecordingRequest, init_tracing};

// ============================================================================
// Test Fixtures
// ============================================================================

fn config(tickets: u32, servers: usize) -> Config {
    Config::default()
        .with_tickets(tickets)
        .with_initial_servers(servers)
        .with_estimator_interval(Duration::from_millis(10))
}

/// Poll `check` until it holds or five seconds pass.
async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {what}");
}

async fn available_at(balancer: &Balancer, server: ServerId) -> Response {
    let (request, pending) = RecordingRequest::get(RequestKind::NumAvailableTickets, CustomerId::new())
        .with_server(server)
        .into_parts();
    balancer.handle(request);
    pending.wait().await.expect("request answered").response
}

fn ticket(response: &Response) -> u64 {
    response
        .as_int()
        .unwrap_or_else(|| panic!("expected a ticket id, got {response:?}"))
}

// ============================================================================
// Reservation lifecycle
// ============================================================================

#[tokio::test]
async fn three_tickets_one_server() {
    init_tracing();
    let balancer = launch(config(3, 1)).unwrap();

    let mut customers: Vec<_> = (0..3).map(|_| CustomerSession::new(&balancer)).collect();
    let mut tickets = Vec::new();
    for customer in &mut customers {
        tickets.push(ticket(&customer.reserve().await));
    }
    let distinct: HashSet<u64> = tickets.iter().copied().collect();
    assert_eq!(distinct.len(), 3);

    let mut late = CustomerSession::new(&balancer);
    assert_eq!(late.reserve().await, Response::SoldOut);

    assert_eq!(customers[0].buy(tickets[0]).await, Response::Int(tickets[0]));
    assert_eq!(balancer.coordinator().database().num_sold(), 1);
    let server = customers[2].server().expect("customer was assigned a server");
    let system = &balancer;
    eventually("availability to reach zero", move || async move {
        available_at(system, server).await == Response::Int(0)
    })
    .await;

    assert_eq!(customers[1].abort(tickets[1]).await, Response::Int(tickets[1]));
    eventually("aborted ticket to become available", move || async move {
        available_at(system, server).await == Response::Int(1)
    })
    .await;

    let mut newcomer = CustomerSession::new(&balancer);
    assert_eq!(newcomer.reserve().await, Response::Int(tickets[1]));

    let audit = balancer.coordinator().audit().await;
    assert!(audit.is_conserved());
    assert_eq!(audit.sold, 1);
    assert_eq!(audit.reservations(), 2);
}

#[tokio::test]
async fn second_reservation_is_refused() {
    let balancer = launch(config(10, 2)).unwrap();
    let mut customer = CustomerSession::new(&balancer);

    let first = ticket(&customer.reserve().await);
    assert_eq!(customer.reserve().await, Response::from(SaleError::AlreadyReserved));

    assert_eq!(customer.abort(first).await, Response::Int(first));
    assert!(customer.reserve().await.as_int().is_some());
}

#[tokio::test]
async fn reserve_then_abort_frees_the_ticket_for_anyone() {
    let balancer = launch(config(1, 1)).unwrap();
    let mut alice = CustomerSession::new(&balancer);
    let mut bob = CustomerSession::new(&balancer);

    let id = ticket(&alice.reserve().await);
    assert_eq!(bob.reserve().await, Response::SoldOut);
    alice.abort(id).await;
    assert_eq!(bob.reserve().await, Response::Int(id));
}

#[tokio::test]
async fn buy_and_abort_need_the_right_ticket() {
    let balancer = launch(config(5, 1)).unwrap();
    let mut customer = CustomerSession::new(&balancer);

    assert_eq!(customer.buy(0).await, Response::from(SaleError::NoActiveReservation));

    let id = ticket(&customer.reserve().await);
    let missing = customer.send(Method::Post, RequestKind::BuyTicket, None).await;
    assert_eq!(missing, Response::from(SaleError::MissingTicketArgument));
    assert_eq!(customer.abort(id + 1).await, Response::from(SaleError::TicketArgumentMismatch));
    assert_eq!(customer.buy(id).await, Response::Int(id));
    assert_eq!(customer.buy(id).await, Response::from(SaleError::NoActiveReservation));
}

#[tokio::test]
async fn expired_reservation_is_released() {
    let clock = ManualClock::default();
    let balancer = launch_with_clock(config(1, 1).with_timeout(10), Arc::new(clock.clone())).unwrap();
    let mut holder = CustomerSession::new(&balancer);
    let mut other = CustomerSession::new(&balancer);

    let id = ticket(&holder.reserve().await);
    assert_eq!(other.reserve().await, Response::SoldOut);

    clock.advance(ChronoDuration::seconds(11));

    assert_eq!(holder.buy(id).await, Response::from(SaleError::NoActiveReservation));
    assert_eq!(holder.abort(id).await, Response::from(SaleError::NoActiveReservation));
    assert_eq!(other.reserve().await, Response::Int(id));
}

#[tokio::test]
async fn reservation_at_the_timeout_is_still_valid() {
    let clock = ManualClock::default();
    let balancer = launch_with_clock(config(1, 1).with_timeout(10), Arc::new(clock.clone())).unwrap();
    let mut holder = CustomerSession::new(&balancer);

    let id = ticket(&holder.reserve().await);
    clock.advance(ChronoDuration::seconds(10));
    assert_eq!(holder.buy(id).await, Response::Int(id));
}

// ============================================================================
// Estimation
// ============================================================================

#[tokio::test]
async fn estimates_converge_across_servers() {
    let balancer = launch(config(100, 2).with_allocation_batch(10)).unwrap();
    let mut customer = CustomerSession::new(&balancer);
    customer.reserve().await;

    // One ticket reserved, nine cached on one server, ninety pooled.
    let system = &balancer;
    for server in balancer.coordinator().active_server_ids() {
        eventually("estimate to converge", move || async move {
            available_at(system, server).await == Response::Int(99)
        })
        .await;
    }
}

// ============================================================================
// Conservation under load
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn tickets_are_conserved_under_concurrent_customers() {
    let balancer = Arc::new(launch(config(200, 4).with_allocation_batch(7)).unwrap());

    let tasks: Vec<_> = (0..16)
        .map(|worker| {
            let balancer = Arc::clone(&balancer);
            tokio::spawn(async move {
                let mut session = CustomerSession::new(balancer.as_ref());
                for round in 0..20 {
                    let Some(id) = session.reserve().await.as_int() else {
                        continue;
                    };
                    if (worker + round) % 3 == 0 {
                        session.buy(id).await;
                    } else {
                        session.abort(id).await;
                    }
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let audit = balancer.coordinator().audit().await;
    assert!(audit.is_conserved(), "audit: {audit:?}");
    assert_eq!(audit.reservations(), 0);
    assert_eq!(audit.sold, balancer.coordinator().database().num_sold());
}
