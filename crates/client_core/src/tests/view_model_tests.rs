use std::time::Duration;

use shared::domain::NewUser;

use super::*;
use crate::{
    realtime::memory::MemoryRealtimeStore,
    test_support::{alice, eventually, spawn_backend, unreachable_url, BackendMode},
};

fn view_with(base_url: String) -> (ViewModel, Arc<MemoryRealtimeStore>) {
    let store = Arc::new(MemoryRealtimeStore::new());
    let view = ViewModel::new(RestClient::new(base_url), store.clone());
    (view, store)
}

fn bob() -> NewUser {
    NewUser {
        name: "Bob".into(),
        email: "b@x.com".into(),
        domain: Domain::BShop,
    }
}

fn drain_notices(events: &mut broadcast::Receiver<ViewEvent>) -> Vec<Notice> {
    let mut notices = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ViewEvent::Notice(notice) = event {
            notices.push(notice);
        }
    }
    notices
}

#[tokio::test]
async fn starts_loading_on_default_domain() {
    let (view, _store) = view_with(unreachable_url().await);
    let state = view.snapshot();
    assert_eq!(state.domain, Domain::AShop);
    assert!(state.rest_loading);
    assert!(state.realtime_loading);
    assert!(state.rest_users.is_empty());
    assert!(state.realtime_users.is_empty());
}

#[tokio::test]
async fn submitted_user_appears_in_both_lists() {
    let (base_url, backend) = spawn_backend().await;
    let (view, _store) = view_with(base_url);
    let mut events = view.subscribe_events();

    view.start().await;
    eventually(|| !view.snapshot().realtime_loading).await;

    view.set_name("Alice");
    view.set_email("a@x.com");
    let report = view.submit().await.expect("submit");
    assert!(!report.is_diverged());

    let state = view.snapshot();
    assert!(state.form.name.is_empty());
    assert!(state.form.email.is_empty());
    assert!(!state.rest_loading);
    assert_eq!(state.rest_users.len(), 1);
    assert_eq!(state.rest_users[0].name, "Alice");
    assert_eq!(backend.hits(), (2, 1));

    eventually(|| view.snapshot().realtime_users.len() == 1).await;
    let realtime = view.snapshot().realtime_users;
    assert_eq!(realtime[0].email, "a@x.com");
    assert_ne!(realtime[0].id, state.rest_users[0].id);

    let notices = drain_notices(&mut events);
    assert_eq!(
        notices,
        vec![Notice::new(NoticeKind::Success, "User added successfully!")]
    );
}

#[tokio::test]
async fn blank_submission_only_notifies() {
    let (base_url, backend) = spawn_backend().await;
    let (view, store) = view_with(base_url);
    let mut events = view.subscribe_events();

    view.set_name("Alice");
    let err = view.submit().await.expect_err("missing email");

    assert!(matches!(err, SubmitError::Validation(_)));
    assert_eq!(view.snapshot().form.name, "Alice");
    assert_eq!(backend.hits(), (0, 0));
    assert_eq!(store.insert_attempts(), 0);
    let notices = drain_notices(&mut events);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::Validation);
}

#[tokio::test]
async fn rest_outage_keeps_fields_and_skips_realtime() {
    let (base_url, backend) = spawn_backend().await;
    let (view, store) = view_with(base_url);
    view.start().await;
    backend.set_mode(BackendMode::Failing);
    let mut events = view.subscribe_events();

    view.set_name("Alice");
    view.set_email("a@x.com");
    view.submit().await.expect_err("backend down");

    let state = view.snapshot();
    assert_eq!(state.form.name, "Alice");
    assert_eq!(state.form.email, "a@x.com");
    assert_eq!(store.insert_attempts(), 0);
    assert!(store.documents().is_empty());
    let notices = drain_notices(&mut events);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::Rest);
    assert_eq!(notices[0].message, "failed to add user: database unavailable");
}

#[tokio::test]
async fn realtime_write_failure_is_surfaced_as_divergence() {
    let (base_url, _backend) = spawn_backend().await;
    let (view, store) = view_with(base_url);
    view.start().await;
    store.fail_inserts(true);
    let mut events = view.subscribe_events();

    view.set_name("Alice");
    view.set_email("a@x.com");
    let report = view.submit().await.expect("rest write succeeded");

    assert!(report.is_diverged());
    let state = view.snapshot();
    assert!(state.form.name.is_empty());
    assert_eq!(state.rest_users.len(), 1);
    assert!(state.realtime_users.is_empty());
    let notices = drain_notices(&mut events);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::Diverged);
}

#[tokio::test]
async fn failed_fetch_empties_rest_list() {
    let (base_url, backend) = spawn_backend().await;
    backend.seed(alice());
    let (view, _store) = view_with(base_url);
    view.start().await;
    assert_eq!(view.snapshot().rest_users.len(), 1);

    backend.set_mode(BackendMode::BadGateway);
    let mut events = view.subscribe_events();
    view.refresh_rest().await;

    let state = view.snapshot();
    assert!(state.rest_users.is_empty());
    assert!(!state.rest_loading);
    let notices = drain_notices(&mut events);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::Rest);
    assert!(notices[0].message.starts_with("Failed to load users: "));
}

#[tokio::test]
async fn realtime_failure_empties_realtime_list() {
    let (base_url, _backend) = spawn_backend().await;
    let (view, store) = view_with(base_url);
    store.insert_user(&alice()).await.expect("insert");

    view.start().await;
    eventually(|| view.snapshot().realtime_users.len() == 1).await;

    store.disconnect("permission denied");
    eventually(|| {
        let state = view.snapshot();
        state.realtime_users.is_empty() && !state.realtime_loading
    })
    .await;
    assert_eq!(view.snapshot().domain, Domain::AShop);
}

#[tokio::test]
async fn filter_change_swaps_both_lists() {
    let (base_url, backend) = spawn_backend().await;
    backend.seed(alice());
    backend.seed(bob());
    let (view, store) = view_with(base_url);
    store.insert_user(&alice()).await.expect("insert");
    store.insert_user(&bob()).await.expect("insert");

    view.start().await;
    eventually(|| view.snapshot().realtime_users.len() == 1).await;
    assert_eq!(view.snapshot().rest_users[0].name, "Alice");

    view.set_domain(Domain::BShop).await;
    assert_eq!(view.active_subscription(), Some(Domain::BShop));
    eventually(|| {
        let state = view.snapshot();
        state.realtime_users.len() == 1 && state.realtime_users[0].name == "Bob"
    })
    .await;
    let state = view.snapshot();
    assert_eq!(state.rest_users.len(), 1);
    assert_eq!(state.rest_users[0].name, "Bob");
    eventually(|| store.active_listeners() == 1).await;
}

#[tokio::test]
async fn rapid_toggling_settles_on_last_filter() {
    let (base_url, backend) = spawn_backend().await;
    backend.seed(alice());
    backend.seed(bob());
    backend.with(|state| {
        state.slow_domain = Some((Domain::AShop, Duration::from_millis(300)));
    });
    let (view, store) = view_with(base_url);
    store.insert_user(&alice()).await.expect("insert");
    store.insert_user(&bob()).await.expect("insert");

    tokio::join!(view.set_domain(Domain::AShop), async {
        tokio::time::sleep(Duration::from_millis(30)).await;
        view.set_domain(Domain::BShop).await;
    });

    let state = view.snapshot();
    assert_eq!(state.domain, Domain::BShop);
    assert!(!state.rest_loading);
    assert_eq!(state.rest_users.len(), 1);
    assert_eq!(state.rest_users[0].domain, Domain::BShop);
    assert_eq!(view.active_subscription(), Some(Domain::BShop));
    eventually(|| store.active_listeners() == 1).await;
    eventually(|| {
        let users = view.snapshot().realtime_users;
        users.len() == 1 && users.iter().all(|user| user.domain == Domain::BShop)
    })
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let state = view.snapshot();
    assert!(!state.realtime_loading);
    assert_eq!(state.realtime_users.len(), 1);
    assert_eq!(state.realtime_users[0].name, "Bob");
}

#[tokio::test]
async fn hung_fetch_only_holds_rest_flag() {
    let (base_url, backend) = spawn_backend().await;
    backend.seed(alice());
    backend.seed(bob());
    backend.with(|state| {
        state.slow_domain = Some((Domain::BShop, Duration::from_secs(3600)));
    });
    let (view, store) = view_with(base_url);
    store.insert_user(&bob()).await.expect("insert");
    let view = Arc::new(view);

    view.select_domain(Domain::BShop);
    let pending = tokio::spawn({
        let view = Arc::clone(&view);
        async move { view.refresh_rest().await }
    });
    eventually(|| backend.hits().0 == 1).await;

    view.set_name("Ada");
    eventually(|| view.snapshot().realtime_users.len() == 1).await;
    let state = view.snapshot();
    assert!(state.rest_loading);
    assert_eq!(state.form.name, "Ada");
    assert_eq!(state.realtime_users[0].name, "Bob");

    view.set_domain(Domain::AShop).await;
    let state = view.snapshot();
    assert_eq!(state.domain, Domain::AShop);
    assert!(!state.rest_loading);
    assert_eq!(state.rest_users.len(), 1);
    assert_eq!(state.rest_users[0].name, "Alice");
    assert!(!pending.is_finished());
    pending.abort();
}

#[tokio::test]
async fn shutdown_releases_subscription() {
    let (base_url, _backend) = spawn_backend().await;
    let (view, store) = view_with(base_url);
    view.start().await;
    eventually(|| store.active_listeners() == 1).await;

    view.shutdown();
    assert_eq!(view.active_subscription(), None);
    eventually(|| store.active_listeners() == 0).await;
}
