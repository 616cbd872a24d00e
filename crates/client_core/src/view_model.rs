use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use shared::domain::{Domain, UserForm, UserRecord, ValidationError};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::{
    coordinator::{DualWriteCoordinator, RealtimeWrite, SubmitError, SubmitReport},
    realtime::RealtimeStore,
    rest::RestClient,
    subscription::SubscriptionManager,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Validation,
    Rest,
    Diverged,
}

/// User-visible message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ViewEvent {
    StateChanged,
    Notice(Notice),
}

#[derive(Debug, Clone)]
pub struct ViewState {
    pub domain: Domain,
    pub form: UserForm,
    pub rest_users: Vec<UserRecord>,
    pub realtime_users: Vec<UserRecord>,
    pub rest_loading: bool,
    pub realtime_loading: bool,
    rest_generation: u64,
    realtime_generation: u64,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            domain: Domain::default(),
            form: UserForm::default(),
            rest_users: Vec::new(),
            realtime_users: Vec::new(),
            rest_loading: true,
            realtime_loading: true,
            rest_generation: 0,
            realtime_generation: 0,
        }
    }
}

/// UI state for the user directory: the active filter, the form and two
/// independently sourced user lists.
///
/// The lists never share identifiers or ordering. Results from a fetch or
/// subscription that was superseded by a later filter change are dropped.
pub struct ViewModel {
    rest: RestClient,
    coordinator: DualWriteCoordinator,
    subscriptions: SubscriptionManager,
    state: Arc<Mutex<ViewState>>,
    events: broadcast::Sender<ViewEvent>,
}

fn lock(state: &Mutex<ViewState>) -> MutexGuard<'_, ViewState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ViewModel {
    pub fn new(rest: RestClient, realtime: Arc<dyn RealtimeStore>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            coordinator: DualWriteCoordinator::new(rest.clone(), Arc::clone(&realtime)),
            subscriptions: SubscriptionManager::new(realtime),
            rest,
            state: Arc::new(Mutex::new(ViewState::default())),
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ViewEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> ViewState {
        lock(&self.state).clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        lock(&self.state).form.name = name.into();
        self.emit(ViewEvent::StateChanged);
    }

    pub fn set_email(&self, email: impl Into<String>) {
        lock(&self.state).form.email = email.into();
        self.emit(ViewEvent::StateChanged);
    }

    /// Loads both lists for the current filter.
    pub async fn start(&self) {
        let domain = lock(&self.state).domain;
        self.set_domain(domain).await;
    }

    /// Switches the filter: the realtime subscription is replaced right away,
    /// then the REST list is re-fetched.
    pub async fn set_domain(&self, domain: Domain) {
        self.select_domain(domain);
        self.refresh_rest().await;
    }

    /// Synchronous half of [`ViewModel::set_domain`]. Swaps the filter, clears
    /// both lists, replaces the realtime subscription and marks the REST list
    /// loading. Any REST fetch still in flight is discarded when it lands;
    /// follow with [`ViewModel::refresh_rest`].
    pub fn select_domain(&self, domain: Domain) {
        {
            let mut state = lock(&self.state);
            state.domain = domain;
            state.rest_users.clear();
            state.realtime_users.clear();
            state.rest_generation += 1;
            state.rest_loading = true;
        }
        info!(%domain, "view: filter changed");
        self.restart_realtime(domain);
    }

    pub async fn refresh_rest(&self) {
        let (domain, generation) = {
            let mut state = lock(&self.state);
            state.rest_generation += 1;
            state.rest_loading = true;
            (state.domain, state.rest_generation)
        };
        self.emit(ViewEvent::StateChanged);

        let result = self.rest.fetch_users(domain).await;

        let notice = {
            let mut state = lock(&self.state);
            if state.rest_generation != generation {
                return;
            }
            state.rest_loading = false;
            match result {
                Ok(users) => {
                    state.rest_users = users;
                    None
                }
                Err(err) => {
                    warn!(%domain, error = %err, "view: REST fetch failed");
                    state.rest_users.clear();
                    Some(Notice::new(
                        NoticeKind::Rest,
                        format!("Failed to load users: {err}"),
                    ))
                }
            }
        };
        self.emit(ViewEvent::StateChanged);
        if let Some(notice) = notice {
            self.emit(ViewEvent::Notice(notice));
        }
    }

    /// Writes the form to both stores. Fields are cleared and the REST list
    /// re-fetched only when the REST write succeeded.
    pub async fn submit(&self) -> Result<SubmitReport, SubmitError> {
        let (form, domain) = self.pending_submission();
        self.submit_form(form, domain).await
    }

    /// Current form contents and filter, as [`ViewModel::submit`] would send
    /// them.
    pub fn pending_submission(&self) -> (UserForm, Domain) {
        let state = lock(&self.state);
        (state.form.clone(), state.domain)
    }

    /// [`ViewModel::submit`] with values captured earlier, so a submission
    /// running as a background task is not affected by later edits.
    pub async fn submit_form(
        &self,
        form: UserForm,
        domain: Domain,
    ) -> Result<SubmitReport, SubmitError> {
        match self.coordinator.submit(&form, domain).await {
            Ok(report) => {
                lock(&self.state).form.clear();
                let notice = match &report.realtime {
                    RealtimeWrite::Stored { .. } => {
                        Notice::new(NoticeKind::Success, "User added successfully!")
                    }
                    RealtimeWrite::Diverged { reason } => Notice::new(
                        NoticeKind::Diverged,
                        format!(
                            "User added to the REST store only; realtime write failed \
                             ({reason}). The stores are not reconciled."
                        ),
                    ),
                };
                self.emit(ViewEvent::Notice(notice));
                self.refresh_rest().await;
                Ok(report)
            }
            Err(err) => {
                let notice = match &err {
                    SubmitError::Validation(ValidationError::MissingNameOrEmail) => {
                        Notice::new(NoticeKind::Validation, "Please enter both name and email.")
                    }
                    SubmitError::Rest(_) => Notice::new(NoticeKind::Rest, err.to_string()),
                };
                self.emit(ViewEvent::Notice(notice));
                Err(err)
            }
        }
    }

    /// Cancels the live subscription. Call when the view is torn down.
    pub fn shutdown(&self) {
        self.subscriptions.shutdown();
    }

    pub fn active_subscription(&self) -> Option<Domain> {
        self.subscriptions.active_domain()
    }

    fn restart_realtime(&self, domain: Domain) {
        let generation = {
            let mut state = lock(&self.state);
            state.realtime_generation += 1;
            state.realtime_loading = true;
            state.realtime_generation
        };
        self.emit(ViewEvent::StateChanged);

        let update_state = Arc::clone(&self.state);
        let update_events = self.events.clone();
        let error_state = Arc::clone(&self.state);
        let error_events = self.events.clone();

        self.subscriptions.resubscribe(
            domain,
            move |users| {
                {
                    let mut state = lock(&update_state);
                    if state.realtime_generation != generation {
                        return;
                    }
                    state.realtime_users = users;
                    state.realtime_loading = false;
                }
                let _ = update_events.send(ViewEvent::StateChanged);
            },
            move |err| {
                {
                    let mut state = lock(&error_state);
                    if state.realtime_generation != generation {
                        return;
                    }
                    state.realtime_users.clear();
                    state.realtime_loading = false;
                }
                error!(%domain, error = %err, "view: realtime subscription failed");
                let _ = error_events.send(ViewEvent::StateChanged);
            },
        );
    }

    fn emit(&self, event: ViewEvent) {
        let _ = self.events.send(event);
    }
}

impl Drop for ViewModel {
    fn drop(&mut self) {
        self.subscriptions.shutdown();
    }
}

#[cfg(test)]
#[path = "tests/view_model_tests.rs"]
mod tests;
