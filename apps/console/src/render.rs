use std::fmt::Write as _;

use client_core::ViewState;
use shared::domain::{Domain, UserRecord};

pub const REALTIME_TITLE: &str = "Realtime Live Users";
pub const REST_TITLE: &str = "REST Stored Users";

pub fn section(title: &str, loading: bool, users: &[UserRecord]) -> String {
    let mut out = format!("== {title} ==\n");
    if loading {
        out.push_str("  Loading...\n");
    } else if users.is_empty() {
        out.push_str("  No data found.\n");
    } else {
        for user in users {
            let _ = writeln!(out, "  {} — {} — {}", user.name, user.email, user.domain);
        }
    }
    out
}

pub fn view(state: &ViewState) -> String {
    let mut out = format!(
        "User Management  [domain: {}]\nform: name={:?} email={:?}\n\n",
        state.domain, state.form.name, state.form.email
    );
    out.push_str(&section(
        REALTIME_TITLE,
        state.realtime_loading,
        &state.realtime_users,
    ));
    out.push('\n');
    out.push_str(&section(REST_TITLE, state.rest_loading, &state.rest_users));
    out
}

pub fn help() -> String {
    let domains = Domain::ALL
        .into_iter()
        .map(Domain::as_str)
        .collect::<Vec<_>>()
        .join("|");
    format!(
        "commands:\n  domain <{domains}>\n  name <text>\n  email <text>\n  submit\n  \
         add <name> <email>\n  show\n  help\n  quit"
    )
}
