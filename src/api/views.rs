//! Server-rendered pages: the landing/login page and the dashboard.
//!
//! Both pages are redirect guards first: `/` sends signed-in users to
//! `/dashboard`, and `/dashboard` sends signed-out users back to `/`.
//! Dashboard actions are plain form posts that redirect back to `/dashboard`.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use chrono::DateTime;

use super::auth::Session;
use super::dashboard::{Dashboard, DashboardRef};
use super::routes::AppState;
use super::task_store::{Task, TaskStatus};
use super::types::{AddTaskForm, StatusForm};
use crate::session::User;
use crate::util::escape_html;

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; background: #f9fafb; margin: 0; }
.center { display: flex; justify-content: center; align-items: center; min-height: 100vh; }
.card { width: 24rem; background: #f3f4f6; border-radius: 0.5rem; padding: 4rem; box-shadow: 0 10px 15px rgba(0,0,0,.1); text-align: center; }
.page { display: flex; flex-direction: column; align-items: center; padding: 1.5rem; }
.header { width: 100%; max-width: 56rem; display: flex; justify-content: space-between; align-items: center; margin-bottom: 1.5rem; }
.panel { width: 100%; max-width: 64rem; background: #fff; border: 1px solid #d1d5db; border-radius: 0.5rem; padding: 2rem; min-height: 600px; display: flex; flex-direction: column; box-sizing: border-box; }
.add { display: flex; gap: 0.5rem; }
.add input { flex: 1; padding: 0.5rem; border: 1px solid #d1d5db; border-radius: 0.375rem; }
button { padding: 0.5rem 1rem; border-radius: 0.375rem; border: 1px solid #111827; background: #111827; color: #fff; cursor: pointer; }
button.outline { background: #fff; color: #111827; border-color: transparent; }
button:disabled { opacity: 0.5; cursor: default; }
table { width: 100%; border-collapse: separate; border-spacing: 0 0.75rem; margin-top: 1.5rem; }
td { padding: 0.75rem 1rem; }
tr.not-started td { background: #e5e7eb; }
tr.ongoing td { background: #fef08a; }
tr.completed td { background: #bbf7d0; }
tr.completed td.text { text-decoration: line-through; }
td.controls { display: flex; justify-content: flex-end; gap: 1rem; align-items: center; }
.when { color: #4b5563; }
.delete { background: none; border: none; color: #ef4444; padding: 0; }
.pager { display: flex; justify-content: center; align-items: center; gap: 1rem; margin-top: auto; padding-top: 1rem; }
.pager .num { background: #e5e7eb; padding: 0.25rem 1rem; border-radius: 0.375rem; font-weight: 600; }
.notice { display: flex; justify-content: space-between; align-items: center; background: #fee2e2; color: #991b1b; padding: 0.75rem 1rem; border-radius: 0.375rem; margin-bottom: 1rem; }
"#;

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{}</title>\n<style>{}</style>\n</head>\n<body>\n{}\n</body>\n</html>\n",
        escape_html(title),
        STYLE,
        body
    )
}

/// The sign-in page.
pub fn render_login_page() -> String {
    let body = r#"<div class="center">
  <div class="card">
    <h2>Login</h2>
    <form method="post" action="/login">
      <button type="submit">Sign in with Google</button>
    </form>
  </div>
</div>"#;
    layout("My ToDo App", body)
}

fn status_class(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::NotStarted => "not-started",
        TaskStatus::Ongoing => "ongoing",
        TaskStatus::Completed => "completed",
    }
}

/// Human-readable creation time; falls back to the raw value if unparsable.
fn format_timestamp(timestamp: &str) -> String {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|t| t.format("%b %-d, %Y %H:%M:%S UTC").to_string())
        .unwrap_or_else(|_| timestamp.to_string())
}

fn render_task_row(task: &Task) -> String {
    let id = escape_html(&task.id);
    let options: String = TaskStatus::ALL
        .iter()
        .map(|status| {
            format!(
                "<option value=\"{0}\"{1}>{0}</option>",
                status.as_str(),
                if *status == task.status { " selected" } else { "" }
            )
        })
        .collect();

    format!(
        "<tr class=\"{class}\">\n\
         <td class=\"text\">{text}</td>\n\
         <td class=\"controls\">\n\
         <span class=\"when\">{when}</span>\n\
         <form method=\"post\" action=\"/dashboard/tasks/{id}/status\">\
         <select name=\"status\" onchange=\"this.form.submit()\">{options}</select>\
         <noscript><button type=\"submit\" class=\"outline\">Set</button></noscript></form>\n\
         <form method=\"post\" action=\"/dashboard/tasks/{id}/delete\">\
         <button type=\"submit\" class=\"delete\" title=\"Delete\">&#128465;</button></form>\n\
         </td>\n</tr>",
        class = status_class(task.status),
        text = escape_html(&task.text),
        when = escape_html(&format_timestamp(&task.timestamp)),
        id = id,
        options = options,
    )
}

/// The task manager page for `user`.
pub fn render_dashboard(dashboard: &Dashboard, user: &User) -> String {
    let notice = dashboard
        .notice()
        .map(|message| {
            format!(
                "<div class=\"notice\"><span>{}</span>\
                 <form method=\"post\" action=\"/dashboard/notice/dismiss\">\
                 <button type=\"submit\" class=\"outline\">Dismiss</button></form></div>",
                escape_html(message)
            )
        })
        .unwrap_or_default();

    let rows: Vec<String> = dashboard.tasks().iter().map(render_task_row).collect();
    let who = user
        .email
        .as_deref()
        .or(user.name.as_deref())
        .unwrap_or(&user.uid);

    let body = format!(
        "<div class=\"page\">\n\
         <div class=\"header\"><h1>Task Manager</h1>\
         <div><span class=\"when\">{who}</span> \
         <form method=\"post\" action=\"/logout\" style=\"display:inline\">\
         <button type=\"submit\">Logout</button></form></div></div>\n\
         <div class=\"panel\">\n{notice}\n\
         <form class=\"add\" method=\"post\" action=\"/dashboard/tasks\">\
         <input name=\"text\" value=\"{input}\" placeholder=\"Add a new task\" autocomplete=\"off\">\
         <button type=\"submit\">Add Task</button></form>\n\
         <table><tbody>\n{rows}\n</tbody></table>\n\
         <div class=\"pager\">\
         <form method=\"post\" action=\"/dashboard/prev\"><button type=\"submit\" class=\"outline\"{prev_disabled}>Previous</button></form>\
         <span class=\"num\">{page}</span>\
         <form method=\"post\" action=\"/dashboard/next\"><button type=\"submit\" class=\"outline\"{next_disabled}>Next</button></form>\
         </div>\n</div>\n</div>",
        who = escape_html(who),
        notice = notice,
        input = escape_html(dashboard.input()),
        rows = rows.join("\n"),
        prev_disabled = if dashboard.has_previous() { "" } else { " disabled" },
        page = dashboard.page(),
        next_disabled = if dashboard.has_next() { "" } else { " disabled" },
    );
    layout("Task Manager", &body)
}

/// `GET /` - sign-in page, or redirect to the dashboard when signed in.
pub async fn landing(session: Session) -> Response {
    if session.user.is_some() {
        return Redirect::to("/dashboard").into_response();
    }
    Html(render_login_page()).into_response()
}

/// Look up the caller's dashboard, mounting it on first use.
async fn dashboard_for(state: &AppState, user: &User) -> DashboardRef {
    let dashboard = state.dashboards.get_or_create(&user.uid).await;
    dashboard.lock().await.mount(&state.repository).await;
    dashboard
}

fn back_to_dashboard() -> Response {
    Redirect::to("/dashboard").into_response()
}

fn back_to_login() -> Response {
    Redirect::to("/").into_response()
}

/// `GET /dashboard`
pub async fn dashboard_page(State(state): State<Arc<AppState>>, session: Session) -> Response {
    let Some(user) = session.user else {
        return back_to_login();
    };
    let dashboard = state.dashboards.get_or_create(&user.uid).await;
    let mut dashboard = dashboard.lock().await;
    dashboard.refresh(&state.repository).await;
    Html(render_dashboard(&dashboard, &user)).into_response()
}

/// `POST /dashboard/tasks`
pub async fn add_task(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<AddTaskForm>,
) -> Response {
    let Some(user) = session.user else {
        return back_to_login();
    };
    let dashboard = dashboard_for(&state, &user).await;
    dashboard.lock().await.add(&state.repository, &form.text).await;
    back_to_dashboard()
}

/// `POST /dashboard/tasks/:id/status`
pub async fn update_task_status(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
    Form(form): Form<StatusForm>,
) -> Response {
    let Some(user) = session.user else {
        return back_to_login();
    };
    let dashboard = dashboard_for(&state, &user).await;
    let mut dashboard = dashboard.lock().await;
    match TaskStatus::parse(&form.status) {
        Some(status) => dashboard.update_status(&state.repository, &id, status).await,
        None => tracing::debug!("Ignoring unknown status {:?}", form.status),
    }
    back_to_dashboard()
}

/// `POST /dashboard/tasks/:id/delete`
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
) -> Response {
    let Some(user) = session.user else {
        return back_to_login();
    };
    let dashboard = dashboard_for(&state, &user).await;
    dashboard.lock().await.delete(&state.repository, &id).await;
    back_to_dashboard()
}

/// `POST /dashboard/next`
pub async fn next_page(State(state): State<Arc<AppState>>, session: Session) -> Response {
    let Some(user) = session.user else {
        return back_to_login();
    };
    let dashboard = dashboard_for(&state, &user).await;
    dashboard.lock().await.next(&state.repository).await;
    back_to_dashboard()
}

/// `POST /dashboard/prev`
pub async fn previous_page(State(state): State<Arc<AppState>>, session: Session) -> Response {
    let Some(user) = session.user else {
        return back_to_login();
    };
    let dashboard = dashboard_for(&state, &user).await;
    dashboard.lock().await.previous(&state.repository).await;
    back_to_dashboard()
}

/// `POST /dashboard/notice/dismiss`
pub async fn dismiss_notice(State(state): State<Arc<AppState>>, session: Session) -> Response {
    let Some(user) = session.user else {
        return back_to_login();
    };
    let dashboard = state.dashboards.get_or_create(&user.uid).await;
    dashboard.lock().await.dismiss_notice();
    back_to_dashboard()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        User {
            uid: "u1".to_string(),
            email: Some("me@example.com".to_string()),
            name: None,
        }
    }

    fn task(text: &str, status: TaskStatus) -> Task {
        Task {
            id: "t1".to_string(),
            text: text.to_string(),
            timestamp: "2026-10-18T09:30:00.000000000Z".to_string(),
            status,
            user_id: "u1".to_string(),
        }
    }

    #[test]
    fn test_login_page_has_sign_in_button() {
        let html = render_login_page();
        assert!(html.contains("action=\"/login\""));
        assert!(html.contains("Sign in with Google"));
    }

    #[test]
    fn test_empty_dashboard_disables_pager() {
        let dashboard = Dashboard::new("u1", 6);
        let html = render_dashboard(&dashboard, &user());
        assert!(html.contains("Task Manager"));
        assert!(html.contains("me@example.com"));
        assert!(html.contains("<span class=\"num\">1</span>"));
        assert!(html.contains(" disabled>Previous"));
        assert!(html.contains(" disabled>Next"));
    }

    #[test]
    fn test_task_row_escapes_text_and_selects_status() {
        let row = render_task_row(&task("<script>alert(1)</script>", TaskStatus::Completed));
        assert!(row.contains("class=\"completed\""));
        assert!(row.contains("&lt;script&gt;"));
        assert!(!row.contains("<script>"));
        assert!(row.contains("<option value=\"Completed\" selected>"));
        assert!(row.contains("<option value=\"Not Started\">"));
        assert!(row.contains("Oct 18, 2026 09:30:00 UTC"));
        assert!(row.contains("/dashboard/tasks/t1/delete"));
    }

    #[test]
    fn test_format_timestamp_falls_back_to_raw() {
        assert_eq!(format_timestamp("yesterday"), "yesterday");
    }
}
