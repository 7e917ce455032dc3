//! Handler error reporting with user context

use std::error::Error;

use tracing::error;

/// What is known about the user a failing handler was serving
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    pub group_name: Option<String>,
    pub faculty_name: Option<String>,
}

impl UserInfo {
    fn describe(&self) -> String {
        let group = match &self.group_name {
            Some(name) => format!("group '{}'", name),
            None => "no group assigned".to_string(),
        };
        let faculty = match &self.faculty_name {
            Some(name) => format!("faculty '{}'", name),
            None => "no faculty assigned".to_string(),
        };
        format!("{}, {}", group, faculty)
    }
}

/// Log a handler failure as a single ERROR event
///
/// The event carries the error itself in the `error` field, so the chat
/// attachment ends with the full `source()` chain.
pub fn log_error_with_context<E>(
    err: &E,
    handler_name: &str,
    user: Option<&UserInfo>,
    additional_context: &str,
    group_name: Option<&str>,
) where
    E: Error + 'static,
{
    let user_info = user
        .map(UserInfo::describe)
        .unwrap_or_else(|| "user not provided".to_string());

    let mut context_parts = Vec::new();
    if !additional_context.is_empty() {
        context_parts.push(additional_context.to_string());
    }
    if let Some(group) = group_name {
        context_parts.push(format!("requested group: {}", group));
    }
    let context = if context_parts.is_empty() {
        String::new()
    } else {
        format!(" [{}]", context_parts.join(", "))
    };

    error!(
        handler = handler_name,
        error_type = short_type_name::<E>(),
        error = err as &(dyn Error + 'static),
        "Error in {} for {}{}: {}",
        handler_name,
        user_info,
        context,
        err
    );
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    // Strip the module path but keep generic arguments intact
    let base_end = full.find('<').unwrap_or(full.len());
    match full[..base_end].rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}
