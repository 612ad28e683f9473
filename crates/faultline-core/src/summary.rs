//! Fields derived from a notice: dedup subject, description with source
//! link, and the attributes resolved through the directories.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;
use tracing::debug;

use crate::directory::{IdentityDirectory, LookupContext};
use crate::model::notice::{Frame, Notice, Routing};
use crate::model::record::{CategoryId, PriorityId, Principal, Project, User};

/// Host tracker limit on subject length, counted in characters.
pub const MAX_SUBJECT_CHARS: usize = 255;

pub const DESCRIPTION_LEAD: &str = "Notifier reported an error";

static ROOT_PLACEHOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\[(PROJECT|RAILS)_ROOT\]/").ok());

/// Strip `[PROJECT_ROOT]/` and `[RAILS_ROOT]/` placeholders from a path.
#[must_use]
pub fn clean_path(path: &str) -> Cow<'_, str> {
    match ROOT_PLACEHOLDER.as_ref() {
        Some(re) => re.replace_all(path, ""),
        None => Cow::Borrowed(path),
    }
}

/// `[env] Class in path:line`, at most [`MAX_SUBJECT_CHARS`] characters.
///
/// Only the path is shortened (keeping its beginning). When the environment
/// and class alone exhaust the limit, they are cut and the location dropped.
#[must_use]
pub fn subject(environment_name: &str, error_class: &str, error_line: Option<&Frame>) -> String {
    let mut head = String::new();
    if !environment_name.is_empty() {
        head.push('[');
        head.push_str(environment_name);
        head.push_str("] ");
    }
    head.push_str(error_class);

    let Some(frame) = error_line else {
        return truncate_chars(&head, MAX_SUBJECT_CHARS).to_string();
    };

    let suffix = format!(":{}", frame.line);
    let fixed = head.chars().count() + " in ".len() + suffix.len();
    if fixed >= MAX_SUBJECT_CHARS {
        return truncate_chars(&head, MAX_SUBJECT_CHARS).to_string();
    }

    let path = clean_path(&frame.file);
    let path = truncate_chars(&path, MAX_SUBJECT_CHARS - fixed);
    format!("{head} in {path}{suffix}")
}

/// Lead sentence, plus a `source:` link when an error line exists.
#[must_use]
pub fn description(error_line: Option<&Frame>, repository_root: &str) -> String {
    match error_line {
        Some(frame) => format!(
            "{DESCRIPTION_LEAD} related to source:{repository_root}/{}#L{}",
            clean_path(&frame.file),
            frame.line
        ),
        None => DESCRIPTION_LEAD.to_string(),
    }
}

/// Root used in source links: the notice's override, else the project's
/// configured root, else empty.
#[must_use]
pub fn resolve_repository_root(routing: &Routing, project: &Project) -> String {
    routing
        .repository_root
        .clone()
        .or_else(|| {
            project
                .repository_root
                .as_deref()
                .map(|root| root.trim_end_matches('/').to_string())
        })
        .unwrap_or_default()
}

fn truncate_chars(s: &str, max: usize) -> &str {
    s.char_indices().nth(max).map_or(s, |(idx, _)| &s[..idx])
}

/// Record attributes resolved from routing parameters. Lookup misses never
/// fail: they degrade to absent values or defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAttributes {
    pub author: User,
    pub assignee: Option<Principal>,
    pub category: Option<CategoryId>,
    pub priority: PriorityId,
}

impl ResolvedAttributes {
    pub fn resolve(
        ctx: &LookupContext,
        identity: &dyn IdentityDirectory,
        project: &Project,
        notice: &Notice,
    ) -> Self {
        let routing = &notice.routing;

        let author = routing
            .author
            .as_deref()
            .and_then(|login| {
                let user = identity.find_user_by_login(ctx, login);
                if user.is_none() {
                    debug!(request_id = %ctx, login, "unknown author, using anonymous");
                }
                user
            })
            .unwrap_or_else(|| identity.anonymous_user(ctx));

        let assignee = routing.assigned_to.as_deref().and_then(|name| {
            let principal = identity
                .find_user_by_login(ctx, name)
                .map(|user| Principal::User(user.id))
                .or_else(|| {
                    identity
                        .find_group_by_name(ctx, name)
                        .map(|group| Principal::Group(group.id))
                });
            if principal.is_none() {
                debug!(request_id = %ctx, assignee = name, "assignee matches no user or group");
            }
            principal
        });

        let category = routing.category.as_deref().and_then(|name| {
            let category = identity.find_category_by_name(ctx, project, name);
            if category.is_none() {
                debug!(request_id = %ctx, category = name, "unknown category, leaving unset");
            }
            category.map(|c| c.id)
        });

        let priority = routing
            .priority
            .map_or_else(|| identity.default_priority(ctx), PriorityId);

        Self {
            author,
            assignee,
            category,
            priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::directory::{ProjectDirectory, StaticDirectory};
    use crate::model::record::{GroupId, ProjectId, UserId};

    fn project(root: Option<&str>) -> Project {
        Project {
            id: ProjectId(1),
            identifier: "shop".into(),
            backtrace_filters: Vec::new(),
            repository_root: root.map(str::to_string),
        }
    }

    #[test]
    fn subject_with_environment_and_error_line() {
        let frame = Frame::new("[PROJECT_ROOT]/app/x.rb", 6, "index");
        assert_eq!(
            subject("staging", "RuntimeError", Some(&frame)),
            "[staging] RuntimeError in app/x.rb:6"
        );
    }

    #[test]
    fn subject_without_environment_or_error_line() {
        assert_eq!(subject("", "RuntimeError", None), "RuntimeError");
        let frame = Frame::new("[RAILS_ROOT]/lib/y.rb", 2, "");
        assert_eq!(subject("", "NameError", Some(&frame)), "NameError in lib/y.rb:2");
    }

    #[test]
    fn long_path_is_truncated_keeping_prefix_and_line() {
        let frame = Frame::new("a/".repeat(300), 42, "");
        let s = subject("production", "ActiveRecord::RecordNotFound", Some(&frame));
        assert_eq!(s.chars().count(), MAX_SUBJECT_CHARS);
        assert!(s.starts_with("[production] ActiveRecord::RecordNotFound in a/a/"));
        assert!(s.ends_with(":42"));
    }

    #[test]
    fn multibyte_paths_truncate_on_char_boundaries() {
        let frame = Frame::new("ü".repeat(400), 1, "");
        let s = subject("", "E", Some(&frame));
        assert_eq!(s.chars().count(), MAX_SUBJECT_CHARS);
    }

    #[test]
    fn oversized_class_drops_the_location() {
        let class = "E".repeat(300);
        let frame = Frame::new("app/x.rb", 1, "");
        let s = subject("", &class, Some(&frame));
        assert_eq!(s, "E".repeat(MAX_SUBJECT_CHARS));
    }

    #[test]
    fn description_links_to_source() {
        let frame = Frame::new("[PROJECT_ROOT]/app/x.rb", 6, "");
        assert_eq!(
            description(Some(&frame), "/trunk"),
            "Notifier reported an error related to source:/trunk/app/x.rb#L6"
        );
        assert_eq!(description(None, "/trunk"), DESCRIPTION_LEAD);
    }

    #[test]
    fn repository_root_precedence() {
        let mut routing = Routing::default();
        assert_eq!(resolve_repository_root(&routing, &project(None)), "");
        assert_eq!(resolve_repository_root(&routing, &project(Some("/trunk/"))), "/trunk");
        routing.repository_root = Some("/branches/x".into());
        assert_eq!(
            resolve_repository_root(&routing, &project(Some("/trunk"))),
            "/branches/x"
        );
    }

    fn directory() -> StaticDirectory {
        let config: Config = toml::from_str(
            r#"
[[projects]]
identifier = "shop"
categories = ["Backend"]

[[users]]
login = "alice"

[[groups]]
name = "ops"
"#,
        )
        .expect("parse");
        StaticDirectory::from_config(&config)
    }

    #[test]
    fn resolution_degrades_to_defaults() {
        let dir = directory();
        let ctx = LookupContext::new("t");
        let shop = dir.find_project(&ctx, "shop").expect("shop");

        let mut notice = Notice::default();
        notice.routing.author = Some("nobody".into());
        notice.routing.assigned_to = Some("nobody".into());
        notice.routing.category = Some("Frontend".into());

        let resolved = ResolvedAttributes::resolve(&ctx, &dir, &shop, &notice);
        assert_eq!(resolved.author.id, UserId(0));
        assert_eq!(resolved.assignee, None);
        assert_eq!(resolved.category, None);
        assert_eq!(resolved.priority, PriorityId(2));
    }

    #[test]
    fn assignee_falls_back_to_group() {
        let dir = directory();
        let ctx = LookupContext::new("t");
        let shop = dir.find_project(&ctx, "shop").expect("shop");

        let mut notice = Notice::default();
        notice.routing.author = Some("alice".into());
        notice.routing.assigned_to = Some("ops".into());
        notice.routing.category = Some("Backend".into());
        notice.routing.priority = Some(4);

        let resolved = ResolvedAttributes::resolve(&ctx, &dir, &shop, &notice);
        assert_eq!(resolved.author.id, UserId(1));
        assert_eq!(resolved.assignee, Some(Principal::Group(GroupId(1))));
        assert!(resolved.category.is_some());
        assert_eq!(resolved.priority, PriorityId(4));
    }
}
