//! Lookup collaborators: projects, trackers, users, groups, categories and
//! workflow defaults.
//!
//! Every call takes a [`LookupContext`]; there is no ambient "current user".

use std::collections::HashMap;
use std::fmt;

use crate::config::Config;
use crate::model::record::{
    Category, CategoryId, Group, GroupId, PriorityId, Project, ProjectId, Status, Tracker,
    TrackerId, User, UserId,
};

/// Per-request context handed to every directory call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupContext {
    /// Correlates log lines of one request.
    pub request_id: String,
    /// Acting user, when the transport authenticated one.
    pub actor: Option<UserId>,
}

impl LookupContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            actor: None,
        }
    }
}

impl fmt::Display for LookupContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.request_id)
    }
}

pub trait ProjectDirectory: Send + Sync {
    fn find_project(&self, ctx: &LookupContext, identifier: &str) -> Option<Project>;

    fn find_tracker(&self, ctx: &LookupContext, project: &Project, name: &str) -> Option<Tracker>;
}

pub trait IdentityDirectory: Send + Sync {
    fn find_user_by_login(&self, ctx: &LookupContext, login: &str) -> Option<User>;

    fn find_group_by_name(&self, ctx: &LookupContext, name: &str) -> Option<Group>;

    /// Author used when no known login was supplied.
    fn anonymous_user(&self, ctx: &LookupContext) -> User;

    fn default_priority(&self, ctx: &LookupContext) -> PriorityId;

    fn find_category_by_name(
        &self,
        ctx: &LookupContext,
        project: &Project,
        name: &str,
    ) -> Option<Category>;

    /// Initial open status; new and reopened records move here.
    fn default_status(&self, ctx: &LookupContext) -> Status;
}

pub const ANONYMOUS_LOGIN: &str = "anonymous";

/// Directory served from the configuration file. Ids are assigned in
/// declaration order, starting at 1; the anonymous user is id 0.
#[derive(Debug, Clone)]
pub struct StaticDirectory {
    projects: Vec<Project>,
    trackers: HashMap<ProjectId, Vec<Tracker>>,
    categories: HashMap<ProjectId, Vec<Category>>,
    users: Vec<User>,
    groups: Vec<Group>,
    default_priority: PriorityId,
    default_status: Status,
}

impl StaticDirectory {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let mut projects = Vec::new();
        let mut trackers: HashMap<ProjectId, Vec<Tracker>> = HashMap::new();
        let mut categories: HashMap<ProjectId, Vec<Category>> = HashMap::new();
        let mut next_tracker = 1;
        let mut next_category = 1;

        for (project_cfg, id) in config.projects.iter().zip(1..) {
            let id = ProjectId(id);
            projects.push(Project {
                id,
                identifier: project_cfg.identifier.clone(),
                backtrace_filters: project_cfg.backtrace_filter.clone(),
                repository_root: project_cfg
                    .repository_root
                    .as_deref()
                    .map(|root| root.trim_end_matches('/').to_string()),
            });

            let project_trackers: Vec<Tracker> = project_cfg
                .trackers
                .iter()
                .map(|name| {
                    let tracker = Tracker {
                        id: TrackerId(next_tracker),
                        name: name.clone(),
                    };
                    next_tracker += 1;
                    tracker
                })
                .collect();
            trackers.insert(id, project_trackers);

            let project_categories: Vec<Category> = project_cfg
                .categories
                .iter()
                .map(|name| {
                    let category = Category {
                        id: CategoryId(next_category),
                        name: name.clone(),
                    };
                    next_category += 1;
                    category
                })
                .collect();
            categories.insert(id, project_categories);
        }

        let users = config
            .users
            .iter()
            .zip(1..)
            .map(|(user, id)| User {
                id: UserId(id),
                login: user.login.clone(),
            })
            .collect();
        let groups = config
            .groups
            .iter()
            .zip(1..)
            .map(|(group, id)| Group {
                id: GroupId(id),
                name: group.name.clone(),
            })
            .collect();

        let default_priority = config
            .priorities
            .iter()
            .find(|p| p.is_default)
            .or_else(|| config.priorities.first())
            .map_or(PriorityId(1), |p| PriorityId(p.id));
        let default_status = config
            .statuses
            .iter()
            .find(|s| s.is_default && !s.is_closed)
            .or_else(|| config.statuses.iter().find(|s| !s.is_closed))
            .map_or_else(|| Status::open("New"), |s| Status::open(s.name.clone()));

        Self {
            projects,
            trackers,
            categories,
            users,
            groups,
            default_priority,
            default_status,
        }
    }

    #[must_use]
    pub fn projects(&self) -> &[Project] {
        &self.projects
    }
}

impl ProjectDirectory for StaticDirectory {
    fn find_project(&self, _ctx: &LookupContext, identifier: &str) -> Option<Project> {
        self.projects
            .iter()
            .find(|p| p.identifier == identifier)
            .cloned()
    }

    fn find_tracker(&self, _ctx: &LookupContext, project: &Project, name: &str) -> Option<Tracker> {
        self.trackers
            .get(&project.id)?
            .iter()
            .find(|t| t.name == name)
            .cloned()
    }
}

impl IdentityDirectory for StaticDirectory {
    fn find_user_by_login(&self, _ctx: &LookupContext, login: &str) -> Option<User> {
        self.users.iter().find(|u| u.login == login).cloned()
    }

    fn find_group_by_name(&self, _ctx: &LookupContext, name: &str) -> Option<Group> {
        self.groups.iter().find(|g| g.name == name).cloned()
    }

    fn anonymous_user(&self, _ctx: &LookupContext) -> User {
        User {
            id: UserId(0),
            login: ANONYMOUS_LOGIN.to_string(),
        }
    }

    fn default_priority(&self, _ctx: &LookupContext) -> PriorityId {
        self.default_priority
    }

    fn find_category_by_name(
        &self,
        _ctx: &LookupContext,
        project: &Project,
        name: &str,
    ) -> Option<Category> {
        self.categories
            .get(&project.id)?
            .iter()
            .find(|c| c.name == name)
            .cloned()
    }

    fn default_status(&self, _ctx: &LookupContext) -> Status {
        self.default_status.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> StaticDirectory {
        let config: Config = toml::from_str(
            r#"
[[projects]]
identifier = "shop"
trackers = ["Bug", "Exception"]
categories = ["Backend"]
repository_root = "/trunk/"

[[projects]]
identifier = "blog"
trackers = ["Bug"]

[[users]]
login = "alice"

[[groups]]
name = "developers"
"#,
        )
        .expect("parse");
        StaticDirectory::from_config(&config)
    }

    #[test]
    fn trackers_are_scoped_to_their_project() {
        let dir = directory();
        let ctx = LookupContext::new("t");
        let shop = dir.find_project(&ctx, "shop").expect("shop");
        let blog = dir.find_project(&ctx, "blog").expect("blog");

        assert!(dir.find_tracker(&ctx, &shop, "Exception").is_some());
        assert!(dir.find_tracker(&ctx, &blog, "Exception").is_none());
        assert_ne!(
            dir.find_tracker(&ctx, &shop, "Bug").map(|t| t.id),
            dir.find_tracker(&ctx, &blog, "Bug").map(|t| t.id)
        );
    }

    #[test]
    fn repository_root_loses_trailing_slash() {
        let dir = directory();
        let shop = dir
            .find_project(&LookupContext::default(), "shop")
            .expect("shop");
        assert_eq!(shop.repository_root.as_deref(), Some("/trunk"));
    }

    #[test]
    fn identities_and_defaults() {
        let dir = directory();
        let ctx = LookupContext::new("t");
        assert_eq!(dir.find_user_by_login(&ctx, "alice").map(|u| u.id), Some(UserId(1)));
        assert!(dir.find_user_by_login(&ctx, "bob").is_none());
        assert_eq!(dir.find_group_by_name(&ctx, "developers").map(|g| g.id), Some(GroupId(1)));
        assert_eq!(dir.anonymous_user(&ctx).id, UserId(0));
        assert_eq!(dir.default_priority(&ctx), PriorityId(2));
        assert_eq!(dir.default_status(&ctx), Status::open("New"));
    }

    #[test]
    fn categories_resolve_per_project() {
        let dir = directory();
        let ctx = LookupContext::new("t");
        let shop = dir.find_project(&ctx, "shop").expect("shop");
        let blog = dir.find_project(&ctx, "blog").expect("blog");
        assert!(dir.find_category_by_name(&ctx, &shop, "Backend").is_some());
        assert!(dir.find_category_by_name(&ctx, &blog, "Backend").is_none());
    }
}
