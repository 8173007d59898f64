//! The in-memory semantic model: `Project` (arena of views), plus the
//! sub-modules each piece of `§3` lives in.

pub mod dict;
pub mod expr_engine;
pub mod field;
pub mod identifier;
pub mod mapping;
pub mod set;
pub mod types;
pub mod validate;
pub mod view;

use std::collections::HashMap;

pub use mapping::Mapping;
pub use validate::ModelError;
pub use view::View;

/// Compiler-facing configuration: the parts of the model that are in scope
/// per §1 (dialect defaults live in `sql::dialect`; database connection
/// configuration is explicitly out of scope and unmodeled).
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectConfig {
    /// IANA timezone name the model's `time` dimension_groups are converted
    /// into (§4.1).
    pub timezone: String,
    pub week_start_day: chrono::Weekday,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            week_start_day: chrono::Weekday::Mon,
        }
    }
}

/// Grants an embedding application attaches to the calling context. No
/// authorization engine is in scope (§3); the default implementation grants
/// everything, so access filters/required grants are inert unless an
/// embedder supplies its own.
pub trait GrantContext {
    fn has_grants(&self, required: &[String]) -> bool {
        let _ = required;
        true
    }
}

/// The context used when none is supplied: grants everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenGrantContext;

impl GrantContext for OpenGrantContext {}

/// The validated, in-memory semantic model: an arena of [`View`]s plus
/// cross-view [`Mapping`]s and project-level configuration.
///
/// Views and fields are addressed by stable string ids (`view_name`,
/// `view_name.field_name`) rather than back-pointers, so `Project` stays
/// plain data — `Send + Sync`, no interior mutability (§5).
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub views: HashMap<String, View>,
    pub mappings: HashMap<String, Mapping>,
    pub timezone: String,
    pub week_start_day: chrono::Weekday,
}

impl Default for Project {
    fn default() -> Self {
        Self::new()
    }
}

impl Project {
    pub fn new() -> Self {
        let config = ProjectConfig::default();
        Self {
            views: HashMap::new(),
            mappings: HashMap::new(),
            timezone: config.timezone,
            week_start_day: config.week_start_day,
        }
    }

    pub fn with_config(config: ProjectConfig) -> Self {
        Self {
            views: HashMap::new(),
            mappings: HashMap::new(),
            timezone: config.timezone,
            week_start_day: config.week_start_day,
        }
    }

    pub fn add_view(&mut self, view: View) {
        self.views.insert(view.name.clone(), view);
    }

    pub fn add_mapping(&mut self, mapping: Mapping) {
        self.mappings.insert(mapping.name.clone(), mapping);
    }

    pub fn view(&self, name: &str) -> Option<&View> {
        self.views.get(name)
    }

    /// Resolve a `view.field` id to its declared [`field::Field`], following
    /// dimension_group timeframe/interval expansion (§3 Invariants).
    pub fn field(&self, view_name: &str, field_name: &str) -> Option<&field::Field> {
        self.views.get(view_name)?.field(field_name)
    }

    /// All view names, sorted, for deterministic iteration (join planning,
    /// error messages).
    pub fn view_names_sorted(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.views.keys().map(String::as_str).collect();
        names.sort();
        names
    }
}

/// Builder for programmatic/test construction, mirroring the teacher's
/// `ModelBuilder` ergonomics for assembling a `Project` without going
/// through the `dict` boundary.
#[derive(Debug, Clone, Default)]
pub struct ProjectBuilder {
    project: Project,
}

impl ProjectBuilder {
    pub fn new() -> Self {
        Self {
            project: Project::new(),
        }
    }

    pub fn timezone(mut self, tz: impl Into<String>) -> Self {
        self.project.timezone = tz.into();
        self
    }

    pub fn week_start_day(mut self, day: chrono::Weekday) -> Self {
        self.project.week_start_day = day;
        self
    }

    pub fn view(mut self, view: View) -> Self {
        self.project.add_view(view);
        self
    }

    pub fn mapping(mut self, mapping: Mapping) -> Self {
        self.project.add_mapping(mapping);
        self
    }

    pub fn build(self) -> Project {
        self.project
    }
}
