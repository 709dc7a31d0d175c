//! Router build phase
//!
//! [`RouterBuilder`] accepts a declaration tree: middleware entries, nested
//! scopes, procedure mounts with skip lists, and aliases. [`RouterBuilder::build`]
//! walks the tree, materialises one routing-table entry per procedure with
//! its fully composed middleware chain, validates the result (duplicate
//! paths, alias rules), and freezes everything into an immutable
//! [`Router`].
//!
//! A middleware entry applies to every mount declared after it in the same
//! frame; scope middleware applies to everything mounted under the scope.
//!
//! # Example
//! ```rust,ignore
//! let router = Router::builder()
//!     .name("app")
//!     .middleware("logger", logger(), json!({}))
//!     .mount(users, "users", &[])
//!     .scope("admin", |s| {
//!         s.middleware("auth", auth(), json!({"role": "admin"}))
//!             .mount(admin_procs, "actions", &[])
//!     })
//!     .alias("getUsers", "users.list", true)
//!     .build()?;
//! ```

use crate::config::RpcConfig;
use crate::middleware::{Middleware, MiddlewareEntry, resolve_chain};
use crate::path;
use crate::registry::ProcedureRegistry;
use crate::router::{Alias, RouteEntry, Router};
use crate::telemetry::{SinkRef, TracingSink};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::Location;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Failure while building a router.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("duplicate procedure path '{path}' declared at: {}", locations.join(", "))]
    DuplicatePath {
        path: String,
        locations: Vec<String>,
    },
    #[error("'{segment}' is not a valid path segment (in {context})")]
    InvalidSegment { segment: String, context: String },
    #[error("unit '{unit}' is mounted from two different registries")]
    ConflictingUnit { unit: String },
    #[error("alias '{from}' is not a valid alias name")]
    AliasInvalidFrom { from: String },
    #[error("alias '{from}' points to itself")]
    AliasSelfReference { from: String },
    #[error("alias '{from}' is declared more than once")]
    DuplicateAlias { from: String },
    #[error("alias '{from}' shadows the procedure path of the same name")]
    AliasShadowsPath { from: String },
    #[error("alias '{from}' points to unknown path '{to}'")]
    AliasUnknownTarget { from: String, to: String },
    #[error("alias '{from}' points to alias '{to}'; aliases must target canonical paths")]
    AliasTargetsAlias { from: String, to: String },
    #[error("alias cycle detected through '{from}'")]
    AliasCycle { from: String },
}

enum Item {
    Middleware(MiddlewareEntry),
    Mount(MountDecl),
    Scope(ScopeDecl),
}

struct MountDecl {
    registry: Arc<ProcedureRegistry>,
    at: String,
    skip: Vec<String>,
    file: &'static str,
    line: u32,
}

struct ScopeDecl {
    segment: String,
    items: Vec<Item>,
}

/// Builder for a scope block.
pub struct ScopeBuilder {
    items: Vec<Item>,
}

impl ScopeBuilder {
    fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Declare middleware for the rest of this scope body.
    pub fn middleware(
        mut self,
        name: impl Into<String>,
        module: Arc<dyn Middleware>,
        opts: Value,
    ) -> Self {
        self.items
            .push(Item::Middleware(MiddlewareEntry::new(name, module, opts)));
        self
    }

    /// Mount a declaring unit's procedures under a path segment.
    ///
    /// `skip` names middleware to exclude from this mount's composed chains.
    #[track_caller]
    pub fn mount(
        mut self,
        registry: impl Into<Arc<ProcedureRegistry>>,
        at: impl Into<String>,
        skip: &[&str],
    ) -> Self {
        let caller = Location::caller();
        self.items.push(Item::Mount(MountDecl {
            registry: registry.into(),
            at: at.into(),
            skip: skip.iter().map(|s| s.to_string()).collect(),
            file: caller.file(),
            line: caller.line(),
        }));
        self
    }

    /// Open a nested scope.
    pub fn scope(mut self, segment: impl Into<String>, body: impl FnOnce(Self) -> Self) -> Self {
        let inner = body(Self::new());
        self.items.push(Item::Scope(ScopeDecl {
            segment: segment.into(),
            items: inner.items,
        }));
        self
    }
}

/// Builder for a router's declaration tree.
pub struct RouterBuilder {
    name: String,
    config: RpcConfig,
    sink: SinkRef,
    items: Vec<Item>,
    aliases: Vec<Alias>,
}

impl RouterBuilder {
    pub(crate) fn new() -> Self {
        Self {
            name: "rpc".to_string(),
            config: RpcConfig::default(),
            sink: Arc::new(TracingSink),
            items: Vec::new(),
            aliases: Vec::new(),
        }
    }

    /// Name the router, used in telemetry metadata.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the configuration snapshot owned by the built router.
    pub fn config(mut self, config: RpcConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the telemetry sink.
    pub fn sink(mut self, sink: SinkRef) -> Self {
        self.sink = sink;
        self
    }

    /// Declare root middleware for the rest of the declaration tree.
    pub fn middleware(
        mut self,
        name: impl Into<String>,
        module: Arc<dyn Middleware>,
        opts: Value,
    ) -> Self {
        self.items
            .push(Item::Middleware(MiddlewareEntry::new(name, module, opts)));
        self
    }

    /// Mount a declaring unit's procedures under a path segment.
    #[track_caller]
    pub fn mount(
        mut self,
        registry: impl Into<Arc<ProcedureRegistry>>,
        at: impl Into<String>,
        skip: &[&str],
    ) -> Self {
        let caller = Location::caller();
        self.items.push(Item::Mount(MountDecl {
            registry: registry.into(),
            at: at.into(),
            skip: skip.iter().map(|s| s.to_string()).collect(),
            file: caller.file(),
            line: caller.line(),
        }));
        self
    }

    /// Open a scope contributing a path prefix and a middleware frame.
    pub fn scope(
        mut self,
        segment: impl Into<String>,
        body: impl FnOnce(ScopeBuilder) -> ScopeBuilder,
    ) -> Self {
        let inner = body(ScopeBuilder::new());
        self.items.push(Item::Scope(ScopeDecl {
            segment: segment.into(),
            items: inner.items,
        }));
        self
    }

    /// Declare an alternate path resolving to a canonical one.
    pub fn alias(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        deprecated: bool,
    ) -> Self {
        self.aliases.push(Alias {
            from: from.into(),
            to: to.into(),
            deprecated,
        });
        self
    }

    /// Walk the declaration tree, validate, and freeze the routing table.
    pub fn build(self) -> Result<Router, BuildError> {
        let mut drafts: Vec<EntryDraft> = Vec::new();
        let mut units: HashMap<String, Arc<ProcedureRegistry>> = HashMap::new();
        let mut prefix: Vec<String> = Vec::new();
        let mut frames: Vec<Vec<MiddlewareEntry>> = vec![Vec::new()];

        walk(&self.items, &mut prefix, &mut frames, &mut drafts, &mut units)?;

        // Duplicate-path check: group drafts by path, report the first
        // group with more than one declaration site.
        let mut by_path_locations: HashMap<&str, Vec<&str>> = HashMap::new();
        for draft in &drafts {
            by_path_locations
                .entry(&draft.path)
                .or_default()
                .push(&draft.location);
        }
        let mut duplicates: Vec<_> = by_path_locations
            .into_iter()
            .filter(|(_, locations)| locations.len() > 1)
            .collect();
        if !duplicates.is_empty() {
            duplicates.sort_by_key(|(p, _)| p.to_string());
            let (dup_path, locations) = duplicates.remove(0);
            return Err(BuildError::DuplicatePath {
                path: dup_path.to_string(),
                locations: locations.iter().map(|l| l.to_string()).collect(),
            });
        }

        let entries: Vec<Arc<RouteEntry>> = drafts
            .into_iter()
            .map(|draft| {
                Arc::new(RouteEntry {
                    path: draft.path,
                    segments: draft.segments,
                    procedure_name: draft.procedure_name,
                    kind: draft.kind,
                    unit: draft.unit,
                    middleware: resolve_chain(&draft.chain),
                })
            })
            .collect();
        let by_path: HashMap<String, Arc<RouteEntry>> = entries
            .iter()
            .map(|e| (e.path.clone(), e.clone()))
            .collect();

        let aliases = validate_aliases(self.aliases, &by_path)?;

        debug!(
            router = %self.name,
            entries = entries.len(),
            aliases = aliases.len(),
            units = units.len(),
            "Built routing table"
        );

        Ok(Router {
            name: self.name,
            entries,
            by_path,
            aliases,
            units,
            config: self.config,
            sink: self.sink,
        })
    }
}

struct EntryDraft {
    path: String,
    segments: Vec<String>,
    procedure_name: String,
    kind: crate::procedure::ProcedureKind,
    unit: String,
    chain: Vec<MiddlewareEntry>,
    location: String,
}

fn walk(
    items: &[Item],
    prefix: &mut Vec<String>,
    frames: &mut Vec<Vec<MiddlewareEntry>>,
    drafts: &mut Vec<EntryDraft>,
    units: &mut HashMap<String, Arc<ProcedureRegistry>>,
) -> Result<(), BuildError> {
    for item in items {
        match item {
            Item::Middleware(entry) => {
                if let Some(frame) = frames.last_mut() {
                    frame.push(entry.clone());
                }
            }
            Item::Scope(scope) => {
                if !path::is_strict_segment(&scope.segment) {
                    return Err(BuildError::InvalidSegment {
                        segment: scope.segment.clone(),
                        context: format!("scope under '{}'", prefix.join(".")),
                    });
                }
                prefix.push(scope.segment.clone());
                frames.push(Vec::new());
                walk(&scope.items, prefix, frames, drafts, units)?;
                frames.pop();
                prefix.pop();
            }
            Item::Mount(mount) => {
                if !path::is_strict_segment(&mount.at) {
                    return Err(BuildError::InvalidSegment {
                        segment: mount.at.clone(),
                        context: format!("mount at {}:{}", mount.file, mount.line),
                    });
                }
                let unit = mount.registry.unit().to_string();
                match units.get(&unit) {
                    Some(existing) if !Arc::ptr_eq(existing, &mount.registry) => {
                        return Err(BuildError::ConflictingUnit { unit });
                    }
                    Some(_) => {}
                    None => {
                        units.insert(unit.clone(), mount.registry.clone());
                    }
                }

                for def in mount.registry.list_all() {
                    let mut segments = prefix.clone();
                    segments.push(mount.at.clone());
                    segments.push(def.name.clone());
                    let chain: Vec<MiddlewareEntry> = frames
                        .iter()
                        .flatten()
                        .chain(def.middleware.iter())
                        .filter(|entry| !mount.skip.contains(&entry.name))
                        .cloned()
                        .collect();
                    drafts.push(EntryDraft {
                        path: segments.join("."),
                        segments,
                        procedure_name: def.name.clone(),
                        kind: def.kind,
                        unit: unit.clone(),
                        chain,
                        location: format!(
                            "{} mounted at {}:{}",
                            def.location, mount.file, mount.line
                        ),
                    });
                }
            }
        }
    }
    Ok(())
}

fn validate_aliases(
    declared: Vec<Alias>,
    by_path: &HashMap<String, Arc<RouteEntry>>,
) -> Result<HashMap<String, Alias>, BuildError> {
    let mut aliases: HashMap<String, Alias> = HashMap::new();

    for alias in declared {
        if !path::is_relaxed(&alias.from) {
            return Err(BuildError::AliasInvalidFrom { from: alias.from });
        }
        if alias.from == alias.to {
            return Err(BuildError::AliasSelfReference { from: alias.from });
        }
        if aliases.contains_key(&alias.from) {
            return Err(BuildError::DuplicateAlias { from: alias.from });
        }
        if by_path.contains_key(&alias.from) {
            return Err(BuildError::AliasShadowsPath { from: alias.from });
        }
        aliases.insert(alias.from.clone(), alias);
    }

    for alias in aliases.values() {
        if aliases.contains_key(&alias.to) {
            return Err(BuildError::AliasTargetsAlias {
                from: alias.from.clone(),
                to: alias.to.clone(),
            });
        }
        if !by_path.contains_key(&alias.to) {
            return Err(BuildError::AliasUnknownTarget {
                from: alias.from.clone(),
                to: alias.to.clone(),
            });
        }
    }

    // Targets are canonical paths, so chains cannot form; the walk stays as
    // a guard against future relaxations of the rules above.
    for alias in aliases.values() {
        let mut seen = vec![alias.from.as_str()];
        let mut current = alias.to.as_str();
        while let Some(next) = aliases.get(current) {
            if seen.contains(&next.to.as_str()) {
                return Err(BuildError::AliasCycle {
                    from: alias.from.clone(),
                });
            }
            seen.push(current);
            current = next.to.as_str();
        }
    }

    Ok(aliases)
}
