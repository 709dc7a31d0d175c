//! Procedure registries
//!
//! A declaring unit accumulates procedure definitions and named handler
//! bindings in a [`ProcedureSet`]. Finalising the set validates every
//! definition and freezes it into a [`ProcedureRegistry`] with by-name and
//! by-kind indexes; failures carry the declaration site (file and line).
//!
//! # Example
//! ```rust,ignore
//! use nexus_rpc_core::registry::ProcedureSet;
//! use nexus_rpc_core::procedure::Procedure;
//!
//! let users = ProcedureSet::new("users")
//!     .define(Procedure::query("get").input(id_schema()).handler(get_user))
//!     .define(Procedure::query("list").unbound())
//!     .bind("list", list_users)
//!     .finish()?;
//! ```

use crate::context::Context;
use crate::error::RpcResult;
use crate::path;
use crate::procedure::{HandlerFn, ProcedureDef, ProcedureKind, handler};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Failure while finalising a declaring unit.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("procedure '{name}' in unit '{unit}' has no handler and no binding ({location})")]
    MissingHandler {
        unit: String,
        name: String,
        location: String,
    },
    #[error("duplicate procedure name '{name}' in unit '{unit}' ({location})")]
    DuplicateName {
        unit: String,
        name: String,
        location: String,
    },
    #[error("procedure name '{name}' in unit '{unit}' is not a valid identifier ({location})")]
    InvalidName {
        unit: String,
        name: String,
        location: String,
    },
    #[error("procedure '{name}' in unit '{unit}' declares a route with an empty path template ({location})")]
    EmptyRouteTemplate {
        unit: String,
        name: String,
        location: String,
    },
}

/// A declaring unit under construction.
pub struct ProcedureSet {
    unit: String,
    defs: Vec<ProcedureDef>,
    bindings: HashMap<String, HandlerFn>,
}

impl ProcedureSet {
    /// Start a declaring unit with the given identifier.
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            defs: Vec::new(),
            bindings: HashMap::new(),
        }
    }

    /// Add a procedure definition.
    pub fn define(mut self, mut def: ProcedureDef) -> Self {
        def.location.unit = Some(self.unit.clone());
        self.defs.push(def);
        self
    }

    /// Bind a typed handler under a name.
    ///
    /// A definition without an embedded handler resolves to the binding of
    /// the same name at call time, so bindings may be declared after the
    /// definition that uses them.
    pub fn bind<I, O, F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(I, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RpcResult<O>> + Send + 'static,
    {
        self.bindings.insert(name.into(), handler(f));
        self
    }

    /// Bind a raw handler under a name.
    pub fn bind_raw(mut self, name: impl Into<String>, f: HandlerFn) -> Self {
        self.bindings.insert(name.into(), f);
        self
    }

    /// Validate and freeze the unit.
    pub fn finish(self) -> Result<ProcedureRegistry, RegistryError> {
        let mut by_name: HashMap<String, Arc<ProcedureDef>> = HashMap::new();
        let mut defs: Vec<Arc<ProcedureDef>> = Vec::with_capacity(self.defs.len());

        for def in self.defs {
            let location = def.location.to_string();
            if !path::is_strict_segment(&def.name) {
                return Err(RegistryError::InvalidName {
                    unit: self.unit.clone(),
                    name: def.name,
                    location,
                });
            }
            if by_name.contains_key(&def.name) {
                return Err(RegistryError::DuplicateName {
                    unit: self.unit.clone(),
                    name: def.name,
                    location,
                });
            }
            if def.handler.is_none() && !self.bindings.contains_key(&def.name) {
                return Err(RegistryError::MissingHandler {
                    unit: self.unit.clone(),
                    name: def.name,
                    location,
                });
            }
            if let Some(route) = &def.route {
                if route.path_template.is_empty() {
                    return Err(RegistryError::EmptyRouteTemplate {
                        unit: self.unit.clone(),
                        name: def.name,
                        location,
                    });
                }
            }
            let def = Arc::new(def);
            by_name.insert(def.name.clone(), def.clone());
            defs.push(def);
        }

        debug!(unit = %self.unit, procedures = defs.len(), "Finalised procedure registry");
        Ok(ProcedureRegistry {
            unit: self.unit,
            defs,
            by_name,
            bindings: self.bindings,
        })
    }
}

/// An immutable, finalised declaring unit.
pub struct ProcedureRegistry {
    unit: String,
    defs: Vec<Arc<ProcedureDef>>,
    by_name: HashMap<String, Arc<ProcedureDef>>,
    bindings: HashMap<String, HandlerFn>,
}

impl ProcedureRegistry {
    /// The unit identifier.
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// All definitions, in declaration order.
    pub fn list_all(&self) -> &[Arc<ProcedureDef>] {
        &self.defs
    }

    /// Definitions of one kind, in declaration order.
    pub fn list_by_kind(&self, kind: ProcedureKind) -> Vec<Arc<ProcedureDef>> {
        self.defs
            .iter()
            .filter(|d| d.kind == kind)
            .cloned()
            .collect()
    }

    /// Look up a definition by name.
    pub fn by_name(&self, name: &str) -> Option<&Arc<ProcedureDef>> {
        self.by_name.get(name)
    }

    /// Whether a definition exists under the name.
    pub fn has(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// All procedure names, in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.defs.iter().map(|d| d.name.as_str()).collect()
    }

    /// Look up a named handler binding.
    pub fn binding(&self, name: &str) -> Option<&HandlerFn> {
        self.bindings.get(name)
    }
}

impl std::fmt::Debug for ProcedureRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcedureRegistry")
            .field("unit", &self.unit)
            .field("procedures", &self.names())
            .field("bindings", &self.bindings.keys().collect::<Vec<_>>())
            .finish()
    }
}
