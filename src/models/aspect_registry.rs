//! Registry of aspect types and their value factories.
//!
//! The core aspect types are always present. Extensions are registered by
//! name (and optionally by explicit code) together with the [`ValueKind`]
//! used when values of that type are created through [`new_value`].
//!
//! The process-wide registry is created on first use or by an explicit
//! [`init`] call, and [`reset`] drops every extension. Independent
//! [`AspectTypeRegistry`] instances can be used where a shared registry is
//! unwanted.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::OnceLock;

use super::aspect::{AspectType, AspectValue, ValueKind, CORE_ASPECT_COUNT};
use crate::error::{PlanError, PlanResult};

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    kind: ValueKind,
}

/// Name and factory table for aspect types.
#[derive(Debug)]
pub struct AspectTypeRegistry {
    by_name: HashMap<String, AspectType>,
    by_type: HashMap<AspectType, Entry>,
    next_code: u32,
}

impl Default for AspectTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AspectTypeRegistry {
    /// Creates a registry holding only the core aspect types.
    pub fn new() -> Self {
        let mut reg = Self {
            by_name: HashMap::new(),
            by_type: HashMap::new(),
            next_code: CORE_ASPECT_COUNT as u32,
        };
        for t in AspectType::CORE {
            if let Some(name) = t.core_name() {
                reg.by_name.insert(name.to_string(), t);
                reg.by_type.insert(
                    t,
                    Entry {
                        name: name.to_string(),
                        kind: t.default_kind(),
                    },
                );
            }
        }
        reg
    }

    /// Registers an extension under the next free code.
    ///
    /// # Errors
    /// `DuplicateAspectType` if the name is taken.
    pub fn register(&mut self, name: impl Into<String>, kind: ValueKind) -> PlanResult<AspectType> {
        let mut code = self.next_code;
        while self.by_type.contains_key(&AspectType::from_code(code)) {
            code += 1;
        }
        self.register_with_code(code, name, kind)
    }

    /// Registers an extension under an explicit code.
    ///
    /// # Errors
    /// `DuplicateAspectType` if the name or the code is taken (core codes
    /// are always taken).
    pub fn register_with_code(
        &mut self,
        code: u32,
        name: impl Into<String>,
        kind: ValueKind,
    ) -> PlanResult<AspectType> {
        let name = name.into();
        let t = AspectType::from_code(code);
        if self.by_name.contains_key(&name) || self.by_type.contains_key(&t) {
            return Err(PlanError::DuplicateAspectType { name });
        }
        self.by_name.insert(name.clone(), t);
        self.by_type.insert(t, Entry { name, kind });
        self.next_code = self.next_code.max(code + 1);
        Ok(t)
    }

    /// Aspect type registered under `name`.
    pub fn lookup(&self, name: &str) -> Option<AspectType> {
        self.by_name.get(name).copied()
    }

    /// Registered name of `t`.
    pub fn name(&self, t: AspectType) -> Option<&str> {
        self.by_type.get(&t).map(|e| e.name.as_str())
    }

    /// Value kind produced by the factory of `t`.
    pub fn kind(&self, t: AspectType) -> Option<&ValueKind> {
        self.by_type.get(&t).map(|e| &e.kind)
    }

    /// Creates a value through the factory registered for `t`.
    ///
    /// Unregistered types produce plain floats.
    pub fn create(&self, t: AspectType, value: f64) -> AspectValue {
        match self.kind(t) {
            Some(ValueKind::Time) => AspectValue::time(t, value.round() as i64),
            Some(kind) => AspectValue::of_kind(t, value, kind.clone()),
            None => AspectValue::of_kind(t, value, ValueKind::Float),
        }
    }

    /// All registered types, ordered by code.
    pub fn types(&self) -> Vec<AspectType> {
        let mut v: Vec<AspectType> = self.by_type.keys().copied().collect();
        v.sort_by_key(|t| t.code());
        v
    }

    /// Drops every extension.
    pub fn clear_extensions(&mut self) {
        *self = Self::new();
    }
}

// ================================
// Process-wide registry
// ================================

static REGISTRY: OnceLock<RwLock<AspectTypeRegistry>> = OnceLock::new();

fn global() -> &'static RwLock<AspectTypeRegistry> {
    REGISTRY.get_or_init(|| RwLock::new(AspectTypeRegistry::new()))
}

/// Initializes the process-wide registry. Idempotent.
pub fn init() {
    let _ = global();
}

/// Restores the process-wide registry to the core types only.
pub fn reset() {
    global().write().clear_extensions();
    tracing::debug!("aspect type registry reset");
}

/// Registers an extension in the process-wide registry.
pub fn register(name: impl Into<String>, kind: ValueKind) -> PlanResult<AspectType> {
    let t = global().write().register(name, kind)?;
    tracing::debug!(code = t.code(), "aspect type registered");
    Ok(t)
}

/// Registers an extension with an explicit code in the process-wide registry.
pub fn register_with_code(
    code: u32,
    name: impl Into<String>,
    kind: ValueKind,
) -> PlanResult<AspectType> {
    global().write().register_with_code(code, name, kind)
}

/// Looks up a type by name.
pub fn aspect_type(name: &str) -> Option<AspectType> {
    global().read().lookup(name)
}

/// Name registered for `t`.
pub fn name_of(t: AspectType) -> Option<String> {
    global().read().name(t).map(str::to_string)
}

/// Value kind registered for `t`.
pub fn kind_of(t: AspectType) -> Option<ValueKind> {
    match t {
        AspectType::Extension(_) => global().read().kind(t).cloned(),
        core => Some(core.default_kind()),
    }
}

/// Creates a value of type `t` through its registered factory.
pub fn new_value(t: AspectType, value: f64) -> AspectValue {
    global().read().create(t, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_types_present() {
        let reg = AspectTypeRegistry::new();
        assert_eq!(reg.lookup("COST"), Some(AspectType::Cost));
        assert_eq!(reg.name(AspectType::PodDate), Some("POD_DATE"));
        assert_eq!(reg.types().len(), CORE_ASPECT_COUNT);
    }

    #[test]
    fn test_register_assigns_codes() {
        let mut reg = AspectTypeRegistry::new();
        let a = reg.register("FUEL_BURN", ValueKind::Rate).unwrap();
        let b = reg.register("CREW_HOURS", ValueKind::Float).unwrap();
        assert_eq!(a, AspectType::from_code(15));
        assert_eq!(b, AspectType::from_code(16));
        assert_eq!(reg.kind(a), Some(&ValueKind::Rate));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut reg = AspectTypeRegistry::new();
        reg.register("FUEL_BURN", ValueKind::Rate).unwrap();
        match reg.register("FUEL_BURN", ValueKind::Float) {
            Err(PlanError::DuplicateAspectType { name }) => assert_eq!(name, "FUEL_BURN"),
            other => panic!("expected DuplicateAspectType, got {other:?}"),
        }
        assert!(reg.register_with_code(3, "MY_COST", ValueKind::Float).is_err());
    }

    #[test]
    fn test_explicit_code_moves_next_code() {
        let mut reg = AspectTypeRegistry::new();
        reg.register_with_code(40, "LATE", ValueKind::Float).unwrap();
        let t = reg.register("LATER", ValueKind::Float).unwrap();
        assert_eq!(t.code(), 41);
    }

    #[test]
    fn test_clear_extensions() {
        let mut reg = AspectTypeRegistry::new();
        reg.register("FUEL_BURN", ValueKind::Rate).unwrap();
        reg.clear_extensions();
        assert!(reg.lookup("FUEL_BURN").is_none());
        assert_eq!(reg.lookup("RISK"), Some(AspectType::Risk));
    }

    #[test]
    fn test_factory_uses_registered_kind() {
        let mut reg = AspectTypeRegistry::new();
        let t = reg.register("WAIT", ValueKind::Time).unwrap();
        let v = reg.create(t, 1500.4);
        assert_eq!(v.kind(), &ValueKind::Time);
        assert_eq!(v.time_value(), 1500);
    }

    #[test]
    fn test_global_registry() {
        init();
        let t = register("GLOBAL_TEST_ASPECT_A", ValueKind::Rate).unwrap();
        assert_eq!(aspect_type("GLOBAL_TEST_ASPECT_A"), Some(t));
        assert_eq!(t.to_string(), "GLOBAL_TEST_ASPECT_A");
        assert_eq!(new_value(t, 2.0).kind(), &ValueKind::Rate);
        assert_eq!(AspectValue::new(t, 2.0).kind(), &ValueKind::Rate);
        assert!(register("GLOBAL_TEST_ASPECT_A", ValueKind::Float).is_err());
    }
}
