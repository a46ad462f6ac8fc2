//! Persisted model registry resolved against the enabled backends.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{ModelEntry, ModelId};

use super::BackendKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredBackend {
    pub model_id: ModelId,
    pub kind: BackendKind,
}

/// Backends to run, each bound to its persisted model id, in registry order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendRegistry {
    entries: Vec<RegisteredBackend>,
}

impl BackendRegistry {
    /// Match persisted model entries by name. Unknown names and backends
    /// not in `enabled` are left out; an unknown name is logged.
    pub fn resolve(models: &[ModelEntry], enabled: &[BackendKind]) -> Self {
        let mut entries = Vec::new();
        for model in models {
            match model.name.parse::<BackendKind>() {
                Ok(kind) if enabled.contains(&kind) => {
                    if entries.iter().any(|e: &RegisteredBackend| e.kind == kind) {
                        warn!(model_id = %model.id, name = %model.name, "duplicate registry entry ignored");
                        continue;
                    }
                    entries.push(RegisteredBackend {
                        model_id: model.id,
                        kind,
                    });
                }
                Ok(_) => {}
                Err(_) => warn!(model_id = %model.id, name = %model.name, "unknown model in registry"),
            }
        }
        Self { entries }
    }

    pub fn entries(&self) -> &[RegisteredBackend] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn model_id(&self, kind: BackendKind) -> Option<ModelId> {
        self.entries.iter().find(|e| e.kind == kind).map(|e| e.model_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: i64, name: &str) -> ModelEntry {
        ModelEntry {
            id: ModelId(id),
            name: name.into(),
        }
    }

    #[test]
    fn resolves_known_names_in_registry_order() {
        let models = vec![entry(3, "XGBoost"), entry(1, "lstm"), entry(2, "gru"), entry(9, "prophet")];
        let registry = BackendRegistry::resolve(&models, &BackendKind::ALL);
        let kinds: Vec<_> = registry.entries().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![BackendKind::GradientBoosting, BackendKind::Lstm, BackendKind::Gru]);
        assert_eq!(registry.model_id(BackendKind::GradientBoosting), Some(ModelId(3)));
    }

    #[test]
    fn disabled_backends_are_skipped() {
        let models = vec![entry(1, "lstm"), entry(3, "xgboost")];
        let registry = BackendRegistry::resolve(&models, &[BackendKind::GradientBoosting]);
        assert_eq!(registry.entries().len(), 1);
        assert_eq!(registry.model_id(BackendKind::Lstm), None);
    }
}
