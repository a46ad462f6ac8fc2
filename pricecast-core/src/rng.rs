//! Deterministic seed hierarchy.
//!
//! A master seed is expanded into one sub-seed per `(company, backend)`
//! unit via BLAKE3, so a unit's seed does not depend on which other units
//! ran before it or in which order.

use crate::backend::BackendKind;
use crate::domain::CompanyId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedHierarchy {
    master_seed: u64,
}

impl SeedHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Sub-seed for one training unit.
    pub fn unit_seed(&self, company: CompanyId, backend: BackendKind) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(&company.0.to_le_bytes());
        hasher.update(backend.name().as_bytes());
        let hash = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(bytes)
    }
}
