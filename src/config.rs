use crate::error::{Error, Result};
use crate::solver::UnknownPolicy;
use crate::types::Sort;

/// When the model decoder materializes regions.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum DecodeMode {
    /// Decode a region on its first inspection.
    #[default]
    Lazy,
    /// Decode every region of the memory up front.
    Eager,
}

/// Parameters of the symbolic heap core.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Width of lengths, sizes and indices.
    pub size_width: u32,
    /// Steps a state may take before it is interrupted. `None` means unbounded.
    pub step_budget: Option<u64>,
    pub unknown_policy: UnknownPolicy,
    pub decode_mode: DecodeMode,
    /// Largest concrete copy range enumerated key by key during decoding.
    pub eager_range_limit: u64,
    /// Rounds of bound propagation per numeric constraint.
    pub propagation_rounds: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            size_width: 32,
            step_budget: None,
            unknown_policy: UnknownPolicy::default(),
            decode_mode: DecodeMode::default(),
            eager_range_limit: 64,
            propagation_rounds: 8,
        }
    }
}

impl CoreConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=64).contains(&self.size_width) {
            return Err(Error::InvalidConfig(format!(
                "size width should be in the range 1..=64, got {}",
                self.size_width
            )));
        }
        if self.step_budget == Some(0) {
            return Err(Error::InvalidConfig("step budget should be positive".to_string()));
        }
        if self.propagation_rounds == 0 {
            return Err(Error::InvalidConfig("at least one propagation round is required".to_string()));
        }
        Ok(())
    }

    /// Sort of lengths, sizes and indices.
    pub fn size_sort(&self) -> Sort {
        Sort::bv(self.size_width)
    }
}
