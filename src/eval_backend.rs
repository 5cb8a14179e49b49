use rand::SeedableRng;
use rand::rngs::StdRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvalBackend {
    #[default]
    NDArray,
}

impl core::fmt::Display for EvalBackend {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Mutable state threaded through operator evaluation: the backend, the
/// training flag Dropout consults, and the seeded generator behind its masks.
#[derive(Debug, Clone)]
pub struct EvalContext {
    pub backend: EvalBackend,
    pub training: bool,
    rng: StdRng,
}

impl EvalContext {
    pub fn new(seed: u64) -> Self {
        Self {
            backend: EvalBackend::NDArray,
            training: false,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new(0)
    }
}
