// Keeps the history of an iterative fit and decides when it should stop.
#[derive(Debug, Clone)]
pub struct OptimizationTracker {
    evals: Vec<f64>,
    iters: u32,

    termination_criterium: TerminationCriterium,
}

impl OptimizationTracker {
    pub fn new(termination_criterium: TerminationCriterium) -> Self {
        Self {
            evals: Vec::new(),
            iters: 0,
            termination_criterium,
        }
    }

    pub fn iterations(&self) -> u32 {
        self.iters
    }

    pub fn last_eval(&self) -> Option<f64> {
        self.evals.last().copied()
    }

    pub fn max_iterations(&self) -> bool {
        let max_iter = match self.termination_criterium {
            TerminationCriterium::MaxIterations { max_iterations } => Some(max_iterations),
            TerminationCriterium::OneStepConvergenceAbsolute { max_iterations, .. } => max_iterations,
        };

        max_iter.map(|max_iter| self.iters >= max_iter).unwrap_or(false)
    }

    // Absolute change between the two most recent evaluations
    fn last_delta(&self) -> Option<f64> {
        match self.evals.as_slice() {
            [.., prev, curr] => Some((curr - prev).abs()),
            _ => None,
        }
    }

    pub fn converged(&self) -> bool {
        match self.termination_criterium {
            TerminationCriterium::MaxIterations { .. } => false,
            TerminationCriterium::OneStepConvergenceAbsolute { epsilon, .. } => {
                self.last_delta().map(|delta| delta < epsilon).unwrap_or(false)
            }
        }
    }

    // Record a new evaluation. Returns true when the optimization should stop.
    pub fn step(&mut self, new_eval: f64) -> bool {
        self.evals.push(new_eval);
        self.iters += 1;

        self.converged() || self.max_iterations()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TerminationCriterium {
    MaxIterations { max_iterations: u32 },
    OneStepConvergenceAbsolute { epsilon: f64, max_iterations: Option<u32> },
}

impl Default for TerminationCriterium {
    fn default() -> Self {
        TerminationCriterium::OneStepConvergenceAbsolute { epsilon: 1e-2, max_iterations: Some(100) }
    }
}
