use log::debug;
use thiserror::Error;

use super::optimizer::{FitnessFunction, Optimizer};

const INV_GOLDEN_RATIO: f64 = 0.618_033_988_749_894_9;
const GOLDEN_RATIO: f64 = 1.618_033_988_749_894_9;

/// Derivative-free maximiser of a unimodal scalar function.
///
/// The search first walks uphill from the initial value with growing steps
/// until the fitness drops again, which brackets a maximum. The bracket is
/// then shrunk by golden-section steps until its width falls below the
/// relative tolerance.
pub struct GoldenSection<F: FitnessFunction> {
    fitness_function: F,
    initial_value: Option<f64>,
    initial_step: f64,
    tolerance: f64,
    max_bracket_iterations: u32,
    max_iterations: u32,

    bracket: Option<Bracket>,
    iterations: u32,
    best: Option<(f64, f64)>,
}

#[derive(Debug, Clone, Copy)]
struct Bracket {
    low: f64,
    high: f64,
    inner_low: (f64, f64),
    inner_high: (f64, f64),
}

impl<F: FitnessFunction> GoldenSection<F> {
    pub fn new(fitness_function: F) -> Self {
        Self {
            fitness_function,
            initial_value: None,
            initial_step: 1.0,
            tolerance: 1e-10,
            max_bracket_iterations: 200,
            max_iterations: 500,

            bracket: None,
            iterations: 0,
            best: None,
        }
    }

    pub fn set_initial_value(&mut self, value: f64) -> Result<(), GoldenSectionError> {
        if !value.is_finite() {
            return Err(GoldenSectionError::InvalidInitialValue { value });
        }
        self.initial_value = Some(value);
        self.reset();

        Ok(())
    }

    pub fn get_iterations(&self) -> u32 {
        self.iterations
    }

    pub fn converged(&self) -> bool {
        match &self.bracket {
            Some(bracket) => {
                let middle = 0.5 * (bracket.low + bracket.high);
                bracket.high - bracket.low <= self.tolerance * (1.0 + middle.abs())
            }
            None => false,
        }
    }

    fn reset(&mut self) {
        self.bracket = None;
        self.iterations = 0;
        self.best = None;
    }

    // NaN fitness counts as the worst possible value
    fn evaluate_tracked(&mut self, value: f64) -> f64 {
        let fitness = self.fitness_function.evaluate(value);
        let fitness = if fitness.is_nan() {f64::NEG_INFINITY} else {fitness};

        match self.best {
            Some((_, best_fitness)) if best_fitness >= fitness => {}
            _ => self.best = Some((value, fitness)),
        }

        fitness
    }

    fn find_bracket(&mut self, start: f64) -> Result<(f64, f64), GoldenSectionError> {
        let mut a = start;
        let mut fa = self.evaluate_tracked(a);
        if !fa.is_finite() {
            return Err(GoldenSectionError::NonFiniteInitialFitness { value: start });
        }

        let mut b = start + self.initial_step;
        let mut fb = self.evaluate_tracked(b);

        // Walk in the uphill direction
        if fb < fa {
            std::mem::swap(&mut a, &mut b);
            std::mem::swap(&mut fa, &mut fb);
        }

        let mut c = b + GOLDEN_RATIO * (b - a);
        let mut fc = self.evaluate_tracked(c);
        let mut bracket_iterations = 0;

        while fc > fb {
            bracket_iterations += 1;
            if bracket_iterations > self.max_bracket_iterations || !c.is_finite() {
                return Err(GoldenSectionError::BracketNotFound { iterations: bracket_iterations });
            }

            a = b;
            b = c;
            fb = fc;
            c = b + GOLDEN_RATIO * (b - a);
            fc = self.evaluate_tracked(c);
        }

        debug!("Bracketed maximum in [{}, {}] after {} expansions", a.min(c), a.max(c), bracket_iterations);

        Ok((a.min(c), a.max(c)))
    }
}

impl<F: FitnessFunction> Optimizer for GoldenSection<F> {
    type Error = GoldenSectionError;

    fn evaluate(&self, value: f64) -> f64 {
        self.fitness_function.evaluate(value)
    }

    fn initialize(&mut self) -> Result<(), GoldenSectionError> {
        let start = self.initial_value.ok_or(GoldenSectionError::InitialValueNotSet)?;
        self.reset();

        let (low, high) = self.find_bracket(start)?;
        let x_low = high - INV_GOLDEN_RATIO * (high - low);
        let x_high = low + INV_GOLDEN_RATIO * (high - low);
        let f_low = self.evaluate_tracked(x_low);
        let f_high = self.evaluate_tracked(x_high);

        self.bracket = Some(Bracket { low, high, inner_low: (x_low, f_low), inner_high: (x_high, f_high) });

        Ok(())
    }

    fn step(&mut self) -> Result<(), GoldenSectionError> {
        let mut bracket = self.bracket.ok_or(GoldenSectionError::NotInitialized)?;

        if bracket.inner_low.1 > bracket.inner_high.1 {
            bracket.high = bracket.inner_high.0;
            bracket.inner_high = bracket.inner_low;
            let x = bracket.high - INV_GOLDEN_RATIO * (bracket.high - bracket.low);
            bracket.inner_low = (x, self.evaluate_tracked(x));
        } else {
            bracket.low = bracket.inner_low.0;
            bracket.inner_low = bracket.inner_high;
            let x = bracket.low + INV_GOLDEN_RATIO * (bracket.high - bracket.low);
            bracket.inner_high = (x, self.evaluate_tracked(x));
        }

        self.bracket = Some(bracket);
        self.iterations += 1;

        Ok(())
    }

    fn run(&mut self) -> Result<(), GoldenSectionError> {
        if self.bracket.is_none() {
            self.initialize()?;
        }

        while !self.converged() && self.iterations < self.max_iterations {
            self.step()?;
        }

        debug!("Golden-section search stopped after {} iterations, best {:?}", self.iterations, self.best);

        Ok(())
    }

    fn get_best_solution(&self) -> Option<(f64, f64)> {
        self.best
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GoldenSectionError {
    #[error("initial value not set")]
    InitialValueNotSet,
    #[error("search not initialized")]
    NotInitialized,
    #[error("invalid initial value {value}")]
    InvalidInitialValue { value: f64 },
    #[error("fitness at the initial value {value} is not finite")]
    NonFiniteInitialFitness { value: f64 },
    #[error("no maximum bracketed after {iterations} expansions")]
    BracketNotFound { iterations: u32 },
}
