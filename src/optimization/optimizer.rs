// Common surface of the scalar optimizers used for likelihood fits.
pub trait Optimizer {
    type Error: std::error::Error;

    // Evaluate the fitness of a candidate value
    fn evaluate(&self, value: f64) -> f64;

    // Prepare the search from the initial value
    fn initialize(&mut self) -> Result<(), Self::Error>;

    // Execute a single optimization step
    fn step(&mut self) -> Result<(), Self::Error>;

    // Run steps until the termination condition is met
    fn run(&mut self) -> Result<(), Self::Error>;

    // Best (value, fitness) pair found so far
    fn get_best_solution(&self) -> Option<(f64, f64)>;
}

pub trait FitnessFunction {
    fn evaluate(&self, value: f64) -> f64;
}

impl<F> FitnessFunction for F
where F: Fn(f64) -> f64 {
    fn evaluate(&self, value: f64) -> f64 {
        self(value)
    }
}
