use std::time::Instant;
use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{CircuitError, ILL_CONDITIONED_THRESHOLD};
use crate::Result;

/// Solver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    pub method: SolverMethod,
    /// Residual norm under which a solve counts as successful
    pub tolerance: f64,
    pub check_condition_number: bool,
    /// Condition numbers above this are logged as ill-conditioned
    pub condition_threshold: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            method: SolverMethod::Lu,
            tolerance: 1e-12,
            check_condition_number: true,
            condition_threshold: ILL_CONDITIONED_THRESHOLD,
        }
    }
}

/// Available solver methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverMethod {
    /// Direct LU decomposition with partial pivoting
    Lu,
    /// QR decomposition
    Qr,
}

/// Solver statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverStats {
    pub method_used: SolverMethod,
    pub residual_norm: f64,
    pub solve_time: f64,
    pub success: bool,
    pub condition_number: Option<f64>,
}

/// Dense linear system solver
#[derive(Debug, Clone, Default)]
pub struct LinearSolver {
    config: SolverConfig,
}

impl LinearSolver {
    /// Create a new solver with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new solver with custom configuration
    pub fn with_config(config: SolverConfig) -> Self {
        LinearSolver { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Solve the linear system Ax = b
    pub fn solve_dense(&self, matrix: &DMatrix<f64>, rhs: &DVector<f64>) -> Result<(DVector<f64>, SolverStats)> {
        let start_time = Instant::now();

        if matrix.nrows() != matrix.ncols() {
            return Err(CircuitError::DimensionMismatch {
                expected: matrix.nrows(),
                actual: matrix.ncols(),
            });
        }

        if matrix.nrows() != rhs.len() {
            return Err(CircuitError::DimensionMismatch {
                expected: matrix.nrows(),
                actual: rhs.len(),
            });
        }

        let solution = match self.config.method {
            SolverMethod::Lu => matrix.clone().lu().solve(rhs),
            SolverMethod::Qr => matrix.clone().qr().solve(rhs),
        };

        let solution = match solution {
            Some(solution) if solution.iter().all(|x| x.is_finite()) => solution,
            _ => {
                let condition_number = condition_number(matrix);
                warn!(
                    "{:?} decomposition failed, matrix condition number {:.2e}",
                    self.config.method, condition_number
                );
                return Err(CircuitError::SingularSystem {
                    condition_number: Some(condition_number),
                });
            }
        };

        let condition_number = if self.config.check_condition_number {
            let cond = condition_number(matrix);
            if cond > self.config.condition_threshold {
                warn!("Circuit matrix is poorly conditioned: {:.2e}", cond);
            }
            Some(cond)
        } else {
            None
        };

        let residual_norm = (matrix * &solution - rhs).norm();
        let scale = rhs.norm().max(1.0);
        let stats = SolverStats {
            method_used: self.config.method,
            residual_norm,
            solve_time: start_time.elapsed().as_secs_f64(),
            // relative to the RHS, lenient for direct methods
            success: residual_norm <= self.config.tolerance * 1000.0 * scale,
            condition_number,
        };
        debug!(
            "Solved {}x{} system: residual {:.2e}, {:.3}ms",
            matrix.nrows(),
            matrix.ncols(),
            stats.residual_norm,
            stats.solve_time * 1000.0
        );

        Ok((solution, stats))
    }
}

/// 2-norm condition number from the singular values
pub fn condition_number(matrix: &DMatrix<f64>) -> f64 {
    if matrix.is_empty() {
        return 1.0;
    }
    let singular_values = matrix.singular_values();
    let max = singular_values.max();
    let min = singular_values.min();

    if min > 0.0 && min.is_finite() {
        max / min
    } else {
        f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_lu_solver() {
        let solver = LinearSolver::new();

        // [2 1; 1 2] * [x; y] = [3; 3]
        let matrix = DMatrix::from_row_slice(2, 2, &[2.0, 1.0, 1.0, 2.0]);
        let rhs = DVector::from_vec(vec![3.0, 3.0]);

        let (solution, stats) = solver.solve_dense(&matrix, &rhs).unwrap();

        assert!((solution[0] - 1.0).abs() < 1e-10);
        assert!((solution[1] - 1.0).abs() < 1e-10);
        assert!(stats.success);
        assert_eq!(stats.method_used, SolverMethod::Lu);
        assert!((stats.condition_number.unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_dense_qr_solver() {
        let solver = LinearSolver::with_config(SolverConfig {
            method: SolverMethod::Qr,
            check_condition_number: false,
            ..SolverConfig::default()
        });
        let matrix = DMatrix::from_row_slice(2, 2, &[4.0, 0.0, 0.0, 2.0]);
        let rhs = DVector::from_vec(vec![8.0, 1.0]);

        let (solution, stats) = solver.solve_dense(&matrix, &rhs).unwrap();
        assert!((solution[0] - 2.0).abs() < 1e-10);
        assert!((solution[1] - 0.5).abs() < 1e-10);
        assert_eq!(stats.condition_number, None);
    }

    #[test]
    fn test_singular_matrix() {
        let solver = LinearSolver::new();
        let matrix = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let rhs = DVector::from_vec(vec![1.0, 2.0]);

        let err = solver.solve_dense(&matrix, &rhs).unwrap_err();
        assert!(matches!(err, CircuitError::SingularSystem { .. }));
        assert!(err.is_ill_conditioned());
    }

    #[test]
    fn test_dimension_mismatch() {
        let solver = LinearSolver::new();
        let matrix = DMatrix::<f64>::identity(2, 2);
        let rhs = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        assert!(matches!(
            solver.solve_dense(&matrix, &rhs),
            Err(CircuitError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_condition_number_of_identity() {
        assert!((condition_number(&DMatrix::identity(4, 4)) - 1.0).abs() < 1e-12);
    }
}
