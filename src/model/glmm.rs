//! Zero-inflated negative binomial mixed model with a random intercept.
//!
//! Count component: `log μ = Xβ + Zu + offset`, `u ~ N(0, τ²I)`, one `u` per
//! subject. Zero-inflation component: intercept only.
//!
//! Fitting alternates an EM step for structural zeros with a penalized
//! quasi-likelihood (PQL) step: under the NB working weights, β and u solve
//! Henderson's mixed model equations
//!
//! ```text
//! | X'WX   X'WZ          | |β|   |X'Wz|
//! | Z'WX   Z'WZ + I/τ²   | |u| = |Z'Wz|
//! ```
//!
//! τ² is updated with the effective-degrees-of-freedom fixed point
//! `u'u / (q - tr(C⁻¹_uu)/τ²)`, which shares its stationary point with the
//! plain EM step `(u'u + tr(C⁻¹_uu)) / q` but moves geometrically, not
//! sublinearly, when τ² heads towards zero. Once τ² reaches
//! `var_lower_bound` it stays there and the fit is reported as a boundary
//! fit.
//!
//! Convergence is judged on the relative change of the penalized
//! log-likelihood `ℓ(y | β, u) - u'u / (2τ²)`, as in GLM deviance checks.
//! Standard errors come from `diag(C⁻¹)` and, like the fixed-effects fit,
//! treat π and θ as known.

use crate::data::GroupIndex;
use crate::error::{DaaError, Result};
use crate::model::zinb::{
    check_inputs, compute_mu, e_step, estimate_dispersion, initial_parameters, linear_predictor,
    logistic, zero_std_error, zi_intercept_update, zinb_log_likelihood, ZinbConfig,
};
use crate::model::{CoefficientEntry, CoefficientTable, INTERCEPT};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Random-intercept ZINB fit for one feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZinbMixedFit {
    /// Conditional (count) component: `(Intercept)` then covariates.
    pub conditional: CoefficientTable,
    /// Zero-inflation component: `(Intercept)` on the logit scale.
    pub zero: CoefficientTable,
    /// Estimated dispersion (theta).
    pub theta: f64,
    /// Random-intercept variance (τ²).
    pub tau2: f64,
    /// τ² was held at its lower bound.
    pub boundary: bool,
    /// Estimated structural-zero probability.
    pub zero_prob: f64,
    /// Predicted random intercepts, one per group.
    #[serde(skip)]
    pub random_effects: Vec<f64>,
    /// Number of groups (subjects).
    pub n_groups: usize,
    /// Number of outer iterations.
    pub iterations: usize,
}

/// Fit a random-intercept ZINB model to one feature.
///
/// # Arguments
/// * `y` - Counts for one feature
/// * `x` - Fixed-effects design matrix with the intercept in column 0
/// * `coef_names` - Names of the columns of `x`
/// * `offset` - Offset added to the linear predictor (zeros for none)
/// * `groups` - Subject membership of each sample
/// * `config` - Fitting configuration
pub fn fit_zinb_mixed(
    y: &[f64],
    x: &DMatrix<f64>,
    coef_names: &[String],
    offset: &[f64],
    groups: &GroupIndex,
    config: &ZinbConfig,
) -> Result<ZinbMixedFit> {
    check_inputs(y, x, coef_names, offset)?;
    if groups.n_samples() != y.len() {
        return Err(DaaError::DimensionMismatch {
            expected: y.len(),
            actual: groups.n_samples(),
        });
    }

    let p = x.ncols();
    let q = groups.n_groups();

    let (mut beta, mut gamma, mut theta) = initial_parameters(y, p, offset);
    let mut u = vec![0.0; q];
    let mut tau2: f64 = 0.5;
    let mut boundary = false;

    let mut prev_objective = f64::NEG_INFINITY;
    let mut converged = false;
    let mut iterations = 0;
    let mut c_inv = DMatrix::zeros(p + q, p + q);

    for iteration in 0..config.max_iter {
        iterations = iteration + 1;

        let eta = conditional_predictor(x, &beta, &u, offset, groups);
        let mu = compute_mu(&eta);
        let w = e_step(y, &mu, logistic(gamma), theta);
        gamma = zi_intercept_update(&w);

        let (c, rhs) = mixed_model_equations(
            x, y, &w, &eta, &mu, offset, groups, theta, tau2, config.ridge,
        );
        c_inv = c.try_inverse().ok_or_else(|| {
            DaaError::FitFailure("singular mixed model equations".to_string())
        })?;
        let solution = &c_inv * rhs;

        beta = solution.iter().take(p).cloned().collect();
        u = solution.iter().skip(p).cloned().collect();
        if beta.iter().chain(u.iter()).any(|v| !v.is_finite()) {
            return Err(DaaError::FitFailure(format!(
                "non-finite estimates at iteration {}",
                iterations
            )));
        }

        // Penalty of the equations just solved, before τ² moves
        let ss_u: f64 = u.iter().map(|v| v * v).sum();
        let penalty = 0.5 * ss_u / tau2;
        if !boundary {
            let trace_uu: f64 = (p..p + q).map(|j| c_inv[(j, j)]).sum();
            tau2 = update_tau2(ss_u, trace_uu, tau2, q);
            if !tau2.is_finite() {
                return Err(DaaError::FitFailure(format!(
                    "non-finite random-intercept variance at iteration {}",
                    iterations
                )));
            }
            if tau2 <= config.var_lower_bound {
                tau2 = config.var_lower_bound;
                boundary = true;
            }
        }

        let mu_new = compute_mu(&conditional_predictor(x, &beta, &u, offset, groups));
        theta = estimate_dispersion(y, &mu_new, &w, theta);

        let objective = zinb_log_likelihood(y, &mu_new, logistic(gamma), theta) - penalty;
        if !objective.is_finite() {
            return Err(DaaError::FitFailure(format!(
                "non-finite penalized log-likelihood at iteration {}",
                iterations
            )));
        }

        if (objective - prev_objective).abs() / (objective.abs() + 0.1) < config.tol {
            converged = true;
            break;
        }
        prev_objective = objective;
    }

    if !converged {
        return Err(DaaError::FitFailure(format!(
            "PQL did not converge after {} iterations",
            iterations
        )));
    }

    let pi = logistic(gamma);
    let conditional_rows = coef_names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let v = c_inv[(j, j)];
            let se = if v > 0.0 { v.sqrt() } else { f64::NAN };
            CoefficientEntry::wald(name, beta[j], se)
        })
        .collect();

    Ok(ZinbMixedFit {
        conditional: CoefficientTable {
            rows: conditional_rows,
        },
        zero: CoefficientTable {
            rows: vec![CoefficientEntry::wald(INTERCEPT, gamma, zero_std_error(y.len(), pi))],
        },
        theta,
        tau2,
        boundary,
        zero_prob: pi,
        random_effects: u,
        n_groups: q,
        iterations,
    })
}

/// η = Xβ + u[group] + offset.
fn conditional_predictor(
    x: &DMatrix<f64>,
    beta: &[f64],
    u: &[f64],
    offset: &[f64],
    groups: &GroupIndex,
) -> Vec<f64> {
    linear_predictor(x, beta, offset)
        .into_iter()
        .zip(groups.group_indices.iter())
        .map(|(eta, &g)| eta + u[g])
        .collect()
}

/// Assemble Henderson's coefficient matrix and right-hand side.
///
/// Z is a group indicator, so Z'WZ is diagonal and X'WZ accumulates by group.
#[allow(clippy::too_many_arguments)]
fn mixed_model_equations(
    x: &DMatrix<f64>,
    y: &[f64],
    w: &[f64],
    eta: &[f64],
    mu: &[f64],
    offset: &[f64],
    groups: &GroupIndex,
    theta: f64,
    tau2: f64,
    ridge: f64,
) -> (DMatrix<f64>, DVector<f64>) {
    let p = x.ncols();
    let q = groups.n_groups();
    let mut c = DMatrix::zeros(p + q, p + q);
    let mut rhs = DVector::zeros(p + q);

    for i in 0..y.len() {
        let mui = mu[i].max(1e-10);
        let weight = ((1.0 - w[i]) * mui / (1.0 + mui / theta)).max(1e-10);
        let z = eta[i] - offset[i] + (y[i] - mui) / mui;
        let g = p + groups.group_indices[i];
        let xi = x.row(i);

        for j in 0..p {
            rhs[j] += weight * xi[j] * z;
            for k in 0..p {
                c[(j, k)] += weight * xi[j] * xi[k];
            }
            c[(j, g)] += weight * xi[j];
            c[(g, j)] += weight * xi[j];
        }
        rhs[g] += weight * z;
        c[(g, g)] += weight;
    }

    for j in 0..p {
        c[(j, j)] += ridge;
    }
    for g in p..p + q {
        c[(g, g)] += 1.0 / tau2;
    }

    (c, rhs)
}

/// Next τ² from the current BLUPs.
///
/// `q - tr(C⁻¹_uu)/τ²` is the effective number of random effects. When it
/// collapses to nothing the variance goes to zero.
fn update_tau2(ss_u: f64, trace_uu: f64, tau2: f64, q: usize) -> f64 {
    let q = q as f64;
    let effective = q - trace_uu / tau2;
    if effective > f64::EPSILON * q {
        ss_u / effective
    } else if effective.is_finite() {
        0.0
    } else {
        (ss_u + trace_uu) / q
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 8 subjects × 3 visits; subjects 4-7 treated with a ~3x effect,
    /// subject-level baselines vary.
    fn longitudinal() -> (Vec<f64>, DMatrix<f64>, GroupIndex) {
        let baselines = [10.0, 14.0, 8.0, 12.0, 30.0, 42.0, 24.0, 36.0];
        let jitter = [-1.0, 0.0, 1.0];
        let mut y = Vec::new();
        let mut treat = Vec::new();
        let mut ids = Vec::new();
        for (s, base) in baselines.iter().enumerate() {
            for j in jitter {
                y.push(base + j);
                treat.push(if s >= 4 { 1.0 } else { 0.0 });
                ids.push(format!("subject_{}", s));
            }
        }
        let n = y.len();
        let x = DMatrix::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { treat[i] });
        (y, x, GroupIndex::from_ids(&ids))
    }

    fn names() -> Vec<String> {
        vec![INTERCEPT.to_string(), "treat".to_string()]
    }

    #[test]
    fn test_mixed_fit_detects_treatment() {
        let (y, x, groups) = longitudinal();
        let offset = vec![0.0; y.len()];
        let fit = fit_zinb_mixed(&y, &x, &names(), &offset, &groups, &ZinbConfig::default()).unwrap();

        let treat = fit.conditional.get("treat").unwrap();
        assert!(treat.estimate > 0.8, "expected ~ln(3), got {}", treat.estimate);
        assert!(treat.std_error > 0.0);
        assert_eq!(fit.n_groups, 8);
        assert_eq!(fit.random_effects.len(), 8);
        assert!(fit.tau2 > 0.0);
        assert!(!fit.boundary);
    }

    #[test]
    fn test_mixed_table_layout() {
        let (y, x, groups) = longitudinal();
        let offset = vec![0.0; y.len()];
        let fit = fit_zinb_mixed(&y, &x, &names(), &offset, &groups, &ZinbConfig::default()).unwrap();

        let terms: Vec<&str> = fit.conditional.rows.iter().map(|r| r.term.as_str()).collect();
        assert_eq!(terms, vec![INTERCEPT, "treat"]);
        assert_eq!(fit.zero.len(), 1);
        assert!(fit.theta > 0.0);
        assert!(fit.zero_prob > 0.0 && fit.zero_prob < 1.0);
    }

    #[test]
    fn test_identical_subjects_fit_on_boundary() {
        let mut y = Vec::new();
        let mut treat = Vec::new();
        let mut ids = Vec::new();
        for s in 0..8 {
            let base = if s >= 4 { 30.0 } else { 10.0 };
            for j in [-1.0, 0.0, 1.0] {
                y.push(base + j);
                treat.push(if s >= 4 { 1.0 } else { 0.0 });
                ids.push(format!("subject_{}", s));
            }
        }
        let x = DMatrix::from_fn(y.len(), 2, |i, j| if j == 0 { 1.0 } else { treat[i] });
        let groups = GroupIndex::from_ids(&ids);
        let config = ZinbConfig::default();

        let fit = fit_zinb_mixed(&y, &x, &names(), &vec![0.0; y.len()], &groups, &config).unwrap();

        assert!(fit.boundary);
        assert_eq!(fit.tau2, config.var_lower_bound);
        assert!(fit.random_effects.iter().all(|u| u.abs() < 1e-4));
        let treat = fit.conditional.get("treat").unwrap();
        assert!((treat.estimate - 3.0_f64.ln()).abs() < 0.05);
    }

    #[test]
    fn test_tau2_update_fixed_point() {
        // (u'u + tr) / q == τ² is left unchanged
        let tau2 = 0.4;
        let trace = 0.6;
        let ss_u = 4.0 * tau2 - trace;
        assert!((update_tau2(ss_u, trace, tau2, 4) - tau2).abs() < 1e-12);

        // Fully shrunk effects: no effective random effects left
        assert_eq!(update_tau2(0.0, 4.0 * tau2, tau2, 4), 0.0);
    }

    #[test]
    fn test_group_length_mismatch() {
        let (y, x, _) = longitudinal();
        let short = GroupIndex::from_ids(&["a".to_string(), "a".to_string()]);
        let result = fit_zinb_mixed(&y, &x, &names(), &vec![0.0; y.len()], &short, &ZinbConfig::default());
        assert!(matches!(result, Err(DaaError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_iteration_limit_reports_failure() {
        let (y, x, groups) = longitudinal();
        let config = ZinbConfig {
            max_iter: 1,
            ..ZinbConfig::default()
        };
        let result = fit_zinb_mixed(&y, &x, &names(), &vec![0.0; y.len()], &groups, &config);
        assert!(matches!(result, Err(DaaError::FitFailure(_))));
    }
}
