//! Beta-Binomial dose-response model (Teunis et al. 2008).
//!
//! The probability of infection after ingesting `d` organisms is
//!
//! ```text
//! P(d) = 1 - B(alpha, beta + d) / B(alpha, beta)
//!      = 1 - exp(lnG(beta + d) + lnG(alpha + beta) - lnG(alpha + beta + d) - lnG(beta))
//! ```
//!
//! which is evaluated entirely in log space. For large doses the difference of two log-gamma
//! values of nearly equal arguments loses precision, so it is replaced by its asymptotic series.

use statrs::function::gamma::ln_gamma;

use crate::config::DoseResponseParameters;
use crate::errors::{QmraError, Result};

/// Doses above this use the asymptotic expansion of the log-gamma difference.
const ASYMPTOTIC_DOSE: f64 = 1e5;

/// Outcome of one dose-response evaluation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Evaluation {
    pub probability: f64,
    /// The evaluation overflowed or produced NaN and the probability was clamped to 1.
    pub clamped: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BetaBinomial {
    alpha: f64,
    beta: f64,
    ln_gamma_alpha_beta: f64,
    ln_gamma_beta: f64,
}

impl BetaBinomial {
    pub fn new(alpha: f64, beta: f64) -> Result<Self> {
        if !(alpha > 0. && beta > 0.) || !alpha.is_finite() || !beta.is_finite() {
            return Err(QmraError::ValidationError(format!(
                "dose-response parameters must be positive, got alpha={alpha}, beta={beta}"
            )));
        }
        Ok(Self {
            alpha,
            beta,
            ln_gamma_alpha_beta: ln_gamma(alpha + beta),
            ln_gamma_beta: ln_gamma(beta),
        })
    }

    pub fn from_parameters(parameters: &DoseResponseParameters) -> Result<Self> {
        Self::new(parameters.alpha, parameters.beta)
    }

    /// Log of the probability to escape infection, `ln(1 - P(d))`.
    fn ln_escape(&self, dose: f64) -> f64 {
        if dose > ASYMPTOTIC_DOSE {
            // lnG(d + b) - lnG(d + a + b) ~ -a ln d - a (a + 2b - 1) / (2d)
            let a = self.alpha;
            let b = self.beta;
            -a * dose.ln() - a * (a + 2. * b - 1.) / (2. * dose) + self.ln_gamma_alpha_beta
                - self.ln_gamma_beta
        } else {
            ln_gamma(self.beta + dose) + self.ln_gamma_alpha_beta
                - ln_gamma(self.alpha + self.beta + dose)
                - self.ln_gamma_beta
        }
    }

    pub fn evaluate(&self, dose: f64) -> Result<Evaluation> {
        if dose.is_nan() || dose < 0. {
            return Err(QmraError::ValidationError(format!(
                "dose must be non-negative, got {dose}"
            )));
        }
        if dose == 0. {
            return Ok(Evaluation {
                probability: 0.,
                clamped: false,
            });
        }

        let probability = -self.ln_escape(dose).exp_m1();
        if !probability.is_finite() {
            log::trace!("Dose-response evaluation for dose {dose} is unstable, clamping to 1.");
            return Ok(Evaluation {
                probability: 1.,
                clamped: true,
            });
        }
        Ok(Evaluation {
            probability: probability.clamp(0., 1.),
            clamped: false,
        })
    }

    pub fn infection_probability(&self, dose: f64) -> Result<f64> {
        Ok(self.evaluate(dose)?.probability)
    }
}

/// Probability that a single person ingesting `dose` organisms becomes infected.
pub fn infection_probability(dose: f64, alpha: f64, beta: f64) -> Result<f64> {
    BetaBinomial::new(alpha, beta)?.infection_probability(dose)
}
