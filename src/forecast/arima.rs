//! Fixed-order ARIMA fitting by conditional sum of squares
//!
//! Coefficients are searched with Nelder-Mead in an unconstrained space and
//! mapped into (-0.99, 0.99) through `tanh`, which keeps the AR and MA
//! polynomials away from the unit circle without explicit bounds handling.

use super::ForecastError;
use crate::error::OrchestrationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const COEFFICIENT_BOUND: f64 = 0.99;
const MAX_ITERATIONS: usize = 500;
const TOLERANCE: f64 = 1e-10;

/// Model order (p, d, q)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl ArimaOrder {
    pub const fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }

    /// Shortest series the model can be fitted on
    pub fn min_observations(&self) -> usize {
        self.p + self.d + 1
    }
}

impl Default for ArimaOrder {
    fn default() -> Self {
        Self::new(1, 1, 1)
    }
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.p, self.d, self.q)
    }
}

impl FromStr for ArimaOrder {
    type Err = OrchestrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s
            .trim()
            .trim_start_matches('(')
            .trim_end_matches(')')
            .split(',')
            .map(str::trim)
            .collect();

        if parts.len() != 3 {
            return Err(OrchestrationError::ConfigError(format!(
                "ARIMA order '{}' must have the form p,d,q",
                s
            )));
        }

        let mut values = [0usize; 3];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|e| {
                OrchestrationError::ConfigError(format!("ARIMA order '{}' is invalid: {}", s, e))
            })?;
        }

        Ok(Self::new(values[0], values[1], values[2]))
    }
}

/// A fitted model, ready to forecast
#[derive(Debug, Clone)]
pub struct FittedArima {
    order: ArimaOrder,
    ar: Vec<f64>,
    ma: Vec<f64>,
    /// Last value of each differencing level, index 0 = original series
    level_tails: Vec<f64>,
    differenced: Vec<f64>,
    residuals: Vec<f64>,
}

impl FittedArima {
    pub fn ar_coefficients(&self) -> &[f64] {
        &self.ar
    }

    pub fn ma_coefficients(&self) -> &[f64] {
        &self.ma
    }

    /// Forecast `steps` values past the end of the series
    pub fn forecast(&self, steps: usize) -> Result<Vec<f64>, ForecastError> {
        let mut w = self.differenced.clone();
        let mut e = self.residuals.clone();

        for _ in 0..steps {
            let t = w.len();
            let mut next = 0.0;
            for (i, phi) in self.ar.iter().enumerate() {
                if let Some(lag) = t.checked_sub(i + 1) {
                    next += phi * w[lag];
                }
            }
            for (j, theta) in self.ma.iter().enumerate() {
                if let Some(lag) = t.checked_sub(j + 1) {
                    next += theta * e[lag];
                }
            }
            w.push(next);
            // future shocks have zero expectation
            e.push(0.0);
        }

        let mut path: Vec<f64> = w.split_off(self.differenced.len());

        // Undo differencing from the innermost level outwards
        for level in (0..self.order.d).rev() {
            let mut previous = self.level_tails[level];
            for value in path.iter_mut() {
                previous += *value;
                *value = previous;
            }
        }

        if path.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::FitFailed(
                "forecast produced non-finite values".to_string(),
            ));
        }

        Ok(path)
    }
}

/// Fit an ARIMA model of the given order
pub fn fit(series: &[f64], order: ArimaOrder) -> Result<FittedArima, ForecastError> {
    if series.iter().any(|v| !v.is_finite()) {
        return Err(ForecastError::FitFailed(
            "series contains non-finite values".to_string(),
        ));
    }

    if series.len() < order.min_observations() {
        return Err(ForecastError::FitFailed(format!(
            "need at least {} monthly points for ARIMA{}, got {}",
            order.min_observations(),
            order,
            series.len()
        )));
    }

    let mut level_tails = Vec::with_capacity(order.d);
    let mut w = series.to_vec();
    for _ in 0..order.d {
        level_tails.push(*w.last().unwrap_or(&0.0));
        w = w.windows(2).map(|pair| pair[1] - pair[0]).collect();
    }

    let dims = order.p + order.q;
    let best = if dims == 0 {
        Vec::new()
    } else {
        nelder_mead(|u| conditional_sse(&w, &constrain(u), order.p), &vec![0.0; dims])
    };

    let params = constrain(&best);
    let (ar, ma) = params.split_at(order.p);
    let residuals = residuals(&w, ar, ma);

    if residuals.iter().any(|v| !v.is_finite()) {
        return Err(ForecastError::FitFailed(
            "model residuals did not converge".to_string(),
        ));
    }

    Ok(FittedArima {
        order,
        ar: ar.to_vec(),
        ma: ma.to_vec(),
        level_tails,
        differenced: w,
        residuals,
    })
}

fn constrain(raw: &[f64]) -> Vec<f64> {
    raw.iter().map(|u| COEFFICIENT_BOUND * u.tanh()).collect()
}

/// Residuals, conditioning on the first `p` observations
fn residuals(w: &[f64], ar: &[f64], ma: &[f64]) -> Vec<f64> {
    let p = ar.len();
    let mut e = vec![0.0; w.len()];

    for t in p..w.len() {
        let mut predicted = 0.0;
        for (i, phi) in ar.iter().enumerate() {
            predicted += phi * w[t - i - 1];
        }
        for (j, theta) in ma.iter().enumerate() {
            if let Some(lag) = t.checked_sub(j + 1) {
                predicted += theta * e[lag];
            }
        }
        e[t] = w[t] - predicted;
    }

    e
}

fn conditional_sse(w: &[f64], params: &[f64], p: usize) -> f64 {
    let (ar, ma) = params.split_at(p);
    residuals(w, ar, ma)
        .iter()
        .skip(p)
        .map(|e| e * e)
        .sum()
}

/// Minimize `f` starting from `start` with the Nelder-Mead simplex method
fn nelder_mead<F>(f: F, start: &[f64]) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let n = start.len();
    let score = |x: &[f64]| {
        let v = f(x);
        if v.is_finite() {
            v
        } else {
            f64::MAX
        }
    };

    let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
    simplex.push((start.to_vec(), score(start)));
    for i in 0..n {
        let mut vertex = start.to_vec();
        vertex[i] += 0.5;
        let value = score(&vertex);
        simplex.push((vertex, value));
    }

    for _ in 0..MAX_ITERATIONS {
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));

        let best = simplex[0].1;
        let worst = simplex[n].1;
        if (worst - best).abs() <= TOLERANCE * (1.0 + best.abs()) {
            break;
        }

        let centroid: Vec<f64> = (0..n)
            .map(|k| simplex[..n].iter().map(|(x, _)| x[k]).sum::<f64>() / n as f64)
            .collect();
        let along = |scale: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(&simplex[n].0)
                .map(|(c, w)| c + scale * (w - c))
                .collect()
        };

        let reflected = along(-1.0);
        let reflected_value = score(&reflected);

        if reflected_value < simplex[0].1 {
            let expanded = along(-2.0);
            let expanded_value = score(&expanded);
            simplex[n] = if expanded_value < reflected_value {
                (expanded, expanded_value)
            } else {
                (reflected, reflected_value)
            };
        } else if reflected_value < simplex[n - 1].1 {
            simplex[n] = (reflected, reflected_value);
        } else {
            let contracted = along(0.5);
            let contracted_value = score(&contracted);
            if contracted_value < simplex[n].1 {
                simplex[n] = (contracted, contracted_value);
            } else {
                // shrink towards the best vertex
                let anchor = simplex[0].0.clone();
                for vertex in simplex.iter_mut().skip(1) {
                    let shrunk: Vec<f64> = anchor
                        .iter()
                        .zip(&vertex.0)
                        .map(|(a, x)| a + 0.5 * (x - a))
                        .collect();
                    let value = score(&shrunk);
                    *vertex = (shrunk, value);
                }
            }
        }
    }

    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
    simplex.swap_remove(0).0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_parsing() {
        assert_eq!("1,1,1".parse::<ArimaOrder>().unwrap(), ArimaOrder::new(1, 1, 1));
        assert_eq!("(2, 0, 1)".parse::<ArimaOrder>().unwrap(), ArimaOrder::new(2, 0, 1));
        assert!("1,x,1".parse::<ArimaOrder>().is_err());
        assert_eq!(ArimaOrder::default().to_string(), "(1,1,1)");
    }

    #[test]
    fn test_nelder_mead_finds_quadratic_minimum() {
        let best = nelder_mead(|x| (x[0] - 0.3).powi(2) + (x[1] + 0.2).powi(2), &[0.0, 0.0]);
        assert!((best[0] - 0.3).abs() < 1e-3);
        assert!((best[1] + 0.2).abs() < 1e-3);
    }

    #[test]
    fn test_recovers_ar_coefficient() {
        // w_t = 0.6 * w_{t-1} + e_t, shocks from a small LCG
        let mut state: u64 = 42;
        let mut w = vec![0.0];
        for _ in 0..300 {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let shock = ((state >> 33) as f64 / (1u64 << 31) as f64) * 2.0 - 1.0;
            let prev = *w.last().unwrap();
            w.push(0.6 * prev + shock);
        }

        let fitted = fit(&w, ArimaOrder::new(1, 0, 0)).unwrap();
        let phi = fitted.ar_coefficients()[0];
        assert!((phi - 0.6).abs() < 0.15, "phi = {}", phi);
    }

    #[test]
    fn test_linear_trend_continues() {
        let series: Vec<f64> = (0..12).map(|i| 100.0 + 10.0 * i as f64).collect();
        let fitted = fit(&series, ArimaOrder::default()).unwrap();
        let forecast = fitted.forecast(3).unwrap();

        assert_eq!(forecast.len(), 3);
        // constant differences, no constant term: forecast keeps moving upward
        assert!(forecast[0] > 210.0);
        assert!(forecast.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_constant_series_stays_flat() {
        let fitted = fit(&[500.0; 8], ArimaOrder::default()).unwrap();
        let forecast = fitted.forecast(4).unwrap();
        for value in forecast {
            assert!((value - 500.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_too_short_series_is_reported() {
        let err = fit(&[42.0], ArimaOrder::default()).unwrap_err();
        assert!(matches!(err, ForecastError::FitFailed(_)));
    }

    #[test]
    fn test_non_finite_input_is_reported() {
        let err = fit(&[1.0, f64::NAN, 3.0, 4.0], ArimaOrder::default()).unwrap_err();
        assert!(matches!(err, ForecastError::FitFailed(_)));
    }
}
