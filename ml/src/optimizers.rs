//! Parameter update rules. An optimizer sees the parameters of a model in the same
//! order on every step and may keep per-parameter state.
use crate::{models::Parameter, ModelError, ModelResult, WeightPrecision};
use ndarray::{Array, ArrayD};

pub trait Optimizer {
    /// Applies one update using the gradients stored in the parameters.
    fn step(&mut self, parameters: &mut [&mut Parameter]) -> ModelResult<()>;

    fn learning_rate(&self) -> WeightPrecision;
}

fn check_learning_rate(learning_rate: WeightPrecision) -> ModelResult<()> {
    if !learning_rate.is_finite() || learning_rate <= 0.0 {
        return Err(ModelError::InvalidConfig(format!(
            "learning rate must be positive, got {}",
            learning_rate
        )));
    }
    Ok(())
}

/// Plain gradient descent: p <- p - eta * grad.
#[derive(Debug, Clone)]
pub struct GradientDescent {
    learning_rate: WeightPrecision,
}

impl GradientDescent {
    pub fn new(learning_rate: WeightPrecision) -> ModelResult<Self> {
        check_learning_rate(learning_rate)?;
        Ok(Self { learning_rate })
    }
}

impl Optimizer for GradientDescent {
    fn step(&mut self, parameters: &mut [&mut Parameter]) -> ModelResult<()> {
        let eta = self.learning_rate;
        for p in parameters.iter_mut() {
            p.value.zip_mut_with(&p.grad, |w, g| *w -= eta * g);
        }
        Ok(())
    }

    fn learning_rate(&self) -> WeightPrecision {
        self.learning_rate
    }
}

/// Adam (Kingma & Ba, 2014, https://arxiv.org/abs/1412.6980) with bias corrected
/// moment estimates.
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: WeightPrecision,
    beta1: WeightPrecision,
    beta2: WeightPrecision,
    epsilon: WeightPrecision,
    t: i32,
    /// First and second moment per parameter, created on the first step.
    moments: Vec<(ArrayD<WeightPrecision>, ArrayD<WeightPrecision>)>,
}

impl Adam {
    pub fn new(learning_rate: WeightPrecision) -> ModelResult<Self> {
        Self::with_betas(learning_rate, 0.9, 0.999, 1e-8)
    }

    pub fn with_betas(
        learning_rate: WeightPrecision,
        beta1: WeightPrecision,
        beta2: WeightPrecision,
        epsilon: WeightPrecision,
    ) -> ModelResult<Self> {
        check_learning_rate(learning_rate)?;
        if !(0.0..1.0).contains(&beta1) || !(0.0..1.0).contains(&beta2) {
            return Err(ModelError::InvalidConfig(format!(
                "Adam betas must lie in [0, 1), got {} and {}",
                beta1, beta2
            )));
        }
        Ok(Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            t: 0,
            moments: Vec::new(),
        })
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            t: 0,
            moments: Vec::new(),
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, parameters: &mut [&mut Parameter]) -> ModelResult<()> {
        if self.moments.is_empty() {
            self.moments = parameters
                .iter()
                .map(|p| {
                    (
                        Array::zeros(p.value.raw_dim()),
                        Array::zeros(p.value.raw_dim()),
                    )
                })
                .collect();
        }
        if self.moments.len() != parameters.len() {
            return Err(ModelError::InvalidConfig(format!(
                "optimizer tracks {} parameters but was handed {}",
                self.moments.len(),
                parameters.len()
            )));
        }

        self.t += 1;
        let (beta1, beta2, eps) = (self.beta1, self.beta2, self.epsilon);
        let correction1 = 1.0 - beta1.powi(self.t);
        let correction2 = 1.0 - beta2.powi(self.t);
        let step_size = self.learning_rate;

        for (p, (m, v)) in parameters.iter_mut().zip(self.moments.iter_mut()) {
            if m.shape() != p.grad.shape() {
                return Err(ModelError::shape(&p.name, m.shape(), p.grad.shape()));
            }
            m.zip_mut_with(&p.grad, |m, g| *m = beta1 * *m + (1.0 - beta1) * g);
            v.zip_mut_with(&p.grad, |v, g| *v = beta2 * *v + (1.0 - beta2) * g * g);

            let update = ndarray::Zip::from(&*m).and(&*v).map_collect(|m, v| {
                step_size * (m / correction1) / ((v / correction2).sqrt() + eps)
            });
            p.value -= &update;
        }
        Ok(())
    }

    fn learning_rate(&self) -> WeightPrecision {
        self.learning_rate
    }
}
