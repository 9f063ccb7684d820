use crate::layers::dropout::Dropout;
use crate::utils::sigmoid;
use ndarray::{Array2, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

/// Holds gradients for all GRU cell parameters during backpropagation
#[derive(Clone)]
pub struct GRUCellGradients {
    pub w_ir: Array2<f64>,
    pub w_hr: Array2<f64>,
    pub b_ir: Array2<f64>,
    pub b_hr: Array2<f64>,
    pub w_iz: Array2<f64>,
    pub w_hz: Array2<f64>,
    pub b_iz: Array2<f64>,
    pub b_hz: Array2<f64>,
    pub w_ih: Array2<f64>,
    pub w_hh: Array2<f64>,
    pub b_ih: Array2<f64>,
    pub b_hh: Array2<f64>,
}

/// Caches intermediate values during forward pass for the backward
/// computation. `input` is the post-dropout value that fed the gate matmuls.
#[derive(Clone)]
pub struct GRUCellCache {
    pub input: Array2<f64>,
    pub hx: Array2<f64>,
    pub reset_gate: Array2<f64>,
    pub update_gate: Array2<f64>,
    pub new_gate: Array2<f64>,
    pub reset_hidden: Array2<f64>,
    pub dropout_mask: Option<Array2<f64>>,
}

/// GRU cell over column-batched inputs.
///
/// - r_t = σ(W_ir * x_t + b_ir + W_hr * h_{t-1} + b_hr)
/// - z_t = σ(W_iz * x_t + b_iz + W_hz * h_{t-1} + b_hz)
/// - n_t = tanh(W_ih * x_t + b_ih + W_hh * (r_t ⊙ h_{t-1}) + b_hh)
/// - h_t = (1 - z_t) ⊙ h_{t-1} + z_t ⊙ n_t
#[derive(Clone)]
pub struct GRUCell {
    // Reset gate parameters
    pub w_ir: Array2<f64>,
    pub w_hr: Array2<f64>,
    pub b_ir: Array2<f64>,
    pub b_hr: Array2<f64>,

    // Update gate parameters
    pub w_iz: Array2<f64>,
    pub w_hz: Array2<f64>,
    pub b_iz: Array2<f64>,
    pub b_hz: Array2<f64>,

    // New gate parameters
    pub w_ih: Array2<f64>,
    pub w_hh: Array2<f64>,
    pub b_ih: Array2<f64>,
    pub b_hh: Array2<f64>,

    pub hidden_size: usize,
    pub input_dropout: Option<Dropout>,
    pub is_training: bool,
}

impl GRUCell {
    /// Creates new GRU cell with uniform weight initialization
    pub fn new(input_size: usize, hidden_size: usize) -> Self {
        let dist = Uniform::new(-0.1, 0.1);

        let w_ir = Array2::random((hidden_size, input_size), dist);
        let w_hr = Array2::random((hidden_size, hidden_size), dist);
        let b_ir = Array2::zeros((hidden_size, 1));
        let b_hr = Array2::zeros((hidden_size, 1));

        let w_iz = Array2::random((hidden_size, input_size), dist);
        let w_hz = Array2::random((hidden_size, hidden_size), dist);
        let b_iz = Array2::zeros((hidden_size, 1));
        let b_hz = Array2::zeros((hidden_size, 1));

        let w_ih = Array2::random((hidden_size, input_size), dist);
        let w_hh = Array2::random((hidden_size, hidden_size), dist);
        let b_ih = Array2::zeros((hidden_size, 1));
        let b_hh = Array2::zeros((hidden_size, 1));

        GRUCell {
            w_ir,
            w_hr,
            b_ir,
            b_hr,
            w_iz,
            w_hz,
            b_iz,
            b_hz,
            w_ih,
            w_hh,
            b_ih,
            b_hh,
            hidden_size,
            input_dropout: None,
            is_training: true,
        }
    }

    /// Enable inverted dropout on the cell input. A rate of 0.0 leaves the
    /// input untouched.
    pub fn with_input_dropout(mut self, dropout_rate: f64) -> Self {
        if dropout_rate > 0.0 {
            self.input_dropout = Some(Dropout::new(dropout_rate));
        }
        self
    }

    pub fn train(&mut self) {
        self.is_training = true;
        if let Some(ref mut dropout) = self.input_dropout {
            dropout.train();
        }
    }

    pub fn eval(&mut self) {
        self.is_training = false;
        if let Some(ref mut dropout) = self.input_dropout {
            dropout.eval();
        }
    }

    pub fn forward(&mut self, input: &Array2<f64>, hx: &Array2<f64>) -> Array2<f64> {
        let (hy, _) = self.forward_with_cache(input, hx);
        hy
    }

    pub fn forward_with_cache(
        &mut self,
        input: &Array2<f64>,
        hx: &Array2<f64>,
    ) -> (Array2<f64>, GRUCellCache) {
        let (input_dropped, dropout_mask) = if let Some(ref mut dropout) = self.input_dropout {
            let dropped = dropout.forward(input);
            let mask = dropout.get_last_mask().cloned();
            (dropped, mask)
        } else {
            (input.clone(), None)
        };

        // Reset gate: r_t = σ(W_ir * x_t + b_ir + W_hr * h_{t-1} + b_hr)
        let reset_gate = (&self.w_ir.dot(&input_dropped)
            + &self.b_ir
            + &self.w_hr.dot(hx)
            + &self.b_hr)
            .map(|&x| sigmoid(x));

        // Update gate: z_t = σ(W_iz * x_t + b_iz + W_hz * h_{t-1} + b_hz)
        let update_gate = (&self.w_iz.dot(&input_dropped)
            + &self.b_iz
            + &self.w_hz.dot(hx)
            + &self.b_hz)
            .map(|&x| sigmoid(x));

        // Reset hidden state: reset_hidden = r_t ⊙ h_{t-1}
        let reset_hidden = &reset_gate * hx;

        // New gate: n_t = tanh(W_ih * x_t + b_ih + W_hh * reset_hidden + b_hh)
        let new_gate = (&self.w_ih.dot(&input_dropped)
            + &self.b_ih
            + &self.w_hh.dot(&reset_hidden)
            + &self.b_hh)
            .map(|&x| x.tanh());

        // Output: h_t = (1 - z_t) ⊙ h_{t-1} + z_t ⊙ n_t
        let hy = &update_gate.map(|&x| 1.0 - x) * hx + &update_gate * &new_gate;

        let cache = GRUCellCache {
            input: input_dropped,
            hx: hx.clone(),
            reset_gate,
            update_gate,
            new_gate,
            reset_hidden,
            dropout_mask,
        };

        (hy, cache)
    }

    /// Backward pass through one time step.
    ///
    /// Returns (parameter_gradients, input_gradient, hidden_gradient), the
    /// last feeding the preceding step.
    pub fn backward(
        &self,
        dhy: &Array2<f64>,
        cache: &GRUCellCache,
    ) -> (GRUCellGradients, Array2<f64>, Array2<f64>) {
        // h_t = (1 - z_t) ⊙ h_{t-1} + z_t ⊙ n_t
        let d_update_gate = dhy * &(&cache.new_gate - &cache.hx);
        let d_new_gate = dhy * &cache.update_gate;
        let dhx_from_output = dhy * &cache.update_gate.map(|&x| 1.0 - x);

        // n_t = tanh(W_ih * x_t + b_ih + W_hh * reset_hidden + b_hh)
        let d_new_gate_raw = &d_new_gate * &cache.new_gate.map(|&x| 1.0 - x.powi(2));

        // reset_hidden = r_t ⊙ h_{t-1}
        let d_reset_hidden = self.w_hh.t().dot(&d_new_gate_raw);
        let d_reset_gate = &d_reset_hidden * &cache.hx;
        let dhx_from_reset = &d_reset_hidden * &cache.reset_gate;

        // r_t = σ(...), z_t = σ(...)
        let d_reset_gate_raw =
            &d_reset_gate * &cache.reset_gate * cache.reset_gate.map(|&x| 1.0 - x);
        let d_update_gate_raw =
            &d_update_gate * &cache.update_gate * cache.update_gate.map(|&x| 1.0 - x);

        // Parameter gradients; biases sum over the batch axis.
        let dw_ir = d_reset_gate_raw.dot(&cache.input.t());
        let dw_hr = d_reset_gate_raw.dot(&cache.hx.t());
        let db_ir = d_reset_gate_raw.sum_axis(Axis(1)).insert_axis(Axis(1));
        let db_hr = db_ir.clone();

        let dw_iz = d_update_gate_raw.dot(&cache.input.t());
        let dw_hz = d_update_gate_raw.dot(&cache.hx.t());
        let db_iz = d_update_gate_raw.sum_axis(Axis(1)).insert_axis(Axis(1));
        let db_hz = db_iz.clone();

        let dw_ih = d_new_gate_raw.dot(&cache.input.t());
        let dw_hh = d_new_gate_raw.dot(&cache.reset_hidden.t());
        let db_ih = d_new_gate_raw.sum_axis(Axis(1)).insert_axis(Axis(1));
        let db_hh = db_ih.clone();

        let gradients = GRUCellGradients {
            w_ir: dw_ir,
            w_hr: dw_hr,
            b_ir: db_ir,
            b_hr: db_hr,
            w_iz: dw_iz,
            w_hz: dw_hz,
            b_iz: db_iz,
            b_hz: db_hz,
            w_ih: dw_ih,
            w_hh: dw_hh,
            b_ih: db_ih,
            b_hh: db_hh,
        };

        let mut dx = self.w_ir.t().dot(&d_reset_gate_raw)
            + self.w_iz.t().dot(&d_update_gate_raw)
            + self.w_ih.t().dot(&d_new_gate_raw);

        let dhx = dhx_from_output
            + dhx_from_reset
            + self.w_hr.t().dot(&d_reset_gate_raw)
            + self.w_hz.t().dot(&d_update_gate_raw);

        // Chain through the inverted dropout applied to the cell input.
        if let Some(ref mask) = cache.dropout_mask {
            let keep_prob = self
                .input_dropout
                .as_ref()
                .map(|d| 1.0 - d.dropout_rate)
                .unwrap_or(1.0);
            dx = dx * mask / keep_prob;
        }

        (gradients, dx, dhx)
    }

    /// Initialize zero gradients for accumulation
    pub fn zero_gradients(&self) -> GRUCellGradients {
        GRUCellGradients {
            w_ir: Array2::zeros(self.w_ir.raw_dim()),
            w_hr: Array2::zeros(self.w_hr.raw_dim()),
            b_ir: Array2::zeros(self.b_ir.raw_dim()),
            b_hr: Array2::zeros(self.b_hr.raw_dim()),
            w_iz: Array2::zeros(self.w_iz.raw_dim()),
            w_hz: Array2::zeros(self.w_hz.raw_dim()),
            b_iz: Array2::zeros(self.b_iz.raw_dim()),
            b_hz: Array2::zeros(self.b_hz.raw_dim()),
            w_ih: Array2::zeros(self.w_ih.raw_dim()),
            w_hh: Array2::zeros(self.w_hh.raw_dim()),
            b_ih: Array2::zeros(self.b_ih.raw_dim()),
            b_hh: Array2::zeros(self.b_hh.raw_dim()),
        }
    }

    /// Apply gradients using the provided optimizer
    pub fn update_parameters<O: crate::optimizers::Optimizer + ?Sized>(
        &mut self,
        gradients: &GRUCellGradients,
        optimizer: &mut O,
        prefix: &str,
    ) {
        optimizer.update(&format!("{}_w_ir", prefix), &mut self.w_ir, &gradients.w_ir);
        optimizer.update(&format!("{}_w_hr", prefix), &mut self.w_hr, &gradients.w_hr);
        optimizer.update(&format!("{}_b_ir", prefix), &mut self.b_ir, &gradients.b_ir);
        optimizer.update(&format!("{}_b_hr", prefix), &mut self.b_hr, &gradients.b_hr);
        optimizer.update(&format!("{}_w_iz", prefix), &mut self.w_iz, &gradients.w_iz);
        optimizer.update(&format!("{}_w_hz", prefix), &mut self.w_hz, &gradients.w_hz);
        optimizer.update(&format!("{}_b_iz", prefix), &mut self.b_iz, &gradients.b_iz);
        optimizer.update(&format!("{}_b_hz", prefix), &mut self.b_hz, &gradients.b_hz);
        optimizer.update(&format!("{}_w_ih", prefix), &mut self.w_ih, &gradients.w_ih);
        optimizer.update(&format!("{}_w_hh", prefix), &mut self.w_hh, &gradients.w_hh);
        optimizer.update(&format!("{}_b_ih", prefix), &mut self.b_ih, &gradients.b_ih);
        optimizer.update(&format!("{}_b_hh", prefix), &mut self.b_hh, &gradients.b_hh);
    }
}

impl GRUCellGradients {
    /// Accumulate another set of gradients into this one.
    pub fn accumulate(&mut self, other: &GRUCellGradients) {
        self.w_ir = &self.w_ir + &other.w_ir;
        self.w_hr = &self.w_hr + &other.w_hr;
        self.b_ir = &self.b_ir + &other.b_ir;
        self.b_hr = &self.b_hr + &other.b_hr;
        self.w_iz = &self.w_iz + &other.w_iz;
        self.w_hz = &self.w_hz + &other.w_hz;
        self.b_iz = &self.b_iz + &other.b_iz;
        self.b_hz = &self.b_hz + &other.b_hz;
        self.w_ih = &self.w_ih + &other.w_ih;
        self.w_hh = &self.w_hh + &other.w_hh;
        self.b_ih = &self.b_ih + &other.b_ih;
        self.b_hh = &self.b_hh + &other.b_hh;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_gru_cell_forward_batched() {
        let input_size = 3;
        let hidden_size = 2;
        let batch = 4;
        let mut cell = GRUCell::new(input_size, hidden_size);

        let input = Array2::from_elem((input_size, batch), 0.5);
        let hx = Array2::from_elem((hidden_size, batch), 0.1);

        let hy = cell.forward(&input, &hx);

        assert_eq!(hy.shape(), &[hidden_size, batch]);
        assert!(hy.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_gru_backward_batched_shapes() {
        let input_size = 2;
        let hidden_size = 3;
        let batch = 5;
        let mut cell = GRUCell::new(input_size, hidden_size);

        let input = Array2::from_elem((input_size, batch), 0.7);
        let hx = Array2::from_elem((hidden_size, batch), 0.2);

        let (_hy, cache) = cell.forward_with_cache(&input, &hx);

        let dhy = Array2::ones((hidden_size, batch));
        let (gradients, dx, dhx) = cell.backward(&dhy, &cache);

        assert_eq!(gradients.w_ir.shape(), &[hidden_size, input_size]);
        assert_eq!(gradients.w_hr.shape(), &[hidden_size, hidden_size]);
        assert_eq!(gradients.b_ir.shape(), &[hidden_size, 1]);
        assert_eq!(dx.shape(), &[input_size, batch]);
        assert_eq!(dhx.shape(), &[hidden_size, batch]);
    }

    #[test]
    fn test_update_gate_zero_keeps_hidden_state() {
        // With the update-gate weights and biases forced strongly negative,
        // z_t ≈ 0 and the cell should carry h_{t-1} through unchanged.
        let mut cell = GRUCell::new(2, 2);
        cell.w_iz.fill(0.0);
        cell.w_hz.fill(0.0);
        cell.b_iz.fill(-30.0);
        cell.b_hz.fill(-30.0);

        let input = arr2(&[[0.5], [0.1]]);
        let hx = arr2(&[[0.3], [-0.2]]);
        let hy = cell.forward(&input, &hx);

        for (a, b) in hy.iter().zip(hx.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }
}
