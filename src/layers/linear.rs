use crate::optimizers::Optimizer;
use ndarray::Array2;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

/// Holds gradients for linear layer parameters during backpropagation
#[derive(Clone, Debug)]
pub struct LinearGradients {
    pub weight: Array2<f64>,
    pub bias: Array2<f64>,
}

/// Input snapshot from a forward pass, needed by the backward pass.
///
/// The rollout applies the same layer at every time step, so the caller
/// keeps one cache per step rather than the layer keeping only the latest.
#[derive(Clone, Debug)]
pub struct LinearCache {
    pub input: Array2<f64>,
}

/// A fully connected layer: output = weight @ input + bias
///
/// `weight` has shape (output_size, input_size) and `bias` has shape
/// (output_size, 1), broadcast across the batch (column) axis.
#[derive(Clone, Debug)]
pub struct LinearLayer {
    pub weight: Array2<f64>, // (output_size, input_size)
    pub bias: Array2<f64>,   // (output_size, 1)
    pub input_size: usize,
    pub output_size: usize,
}

impl LinearLayer {
    /// Create a new linear layer with Xavier/Glorot initialization.
    pub fn new(input_size: usize, output_size: usize) -> Self {
        // Xavier/Glorot initialization: scale by sqrt(2 / (input_size + output_size))
        let scale = (2.0 / (input_size + output_size) as f64).sqrt();

        let weight = Array2::random((output_size, input_size), Uniform::new(-scale, scale));
        let bias = Array2::zeros((output_size, 1));

        Self {
            weight,
            bias,
            input_size,
            output_size,
        }
    }

    /// Create a new linear layer with custom weights.
    pub fn from_weights(weight: Array2<f64>, bias: Array2<f64>) -> Self {
        let (output_size, input_size) = weight.dim();
        assert_eq!(
            bias.shape(),
            &[output_size, 1],
            "Bias shape must be (output_size, 1)"
        );

        Self {
            weight,
            bias,
            input_size,
            output_size,
        }
    }

    /// Forward pass for an input of shape (input_size, batch_size).
    ///
    /// Returns the output of shape (output_size, batch_size).
    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        let (input_features, _batch_size) = input.dim();
        assert_eq!(
            input_features, self.input_size,
            "Input size {} doesn't match layer input size {}",
            input_features, self.input_size
        );

        // bias broadcasts over the batch axis
        &self.weight.dot(input) + &self.bias
    }

    /// Forward pass that also returns the cache required by `backward`.
    pub fn forward_with_cache(&self, input: &Array2<f64>) -> (Array2<f64>, LinearCache) {
        let output = self.forward(input);
        let cache = LinearCache {
            input: input.clone(),
        };
        (output, cache)
    }

    /// Backward pass through the layer.
    ///
    /// # Arguments
    /// * `grad_output` - Gradient w.r.t. output of shape (output_size, batch_size)
    /// * `cache` - Cache from the matching `forward_with_cache` call
    ///
    /// # Returns
    /// * `(gradients, input_gradient)` where `input_gradient` has shape
    ///   (input_size, batch_size)
    pub fn backward(
        &self,
        grad_output: &Array2<f64>,
        cache: &LinearCache,
    ) -> (LinearGradients, Array2<f64>) {
        let input = &cache.input;
        let (output_features, batch_size) = grad_output.dim();
        let (input_features, input_batch_size) = input.dim();

        assert_eq!(output_features, self.output_size, "Gradient output size mismatch");
        assert_eq!(input_features, self.input_size, "Input size mismatch");
        assert_eq!(batch_size, input_batch_size, "Batch size mismatch");

        // Gradient w.r.t. weight: grad_output @ input^T
        let weight_grad = grad_output.dot(&input.t());

        // Gradient w.r.t. bias: sum over batch dimension, keep as column vector
        let bias_grad = grad_output
            .sum_axis(ndarray::Axis(1))
            .insert_axis(ndarray::Axis(1));

        // Gradient w.r.t. input: weight^T @ grad_output
        let input_grad = self.weight.t().dot(grad_output);

        let gradients = LinearGradients {
            weight: weight_grad,
            bias: bias_grad,
        };

        (gradients, input_grad)
    }

    /// Update parameters using the provided optimizer
    pub fn update_parameters<O: Optimizer + ?Sized>(
        &mut self,
        gradients: &LinearGradients,
        optimizer: &mut O,
        prefix: &str,
    ) {
        optimizer.update(&format!("{}_weight", prefix), &mut self.weight, &gradients.weight);
        optimizer.update(&format!("{}_bias", prefix), &mut self.bias, &gradients.bias);
    }

    /// Initialize zero gradients for accumulation
    pub fn zero_gradients(&self) -> LinearGradients {
        LinearGradients {
            weight: Array2::zeros(self.weight.raw_dim()),
            bias: Array2::zeros(self.bias.raw_dim()),
        }
    }

    /// Get the number of parameters in this layer
    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }
}

impl LinearGradients {
    /// Accumulate another set of gradients into this one.
    pub fn accumulate(&mut self, other: &LinearGradients) {
        self.weight = &self.weight + &other.weight;
        self.bias = &self.bias + &other.bias;
    }
}
