use ndarray::Array2;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;

/// Inverted dropout for regularization.
///
/// During training, elements are zeroed with probability `dropout_rate` and
/// survivors are scaled by `1 / keep_prob` so the expected activation is
/// unchanged. In evaluation mode the input passes through untouched.
#[derive(Clone)]
pub struct Dropout {
    pub dropout_rate: f64,
    pub is_training: bool,
    mask: Option<Array2<f64>>,
}

impl Dropout {
    pub fn new(dropout_rate: f64) -> Self {
        assert!(
            (0.0..=1.0).contains(&dropout_rate),
            "Dropout rate must be between 0.0 and 1.0"
        );

        Dropout {
            dropout_rate,
            is_training: true,
            mask: None,
        }
    }

    pub fn train(&mut self) {
        self.is_training = true;
    }

    pub fn eval(&mut self) {
        self.is_training = false;
        self.mask = None;
    }

    pub fn forward(&mut self, input: &Array2<f64>) -> Array2<f64> {
        if !self.is_training || self.dropout_rate == 0.0 {
            self.mask = None;
            return input.clone();
        }

        let keep_prob = 1.0 - self.dropout_rate;
        let mask = self.generate_mask(input.raw_dim(), keep_prob);
        let output = input * &mask / keep_prob;
        self.mask = Some(mask);
        output
    }

    /// Mask from the most recent training-mode forward, for chaining
    /// gradients through the dropped elements.
    pub fn get_last_mask(&self) -> Option<&Array2<f64>> {
        self.mask.as_ref()
    }

    fn generate_mask(&self, shape: ndarray::Dim<[usize; 2]>, keep_prob: f64) -> Array2<f64> {
        let dist = Uniform::new(0.0, 1.0);
        Array2::random(shape, dist).mapv(|x| if x < keep_prob { 1.0 } else { 0.0 })
    }
}
