use crate::layers::gru_cell::{GRUCell, GRUCellCache, GRUCellGradients};
use crate::layers::linear::{LinearCache, LinearGradients, LinearLayer};
use crate::layers::lstm_cell::{LSTMCell, LSTMCellCache, LSTMCellGradients};
use crate::optimizers::Optimizer;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Which recurrent cell drives the rollout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellKind {
    Lstm,
    Gru,
}

impl CellKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellKind::Lstm => "lstm",
            CellKind::Gru => "gru",
        }
    }
}

/// Recurrent cell behind a runtime switch, so one model type covers both
/// cell choices.
#[derive(Clone)]
pub enum RecurrentCell {
    Lstm(LSTMCell),
    Gru(GRUCell),
}

/// Per-step cache of the recurrent cell, matching the cell variant.
#[derive(Clone)]
pub enum CellCache {
    Lstm(LSTMCellCache),
    Gru(GRUCellCache),
}

/// Parameter gradients of the recurrent cell, matching the cell variant.
#[derive(Clone)]
pub enum CellGradients {
    Lstm(LSTMCellGradients),
    Gru(GRUCellGradients),
}

impl RecurrentCell {
    pub fn hidden_size(&self) -> usize {
        match self {
            RecurrentCell::Lstm(cell) => cell.hidden_size,
            RecurrentCell::Gru(cell) => cell.hidden_size,
        }
    }

    pub fn num_parameters(&self) -> usize {
        match self {
            RecurrentCell::Lstm(cell) => {
                cell.w_ih.len() + cell.w_hh.len() + cell.b_ih.len() + cell.b_hh.len()
            }
            RecurrentCell::Gru(cell) => {
                cell.w_ir.len()
                    + cell.w_hr.len()
                    + cell.b_ir.len()
                    + cell.b_hr.len()
                    + cell.w_iz.len()
                    + cell.w_hz.len()
                    + cell.b_iz.len()
                    + cell.b_hz.len()
                    + cell.w_ih.len()
                    + cell.w_hh.len()
                    + cell.b_ih.len()
                    + cell.b_hh.len()
            }
        }
    }

    fn train(&mut self) {
        match self {
            RecurrentCell::Lstm(cell) => cell.train(),
            RecurrentCell::Gru(cell) => cell.train(),
        }
    }

    fn eval(&mut self) {
        match self {
            RecurrentCell::Lstm(cell) => cell.eval(),
            RecurrentCell::Gru(cell) => cell.eval(),
        }
    }

    /// Advance one time step. The GRU carries no cell state; the `cx`
    /// column passes through untouched so both variants share one rollout.
    fn step_with_cache(
        &mut self,
        input: &Array2<f64>,
        hx: &Array2<f64>,
        cx: &Array2<f64>,
    ) -> (Array2<f64>, Array2<f64>, CellCache) {
        match self {
            RecurrentCell::Lstm(cell) => {
                let (hy, cy, cache) = cell.forward_with_cache(input, hx, cx);
                (hy, cy, CellCache::Lstm(cache))
            }
            RecurrentCell::Gru(cell) => {
                let (hy, cache) = cell.forward_with_cache(input, hx);
                (hy, cx.clone(), CellCache::Gru(cache))
            }
        }
    }

    /// Backward through one time step. Returns
    /// (gradients, d_input, d_hidden_prev, d_cell_prev).
    fn step_backward(
        &self,
        dhy: &Array2<f64>,
        dcy: &Array2<f64>,
        cache: &CellCache,
    ) -> (CellGradients, Array2<f64>, Array2<f64>, Array2<f64>) {
        match (self, cache) {
            (RecurrentCell::Lstm(cell), CellCache::Lstm(cache)) => {
                let (grads, dx, dhx, dcx) = cell.backward(dhy, dcy, cache);
                (CellGradients::Lstm(grads), dx, dhx, dcx)
            }
            (RecurrentCell::Gru(cell), CellCache::Gru(cache)) => {
                let (grads, dx, dhx) = cell.backward(dhy, cache);
                // No cell state to propagate.
                let dcx = Array2::zeros(dcy.raw_dim());
                (CellGradients::Gru(grads), dx, dhx, dcx)
            }
            _ => unreachable!("cell cache variant always matches the cell"),
        }
    }

    fn zero_gradients(&self) -> CellGradients {
        match self {
            RecurrentCell::Lstm(cell) => CellGradients::Lstm(cell.zero_gradients()),
            RecurrentCell::Gru(cell) => CellGradients::Gru(cell.zero_gradients()),
        }
    }

    fn update_parameters<O: Optimizer + ?Sized>(
        &mut self,
        gradients: &CellGradients,
        optimizer: &mut O,
        prefix: &str,
    ) {
        match (self, gradients) {
            (RecurrentCell::Lstm(cell), CellGradients::Lstm(grads)) => {
                cell.update_parameters(grads, optimizer, prefix)
            }
            (RecurrentCell::Gru(cell), CellGradients::Gru(grads)) => {
                cell.update_parameters(grads, optimizer, prefix)
            }
            _ => unreachable!("cell gradient variant always matches the cell"),
        }
    }
}

impl CellGradients {
    /// Accumulate another set of gradients into this one.
    pub fn accumulate(&mut self, other: &CellGradients) {
        match (self, other) {
            (CellGradients::Lstm(a), CellGradients::Lstm(b)) => a.accumulate(b),
            (CellGradients::Gru(a), CellGradients::Gru(b)) => a.accumulate(b),
            _ => unreachable!("cell gradient variants always match"),
        }
    }
}

/// Caches from one observed step: embedding then cell.
#[derive(Clone)]
pub struct ObservedStepCache {
    pub embedding: LinearCache,
    pub cell: CellCache,
}

/// Caches from one predicted step: embedding of the fed-back output,
/// cell update, output projection.
#[derive(Clone)]
pub struct PredictedStepCache {
    pub embedding: LinearCache,
    pub cell: CellCache,
    pub output: LinearCache,
}

/// Everything the backward pass needs from one full rollout.
#[derive(Clone)]
pub struct RolloutCache {
    pub observed: Vec<ObservedStepCache>,
    /// Projection of the hidden state after the last observed step; its
    /// output seeds the first predicted step.
    pub seed_output: LinearCache,
    pub predicted: Vec<PredictedStepCache>,
    pub peds: usize,
}

/// Gradients for every parameter of the network, accumulated over a rollout.
#[derive(Clone)]
pub struct VanillaNetGradients {
    pub embedding: LinearGradients,
    pub cell: CellGradients,
    pub output: LinearGradients,
}

impl VanillaNetGradients {
    /// Accumulate another set of gradients into this one.
    pub fn accumulate(&mut self, other: &VanillaNetGradients) {
        self.embedding.accumulate(&other.embedding);
        self.cell.accumulate(&other.cell);
        self.output.accumulate(&other.output);
    }
}

/// Trajectory forecasting network: coordinate embedding, a recurrent cell,
/// and an output projection back to coordinates.
///
/// The forward pass warms the cell up on the observed steps, projects the
/// final hidden state to seed the first future position, then rolls forward
/// autoregressively: each predicted position is embedded and fed back as the
/// next step's input. Inputs are column-batched, one pedestrian per column.
#[derive(Clone)]
pub struct VanillaNet {
    pub embedding: LinearLayer, // input_size -> embedding_size
    pub cell: RecurrentCell,    // embedding_size -> hidden_size
    pub output: LinearLayer,    // hidden_size -> output_size
    pub input_size: usize,
    pub embedding_size: usize,
    pub hidden_size: usize,
    pub output_size: usize,
    pub is_training: bool,
}

impl VanillaNet {
    pub fn new(
        kind: CellKind,
        input_size: usize,
        embedding_size: usize,
        hidden_size: usize,
        output_size: usize,
    ) -> Self {
        let cell = match kind {
            CellKind::Lstm => RecurrentCell::Lstm(LSTMCell::new(embedding_size, hidden_size)),
            CellKind::Gru => RecurrentCell::Gru(GRUCell::new(embedding_size, hidden_size)),
        };

        VanillaNet {
            embedding: LinearLayer::new(input_size, embedding_size),
            cell,
            output: LinearLayer::new(hidden_size, output_size),
            input_size,
            embedding_size,
            hidden_size,
            output_size,
            is_training: true,
        }
    }

    /// Enable inverted dropout on the cell input. A rate of 0.0 leaves the
    /// model unchanged.
    pub fn with_input_dropout(mut self, dropout_rate: f64) -> Self {
        self.cell = match self.cell {
            RecurrentCell::Lstm(cell) => {
                RecurrentCell::Lstm(cell.with_input_dropout(dropout_rate))
            }
            RecurrentCell::Gru(cell) => RecurrentCell::Gru(cell.with_input_dropout(dropout_rate)),
        };
        self
    }

    pub fn kind(&self) -> CellKind {
        match self.cell {
            RecurrentCell::Lstm(_) => CellKind::Lstm,
            RecurrentCell::Gru(_) => CellKind::Gru,
        }
    }

    pub fn num_parameters(&self) -> usize {
        self.embedding.num_parameters() + self.cell.num_parameters() + self.output.num_parameters()
    }

    /// Set training mode (dropout active).
    pub fn train(&mut self) {
        self.is_training = true;
        self.cell.train();
    }

    /// Set evaluation mode (dropout disabled).
    pub fn eval(&mut self) {
        self.is_training = false;
        self.cell.eval();
    }

    /// Predict `horizon` future positions from the observed steps.
    ///
    /// `observed` holds one (input_size, peds) matrix per step; the result
    /// holds one (output_size, peds) matrix per future step.
    pub fn forward(&mut self, observed: &[Array2<f64>], horizon: usize) -> Vec<Array2<f64>> {
        let (predictions, _) = self.forward_with_cache(observed, horizon);
        predictions
    }

    /// Forward pass that also returns the caches required by `backward`.
    pub fn forward_with_cache(
        &mut self,
        observed: &[Array2<f64>],
        horizon: usize,
    ) -> (Vec<Array2<f64>>, RolloutCache) {
        assert!(!observed.is_empty(), "at least one observed step is required");
        let peds = observed[0].dim().1;

        let mut hx = Array2::zeros((self.hidden_size, peds));
        let mut cx = Array2::zeros((self.hidden_size, peds));

        // Warm up on the observed positions.
        let mut observed_caches = Vec::with_capacity(observed.len());
        for coords in observed {
            let (embedded, embed_cache) = self.embedding.forward_with_cache(coords);
            let (hy, cy, cell_cache) = self.cell.step_with_cache(&embedded, &hx, &cx);
            hx = hy;
            cx = cy;
            observed_caches.push(ObservedStepCache {
                embedding: embed_cache,
                cell: cell_cache,
            });
        }

        // Project the last observed hidden state to seed the rollout.
        let (mut prev_out, seed_output) = self.output.forward_with_cache(&hx);

        let mut predictions = Vec::with_capacity(horizon);
        let mut predicted_caches = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let (embedded, embed_cache) = self.embedding.forward_with_cache(&prev_out);
            let (hy, cy, cell_cache) = self.cell.step_with_cache(&embedded, &hx, &cx);
            hx = hy;
            cx = cy;
            let (out, out_cache) = self.output.forward_with_cache(&hx);
            predictions.push(out.clone());
            predicted_caches.push(PredictedStepCache {
                embedding: embed_cache,
                cell: cell_cache,
                output: out_cache,
            });
            prev_out = out;
        }

        let cache = RolloutCache {
            observed: observed_caches,
            seed_output,
            predicted: predicted_caches,
            peds,
        };
        (predictions, cache)
    }

    /// Backpropagate through the full rollout.
    ///
    /// `step_gradients` holds the loss gradient w.r.t. each predicted output,
    /// in forward order. Gradient flows through the output projections, the
    /// recurrent chain, the embeddings, and the feedback edges where each
    /// prediction became the next step's input.
    pub fn backward(
        &self,
        step_gradients: &[Array2<f64>],
        cache: &RolloutCache,
    ) -> VanillaNetGradients {
        assert_eq!(
            step_gradients.len(),
            cache.predicted.len(),
            "one gradient per predicted step"
        );

        let mut grads = self.zero_gradients();
        let peds = cache.peds;

        // Gradients flowing backwards across time into h_t / c_t, and into
        // the fed-back output of the preceding predicted step.
        let mut dh: Array2<f64> = Array2::zeros((self.hidden_size, peds));
        let mut dc: Array2<f64> = Array2::zeros((self.hidden_size, peds));
        let mut d_feedback: Option<Array2<f64>> = None;

        for i in (0..cache.predicted.len()).rev() {
            let step = &cache.predicted[i];

            let mut d_out = step_gradients[i].clone();
            if let Some(fb) = d_feedback.take() {
                d_out = d_out + &fb;
            }

            let (out_grads, dh_from_out) = self.output.backward(&d_out, &step.output);
            grads.output.accumulate(&out_grads);
            let dh_total = &dh + &dh_from_out;

            let (cell_grads, dx, dh_prev, dc_prev) =
                self.cell.step_backward(&dh_total, &dc, &step.cell);
            grads.cell.accumulate(&cell_grads);
            dh = dh_prev;
            dc = dc_prev;

            let (embed_grads, d_input) = self.embedding.backward(&dx, &step.embedding);
            grads.embedding.accumulate(&embed_grads);
            d_feedback = Some(d_input);
        }

        // The first predicted step consumed the seed projection of the last
        // observed hidden state; route its gradient through that projection.
        if let Some(fb) = d_feedback {
            let (seed_grads, dh_seed) = self.output.backward(&fb, &cache.seed_output);
            grads.output.accumulate(&seed_grads);
            dh = &dh + &dh_seed;
        }

        for step in cache.observed.iter().rev() {
            let (cell_grads, dx, dh_prev, dc_prev) = self.cell.step_backward(&dh, &dc, &step.cell);
            grads.cell.accumulate(&cell_grads);
            dh = dh_prev;
            dc = dc_prev;

            // Observed coordinates are data; their gradient is dropped.
            let (embed_grads, _d_input) = self.embedding.backward(&dx, &step.embedding);
            grads.embedding.accumulate(&embed_grads);
        }

        grads
    }

    /// Initialize zero gradients for accumulation
    pub fn zero_gradients(&self) -> VanillaNetGradients {
        VanillaNetGradients {
            embedding: self.embedding.zero_gradients(),
            cell: self.cell.zero_gradients(),
            output: self.output.zero_gradients(),
        }
    }

    /// Apply gradients using the provided optimizer
    pub fn update_parameters<O: Optimizer + ?Sized>(
        &mut self,
        gradients: &VanillaNetGradients,
        optimizer: &mut O,
    ) {
        self.embedding
            .update_parameters(&gradients.embedding, optimizer, "embedding");
        self.cell.update_parameters(&gradients.cell, optimizer, "cell");
        self.output
            .update_parameters(&gradients.output, optimizer, "output");
    }
}
