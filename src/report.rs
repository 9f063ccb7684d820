//! Experiment outputs: per-epoch loss and displacement charts plus a plain
//! text statistics table, all named with a run tag so repeated runs with
//! different hyperparameters land next to each other.

use crate::training::TrainingMetrics;
use plotters::prelude::*;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("chart rendering failed: {0}")]
    Draw(String),
    #[error("metrics history is empty")]
    EmptyHistory,
}

impl ReportError {
    fn draw<E: std::fmt::Display>(err: E) -> Self {
        ReportError::Draw(err.to_string())
    }
}

/// Where report files go and how they are named.
#[derive(Clone, Debug)]
pub struct ReportConfig {
    pub figures_dir: PathBuf,
    pub stats_dir: PathBuf,
    pub run_tag: String,
}

/// Paths of the files a report run produced.
#[derive(Clone, Debug)]
pub struct ReportPaths {
    pub loss_chart: PathBuf,
    pub displacement_chart: PathBuf,
    pub loss_std_chart: PathBuf,
    pub stats_file: PathBuf,
}

/// Tag embedded in every output filename, e.g. `lr_0.003_epochs_20_predlen_12`.
pub fn run_tag(learning_rate: f64, epochs: usize, pred_len: usize) -> String {
    format!(
        "lr_{}_epochs_{}_predlen_{}",
        learning_rate, epochs, pred_len
    )
}

/// Write the statistics table and the three charts for a finished run.
pub fn write_reports(
    history: &[TrainingMetrics],
    config: &ReportConfig,
) -> Result<ReportPaths, ReportError> {
    if history.is_empty() {
        return Err(ReportError::EmptyHistory);
    }

    fs::create_dir_all(&config.figures_dir)?;
    fs::create_dir_all(&config.stats_dir)?;

    let stats_file = config
        .stats_dir
        .join(format!("train_stats_{}.txt", config.run_tag));
    write_stats_file(history, &stats_file)?;

    let loss_chart = config
        .figures_dir
        .join(format!("avg_train_loss_{}.jpeg", config.run_tag));
    let displacement_chart = config
        .figures_dir
        .join(format!("displacement_errors_{}.jpeg", config.run_tag));
    let loss_std_chart = config
        .figures_dir
        .join(format!("std_train_loss_{}.jpeg", config.run_tag));

    let epochs = history.len();

    draw_chart(
        &loss_chart,
        &format!("Average train loss vs {} epochs", epochs),
        "loss",
        &loss_series(history),
    )?;
    draw_chart(
        &displacement_chart,
        &format!("Average and final displacement error, {} epochs", epochs),
        "displacement",
        &displacement_series(history),
    )?;
    draw_chart(
        &loss_std_chart,
        &format!("Std of train loss vs {} epochs", epochs),
        "loss std",
        &[Series {
            label: "train loss std",
            color: BLUE,
            points: points(history, |m| Some(m.train_loss_std)),
        }],
    )?;

    info!("charts saved under {}", config.figures_dir.display());
    info!("statistics saved to {}", stats_file.display());

    Ok(ReportPaths {
        loss_chart,
        displacement_chart,
        loss_std_chart,
        stats_file,
    })
}

struct Series<'a> {
    label: &'a str,
    color: RGBColor,
    points: Vec<(f64, f64)>,
}

fn points<F>(history: &[TrainingMetrics], value: F) -> Vec<(f64, f64)>
where
    F: Fn(&TrainingMetrics) -> Option<f64>,
{
    history
        .iter()
        .filter_map(|m| value(m).map(|v| (m.epoch as f64, v)))
        .collect()
}

fn loss_series(history: &[TrainingMetrics]) -> Vec<Series<'_>> {
    let mut series = vec![Series {
        label: "avg train loss",
        color: BLUE,
        points: points(history, |m| Some(m.train_loss)),
    }];
    let test = points(history, |m| m.test_loss);
    if !test.is_empty() {
        series.push(Series {
            label: "avg test loss",
            color: RED,
            points: test,
        });
    }
    series
}

fn displacement_series(history: &[TrainingMetrics]) -> Vec<Series<'_>> {
    let mut series = vec![
        Series {
            label: "train final displacement",
            color: BLUE,
            points: points(history, |m| Some(m.train_final_disp)),
        },
        Series {
            label: "train avg displacement",
            color: RED,
            points: points(history, |m| Some(m.train_avg_disp)),
        },
    ];
    let test_final = points(history, |m| m.test_final_disp);
    if !test_final.is_empty() {
        series.push(Series {
            label: "test final displacement",
            color: GREEN,
            points: test_final,
        });
    }
    let test_avg = points(history, |m| m.test_avg_disp);
    if !test_avg.is_empty() {
        series.push(Series {
            label: "test avg displacement",
            color: BLACK,
            points: test_avg,
        });
    }
    series
}

fn draw_chart(
    path: &Path,
    caption: &str,
    y_desc: &str,
    series: &[Series],
) -> Result<(), ReportError> {
    let x_max = series
        .iter()
        .flat_map(|s| s.points.iter().map(|p| p.0))
        .fold(1.0f64, f64::max);
    let (y_min, y_max) = value_range(series);

    let root = BitMapBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(ReportError::draw)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0..x_max, y_min..y_max)
        .map_err(ReportError::draw)?;

    chart
        .configure_mesh()
        .x_desc("epoch")
        .y_desc(y_desc)
        .draw()
        .map_err(ReportError::draw)?;

    for s in series {
        let color = s.color;
        chart
            .draw_series(LineSeries::new(s.points.iter().copied(), &color))
            .map_err(ReportError::draw)?
            .label(s.label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(ReportError::draw)?;

    root.present().map_err(ReportError::draw)?;
    Ok(())
}

fn value_range(series: &[Series]) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for s in series {
        for &(_, y) in &s.points {
            if y.is_finite() {
                min = min.min(y);
                max = max.max(y);
            }
        }
    }

    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    if (max - min) < 1e-12 {
        return (min - 0.5, max + 0.5);
    }
    let pad = 0.05 * (max - min);
    (min - pad, max + pad)
}

fn write_stats_file(history: &[TrainingMetrics], path: &Path) -> Result<(), ReportError> {
    let avg_train_loss: Vec<f64> = history.iter().map(|m| m.train_loss).collect();
    let std_train_loss: Vec<f64> = history.iter().map(|m| m.train_loss_std).collect();
    let avg_test_loss: Vec<f64> = history.iter().filter_map(|m| m.test_loss).collect();
    let train_avg_disp: Vec<f64> = history.iter().map(|m| m.train_avg_disp).collect();
    let train_final_disp: Vec<f64> = history.iter().map(|m| m.train_final_disp).collect();
    let test_avg_disp: Vec<f64> = history.iter().filter_map(|m| m.test_avg_disp).collect();
    let test_final_disp: Vec<f64> = history.iter().filter_map(|m| m.test_final_disp).collect();

    let mut file = File::create(path)?;
    writeln!(file, "epochs: {}", history.len())?;
    writeln!(file, "========== average train loss per epoch ==========")?;
    writeln!(file, "{:?}", avg_train_loss)?;
    writeln!(file, "========== std of train loss per epoch ===========")?;
    writeln!(file, "{:?}", std_train_loss)?;
    writeln!(file, "========== average test loss per epoch ===========")?;
    writeln!(file, "{:?}", avg_test_loss)?;
    writeln!(file, "========== train avg displacement error ==========")?;
    writeln!(file, "{:?}", train_avg_disp)?;
    writeln!(file, "========== train final displacement error ========")?;
    writeln!(file, "{:?}", train_final_disp)?;
    writeln!(file, "========== test avg displacement error ===========")?;
    writeln!(file, "{:?}", test_avg_disp)?;
    writeln!(file, "========== test final displacement error =========")?;
    writeln!(file, "{:?}", test_final_disp)?;

    Ok(())
}
