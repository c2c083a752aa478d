//! SVG rendering of training curves.

use std::fmt::Write;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::metrics::TrainingHistory;

/// Parameters for the history plot.
///
/// # Example
///
/// ```
/// use fer_training::PlotParams;
///
/// let params = PlotParams::default().with_title("ResNet Training");
/// assert_eq!(params.train_color, "#EFAEA4");
/// assert_eq!(params.title, "ResNet Training");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotParams {
    /// Figure title.
    pub title: String,
    /// Width of the SVG in pixels.
    pub width: u32,
    /// Height of the SVG in pixels.
    pub height: u32,
    /// Margin around each panel's plotting area in pixels.
    pub padding: u32,
    /// Stroke width of the curves.
    pub stroke_width: f64,
    /// Colour of the training curves.
    pub train_color: String,
    /// Colour of the validation curves.
    pub val_color: String,
    /// Background colour.
    pub background_color: String,
    /// Font size of the figure title.
    pub title_font_size: u32,
}

impl Default for PlotParams {
    fn default() -> Self {
        Self {
            title: "NN_model Training".to_string(),
            width: 1600,
            height: 480,
            padding: 60,
            stroke_width: 2.0,
            train_color: "#EFAEA4".to_string(),
            val_color: "#B2D7D0".to_string(),
            background_color: "#ffffff".to_string(),
            title_font_size: 24,
        }
    }
}

impl PlotParams {
    /// Sets the figure title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the figure size.
    #[must_use]
    pub const fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Sets the training and validation colours.
    #[must_use]
    pub fn with_colors(mut self, train: &str, val: &str) -> Self {
        self.train_color = train.to_string();
        self.val_color = val.to_string();
        self
    }

    /// Returns true if the figure is large enough to hold both panels.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.width > 4 * self.padding && self.height > 2 * self.padding + self.title_font_size
    }
}

struct Series<'a> {
    label: &'a str,
    color: &'a str,
    values: Vec<Option<f32>>,
}

#[derive(Clone, Copy)]
struct Panel {
    left: f64,
    top: f64,
    width: f64,
    height: f64,
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn value_range(series: &[Series<'_>]) -> (f32, f32) {
    let mut values = series
        .iter()
        .flat_map(|s| s.values.iter().flatten().copied())
        .filter(|v| v.is_finite());
    let Some(first) = values.next() else {
        return (0.0, 1.0);
    };
    let (lo, hi) = values.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if hi - lo < f32::EPSILON {
        (lo - 0.5, hi + 0.5)
    } else {
        let margin = (hi - lo) * 0.05;
        (lo - margin, hi + margin)
    }
}

#[allow(clippy::cast_precision_loss, clippy::too_many_lines)]
fn draw_panel(
    svg: &mut String,
    panel: Panel,
    epochs: &[usize],
    series: &[Series<'_>],
    y_label: &str,
    params: &PlotParams,
) {
    let (lo, hi) = value_range(series);
    let first = epochs.first().copied().unwrap_or(0);
    let last = epochs.last().copied().unwrap_or(0);
    let span = last.saturating_sub(first).max(1) as f64;

    let x_of = |epoch: usize| panel.left + (epoch - first) as f64 / span * panel.width;
    let y_of = |value: f32| {
        let t = f64::from((value - lo) / (hi - lo));
        panel.top + (1.0 - t) * panel.height
    };
    let bottom = panel.top + panel.height;
    let right = panel.left + panel.width;

    // Axes
    let _ = writeln!(
        svg,
        r##"  <path d="M {:.2} {:.2} L {:.2} {:.2} L {:.2} {:.2}" fill="none" stroke="#333" stroke-width="1"/>"##,
        panel.left, panel.top, panel.left, bottom, right, bottom
    );

    // X ticks, at most ~10
    let step = epochs.len().div_ceil(10).max(1);
    for &epoch in epochs.iter().step_by(step) {
        let x = x_of(epoch);
        let _ = writeln!(
            svg,
            r##"  <line x1="{x:.2}" y1="{bottom:.2}" x2="{x:.2}" y2="{:.2}" stroke="#333"/>"##,
            bottom + 5.0
        );
        let _ = writeln!(
            svg,
            r##"  <text x="{x:.2}" y="{:.2}" font-family="sans-serif" font-size="12" text-anchor="middle" fill="#333">{epoch}</text>"##,
            bottom + 20.0
        );
    }

    // Y ticks with light grid lines
    for k in 0..=4u8 {
        let value = lo + (hi - lo) * f32::from(k) / 4.0;
        let y = y_of(value);
        let _ = writeln!(
            svg,
            r##"  <line x1="{:.2}" y1="{y:.2}" x2="{right:.2}" y2="{y:.2}" stroke="#e6e6e6"/>"##,
            panel.left
        );
        let _ = writeln!(
            svg,
            r##"  <text x="{:.2}" y="{:.2}" font-family="sans-serif" font-size="12" text-anchor="end" fill="#333">{value:.2}</text>"##,
            panel.left - 8.0,
            y + 4.0
        );
    }

    // Axis labels
    let _ = writeln!(
        svg,
        r##"  <text x="{:.2}" y="{:.2}" font-family="sans-serif" font-size="14" text-anchor="middle" fill="#333">Epochs</text>"##,
        panel.left + panel.width / 2.0,
        bottom + 40.0
    );
    let label_x = panel.left - 45.0;
    let label_y = panel.top + panel.height / 2.0;
    let _ = writeln!(
        svg,
        r##"  <text x="{label_x:.2}" y="{label_y:.2}" font-family="sans-serif" font-size="14" text-anchor="middle" fill="#333" transform="rotate(-90 {label_x:.2} {label_y:.2})">{}</text>"##,
        escape(y_label)
    );

    // Curves; missing values break the line
    for s in series {
        let mut path = String::new();
        let mut pen_down = false;
        for (&epoch, value) in epochs.iter().zip(&s.values) {
            match value {
                Some(v) if v.is_finite() => {
                    let command = if pen_down { 'L' } else { 'M' };
                    let _ = write!(path, "{command} {:.2} {:.2} ", x_of(epoch), y_of(*v));
                    let _ = writeln!(
                        svg,
                        r#"  <circle cx="{:.2}" cy="{:.2}" r="3" fill="{}"/>"#,
                        x_of(epoch),
                        y_of(*v),
                        s.color
                    );
                    pen_down = true;
                }
                _ => pen_down = false,
            }
        }
        if !path.is_empty() {
            let _ = writeln!(
                svg,
                r#"  <path d="{}" fill="none" stroke="{}" stroke-width="{:.2}"/>"#,
                path.trim_end(),
                s.color,
                params.stroke_width
            );
        }
    }

    // Legend, top right
    for (i, s) in series.iter().enumerate() {
        let y = panel.top + 15.0 + 20.0 * i as f64;
        let x = right - 170.0;
        let _ = writeln!(
            svg,
            r#"  <line x1="{x:.2}" y1="{y:.2}" x2="{:.2}" y2="{y:.2}" stroke="{}" stroke-width="{:.2}"/>"#,
            x + 25.0,
            s.color,
            params.stroke_width
        );
        let _ = writeln!(
            svg,
            r##"  <text x="{:.2}" y="{:.2}" font-family="sans-serif" font-size="12" fill="#333">{}</text>"##,
            x + 32.0,
            y + 4.0,
            escape(s.label)
        );
    }
}

/// Renders training and validation curves as a two-panel SVG.
///
/// The left panel shows loss and the right panel accuracy in percent, both
/// against the epoch. An empty history renders a placeholder.
///
/// # Example
///
/// ```
/// use fer_training::{EpochMetrics, PlotParams, TrainingHistory, plot_history_svg};
///
/// let mut history = TrainingHistory::new();
/// history.add_epoch(EpochMetrics::new(0, 1.5, 0.4).with_validation(1.6, 0.35));
/// history.add_epoch(EpochMetrics::new(1, 1.2, 0.5).with_validation(1.4, 0.45));
///
/// let svg = plot_history_svg(&history, &PlotParams::default());
/// assert!(svg.contains("Training Loss"));
/// assert!(svg.contains("Accuracy %"));
/// ```
#[must_use]
pub fn plot_history_svg(history: &TrainingHistory, params: &PlotParams) -> String {
    let title = escape(&params.title);
    if history.is_empty() {
        return format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\" viewBox=\"0 0 {} {}\">\n\
  <rect width=\"100%\" height=\"100%\" fill=\"{}\"/>\n\
  <text x=\"50%\" y=\"40\" text-anchor=\"middle\" font-family=\"sans-serif\" font-size=\"{}\">{title}</text>\n\
  <text x=\"50%\" y=\"50%\" text-anchor=\"middle\" fill=\"#999\">No epochs recorded</text>\n\
</svg>",
            params.width,
            params.height,
            params.width,
            params.height,
            params.background_color,
            params.title_font_size
        );
    }

    let epochs: Vec<usize> = history.epoch_metrics.iter().map(|m| m.epoch).collect();
    let percent = |v: f32| v * 100.0;

    let loss_series = [
        Series {
            label: "Training Loss",
            color: &params.train_color,
            values: history.loss().into_iter().map(Some).collect(),
        },
        Series {
            label: "Validation Loss",
            color: &params.val_color,
            values: history.val_loss(),
        },
    ];
    let accuracy_series = [
        Series {
            label: "Training Accuracy",
            color: &params.train_color,
            values: history
                .accuracy()
                .into_iter()
                .map(|v| Some(percent(v)))
                .collect(),
        },
        Series {
            label: "Validation Accuracy",
            color: &params.val_color,
            values: history
                .val_accuracy()
                .into_iter()
                .map(|v| v.map(percent))
                .collect(),
        },
    ];

    let padding = f64::from(params.padding);
    let header = f64::from(params.title_font_size) * 2.5;
    let panel_width = f64::from(params.width) / 2.0;
    let panel_height = f64::from(params.height) - header - 2.0 * padding;
    let left_panel = Panel {
        left: padding + 20.0,
        top: header + padding / 2.0,
        width: panel_width - 1.5 * padding,
        height: panel_height,
    };
    let right_panel = Panel {
        left: left_panel.left + panel_width,
        ..left_panel
    };

    let mut svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">
  <rect width="100%" height="100%" fill="{}"/>
  <text x="50%" y="{:.2}" text-anchor="middle" font-family="sans-serif" font-size="{}">{title}</text>
"#,
        params.width,
        params.height,
        params.width,
        params.height,
        params.background_color,
        f64::from(params.title_font_size) * 1.5,
        params.title_font_size
    );

    draw_panel(&mut svg, left_panel, &epochs, &loss_series, "Loss", params);
    draw_panel(
        &mut svg,
        right_panel,
        &epochs,
        &accuracy_series,
        "Accuracy %",
        params,
    );

    svg.push_str("</svg>");
    svg
}

/// Renders the history plot and writes it to `path`.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_history_plot(
    history: &TrainingHistory,
    path: &Path,
    params: &PlotParams,
) -> Result<()> {
    fs::write(path, plot_history_svg(history, params))?;
    info!(path = %path.display(), epochs = history.epochs_completed(), "saved history plot");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::EpochMetrics;

    fn history() -> TrainingHistory {
        let mut history = TrainingHistory::new();
        history.add_epoch(EpochMetrics::new(0, 1.9, 0.2).with_validation(1.8, 0.25));
        history.add_epoch(EpochMetrics::new(1, 1.5, 0.4));
        history.add_epoch(EpochMetrics::new(2, 1.1, 0.55).with_validation(1.3, 0.5));
        history
    }

    #[test]
    fn plot_contains_both_panels() {
        let svg = plot_history_svg(&history(), &PlotParams::default());

        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains("NN_model Training"));
        for label in [
            "Training Loss",
            "Validation Loss",
            "Training Accuracy",
            "Validation Accuracy",
            "Epochs",
            ">Loss<",
            "Accuracy %",
        ] {
            assert!(svg.contains(label), "missing {label}");
        }
        assert!(svg.contains("#EFAEA4"));
        assert!(svg.contains("#B2D7D0"));
    }

    #[test]
    fn plot_draws_one_path_per_series_segment() {
        let svg = plot_history_svg(&history(), &PlotParams::default());
        // One training curve per panel
        let curves = svg.matches(r##"fill="none" stroke="#EFAEA4""##).count();
        assert_eq!(curves, 2);
        // Epoch 1 has no validation, so 2 points per panel
        let val_points = svg.matches(r##"r="3" fill="#B2D7D0""##).count();
        assert_eq!(val_points, 4);
    }

    #[test]
    fn plot_single_epoch() {
        let mut history = TrainingHistory::new();
        history.add_epoch(EpochMetrics::new(0, 1.0, 0.5).with_validation(1.0, 0.5));
        let svg = plot_history_svg(&history, &PlotParams::default());
        assert!(!svg.contains("NaN"));
        assert!(!svg.contains("inf"));
    }

    #[test]
    fn plot_empty_history() {
        let svg = plot_history_svg(&TrainingHistory::new(), &PlotParams::default());
        assert!(svg.contains("No epochs recorded"));
        assert!(svg.contains("NN_model Training"));
    }

    #[test]
    fn plot_escapes_title() {
        let params = PlotParams::default().with_title("CNN <48x48> & more");
        let svg = plot_history_svg(&history(), &params);
        assert!(svg.contains("CNN &lt;48x48&gt; &amp; more"));
    }

    #[test]
    fn params_builders() {
        let params = PlotParams::default()
            .with_size(800, 300)
            .with_colors("red", "blue");
        assert_eq!((params.width, params.height), (800, 300));
        assert_eq!(params.train_color, "red");
        assert!(params.is_valid());
        assert!(!PlotParams::default().with_size(100, 100).is_valid());
    }

    #[test]
    fn save_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.svg");
        save_history_plot(&history(), &path, &PlotParams::default()).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("Validation Accuracy"));
    }
}
