//! Live status line using indicatif.

use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use mood_lens_core::boundary::guard;
use mood_lens_core::{EmotionLabel, EventSink, Expression, LifecycleEvent};

const DEFAULT_TEMPLATE: &str = "{spinner} {elapsed_precise} {msg}";

/// Spinner on stderr showing startup progress, then the current emotion.
pub struct StatusLine {
    bar: ProgressBar,
}

impl StatusLine {
    #[must_use]
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(style_for(None));
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_message("waiting for camera and models");
        Self { bar }
    }
}

impl Default for StatusLine {
    fn default() -> Self {
        Self::new()
    }
}

/// Spinner colour for the first expression in a label.
fn label_color(label: &EmotionLabel) -> &'static str {
    let first = label.as_str().split(", ").next().unwrap_or_default();
    match Expression::ALL.iter().find(|e| e.as_str() == first) {
        Some(Expression::Happy) => "yellow",
        Some(Expression::Sad | Expression::Fearful) => "blue",
        Some(Expression::Angry | Expression::Disgusted) => "red",
        Some(Expression::Surprised) => "magenta",
        Some(Expression::Neutral) | None => "white",
    }
}

fn styled(label: &EmotionLabel) -> Result<ProgressStyle> {
    let template = format!(
        "{{spinner:.{}}} {{elapsed_precise}} {{msg:.bold}}",
        label_color(label)
    );
    Ok(ProgressStyle::with_template(&template)?)
}

/// Style for the current label, or the plain style if it cannot be built.
fn style_for(label: Option<&EmotionLabel>) -> ProgressStyle {
    let plain = || {
        ProgressStyle::with_template(DEFAULT_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    };
    match label {
        Some(label) => guard("status style", || styled(label), plain),
        None => plain(),
    }
}

impl EventSink for StatusLine {
    fn on_event(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::CameraReady { metadata } => {
                self.bar
                    .set_message(format!("camera ready ({}x{})", metadata.width, metadata.height));
            }
            LifecycleEvent::ModelsReady => self.bar.set_message("models loaded"),
            LifecycleEvent::Started { display } => {
                self.bar.set_message(format!("looking for faces ({display})"));
            }
            LifecycleEvent::StartupFailed { error } => {
                self.bar.abandon_with_message(format!("startup failed: {error}"));
            }
            LifecycleEvent::EmotionChanged { label, .. } => {
                self.bar.set_style(style_for(Some(&label)));
                if label.is_empty() {
                    self.bar.set_message("no face");
                } else {
                    self.bar.set_message(label.to_string());
                }
            }
            LifecycleEvent::FrameFailed { frame, error } => {
                self.bar.println(format!("warning: frame {frame}: {error}"));
            }
            LifecycleEvent::Stopped { frames } => {
                self.bar.finish_with_message(format!("stopped after {frames} frames"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_color_uses_first_expression() {
        assert_eq!(label_color(&EmotionLabel::from("happy")), "yellow");
        assert_eq!(label_color(&EmotionLabel::from("angry, sad")), "red");
        assert_eq!(label_color(&EmotionLabel::empty()), "white");
    }

    #[test]
    fn test_styled_label_template_is_valid() {
        assert!(styled(&EmotionLabel::from("surprised")).is_ok());
    }

    #[test]
    fn test_status_line_accepts_every_event() {
        let status = StatusLine::new();
        status.on_event(LifecycleEvent::ModelsReady);
        status.on_event(LifecycleEvent::EmotionChanged {
            label: EmotionLabel::from("neutral"),
            frame: 1,
        });
        status.on_event(LifecycleEvent::Stopped { frames: 1 });
        assert!(status.bar.is_finished());
    }
}
