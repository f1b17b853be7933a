//! JSON Lines event output.

use std::io::{self, Write};
use std::sync::Mutex;

use anyhow::Result;
use mood_lens_core::{EventSink, LifecycleEvent};
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Writes one JSON object per lifecycle event.
pub struct JsonEvents {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonEvents {
    /// Creates a new JSON output writing to stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Creates a new JSON output writing to the given writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    #[allow(clippy::significant_drop_tightening)]
    fn write(&self, event: &LifecycleEvent) -> Result<()> {
        let line = serde_json::to_string(&to_json(event, OffsetDateTime::now_utc()))?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {e}"))?;
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}

impl EventSink for JsonEvents {
    fn on_event(&self, event: LifecycleEvent) {
        if let Err(e) = self.write(&event) {
            tracing::warn!("Failed to write event: {e:#}");
        }
    }
}

/// Flattens an event into `{"time", "event", ...fields}`.
fn to_json(event: &LifecycleEvent, at: OffsetDateTime) -> Value {
    let mut value = match event {
        LifecycleEvent::CameraReady { metadata } => json!({
            "event": "camera_ready",
            "width": metadata.width,
            "height": metadata.height,
        }),
        LifecycleEvent::ModelsReady => json!({ "event": "models_ready" }),
        LifecycleEvent::Started { display } => json!({
            "event": "started",
            "width": display.width,
            "height": display.height,
        }),
        LifecycleEvent::StartupFailed { error } => json!({
            "event": "startup_failed",
            "error": error.to_string(),
        }),
        LifecycleEvent::EmotionChanged { label, frame } => json!({
            "event": "emotion_changed",
            "label": label.as_str(),
            "frame": frame,
        }),
        LifecycleEvent::FrameFailed { frame, error } => json!({
            "event": "frame_failed",
            "frame": frame,
            "error": error.to_string(),
        }),
        LifecycleEvent::Stopped { frames } => json!({
            "event": "stopped",
            "frames": frames,
        }),
    };
    if let (Some(map), Ok(time)) = (value.as_object_mut(), at.format(&Rfc3339)) {
        map.insert("time".to_string(), Value::String(time));
    }
    value
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use mood_lens_core::{EmotionLabel, LensError, StreamMetadata};

    /// Cloneable in-memory writer.
    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_emotion_change_fields() {
        let at = OffsetDateTime::UNIX_EPOCH;
        let value = to_json(
            &LifecycleEvent::EmotionChanged {
                label: EmotionLabel::from("happy, surprised"),
                frame: 12,
            },
            at,
        );
        assert_eq!(value["event"], "emotion_changed");
        assert_eq!(value["label"], "happy, surprised");
        assert_eq!(value["frame"], 12);
        assert_eq!(value["time"], "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_errors_are_rendered_as_messages() {
        let value = to_json(
            &LifecycleEvent::StartupFailed {
                error: LensError::camera_unavailable("permission denied"),
            },
            OffsetDateTime::UNIX_EPOCH,
        );
        assert_eq!(value["error"], "camera unavailable: permission denied");
    }

    #[test]
    fn test_one_line_per_event() {
        let buffer = Buffer::default();
        let sink = JsonEvents::new(Box::new(buffer.clone()));
        sink.on_event(LifecycleEvent::CameraReady {
            metadata: StreamMetadata::new(640, 480),
        });
        sink.on_event(LifecycleEvent::Stopped { frames: 3 });

        let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        let lines: Vec<Value> = output
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["width"], 640);
        assert_eq!(lines[1]["event"], "stopped");
    }
}
