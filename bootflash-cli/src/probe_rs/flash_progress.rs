use std::{collections::HashMap, time::Duration};

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use probe_rs::flashing::{FlashProgress, ProgressEvent, ProgressOperation};

// Progress Event Order: All AddProgressBar -> FlashLayoutReady -> (Started -> Progress -> Finished) per operation

/// One progress bar per flash operation (erase, program, verify, ...)
pub struct FlashProgressBars {
    bars: HashMap<String, ProgressBar>,
    container: MultiProgress,
    style: ProgressStyle,
}

/// ProgressOperation is not hashable, key by its debug name
fn operation_key(operation: &ProgressOperation) -> String {
    format!("{operation:?}")
}

impl FlashProgressBars {
    pub fn new(visible: bool) -> Self {
        let style = ProgressStyle::with_template(
            "[{elapsed_precise}] {bar:40.cyan/blue} {bytes:>10}/{total_bytes:10} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");

        let draw_target = if visible {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };

        Self {
            bars: HashMap::new(),
            container: MultiProgress::with_draw_target(draw_target),
            style,
        }
    }

    /// Wrap into the probe-rs progress reporter
    pub fn into_flash_progress<'a>(mut self) -> FlashProgress<'a> {
        FlashProgress::new(Box::new(move |event| self.handle(event)))
    }

    pub fn handle(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::AddProgressBar { operation, total } => {
                let bar = self
                    .container
                    .add(ProgressBar::new(total.unwrap_or(1)));
                bar.set_style(self.style.clone());
                bar.set_message(format!("   {operation:?}"));
                self.bars.insert(operation_key(&operation), bar);
            }
            ProgressEvent::Started(operation) => {
                if let Some(bar) = self.bars.get(&operation_key(&operation)) {
                    bar.enable_steady_tick(Duration::from_millis(100));
                }
            }
            ProgressEvent::Progress {
                operation, size, ..
            } => {
                if let Some(bar) = self.bars.get(&operation_key(&operation)) {
                    bar.inc(size);
                }
            }
            ProgressEvent::Finished(operation) => self.finish(&operation, true),
            ProgressEvent::Failed(operation) => self.finish(&operation, false),
            ProgressEvent::FlashLayoutReady { .. } => {}
            ProgressEvent::DiagnosticMessage { message } => {
                tracing::warn!("{message}");
            }
        }
    }

    fn finish(&self, operation: &ProgressOperation, success: bool) {
        if let Some(bar) = self.bars.get(&operation_key(operation)) {
            let icon = if success { "✅" } else { "❌" };
            bar.finish_with_message(format!("{icon} {operation:?}"));
        }
    }
}
