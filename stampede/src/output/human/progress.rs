use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

pub(crate) struct HumanProgress {
    inner: Mutex<Inner>,
}

impl HumanProgress {
    pub(crate) fn new() -> Self {
        let multi = MultiProgress::new();
        multi.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));

        Self {
            inner: Mutex::new(Inner {
                multi,
                bars: HashMap::new(),
            }),
        }
    }

    /// `span` is `(total, elapsed)` for bounded scenarios; `None` renders a
    /// spinner.
    pub(crate) fn update(
        &self,
        scenario: &str,
        span: Option<(Duration, Duration)>,
        message: String,
    ) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let pb = inner.get_or_create_bar(scenario);
        pb.set_message(message);

        match span {
            Some((total, elapsed)) => {
                let total_ms = total.as_millis() as u64;
                let elapsed_ms = elapsed.as_millis() as u64;
                pb.set_length(total_ms.max(1));
                pb.set_position(elapsed_ms.min(total_ms));
            }
            None => pb.tick(),
        }
    }

    pub(crate) fn finish(&self) {
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        for (_, pb) in inner.bars.drain() {
            pb.finish_and_clear();
        }

        let _ = inner.multi.clear();
    }
}

struct Inner {
    multi: MultiProgress,
    bars: HashMap<String, ProgressBar>,
}

impl Inner {
    fn get_or_create_bar(&mut self, scenario: &str) -> &ProgressBar {
        self.bars.entry(scenario.to_string()).or_insert_with(|| {
            let style = ProgressStyle::with_template("{prefix:>12} [{bar:24}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> ");

            let pb = self.multi.add(ProgressBar::no_length());
            pb.set_style(style);
            pb.set_prefix(scenario.to_string());
            pb
        })
    }
}
